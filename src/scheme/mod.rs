//! The time-window state machine (`spec.md` §4.5-4.8, §9).
//!
//! `spec.md` §9 replaces the original inheritance hierarchy with a tagged
//! variant whose state transitions are a single table-driven step function;
//! [`CouplingScheme`] is that variant, [`SharedState`] is the base record it
//! carries by reference rather than by virtual dispatch. Each of
//! [`serial::SerialCouplingScheme`], [`parallel::ParallelCouplingScheme`],
//! [`multi::MultiCouplingScheme`] implements one variant's exchange pattern
//! against the same `SharedState`.

pub mod multi;
pub mod parallel;
pub mod serial;

use crate::accelerator::{AcceleratedValues, Accelerator};
use crate::coupling_data::CouplingData;
use crate::error::{CouplingError, Result};
use crate::mesh::Mesh;
use std::collections::HashMap;

pub use multi::MultiCouplingScheme;
pub use parallel::ParallelCouplingScheme;
pub use serial::{SerialCouplingScheme, SerialRole};

/// Meshes indexed by name, the form every scheme variant and
/// [`crate::session::SessionFacade`] share; a mesh the scheme exchanges data
/// over must already be present here under its configured name.
pub type MeshSet = HashMap<String, Mesh>;

/// Whether a window's size is fixed up front or left to the first
/// participant's discretion (`spec.md` §4.5).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeWindowSize {
    Fixed(f64),
    PerStep,
}

/// A convergence test over one receive-side [`CouplingData`]: relative L2
/// norm of its iteration residual against its current magnitude, below
/// `relative_tolerance` (`spec.md` §8 scenario 2, §4.5 step 4).
pub struct ConvergenceMeasure {
    pub data_index: usize,
    pub relative_tolerance: f64,
}

impl ConvergenceMeasure {
    pub fn is_converged(&self, data: &CouplingData, meshes: &MeshSet) -> bool {
        let mesh = meshes.get(&data.mesh_name).expect("coupling data must name a mesh present in the session");
        let residual = data.residual(mesh);
        let residual_norm = l2_norm(&residual);
        let current_norm = l2_norm(data.current_values(mesh));
        if current_norm == 0.0 {
            residual_norm < self.relative_tolerance
        } else {
            residual_norm / current_norm < self.relative_tolerance
        }
    }
}

fn l2_norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Window/iteration bookkeeping shared by every scheme variant (`spec.md`
/// §4.5). Time and window-completion state live here; the exchange pattern
/// itself (who sends to whom, in what order) lives in the variant.
pub struct SharedState {
    pub time: f64,
    pub time_window: u64,
    pub time_window_size: TimeWindowSize,
    pub remainder: f64,
    pub max_time: f64,
    pub max_time_windows: u64,
    pub max_iterations: u32,
    pub iteration: u32,
    pub send_data: Vec<CouplingData>,
    pub receive_data: Vec<CouplingData>,
    pub convergence_measures: Vec<ConvergenceMeasure>,
    pub accelerator: Option<Box<dyn Accelerator>>,
}

const WINDOW_COMPLETE_EPSILON: f64 = 1e-10;

impl SharedState {
    pub fn new(time_window_size: TimeWindowSize, max_time: f64, max_time_windows: u64, max_iterations: u32) -> Self {
        let remainder = match time_window_size {
            TimeWindowSize::Fixed(size) => size,
            TimeWindowSize::PerStep => 0.0,
        };
        Self {
            time: 0.0,
            time_window: 1,
            time_window_size,
            remainder,
            max_time,
            max_time_windows,
            max_iterations,
            iteration: 0,
            send_data: Vec::new(),
            receive_data: Vec::new(),
            convergence_measures: Vec::new(),
            accelerator: None,
        }
    }

    pub fn is_implicit(&self) -> bool {
        self.max_iterations > 1
    }

    pub fn is_coupling_ongoing(&self) -> bool {
        self.time < self.max_time - WINDOW_COMPLETE_EPSILON && self.time_window <= self.max_time_windows
    }

    /// Records locally computed time and shrinks the remainder toward zero.
    /// Called once per `advance`, before the variant's exchange logic runs.
    pub fn add_computed_time(&mut self, dt: f64) {
        self.remainder -= dt;
        if let TimeWindowSize::PerStep = self.time_window_size {
            self.remainder = self.remainder.max(0.0);
        }
    }

    pub fn is_timestep_complete(&self) -> bool {
        self.remainder <= WINDOW_COMPLETE_EPSILON
    }

    /// Resets the remainder for the next window once the current one
    /// completes, advancing `time` by exactly the window size (never more,
    /// per `spec.md` §8's window-completion property).
    pub fn begin_next_window(&mut self) {
        let window_size = match self.time_window_size {
            TimeWindowSize::Fixed(size) => size,
            TimeWindowSize::PerStep => -self.remainder,
        };
        self.time += window_size;
        self.time_window += 1;
        self.iteration = 0;
        self.remainder = match self.time_window_size {
            TimeWindowSize::Fixed(size) => size,
            TimeWindowSize::PerStep => 0.0,
        };
        if let Some(accelerator) = &mut self.accelerator {
            accelerator.reset();
        }
    }

    pub fn checkpoint_iteration_start(&mut self, meshes: &MeshSet) {
        for data in self.send_data.iter_mut().chain(self.receive_data.iter_mut()) {
            let mesh = meshes.get(&data.mesh_name).expect("coupling data must name a mesh present in the session");
            data.checkpoint_iteration_start(mesh);
        }
    }

    /// Runs every registered convergence measure; the window (or
    /// iteration) converges only if all of them do.
    pub fn all_converged(&self, meshes: &MeshSet) -> bool {
        self.convergence_measures.iter().all(|measure| {
            let data = &self.receive_data[measure.data_index];
            measure.is_converged(data, meshes)
        })
    }

    /// Applies the configured accelerator (if any) to every receive-side
    /// data array's residual. A no-op under explicit coupling, since
    /// `shared.accelerator` is only set up for implicit schemes.
    pub fn accelerate(&mut self, meshes: &mut MeshSet) {
        let Some(accelerator) = &mut self.accelerator else { return };
        // Copied into scratch buffers rather than borrowed from `meshes`
        // directly, since two data arrays can share a mesh and the
        // accelerator needs all of them borrowed mutably at once.
        let mut slots = Vec::with_capacity(self.receive_data.len());
        let mut buffers: Vec<(Vec<f64>, Vec<f64>)> = Vec::with_capacity(self.receive_data.len());
        for data in &self.receive_data {
            let mesh = meshes.get(&data.mesh_name).expect("coupling data must name a mesh present in the session");
            let current = data.current_values(mesh).to_vec();
            let start = data.iteration_start_values().to_vec();
            buffers.push((current, start));
        }
        for (current, start) in &mut buffers {
            slots.push(AcceleratedValues { current, iteration_start: start });
        }
        accelerator.accelerate(&mut slots);
        drop(slots);
        for (data, (current, _start)) in self.receive_data.iter().zip(buffers.into_iter()) {
            let mesh = meshes.get_mut(&data.mesh_name).expect("coupling data must name a mesh present in the session");
            data.current_values_mut(mesh).copy_from_slice(&current);
        }
    }

    /// Rolls every send/receive data array back to the start of the current
    /// window. Not called by the implicit iteration loop itself (the
    /// accelerated receive-side values computed by `accelerate` are exactly
    /// what the next iteration should exchange); available for an embedding
    /// solver that wants to discard a window's exchanged data entirely,
    /// alongside its own `read-iteration-checkpoint` state restore.
    pub fn restore_old_values(&self, meshes: &mut MeshSet) {
        for data in self.send_data.iter().chain(self.receive_data.iter()) {
            let mesh = meshes.get_mut(&data.mesh_name).expect("coupling data must name a mesh present in the session");
            data.restore_old_values(mesh);
        }
    }

    /// Commits every data array's current values as the new window baseline
    /// and pushes them onto its extrapolation history. Called once a
    /// window has converged.
    pub fn commit_window(&mut self, meshes: &MeshSet) {
        for data in self.send_data.iter_mut().chain(self.receive_data.iter_mut()) {
            let mesh = meshes.get(&data.mesh_name).expect("coupling data must name a mesh present in the session");
            data.commit_window(mesh);
        }
    }

    /// Writes an extrapolated initial guess for the next window into every
    /// send/receive data array (`spec.md` §4.9).
    pub fn extrapolate(&self, meshes: &mut MeshSet) {
        for data in self.send_data.iter().chain(self.receive_data.iter()) {
            let mesh = meshes.get_mut(&data.mesh_name).expect("coupling data must name a mesh present in the session");
            data.extrapolate(mesh);
        }
    }
}

/// The tagged variant `spec.md` §9 calls for: one of the three exchange
/// patterns, each generic over the [`crate::message::Communicator`] used by
/// its M2N legs.
pub enum CouplingScheme<C: crate::message::Communicator> {
    Serial(SerialCouplingScheme<C>),
    Parallel(ParallelCouplingScheme<C>),
    Multi(MultiCouplingScheme<C>),
}

impl<C: crate::message::Communicator> CouplingScheme<C> {
    /// `spec.md` §4.1 `initialize`'s scheme-level step: establishes the
    /// t=0, window-1 state (already what `SharedState::new` produces) and
    /// reports whether the scheme exchanges data as part of initializing
    /// itself, as distinct from the initial exchange `initialize_data`
    /// performs. None of the three variants exchange here — that exchange
    /// only happens when a participant declares initial data and calls
    /// `initializeData` — so this always returns `false`; it exists as an
    /// explicit call site so `SessionFacade::initialize` performs the named
    /// step rather than skipping it silently.
    pub fn initialize(&mut self, shared: &mut SharedState) -> Result<bool> {
        shared.time = 0.0;
        shared.time_window = 1;
        Ok(false)
    }

    /// Runs this window's exchange. Returns whether an inter-participant
    /// exchange actually occurred this call (used by `SessionFacade` to
    /// decide whether to run the read-side mapping dispatch).
    pub fn advance(&mut self, shared: &mut SharedState, meshes: &mut MeshSet) -> Result<bool> {
        match self {
            CouplingScheme::Serial(s) => s.advance(shared, meshes),
            CouplingScheme::Parallel(s) => s.advance(shared, meshes),
            CouplingScheme::Multi(s) => s.advance(shared, meshes),
        }
    }

    /// `spec.md` §4.1 `initializeData`: performs the scheme's one-time
    /// initial exchange and reports whether it occurred (always `true`;
    /// kept as a `Result<bool>` to match `advance`'s shape since callers
    /// branch on it the same way).
    pub fn initialize_data(&mut self, shared: &mut SharedState, meshes: &mut MeshSet) -> Result<bool> {
        match self {
            CouplingScheme::Serial(s) => s.initialize_data(shared, meshes),
            CouplingScheme::Parallel(s) => s.initialize_data(shared, meshes),
            CouplingScheme::Multi(s) => s.initialize_data(shared, meshes),
        }
    }

    pub fn finalize(&mut self) -> Result<()> {
        match self {
            CouplingScheme::Serial(s) => s.finalize(),
            CouplingScheme::Parallel(s) => s.finalize(),
            CouplingScheme::Multi(s) => s.finalize(),
        }
    }
}

pub(crate) fn require_same_timestep(local: f64, remote: f64) -> Result<()> {
    if (local - remote).abs() > 1e-12 * local.abs().max(1.0) {
        Err(CouplingError::Protocol(format!(
            "timestep mismatch across participants: local {local}, remote {remote}"
        )))
    } else {
        Ok(())
    }
}
