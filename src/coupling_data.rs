//! Per-exchange data state: current values, the previous iteration's values,
//! and the short history used for extrapolated initial guesses (`spec.md`
//! §3, §4.9).
//!
//! One [`CouplingData`] wraps one named [`crate::mesh::Data`] array on one
//! [`crate::mesh::Mesh`] plus the bookkeeping the coupling scheme needs
//! around it: whether this participant writes or reads it, and (for
//! implicit schemes) the value it held at the start of the current
//! iteration, for use by an [`crate::accelerator::Accelerator`] and by
//! convergence measures.

use crate::mesh::Mesh;

/// Which side of an exchange this participant plays for one
/// [`CouplingData`]: it either writes fresh values into the array before
/// `advance`'s exchange, or reads values written there by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Write,
    Read,
}

/// One named data array tracked across a coupling exchange, plus the
/// iteration history `spec.md` §4.9 requires for extrapolation and
/// acceleration.
pub struct CouplingData {
    pub mesh_name: String,
    pub data_name: String,
    pub role: Role,
    /// Values from the end of the previous converged time window, used as
    /// the baseline for extrapolated initial guesses at the start of a new
    /// window.
    old_values: Vec<f64>,
    /// Values as they stood at the start of the current implicit
    /// iteration, i.e. before this round's exchange overwrote them. Used by
    /// an accelerator to compute the iteration's residual (`current - old`).
    iteration_start_values: Vec<f64>,
    /// Up to `extrapolation_order + 1` prior converged windows' values,
    /// most recent last, used by [`CouplingData::extrapolate`].
    history: Vec<Vec<f64>>,
    extrapolation_order: usize,
}

impl CouplingData {
    pub fn new(mesh_name: impl Into<String>, data_name: impl Into<String>, role: Role, extrapolation_order: usize) -> Self {
        Self {
            mesh_name: mesh_name.into(),
            data_name: data_name.into(),
            role,
            old_values: Vec::new(),
            iteration_start_values: Vec::new(),
            history: Vec::new(),
            extrapolation_order,
        }
    }

    pub fn current_values<'a>(&self, mesh: &'a Mesh) -> &'a [f64] {
        mesh.data(&self.data_name).expect("data name registered with CouplingData must exist on its mesh").values()
    }

    pub fn current_values_mut<'a>(&self, mesh: &'a mut Mesh) -> &'a mut [f64] {
        mesh.data_mut(&self.data_name).expect("data name registered with CouplingData must exist on its mesh").values_mut()
    }

    /// Snapshots the mesh's current values as this implicit iteration's
    /// starting point. Called at the top of every implicit sub-iteration,
    /// before the exchange that may overwrite them.
    pub fn checkpoint_iteration_start(&mut self, mesh: &Mesh) {
        self.iteration_start_values = self.current_values(mesh).to_vec();
    }

    pub fn iteration_start_values(&self) -> &[f64] {
        &self.iteration_start_values
    }

    /// The residual of the current iteration: `current - iteration_start`,
    /// the quantity an [`crate::accelerator::Accelerator`] relaxes and
    /// `spec.md` §4.9's convergence measures compare against a tolerance.
    pub fn residual(&self, mesh: &Mesh) -> Vec<f64> {
        self.current_values(mesh)
            .iter()
            .zip(self.iteration_start_values.iter())
            .map(|(current, old)| current - old)
            .collect()
    }

    /// Called once a time window converges: pushes the current values onto
    /// the extrapolation history (trimmed to `extrapolation_order + 1`
    /// entries) and records them as the new `old_values` baseline.
    pub fn commit_window(&mut self, mesh: &Mesh) {
        let values = self.current_values(mesh).to_vec();
        self.old_values = values.clone();
        self.history.push(values);
        let max_len = self.extrapolation_order + 1;
        if self.history.len() > max_len {
            let excess = self.history.len() - max_len;
            self.history.drain(0..excess);
        }
    }

    /// Writes an extrapolated initial guess for the next window into the
    /// mesh, using a first-order (linear) or second-order extrapolation
    /// depending on `extrapolation_order` and how much history exists
    /// (`spec.md` §4.9): order 0 reuses `old_values` unchanged, order 1 is
    /// `2*x[n] - x[n-1]`, order 2 is `2.5*x[n] - 2*x[n-1] + 0.5*x[n-2]`.
    pub fn extrapolate(&self, mesh: &mut Mesh) {
        let order = self.extrapolation_order.min(self.history.len().saturating_sub(1));
        let extrapolated = match order {
            0 => self.old_values.clone(),
            1 => {
                let xn = &self.history[self.history.len() - 1];
                let xn1 = &self.history[self.history.len() - 2];
                xn.iter().zip(xn1.iter()).map(|(a, b)| 2.0 * a - b).collect()
            }
            _ => {
                let xn = &self.history[self.history.len() - 1];
                let xn1 = &self.history[self.history.len() - 2];
                let xn2 = &self.history[self.history.len() - 3];
                xn.iter()
                    .zip(xn1.iter())
                    .zip(xn2.iter())
                    .map(|((a, b), c)| 2.5 * a - 2.0 * b + 0.5 * c)
                    .collect()
            }
        };
        if let Some(data) = mesh.data_mut(&self.data_name) {
            data.values_mut().copy_from_slice(&extrapolated);
        }
    }

    /// Overwrites the mesh's current values with `old_values`, the state at
    /// the start of the window. Used when an implicit window fails to
    /// converge and the scheme must roll back before repeating it
    /// (`spec.md` §4.9's "reading a checkpoint" step).
    pub fn restore_old_values(&self, mesh: &mut Mesh) {
        if let Some(data) = mesh.data_mut(&self.data_name) {
            data.values_mut().copy_from_slice(&self.old_values);
        }
    }
}
