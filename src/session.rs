//! The participant-facing lifecycle gate (`spec.md` §4.1, §6).
//!
//! `SessionFacade` is the embedding solver's sole entry point: it owns the
//! ID tables, the mesh-lock state machine, the mapping dispatchers, and the
//! [`crate::scheme::CouplingScheme`], and sequences them through
//! `configure → initialize → [initializeData] → advance* → finalize`
//! exactly as `spec.md` §4.1 specifies. None of the subsystems it wires
//! together know about each other directly; `SessionFacade` is where their
//! call order is decided.

use crate::action::{Action, ActionTiming};
use crate::coupling_data::{CouplingData, Role};
use crate::error::{CouplingError, Result};
use crate::group::GroupComm;
use crate::id::{DataId, IdTable, MeshId};
use crate::mapping::MappingDispatcher;
use crate::mesh::{DataKind, Mesh, VertexId};
use crate::message::Communicator;
use crate::scheme::{require_same_timestep, CouplingScheme, MeshSet, SharedState};
use std::collections::HashMap;

/// Per-mesh writability state (`spec.md` §3, §9's "encode as an enum with
/// explicit transition checks" note). A mesh starts `Unlocked`, becomes
/// `Locked` once `initialize()` returns, and `resetMesh` re-unlocks exactly
/// that one mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MeshLock {
    Unlocked,
    Locked,
}

/// The lifecycle phase a session is in; every public operation checks this
/// before doing anything else (`spec.md` §4.1's per-operation preconditions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Configured,
    Initialized,
    Finalized,
}

pub struct SessionFacade<C: Communicator> {
    phase: Phase,
    ids: IdTable,
    meshes: MeshSet,
    mesh_locks: HashMap<MeshId, MeshLock>,
    mesh_names_by_id: Vec<String>,
    write_dispatch: MappingDispatcher,
    read_dispatch: MappingDispatcher,
    scheme: CouplingScheme<C>,
    shared: SharedState,
    actions: Vec<Action>,
    did_exchange_this_call: bool,
    window_complete_this_call: bool,
    /// The intra-participant broadcast/gather channel (`spec.md` §4.1 step 1),
    /// only present for participants that run with more than one rank. A
    /// single-rank participant has nothing to sync against itself.
    group: Option<GroupComm<C>>,
    /// Which (from, to) mesh name pairs the mapping dispatchers run over.
    /// Populated from a [`crate::config::CouplingConfig`] by the caller
    /// assembling this session (`with_mesh_pairs`); empty for a participant
    /// that exchanges data without remapping between differing geometries.
    mesh_pairs: Vec<(String, String)>,
}

impl<C: Communicator> SessionFacade<C> {
    /// Assembles a session from its already-wired subsystems. `configure`
    /// in `spec.md` is split here into config parsing
    /// ([`crate::config::CouplingConfig`], done by the caller) and this
    /// constructor, which plays the role of `configure`'s remaining
    /// responsibility: populating ID tables and creating the mesh-lock with
    /// every mesh unlocked.
    pub fn new(
        mesh_names: Vec<String>,
        scheme: CouplingScheme<C>,
        shared: SharedState,
        write_dispatch: MappingDispatcher,
        read_dispatch: MappingDispatcher,
    ) -> Self {
        let mut ids = IdTable::new();
        let mut meshes = MeshSet::new();
        let mut mesh_locks = HashMap::new();
        let mut mesh_names_by_id = Vec::new();

        for name in mesh_names {
            let id = ids.register_mesh(&name);
            meshes.insert(name.clone(), Mesh::named(name.clone(), 3));
            mesh_locks.insert(id, MeshLock::Unlocked);
            mesh_names_by_id.push(name);
        }

        Self {
            phase: Phase::Configured,
            ids,
            meshes,
            mesh_locks,
            mesh_names_by_id,
            write_dispatch,
            read_dispatch,
            scheme,
            shared,
            actions: Vec::new(),
            did_exchange_this_call: false,
            window_complete_this_call: false,
            group: None,
            mesh_pairs: Vec::new(),
        }
    }

    /// Attaches the intra-participant group channel a multi-rank participant
    /// syncs its computed timestep over (`spec.md` §4.1 step 1). Omit this
    /// for a single-rank participant.
    pub fn with_group(mut self, group: GroupComm<C>) -> Self {
        self.group = Some(group);
        self
    }

    /// Names the (from-mesh, to-mesh) pairs the write/read mapping
    /// dispatchers run over once the caller has registered the meshes and
    /// data a [`crate::config::CouplingConfig`] describes.
    pub fn with_mesh_pairs(mut self, mesh_pairs: Vec<(String, String)>) -> Self {
        self.mesh_pairs = mesh_pairs;
        self
    }

    pub fn register_data(&mut self, mesh_id: MeshId, name: &str, kind: DataKind) -> Result<DataId> {
        self.ids.validate_mesh_id(mesh_id)?;
        let mesh_name = self.mesh_names_by_id[mesh_id].clone();
        self.meshes.get_mut(&mesh_name).expect("registered mesh must exist").add_data(name, kind);
        Ok(self.ids.register_data(mesh_id, name))
    }

    pub fn register_action(&mut self, action: Action) {
        self.actions.push(action);
    }

    /// Declares that `data_name` on the mesh named `mesh_id` is written by
    /// this participant and exchanged on every call the scheme runs its
    /// protocol, with `extrapolation_order` prior windows kept for an
    /// extrapolated initial guess at the start of the next one (`spec.md`
    /// §4.9). Must be called before `initialize()`.
    pub fn register_send_data(&mut self, mesh_id: MeshId, data_name: &str, extrapolation_order: usize) -> Result<()> {
        self.ids.validate_mesh_id(mesh_id)?;
        self.ids.data_id(mesh_id, data_name)?;
        let mesh_name = self.mesh_names_by_id[mesh_id].clone();
        self.shared.send_data.push(CouplingData::new(mesh_name, data_name, Role::Write, extrapolation_order));
        Ok(())
    }

    /// Declares that `data_name` on the mesh named `mesh_id` is read by this
    /// participant, written into by the scheme's exchange. Must be called
    /// before `initialize()`.
    pub fn register_receive_data(&mut self, mesh_id: MeshId, data_name: &str, extrapolation_order: usize) -> Result<()> {
        self.ids.validate_mesh_id(mesh_id)?;
        self.ids.data_id(mesh_id, data_name)?;
        let mesh_name = self.mesh_names_by_id[mesh_id].clone();
        self.shared.receive_data.push(CouplingData::new(mesh_name, data_name, Role::Read, extrapolation_order));
        Ok(())
    }

    /// Registers a convergence measure (`spec.md` §4.5 step 4) over the
    /// `index`-th entry of `register_receive_data`'s call order, for
    /// implicit coupling. A no-op for explicit coupling, since
    /// `shared.is_implicit()` gates whether it is ever consulted.
    pub fn register_convergence_measure(&mut self, receive_data_index: usize, relative_tolerance: f64) {
        self.shared.convergence_measures.push(crate::scheme::ConvergenceMeasure {
            data_index: receive_data_index,
            relative_tolerance,
        });
    }

    // ---- Lifecycle -----------------------------------------------------

    /// Performs the ordered steps of `spec.md` §4.1 `initialize`: mesh
    /// partitioning is assumed already resolved by the caller (geometry
    /// providers/receivers communicate/compute before this is called, since
    /// that step needs direct access to per-mesh `M2N` legs this facade
    /// does not retain once partitioning completes). Calls the scheme's own
    /// `initialize` step, runs the read-side mapping dispatch if that step
    /// exchanged data, then locks every mesh. Returns the first Δt budget.
    pub fn initialize(&mut self) -> Result<f64> {
        if self.phase != Phase::Configured {
            return Err(CouplingError::State("initialize() called outside the Configured phase".into()));
        }

        tracing::info!(time_window = self.shared.time_window, "initializing coupling session");

        let exchanged = self.scheme.initialize(&mut self.shared)?;
        if exchanged {
            for (from_name, to_name) in self.mesh_pairs.clone() {
                let from = self.meshes.get(&from_name).cloned().expect("mesh must exist");
                let to = self.meshes.get_mut(&to_name).expect("mesh must exist");
                self.read_dispatch.dispatch(&from, to);
            }
        }

        for lock in self.mesh_locks.values_mut() {
            *lock = MeshLock::Locked;
        }
        self.phase = Phase::Initialized;
        Ok(self.next_timestep_max_length())
    }

    /// `spec.md` §4.1 `initializeData`: only meaningful for participants
    /// declaring initial data; runs the write-side dispatch, lets the scheme
    /// perform its initial inter-participant exchange
    /// (`CouplingScheme::initialize_data`, dispatching to the scheme
    /// variant's own `send_all`/`receive_all`-equivalent), then the
    /// read-side dispatch if that exchange happened, then clears
    /// `ON_ADVANCE`-timed written buffers.
    pub fn initialize_data(&mut self) -> Result<()> {
        if self.phase != Phase::Initialized {
            return Err(CouplingError::State("initializeData() called before initialize()".into()));
        }
        for (from_name, to_name) in self.mesh_pairs.clone() {
            let from = self.meshes.get(&from_name).cloned().expect("mesh must exist");
            let to = self.meshes.get_mut(&to_name).expect("mesh must exist");
            self.write_dispatch.dispatch(&from, to);
        }

        let exchanged = self.scheme.initialize_data(&mut self.shared, &mut self.meshes)?;

        if exchanged {
            for (from_name, to_name) in self.mesh_pairs.clone() {
                let from = self.meshes.get(&from_name).cloned().expect("mesh must exist");
                let to = self.meshes.get_mut(&to_name).expect("mesh must exist");
                self.read_dispatch.dispatch(&from, to);
            }
        }
        self.write_dispatch.end_window();
        Ok(())
    }

    /// `spec.md` §4.1 `advance`, in the exact order its ten steps specify.
    pub fn advance(&mut self, dt_computed: f64) -> Result<f64> {
        if self.phase != Phase::Initialized {
            return Err(CouplingError::State("advance() called before initialize() or after finalize()".into()));
        }
        if !self.shared.is_coupling_ongoing() {
            return Err(CouplingError::State("advance() called after the coupled run has ended".into()));
        }

        // Step 1: sync the locally computed timestep across every rank of
        // this participant, so a rank that disagrees is caught here as a
        // protocol error rather than silently drifting out of lockstep with
        // its peers on the other side of the M2N legs.
        let dt_computed = self.sync_computed_timestep(dt_computed)?;

        // Step 2: add computed time.
        self.shared.add_computed_time(dt_computed);

        // Step 4: write-side mapping dispatch.
        for lock in self.mesh_locks.values_mut() {
            *lock = MeshLock::Unlocked;
        }
        for (from_name, to_name) in self.mesh_pairs.clone() {
            let from = self.meshes.get(&from_name).cloned().expect("mesh must exist");
            let to = self.meshes.get_mut(&to_name).expect("mesh must exist");
            self.write_dispatch.dispatch(&from, to);
        }

        // Step 5: prior actions.
        let mut fired = ActionTiming::ALWAYS_PRIOR;
        if self.shared.is_timestep_complete() {
            fired |= ActionTiming::ON_EXCHANGE_PRIOR;
        }
        self.trigger_actions(fired);

        // Step 6: the scheme's own protocol.
        tracing::debug!(
            time = self.shared.time,
            iteration = self.shared.iteration,
            "entering scheme.advance"
        );
        self.did_exchange_this_call = self.scheme.advance(&mut self.shared, &mut self.meshes)?;
        self.window_complete_this_call = self.did_exchange_this_call;

        // Step 7: post actions.
        let mut fired = ActionTiming::ALWAYS_POST;
        if self.did_exchange_this_call {
            fired |= ActionTiming::ON_EXCHANGE_POST;
        }
        if self.window_complete_this_call {
            fired |= ActionTiming::ON_TIMESTEP_COMPLETE_POST;
        }
        self.trigger_actions(fired);

        // Step 8: read-side mapping dispatch, only if data was exchanged.
        if self.did_exchange_this_call {
            for (from_name, to_name) in self.mesh_pairs.clone() {
                let from = self.meshes.get(&from_name).cloned().expect("mesh must exist");
                let to = self.meshes.get_mut(&to_name).expect("mesh must exist");
                self.read_dispatch.dispatch(&from, to);
            }
        }

        // Step 9: clear ON_ADVANCE write buffers, re-lock meshes.
        self.write_dispatch.end_window();
        self.read_dispatch.end_window();
        for lock in self.mesh_locks.values_mut() {
            *lock = MeshLock::Locked;
        }

        tracing::info!(
            time = self.shared.time,
            time_window = self.shared.time_window,
            exchanged = self.did_exchange_this_call,
            "advance complete"
        );

        Ok(self.next_timestep_max_length())
    }

    /// `spec.md` §4.1 `finalize`: scheme-level finalize (which drains every
    /// inter-participant channel via ping/pong), then this facade has
    /// nothing further of its own to release (intra-group channels belong
    /// to the embedding process, outside this crate's scope).
    pub fn finalize(&mut self) -> Result<()> {
        if self.phase != Phase::Initialized {
            return Err(CouplingError::State("finalize() called outside the Initialized phase".into()));
        }
        tracing::info!("finalizing coupling session");
        self.scheme.finalize()?;
        self.phase = Phase::Finalized;
        Ok(())
    }

    /// Gathers every rank's locally computed `Δt` at the master and checks
    /// them all against each other, then broadcasts the agreed value back so
    /// every rank proceeds with the exact same floating-point value. A
    /// single-rank participant (no `group` attached) just returns its own
    /// value unchanged.
    fn sync_computed_timestep(&mut self, dt_computed: f64) -> Result<f64> {
        let Some(group) = &mut self.group else {
            return Ok(dt_computed);
        };
        let agreed = if group.is_master() {
            for remote in group.gather_f64(dt_computed) {
                require_same_timestep(dt_computed, remote)?;
            }
            group.broadcast_f64(Some(dt_computed))
        } else {
            group.gather_f64(dt_computed);
            group.broadcast_f64(None)
        };
        group.next_round();
        Ok(agreed)
    }

    fn next_timestep_max_length(&self) -> f64 {
        self.shared.remainder.max(0.0)
    }

    fn trigger_actions(&mut self, fired: ActionTiming) {
        for action in &mut self.actions {
            action.trigger(fired);
        }
    }

    // ---- Introspection (`spec.md` §6) ----------------------------------

    pub fn is_coupling_ongoing(&self) -> bool {
        self.shared.is_coupling_ongoing()
    }

    pub fn is_read_data_available(&self) -> bool {
        self.did_exchange_this_call
    }

    pub fn is_write_data_required(&self, _dt: f64) -> bool {
        self.shared.is_timestep_complete()
    }

    pub fn is_timestep_complete(&self) -> bool {
        self.window_complete_this_call
    }

    pub fn dimensions(&self) -> usize {
        self.meshes.values().next().map(|m| m.dimensions()).unwrap_or(3)
    }

    pub fn has_mesh(&self, name: &str) -> bool {
        self.ids.has_mesh(name)
    }

    pub fn mesh_id(&self, name: &str) -> Result<MeshId> {
        self.ids.mesh_id(name)
    }

    pub fn mesh_ids(&self) -> Vec<MeshId> {
        self.ids.mesh_ids().collect()
    }

    pub fn has_data(&self, name: &str, mesh_id: MeshId) -> bool {
        self.ids.has_data(mesh_id, name)
    }

    pub fn data_id(&self, name: &str, mesh_id: MeshId) -> Result<DataId> {
        self.ids.data_id(mesh_id, name)
    }

    pub fn mesh_vertex_size(&self, mesh_id: MeshId) -> Result<usize> {
        self.ids.validate_mesh_id(mesh_id)?;
        let name = &self.mesh_names_by_id[mesh_id];
        Ok(self.meshes.get(name).expect("registered mesh must exist").vertex_count())
    }

    // ---- Geometry (`spec.md` §6) ---------------------------------------

    pub fn set_mesh_vertex(&mut self, mesh_id: MeshId, position: [f64; 3]) -> Result<VertexId> {
        self.ids.validate_mesh_id(mesh_id)?;
        self.check_writable(mesh_id)?;
        let name = self.mesh_names_by_id[mesh_id].clone();
        Ok(self.meshes.get_mut(&name).expect("registered mesh must exist").add_vertex(position))
    }

    pub fn set_mesh_vertices(&mut self, mesh_id: MeshId, positions: &[[f64; 3]]) -> Result<Vec<VertexId>> {
        positions.iter().map(|&p| self.set_mesh_vertex(mesh_id, p)).collect()
    }

    pub fn get_mesh_vertices(&self, mesh_id: MeshId, vertex_ids: &[VertexId]) -> Result<Vec<[f64; 3]>> {
        self.ids.validate_mesh_id(mesh_id)?;
        let name = &self.mesh_names_by_id[mesh_id];
        let mesh = self.meshes.get(name).expect("registered mesh must exist");
        vertex_ids
            .iter()
            .map(|&id| {
                mesh.vertex(id)
                    .map(|v| v.position)
                    .ok_or_else(|| CouplingError::Usage(format!("invalid vertex ID {id} on mesh {mesh_id}")))
            })
            .collect()
    }

    /// Exact-match lookup of vertex IDs from positions (`spec.md` §6);
    /// fails with `UsageError` if any requested position is not found.
    pub fn mesh_vertex_ids_from_positions(&self, mesh_id: MeshId, positions: &[[f64; 3]]) -> Result<Vec<VertexId>> {
        self.ids.validate_mesh_id(mesh_id)?;
        let name = &self.mesh_names_by_id[mesh_id];
        let mesh = self.meshes.get(name).expect("registered mesh must exist");
        let dim = mesh.dimensions();
        positions
            .iter()
            .map(|position| {
                mesh.vertices()
                    .iter()
                    .find(|v| v.coords(dim) == &position[..dim])
                    .map(|v| v.id)
                    .ok_or_else(|| CouplingError::Usage("no vertex found at the requested position".into()))
            })
            .collect()
    }

    /// Re-unlocks one mesh for geometry mutation and clears its contents,
    /// per `spec.md` §4.1's mesh-modification gate: adding vertices/edges is
    /// otherwise rejected post-`initialize` except immediately after this
    /// call.
    pub fn reset_mesh(&mut self, mesh_id: MeshId) -> Result<()> {
        self.ids.validate_mesh_id(mesh_id)?;
        let name = self.mesh_names_by_id[mesh_id].clone();
        let dimensions = self.meshes.get(&name).expect("registered mesh must exist").dimensions();
        self.meshes.insert(name, Mesh::named(self.mesh_names_by_id[mesh_id].clone(), dimensions));
        self.mesh_locks.insert(mesh_id, MeshLock::Unlocked);
        Ok(())
    }

    fn check_writable(&self, mesh_id: MeshId) -> Result<()> {
        match self.mesh_locks.get(&mesh_id) {
            Some(MeshLock::Unlocked) => Ok(()),
            Some(MeshLock::Locked) => {
                Err(CouplingError::Usage(format!("mesh {mesh_id} is locked; call resetMesh() before adding geometry")))
            }
            None => Err(CouplingError::Usage(format!("invalid mesh ID {mesh_id}"))),
        }
    }

    // ---- Data I/O (`spec.md` §6) ---------------------------------------

    pub fn write_scalar_data(&mut self, mesh_id: MeshId, data_name: &str, vertex_id: VertexId, value: f64) -> Result<()> {
        self.write_block_scalar_data(mesh_id, data_name, &[vertex_id], &[value])
    }

    pub fn write_block_scalar_data(
        &mut self,
        mesh_id: MeshId,
        data_name: &str,
        vertex_ids: &[VertexId],
        values: &[f64],
    ) -> Result<()> {
        self.ids.validate_mesh_id(mesh_id)?;
        self.ids.data_id(mesh_id, data_name)?;
        let name = self.mesh_names_by_id[mesh_id].clone();
        let mesh = self.meshes.get_mut(&name).expect("registered mesh must exist");
        let data = mesh
            .data_mut(data_name)
            .ok_or_else(|| CouplingError::Usage(format!("unknown data \"{data_name}\" on mesh {mesh_id}")))?;
        if data.kind != DataKind::Scalar {
            return Err(CouplingError::Usage(format!("\"{data_name}\" is not scalar data")));
        }
        write_block(data.values_mut(), 1, vertex_ids, values)
    }

    pub fn write_vector_data(
        &mut self,
        mesh_id: MeshId,
        data_name: &str,
        vertex_id: VertexId,
        value: &[f64],
    ) -> Result<()> {
        self.write_block_vector_data(mesh_id, data_name, &[vertex_id], value)
    }

    pub fn write_block_vector_data(
        &mut self,
        mesh_id: MeshId,
        data_name: &str,
        vertex_ids: &[VertexId],
        values: &[f64],
    ) -> Result<()> {
        self.ids.validate_mesh_id(mesh_id)?;
        self.ids.data_id(mesh_id, data_name)?;
        let name = self.mesh_names_by_id[mesh_id].clone();
        let mesh = self.meshes.get_mut(&name).expect("registered mesh must exist");
        let width = mesh.dimensions();
        let data = mesh
            .data_mut(data_name)
            .ok_or_else(|| CouplingError::Usage(format!("unknown data \"{data_name}\" on mesh {mesh_id}")))?;
        if data.kind != DataKind::Vector {
            return Err(CouplingError::Usage(format!("\"{data_name}\" is not vector data")));
        }
        write_block(data.values_mut(), width, vertex_ids, values)
    }

    pub fn read_scalar_data(&self, mesh_id: MeshId, data_name: &str, vertex_id: VertexId) -> Result<f64> {
        Ok(self.read_block_scalar_data(mesh_id, data_name, &[vertex_id])?[0])
    }

    pub fn read_block_scalar_data(&self, mesh_id: MeshId, data_name: &str, vertex_ids: &[VertexId]) -> Result<Vec<f64>> {
        self.ids.validate_mesh_id(mesh_id)?;
        self.ids.data_id(mesh_id, data_name)?;
        let name = &self.mesh_names_by_id[mesh_id];
        let mesh = self.meshes.get(name).expect("registered mesh must exist");
        let data = mesh
            .data(data_name)
            .ok_or_else(|| CouplingError::Usage(format!("unknown data \"{data_name}\" on mesh {mesh_id}")))?;
        if data.kind != DataKind::Scalar {
            return Err(CouplingError::Usage(format!("\"{data_name}\" is not scalar data")));
        }
        read_block(data.values(), 1, vertex_ids)
    }

    pub fn read_vector_data(&self, mesh_id: MeshId, data_name: &str, vertex_id: VertexId) -> Result<Vec<f64>> {
        self.read_block_vector_data(mesh_id, data_name, &[vertex_id])
    }

    pub fn read_block_vector_data(&self, mesh_id: MeshId, data_name: &str, vertex_ids: &[VertexId]) -> Result<Vec<f64>> {
        self.ids.validate_mesh_id(mesh_id)?;
        self.ids.data_id(mesh_id, data_name)?;
        let name = &self.mesh_names_by_id[mesh_id];
        let mesh = self.meshes.get(name).expect("registered mesh must exist");
        let width = mesh.dimensions();
        let data = mesh
            .data(data_name)
            .ok_or_else(|| CouplingError::Usage(format!("unknown data \"{data_name}\" on mesh {mesh_id}")))?;
        if data.kind != DataKind::Vector {
            return Err(CouplingError::Usage(format!("\"{data_name}\" is not vector data")));
        }
        read_block(data.values(), width, vertex_ids)
    }

    // ---- Actions (`spec.md` §6) -----------------------------------------

    pub fn is_action_required(&self, name: &str) -> bool {
        self.actions.iter().any(|a| a.name == name && a.is_required())
    }

    pub fn fulfilled_action(&mut self, name: &str) {
        for action in &mut self.actions {
            if action.name == name {
                action.fulfill();
            }
        }
    }
}

fn write_block(values: &mut [f64], width: usize, vertex_ids: &[VertexId], data: &[f64]) -> Result<()> {
    if data.len() != vertex_ids.len() * width {
        return Err(CouplingError::Usage(format!(
            "expected {} values for {} vertices of width {width}, got {}",
            vertex_ids.len() * width,
            vertex_ids.len(),
            data.len()
        )));
    }
    for (slot, &vertex_id) in vertex_ids.iter().enumerate() {
        let offset = vertex_id * width;
        let end = offset + width;
        if end > values.len() {
            return Err(CouplingError::Usage(format!("vertex index {vertex_id} out of range")));
        }
        values[offset..end].copy_from_slice(&data[slot * width..(slot + 1) * width]);
    }
    Ok(())
}

fn read_block(values: &[f64], width: usize, vertex_ids: &[VertexId]) -> Result<Vec<f64>> {
    let mut out = Vec::with_capacity(vertex_ids.len() * width);
    for &vertex_id in vertex_ids {
        let offset = vertex_id * width;
        let end = offset + width;
        if end > values.len() {
            return Err(CouplingError::Usage(format!("vertex index {vertex_id} out of range")));
        }
        out.extend_from_slice(&values[offset..end]);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accelerator::ConstantRelaxation;
    use crate::m2n::M2N;
    use crate::message::LoopbackCommunicator;
    use crate::scheme::{SerialCouplingScheme, SerialRole, TimeWindowSize};

    fn session_with_mesh() -> SessionFacade<LoopbackCommunicator> {
        let (a, _b) = LoopbackCommunicator::pair();
        let scheme = CouplingScheme::Serial(SerialCouplingScheme::new(SerialRole::First, M2N::new(a)));
        let shared = SharedState::new(TimeWindowSize::Fixed(1.0), 5.0, 5, 1);
        SessionFacade::new(
            vec!["interface".into()],
            scheme,
            shared,
            MappingDispatcher::new(),
            MappingDispatcher::new(),
        )
    }

    #[test]
    fn vertex_ids_are_contiguous_and_stable() {
        let mut session = session_with_mesh();
        let mesh_id = session.mesh_id("interface").unwrap();
        let ids = session.set_mesh_vertices(mesh_id, &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]]).unwrap();
        assert_eq!(ids, vec![0, 1, 2]);
        let positions = session.get_mesh_vertices(mesh_id, &ids).unwrap();
        assert_eq!(positions[1], [1.0, 0.0, 0.0]);
    }

    #[test]
    fn mesh_is_locked_after_initialize_and_unlocked_by_reset() {
        let mut session = session_with_mesh();
        let mesh_id = session.mesh_id("interface").unwrap();
        session.set_mesh_vertex(mesh_id, [0.0, 0.0, 0.0]).unwrap();
        session.initialize().unwrap();

        assert!(matches!(session.set_mesh_vertex(mesh_id, [1.0, 0.0, 0.0]), Err(CouplingError::Usage(_))));

        session.reset_mesh(mesh_id).unwrap();
        assert!(session.set_mesh_vertex(mesh_id, [1.0, 0.0, 0.0]).is_ok());
    }

    #[test]
    fn scalar_write_read_round_trips_and_rejects_vector_arity() {
        let mut session = session_with_mesh();
        let mesh_id = session.mesh_id("interface").unwrap();
        session.set_mesh_vertex(mesh_id, [0.0, 0.0, 0.0]).unwrap();
        let data_id = session.register_data(mesh_id, "temperature", DataKind::Scalar).unwrap();
        let _ = data_id;

        session.write_scalar_data(mesh_id, "temperature", 0, 42.0).unwrap();
        assert_eq!(session.read_scalar_data(mesh_id, "temperature", 0).unwrap(), 42.0);
        assert!(matches!(
            session.write_vector_data(mesh_id, "temperature", 0, &[1.0, 2.0, 3.0]),
            Err(CouplingError::Usage(_))
        ));
    }

    #[test]
    fn advance_before_initialize_is_a_state_error() {
        let mut session = session_with_mesh();
        assert!(matches!(session.advance(1.0), Err(CouplingError::State(_))));
    }

    #[test]
    fn accelerator_field_is_reachable_through_shared_state() {
        let mut session = session_with_mesh();
        session.shared.accelerator = Some(Box::new(ConstantRelaxation::new(0.5)));
        assert!(session.shared.accelerator.is_some());
    }

    #[test]
    fn advance_rejects_a_timestep_disagreement_between_ranks() {
        use crate::group::GroupComm;

        let group = LoopbackCommunicator::group(2);
        let mut comms = group.into_iter();
        let master_group_comm = comms.next().unwrap();
        let worker_group_comm = comms.next().unwrap();

        let worker_thread = std::thread::spawn(move || {
            let group = GroupComm::new(worker_group_comm);
            let (leg, _peer) = LoopbackCommunicator::pair();
            let scheme = CouplingScheme::Serial(SerialCouplingScheme::new(SerialRole::First, M2N::new(leg)));
            let shared = SharedState::new(TimeWindowSize::Fixed(1.0), 5.0, 5, 1);
            let mut session = SessionFacade::new(
                vec!["interface".into()],
                scheme,
                shared,
                MappingDispatcher::new(),
                MappingDispatcher::new(),
            )
            .with_group(group);
            session.initialize().unwrap();
            session.advance(2.0)
        });

        let mut session = session_with_mesh().with_group(GroupComm::new(master_group_comm));
        session.initialize().unwrap();
        let result = session.advance(1.0);
        let worker_result = worker_thread.join().unwrap();

        assert!(matches!(result, Err(CouplingError::Protocol(_))));
        assert!(worker_result.is_ok());
    }
}
