//! Two-participant symmetric (Jacobi-style) exchange (`spec.md` §4.7).
//!
//! Both participants send their write data, then both receive, in the same
//! call. Implicit mode has both sides evaluate convergence on their
//! receive-side data; one designated participant is the convergence
//! authority and broadcasts the decision to the other.

use super::{MeshSet, SharedState};
use crate::error::Result;
use crate::m2n::M2N;
use crate::message::Communicator;

pub struct ParallelCouplingScheme<C: Communicator> {
    pub m2n: M2N<C>,
    pub is_convergence_authority: bool,
}

impl<C: Communicator> ParallelCouplingScheme<C> {
    pub fn new(m2n: M2N<C>, is_convergence_authority: bool) -> Self {
        Self { m2n, is_convergence_authority }
    }

    pub fn advance(&mut self, shared: &mut SharedState, meshes: &mut MeshSet) -> Result<bool> {
        if !shared.is_timestep_complete() {
            return Ok(false);
        }

        if shared.is_implicit() {
            self.advance_implicit(shared, meshes)
        } else {
            self.exchange(shared, meshes);
            shared.commit_window(meshes);
            shared.extrapolate(meshes);
            shared.begin_next_window();
            Ok(true)
        }
    }

    /// `spec.md` §4.1 `initializeData`: the one-time initial exchange a
    /// scheme performs when a participant declares initial data, before any
    /// `advance` call. Reuses the same symmetric send/receive as a normal
    /// explicit window.
    pub fn initialize_data(&mut self, shared: &SharedState, meshes: &mut MeshSet) -> Result<bool> {
        self.exchange(shared, meshes);
        Ok(true)
    }

    fn exchange(&mut self, shared: &SharedState, meshes: &mut MeshSet) {
        for data in &shared.send_data {
            let mesh = meshes.get(&data.mesh_name).expect("send data must name a known mesh");
            self.m2n.send_data(data.current_values(mesh));
        }
        for data in &shared.receive_data {
            let values = self.m2n.receive_data();
            let mesh = meshes.get_mut(&data.mesh_name).expect("receive data must name a known mesh");
            data.current_values_mut(mesh).copy_from_slice(&values);
        }
        self.m2n.next_round();
    }

    fn advance_implicit(&mut self, shared: &mut SharedState, meshes: &mut MeshSet) -> Result<bool> {
        loop {
            shared.iteration += 1;
            shared.checkpoint_iteration_start(meshes);
            self.exchange(shared, meshes);

            let local_converged = shared.all_converged(meshes);
            let converged = if self.is_convergence_authority {
                let decided = local_converged || shared.iteration >= shared.max_iterations;
                self.m2n.send_control(vec![decided as u8]);
                decided
            } else {
                self.m2n.send_control(vec![local_converged as u8]);
                self.m2n.recv_control()[0] != 0
            };
            self.m2n.next_round();

            if converged {
                shared.commit_window(meshes);
                shared.extrapolate(meshes);
                shared.begin_next_window();
                return Ok(true);
            }

            shared.accelerate(meshes);
        }
    }

    pub fn finalize(&mut self) -> Result<()> {
        if self.is_convergence_authority {
            self.m2n.finalize_as_requester()
        } else {
            self.m2n.finalize_as_acceptor()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupling_data::{CouplingData, Role};
    use crate::message::LoopbackCommunicator;
    use crate::mesh::{DataKind, Mesh};
    use crate::scheme::TimeWindowSize;

    fn mesh_with(values: &[f64]) -> Mesh {
        let mut mesh = Mesh::new(2);
        mesh.add_data("v", DataKind::Scalar);
        for _ in values {
            mesh.add_vertex([0.0, 0.0, 0.0]);
        }
        mesh.data_mut("v").unwrap().values_mut().copy_from_slice(values);
        mesh
    }

    #[test]
    fn explicit_parallel_exchange_is_symmetric() {
        let (a, b) = LoopbackCommunicator::pair();

        let mut meshes_a: MeshSet = MeshSet::new();
        meshes_a.insert("m".into(), mesh_with(&[1.0, 1.0]));
        let mut shared_a = SharedState::new(TimeWindowSize::Fixed(1.0), 5.0, 5, 1);
        shared_a.send_data.push(CouplingData::new("m", "v", Role::Write, 0));
        shared_a.receive_data.push(CouplingData::new("m", "v", Role::Read, 0));

        let mut meshes_b: MeshSet = MeshSet::new();
        meshes_b.insert("m".into(), mesh_with(&[2.0, 2.0]));
        let mut shared_b = SharedState::new(TimeWindowSize::Fixed(1.0), 5.0, 5, 1);
        shared_b.send_data.push(CouplingData::new("m", "v", Role::Write, 0));
        shared_b.receive_data.push(CouplingData::new("m", "v", Role::Read, 0));

        let a_thread = std::thread::spawn(move || {
            let mut scheme = ParallelCouplingScheme::new(M2N::new(a), true);
            shared_a.add_computed_time(1.0);
            scheme.advance(&mut shared_a, &mut meshes_a).unwrap();
            meshes_a
        });

        let mut scheme = ParallelCouplingScheme::new(M2N::new(b), false);
        shared_b.add_computed_time(1.0);
        scheme.advance(&mut shared_b, &mut meshes_b).unwrap();

        let meshes_a = a_thread.join().unwrap();
        assert_eq!(meshes_a.get("m").unwrap().data("v").unwrap().values(), &[2.0, 2.0]);
        assert_eq!(meshes_b.get("m").unwrap().data("v").unwrap().values(), &[1.0, 1.0]);
    }
}
