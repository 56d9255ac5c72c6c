//! Two-participant staggered exchange (`spec.md` §4.6).
//!
//! The **first** participant advances, sends its write data to the
//! **second**; the second advances using that data, then sends its own
//! write data back. Implicit mode wraps this in an iteration loop where only
//! the second participant evaluates convergence and broadcasts the decision
//! to the first.

use super::{require_same_timestep, MeshSet, SharedState};
use crate::error::Result;
use crate::m2n::M2N;
use crate::message::Communicator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialRole {
    First,
    Second,
}

pub struct SerialCouplingScheme<C: Communicator> {
    pub role: SerialRole,
    pub m2n: M2N<C>,
}

impl<C: Communicator> SerialCouplingScheme<C> {
    pub fn new(role: SerialRole, m2n: M2N<C>) -> Self {
        Self { role, m2n }
    }

    /// Runs one `advance` call's worth of exchange. Returns whether data was
    /// actually exchanged with the peer this call (only true on the call
    /// that completes a window).
    pub fn advance(&mut self, shared: &mut SharedState, meshes: &mut MeshSet) -> Result<bool> {
        if !shared.is_timestep_complete() {
            return Ok(false);
        }

        if shared.is_implicit() {
            self.advance_implicit(shared, meshes)
        } else {
            self.advance_explicit(shared, meshes)?;
            shared.commit_window(meshes);
            shared.extrapolate(meshes);
            shared.begin_next_window();
            Ok(true)
        }
    }

    /// `spec.md` §4.1 `initializeData`: the one-time initial exchange a
    /// scheme performs when a participant declares initial data, before any
    /// `advance` call. Reuses the same staggered send/receive order as a
    /// normal explicit window.
    pub fn initialize_data(&mut self, shared: &SharedState, meshes: &mut MeshSet) -> Result<bool> {
        self.advance_explicit(shared, meshes)?;
        Ok(true)
    }

    fn advance_explicit(&mut self, shared: &SharedState, meshes: &mut MeshSet) -> Result<()> {
        match self.role {
            SerialRole::First => {
                self.send_all(shared, meshes);
                self.m2n.next_round();
                self.receive_all(shared, meshes);
            }
            SerialRole::Second => {
                self.receive_all(shared, meshes);
                self.m2n.next_round();
                self.send_all(shared, meshes);
            }
        }
        Ok(())
    }

    fn advance_implicit(&mut self, shared: &mut SharedState, meshes: &mut MeshSet) -> Result<bool> {
        loop {
            shared.iteration += 1;
            shared.checkpoint_iteration_start(meshes);
            self.advance_explicit(shared, meshes)?;

            let converged = match self.role {
                SerialRole::Second => {
                    let converged = shared.all_converged(meshes) || shared.iteration >= shared.max_iterations;
                    self.m2n.send_control(vec![converged as u8]);
                    converged
                }
                SerialRole::First => self.m2n.recv_control()[0] != 0,
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

    fn send_all(&self, shared: &SharedState, meshes: &MeshSet) {
        for data in &shared.send_data {
            let mesh = meshes.get(&data.mesh_name).expect("send data must name a known mesh");
            self.m2n.send_data(data.current_values(mesh));
        }
    }

    fn receive_all(&self, shared: &SharedState, meshes: &mut MeshSet) {
        for data in &shared.receive_data {
            let values = self.m2n.receive_data();
            let mesh = meshes.get_mut(&data.mesh_name).expect("receive data must name a known mesh");
            data.current_values_mut(mesh).copy_from_slice(&values);
        }
    }

    pub fn finalize(&mut self) -> Result<()> {
        match self.role {
            SerialRole::First => self.m2n.finalize_as_requester(),
            SerialRole::Second => self.m2n.finalize_as_acceptor(),
        }
        Ok(())
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
        let mut mesh = Mesh::new(1);
        mesh.add_data("v", DataKind::Scalar);
        for _ in values {
            mesh.add_vertex([0.0, 0.0, 0.0]);
        }
        mesh.data_mut("v").unwrap().values_mut().copy_from_slice(values);
        mesh
    }

    #[test]
    fn explicit_serial_round_trips_data_between_first_and_second() {
        let (a, b) = LoopbackCommunicator::pair();

        let mut meshes_first: MeshSet = MeshSet::new();
        meshes_first.insert("m".into(), mesh_with(&[1.0, 2.0, 3.0]));
        let mut shared_first = SharedState::new(TimeWindowSize::Fixed(1.0), 5.0, 5, 1);
        shared_first.send_data.push(CouplingData::new("m", "v", Role::Write, 0));

        let mut meshes_second: MeshSet = MeshSet::new();
        meshes_second.insert("m".into(), mesh_with(&[0.0, 0.0, 0.0]));
        let mut shared_second = SharedState::new(TimeWindowSize::Fixed(1.0), 5.0, 5, 1);
        shared_second.receive_data.push(CouplingData::new("m", "v", Role::Read, 0));

        let first_thread = std::thread::spawn(move || {
            let mut scheme = SerialCouplingScheme::new(SerialRole::First, M2N::new(a));
            shared_first.add_computed_time(1.0);
            scheme.advance(&mut shared_first, &mut meshes_first).unwrap();
            meshes_first
        });

        let mut scheme = SerialCouplingScheme::new(SerialRole::Second, M2N::new(b));
        shared_second.add_computed_time(1.0);
        scheme.advance(&mut shared_second, &mut meshes_second).unwrap();

        first_thread.join().unwrap();
        assert_eq!(meshes_second.get("m").unwrap().data("v").unwrap().values(), &[1.0, 2.0, 3.0]);
    }
}
