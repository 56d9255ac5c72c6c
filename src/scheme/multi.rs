//! Controller/peer exchange across more than two participants (`spec.md` §4.8).
//!
//! One controller participant holds one M2N leg per peer; always implicit.
//! Each iteration, the controller visits its peers in a fixed order,
//! sending that peer's slice of send-data and then receiving its slice of
//! receive-data. All receive buffers are merged into a single logical
//! residual so one (typically quasi-Newton) accelerator sees the whole
//! coupled system at once.
//!
//! Peers run the ordinary serial/parallel scheme on their own side; from a
//! peer's point of view the controller is indistinguishable from a regular
//! two-participant partner, so no `PeerCouplingScheme` type is needed here.
//!
//! All participants are assumed to share one global coordinate frame — this
//! implementation does not support per-participant geometric partition
//! offsets (an explicitly dropped feature; see `DESIGN.md`).

use super::{MeshSet, SharedState};
use crate::coupling_data::CouplingData;
use crate::error::Result;
use crate::m2n::M2N;
use crate::message::Communicator;

/// One peer's slice of the controller's send/receive data, identified by
/// index ranges into `SharedState::send_data`/`receive_data`.
pub struct PeerChannel<C: Communicator> {
    pub m2n: M2N<C>,
    pub send_indices: Vec<usize>,
    pub receive_indices: Vec<usize>,
}

pub struct MultiCouplingScheme<C: Communicator> {
    pub peers: Vec<PeerChannel<C>>,
}

impl<C: Communicator> MultiCouplingScheme<C> {
    pub fn new(peers: Vec<PeerChannel<C>>) -> Self {
        Self { peers }
    }

    pub fn advance(&mut self, shared: &mut SharedState, meshes: &mut MeshSet) -> Result<bool> {
        if !shared.is_timestep_complete() {
            return Ok(false);
        }

        loop {
            shared.iteration += 1;
            shared.checkpoint_iteration_start(meshes);

            for peer in &mut self.peers {
                send_slice(&peer.m2n, &peer.send_indices, &shared.send_data, meshes);
                receive_slice(&peer.m2n, &peer.receive_indices, &shared.receive_data, meshes);
            }

            let converged = shared.all_converged(meshes) || shared.iteration >= shared.max_iterations;
            for peer in &mut self.peers {
                peer.m2n.send_control(vec![converged as u8]);
                peer.m2n.next_round();
            }

            if converged {
                shared.commit_window(meshes);
                shared.extrapolate(meshes);
                shared.begin_next_window();
                return Ok(true);
            }

            shared.accelerate(meshes);
        }
    }

    /// `spec.md` §4.1 `initializeData`: the one-time initial exchange a
    /// scheme performs when a participant declares initial data, before any
    /// `advance` call. A single round with every peer, fixed order, no
    /// convergence control byte — this is not an iteration.
    pub fn initialize_data(&mut self, shared: &SharedState, meshes: &mut MeshSet) -> Result<bool> {
        for peer in &mut self.peers {
            send_slice(&peer.m2n, &peer.send_indices, &shared.send_data, meshes);
            receive_slice(&peer.m2n, &peer.receive_indices, &shared.receive_data, meshes);
            peer.m2n.next_round();
        }
        Ok(true)
    }

    pub fn finalize(&mut self) -> Result<()> {
        for peer in &self.peers {
            peer.m2n.finalize_as_requester()?;
        }
        Ok(())
    }
}

fn send_slice<C: Communicator>(m2n: &M2N<C>, indices: &[usize], send_data: &[CouplingData], meshes: &MeshSet) {
    for &index in indices {
        let data = &send_data[index];
        let mesh = meshes.get(&data.mesh_name).expect("send data must name a known mesh");
        m2n.send_data(data.current_values(mesh));
    }
}

fn receive_slice<C: Communicator>(
    m2n: &M2N<C>,
    indices: &[usize],
    receive_data: &[CouplingData],
    meshes: &mut MeshSet,
) {
    for &index in indices {
        let values = m2n.receive_data();
        let data = &receive_data[index];
        let mesh = meshes.get_mut(&data.mesh_name).expect("receive data must name a known mesh");
        data.current_values_mut(mesh).copy_from_slice(&values);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupling_data::Role;
    use crate::message::LoopbackCommunicator;
    use crate::mesh::{DataKind, Mesh};
    use crate::scheme::{ConvergenceMeasure, TimeWindowSize};

    fn mesh_with(value: f64) -> Mesh {
        let mut mesh = Mesh::new(1);
        mesh.add_data("v", DataKind::Scalar);
        mesh.add_vertex([0.0, 0.0, 0.0]);
        mesh.data_mut("v").unwrap().values_mut()[0] = value;
        mesh
    }

    #[test]
    fn controller_exchanges_with_each_peer_in_order() {
        let (controller_leg, peer_leg) = LoopbackCommunicator::pair();

        let mut controller_meshes: MeshSet = MeshSet::new();
        controller_meshes.insert("m".into(), mesh_with(5.0));
        let mut shared = SharedState::new(TimeWindowSize::Fixed(1.0), 5.0, 5, 2);
        shared.send_data.push(CouplingData::new("m", "v", Role::Write, 0));
        shared.receive_data.push(CouplingData::new("m", "v", Role::Read, 0));
        shared.convergence_measures.push(ConvergenceMeasure { data_index: 0, relative_tolerance: 1e-6 });

        let peer_thread = std::thread::spawn(move || {
            // A stand-in peer that echoes back whatever it's sent, and plays
            // along with the controller's convergence decision.
            let mut peer_mesh = mesh_with(0.0);
            let values = peer_leg.recv();
            peer_mesh.data_mut("v").unwrap().values_mut().copy_from_slice(&f64_vec_from_bytes(&values));
            peer_leg.send(0, values);
        });

        let peer = PeerChannel { m2n: M2N::new(controller_leg), send_indices: vec![0], receive_indices: vec![0] };
        let mut scheme = MultiCouplingScheme::new(vec![peer]);
        shared.add_computed_time(1.0);
        let exchanged = scheme.advance(&mut shared, &mut controller_meshes).unwrap();
        peer_thread.join().unwrap();

        assert!(exchanged);
        assert_eq!(controller_meshes.get("m").unwrap().data("v").unwrap().values(), &[5.0]);
    }

    fn f64_vec_from_bytes(bytes: &[u8]) -> Vec<f64> {
        use crate::coder::Coder;
        crate::coder::DataArrayCoder.decode(bytes)
    }
}
