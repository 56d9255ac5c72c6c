//! Distributed inter-participant channel: one master channel plus per-vertex
//! slave channels, created over a [`Mesh`] (`spec.md` §2, §4.3).
//!
//! Each leg (the master-to-master link, and one link per local rank that
//! owns vertices of the shared mesh) is a two-rank [`Communicator`]: rank 0
//! is always this end, rank 1 the remote peer. `M2N` does not interpret
//! mesh or data contents itself; it is a thin sequencing wrapper around
//! [`crate::coder::Coder`] encode/decode calls over those links, matching
//! the wire format `spec.md` §6 specifies.

use crate::coder::{Coder, DataArrayCoder, MeshGeometryCoder};
use crate::error::{CouplingError, Result};
use crate::mesh::Mesh;
use crate::message::Communicator;

/// One inter-participant channel bundle: the master-to-master link plus
/// zero or more per-(local-rank) slave links, established once partitioning
/// has decided which ranks own which vertices.
pub struct M2N<C: Communicator> {
    master: C,
    slaves: Vec<C>,
}

impl<C: Communicator> M2N<C> {
    pub fn new(master: C) -> Self {
        Self { master, slaves: Vec::new() }
    }

    pub fn add_slave_channel(&mut self, channel: C) {
        self.slaves.push(channel);
    }

    pub fn slave_count(&self) -> usize {
        self.slaves.len()
    }

    /// The master-to-master leg, for callers (scheme variants) that need to
    /// exchange control scalars like a convergence flag directly rather
    /// than through [`M2N::send_data`]'s data-array framing.
    pub fn master(&self) -> &C {
        &self.master
    }

    /// The rank of the peer on the other end of the master-to-master leg.
    /// A master-to-master leg is always a two-rank group, so this is simply
    /// "the rank that isn't us" — using a literal `1` instead would send a
    /// message to ourselves whenever we happen to be rank 1 of the pair.
    fn remote_rank(&self) -> usize {
        1 - self.master.rank()
    }

    /// Sends a control payload (a convergence flag, a handshake byte) to the
    /// peer on the master-to-master leg. Scheme variants use this instead of
    /// reaching into [`M2N::master`] directly so they don't have to repeat
    /// the rank-1-isn't-always-the-peer arithmetic themselves.
    pub fn send_control(&self, message: Vec<u8>) {
        self.master.send(self.remote_rank(), message)
    }

    pub fn recv_control(&self) -> Vec<u8> {
        self.master.recv()
    }

    /// Sends an entire mesh (vertices, edges, faces, ownership) over the
    /// master channel, as the provided side of a [`crate::partition::Partition`]
    /// does during `communicate()`.
    pub fn send_mesh(&self, mesh: &Mesh) {
        let coder = MeshGeometryCoder::new(mesh.dimensions());
        self.master.send(self.remote_rank(), coder.encode(mesh));
    }

    pub fn receive_mesh(&self, dimensions: usize) -> Mesh {
        let coder = MeshGeometryCoder::new(dimensions);
        coder.decode(&self.master.recv())
    }

    /// Sends a data array over the master channel.
    pub fn send_data(&self, values: &[f64]) {
        let coder = DataArrayCoder;
        self.master.send(self.remote_rank(), coder.encode(&values.to_vec()));
    }

    pub fn receive_data(&self) -> Vec<f64> {
        let coder = DataArrayCoder;
        coder.decode(&self.master.recv())
    }

    /// Advances the round marker on every leg of this M2N, so a
    /// previous-window message in flight is never mistaken for the current
    /// one. Must be called once per completed exchange.
    pub fn next_round(&mut self) {
        self.master.next_time_stamp();
        for slave in &mut self.slaves {
            slave.next_time_stamp();
        }
    }

    /// Drains the channel with a ping/pong handshake before finalize
    /// closes it (`spec.md` §4.1's `finalize`): the requester sends "ping"
    /// first and waits for "pong"; the acceptor does the inverse. This
    /// keeps neither side from closing a socket while its peer still has
    /// bytes in flight.
    ///
    /// A peer that dies mid-handshake (`spec.md` §8 scenario 6) must be
    /// reported as a transport error here, not just in debug builds, so
    /// this checks the exchanged bytes rather than asserting them.
    pub fn finalize_as_requester(&self) -> Result<()> {
        self.send_control(b"ping".to_vec());
        let reply = self.recv_control();
        if reply != b"pong".to_vec() {
            return Err(CouplingError::Transport("finalize handshake peer did not reply with pong".into()));
        }
        Ok(())
    }

    pub fn finalize_as_acceptor(&self) -> Result<()> {
        let request = self.recv_control();
        if request != b"ping".to_vec() {
            return Err(CouplingError::Transport("finalize handshake did not begin with ping".into()));
        }
        self.send_control(b"pong".to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::LoopbackCommunicator;
    use crate::mesh::DataKind;

    #[test]
    fn mesh_round_trips_over_master_channel() {
        let (a, b) = LoopbackCommunicator::pair();
        let provider = M2N::new(a);
        let consumer = M2N::new(b);

        let mut mesh = Mesh::new(2);
        mesh.add_vertex([0.0, 0.0, 0.0]);
        mesh.add_vertex([1.0, 1.0, 0.0]);
        mesh.add_data("x", DataKind::Scalar);

        provider.send_mesh(&mesh);
        let received = consumer.receive_mesh(2);
        assert_eq!(received.vertex_count(), 2);
    }

    #[test]
    fn data_round_trips_over_master_channel() {
        let (a, b) = LoopbackCommunicator::pair();
        let sender = M2N::new(a);
        let receiver = M2N::new(b);

        sender.send_data(&[1.0, 2.0, 3.0]);
        assert_eq!(receiver.receive_data(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn finalize_handshake_completes_on_both_sides() {
        let (a, b) = LoopbackCommunicator::pair();
        let requester = M2N::new(a);
        let acceptor = M2N::new(b);

        let t1 = std::thread::spawn(move || requester.finalize_as_requester());
        acceptor.finalize_as_acceptor().unwrap();
        t1.join().unwrap().unwrap();
    }
}
