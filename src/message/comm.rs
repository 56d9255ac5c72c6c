//! The minimal intra-participant group communication trait.
//!
//! A [`Communicator`] gives every rank of one participant's process group a
//! way to exchange raw byte messages with any other rank of the same group.
//! Implementors need only provide `rank`, `size`, `send`, `recv`, and
//! `next_time_stamp`; broadcast and gather, which [`crate::group::GroupComm`]
//! builds on, are supplied here as default methods so a new transport (a unit
//! test double, say) gets them for free.

/// Sends and receives raw messages within one participant's rank group.
///
/// Ranks are numbered `0..size()`; rank 0 is always the master. Messages sent
/// to a given rank are delivered in the order they were sent, tagged by the
/// communicator's internal time stamp so that sends belonging to different
/// windows are never confused with each other (see [`Communicator::recv`] in
/// [`super::tcp::TcpCommunicator`]).
pub trait Communicator {
    /// This process's rank within the group.
    fn rank(&self) -> usize;

    /// The number of ranks in the group.
    fn size(&self) -> usize;

    /// Sends a message to the given rank. Non-blocking.
    fn send(&self, rank: usize, message: Vec<u8>);

    /// Blocks until a message tagged with the current time stamp is received
    /// from any rank.
    fn recv(&self) -> Vec<u8>;

    /// Advances the internal time stamp used to tag messages. Must be called
    /// once per completed round so that late-arriving messages from a
    /// previous round are not mistaken for the current one.
    fn next_time_stamp(&mut self);

    /// True if this rank is the master (rank 0) of the group.
    fn is_master(&self) -> bool {
        self.rank() == 0
    }

    /// Master-to-all broadcast of a byte buffer. On the master, `message`
    /// must be `Some`; the same bytes are returned to every rank, including
    /// the master.
    fn broadcast(&self, message: Option<Vec<u8>>) -> Vec<u8> {
        if self.is_master() {
            let message = message.expect("master must supply a broadcast payload");
            for rank in 1..self.size() {
                self.send(rank, message.clone())
            }
            message
        } else {
            self.recv()
        }
    }

    /// All-to-master gather: every non-master rank sends `message` to the
    /// master, which collects them indexed by rank (its own entry is
    /// `message` too). Non-master ranks get back an empty vector.
    fn gather(&self, message: Vec<u8>) -> Vec<Vec<u8>> {
        if self.is_master() {
            let mut gathered = vec![Vec::new(); self.size()];
            gathered[0] = message;
            for _ in 1..self.size() {
                let (rank, payload) = self.recv_tagged_by_rank();
                gathered[rank] = payload;
            }
            gathered
        } else {
            let mut tagged = self.rank().to_le_bytes().to_vec();
            tagged.extend(message);
            self.send(0, tagged);
            Vec::new()
        }
    }

    /// Receives one message and reports which rank it came from. The default
    /// [`Communicator::recv`] does not expose the sender, so implementations
    /// that need `gather` to work must encode the sender's rank as the first
    /// 8 bytes of every message they send to the master. This default does
    /// exactly that; callers that only ever use `broadcast` need not worry
    /// about the convention.
    fn recv_tagged_by_rank(&self) -> (usize, Vec<u8>) {
        let mut bytes = self.recv();
        let tail = bytes.split_off(8);
        let mut rank_bytes = [0u8; 8];
        rank_bytes.copy_from_slice(&bytes);
        (usize::from_le_bytes(rank_bytes), tail)
    }
}
