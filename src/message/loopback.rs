//! An in-process [`Communicator`] backed by `mpsc` channels.
//!
//! Useful for running several ranks of a participant, or both ends of an
//! inter-participant [`crate::m2n::M2N`] link, inside a single test process
//! without opening real sockets. Message delivery order and the time-stamp
//! filtering match [`super::tcp::TcpCommunicator`] exactly, so code written
//! against one transport behaves identically against the other.

use super::comm::Communicator;
use std::cell::RefCell;
use std::sync::mpsc;

type Sender = mpsc::Sender<(Vec<u8>, usize)>;
type Receiver = mpsc::Receiver<(Vec<u8>, usize)>;

pub struct LoopbackCommunicator {
    rank: usize,
    senders: Vec<Sender>,
    receiver: Receiver,
    undelivered: RefCell<Vec<(Vec<u8>, usize)>>,
    time_stamp: usize,
}

impl LoopbackCommunicator {
    /// Builds a fully-connected group of `size` loopback communicators, one
    /// per rank, rank 0 being the master.
    pub fn group(size: usize) -> Vec<Self> {
        let (senders, receivers): (Vec<Sender>, Vec<Receiver>) =
            (0..size).map(|_| mpsc::channel()).unzip();

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, receiver)| Self {
                rank,
                senders: senders.clone(),
                receiver,
                undelivered: RefCell::new(Vec::new()),
                time_stamp: 0,
            })
            .collect()
    }

    /// Builds the two endpoints of a point-to-point link, as used by an
    /// [`crate::m2n::M2N`] master or per-vertex channel.
    pub fn pair() -> (Self, Self) {
        let mut group = Self::group(2);
        let b = group.pop().unwrap();
        let a = group.pop().unwrap();
        (a, b)
    }
}

impl Communicator for LoopbackCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.senders.len()
    }

    fn send(&self, rank: usize, message: Vec<u8>) {
        self.senders[rank].send((message, self.time_stamp)).unwrap()
    }

    fn recv(&self) -> Vec<u8> {
        let mut undelivered = self.undelivered.borrow_mut();
        match undelivered.iter().position(|(_, tag)| tag == &self.time_stamp) {
            Some(index) => undelivered.remove(index).0,
            None => loop {
                let (message, tag) = self.receiver.recv().unwrap();
                if tag != self.time_stamp {
                    undelivered.push((message, tag))
                } else {
                    return message;
                }
            },
        }
    }

    fn next_time_stamp(&mut self) {
        self.time_stamp += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_round_trips_a_message() {
        let (a, b) = LoopbackCommunicator::pair();
        a.send(1, b"hello".to_vec());
        assert_eq!(b.recv(), b"hello".to_vec());
    }

    #[test]
    fn time_stamps_separate_rounds() {
        let (mut a, mut b) = LoopbackCommunicator::pair();
        a.send(1, b"round0".to_vec());
        a.next_time_stamp();
        a.send(1, b"round1".to_vec());

        // b reads round1 first (queued behind round0), should still get
        // round0 first because it asks for time stamp 0.
        assert_eq!(b.recv(), b"round0".to_vec());
        b.next_time_stamp();
        assert_eq!(b.recv(), b"round1".to_vec());
    }

    #[test]
    fn broadcast_reaches_every_rank() {
        let group = LoopbackCommunicator::group(3);
        let handles: Vec<_> = group
            .into_iter()
            .enumerate()
            .map(|(rank, comm)| {
                std::thread::spawn(move || {
                    let payload = if rank == 0 { Some(b"all".to_vec()) } else { None };
                    comm.broadcast(payload)
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), b"all".to_vec());
        }
    }
}
