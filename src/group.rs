//! Master↔slave intra-participant broadcast/gather (`spec.md` §2, §4.5).
//!
//! `GroupComm` wraps a [`Communicator`] shared by every rank of one
//! participant and exposes the two typed operations the rest of the
//! runtime needs from it: broadcasting a scalar decided by the master
//! (timestep size, convergence flag) and gathering one scalar per rank at
//! the master (each rank's computed `Δt`, for the sync check in
//! `spec.md` §4.1 step 1).

use crate::message::Communicator;

pub struct GroupComm<C: Communicator> {
    comm: C,
}

impl<C: Communicator> GroupComm<C> {
    pub fn new(comm: C) -> Self {
        Self { comm }
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn size(&self) -> usize {
        self.comm.size()
    }

    pub fn is_master(&self) -> bool {
        self.comm.is_master()
    }

    /// Broadcasts an `f64` from the master to every rank (including
    /// itself). Only the master needs to supply `Some(value)`.
    pub fn broadcast_f64(&self, value: Option<f64>) -> f64 {
        let bytes = self.comm.broadcast(value.map(|v| v.to_le_bytes().to_vec()));
        f64::from_le_bytes(bytes.try_into().expect("broadcast f64 payload must be 8 bytes"))
    }

    pub fn broadcast_bool(&self, value: Option<bool>) -> bool {
        self.broadcast_f64(value.map(|v| if v { 1.0 } else { 0.0 })) != 0.0
    }

    /// Every rank contributes one `f64`; the master gets back all of them
    /// indexed by rank. Non-master ranks get an empty vector back.
    pub fn gather_f64(&self, value: f64) -> Vec<f64> {
        self.comm
            .gather(value.to_le_bytes().to_vec())
            .into_iter()
            .map(|bytes| {
                if bytes.is_empty() {
                    f64::NAN
                } else {
                    f64::from_le_bytes(bytes.try_into().expect("gathered f64 payload must be 8 bytes"))
                }
            })
            .collect()
    }

    pub fn next_round(&mut self) {
        self.comm.next_time_stamp();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::LoopbackCommunicator;

    #[test]
    fn broadcast_f64_reaches_every_rank() {
        let group = LoopbackCommunicator::group(3);
        let handles: Vec<_> = group
            .into_iter()
            .enumerate()
            .map(|(rank, comm)| {
                std::thread::spawn(move || {
                    let group_comm = GroupComm::new(comm);
                    let value = if rank == 0 { Some(0.5) } else { None };
                    group_comm.broadcast_f64(value)
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 0.5);
        }
    }

    #[test]
    fn gather_f64_collects_one_value_per_rank_at_master() {
        let group = LoopbackCommunicator::group(3);
        let handles: Vec<_> = group
            .into_iter()
            .enumerate()
            .map(|(rank, comm)| {
                std::thread::spawn(move || {
                    let group_comm = GroupComm::new(comm);
                    let gathered = group_comm.gather_f64(rank as f64);
                    (rank, gathered)
                })
            })
            .collect();
        for h in handles {
            let (rank, gathered) = h.join().unwrap();
            if rank == 0 {
                assert_eq!(gathered, vec![0.0, 1.0, 2.0]);
            } else {
                assert!(gathered.is_empty());
            }
        }
    }
}
