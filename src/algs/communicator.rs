//! Thin façade over serial, intra-process (threads) or inter-process (MPI)
//! message passing.
//!
//! Messages are *contiguous byte slices*. Every call blocks the calling rank
//! until it completes; collectives complete only once every rank of the
//! communicator has entered them. There are no timeouts: a rank that never
//! reaches a collective hangs the others, exactly as MPI would.

use crate::sensei_error::SenseiError;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;

/// Blocking communication interface used by partitioners, analyses and the
/// in-transit exchange.
pub trait Communicator {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    fn barrier(&self) -> Result<(), SenseiError>;

    /// Replace `buf` on every rank with the root's contents.
    fn broadcast_bytes(&self, buf: &mut Vec<u8>, root: usize) -> Result<(), SenseiError>;

    /// Every rank's `local`, indexed by rank.
    fn all_gather_bytes(&self, local: &[u8]) -> Result<Vec<Vec<u8>>, SenseiError>;

    /// Personalised exchange: `sends[p]` goes to rank `p`; the result holds
    /// what each rank sent here, indexed by source rank.
    fn all_to_all_bytes(&self, sends: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>, SenseiError>;

    fn all_reduce_min(&self, x: f64) -> Result<f64, SenseiError>;
    fn all_reduce_max(&self, x: f64) -> Result<f64, SenseiError>;

    /// Element-wise sum across ranks, in place.
    fn all_reduce_sum_u64(&self, v: &mut [u64]) -> Result<(), SenseiError>;

    fn send(&self, peer: usize, tag: u32, buf: &[u8]) -> Result<(), SenseiError>;
    fn recv(&self, peer: usize, tag: u32) -> Result<Vec<u8>, SenseiError>;
}

fn check_peer(size: usize, peer: usize) -> Result<(), SenseiError> {
    if peer >= size {
        return Err(SenseiError::CommunicationFailure(format!(
            "peer {peer} outside communicator of size {size}"
        )));
    }
    Ok(())
}

fn check_sends(size: usize, sends: &[Vec<u8>]) -> Result<(), SenseiError> {
    if sends.len() != size {
        return Err(SenseiError::CommunicationFailure(format!(
            "all-to-all needs {size} send buffers, got {}",
            sends.len()
        )));
    }
    Ok(())
}

/// Single-rank communicator for serial runs and unit tests.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn barrier(&self) -> Result<(), SenseiError> {
        Ok(())
    }
    fn broadcast_bytes(&self, _buf: &mut Vec<u8>, root: usize) -> Result<(), SenseiError> {
        check_peer(1, root)
    }
    fn all_gather_bytes(&self, local: &[u8]) -> Result<Vec<Vec<u8>>, SenseiError> {
        Ok(vec![local.to_vec()])
    }
    fn all_to_all_bytes(&self, sends: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>, SenseiError> {
        check_sends(1, &sends)?;
        Ok(sends)
    }
    fn all_reduce_min(&self, x: f64) -> Result<f64, SenseiError> {
        Ok(x)
    }
    fn all_reduce_max(&self, x: f64) -> Result<f64, SenseiError> {
        Ok(x)
    }
    fn all_reduce_sum_u64(&self, _v: &mut [u64]) -> Result<(), SenseiError> {
        Ok(())
    }
    fn send(&self, _peer: usize, _tag: u32, _buf: &[u8]) -> Result<(), SenseiError> {
        Err(SenseiError::CommunicationFailure(
            "NoComm has no peers to send to".into(),
        ))
    }
    fn recv(&self, _peer: usize, _tag: u32) -> Result<Vec<u8>, SenseiError> {
        Err(SenseiError::CommunicationFailure(
            "NoComm has no peers to receive from".into(),
        ))
    }
}

// --- LocalComm: N ranks on threads of one process ---
type Key = (usize, usize, u32); // (src, dst, tag)

// Collectives run over point-to-point with tags user code cannot reach.
const TAG_BCAST: u32 = 0xFFFF_0001;
const TAG_GATHER: u32 = 0xFFFF_0002;
const TAG_ALLTOALL: u32 = 0xFFFF_0003;
/// Largest tag available to callers of [`Communicator::send`].
pub const MAX_USER_TAG: u32 = 0xFFFF_0000;

struct Mailbox {
    size: usize,
    slots: DashMap<Key, VecDeque<Bytes>>,
    lock: Mutex<()>,
    arrived: Condvar,
}

/// In-process communicator: each rank runs on its own thread and shares a
/// FIFO mailbox per `(src, dst, tag)`.
///
/// Create a whole universe at once with [`LocalComm::universe`] and move one
/// handle into each thread.
#[derive(Clone)]
pub struct LocalComm {
    rank: usize,
    mailbox: Arc<Mailbox>,
}

impl std::fmt::Debug for LocalComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalComm")
            .field("rank", &self.rank)
            .field("size", &self.mailbox.size)
            .finish()
    }
}

impl LocalComm {
    /// One communicator per rank, all sharing a fresh mailbox.
    pub fn universe(size: usize) -> Vec<LocalComm> {
        let mailbox = Arc::new(Mailbox {
            size,
            slots: DashMap::new(),
            lock: Mutex::new(()),
            arrived: Condvar::new(),
        });
        (0..size)
            .map(|rank| LocalComm {
                rank,
                mailbox: mailbox.clone(),
            })
            .collect()
    }

    fn post(&self, peer: usize, tag: u32, buf: Bytes) -> Result<(), SenseiError> {
        check_peer(self.mailbox.size, peer)?;
        let _guard = self.mailbox.lock.lock();
        self.mailbox
            .slots
            .entry((self.rank, peer, tag))
            .or_default()
            .push_back(buf);
        self.mailbox.arrived.notify_all();
        Ok(())
    }

    fn take(&self, peer: usize, tag: u32) -> Result<Bytes, SenseiError> {
        check_peer(self.mailbox.size, peer)?;
        let key = (peer, self.rank, tag);
        let mut guard = self.mailbox.lock.lock();
        loop {
            if let Some(msg) = self
                .mailbox
                .slots
                .get_mut(&key)
                .and_then(|mut q| q.pop_front())
            {
                return Ok(msg);
            }
            self.mailbox.arrived.wait(&mut guard);
        }
    }

    fn gather_all(&self, local: &[u8], tag: u32) -> Result<Vec<Bytes>, SenseiError> {
        let payload = Bytes::copy_from_slice(local);
        for peer in 0..self.size() {
            if peer != self.rank {
                self.post(peer, tag, payload.clone())?;
            }
        }
        (0..self.size())
            .map(|peer| {
                if peer == self.rank {
                    Ok(payload.clone())
                } else {
                    self.take(peer, tag)
                }
            })
            .collect()
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.mailbox.size
    }

    fn barrier(&self) -> Result<(), SenseiError> {
        self.gather_all(&[], TAG_GATHER).map(|_| ())
    }

    fn broadcast_bytes(&self, buf: &mut Vec<u8>, root: usize) -> Result<(), SenseiError> {
        check_peer(self.size(), root)?;
        if self.rank == root {
            let payload = Bytes::copy_from_slice(buf);
            for peer in (0..self.size()).filter(|&p| p != root) {
                self.post(peer, TAG_BCAST, payload.clone())?;
            }
        } else {
            *buf = self.take(root, TAG_BCAST)?.to_vec();
        }
        Ok(())
    }

    fn all_gather_bytes(&self, local: &[u8]) -> Result<Vec<Vec<u8>>, SenseiError> {
        Ok(self
            .gather_all(local, TAG_GATHER)?
            .into_iter()
            .map(|b| b.to_vec())
            .collect())
    }

    fn all_to_all_bytes(&self, mut sends: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>, SenseiError> {
        check_sends(self.size(), &sends)?;
        let mine = std::mem::take(&mut sends[self.rank]);
        for (peer, buf) in sends.into_iter().enumerate() {
            if peer != self.rank {
                self.post(peer, TAG_ALLTOALL, Bytes::from(buf))?;
            }
        }
        let mut out = Vec::with_capacity(self.size());
        for peer in 0..self.size() {
            if peer == self.rank {
                out.push(mine.clone());
            } else {
                out.push(self.take(peer, TAG_ALLTOALL)?.to_vec());
            }
        }
        Ok(out)
    }

    fn all_reduce_min(&self, x: f64) -> Result<f64, SenseiError> {
        let all = self.gather_all(&x.to_le_bytes(), TAG_GATHER)?;
        decode_f64s(&all).map(|v| v.into_iter().fold(f64::INFINITY, f64::min))
    }

    fn all_reduce_max(&self, x: f64) -> Result<f64, SenseiError> {
        let all = self.gather_all(&x.to_le_bytes(), TAG_GATHER)?;
        decode_f64s(&all).map(|v| v.into_iter().fold(f64::NEG_INFINITY, f64::max))
    }

    fn all_reduce_sum_u64(&self, v: &mut [u64]) -> Result<(), SenseiError> {
        let local: Vec<u8> = v.iter().flat_map(|x| x.to_le_bytes()).collect();
        let all = self.gather_all(&local, TAG_GATHER)?;
        v.iter_mut().for_each(|x| *x = 0);
        for buf in &all {
            if buf.len() != local.len() {
                return Err(SenseiError::CommunicationFailure(format!(
                    "sum reduction length mismatch: {} vs {} bytes",
                    buf.len(),
                    local.len()
                )));
            }
            for (x, c) in v.iter_mut().zip(buf.chunks_exact(8)) {
                let mut w = [0u8; 8];
                w.copy_from_slice(c);
                *x += u64::from_le_bytes(w);
            }
        }
        Ok(())
    }

    fn send(&self, peer: usize, tag: u32, buf: &[u8]) -> Result<(), SenseiError> {
        if tag > MAX_USER_TAG {
            return Err(SenseiError::CommunicationFailure(format!(
                "tag {tag:#x} is reserved"
            )));
        }
        self.post(peer, tag, Bytes::copy_from_slice(buf))
    }

    fn recv(&self, peer: usize, tag: u32) -> Result<Vec<u8>, SenseiError> {
        Ok(self.take(peer, tag)?.to_vec())
    }
}

fn decode_f64s(all: &[Bytes]) -> Result<Vec<f64>, SenseiError> {
    all.iter()
        .map(|b| {
            let w: [u8; 8] = b.as_ref().try_into().map_err(|_| {
                SenseiError::CommunicationFailure(format!("expected 8 bytes, got {}", b.len()))
            })?;
            Ok(f64::from_le_bytes(w))
        })
        .collect()
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::collective::SystemOperation;
    use mpi::datatype::{Partition, PartitionMut};
    use mpi::environment::Universe;
    use mpi::topology::{Color, SimpleCommunicator};
    use mpi::traits::*;
    use mpi::Count;

    /// Communicator over an MPI (sub-)communicator.
    pub struct MpiComm {
        // keeps MPI initialised for as long as the world communicator lives
        _universe: Option<Arc<Universe>>,
        pub world: SimpleCommunicator,
        rank: usize,
        size: usize,
    }

    impl MpiComm {
        /// Initialise MPI and wrap `MPI_COMM_WORLD`.
        pub fn init() -> Result<Self, SenseiError> {
            let universe = mpi::initialize().ok_or_else(|| {
                SenseiError::CommunicationFailure("MPI is already initialised".into())
            })?;
            let world = universe.world();
            Ok(Self::wrap(Some(Arc::new(universe)), world))
        }

        /// Wrap a communicator created elsewhere (MPI must stay initialised).
        pub fn from_communicator(world: SimpleCommunicator) -> Self {
            Self::wrap(None, world)
        }

        fn wrap(universe: Option<Arc<Universe>>, world: SimpleCommunicator) -> Self {
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Self {
                _universe: universe,
                world,
                rank,
                size,
            }
        }

        /// Split into disjoint groups (e.g. simulation vs analysis ranks).
        pub fn split(&self, color: i32) -> Option<MpiComm> {
            let sub = self.world.split_by_color(Color::with_value(color))?;
            Some(MpiComm {
                _universe: self._universe.clone(),
                ..Self::from_communicator(sub)
            })
        }

        fn displacements(counts: &[Count]) -> Vec<Count> {
            counts
                .iter()
                .scan(0, |acc, &c| {
                    let d = *acc;
                    *acc += c;
                    Some(d)
                })
                .collect()
        }
    }

    impl Communicator for MpiComm {
        fn rank(&self) -> usize {
            self.rank
        }
        fn size(&self) -> usize {
            self.size
        }

        fn barrier(&self) -> Result<(), SenseiError> {
            self.world.barrier();
            Ok(())
        }

        fn broadcast_bytes(&self, buf: &mut Vec<u8>, root: usize) -> Result<(), SenseiError> {
            check_peer(self.size, root)?;
            let root_proc = self.world.process_at_rank(root as i32);
            let mut len = buf.len() as u64;
            root_proc.broadcast_into(&mut len);
            buf.resize(len as usize, 0);
            if len > 0 {
                root_proc.broadcast_into(&mut buf[..]);
            }
            Ok(())
        }

        fn all_gather_bytes(&self, local: &[u8]) -> Result<Vec<Vec<u8>>, SenseiError> {
            let mut counts = vec![0 as Count; self.size];
            self.world
                .all_gather_into(&(local.len() as Count), &mut counts[..]);
            let displs = Self::displacements(&counts);
            let total: Count = counts.iter().sum();
            let mut flat = vec![0u8; total as usize];
            {
                let mut part = PartitionMut::new(&mut flat[..], &counts[..], &displs[..]);
                self.world.all_gather_varcount_into(local, &mut part);
            }
            Ok(counts
                .iter()
                .zip(&displs)
                .map(|(&c, &d)| flat[d as usize..(d + c) as usize].to_vec())
                .collect())
        }

        fn all_to_all_bytes(&self, sends: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>, SenseiError> {
            check_sends(self.size, &sends)?;
            let send_counts: Vec<Count> = sends.iter().map(|b| b.len() as Count).collect();
            let mut recv_counts = vec![0 as Count; self.size];
            self.world
                .all_to_all_into(&send_counts[..], &mut recv_counts[..]);
            let send_displs = Self::displacements(&send_counts);
            let recv_displs = Self::displacements(&recv_counts);
            let flat_send: Vec<u8> = sends.concat();
            let mut flat_recv = vec![0u8; recv_counts.iter().sum::<Count>() as usize];
            {
                let send = Partition::new(&flat_send[..], &send_counts[..], &send_displs[..]);
                let mut recv =
                    PartitionMut::new(&mut flat_recv[..], &recv_counts[..], &recv_displs[..]);
                self.world.all_to_all_varcount_into(&send, &mut recv);
            }
            Ok(recv_counts
                .iter()
                .zip(&recv_displs)
                .map(|(&c, &d)| flat_recv[d as usize..(d + c) as usize].to_vec())
                .collect())
        }

        fn all_reduce_min(&self, x: f64) -> Result<f64, SenseiError> {
            let mut y = x;
            self.world
                .all_reduce_into(&x, &mut y, SystemOperation::min());
            Ok(y)
        }

        fn all_reduce_max(&self, x: f64) -> Result<f64, SenseiError> {
            let mut y = x;
            self.world
                .all_reduce_into(&x, &mut y, SystemOperation::max());
            Ok(y)
        }

        fn all_reduce_sum_u64(&self, v: &mut [u64]) -> Result<(), SenseiError> {
            let local = v.to_vec();
            self.world
                .all_reduce_into(&local[..], v, SystemOperation::sum());
            Ok(())
        }

        fn send(&self, peer: usize, tag: u32, buf: &[u8]) -> Result<(), SenseiError> {
            check_peer(self.size, peer)?;
            self.world
                .process_at_rank(peer as i32)
                .send_with_tag(buf, tag as i32);
            Ok(())
        }

        fn recv(&self, peer: usize, tag: u32) -> Result<Vec<u8>, SenseiError> {
            check_peer(self.size, peer)?;
            let (msg, _status) = self
                .world
                .process_at_rank(peer as i32)
                .receive_vec_with_tag::<u8>(tag as i32);
            Ok(msg)
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    /// Run `f` on every rank of a fresh local universe and collect results.
    fn on_ranks<T, F>(n: usize, f: F) -> Vec<T>
    where
        T: Send + 'static,
        F: Fn(LocalComm) -> T + Send + Sync + Clone + 'static,
    {
        let handles: Vec<_> = LocalComm::universe(n)
            .into_iter()
            .map(|c| {
                let f = f.clone();
                thread::spawn(move || f(c))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    #[test]
    fn local_send_recv_fifo() {
        let out = on_ranks(2, |c| {
            if c.rank() == 0 {
                for i in 0..5u8 {
                    c.send(1, 7, &[i]).unwrap();
                }
                Vec::new()
            } else {
                (0..5).map(|_| c.recv(0, 7).unwrap()[0]).collect::<Vec<_>>()
            }
        });
        assert_eq!(out[1], vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn local_collectives_agree() {
        let out = on_ranks(3, |c| {
            let r = c.rank() as f64;
            let lo = c.all_reduce_min(r + 1.0).unwrap();
            let hi = c.all_reduce_max(r + 1.0).unwrap();
            let mut counts = [c.rank() as u64, 1];
            c.all_reduce_sum_u64(&mut counts).unwrap();
            let mut buf = if c.rank() == 2 { b"cfg".to_vec() } else { Vec::new() };
            c.broadcast_bytes(&mut buf, 2).unwrap();
            (lo, hi, counts, buf)
        });
        for (lo, hi, counts, buf) in out {
            assert_eq!((lo, hi), (1.0, 3.0));
            assert_eq!(counts, [3, 3]);
            assert_eq!(buf, b"cfg");
        }
    }

    #[test]
    fn local_all_to_all_routes_by_rank() {
        let out = on_ranks(3, |c| {
            let sends = (0..3).map(|p| vec![c.rank() as u8, p as u8]).collect();
            c.all_to_all_bytes(sends).unwrap()
        });
        for (me, got) in out.iter().enumerate() {
            for (src, buf) in got.iter().enumerate() {
                assert_eq!(buf, &vec![src as u8, me as u8]);
            }
        }
    }

    #[test]
    fn no_comm_is_identity() {
        let c = NoComm;
        assert_eq!(c.all_reduce_max(4.5).unwrap(), 4.5);
        assert_eq!(c.all_gather_bytes(&[1, 2]).unwrap(), vec![vec![1, 2]]);
        assert!(c.all_to_all_bytes(vec![vec![], vec![]]).is_err());
        assert!(c.send(0, 1, &[]).is_err());
    }

    #[cfg(feature = "mpi-support")]
    #[test]
    fn mpi_max_matches_size() {
        let comm = MpiComm::init().unwrap();
        let hi = comm.all_reduce_max(comm.rank() as f64).unwrap();
        assert_eq!(hi as usize, comm.size() - 1);
    }
}
