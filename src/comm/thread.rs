//! In-process backend: one OS thread per rank.
//!
//! Ranks share nothing but a mailbox with one slot per rank and a barrier.
//! A collective posts into the sender's slot, meets at the barrier, lets
//! readers copy out what they need, and meets at the barrier again before
//! anyone may post the next payload.

use std::any::Any;
use std::ops::Add;
use std::sync::{Arc, Barrier, Mutex, MutexGuard, PoisonError};
use std::thread;

use super::{assemble, sum_parts, Communicator, Element, Varcount, ROOT};
use crate::{Error, Result};

type Slot = Option<Arc<dyn Any + Send + Sync>>;

struct Mailbox {
    barrier: Barrier,
    slots: Mutex<Vec<Slot>>,
}

/// Payload posted by the root of an irregular scatter.
struct VarPayload<T> {
    data: Vec<T>,
    counts: Vec<usize>,
    displs: Vec<usize>,
}

pub struct ThreadComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
}

impl ThreadComm {
    fn slots(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.mailbox
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn post<P: Any + Send + Sync>(&self, payload: P) {
        self.slots()[self.rank] = Some(Arc::new(payload));
    }

    fn read<P: Any + Send + Sync, R>(&self, from: usize, f: impl FnOnce(&P) -> R) -> R {
        let slot = self.slots()[from].clone().unwrap_or_else(|| {
            panic!("collective mismatch: rank {} posted nothing", from)
        });
        let payload = slot.downcast_ref::<P>().unwrap_or_else(|| {
            panic!(
                "collective mismatch: rank {} posted an unexpected payload",
                from
            )
        });
        f(payload)
    }

    /// Second half of every collective: wait until all readers are done,
    /// then drop our own posting so large root buffers do not linger.
    fn finish(&self) {
        self.mailbox.barrier.wait();
        self.slots()[self.rank] = None;
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) {
        self.mailbox.barrier.wait();
    }

    fn broadcast<T: Element>(&self, buf: &mut [T]) {
        if self.is_root() {
            self.post(buf.to_vec());
        }
        self.mailbox.barrier.wait();
        if !self.is_root() {
            self.read(ROOT, |data: &Vec<T>| buf.copy_from_slice(data));
        }
        self.finish();
    }

    fn scatter<T: Element>(&self, send: Option<&[T]>, recv: &mut [T]) {
        if self.is_root() {
            let send = send.unwrap_or_else(|| panic!("scatter root has no send buffer"));
            assert_eq!(send.len(), recv.len() * self.size);
            self.post(send.to_vec());
        }
        self.mailbox.barrier.wait();
        let chunk = recv.len();
        let start = self.rank * chunk;
        self.read(ROOT, |data: &Vec<T>| {
            recv.copy_from_slice(&data[start..start + chunk])
        });
        self.finish();
    }

    fn scatterv<T: Element>(&self, send: Option<Varcount<'_, T>>, recv: &mut [T]) {
        if self.is_root() {
            let send = send.unwrap_or_else(|| panic!("scatterv root has no send buffer"));
            assert_eq!(send.counts.len(), self.size);
            self.post(VarPayload {
                data: send.data.to_vec(),
                counts: send.counts.to_vec(),
                displs: send.displs.to_vec(),
            });
        }
        self.mailbox.barrier.wait();
        self.read(ROOT, |payload: &VarPayload<T>| {
            let part = Varcount::new(&payload.data, &payload.counts, &payload.displs)
                .part(self.rank);
            assert_eq!(
                part.len(),
                recv.len(),
                "rank {} receive buffer does not match its count",
                self.rank
            );
            recv.copy_from_slice(part);
        });
        self.finish();
    }

    fn all_gather<T: Element>(&self, local: &[T]) -> Vec<T> {
        self.post(local.to_vec());
        self.mailbox.barrier.wait();
        let parts: Vec<Vec<T>> = (0..self.size)
            .map(|rank| self.read(rank, |part: &Vec<T>| part.clone()))
            .collect();
        self.finish();
        assemble(&parts)
    }

    fn reduce_sum<T: Element + Add<Output = T>>(&self, local: &[T]) -> Option<Vec<T>> {
        self.post(local.to_vec());
        self.mailbox.barrier.wait();
        let reduced = if self.is_root() {
            let parts: Vec<Vec<T>> = (0..self.size)
                .map(|rank| self.read(rank, |part: &Vec<T>| part.clone()))
                .collect();
            Some(sum_parts(&parts))
        } else {
            None
        };
        self.finish();
        reduced
    }
}

/// A fixed group of `size` ranks, each running on its own thread.
pub struct ThreadGroup {
    size: usize,
}

impl ThreadGroup {
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "a worker group needs at least one rank");
        Self { size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Runs `f` once per rank and returns the results in rank order. Returns
    /// once every rank has finished.
    pub fn run<F, R>(&self, f: F) -> Result<Vec<R>>
    where
        F: Fn(ThreadComm) -> R + Sync,
        R: Send,
    {
        let mailbox = Arc::new(Mailbox {
            barrier: Barrier::new(self.size),
            slots: Mutex::new(vec![None; self.size]),
        });

        thread::scope(|s| {
            let handles: Vec<_> = (0..self.size)
                .map(|rank| {
                    let comm = ThreadComm {
                        rank,
                        size: self.size,
                        mailbox: Arc::clone(&mailbox),
                    };
                    let f = &f;
                    s.spawn(move || f(comm))
                })
                .collect();

            handles
                .into_iter()
                .enumerate()
                .map(|(rank, handle)| handle.join().map_err(|_| Error::WorkerPanicked(rank)))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_rank_group() {
        let out = ThreadGroup::new(1)
            .run(|comm| {
                let mut buf = [7.0];
                comm.broadcast(&mut buf);
                comm.all_gather(&buf)
            })
            .unwrap();
        assert_eq!(out, vec![vec![7.0]]);
    }

    #[test]
    fn broadcast_reaches_every_rank() {
        let out = ThreadGroup::new(4)
            .run(|comm| {
                let mut buf = if comm.is_root() { [1.5, 2.5] } else { [0.0; 2] };
                comm.broadcast(&mut buf);
                buf
            })
            .unwrap();
        assert!(out.iter().all(|buf| *buf == [1.5, 2.5]));
    }

    #[test]
    fn scatter_deals_equal_chunks() {
        let out = ThreadGroup::new(3)
            .run(|comm| {
                let send: Vec<usize> = (0..6).collect();
                let mut recv = [0usize; 2];
                let send = comm.is_root().then_some(send.as_slice());
                comm.scatter(send, &mut recv);
                recv
            })
            .unwrap();
        assert_eq!(out, vec![[0, 1], [2, 3], [4, 5]]);
    }

    #[test]
    fn scatterv_after_count_scatter() {
        let out = ThreadGroup::new(3)
            .run(|comm| {
                let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
                let counts = [3, 0, 3];
                let displs = [0, 3, 3];

                let mut count = [0usize];
                comm.scatter(comm.is_root().then_some(&counts[..]), &mut count);
                let mut recv = vec![0.0; count[0]];
                let send = comm
                    .is_root()
                    .then(|| Varcount::new(&data[..], &counts, &displs));
                comm.scatterv(send, &mut recv);
                recv
            })
            .unwrap();
        assert_eq!(out, vec![vec![1.0, 2.0, 3.0], vec![], vec![4.0, 5.0, 6.0]]);
    }

    #[test]
    fn all_gather_is_identical_everywhere() {
        let out = ThreadGroup::new(4)
            .run(|comm| {
                let local = [comm.rank() as f64, 10.0 + comm.rank() as f64];
                comm.all_gather(&local)
            })
            .unwrap();
        let expected = vec![0.0, 10.0, 1.0, 11.0, 2.0, 12.0, 3.0, 13.0];
        assert!(out.iter().all(|v| *v == expected));
    }

    #[test]
    fn repeated_collectives_do_not_mix() {
        let out = ThreadGroup::new(3)
            .run(|comm| {
                let mut x = vec![1.0; 3];
                for _ in 0..50 {
                    let local = [x[comm.rank()] + comm.rank() as f64];
                    x = comm.all_gather(&local);
                }
                x
            })
            .unwrap();
        assert!(out.iter().all(|x| *x == vec![1.0, 51.0, 101.0]));
    }

    #[test]
    fn reduce_sum_lands_on_root() {
        let out = ThreadGroup::new(4)
            .run(|comm| comm.reduce_sum(&[1_i64, comm.rank() as i64]))
            .unwrap();
        assert_eq!(out[0], Some(vec![4, 6]));
        assert!(out[1..].iter().all(Option::is_none));
    }
}
