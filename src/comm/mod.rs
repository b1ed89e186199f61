//! Collective operations over a fixed group of workers.
//!
//! Every call here is collective: all ranks must issue the same calls in the
//! same order, and each call blocks until the whole group has arrived.
//! Nothing detects a rank that skips or reorders a call; the group simply
//! stops making progress.

use std::ops::Add;

mod thread;
pub use thread::{ThreadComm, ThreadGroup};

#[cfg(feature = "mpi")]
mod mpi_backend;
#[cfg(feature = "mpi")]
pub use mpi_backend::MpiComm;

/// Rank of the coordinator, the single source of every scatter and
/// broadcast.
pub const ROOT: usize = 0;

/// Plain values that can travel through a collective.
#[cfg(not(feature = "mpi"))]
pub trait Element: Copy + Default + Send + Sync + 'static {}

/// Plain values that can travel through a collective.
#[cfg(feature = "mpi")]
pub trait Element:
    Copy + Default + Send + Sync + 'static + mpi::datatype::Equivalence
{
}

impl Element for f64 {}
impl Element for usize {}
impl Element for i64 {}

/// Source side of an irregular scatter: rank `r` receives
/// `data[displs[r]..displs[r] + counts[r]]`.
#[derive(Clone, Copy, Debug)]
pub struct Varcount<'a, T> {
    pub data: &'a [T],
    pub counts: &'a [usize],
    pub displs: &'a [usize],
}

impl<'a, T> Varcount<'a, T> {
    pub fn new(data: &'a [T], counts: &'a [usize], displs: &'a [usize]) -> Self {
        assert_eq!(counts.len(), displs.len());
        assert!(counts
            .iter()
            .zip(displs)
            .all(|(count, displ)| displ + count <= data.len()));
        Self {
            data,
            counts,
            displs,
        }
    }

    pub fn part(&self, rank: usize) -> &'a [T] {
        let start = self.displs[rank];
        &self.data[start..start + self.counts[rank]]
    }
}

pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn is_root(&self) -> bool {
        self.rank() == ROOT
    }

    fn barrier(&self);

    /// Overwrites `buf` on every rank with the root's `buf`.
    fn broadcast<T: Element>(&self, buf: &mut [T]);

    /// Regular scatter: rank `r` receives `send[r * n..(r + 1) * n]` where
    /// `n = recv.len()`. `send` is only read on the root and may be `None`
    /// elsewhere.
    fn scatter<T: Element>(&self, send: Option<&[T]>, recv: &mut [T]);

    /// Irregular scatter. `recv.len()` must equal the count the root holds
    /// for this rank, so callers distribute the counts first.
    fn scatterv<T: Element>(&self, send: Option<Varcount<'_, T>>, recv: &mut [T]);

    /// Full exchange: every rank contributes `local` (same length on every
    /// rank) and receives all contributions concatenated in rank order.
    fn all_gather<T: Element>(&self, local: &[T]) -> Vec<T>;

    /// Element-wise sum of every rank's `local`, delivered to the root only.
    fn reduce_sum<T: Element + Add<Output = T>>(&self, local: &[T]) -> Option<Vec<T>>;
}

/// Concatenates per-rank parts in rank order. This is the whole effect of
/// the full exchange on the assembled vector.
pub fn assemble<T: Copy, P: AsRef<[T]>>(parts: &[P]) -> Vec<T> {
    let len = parts.iter().map(|part| part.as_ref().len()).sum();
    let mut out = Vec::with_capacity(len);
    for part in parts {
        out.extend_from_slice(part.as_ref());
    }
    out
}

/// Element-wise sum of equally sized parts.
pub fn sum_parts<T: Copy + Default + Add<Output = T>, P: AsRef<[T]>>(parts: &[P]) -> Vec<T> {
    let len = parts.first().map_or(0, |part| part.as_ref().len());
    let mut out = vec![T::default(); len];
    for part in parts {
        let part = part.as_ref();
        assert_eq!(part.len(), len, "reduce over parts of different length");
        out.iter_mut().zip(part).for_each(|(acc, val)| *acc = *acc + *val);
    }
    out
}
