// MPI backend (rsmpi), one process per rank under `mpirun`.

use std::ops::Add;

use mpi::collective::SystemOperation;
use mpi::datatype::Partition;
use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::{Communicator as _, CommunicatorCollectives, Root};
use mpi::Count;

use super::{Communicator, Element, Varcount, ROOT};

pub struct MpiComm {
    world: SimpleCommunicator,
    rank: usize,
    size: usize,
    // finalizes MPI when dropped, so it must outlive `world`
    _universe: Universe,
}

impl MpiComm {
    /// `None` if MPI was already initialized in this process.
    pub fn init() -> Option<Self> {
        let universe = mpi::initialize()?;
        let world = universe.world();
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        Some(Self {
            world,
            rank,
            size,
            _universe: universe,
        })
    }
}

fn to_counts(values: &[usize]) -> Vec<Count> {
    values.iter().map(|v| *v as Count).collect()
}

impl Communicator for MpiComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) {
        self.world.barrier();
    }

    fn broadcast<T: Element>(&self, buf: &mut [T]) {
        self.world
            .process_at_rank(ROOT as i32)
            .broadcast_into(buf);
    }

    fn scatter<T: Element>(&self, send: Option<&[T]>, recv: &mut [T]) {
        let root = self.world.process_at_rank(ROOT as i32);
        if self.is_root() {
            let send = send.unwrap_or_else(|| panic!("scatter root has no send buffer"));
            root.scatter_into_root(send, recv);
        } else {
            root.scatter_into(recv);
        }
    }

    fn scatterv<T: Element>(&self, send: Option<Varcount<'_, T>>, recv: &mut [T]) {
        let root = self.world.process_at_rank(ROOT as i32);
        if self.is_root() {
            let send = send.unwrap_or_else(|| panic!("scatterv root has no send buffer"));
            let partition = Partition::new(send.data, to_counts(send.counts), to_counts(send.displs));
            root.scatter_varcount_into_root(&partition, recv);
        } else {
            root.scatter_varcount_into(recv);
        }
    }

    fn all_gather<T: Element>(&self, local: &[T]) -> Vec<T> {
        let mut out = vec![T::default(); local.len() * self.size];
        self.world.all_gather_into(local, &mut out[..]);
        out
    }

    fn reduce_sum<T: Element + Add<Output = T>>(&self, local: &[T]) -> Option<Vec<T>> {
        let root = self.world.process_at_rank(ROOT as i32);
        if self.is_root() {
            let mut out = vec![T::default(); local.len()];
            root.reduce_into_root(local, &mut out[..], SystemOperation::sum());
            Some(out)
        } else {
            root.reduce_into(local, SystemOperation::sum());
            None
        }
    }
}
