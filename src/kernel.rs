//! The multiply-and-refresh loop shared by the sparse and dense runs.
//!
//! Each iteration computes this worker's rows of `A x` and then swaps in
//! the full product, assembled from every worker's rows by the all-gather,
//! as the next `x`. Rows are computed in parallel; each row is summed
//! sequentially so every worker's result is reproducible bit for bit.

use rayon::prelude::*;
use strum_macros::Display;

use crate::comm::Communicator;
use crate::csr::LocalSlice;
use crate::{Matrix, Vector};

/// A worker's block of rows of the global operator.
pub trait LocalOperator: Sync {
    fn local_rows(&self) -> usize;

    /// Inner product of local row `i` with the full vector `x`.
    fn row_dot(&self, i: usize, x: &Vector) -> f64;

    /// This worker's rows of `A x`.
    fn partial_product(&self, x: &Vector) -> Vec<f64> {
        (0..self.local_rows())
            .into_par_iter()
            .map(|i| self.row_dot(i, x))
            .collect()
    }
}

impl LocalOperator for LocalSlice {
    fn local_rows(&self) -> usize {
        LocalSlice::local_rows(self)
    }

    fn row_dot(&self, i: usize, x: &Vector) -> f64 {
        self.row(i).map(|(j, val)| val * x[j]).sum()
    }
}

/// Dense row block. Zeros are multiplied like any other entry.
impl LocalOperator for Matrix {
    fn local_rows(&self) -> usize {
        self.nrows()
    }

    fn row_dot(&self, i: usize, x: &Vector) -> f64 {
        assert_eq!(self.ncols(), x.len());
        self.row(i).iter().zip(x.iter()).map(|(a, b)| a * b).sum()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum KernelState {
    Idle,
    Computing,
    Synchronizing,
}

pub struct Kernel<'a, C, O> {
    comm: &'a C,
    op: &'a O,
    state: KernelState,
}

impl<'a, C: Communicator, O: LocalOperator> Kernel<'a, C, O> {
    pub fn new(comm: &'a C, op: &'a O) -> Self {
        Self {
            comm,
            op,
            state: KernelState::Idle,
        }
    }

    pub fn state(&self) -> KernelState {
        self.state
    }

    fn enter(&mut self, state: KernelState) {
        trace!("rank {}: {} -> {}", self.comm.rank(), self.state, state);
        self.state = state;
    }

    /// One collective iteration: consumes `x`, returns the assembled `A x`.
    pub fn step(&mut self, x: Vector) -> Vector {
        self.enter(KernelState::Computing);
        let partial = self.op.partial_product(&x);
        drop(x);

        self.enter(KernelState::Synchronizing);
        let next = Vector::from(self.comm.all_gather(&partial));

        self.enter(KernelState::Idle);
        next
    }

    /// Runs `iterations` steps. With zero iterations `x` comes back as is
    /// and no collective is issued.
    pub fn run(&mut self, mut x: Vector, iterations: usize) -> Vector {
        for _ in 0..iterations {
            x = self.step(x);
        }
        x
    }
}

/// Collective. Convenience for `Kernel::new(comm, op).run(x, iterations)`.
pub fn iterate<C: Communicator, O: LocalOperator>(
    comm: &C,
    op: &O,
    x: Vector,
    iterations: usize,
) -> Vector {
    Kernel::new(comm, op).run(x, iterations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::ThreadGroup;
    use crate::csr::CsrMatrix;
    use crate::generate::{generate_dense, initial_vector};
    use approx::assert_abs_diff_eq;
    use ndarray::{array, s};

    fn local_block(dense: &Matrix, rank: usize, rows: usize) -> Matrix {
        dense.slice(s![rank * rows..(rank + 1) * rows, ..]).to_owned()
    }

    fn local_slice(dense: &Matrix, rank: usize, rows: usize) -> LocalSlice {
        let block = CsrMatrix::from_dense(&local_block(dense, rank, rows));
        LocalSlice::from_received(
            block.values().to_vec(),
            block.col_indices().to_vec(),
            block.row_offsets()[..rows].to_vec(),
            block.nnz(),
        )
    }

    #[test]
    fn sparse_and_dense_rows_agree() {
        let dense = array![[0.0, 2.0, 0.0], [1.0, 0.0, 3.0]];
        let csr = CsrMatrix::from_dense(&dense);
        let slice = LocalSlice::from_received(
            csr.values().to_vec(),
            csr.col_indices().to_vec(),
            csr.row_offsets()[..2].to_vec(),
            csr.nnz(),
        );
        let x = array![1.0, 2.0, 3.0];

        assert_eq!(slice.partial_product(&x), vec![4.0, 10.0]);
        assert_eq!(dense.partial_product(&x), vec![4.0, 10.0]);
    }

    #[test]
    fn one_iteration_is_matrix_vector_product() {
        let n = 8;
        let workers = 2;
        let rows = n / workers;
        let dense = generate_dense(n, 0.5, 21);
        let expected = dense.dot(&initial_vector(n));

        let out = ThreadGroup::new(workers)
            .run(|comm| {
                let op = local_slice(&dense, comm.rank(), rows);
                iterate(&comm, &op, initial_vector(n), 1)
            })
            .unwrap();

        for x in out {
            assert_abs_diff_eq!(x, expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn repeated_iterations_match_sequential_powers() {
        let n = 6;
        let workers = 3;
        let rows = n / workers;
        let dense = generate_dense(n, 0.6, 4);
        let mut expected = initial_vector(n);
        for _ in 0..4 {
            expected = dense.dot(&expected);
        }

        let out = ThreadGroup::new(workers)
            .run(|comm| {
                let sparse = local_slice(&dense, comm.rank(), rows);
                let block = local_block(&dense, comm.rank(), rows);
                let a = iterate(&comm, &sparse, initial_vector(n), 4);
                let b = iterate(&comm, &block, initial_vector(n), 4);
                (a, b)
            })
            .unwrap();

        for (a, b) in &out {
            assert_abs_diff_eq!(*a, expected, epsilon = 1e-6);
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
        }
        // replicas are bit-identical
        assert!(out.iter().all(|(a, _)| *a == out[0].0));
    }

    #[test]
    fn zero_iterations_leave_vector_alone() {
        let dense = generate_dense(4, 0.0, 8);
        let out = ThreadGroup::new(2)
            .run(|comm| {
                let op = local_block(&dense, comm.rank(), 2);
                let mut kernel = Kernel::new(&comm, &op);
                let x = kernel.run(array![1.0, -2.0, 3.0, -4.0], 0);
                (x, kernel.state())
            })
            .unwrap();
        for (x, state) in out {
            assert_eq!(x, array![1.0, -2.0, 3.0, -4.0]);
            assert_eq!(state, KernelState::Idle);
        }
    }

    #[test]
    fn identity_is_a_fixed_point() {
        let n = 4;
        let dense = Matrix::eye(n);
        let x0 = array![3.0, 1.0, 4.0, 1.5];
        let out = ThreadGroup::new(4)
            .run(|comm| {
                let op = local_slice(&dense, comm.rank(), 1);
                iterate(&comm, &op, x0.clone(), 7)
            })
            .unwrap();
        assert!(out.iter().all(|x| *x == x0));
    }
}
