//! Moves the coordinator's data out to the group.
//!
//! The CSR arrays are split irregularly, so the sparse path runs in two
//! steps: one scatter hands every worker its non-zero count, and only then
//! can workers size the buffers for the variable-count scatters of values
//! and column indices. Row offsets and dense rows split evenly and go out
//! through plain scatters.

use std::borrow::Cow;

use crate::comm::{Communicator, Varcount};
use crate::csr::{CsrMatrix, LocalSlice};
use crate::partition::PartitionPlan;
use crate::{Matrix, Vector};

/// What the coordinator contributes to a sparse distribution.
#[derive(Clone, Copy)]
pub struct SparseSource<'a> {
    pub mat: &'a CsrMatrix,
    pub plan: &'a PartitionPlan,
}

/// Collective. `source` is `Some` on the coordinator only.
pub fn distribute_sparse<C: Communicator>(
    comm: &C,
    source: Option<SparseSource<'_>>,
    rows_per_worker: usize,
) -> LocalSlice {
    let mut nnz = [0usize];
    comm.scatter(source.map(|src| src.plan.send_counts()), &mut nnz);
    let nnz = nnz[0];

    let mut values = vec![0.0; nnz];
    let mut col_indices = vec![0usize; nnz];
    let mut row_offsets = vec![0usize; rows_per_worker];

    comm.scatterv(
        source.map(|src| {
            Varcount::new(
                src.mat.values(),
                src.plan.send_counts(),
                src.plan.displacements(),
            )
        }),
        &mut values,
    );
    comm.scatterv(
        source.map(|src| {
            Varcount::new(
                src.mat.col_indices(),
                src.plan.send_counts(),
                src.plan.displacements(),
            )
        }),
        &mut col_indices,
    );
    // the trailing sentinel stays behind; workers rebuild their own
    comm.scatter(
        source.map(|src| &src.mat.row_offsets()[..src.mat.rows()]),
        &mut row_offsets,
    );

    debug!(
        "rank {} received {} rows with {} non-zeros",
        comm.rank(),
        rows_per_worker,
        nnz
    );
    LocalSlice::from_received(values, col_indices, row_offsets, nnz)
}

/// Collective. Hands every worker `rows_per_worker` consecutive rows of the
/// coordinator's `n x n` matrix.
pub fn distribute_dense<C: Communicator>(
    comm: &C,
    source: Option<&Matrix>,
    rows_per_worker: usize,
    n: usize,
) -> Matrix {
    let mut local = vec![0.0; rows_per_worker * n];
    // any memory order is accepted; rows go out in logical order
    let send: Option<Cow<'_, [f64]>> = source.map(|mat| match mat.as_slice() {
        Some(data) => Cow::Borrowed(data),
        None => Cow::Owned(mat.iter().copied().collect()),
    });
    comm.scatter(send.as_deref(), &mut local);
    Matrix::from_shape_vec((rows_per_worker, n), local).expect("buffer sized to shape")
}

/// Collective. Every worker gets the coordinator's copy of the vector.
pub fn broadcast_vector<C: Communicator>(comm: &C, source: Option<&Vector>, n: usize) -> Vector {
    let mut buf = source.map_or_else(|| vec![0.0; n], |vec| vec.to_vec());
    assert_eq!(buf.len(), n);
    comm.broadcast(&mut buf);
    Vector::from(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::ThreadGroup;
    use crate::generate::{generate_dense, initial_vector};
    use ndarray::s;

    fn dense_rows(dense: &Matrix, rows: std::ops::Range<usize>) -> Matrix {
        dense.slice(s![rows, ..]).to_owned()
    }

    #[test]
    fn sparse_slices_match_row_blocks() {
        let n = 12;
        let workers = 4;
        let dense = generate_dense(n, 0.7, 9);
        let csr = CsrMatrix::from_dense(&dense);
        let plan = PartitionPlan::new(&csr, workers);

        let slices = ThreadGroup::new(workers)
            .run(|comm| {
                let source = comm.is_root().then_some(SparseSource {
                    mat: &csr,
                    plan: &plan,
                });
                distribute_sparse(&comm, source, n / workers)
            })
            .unwrap();

        for (w, slice) in slices.iter().enumerate() {
            let block = CsrMatrix::from_dense(&dense_rows(&dense, plan.row_range(w)));
            assert_eq!(slice.nnz(), plan.send_counts()[w]);
            assert_eq!(slice.row_offsets(), block.row_offsets());
            assert_eq!(slice.row_offsets()[0], 0);
            assert_eq!(slice.row_offsets()[slice.local_rows()], slice.nnz());
            for i in 0..slice.local_rows() {
                let expected: Vec<(usize, f64)> = dense
                    .row(plan.row_range(w).start + i)
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| **v != 0.0)
                    .map(|(j, v)| (j, *v))
                    .collect();
                assert_eq!(slice.row(i).collect::<Vec<_>>(), expected);
            }
        }
    }

    #[test]
    fn worker_with_no_nonzeros() {
        let mut dense = generate_dense(4, 0.0, 1);
        dense.row_mut(2).fill(0.0);
        dense.row_mut(3).fill(0.0);
        let csr = CsrMatrix::from_dense(&dense);
        let plan = PartitionPlan::new(&csr, 2);

        let slices = ThreadGroup::new(2)
            .run(|comm| {
                let source = comm.is_root().then_some(SparseSource {
                    mat: &csr,
                    plan: &plan,
                });
                distribute_sparse(&comm, source, 2)
            })
            .unwrap();

        assert_eq!(slices[1].nnz(), 0);
        assert_eq!(slices[1].row_offsets(), &[0, 0, 0]);
    }

    #[test]
    fn dense_rows_arrive_in_rank_order() {
        let n = 6;
        let dense = generate_dense(n, 0.4, 2);
        let blocks = ThreadGroup::new(3)
            .run(|comm| distribute_dense(&comm, comm.is_root().then_some(&dense), 2, n))
            .unwrap();
        for (w, block) in blocks.iter().enumerate() {
            assert_eq!(*block, dense_rows(&dense, 2 * w..2 * w + 2));
        }
    }

    #[test]
    fn column_major_source_goes_out_by_rows() {
        let n = 4;
        let dense = generate_dense(n, 0.3, 6);
        let transposed = dense.t().to_owned();
        let column_major = transposed.reversed_axes();
        assert!(column_major.as_slice().is_none());

        let blocks = ThreadGroup::new(2)
            .run(|comm| distribute_dense(&comm, comm.is_root().then_some(&column_major), 2, n))
            .unwrap();
        for (w, block) in blocks.iter().enumerate() {
            assert_eq!(*block, dense_rows(&dense, 2 * w..2 * w + 2));
        }
    }

    #[test]
    fn vector_broadcast() {
        let x = initial_vector(5);
        let copies = ThreadGroup::new(5)
            .run(|comm| broadcast_vector(&comm, comm.is_root().then_some(&x), 5))
            .unwrap();
        assert!(copies.iter().all(|copy| *copy == x));
    }
}
