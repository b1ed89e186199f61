use std::ops::Range;

use serde::Serialize;

use crate::csr::CsrMatrix;

/// Per-worker slices of the flat CSR arrays when rows are dealt out in
/// equal contiguous blocks. Non-zero counts per worker are whatever the rows
/// happen to hold; no rebalancing is attempted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PartitionPlan {
    rows_per_worker: usize,
    send_counts: Vec<usize>,
    displacements: Vec<usize>,
}

impl PartitionPlan {
    /// Reads the plan off `mat.row_offsets()` at every block boundary.
    /// Rows must divide evenly by `workers`; the benchmark checks this
    /// before getting here.
    pub fn new(mat: &CsrMatrix, workers: usize) -> Self {
        assert!(workers > 0);
        assert_eq!(
            mat.rows() % workers,
            0,
            "{} rows cannot be split over {} workers",
            mat.rows(),
            workers
        );
        let rows_per_worker = mat.rows() / workers;
        let offsets = mat.row_offsets();

        let (send_counts, displacements): (Vec<usize>, Vec<usize>) = (0..workers)
            .map(|w| {
                let start = offsets[w * rows_per_worker];
                let end = offsets[(w + 1) * rows_per_worker];
                (end - start, start)
            })
            .unzip();

        let plan = Self {
            rows_per_worker,
            send_counts,
            displacements,
        };
        debug!(
            "partition over {} workers: nnz per worker min {} max {}",
            workers,
            plan.send_counts.iter().min().unwrap_or(&0),
            plan.send_counts.iter().max().unwrap_or(&0)
        );
        plan
    }

    pub fn workers(&self) -> usize {
        self.send_counts.len()
    }

    pub fn rows_per_worker(&self) -> usize {
        self.rows_per_worker
    }

    pub fn send_counts(&self) -> &[usize] {
        &self.send_counts
    }

    pub fn displacements(&self) -> &[usize] {
        &self.displacements
    }

    /// Global rows owned by `worker`.
    pub fn row_range(&self, worker: usize) -> Range<usize> {
        worker * self.rows_per_worker..(worker + 1) * self.rows_per_worker
    }

    pub fn total_nnz(&self) -> usize {
        self.send_counts.iter().sum()
    }
}
