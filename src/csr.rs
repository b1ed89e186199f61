//! Compressed sparse row storage: conversion from the coordinator's dense
//! matrix and the re-based per-worker slice.

use serde::{Deserialize, Serialize};

use crate::{Matrix, SprsCsr, Vector};

/// Row-major CSR matrix. Only entries that are exactly `0.0` are dropped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CsrMatrix {
    num_rows: usize,
    num_cols: usize,
    row_offsets: Vec<usize>,
    col_indices: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Two passes over `dense`: the first counts non-zeros so the value and
    /// column buffers are allocated exactly once at their final size, the
    /// second fills them in row-major order.
    pub fn from_dense(dense: &Matrix) -> Self {
        let (num_rows, num_cols) = dense.dim();
        let nnz = dense.iter().filter(|val| **val != 0.0).count();

        let mut values = Vec::with_capacity(nnz);
        let mut col_indices = Vec::with_capacity(nnz);
        let mut row_offsets = Vec::with_capacity(num_rows + 1);
        row_offsets.push(0);

        for row in dense.rows() {
            for (j, val) in row.iter().enumerate() {
                if *val != 0.0 {
                    values.push(*val);
                    col_indices.push(j);
                }
            }
            row_offsets.push(values.len());
        }
        debug_assert_eq!(values.len(), nnz);

        Self {
            num_rows,
            num_cols,
            row_offsets,
            col_indices,
            values,
        }
    }

    /// Zero-filled dense reconstruction.
    pub fn to_dense(&self) -> Matrix {
        let mut dense = Matrix::zeros((self.num_rows, self.num_cols));
        for i in 0..self.num_rows {
            let range = self.row_offsets[i]..self.row_offsets[i + 1];
            for (j, val) in self.col_indices[range.clone()]
                .iter()
                .zip(&self.values[range])
            {
                dense[[i, *j]] = *val;
            }
        }
        dense
    }

    /// Same structure as a `sprs` matrix, used for sequential reference
    /// products.
    pub fn to_sprs(&self) -> SprsCsr {
        SprsCsr::new(
            (self.num_rows, self.num_cols),
            self.row_offsets.clone(),
            self.col_indices.clone(),
            self.values.clone(),
        )
    }

    pub fn rows(&self) -> usize {
        self.num_rows
    }

    pub fn cols(&self) -> usize {
        self.num_cols
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn row_offsets(&self) -> &[usize] {
        &self.row_offsets
    }

    pub fn col_indices(&self) -> &[usize] {
        &self.col_indices
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Sequential product through `sprs`, one row at a time.
pub fn reference_spmv(a: &SprsCsr, b: &Vector) -> Vector {
    assert!(a.is_csr());
    assert_eq!(a.cols(), b.len());
    a.outer_iterator()
        .map(|row| row.iter().map(|(j, val)| b[j] * val).sum::<f64>())
        .collect()
}

/// A worker's rows of the global matrix with offsets in local numbering.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalSlice {
    row_offsets: Vec<usize>,
    col_indices: Vec<usize>,
    values: Vec<f64>,
}

impl LocalSlice {
    /// Builds the slice from what the distributor delivered.
    ///
    /// `received_offsets` holds the global offsets of the worker's first
    /// `local_rows` rows. The first entry is subtracted from all of them and
    /// the closing sentinel is set to `nnz`, the worker's own received
    /// non-zero count, rather than taken from the next worker's offset.
    pub fn from_received(
        values: Vec<f64>,
        col_indices: Vec<usize>,
        received_offsets: Vec<usize>,
        nnz: usize,
    ) -> Self {
        assert_eq!(values.len(), nnz);
        assert_eq!(col_indices.len(), nnz);

        let mut row_offsets = received_offsets;
        if let Some(&start) = row_offsets.first() {
            row_offsets.iter_mut().for_each(|offset| *offset -= start);
        }
        row_offsets.push(nnz);

        Self {
            row_offsets,
            col_indices,
            values,
        }
    }

    pub fn local_rows(&self) -> usize {
        self.row_offsets.len() - 1
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn row_offsets(&self) -> &[usize] {
        &self.row_offsets
    }

    /// Entries of local row `i` as `(column, value)` pairs.
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.row_offsets[i]..self.row_offsets[i + 1];
        self.col_indices[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }
}
