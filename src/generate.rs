//! Seeded test data for the coordinator.

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{Matrix, Vector};

pub const DEFAULT_SEED: u64 = 42;

/// Dense `n x n` matrix where each entry is zero with probability
/// `sparsity` and otherwise an integer in `[1, 10]`.
///
/// Entries are drawn in row-major order: one uniform draw decides whether
/// the entry is kept, and a second draw picking the value happens only for
/// kept entries. The same seed always yields the same matrix.
pub fn generate_dense(n: usize, sparsity: f64, seed: u64) -> Matrix {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut dense = Matrix::zeros((n, n));
    for val in dense.iter_mut() {
        let r: f64 = rng.gen();
        if r > sparsity {
            *val = rng.gen_range(1..=10) as f64;
        }
    }
    dense
}

/// The all-ones starting vector.
pub fn initial_vector(n: usize) -> Vector {
    Vector::ones(n)
}

/// Two coefficient vectors of length `len` with entries in `[1, 10]`,
/// drawn interleaved (`a[0], b[0], a[1], ...`).
pub fn generate_polynomials(len: usize, seed: u64) -> (Array1<i64>, Array1<i64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut a = Array1::zeros(len);
    let mut b = Array1::zeros(len);
    for i in 0..len {
        a[i] = rng.gen_range(1..=10);
        b[i] = rng.gen_range(1..=10);
    }
    (a, b)
}
