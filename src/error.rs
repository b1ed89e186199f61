//! Error types for the benchmark.

use thiserror::Error;

/// Result type alias using the crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to the operator. Collective mismatches are not in here:
/// they hang the group rather than fail.
#[derive(Error, Debug)]
pub enum Error {
    /// Rows cannot be split evenly over the group.
    #[error("matrix size n={n} is not divisible by P={workers}")]
    NotDivisible {
        /// Matrix dimension
        n: usize,
        /// Group size
        workers: usize,
    },

    #[error("matrix dimension must be positive")]
    EmptyMatrix,

    #[error("sparsity {0} is outside [0, 1]")]
    InvalidSparsity(f64),

    /// Coordinator matrix does not match the configured dimension.
    #[error("expected {expected} x {expected} input, got {got:?}")]
    DimensionMismatch {
        /// Configured n
        expected: usize,
        /// Shape that was supplied
        got: (usize, usize),
    },

    #[error("coordinator started without input")]
    MissingInput,

    /// Coordinator's starting vector does not match the configured dimension.
    #[error("expected a starting vector of length {expected}, got {got}")]
    VectorLengthMismatch { expected: usize, got: usize },

    /// Reported by non-coordinating workers when the coordinator rejected
    /// the run.
    #[error("run aborted by the coordinator")]
    GroupAborted,

    #[error("worker {0} panicked")]
    WorkerPanicked(usize),

    #[error("this binary was built without the `mpi` feature")]
    MpiUnavailable,

    #[error("MPI was already initialized")]
    MpiInit,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
