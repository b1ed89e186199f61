//! The per-worker benchmark routine.
//!
//! Every rank runs [`run_benchmark`] and issues the same collectives in the
//! same order. Work only the coordinator does (converting, partitioning,
//! holding the global matrix) lives in [`Coordinator`], which exists on
//! rank 0 only and is handed to the collectives as their source.

use serde::Serialize;

use crate::comm::Communicator;
use crate::csr::{reference_spmv, CsrMatrix};
use crate::distribute::{broadcast_vector, distribute_dense, distribute_sparse, SparseSource};
use crate::generate::{generate_dense, initial_vector, DEFAULT_SEED};
use crate::kernel::iterate;
use crate::partition::PartitionPlan;
use crate::timer::{timed, timed_local, Phase, PhaseTimings};
use crate::{Error, Matrix, Result, Vector};

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BenchConfig {
    pub n: usize,
    pub sparsity: f64,
    pub iterations: usize,
    pub seed: u64,
}

impl BenchConfig {
    pub fn new(n: usize, sparsity: f64, iterations: usize) -> Self {
        Self {
            n,
            sparsity,
            iterations,
            seed: DEFAULT_SEED,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self, workers: usize) -> Result<()> {
        if self.n == 0 {
            return Err(Error::EmptyMatrix);
        }
        if !(0.0..=1.0).contains(&self.sparsity) {
            return Err(Error::InvalidSparsity(self.sparsity));
        }
        if self.n % workers != 0 {
            return Err(Error::NotDivisible {
                n: self.n,
                workers,
            });
        }
        Ok(())
    }

    /// The seeded matrix and the all-ones vector.
    pub fn generate(&self) -> BenchInput {
        BenchInput {
            matrix: generate_dense(self.n, self.sparsity, self.seed),
            x: initial_vector(self.n),
        }
    }
}

/// Coordinator-only input data.
#[derive(Clone, Debug)]
pub struct BenchInput {
    pub matrix: Matrix,
    pub x: Vector,
}

impl BenchInput {
    fn check(&self, n: usize) -> Result<()> {
        let shape = self.matrix.dim();
        if shape != (n, n) {
            return Err(Error::DimensionMismatch {
                expected: n,
                got: shape,
            });
        }
        if self.x.len() != n {
            return Err(Error::VectorLengthMismatch {
                expected: n,
                got: self.x.len(),
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct BenchReport {
    pub config: BenchConfig,
    pub workers: usize,
    pub nnz: usize,
    pub timings: PhaseTimings,
    pub initial: Vector,
    pub sparse_result: Vector,
    pub dense_result: Vector,
}

/// State that exists on the coordinator only.
pub struct Coordinator {
    matrix: Option<Matrix>,
    csr: Option<CsrMatrix>,
    plan: PartitionPlan,
    x: Vector,
    timings: PhaseTimings,
}

impl Coordinator {
    /// Builds the CSR form (timed) and the partition plan.
    pub fn prepare(input: BenchInput, workers: usize) -> Self {
        let BenchInput { matrix, x } = input;
        info!(
            "Coordinator: converting {}x{} matrix to CSR...",
            matrix.nrows(),
            matrix.ncols()
        );
        let (csr, elapsed) = timed_local(|| CsrMatrix::from_dense(&matrix));
        let mut timings = PhaseTimings::default();
        timings.record(Phase::Construction, elapsed);

        let plan = PartitionPlan::new(&csr, workers);
        info!(
            "Coordinator: {} non-zeros ({:.2}% dense)",
            csr.nnz(),
            100.0 * csr.nnz() as f64 / matrix.len() as f64
        );

        Self {
            matrix: Some(matrix),
            csr: Some(csr),
            plan,
            x,
            timings,
        }
    }

    pub fn nnz(&self) -> usize {
        self.plan.total_nnz()
    }

    fn sparse_source(&self) -> Option<SparseSource<'_>> {
        self.csr.as_ref().map(|mat| SparseSource {
            mat,
            plan: &self.plan,
        })
    }
}

/// Tells every rank whether the coordinator accepted the run, so that a
/// rejected run ends on all ranks instead of leaving some in a collective.
pub(crate) fn agree<C: Communicator>(comm: &C, verdict: Result<()>) -> Result<()> {
    let mut flag = [usize::from(verdict.is_ok())];
    comm.broadcast(&mut flag);
    match verdict {
        Err(err) => Err(err),
        Ok(()) if flag[0] == 1 => Ok(()),
        Ok(()) => Err(Error::GroupAborted),
    }
}

/// Collective. Runs the sparse and then the dense benchmark. `input` must be
/// `Some` on the coordinator and is ignored elsewhere. Returns the report on
/// the coordinator and `None` on every other rank.
pub fn run_benchmark<C: Communicator>(
    comm: &C,
    config: &BenchConfig,
    input: Option<BenchInput>,
) -> Result<Option<BenchReport>> {
    let workers = comm.size();

    let verdict = if comm.is_root() {
        config.validate(workers).and_then(|_| match &input {
            Some(input) => input.check(config.n),
            None => Err(Error::MissingInput),
        })
    } else {
        Ok(())
    };
    agree(comm, verdict)?;

    let n = config.n;
    let rows_per_worker = n / workers;
    let mut coordinator = if comm.is_root() {
        input.map(|input| Coordinator::prepare(input, workers))
    } else {
        None
    };

    let initial = broadcast_vector(comm, coordinator.as_ref().map(|c| &c.x), n);
    let mut timings = PhaseTimings::default();

    // CSR run
    let (local, elapsed) = timed(comm, || {
        distribute_sparse(
            comm,
            coordinator.as_ref().and_then(Coordinator::sparse_source),
            rows_per_worker,
        )
    });
    timings.record(Phase::SparseDistribution, elapsed);
    if let Some(c) = coordinator.as_mut() {
        c.csr = None;
    }

    let (sparse_result, elapsed) =
        timed(comm, || iterate(comm, &local, initial.clone(), config.iterations));
    timings.record(Phase::SparseComputation, elapsed);
    drop(local);

    // dense run, from the same starting vector
    let (local, elapsed) = timed(comm, || {
        distribute_dense(
            comm,
            coordinator.as_ref().and_then(|c| c.matrix.as_ref()),
            rows_per_worker,
            n,
        )
    });
    timings.record(Phase::DenseDistribution, elapsed);
    if let Some(c) = coordinator.as_mut() {
        c.matrix = None;
    }

    let (dense_result, elapsed) =
        timed(comm, || iterate(comm, &local, initial.clone(), config.iterations));
    timings.record(Phase::DenseComputation, elapsed);

    Ok(coordinator.map(|c| {
        timings.construction = c.timings.construction;
        info!(
            "Coordinator: CSR total {:e} sec, dense total {:e} sec",
            timings.sparse_total(),
            timings.dense_total()
        );
        BenchReport {
            config: *config,
            workers,
            nnz: c.nnz(),
            timings,
            initial,
            sparse_result,
            dense_result,
        }
    }))
}

/// Sequential reference for a report: recomputes the iteration through
/// `sprs` from the regenerated matrix. Returns the largest deviation of the
/// sparse and dense results from it, relative to the reference entry (or
/// absolute where the entry is below one).
pub fn verify(report: &BenchReport, matrix: &Matrix) -> (f64, f64) {
    let mat = CsrMatrix::from_dense(matrix).to_sprs();
    let mut expected = report.initial.clone();
    for _ in 0..report.config.iterations {
        expected = reference_spmv(&mat, &expected);
    }
    let deviation = |result: &Vector| {
        result
            .iter()
            .zip(expected.iter())
            .map(|(a, b)| (a - b).abs() / b.abs().max(1.0))
            // NaN would vanish in f64::max
            .map(|dev| if dev.is_nan() { f64::INFINITY } else { dev })
            .fold(0.0_f64, f64::max)
    };
    (
        deviation(&report.sparse_result),
        deviation(&report.dense_result),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::ThreadGroup;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn run_group(
        workers: usize,
        config: BenchConfig,
        input: impl Fn() -> BenchInput + Sync,
    ) -> Vec<Result<Option<BenchReport>>> {
        ThreadGroup::new(workers)
            .run(|comm| {
                let input = comm.is_root().then(&input);
                run_benchmark(&comm, &config, input)
            })
            .unwrap()
    }

    fn coordinator_report(results: Vec<Result<Option<BenchReport>>>) -> BenchReport {
        let mut results = results.into_iter();
        let report = results.next().unwrap().unwrap().unwrap();
        assert!(results.all(|r| matches!(r, Ok(None))));
        report
    }

    #[test]
    fn fully_dense_single_iteration() {
        let config = BenchConfig::new(4, 0.0, 1).with_seed(1234);
        let report = coordinator_report(run_group(2, config, || config.generate()));

        let matrix = config.generate().matrix;
        let expected = matrix.dot(&initial_vector(4));
        assert_eq!(report.sparse_result, expected);
        assert_eq!(report.dense_result, expected);
        assert_eq!(report.nnz, matrix.iter().filter(|v| **v != 0.0).count());
    }

    #[test]
    fn identity_vector_is_unchanged() {
        let config = BenchConfig::new(4, 0.0, 5);
        let report = coordinator_report(run_group(4, config, || BenchInput {
            matrix: Matrix::eye(4),
            x: initial_vector(4),
        }));
        assert_eq!(report.sparse_result, initial_vector(4));
        assert_eq!(report.dense_result, initial_vector(4));
        assert_eq!(report.nnz, 4);
    }

    #[test]
    fn zero_iterations_return_initial_vector() {
        let config = BenchConfig::new(6, 0.5, 0);
        let report = coordinator_report(run_group(3, config, || config.generate()));
        assert_eq!(report.sparse_result, report.initial);
        assert_eq!(report.dense_result, report.initial);
        assert_eq!(report.initial, initial_vector(6));
    }

    #[test]
    fn sparse_and_dense_paths_agree() {
        for (n, workers, sparsity) in [(16, 4, 0.9), (12, 3, 0.5), (10, 1, 0.99)] {
            let config = BenchConfig::new(n, sparsity, 3);
            let report = coordinator_report(run_group(workers, config, || config.generate()));
            assert_relative_eq!(report.sparse_result, report.dense_result, max_relative = 1e-12);

            let (sparse_dev, dense_dev) = verify(&report, &config.generate().matrix);
            assert!(sparse_dev < 1e-6 && dense_dev < 1e-6);
        }
    }

    #[test]
    fn dense_run_starts_from_reset_vector() {
        // a non-trivial starting vector that the sparse run would overwrite
        let x = array![1.0, -1.0, 2.0, 0.5];
        let matrix = array![
            [2.0, 0.0, 0.0, 1.0],
            [0.0, 0.0, 3.0, 0.0],
            [1.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 4.0]
        ];
        let config = BenchConfig::new(4, 0.0, 2);
        let report = coordinator_report(run_group(2, config, || BenchInput {
            matrix: matrix.clone(),
            x: x.clone(),
        }));

        assert_eq!(report.initial, x);
        let expected = matrix.dot(&matrix.dot(&x));
        assert_eq!(report.sparse_result, expected);
        assert_eq!(report.dense_result, expected);
    }

    #[test]
    fn indivisible_size_aborts_every_rank() {
        let config = BenchConfig::new(10, 0.5, 1);
        let results = run_group(3, config, || config.generate());
        assert!(matches!(
            results[0],
            Err(Error::NotDivisible { n: 10, workers: 3 })
        ));
        assert!(results[1..]
            .iter()
            .all(|r| matches!(r, Err(Error::GroupAborted))));
    }

    #[test]
    fn bad_input_is_rejected() {
        let config = BenchConfig::new(4, 1.5, 1);
        assert!(matches!(config.validate(2), Err(Error::InvalidSparsity(_))));
        assert!(matches!(BenchConfig::new(0, 0.5, 1).validate(2), Err(Error::EmptyMatrix)));

        let config = BenchConfig::new(4, 0.5, 1);
        let results = run_group(2, config, || BenchInput {
            matrix: Matrix::eye(3),
            x: initial_vector(3),
        });
        assert!(matches!(results[0], Err(Error::DimensionMismatch { expected: 4, .. })));
        assert!(matches!(results[1], Err(Error::GroupAborted)));
    }

    #[test]
    fn short_starting_vector_is_reported_as_such() {
        let config = BenchConfig::new(4, 0.5, 1);
        let results = run_group(2, config, || BenchInput {
            matrix: Matrix::eye(4),
            x: initial_vector(3),
        });
        match &results[0] {
            Err(err @ Error::VectorLengthMismatch { expected: 4, got: 3 }) => {
                assert_eq!(
                    err.to_string(),
                    "expected a starting vector of length 4, got 3"
                );
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert!(matches!(results[1], Err(Error::GroupAborted)));
    }

    #[test]
    fn column_major_input_runs_on_every_rank() {
        let matrix = array![[1.0, 2.0], [3.0, 4.0]].reversed_axes();
        let config = BenchConfig::new(2, 0.0, 1);
        let report = coordinator_report(run_group(2, config, || BenchInput {
            matrix: matrix.clone(),
            x: initial_vector(2),
        }));

        let expected = array![4.0, 6.0];
        assert_eq!(report.sparse_result, expected);
        assert_eq!(report.dense_result, expected);
    }
}
