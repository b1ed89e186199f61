//! Phase timing. Each distributed phase sits between two barriers so that
//! every worker starts and finishes it together and the coordinator's clock
//! covers the slowest worker.

use std::time::{Duration, Instant};

use serde::Serialize;
use strum_macros::{Display, EnumIter};

use crate::comm::Communicator;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumIter)]
pub enum Phase {
    #[strum(serialize = "CSR creation")]
    Construction,
    #[strum(serialize = "CSR distribution")]
    SparseDistribution,
    #[strum(serialize = "CSR computation")]
    SparseComputation,
    #[strum(serialize = "dense distribution")]
    DenseDistribution,
    #[strum(serialize = "dense computation")]
    DenseComputation,
}

/// Collective. Barrier, run `f`, barrier; the elapsed time covers both
/// barriers' release points.
pub fn timed<C: Communicator, R>(comm: &C, f: impl FnOnce() -> R) -> (R, Duration) {
    comm.barrier();
    let start = Instant::now();
    let out = f();
    comm.barrier();
    (out, start.elapsed())
}

/// Local only, for the coordinator's construction step.
pub fn timed_local<R>(f: impl FnOnce() -> R) -> (R, Duration) {
    let start = Instant::now();
    let out = f();
    (out, start.elapsed())
}

/// Phase durations in seconds as seen by the coordinator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct PhaseTimings {
    pub construction: f64,
    pub sparse_distribution: f64,
    pub sparse_computation: f64,
    pub dense_distribution: f64,
    pub dense_computation: f64,
}

impl PhaseTimings {
    pub fn record(&mut self, phase: Phase, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        match phase {
            Phase::Construction => self.construction = secs,
            Phase::SparseDistribution => self.sparse_distribution = secs,
            Phase::SparseComputation => self.sparse_computation = secs,
            Phase::DenseDistribution => self.dense_distribution = secs,
            Phase::DenseComputation => self.dense_computation = secs,
        }
        debug!("{}: {:e} sec", phase, secs);
    }

    pub fn get(&self, phase: Phase) -> f64 {
        match phase {
            Phase::Construction => self.construction,
            Phase::SparseDistribution => self.sparse_distribution,
            Phase::SparseComputation => self.sparse_computation,
            Phase::DenseDistribution => self.dense_distribution,
            Phase::DenseComputation => self.dense_computation,
        }
    }

    /// Creation, distribution and computation of the CSR run.
    pub fn sparse_total(&self) -> f64 {
        self.construction + self.sparse_distribution + self.sparse_computation
    }

    pub fn dense_total(&self) -> f64 {
        self.dense_distribution + self.dense_computation
    }
}
