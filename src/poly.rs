//! Distributed polynomial multiplication, the companion benchmark.
//!
//! Coefficients of `A` are dealt out in equal chunks, `B` is broadcast
//! whole, every worker convolves its chunk of `A` against `B` into a
//! full-length partial product, and a sum-reduction on the coordinator
//! adds the partials up.

use ndarray::Array1;
use serde::Serialize;

use crate::bench::agree;
use crate::comm::Communicator;
use crate::generate::{generate_polynomials, DEFAULT_SEED};
use crate::timer::{timed, timed_local};
use crate::{Error, Result};

pub type Poly = Array1<i64>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PolyConfig {
    pub degree: usize,
    pub seed: u64,
}

impl PolyConfig {
    pub fn new(degree: usize) -> Self {
        Self {
            degree,
            seed: DEFAULT_SEED,
        }
    }

    /// Number of coefficients of each factor.
    pub fn coeffs(&self) -> usize {
        self.degree + 1
    }

    /// Number of coefficients of the product.
    pub fn product_len(&self) -> usize {
        2 * self.degree + 1
    }

    pub fn validate(&self, workers: usize) -> Result<()> {
        if self.coeffs() % workers != 0 {
            return Err(Error::NotDivisible {
                n: self.coeffs(),
                workers,
            });
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct PolyTimings {
    pub distribution: f64,
    pub computation: f64,
    pub reduction: f64,
}

impl PolyTimings {
    pub fn total(&self) -> f64 {
        self.distribution + self.computation + self.reduction
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PolyReport {
    pub config: PolyConfig,
    pub workers: usize,
    pub timings: PolyTimings,
    pub product: Vec<i64>,
}

/// Adds `a_chunk * b` into a product of length `out_len`, where the chunk
/// holds the coefficients of `x^offset, x^(offset + 1), ...`.
pub fn convolve_chunk(a_chunk: &[i64], b: &[i64], offset: usize, out_len: usize) -> Vec<i64> {
    let mut out = vec![0; out_len];
    for (i, a) in a_chunk.iter().enumerate() {
        for (j, b) in b.iter().enumerate() {
            out[offset + i + j] += a * b;
        }
    }
    out
}

/// Collective. `input` holds `(A, B)` on the coordinator.
pub fn run_polymul<C: Communicator>(
    comm: &C,
    config: &PolyConfig,
    input: Option<(Poly, Poly)>,
) -> Result<Option<PolyReport>> {
    let workers = comm.size();
    let verdict = if comm.is_root() {
        config.validate(workers)
    } else {
        Ok(())
    };
    agree(comm, verdict)?;

    let coeffs = config.coeffs();
    let local_n = coeffs / workers;
    let (a, mut b) = match input.filter(|_| comm.is_root()) {
        Some((a, b)) => (Some(a.to_vec()), b.to_vec()),
        None => (None, vec![0; coeffs]),
    };
    let mut local_a = vec![0; local_n];
    let mut timings = PolyTimings::default();

    let (_, elapsed) = timed(comm, || {
        comm.scatter(a.as_deref(), &mut local_a);
        comm.broadcast(&mut b);
    });
    timings.distribution = elapsed.as_secs_f64();
    debug!(
        "rank {} received local_a[0]={} and b[0]={}",
        comm.rank(),
        local_a[0],
        b[0]
    );

    let offset = comm.rank() * local_n;
    let (partial, elapsed) = timed(comm, || {
        convolve_chunk(&local_a, &b, offset, config.product_len())
    });
    timings.computation = elapsed.as_secs_f64();

    let (product, elapsed) = timed_local(|| comm.reduce_sum(&partial));
    timings.reduction = elapsed.as_secs_f64();

    Ok(product.map(|product| PolyReport {
        config: *config,
        workers,
        timings,
        product,
    }))
}

pub fn render(report: &PolyReport) -> String {
    let t = &report.timings;
    let mut out = format!(
        "\n--- RESULTS ---\n\
         Polynomial Degree n: {} (Coeffs N={})\n\
         Processes P:         {}\n\
         {}\n\
         (i)   Comm Time (Scatter/Bcast): {:e} sec\n\
         (ii)  Calc Time:                 {:e} sec\n\
         (iii) Reduce Time:               {:e} sec\n\
         (iv)  Total Parallel Time:       {:e} sec\n\
         {}\n",
        report.config.degree,
        report.config.coeffs(),
        report.workers,
        "-".repeat(38),
        t.distribution,
        t.computation,
        t.reduction,
        t.total(),
        "-".repeat(38),
    );
    if report.product.len() <= 30 {
        let coeffs: Vec<String> = report.product.iter().map(|c| c.to_string()).collect();
        out.push_str(&format!("Final Result C (Degree 2n):\n{}\n", coeffs.join(" ")));
    }
    out
}

/// The seeded factors for `config`.
pub fn generate(config: &PolyConfig) -> (Poly, Poly) {
    generate_polynomials(config.coeffs(), config.seed)
}
