//! Console and JSON output for the coordinator.

use std::fmt::Write as _;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use crate::bench::BenchReport;
use crate::timer::Phase;
use crate::{output_path, Result, Vector};

/// Vectors longer than this are not printed.
pub const PRINT_LIMIT: usize = 10;

pub fn format_vector(vec: &Vector) -> String {
    let mut out = String::new();
    for val in vec.iter() {
        let _ = write!(out, "{:.1} ", val);
    }
    out.trim_end().to_string()
}

pub fn render(report: &BenchReport) -> String {
    let t = &report.timings;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "\n=== RESULTS (N={}, Sparsity={:.2}, P={}, Iters={}) ===",
        report.config.n, report.config.sparsity, report.workers, report.config.iterations
    );
    let _ = writeln!(out, "(i)   CSR Creation Time:      {:e} sec", t.construction);
    let _ = writeln!(out, "(ii)  CSR Comm Time (Distr):  {:e} sec", t.sparse_distribution);
    let _ = writeln!(out, "(iii) CSR Calc Time:          {:e} sec", t.sparse_computation);
    let _ = writeln!(out, "(iv)  Total CSR Time:         {:e} sec", t.sparse_total());
    let _ = writeln!(out, "(v)   Total Dense Time:       {:e} sec", t.dense_total());
    let _ = writeln!(out, "{}", "-".repeat(52));
    for phase in [Phase::DenseDistribution, Phase::DenseComputation] {
        let label = format!("{}:", phase);
        let _ = writeln!(out, "{:<30}{:e} sec", label, t.get(phase));
    }
    let _ = writeln!(out, "Non-zeros: {}", report.nnz);

    if report.config.n <= PRINT_LIMIT {
        let _ = writeln!(out, "Final Result Vector: {}", format_vector(&report.dense_result));
    }
    out
}

pub fn print_report(report: &BenchReport) {
    print!("{}", render(report));
}

/// Writes the report as pretty JSON into the run's output directory.
pub fn write_json(report: &BenchReport, name: &str) -> Result<PathBuf> {
    let path = output_path(format!("{}.json", name))?;
    let mut file = File::create(&path)?;
    serde_json::to_writer_pretty(&mut file, report)?;
    writeln!(file)?;
    info!("wrote report to {}", path.display());
    Ok(path)
}
