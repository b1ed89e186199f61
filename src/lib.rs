//! Benchmark of distributed sparse (compressed sparse row) versus dense
//! matrix-vector multiplication.
//!
//! <br>
//!
//! A coordinating worker (rank 0) generates a seeded dense matrix with a
//! requested fraction of zero entries, converts it into CSR form and splits
//! it by rows across a fixed group of workers. Because every row carries a
//! different number of non-zeros, the split of the flat CSR arrays is
//! irregular, so the distribution uses a per-worker count/displacement plan
//! and a variable-count scatter. Each worker then re-bases its row offsets
//! into local numbering and repeatedly multiplies its slice by a replicated
//! vector, with an all-gather after every iteration that hands the full
//! product back to every worker as the next input.
//!
//! The same iteration is then repeated with the dense rows (zeros included)
//! from the same starting vector, and every phase is timed between two
//! barriers so that construction, distribution and computation costs can be
//! compared across representations.
//!
//! Workers talk through the [`comm::Communicator`] trait. The default
//! backend runs one thread per rank inside the process; with the `mpi`
//! feature the same routine runs one process per rank under `mpirun`.

use ndarray::{Array1, Array2};

#[macro_use]
extern crate log;
extern crate approx;

pub mod bench;
pub mod comm;
pub mod csr;
pub mod distribute;
pub mod error;
pub mod generate;
pub mod kernel;
pub mod partition;
pub mod poly;
pub mod report;
pub mod timer;

pub use error::{Error, Result};

pub type SprsCsr = sprs::CsMat<f64>;
pub type Vector = Array1<f64>;
pub type Matrix = Array2<f64>;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use lazy_static::lazy_static;

// Lazily-initialised output directory.
lazy_static! {
    static ref OUTPUT_DIR: PathBuf = {
        let base = Path::new("./output");
        let ts = Local::now().format("%Y-%m-%d_%H:%M:%S").to_string();
        let mut suffix = 0u32;
        loop {
            let candidate = if suffix == 0 {
                base.join(&ts)
            } else {
                base.join(format!("{}_{}", ts, suffix))
            };
            if !candidate.exists() {
                break candidate;
            }
            suffix += 1;
        }
    };
}

/// Helper to build paths inside the output directory. The directory is
/// created on first use.
///
/// ```no_run
/// use std::io::Write;
///
/// let path = spmv_bench::output_path("example.txt")?;
/// let mut f = std::fs::File::create(&path)?;
/// writeln!(f, "Hello, world!")?;
/// # Ok::<(), spmv_bench::Error>(())
/// ```
pub fn output_path<S: AsRef<Path>>(file: S) -> Result<PathBuf> {
    fs::create_dir_all(&*OUTPUT_DIR)?;
    Ok(OUTPUT_DIR.join(file))
}
