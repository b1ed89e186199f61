use spmv_bench::{
    bench::{run_benchmark, verify, BenchConfig},
    comm::{Communicator, ThreadGroup},
    report, Error, Result,
};
use structopt::StructOpt;
use strum_macros::{Display, EnumString};

#[macro_use]
extern crate log;

/// Relative deviation from the sequential product above which `--verify`
/// complains.
const VERIFY_TOLERANCE: f64 = 1e-9;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "spmv_bench",
    about = "Compare distributed CSR and dense matrix-vector multiplication"
)]
struct Opt {
    /// Matrix dimension, must be divisible by the number of workers
    n: usize,

    /// Probability that a generated entry is zero, in [0, 1]
    sparsity: f64,

    /// Number of multiply-and-refresh iterations
    iters: usize,

    /// Workers for the thread backend, defaults to the number of CPUs.
    /// The MPI backend takes its group size from mpirun.
    #[structopt(short, long)]
    workers: Option<usize>,

    /// Communication backend. Options are:
    /// thread, mpi
    #[structopt(short, long, default_value = "thread")]
    backend: Backend,

    /// Seed for the generated matrix
    #[structopt(long, default_value = "42")]
    seed: u64,

    /// Also write the report as JSON into the output directory
    #[structopt(long)]
    json: bool,

    /// Check both results against a sequential product
    #[structopt(long)]
    verify: bool,
}

#[derive(Debug, Display, EnumString)]
#[strum(ascii_case_insensitive)]
enum Backend {
    Thread,
    Mpi,
}

fn main() {
    pretty_env_logger::init();
    let opt = Opt::from_args();

    if let Err(err) = run(&opt) {
        error!("{}", err);
        std::process::exit(1);
    }
}

fn run(opt: &Opt) -> Result<()> {
    let config = BenchConfig::new(opt.n, opt.sparsity, opt.iters).with_seed(opt.seed);
    match opt.backend {
        Backend::Thread => {
            let workers = opt.workers.unwrap_or_else(num_cpus::get);
            info!("starting {} thread workers", workers);
            // rank 0 comes first, so its error is the one reported
            ThreadGroup::new(workers)
                .run(|comm| worker(&comm, opt, &config))?
                .into_iter()
                .collect()
        }
        Backend::Mpi => run_mpi(opt, &config),
    }
}

#[cfg(feature = "mpi")]
fn run_mpi(opt: &Opt, config: &BenchConfig) -> Result<()> {
    let comm = spmv_bench::comm::MpiComm::init().ok_or(Error::MpiInit)?;
    if opt.workers.is_some() && comm.is_root() {
        warn!("--workers is ignored with the mpi backend");
    }
    worker(&comm, opt, config)
}

#[cfg(not(feature = "mpi"))]
fn run_mpi(_opt: &Opt, _config: &BenchConfig) -> Result<()> {
    Err(Error::MpiUnavailable)
}

fn worker<C: Communicator>(comm: &C, opt: &Opt, config: &BenchConfig) -> Result<()> {
    let input = comm.is_root().then(|| {
        info!(
            "Master: Generating N={}, Sparsity={:.2}...",
            config.n, config.sparsity
        );
        config.generate()
    });

    let report = match run_benchmark(comm, config, input)? {
        Some(report) => report,
        None => return Ok(()),
    };
    report::print_report(&report);

    if opt.verify {
        let (sparse_dev, dense_dev) = verify(&report, &config.generate().matrix);
        if sparse_dev <= VERIFY_TOLERANCE && dense_dev <= VERIFY_TOLERANCE {
            info!("both results match the sequential product");
        } else {
            warn!(
                "results deviate from the sequential product: CSR {:e}, dense {:e}",
                sparse_dev, dense_dev
            );
        }
    }
    if opt.json {
        report::write_json(&report, "spmv_bench")?;
    }
    Ok(())
}
