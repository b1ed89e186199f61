use spmv_bench::{
    comm::{Communicator, ThreadGroup},
    poly::{generate, render, run_polymul, PolyConfig},
    Result,
};
use structopt::StructOpt;

#[macro_use]
extern crate log;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "polymul",
    about = "Distributed multiplication of two seeded polynomials"
)]
struct Opt {
    /// Degree of both factors; degree + 1 must be divisible by the workers
    degree: usize,

    /// Number of thread workers, defaults to the number of CPUs
    #[structopt(short, long)]
    workers: Option<usize>,

    /// Seed for the generated coefficients
    #[structopt(long, default_value = "42")]
    seed: u64,
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
    let config = PolyConfig {
        degree: opt.degree,
        seed: opt.seed,
    };
    let workers = opt.workers.unwrap_or_else(num_cpus::get);

    let results = ThreadGroup::new(workers).run(|comm| {
        let input = comm.is_root().then(|| {
            info!(
                "Master: Initializing polynomials (Degree n={}, Coeffs N={})...",
                config.degree,
                config.coeffs()
            );
            generate(&config)
        });
        run_polymul(&comm, &config, input)
    })?;

    for result in results {
        if let Some(report) = result? {
            print!("{}", render(&report));
        }
    }
    Ok(())
}
