use spmv_bench::{
    bench::{run_benchmark, BenchConfig, BenchReport},
    comm::{Communicator, ThreadGroup},
    report, Result,
};
use structopt::StructOpt;

#[macro_use]
extern crate log;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "sweep",
    about = "Run the CSR vs dense benchmark over a range of sparsities"
)]
struct Opt {
    /// Matrix dimension, must be divisible by the number of workers
    n: usize,

    /// Number of multiply-and-refresh iterations
    iters: usize,

    /// Sparsities to test
    #[structopt(
        short,
        long,
        use_delimiter = true,
        default_value = "0.0,0.5,0.9,0.95,0.99"
    )]
    sparsities: Vec<f64>,

    /// Number of thread workers, defaults to the number of CPUs
    #[structopt(short, long)]
    workers: Option<usize>,

    /// Write every report as JSON into the output directory
    #[structopt(long)]
    json: bool,
}

fn main() {
    pretty_env_logger::init();
    let opt = Opt::from_args();

    match sweep(&opt) {
        Ok(reports) => print_table(&reports),
        Err(err) => {
            error!("{}", err);
            std::process::exit(1);
        }
    }
}

fn sweep(opt: &Opt) -> Result<Vec<BenchReport>> {
    let group = ThreadGroup::new(opt.workers.unwrap_or_else(num_cpus::get));
    let mut reports = Vec::with_capacity(opt.sparsities.len());

    for (i, sparsity) in opt.sparsities.iter().enumerate() {
        info!("Starting sparsity {:.2}", sparsity);
        let config = BenchConfig::new(opt.n, *sparsity, opt.iters);
        let mut results = group.run(|comm| {
            let input = comm.is_root().then(|| config.generate());
            run_benchmark(&comm, &config, input)
        })?;

        if let Some(report) = results.swap_remove(0)? {
            if opt.json {
                report::write_json(&report, &format!("sweep_{}", i))?;
            }
            reports.push(report);
        }
    }
    Ok(reports)
}

fn print_table(reports: &[BenchReport]) {
    println!(
        "{:>10} {:>10} {:>15} {:>15} {:>10}",
        "sparsity", "nnz", "CSR total", "dense total", "speedup"
    );
    for report in reports {
        let sparse = report.timings.sparse_total();
        let dense = report.timings.dense_total();
        println!(
            "{:10.2} {:10} {:15.6e} {:15.6e} {:10.2}",
            report.config.sparsity,
            report.nnz,
            sparse,
            dense,
            dense / sparse
        );
    }
}
