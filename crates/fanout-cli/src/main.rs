//! fanout CLI - run a batch of jobs under a chosen isolation strategy.

mod run;

use clap::{Parser, Subcommand};
use fanout_core::RunnerKind;

#[derive(Parser)]
#[command(name = "fanout")]
#[command(about = "Concurrent batch job execution under interchangeable isolation strategies")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a batch of jobs
    Run {
        /// Execution strategy: THREAD, PROCESS or SUBINTERPRETER
        #[arg(short, long, default_value = "THREAD")]
        strategy: String,

        /// Number of workers in the pool
        #[arg(short, long, default_value = "10")]
        workers: usize,

        /// Number of jobs in the batch
        #[arg(short, long, default_value = "50")]
        jobs: usize,

        /// Fibonacci index each job computes
        #[arg(long, default_value = "30")]
        fib: i64,

        /// Append this many always-failing jobs to the batch
        #[arg(long, default_value = "0")]
        fail: usize,

        /// Ask process workers to report their resident memory per result
        #[arg(long)]
        probe_memory: bool,

        /// Emit one JSON line per completion instead of plain text
        #[arg(long)]
        json: bool,
    },

    /// List the available execution strategies
    Strategies,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            strategy,
            workers,
            jobs,
            fib,
            fail,
            probe_memory,
            json,
        } => run::execute(&strategy, workers, jobs, fib, fail, probe_memory, json)?,

        Commands::Strategies => {
            for kind in RunnerKind::ALL {
                println!("{}", kind);
            }
        }
    }

    Ok(())
}
