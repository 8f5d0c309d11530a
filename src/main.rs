//! Command-line entry point for the real-time mutex stress harness.
//!
//! ```bash
//! rt-mutex-stress 100000 4 0          # 100k polls, 4 workers, main at SCHED_OTHER
//! rt-mutex-stress 100000 4 90 kt      # keep going, throttled output
//! rt-mutex-stress 1000 2 0 m --backend generic
//! ```
//!
//! The exit status is the aggregate error bitmask of the run.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::error;

use rt_mutex_stress::config::{Backend, HarnessConfig};
use rt_mutex_stress::core::{AppResult, Coordinator, ErrorFlags};
use rt_mutex_stress::util::init_tracing;

const FLAGS_HELP: &str = "\
FLAGS is a combination of:
  k: keep going on error (default: no)
  q: print nothing
  e: print errors
  t: print every 500 iterations or errors
  a: print all (default)
  m: do not use mutex";

#[derive(Debug, Parser)]
#[command(name = "rt-mutex-stress", version, about, after_help = FLAGS_HELP)]
struct Cli {
    /// Coordinator try_lock iterations.
    iterations: u64,
    /// Worker threads (at most the number of available processors).
    workers: usize,
    /// Coordinator SCHED_FIFO priority; 0 for default scheduling.
    main_priority: i32,
    /// Option characters, see below.
    flags: Option<String>,
    /// Mutex provider under test.
    #[arg(long, env = "RT_MUTEX_STRESS_BACKEND")]
    backend: Option<Backend>,
    /// Worker SCHED_FIFO priority; 0 for default scheduling.
    #[arg(long)]
    worker_priority: Option<i32>,
    /// JSON configuration file; positional arguments override it.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print the run report as JSON on stdout.
    #[arg(long)]
    json: bool,
}

fn build_config(cli: &Cli) -> AppResult<HarnessConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            HarnessConfig::from_json_str(&raw).map_err(anyhow::Error::msg)?
        }
        None => HarnessConfig::new(),
    };
    config = config
        .with_iterations(cli.iterations)
        .with_workers(cli.workers)
        .with_main_priority(cli.main_priority)
        .with_flags(cli.flags.as_deref().unwrap_or_default());
    if let Some(backend) = cli.backend {
        config = config.with_backend(backend);
    }
    if let Some(priority) = cli.worker_priority {
        config = config.with_worker_priority(priority);
    }
    Ok(config)
}

fn run(cli: &Cli) -> AppResult<u8> {
    let config = build_config(cli)?;
    let coordinator = Coordinator::new(config);
    coordinator.validate()?;
    coordinator.install_signal_handler()?;

    let report = coordinator.run()?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(u8::try_from(report.exit_code()).unwrap_or(u8::MAX))
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let other = ExitCode::from(u8::try_from(ErrorFlags::OTHER.bits()).unwrap_or(1));
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { other } else { ExitCode::SUCCESS };
        }
    };

    match run(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{e:#}");
            other
        }
    }
}
