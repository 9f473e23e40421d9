//! finbench - CPU benchmark runner
//!
//! Runs the workload catalog once and prints the completion envelope as
//! JSON on stdout. Logs go to stderr.

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use finbench::{JsonlResultStore, RunOutcome, TestSequencer};
use finbench_common::config::data_dir;
use finbench_common::{Category, LogConfig, catalog, init_logging, load_config};
use finbench_wkr::NativeExecutor;
use tracing::{info, warn};

const RESULTS_FILE_NAME: &str = "results.jsonl";

#[derive(Parser)]
#[command(name = "finbench")]
#[command(author, version, about = "finbench - sequential CPU benchmark and scoring")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the benchmark catalog and print the completion envelope
    Run(RunArgs),
    /// Print the ordered test catalog
    Catalog {
        /// Test category (cpu or ai)
        #[arg(short, long, default_value = "cpu")]
        category: Category,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Workload preset (slow, mid, flagship)
    #[arg(short, long)]
    preset: Option<String>,

    /// Test category (cpu or ai)
    #[arg(short, long)]
    category: Option<Category>,

    /// Path to configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSONL file receiving one record per completed run
    #[arg(long)]
    results_file: Option<PathBuf>,

    /// Divide workload sizes by this factor for quick runs
    #[arg(long, default_value = "1")]
    scale: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env("info");
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let _logging_guards = init_logging(&log_config)?;

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Catalog { category } => {
            let tests = catalog(category);
            println!("{}", serde_json::to_string_pretty(&tests)?);
            Ok(())
        }
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    let invalid = config.apply_env_overrides();
    if !invalid.is_empty() {
        warn!("Ignored {} invalid environment override(s)", invalid.len());
    }

    if let Some(preset) = args.preset {
        config.run.preset = preset;
    }
    if let Some(category) = args.category {
        config.run.category = category;
    }
    if let Some(path) = args.results_file {
        config.store.results_file = Some(path);
    }

    let results_file = config
        .store
        .results_file
        .clone()
        .or_else(|| data_dir().map(|dir| dir.join(RESULTS_FILE_NAME)));
    let preset = config.run.preset.clone();
    let category = config.run.category;

    let executor = NativeExecutor::default().with_scale(args.scale);
    let mut sequencer = TestSequencer::new(executor, config);
    match results_file {
        Some(path) => {
            let store = JsonlResultStore::new(path);
            info!("Saving results to {:?}", store.path());
            sequencer = sequencer.with_store(Arc::new(store));
        }
        None => warn!("No data directory available, results will not be saved"),
    }
    let sequencer = Arc::new(sequencer);

    let interrupt = {
        let sequencer = Arc::clone(&sequencer);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, cancelling run");
                sequencer.cancel();
            }
        })
    };

    let outcome = sequencer.run(&preset, category).await;
    interrupt.abort();

    match outcome {
        Ok(RunOutcome::Completed(_)) => {
            sequencer.wait_for_persistence().await;
            let envelope = sequencer
                .completions()
                .latest()
                .context("run completed without a published envelope")?;
            println!("{}", serde_json::to_string_pretty(envelope.as_ref())?);
            Ok(())
        }
        Ok(RunOutcome::AlreadyRunning) => bail!("a benchmark run is already in progress"),
        Err(e) => {
            if let Some(fallback) = e.fallback() {
                warn!(
                    completed = fallback.individual_scores.len(),
                    "No scores available for this run"
                );
            }
            Err(e.into())
        }
    }
}
