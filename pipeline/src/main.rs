mod cli;
mod config;
mod definition;
mod execute;
mod outcome;
mod report;
mod results;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{
    DEFAULT_OUTPUT_LIMIT_BYTES, DEFAULT_RESULTS_DIR, DEFAULT_STEP_TIMEOUT_MINUTES, ExecuteOptions,
    minutes,
};
use crate::definition::MAX_TIMEOUT_MINUTES;
use crate::outcome::Outcome;

const DEFAULT_PIPELINE: &str = "pipelines/funk.toml";

const EXIT_ERROR: i32 = 1;
const EXIT_PIPELINE_FAILED: i32 = 2;

#[derive(Parser)]
#[command(name = "pipeline", version, about = "Sequential CI pipeline runner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every step of a pipeline once; exits 2 if the pipeline fails.
    Run {
        #[arg(default_value = DEFAULT_PIPELINE)]
        pipeline: PathBuf,
        #[arg(long, default_value = DEFAULT_RESULTS_DIR)]
        results_dir: PathBuf,
        /// `git pull` the working directory first.
        #[arg(long)]
        pull: bool,
        /// Timeout for steps without their own.
        #[arg(long, default_value_t = DEFAULT_STEP_TIMEOUT_MINUTES, value_parser = clap::value_parser!(u64).range(1..=MAX_TIMEOUT_MINUTES as u64))]
        default_timeout_minutes: u64,
        #[arg(long, default_value_t = DEFAULT_OUTPUT_LIMIT_BYTES)]
        output_limit_bytes: usize,
    },
    /// Check a pipeline definition and print its steps.
    Validate {
        #[arg(default_value = DEFAULT_PIPELINE)]
        pipeline: PathBuf,
    },
    /// Write the default functional testing pipeline.
    Init {
        #[arg(default_value = DEFAULT_PIPELINE)]
        pipeline: PathBuf,
    },
    /// Summarise stored runs.
    Report {
        #[arg(long, default_value = DEFAULT_RESULTS_DIR)]
        results_dir: PathBuf,
    },
    /// Remove stored runs.
    Clean {
        #[arg(long, default_value = DEFAULT_RESULTS_DIR)]
        results_dir: PathBuf,
    },
}

fn main() {
    init_logging();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(EXIT_ERROR);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            pipeline,
            results_dir,
            pull,
            default_timeout_minutes,
            output_limit_bytes,
        } => {
            let options = ExecuteOptions {
                results_dir,
                default_timeout: minutes(default_timeout_minutes),
                output_limit_bytes,
                pull,
            };
            match cli::run_pipeline_file(&pipeline, &options)? {
                Outcome::Succeeded => Ok(0),
                Outcome::Failed => Ok(EXIT_PIPELINE_FAILED),
            }
        }
        Command::Validate { pipeline } => cli::validate_pipeline(&pipeline).map(|()| 0),
        Command::Init { pipeline } => cli::init_pipeline(&pipeline).map(|()| 0),
        Command::Report { results_dir } => cli::report_runs(&results_dir).map(|()| 0),
        Command::Clean { results_dir } => cli::clean_runs(&results_dir).map(|()| 0),
    }
}

/// Tracing to stderr, `warn` unless `RUST_LOG` says otherwise.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
