//! Functional testing harness CLI.
//!
//! Runs functional tests, analyses their accumulated results, renders plots
//! and a markdown report, and commits new results to the results repository.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use funk::analyse::{AnalyseTarget, analyse};
use funk::core::naming::display_date;
use funk::exit_codes;
use funk::harness::Harness;
use funk::io::git::{CommitOutcome, commit_results};
use funk::list::list_tests;
use funk::logging;
use funk::plot::plot_tests;
use funk::report::write_test_report;
use funk::run::{RunOptions, run_tests};

#[derive(Parser)]
#[command(name = "funk", version, about = "Functional testing harness")]
struct Cli {
    /// Path to the config file (default: ./funk.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a functional test and store its results.
    Run {
        /// Test to run.
        #[arg(required_unless_present = "next", conflicts_with = "next")]
        name: Option<String>,
        /// Run the test that has gone unrun for longest.
        #[arg(long)]
        next: bool,
        /// Regenerate plots for the tests that ran.
        #[arg(long)]
        plot: bool,
        /// Number of runs.
        #[arg(short = 'r', long = "repeats", default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        repeats: u32,
    },
    /// Check stored results; exits 2 if any test fails.
    Analyse {
        /// Test to analyse (default: all tests).
        #[arg(conflicts_with = "last")]
        name: Option<String>,
        /// Analyse the most recently run test.
        #[arg(long)]
        last: bool,
    },
    /// Write the markdown report.
    Report,
    /// Render plots from stored results.
    Plot {
        /// Test to plot (default: all tests).
        name: Option<String>,
    },
    /// Commit and push new results.
    Commit,
    /// List tests with their last run date, least recently run first.
    List,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::ERROR);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let level = match cli.command {
        Command::Analyse { .. } => logging::QUIET_LEVEL,
        _ => logging::DEFAULT_LEVEL,
    };
    logging::init(level);

    let config = cli.config.as_deref();
    match cli.command {
        Command::Run {
            name,
            next,
            plot,
            repeats,
        } => {
            let harness = Harness::open(config)?;
            let options = RunOptions {
                name,
                next,
                plot,
                repeats,
            };
            for outcome in run_tests(&harness, &options)? {
                println!("{}: {}", outcome.name, outcome.location);
            }
            Ok(exit_codes::OK)
        }
        Command::Analyse { name, last } => {
            let harness = Harness::open(config)?;
            let target = match (name, last) {
                (Some(name), _) => AnalyseTarget::Named(name),
                (None, true) => AnalyseTarget::Last,
                (None, false) => AnalyseTarget::All,
            };
            let mut code = exit_codes::OK;
            for verdict in analyse(&harness, &target)? {
                if verdict.passed {
                    println!("{}: ok", verdict.name);
                } else {
                    println!("{}: FAILED", verdict.name);
                    eprintln!("analysis failed: {}", verdict.name);
                    code = exit_codes::ANALYSIS_FAILED;
                }
            }
            Ok(code)
        }
        Command::Report => {
            let harness = Harness::open(config)?;
            let path = write_test_report(&harness)?;
            println!("{}", path.display());
            Ok(exit_codes::OK)
        }
        Command::Plot { name } => {
            let harness = Harness::open(config)?;
            for path in plot_tests(&harness, name.as_deref())? {
                println!("{}", path.display());
            }
            Ok(exit_codes::OK)
        }
        Command::Commit => {
            let harness = Harness::open(config)?;
            match commit_results(&harness.paths, &harness.config)? {
                CommitOutcome::NoChanges => println!("no changes"),
                CommitOutcome::Pushed { message } => println!("{message}"),
            }
            Ok(exit_codes::OK)
        }
        Command::List => {
            let harness = Harness::open(config)?;
            for (name, date) in list_tests(&harness)? {
                let date = date.map_or_else(|| "never".to_string(), |d| display_date(&d));
                println!("{name:<48} {date}");
            }
            Ok(exit_codes::OK)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_next_with_repeats() {
        let cli = Cli::parse_from(["funk", "run", "--next", "--plot", "-r", "5"]);
        assert!(matches!(
            cli.command,
            Command::Run {
                name: None,
                next: true,
                plot: true,
                repeats: 5
            }
        ));
    }

    #[test]
    fn run_requires_name_or_next() {
        assert!(Cli::try_parse_from(["funk", "run"]).is_err());
        assert!(Cli::try_parse_from(["funk", "run", "test1", "--next"]).is_err());
        assert!(Cli::try_parse_from(["funk", "run", "test1", "-r", "0"]).is_err());
    }

    #[test]
    fn parse_analyse_last() {
        let cli = Cli::parse_from(["funk", "analyse", "--last"]);
        assert!(matches!(
            cli.command,
            Command::Analyse {
                name: None,
                last: true
            }
        ));
    }

    #[test]
    fn parse_global_config() {
        let cli = Cli::parse_from(["funk", "report", "--config", "/srv/funk.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/srv/funk.toml")));
        assert!(matches!(cli.command, Command::Report));
    }
}
