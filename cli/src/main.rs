// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Legion
//!
//! The `legion` binary starts a fleet of simulated minions against a master,
//! optionally with a local master of its own, and tears everything down on
//! Ctrl+C.
//!
//! ## Commands
//!
//! - `legion run` - Start the fleet and hold it until interrupted
//! - `legion plan` - Print the resolved spec and identities without side effects
//! - `legion sweep` - Kill stray minion (and master) processes

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use legion_cli::commands::{self, FleetArgs, SweepArgs};

/// Legion - Minion-swarm scale-test harness
#[derive(Parser)]
#[command(name = "legion")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "LEGION_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, env = "LEGION_LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Compact,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the fleet and hold it until interrupted
    #[command(name = "run")]
    Run(FleetArgs),

    /// Show the resolved spec and identities without starting anything
    #[command(name = "plan")]
    Plan(FleetArgs),

    /// Kill stray minion processes left by earlier runs
    #[command(name = "sweep")]
    Sweep(SweepArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.log_format)?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args).await,
        Commands::Plan(args) => commands::plan::execute(args),
        Commands::Sweep(args) => commands::sweep::execute(args).await,
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_takes_fleet_flags() {
        let cli = Cli::try_parse_from(["legion", "run", "-m", "3", "-M", "--no-clean"]).unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.minions, Some(3));
                assert!(args.master_too);
                assert!(args.no_clean);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_global_log_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["legion", "plan", "--log-format", "json", "--log-level", "debug"])
            .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.log_level, "debug");
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["legion"]).is_err());
    }

    #[test]
    fn test_negative_delay_rejected() {
        assert!(Cli::try_parse_from(["legion", "run", "--start-delay", "-2"]).is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
