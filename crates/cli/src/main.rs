//! webcheck CLI - Main Entry Point
//!
//! Runs browser scenarios against a target web application, probes the
//! services it depends on and inspects persisted reports.
//!
//! Exit codes: `0` everything passed, `1` at least one step failed, `2` the
//! run could not be carried out (bad config, browser missing, target down).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{init, probe, report, run};

/// webcheck - sequential browser checks with JSON reports
#[derive(Parser)]
#[command(name = "webcheck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (TOML) [default: webcheck.toml, skipped when absent]
    #[arg(short, long, env = "WEBCHECK_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scenarios and write reports
    Run(run::RunArgs),

    /// Check that the target services respond
    Probe(probe::ProbeArgs),

    /// Inspect persisted reports
    #[command(subcommand)]
    Report(report::ReportCommands),

    /// Write a default configuration file and an example scenario
    Init(init::InitArgs),
}

/// Outcome of a command that completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed,
}

fn init_logging(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Run(args) => run::execute(args, config, cli.format).await,
        Commands::Probe(args) => probe::execute(args, config, cli.format).await,
        Commands::Report(cmd) => report::execute(cmd, cli.format),
        Commands::Init(args) => init::execute(args, &commands::config_location(config)),
    };

    match result {
        Ok(Outcome::Passed) => ExitCode::SUCCESS,
        Ok(Outcome::Failed) => ExitCode::from(1),
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            ExitCode::from(2)
        }
    }
}
