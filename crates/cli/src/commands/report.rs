//! `webcheck report`

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::PathBuf;

use webcheck_e2e::Report;

use crate::output::{self, OutputFormat};
use crate::Outcome;

#[derive(Subcommand, Debug)]
pub enum ReportCommands {
    /// Print a persisted report
    Show {
        /// Report file written by `webcheck run`
        file: PathBuf,

        /// Only list failed steps
        #[arg(long)]
        failures: bool,
    },
}

pub fn execute(cmd: ReportCommands, format: OutputFormat) -> Result<Outcome> {
    match cmd {
        ReportCommands::Show { file, failures } => {
            let report = Report::load(&file).with_context(|| format!("reading report {}", file.display()))?;
            show(&report, failures, format)?;
            Ok(if report.all_passed() {
                Outcome::Passed
            } else {
                Outcome::Failed
            })
        }
    }
}

fn show(report: &Report, failures_only: bool, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json | OutputFormat::Yaml if !failures_only => output::print_value(report, format),
        _ => {
            let records: Vec<_> = if failures_only {
                report.failures().cloned().collect()
            } else {
                report.results.clone()
            };
            let human = matches!(format, OutputFormat::Table | OutputFormat::Plain);
            if human {
                println!("{}", output::summary_line(&report.scenario, &report.summary));
                println!("Recorded {}", report.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            output::print_list(&records, format)?;
            if human {
                for record in &records {
                    if let Some(shot) = &record.screenshot {
                        println!("  {} -> {}", record.test, shot.display());
                    }
                    for message in &record.page_errors {
                        println!("  {} page error: {}", record.test, message);
                    }
                }
            }
            Ok(())
        }
    }
}
