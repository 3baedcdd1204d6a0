//! `webcheck run`
//!
//! Loads scenarios from YAML, runs them through Playwright and persists one
//! report per scenario plus a combined summary.

use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use webcheck_e2e::playwright::BrowserKind;
use webcheck_e2e::probe;
use webcheck_e2e::{
    E2eError, E2eResult, HarnessConfig, PlaywrightLauncher, Report, ReportAggregator, Scenario, ScenarioRunner,
};

use super::load_config;
use crate::output::{self, OutputFormat};
use crate::Outcome;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Directory of scenario files (searched recursively)
    #[arg(short, long)]
    pub specs: Option<PathBuf>,

    /// Run only scenarios with this tag
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Run only the scenario with this name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Scenarios to run at the same time, each in its own browser
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Check the target services first and stop if any is down
    #[arg(long)]
    pub probe_first: bool,

    /// Base URL of the application under test
    #[arg(long)]
    pub base_url: Option<String>,

    /// Browser to use (chromium, firefox, webkit)
    #[arg(long)]
    pub browser: Option<BrowserKind>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Output directory for screenshots and reports
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl RunArgs {
    /// Command-line flags win over file and environment values.
    pub fn apply(&self, config: &mut HarnessConfig) -> Result<()> {
        if let Some(specs) = &self.specs {
            config.run.scenarios_dir = specs.clone();
        }
        if let Some(jobs) = self.jobs {
            config.run.jobs = jobs;
        }
        if let Some(url) = &self.base_url {
            config.target.base_url = url.clone();
        }
        if let Some(kind) = self.browser {
            config.browser.kind = kind;
        }
        if self.headed {
            config.browser.headless = false;
        }
        if let Some(output) = &self.output {
            config.output.dir = output.clone();
        }
        config.validate()?;
        Ok(())
    }
}

pub async fn execute(args: RunArgs, config_path: Option<&Path>, format: OutputFormat) -> Result<Outcome> {
    let mut config = load_config(config_path)?;
    args.apply(&mut config)?;

    let scenarios = select_scenarios(&config, args.tag.as_deref(), args.name.as_deref())?;

    if args.probe_first {
        let services = config.probe_services();
        let checks = probe::check_services(&services, Duration::from_secs(config.probe.timeout_secs)).await?;
        if !probe::all_ok(&checks) {
            output::print_list(&checks, format)?;
            bail!("target services are not available");
        }
    }

    let jobs = scenarios
        .iter()
        .map(|scenario| scenario.to_job(&config))
        .collect::<E2eResult<Vec<_>>>()?;

    let launcher = PlaywrightLauncher::new(config.playwright_config());
    let runner = ScenarioRunner::new(Arc::new(launcher), config.runner_config());
    let results = runner.run_many(jobs, config.run.jobs).await;
    let Collected {
        aggregator,
        aborted,
        not_run,
    } = collect_reports(&runner, &scenarios, results)?;

    print_reports(aggregator.reports(), format)?;

    if aggregator.reports().len() > 1 {
        let combined = aggregator.combine("summary");
        let path = combined.persist(runner.report_path("summary"))?;
        info!("Combined report written to {}", path.display());
        if format == OutputFormat::Table {
            println!("{}", output::summary_line("all scenarios", &combined.summary));
        }
    }

    for failure in &not_run {
        output::print_error(failure);
    }
    if aborted > 0 || !not_run.is_empty() {
        warn!(
            "{} scenario(s) aborted, {} could not start",
            aborted,
            not_run.len()
        );
        bail!("{} of {} scenario(s) did not complete", aborted + not_run.len(), scenarios.len());
    }
    Ok(if aggregator.all_passed() {
        Outcome::Passed
    } else {
        Outcome::Failed
    })
}

/// Reports from one `run_many` call
struct Collected {
    aggregator: ReportAggregator,
    /// Scenarios that lost their browser; their partial reports are kept
    aborted: usize,
    /// Scenarios that produced no report at all
    not_run: Vec<String>,
}

/// Persist every report there is, partial ones included, before deciding
/// how the run went. One scenario failing to start does not drop the others.
fn collect_reports(
    runner: &ScenarioRunner,
    scenarios: &[Scenario],
    results: Vec<E2eResult<Report>>,
) -> Result<Collected> {
    let mut collected = Collected {
        aggregator: ReportAggregator::new(),
        aborted: 0,
        not_run: Vec::new(),
    };
    for (scenario, result) in scenarios.iter().zip(results) {
        let report = match result {
            Ok(report) => report,
            Err(E2eError::RunAborted { source, partial, .. }) => {
                error!("✗ {} aborted: {}", scenario.name, source);
                collected.aborted += 1;
                *partial
            }
            Err(e) => {
                error!("✗ {} did not run: {}", scenario.name, e);
                collected.not_run.push(format!("{}: {}", scenario.name, e));
                continue;
            }
        };
        let path = report
            .persist(runner.report_path(&report.scenario))
            .with_context(|| format!("writing report for '{}'", scenario.name))?;
        info!("Report written to {}", path.display());
        collected.aggregator.add(report);
    }
    Ok(collected)
}

fn select_scenarios(config: &HarnessConfig, tag: Option<&str>, name: Option<&str>) -> Result<Vec<Scenario>> {
    let dir = &config.run.scenarios_dir;
    let all = Scenario::load_all(dir).with_context(|| format!("loading scenarios from {}", dir.display()))?;
    let selected = Scenario::filter(all, tag, name);
    Scenario::ensure_unique_names(&selected)?;
    if selected.is_empty() {
        bail!("no scenarios matched in {}", dir.display());
    }
    info!("Selected {} scenario(s)", selected.len());
    Ok(selected)
}

fn print_reports(reports: &[Report], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table | OutputFormat::Plain => {
            for report in reports {
                println!("{}", output::summary_line(&report.scenario, &report.summary));
                output::print_list(&report.results, format)?;
                for shot in &report.screenshots {
                    output::print_warning(&format!("screenshot: {}", shot.display()));
                }
            }
            Ok(())
        }
        OutputFormat::Json | OutputFormat::Yaml => output::print_value(reports, format),
    }
}
