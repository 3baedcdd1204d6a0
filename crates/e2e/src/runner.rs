//! Scenario runner
//!
//! Opens one session per scenario, drives its steps strictly in order and
//! turns every step into exactly one record. A failing step is screenshotted
//! and the run moves on; only a lost browser stops a scenario early.

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::artifacts::ArtifactDir;
use crate::driver::DriverLauncher;
use crate::error::{E2eError, E2eResult};
use crate::report::{Report, StepRecord};
use crate::session::{Session, SessionOptions};
use crate::step::Step;

/// Configuration for the scenario runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub session: SessionOptions,

    /// Root for screenshots and reports
    pub output_dir: PathBuf,

    /// Capture a screenshot for every failed step
    pub screenshot_on_failure: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            session: SessionOptions::default(),
            output_dir: PathBuf::from("test-results"),
            screenshot_on_failure: true,
        }
    }
}

/// One scenario queued for [`ScenarioRunner::run_many`]
pub struct ScenarioJob {
    pub name: String,
    pub session: SessionOptions,
    pub steps: Vec<Step>,
}

pub struct ScenarioRunner {
    launcher: Arc<dyn DriverLauncher>,
    config: RunnerConfig,
}

impl ScenarioRunner {
    pub fn new(launcher: Arc<dyn DriverLauncher>, config: RunnerConfig) -> Self {
        Self { launcher, config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Where the report for `scenario` should be persisted
    pub fn report_path(&self, scenario: &str) -> PathBuf {
        ArtifactDir::new(&self.config.output_dir).report_path(scenario)
    }

    /// Run `steps` with the runner's default session options.
    pub async fn run(&self, scenario: &str, steps: Vec<Step>) -> E2eResult<Report> {
        self.run_with(scenario, self.config.session.clone(), steps).await
    }

    /// Run `steps` on a fresh session built from `options`.
    ///
    /// Errors only for lifecycle failures: the session could not start, could
    /// not be torn down, or the browser was lost mid-run. The last two carry
    /// the partial report in [`E2eError::RunAborted`].
    pub async fn run_with(
        &self,
        scenario: &str,
        options: SessionOptions,
        steps: Vec<Step>,
    ) -> E2eResult<Report> {
        let started = Instant::now();
        info!("Running scenario '{}' ({} step(s))", scenario, steps.len());

        let artifacts = ArtifactDir::new(&self.config.output_dir).with_label(scenario);
        let mut session = Session::open(self.launcher.as_ref(), options, artifacts).await?;

        let (records, fatal) = self.execute(&mut session, steps).await;
        let teardown = session.close().await;
        let report = Report::new(
            scenario,
            records,
            session.screenshots().to_vec(),
            started.elapsed(),
        );

        if let Some(err) = fatal {
            error!("Scenario '{}' aborted: {}", scenario, err);
            if let Err(close_err) = teardown {
                warn!("Teardown after abort failed: {}", close_err);
            }
            return Err(abort(scenario, err, report));
        }
        if let Err(close_err) = teardown {
            error!("Could not close session for '{}': {}", scenario, close_err);
            return Err(abort(scenario, close_err, report));
        }

        let summary = &report.summary;
        info!(
            "Scenario '{}': {} passed, {} failed ({:.2}% in {:.3}s)",
            scenario,
            summary.successful_tests,
            summary.failed_tests,
            summary.success_rate,
            summary.duration
        );
        Ok(report)
    }

    /// Run several scenarios, at most `concurrency` at a time, each on its own
    /// session. Results come back in input order.
    pub async fn run_many(&self, jobs: Vec<ScenarioJob>, concurrency: usize) -> Vec<E2eResult<Report>> {
        stream::iter(jobs)
            .map(|job| async move { self.run_with(&job.name, job.session, job.steps).await })
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    async fn execute(&self, session: &mut Session, steps: Vec<Step>) -> (Vec<StepRecord>, Option<E2eError>) {
        let mut records = Vec::with_capacity(steps.len());

        for mut step in steps {
            if let Err(err) = step.start() {
                return (records, Some(err));
            }
            debug!("Step '{}' running", step.name());

            let step_started = Instant::now();
            let outcome = run_step(&step, session).await;
            let elapsed = step_started.elapsed();

            let mut lost = None;
            let page_errors = match &outcome {
                Err(err) if err.is_fatal() => Vec::new(),
                _ => match session.page_errors().await {
                    Ok(errors) => errors,
                    Err(err) if err.is_fatal() => {
                        lost = Some(err);
                        Vec::new()
                    }
                    Err(err) => {
                        warn!("Page errors for '{}' unavailable: {}", step.name(), err);
                        Vec::new()
                    }
                },
            };

            let screenshot = match &outcome {
                Err(err) if err.is_fatal() => None,
                Err(_) if lost.is_some() => None,
                Err(_) if self.config.screenshot_on_failure => {
                    match session.screenshot(&format!("{}_failed", step.name())).await {
                        Ok(path) => Some(path),
                        Err(err) if err.is_fatal() => {
                            lost = Some(err);
                            None
                        }
                        Err(err) => {
                            warn!("Failure screenshot for '{}' not saved: {}", step.name(), err);
                            None
                        }
                    }
                }
                _ => None,
            };

            let mut record = match step.conclude(&outcome, elapsed, screenshot) {
                Ok(record) => record,
                Err(err) => return (records, Some(err)),
            };
            if record.success {
                info!("✓ {} - {}", record.test, record.details);
                if !page_errors.is_empty() {
                    debug!("'{}' passed despite {} page error(s)", record.test, page_errors.len());
                }
            } else {
                error!("✗ {} - {}", record.test, record.details);
                for message in &page_errors {
                    warn!("  page error: {}", message);
                }
                record.page_errors = page_errors;
            }
            records.push(record);

            if let Err(err) = outcome {
                if err.is_fatal() {
                    return (records, Some(err));
                }
            }
            if let Some(err) = lost {
                return (records, Some(err));
            }
        }

        (records, None)
    }
}

async fn run_step(step: &Step, session: &mut Session) -> E2eResult<Option<String>> {
    let guarded = AssertUnwindSafe(step.action().run(session)).catch_unwind();
    let caught = match step.timeout() {
        Some(limit) => match tokio::time::timeout(limit, guarded).await {
            Ok(caught) => caught,
            Err(_) => {
                return Err(E2eError::ConditionTimeout {
                    condition: format!("step '{}' to finish", step.name()),
                    timeout_ms: limit.as_millis() as u64,
                })
            }
        },
        None => guarded.await,
    };
    caught.unwrap_or_else(|panic| Err(E2eError::StepPanicked(panic_message(panic.as_ref()))))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "step panicked".to_string()
    }
}

fn abort(scenario: &str, source: E2eError, partial: Report) -> E2eError {
    E2eError::RunAborted {
        scenario: scenario.to_string(),
        source: Box::new(source),
        partial: Box::new(partial),
    }
}
