//! Run reports
//!
//! A [`Report`] is the value a scenario run returns. It is written once and
//! never changed afterwards; [`ReportAggregator`] composes several of them.
//!
//! On disk the report uses the camelCase layout downstream dashboards read:
//!
//! ```json
//! {
//!   "summary": { "totalTests": 2, "successfulTests": 1, "failedTests": 1,
//!                "successRate": 50.0, "duration": 4.21 },
//!   "results": [ { "test": "Login page loads", "success": true,
//!                  "details": "Page title found", "timestamp": "..." } ],
//!   "screenshots": [ "test-results/screenshots/..." ],
//!   "timestamp": "..."
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::E2eResult;

/// Outcome of one concluded step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    /// Step name
    pub test: String,
    pub success: bool,
    /// Success detail or error message
    pub details: String,
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<PathBuf>,

    #[serde(default)]
    pub duration_ms: u64,

    /// Console errors and uncaught exceptions the page raised during a
    /// failed step
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub page_errors: Vec<String>,
}

/// Summary statistics over a set of step records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_tests: usize,
    pub successful_tests: usize,
    pub failed_tests: usize,
    /// Percentage in `[0, 100]`, two decimals
    pub success_rate: f64,
    /// Wall-clock seconds, three decimals
    pub duration: f64,
}

impl Summary {
    pub fn all_passed(&self) -> bool {
        self.failed_tests == 0
    }
}

/// Compute summary statistics. Pure: the same input always yields the same
/// summary.
pub fn aggregate(records: &[StepRecord], duration: Duration) -> Summary {
    let total = records.len();
    let passed = records.iter().filter(|r| r.success).count();
    summary_from_counts(total, passed, duration)
}

/// Summary over several reports, durations added up.
pub fn aggregate_reports(reports: &[Report]) -> Summary {
    let total = reports.iter().map(|r| r.results.len()).sum();
    let passed = reports
        .iter()
        .flat_map(|r| r.results.iter())
        .filter(|r| r.success)
        .count();
    let duration: f64 = reports.iter().map(|r| r.summary.duration).sum();
    summary_from_counts(total, passed, Duration::from_secs_f64(duration.max(0.0)))
}

fn summary_from_counts(total: usize, passed: usize, duration: Duration) -> Summary {
    let success_rate = if total == 0 {
        0.0
    } else {
        round_to(passed as f64 / total as f64 * 100.0, 2)
    };
    Summary {
        total_tests: total,
        successful_tests: passed,
        failed_tests: total - passed,
        success_rate,
        duration: round_to(duration.as_secs_f64(), 3),
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Scenario name, or a label for a combined report
    #[serde(default)]
    pub scenario: String,
    pub summary: Summary,
    pub results: Vec<StepRecord>,
    #[serde(default)]
    pub screenshots: Vec<PathBuf>,
    pub timestamp: DateTime<Utc>,
}

impl Report {
    pub fn new(
        scenario: impl Into<String>,
        results: Vec<StepRecord>,
        screenshots: Vec<PathBuf>,
        duration: Duration,
    ) -> Self {
        let summary = aggregate(&results, duration);
        Self {
            scenario: scenario.into(),
            summary,
            results,
            screenshots,
            timestamp: Utc::now(),
        }
    }

    pub fn all_passed(&self) -> bool {
        self.summary.all_passed()
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepRecord> {
        self.results.iter().filter(|r| !r.success)
    }

    /// Write the report as pretty JSON, creating parent directories.
    pub fn persist(&self, path: impl AsRef<Path>) -> E2eResult<PathBuf> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;

        info!("Report written to: {}", path.display());
        Ok(path.to_path_buf())
    }

    pub fn load(path: impl AsRef<Path>) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Owns the reports of several runs and composes them on request.
#[derive(Debug, Default, Clone)]
pub struct ReportAggregator {
    reports: Vec<Report>,
}

impl ReportAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, report: Report) {
        self.reports.push(report);
    }

    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn summary(&self) -> Summary {
        aggregate_reports(&self.reports)
    }

    pub fn all_passed(&self) -> bool {
        self.reports.iter().all(Report::all_passed)
    }

    /// Merge every report into one. Step names are prefixed with their
    /// scenario when more than one scenario is present.
    pub fn combine(&self, label: impl Into<String>) -> Report {
        let prefix = self.reports.len() > 1;
        let mut results = Vec::new();
        let mut screenshots = Vec::new();
        for report in &self.reports {
            for record in &report.results {
                let mut record = record.clone();
                if prefix {
                    record.test = format!("{}: {}", report.scenario, record.test);
                }
                results.push(record);
            }
            screenshots.extend(report.screenshots.iter().cloned());
        }
        Report {
            scenario: label.into(),
            summary: self.summary(),
            results,
            screenshots,
            timestamp: Utc::now(),
        }
    }
}
