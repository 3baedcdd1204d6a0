//! webcheck E2E harness
//!
//! This crate replaces one-off browser scripts with a reusable harness that:
//! - Drives a browser through a small set of bounded action primitives
//! - Runs named steps strictly in sequence, recording one outcome per step
//! - Screenshots every failed step and keeps going
//! - Aggregates outcomes into a JSON report with summary statistics
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ReportAggregator                                           │
//! │    ├── add(Report)                                          │
//! │    ├── summary() -> Summary                                 │
//! │    └── combine(label) -> Report                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioRunner                                             │
//! │    ├── run(scenario, [Step]) -> Report                      │
//! │    └── run_many([ScenarioJob], concurrency) -> [Report]     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Session (one page, one runner)                             │
//! │    ├── navigate / go_back / wait_for_url                    │
//! │    ├── locate(Locator) -> ElementHandle                     │
//! │    ├── assert_present / probe_present                       │
//! │    ├── click / type_text / hover / wait_fixed               │
//! │    ├── set_viewport / page_errors                           │
//! │    └── screenshot(name) -> PathBuf                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  BrowserDriver                                              │
//! │    ├── PlaywrightDriver (Node.js bridge)                    │
//! │    └── FakeBrowser (in memory)                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Scenarios can be written in Rust with [`Step::from_fn`] or declared in YAML
//! (see [`scenario`]).

pub mod actions;
pub mod artifacts;
pub mod config;
pub mod driver;
pub mod error;
pub mod fake;
pub mod locator;
pub mod playwright;
pub mod probe;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod session;
pub mod step;

pub use config::HarnessConfig;
pub use driver::{BrowserDriver, DriverLauncher, ElementHandle, Viewport, WaitUntil};
pub use error::{E2eError, E2eResult};
pub use locator::Locator;
pub use playwright::{PlaywrightConfig, PlaywrightLauncher};
pub use report::{aggregate, Report, ReportAggregator, StepRecord, Summary};
pub use runner::{RunnerConfig, ScenarioJob, ScenarioRunner};
pub use scenario::Scenario;
pub use session::{Session, SessionOptions};
pub use step::{Step, StepAction, StepState};
