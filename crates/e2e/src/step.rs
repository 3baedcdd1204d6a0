//! Scenario steps
//!
//! A [`Step`] is a named action plus its lifecycle state. The state only moves
//! forward (`pending -> running -> passed | failed`) and a concluded step
//! produces exactly one [`StepRecord`].

use async_trait::async_trait;
use chrono::Utc;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{E2eError, E2eResult};
use crate::report::StepRecord;
use crate::session::Session;

/// Detail recorded for a passed step that reported none
pub const DEFAULT_SUCCESS_DETAIL: &str = "completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Running,
    Passed,
    Failed,
}

impl StepState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepState::Passed | StepState::Failed)
    }

    fn can_become(&self, next: StepState) -> bool {
        matches!(
            (self, next),
            (StepState::Pending, StepState::Running)
                | (StepState::Running, StepState::Passed)
                | (StepState::Running, StepState::Failed)
        )
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepState::Pending => "pending",
            StepState::Running => "running",
            StepState::Passed => "passed",
            StepState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// The work a step performs against the session.
///
/// `Ok(Some(detail))` overrides the step's configured success detail.
#[async_trait]
pub trait StepAction: Send + Sync {
    async fn run(&self, session: &mut Session) -> E2eResult<Option<String>>;
}

struct FnAction<F>(F);

#[async_trait]
impl<F> StepAction for FnAction<F>
where
    F: for<'a> Fn(&'a mut Session) -> BoxFuture<'a, E2eResult<Option<String>>> + Send + Sync,
{
    async fn run(&self, session: &mut Session) -> E2eResult<Option<String>> {
        (self.0)(session).await
    }
}

pub struct Step {
    name: String,
    action: Box<dyn StepAction>,
    success_detail: Option<String>,
    timeout: Option<Duration>,
    state: StepState,
}

impl Step {
    pub fn new(name: impl Into<String>, action: impl StepAction + 'static) -> Self {
        Self {
            name: name.into(),
            action: Box::new(action),
            success_detail: None,
            timeout: None,
            state: StepState::Pending,
        }
    }

    /// Build a step from a closure returning a boxed future.
    ///
    /// ```ignore
    /// Step::from_fn("Login page loads", |session| Box::pin(async move {
    ///     session.navigate("/login", WaitUntil::NetworkIdle).await?;
    ///     Ok(None)
    /// }))
    /// ```
    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Session) -> BoxFuture<'a, E2eResult<Option<String>>>
            + Send
            + Sync
            + 'static,
    {
        Self::new(name, FnAction(f))
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.success_detail = Some(detail.into());
        self
    }

    /// Bound the whole step. Expiry fails the step with `ConditionTimeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> StepState {
        self.state
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn action(&self) -> &dyn StepAction {
        self.action.as_ref()
    }

    pub(crate) fn start(&mut self) -> E2eResult<()> {
        self.advance(StepState::Running)
    }

    /// Move to a terminal state and produce the step's single record.
    pub(crate) fn conclude(
        &mut self,
        outcome: &E2eResult<Option<String>>,
        elapsed: Duration,
        screenshot: Option<PathBuf>,
    ) -> E2eResult<StepRecord> {
        let (state, details, error_kind) = match outcome {
            Ok(detail) => (
                StepState::Passed,
                detail
                    .clone()
                    .or_else(|| self.success_detail.clone())
                    .unwrap_or_else(|| DEFAULT_SUCCESS_DETAIL.to_string()),
                None,
            ),
            Err(err) => (StepState::Failed, err.to_string(), Some(err.kind().to_string())),
        };
        self.advance(state)?;

        Ok(StepRecord {
            test: self.name.clone(),
            success: state == StepState::Passed,
            details,
            timestamp: Utc::now(),
            error_kind,
            screenshot,
            duration_ms: elapsed.as_millis() as u64,
            page_errors: Vec::new(),
        })
    }

    fn advance(&mut self, next: StepState) -> E2eResult<()> {
        if !self.state.can_become(next) {
            return Err(E2eError::Driver(format!(
                "step '{}' cannot move from {} to {}",
                self.name, self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Step {
        Step::from_fn("noop", |_session| Box::pin(async { Ok(None) }))
    }

    #[test]
    fn passes_through_running_once() {
        let mut step = noop().with_detail("all good");
        assert_eq!(step.state(), StepState::Pending);
        step.start().unwrap();
        assert_eq!(step.state(), StepState::Running);

        let record = step.conclude(&Ok(None), Duration::from_millis(3), None).unwrap();
        assert_eq!(step.state(), StepState::Passed);
        assert!(record.success);
        assert_eq!(record.details, "all good");
        assert_eq!(record.duration_ms, 3);
    }

    #[test]
    fn terminal_states_are_final() {
        let mut step = noop();
        step.start().unwrap();
        step.conclude(&Ok(None), Duration::ZERO, None).unwrap();

        assert!(step.start().is_err());
        assert!(step
            .conclude(&Err(E2eError::AssertionFailed("late".into())), Duration::ZERO, None)
            .is_err());
        assert_eq!(step.state(), StepState::Passed);
    }

    #[test]
    fn cannot_conclude_without_running() {
        let mut step = noop();
        assert!(step.conclude(&Ok(None), Duration::ZERO, None).is_err());
        assert_eq!(step.state(), StepState::Pending);
    }

    #[test]
    fn failure_records_error_text_and_kind() {
        let mut step = noop();
        step.start().unwrap();
        let err = E2eError::ElementNotFound {
            locator: "#email".into(),
            timeout_ms: 100,
        };
        let record = step
            .conclude(&Err(err), Duration::ZERO, Some(PathBuf::from("shot.png")))
            .unwrap();
        assert!(!record.success);
        assert_eq!(record.details, "Element not found: #email (waited 100 ms)");
        assert_eq!(record.error_kind.as_deref(), Some("element_not_found"));
        assert_eq!(record.screenshot, Some(PathBuf::from("shot.png")));
    }

    #[test]
    fn returned_detail_wins_over_configured_detail() {
        let mut step = noop().with_detail("configured");
        step.start().unwrap();
        let record = step
            .conclude(&Ok(Some("Found 3 rows".into())), Duration::ZERO, None)
            .unwrap();
        assert_eq!(record.details, "Found 3 rows");
    }
}
