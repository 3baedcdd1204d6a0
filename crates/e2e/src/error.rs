//! Error types for the harness

use thiserror::Error;

use crate::report::Report;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Navigation to {url} did not settle within {timeout_ms} ms")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    #[error("Element not found: {locator} (waited {timeout_ms} ms)")]
    ElementNotFound { locator: String, timeout_ms: u64 },

    #[error("Cannot interact with element: {0}")]
    Interaction(String),

    #[error("Timeout waiting for: {condition} ({timeout_ms} ms)")]
    ConditionTimeout { condition: String, timeout_ms: u64 },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Step panicked: {0}")]
    StepPanicked(String),

    #[error("Browser process terminated: {0}")]
    BrowserCrashed(String),

    #[error("Playwright not found. Install with: npm install playwright && npx playwright install")]
    PlaywrightNotFound,

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Scenario parse error: {0}")]
    SpecParse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Scenario '{scenario}' aborted: {source}")]
    RunAborted {
        scenario: String,
        #[source]
        source: Box<E2eError>,
        partial: Box<Report>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl E2eError {
    /// Errors after which the session can no longer be driven.
    pub fn is_fatal(&self) -> bool {
        matches!(self, E2eError::BrowserCrashed(_) | E2eError::RunAborted { .. })
    }

    /// Stable name recorded next to failed steps.
    pub fn kind(&self) -> &'static str {
        match self {
            E2eError::NavigationTimeout { .. } => "navigation_timeout",
            E2eError::ElementNotFound { .. } => "element_not_found",
            E2eError::Interaction(_) => "interaction",
            E2eError::ConditionTimeout { .. } => "condition_timeout",
            E2eError::AssertionFailed(_) => "assertion",
            E2eError::StepPanicked(_) => "panic",
            E2eError::BrowserCrashed(_) => "browser_crashed",
            E2eError::PlaywrightNotFound => "playwright_not_found",
            E2eError::Driver(_) => "driver",
            E2eError::SpecParse(_) => "spec_parse",
            E2eError::InvalidConfig(_) => "invalid_config",
            E2eError::RunAborted { .. } => "run_aborted",
            E2eError::Io(_) => "io",
            E2eError::Json(_) => "json",
            E2eError::Yaml(_) => "yaml",
            E2eError::Toml(_) | E2eError::TomlSer(_) => "toml",
            E2eError::Http(_) => "http",
        }
    }
}

pub type E2eResult<T> = Result<T, E2eError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crash_is_fatal_but_lookup_failures_are_not() {
        assert!(E2eError::BrowserCrashed("gone".into()).is_fatal());
        assert!(!E2eError::ElementNotFound {
            locator: "#x".into(),
            timeout_ms: 10,
        }
        .is_fatal());
        assert!(!E2eError::Interaction("detached".into()).is_fatal());
    }

    #[test]
    fn display_includes_context() {
        let err = E2eError::NavigationTimeout {
            url: "http://localhost:3000/login".into(),
            timeout_ms: 500,
        };
        assert_eq!(
            err.to_string(),
            "Navigation to http://localhost:3000/login did not settle within 500 ms"
        );
        assert_eq!(err.kind(), "navigation_timeout");
    }
}
