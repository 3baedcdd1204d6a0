//! Harness configuration
//!
//! Values come from an optional TOML file, then `WEBCHECK_*` environment
//! variables override individual fields:
//!
//! ```toml
//! [target]
//! base_url = "http://localhost:3000"
//!
//! [accounts.researcher]
//! email = "researcher@example.org"
//! password = "..."
//!
//! [[probe.services]]
//! name = "Backend"
//! url = "http://localhost:4000/api/health"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::driver::Viewport;
use crate::error::{E2eError, E2eResult};
use crate::playwright::{BrowserKind, PlaywrightConfig};
use crate::probe::ServiceEndpoint;
use crate::runner::RunnerConfig;
use crate::session::SessionOptions;

/// Account used when a scenario names none
pub const DEFAULT_ACCOUNT: &str = "default";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub target: TargetConfig,
    pub browser: BrowserConfig,
    pub timeouts: TimeoutConfig,
    pub output: OutputConfig,
    pub run: RunConfig,
    pub probe: ProbeConfig,
    pub accounts: BTreeMap<String, Account>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Base URL relative scenario URLs resolve against
    pub base_url: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub kind: BrowserKind,
    pub headless: bool,
    pub slow_mo_ms: u64,
    pub node_binary: String,
    /// Directory containing the `node_modules` with Playwright
    pub node_modules_dir: Option<PathBuf>,
    pub viewport: Viewport,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            kind: BrowserKind::Chromium,
            headless: true,
            slow_mo_ms: 0,
            node_binary: "node".to_string(),
            node_modules_dir: None,
            viewport: Viewport::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub navigation_ms: u64,
    pub locate_ms: u64,
    pub poll_ms: u64,
    /// Bound on a whole step, unset means unbounded
    pub step_ms: Option<u64>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            navigation_ms: 30_000,
            locate_ms: 10_000,
            poll_ms: 100,
            step_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub screenshot_on_failure: bool,
    pub full_page: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("test-results"),
            screenshot_on_failure: true,
            full_page: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Directory searched recursively for scenario files
    pub scenarios_dir: PathBuf,
    /// Scenarios run at the same time, each on its own browser
    pub jobs: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            scenarios_dir: PathBuf::from("scenarios"),
            jobs: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub timeout_secs: u64,
    /// Services checked by `probe`; empty means just the target
    pub services: Vec<ServiceEndpoint>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            services: Vec::new(),
        }
    }
}

/// Login credentials for one account role
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("email", &self.email)
            .field("password", &"********")
            .finish()
    }
}

impl HarnessConfig {
    /// Parse a TOML document without environment overrides.
    pub fn from_toml(content: &str) -> E2eResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load from `path` (defaults when it does not exist), then apply the
    /// process environment.
    pub fn load(path: Option<&Path>) -> E2eResult<Self> {
        let mut config = match path {
            Some(path) if path.exists() => Self::from_toml(&std::fs::read_to_string(path)?)?,
            _ => Self::default(),
        };
        config.apply_env_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> E2eResult<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `WEBCHECK_*` overrides using `lookup` to read variables.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> E2eResult<()> {
        if let Some(url) = lookup("WEBCHECK_BASE_URL") {
            self.target.base_url = url;
        }
        if let Some(email) = lookup("WEBCHECK_EMAIL") {
            self.accounts.entry(DEFAULT_ACCOUNT.to_string()).or_default().email = email;
        }
        if let Some(password) = lookup("WEBCHECK_PASSWORD") {
            self.accounts.entry(DEFAULT_ACCOUNT.to_string()).or_default().password = password;
        }
        if let Some(dir) = lookup("WEBCHECK_OUTPUT_DIR") {
            self.output.dir = PathBuf::from(dir);
        }
        if let Some(kind) = lookup("WEBCHECK_BROWSER") {
            self.browser.kind = kind.parse()?;
        }
        if let Some(headless) = lookup("WEBCHECK_HEADLESS") {
            self.browser.headless = parse_bool("WEBCHECK_HEADLESS", &headless)?;
        }
        if let Some(ms) = lookup("WEBCHECK_NAV_TIMEOUT_MS") {
            self.timeouts.navigation_ms = parse_number("WEBCHECK_NAV_TIMEOUT_MS", &ms)?;
        }
        if let Some(ms) = lookup("WEBCHECK_LOCATE_TIMEOUT_MS") {
            self.timeouts.locate_ms = parse_number("WEBCHECK_LOCATE_TIMEOUT_MS", &ms)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> E2eResult<()> {
        let url = &self.target.base_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(E2eError::InvalidConfig(format!(
                "target.base_url must be an http(s) URL, got '{}'",
                url
            )));
        }
        if self.timeouts.navigation_ms == 0 || self.timeouts.locate_ms == 0 || self.timeouts.poll_ms == 0 {
            return Err(E2eError::InvalidConfig("timeouts must be greater than zero".into()));
        }
        if self.run.jobs == 0 {
            return Err(E2eError::InvalidConfig("run.jobs must be at least 1".into()));
        }
        Ok(())
    }

    /// Credentials for `name`, or the default account when `name` is `None`.
    /// Naming an unknown account is an error; having no default is not.
    pub fn account(&self, name: Option<&str>) -> E2eResult<Option<&Account>> {
        match name {
            Some(name) => self
                .accounts
                .get(name)
                .map(Some)
                .ok_or_else(|| E2eError::InvalidConfig(format!("no account named '{}'", name))),
            None => Ok(self.accounts.get(DEFAULT_ACCOUNT)),
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            base_url: self.target.base_url.clone(),
            viewport: self.browser.viewport,
            navigation_timeout: Duration::from_millis(self.timeouts.navigation_ms),
            locate_timeout: Duration::from_millis(self.timeouts.locate_ms),
            poll_interval: Duration::from_millis(self.timeouts.poll_ms),
            full_page_screenshots: self.output.full_page,
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            session: self.session_options(),
            output_dir: self.output.dir.clone(),
            screenshot_on_failure: self.output.screenshot_on_failure,
        }
    }

    pub fn playwright_config(&self) -> PlaywrightConfig {
        PlaywrightConfig {
            browser: self.browser.kind,
            headless: self.browser.headless,
            slow_mo_ms: self.browser.slow_mo_ms,
            node_binary: self.browser.node_binary.clone(),
            working_dir: self.browser.node_modules_dir.clone(),
            ..Default::default()
        }
    }

    /// Services to probe: the configured list, or just the target.
    pub fn probe_services(&self) -> Vec<ServiceEndpoint> {
        if self.probe.services.is_empty() {
            vec![ServiceEndpoint::new("Frontend", &self.target.base_url)]
        } else {
            self.probe.services.clone()
        }
    }
}

fn parse_bool(key: &str, value: &str) -> E2eResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(E2eError::InvalidConfig(format!("{}: expected a boolean, got '{}'", key, other))),
    }
}

fn parse_number(key: &str, value: &str) -> E2eResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| E2eError::InvalidConfig(format!("{}: expected a number, got '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = HarnessConfig::default();
        assert_eq!(config.target.base_url, "http://localhost:3000");
        assert_eq!(config.timeouts.navigation_ms, 30_000);
        assert_eq!(config.timeouts.locate_ms, 10_000);
        assert_eq!(config.output.dir, PathBuf::from("test-results"));
        assert!(config.browser.headless);
        config.validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = HarnessConfig::from_toml(
            r#"
[target]
base_url = "https://staging.example.org"

[accounts.researcher]
email = "r@example.org"
password = "hunter2"
"#,
        )
        .unwrap();
        assert_eq!(config.target.base_url, "https://staging.example.org");
        assert_eq!(config.timeouts.locate_ms, 10_000);
        assert_eq!(config.account(Some("researcher")).unwrap().unwrap().email, "r@example.org");
        assert!(config.account(Some("admin")).is_err());
        assert!(config.account(None).unwrap().is_none());
    }

    #[test]
    fn environment_overrides_file() {
        let mut config = HarnessConfig::default();
        config
            .apply_env_from(env(&[
                ("WEBCHECK_BASE_URL", "http://127.0.0.1:8080"),
                ("WEBCHECK_EMAIL", "qa@example.org"),
                ("WEBCHECK_PASSWORD", "secret"),
                ("WEBCHECK_BROWSER", "firefox"),
                ("WEBCHECK_HEADLESS", "false"),
                ("WEBCHECK_NAV_TIMEOUT_MS", "5000"),
            ]))
            .unwrap();

        assert_eq!(config.target.base_url, "http://127.0.0.1:8080");
        assert_eq!(config.browser.kind, BrowserKind::Firefox);
        assert!(!config.browser.headless);
        assert_eq!(config.session_options().navigation_timeout, Duration::from_secs(5));
        let account = config.account(None).unwrap().unwrap();
        assert_eq!(account.email, "qa@example.org");
        assert_eq!(account.password, "secret");
    }

    #[test]
    fn bad_environment_values_are_rejected() {
        let mut config = HarnessConfig::default();
        let err = config
            .apply_env_from(env(&[("WEBCHECK_LOCATE_TIMEOUT_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, E2eError::InvalidConfig(_)));
    }

    #[test]
    fn password_is_redacted_in_debug() {
        let account = Account {
            email: "a@example.org".into(),
            password: "hunter2".into(),
        };
        let printed = format!("{:?}", account);
        assert!(printed.contains("a@example.org"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf/webcheck.toml");
        let mut config = HarnessConfig::default();
        config.run.jobs = 3;
        config.save(&path).unwrap();

        let loaded = HarnessConfig::from_toml(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn rejects_non_http_base_url() {
        let mut config = HarnessConfig::default();
        config.target.base_url = "localhost:3000".into();
        assert!(config.validate().is_err());
    }
}
