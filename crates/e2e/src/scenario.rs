//! Declarative YAML scenarios
//!
//! ```yaml
//! name: researcher-login
//! tags: [auth, smoke]
//! account: researcher
//! vars:
//!   DASHBOARD: /dashboard/researcher
//! steps:
//!   - name: Login page loads
//!     success_detail: Login form rendered
//!     actions:
//!       - action: navigate
//!         url: /login
//!       - action: assert_present
//!         locator: { selector: 'input[type="email"]' }
//!   - name: Credentials accepted
//!     actions:
//!       - action: type
//!         locator: { selector: 'input[type="email"]' }
//!         text: ${EMAIL}
//!       - action: click
//!         locator: { text: { tag: button, contains: Sign in } }
//!       - action: assert_url
//!         contains: ${DASHBOARD}
//! ```
//!
//! `${NAME}` placeholders resolve from the scenario's `vars`, then
//! `BASE_URL`, `EMAIL` and `PASSWORD`, then the process environment.

use async_trait::async_trait;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::HarnessConfig;
use crate::driver::{Viewport, WaitUntil};
use crate::error::{E2eError, E2eResult};
use crate::locator::Locator;
use crate::runner::ScenarioJob;
use crate::session::Session;
use crate::step::{Step, StepAction};

/// A complete scenario parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Account whose credentials fill `${EMAIL}` and `${PASSWORD}`
    #[serde(default)]
    pub account: Option<String>,

    #[serde(default)]
    pub vars: BTreeMap<String, String>,

    /// Overrides the configured viewport
    #[serde(default)]
    pub viewport: Option<Viewport>,

    pub steps: Vec<ScenarioStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioStep {
    pub name: String,

    /// Detail recorded when the step passes
    #[serde(default)]
    pub success_detail: Option<String>,

    /// Bound on the whole step
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    pub actions: Vec<Action>,
}

/// A single action inside a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Navigate to a URL (relative to the base URL)
    Navigate {
        url: String,
        #[serde(default)]
        wait_until: WaitUntil,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    Back {
        #[serde(default)]
        wait_until: WaitUntil,
    },

    Click {
        locator: Locator,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Move the pointer over an element (menus, tooltips)
    Hover {
        locator: Locator,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Resize the page mid-scenario for responsive checks
    SetViewport { width: u32, height: u32 },

    /// Fill an input field
    Type {
        locator: Locator,
        text: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Fail the step unless the element appears
    AssertPresent {
        locator: Locator,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Check for an element without failing the step. The matching message
    /// becomes the step's detail.
    Probe {
        locator: Locator,
        #[serde(default)]
        timeout_ms: Option<u64>,
        #[serde(default)]
        found: Option<String>,
        #[serde(default)]
        missing: Option<String>,
    },

    /// Wait until the current URL contains a substring
    AssertUrl {
        contains: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Wait for an element to appear
    WaitFor {
        locator: Locator,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Wait for a fixed amount of time (use sparingly)
    Sleep { ms: u64 },

    Screenshot { name: String },

    Log { message: String },
}

impl Scenario {
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let scenario: Self = serde_yaml::from_str(yaml)?;
        scenario.check()?;
        Ok(scenario)
    }

    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load every `.yaml`/`.yml` file under `dir`, sorted by path.
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        if !dir.is_dir() {
            return Err(E2eError::SpecParse(format!(
                "scenario directory not found: {}",
                dir.display()
            )));
        }

        let mut scenarios = Vec::new();
        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            debug!("Loading scenario {}", entry.path().display());
            scenarios.push(Self::from_file(entry.path())?);
        }
        Self::ensure_unique_names(&scenarios)?;
        Ok(scenarios)
    }

    /// Reports and screenshots are named after the scenario, so two
    /// scenarios in one run may not share a name.
    pub fn ensure_unique_names(scenarios: &[Self]) -> E2eResult<()> {
        let mut seen = HashSet::new();
        for scenario in scenarios {
            if !seen.insert(scenario.name.as_str()) {
                return Err(E2eError::SpecParse(format!(
                    "scenario name '{}' is used more than once",
                    scenario.name
                )));
            }
        }
        Ok(())
    }

    /// Keep scenarios carrying `tag` and/or named `name`.
    pub fn filter(scenarios: Vec<Self>, tag: Option<&str>, name: Option<&str>) -> Vec<Self> {
        scenarios
            .into_iter()
            .filter(|s| tag.map_or(true, |t| s.tags.iter().any(|have| have == t)))
            .filter(|s| name.map_or(true, |n| s.name == n))
            .collect()
    }

    fn check(&self) -> E2eResult<()> {
        if self.name.trim().is_empty() {
            return Err(E2eError::SpecParse("scenario name is empty".into()));
        }
        for step in &self.steps {
            if step.actions.is_empty() {
                return Err(E2eError::SpecParse(format!(
                    "step '{}' in '{}' has no actions",
                    step.name, self.name
                )));
            }
        }
        Ok(())
    }

    /// Resolve placeholders against `config` and build runnable steps.
    pub fn to_job(&self, config: &HarnessConfig) -> E2eResult<ScenarioJob> {
        let vars = self.variables(config)?;

        let mut session = config.session_options();
        if let Some(viewport) = self.viewport {
            session.viewport = viewport;
        }

        let steps = self
            .steps
            .iter()
            .map(|step| {
                let actions = step
                    .actions
                    .iter()
                    .map(|action| action.expand(&vars))
                    .collect::<E2eResult<Vec<_>>>()?;
                let mut built = Step::new(step.name.clone(), ActionList { actions });
                if let Some(detail) = &step.success_detail {
                    built = built.with_detail(vars.expand(detail)?);
                }
                if let Some(ms) = step.timeout_ms.or(config.timeouts.step_ms) {
                    built = built.with_timeout(Duration::from_millis(ms));
                }
                Ok(built)
            })
            .collect::<E2eResult<Vec<_>>>()?;

        Ok(ScenarioJob {
            name: self.name.clone(),
            session,
            steps,
        })
    }

    fn variables(&self, config: &HarnessConfig) -> E2eResult<Variables> {
        let mut builtins = HashMap::new();
        builtins.insert("BASE_URL".to_string(), config.target.base_url.clone());
        if let Some(account) = config.account(self.account.as_deref())? {
            builtins.insert("EMAIL".to_string(), account.email.clone());
            builtins.insert("PASSWORD".to_string(), account.password.clone());
        }

        // Scenario vars may refer to the builtins but not to each other.
        let mut vars = Variables::new(builtins)?;
        let mut resolved = Vec::with_capacity(self.vars.len());
        for (key, value) in &self.vars {
            resolved.push((key.clone(), vars.expand(value)?));
        }
        vars.values.extend(resolved);
        Ok(vars)
    }
}

struct Variables {
    values: HashMap<String, String>,
    placeholder: Regex,
}

const PLACEHOLDER: &str = r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}";

impl Variables {
    fn new(values: HashMap<String, String>) -> E2eResult<Self> {
        let placeholder = Regex::new(PLACEHOLDER).map_err(|e| E2eError::SpecParse(e.to_string()))?;
        Ok(Self { values, placeholder })
    }

    fn lookup(&self, name: &str) -> Option<String> {
        self.values
            .get(name)
            .cloned()
            .or_else(|| std::env::var(name).ok())
    }

    fn expand(&self, input: &str) -> E2eResult<String> {
        let mut missing = None;
        let expanded = self.placeholder.replace_all(input, |caps: &Captures| {
            let name = &caps[1];
            self.lookup(name).unwrap_or_else(|| {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            })
        });
        match missing {
            Some(name) => Err(E2eError::SpecParse(format!("undefined variable ${{{}}}", name))),
            None => Ok(expanded.into_owned()),
        }
    }

    fn expand_locator(&self, locator: &Locator) -> E2eResult<Locator> {
        Ok(match locator {
            Locator::Selector(selector) => Locator::Selector(self.expand(selector)?),
            Locator::Text { tag, contains } => Locator::Text {
                tag: tag.clone(),
                contains: self.expand(contains)?,
            },
        })
    }
}

impl Action {
    fn expand(&self, vars: &Variables) -> E2eResult<Action> {
        Ok(match self {
            Action::Navigate {
                url,
                wait_until,
                timeout_ms,
            } => Action::Navigate {
                url: vars.expand(url)?,
                wait_until: *wait_until,
                timeout_ms: *timeout_ms,
            },
            Action::Back { wait_until } => Action::Back {
                wait_until: *wait_until,
            },
            Action::Click { locator, timeout_ms } => Action::Click {
                locator: vars.expand_locator(locator)?,
                timeout_ms: *timeout_ms,
            },
            Action::Hover { locator, timeout_ms } => Action::Hover {
                locator: vars.expand_locator(locator)?,
                timeout_ms: *timeout_ms,
            },
            Action::SetViewport { width, height } => Action::SetViewport {
                width: *width,
                height: *height,
            },
            Action::Type {
                locator,
                text,
                timeout_ms,
            } => Action::Type {
                locator: vars.expand_locator(locator)?,
                text: vars.expand(text)?,
                timeout_ms: *timeout_ms,
            },
            Action::AssertPresent { locator, timeout_ms } => Action::AssertPresent {
                locator: vars.expand_locator(locator)?,
                timeout_ms: *timeout_ms,
            },
            Action::Probe {
                locator,
                timeout_ms,
                found,
                missing,
            } => Action::Probe {
                locator: vars.expand_locator(locator)?,
                timeout_ms: *timeout_ms,
                found: found.as_deref().map(|s| vars.expand(s)).transpose()?,
                missing: missing.as_deref().map(|s| vars.expand(s)).transpose()?,
            },
            Action::AssertUrl { contains, timeout_ms } => Action::AssertUrl {
                contains: vars.expand(contains)?,
                timeout_ms: *timeout_ms,
            },
            Action::WaitFor { locator, timeout_ms } => Action::WaitFor {
                locator: vars.expand_locator(locator)?,
                timeout_ms: *timeout_ms,
            },
            Action::Sleep { ms } => Action::Sleep { ms: *ms },
            Action::Screenshot { name } => Action::Screenshot {
                name: vars.expand(name)?,
            },
            Action::Log { message } => Action::Log {
                message: vars.expand(message)?,
            },
        })
    }

    /// Run against the session. `Some` is a detail for the step record.
    async fn perform(&self, session: &mut Session) -> E2eResult<Option<String>> {
        let default_timeout = session.default_timeout();
        let bound = |ms: &Option<u64>| ms.map(Duration::from_millis).unwrap_or(default_timeout);

        match self {
            Action::Navigate {
                url,
                wait_until,
                timeout_ms,
            } => {
                let timeout = timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(session.options().navigation_timeout);
                session.navigate_within(url, *wait_until, timeout).await?;
            }
            Action::Back { wait_until } => session.go_back(*wait_until).await?,
            Action::Click { locator, timeout_ms } => {
                let element = session.locate(locator, bound(timeout_ms)).await?;
                session.click(element).await?;
            }
            Action::Hover { locator, timeout_ms } => {
                let element = session.locate(locator, bound(timeout_ms)).await?;
                session.hover(element).await?;
            }
            Action::SetViewport { width, height } => {
                session
                    .set_viewport(Viewport {
                        width: *width,
                        height: *height,
                    })
                    .await?;
            }
            Action::Type {
                locator,
                text,
                timeout_ms,
            } => {
                let element = session.locate(locator, bound(timeout_ms)).await?;
                session.type_text(element, text).await?;
            }
            Action::AssertPresent { locator, timeout_ms } => {
                session.assert_present(locator, bound(timeout_ms)).await?;
            }
            Action::Probe {
                locator,
                timeout_ms,
                found,
                missing,
            } => {
                let present = session.probe_present(locator, bound(timeout_ms)).await?;
                let detail = match (present, found, missing) {
                    (true, Some(message), _) | (false, _, Some(message)) => message.clone(),
                    (true, None, _) => format!("{} present", locator),
                    (false, _, None) => format!("{} not present", locator),
                };
                return Ok(Some(detail));
            }
            Action::AssertUrl { contains, timeout_ms } => {
                session.wait_for_url(contains, bound(timeout_ms)).await?;
            }
            Action::WaitFor { locator, timeout_ms } => {
                session
                    .locate(locator, bound(timeout_ms))
                    .await
                    .map_err(|e| match e {
                        E2eError::ElementNotFound { locator, timeout_ms } => E2eError::ConditionTimeout {
                            condition: format!("{} to appear", locator),
                            timeout_ms,
                        },
                        other => other,
                    })?;
            }
            Action::Sleep { ms } => session.wait_fixed(Duration::from_millis(*ms)).await,
            Action::Screenshot { name } => {
                session.screenshot(name).await?;
            }
            Action::Log { message } => info!("[scenario] {}", message),
        }
        Ok(None)
    }
}

/// Actions of one scenario step, run in order. The last detail wins.
struct ActionList {
    actions: Vec<Action>,
}

#[async_trait]
impl StepAction for ActionList {
    async fn run(&self, session: &mut Session) -> E2eResult<Option<String>> {
        let mut detail = None;
        for action in &self.actions {
            if let Some(d) = action.perform(session).await? {
                detail = Some(d);
            }
        }
        Ok(detail)
    }
}
