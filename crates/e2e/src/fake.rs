//! In-memory browser driver
//!
//! [`FakeBrowser`] serves a fixed [`FakeSite`] so runners, actions and
//! scenario files can be exercised without Node.js or a real browser. It
//! supports the selector subset scenarios actually use: a tag name followed by
//! any number of `#id`, `.class`, `[attr]` and `[attr="value"]` parts, and
//! comma-separated alternatives.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::driver::{BrowserDriver, DriverLauncher, ElementHandle, Viewport, WaitUntil};
use crate::error::{E2eError, E2eResult};

/// PNG signature followed by an empty IHDR-less body. Enough for file checks.
const FAKE_PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// What happens when an element is clicked
#[derive(Debug, Clone, PartialEq)]
pub enum ClickEffect {
    /// Load another path on the same origin
    Navigate(String),

    /// Compare the values typed into `input[type=email]` and
    /// `input[type=password]` and land on one of two paths.
    Login {
        email: String,
        password: String,
        success: String,
        failure: String,
    },

    /// Log an error to the page console
    ConsoleError(String),

    /// Kill the browser
    Crash,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FakeElement {
    pub tag: String,
    pub attrs: HashMap<String, String>,
    pub text: Option<String>,
    /// Delay after page load before the element is attached
    pub appears_after: Duration,
    pub disabled: bool,
    /// Matched by queries, but every interaction fails
    pub detached: bool,
    pub on_click: Option<ClickEffect>,
}

impl FakeElement {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: HashMap::new(),
            text: None,
            appears_after: Duration::ZERO,
            disabled: false,
            detached: false,
            on_click: None,
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn id(self, id: &str) -> Self {
        self.attr("id", id)
    }

    pub fn class(mut self, class: &str) -> Self {
        let classes = match self.attrs.get("class") {
            Some(existing) => format!("{} {}", existing, class),
            None => class.to_string(),
        };
        self.attrs.insert("class".to_string(), classes);
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn appears_after(mut self, delay: Duration) -> Self {
        self.appears_after = delay;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn detached(mut self) -> Self {
        self.detached = true;
        self
    }

    pub fn on_click(mut self, effect: ClickEffect) -> Self {
        self.on_click = Some(effect);
        self
    }

    fn label(&self) -> String {
        self.attrs
            .get("id")
            .or_else(|| self.attrs.get("name"))
            .or_else(|| self.attrs.get("type"))
            .cloned()
            .unwrap_or_else(|| self.tag.clone())
    }

    fn is_editable(&self) -> bool {
        matches!(self.tag.as_str(), "input" | "textarea")
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FakePage {
    pub elements: Vec<FakeElement>,
    /// Time until the page reaches its load state
    pub load_delay: Duration,
    /// Uncaught exceptions raised while the page loads
    pub errors: Vec<String>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn element(mut self, element: FakeElement) -> Self {
        self.elements.push(element);
        self
    }

    pub fn load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn error_on_load(mut self, message: &str) -> Self {
        self.errors.push(message.to_string());
        self
    }
}

/// Pages keyed by path (query string included when registered with one)
#[derive(Debug, Clone, Default)]
pub struct FakeSite {
    pages: HashMap<String, FakePage>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, path: &str, page: FakePage) -> Self {
        self.pages.insert(path.to_string(), page);
        self
    }

    fn lookup(&self, path: &str) -> FakePage {
        if let Some(page) = self.pages.get(path) {
            return page.clone();
        }
        let without_query = path.split('?').next().unwrap_or(path);
        self.pages.get(without_query).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct BrowserState {
    site: FakeSite,
    viewport: Viewport,
    current_url: Option<String>,
    history: Vec<String>,
    page: FakePage,
    loaded_at: Option<Instant>,
    /// Handle ids are `generation << 32 | index` so stale handles never resolve.
    generation: u64,
    /// `(label, input type, text)` in typing order
    typed: Vec<(String, Option<String>, String)>,
    hovered: Vec<String>,
    page_errors: Vec<String>,
    crashed: bool,
    closed: bool,
    close_count: usize,
    screenshot_count: usize,
}

impl BrowserState {
    fn ensure_alive(&self) -> E2eResult<()> {
        if self.crashed {
            return Err(E2eError::BrowserCrashed("browser process exited".into()));
        }
        if self.closed {
            return Err(E2eError::Driver("page has been closed".into()));
        }
        Ok(())
    }

    fn attached(&self, index: usize) -> bool {
        let Some(element) = self.page.elements.get(index) else {
            return false;
        };
        match self.loaded_at {
            Some(at) => at.elapsed() >= element.appears_after,
            None => false,
        }
    }

    fn handle(&self, index: usize) -> ElementHandle {
        ElementHandle((self.generation << 32) | index as u64)
    }

    fn resolve(&self, handle: ElementHandle) -> Option<usize> {
        if handle.0 >> 32 != self.generation {
            return None;
        }
        let index = (handle.0 & 0xffff_ffff) as usize;
        self.attached(index).then_some(index)
    }

    fn absolute(&self, path: &str) -> String {
        if path.contains("://") {
            return path.to_string();
        }
        let origin = self
            .current_url
            .as_deref()
            .map(origin_of)
            .unwrap_or("http://localhost:3000");
        format!("{}{}", origin, path)
    }

    fn load(&mut self, url: String) -> Duration {
        self.page = self.site.lookup(path_of(&url));
        self.generation += 1;
        self.loaded_at = Some(Instant::now());
        self.current_url = Some(url);
        let errors = self.page.errors.clone();
        self.page_errors.extend(errors);
        self.page.load_delay
    }

    /// Index of a live, interactable element
    fn interactable(&self, element: ElementHandle) -> E2eResult<usize> {
        let index = self
            .resolve(element)
            .ok_or_else(|| E2eError::Interaction(format!("{} is detached from the DOM", element)))?;
        let target = &self.page.elements[index];
        if target.detached {
            return Err(E2eError::Interaction(format!("{} is detached from the DOM", element)));
        }
        if target.disabled {
            return Err(E2eError::Interaction(format!("{} is not enabled", element)));
        }
        Ok(index)
    }

    fn typed_value(&self, input_type: &str) -> Option<&str> {
        self.typed
            .iter()
            .rev()
            .find(|(_, kind, _)| kind.as_deref() == Some(input_type))
            .map(|(_, _, value)| value.as_str())
    }
}

/// Shared handle onto one fake browser. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct FakeBrowser {
    state: Arc<Mutex<BrowserState>>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_site(site: FakeSite) -> Self {
        let browser = Self::default();
        browser.state().site = site;
        browser
    }

    fn state(&self) -> MutexGuard<'_, BrowserState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A driver bound to this browser
    pub fn driver(&self) -> FakeDriver {
        FakeDriver {
            browser: self.clone(),
        }
    }

    /// Simulate the browser process dying.
    pub fn crash(&self) {
        self.state().crashed = true;
    }

    pub fn close_count(&self) -> usize {
        self.state().close_count
    }

    pub fn screenshot_count(&self) -> usize {
        self.state().screenshot_count
    }

    pub fn current_url(&self) -> Option<String> {
        self.state().current_url.clone()
    }

    pub fn viewport(&self) -> Viewport {
        self.state().viewport
    }

    /// Labels of hovered elements, in order
    pub fn hovered(&self) -> Vec<String> {
        self.state().hovered.clone()
    }

    /// `(element label, text)` pairs in typing order
    pub fn typed(&self) -> Vec<(String, String)> {
        self.state()
            .typed
            .iter()
            .map(|(label, _, value)| (label.clone(), value.clone()))
            .collect()
    }
}

pub struct FakeDriver {
    browser: FakeBrowser,
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn goto(&mut self, url: &str, _wait_until: WaitUntil, timeout: Duration) -> E2eResult<()> {
        let delay = {
            let mut state = self.browser.state();
            state.ensure_alive()?;
            if let Some(previous) = state.current_url.take() {
                state.history.push(previous);
            }
            state.load(url.to_string())
        };
        settle(url, delay, timeout).await
    }

    async fn go_back(&mut self, _wait_until: WaitUntil, timeout: Duration) -> E2eResult<()> {
        let (url, delay) = {
            let mut state = self.browser.state();
            state.ensure_alive()?;
            match state.history.pop() {
                Some(url) => {
                    let delay = state.load(url.clone());
                    (url, delay)
                }
                None => return Ok(()),
            }
        };
        settle(&url, delay, timeout).await
    }

    async fn query_all(&mut self, selector: &str) -> E2eResult<Vec<ElementHandle>> {
        let state = self.browser.state();
        state.ensure_alive()?;
        let selector = Selector::parse(selector)?;
        Ok(state
            .page
            .elements
            .iter()
            .enumerate()
            .filter(|(index, element)| state.attached(*index) && selector.matches(element))
            .map(|(index, _)| state.handle(index))
            .collect())
    }

    async fn text_content(&mut self, element: ElementHandle) -> E2eResult<Option<String>> {
        let state = self.browser.state();
        state.ensure_alive()?;
        Ok(state
            .resolve(element)
            .and_then(|index| state.page.elements[index].text.clone()))
    }

    async fn click(&mut self, element: ElementHandle, _timeout: Duration) -> E2eResult<()> {
        let navigation = {
            let mut state = self.browser.state();
            state.ensure_alive()?;
            let index = state.interactable(element)?;
            let target = state.page.elements[index].clone();
            match target.on_click {
                None => None,
                Some(ClickEffect::Crash) => {
                    state.crashed = true;
                    return Err(E2eError::BrowserCrashed("browser process exited".into()));
                }
                Some(ClickEffect::Navigate(path)) => Some(path),
                Some(ClickEffect::ConsoleError(message)) => {
                    state.page_errors.push(message);
                    None
                }
                Some(ClickEffect::Login {
                    email,
                    password,
                    success,
                    failure,
                }) => {
                    let accepted = state.typed_value("email") == Some(email.as_str())
                        && state.typed_value("password") == Some(password.as_str());
                    Some(if accepted { success } else { failure })
                }
            }
        };

        if let Some(path) = navigation {
            let mut state = self.browser.state();
            let url = state.absolute(&path);
            if let Some(previous) = state.current_url.take() {
                state.history.push(previous);
            }
            state.load(url);
        }
        Ok(())
    }

    async fn type_text(&mut self, element: ElementHandle, text: &str, _timeout: Duration) -> E2eResult<()> {
        let mut state = self.browser.state();
        state.ensure_alive()?;
        let index = state
            .resolve(element)
            .ok_or_else(|| E2eError::Interaction(format!("{} is detached from the DOM", element)))?;
        let target = &state.page.elements[index];
        if target.detached {
            return Err(E2eError::Interaction(format!("{} is detached from the DOM", element)));
        }
        if target.disabled || !target.is_editable() {
            return Err(E2eError::Interaction(format!("{} is not an editable field", element)));
        }
        let entry = (target.label(), target.attrs.get("type").cloned(), text.to_string());
        state.typed.push(entry);
        Ok(())
    }

    async fn hover(&mut self, element: ElementHandle, _timeout: Duration) -> E2eResult<()> {
        let mut state = self.browser.state();
        state.ensure_alive()?;
        let index = state.interactable(element)?;
        let label = state.page.elements[index].label();
        state.hovered.push(label);
        Ok(())
    }

    async fn set_viewport(&mut self, viewport: Viewport) -> E2eResult<()> {
        let mut state = self.browser.state();
        state.ensure_alive()?;
        state.viewport = viewport;
        Ok(())
    }

    async fn take_page_errors(&mut self) -> E2eResult<Vec<String>> {
        let mut state = self.browser.state();
        state.ensure_alive()?;
        Ok(std::mem::take(&mut state.page_errors))
    }

    async fn current_url(&mut self) -> E2eResult<String> {
        let state = self.browser.state();
        state.ensure_alive()?;
        Ok(state.current_url.clone().unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn screenshot(&mut self, _full_page: bool) -> E2eResult<Vec<u8>> {
        let mut state = self.browser.state();
        state.ensure_alive()?;
        state.screenshot_count += 1;
        Ok(FAKE_PNG.to_vec())
    }

    async fn close(&mut self) -> E2eResult<()> {
        let mut state = self.browser.state();
        state.closed = true;
        state.close_count += 1;
        Ok(())
    }
}

async fn settle(url: &str, delay: Duration, timeout: Duration) -> E2eResult<()> {
    if delay > timeout {
        tokio::time::sleep(timeout).await;
        return Err(E2eError::NavigationTimeout {
            url: url.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        });
    }
    tokio::time::sleep(delay).await;
    Ok(())
}

/// Launches a fresh [`FakeBrowser`] over the same site for every session.
#[derive(Debug, Clone, Default)]
pub struct FakeLauncher {
    site: FakeSite,
    launched: Arc<Mutex<Vec<FakeBrowser>>>,
    fail_launch: bool,
}

impl FakeLauncher {
    pub fn new(site: FakeSite) -> Self {
        Self {
            site,
            ..Default::default()
        }
    }

    /// A launcher whose every launch fails, as when no browser is installed.
    pub fn failing() -> Self {
        Self {
            fail_launch: true,
            ..Default::default()
        }
    }

    /// Browsers launched so far, in launch order
    pub fn browsers(&self) -> Vec<FakeBrowser> {
        self.launched
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl DriverLauncher for FakeLauncher {
    async fn launch(&self, viewport: Viewport) -> E2eResult<Box<dyn BrowserDriver>> {
        if self.fail_launch {
            return Err(E2eError::PlaywrightNotFound);
        }
        let browser = FakeBrowser::with_site(self.site.clone());
        browser.state().viewport = viewport;
        self.launched
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(browser.clone());
        Ok(Box::new(browser.driver()))
    }
}

fn origin_of(url: &str) -> &str {
    match url.find("://") {
        Some(scheme_end) => {
            let rest = &url[scheme_end + 3..];
            match rest.find('/') {
                Some(slash) => &url[..scheme_end + 3 + slash],
                None => url,
            }
        }
        None => "",
    }
}

fn path_of(url: &str) -> &str {
    let origin = origin_of(url);
    let path = &url[origin.len()..];
    if path.is_empty() {
        "/"
    } else {
        path
    }
}

/// Parsed selector: alternatives of compound parts
struct Selector {
    alternatives: Vec<Compound>,
}

#[derive(Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, Option<String>)>,
}

impl Selector {
    fn parse(selector: &str) -> E2eResult<Self> {
        let alternatives = selector
            .split(',')
            .map(|part| Compound::parse(part.trim()))
            .collect::<E2eResult<Vec<_>>>()?;
        Ok(Self { alternatives })
    }

    fn matches(&self, element: &FakeElement) -> bool {
        self.alternatives.iter().any(|c| c.matches(element))
    }
}

impl Compound {
    fn parse(input: &str) -> E2eResult<Self> {
        let invalid = || E2eError::Driver(format!("unsupported selector: {}", input));
        if input.is_empty() || (input.contains(char::is_whitespace) && !input.contains('[')) {
            return Err(invalid());
        }

        let mut compound = Compound::default();
        let mut rest = input;

        let tag_end = rest.find(['#', '.', '[']).unwrap_or(rest.len());
        if tag_end > 0 {
            compound.tag = Some(rest[..tag_end].to_ascii_lowercase());
        }
        rest = &rest[tag_end..];

        while let Some(first) = rest.chars().next() {
            match first {
                '#' | '.' => {
                    let end = rest[1..].find(['#', '.', '[']).map(|i| i + 1).unwrap_or(rest.len());
                    let name = rest[1..end].to_string();
                    if first == '#' {
                        compound.id = Some(name);
                    } else {
                        compound.classes.push(name);
                    }
                    rest = &rest[end..];
                }
                '[' => {
                    let end = rest.find(']').ok_or_else(invalid)?;
                    let body = &rest[1..end];
                    match body.split_once('=') {
                        Some((name, value)) => {
                            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
                            compound
                                .attrs
                                .push((name.trim().to_string(), Some(value.to_string())));
                        }
                        None => compound.attrs.push((body.trim().to_string(), None)),
                    }
                    rest = &rest[end + 1..];
                }
                _ => return Err(invalid()),
            }
        }
        Ok(compound)
    }

    fn matches(&self, element: &FakeElement) -> bool {
        if let Some(tag) = &self.tag {
            if tag != "*" && *tag != element.tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.attrs.get("id") != Some(id) {
                return false;
            }
        }
        let classes: Vec<&str> = element
            .attrs
            .get("class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default();
        if !self.classes.iter().all(|c| classes.contains(&c.as_str())) {
            return false;
        }
        self.attrs.iter().all(|(name, expected)| match (element.attrs.get(name), expected) {
            (Some(actual), Some(expected)) => actual == expected,
            (Some(_), None) => true,
            (None, _) => false,
        })
    }
}
