//! Browser driver abstraction
//!
//! A driver controls exactly one page. Everything above it (locating by
//! text, polling, screenshots on disk) lives in [`crate::session`] and
//! [`crate::actions`] so that every backend behaves the same way.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::E2eResult;

/// Opaque reference to a live element inside the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle(pub u64);

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element#{}", self.0)
    }
}

/// Page readiness condition for navigation. Spelled the way Playwright
/// spells it (`load`, `domcontentloaded`, `networkidle`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitUntil {
    #[default]
    #[serde(rename = "load")]
    Load,
    #[serde(rename = "domcontentloaded", alias = "dom_content_loaded", alias = "dom_ready")]
    DomContentLoaded,
    #[serde(rename = "networkidle", alias = "network_idle")]
    NetworkIdle,
}

impl WaitUntil {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitUntil::Load => "load",
            WaitUntil::DomContentLoaded => "domcontentloaded",
            WaitUntil::NetworkIdle => "networkidle",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// A single controlled page.
#[async_trait]
pub trait BrowserDriver: Send {
    /// Navigate and wait for `wait_until`, failing with `NavigationTimeout`.
    async fn goto(&mut self, url: &str, wait_until: WaitUntil, timeout: Duration) -> E2eResult<()>;

    /// Navigate back in history.
    async fn go_back(&mut self, wait_until: WaitUntil, timeout: Duration) -> E2eResult<()>;

    /// All elements matching a CSS selector, in document order. Handles
    /// from earlier queries may be released.
    async fn query_all(&mut self, selector: &str) -> E2eResult<Vec<ElementHandle>>;

    /// Rendered text of an element, `None` when it is detached.
    async fn text_content(&mut self, element: ElementHandle) -> E2eResult<Option<String>>;

    async fn click(&mut self, element: ElementHandle, timeout: Duration) -> E2eResult<()>;

    async fn type_text(&mut self, element: ElementHandle, text: &str, timeout: Duration) -> E2eResult<()>;

    /// Move the pointer over an element.
    async fn hover(&mut self, element: ElementHandle, timeout: Duration) -> E2eResult<()>;

    /// Resize the page in place. Cookies and history are kept.
    async fn set_viewport(&mut self, viewport: Viewport) -> E2eResult<()>;

    /// Console errors and uncaught page exceptions raised since the last call.
    async fn take_page_errors(&mut self) -> E2eResult<Vec<String>>;

    async fn current_url(&mut self) -> E2eResult<String>;

    /// PNG bytes of the rendered page.
    async fn screenshot(&mut self, full_page: bool) -> E2eResult<Vec<u8>>;

    /// Release the page and the underlying browser.
    async fn close(&mut self) -> E2eResult<()>;
}

/// Opens fresh drivers, one per scenario run.
#[async_trait]
pub trait DriverLauncher: Send + Sync {
    async fn launch(&self, viewport: Viewport) -> E2eResult<Box<dyn BrowserDriver>>;
}
