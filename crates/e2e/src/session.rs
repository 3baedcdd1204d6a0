//! Browser session lifecycle
//!
//! A [`Session`] wraps one driver (one page) together with the settings the
//! action primitives need: base URL, viewport, timeouts and where
//! screenshots go. The runner creates one per scenario and closes it on every
//! exit path.

use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::artifacts::ArtifactDir;
use crate::driver::{BrowserDriver, DriverLauncher, Viewport};
use crate::error::E2eResult;

/// Settings shared by every primitive in a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Base URL relative navigations are resolved against
    pub base_url: String,

    pub viewport: Viewport,

    /// Default bound for `navigate`
    pub navigation_timeout: Duration,

    /// Default bound for `locate` and interactions
    pub locate_timeout: Duration,

    /// Polling interval for condition waits
    pub poll_interval: Duration,

    /// Capture the full scrollable page instead of the viewport
    pub full_page_screenshots: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            viewport: Viewport::default(),
            navigation_timeout: Duration::from_secs(30),
            locate_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
            full_page_screenshots: true,
        }
    }
}

pub struct Session {
    driver: Box<dyn BrowserDriver>,
    options: SessionOptions,
    artifacts: ArtifactDir,
    screenshots: Vec<PathBuf>,
    current_url: Option<String>,
    closed: bool,
}

impl Session {
    /// Launch a fresh driver and bind a session to it.
    pub async fn open(
        launcher: &dyn DriverLauncher,
        options: SessionOptions,
        artifacts: ArtifactDir,
    ) -> E2eResult<Self> {
        info!(
            "Opening browser session ({}x{}, base {})",
            options.viewport.width, options.viewport.height, options.base_url
        );
        let driver = launcher.launch(options.viewport).await?;
        Ok(Self::with_driver(driver, options, artifacts))
    }

    pub fn with_driver(
        driver: Box<dyn BrowserDriver>,
        options: SessionOptions,
        artifacts: ArtifactDir,
    ) -> Self {
        Self {
            driver,
            options,
            artifacts,
            screenshots: Vec::new(),
            current_url: None,
            closed: false,
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn viewport(&self) -> Viewport {
        self.options.viewport
    }

    pub fn default_timeout(&self) -> Duration {
        self.options.locate_timeout
    }

    /// URL recorded after the last navigation, if any
    pub fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    /// Screenshots captured so far, in capture order
    pub fn screenshots(&self) -> &[PathBuf] {
        &self.screenshots
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Resolve a possibly relative URL against the base URL.
    pub fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") || url.starts_with("about:") {
            return url.to_string();
        }
        let base = self.options.base_url.trim_end_matches('/');
        if url.starts_with('/') {
            format!("{}{}", base, url)
        } else {
            format!("{}/{}", base, url)
        }
    }

    /// Close the driver. Safe to call more than once.
    pub async fn close(&mut self) -> E2eResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        debug!("Closing browser session");
        self.driver.close().await
    }

    pub(crate) fn driver(&mut self) -> &mut dyn BrowserDriver {
        self.driver.as_mut()
    }

    pub(crate) fn set_viewport_option(&mut self, viewport: Viewport) {
        self.options.viewport = viewport;
    }

    pub(crate) fn set_current_url(&mut self, url: String) {
        self.current_url = Some(url);
    }

    pub(crate) fn next_screenshot_path(&mut self, name: &str) -> PathBuf {
        self.artifacts.next_screenshot_path(name)
    }

    pub(crate) fn record_screenshot(&mut self, path: PathBuf) {
        self.screenshots.push(path);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.closed {
            // Drivers clean up their own processes on drop; this only flags the leak.
            warn!("Browser session dropped without being closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeBrowser;

    fn session_with_base(base: &str) -> Session {
        let options = SessionOptions {
            base_url: base.to_string(),
            ..Default::default()
        };
        Session::with_driver(
            Box::new(FakeBrowser::new().driver()),
            options,
            ArtifactDir::new("/tmp/webcheck-session-test"),
        )
    }

    #[tokio::test]
    async fn resolves_relative_urls() {
        let mut session = session_with_base("http://localhost:3000/");
        assert_eq!(session.resolve_url("/login"), "http://localhost:3000/login");
        assert_eq!(session.resolve_url("login"), "http://localhost:3000/login");
        assert_eq!(
            session.resolve_url("https://example.org/x"),
            "https://example.org/x"
        );
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let browser = FakeBrowser::new();
        let mut session = Session::with_driver(
            Box::new(browser.driver()),
            SessionOptions::default(),
            ArtifactDir::new("/tmp/webcheck-session-test"),
        );
        session.close().await.unwrap();
        session.close().await.unwrap();
        assert!(session.is_closed());
        assert_eq!(browser.close_count(), 1);
    }
}
