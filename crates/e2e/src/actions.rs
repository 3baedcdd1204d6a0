//! Action primitives
//!
//! Every primitive resolves or fails within a bounded time and none of them
//! retries on its own. Lookups go through a single [`Session::locate`] so
//! selector and text locators share the same polling and timeout behaviour.

use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::driver::{ElementHandle, Viewport, WaitUntil};
use crate::error::{E2eError, E2eResult};
use crate::locator::Locator;
use crate::session::Session;

impl Session {
    /// Navigate with the session's default navigation timeout.
    pub async fn navigate(&mut self, url: &str, wait_until: WaitUntil) -> E2eResult<()> {
        let timeout = self.options().navigation_timeout;
        self.navigate_within(url, wait_until, timeout).await
    }

    pub async fn navigate_within(
        &mut self,
        url: &str,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> E2eResult<()> {
        let target = self.resolve_url(url);
        debug!("navigate {} (wait_until={})", target, wait_until.as_str());
        self.driver().goto(&target, wait_until, timeout).await?;
        self.refresh_url().await?;
        Ok(())
    }

    pub async fn go_back(&mut self, wait_until: WaitUntil) -> E2eResult<()> {
        let timeout = self.options().navigation_timeout;
        debug!("history back");
        self.driver().go_back(wait_until, timeout).await?;
        self.refresh_url().await?;
        Ok(())
    }

    /// Ask the driver for the live URL and cache it on the session.
    pub async fn refresh_url(&mut self) -> E2eResult<String> {
        let url = self.driver().current_url().await?;
        self.set_current_url(url.clone());
        Ok(url)
    }

    /// Poll until `locator` matches, returning the first match in document
    /// order. Fails with `ElementNotFound` once `timeout` has elapsed.
    pub async fn locate(&mut self, locator: &Locator, timeout: Duration) -> E2eResult<ElementHandle> {
        let deadline = Instant::now() + timeout;
        let poll = self.options().poll_interval;
        debug!("locate {} (timeout {:?})", locator, timeout);

        loop {
            if let Some(handle) = self.first_match(locator).await? {
                debug!("located {} as {}", locator, handle);
                return Ok(handle);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(E2eError::ElementNotFound {
                    locator: locator.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(poll.min(deadline - now)).await;
        }
    }

    async fn first_match(&mut self, locator: &Locator) -> E2eResult<Option<ElementHandle>> {
        let candidates = self.driver().query_all(locator.candidate_selector()).await?;
        if !locator.is_text() {
            return Ok(candidates.into_iter().next());
        }
        for handle in candidates {
            let text = self.driver().text_content(handle).await?;
            if locator.accepts_text(text.as_deref()) {
                return Ok(Some(handle));
            }
        }
        Ok(None)
    }

    /// Fails the calling step when the element does not appear in time.
    pub async fn assert_present(&mut self, locator: &Locator, timeout: Duration) -> E2eResult<ElementHandle> {
        self.locate(locator, timeout).await
    }

    /// Like [`Session::assert_present`] but reports absence as `false`.
    /// Anything other than absence (a bad selector, an unresponsive driver, a
    /// lost browser) is still an error.
    pub async fn probe_present(&mut self, locator: &Locator, timeout: Duration) -> E2eResult<bool> {
        match self.locate(locator, timeout).await {
            Ok(_) => Ok(true),
            Err(err @ (E2eError::ElementNotFound { .. } | E2eError::Interaction(_))) => {
                debug!("probe for {} came back empty: {}", locator, err);
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn click(&mut self, element: ElementHandle) -> E2eResult<()> {
        let timeout = self.default_timeout();
        debug!("click {}", element);
        self.driver().click(element, timeout).await?;
        self.refresh_url().await?;
        Ok(())
    }

    pub async fn type_text(&mut self, element: ElementHandle, text: &str) -> E2eResult<()> {
        let timeout = self.default_timeout();
        debug!("type {} chars into {}", text.chars().count(), element);
        self.driver().type_text(element, text, timeout).await
    }

    /// Locate with the default timeout, then click.
    pub async fn click_on(&mut self, locator: &Locator) -> E2eResult<()> {
        let timeout = self.default_timeout();
        let element = self.locate(locator, timeout).await?;
        self.click(element).await
    }

    /// Locate with the default timeout, then type.
    pub async fn type_into(&mut self, locator: &Locator, text: &str) -> E2eResult<()> {
        let timeout = self.default_timeout();
        let element = self.locate(locator, timeout).await?;
        self.type_text(element, text).await
    }

    pub async fn hover(&mut self, element: ElementHandle) -> E2eResult<()> {
        let timeout = self.default_timeout();
        debug!("hover {}", element);
        self.driver().hover(element, timeout).await
    }

    /// Locate with the default timeout, then hover.
    pub async fn hover_on(&mut self, locator: &Locator) -> E2eResult<()> {
        let timeout = self.default_timeout();
        let element = self.locate(locator, timeout).await?;
        self.hover(element).await
    }

    /// Resize the page for responsive checks. Later screenshots use the new
    /// size.
    pub async fn set_viewport(&mut self, viewport: Viewport) -> E2eResult<()> {
        if viewport.width == 0 || viewport.height == 0 {
            return Err(E2eError::Interaction(format!(
                "viewport {}x{} has no area",
                viewport.width, viewport.height
            )));
        }
        info!("Viewport set to {}x{}", viewport.width, viewport.height);
        self.driver().set_viewport(viewport).await?;
        self.set_viewport_option(viewport);
        Ok(())
    }

    /// Drain console errors and uncaught exceptions the page has raised.
    pub async fn page_errors(&mut self) -> E2eResult<Vec<String>> {
        self.driver().take_page_errors().await
    }

    /// Unconditional sleep. Prefer a condition wait.
    pub async fn wait_fixed(&mut self, duration: Duration) {
        debug!("fixed wait {:?}", duration);
        tokio::time::sleep(duration).await;
    }

    /// Wait until the live URL contains `substring`.
    pub async fn wait_for_url(&mut self, substring: &str, timeout: Duration) -> E2eResult<String> {
        let deadline = Instant::now() + timeout;
        let poll = self.options().poll_interval;

        loop {
            let url = self.refresh_url().await?;
            if url.contains(substring) {
                return Ok(url);
            }
            let now = Instant::now();
            if now >= deadline {
                warn!("URL is still {} after {:?}", url, timeout);
                return Err(E2eError::ConditionTimeout {
                    condition: format!("URL containing \"{}\" (last seen {})", substring, url),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(poll.min(deadline - now)).await;
        }
    }

    /// Capture the page into the run's screenshot directory.
    pub async fn screenshot(&mut self, name: &str) -> E2eResult<PathBuf> {
        let full_page = self.options().full_page_screenshots;
        let bytes = self.driver().screenshot(full_page).await?;
        let path = self.next_screenshot_path(name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        info!("Screenshot saved: {}", path.display());
        self.record_screenshot(path.clone());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactDir;
    use crate::fake::{ClickEffect, FakeBrowser, FakeElement, FakePage, FakeSite};
    use crate::session::SessionOptions;

    fn site() -> FakeSite {
        FakeSite::new()
            .page(
                "/",
                FakePage::new()
                    .element(FakeElement::new("button").text("Cancel"))
                    .element(FakeElement::new("button").id("first-save").text("Save draft"))
                    .element(FakeElement::new("button").id("second-save").text("Save"))
                    .element(
                        FakeElement::new("a")
                            .text("Profile")
                            .on_click(ClickEffect::Navigate("/profile".into())),
                    )
                    .element(
                        FakeElement::new("div")
                            .id("late")
                            .appears_after(Duration::from_millis(150)),
                    )
                    .element(FakeElement::new("button").id("off").text("Disabled").disabled()),
            )
            .page("/profile", FakePage::new().element(FakeElement::new("h1").text("Profile")))
    }

    async fn session(root: &std::path::Path) -> (FakeBrowser, Session) {
        let browser = FakeBrowser::with_site(site());
        let options = SessionOptions {
            locate_timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(20),
            ..Default::default()
        };
        let mut session = Session::with_driver(Box::new(browser.driver()), options, ArtifactDir::new(root));
        session.navigate("/", WaitUntil::Load).await.unwrap();
        (browser, session)
    }

    #[tokio::test]
    async fn text_lookup_takes_first_match_in_document_order() {
        let dir = tempfile::tempdir().unwrap();
        let (_, mut session) = session(dir.path()).await;

        let by_text = session
            .locate(&Locator::text("button", "Save"), Duration::from_millis(100))
            .await
            .unwrap();
        let first = session
            .locate(&Locator::css("#first-save"), Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(by_text, first);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn locate_gives_up_near_the_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let (_, mut session) = session(dir.path()).await;

        let started = std::time::Instant::now();
        let err = session
            .locate(&Locator::css("#never"), Duration::from_millis(200))
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, E2eError::ElementNotFound { timeout_ms: 200, .. }));
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(600), "took {:?}", elapsed);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn locate_waits_for_late_elements() {
        let dir = tempfile::tempdir().unwrap();
        let (_, mut session) = session(dir.path()).await;
        session
            .assert_present(&Locator::css("#late"), Duration::from_secs(2))
            .await
            .unwrap();
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn probe_reports_absence_without_failing() {
        let dir = tempfile::tempdir().unwrap();
        let (_, mut session) = session(dir.path()).await;
        let found = session
            .probe_present(&Locator::text("h3", "Statistics"), Duration::from_millis(50))
            .await
            .unwrap();
        assert!(!found);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn presence_check_surfaces_errors_other_than_absence() {
        let dir = tempfile::tempdir().unwrap();
        let (_, mut session) = session(dir.path()).await;
        let err = session
            .probe_present(&Locator::css("div > span"), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, E2eError::Driver(_)));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn presence_check_surfaces_a_lost_browser() {
        let dir = tempfile::tempdir().unwrap();
        let (browser, mut session) = session(dir.path()).await;
        browser.crash();
        let err = session
            .probe_present(&Locator::css("#late"), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn fixed_wait_can_cross_threads() {
        fn require_send<F: std::future::Future + Send>(future: F) -> F {
            future
        }
        let dir = tempfile::tempdir().unwrap();
        let (_, mut session) = session(dir.path()).await;
        let started = std::time::Instant::now();
        require_send(session.wait_fixed(Duration::from_millis(30))).await;
        assert!(started.elapsed() >= Duration::from_millis(30));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn hover_needs_an_interactable_element() {
        let dir = tempfile::tempdir().unwrap();
        let (browser, mut session) = session(dir.path()).await;
        session.hover_on(&Locator::text("a", "Profile")).await.unwrap();
        let err = session.hover_on(&Locator::css("#off")).await.unwrap_err();
        assert!(matches!(err, E2eError::Interaction(_)));
        assert_eq!(browser.hovered(), ["a"]);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn viewport_change_is_kept_on_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let (browser, mut session) = session(dir.path()).await;
        let phone = Viewport { width: 375, height: 667 };
        session.set_viewport(phone).await.unwrap();
        assert_eq!(session.viewport(), phone);
        assert_eq!(browser.viewport(), phone);

        let err = session.set_viewport(Viewport { width: 0, height: 667 }).await.unwrap_err();
        assert!(matches!(err, E2eError::Interaction(_)));
        assert_eq!(session.viewport(), phone);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn clicking_a_disabled_element_is_an_interaction_error() {
        let dir = tempfile::tempdir().unwrap();
        let (_, mut session) = session(dir.path()).await;
        let err = session.click_on(&Locator::css("#off")).await.unwrap_err();
        assert!(matches!(err, E2eError::Interaction(_)));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn click_then_wait_for_url() {
        let dir = tempfile::tempdir().unwrap();
        let (_, mut session) = session(dir.path()).await;
        session.click_on(&Locator::text("a", "Profile")).await.unwrap();
        let url = session
            .wait_for_url("/profile", Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(url, "http://localhost:3000/profile");
        assert_eq!(session.current_url(), Some("http://localhost:3000/profile"));

        session.go_back(WaitUntil::Load).await.unwrap();
        let err = session
            .wait_for_url("/profile", Duration::from_millis(60))
            .await
            .unwrap_err();
        assert!(matches!(err, E2eError::ConditionTimeout { .. }));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn screenshot_is_written_and_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let (browser, mut session) = session(dir.path()).await;
        let path = session.screenshot("home page").await.unwrap();

        assert!(path.exists());
        assert!(path.starts_with(dir.path().join("screenshots")));
        assert!(path.to_string_lossy().ends_with("_home_page.png"));
        assert_eq!(session.screenshots(), &[path]);
        assert_eq!(browser.screenshot_count(), 1);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn unwritable_screenshot_dir_surfaces_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("out");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let (_, mut session) = session(&blocker).await;

        let err = session.screenshot("x").await.unwrap_err();
        assert!(matches!(err, E2eError::Io(_)));
        session.close().await.unwrap();
    }
}
