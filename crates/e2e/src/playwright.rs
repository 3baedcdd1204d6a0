//! Playwright browser automation
//!
//! [`PlaywrightDriver`] keeps one Node.js process alive per session. The
//! process runs a small bridge script that owns a single Playwright page and
//! answers JSON-line requests on stdin/stdout:
//!
//! ```text
//! -> {"id":3,"op":"goto","url":"http://localhost:3000/login","waitUntil":"load","timeout":30000}
//! <- {"id":3,"ok":true,"result":null}
//! -> {"id":4,"op":"query","selector":"button"}
//! <- {"id":4,"ok":true,"result":[1,2]}
//! ```
//!
//! Keeping the process alive is what lets cookies and navigation state carry
//! from one step to the next. `playwright` must be resolvable from the working
//! directory's `node_modules`.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tracing::{debug, info, warn};

use crate::driver::{BrowserDriver, DriverLauncher, ElementHandle, Viewport, WaitUntil};
use crate::error::{E2eError, E2eResult};

const BRIDGE_SCRIPT: &str = r#"
const readline = require('readline');
const playwright = require('playwright');

const config = JSON.parse(process.argv[2]);
const handles = new Map();
const pageErrors = [];
let nextHandle = 1;
let browser;
let page;
let closing = false;

function reply(msg) {
  process.stdout.write(JSON.stringify(msg) + '\n');
}

function classify(op, error) {
  const message = (error && error.message) || String(error);
  if (error && error.name === 'TimeoutError') {
    return op === 'goto' || op === 'back' ? 'navigation_timeout' : 'interaction';
  }
  if (/not attached|detached/i.test(message)) return 'detached';
  if (/has been closed|Target closed|crashed/i.test(message)) return 'crashed';
  if (op === 'click' || op === 'type' || op === 'hover') return 'interaction';
  return 'driver';
}

function element(id) {
  const handle = handles.get(id);
  if (!handle) throw new Error(`element#${id} is detached from the DOM`);
  return handle;
}

function forgetHandles() {
  for (const handle of handles.values()) handle.dispose().catch(() => {});
  handles.clear();
}

const ops = {
  async goto(req) {
    forgetHandles();
    await page.goto(req.url, { waitUntil: req.waitUntil, timeout: req.timeout });
    return null;
  },
  async back(req) {
    forgetHandles();
    await page.goBack({ waitUntil: req.waitUntil, timeout: req.timeout });
    return null;
  },
  async query(req) {
    // Each lookup re-queries, so earlier handles are never reused.
    forgetHandles();
    const found = await page.$$(req.selector);
    return found.map((handle) => {
      const id = nextHandle++;
      handles.set(id, handle);
      return id;
    });
  },
  async text(req) {
    const handle = handles.get(req.handle);
    if (!handle) return null;
    try {
      return await handle.textContent();
    } catch (error) {
      return null;
    }
  },
  async click(req) {
    await element(req.handle).click({ timeout: req.timeout });
    return null;
  },
  async type(req) {
    await element(req.handle).fill(req.text, { timeout: req.timeout });
    return null;
  },
  async hover(req) {
    await element(req.handle).hover({ timeout: req.timeout });
    return null;
  },
  async viewport(req) {
    await page.setViewportSize({ width: req.width, height: req.height });
    return null;
  },
  async errors() {
    return pageErrors.splice(0, pageErrors.length);
  },
  async url() {
    return page.url();
  },
  async screenshot(req) {
    const buffer = await page.screenshot({ fullPage: req.fullPage });
    return buffer.toString('base64');
  },
  async close() {
    closing = true;
    forgetHandles();
    await browser.close();
    return null;
  },
};

(async () => {
  try {
    browser = await playwright[config.browser].launch({
      headless: config.headless,
      slowMo: config.slowMo,
    });
    browser.on('disconnected', () => {
      if (!closing) process.exit(3);
    });
    const context = await browser.newContext({ viewport: config.viewport });
    page = await context.newPage();
    page.on('console', (msg) => {
      if (msg.type() === 'error') pageErrors.push(msg.text());
    });
    page.on('pageerror', (error) => pageErrors.push(error.message));
  } catch (error) {
    reply({ id: 0, ok: false, kind: 'launch', message: error.message });
    process.exit(1);
  }
  reply({ id: 0, ok: true, result: browser.version() });

  const rl = readline.createInterface({ input: process.stdin });
  for await (const line of rl) {
    if (!line.trim()) continue;
    let req;
    try {
      req = JSON.parse(line);
    } catch (error) {
      continue;
    }
    const op = ops[req.op];
    if (!op) {
      reply({ id: req.id, ok: false, kind: 'driver', message: `unknown op ${req.op}` });
      continue;
    }
    try {
      reply({ id: req.id, ok: true, result: await op(req) });
    } catch (error) {
      reply({ id: req.id, ok: false, kind: classify(req.op, error), message: error.message });
    }
    if (req.op === 'close') break;
  }
  process.exit(0);
})();
"#;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Webkit => "webkit",
        }
    }
}

impl FromStr for BrowserKind {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(BrowserKind::Chromium),
            "firefox" => Ok(BrowserKind::Firefox),
            "webkit" | "safari" => Ok(BrowserKind::Webkit),
            other => Err(E2eError::InvalidConfig(format!("unknown browser: {}", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub browser: BrowserKind,
    pub headless: bool,
    /// Delay Playwright inserts between operations
    pub slow_mo_ms: u64,
    pub node_binary: String,
    /// Directory whose `node_modules` provides `playwright`. Defaults to the
    /// current directory.
    pub working_dir: Option<PathBuf>,
    /// Time allowed for the browser to start
    pub launch_timeout: Duration,
    /// Slack added on top of each operation's own timeout before the bridge is
    /// considered hung
    pub request_grace: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: BrowserKind::Chromium,
            headless: true,
            slow_mo_ms: 0,
            node_binary: "node".to_string(),
            working_dir: None,
            launch_timeout: Duration::from_secs(30),
            request_grace: Duration::from_secs(5),
        }
    }
}

/// Opens one Playwright page per scenario.
#[derive(Debug, Clone, Default)]
pub struct PlaywrightLauncher {
    config: PlaywrightConfig,
}

impl PlaywrightLauncher {
    pub fn new(config: PlaywrightConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DriverLauncher for PlaywrightLauncher {
    async fn launch(&self, viewport: Viewport) -> E2eResult<Box<dyn BrowserDriver>> {
        let driver = PlaywrightDriver::launch(&self.config, viewport).await?;
        Ok(Box::new(driver))
    }
}

#[derive(Debug, Deserialize)]
struct BridgeReply {
    id: u64,
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl BridgeReply {
    fn into_result(self) -> E2eResult<Value> {
        if self.ok {
            return Ok(self.result);
        }
        let message = self.message.unwrap_or_else(|| "unknown bridge error".to_string());
        Err(match self.kind.as_deref() {
            // Callers fill in the URL and bound they asked for.
            Some("navigation_timeout") => E2eError::NavigationTimeout {
                url: String::new(),
                timeout_ms: 0,
            },
            Some("interaction") | Some("detached") => E2eError::Interaction(message),
            Some("crashed") => E2eError::BrowserCrashed(message),
            _ => E2eError::Driver(message),
        })
    }
}

pub struct PlaywrightDriver {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    grace: Duration,
    // Holds the bridge script on disk for the life of the process
    _script_dir: tempfile::TempDir,
}

impl PlaywrightDriver {
    /// Spawn the bridge and wait for the browser to come up.
    pub async fn launch(config: &PlaywrightConfig, viewport: Viewport) -> E2eResult<Self> {
        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("webcheck-bridge.js");
        std::fs::write(&script_path, BRIDGE_SCRIPT)?;

        let working_dir = match &config.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        let mut node_path = working_dir.join("node_modules").into_os_string();
        if let Some(existing) = std::env::var_os("NODE_PATH") {
            node_path.push(if cfg!(windows) { ";" } else { ":" });
            node_path.push(existing);
        }

        let settings = json!({
            "browser": config.browser.as_str(),
            "headless": config.headless,
            "slowMo": config.slow_mo_ms,
            "viewport": { "width": viewport.width, "height": viewport.height },
        });

        info!(
            "Launching {} via Playwright ({}, {}x{})",
            config.browser.as_str(),
            if config.headless { "headless" } else { "headed" },
            viewport.width,
            viewport.height
        );

        let mut child = TokioCommand::new(&config.node_binary)
            .arg(&script_path)
            .arg(settings.to_string())
            .current_dir(&working_dir)
            .env("NODE_PATH", node_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => E2eError::PlaywrightNotFound,
                _ => E2eError::Io(e),
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Driver("bridge stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Driver("bridge stdout unavailable".into()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[bridge] {}", line);
                }
            });
        }

        let mut driver = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 0,
            grace: config.request_grace,
            _script_dir: script_dir,
        };

        let ready = tokio::time::timeout(config.launch_timeout, driver.read_reply(0))
            .await
            .map_err(|_| E2eError::Driver(format!("browser did not start within {:?}", config.launch_timeout)))?;
        match ready {
            Ok(reply) => {
                let version = reply.into_result()?;
                debug!("Browser ready: {}", version);
                Ok(driver)
            }
            // The bridge exits before its handshake when `playwright` cannot be required.
            Err(E2eError::BrowserCrashed(_)) => Err(E2eError::PlaywrightNotFound),
            Err(e) => Err(e),
        }
    }

    async fn request(&mut self, op: &str, mut args: Value, timeout: Duration) -> E2eResult<Value> {
        self.next_id += 1;
        let id = self.next_id;
        args["id"] = json!(id);
        args["op"] = json!(op);

        let mut line = serde_json::to_string(&args)?;
        line.push('\n');
        if let Err(e) = self.write_line(&line).await {
            return Err(E2eError::BrowserCrashed(format!("bridge stdin closed: {}", e)));
        }

        let limit = timeout + self.grace;
        match tokio::time::timeout(limit, self.read_reply(id)).await {
            Ok(reply) => reply?.into_result(),
            Err(_) => Err(unanswered(op, limit)),
        }
    }

    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await
    }

    /// Read until the reply for `id`. Replies to abandoned requests are skipped.
    async fn read_reply(&mut self, id: u64) -> E2eResult<BridgeReply> {
        loop {
            let line = match self.stdout.next_line().await? {
                Some(line) => line,
                None => {
                    let status = self.child.try_wait().ok().flatten();
                    return Err(E2eError::BrowserCrashed(match status {
                        Some(status) => format!("bridge exited with {}", status),
                        None => "bridge closed its output".to_string(),
                    }));
                }
            };
            let reply: BridgeReply = match serde_json::from_str(&line) {
                Ok(reply) => reply,
                Err(_) => {
                    debug!("[bridge] {}", line);
                    continue;
                }
            };
            if reply.id != id {
                debug!("Discarding stale bridge reply {}", reply.id);
                continue;
            }
            return Ok(reply);
        }
    }
}

#[async_trait]
impl BrowserDriver for PlaywrightDriver {
    async fn goto(&mut self, url: &str, wait_until: WaitUntil, timeout: Duration) -> E2eResult<()> {
        let args = json!({
            "url": url,
            "waitUntil": wait_until.as_str(),
            "timeout": timeout.as_millis() as u64,
        });
        self.request("goto", args, timeout)
            .await
            .map(|_| ())
            .map_err(|e| with_navigation_context(e, url, timeout))
    }

    async fn go_back(&mut self, wait_until: WaitUntil, timeout: Duration) -> E2eResult<()> {
        let args = json!({
            "waitUntil": wait_until.as_str(),
            "timeout": timeout.as_millis() as u64,
        });
        self.request("back", args, timeout)
            .await
            .map(|_| ())
            .map_err(|e| with_navigation_context(e, "history back", timeout))
    }

    async fn query_all(&mut self, selector: &str) -> E2eResult<Vec<ElementHandle>> {
        let result = self
            .request("query", json!({ "selector": selector }), Duration::ZERO)
            .await?;
        let ids: Vec<u64> = serde_json::from_value(result)?;
        Ok(ids.into_iter().map(ElementHandle).collect())
    }

    async fn text_content(&mut self, element: ElementHandle) -> E2eResult<Option<String>> {
        let result = self
            .request("text", json!({ "handle": element.0 }), Duration::ZERO)
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn click(&mut self, element: ElementHandle, timeout: Duration) -> E2eResult<()> {
        let args = json!({ "handle": element.0, "timeout": timeout.as_millis() as u64 });
        self.request("click", args, timeout).await.map(|_| ())
    }

    async fn type_text(&mut self, element: ElementHandle, text: &str, timeout: Duration) -> E2eResult<()> {
        let args = json!({
            "handle": element.0,
            "text": text,
            "timeout": timeout.as_millis() as u64,
        });
        self.request("type", args, timeout).await.map(|_| ())
    }

    async fn hover(&mut self, element: ElementHandle, timeout: Duration) -> E2eResult<()> {
        let args = json!({ "handle": element.0, "timeout": timeout.as_millis() as u64 });
        self.request("hover", args, timeout).await.map(|_| ())
    }

    async fn set_viewport(&mut self, viewport: Viewport) -> E2eResult<()> {
        let args = json!({ "width": viewport.width, "height": viewport.height });
        self.request("viewport", args, Duration::ZERO).await.map(|_| ())
    }

    async fn take_page_errors(&mut self) -> E2eResult<Vec<String>> {
        let result = self.request("errors", json!({}), Duration::ZERO).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn current_url(&mut self) -> E2eResult<String> {
        let result = self.request("url", json!({}), Duration::ZERO).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn screenshot(&mut self, full_page: bool) -> E2eResult<Vec<u8>> {
        let result = self
            .request("screenshot", json!({ "fullPage": full_page }), Duration::from_secs(30))
            .await?;
        let encoded: String = serde_json::from_value(result)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| E2eError::Driver(format!("invalid screenshot payload: {}", e)))
    }

    async fn close(&mut self) -> E2eResult<()> {
        let closed = self.request("close", json!({}), Duration::from_secs(10)).await;
        match tokio::time::timeout(self.grace, self.child.wait()).await {
            Ok(Ok(status)) => debug!("Bridge exited with {}", status),
            _ => {
                warn!("Bridge did not exit after close, killing it");
                self.child.start_kill()?;
            }
        }
        match closed {
            Ok(_) | Err(E2eError::BrowserCrashed(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Error for a request the bridge never answered. Navigations keep their
/// own kind; callers fill in the URL and bound.
fn unanswered(op: &str, limit: Duration) -> E2eError {
    match op {
        "goto" | "back" => E2eError::NavigationTimeout {
            url: String::new(),
            timeout_ms: 0,
        },
        _ => E2eError::Driver(format!("bridge did not answer '{}' within {:?}", op, limit)),
    }
}

fn with_navigation_context(err: E2eError, url: &str, timeout: Duration) -> E2eError {
    match err {
        E2eError::NavigationTimeout { .. } => E2eError::NavigationTimeout {
            url: url.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("chromium", BrowserKind::Chromium)]
    #[test_case("Chrome", BrowserKind::Chromium)]
    #[test_case("firefox", BrowserKind::Firefox)]
    #[test_case(" webkit ", BrowserKind::Webkit)]
    fn parses_browser_names(input: &str, expected: BrowserKind) {
        assert_eq!(input.parse::<BrowserKind>().unwrap(), expected);
    }

    #[test]
    fn rejects_unknown_browser() {
        assert!(matches!(
            "netscape".parse::<BrowserKind>(),
            Err(E2eError::InvalidConfig(_))
        ));
    }

    #[test]
    fn bridge_errors_are_classified() {
        let reply = |kind: &str| BridgeReply {
            id: 1,
            ok: false,
            result: Value::Null,
            kind: Some(kind.to_string()),
            message: Some("boom".to_string()),
        };
        assert!(matches!(reply("detached").into_result(), Err(E2eError::Interaction(_))));
        assert!(matches!(reply("crashed").into_result(), Err(E2eError::BrowserCrashed(_))));
        assert!(matches!(reply("driver").into_result(), Err(E2eError::Driver(_))));

        let err = reply("navigation_timeout").into_result().unwrap_err();
        let err = with_navigation_context(err, "http://localhost:3000/", Duration::from_millis(750));
        assert_eq!(
            err.to_string(),
            "Navigation to http://localhost:3000/ did not settle within 750 ms"
        );
    }

    #[test]
    fn bridge_script_handles_every_driver_op() {
        for op in [
            "goto", "back", "query", "text", "click", "type", "hover", "viewport", "errors", "url", "screenshot", "close",
        ] {
            assert!(BRIDGE_SCRIPT.contains(&format!("async {}(", op)), "missing op {}", op);
        }
    }

    #[test]
    fn every_query_releases_earlier_handles() {
        let query = BRIDGE_SCRIPT
            .split("async query(req) {")
            .nth(1)
            .and_then(|body| body.split("async text(").next())
            .unwrap();
        let release = query.find("forgetHandles();").unwrap();
        let register = query.find("handles.set(").unwrap();
        assert!(release < register);
    }

    #[test]
    fn bridge_forwards_page_errors() {
        assert!(BRIDGE_SCRIPT.contains("page.on('pageerror'"));
        assert!(BRIDGE_SCRIPT.contains("page.on('console'"));
    }

    #[test]
    fn unanswered_navigation_is_a_navigation_timeout() {
        let err = unanswered("goto", Duration::from_secs(35));
        let err = with_navigation_context(err, "http://localhost:3000/slow", Duration::from_secs(30));
        assert!(matches!(err, E2eError::NavigationTimeout { timeout_ms: 30_000, .. }));
        assert_eq!(err.kind(), "navigation_timeout");

        let err = unanswered("back", Duration::from_secs(35));
        assert!(matches!(err, E2eError::NavigationTimeout { .. }));
        assert!(matches!(unanswered("query", Duration::from_secs(5)), E2eError::Driver(_)));
    }

    #[tokio::test]
    async fn missing_node_binary_reports_playwright_not_found() {
        let config = PlaywrightConfig {
            node_binary: "webcheck-definitely-not-node".to_string(),
            ..Default::default()
        };
        let err = PlaywrightDriver::launch(&config, Viewport::default()).await.err();
        assert!(matches!(err, Some(E2eError::PlaywrightNotFound)));
    }
}
