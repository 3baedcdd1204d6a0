//! Output file layout
//!
//! Every file a run produces is timestamp-qualified and carries a
//! process-wide counter, so neither repeated runs nor two sessions with the
//! same label in the same millisecond overwrite each other:
//!
//! ```text
//! <output>/screenshots/1718000000123_s1_001_login-flow_login-page.png
//! <output>/reports/login-flow_20240610T101500123_1.json
//! ```

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);
static NEXT_REPORT: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
pub struct ArtifactDir {
    root: PathBuf,
    /// Scenario label, keeps concurrent runs apart
    label: Option<String>,
    /// Unique within the process
    session: u64,
    sequence: u32,
}

impl ArtifactDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            label: None,
            session: NEXT_SESSION.fetch_add(1, Ordering::Relaxed),
            sequence: 0,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(sanitize_name(label));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn screenshot_dir(&self) -> PathBuf {
        self.root.join("screenshots")
    }

    pub fn report_dir(&self) -> PathBuf {
        self.root.join("reports")
    }

    /// Next screenshot path for `name`. Does not touch the filesystem.
    pub fn next_screenshot_path(&mut self, name: &str) -> PathBuf {
        self.sequence += 1;
        let name = match &self.label {
            Some(label) => format!("{}_{}", label, sanitize_name(name)),
            None => sanitize_name(name),
        };
        let filename = format!(
            "{}_s{}_{:03}_{}.png",
            Utc::now().timestamp_millis(),
            self.session,
            self.sequence,
            name
        );
        self.screenshot_dir().join(filename)
    }

    /// Fresh report path for `scenario`. No two calls in a process return
    /// the same path.
    pub fn report_path(&self, scenario: &str) -> PathBuf {
        let filename = format!(
            "{}_{}_{}.json",
            sanitize_name(scenario),
            Utc::now().format("%Y%m%dT%H%M%S%3f"),
            NEXT_REPORT.fetch_add(1, Ordering::Relaxed)
        );
        self.report_dir().join(filename)
    }
}

/// Replace anything that is not safe in a filename.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("login page", "login_page")]
    #[test_case("Dashboard - Profile", "Dashboard_-_Profile")]
    #[test_case("a/b\\c", "a_b_c")]
    #[test_case("   ", "unnamed")]
    fn sanitizes(input: &str, expected: &str) {
        assert_eq!(sanitize_name(input), expected);
    }

    #[test]
    fn screenshot_paths_are_unique_within_a_run() {
        let mut dir = ArtifactDir::new("/tmp/webcheck-test");
        let a = dir.next_screenshot_path("step");
        let b = dir.next_screenshot_path("step");
        assert_ne!(a, b);
        assert!(a.starts_with("/tmp/webcheck-test/screenshots"));
        assert!(a.to_string_lossy().ends_with("_001_step.png"));
        assert!(b.to_string_lossy().ends_with("_002_step.png"));
    }

    #[test]
    fn same_label_in_two_sessions_never_collides() {
        let mut first = ArtifactDir::new("out").with_label("login");
        let mut second = ArtifactDir::new("out").with_label("login");
        assert_ne!(first.next_screenshot_path("step"), second.next_screenshot_path("step"));
    }

    #[test]
    fn report_paths_are_unique_per_call() {
        let dir = ArtifactDir::new("out");
        let a = dir.report_path("researcher-login");
        let b = dir.report_path("researcher-login");
        assert_ne!(a, b);
        assert!(a.starts_with("out/reports"));
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("researcher-login_"));
    }

    #[test]
    fn label_keeps_scenarios_apart() {
        let mut dir = ArtifactDir::new("out").with_label("admin login");
        let path = dir.next_screenshot_path("profile");
        assert!(path.to_string_lossy().ends_with("_001_admin_login_profile.png"));
    }
}
