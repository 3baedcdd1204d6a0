//! YAML scenarios run end to end against the in-memory browser.

use std::path::Path;
use std::sync::Arc;

use webcheck_e2e::config::Account;
use webcheck_e2e::fake::{ClickEffect, FakeElement, FakeLauncher, FakePage, FakeSite};
use webcheck_e2e::{HarnessConfig, ReportAggregator, Scenario, ScenarioRunner};

const LOGIN: &str = r#"
name: researcher-login
account: researcher
tags: [auth]
vars:
  DASHBOARD: /dashboard/researcher
steps:
  - name: Login page loads
    success_detail: Login form rendered
    actions:
      - action: navigate
        url: /login
      - action: assert_present
        locator: { selector: 'input[type="email"]' }
  - name: Credentials accepted
    actions:
      - action: type
        locator: { selector: 'input[type="email"]' }
        text: ${EMAIL}
      - action: type
        locator: { selector: 'input[type="password"]' }
        text: ${PASSWORD}
      - action: click
        locator: { text: { contains: Sign in } }
      - action: assert_url
        contains: ${DASHBOARD}
  - name: Dashboard widgets
    actions:
      - action: probe
        locator: { text: { tag: h3, contains: Statistics } }
        found: Statistics panel visible
        missing: Statistics panel not rendered
"#;

fn site() -> FakeSite {
    FakeSite::new()
        .page(
            "/login",
            FakePage::new()
                .element(FakeElement::new("input").attr("type", "email").id("email"))
                .element(FakeElement::new("input").attr("type", "password").id("password"))
                .element(FakeElement::new("button").text("Sign in").on_click(ClickEffect::Login {
                    email: "researcher@example.org".into(),
                    password: "hunter2".into(),
                    success: "/dashboard/researcher".into(),
                    failure: "/login?error=invalid".into(),
                })),
        )
        .page(
            "/dashboard/researcher",
            FakePage::new().element(FakeElement::new("h3").text("Statistics")),
        )
}

fn config(out: &Path, password: &str) -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.timeouts.navigation_ms = 1_000;
    config.timeouts.locate_ms = 300;
    config.timeouts.poll_ms = 20;
    config.output.dir = out.to_path_buf();
    config.accounts.insert(
        "researcher".into(),
        Account {
            email: "researcher@example.org".into(),
            password: password.into(),
        },
    );
    config
}

/// Correct credentials: every step passes and the probe reports what it saw.
#[tokio::test]
async fn login_scenario_passes_with_valid_account() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), "hunter2");
    let launcher = FakeLauncher::new(site());
    let runner = ScenarioRunner::new(Arc::new(launcher.clone()), config.runner_config());

    let job = Scenario::from_yaml(LOGIN).unwrap().to_job(&config).unwrap();
    let report = runner.run_with(&job.name, job.session, job.steps).await.unwrap();

    assert!(report.all_passed(), "{:#?}", report.results);
    assert_eq!(report.results[0].details, "Login form rendered");
    assert_eq!(report.results[1].details, "completed");
    assert_eq!(report.results[2].details, "Statistics panel visible");

    let typed = launcher.browsers()[0].typed();
    assert_eq!(typed[0].1, "researcher@example.org");
    assert_eq!(typed[1].1, "hunter2");
}

/// Wrong password: the URL check fails, and because the dashboard never
/// renders the probe still passes but says so.
#[tokio::test]
async fn login_scenario_records_rejection_and_keeps_going() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), "wrong");
    let launcher = FakeLauncher::new(site());
    let runner = ScenarioRunner::new(Arc::new(launcher), config.runner_config());

    let job = Scenario::from_yaml(LOGIN).unwrap().to_job(&config).unwrap();
    let report = runner.run_with(&job.name, job.session, job.steps).await.unwrap();

    let outcomes: Vec<bool> = report.results.iter().map(|r| r.success).collect();
    assert_eq!(outcomes, [true, false, true]);
    assert_eq!(report.results[2].details, "Statistics panel not rendered");
    assert_eq!(report.summary.success_rate, 66.67);
    assert_eq!(report.screenshots.len(), 1);
}

/// Scenario files on disk run through the aggregator into one summary.
#[tokio::test]
async fn directory_of_scenarios_aggregates() {
    let dir = tempfile::tempdir().unwrap();
    let specs = dir.path().join("scenarios");
    std::fs::create_dir_all(&specs).unwrap();
    std::fs::write(specs.join("login.yaml"), LOGIN).unwrap();
    std::fs::write(
        specs.join("missing-page.yaml"),
        "name: missing-page\nsteps:\n  - name: Reports page\n    actions:\n      - action: navigate\n        url: /reports\n      - action: wait_for\n        locator: { selector: table }\n",
    )
    .unwrap();

    let config = config(&dir.path().join("out"), "hunter2");
    let runner = ScenarioRunner::new(Arc::new(FakeLauncher::new(site())), config.runner_config());

    let scenarios = Scenario::load_all(&specs).unwrap();
    assert_eq!(scenarios.len(), 2);
    let jobs = scenarios
        .iter()
        .map(|s| s.to_job(&config))
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    let mut aggregator = ReportAggregator::new();
    for result in runner.run_many(jobs, 2).await {
        aggregator.add(result.unwrap());
    }

    let summary = aggregator.summary();
    assert_eq!(summary.total_tests, 4);
    assert_eq!(summary.successful_tests, 3);
    assert_eq!(summary.failed_tests, 1);
    assert_eq!(summary.success_rate, 75.0);

    let combined = aggregator.combine("all");
    assert_eq!(combined.results.len(), 4);
    assert_eq!(combined.results[3].test, "missing-page: Reports page");
    assert_eq!(combined.results[3].error_kind.as_deref(), Some("condition_timeout"));
}

/// The scenarios and example config shipped with the repository stay valid.
#[test]
fn shipped_scenarios_and_config_parse() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    let config = HarnessConfig::from_toml(&std::fs::read_to_string(root.join("webcheck.example.toml")).unwrap())
        .unwrap();
    config.validate().unwrap();
    assert_eq!(config.probe_services().len(), 2);

    let scenarios = Scenario::load_all(&root.join("scenarios")).unwrap();
    assert_eq!(scenarios.len(), 3);
    for scenario in &scenarios {
        scenario.to_job(&config).unwrap();
    }
}
