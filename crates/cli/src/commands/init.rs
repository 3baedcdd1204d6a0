//! `webcheck init`

use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};

use webcheck_e2e::{HarnessConfig, Scenario};

use crate::output;
use crate::Outcome;

/// Written next to the config so a first `webcheck run` has something to do.
const EXAMPLE_SCENARIO: &str = r#"name: example-login
description: Sign in with the default account and land on the dashboard
tags: [smoke, auth]
vars:
  DASHBOARD: /dashboard
steps:
  - name: Login page loads
    success_detail: Login form rendered
    actions:
      - action: navigate
        url: /login
        wait_until: networkidle
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
        locator: { text: { tag: button, contains: Sign in } }
      - action: assert_url
        contains: ${DASHBOARD}
"#;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite existing files
    #[arg(long)]
    pub force: bool,

    /// Skip the example scenario
    #[arg(long)]
    pub no_example: bool,
}

pub fn execute(args: InitArgs, config_path: &Path) -> Result<Outcome> {
    let written = write_files(&args, config_path)?;
    for path in &written {
        output::print_success(&format!("Wrote {}", path.display()));
    }
    output::print_warning("Set WEBCHECK_EMAIL and WEBCHECK_PASSWORD before running the example.");
    Ok(Outcome::Passed)
}

fn write_files(args: &InitArgs, config_path: &Path) -> Result<Vec<PathBuf>> {
    if config_path.exists() && !args.force {
        bail!("{} already exists (use --force to overwrite)", config_path.display());
    }

    let config = HarnessConfig::default();
    config
        .save(config_path)
        .with_context(|| format!("writing {}", config_path.display()))?;
    let mut written = vec![config_path.to_path_buf()];

    if !args.no_example {
        // Relative scenario dirs resolve next to the config file.
        let base = config_path.parent().unwrap_or_else(|| Path::new(""));
        let example = base.join(&config.run.scenarios_dir).join("example-login.yaml");
        if !example.exists() || args.force {
            Scenario::from_yaml(EXAMPLE_SCENARIO)?;
            if let Some(dir) = example.parent() {
                std::fs::create_dir_all(dir)?;
            }
            std::fs::write(&example, EXAMPLE_SCENARIO)?;
            written.push(example);
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(force: bool) -> InitArgs {
        InitArgs {
            force,
            no_example: false,
        }
    }

    #[test]
    fn writes_loadable_config_and_example() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("webcheck.toml");

        let written = write_files(&args(false), &config_path).unwrap();
        assert_eq!(written.len(), 2);

        let loaded = HarnessConfig::from_toml(&std::fs::read_to_string(&config_path).unwrap()).unwrap();
        assert_eq!(loaded, HarnessConfig::default());

        let scenarios = Scenario::load_all(&dir.path().join("scenarios")).unwrap();
        assert_eq!(scenarios[0].name, "example-login");
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("webcheck.toml");
        std::fs::write(&config_path, "[target]\nbase_url = \"http://localhost:8080\"\n").unwrap();

        assert!(write_files(&args(false), &config_path).is_err());
        assert!(write_files(&args(true), &config_path).is_ok());
    }
}
