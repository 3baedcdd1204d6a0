//! CLI Commands

pub mod init;
pub mod probe;
pub mod report;
pub mod run;

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use webcheck_e2e::HarnessConfig;

/// Used when `--config` is not given
pub const DEFAULT_CONFIG: &str = "webcheck.toml";

pub fn config_location(named: Option<&Path>) -> PathBuf {
    named.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
}

/// Load the harness configuration, with environment overrides applied.
/// A missing default file means defaults; a named file must exist.
pub fn load_config(named: Option<&Path>) -> Result<HarnessConfig> {
    if let Some(path) = named {
        if !path.is_file() {
            bail!("configuration file {} not found", path.display());
        }
    }
    let path = config_location(named);
    HarnessConfig::load(Some(&path)).with_context(|| format!("loading configuration from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("typo.toml");
        let err = load_config(Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("typo.toml"), "{}", err);

        let present = dir.path().join("webcheck.toml");
        std::fs::write(&present, "[target]\nbase_url = \"http://localhost:8080\"\n").unwrap();
        assert_eq!(load_config(Some(&present)).unwrap().target.base_url, "http://localhost:8080");
    }

    #[test]
    fn default_location_is_used_when_none_is_named() {
        assert_eq!(config_location(None), PathBuf::from(DEFAULT_CONFIG));
        assert_eq!(config_location(Some(Path::new("ci.toml"))), PathBuf::from("ci.toml"));
    }
}
