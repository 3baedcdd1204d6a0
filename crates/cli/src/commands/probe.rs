//! `webcheck probe`

use anyhow::Result;
use clap::Args;
use std::path::Path;
use std::time::Duration;

use webcheck_e2e::probe::{self, ServiceEndpoint};
use webcheck_e2e::HarnessConfig;

use super::load_config;
use crate::output::{self, OutputFormat};
use crate::Outcome;

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Service to check as NAME=URL (repeatable). Defaults to the configured services.
    #[arg(short, long = "service")]
    pub services: Vec<ServiceEndpoint>,

    /// Per-request timeout
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

pub async fn execute(args: ProbeArgs, config_path: Option<&Path>, format: OutputFormat) -> Result<Outcome> {
    let config = load_config(config_path)?;
    let services = services_or_configured(&config, &args.services);
    let timeout = Duration::from_secs(args.timeout_secs.unwrap_or(config.probe.timeout_secs));

    let checks = probe::check_services(&services, timeout).await?;
    output::print_list(&checks, format)?;

    if probe::all_ok(&checks) {
        if format == OutputFormat::Table {
            output::print_success(&format!("All {} service(s) available", checks.len()));
        }
        Ok(Outcome::Passed)
    } else {
        Ok(Outcome::Failed)
    }
}

/// Services named on the command line, or the configured ones.
fn services_or_configured(config: &HarnessConfig, named: &[ServiceEndpoint]) -> Vec<ServiceEndpoint> {
    if named.is_empty() {
        config.probe_services()
    } else {
        named.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_services_replace_configured_ones() {
        let config = HarnessConfig::default();
        let defaults = services_or_configured(&config, &[]);
        assert_eq!(defaults, vec![ServiceEndpoint::new("Frontend", "http://localhost:3000")]);

        let named = vec![ServiceEndpoint::new("Backend", "http://localhost:4000/api/health")];
        assert_eq!(services_or_configured(&config, &named), named);
    }
}
