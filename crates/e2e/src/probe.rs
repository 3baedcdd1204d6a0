//! Service availability probe
//!
//! A quick HTTP GET against every service a run depends on, so a dead backend
//! shows up as one clear line instead of a page of failed steps.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub name: String,
    pub url: String,
}

impl ServiceEndpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Parses `NAME=URL`.
impl FromStr for ServiceEndpoint {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((name, url)) if !name.trim().is_empty() && !url.trim().is_empty() => {
                Ok(Self::new(name.trim(), url.trim()))
            }
            _ => Err(E2eError::InvalidConfig(format!(
                "expected NAME=URL for a service, got '{}'",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ServiceStatus {
    Ok { http_status: u16 },
    Error { message: String },
    Timeout,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::Ok { http_status } => write!(f, "ok ({})", http_status),
            ServiceStatus::Error { message } => write!(f, "error: {}", message),
            ServiceStatus::Timeout => write!(f, "timeout"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCheck {
    pub name: String,
    pub url: String,
    #[serde(flatten)]
    pub status: ServiceStatus,
    pub elapsed_ms: u64,
}

impl ServiceCheck {
    pub fn is_ok(&self) -> bool {
        matches!(self.status, ServiceStatus::Ok { .. })
    }
}

/// Probe every service concurrently. Results keep the input order.
pub async fn check_services(services: &[ServiceEndpoint], timeout: Duration) -> E2eResult<Vec<ServiceCheck>> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    info!("Checking {} service(s)...", services.len());

    let checks = services.iter().map(|service| check_one(&client, service));
    let results = futures::future::join_all(checks).await;

    for check in &results {
        if check.is_ok() {
            info!("✓ {} ({}) {}", check.name, check.url, check.status);
        } else {
            warn!("✗ {} ({}) {}", check.name, check.url, check.status);
        }
    }
    Ok(results)
}

pub fn all_ok(checks: &[ServiceCheck]) -> bool {
    checks.iter().all(ServiceCheck::is_ok)
}

async fn check_one(client: &reqwest::Client, service: &ServiceEndpoint) -> ServiceCheck {
    let started = Instant::now();
    debug!("GET {}", service.url);

    let status = match client.get(&service.url).send().await {
        Ok(resp) if resp.status().is_success() => ServiceStatus::Ok {
            http_status: resp.status().as_u16(),
        },
        Ok(resp) => ServiceStatus::Error {
            message: format!("HTTP {}", resp.status()),
        },
        Err(e) if e.is_timeout() => ServiceStatus::Timeout,
        Err(e) => ServiceStatus::Error { message: e.to_string() },
    };

    ServiceCheck {
        name: service.name.clone(),
        url: service.url.clone(),
        status,
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}
