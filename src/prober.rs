//! HTTP health probes.
//!
//! A probe is reduced to a single bool: `true` only for an HTTP 200 that
//! arrives within the target's timeout. Connection errors, other status
//! codes and timeouts all read as down and never escape as errors.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use crate::models::Target;

#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, target: &Target) -> bool;
}

pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("api-uptime-monitor/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, target: &Target) -> bool {
        let mut request = self.client.get(&target.url);
        for (name, value) in &target.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        match tokio::time::timeout(target.timeout, request.send()).await {
            Ok(Ok(resp)) if resp.status() == StatusCode::OK => true,
            Ok(Ok(resp)) => {
                debug!(endpoint = %target.name, status = %resp.status(), "probe got non-200");
                false
            }
            Ok(Err(e)) => {
                debug!(endpoint = %target.name, error = %e, "probe request failed");
                false
            }
            Err(_) => {
                debug!(endpoint = %target.name, timeout_ms = target.timeout.as_millis() as u64, "probe timed out");
                false
            }
        }
    }
}
