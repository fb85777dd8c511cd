pub mod api;
pub mod campaigns;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod legacy;
pub mod session;
pub mod vendor;

use anyhow::Context;
use config::Config;
use std::time::Duration;

/// Shared state of the proxy server
pub struct AppState {
    pub config: Config,
    /// Client used to reach the legacy upstream
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.vendor.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { config, http })
    }
}
