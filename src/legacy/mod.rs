//! API-key dashboard on top of the proxy endpoints.
//!
//! The legacy vendor API authenticates with a static API key instead of a bearer
//! token. This client goes through this crate's own proxy (`/api/getCampaigns`,
//! `/api/getCampaignCommonStats`), shows the most recent campaigns and fans out one
//! stats request per campaign.

use anyhow::Context;
use chrono::{Months, NaiveDate, NaiveDateTime, Utc};
use futures::future::join_all;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Campaigns listed per request; the newest few are kept after sorting.
const FETCH_LIMIT: u32 = 10_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LegacyError {
    /// Error text relayed from the vendor
    #[error("{0}")]
    Api(String),

    #[error("No campaigns found.")]
    NoCampaigns,

    #[error("Invalid JSON response")]
    InvalidJson,

    #[error("Network error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyCampaign {
    pub id: u64,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub stats_url: String,
    #[serde(default)]
    pub sender_name: String,
    #[serde(default)]
    pub sender_email: String,
}

impl LegacyCampaign {
    fn started(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.start_time, "%Y-%m-%d %H:%M:%S").ok()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CommonStats {
    pub sent: Option<u64>,
    pub delivered: Option<u64>,
    pub read_all: Option<u64>,
    pub read_unique: Option<u64>,
    pub clicked_all: Option<u64>,
    pub clicked_unique: Option<u64>,
}

impl CommonStats {
    pub fn opens_display(&self) -> String {
        engagement_display(self.read_unique, self.read_all)
    }

    pub fn clicks_display(&self) -> String {
        engagement_display(self.clicked_unique, self.clicked_all)
    }
}

/// "0" when nothing happened, otherwise "unique / total" with "-" for unknowns.
pub fn engagement_display(unique: Option<u64>, total: Option<u64>) -> String {
    if unique == Some(0) && total == Some(0) {
        return "0".to_string();
    }
    format!("{} / {}", count_or_dash(unique), count_or_dash(total))
}

pub fn count_or_dash(value: Option<u64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Lower bound for the campaign listing: midnight ten years before `today`.
pub fn ten_years_before(today: NaiveDate) -> String {
    let from = today
        .checked_sub_months(Months::new(120))
        .unwrap_or(NaiveDate::MIN);
    format!("{} 00:00:00", from.format("%Y-%m-%d"))
}

/// Newest first; campaigns without a parseable start time go last.
pub fn sort_newest_first(campaigns: &mut [LegacyCampaign]) {
    campaigns.sort_by(|a, b| b.started().cmp(&a.started()));
}

pub struct LegacyClient {
    base_url: String,
    client: reqwest::Client,
    recent_count: usize,
}

impl LegacyClient {
    pub fn new(base_url: &str, recent_count: usize) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            recent_count,
        })
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, LegacyError> {
        Url::parse_with_params(&format!("{}{}", self.base_url, path), query)
            .map_err(|e| LegacyError::Transport(e.to_string()))
    }

    async fn get_json(&self, url: Url) -> Result<(bool, Value), LegacyError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LegacyError::Transport(e.to_string()))?;
        let ok = response.status().is_success();
        let body = response
            .json::<Value>()
            .await
            .map_err(|_| LegacyError::InvalidJson)?;
        Ok((ok, body))
    }

    /// The most recent campaigns of the account owning `api_key`.
    pub async fn recent_campaigns(&self, api_key: &str) -> Result<Vec<LegacyCampaign>, LegacyError> {
        let url = self.url(
            "/api/getCampaigns",
            &[
                ("api_key", api_key.to_string()),
                ("from", ten_years_before(Utc::now().date_naive())),
                ("limit", FETCH_LIMIT.to_string()),
            ],
        )?;
        let (ok, body) = self.get_json(url).await?;
        self.pick_recent(ok, &body)
    }

    fn pick_recent(&self, ok: bool, body: &Value) -> Result<Vec<LegacyCampaign>, LegacyError> {
        let listed = body
            .get("result")
            .and_then(Value::as_array)
            .filter(|list| !list.is_empty());

        match listed {
            Some(list) if ok => {
                let mut campaigns: Vec<LegacyCampaign> = list
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect();
                sort_newest_first(&mut campaigns);
                campaigns.truncate(self.recent_count);
                Ok(campaigns)
            }
            _ => match body.get("error") {
                Some(Value::String(message)) => Err(LegacyError::Api(message.clone())),
                Some(other) if !other.is_null() => Err(LegacyError::Api(other.to_string())),
                _ => Err(LegacyError::NoCampaigns),
            },
        }
    }

    /// Stats for each campaign, fetched concurrently. Campaigns whose request
    /// fails are simply missing from the map.
    pub async fn campaign_stats(
        &self,
        api_key: &str,
        campaigns: &[LegacyCampaign],
    ) -> HashMap<u64, CommonStats> {
        let requests = campaigns.iter().map(|campaign| async move {
            let stats = self.fetch_stats(api_key, campaign.id).await;
            if let Err(e) = &stats {
                debug!(campaign_id = campaign.id, error = %e, "Stats unavailable");
            }
            (campaign.id, stats)
        });

        join_all(requests)
            .await
            .into_iter()
            .filter_map(|(id, stats)| stats.ok().flatten().map(|s| (id, s)))
            .collect()
    }

    async fn fetch_stats(&self, api_key: &str, campaign_id: u64) -> Result<Option<CommonStats>, LegacyError> {
        let url = self.url(
            "/api/getCampaignCommonStats",
            &[
                ("api_key", api_key.to_string()),
                ("campaign_id", campaign_id.to_string()),
            ],
        )?;
        let (_, body) = self.get_json(url).await?;
        Ok(body
            .get("result")
            .filter(|r| r.is_object())
            .and_then(|r| serde_json::from_value(r.clone()).ok()))
    }
}
