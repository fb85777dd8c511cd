//! Campaign page fetching and enrichment.
//!
//! A page of raw campaigns is joined with two batched lookups: letter subjects and
//! subscriber list names. Either lookup may fail without failing the page; the
//! affected campaigns then show the fallback labels.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::vendor::{Campaign, CampaignQuery, VendorApi, VendorError};

pub const NO_SUBJECT: &str = "No subject";
pub const UNKNOWN_LIST: &str = "Unknown list";

/// One enriched page of campaigns
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignPage {
    pub campaigns: Vec<Campaign>,
    /// False once the vendor returned fewer campaigns than requested
    pub has_more: bool,
}

#[derive(Clone)]
pub struct CampaignAggregator {
    api: Arc<dyn VendorApi>,
}

impl CampaignAggregator {
    pub fn new(api: Arc<dyn VendorApi>) -> Self {
        Self { api }
    }

    /// Fetch and enrich the page starting at `offset`.
    ///
    /// Only the primary campaign request can fail the call. `Unauthorized` is
    /// returned as-is so the session layer decides whether to re-login.
    pub async fn fetch_campaign_page(
        &self,
        token: &str,
        offset: u32,
        page_size: u32,
    ) -> Result<CampaignPage, VendorError> {
        let raw = self
            .api
            .campaigns(
                token,
                CampaignQuery {
                    limit: page_size,
                    offset,
                },
            )
            .await?;
        let has_more = raw.len() >= page_size as usize;
        debug!(offset, page_size, fetched = raw.len(), has_more, "Fetched campaign page");

        let letter_ids = distinct(raw.iter().filter_map(|c| c.letter_id));
        let list_ids = distinct(raw.iter().filter_map(|c| c.list_id));

        let (subjects, list_names) =
            tokio::join!(self.subjects(token, &letter_ids), self.list_names(token, &list_ids));

        Ok(CampaignPage {
            campaigns: merge(raw, &subjects, &list_names),
            has_more,
        })
    }

    async fn subjects(&self, token: &str, ids: &[u64]) -> HashMap<u64, String> {
        if ids.is_empty() {
            return HashMap::new();
        }
        match self.api.letters(token, ids).await {
            Ok(letters) => letters
                .into_iter()
                .filter_map(|l| l.subject.map(|s| (l.id, s)))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Letter lookup failed, subjects unavailable");
                HashMap::new()
            }
        }
    }

    async fn list_names(&self, token: &str, ids: &[u64]) -> HashMap<u64, String> {
        if ids.is_empty() {
            return HashMap::new();
        }
        match self.api.subscriber_lists(token, ids).await {
            Ok(lists) => lists
                .into_iter()
                .filter_map(|l| l.name.map(|n| (l.id, n)))
                .collect(),
            Err(e) => {
                warn!(error = %e, "List lookup failed, list names unavailable");
                HashMap::new()
            }
        }
    }
}

fn distinct(ids: impl Iterator<Item = u64>) -> Vec<u64> {
    ids.collect::<BTreeSet<_>>().into_iter().collect()
}

/// Fill `subject` and `list_name` from the lookup maps, keeping page order.
pub fn merge(
    campaigns: Vec<Campaign>,
    subjects: &HashMap<u64, String>,
    list_names: &HashMap<u64, String>,
) -> Vec<Campaign> {
    campaigns
        .into_iter()
        .map(|mut campaign| {
            campaign.subject = campaign
                .letter_id
                .and_then(|id| subjects.get(&id).cloned())
                .unwrap_or_else(|| NO_SUBJECT.to_string());
            campaign.list_name = campaign
                .list_id
                .and_then(|id| list_names.get(&id).cloned())
                .unwrap_or_else(|| UNKNOWN_LIST.to_string());
            campaign
        })
        .collect()
}
