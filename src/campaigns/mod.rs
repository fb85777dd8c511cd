//! Campaign listing: enrichment, pagination and derived rates.

pub mod aggregator;
pub mod metrics;
pub mod pagination;

pub use aggregator::{CampaignAggregator, CampaignPage, NO_SUBJECT, UNKNOWN_LIST};
pub use metrics::percent;
pub use pagination::{CampaignFeed, FetchTicket, PageCursor};
