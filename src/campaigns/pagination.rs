//! Offset pagination over the campaign list.
//!
//! `CampaignFeed` accumulates pages in vendor order. Each fetch is tagged with a
//! `FetchTicket`; a reset bumps the generation so responses to requests issued
//! before it are discarded instead of overwriting newer state.

use tracing::debug;

use super::CampaignPage;
use crate::vendor::Campaign;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub offset: u32,
    pub page_size: u32,
    pub has_more: bool,
}

impl PageCursor {
    pub fn new(page_size: u32) -> Self {
        Self {
            offset: 0,
            page_size,
            has_more: true,
        }
    }
}

/// Handle for one in-flight page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub generation: u64,
    pub offset: u32,
    pub page_size: u32,
}

#[derive(Debug)]
pub struct CampaignFeed {
    cursor: PageCursor,
    campaigns: Vec<Campaign>,
    generation: u64,
    in_flight: Option<FetchTicket>,
}

impl CampaignFeed {
    pub fn new(page_size: u32) -> Self {
        Self {
            cursor: PageCursor::new(page_size),
            campaigns: Vec::new(),
            generation: 0,
            in_flight: None,
        }
    }

    pub fn cursor(&self) -> PageCursor {
        self.cursor
    }

    pub fn campaigns(&self) -> &[Campaign] {
        &self.campaigns
    }

    pub fn has_more(&self) -> bool {
        self.cursor.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Back to an empty first page. Any in-flight request becomes stale.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.cursor = PageCursor::new(self.cursor.page_size);
        self.campaigns.clear();
        self.in_flight = None;
    }

    /// Reset and start fetching the first page.
    pub fn begin_refresh(&mut self) -> FetchTicket {
        self.reset();
        self.issue()
    }

    /// Start fetching the next page, unless the feed is exhausted or busy.
    pub fn begin_append(&mut self) -> Option<FetchTicket> {
        if !self.cursor.has_more || self.in_flight.is_some() {
            return None;
        }
        Some(self.issue())
    }

    fn issue(&mut self) -> FetchTicket {
        let ticket = FetchTicket {
            generation: self.generation,
            offset: self.cursor.offset,
            page_size: self.cursor.page_size,
        };
        self.in_flight = Some(ticket);
        ticket
    }

    /// Apply a fetched page. Returns false if the ticket is stale and the page was dropped.
    pub fn complete(&mut self, ticket: FetchTicket, page: CampaignPage) -> bool {
        if self.in_flight != Some(ticket) {
            debug!(
                generation = ticket.generation,
                current = self.generation,
                "Discarding stale campaign page"
            );
            return false;
        }

        self.in_flight = None;
        self.campaigns.extend(page.campaigns);
        self.cursor.offset += self.cursor.page_size;
        self.cursor.has_more = page.has_more;
        true
    }

    /// Record a failed fetch. The cursor does not move.
    pub fn fail(&mut self, ticket: FetchTicket) -> bool {
        if self.in_flight != Some(ticket) {
            return false;
        }
        self.in_flight = None;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vendor::fake::campaign;

    fn page(ids: &[u64], page_size: usize) -> CampaignPage {
        CampaignPage {
            campaigns: ids.iter().map(|&id| campaign(id, None, None)).collect(),
            has_more: ids.len() >= page_size,
        }
    }

    fn ids(feed: &CampaignFeed) -> Vec<u64> {
        feed.campaigns().iter().map(|c| c.id).collect()
    }

    #[test]
    fn test_pages_append_in_order() {
        let mut feed = CampaignFeed::new(2);
        let first = feed.begin_refresh();
        assert!(feed.complete(first, page(&[10, 9], 2)));

        let second = feed.begin_append().unwrap();
        assert_eq!(second.offset, 2);
        assert!(feed.complete(second, page(&[8, 7], 2)));

        assert_eq!(ids(&feed), vec![10, 9, 8, 7]);
        assert_eq!(feed.cursor().offset, 4);
        assert!(feed.has_more());
    }

    #[test]
    fn test_short_page_ends_feed() {
        let mut feed = CampaignFeed::new(5);
        let ticket = feed.begin_refresh();
        feed.complete(ticket, page(&[3, 2, 1], 5));

        assert!(!feed.has_more());
        assert!(feed.begin_append().is_none());

        let ticket = feed.begin_refresh();
        assert_eq!(ticket.offset, 0);
        assert!(feed.campaigns().is_empty());
        assert!(feed.has_more());
    }

    #[test]
    fn test_no_overlapping_appends() {
        let mut feed = CampaignFeed::new(2);
        let first = feed.begin_refresh();
        assert!(feed.begin_append().is_none());
        feed.complete(first, page(&[4, 3], 2));

        let next = feed.begin_append().unwrap();
        assert!(feed.is_loading());
        assert!(feed.begin_append().is_none());
        feed.fail(next);
        assert!(!feed.is_loading());
        assert_eq!(feed.cursor().offset, 2);
        assert_eq!(feed.begin_append().unwrap().offset, 2);
    }

    #[test]
    fn test_stale_response_after_reset_is_discarded() {
        let mut feed = CampaignFeed::new(2);
        let stale = feed.begin_refresh();
        let current = feed.begin_refresh();

        assert!(!feed.complete(stale, page(&[99, 98], 2)));
        assert!(feed.campaigns().is_empty());
        assert!(feed.is_loading());

        assert!(feed.complete(current, page(&[2, 1], 2)));
        assert_eq!(ids(&feed), vec![2, 1]);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut feed = CampaignFeed::new(2);
        let ticket = feed.begin_refresh();
        feed.complete(ticket, page(&[2], 2));
        feed.reset();

        assert_eq!(feed.cursor(), PageCursor::new(2));
        assert!(feed.campaigns().is_empty());
        assert!(!feed.is_loading());
        assert!(!feed.fail(ticket));
    }
}
