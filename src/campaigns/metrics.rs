use crate::vendor::Campaign;

/// `part` as a percentage of `whole`, or 0 when `whole` is 0.
pub fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 * 100.0 / whole as f64
}

impl Campaign {
    pub fn delivery_rate(&self) -> f64 {
        percent(self.delivered, self.sent)
    }

    pub fn open_rate(&self) -> f64 {
        percent(self.opened_unique, self.sent)
    }

    pub fn click_rate(&self) -> f64 {
        percent(self.clicked_unique, self.sent)
    }

    pub fn total_bounced(&self) -> u64 {
        self.bounced
            .max(self.soft_bounced.saturating_add(self.hard_bounced))
    }

    /// Start time when the campaign has started, creation time otherwise
    pub fn display_time(&self) -> &str {
        self.started_at
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.created_at.as_deref())
            .unwrap_or("-")
    }
}
