//! Dashboard controller.
//!
//! Single owner of the session, the campaign feed and the visible error. Every
//! state change goes through one of the actions: `start`, `login`, `refresh`,
//! `load_more`, `logout`.

use std::sync::Arc;
use tracing::{info, warn};

use crate::campaigns::{CampaignAggregator, CampaignFeed, FetchTicket};
use crate::session::{
    AuthError, AuthSession, CredentialStore, SessionError, GENERIC_ERROR_MESSAGE,
    SESSION_EXPIRED_MESSAGE,
};
use crate::vendor::{Campaign, UserInfo, VendorApi};

pub struct Dashboard {
    auth: AuthSession,
    aggregator: CampaignAggregator,
    feed: CampaignFeed,
    user: Option<UserInfo>,
    error: Option<String>,
}

impl Dashboard {
    pub fn new(api: Arc<dyn VendorApi>, store: CredentialStore, page_size: u32) -> Self {
        Self {
            auth: AuthSession::new(api.clone(), store),
            aggregator: CampaignAggregator::new(api),
            feed: CampaignFeed::new(page_size),
            user: None,
            error: None,
        }
    }

    pub fn campaigns(&self) -> &[Campaign] {
        self.feed.campaigns()
    }

    pub fn has_more(&self) -> bool {
        self.feed.has_more()
    }

    pub fn is_loading(&self) -> bool {
        self.feed.is_loading()
    }

    pub fn is_logged_in(&self) -> bool {
        self.auth.is_logged_in()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn user(&self) -> Option<&UserInfo> {
        self.user.as_ref()
    }

    pub fn auth(&self) -> &AuthSession {
        &self.auth
    }

    /// Restore a previous session without loading anything.
    pub async fn restore(&mut self) -> bool {
        self.auth.restore_session().await.is_some()
    }

    /// Restore a previous session and load the first page. Returns whether a
    /// session is active afterwards.
    pub async fn start(&mut self) -> bool {
        if !self.restore().await {
            return false;
        }
        self.refresh().await;
        self.is_logged_in()
    }

    pub async fn login(
        &mut self,
        identifier: &str,
        secret: &str,
        remember: bool,
    ) -> Result<(), AuthError> {
        self.feed.reset();
        self.user = None;

        match self.auth.login(identifier, secret, remember).await {
            Ok(_) => {
                self.error = None;
                self.refresh().await;
                Ok(())
            }
            Err(e) => {
                self.error = Some(e.message.clone());
                Err(e)
            }
        }
    }

    /// Drop everything loaded so far and fetch the first page again.
    pub async fn refresh(&mut self) -> bool {
        let ticket = self.feed.begin_refresh();
        self.fetch(ticket).await
    }

    /// Fetch the next page. Returns false when there is nothing more to load,
    /// a fetch is already running, or the fetch failed.
    pub async fn load_more(&mut self) -> bool {
        let Some(ticket) = self.feed.begin_append() else {
            return false;
        };
        self.fetch(ticket).await
    }

    pub async fn load_user(&mut self) -> Option<&UserInfo> {
        match self.auth.current_user().await {
            Ok(user) => {
                self.user = Some(user);
            }
            Err(e) => self.handle_error(e),
        }
        self.user.as_ref()
    }

    pub fn logout(&mut self, preserve_credentials: bool) {
        self.auth.logout(preserve_credentials);
        self.feed.reset();
        self.user = None;
        self.error = None;
    }

    async fn fetch(&mut self, ticket: FetchTicket) -> bool {
        let aggregator = self.aggregator.clone();
        let result = self
            .auth
            .authorized(move |token| {
                let aggregator = aggregator.clone();
                async move {
                    aggregator
                        .fetch_campaign_page(&token, ticket.offset, ticket.page_size)
                        .await
                }
            })
            .await;

        match result {
            Ok(page) => {
                self.error = None;
                let applied = self.feed.complete(ticket, page);
                if applied {
                    info!(
                        loaded = self.feed.campaigns().len(),
                        has_more = self.feed.has_more(),
                        "Campaign page loaded"
                    );
                }
                applied
            }
            Err(e) => {
                self.feed.fail(ticket);
                self.handle_error(e);
                false
            }
        }
    }

    fn handle_error(&mut self, err: SessionError) {
        match err {
            SessionError::Expired => {
                self.feed.reset();
                self.user = None;
                self.error = Some(SESSION_EXPIRED_MESSAGE.to_string());
            }
            SessionError::NotLoggedIn => {
                self.error = Some(err.to_string());
            }
            SessionError::Vendor(e) => {
                warn!(error = %e, "Vendor request failed");
                self.error = Some(GENERIC_ERROR_MESSAGE.to_string());
            }
        }
    }
}
