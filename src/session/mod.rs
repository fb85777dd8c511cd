//! Authentication session management.
//!
//! `AuthSession` owns the bearer token every authenticated vendor call needs:
//! - `login` exchanges credentials for a token and persists it
//! - `restore_session` picks up a stored token, or silently logs in with saved credentials
//! - `authorized` wraps a call so an expired token triggers one silent re-login and replay

pub mod retry;
pub mod store;

pub use retry::RetryPolicy;
pub use store::{CredentialStore, Credentials, FileStore, KeyValueStore, MemoryStore};

use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::vendor::{UserInfo, VendorApi, VendorError};

pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please login again.";
pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong. Please try again.";

/// Failed login, as shown to the user
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct AuthError {
    pub message: String,
    /// Vendor-specific error code, when the response carried one
    pub code: Option<String>,
}

impl AuthError {
    fn generic() -> Self {
        Self {
            message: GENERIC_ERROR_MESSAGE.to_string(),
            code: None,
        }
    }

    fn expired() -> Self {
        Self {
            message: SESSION_EXPIRED_MESSAGE.to_string(),
            code: None,
        }
    }
}

impl From<VendorError> for AuthError {
    fn from(err: VendorError) -> Self {
        match err {
            VendorError::Auth { message, code } => Self { message, code },
            _ => Self::generic(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Session expired. Please login again.")]
    Expired,

    #[error(transparent)]
    Vendor(#[from] VendorError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub token: Option<String>,
    /// Only kept when the user opted in to being remembered
    pub credentials: Option<Credentials>,
    pub remember: bool,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.token.is_some()
    }
}

pub struct AuthSession {
    api: Arc<dyn VendorApi>,
    store: CredentialStore,
    session: Session,
    error: Option<AuthError>,
    retry: RetryPolicy,
}

impl AuthSession {
    pub fn new(api: Arc<dyn VendorApi>, store: CredentialStore) -> Self {
        Self {
            api,
            store,
            session: Session::default(),
            error: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn token(&self) -> Option<&str> {
        self.session.token.as_deref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.is_active()
    }

    /// Last login or expiry error, if any
    pub fn error(&self) -> Option<&AuthError> {
        self.error.as_ref()
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Explicit login. Responses cached for a previous account are dropped first.
    pub async fn login(
        &mut self,
        identifier: &str,
        secret: &str,
        remember: bool,
    ) -> Result<Session, AuthError> {
        self.api.clear_cache();
        let result = self.sign_in(identifier, secret, remember).await;
        result.map_err(|err| {
            let auth_error = AuthError::from(err);
            self.error = Some(auth_error.clone());
            auth_error
        })
    }

    async fn sign_in(
        &mut self,
        identifier: &str,
        secret: &str,
        remember: bool,
    ) -> Result<Session, VendorError> {
        match self.api.request_token(identifier, secret).await {
            Ok(token) => {
                if let Err(e) = self.store.save_token(&token) {
                    warn!(error = %e, "Failed to persist session token");
                }

                let credentials = remember.then(|| Credentials::new(identifier, secret));
                let persisted = match &credentials {
                    Some(credentials) => self.store.save_credentials(credentials),
                    None => self.store.clear_credentials(),
                };
                if let Err(e) = persisted {
                    warn!(error = %e, "Failed to update saved credentials");
                }

                self.session = Session {
                    token: Some(token),
                    credentials,
                    remember,
                };
                self.error = None;
                info!(remember, "Logged in");
                Ok(self.session.clone())
            }
            Err(err) => {
                warn!(error = %err, "Login failed");
                Err(err)
            }
        }
    }

    /// Resume a previous session on startup.
    ///
    /// A stored token is trusted as-is; with no token, saved credentials are
    /// replayed. Cached responses are kept.
    pub async fn restore_session(&mut self) -> Option<Session> {
        let stored_token = self.store.token().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read stored token");
            None
        });
        let saved = self.saved_credentials();

        if let Some(token) = stored_token {
            debug!("Restored session from stored token");
            self.session = Session {
                token: Some(token),
                remember: saved.is_some(),
                credentials: saved,
            };
            return Some(self.session.clone());
        }

        let credentials = saved?;
        info!("No stored token, logging in with saved credentials");
        match self
            .sign_in(&credentials.email, &credentials.password, true)
            .await
        {
            Ok(session) => Some(session),
            Err(err) => {
                self.error = Some(AuthError::from(err));
                None
            }
        }
    }

    /// Replay saved credentials. Returns whether a new token was obtained.
    pub async fn reauthenticate(&mut self) -> bool {
        matches!(self.try_reauthenticate().await, Ok(true))
    }

    /// Replay saved credentials.
    ///
    /// `Ok(true)` means a new token is in place. `Ok(false)` means re-login is
    /// impossible: no credentials are saved or the vendor rejected them. An `Err`
    /// is a transient failure (network, unexpected response) that leaves the
    /// session and the saved credentials untouched.
    pub async fn try_reauthenticate(&mut self) -> Result<bool, VendorError> {
        let credentials = match self.session.credentials.clone() {
            Some(credentials) => Some(credentials),
            None => self.saved_credentials(),
        };
        let Some(credentials) = credentials else {
            debug!("No saved credentials, cannot re-authenticate");
            return Ok(false);
        };

        info!("Re-authenticating with saved credentials");
        match self
            .sign_in(&credentials.email, &credentials.password, true)
            .await
        {
            Ok(_) => Ok(true),
            Err(VendorError::Auth { .. }) | Err(VendorError::Unauthorized) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub fn logout(&mut self, preserve_credentials: bool) {
        self.api.clear_cache();
        if let Err(e) = self.store.clear_token() {
            warn!(error = %e, "Failed to clear stored token");
        }
        self.session.token = None;

        if !preserve_credentials {
            if let Err(e) = self.store.clear_credentials() {
                warn!(error = %e, "Failed to clear saved credentials");
            }
            self.session.credentials = None;
            self.session.remember = false;
        }
        info!(preserve_credentials, "Logged out");
    }

    /// Run an authenticated call, re-logging in once if the token was rejected.
    ///
    /// `op` receives the current bearer token. If it fails with `Unauthorized` and
    /// the retry policy allows it, saved credentials are replayed and `op` runs
    /// again with the new token. When that is impossible the session is logged out
    /// and `SessionError::Expired` is returned.
    pub async fn authorized<T, F, Fut>(&mut self, mut op: F) -> Result<T, SessionError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, VendorError>>,
    {
        let mut token = self
            .session
            .token
            .clone()
            .ok_or(SessionError::NotLoggedIn)?;
        let mut attempt = 0;

        loop {
            match op(token).await {
                Ok(value) => return Ok(value),
                Err(err) if self.retry.should_retry(&err, attempt) => {
                    attempt += 1;
                    match self.try_reauthenticate().await {
                        Ok(true) => {}
                        Ok(false) => {
                            self.expire();
                            return Err(SessionError::Expired);
                        }
                        Err(transient) => {
                            warn!(error = %transient, "Re-login failed, keeping session");
                            return Err(SessionError::Vendor(transient));
                        }
                    }
                    token = self
                        .session
                        .token
                        .clone()
                        .ok_or(SessionError::NotLoggedIn)?;
                    debug!(attempt, "Replaying request with refreshed token");
                }
                Err(err) if err.is_unauthorized() => {
                    self.expire();
                    return Err(SessionError::Expired);
                }
                Err(err) => return Err(SessionError::Vendor(err)),
            }
        }
    }

    pub async fn current_user(&mut self) -> Result<UserInfo, SessionError> {
        let api = self.api.clone();
        self.authorized(move |token| {
            let api = api.clone();
            async move { api.current_user(&token).await }
        })
        .await
    }

    fn expire(&mut self) {
        warn!("Session expired");
        self.logout(false);
        self.error = Some(AuthError::expired());
    }

    fn saved_credentials(&self) -> Option<Credentials> {
        self.store.credentials().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read saved credentials");
            None
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vendor::fake::{Call, FakeVendor};
    use crate::vendor::CampaignQuery;

    fn setup() -> (Arc<FakeVendor>, CredentialStore) {
        let vendor = Arc::new(FakeVendor::new());
        vendor.add_account("user@example.com", "secret");
        (vendor, CredentialStore::in_memory())
    }

    fn campaigns_call(
        api: Arc<FakeVendor>,
    ) -> impl FnMut(String) -> std::pin::Pin<Box<dyn Future<Output = Result<usize, VendorError>> + Send>>
    {
        move |token| {
            let api = api.clone();
            Box::pin(async move {
                api.campaigns(&token, CampaignQuery { limit: 5, offset: 0 })
                    .await
                    .map(|page| page.len())
            })
        }
    }

    #[tokio::test]
    async fn test_login_then_restore_keeps_token() {
        let (vendor, store) = setup();
        let mut auth = AuthSession::new(vendor.clone(), store.clone());
        let session = auth.login("user@example.com", "secret", false).await.unwrap();
        let token = session.token.unwrap();

        let mut reloaded = AuthSession::new(vendor.clone(), store);
        let restored = reloaded.restore_session().await.unwrap();
        assert_eq!(restored.token.as_deref(), Some(token.as_str()));
        assert_eq!(vendor.count(|c| matches!(c, Call::Token(_))), 1);
    }

    #[tokio::test]
    async fn test_login_without_remember_keeps_no_credentials() {
        let (vendor, store) = setup();
        store
            .save_credentials(&Credentials::new("old@example.com", "old"))
            .unwrap();
        let mut auth = AuthSession::new(vendor, store.clone());
        let session = auth.login("user@example.com", "secret", false).await.unwrap();

        assert!(session.credentials.is_none());
        assert!(store.credentials().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_login_failure_surfaces_code() {
        let (vendor, store) = setup();
        let mut auth = AuthSession::new(vendor, store.clone());
        let err = auth.login("user@example.com", "wrong", true).await.unwrap_err();

        assert_eq!(err.code.as_deref(), Some("invalid_credentials"));
        assert_eq!(auth.error(), Some(&err));
        assert!(!auth.is_logged_in());
        assert!(store.token().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transport_failure_is_generic() {
        let (vendor, store) = setup();
        vendor.set_offline(true);
        let mut auth = AuthSession::new(vendor, store);
        let err = auth.login("user@example.com", "secret", true).await.unwrap_err();
        assert_eq!(err.message, GENERIC_ERROR_MESSAGE);
        assert!(err.code.is_none());
    }

    #[tokio::test]
    async fn test_restore_with_credentials_only_logs_in() {
        let (vendor, store) = setup();
        store
            .save_credentials(&Credentials::new("user@example.com", "secret"))
            .unwrap();
        let mut auth = AuthSession::new(vendor.clone(), store.clone());

        let session = auth.restore_session().await.unwrap();
        assert!(session.is_active());
        assert!(session.remember);
        assert_eq!(store.token().unwrap(), session.token);
        assert_eq!(vendor.count(|c| matches!(c, Call::Token(_))), 1);
    }

    #[tokio::test]
    async fn test_restore_with_nothing_stored() {
        let (vendor, store) = setup();
        let mut auth = AuthSession::new(vendor.clone(), store);
        assert!(auth.restore_session().await.is_none());
        assert!(vendor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_logout_preserving_credentials() {
        let (vendor, store) = setup();
        let mut auth = AuthSession::new(vendor, store.clone());
        auth.login("user@example.com", "secret", true).await.unwrap();

        auth.logout(true);
        assert!(!auth.is_logged_in());
        assert!(store.token().unwrap().is_none());
        assert!(store.credentials().unwrap().is_some());

        auth.logout(false);
        assert!(store.credentials().unwrap().is_none());
        assert!(auth.session().credentials.is_none());
    }

    #[tokio::test]
    async fn test_unauthorized_retries_once_after_reauth() {
        let (vendor, store) = setup();
        vendor.set_campaigns(FakeVendor::numbered_campaigns(3));
        let mut auth = AuthSession::new(vendor.clone(), store);
        let first = auth.login("user@example.com", "secret", true).await.unwrap().token;
        vendor.expire_tokens();

        let count = auth.authorized(campaigns_call(vendor.clone())).await.unwrap();
        assert_eq!(count, 3);
        assert!(auth.error().is_none());

        let campaign_tokens: Vec<String> = vendor
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Campaigns { token, .. } => Some(token),
                _ => None,
            })
            .collect();
        assert_eq!(campaign_tokens.len(), 2);
        assert_eq!(Some(&campaign_tokens[0]), first.as_ref());
        assert_ne!(campaign_tokens[1], campaign_tokens[0]);
        assert_eq!(auth.token(), Some(campaign_tokens[1].as_str()));
    }

    #[tokio::test]
    async fn test_unauthorized_without_credentials_expires_session() {
        let (vendor, store) = setup();
        let mut auth = AuthSession::new(vendor.clone(), store.clone());
        auth.login("user@example.com", "secret", false).await.unwrap();
        vendor.expire_tokens();

        let err = auth.authorized(campaigns_call(vendor.clone())).await.unwrap_err();
        assert_eq!(err, SessionError::Expired);
        assert_eq!(err.to_string(), SESSION_EXPIRED_MESSAGE);
        assert!(!auth.is_logged_in());
        assert_eq!(auth.error().map(|e| e.message.as_str()), Some(SESSION_EXPIRED_MESSAGE));
        assert!(store.token().unwrap().is_none());
        assert_eq!(vendor.count(|c| matches!(c, Call::Campaigns { .. })), 1);
    }

    #[tokio::test]
    async fn test_second_unauthorized_is_not_retried_again() {
        let (vendor, store) = setup();
        let mut auth = AuthSession::new(vendor.clone(), store);
        auth.login("user@example.com", "secret", true).await.unwrap();
        vendor.reject_all_tokens(true);

        let err = auth.authorized(campaigns_call(vendor.clone())).await.unwrap_err();
        assert_eq!(err, SessionError::Expired);
        assert_eq!(vendor.count(|c| matches!(c, Call::Campaigns { .. })), 2);
        assert!(auth.session().credentials.is_none());
    }

    #[tokio::test]
    async fn test_transport_error_keeps_session() {
        let (vendor, store) = setup();
        let mut auth = AuthSession::new(vendor.clone(), store);
        auth.login("user@example.com", "secret", true).await.unwrap();
        vendor.set_offline(true);

        let err = auth.authorized(campaigns_call(vendor.clone())).await.unwrap_err();
        assert!(matches!(err, SessionError::Vendor(VendorError::Transport(_))));
        assert!(auth.is_logged_in());
    }

    #[tokio::test]
    async fn test_network_failure_during_relogin_keeps_credentials() {
        let (vendor, store) = setup();
        vendor.set_campaigns(FakeVendor::numbered_campaigns(3));
        let mut auth = AuthSession::new(vendor.clone(), store.clone());
        auth.login("user@example.com", "secret", true).await.unwrap();
        vendor.expire_tokens();
        vendor.set_token_endpoint_offline(true);

        let err = auth.authorized(campaigns_call(vendor.clone())).await.unwrap_err();
        assert!(matches!(err, SessionError::Vendor(VendorError::Transport(_))));
        assert!(auth.is_logged_in());
        assert!(auth.session().credentials.is_some());
        assert!(store.credentials().unwrap().is_some());
        assert!(store.token().unwrap().is_some());
        assert_ne!(auth.error().map(|e| e.message.as_str()), Some(SESSION_EXPIRED_MESSAGE));

        vendor.set_token_endpoint_offline(false);
        let count = auth.authorized(campaigns_call(vendor.clone())).await.unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_restored_session_survives_offline_relogin() {
        let (vendor, store) = setup();
        store.save_token("stale-token").unwrap();
        store
            .save_credentials(&Credentials::new("user@example.com", "secret"))
            .unwrap();
        vendor.set_token_endpoint_offline(true);

        let mut auth = AuthSession::new(vendor.clone(), store.clone());
        assert!(auth.restore_session().await.is_some());
        let err = auth.current_user().await.unwrap_err();
        assert!(matches!(err, SessionError::Vendor(_)));
        assert_eq!(
            store.credentials().unwrap(),
            Some(Credentials::new("user@example.com", "secret"))
        );
    }

    #[tokio::test]
    async fn test_rejected_relogin_expires_session() {
        let (vendor, store) = setup();
        let mut auth = AuthSession::new(vendor.clone(), store.clone());
        auth.login("user@example.com", "secret", true).await.unwrap();
        vendor.add_account("user@example.com", "changed");
        vendor.expire_tokens();

        let err = auth.authorized(campaigns_call(vendor.clone())).await.unwrap_err();
        assert_eq!(err, SessionError::Expired);
        assert!(!auth.is_logged_in());
        assert!(store.credentials().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_cleared_on_login_and_logout_only() {
        let (vendor, store) = setup();
        let mut auth = AuthSession::new(vendor.clone(), store.clone());
        auth.login("user@example.com", "secret", true).await.unwrap();
        assert_eq!(vendor.cache_clears(), 1);

        vendor.expire_tokens();
        auth.authorized(campaigns_call(vendor.clone())).await.unwrap();
        let mut reloaded = AuthSession::new(vendor.clone(), store);
        reloaded.restore_session().await.unwrap();
        assert_eq!(vendor.cache_clears(), 1);

        reloaded.logout(true);
        assert_eq!(vendor.cache_clears(), 2);
    }

    #[tokio::test]
    async fn test_not_logged_in() {
        let (vendor, store) = setup();
        let mut auth = AuthSession::new(vendor.clone(), store);
        let err = auth.authorized(campaigns_call(vendor.clone())).await.unwrap_err();
        assert_eq!(err, SessionError::NotLoggedIn);
        assert!(vendor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_current_user() {
        let (vendor, store) = setup();
        let mut auth = AuthSession::new(vendor, store);
        auth.login("user@example.com", "secret", false).await.unwrap();
        let user = auth.current_user().await.unwrap();
        assert_eq!(user.email.as_deref(), Some("user@example.com"));
    }
}
