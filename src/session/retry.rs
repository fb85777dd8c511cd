use crate::vendor::VendorError;

/// When an authenticated call may be replayed after a silent re-login.
///
/// Only `Unauthorized` is retryable, and only `max_retries` times per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 1 }
    }
}

impl RetryPolicy {
    pub fn never() -> Self {
        Self { max_retries: 0 }
    }

    /// `attempt` is the number of retries already made for this call.
    pub fn should_retry(&self, err: &VendorError, attempt: u32) -> bool {
        err.is_unauthorized() && attempt < self.max_retries
    }
}
