//! Retry and backoff policy applied by every source client
//!
//! Each client owns its own copy of the policy, so a strict upstream can be
//! given longer waits without affecting the others.

use crate::config::HunterConfig;
use crate::error::SourceError;
use crate::sources::http::CancelToken;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Wait after the first connectivity/timeout/5xx failure; doubles each attempt
    pub base_backoff: Duration,
    /// Wait after the first HTTP 429
    pub rate_limit_wait: Duration,
    /// Extra wait added per further HTTP 429
    pub rate_limit_step: Duration,
    /// Retry on HTTP 403 as well (off by default, a block rarely lifts quickly)
    pub retry_forbidden: bool,
    /// Multiplier applied to every wait, for sources known to be strict
    pub strictness: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
            rate_limit_wait: Duration::from_secs(60),
            rate_limit_step: Duration::from_secs(30),
            retry_forbidden: false,
            strictness: 1,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &HunterConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base_backoff: Duration::from_secs_f64(config.retry_backoff_secs.max(0.0)),
            rate_limit_wait: Duration::from_secs(config.rate_limit_wait_secs),
            ..Default::default()
        }
    }

    /// Single attempt, never waits
    pub fn no_retry() -> Self {
        Self::immediate(1)
    }

    /// Retries without waiting
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff: Duration::ZERO,
            rate_limit_wait: Duration::ZERO,
            rate_limit_step: Duration::ZERO,
            retry_forbidden: false,
            strictness: 1,
        }
    }

    pub fn strict(mut self, factor: u32) -> Self {
        self.strictness = factor.max(1);
        self
    }

    pub fn retry_forbidden(mut self, retry: bool) -> Self {
        self.retry_forbidden = retry;
        self
    }

    /// How long to wait before the next attempt, or `None` to give up now.
    ///
    /// `attempt` is the zero-based index of the attempt that just failed.
    pub fn backoff(&self, error: &SourceError, attempt: u32) -> Option<Duration> {
        let wait = match error {
            SourceError::RateLimited => self.rate_limit_wait + self.rate_limit_step * attempt,
            SourceError::Forbidden if self.retry_forbidden => self.base_backoff,
            SourceError::Forbidden => return None,
            SourceError::Timeout | SourceError::Connectivity(_) => {
                self.base_backoff * 2u32.saturating_pow(attempt)
            }
            SourceError::HttpStatus(code) if *code >= 500 => {
                self.base_backoff * 2u32.saturating_pow(attempt)
            }
            SourceError::HttpStatus(_) | SourceError::Parse(_) | SourceError::Cancelled => {
                return None
            }
        };
        Some(wait * self.strictness)
    }

    /// Run `op` until it succeeds, the error is not retryable, attempts run out
    /// or `cancel` fires.
    pub fn run<T>(
        &self,
        label: &str,
        cancel: &CancelToken,
        mut op: impl FnMut() -> Result<T, SourceError>,
    ) -> Result<T, SourceError> {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(SourceError::Cancelled);
            }

            let error = match op() {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if attempt + 1 >= self.max_attempts {
                debug!("{}: giving up after {} attempt(s): {}", label, attempt + 1, error);
                return Err(error);
            }

            let wait = match self.backoff(&error, attempt) {
                Some(wait) => wait,
                None => {
                    debug!("{}: not retrying: {}", label, error);
                    return Err(error);
                }
            };

            if matches!(error, SourceError::RateLimited) {
                warn!("{}: rate limited, waiting {:?}", label, wait);
            } else {
                debug!("{}: {}, retrying in {:?}", label, error, wait);
            }

            if !cancel.sleep(wait) {
                return Err(SourceError::Cancelled);
            }
            attempt += 1;
        }
    }
}
