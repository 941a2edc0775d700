//! HTTP plumbing shared by the web-based source clients
//!
//! A single [`HttpSession`] wraps one pooled `ureq::Agent`. The agent is
//! `Send + Sync`, so every worker thread may issue requests through the same
//! session. Clients only see the [`PageFetcher`] trait, which is what tests
//! replace with canned responses.

use crate::config::HunterConfig;
use crate::error::SourceError;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Upper bound on a response body; looking-glass pages for large networks are big
const MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;

/// Granularity of interruptible sleeps
const SLEEP_SLICE: Duration = Duration::from_millis(100);

// =============================================================================
// Cancellation
// =============================================================================

/// Shared interrupt flag.
///
/// Once cancelled, clients stop issuing new requests; requests already on the
/// wire are left to complete or time out.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early if cancelled.
    ///
    /// Returns `false` when the sleep was cut short.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

// =============================================================================
// Pacing
// =============================================================================

/// Delay applied before each request a client issues
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pacing {
    base: Duration,
    jitter_min: Duration,
    jitter_max: Duration,
}

impl Pacing {
    /// No delay at all
    pub fn none() -> Self {
        Self::default()
    }

    pub fn fixed(base: Duration) -> Self {
        Self {
            base,
            ..Default::default()
        }
    }

    /// `base` plus a uniformly random extra in `[jitter_min, jitter_max)`
    pub fn jittered(base: Duration, jitter_min: Duration, jitter_max: Duration) -> Self {
        Self {
            base,
            jitter_min,
            jitter_max: jitter_max.max(jitter_min),
        }
    }

    /// Scale the base delay, keeping the jitter window
    pub fn scaled(mut self, factor: u32) -> Self {
        self.base *= factor;
        self
    }

    pub fn next_delay(&self) -> Duration {
        if self.jitter_max > self.jitter_min {
            let extra = rand::thread_rng().gen_range(self.jitter_min..self.jitter_max);
            self.base + extra
        } else {
            self.base + self.jitter_min
        }
    }

    /// Wait before the next request. Returns `false` if cancelled meanwhile.
    pub fn wait(&self, cancel: &CancelToken) -> bool {
        let delay = self.next_delay();
        if delay.is_zero() {
            return !cancel.is_cancelled();
        }
        cancel.sleep(delay)
    }
}

// =============================================================================
// Fetching
// =============================================================================

/// One GET round trip returning the response body as text.
///
/// Implementations must not retry; retrying is the job of the client's
/// `RetryPolicy`.
pub trait PageFetcher: Send + Sync {
    fn get_text(&self, url: &str) -> Result<String, SourceError>;
}

/// Pooled HTTP session backed by `ureq`
pub struct HttpSession {
    agent: ureq::Agent,
    user_agent: String,
}

impl HttpSession {
    pub fn new(config: &HunterConfig) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.request_timeout()))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            agent,
            user_agent: config.user_agent.clone(),
        }
    }
}

impl PageFetcher for HttpSession {
    fn get_text(&self, url: &str) -> Result<String, SourceError> {
        debug!("GET {}", url);
        let mut response = self
            .agent
            .get(url)
            .header("User-Agent", self.user_agent.as_str())
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8",
            )
            .call()
            .map_err(from_ureq)?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            debug!("GET {} returned HTTP {}", url, status);
            return Err(SourceError::from_status(status));
        }

        response
            .body_mut()
            .with_config()
            .limit(MAX_BODY_BYTES)
            .read_to_string()
            .map_err(from_ureq)
    }
}

fn from_ureq(e: ureq::Error) -> SourceError {
    match e {
        ureq::Error::StatusCode(code) => SourceError::from_status(code),
        ureq::Error::Timeout(_) => SourceError::Timeout,
        ureq::Error::Io(io) => SourceError::from(io),
        ureq::Error::HostNotFound => SourceError::Connectivity("host not found".to_string()),
        ureq::Error::ConnectionFailed => {
            SourceError::Connectivity("connection failed".to_string())
        }
        ureq::Error::BodyExceedsLimit(limit) => {
            SourceError::Parse(format!("response body exceeds {} bytes", limit))
        }
        other => SourceError::Connectivity(other.to_string()),
    }
}
