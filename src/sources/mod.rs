//! Source clients
//!
//! Every upstream (registry APIs, the looking glass, WHOIS) is wrapped in a
//! client that performs the round trips for one query and folds every expected
//! failure into a result value. Two capabilities exist:
//!
//! - [`SourceClient`]: ASN + address family → announced prefixes
//! - [`OrgSearchClient`]: keyword → organization candidates
//!
//! The default client sets, in the priority order the aggregator and resolver
//! merge them in, are built by [`default_prefix_clients`] and
//! [`default_search_clients`].

pub mod bgpview;
pub mod http;
pub mod looking_glass;
pub mod peeringdb;
pub mod retry;
pub mod ripestat;
pub mod whois;

pub use http::{CancelToken, HttpSession, PageFetcher, Pacing};
pub use retry::RetryPolicy;

use crate::config::HunterConfig;
use crate::error::{ErrorKind, SourceError};
use crate::models::{AddressFamily, OrganizationCandidate, PrefixRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Identity
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceId {
    /// Paginated prefix tables of the looking-glass site
    LookingGlass,
    /// Alternative looking-glass endpoints scanned for raw CIDR text
    LookingGlassAlt,
    /// RIPEstat announced-prefixes
    RipeStat,
    /// BGPView ASN prefixes
    BgpViewPrefixes,
    /// WHOIS route/route6 objects
    Whois,
    /// PeeringDB organization search
    PeeringDb,
    /// BGPView keyword search
    BgpViewSearch,
}

impl SourceId {
    pub fn name(&self) -> &'static str {
        match self {
            SourceId::LookingGlass => "looking-glass",
            SourceId::LookingGlassAlt => "looking-glass-alt",
            SourceId::RipeStat => "ripestat",
            SourceId::BgpViewPrefixes => "bgpview-prefixes",
            SourceId::Whois => "whois",
            SourceId::PeeringDb => "PeeringDB",
            SourceId::BgpViewSearch => "BGPView",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Results
// =============================================================================

/// Outcome of one prefix client call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceResult {
    pub success: bool,
    pub prefixes: Vec<PrefixRecord>,
    /// Set on failure; also set on success when a later page or server failed
    pub error: Option<ErrorKind>,
    /// Entries the source returned that were not valid CIDR blocks
    pub malformed_dropped: usize,
}

impl SourceResult {
    pub fn ok(prefixes: Vec<PrefixRecord>) -> Self {
        Self {
            success: true,
            prefixes,
            ..Default::default()
        }
    }

    pub fn failed(kind: ErrorKind) -> Self {
        Self {
            success: false,
            error: Some(kind),
            ..Default::default()
        }
    }

    /// Validate raw strings reported by a source.
    ///
    /// Strings of the other family are skipped, malformed strings are dropped
    /// and counted, everything else becomes a [`PrefixRecord`].
    pub fn from_raw<I, S>(family: AddressFamily, raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut prefixes = Vec::new();
        let mut malformed = 0;
        for entry in raw {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            if !AddressFamily::ALL.iter().any(|f| f.matches_text(entry)) {
                malformed += 1;
                continue;
            }
            if !family.matches_text(entry) {
                continue;
            }
            match PrefixRecord::parse(entry) {
                Some(record) if record.address_family() == family => prefixes.push(record),
                Some(_) => {}
                None => malformed += 1,
            }
        }
        Self {
            success: true,
            prefixes,
            error: None,
            malformed_dropped: malformed,
        }
    }

    /// Record a failure that happened after some data was already gathered
    pub fn with_partial_error(mut self, kind: ErrorKind) -> Self {
        self.error = Some(kind);
        self
    }
}

/// Outcome of one organization search call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResult {
    pub success: bool,
    pub candidates: Vec<OrganizationCandidate>,
    pub error: Option<ErrorKind>,
}

impl SearchResult {
    pub fn ok(candidates: Vec<OrganizationCandidate>) -> Self {
        Self {
            success: true,
            candidates,
            error: None,
        }
    }

    pub fn failed(kind: ErrorKind) -> Self {
        Self {
            success: false,
            candidates: Vec::new(),
            error: Some(kind),
        }
    }
}

// =============================================================================
// Client capabilities
// =============================================================================

/// ASN-indexed prefix source
pub trait SourceClient: Send + Sync {
    fn id(&self) -> SourceId;

    /// Whether the source can serve this family at all
    fn supports(&self, _family: AddressFamily) -> bool {
        true
    }

    /// Never panics and never returns an error: failures are reported inside
    /// the result.
    fn fetch_prefixes(&self, asn: u32, family: AddressFamily) -> SourceResult;
}

/// Keyword-indexed organization source
pub trait OrgSearchClient: Send + Sync {
    fn id(&self) -> SourceId;

    fn search(&self, keyword: &str) -> SearchResult;
}

// =============================================================================
// Shared request context
// =============================================================================

/// Everything a web client needs to issue a request: the fetcher, its retry
/// policy, its pacing and the interrupt flag.
#[derive(Clone)]
pub struct SourceContext {
    fetcher: Arc<dyn PageFetcher>,
    retry: RetryPolicy,
    pacing: Pacing,
    cancel: CancelToken,
}

impl SourceContext {
    pub fn new(fetcher: Arc<dyn PageFetcher>, retry: RetryPolicy, cancel: CancelToken) -> Self {
        Self {
            fetcher,
            retry,
            pacing: Pacing::none(),
            cancel,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn cancel(&self) -> &CancelToken {
        &self.cancel
    }

    /// Paced, retried GET
    pub fn get(&self, url: &str) -> Result<String, SourceError> {
        if !self.pacing.wait(&self.cancel) {
            return Err(SourceError::Cancelled);
        }
        self.retry
            .run(url, &self.cancel, || self.fetcher.get_text(url))
    }
}

// =============================================================================
// Default client sets
// =============================================================================

/// Prefix clients in merge priority order: looking glass, looking-glass
/// alternative endpoints, RIPEstat, BGPView, WHOIS route objects.
pub fn default_prefix_clients(
    config: &HunterConfig,
    fetcher: Arc<dyn PageFetcher>,
    cancel: CancelToken,
) -> Vec<Arc<dyn SourceClient>> {
    let retry = RetryPolicy::from_config(config);
    let delay = config.request_delay();
    let base = SourceContext::new(fetcher, retry.clone(), cancel.clone());

    let lg_pacing = Pacing::jittered(delay, Duration::from_millis(500), Duration::from_millis(1500));

    vec![
        Arc::new(
            looking_glass::LookingGlassClient::new(base.clone().with_pacing(lg_pacing))
                .with_max_pages(config.max_pages),
        ),
        Arc::new(looking_glass::LookingGlassAltClient::new(
            base.clone().with_pacing(Pacing::fixed(delay)),
        )),
        Arc::new(ripestat::RipeStatClient::new(
            base.clone().with_pacing(Pacing::fixed(delay)),
        )),
        // BGPView rate-limits aggressively
        Arc::new(bgpview::BgpViewPrefixClient::new(
            base.with_retry(retry.strict(2))
                .with_pacing(Pacing::fixed(delay).scaled(2)),
        )),
        Arc::new(whois::WhoisClient::new(
            Arc::new(whois::TcpWhois::new(config.whois_timeout())),
            RetryPolicy::from_config(config),
            cancel,
        )),
    ]
}

/// Search clients in merge priority order: PeeringDB, then BGPView.
pub fn default_search_clients(
    config: &HunterConfig,
    fetcher: Arc<dyn PageFetcher>,
    cancel: CancelToken,
) -> Vec<Arc<dyn OrgSearchClient>> {
    let retry = RetryPolicy::from_config(config);
    let base = SourceContext::new(fetcher, retry.clone(), cancel);

    vec![
        Arc::new(peeringdb::PeeringDbClient::new(base.clone())),
        Arc::new(bgpview::BgpViewSearchClient::new(
            base.with_retry(retry.strict(2))
                .with_pacing(Pacing::fixed(config.request_delay())),
        )),
    ]
}

#[cfg(test)]
pub(crate) mod testing {
    //! Canned fetchers shared by the client tests

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves fixed bodies or errors per URL and records every request
    #[derive(Default)]
    pub struct MockFetcher {
        responses: HashMap<String, Result<String, SourceError>>,
        fallback: Option<Result<String, SourceError>>,
        pub requests: Mutex<Vec<String>>,
    }

    impl MockFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(mut self, url: &str, body: &str) -> Self {
            self.responses.insert(url.to_string(), Ok(body.to_string()));
            self
        }

        pub fn fail(mut self, url: &str, error: SourceError) -> Self {
            self.responses.insert(url.to_string(), Err(error));
            self
        }

        /// Response for every URL not registered explicitly
        pub fn otherwise(mut self, response: Result<String, SourceError>) -> Self {
            self.fallback = Some(response);
            self
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().map(|r| r.len()).unwrap_or(0)
        }
    }

    impl PageFetcher for MockFetcher {
        fn get_text(&self, url: &str) -> Result<String, SourceError> {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(url.to_string());
            }
            match self.responses.get(url).or(self.fallback.as_ref()) {
                Some(response) => response.clone(),
                None => Err(SourceError::HttpStatus(404)),
            }
        }
    }

    pub fn context(fetcher: Arc<MockFetcher>) -> SourceContext {
        SourceContext::new(fetcher, RetryPolicy::immediate(2), CancelToken::new())
    }

    /// Prefix client answering every ASN with the same canned strings
    pub struct StaticClient {
        pub id: SourceId,
        ipv4: Option<Vec<&'static str>>,
        ipv6: Option<Vec<&'static str>>,
        pub calls: std::sync::atomic::AtomicUsize,
    }

    impl StaticClient {
        pub fn new(id: SourceId) -> Self {
            Self {
                id,
                ipv4: Some(Vec::new()),
                ipv6: Some(Vec::new()),
                calls: Default::default(),
            }
        }

        pub fn ipv4(mut self, prefixes: &[&'static str]) -> Self {
            self.ipv4 = Some(prefixes.to_vec());
            self
        }

        pub fn ipv6(mut self, prefixes: &[&'static str]) -> Self {
            self.ipv6 = Some(prefixes.to_vec());
            self
        }

        /// Every call fails with a timeout
        pub fn failing(id: SourceId) -> Self {
            Self {
                id,
                ipv4: None,
                ipv6: None,
                calls: Default::default(),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    impl SourceClient for StaticClient {
        fn id(&self) -> SourceId {
            self.id
        }

        fn fetch_prefixes(&self, _asn: u32, family: AddressFamily) -> SourceResult {
            self.calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let canned = match family {
                AddressFamily::IPv4 => &self.ipv4,
                AddressFamily::IPv6 => &self.ipv6,
            };
            match canned {
                Some(prefixes) => SourceResult::from_raw(family, prefixes.iter()),
                None => SourceResult::failed(ErrorKind::Timeout),
            }
        }
    }

    /// Search client with canned candidates per keyword
    pub struct StaticSearch {
        pub id: SourceId,
        results: HashMap<String, Vec<OrganizationCandidate>>,
        fail: bool,
    }

    impl StaticSearch {
        pub fn new(id: SourceId) -> Self {
            Self {
                id,
                results: HashMap::new(),
                fail: false,
            }
        }

        pub fn failing(id: SourceId) -> Self {
            Self {
                fail: true,
                ..Self::new(id)
            }
        }

        pub fn with(mut self, keyword: &str, candidates: Vec<OrganizationCandidate>) -> Self {
            let tagged = candidates
                .into_iter()
                .map(|c| c.with_source(self.id.name()))
                .collect();
            self.results.insert(keyword.to_string(), tagged);
            self
        }
    }

    impl OrgSearchClient for StaticSearch {
        fn id(&self) -> SourceId {
            self.id
        }

        fn search(&self, keyword: &str) -> SearchResult {
            if self.fail {
                return SearchResult::failed(ErrorKind::Connectivity);
            }
            SearchResult::ok(self.results.get(keyword).cloned().unwrap_or_default())
        }
    }
}
