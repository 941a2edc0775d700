//! BGPView clients
//!
//! - keyword search: `GET /search?query_term=<keyword>`, ASNs under `data.asns[]`
//! - announced prefixes: `GET /asn/<asn>/prefixes`, prefixes under
//!   `data.ipv4_prefixes[]` and `data.ipv6_prefixes[]`
//!
//! Both endpoints wrap their payload in `{"status": "ok", "data": ...}`; any
//! other status is treated as a malformed response.

use crate::error::SourceError;
use crate::models::{non_empty, AddressFamily, OrganizationCandidate};
use crate::sources::{
    OrgSearchClient, SearchResult, SourceClient, SourceContext, SourceId, SourceResult,
};
use serde::Deserialize;
use tracing::{debug, info};

pub const BGPVIEW_API: &str = "https://api.bgpview.io";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    status: String,
    #[serde(default)]
    status_message: Option<String>,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> Result<T, SourceError> {
        if self.status != "ok" {
            return Err(SourceError::Parse(format!(
                "status '{}'{}",
                self.status,
                self.status_message
                    .map(|m| format!(": {}", m))
                    .unwrap_or_default()
            )));
        }
        self.data
            .ok_or_else(|| SourceError::Parse("missing 'data' field".to_string()))
    }
}

// =============================================================================
// Search
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct SearchData {
    #[serde(default)]
    asns: Vec<SearchAsn>,
}

#[derive(Debug, Deserialize)]
struct SearchAsn {
    asn: u32,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    country_code: Option<String>,
    #[serde(default)]
    rir_name: Option<String>,
    #[serde(default)]
    email_contacts: Vec<String>,
}

impl SearchAsn {
    fn into_candidate(self) -> OrganizationCandidate {
        let mut candidate = OrganizationCandidate::new(self.asn, non_empty(self.name).unwrap_or_default())
            .with_source(SourceId::BgpViewSearch.name());
        candidate.description = non_empty(self.description).unwrap_or_default();
        candidate.country = non_empty(self.country_code).map(|c| c.to_uppercase());
        candidate.registry = self.rir_name.and_then(|r| r.parse().ok());
        candidate.contact_emails = self
            .email_contacts
            .into_iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();
        candidate
    }
}

pub(crate) fn parse_search_response(body: &str) -> Result<Vec<OrganizationCandidate>, SourceError> {
    let envelope: Envelope<SearchData> = serde_json::from_str(body)?;
    Ok(envelope
        .into_data()?
        .asns
        .into_iter()
        .map(SearchAsn::into_candidate)
        .collect())
}

/// Routing-database search client
pub struct BgpViewSearchClient {
    ctx: SourceContext,
    base_url: String,
}

impl BgpViewSearchClient {
    pub fn new(ctx: SourceContext) -> Self {
        Self {
            ctx,
            base_url: BGPVIEW_API.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn search_url(&self, keyword: &str) -> String {
        format!(
            "{}/search?query_term={}",
            self.base_url,
            urlencoding::encode(keyword)
        )
    }
}

impl OrgSearchClient for BgpViewSearchClient {
    fn id(&self) -> SourceId {
        SourceId::BgpViewSearch
    }

    fn search(&self, keyword: &str) -> SearchResult {
        let url = self.search_url(keyword);
        match self.ctx.get(&url).and_then(|body| parse_search_response(&body)) {
            Ok(candidates) => {
                info!("BGPView: {} result(s) for '{}'", candidates.len(), keyword);
                SearchResult::ok(candidates)
            }
            Err(e) => {
                debug!("BGPView search for '{}' failed: {}", keyword, e);
                SearchResult::failed(e.kind())
            }
        }
    }
}

// =============================================================================
// Prefixes
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct PrefixData {
    #[serde(default)]
    ipv4_prefixes: Vec<PrefixEntry>,
    #[serde(default)]
    ipv6_prefixes: Vec<PrefixEntry>,
}

#[derive(Debug, Deserialize)]
struct PrefixEntry {
    #[serde(default)]
    prefix: Option<String>,
}

pub(crate) fn parse_prefix_response(
    body: &str,
    family: AddressFamily,
) -> Result<SourceResult, SourceError> {
    let envelope: Envelope<PrefixData> = serde_json::from_str(body)?;
    let data = envelope.into_data()?;
    let entries = match family {
        AddressFamily::IPv4 => data.ipv4_prefixes,
        AddressFamily::IPv6 => data.ipv6_prefixes,
    };
    Ok(SourceResult::from_raw(
        family,
        entries.into_iter().filter_map(|e| e.prefix),
    ))
}

/// Registry-prefix client
pub struct BgpViewPrefixClient {
    ctx: SourceContext,
    base_url: String,
}

impl BgpViewPrefixClient {
    pub fn new(ctx: SourceContext) -> Self {
        Self {
            ctx,
            base_url: BGPVIEW_API.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn prefixes_url(&self, asn: u32) -> String {
        format!("{}/asn/{}/prefixes", self.base_url, asn)
    }
}

impl SourceClient for BgpViewPrefixClient {
    fn id(&self) -> SourceId {
        SourceId::BgpViewPrefixes
    }

    fn fetch_prefixes(&self, asn: u32, family: AddressFamily) -> SourceResult {
        let url = self.prefixes_url(asn);
        match self
            .ctx
            .get(&url)
            .and_then(|body| parse_prefix_response(&body, family))
        {
            Ok(result) => result,
            Err(e) => {
                debug!("BGPView prefixes for AS{} ({}) failed: {}", asn, family, e);
                SourceResult::failed(e.kind())
            }
        }
    }
}
