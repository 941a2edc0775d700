//! PeeringDB organization search
//!
//! `GET https://www.peeringdb.com/api/org?name__contains=<keyword>` returns a
//! top-level `data` array; every entry carrying an ASN becomes a candidate.

use crate::error::SourceError;
use crate::models::{non_empty, OrganizationCandidate, PrefixCountHint};
use crate::sources::{OrgSearchClient, SearchResult, SourceContext, SourceId};
use serde::Deserialize;
use tracing::{debug, info};

pub const PEERINGDB_ORG_API: &str = "https://www.peeringdb.com/api/org";

#[derive(Debug, Deserialize)]
struct PeeringDbResponse {
    #[serde(default)]
    data: Vec<PeeringDbOrg>,
}

#[derive(Debug, Deserialize)]
struct PeeringDbOrg {
    #[serde(default)]
    asn: Option<u32>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    name_long: Option<String>,
    #[serde(default)]
    aka: Option<String>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    info_type: Option<String>,
    #[serde(default)]
    info_prefixes4: Option<u32>,
    #[serde(default)]
    info_prefixes6: Option<u32>,
}

impl PeeringDbOrg {
    fn into_candidate(self) -> Option<OrganizationCandidate> {
        let asn = self.asn.filter(|asn| *asn != 0)?;
        let name = non_empty(self.name).unwrap_or_default();
        let description = non_empty(self.name_long).unwrap_or_else(|| name.clone());

        let mut candidate = OrganizationCandidate::new(asn, name).with_source(SourceId::PeeringDb.name());
        candidate.description = description;
        candidate.alternate_names = non_empty(self.aka).into_iter().collect();
        candidate.website = non_empty(self.website);
        candidate.info_type = non_empty(self.info_type);
        candidate.expected_prefix_counts = PrefixCountHint {
            ipv4: self.info_prefixes4.unwrap_or(0),
            ipv6: self.info_prefixes6.unwrap_or(0),
        };
        Some(candidate)
    }
}

pub(crate) fn parse_org_response(body: &str) -> Result<Vec<OrganizationCandidate>, SourceError> {
    let response: PeeringDbResponse = serde_json::from_str(body)?;
    Ok(response
        .data
        .into_iter()
        .filter_map(PeeringDbOrg::into_candidate)
        .collect())
}

/// Registry-search client for PeeringDB
pub struct PeeringDbClient {
    ctx: SourceContext,
    base_url: String,
}

impl PeeringDbClient {
    pub fn new(ctx: SourceContext) -> Self {
        Self {
            ctx,
            base_url: PEERINGDB_ORG_API.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn search_url(&self, keyword: &str) -> String {
        format!(
            "{}?name__contains={}",
            self.base_url,
            urlencoding::encode(keyword)
        )
    }
}

impl OrgSearchClient for PeeringDbClient {
    fn id(&self) -> SourceId {
        SourceId::PeeringDb
    }

    fn search(&self, keyword: &str) -> SearchResult {
        let url = self.search_url(keyword);
        match self.ctx.get(&url).and_then(|body| parse_org_response(&body)) {
            Ok(candidates) => {
                info!("PeeringDB: {} result(s) for '{}'", candidates.len(), keyword);
                SearchResult::ok(candidates)
            }
            Err(e) => {
                debug!("PeeringDB search for '{}' failed: {}", keyword, e);
                SearchResult::failed(e.kind())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::sources::testing::{context, MockFetcher};
    use std::sync::Arc;

    const BODY: &str = r#"{
        "data": [
            {
                "asn": 32934,
                "name": "Facebook Inc",
                "name_long": "Meta Platforms, Inc.",
                "aka": "Meta",
                "website": "https://www.facebook.com",
                "info_type": "Content",
                "info_prefixes4": 150,
                "info_prefixes6": 100
            },
            { "name": "No ASN Org" },
            { "asn": 0, "name": "Zero" },
            { "asn": 64500, "name": "Bare", "website": "", "aka": null }
        ]
    }"#;

    #[test]
    fn test_parse_org_response() {
        let candidates = parse_org_response(BODY).unwrap();
        assert_eq!(candidates.len(), 2);

        let meta = &candidates[0];
        assert_eq!(meta.asn, 32934);
        assert_eq!(meta.name, "Facebook Inc");
        assert_eq!(meta.description, "Meta Platforms, Inc.");
        assert_eq!(meta.alternate_names, vec!["Meta"]);
        assert_eq!(meta.website.as_deref(), Some("https://www.facebook.com"));
        assert_eq!(meta.info_type.as_deref(), Some("Content"));
        assert_eq!(meta.expected_prefix_counts.ipv4, 150);
        assert!(meta.source_tags.contains("PeeringDB"));

        let bare = &candidates[1];
        assert_eq!(bare.description, "Bare");
        assert!(bare.website.is_none());
        assert!(bare.alternate_names.is_empty());
    }

    #[test]
    fn test_search_url_encodes_keyword() {
        let client = PeeringDbClient::new(context(Arc::new(MockFetcher::new())));
        assert_eq!(
            client.search_url("acme & co"),
            "https://www.peeringdb.com/api/org?name__contains=acme%20%26%20co"
        );
    }

    #[test]
    fn test_search_through_fetcher() {
        let fetcher = Arc::new(MockFetcher::new().respond(
            "https://www.peeringdb.com/api/org?name__contains=facebook",
            BODY,
        ));
        let client = PeeringDbClient::new(context(fetcher));
        let result = client.search("facebook");
        assert!(result.success);
        assert_eq!(result.candidates.len(), 2);
    }

    #[test]
    fn test_failures_are_absorbed() {
        let fetcher = Arc::new(MockFetcher::new().otherwise(Ok("<html>oops</html>".to_string())));
        let result = PeeringDbClient::new(context(fetcher)).search("x");
        assert!(!result.success);
        assert_eq!(result.error, Some(ErrorKind::Parse));

        let fetcher = Arc::new(MockFetcher::new().otherwise(Err(SourceError::Forbidden)));
        let result = PeeringDbClient::new(context(fetcher)).search("x");
        assert_eq!(result.error, Some(ErrorKind::Forbidden));
    }
}
