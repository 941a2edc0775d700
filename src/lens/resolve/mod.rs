//! Resolve lens
//!
//! Turns an organization keyword into a ranked list of candidate ASNs by
//! querying every organization-search source and merging the answers by ASN.
//!
//! Several keywords may be given at once, separated by commas; their
//! candidates go through the same merge. Source calls may run concurrently,
//! but the merge runs afterwards on a list fixed in source priority order, so
//! which record "wins" a field never depends on timing.

use crate::config::HunterConfig;
use crate::error::{ErrorKind, HunterError};
use crate::models::OrganizationCandidate;
use crate::sources::{default_search_clients, CancelToken, OrgSearchClient, PageFetcher, SearchResult, SourceId};
use itertools::Itertools;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

// =============================================================================
// Types
// =============================================================================

/// What one search source returned for one keyword
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchReport {
    pub source: SourceId,
    pub keyword: String,
    pub success: bool,
    pub candidates: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOutcome {
    pub candidates: Vec<OrganizationCandidate>,
    pub reports: Vec<SearchReport>,
}

// =============================================================================
// Lens
// =============================================================================

pub struct ResolveLens {
    clients: Vec<Arc<dyn OrgSearchClient>>,
    parallel: bool,
}

impl ResolveLens {
    /// `clients` must be in merge priority order
    pub fn new(clients: Vec<Arc<dyn OrgSearchClient>>) -> Self {
        Self {
            clients,
            parallel: true,
        }
    }

    pub fn from_config(
        config: &HunterConfig,
        fetcher: Arc<dyn PageFetcher>,
        cancel: CancelToken,
    ) -> Self {
        Self::new(default_search_clients(config, fetcher, cancel))
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn resolve(&self, keyword: &str) -> Result<Vec<OrganizationCandidate>, HunterError> {
        Ok(self.resolve_with_report(keyword)?.candidates)
    }

    pub fn resolve_with_report(&self, keyword: &str) -> Result<ResolveOutcome, HunterError> {
        let keywords = split_keywords(keyword);
        if keywords.is_empty() {
            return Err(HunterError::EmptyKeyword);
        }

        // client-major: every keyword of a higher-priority source comes first
        let jobs: Vec<(&Arc<dyn OrgSearchClient>, &str)> = self
            .clients
            .iter()
            .flat_map(|client| keywords.iter().map(move |k| (client, k.as_str())))
            .collect();

        let results: Vec<SearchResult> = if self.parallel {
            jobs.par_iter()
                .map(|(client, keyword)| client.search(keyword))
                .collect()
        } else {
            jobs.iter()
                .map(|(client, keyword)| client.search(keyword))
                .collect()
        };

        let mut reports = Vec::with_capacity(jobs.len());
        let mut batches = Vec::with_capacity(jobs.len());
        for ((client, keyword), result) in jobs.iter().zip(results) {
            match result.error {
                Some(error) if !result.success => {
                    debug!("{} search for '{}' failed: {}", client.id(), keyword, error)
                }
                _ => debug!(
                    "{} returned {} candidates for '{}'",
                    client.id(),
                    result.candidates.len(),
                    keyword
                ),
            }
            reports.push(SearchReport {
                source: client.id(),
                keyword: keyword.to_string(),
                success: result.success,
                candidates: result.candidates.len(),
                error: result.error,
            });
            batches.push(result.candidates);
        }

        let candidates = merge_candidates(batches);
        info!(
            "resolved {} candidate ASNs for '{}'",
            candidates.len(),
            keywords.join(", ")
        );
        Ok(ResolveOutcome {
            candidates,
            reports,
        })
    }
}

/// Split a comma separated keyword list, dropping blanks and repeats
pub fn split_keywords(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(|k| k.to_string())
        .unique()
        .collect()
}

/// Merge candidate batches by ASN.
///
/// Batches are folded in the order given: the first record seen for an ASN
/// keeps its fields, later records only fill what it left empty. The result
/// is sorted by case-insensitive name, then by ASN.
pub fn merge_candidates<I>(batches: I) -> Vec<OrganizationCandidate>
where
    I: IntoIterator<Item = Vec<OrganizationCandidate>>,
{
    let mut merged: BTreeMap<u32, OrganizationCandidate> = BTreeMap::new();
    for candidate in batches.into_iter().flatten() {
        match merged.get_mut(&candidate.asn) {
            Some(existing) => existing.merge_from(candidate),
            None => {
                merged.insert(candidate.asn, candidate);
            }
        }
    }

    merged
        .into_values()
        .sorted_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then(a.asn.cmp(&b.asn))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::testing::StaticSearch;

    fn lens(clients: Vec<StaticSearch>) -> ResolveLens {
        ResolveLens::new(
            clients
                .into_iter()
                .map(|c| Arc::new(c) as Arc<dyn OrgSearchClient>)
                .collect(),
        )
    }

    #[test]
    fn test_acme_ordered_by_name() {
        let lens = lens(vec![StaticSearch::new(SourceId::PeeringDb).with(
            "acme",
            vec![
                OrganizationCandidate::new(200, "Acme Industries"),
                OrganizationCandidate::new(100, "Acme Corp"),
            ],
        )]);
        let candidates = lens.resolve("acme").unwrap();
        let asns: Vec<u32> = candidates.iter().map(|c| c.asn).collect();
        assert_eq!(asns, vec![100, 200]);
    }

    #[test]
    fn test_name_order_is_case_insensitive_with_asn_tiebreak() {
        let merged = merge_candidates(vec![vec![
            OrganizationCandidate::new(30, "beta"),
            OrganizationCandidate::new(20, "Alpha"),
            OrganizationCandidate::new(10, "alpha"),
        ]]);
        let asns: Vec<u32> = merged.iter().map(|c| c.asn).collect();
        assert_eq!(asns, vec![10, 20, 30]);
    }

    #[test]
    fn test_later_source_fills_empty_country() {
        let mut a = OrganizationCandidate::new(1, "Acme");
        a.country = Some(String::new());
        let mut b = OrganizationCandidate::new(1, "Acme Inc");
        b.country = Some("US".to_string());

        let lens = lens(vec![
            StaticSearch::new(SourceId::PeeringDb).with("acme", vec![a]),
            StaticSearch::new(SourceId::BgpViewSearch).with("acme", vec![b]),
        ]);
        for parallel in [true, false] {
            let merged = lens_resolve(&lens, parallel);
            assert_eq!(merged.len(), 1);
            assert_eq!(merged[0].country.as_deref(), Some("US"));
            assert_eq!(merged[0].name, "Acme");
            assert!(merged[0].source_tags.contains("PeeringDB"));
            assert!(merged[0].source_tags.contains("BGPView"));
        }
    }

    fn lens_resolve(lens: &ResolveLens, parallel: bool) -> Vec<OrganizationCandidate> {
        let clients = lens.clients.clone();
        ResolveLens::new(clients)
            .with_parallel(parallel)
            .resolve("acme")
            .unwrap()
    }

    #[test]
    fn test_failing_source_does_not_abort() {
        let lens = lens(vec![
            StaticSearch::failing(SourceId::PeeringDb),
            StaticSearch::new(SourceId::BgpViewSearch)
                .with("acme", vec![OrganizationCandidate::new(100, "Acme Corp")]),
        ]);
        let outcome = lens.resolve_with_report("acme").unwrap();
        assert_eq!(outcome.candidates.len(), 1);
        assert!(!outcome.reports[0].success);
        assert_eq!(outcome.reports[0].error, Some(ErrorKind::Connectivity));
        assert!(outcome.reports[1].success);
    }

    #[test]
    fn test_multiple_keywords_merge_by_asn() {
        let lens = lens(vec![StaticSearch::new(SourceId::PeeringDb)
            .with("acme", vec![OrganizationCandidate::new(100, "Acme Corp")])
            .with(
                "acme labs",
                vec![
                    OrganizationCandidate::new(100, "Acme Corp"),
                    OrganizationCandidate::new(300, "Acme Labs"),
                ],
            )]);
        let candidates = lens.resolve("acme, acme labs,acme").unwrap();
        let asns: Vec<u32> = candidates.iter().map(|c| c.asn).collect();
        assert_eq!(asns, vec![100, 300]);
    }

    #[test]
    fn test_empty_keyword_rejected() {
        let lens = lens(vec![StaticSearch::new(SourceId::PeeringDb)]);
        assert_eq!(lens.resolve("  , "), Err(HunterError::EmptyKeyword));
        assert_eq!(split_keywords("a, b ,,a"), vec!["a", "b"]);
    }
}
