//! Aggregate lens
//!
//! Queries every prefix source for one ASN, for both address families, and
//! folds the answers into one [`AsnPrefixSet`].
//!
//! All source calls for the ASN run first (concurrently unless disabled); the
//! merge only starts once every call has returned, and always walks the
//! results in the fixed client priority order. The result therefore does not
//! depend on which source answered first.

use crate::config::HunterConfig;
use crate::error::ErrorKind;
use crate::models::{AddressFamily, AsnPrefixSet, OrganizationCandidate, PrefixRecord};
use crate::sources::{default_prefix_clients, CancelToken, PageFetcher, SourceClient, SourceId, SourceResult};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

// =============================================================================
// Types
// =============================================================================

/// What one source contributed to one family of one ASN
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    pub source: SourceId,
    pub family: AddressFamily,
    pub success: bool,
    /// Valid prefixes returned, duplicates included
    pub returned: usize,
    /// Prefixes not already contributed by a higher-priority source
    pub new_prefixes: usize,
    pub malformed_dropped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateOutcome {
    pub set: AsnPrefixSet,
    /// In client priority order, IPv4 before IPv6 for each client
    pub reports: Vec<SourceReport>,
}

impl AggregateOutcome {
    /// Sources that failed outright
    pub fn failed_sources(&self) -> Vec<&SourceReport> {
        self.reports.iter().filter(|r| !r.success).collect()
    }

    /// At least one source stopped because the run was cancelled
    pub fn interrupted(&self) -> bool {
        self.reports
            .iter()
            .any(|r| r.error == Some(ErrorKind::Cancelled))
    }
}

// =============================================================================
// Lens
// =============================================================================

pub struct AggregateLens {
    clients: Vec<Arc<dyn SourceClient>>,
    parallel: bool,
}

impl AggregateLens {
    /// `clients` must be in merge priority order
    pub fn new(clients: Vec<Arc<dyn SourceClient>>) -> Self {
        Self {
            clients,
            parallel: true,
        }
    }

    /// Lens over the default source set
    pub fn from_config(
        config: &HunterConfig,
        fetcher: Arc<dyn PageFetcher>,
        cancel: CancelToken,
    ) -> Self {
        Self::new(default_prefix_clients(config, fetcher, cancel))
    }

    /// Query the sources one after another instead of concurrently
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn sources(&self) -> Vec<SourceId> {
        self.clients.iter().map(|c| c.id()).collect()
    }

    pub fn aggregate(&self, asn: u32, org: &OrganizationCandidate) -> AsnPrefixSet {
        self.aggregate_with_report(asn, org).set
    }

    pub fn aggregate_with_report(&self, asn: u32, org: &OrganizationCandidate) -> AggregateOutcome {
        let jobs: Vec<(&Arc<dyn SourceClient>, AddressFamily)> = self
            .clients
            .iter()
            .flat_map(|client| {
                AddressFamily::ALL
                    .into_iter()
                    .filter(|family| client.supports(*family))
                    .map(move |family| (client, family))
            })
            .collect();

        // indexed collect keeps job order
        let results: Vec<SourceResult> = if self.parallel {
            jobs.par_iter()
                .map(|(client, family)| client.fetch_prefixes(asn, *family))
                .collect()
        } else {
            jobs.iter()
                .map(|(client, family)| client.fetch_prefixes(asn, *family))
                .collect()
        };

        let mut ipv4: BTreeSet<PrefixRecord> = BTreeSet::new();
        let mut ipv6: BTreeSet<PrefixRecord> = BTreeSet::new();
        let mut reports = Vec::with_capacity(jobs.len());

        for ((client, family), result) in jobs.iter().zip(results) {
            let accumulated = match family {
                AddressFamily::IPv4 => &mut ipv4,
                AddressFamily::IPv6 => &mut ipv6,
            };
            reports.push(merge_result(client.id(), *family, result, accumulated));
        }

        for report in &reports {
            if report.new_prefixes > 0 {
                info!(
                    "AS{} {}: {} new {} prefixes",
                    asn, report.source, report.new_prefixes, report.family
                );
            } else if let Some(error) = report.error {
                debug!("AS{} {} ({}): {}", asn, report.source, report.family, error);
            }
        }
        info!(
            "AS{}: {} IPv4 and {} IPv6 prefixes in total",
            asn,
            ipv4.len(),
            ipv6.len()
        );

        AggregateOutcome {
            set: AsnPrefixSet::from_sorted(
                asn,
                org.clone(),
                ipv4.into_iter().collect(),
                ipv6.into_iter().collect(),
            ),
            reports,
        }
    }
}

/// Union one result into the accumulator, counting what it added
fn merge_result(
    source: SourceId,
    family: AddressFamily,
    result: SourceResult,
    accumulated: &mut BTreeSet<PrefixRecord>,
) -> SourceReport {
    let returned = result.prefixes.len();
    let mut new_prefixes = 0;
    if result.success {
        for prefix in result.prefixes {
            // clients validate, but never let the other family slip in
            if prefix.address_family() == family && accumulated.insert(prefix) {
                new_prefixes += 1;
            }
        }
    }
    SourceReport {
        source,
        family,
        success: result.success,
        returned,
        new_prefixes,
        malformed_dropped: result.malformed_dropped,
        error: result.error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::testing::StaticClient;

    fn org(asn: u32) -> OrganizationCandidate {
        OrganizationCandidate::from_asn(asn)
    }

    fn lens(clients: Vec<StaticClient>) -> AggregateLens {
        AggregateLens::new(
            clients
                .into_iter()
                .map(|c| Arc::new(c) as Arc<dyn SourceClient>)
                .collect(),
        )
    }

    #[test]
    fn test_all_sources_failing_gives_empty_set() {
        let lens = lens(vec![
            StaticClient::failing(SourceId::LookingGlass),
            StaticClient::failing(SourceId::RipeStat),
            StaticClient::failing(SourceId::Whois),
        ]);
        let outcome = lens.aggregate_with_report(64500, &org(64500));
        assert!(outcome.set.is_empty());
        assert_eq!(outcome.set.asn(), 64500);
        assert_eq!(outcome.failed_sources().len(), 6);
    }

    #[test]
    fn test_union_sorted_and_deduplicated() {
        let lens = lens(vec![
            StaticClient::new(SourceId::LookingGlass).ipv4(&["10.0.1.0/24", "10.0.2.0/24"]),
            StaticClient::new(SourceId::RipeStat).ipv4(&["10.0.0.0/24", "10.0.1.0/24"]),
        ]);
        let set = lens.aggregate(300, &org(300));
        assert_eq!(
            set.cidrs(AddressFamily::IPv4),
            vec!["10.0.0.0/24", "10.0.1.0/24", "10.0.2.0/24"]
        );
        assert!(set.ipv6().is_empty());
    }

    #[test]
    fn test_same_prefix_from_two_sources_kept_once() {
        let lens = lens(vec![
            StaticClient::new(SourceId::RipeStat).ipv4(&["192.0.2.0/24"]),
            StaticClient::new(SourceId::BgpViewPrefixes).ipv4(&["192.0.2.0/24"]),
        ]);
        let outcome = lens.aggregate_with_report(1, &org(1));
        assert_eq!(outcome.set.cidrs(AddressFamily::IPv4), vec!["192.0.2.0/24"]);

        let v4: Vec<&SourceReport> = outcome
            .reports
            .iter()
            .filter(|r| r.family == AddressFamily::IPv4)
            .collect();
        assert_eq!(v4[0].new_prefixes, 1);
        assert_eq!(v4[1].new_prefixes, 0);
        assert_eq!(v4[1].returned, 1);
    }

    #[test]
    fn test_malformed_entries_do_not_abort_source() {
        let lens = lens(vec![StaticClient::new(SourceId::LookingGlassAlt)
            .ipv4(&["999.0.0.0/24", "not-a-prefix", "198.51.100.0/24"])
            .ipv6(&["2001:db8::/32", "2001:db8::/129"])]);
        let outcome = lens.aggregate_with_report(1, &org(1));
        assert_eq!(outcome.set.cidrs(AddressFamily::IPv4), vec!["198.51.100.0/24"]);
        assert_eq!(outcome.set.cidrs(AddressFamily::IPv6), vec!["2001:db8::/32"]);
        assert_eq!(outcome.reports[0].malformed_dropped, 2);
        assert_eq!(outcome.reports[1].malformed_dropped, 1);
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let lens = lens(vec![
            StaticClient::new(SourceId::LookingGlass)
                .ipv4(&["203.0.113.0/24", "192.0.2.0/24"])
                .ipv6(&["2001:db8:1::/48"]),
            StaticClient::failing(SourceId::RipeStat),
            StaticClient::new(SourceId::Whois).ipv4(&["198.51.100.0/24"]),
        ]);
        let first = lens.aggregate(7, &org(7));
        let second = lens.aggregate(7, &org(7));
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let make = || {
            lens(vec![
                StaticClient::new(SourceId::LookingGlass).ipv4(&["10.0.1.0/24"]),
                StaticClient::new(SourceId::RipeStat).ipv4(&["10.0.0.0/24", "10.0.1.0/24"]),
            ])
        };
        let parallel = make().aggregate_with_report(9, &org(9));
        let sequential = make().with_parallel(false).aggregate_with_report(9, &org(9));
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn test_every_client_called_for_both_families() {
        let a = Arc::new(StaticClient::new(SourceId::LookingGlass));
        let b = Arc::new(StaticClient::failing(SourceId::Whois));
        let lens = AggregateLens::new(vec![
            a.clone() as Arc<dyn SourceClient>,
            b.clone() as Arc<dyn SourceClient>,
        ]);
        lens.aggregate(1, &org(1));
        assert_eq!(a.call_count(), 2);
        assert_eq!(b.call_count(), 2);
        assert_eq!(lens.sources(), vec![SourceId::LookingGlass, SourceId::Whois]);
    }
}
