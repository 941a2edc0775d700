//! Collect lens
//!
//! Drives the aggregate lens over a selection of candidates. With `parallel`
//! set and more than one ASN selected, ASNs are aggregated on a dedicated
//! pool of `max_workers` threads; otherwise they run one after another in
//! selection order.
//!
//! Every ASN moves through `Pending → InProgress → Completed | Failed`.
//! `Failed` only happens for input that cannot be collected at all (a
//! reserved ASN); source failures end in `Completed` with zero prefixes.
//! An ASN whose sources were cut short by the cancel token ends in
//! `Interrupted` and is left out of the collection.

use crate::config::HunterConfig;
use crate::lens::aggregate::AggregateLens;
use crate::models::{validate_asn, AsnPrefixSet, OrganizationCandidate};
use crate::sources::{CancelToken, PageFetcher};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

// =============================================================================
// Progress Tracking Types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AsnState {
    Pending,
    InProgress,
    Completed { ipv4: usize, ipv6: usize },
    Failed { reason: String },
    /// Started, but a source was stopped by the cancel token
    Interrupted,
}

impl AsnState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AsnState::Completed { .. } | AsnState::Failed { .. })
    }

    /// Completed without a single prefix
    pub fn is_empty(&self) -> bool {
        matches!(self, AsnState::Completed { ipv4: 0, ipv6: 0 })
    }
}

/// Progress information for collect operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CollectProgress {
    Started {
        total: usize,
        parallel: bool,
    },
    AsnStarted {
        asn: u32,
    },
    AsnFinished {
        asn: u32,
        state: AsnState,
        /// ASNs finished so far, this one included
        done: usize,
        total: usize,
    },
    Completed {
        collected: usize,
        empty: usize,
        failed: usize,
        cancelled: bool,
    },
}

/// Receives [`CollectProgress`] updates, possibly from worker threads
pub type CollectProgressCallback = Arc<dyn Fn(CollectProgress) + Send + Sync>;

// =============================================================================
// Types
// =============================================================================

/// Collected prefix sets keyed by ASN, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsnCollection {
    entries: Vec<AsnPrefixSet>,
}

impl AsnCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the set for its ASN
    pub fn insert(&mut self, set: AsnPrefixSet) {
        match self.entries.iter_mut().find(|e| e.asn() == set.asn()) {
            Some(existing) => *existing = set,
            None => self.entries.push(set),
        }
    }

    pub fn get(&self, asn: u32) -> Option<&AsnPrefixSet> {
        self.entries.iter().find(|e| e.asn() == asn)
    }

    pub fn contains(&self, asn: u32) -> bool {
        self.get(asn).is_some()
    }

    pub fn keys(&self) -> Vec<u32> {
        self.entries.iter().map(|e| e.asn()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AsnPrefixSet> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Order entries by ascending ASN
    pub fn sort_by_asn(&mut self) {
        self.entries.sort_by_key(|e| e.asn());
    }

    /// ASNs for which no source returned anything
    pub fn empty_asns(&self) -> Vec<u32> {
        self.entries
            .iter()
            .filter(|e| e.is_empty())
            .map(|e| e.asn())
            .collect()
    }

    pub fn total_prefixes(&self) -> usize {
        self.entries.iter().map(|e| e.total()).sum()
    }
}

impl FromIterator<AsnPrefixSet> for AsnCollection {
    fn from_iter<I: IntoIterator<Item = AsnPrefixSet>>(iter: I) -> Self {
        let mut collection = AsnCollection::new();
        for set in iter {
            collection.insert(set);
        }
        collection
    }
}

impl IntoIterator for AsnCollection {
    type Item = AsnPrefixSet;
    type IntoIter = std::vec::IntoIter<AsnPrefixSet>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Collection plus the final state of every selected ASN
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionReport {
    pub collection: AsnCollection,
    /// One entry per distinct selected ASN, in selection order
    pub states: Vec<(u32, AsnState)>,
    /// Interrupted before every ASN was processed
    pub cancelled: bool,
}

impl CollectionReport {
    pub fn empty_asns(&self) -> Vec<u32> {
        self.states
            .iter()
            .filter(|(_, s)| s.is_empty())
            .map(|(asn, _)| *asn)
            .collect()
    }

    pub fn failed(&self) -> Vec<(u32, &str)> {
        self.states
            .iter()
            .filter_map(|(asn, s)| match s {
                AsnState::Failed { reason } => Some((*asn, reason.as_str())),
                _ => None,
            })
            .collect()
    }

    /// ASNs never started or cut short because of an interrupt
    pub fn skipped(&self) -> Vec<u32> {
        self.states
            .iter()
            .filter(|(_, s)| !s.is_terminal())
            .map(|(asn, _)| *asn)
            .collect()
    }
}

// =============================================================================
// Lens
// =============================================================================

pub struct CollectLens {
    aggregator: AggregateLens,
    max_workers: usize,
    cancel: CancelToken,
}

impl CollectLens {
    pub fn new(aggregator: AggregateLens, max_workers: usize, cancel: CancelToken) -> Self {
        Self {
            aggregator,
            max_workers: max_workers.max(1),
            cancel,
        }
    }

    pub fn from_config(
        config: &HunterConfig,
        fetcher: Arc<dyn PageFetcher>,
        cancel: CancelToken,
    ) -> Self {
        let aggregator = AggregateLens::from_config(config, fetcher, cancel.clone());
        Self::new(aggregator, config.max_workers, cancel)
    }

    pub fn aggregator(&self) -> &AggregateLens {
        &self.aggregator
    }

    pub fn collect(&self, selected: &[OrganizationCandidate], parallel: bool) -> AsnCollection {
        self.collect_with_progress(selected, parallel, None).collection
    }

    pub fn collect_with_progress(
        &self,
        selected: &[OrganizationCandidate],
        parallel: bool,
        callback: Option<CollectProgressCallback>,
    ) -> CollectionReport {
        let mut seen = HashSet::new();
        let targets: Vec<&OrganizationCandidate> =
            selected.iter().filter(|c| seen.insert(c.asn)).collect();
        let total = targets.len();

        let states: Mutex<Vec<AsnState>> = Mutex::new(vec![AsnState::Pending; total]);
        let done = AtomicUsize::new(0);
        let parallel = parallel && total > 1;

        if let Some(ref cb) = callback {
            cb(CollectProgress::Started { total, parallel });
        }

        let run = |index: usize, candidate: &OrganizationCandidate| -> Option<AsnPrefixSet> {
            if self.cancel.is_cancelled() {
                return None;
            }
            set_state(&states, index, AsnState::InProgress);
            if let Some(ref cb) = callback {
                cb(CollectProgress::AsnStarted { asn: candidate.asn });
            }

            let (set, state) = match validate_asn(candidate.asn) {
                Ok(asn) => {
                    let outcome = self.aggregator.aggregate_with_report(asn, candidate);
                    if outcome.interrupted() {
                        warn!("AS{} interrupted, partial result discarded", asn);
                        (None, AsnState::Interrupted)
                    } else {
                        let state = AsnState::Completed {
                            ipv4: outcome.set.ipv4().len(),
                            ipv6: outcome.set.ipv6().len(),
                        };
                        (Some(outcome.set), state)
                    }
                }
                Err(e) => {
                    warn!("skipping AS{}: {}", candidate.asn, e);
                    (None, AsnState::Failed { reason: e.to_string() })
                }
            };

            set_state(&states, index, state.clone());
            let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(ref cb) = callback {
                cb(CollectProgress::AsnFinished {
                    asn: candidate.asn,
                    state,
                    done: finished,
                    total,
                });
            }
            set
        };

        let results: Vec<Option<AsnPrefixSet>> = if parallel {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.max_workers)
                .build()
            {
                Ok(pool) => {
                    info!(
                        "collecting {} ASNs with {} workers",
                        total, self.max_workers
                    );
                    pool.install(|| {
                        targets
                            .par_iter()
                            .enumerate()
                            .map(|(i, c)| run(i, *c))
                            .collect()
                    })
                }
                Err(e) => {
                    warn!("worker pool unavailable ({}), collecting sequentially", e);
                    targets.iter().enumerate().map(|(i, c)| run(i, *c)).collect()
                }
            }
        } else {
            targets.iter().enumerate().map(|(i, c)| run(i, *c)).collect()
        };

        let collection: AsnCollection = results.into_iter().flatten().collect();
        let states = states.into_inner().unwrap_or_else(|e| e.into_inner());
        let cancelled = states.iter().any(|s| !s.is_terminal());

        let states: Vec<(u32, AsnState)> = targets.iter().map(|c| c.asn).zip(states).collect();
        let report = CollectionReport {
            collection,
            states,
            cancelled,
        };

        if cancelled {
            warn!(
                "collection interrupted, {} ASN(s) not processed",
                report.skipped().len()
            );
        }
        if let Some(ref cb) = callback {
            cb(CollectProgress::Completed {
                collected: report.collection.len(),
                empty: report.empty_asns().len(),
                failed: report.failed().len(),
                cancelled,
            });
        }
        report
    }
}

fn set_state(states: &Mutex<Vec<AsnState>>, index: usize, state: AsnState) {
    let mut guard = match states.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(slot) = guard.get_mut(index) {
        *slot = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::testing::StaticClient;
    use crate::error::ErrorKind;
    use crate::models::AddressFamily;
    use crate::sources::{SourceClient, SourceId, SourceResult};

    fn candidate(asn: u32, name: &str) -> OrganizationCandidate {
        OrganizationCandidate::new(asn, name)
    }

    fn lens_with(clients: Vec<StaticClient>, cancel: CancelToken) -> CollectLens {
        let clients = clients
            .into_iter()
            .map(|c| Arc::new(c) as Arc<dyn SourceClient>)
            .collect();
        CollectLens::new(AggregateLens::new(clients), 3, cancel)
    }

    #[test]
    fn test_sequential_collect_keeps_selection_order() {
        let lens = lens_with(
            vec![StaticClient::new(SourceId::RipeStat).ipv4(&["192.0.2.0/24"])],
            CancelToken::new(),
        );
        let selected = vec![candidate(100, "Acme Corp"), candidate(200, "Acme Industries")];
        let collection = lens.collect(&selected, false);
        assert_eq!(collection.keys(), vec![100, 200]);
        assert_eq!(collection.len(), 2);
        assert_eq!(collection.get(200).unwrap().org().name, "Acme Industries");
    }

    #[test]
    fn test_parallel_collect_returns_every_asn() {
        let lens = lens_with(
            vec![StaticClient::new(SourceId::RipeStat).ipv4(&["192.0.2.0/24"])],
            CancelToken::new(),
        );
        let selected: Vec<_> = (1..=8).map(|i| candidate(64500 + i, "x")).collect();
        let mut collection = lens.collect(&selected, true);
        collection.sort_by_asn();
        assert_eq!(collection.keys(), (64501..=64508).collect::<Vec<_>>());
    }

    #[test]
    fn test_failing_sources_complete_empty() {
        let lens = lens_with(
            vec![StaticClient::failing(SourceId::LookingGlass)],
            CancelToken::new(),
        );
        let report = lens.collect_with_progress(
            &[candidate(1, "a"), candidate(2, "b")],
            true,
            None,
        );
        assert_eq!(report.collection.len(), 2);
        assert_eq!(report.empty_asns(), vec![1, 2]);
        assert!(report.failed().is_empty());
        assert!(!report.cancelled);
    }

    #[test]
    fn test_reserved_asn_fails_without_stopping_others() {
        let lens = lens_with(
            vec![StaticClient::new(SourceId::Whois).ipv6(&["2001:db8::/32"])],
            CancelToken::new(),
        );
        let report = lens.collect_with_progress(
            &[candidate(23456, "trans"), candidate(64500, "ok")],
            false,
            None,
        );
        assert_eq!(report.collection.keys(), vec![64500]);
        assert_eq!(report.failed().len(), 1);
        assert_eq!(report.failed()[0].0, 23456);
        assert_eq!(
            report.states[1].1,
            AsnState::Completed { ipv4: 0, ipv6: 1 }
        );
    }

    #[test]
    fn test_duplicate_selection_collected_once() {
        let client = Arc::new(StaticClient::new(SourceId::RipeStat));
        let lens = CollectLens::new(
            AggregateLens::new(vec![client.clone() as Arc<dyn SourceClient>]),
            2,
            CancelToken::new(),
        );
        let report =
            lens.collect_with_progress(&[candidate(5, "a"), candidate(5, "a")], false, None);
        assert_eq!(report.states.len(), 1);
        assert_eq!(client.call_count(), 2);
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let lens = lens_with(vec![StaticClient::new(SourceId::RipeStat)], cancel);
        let report = lens.collect_with_progress(&[candidate(1, "a"), candidate(2, "b")], false, None);
        assert!(report.cancelled);
        assert!(report.collection.is_empty());
        assert_eq!(report.skipped(), vec![1, 2]);
    }

    /// Cancels the shared token from inside the first fetch
    struct CancellingClient {
        cancel: CancelToken,
    }

    impl SourceClient for CancellingClient {
        fn id(&self) -> SourceId {
            SourceId::LookingGlass
        }

        fn fetch_prefixes(&self, _asn: u32, _family: AddressFamily) -> SourceResult {
            self.cancel.cancel();
            SourceResult::failed(ErrorKind::Cancelled)
        }
    }

    #[test]
    fn test_cancelled_mid_asn_is_not_reported_empty() {
        let cancel = CancelToken::new();
        let clients: Vec<Arc<dyn SourceClient>> = vec![
            Arc::new(StaticClient::new(SourceId::RipeStat).ipv4(&["192.0.2.0/24"])),
            Arc::new(CancellingClient {
                cancel: cancel.clone(),
            }),
        ];
        let lens = CollectLens::new(AggregateLens::new(clients).with_parallel(false), 2, cancel);

        let report = lens.collect_with_progress(
            &[candidate(64500, "a"), candidate(64501, "b")],
            false,
            None,
        );
        assert!(report.cancelled);
        assert!(report.collection.is_empty());
        assert!(report.empty_asns().is_empty());
        assert_eq!(report.states[0], (64500, AsnState::Interrupted));
        assert_eq!(report.states[1], (64501, AsnState::Pending));
        assert_eq!(report.skipped(), vec![64500, 64501]);
    }

    #[test]
    fn test_progress_callback() {
        let events: Arc<Mutex<Vec<CollectProgress>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let callback: CollectProgressCallback = Arc::new(move |p: CollectProgress| {
            sink.lock().unwrap().push(p);
        });

        let lens = lens_with(vec![StaticClient::new(SourceId::RipeStat)], CancelToken::new());
        lens.collect_with_progress(&[candidate(1, "a"), candidate(2, "b")], true, Some(callback));

        let events = events.lock().unwrap();
        assert!(matches!(events.first(), Some(CollectProgress::Started { total: 2, parallel: true })));
        assert!(matches!(
            events.last(),
            Some(CollectProgress::Completed { collected: 2, empty: 2, failed: 0, cancelled: false })
        ));
        let finished = events
            .iter()
            .filter(|e| matches!(e, CollectProgress::AsnFinished { .. }))
            .count();
        assert_eq!(finished, 2);
    }

    #[test]
    fn test_collection_insert_replaces() {
        let mut collection = AsnCollection::new();
        collection.insert(AsnPrefixSet::empty(2, candidate(2, "old")));
        collection.insert(AsnPrefixSet::empty(1, candidate(1, "one")));
        collection.insert(AsnPrefixSet::empty(2, candidate(2, "new")));
        assert_eq!(collection.keys(), vec![2, 1]);
        assert_eq!(collection.get(2).unwrap().org().name, "new");
        collection.sort_by_asn();
        assert_eq!(collection.keys(), vec![1, 2]);
    }
}
