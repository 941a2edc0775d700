//! Compare lens
//!
//! Diffs two snapshots of a collection: which ASNs appeared or disappeared,
//! and for every ASN present in both, which CIDR strings were added or
//! dropped. Prefixes are compared as plain strings, both families together.

use crate::lens::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsnChange {
    pub asn: u32,
    pub name: String,
    pub new_prefixes: Vec<String>,
    pub removed_prefixes: Vec<String>,
}

/// Flattened row for table output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "display", derive(tabled::Tabled))]
pub struct ChangeRow {
    pub change: String,
    pub asn: u32,
    pub name: String,
    pub prefix: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub baseline_timestamp: String,
    pub current_timestamp: String,
    /// Ascending
    pub new_asns: Vec<u32>,
    /// Ascending
    pub removed_asns: Vec<u32>,
    /// Common ASNs with at least one prefix difference, ascending
    pub changed: Vec<AsnChange>,
}

impl ComparisonResult {
    pub fn is_unchanged(&self) -> bool {
        self.new_asns.is_empty() && self.removed_asns.is_empty() && self.changed.is_empty()
    }

    pub fn total_new_prefixes(&self) -> usize {
        self.changed.iter().map(|c| c.new_prefixes.len()).sum()
    }

    pub fn total_removed_prefixes(&self) -> usize {
        self.changed.iter().map(|c| c.removed_prefixes.len()).sum()
    }

    pub fn rows(&self) -> Vec<ChangeRow> {
        let mut rows = Vec::new();
        for asn in &self.new_asns {
            rows.push(ChangeRow {
                change: "+asn".to_string(),
                asn: *asn,
                name: String::new(),
                prefix: String::new(),
            });
        }
        for asn in &self.removed_asns {
            rows.push(ChangeRow {
                change: "-asn".to_string(),
                asn: *asn,
                name: String::new(),
                prefix: String::new(),
            });
        }
        for change in &self.changed {
            let added = change.new_prefixes.iter().map(|p| ("+prefix", p));
            let removed = change.removed_prefixes.iter().map(|p| ("-prefix", p));
            for (kind, prefix) in added.chain(removed) {
                rows.push(ChangeRow {
                    change: kind.to_string(),
                    asn: change.asn,
                    name: change.name.clone(),
                    prefix: prefix.clone(),
                });
            }
        }
        rows
    }
}

// =============================================================================
// Lens
// =============================================================================

#[derive(Debug, Default)]
pub struct CompareLens;

impl CompareLens {
    pub fn new() -> Self {
        Self
    }

    pub fn compare(&self, baseline: &Snapshot, current: &Snapshot) -> ComparisonResult {
        let before = baseline.asns();
        let after = current.asns();

        let changed = before
            .intersection(&after)
            .filter_map(|asn| {
                let old = baseline.get(*asn)?.all_prefixes();
                let new_entry = current.get(*asn)?;
                let new = new_entry.all_prefixes();
                let change = AsnChange {
                    asn: *asn,
                    name: new_entry.info.name.clone(),
                    new_prefixes: difference(&new, &old),
                    removed_prefixes: difference(&old, &new),
                };
                if change.new_prefixes.is_empty() && change.removed_prefixes.is_empty() {
                    None
                } else {
                    Some(change)
                }
            })
            .collect();

        ComparisonResult {
            baseline_timestamp: baseline.timestamp.clone(),
            current_timestamp: current.timestamp.clone(),
            new_asns: after.difference(&before).copied().collect(),
            removed_asns: before.difference(&after).copied().collect(),
            changed,
        }
    }
}

fn difference(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> Vec<String> {
    a.difference(b).map(|p| p.to_string()).collect()
}
