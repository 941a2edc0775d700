//! Collection snapshots
//!
//! A snapshot is the serializable form of a finished collection: when and for
//! which keyword it was taken, every ASN's organization info and prefix
//! lists, and the derived statistics. Snapshots written by older versions of
//! the tool (prefix lists under `ipv4`/`ipv6`, counts missing) still load.
//!
//! ```rust,ignore
//! let snapshot = Snapshot::from_collection(&collection, Some("acme"));
//! std::fs::write("acme.json", snapshot.to_json(true)?)?;
//!
//! let baseline = Snapshot::from_json(&std::fs::read_to_string("acme.json")?)?;
//! ```

use crate::error::HunterError;
use crate::lens::collect::AsnCollection;
use crate::lens::stats::{ipv4_addresses_of_cidrs, AsnStats, CollectionStats, PrefixLengthDistribution};
use crate::models::{AddressFamily, AsnPrefixSet, OrganizationCandidate};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const SNAPSHOT_VERSION: &str = concat!("asnhunt-", env!("CARGO_PKG_VERSION"));

// =============================================================================
// Types
// =============================================================================

/// Organization fields kept in a snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, rename = "rir", skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl From<&OrganizationCandidate> for SnapshotInfo {
    fn from(org: &OrganizationCandidate) -> Self {
        Self {
            name: org.name.clone(),
            description: org.description.clone(),
            country: org.country.clone(),
            registry: org.registry.map(|r| r.to_string()),
            website: org.website.clone(),
            sources: org.source_tags.iter().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotAsn {
    #[serde(default)]
    pub info: SnapshotInfo,
    #[serde(default, alias = "ipv4")]
    pub ipv4_prefixes: Vec<String>,
    #[serde(default, alias = "ipv6")]
    pub ipv6_prefixes: Vec<String>,
    #[serde(default)]
    pub ipv4_count: usize,
    #[serde(default)]
    pub ipv6_count: usize,
    #[serde(default)]
    pub total_ipv4_addresses: u128,
    #[serde(default)]
    pub prefix_lengths: PrefixLengthDistribution,
}

impl SnapshotAsn {
    fn from_set(set: &AsnPrefixSet) -> Self {
        let stats = AsnStats::of(set);
        Self {
            info: SnapshotInfo::from(set.org()),
            ipv4_prefixes: to_strings(set.cidrs(AddressFamily::IPv4)),
            ipv6_prefixes: to_strings(set.cidrs(AddressFamily::IPv6)),
            ipv4_count: stats.ipv4_count,
            ipv6_count: stats.ipv6_count,
            total_ipv4_addresses: stats.total_ipv4_addresses,
            prefix_lengths: stats.prefix_lengths,
        }
    }

    /// Both families as one set of CIDR strings
    pub fn all_prefixes(&self) -> BTreeSet<&str> {
        self.ipv4_prefixes
            .iter()
            .chain(self.ipv6_prefixes.iter())
            .map(|p| p.as_str())
            .collect()
    }

    fn recount(&mut self) {
        self.ipv4_count = self.ipv4_prefixes.len();
        self.ipv6_count = self.ipv6_prefixes.len();
        self.total_ipv4_addresses = ipv4_addresses_of_cidrs(&self.ipv4_prefixes);
        self.prefix_lengths = PrefixLengthDistribution::of_cidrs(&self.ipv4_prefixes);
        self.prefix_lengths
            .merge(&PrefixLengthDistribution::of_cidrs(&self.ipv6_prefixes));
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    #[serde(default)]
    pub total_ipv4_addresses: u128,
    #[serde(default)]
    pub total_prefixes: usize,
    #[serde(default)]
    pub collection_timestamp: String,
    /// Over every ASN of the snapshot
    #[serde(default)]
    pub prefix_lengths: PrefixLengthDistribution,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub total_asns: usize,
    /// Keyed by ASN; JSON object keys are the ASN in decimal
    pub asns: BTreeMap<u32, SnapshotAsn>,
    #[serde(default)]
    pub summary: SnapshotSummary,
}

// =============================================================================
// Construction and (de)serialization
// =============================================================================

impl Snapshot {
    pub fn from_collection(collection: &AsnCollection, keyword: Option<&str>) -> Self {
        Self::taken_at(collection, keyword, Utc::now())
    }

    pub fn taken_at(
        collection: &AsnCollection,
        keyword: Option<&str>,
        taken: DateTime<Utc>,
    ) -> Self {
        let stats = CollectionStats::of(collection);
        let timestamp = taken.to_rfc3339_opts(SecondsFormat::Secs, true);
        Self {
            timestamp: timestamp.clone(),
            keyword: keyword.map(|k| k.to_string()),
            version: SNAPSHOT_VERSION.to_string(),
            total_asns: stats.total_asns,
            asns: collection
                .iter()
                .map(|set| (set.asn(), SnapshotAsn::from_set(set)))
                .collect(),
            summary: SnapshotSummary {
                total_ipv4_addresses: stats.total_ipv4_addresses,
                total_prefixes: stats.total_prefixes,
                collection_timestamp: timestamp,
                prefix_lengths: stats.prefix_lengths,
            },
        }
    }

    pub fn to_json(&self, pretty: bool) -> serde_json::Result<String> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }

    /// Load a snapshot, recomputing counts and the summary from the prefix
    /// lists it contains.
    pub fn from_json(input: &str) -> Result<Self, HunterError> {
        let mut snapshot: Snapshot =
            serde_json::from_str(input).map_err(|e| HunterError::InvalidSnapshot(e.to_string()))?;

        for entry in snapshot.asns.values_mut() {
            entry.recount();
        }
        snapshot.total_asns = snapshot.asns.len();
        snapshot.summary.total_prefixes = snapshot
            .asns
            .values()
            .map(|a| a.ipv4_count + a.ipv6_count)
            .sum();
        snapshot.summary.total_ipv4_addresses = snapshot
            .asns
            .values()
            .fold(0u128, |acc, a| acc.saturating_add(a.total_ipv4_addresses));
        snapshot.summary.prefix_lengths = PrefixLengthDistribution::default();
        for entry in snapshot.asns.values() {
            snapshot.summary.prefix_lengths.merge(&entry.prefix_lengths);
        }
        if snapshot.summary.collection_timestamp.is_empty() {
            snapshot.summary.collection_timestamp = snapshot.timestamp.clone();
        }
        Ok(snapshot)
    }

    pub fn asns(&self) -> BTreeSet<u32> {
        self.asns.keys().copied().collect()
    }

    pub fn get(&self, asn: u32) -> Option<&SnapshotAsn> {
        self.asns.get(&asn)
    }
}

fn to_strings(cidrs: Vec<&str>) -> Vec<String> {
    cidrs.into_iter().map(|c| c.to_string()).collect()
}
