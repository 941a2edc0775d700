//! Collection statistics
//!
//! Prefix counts, prefix-length distribution and IPv4 address-space size per
//! ASN and over a whole collection. Address counts do not account for overlapping prefixes: a /16
//! and one of its /24s both count in full.

use crate::lens::collect::AsnCollection;
use crate::models::{AddressFamily, AsnPrefixSet, PrefixRecord};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;

/// How many prefixes there are of each length, per family
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixLengthDistribution {
    #[serde(default)]
    pub ipv4: BTreeMap<u8, usize>,
    #[serde(default)]
    pub ipv6: BTreeMap<u8, usize>,
}

impl PrefixLengthDistribution {
    pub fn of<'a>(prefixes: impl IntoIterator<Item = &'a PrefixRecord>) -> Self {
        let mut dist = Self::default();
        for prefix in prefixes {
            dist.add(prefix.address_family(), prefix.prefix_len());
        }
        dist
    }

    /// Same as [`PrefixLengthDistribution::of`] for unvalidated strings;
    /// malformed entries are skipped.
    pub fn of_cidrs<S: AsRef<str>>(cidrs: &[S]) -> Self {
        let records: Vec<PrefixRecord> = cidrs
            .iter()
            .filter_map(|c| PrefixRecord::parse(c.as_ref()))
            .collect();
        Self::of(&records)
    }

    fn add(&mut self, family: AddressFamily, len: u8) {
        *self.family_mut(family).entry(len).or_insert(0) += 1;
    }

    fn family_mut(&mut self, family: AddressFamily) -> &mut BTreeMap<u8, usize> {
        match family {
            AddressFamily::IPv4 => &mut self.ipv4,
            AddressFamily::IPv6 => &mut self.ipv6,
        }
    }

    pub fn family(&self, family: AddressFamily) -> &BTreeMap<u8, usize> {
        match family {
            AddressFamily::IPv4 => &self.ipv4,
            AddressFamily::IPv6 => &self.ipv6,
        }
    }

    pub fn merge(&mut self, other: &PrefixLengthDistribution) {
        for family in AddressFamily::ALL {
            let target = self.family_mut(family);
            for (len, count) in other.family(family) {
                *target.entry(*len).or_insert(0) += count;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ipv4.is_empty() && self.ipv6.is_empty()
    }

    /// The `n` most frequent lengths, most frequent first; ties go to the
    /// shorter prefix
    pub fn most_common(&self, family: AddressFamily, n: usize) -> Vec<(u8, usize)> {
        self.family(family)
            .iter()
            .map(|(len, count)| (*len, *count))
            .sorted_by_key(|(len, count)| (Reverse(*count), *len))
            .take(n)
            .collect()
    }

    /// `/24 (12), /23 (3)` style listing of [`PrefixLengthDistribution::most_common`]
    pub fn describe(&self, family: AddressFamily, n: usize) -> String {
        self.most_common(family, n)
            .into_iter()
            .map(|(len, count)| format!("/{} ({})", len, count))
            .join(", ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsnStats {
    pub ipv4_count: usize,
    pub ipv6_count: usize,
    pub total_ipv4_addresses: u128,
    pub prefix_lengths: PrefixLengthDistribution,
}

impl AsnStats {
    pub fn of(set: &AsnPrefixSet) -> Self {
        Self {
            ipv4_count: set.ipv4().len(),
            ipv6_count: set.ipv6().len(),
            total_ipv4_addresses: ipv4_addresses(set.ipv4().iter()),
            prefix_lengths: PrefixLengthDistribution::of(set.ipv4().iter().chain(set.ipv6())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub total_asns: usize,
    pub total_ipv4_prefixes: usize,
    pub total_ipv6_prefixes: usize,
    pub total_prefixes: usize,
    pub total_ipv4_addresses: u128,
    /// ASNs with no prefix from any source
    pub empty_asns: usize,
    pub prefix_lengths: PrefixLengthDistribution,
}

impl CollectionStats {
    pub fn of(collection: &AsnCollection) -> Self {
        collection.iter().map(AsnStats::of).fold(
            Self {
                total_asns: collection.len(),
                ..Default::default()
            },
            |mut acc, s| {
                acc.total_ipv4_prefixes += s.ipv4_count;
                acc.total_ipv6_prefixes += s.ipv6_count;
                acc.total_prefixes += s.ipv4_count + s.ipv6_count;
                acc.total_ipv4_addresses = acc.total_ipv4_addresses.saturating_add(s.total_ipv4_addresses);
                acc.prefix_lengths.merge(&s.prefix_lengths);
                if s.ipv4_count + s.ipv6_count == 0 {
                    acc.empty_asns += 1;
                }
                acc
            },
        )
    }
}

/// Sum of the addresses covered by the IPv4 records, other families ignored
pub fn ipv4_addresses<'a>(prefixes: impl Iterator<Item = &'a PrefixRecord>) -> u128 {
    prefixes
        .filter(|p| p.address_family() == AddressFamily::IPv4)
        .map(|p| p.num_addresses())
        .fold(0u128, |acc, n| acc.saturating_add(n))
}

/// Address count of CIDR strings that may not have been validated.
///
/// Anything that does not parse as an IPv4 prefix is skipped.
pub fn ipv4_addresses_of_cidrs<S: AsRef<str>>(cidrs: &[S]) -> u128 {
    cidrs
        .iter()
        .filter_map(|c| PrefixRecord::parse(c.as_ref()))
        .filter(|p| p.address_family() == AddressFamily::IPv4)
        .map(|p| p.num_addresses())
        .fold(0u128, |acc, n| acc.saturating_add(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrganizationCandidate;
    use crate::sources::SourceResult;

    fn set(asn: u32, v4: &[&str], v6: &[&str]) -> AsnPrefixSet {
        let ipv4 = SourceResult::from_raw(AddressFamily::IPv4, v4).prefixes;
        let ipv6 = SourceResult::from_raw(AddressFamily::IPv6, v6).prefixes;
        AsnPrefixSet::from_sorted(asn, OrganizationCandidate::from_asn(asn), ipv4, ipv6)
    }

    #[test]
    fn test_asn_stats() {
        let stats = AsnStats::of(&set(1, &["10.0.0.0/24", "10.1.0.0/16"], &["2001:db8::/32"]));
        assert_eq!(stats.ipv4_count, 2);
        assert_eq!(stats.ipv6_count, 1);
        assert_eq!(stats.total_ipv4_addresses, 256 + 65536);
        assert_eq!(stats.prefix_lengths.ipv4, BTreeMap::from([(16, 1), (24, 1)]));
        assert_eq!(stats.prefix_lengths.ipv6, BTreeMap::from([(32, 1)]));
    }

    #[test]
    fn test_collection_stats() {
        let collection: AsnCollection = vec![
            set(1, &["10.0.0.0/24"], &[]),
            set(2, &[], &[]),
            set(3, &["192.0.2.0/25"], &["2001:db8::/48"]),
        ]
        .into_iter()
        .collect();
        let stats = CollectionStats::of(&collection);
        assert_eq!(stats.total_asns, 3);
        assert_eq!(stats.total_prefixes, 3);
        assert_eq!(stats.total_ipv6_prefixes, 1);
        assert_eq!(stats.total_ipv4_addresses, 256 + 128);
        assert_eq!(stats.empty_asns, 1);
        assert_eq!(stats.prefix_lengths.ipv4, BTreeMap::from([(24, 1), (25, 1)]));
        assert_eq!(stats.prefix_lengths.ipv6, BTreeMap::from([(48, 1)]));
    }

    #[test]
    fn test_most_common_lengths() {
        let dist = PrefixLengthDistribution::of_cidrs(&[
            "10.0.0.0/24",
            "10.0.1.0/24",
            "10.0.2.0/24",
            "10.1.0.0/22",
            "10.2.0.0/23",
            "10.3.0.0/23",
            "not-a-prefix",
            "2001:db8::/48",
        ]);
        assert_eq!(dist.family(AddressFamily::IPv4).values().sum::<usize>(), 6);
        assert_eq!(
            dist.most_common(AddressFamily::IPv4, 2),
            vec![(24, 3), (23, 2)]
        );
        assert_eq!(dist.describe(AddressFamily::IPv4, 3), "/24 (3), /23 (2), /22 (1)");
        assert_eq!(dist.describe(AddressFamily::IPv6, 3), "/48 (1)");
        assert!(PrefixLengthDistribution::default().describe(AddressFamily::IPv6, 3).is_empty());
    }

    #[test]
    fn test_distribution_merge() {
        let mut a = PrefixLengthDistribution::of_cidrs(&["10.0.0.0/24", "2001:db8::/32"]);
        let b = PrefixLengthDistribution::of_cidrs(&["10.9.0.0/24", "10.8.0.0/16"]);
        a.merge(&b);
        assert_eq!(a.ipv4, BTreeMap::from([(16, 1), (24, 2)]));
        assert_eq!(a.ipv6, BTreeMap::from([(32, 1)]));
    }

    #[test]
    fn test_unvalidated_cidrs_skip_malformed() {
        assert_eq!(
            ipv4_addresses_of_cidrs(&["10.0.0.0/30", "garbage", "2001:db8::/64", "999.1.1.1/8"]),
            4
        );
        let empty: [&str; 0] = [];
        assert_eq!(ipv4_addresses_of_cidrs(&empty), 0);
    }
}
