//! Core data model
//!
//! [`OrganizationCandidate`] is what the resolver produces for each ASN that
//! matches a keyword, [`PrefixRecord`] is a validated CIDR string, and
//! [`AsnPrefixSet`] is the frozen result of aggregating every source for one ASN.

use crate::error::HunterError;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// ASN helpers
// =============================================================================

/// AS_TRANS (RFC 6793), never a real origin
pub const AS_TRANS: u32 = 23456;

/// Check that an ASN can identify a real routing domain.
///
/// AS0, AS_TRANS and the last 16-bit and 32-bit numbers are reserved.
pub fn validate_asn(asn: u32) -> Result<u32, HunterError> {
    match asn {
        0 | AS_TRANS | 65535 | u32::MAX => Err(HunterError::InvalidAsn(asn.to_string())),
        _ => Ok(asn),
    }
}

/// Parse `"13335"`, `"AS13335"` or `"as13335"` into a validated ASN
pub fn parse_asn(input: &str) -> Result<u32, HunterError> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("AS")
        .or_else(|| trimmed.strip_prefix("as"))
        .or_else(|| trimmed.strip_prefix("As"))
        .unwrap_or(trimmed);
    let asn = digits
        .parse::<u32>()
        .map_err(|_| HunterError::InvalidAsn(input.to_string()))?;
    validate_asn(asn)
}

// =============================================================================
// Address family
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AddressFamily {
    #[serde(rename = "ipv4")]
    IPv4,
    #[serde(rename = "ipv6")]
    IPv6,
}

impl AddressFamily {
    pub const ALL: [AddressFamily; 2] = [AddressFamily::IPv4, AddressFamily::IPv6];

    pub fn label(&self) -> &'static str {
        match self {
            AddressFamily::IPv4 => "ipv4",
            AddressFamily::IPv6 => "ipv6",
        }
    }

    /// Textual family test used by the upstream APIs: IPv4 records contain a
    /// `.` and no `:`, IPv6 records contain a `:`.
    pub fn matches_text(&self, raw: &str) -> bool {
        match self {
            AddressFamily::IPv4 => raw.contains('.') && !raw.contains(':'),
            AddressFamily::IPv6 => raw.contains(':'),
        }
    }

    fn of_net(net: &IpNet) -> Self {
        match net {
            IpNet::V4(_) => AddressFamily::IPv4,
            IpNet::V6(_) => AddressFamily::IPv6,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for AddressFamily {
    type Err = HunterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ipv4" | "v4" | "4" | "inet" => Ok(AddressFamily::IPv4),
            "ipv6" | "v6" | "6" | "inet6" => Ok(AddressFamily::IPv6),
            _ => Err(HunterError::InvalidAddressFamily(s.to_string())),
        }
    }
}

// =============================================================================
// Prefix record
// =============================================================================

/// A syntactically valid CIDR block.
///
/// The text is kept exactly as the source reported it (trimmed), so two
/// records only compare equal when their strings do. `2001:DB8::/32` and
/// `2001:db8::/32` are distinct records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrefixRecord {
    cidr: String,
    address_family: AddressFamily,
}

impl PrefixRecord {
    /// Validate a raw string with an IP network parser.
    ///
    /// Returns `None` for anything that is not a CIDR block.
    pub fn parse(raw: &str) -> Option<Self> {
        let cidr = raw.trim();
        let net = IpNet::from_str(cidr).ok()?;
        Some(PrefixRecord {
            cidr: cidr.to_string(),
            address_family: AddressFamily::of_net(&net),
        })
    }

    pub fn cidr(&self) -> &str {
        &self.cidr
    }

    pub fn address_family(&self) -> AddressFamily {
        self.address_family
    }

    /// Prefix length, `/24` gives 24
    pub fn prefix_len(&self) -> u8 {
        IpNet::from_str(&self.cidr)
            .map(|net| net.prefix_len())
            .unwrap_or_default()
    }

    /// Number of addresses covered by this block
    pub fn num_addresses(&self) -> u128 {
        match IpNet::from_str(&self.cidr) {
            Ok(net) => {
                let host_bits = u32::from(net.max_prefix_len() - net.prefix_len());
                1u128.checked_shl(host_bits).unwrap_or(u128::MAX)
            }
            Err(_) => 0,
        }
    }
}

impl fmt::Display for PrefixRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cidr)
    }
}

// =============================================================================
// Organization candidate
// =============================================================================

/// Regional Internet Registry responsible for an ASN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Registry {
    Arin,
    Ripe,
    Apnic,
    Lacnic,
    Afrinic,
}

impl fmt::Display for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Registry::Arin => write!(f, "ARIN"),
            Registry::Ripe => write!(f, "RIPE"),
            Registry::Apnic => write!(f, "APNIC"),
            Registry::Lacnic => write!(f, "LACNIC"),
            Registry::Afrinic => write!(f, "AFRINIC"),
        }
    }
}

impl FromStr for Registry {
    type Err = String;

    /// Accepts the names used by the routing databases, e.g. `"RIPE NCC"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        if upper.starts_with("ARIN") {
            Ok(Registry::Arin)
        } else if upper.starts_with("RIPE") {
            Ok(Registry::Ripe)
        } else if upper.starts_with("APNIC") {
            Ok(Registry::Apnic)
        } else if upper.starts_with("LACNIC") {
            Ok(Registry::Lacnic)
        } else if upper.starts_with("AFRINIC") {
            Ok(Registry::Afrinic)
        } else {
            Err(format!("unknown registry '{}'", s))
        }
    }
}

/// Prefix counts an organization advertises about itself. Non-authoritative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixCountHint {
    pub ipv4: u32,
    pub ipv6: u32,
}

impl PrefixCountHint {
    pub fn is_empty(&self) -> bool {
        self.ipv4 == 0 && self.ipv6 == 0
    }
}

/// An ASN that may belong to the organization being searched for
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationCandidate {
    pub asn: u32,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub alternate_names: Vec<String>,
    #[serde(default)]
    pub website: Option<String>,
    /// Two-letter country code
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub registry: Option<Registry>,
    /// Network type as self-declared in the registry (e.g. "Content", "NSP")
    #[serde(default)]
    pub info_type: Option<String>,
    #[serde(default)]
    pub expected_prefix_counts: PrefixCountHint,
    #[serde(default)]
    pub contact_emails: BTreeSet<String>,
    /// Names of the sources that reported this ASN
    #[serde(default)]
    pub source_tags: BTreeSet<String>,
}

impl OrganizationCandidate {
    pub fn new(asn: u32, name: impl Into<String>) -> Self {
        Self {
            asn,
            name: name.into(),
            ..Default::default()
        }
    }

    /// Bare candidate for an ASN given directly by the user
    pub fn from_asn(asn: u32) -> Self {
        Self::new(asn, format!("AS{}", asn))
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source_tags.insert(source.into());
        self
    }

    /// Union another record for the same ASN into this one.
    ///
    /// Fields already set here win; a field that is empty here is filled from
    /// `other`. Set-like fields are unioned and nothing is ever cleared.
    pub fn merge_from(&mut self, other: OrganizationCandidate) {
        debug_assert_eq!(self.asn, other.asn);

        fill_string(&mut self.name, other.name);
        fill_string(&mut self.description, other.description);
        fill_option(&mut self.website, other.website);
        fill_option(&mut self.country, other.country);
        fill_option(&mut self.info_type, other.info_type);
        if self.registry.is_none() {
            self.registry = other.registry;
        }
        if self.expected_prefix_counts.is_empty() {
            self.expected_prefix_counts = other.expected_prefix_counts;
        }

        let mut known: HashSet<String> = self.alternate_names.iter().cloned().collect();
        for name in other.alternate_names {
            if !name.trim().is_empty() && known.insert(name.clone()) {
                self.alternate_names.push(name);
            }
        }
        self.contact_emails.extend(other.contact_emails);
        self.source_tags.extend(other.source_tags);
    }
}

fn fill_string(current: &mut String, other: String) {
    if current.trim().is_empty() && !other.trim().is_empty() {
        *current = other;
    }
}

fn fill_option(current: &mut Option<String>, other: Option<String>) {
    let current_empty = current.as_deref().map(|s| s.trim().is_empty()).unwrap_or(true);
    let other_present = other.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false);
    if current_empty && other_present {
        *current = other;
    }
}

/// Turn an upstream string field into `None` when it is blank
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

// =============================================================================
// Per-ASN prefix set
// =============================================================================

/// All prefixes discovered for one ASN, deduplicated and sorted by CIDR text.
///
/// Built by the aggregator and handed out by value; there is no way to add
/// prefixes once it exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsnPrefixSet {
    asn: u32,
    org: OrganizationCandidate,
    ipv4: Vec<PrefixRecord>,
    ipv6: Vec<PrefixRecord>,
}

impl AsnPrefixSet {
    /// A set with no prefixes, the outcome when every source failed
    pub fn empty(asn: u32, org: OrganizationCandidate) -> Self {
        Self {
            asn,
            org,
            ipv4: Vec::new(),
            ipv6: Vec::new(),
        }
    }

    /// Records must already be unique and sorted
    pub(crate) fn from_sorted(
        asn: u32,
        org: OrganizationCandidate,
        ipv4: Vec<PrefixRecord>,
        ipv6: Vec<PrefixRecord>,
    ) -> Self {
        Self {
            asn,
            org,
            ipv4,
            ipv6,
        }
    }

    pub fn asn(&self) -> u32 {
        self.asn
    }

    pub fn org(&self) -> &OrganizationCandidate {
        &self.org
    }

    pub fn ipv4(&self) -> &[PrefixRecord] {
        &self.ipv4
    }

    pub fn ipv6(&self) -> &[PrefixRecord] {
        &self.ipv6
    }

    pub fn prefixes(&self, family: AddressFamily) -> &[PrefixRecord] {
        match family {
            AddressFamily::IPv4 => &self.ipv4,
            AddressFamily::IPv6 => &self.ipv6,
        }
    }

    /// CIDR strings of one family in output order
    pub fn cidrs(&self, family: AddressFamily) -> Vec<&str> {
        self.prefixes(family).iter().map(|p| p.cidr()).collect()
    }

    pub fn total(&self) -> usize {
        self.ipv4.len() + self.ipv6.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_asn() {
        assert_eq!(parse_asn("13335").unwrap(), 13335);
        assert_eq!(parse_asn("AS13335").unwrap(), 13335);
        assert_eq!(parse_asn(" as400644 ").unwrap(), 400644);
        assert!(parse_asn("ASX").is_err());
        assert!(parse_asn("0").is_err());
        assert!(parse_asn("23456").is_err());
        assert!(parse_asn("-1").is_err());
    }

    #[test]
    fn test_address_family() {
        assert_eq!("ipv4".parse::<AddressFamily>().unwrap(), AddressFamily::IPv4);
        assert_eq!("V6".parse::<AddressFamily>().unwrap(), AddressFamily::IPv6);
        assert!(matches!(
            "ipx".parse::<AddressFamily>(),
            Err(HunterError::InvalidAddressFamily(_))
        ));

        assert!(AddressFamily::IPv4.matches_text("192.0.2.0/24"));
        assert!(!AddressFamily::IPv4.matches_text("2001:db8::/32"));
        assert!(AddressFamily::IPv6.matches_text("2001:db8::/32"));
        assert!(!AddressFamily::IPv6.matches_text("192.0.2.0/24"));
    }

    #[test]
    fn test_prefix_record_validation() {
        let p = PrefixRecord::parse(" 192.0.2.0/24 ").unwrap();
        assert_eq!(p.cidr(), "192.0.2.0/24");
        assert_eq!(p.address_family(), AddressFamily::IPv4);

        let p = PrefixRecord::parse("2001:db8::/32").unwrap();
        assert_eq!(p.address_family(), AddressFamily::IPv6);

        assert!(PrefixRecord::parse("999.0.0.0/24").is_none());
        assert!(PrefixRecord::parse("not-a-prefix").is_none());
        assert!(PrefixRecord::parse("10.0.0.0").is_none());
        assert!(PrefixRecord::parse("10.0.0.0/33").is_none());
    }

    #[test]
    fn test_prefix_record_textual_identity() {
        // numerically equal, textually different: kept apart
        let lower = PrefixRecord::parse("2001:db8::/32").unwrap();
        let upper = PrefixRecord::parse("2001:DB8::/32").unwrap();
        assert_ne!(lower, upper);

        let a = PrefixRecord::parse("10.0.0.0/24").unwrap();
        let b = PrefixRecord::parse("10.0.0.0/24").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_prefix_len() {
        assert_eq!(PrefixRecord::parse("10.0.0.0/8").unwrap().prefix_len(), 8);
        assert_eq!(PrefixRecord::parse("2001:db8::/48").unwrap().prefix_len(), 48);
    }

    #[test]
    fn test_num_addresses() {
        assert_eq!(PrefixRecord::parse("10.0.0.0/24").unwrap().num_addresses(), 256);
        assert_eq!(PrefixRecord::parse("10.0.0.0/8").unwrap().num_addresses(), 1 << 24);
        assert_eq!(PrefixRecord::parse("2001:db8::/64").unwrap().num_addresses(), 1u128 << 64);
        assert_eq!(PrefixRecord::parse("::/0").unwrap().num_addresses(), u128::MAX);
    }

    #[test]
    fn test_registry_from_str() {
        assert_eq!("RIPE NCC".parse::<Registry>().unwrap(), Registry::Ripe);
        assert_eq!("arin".parse::<Registry>().unwrap(), Registry::Arin);
        assert_eq!("AfriNIC".parse::<Registry>().unwrap(), Registry::Afrinic);
        assert!("IANA".parse::<Registry>().is_err());
    }

    #[test]
    fn test_merge_fills_empty_fields() {
        let mut a = OrganizationCandidate::new(1, "Acme").with_source("A");
        a.country = Some(String::new());
        let mut b = OrganizationCandidate::new(1, "").with_source("B");
        b.country = Some("US".to_string());
        b.registry = Some(Registry::Arin);

        a.merge_from(b);
        assert_eq!(a.country.as_deref(), Some("US"));
        assert_eq!(a.name, "Acme");
        assert_eq!(a.registry, Some(Registry::Arin));
        assert_eq!(a.source_tags.len(), 2);
    }

    #[test]
    fn test_merge_first_source_wins() {
        let mut a = OrganizationCandidate::new(7, "First");
        a.description = "from A".to_string();
        a.alternate_names = vec!["Alpha".to_string()];
        a.contact_emails.insert("noc@a.example".to_string());

        let mut b = OrganizationCandidate::new(7, "Second");
        b.description = "from B".to_string();
        b.alternate_names = vec!["Alpha".to_string(), "Beta".to_string()];
        b.contact_emails.insert("abuse@b.example".to_string());

        a.merge_from(b);
        assert_eq!(a.name, "First");
        assert_eq!(a.description, "from A");
        assert_eq!(a.alternate_names, vec!["Alpha", "Beta"]);
        assert_eq!(a.contact_emails.len(), 2);
    }

    #[test]
    fn test_merge_drops_repeated_alternate_names() {
        let mut a = OrganizationCandidate::new(9, "Acme");
        let mut b = OrganizationCandidate::new(9, "Acme");
        b.alternate_names = vec![
            "Acme Labs".to_string(),
            "Acme Labs".to_string(),
            " ".to_string(),
            "Acme Cloud".to_string(),
        ];

        a.merge_from(b);
        assert_eq!(a.alternate_names, vec!["Acme Labs", "Acme Cloud"]);
    }

    #[test]
    fn test_empty_prefix_set() {
        let set = AsnPrefixSet::empty(64500, OrganizationCandidate::from_asn(64500));
        assert!(set.is_empty());
        assert_eq!(set.org().name, "AS64500");
        assert!(set.cidrs(AddressFamily::IPv6).is_empty());
    }
}
