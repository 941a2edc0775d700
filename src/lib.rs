#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! asnhunt - ASN discovery and multi-source prefix collection
//!
//! asnhunt finds the Autonomous Systems that belong to an organization and
//! collects every IPv4/IPv6 prefix they announce, pooling public registries
//! (PeeringDB, BGPView, RIPEstat, WHOIS route objects) and the bgp.he.net
//! looking glass. It can be used as both a command-line application and a
//! library.
//!
//! # Feature Flags
//!
//! | Feature | Description | Key Dependencies |
//! |---------|-------------|------------------|
//! | (none) | Source clients and lenses | `ureq`, `scraper`, `rayon` |
//! | `display` | Table rows with `tabled` | `tabled` |
//! | `cli` | The `asnhunt` binary | All above + `clap`, `indicatif` |
//!
//! # Architecture
//!
//! - **[`sources`]**: one client per upstream, all failures folded into
//!   [`sources::SourceResult`] / [`sources::SearchResult`]
//! - **[`lens`]**: the pipeline
//!   - `resolve`: keyword → ranked [`OrganizationCandidate`] list
//!   - `select`: selection strings over that list
//!   - `aggregate`: one ASN → one [`AsnPrefixSet`] from every prefix source
//!   - `collect`: many ASNs through a bounded worker pool
//!   - `snapshot`, `compare`, `stats`: serialization and diffing of a collection
//! - **[`config`]**: configuration management
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use asnhunt::lens::collect::CollectLens;
//! use asnhunt::lens::resolve::ResolveLens;
//! use asnhunt::sources::{CancelToken, HttpSession};
//! use asnhunt::HunterConfig;
//! use std::sync::Arc;
//!
//! let config = HunterConfig::default();
//! let session = Arc::new(HttpSession::new(&config));
//! let cancel = CancelToken::new();
//!
//! let candidates = ResolveLens::from_config(&config, session.clone(), cancel.clone())
//!     .resolve("cloudflare")?;
//!
//! let collection = CollectLens::from_config(&config, session, cancel)
//!     .collect(&candidates[..2], true);
//!
//! for set in collection.iter() {
//!     println!("AS{}: {} IPv4, {} IPv6", set.asn(), set.ipv4().len(), set.ipv6().len());
//! }
//! ```

pub mod config;
pub mod error;
pub mod lens;
pub mod models;
pub mod sources;

// =============================================================================
// Configuration and errors
// =============================================================================

pub use config::HunterConfig;
pub use error::{ErrorKind, HunterError, SourceError};

// =============================================================================
// Data model
// =============================================================================

pub use models::{
    parse_asn, validate_asn, AddressFamily, AsnPrefixSet, OrganizationCandidate, PrefixCountHint,
    PrefixRecord, Registry,
};

// =============================================================================
// Lenses
// =============================================================================

pub use lens::aggregate::AggregateLens;
pub use lens::collect::{AsnCollection, CollectLens};
pub use lens::compare::CompareLens;
pub use lens::resolve::ResolveLens;
pub use lens::snapshot::Snapshot;
pub use lens::utils::OutputFormat;
