//! Lens module
//!
//! Lenses hold the business logic of the collection pipeline. Each one wraps a
//! set of source clients (or plain data) and exposes a small API that the CLI,
//! the demos and library users share.
//!
//! | Lens | Input | Output |
//! |------|-------|--------|
//! | `ResolveLens` | keyword(s) | ranked `OrganizationCandidate`s |
//! | `AggregateLens` | one ASN | `AsnPrefixSet` + per-source reports |
//! | `CollectLens` | selected candidates | `AsnCollection` + per-ASN states |
//! | `CompareLens` | two snapshots | ASN and prefix differences |
//!
//! `select`, `snapshot` and `stats` are plain helpers over the same types.
//!
//! # Usage
//!
//! ```rust,ignore
//! use asnhunt::lens::resolve::ResolveLens;
//! use asnhunt::lens::select::parse_selection;
//! use asnhunt::lens::collect::CollectLens;
//! use asnhunt::lens::snapshot::Snapshot;
//! ```

pub mod utils;

pub mod aggregate;
pub mod collect;
pub mod compare;
pub mod resolve;
pub mod select;
pub mod snapshot;
pub mod stats;
