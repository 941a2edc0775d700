//! Error types
//!
//! Source clients never let a [`SourceError`] escape: it is folded into a
//! `SourceResult`/`SearchResult` as an [`ErrorKind`]. [`HunterError`] is reserved
//! for invalid input handed to the library by its caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single round trip to a data source
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// DNS failure, connection refused, reset, TLS failure
    #[error("connection failed: {0}")]
    Connectivity(String),

    #[error("request timed out")]
    Timeout,

    /// Any non-2xx status other than 403 and 429
    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),

    #[error("access forbidden (HTTP 403)")]
    Forbidden,

    #[error("rate limited (HTTP 429)")]
    RateLimited,

    /// Malformed JSON, HTML or WHOIS text, or a broken extraction pattern
    #[error("malformed response: {0}")]
    Parse(String),

    /// The request was not issued because collection was interrupted
    #[error("cancelled")]
    Cancelled,
}

impl SourceError {
    /// Classify a non-2xx HTTP status code
    pub fn from_status(code: u16) -> Self {
        match code {
            403 => SourceError::Forbidden,
            429 => SourceError::RateLimited,
            other => SourceError::HttpStatus(other),
        }
    }

    /// Discriminant carried by source results
    pub fn kind(&self) -> ErrorKind {
        match self {
            SourceError::Connectivity(_) => ErrorKind::Connectivity,
            SourceError::Timeout => ErrorKind::Timeout,
            SourceError::HttpStatus(code) => ErrorKind::HttpStatus(*code),
            SourceError::Forbidden => ErrorKind::Forbidden,
            SourceError::RateLimited => ErrorKind::RateLimited,
            SourceError::Parse(_) => ErrorKind::Parse,
            SourceError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<std::io::Error> for SourceError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => SourceError::Timeout,
            _ => SourceError::Connectivity(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        SourceError::Parse(e.to_string())
    }
}

/// Copyable error discriminant stored in source results and reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connectivity,
    Timeout,
    HttpStatus(u16),
    Forbidden,
    RateLimited,
    Parse,
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Connectivity => write!(f, "connectivity"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::HttpStatus(code) => write!(f, "http {}", code),
            ErrorKind::Forbidden => write!(f, "forbidden"),
            ErrorKind::RateLimited => write!(f, "rate-limited"),
            ErrorKind::Parse => write!(f, "parse"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Invalid input handed to the library
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HunterError {
    #[error("invalid ASN: {0}")]
    InvalidAsn(String),

    #[error("invalid address family '{0}', expected ipv4 or ipv6")]
    InvalidAddressFamily(String),

    #[error("search keyword must not be empty")]
    EmptyKeyword,

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}
