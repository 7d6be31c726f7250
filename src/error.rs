//! Error types for the resolution pipeline and its collaborators.

use std::path::PathBuf;

use thiserror::Error;

/// A single catalog search that did not produce a result list.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("catalog rejected credentials: {0}")]
    Auth(String),

    #[error("catalog returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("episode source request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("episode source returned status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("malformed episode payload for {url}: {reason}")]
    Malformed { url: String, reason: String },
}

#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error("playlist request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no user token available for playlist operations")]
    MissingUserToken,

    #[error("playlist service returned status {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("thresholds must satisfy 0 <= low <= high (got low={low}, high={high})")]
    InvalidThresholds { low: f64, high: f64 },

    #[error("{name} must be at least {min} (got {value})")]
    TooSmall { name: &'static str, min: f64, value: f64 },

    #[error("show alias must not be empty")]
    EmptyShowAlias,
}

/// Errors surfaced to callers of the sync operations.
///
/// Failures local to one track are absorbed into that track's resolution and
/// never appear here.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("catalog unreachable after {failures} consecutive search failures; {unresolved} tracks left unresolved")]
    CatalogUnavailable { failures: usize, unresolved: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_unavailable_message_carries_counts() {
        let err = SyncError::CatalogUnavailable { failures: 10, unresolved: 42 };
        let msg = err.to_string();
        assert!(msg.contains("10 consecutive"));
        assert!(msg.contains("42 tracks"));
    }
}
