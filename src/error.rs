//! Error types for configuration, storage, fetching and scoring.
//!
//! Only [`ConfigError`] is fatal. The others are caught at the listing or
//! checkpoint boundary, logged, and the run carries on.

use std::path::PathBuf;
use thiserror::Error;

/// Missing or invalid settings; aborts the run before any network activity.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found at {path}")]
    NotFound { path: PathBuf },

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("required setting `{0}` is missing")]
    Missing(&'static str),

    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Failure loading or persisting the listing store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to access store at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store at {path} is not valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize store: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Failure fetching or parsing a single search page or listing.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("unexpected response from {url}: {reason}")]
    Parse { url: String, reason: String },

    /// The listing was read but does not qualify (e.g. weekdays only)
    #[error("listing {id} rejected: {reason}")]
    Rejected { id: String, reason: String },
}

impl FetchError {
    pub fn parse(url: impl Into<String>, reason: impl Into<String>) -> Self {
        FetchError::Parse {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

/// A record that cannot be scored with the data it carries.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScoreError {
    #[error("listing {id} has no prices")]
    NoPrices { id: String },
}
