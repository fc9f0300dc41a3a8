//! Error types for schema loading and remote option fetching.

use std::path::PathBuf;
use thiserror::Error;

/// Errors while loading schemas, models or option files.
#[derive(Debug, Error)]
pub enum LoadError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. } | LoadError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            LoadError::NetworkError { .. } => 3,
            LoadError::InvalidJson { .. } => 2,
        }
    }
}

/// Errors surfaced by the remote option-list fetch.
///
/// These never escape a [`Field`](crate::Field); they are reported as
/// `error` events carrying the display text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("No http lib found to perform ajax request")]
    NoHttpClient,

    #[error("Result of http fetch {url} is not an array")]
    NotAnArray { url: String },

    #[error("http fetch {url} failed with status {status}")]
    Status { url: String, status: u16 },

    #[error("http fetch {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("http fetch {url} returned an invalid body: {message}")]
    InvalidBody { url: String, message: String },
}
