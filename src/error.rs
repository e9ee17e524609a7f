//! Error types for the acquisition pipeline
//!
//! Retrieval problems abort a run. Cache problems abort a run too: a broken
//! store must never look like a cache miss.

use std::path::PathBuf;
use thiserror::Error;

/// Failure talking to PubMed or OpenAlex
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} returned status {status} for {url}")]
    Status {
        service: &'static str,
        status: u16,
        url: String,
    },

    #[error("{service} returned a malformed response: {detail}")]
    Malformed {
        service: &'static str,
        detail: String,
    },
}

impl RetrievalError {
    pub(crate) fn transport(service: &'static str, source: reqwest::Error) -> Self {
        RetrievalError::Transport { service, source }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RetrievalError::Transport { source, .. } if source.is_timeout())
    }
}

/// Failure in the SQLite-backed cache store
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to open cache at {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to create cache directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache read failed for '{key}': {source}")]
    Read {
        key: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("cache write failed for '{key}': {source}")]
    Write {
        key: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("cached value for '{key}' could not be decoded: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("value for '{key}' could not be encoded: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Anything that can abort a pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}
