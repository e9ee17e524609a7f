//! Publication and citation sources
//!
//! Two services feed the pipeline:
//! 1. PubMed E-utilities: which papers an author has, and where they sit in
//!    each author list
//! 2. OpenAlex: citation counts, looked up by DOI in batches of 50

pub mod author;
pub mod openalex;
pub mod pubmed;

use crate::error::RetrievalError;
use author::AuthorPosition;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default per-request timeout for both services
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const USER_AGENT: &str = concat!("uindex/", env!("CARGO_PKG_VERSION"));

/// One PubMed record as seen from the target author's point of view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationRecord {
    pub pmid: String,
    pub title: String,
    pub doi: Option<String>,
    /// Four-digit year, or empty when the record has none
    pub year: String,
    pub position: AuthorPosition,
}

/// HTTP client shared by the service clients
pub fn http_client(timeout: Duration) -> Result<Client, RetrievalError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| RetrievalError::transport("HTTP client", e))
}

/// GET `url` and return the body. Non-2xx statuses are errors.
pub(crate) async fn get_text(
    client: &Client,
    service: &'static str,
    url: &str,
) -> Result<String, RetrievalError> {
    tracing::debug!(service, url, "GET");

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| RetrievalError::transport(service, e))?;

    if !response.status().is_success() {
        return Err(RetrievalError::Status {
            service,
            status: response.status().as_u16(),
            url: url.to_string(),
        });
    }

    response
        .text()
        .await
        .map_err(|e| RetrievalError::transport(service, e))
}
