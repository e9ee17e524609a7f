//! OpenAlex citation counts by DOI
//!
//! DOIs are looked up 50 at a time with an OR filter. OpenAlex answers with
//! URL-form DOIs (`https://doi.org/10...`); keys in the returned map are bare,
//! lower-cased DOIs. A DOI OpenAlex doesn't know is simply missing from the
//! map, which is different from a known work with zero citations.
//! API docs: https://docs.openalex.org/api-entities/works/filter-works

use super::{get_text, http_client};
use crate::error::RetrievalError;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openalex.org";

/// DOIs per request (OpenAlex caps OR filters at 50 values)
pub const BATCH_SIZE: usize = 50;

const SERVICE: &str = "OpenAlex";

/// Normalized DOI -> citation count
pub type CitationMap = HashMap<String, u64>;

#[derive(Debug, Deserialize)]
struct WorksResponse {
    #[serde(default)]
    results: Vec<RawWork>,
}

#[derive(Debug, Deserialize)]
struct RawWork {
    doi: Option<String>,
    cited_by_count: Option<u64>,
}

pub struct OpenAlexClient {
    client: Client,
    base_url: String,
    mailto: Option<String>,
}

impl OpenAlexClient {
    pub fn new(timeout: Duration) -> Result<Self, RetrievalError> {
        Ok(Self::with_client(http_client(timeout)?, DEFAULT_BASE_URL))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            mailto: None,
        }
    }

    /// Contact address for OpenAlex's polite pool
    pub fn with_mailto(mut self, mailto: Option<String>) -> Self {
        self.mailto = mailto.filter(|m| !m.is_empty());
        self
    }

    /// Citation counts for `dois`, one request per batch of 50.
    ///
    /// Empty input issues no request.
    pub async fn get_citations_by_dois(&self, dois: &[String]) -> Result<CitationMap, RetrievalError> {
        let normalized: Vec<String> = dois
            .iter()
            .map(|d| normalize_doi(d))
            .filter(|d| !d.is_empty())
            .collect();

        let mut citations = CitationMap::new();
        for (i, batch) in normalized.chunks(BATCH_SIZE).enumerate() {
            tracing::debug!(batch = i + 1, size = batch.len(), "OpenAlex batch");
            citations.extend(self.fetch_batch(batch).await?);
        }

        tracing::info!(
            requested = normalized.len(),
            found = citations.len(),
            "matched citation counts"
        );
        Ok(citations)
    }

    async fn fetch_batch(&self, dois: &[String]) -> Result<CitationMap, RetrievalError> {
        // Filter format: doi:10.1000/x|10.1000/y
        let filter = format!("doi:{}", dois.join("|"));
        let mut url = format!(
            "{}/works?filter={}&select=doi,cited_by_count&per-page={}",
            self.base_url,
            urlencoding::encode(&filter),
            BATCH_SIZE
        );
        if let Some(mailto) = &self.mailto {
            url.push_str(&format!("&mailto={}", urlencoding::encode(mailto)));
        }

        let body = get_text(&self.client, SERVICE, &url).await?;
        parse_works(&body)
    }
}

fn parse_works(body: &str) -> Result<CitationMap, RetrievalError> {
    let response: WorksResponse =
        serde_json::from_str(body).map_err(|e| RetrievalError::Malformed {
            service: SERVICE,
            detail: e.to_string(),
        })?;

    Ok(response
        .results
        .into_iter()
        .filter_map(|work| {
            let doi = normalize_doi(&work.doi?);
            if doi.is_empty() {
                return None;
            }
            Some((doi, work.cited_by_count.unwrap_or(0)))
        })
        .collect())
}

/// Bare, lower-cased DOI.
///
/// Handles `https://doi.org/10.1/x`, `http://dx.doi.org/10.1/x`, `doi:10.1/x`
/// and plain `10.1/x`.
pub fn normalize_doi(doi: &str) -> String {
    let doi = doi.trim();
    let bare = match doi.split_once("://") {
        Some((_scheme, rest)) => rest.split_once('/').map(|(_host, path)| path).unwrap_or(""),
        None => doi,
    };
    let bare = match bare.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("doi:") => &bare[4..],
        _ => bare,
    };
    bare.trim().to_lowercase()
}
