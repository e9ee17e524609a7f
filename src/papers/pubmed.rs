//! PubMed E-utilities client
//!
//! Two requests per author: `esearch` for the PMIDs (capped at 1000, extra
//! hits are silently dropped) and one `efetch` for all the records.
//! No API key required; with one NCBI allows a higher request rate.
//! API docs: https://www.ncbi.nlm.nih.gov/books/NBK25499/

use super::author::{author_position, AuthorMatcher, AuthorName, TokenSubstringMatcher};
use super::{get_text, http_client, PublicationRecord};
use crate::error::RetrievalError;
use reqwest::Client;
use roxmltree::{Document, Node, ParsingOptions};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// Upper bound on PMIDs requested from esearch
pub const SEARCH_LIMIT: usize = 1000;

const SERVICE: &str = "PubMed";

pub struct PubMedClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    matcher: Arc<dyn AuthorMatcher>,
}

impl PubMedClient {
    pub fn new(timeout: Duration) -> Result<Self, RetrievalError> {
        Ok(Self::with_client(http_client(timeout)?, DEFAULT_BASE_URL))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            matcher: Arc::new(TokenSubstringMatcher),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    /// Replace the default name-token author matching
    pub fn with_matcher(mut self, matcher: Arc<dyn AuthorMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    /// Fetch all papers for an author and determine their position on each
    pub async fn fetch_author_papers(
        &self,
        author_name: &str,
    ) -> Result<Vec<PublicationRecord>, RetrievalError> {
        let pmids = self.search_author(author_name).await?;
        if pmids.is_empty() {
            tracing::info!(author = author_name, "no PubMed records found");
            return Ok(Vec::new());
        }

        let papers = self.fetch_papers(&pmids, author_name).await?;
        tracing::info!(
            author = author_name,
            pmids = pmids.len(),
            records = papers.len(),
            "resolved PubMed records"
        );
        Ok(papers)
    }

    async fn search_author(&self, author_name: &str) -> Result<Vec<String>, RetrievalError> {
        let term = urlencoding::encode(&format!("{}[Author]", author_name)).into_owned();
        let url = format!(
            "{}/esearch.fcgi?db=pubmed&term={}&retmax={}&retmode=xml{}",
            self.base_url,
            term,
            SEARCH_LIMIT,
            self.key_param()
        );

        let body = get_text(&self.client, SERVICE, &url).await?;
        parse_search_ids(&body)
    }

    async fn fetch_papers(
        &self,
        pmids: &[String],
        author_name: &str,
    ) -> Result<Vec<PublicationRecord>, RetrievalError> {
        let url = format!(
            "{}/efetch.fcgi?db=pubmed&id={}&retmode=xml{}",
            self.base_url,
            pmids.join(","),
            self.key_param()
        );

        let body = get_text(&self.client, SERVICE, &url).await?;
        parse_articles(&body, author_name, self.matcher.as_ref())
    }

    fn key_param(&self) -> String {
        match &self.api_key {
            Some(key) => format!("&api_key={}", urlencoding::encode(key)),
            None => String::new(),
        }
    }
}

fn parse_document(xml: &str) -> Result<Document<'_>, RetrievalError> {
    // efetch output carries a DOCTYPE line
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Document::parse_with_options(xml, options).map_err(|e| RetrievalError::Malformed {
        service: SERVICE,
        detail: e.to_string(),
    })
}

/// PMIDs from an esearch response, in result order
pub fn parse_search_ids(xml: &str) -> Result<Vec<String>, RetrievalError> {
    let doc = parse_document(xml)?;
    Ok(doc
        .descendants()
        .filter(|n| n.has_tag_name("Id"))
        .map(text_content)
        .filter(|id| !id.is_empty())
        .collect())
}

/// Records from an efetch response, one per `PubmedArticle`
pub fn parse_articles(
    xml: &str,
    author_name: &str,
    matcher: &dyn AuthorMatcher,
) -> Result<Vec<PublicationRecord>, RetrievalError> {
    let doc = parse_document(xml)?;
    Ok(doc
        .descendants()
        .filter(|n| n.has_tag_name("PubmedArticle"))
        .map(|article| parse_article(article, author_name, matcher))
        .collect())
}

/// Parse one article. Missing pieces fall back to empty values rather than
/// failing the batch.
fn parse_article(article: Node, author_name: &str, matcher: &dyn AuthorMatcher) -> PublicationRecord {
    let citation = child(article, "MedlineCitation");
    let article_elem = citation.and_then(|c| child(c, "Article"));

    let pmid = citation
        .and_then(|c| child(c, "PMID"))
        .map(text_content)
        .unwrap_or_default();
    if pmid.is_empty() {
        tracing::warn!("PubMed record without PMID");
    }

    let title = article_elem
        .and_then(|a| child(a, "ArticleTitle"))
        .map(text_content)
        .unwrap_or_default();

    let year = citation
        .and_then(|c| child(c, "DateCompleted"))
        .and_then(|d| child(d, "Year"))
        .map(text_content)
        .filter(|y| is_year(y))
        .or_else(|| {
            citation
                .and_then(|c| c.descendants().find(|n| n.has_tag_name("PubDate")))
                .and_then(|d| child(d, "Year"))
                .map(text_content)
                .filter(|y| is_year(y))
        })
        .unwrap_or_default();

    let authors = article_elem.map(extract_authors).unwrap_or_default();
    if authors.is_empty() {
        tracing::warn!(pmid = %pmid, "PubMed record without author list");
    }

    PublicationRecord {
        doi: extract_doi(article, article_elem),
        position: author_position(matcher, author_name, &authors),
        pmid,
        title,
        year,
    }
}

/// First DOI-typed `ELocationID`, falling back to the `ArticleIdList`
fn extract_doi(article: Node, article_elem: Option<Node>) -> Option<String> {
    let from_elocation = article_elem.and_then(|a| {
        a.children()
            .filter(|n| n.has_tag_name("ELocationID"))
            .filter(|n| n.attribute("EIdType") == Some("doi"))
            .map(text_content)
            .find(|doi| !doi.is_empty())
    });

    from_elocation.or_else(|| {
        article
            .descendants()
            .filter(|n| n.has_tag_name("ArticleId"))
            .filter(|n| n.attribute("IdType") == Some("doi"))
            .map(text_content)
            .find(|doi| !doi.is_empty())
    })
}

fn extract_authors(article_elem: Node) -> Vec<AuthorName> {
    let Some(list) = child(article_elem, "AuthorList") else {
        return Vec::new();
    };

    list.children()
        .filter(|n| n.has_tag_name("Author"))
        .map(|author| AuthorName {
            family: child(author, "LastName").map(text_content).unwrap_or_default(),
            given: child(author, "ForeName").map(text_content).unwrap_or_default(),
        })
        .collect()
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(name))
}

/// All text under `node`, inline markup such as `<i>` flattened
fn text_content(node: Node) -> String {
    let text: String = node
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();
    text.trim().to_string()
}

fn is_year(s: &str) -> bool {
    s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit())
}
