//! Author name -> leadership index
//!
//! One run: check the cache, otherwise resolve the author's PubMed records,
//! keep the first/last-author ones, look up their citation counts on
//! OpenAlex, compute the index and store the result. Everything happens
//! sequentially; a failure anywhere aborts the run and nothing is cached.

use crate::cache::Cache;
use crate::error::{CacheError, PipelineError, RetrievalError};
use crate::index::compute_index;
use crate::papers::author::AuthorMatcher;
use crate::papers::openalex::{normalize_doi, CitationMap, OpenAlexClient};
use crate::papers::pubmed::PubMedClient;
use crate::papers::{http_client, PublicationRecord};
use crate::settings::Settings;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Serve a fresh cached result if there is one
    #[default]
    Use,
    /// Neither read nor write the cache
    Bypass,
    /// Skip the read but store the new result
    ForceRefresh,
}

/// A first/last-author publication with its citation count, if OpenAlex knew it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualifyingPublication {
    #[serde(flatten)]
    pub publication: PublicationRecord,
    pub citations: Option<u64>,
}

/// Everything the report needs; also the unit stored in the cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub author: String,
    pub total_papers: usize,
    pub qualifying_count: usize,
    /// Matched qualifying papers, most cited first (ties keep PubMed order)
    pub qualifying_papers: Vec<QualifyingPublication>,
    pub unmatched_count: usize,
    /// Qualifying papers without citation data, in PubMed order
    pub unmatched_papers: Vec<QualifyingPublication>,
    pub u_index: usize,
    /// Same metric over every resolved paper regardless of position
    pub all_positions_index: usize,
}

/// Cache key for an author: SHA-256 of the trimmed, lower-cased,
/// whitespace-collapsed name
pub fn cache_key(author_name: &str) -> String {
    let normalized = author_name
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("author:{}", hex::encode(hasher.finalize()))
}

pub struct Pipeline {
    pubmed: PubMedClient,
    openalex: OpenAlexClient,
    cache: Option<Cache>,
}

impl Pipeline {
    /// `cache: None` disables caching entirely
    pub fn new(pubmed: PubMedClient, openalex: OpenAlexClient, cache: Option<Cache>) -> Self {
        Self { pubmed, openalex, cache }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, PipelineError> {
        let client = http_client(Duration::from_secs(settings.request_timeout_secs))?;

        let pubmed = PubMedClient::with_client(client.clone(), &settings.pubmed_base_url)
            .with_api_key(settings.ncbi_api_key());
        let openalex = OpenAlexClient::with_client(client, &settings.openalex_base_url)
            .with_mailto(settings.openalex_mailto.clone());

        let cache = if settings.cache_enabled {
            Some(Cache::open_with_ttl(settings.cache_path(), settings.cache_ttl_secs)?)
        } else {
            None
        };

        Ok(Self::new(pubmed, openalex, cache))
    }

    /// Swap the author-identity rule used to place the author on each paper
    pub fn with_matcher(mut self, matcher: Arc<dyn AuthorMatcher>) -> Self {
        self.pubmed = self.pubmed.with_matcher(matcher);
        self
    }

    pub fn cache(&self) -> Option<&Cache> {
        self.cache.as_ref()
    }

    pub async fn run(&self, author_name: &str, mode: CacheMode) -> Result<AggregatedResult, PipelineError> {
        let key = cache_key(author_name);
        let cache = match mode {
            CacheMode::Bypass => None,
            CacheMode::Use | CacheMode::ForceRefresh => self.cache.as_ref(),
        };

        if mode == CacheMode::Use {
            if let Some(cache) = cache {
                if let Some(hit) = cache.get::<AggregatedResult>(&key)? {
                    tracing::info!(author = author_name, "using cached result");
                    return Ok(hit);
                }
            }
        }

        let result = self.compute(author_name).await?;

        if let Some(cache) = cache {
            store(cache, &key, &result)?;
        }
        Ok(result)
    }

    async fn compute(&self, author_name: &str) -> Result<AggregatedResult, RetrievalError> {
        let papers = self.pubmed.fetch_author_papers(author_name).await?;

        // Only first/last-author papers are looked up in OpenAlex
        let dois: Vec<String> = papers
            .iter()
            .filter(|p| p.position.is_leading())
            .filter_map(|p| p.doi.clone())
            .collect();

        let citations = self.openalex.get_citations_by_dois(&dois).await?;
        let result = aggregate(author_name, papers, &citations);

        tracing::info!(
            author = author_name,
            total = result.total_papers,
            qualifying = result.qualifying_count,
            unmatched = result.unmatched_count,
            u_index = result.u_index,
            "computed leadership index"
        );
        Ok(result)
    }
}

fn store(cache: &Cache, key: &str, result: &AggregatedResult) -> Result<(), CacheError> {
    cache.set(key, result)?;
    tracing::debug!(key, "cached result");
    Ok(())
}

fn citations_for(record: &PublicationRecord, citations: &CitationMap) -> Option<u64> {
    let doi = normalize_doi(record.doi.as_deref()?);
    citations.get(&doi).copied()
}

/// Merge resolved records with citation counts and compute both indices
pub fn aggregate(
    author_name: &str,
    papers: Vec<PublicationRecord>,
    citations: &CitationMap,
) -> AggregatedResult {
    let total_papers = papers.len();
    let all_counts: Vec<u64> = papers
        .iter()
        .filter_map(|p| citations_for(p, citations))
        .collect();

    let mut matched = Vec::new();
    let mut unmatched = Vec::new();
    for publication in papers.into_iter().filter(|p| p.position.is_leading()) {
        let count = citations_for(&publication, citations);
        let entry = QualifyingPublication { publication, citations: count };
        if count.is_some() {
            matched.push(entry);
        } else {
            unmatched.push(entry);
        }
    }

    // Stable: equal counts keep PubMed order
    matched.sort_by(|a, b| b.citations.cmp(&a.citations));

    let matched_counts: Vec<u64> = matched.iter().filter_map(|p| p.citations).collect();

    AggregatedResult {
        author: author_name.to_string(),
        total_papers,
        qualifying_count: matched.len() + unmatched.len(),
        u_index: compute_index(&matched_counts),
        all_positions_index: compute_index(&all_counts),
        unmatched_count: unmatched.len(),
        qualifying_papers: matched,
        unmatched_papers: unmatched,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::papers::author::AuthorPosition;
    use crate::test_support::{decoded, http_client, Canned, MockServer};
    use serde_json::json;

    const ESEARCH_MULTI: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<eSearchResult><IdList>
    <Id>1</Id><Id>2</Id><Id>3</Id><Id>4</Id><Id>5</Id>
</IdList></eSearchResult>"#;

    const EFETCH_MULTI: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<PubmedArticleSet>
    <PubmedArticle>
        <MedlineCitation><PMID>1</PMID>
            <Article>
                <ArticleTitle>Paper 1 - First Author</ArticleTitle>
                <AuthorList>
                    <Author><LastName>Target</LastName><ForeName>Author</ForeName></Author>
                    <Author><LastName>Other</LastName><ForeName>One</ForeName></Author>
                </AuthorList>
                <ELocationID EIdType="doi">10.1000/p1</ELocationID>
            </Article>
            <DateCompleted><Year>2023</Year></DateCompleted>
        </MedlineCitation>
    </PubmedArticle>
    <PubmedArticle>
        <MedlineCitation><PMID>2</PMID>
            <Article>
                <ArticleTitle>Paper 2 - Last Author</ArticleTitle>
                <AuthorList>
                    <Author><LastName>Student</LastName><ForeName>One</ForeName></Author>
                    <Author><LastName>Target</LastName><ForeName>Author</ForeName></Author>
                </AuthorList>
                <ELocationID EIdType="doi">10.1000/p2</ELocationID>
            </Article>
            <DateCompleted><Year>2022</Year></DateCompleted>
        </MedlineCitation>
    </PubmedArticle>
    <PubmedArticle>
        <MedlineCitation><PMID>3</PMID>
            <Article>
                <ArticleTitle>Paper 3 - Middle Author</ArticleTitle>
                <AuthorList>
                    <Author><LastName>First</LastName><ForeName>One</ForeName></Author>
                    <Author><LastName>Target</LastName><ForeName>Author</ForeName></Author>
                    <Author><LastName>Last</LastName><ForeName>One</ForeName></Author>
                </AuthorList>
                <ELocationID EIdType="doi">10.1000/p3</ELocationID>
            </Article>
            <DateCompleted><Year>2021</Year></DateCompleted>
        </MedlineCitation>
    </PubmedArticle>
    <PubmedArticle>
        <MedlineCitation><PMID>4</PMID>
            <Article>
                <ArticleTitle>Paper 4 - First Author Low Cites</ArticleTitle>
                <AuthorList>
                    <Author><LastName>Target</LastName><ForeName>Author</ForeName></Author>
                    <Author><LastName>Other</LastName><ForeName>Two</ForeName></Author>
                </AuthorList>
                <ELocationID EIdType="doi">10.1000/p4</ELocationID>
            </Article>
            <DateCompleted><Year>2020</Year></DateCompleted>
        </MedlineCitation>
    </PubmedArticle>
    <PubmedArticle>
        <MedlineCitation><PMID>5</PMID>
            <Article>
                <ArticleTitle>Paper 5 - No DOI</ArticleTitle>
                <AuthorList>
                    <Author><LastName>Target</LastName><ForeName>Author</ForeName></Author>
                </AuthorList>
            </Article>
            <DateCompleted><Year>2019</Year></DateCompleted>
        </MedlineCitation>
    </PubmedArticle>
</PubmedArticleSet>"#;

    fn openalex_multi() -> serde_json::Value {
        json!({
            "results": [
                {"doi": "https://doi.org/10.1000/p1", "cited_by_count": 50},
                {"doi": "https://doi.org/10.1000/p2", "cited_by_count": 30},
                {"doi": "https://doi.org/10.1000/p4", "cited_by_count": 2}
            ]
        })
    }

    struct Fixture {
        pubmed: MockServer,
        openalex: MockServer,
    }

    impl Fixture {
        fn full_run() -> Self {
            Self {
                pubmed: MockServer::start(vec![Canned::xml(ESEARCH_MULTI), Canned::xml(EFETCH_MULTI)]),
                openalex: MockServer::start(vec![Canned::json(openalex_multi())]),
            }
        }

        fn pipeline(&self, cache: Option<Cache>) -> Pipeline {
            let client = http_client(Duration::from_secs(5));
            Pipeline::new(
                PubMedClient::with_client(client.clone(), &self.pubmed.url),
                OpenAlexClient::with_client(client, &self.openalex.url),
                cache,
            )
        }

        fn request_count(&self) -> usize {
            self.pubmed.requests().len() + self.openalex.requests().len()
        }
    }

    fn record(pmid: &str, doi: Option<&str>, position: AuthorPosition) -> PublicationRecord {
        PublicationRecord {
            pmid: pmid.to_string(),
            title: format!("Paper {}", pmid),
            doi: doi.map(str::to_string),
            year: "2020".to_string(),
            position,
        }
    }

    fn citation_map(entries: &[(&str, u64)]) -> CitationMap {
        entries.iter().map(|(d, c)| (d.to_string(), *c)).collect()
    }

    fn pmids(papers: &[QualifyingPublication]) -> Vec<&str> {
        papers.iter().map(|p| p.publication.pmid.as_str()).collect()
    }

    #[tokio::test]
    async fn test_full_run() {
        let fixture = Fixture::full_run();
        let result = fixture.pipeline(None).run("Target Author", CacheMode::Use).await.unwrap();

        assert_eq!(result.author, "Target Author");
        assert_eq!(result.total_papers, 5);
        assert_eq!(result.qualifying_count, 4);
        assert_eq!(result.qualifying_papers.len(), 3);
        assert_eq!(result.unmatched_count, 1);
        assert_eq!(result.u_index, 2);
        // Middle-author paper 3 is never looked up, so it adds nothing
        assert_eq!(result.all_positions_index, 2);

        assert_eq!(pmids(&result.qualifying_papers), vec!["1", "2", "4"]);
        let counts: Vec<_> = result.qualifying_papers.iter().map(|p| p.citations).collect();
        assert_eq!(counts, vec![Some(50), Some(30), Some(2)]);

        assert_eq!(pmids(&result.unmatched_papers), vec!["5"]);
        assert_eq!(result.unmatched_papers[0].publication.position, AuthorPosition::First);
        assert_eq!(result.unmatched_papers[0].citations, None);

        let openalex_requests = fixture.openalex.requests();
        assert_eq!(openalex_requests.len(), 1);
        assert!(decoded(&openalex_requests[0]).contains("filter=doi:10.1000/p1|10.1000/p2|10.1000/p4&"));
    }

    #[tokio::test]
    async fn test_middle_author_dois_are_not_looked_up() {
        // 50 first-author papers fill exactly one batch; a middle-author
        // paper must not spill into a second request
        let mut ids = String::new();
        let mut articles = String::new();
        let mut works = Vec::new();
        for n in 1..=51 {
            let authors = if n == 51 {
                "<Author><LastName>Lead</LastName><ForeName>Someone</ForeName></Author>\
                 <Author><LastName>Target</LastName><ForeName>Author</ForeName></Author>\
                 <Author><LastName>Senior</LastName><ForeName>Someone</ForeName></Author>"
            } else {
                "<Author><LastName>Target</LastName><ForeName>Author</ForeName></Author>\
                 <Author><LastName>Other</LastName><ForeName>One</ForeName></Author>"
            };
            ids.push_str(&format!("<Id>{}</Id>", n));
            articles.push_str(&format!(
                "<PubmedArticle><MedlineCitation><PMID>{n}</PMID><Article>\
                 <ArticleTitle>Paper {n}</ArticleTitle><AuthorList>{authors}</AuthorList>\
                 <ELocationID EIdType=\"doi\">10.1000/p{n}</ELocationID></Article>\
                 <DateCompleted><Year>2020</Year></DateCompleted></MedlineCitation></PubmedArticle>"
            ));
            if n <= 50 {
                works.push(json!({"doi": format!("https://doi.org/10.1000/p{}", n), "cited_by_count": 60}));
            }
        }

        let fixture = Fixture {
            pubmed: MockServer::start(vec![
                Canned::xml(&format!("<eSearchResult><IdList>{}</IdList></eSearchResult>", ids)),
                Canned::xml(&format!("<PubmedArticleSet>{}</PubmedArticleSet>", articles)),
            ]),
            // A second batch would be throttled
            openalex: MockServer::start(vec![
                Canned::json(json!({ "results": works })),
                Canned::status(429, "Too Many Requests"),
            ]),
        };

        let result = fixture.pipeline(None).run("Target Author", CacheMode::Use).await.unwrap();

        assert_eq!(fixture.openalex.requests().len(), 1);
        assert!(!decoded(&fixture.openalex.requests()[0]).contains("10.1000/p51"));
        assert_eq!(result.total_papers, 51);
        assert_eq!(result.qualifying_count, 50);
        assert_eq!(result.u_index, 50);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = Fixture::full_run();
        let pipeline = fixture.pipeline(Some(Cache::open(dir.path().join("cache.db")).unwrap()));

        let first = pipeline.run("Target Author", CacheMode::Use).await.unwrap();
        assert_eq!(fixture.request_count(), 3);

        // Mock servers are exhausted: any request now would fail
        let second = pipeline.run("  target   AUTHOR ", CacheMode::Use).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(fixture.request_count(), 3);
    }

    #[tokio::test]
    async fn test_cached_result_survives_new_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        let fixture = Fixture::full_run();
        let first = fixture
            .pipeline(Some(Cache::open(&path).unwrap()))
            .run("Target Author", CacheMode::Use)
            .await
            .unwrap();

        let idle = Fixture {
            pubmed: MockServer::start(vec![]),
            openalex: MockServer::start(vec![]),
        };
        let second = idle
            .pipeline(Some(Cache::open(&path).unwrap()))
            .run("Target Author", CacheMode::Use)
            .await
            .unwrap();

        assert_eq!(second, first);
        assert_eq!(idle.request_count(), 0);
    }

    #[tokio::test]
    async fn test_bypass_neither_reads_nor_writes() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(dir.path().join("cache.db")).unwrap();
        cache.set(&cache_key("Target Author"), &json!("stale garbage")).unwrap();

        let fixture = Fixture::full_run();
        let pipeline = fixture.pipeline(Some(cache));
        let result = pipeline.run("Target Author", CacheMode::Bypass).await.unwrap();

        assert_eq!(result.u_index, 2);
        let stored: Option<serde_json::Value> =
            pipeline.cache().unwrap().get(&cache_key("Target Author")).unwrap();
        assert_eq!(stored, Some(json!("stale garbage")));
    }

    #[tokio::test]
    async fn test_force_refresh_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(dir.path().join("cache.db")).unwrap();
        let old = aggregate("Target Author", vec![], &CitationMap::new());
        cache.set(&cache_key("Target Author"), &old).unwrap();

        let fixture = Fixture::full_run();
        let pipeline = fixture.pipeline(Some(cache));
        let result = pipeline.run("Target Author", CacheMode::ForceRefresh).await.unwrap();

        assert_eq!(fixture.request_count(), 3);
        assert_eq!(result.u_index, 2);
        let stored: Option<AggregatedResult> =
            pipeline.cache().unwrap().get(&cache_key("Target Author")).unwrap();
        assert_eq!(stored, Some(result));
    }

    #[tokio::test]
    async fn test_failure_caches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = Fixture {
            pubmed: MockServer::start(vec![Canned::xml(ESEARCH_MULTI), Canned::xml(EFETCH_MULTI)]),
            openalex: MockServer::start(vec![Canned::status(502, "bad gateway")]),
        };
        let pipeline = fixture.pipeline(Some(Cache::open(dir.path().join("cache.db")).unwrap()));

        let err = pipeline.run("Target Author", CacheMode::Use).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Retrieval(RetrievalError::Status { status: 502, .. })
        ));
        assert!(pipeline.cache().unwrap().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_unreadable_cache_entry_is_an_error_not_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(dir.path().join("cache.db")).unwrap();
        cache.set(&cache_key("Target Author"), &json!({"not": "a result"})).unwrap();

        let idle = Fixture {
            pubmed: MockServer::start(vec![]),
            openalex: MockServer::start(vec![]),
        };
        let err = idle
            .pipeline(Some(cache))
            .run("Target Author", CacheMode::Use)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Cache(CacheError::Decode { .. })));
        assert_eq!(idle.request_count(), 0);
    }

    #[tokio::test]
    async fn test_author_with_no_records() {
        let fixture = Fixture {
            pubmed: MockServer::start(vec![Canned::xml("<eSearchResult><IdList/></eSearchResult>")]),
            openalex: MockServer::start(vec![]),
        };

        let result = fixture.pipeline(None).run("Nobody", CacheMode::Use).await.unwrap();

        assert_eq!(result.total_papers, 0);
        assert_eq!(result.u_index, 0);
        assert!(fixture.openalex.requests().is_empty());
    }

    #[test]
    fn test_aggregate_scenario() {
        let papers = vec![
            record("1", Some("10.1000/p1"), AuthorPosition::First),
            record("2", Some("10.1000/p2"), AuthorPosition::Last),
            record("3", Some("10.1000/p3"), AuthorPosition::Middle),
            record("4", Some("10.1000/p4"), AuthorPosition::First),
            record("5", None, AuthorPosition::First),
        ];
        let citations = citation_map(&[
            ("10.1000/p1", 50),
            ("10.1000/p2", 30),
            ("10.1000/p3", 100),
            ("10.1000/p4", 2),
        ]);

        let result = aggregate("Target Author", papers, &citations);

        assert_eq!(result.qualifying_count, 4);
        assert_eq!(result.qualifying_papers.len(), 3);
        assert_eq!(result.unmatched_count, 1);
        assert_eq!(result.u_index, 2);
    }

    #[test]
    fn test_zero_count_is_matched_not_unmatched() {
        let papers = vec![
            record("1", Some("10.1/a"), AuthorPosition::First),
            record("2", Some("10.1/b"), AuthorPosition::Last),
        ];
        let result = aggregate("x", papers, &citation_map(&[("10.1/a", 0)]));

        assert_eq!(pmids(&result.qualifying_papers), vec!["1"]);
        assert_eq!(result.qualifying_papers[0].citations, Some(0));
        assert_eq!(pmids(&result.unmatched_papers), vec!["2"]);
        assert_eq!(result.u_index, 0);
    }

    #[test]
    fn test_ties_keep_registry_order() {
        let papers = vec![
            record("a", Some("10.1/a"), AuthorPosition::First),
            record("b", Some("10.1/b"), AuthorPosition::Last),
            record("c", Some("10.1/c"), AuthorPosition::First),
            record("d", Some("10.1/d"), AuthorPosition::Last),
        ];
        let citations = citation_map(&[("10.1/a", 5), ("10.1/b", 9), ("10.1/c", 5), ("10.1/d", 5)]);

        let result = aggregate("x", papers, &citations);

        assert_eq!(pmids(&result.qualifying_papers), vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn test_doi_case_does_not_block_matching() {
        let papers = vec![record("1", Some("10.1000/ABC.Def"), AuthorPosition::First)];
        let result = aggregate("x", papers, &citation_map(&[("10.1000/abc.def", 4)]));

        assert_eq!(result.unmatched_count, 0);
        assert_eq!(result.qualifying_papers[0].citations, Some(4));
        // The record keeps the DOI as PubMed spelled it
        assert_eq!(result.qualifying_papers[0].publication.doi.as_deref(), Some("10.1000/ABC.Def"));
    }

    #[test]
    fn test_result_json_round_trip() {
        let papers = vec![
            record("1", Some("10.1/a"), AuthorPosition::First),
            record("2", None, AuthorPosition::Last),
            record("3", Some("10.1/c"), AuthorPosition::Absent),
        ];
        let result = aggregate("Round Trip", papers, &citation_map(&[("10.1/a", 3), ("10.1/c", 8)]));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["qualifying_papers"][0]["position"], "first");
        assert_eq!(json["qualifying_papers"][0]["citations"], 3);
        assert_eq!(json["unmatched_papers"][0]["doi"], serde_json::Value::Null);

        let back: AggregatedResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_cache_key() {
        assert_eq!(cache_key("Smith John"), cache_key("  smith   JOHN "));
        assert_ne!(cache_key("Smith John"), cache_key("Smith Jon"));
        assert!(cache_key("Smith John").starts_with("author:"));
        assert_eq!(cache_key("x").len(), "author:".len() + 64);
    }
}
