use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub mod aggregate;
pub mod serp;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("search failed: {0}")]
    Search(String),
    #[error("extraction failed: {0}")]
    Extract(String),
    #[error("keyword extraction failed: {0}")]
    Keywords(String),
    #[error("export failed: {0}")]
    Export(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("not supported: {0}")]
    NotSupported(String),
}

impl Error {
    /// Stable machine-readable code, used in JSON output and warnings.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidUrl(_) => "invalid_url",
            Error::Fetch(_) => "fetch_failed",
            Error::Search(_) => "search_failed",
            Error::Extract(_) => "extract_failed",
            Error::Keywords(_) => "keywords_failed",
            Error::Export(_) => "export_failed",
            Error::InvalidInput(_) => "invalid_input",
            Error::NotConfigured(_) => "not_configured",
            Error::NotSupported(_) => "not_supported",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub keyword: String,
    /// Provider location name (for ValueSERP: a location's `full_name`).
    pub location: Option<String>,
    pub max_results: Option<usize>,
    pub timeout_ms: Option<u64>,
}

impl SearchQuery {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// One organic (non-paid) search result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrganicResult {
    pub url: String,
    pub title: Option<String>,
    pub snippet: Option<String>,
    /// 0-based position in the result list.
    pub rank: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<OrganicResult>,
    pub provider: String,
    pub timings_ms: BTreeMap<String, u128>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Location {
    pub name: String,
    /// Canonical name to pass back as `SearchQuery::location`.
    pub full_name: String,
    pub country_code: Option<String>,
    pub kind: Option<String>,
}

#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse>;

    /// Resolve a free-text location query into provider locations.
    async fn locations(&self, _query: &str) -> Result<Vec<Location>> {
        Err(Error::NotSupported(format!(
            "{} does not support location lookup",
            self.name()
        )))
    }
}

/// Plain text pulled out of a fetched page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedText {
    pub url: String,
    pub final_url: String,
    pub text: String,
    pub truncated: bool,
    pub timings_ms: BTreeMap<String, u128>,
}

#[async_trait::async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, url: &str) -> Result<ExtractedText>;
}

/// A `(term, score)` pair surfaced by keyword scoring. Lower `score` is more relevant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordCandidate {
    pub term: String,
    pub score: f64,
}

impl KeywordCandidate {
    pub fn new(term: impl Into<String>, score: f64) -> Self {
        Self {
            term: term.into(),
            score,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordParams {
    /// Language used to pick the predefined stopword list.
    pub language: String,
    /// Custom stopwords; when non-empty they replace the language list.
    pub stopwords: Vec<String>,
    pub max_ngram_size: usize,
    pub dedup_threshold: f64,
    pub top_n: usize,
}

impl Default for KeywordParams {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            stopwords: Vec::new(),
            max_ngram_size: 3,
            dedup_threshold: 0.9,
            top_n: 20,
        }
    }
}

/// Keyword scoring must be deterministic for fixed inputs and return candidates most relevant
/// first (ascending score).
pub trait KeywordScorer: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract_keywords(&self, text: &str, params: &KeywordParams)
        -> Result<Vec<KeywordCandidate>>;
}
