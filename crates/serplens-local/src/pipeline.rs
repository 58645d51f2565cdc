//! search -> extract -> score -> aggregate, for one keyword.

use futures_util::stream::{self, StreamExt};
use serplens_core::aggregate::{
    aggregate, AnalysisRun, DocumentSummary, RankedDocument, ScoredDocument, COMPETITOR_SLOTS,
    USER_SLOT,
};
use serplens_core::serp::user_rank;
use serplens_core::{
    Error, KeywordParams, KeywordScorer, Result, SearchProvider, SearchQuery, TextExtractor,
};

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub keyword: String,
    pub location: Option<String>,
    pub user_url: Option<String>,
    /// Results requested from the search provider (the user's rank is looked up among these).
    pub search_results: Option<usize>,
    /// Competitor documents to analyze (capped at 10).
    pub competitors: usize,
    pub keyword_params: KeywordParams,
    /// Max documents extracted/scored at once.
    pub concurrency: usize,
    pub search_timeout_ms: Option<u64>,
}

impl AnalysisRequest {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            location: None,
            user_url: None,
            search_results: None,
            competitors: COMPETITOR_SLOTS,
            keyword_params: KeywordParams::default(),
            concurrency: 4,
            search_timeout_ms: None,
        }
    }
}

struct Target {
    url: String,
    rank: Option<usize>,
}

async fn score_document(
    extractor: &dyn TextExtractor,
    scorer: &dyn KeywordScorer,
    params: &KeywordParams,
    target: Target,
) -> (ScoredDocument, DocumentSummary) {
    let slot = target.rank.unwrap_or(USER_SLOT);
    let mut warning: Option<String> = None;
    let mut error: Option<String> = None;

    let text = match extractor.extract(&target.url).await {
        Ok(ex) => {
            if ex.text.trim().is_empty() {
                warning = Some("empty_extraction".to_string());
            }
            ex.text
        }
        Err(e) => {
            tracing::warn!(url = %target.url, error = %e, "extraction failed; document contributes nothing");
            warning = Some(e.code().to_string());
            error = Some(e.to_string());
            String::new()
        }
    };

    let candidates = match scorer.extract_keywords(&text, params) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(url = %target.url, error = %e, "keyword scoring failed");
            warning = Some(e.code().to_string());
            error = Some(e.to_string());
            Vec::new()
        }
    };

    let summary = DocumentSummary {
        url: target.url.clone(),
        rank: target.rank,
        slot,
        text_chars: text.chars().count(),
        candidate_count: candidates.len(),
        warning,
        error,
    };
    let doc = RankedDocument {
        url: target.url,
        rank: target.rank,
        text,
    };
    (ScoredDocument::new(doc, candidates), summary)
}

/// Run one analysis.
///
/// A search failure aborts the run. Per-document extraction/scoring failures do not: the document
/// contributes nothing and its summary carries the warning.
pub async fn analyze(
    search: &dyn SearchProvider,
    extractor: &dyn TextExtractor,
    scorer: &dyn KeywordScorer,
    req: &AnalysisRequest,
) -> Result<AnalysisRun> {
    let keyword = req.keyword.trim();
    if keyword.is_empty() {
        return Err(Error::InvalidInput("keyword must not be empty".to_string()));
    }
    let user_url = req
        .user_url
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let q = SearchQuery {
        keyword: keyword.to_string(),
        location: req.location.clone(),
        max_results: req.search_results,
        timeout_ms: req.search_timeout_ms,
    };
    let resp = search.search(&q).await?;
    tracing::info!(
        provider = %resp.provider,
        results = resp.results.len(),
        keyword,
        "search done"
    );

    if resp.results.is_empty() {
        return Ok(AnalysisRun {
            keyword: keyword.to_string(),
            location: req.location.clone(),
            user_url: user_url.map(str::to_string),
            user_serp_position: None,
            documents: Vec::new(),
            rows: Vec::new(),
            warnings: vec!["no_results".to_string()],
        });
    }
    let user_serp_position = user_url.and_then(|u| user_rank(&resp.results, u).position());

    let n = req.competitors.min(COMPETITOR_SLOTS);
    let mut targets: Vec<Target> = resp
        .results
        .iter()
        .take(n)
        .enumerate()
        .map(|(rank, r)| Target {
            url: r.url.clone(),
            rank: Some(rank),
        })
        .collect();
    if let Some(u) = user_url {
        targets.push(Target {
            url: u.to_string(),
            rank: None,
        });
    }

    // `buffered` preserves input order, so the fold below stays canonical.
    let params = &req.keyword_params;
    let scored: Vec<(ScoredDocument, DocumentSummary)> = stream::iter(targets)
        .map(|t| score_document(extractor, scorer, params, t))
        .buffered(req.concurrency.max(1))
        .collect()
        .await;

    let mut competitors = Vec::new();
    let mut user = None;
    let mut documents = Vec::new();
    for (doc, summary) in scored {
        documents.push(summary);
        if doc.document.rank.is_some() {
            competitors.push(doc);
        } else {
            user = Some(doc);
        }
    }
    let mut warnings: Vec<String> = Vec::new();
    if documents.iter().any(|d| d.error.is_some()) {
        warnings.push("some_documents_failed".to_string());
    }

    let rows = aggregate(&competitors, user.as_ref())?;
    tracing::info!(
        documents = documents.len(),
        rows = rows.len(),
        "aggregation done"
    );

    Ok(AnalysisRun {
        keyword: keyword.to_string(),
        location: req.location.clone(),
        user_url: user_url.map(str::to_string),
        user_serp_position,
        documents,
        rows,
        warnings,
    })
}
