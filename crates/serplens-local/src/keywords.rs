//! Statistical keyword extraction using YAKE.
//!
//! YAKE scores candidates from local statistics (position, frequency, casing, spread across
//! sentences); no corpus or model is needed. Lower scores are more relevant.

use serplens_core::{Error, KeywordCandidate, KeywordParams, KeywordScorer, Result};
use std::collections::HashSet;
use std::path::Path;
use yake_rust::{get_n_best, Config, StopWords};

/// Read a stopword list: one word per line, blank lines and `#` comments ignored.
pub fn load_stopwords_file(path: &Path) -> Result<Vec<String>> {
    let txt = std::fs::read_to_string(path)
        .map_err(|e| Error::Keywords(format!("read stopwords {}: {e}", path.display())))?;
    Ok(parse_stopwords(&txt))
}

pub fn parse_stopwords(txt: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let s = s.to_lowercase();
        if !out.contains(&s) {
            out.push(s);
        }
    }
    out
}

/// Custom stopwords replace the language list; otherwise fall back to English when the
/// language has no predefined list.
fn stopwords_for(params: &KeywordParams) -> StopWords {
    if !params.stopwords.is_empty() {
        let set: HashSet<String> = params.stopwords.iter().map(|s| s.to_lowercase()).collect();
        return StopWords::custom(set);
    }
    StopWords::predefined(&params.language)
        .or_else(|| {
            tracing::warn!(language = %params.language, "no stopword list for language, using en");
            StopWords::predefined("en")
        })
        .unwrap_or_else(|| StopWords::custom(HashSet::new()))
}

#[derive(Debug, Clone, Default)]
pub struct YakeScorer;

impl YakeScorer {
    pub fn new() -> Self {
        Self
    }
}

impl KeywordScorer for YakeScorer {
    fn name(&self) -> &'static str {
        "yake"
    }

    fn extract_keywords(
        &self,
        text: &str,
        params: &KeywordParams,
    ) -> Result<Vec<KeywordCandidate>> {
        if text.trim().is_empty() || params.top_n == 0 {
            return Ok(Vec::new());
        }
        if params.max_ngram_size == 0 {
            return Err(Error::Keywords("max_ngram_size must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&params.dedup_threshold) {
            return Err(Error::Keywords(format!(
                "dedup_threshold must be within 0..=1, got {}",
                params.dedup_threshold
            )));
        }

        let stopwords = stopwords_for(params);
        let config = Config {
            ngrams: params.max_ngram_size,
            remove_duplicates: true,
            deduplication_threshold: params.dedup_threshold,
            ..Config::default()
        };

        let mut out: Vec<KeywordCandidate> = get_n_best(params.top_n, text, &stopwords, &config)
            .into_iter()
            .map(|item| KeywordCandidate::new(item.raw, item.score))
            .collect();
        // Most relevant (lowest score) first; stable so equal scores keep YAKE's order.
        out.sort_by(|a, b| a.score.total_cmp(&b.score));
        Ok(out)
    }
}
