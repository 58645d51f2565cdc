//! Competitor keyword aggregation.
//!
//! Folds up to ten ranked competitor documents (plus, optionally, the user's own page) and the
//! keyword candidates scored for each of them into a single table with one row per distinct
//! (case-insensitive) term.
//!
//! Everything here is pure: no network, no filesystem.

use crate::{Error, KeywordCandidate, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Number of competitor slots (ranks 0..=9).
pub const COMPETITOR_SLOTS: usize = 10;
/// Slot reserved for the user's own URL.
pub const USER_SLOT: usize = COMPETITOR_SLOTS;
/// Total slots per row.
pub const SLOT_COUNT: usize = COMPETITOR_SLOTS + 1;

/// One retrieved page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedDocument {
    pub url: String,
    /// 0-based organic position; `None` for the user's own (unranked) URL.
    pub rank: Option<usize>,
    /// Extracted plain text. Empty when extraction failed.
    pub text: String,
}

impl RankedDocument {
    pub fn competitor(url: impl Into<String>, rank: usize, text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            rank: Some(rank),
            text: text.into(),
        }
    }

    pub fn user(url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            rank: None,
            text: text.into(),
        }
    }

    /// Index into [`KeywordAggregate::occurrences`] this document writes to.
    pub fn slot(&self) -> Result<usize> {
        match self.rank {
            None => Ok(USER_SLOT),
            Some(r) if r < COMPETITOR_SLOTS => Ok(r),
            Some(r) => Err(Error::InvalidInput(format!(
                "competitor rank {r} is outside 0..{COMPETITOR_SLOTS} ({})",
                self.url
            ))),
        }
    }
}

/// A document paired with the keyword candidates scored from its text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredDocument {
    pub document: RankedDocument,
    pub candidates: Vec<KeywordCandidate>,
}

impl ScoredDocument {
    pub fn new(document: RankedDocument, candidates: Vec<KeywordCandidate>) -> Self {
        Self {
            document,
            candidates,
        }
    }
}

/// One row of the consolidated keyword table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordAggregate {
    /// Casing as first seen.
    pub term: String,
    pub total_occurrence: u64,
    pub max_occurrence: u64,
    pub max_occurrence_url: Option<String>,
    /// Score as first observed (lower is more relevant).
    pub score: f64,
    /// Rank of the document the term was first observed on; `None` for the user's URL.
    pub ranking: Option<usize>,
    pub occurrences: [u64; SLOT_COUNT],
}

impl KeywordAggregate {
    fn new(term: &str, score: f64, ranking: Option<usize>) -> Self {
        Self {
            term: term.to_string(),
            total_occurrence: 0,
            max_occurrence: 0,
            max_occurrence_url: None,
            score,
            ranking,
            occurrences: [0; SLOT_COUNT],
        }
    }

    /// Mean occurrence over the three top-ranked competitor slots.
    ///
    /// Always divides by 3, even when fewer than three competitors were analyzed; missing slots
    /// count as zero.
    pub fn mean_top_3(&self) -> f64 {
        let sum: u64 = self.occurrences[..3].iter().sum();
        sum as f64 / 3.0
    }
}

/// Count case-insensitive, non-overlapping literal occurrences of `term` in `text`.
pub fn count_occurrences(term: &str, text: &str) -> u64 {
    count_lowered(&term.to_lowercase(), &text.to_lowercase())
}

fn count_lowered(term_lc: &str, text_lc: &str) -> u64 {
    if term_lc.is_empty() {
        return 0;
    }
    text_lc.matches(term_lc).count() as u64
}

/// Incremental fold over scored documents.
///
/// Callers that care about first-write-wins semantics for `score`/`ranking` must fold in
/// canonical order (ascending rank, user document last); [`aggregate`] does that for you.
#[derive(Debug, Default)]
pub struct Aggregator {
    rows: Vec<KeywordAggregate>,
    by_term: HashMap<String, usize>,
    folded_slots: [bool; SLOT_COUNT],
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn fold(&mut self, scored: &ScoredDocument) -> Result<()> {
        let doc = &scored.document;
        let slot = doc.slot()?;
        if self.folded_slots[slot] {
            return Err(Error::InvalidInput(format!(
                "slot {slot} was already folded ({})",
                doc.url
            )));
        }
        self.folded_slots[slot] = true;

        // A failed extraction leaves no text; its slot stays zero everywhere.
        if doc.text.trim().is_empty() {
            return Ok(());
        }

        let text_lc = doc.text.to_lowercase();
        for cand in &scored.candidates {
            let key = cand.term.to_lowercase();
            if key.trim().is_empty() {
                continue;
            }
            let occurrence = count_lowered(&key, &text_lc);

            let idx = match self.by_term.get(&key) {
                Some(&i) => i,
                None => {
                    self.rows
                        .push(KeywordAggregate::new(&cand.term, cand.score, doc.rank));
                    self.by_term.insert(key, self.rows.len() - 1);
                    self.rows.len() - 1
                }
            };

            let row = &mut self.rows[idx];
            // Non-zero only for a duplicate candidate within this same document.
            let previous = row.occurrences[slot];
            row.occurrences[slot] = occurrence;
            row.total_occurrence = row.total_occurrence - previous + occurrence;
            if occurrence > row.max_occurrence {
                row.max_occurrence = occurrence;
                row.max_occurrence_url = Some(doc.url.clone());
            }
        }
        Ok(())
    }

    /// Rows sorted by `total_occurrence` descending; ties keep encounter order.
    pub fn finish(self) -> Vec<KeywordAggregate> {
        let mut rows = self.rows;
        rows.sort_by(|a, b| b.total_occurrence.cmp(&a.total_occurrence));
        rows
    }
}

/// Fold competitors in ascending rank order, then the user's document, into a sorted table.
pub fn aggregate(
    competitors: &[ScoredDocument],
    user: Option<&ScoredDocument>,
) -> Result<Vec<KeywordAggregate>> {
    if competitors.len() > COMPETITOR_SLOTS {
        return Err(Error::InvalidInput(format!(
            "at most {COMPETITOR_SLOTS} competitor documents are supported, got {}",
            competitors.len()
        )));
    }
    let mut ordered: Vec<&ScoredDocument> = Vec::with_capacity(competitors.len());
    for c in competitors {
        if c.document.rank.is_none() {
            return Err(Error::InvalidInput(format!(
                "competitor document has no rank ({})",
                c.document.url
            )));
        }
        ordered.push(c);
    }
    ordered.sort_by_key(|c| c.document.rank);

    let mut agg = Aggregator::new();
    for c in ordered {
        agg.fold(c)?;
    }
    if let Some(u) = user {
        if u.document.rank.is_some() {
            return Err(Error::InvalidInput(format!(
                "user document must be unranked ({})",
                u.document.url
            )));
        }
        agg.fold(u)?;
    }
    Ok(agg.finish())
}

/// Per-document bookkeeping kept alongside the table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentSummary {
    pub url: String,
    pub rank: Option<usize>,
    pub slot: usize,
    pub text_chars: usize,
    pub candidate_count: usize,
    /// Warning code when extraction or scoring failed for this document.
    pub warning: Option<String>,
    pub error: Option<String>,
}

/// Immutable result of one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisRun {
    pub keyword: String,
    pub location: Option<String>,
    pub user_url: Option<String>,
    /// 1-based SERP position of the user URL, if it appeared in the fetched results.
    pub user_serp_position: Option<usize>,
    pub documents: Vec<DocumentSummary>,
    pub rows: Vec<KeywordAggregate>,
    pub warnings: Vec<String>,
}

impl AnalysisRun {
    pub fn row(&self, term: &str) -> Option<&KeywordAggregate> {
        let key = term.to_lowercase();
        self.rows.iter().find(|r| r.term.to_lowercase() == key)
    }
}
