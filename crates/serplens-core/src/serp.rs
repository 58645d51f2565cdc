//! Helpers over a list of organic results.

use crate::OrganicResult;
use serde::{Deserialize, Serialize};

fn canonicalize_url_for_compare(url: &str) -> String {
    // Best-effort canonicalization for matching a user-typed URL against SERP links:
    // - normalize scheme/host casing
    // - drop fragments
    // - keep path/query as-is
    if let Ok(mut u) = url::Url::parse(url.trim()) {
        u.set_fragment(None);
        return u.to_string();
    }
    url.trim().to_string()
}

/// Where the user's URL landed in a result list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UserRank {
    /// 1-based position of the first match.
    Ranked { position: usize },
    /// Not present among the `out_of` results that were fetched.
    NotInTop { out_of: usize },
}

impl UserRank {
    pub fn position(&self) -> Option<usize> {
        match self {
            UserRank::Ranked { position } => Some(*position),
            UserRank::NotInTop { .. } => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            UserRank::Ranked { position } => format!("Your URL is ranked #{position}."),
            UserRank::NotInTop { out_of } => format!("Your URL is not in the top {out_of}."),
        }
    }
}

pub fn user_rank(results: &[OrganicResult], user_url: &str) -> UserRank {
    let want = canonicalize_url_for_compare(user_url);
    results
        .iter()
        .position(|r| canonicalize_url_for_compare(&r.url) == want)
        .map(|i| UserRank::Ranked { position: i + 1 })
        .unwrap_or(UserRank::NotInTop {
            out_of: results.len(),
        })
}
