//! Plain-text rendering for `--output text`.

use serplens_core::aggregate::AnalysisRun;
use serplens_core::serp::UserRank;
use serplens_core::{KeywordCandidate, Location, OrganicResult};

fn clip(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

pub fn locations(locs: &[Location]) -> String {
    if locs.is_empty() {
        return "No locations found.\n".to_string();
    }
    let mut out = String::new();
    for l in locs {
        let cc = l.country_code.as_deref().unwrap_or("-");
        out.push_str(&format!("{}  [{cc}]\n", l.full_name));
    }
    out
}

pub fn search(results: &[OrganicResult], show: usize, rank: Option<&UserRank>) -> String {
    let mut out = String::new();
    if results.is_empty() {
        out.push_str("No results.\n");
    }
    for r in results.iter().take(show) {
        let title = r.title.as_deref().unwrap_or("(untitled)");
        out.push_str(&format!(
            "{:>3}. {}\n     {}\n",
            r.rank + 1,
            clip(title, 90),
            r.url
        ));
    }
    if let Some(rank) = rank {
        out.push('\n');
        out.push_str(&rank.describe());
        out.push('\n');
    }
    out
}

pub fn keywords(cands: &[KeywordCandidate]) -> String {
    if cands.is_empty() {
        return "No keywords.\n".to_string();
    }
    let mut out = format!("{:<40} {:>12}\n", "term", "score");
    for c in cands {
        out.push_str(&format!("{:<40} {:>12.6}\n", clip(&c.term, 40), c.score));
    }
    out
}

pub fn analysis(run: &AnalysisRun) -> String {
    let mut out = String::new();
    match (&run.user_url, run.user_serp_position) {
        (Some(_), Some(p)) => out.push_str(&format!("Your URL is ranked #{p}.\n")),
        (Some(_), None) => out.push_str("Your URL is not in the analyzed results.\n"),
        _ => {}
    }
    for d in run.documents.iter().filter(|d| d.warning.is_some()) {
        let w = d.warning.as_deref().unwrap_or_default();
        out.push_str(&format!("warning: {} ({w})\n", d.url));
    }
    if run.rows.is_empty() {
        out.push_str("No results.\n");
        return out;
    }
    out.push_str(&format!(
        "{:<32} {:>6} {:>5} {:>10} {:>8} {:>7}  {}\n",
        "term", "total", "max", "score", "ranking", "top3", "max_url"
    ));
    for r in &run.rows {
        let ranking = r
            .ranking
            .map(|x| (x + 1).to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<32} {:>6} {:>5} {:>10.6} {:>8} {:>7.2}  {}\n",
            clip(&r.term, 32),
            r.total_occurrence,
            r.max_occurrence,
            r.score,
            ranking,
            r.mean_top_3(),
            r.max_occurrence_url.as_deref().unwrap_or("-"),
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_keeps_short_strings_and_marks_long_ones() {
        assert_eq!(clip("short", 10), "short");
        let c = clip("abcdefghijkl", 5);
        assert_eq!(c.chars().count(), 5);
        assert!(c.ends_with('…'));
    }

    #[test]
    fn search_lists_one_based_ranks_and_user_rank() {
        let results = vec![
            OrganicResult {
                url: "https://a.test/".to_string(),
                title: Some("A".to_string()),
                snippet: None,
                rank: 0,
            },
            OrganicResult {
                url: "https://b.test/".to_string(),
                title: Some("B".to_string()),
                snippet: None,
                rank: 1,
            },
        ];
        let s = search(&results, 1, Some(&UserRank::NotInTop { out_of: 2 }));
        assert!(s.contains("  1. A"));
        assert!(!s.contains("b.test"));
        assert!(s.contains("Your URL is not in the top 2."));
    }

    #[test]
    fn empty_analysis_says_no_results() {
        let run = AnalysisRun {
            keyword: "x".to_string(),
            location: None,
            user_url: None,
            user_serp_position: None,
            documents: Vec::new(),
            rows: Vec::new(),
            warnings: vec!["no_results".to_string()],
        };
        assert!(analysis(&run).contains("No results."));
    }
}
