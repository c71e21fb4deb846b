//! Temporal scoring shared by the email and document relevance passes
//! (spec §4.6): `recency = exp(-λ·days_old)`, combined with relevance as
//! `0.7·relevance + 0.3·recency`, used for ranking only — never to drop
//! an artifact outright.

use chrono::{DateTime, Datelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

const LAMBDA: f64 = 0.015;
const RELEVANCE_WEIGHT: f64 = 0.7;
const RECENCY_WEIGHT: f64 = 0.3;

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(20\d{2})\b").unwrap());
static QUARTER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)Q([1-4])\s*(20\d{2})?").unwrap());
static RELATIVE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(?:last|this|next)\s+(?:week|month|quarter)\b").unwrap());

pub fn recency_score(artifact_date: DateTime<Utc>, meeting_start: DateTime<Utc>) -> f64 {
    let days_old = (meeting_start - artifact_date).num_seconds() as f64 / 86_400.0;
    (-LAMBDA * days_old.max(0.0)).exp()
}

pub fn combined_score(relevance: f64, recency: f64) -> f64 {
    RELEVANCE_WEIGHT * relevance + RECENCY_WEIGHT * recency
}

/// One flagged reference found while scanning a document's own text, not
/// its file metadata.
#[derive(Debug, Clone)]
pub struct StaleIndicator {
    pub kind: &'static str,
    pub value: String,
    pub severity: &'static str,
}

/// Regex-scans `text` (a document's content or, failing that, its name) for
/// outdated year, quarter, and relative-time references relative to `now` —
/// surfaced to the synthesizer as staleness warnings, never used to exclude
/// the document itself.
pub fn detect_stale_references(text: &str, now: DateTime<Utc>) -> Vec<StaleIndicator> {
    if text.is_empty() {
        return Vec::new();
    }

    let current_year = now.year();
    let current_quarter = (now.month() as i32 - 1) / 3 + 1;
    let mut indicators = Vec::new();

    let old_years: BTreeSet<String> = YEAR_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .filter(|y| y.parse::<i32>().is_ok_and(|y| y < current_year - 1))
        .collect();
    if !old_years.is_empty() {
        indicators.push(StaleIndicator {
            kind: "old_year",
            value: old_years.into_iter().collect::<Vec<_>>().join(", "),
            severity: "medium",
        });
    }

    for cap in QUARTER_RE.captures_iter(text) {
        let Some(quarter) = cap.get(1).and_then(|m| m.as_str().parse::<i32>().ok()) else { continue };
        let reference_year = cap.get(2).and_then(|m| m.as_str().parse::<i32>().ok()).unwrap_or(current_year);
        if reference_year < current_year || (reference_year == current_year && quarter < current_quarter - 1) {
            indicators.push(StaleIndicator { kind: "old_quarter", value: cap.get(0).unwrap().as_str().to_string(), severity: "high" });
        }
    }

    let relative_hits: Vec<String> = RELATIVE_RE.find_iter(text).map(|m| m.as_str().to_string()).collect();
    if !relative_hits.is_empty() {
        indicators.push(StaleIndicator { kind: "relative_time", value: relative_hits.join(", "), severity: "low" });
    }

    indicators
}

pub fn is_stale_text(text: &str, now: DateTime<Utc>) -> bool {
    !detect_stale_references(text, now).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn recency_decays_with_age() {
        let now = Utc::now();
        let fresh = recency_score(now, now);
        let old = recency_score(now - Duration::days(365), now);
        assert!(fresh > old);
        assert!((fresh - 1.0).abs() < 1e-9);
    }

    #[test]
    fn combined_score_weights_relevance_more() {
        let s = combined_score(1.0, 0.0);
        assert!((s - 0.7).abs() < 1e-9);
    }

    #[test]
    fn old_year_reference_is_flagged() {
        let now = Utc::now();
        let stale_year = now.year() - 3;
        let text = format!("Budget approved in {stale_year} for the new rollout.");
        let indicators = detect_stale_references(&text, now);
        assert!(indicators.iter().any(|i| i.kind == "old_year"));
    }

    #[test]
    fn recent_year_reference_is_not_flagged() {
        let now = Utc::now();
        let text = format!("Plan drafted in {}.", now.year());
        assert!(!is_stale_text(&text, now));
    }

    #[test]
    fn relative_time_phrase_is_flagged() {
        let now = Utc::now();
        let indicators = detect_stale_references("We discussed this last week.", now);
        assert!(indicators.iter().any(|i| i.kind == "relative_time"));
    }

    #[test]
    fn empty_text_is_never_stale() {
        let now = Utc::now();
        assert!(!is_stale_text("", now));
    }
}
