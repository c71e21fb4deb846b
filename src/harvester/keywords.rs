//! Keyword extraction from meeting title + description (spec §4.3), used to
//! build the keyword disjunct of the Gmail query.

use std::collections::HashSet;

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "meeting",
    "discussion", "call", "review", "session", "sync", "chat", "talk",
];

const MAX_KEYWORDS: usize = 5;
const MIN_LEN: usize = 4;

/// Lowercase, tokenize on non-word runs, drop stopwords/pure-digit/short
/// tokens, dedupe preserving first-seen order, cap at 5.
pub fn extract_keywords(title: &str, description: Option<&str>) -> Vec<String> {
    let combined = match description {
        Some(d) => format!("{title} {d}"),
        None => title.to_string(),
    };
    let lowered = combined.to_ascii_lowercase();

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for token in lowered.split(|c: char| !c.is_alphanumeric()) {
        if token.len() < MIN_LEN {
            continue;
        }
        if token.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if STOPWORDS.contains(&token) {
            continue;
        }
        if seen.insert(token.to_string()) {
            out.push(token.to_string());
        }
        if out.len() >= MAX_KEYWORDS {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_stopwords_and_short_tokens() {
        let kws = extract_keywords("Q3 Roadmap Review with the Platform Team", None);
        assert!(!kws.contains(&"with".to_string()));
        assert!(!kws.contains(&"the".to_string()));
        assert!(kws.contains(&"roadmap".to_string()));
        assert!(kws.contains(&"platform".to_string()));
    }

    #[test]
    fn caps_at_five() {
        let title = "alpha bravo charlie delta echo foxtrot golf hotel";
        let kws = extract_keywords(title, None);
        assert_eq!(kws.len(), 5);
    }

    #[test]
    fn dedupes_preserving_first_seen() {
        let kws = extract_keywords("budget budget planning budget", None);
        assert_eq!(kws, vec!["budget".to_string(), "planning".to_string()]);
    }

    #[test]
    fn empty_title_yields_no_keywords() {
        assert!(extract_keywords("", None).is_empty());
    }

    #[test]
    fn pure_digit_tokens_excluded() {
        let kws = extract_keywords("2024 2025 roadmap", None);
        assert_eq!(kws, vec!["roadmap".to_string()]);
    }
}
