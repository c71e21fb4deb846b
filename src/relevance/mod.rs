//! RelevanceFilterPipeline (spec §4.6): batched relevance filtering and
//! structured extraction over the harvested emails and documents.

pub mod documents;
pub mod emails;
pub mod temporal;

use crate::domain::Confidence;

/// Shared meeting context threaded through every relevance LLM call.
#[derive(Debug, Clone)]
pub struct MeetingContext {
    pub title: String,
    pub purpose: String,
    pub key_entities: Vec<String>,
    pub confidence: Confidence,
    pub user_company: Option<String>,
}

/// Inclusion-rate targets, modulated by purpose-detection confidence — used
/// only to steer the LLM's prompt, never enforced as a hard cutoff.
pub fn inclusion_target(confidence: Confidence, is_document: bool) -> (u8, u8) {
    match (confidence, is_document) {
        (Confidence::Low, true) => (20, 40),
        (Confidence::Low, false) => (30, 50),
        (Confidence::Medium, true) => (40, 60),
        (Confidence::Medium, false) => (50, 70),
        (Confidence::High, true) => (50, 70),
        (Confidence::High, false) => (60, 80),
    }
}

/// De-duplicates free-text fragments via an 80%-prefix substring-containment
/// heuristic: a fragment is dropped if an already-kept fragment's 80%
/// prefix is found inside it, or vice versa.
pub fn dedup_similar(items: Vec<String>) -> Vec<String> {
    let mut kept: Vec<String> = Vec::new();
    'outer: for item in items {
        let item_prefix = prefix_80(&item);
        for k in &kept {
            let k_prefix = prefix_80(k);
            if item.contains(&k_prefix) || k.contains(&item_prefix) {
                continue 'outer;
            }
        }
        kept.push(item);
    }
    kept
}

fn prefix_80(s: &str) -> String {
    let n = ((s.chars().count() as f64) * 0.8).round() as usize;
    s.chars().take(n.max(1)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inclusion_target_widens_with_confidence() {
        let (lo, _) = inclusion_target(Confidence::Low, false);
        let (hi, _) = inclusion_target(Confidence::High, false);
        assert!(hi > lo);
    }

    #[test]
    fn dedup_drops_near_duplicate_prefix() {
        let items = vec![
            "the team agreed to ship the feature next week".to_string(),
            "the team agreed to ship the feature next week after QA".to_string(),
            "completely unrelated fact about budgets".to_string(),
        ];
        let deduped = dedup_similar(items);
        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn dedup_keeps_distinct_fragments() {
        let items = vec!["fact one".to_string(), "fact two".to_string()];
        assert_eq!(dedup_similar(items).len(), 2);
    }
}
