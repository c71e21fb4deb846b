//! First-seen-wins dedup by provider-supplied id (spec §4.3, §8 property 4).

use std::collections::HashSet;

pub fn dedup_by_id<T, F: Fn(&T) -> &str>(items: Vec<T>, id_of: F) -> Vec<T> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if seen.insert(id_of(&item).to_string()) {
            out.push(item);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_seen_wins() {
        let items = vec![("a", 1), ("b", 2), ("a", 3)];
        let deduped = dedup_by_id(items, |(id, _)| id);
        assert_eq!(deduped, vec![("a", 1), ("b", 2)]);
    }

    #[test]
    fn empty_input() {
        let items: Vec<(&str, i32)> = vec![];
        assert!(dedup_by_id(items, |(id, _)| id).is_empty());
    }
}
