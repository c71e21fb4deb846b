//! Two deliberately separate truncation functions (spec §4.2, §9 decided
//! open question): harvest-time truncation bounds the working set's memory
//! footprint; synthesis-time truncation further bounds what's sent to the
//! LLM from an already-truncated body. Keeping them distinct makes the
//! lossy-by-design nature explicit at each call site.

const HARVEST_LIMIT_BYTES: usize = 50 * 1024;
const SYNTHESIS_HEAD_BYTES: usize = 6000;
const SYNTHESIS_TAIL_BYTES: usize = 2000;

const TRUNCATION_MARKER: &str = "\n...[truncated]...\n";

/// Bound storage/memory of the working set. Keeps the head of the body up
/// to 50 KiB, appending a marker.
pub fn truncate_for_storage(body: &str) -> String {
    if body.len() <= HARVEST_LIMIT_BYTES {
        return body.to_string();
    }
    let head = crate::utils::truncate_str(body, HARVEST_LIMIT_BYTES);
    format!("{head}{TRUNCATION_MARKER}")
}

/// Bound the prompt budget for an already-harvest-truncated body: first
/// 6000 + last 2000 bytes, on char boundaries.
pub fn truncate_for_synthesis(body: &str) -> String {
    if body.len() <= SYNTHESIS_HEAD_BYTES + SYNTHESIS_TAIL_BYTES {
        return body.to_string();
    }
    let head = crate::utils::truncate_str(body, SYNTHESIS_HEAD_BYTES);
    let tail_start = body.len() - SYNTHESIS_TAIL_BYTES;
    let mut tail_start = tail_start;
    while tail_start < body.len() && !body.is_char_boundary(tail_start) {
        tail_start += 1;
    }
    let tail = &body[tail_start..];
    format!("{head}{TRUNCATION_MARKER}{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_body_untouched_by_storage_truncation() {
        let body = "hello world";
        assert_eq!(truncate_for_storage(body), body);
    }

    #[test]
    fn long_body_truncated_at_storage_limit() {
        let body = "a".repeat(60_000);
        let truncated = truncate_for_storage(&body);
        assert!(truncated.len() < body.len());
        assert!(truncated.contains("[truncated]"));
    }

    #[test]
    fn synthesis_truncation_keeps_head_and_tail() {
        let body = format!("{}{}", "H".repeat(7000), "T".repeat(3000));
        let truncated = truncate_for_synthesis(&body);
        assert!(truncated.starts_with("HHHH"));
        assert!(truncated.ends_with("TTTT"));
        assert!(truncated.len() < body.len());
    }

    #[test]
    fn the_two_functions_are_independent() {
        // A body that fits under the storage limit but not the synthesis
        // budget is still truncated at synthesis time.
        let body = "x".repeat(40_000);
        assert_eq!(truncate_for_storage(&body), body);
        assert!(truncate_for_synthesis(&body).len() < body.len());
    }
}
