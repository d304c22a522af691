use regex::RegexBuilder;

/// Characters of context kept before the first match.
pub const CONTEXT_BEFORE: usize = 50;
pub const DEFAULT_MAX_LENGTH: usize = 200;

const ELLIPSIS: &str = "...";

/// Builds a context window of at most `max_length` characters around the
/// earliest case-insensitive occurrence of any matched term.
///
/// Falls back to the head of the text when no term can be located.
pub fn build_snippet(text: &str, matched_terms: &[String], max_length: usize) -> String {
    if text.trim().is_empty() {
        return String::new();
    }
    let first_match = matched_terms
        .iter()
        .filter(|t| !t.trim().is_empty())
        .filter_map(|t| find_case_insensitive(text, t))
        .min();

    let Some(byte_idx) = first_match else {
        let head: String = text.chars().take(max_length).collect();
        return head + ELLIPSIS;
    };

    let total = text.chars().count();
    let match_idx = text[..byte_idx].chars().count();
    let start = match_idx.saturating_sub(CONTEXT_BEFORE);
    let end = (start + max_length).min(total);

    let mut snippet = String::with_capacity(max_length + 2 * ELLIPSIS.len());
    if start > 0 {
        snippet.push_str(ELLIPSIS);
    }
    snippet.extend(text.chars().skip(start).take(end - start));
    if end < total {
        snippet.push_str(ELLIPSIS);
    }
    snippet
}

/// Byte offset of the first case-insensitive occurrence of `needle`.
fn find_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let pattern = RegexBuilder::new(&regex::escape(needle))
        .case_insensitive(true)
        .build()
        .ok()?;
    pattern.find(haystack).map(|m| m.start())
}
