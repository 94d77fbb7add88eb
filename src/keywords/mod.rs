//! Keyword extraction from document text.
//!
//! Papers often carry an explicit "Keywords:" (or "Index Terms:") section near the
//! top. This module finds the first such section inside a fixed window and splits
//! it into topics. It is a pure heuristic with no state.

use regex::Regex;
use std::sync::OnceLock;

use crate::extraction::take_chars;

/// Only this many leading characters of a document are scanned.
pub const KEYWORD_WINDOW_CHARS: usize = 3000;

/// Section headers that introduce a keyword list.
pub const HEADER_VARIANTS: [&str; 3] = ["Keywords", "Key words", "Index Terms"];

/// Where a keyword list ends: blank line, period, end of input, or a new line
/// starting with a capital letter.
const LIST_TERMINATOR: &str = r"(?:\n\n|\.|\z|\n[A-Z])";

/// Header (any casing) followed by a colon, capturing lazily up to the terminator.
/// Only the header is case-insensitive; the terminator's capital stays exact.
fn header_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let headers = HEADER_VARIANTS
            .iter()
            .map(|h| regex::escape(h))
            .collect::<Vec<_>>()
            .join("|");

        Regex::new(&format!(r"(?s)(?i:{})\s*:\s*(.*?){}", headers, LIST_TERMINATOR))
            .expect("keyword pattern is valid")
    })
}

/// Extract topics from an explicit keyword section.
///
/// Scans the first `KEYWORD_WINDOW_CHARS` characters. The leftmost header wins
/// whatever its casing; its captured span is split on commas and semicolons,
/// trimmed, and empty fragments are dropped. Returns an empty vector when no
/// header is found.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let window = take_chars(text, KEYWORD_WINDOW_CHARS);

    match header_pattern().captures(window).and_then(|captures| captures.get(1)) {
        Some(span) => split_topics(&span.as_str().replace('\n', " ")),
        None => Vec::new(),
    }
}

/// Split a keyword span on commas and semicolons.
fn split_topics(span: &str) -> Vec<String> {
    span.split([',', ';'])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_keyword_section() {
        let text = "Abstract text here.\nKeywords: A, B; C\n\nIntroduction";
        assert_eq!(extract_keywords(text), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_no_header_returns_empty() {
        let text = "A paper about graphs.\n\nIntroduction\nWe study graphs.";
        assert!(extract_keywords(text).is_empty());
    }

    #[test]
    fn test_stops_at_period() {
        let text = "Keywords: alpha, beta. Rest of the sentence, with commas";
        assert_eq!(extract_keywords(text), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_runs_to_end_of_input() {
        assert_eq!(extract_keywords("Keywords: one, two"), vec!["one", "two"]);
    }

    #[test]
    fn test_continues_over_lowercase_line_and_stops_at_capital() {
        let text = "Index Terms: graph theory,\nspectral methods\nIntroduction text";
        assert_eq!(
            extract_keywords(text),
            vec!["graph theory", "spectral methods"]
        );
    }

    #[test]
    fn test_space_before_colon_and_empty_fragments() {
        let text = "Key words : a ; ; b\n\n";
        assert_eq!(extract_keywords(text), vec!["a", "b"]);
    }

    #[test]
    fn test_uppercase_header_matches() {
        let text = "KEYWORDS: Vision; Robotics\n\nI. INTRODUCTION";
        assert_eq!(extract_keywords(text), vec!["Vision", "Robotics"]);
    }

    #[test]
    fn test_leftmost_header_wins_regardless_of_case() {
        let text = "INDEX TERMS: first, list\n\nKeywords: second, list\n\n";
        assert_eq!(extract_keywords(text), vec!["first", "list"]);
    }

    #[test]
    fn test_lowercase_header_before_canonical_one() {
        let text = "these keywords: early stuff\n\nKeywords: real, topics\n\n";
        assert_eq!(extract_keywords(text), vec!["early stuff"]);
    }

    #[test]
    fn test_header_outside_window_is_ignored() {
        let text = format!("{}Keywords: late, header", "x".repeat(KEYWORD_WINDOW_CHARS));
        assert!(extract_keywords(&text).is_empty());
    }

    #[test]
    fn test_empty_section_yields_no_topics() {
        assert!(extract_keywords("Keywords: ; ,\n\nBody").is_empty());
    }
}
