//! Keyword relevance heuristic for ranking keyword-source candidates.
//!
//! The score rewards exact term occurrences over partial word matches, gives a bonus for
//! terms that appear early, and divides out length so long notes do not win on volume.
//! It only orders candidates within the keyword list; it is never compared against
//! similarity scores.

use std::collections::BTreeSet;

/// Upper bound on a keyword score.
pub const MAX_KEYWORD_SCORE: f64 = 10.0;

const EXACT_WEIGHT: f64 = 2.0;
const PARTIAL_WEIGHT: f64 = 0.5;

/// Lower-cased, deduplicated whitespace terms of a query.
///
/// Ordered, so summing per-term contributions is reproducible bit for bit.
pub fn query_terms(query: &str) -> BTreeSet<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Score `text` against lower-cased `terms`. Returns a value in `[0, 10]`.
pub fn keyword_score(text: &str, terms: &BTreeSet<String>) -> f64 {
    if text.is_empty() || terms.is_empty() {
        return 0.0;
    }

    let text_lower = text.to_lowercase();
    let words: Vec<&str> = text_lower.split_whitespace().collect();
    let text_chars = text_lower.chars().count() as f64;

    let mut score = 0.0;
    for term in terms {
        if term.is_empty() {
            continue;
        }

        let exact = text_lower.matches(term.as_str()).count();
        score += exact as f64 * EXACT_WEIGHT;

        let partial = words
            .iter()
            .filter(|w| w.contains(term.as_str()) && **w != term.as_str())
            .count();
        score += partial as f64 * PARTIAL_WEIGHT;

        if let Some(byte_pos) = text_lower.find(term.as_str()) {
            let first = text_lower[..byte_pos].chars().count() as f64;
            score += (1.0 - first / text_chars).max(0.0);
        }
    }

    let length_norm = (words.len() as f64 / 100.0).max(1.0);
    (score / length_norm).min(MAX_KEYWORD_SCORE)
}
