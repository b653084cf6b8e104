//! Character-bigram Jaccard similarity for near-duplicate titles.
//!
//! Token overlap is unreliable on mixed CJK/Latin text, so similarity works on
//! 2-character sliding windows of the normalized string instead. Intentionally
//! simple and explainable; no auxiliary state beyond the two sets.

use std::collections::HashSet;

/// Lowercase and keep only letters (any script) and digits.
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// 2-character windows of the normalized text. A single-character input yields
/// a one-element set of that character; empty input yields an empty set.
pub fn bigrams(text: &str) -> HashSet<String> {
    let norm: Vec<char> = normalize(text).chars().collect();
    match norm.len() {
        0 => HashSet::new(),
        1 => {
            let mut set = HashSet::new();
            set.insert(norm[0].to_string());
            set
        }
        _ => norm.windows(2).map(|w| w.iter().collect()).collect(),
    }
}

/// Jaccard index in [0, 1]. Both sets empty → 1; exactly one empty → 0.
/// Iterates the smaller set.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let inter = small.iter().filter(|g| large.contains(*g)).count();
    let union = a.len() + b.len() - inter;
    inter as f64 / union as f64
}

/// Convenience: bigram Jaccard of two raw strings.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    jaccard(&bigrams(a), &bigrams(b))
}
