//! Heat scoring: one weighted scalar per item.
//!
//! Comments and shares carry the highest weight because they cost the reader
//! more than a tap; collects sit in between, likes are the baseline.

/// likes×1 + collects×3 + comments×5 + shares×5. Deterministic, no clamping
/// needed: inputs are already non-negative.
pub fn heat_score(likes: u64, collects: u64, comments: u64, shares: u64) -> u64 {
    likes
        .saturating_add(collects.saturating_mul(3))
        .saturating_add(comments.saturating_mul(5))
        .saturating_add(shares.saturating_mul(5))
}
