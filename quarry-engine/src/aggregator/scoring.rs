//! Position-decay relevance for providers that report no native score.
//!
//! ```text
//! score = 1.0 / (1.0 + 0.1 * position)
//! ```
//!
//! Position 0 scores 1.0, position 9 scores about 0.53.

/// Score of the result at 0-based `position` in a provider's list.
pub fn position_score(position: usize) -> f64 {
    1.0 / (1.0 + 0.1 * position as f64)
}
