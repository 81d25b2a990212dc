//! Token usage records and their accumulation across provider calls.
//!
//! Providers that report token counts (Jina) produce `native` records;
//! everyone else gets an `approximate` record derived from text length.
//! Summing records with different counting methods yields `aggregate`.

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// How the counts in a [`UsageRecord`] were obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountingMethod {
    /// Reported by the provider.
    Native,
    /// Estimated locally from character counts.
    #[default]
    Approximate,
    /// Sum of records with mixed methods.
    Aggregate,
}

/// Token counters for one call or a sum of calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub total_tokens: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub counting_method: CountingMethod,
}

/// Rough characters-per-token ratio for English text.
const CHARS_PER_TOKEN: u64 = 4;

impl UsageRecord {
    /// A record with provider-reported counts.
    pub fn native(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
            prompt_tokens,
            completion_tokens,
            counting_method: CountingMethod::Native,
        }
    }

    /// Estimate counts from the request and response text.
    pub fn approximate(prompt: &str, completion: &str) -> Self {
        let prompt_tokens = estimate_tokens(prompt);
        let completion_tokens = estimate_tokens(completion);
        Self {
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
            prompt_tokens,
            completion_tokens,
            counting_method: CountingMethod::Approximate,
        }
    }

    /// Add `other` into this record.
    ///
    /// The counting method survives only if both sides agree; otherwise
    /// the result is [`CountingMethod::Aggregate`].
    pub fn add(&mut self, other: &UsageRecord) {
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self
            .completion_tokens
            .saturating_add(other.completion_tokens);
        if self.counting_method != other.counting_method {
            self.counting_method = CountingMethod::Aggregate;
        }
    }
}

/// `ceil(chars / 4)`, zero for empty text.
pub fn estimate_tokens(text: &str) -> u64 {
    let chars = text.chars().count() as u64;
    chars.div_ceil(CHARS_PER_TOKEN)
}

/// Thread-safe running total of [`UsageRecord`]s.
///
/// Starts empty; the first record added fixes the initial counting
/// method so a single-provider total keeps `native` or `approximate`.
#[derive(Debug, Default)]
pub struct UsageAccumulator {
    total: Mutex<Option<UsageRecord>>,
}

impl UsageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record into the total.
    pub fn add(&self, record: &UsageRecord) {
        let mut total = self.total.lock().unwrap_or_else(PoisonError::into_inner);
        match total.as_mut() {
            Some(sum) => sum.add(record),
            None => *total = Some(record.clone()),
        }
    }

    /// Current total; an empty accumulator reports zeros.
    pub fn snapshot(&self) -> UsageRecord {
        self.total
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approximate_uses_four_chars_per_token() {
        let usage = UsageRecord::approximate("abcd", "abcde");
        assert_eq!(usage.prompt_tokens, 1);
        assert_eq!(usage.completion_tokens, 2);
        assert_eq!(usage.total_tokens, 3);
        assert_eq!(usage.counting_method, CountingMethod::Approximate);
    }

    #[test]
    fn estimate_tokens_empty_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn native_totals() {
        let usage = UsageRecord::native(10, 32);
        assert_eq!(usage.total_tokens, 42);
        assert_eq!(usage.counting_method, CountingMethod::Native);
    }

    #[test]
    fn add_same_method_keeps_method() {
        let mut a = UsageRecord::native(1, 2);
        a.add(&UsageRecord::native(3, 4));
        assert_eq!(a.total_tokens, 10);
        assert_eq!(a.counting_method, CountingMethod::Native);
    }

    #[test]
    fn add_mixed_methods_becomes_aggregate() {
        let mut a = UsageRecord::native(1, 2);
        a.add(&UsageRecord::approximate("abcd", ""));
        assert_eq!(a.total_tokens, 4);
        assert_eq!(a.counting_method, CountingMethod::Aggregate);
    }

    #[test]
    fn accumulator_empty_snapshot_is_zero() {
        let acc = UsageAccumulator::new();
        assert_eq!(acc.snapshot(), UsageRecord::default());
    }

    #[test]
    fn accumulator_single_record_keeps_method() {
        let acc = UsageAccumulator::new();
        acc.add(&UsageRecord::native(5, 5));
        let snap = acc.snapshot();
        assert_eq!(snap.total_tokens, 10);
        assert_eq!(snap.counting_method, CountingMethod::Native);
    }

    #[test]
    fn accumulator_sums_across_threads() {
        let acc = std::sync::Arc::new(UsageAccumulator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let acc = acc.clone();
                std::thread::spawn(move || acc.add(&UsageRecord::native(1, 1)))
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread");
        }
        assert_eq!(acc.snapshot().total_tokens, 16);
    }

    #[test]
    fn counting_method_serializes_lowercase() {
        let json = serde_json::to_string(&CountingMethod::Aggregate).expect("serialize");
        assert_eq!(json, "\"aggregate\"");
    }
}
