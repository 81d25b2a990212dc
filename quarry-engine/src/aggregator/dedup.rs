//! Deduplication by canonical URL.
//!
//! The first occurrence of each canonical URL wins, so the provider order
//! established by routing decides which copy survives.

use std::collections::HashSet;

use crate::types::SearchResult;

use super::url_normalize::normalize_url;

/// Canonical URLs already emitted.
#[derive(Debug, Default)]
pub struct SeenUrls(HashSet<String>);

impl SeenUrls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `url`; `false` if its canonical form was already seen.
    pub fn insert(&mut self, url: &str) -> bool {
        self.0.insert(normalize_url(url))
    }
}

/// Drop every result whose canonical URL appeared earlier in `results`.
pub fn dedup_first(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen = SeenUrls::new();
    results
        .into_iter()
        .filter(|result| seen.insert(&result.url))
        .collect()
}
