//! Combining per-provider result lists and slicing pages.
//!
//! Lists arrive in provider order. `merge` and `priority` both keep each
//! provider's list intact and in order, so they produce the same sequence;
//! `round_robin` takes one result from each provider per round.

use crate::types::{AggregationStrategy, SearchResult};

use super::dedup::{dedup_first, SeenUrls};

/// One page of a deduplicated result sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub results: Vec<SearchResult>,
    /// Length of the whole sequence.
    pub total_results: usize,
    pub total_pages: usize,
}

/// Combine `lists` (in provider order) under `strategy`, deduplicated.
pub fn combine(strategy: AggregationStrategy, lists: Vec<Vec<SearchResult>>) -> Vec<SearchResult> {
    match strategy {
        AggregationStrategy::Merge => dedup_first(lists.into_iter().flatten().collect()),
        AggregationStrategy::RoundRobin => dedup_first(interleave(lists)),
        AggregationStrategy::Priority => {
            let mut seen = SeenUrls::new();
            let mut combined = Vec::new();
            for list in lists {
                combined.extend(list.into_iter().filter(|r| seen.insert(&r.url)));
            }
            combined
        }
    }
}

/// Position 0 of every list, then position 1 of every list, and so on.
/// Exhausted lists are skipped.
pub fn interleave(lists: Vec<Vec<SearchResult>>) -> Vec<SearchResult> {
    let total = lists.iter().map(Vec::len).sum();
    let mut iters: Vec<_> = lists.into_iter().map(Vec::into_iter).collect();
    let mut out = Vec::with_capacity(total);
    while out.len() < total {
        for iter in &mut iters {
            if let Some(result) = iter.next() {
                out.push(result);
            }
        }
    }
    out
}

/// Slice `[(page-1)*per_page, page*per_page)` out of `results`.
///
/// A page past the end is empty; totals still describe the whole sequence.
pub fn paginate(results: Vec<SearchResult>, page: usize, per_page: usize) -> Page {
    let per_page = per_page.max(1);
    let total_results = results.len();
    let total_pages = total_results.div_ceil(per_page);
    let start = page.saturating_sub(1).saturating_mul(per_page);
    let results = results.into_iter().skip(start).take(per_page).collect();
    Page {
        results,
        total_results,
        total_pages,
    }
}
