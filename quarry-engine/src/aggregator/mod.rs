//! Search aggregation: concurrent fan-out, strategy merge, dedup, paging.
//!
//! Every eligible provider is queried at once under one overall deadline.
//! Per-provider lists are combined in provider order by the query's
//! [`AggregationStrategy`](crate::types::AggregationStrategy), deduplicated
//! by canonical URL, and sliced into the requested page.

pub mod cache;
pub mod dedup;
pub mod merge;
pub mod scoring;
pub mod search;
pub mod url_normalize;

pub use search::SearchAggregator;
