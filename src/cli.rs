//! Command-line interface.
//!
//! The binary parses a [`Cli`], loads [`QuarryConfig`](crate::QuarryConfig),
//! builds one engine and hands the command to [`execute`]. Every command
//! produces one JSON document.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use quarry_engine::{
    AggregationStrategy, DateRange, ProviderKind, RetrievalEngine, ScrapeRequest, SearchQuery,
    SearchType,
};
use serde_json::{json, Value};

use crate::error::Result;

/// Quarry: search and scrape the web through several providers at once.
#[derive(Debug, Parser)]
#[command(name = "quarry", version, about)]
pub struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Search every eligible provider and print one page of merged results.
    Search(SearchArgs),

    /// Extract the content of one URL, falling back across providers.
    Scrape(ScrapeArgs),

    /// Show configured providers and whether they can be routed to.
    Providers,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Query text. Multiple words are joined with spaces.
    #[arg(required = true, num_args = 1..)]
    pub query: Vec<String>,

    /// Results requested from each provider.
    #[arg(short, long, default_value_t = 10)]
    pub num: usize,

    /// Restrict the search to these providers (repeatable).
    #[arg(short, long = "provider")]
    pub providers: Vec<ProviderKind>,

    /// merge, round_robin or priority.
    #[arg(short, long, default_value = "merge")]
    pub strategy: AggregationStrategy,

    /// auto, neural or keyword.
    #[arg(short = 't', long = "type", default_value = "auto")]
    pub search_type: SearchType,

    /// Only return results from this domain (repeatable).
    #[arg(long = "include-domain")]
    pub include_domains: Vec<String>,

    /// Never return results from this domain (repeatable).
    #[arg(long = "exclude-domain")]
    pub exclude_domains: Vec<String>,

    /// Earliest publication date (YYYY-MM-DD).
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Latest publication date (YYYY-MM-DD).
    #[arg(long)]
    pub to: Option<NaiveDate>,

    /// Page of the merged list, starting at 1.
    #[arg(long, default_value_t = 1)]
    pub page: usize,

    #[arg(long, default_value_t = 10)]
    pub per_page: usize,
}

impl SearchArgs {
    pub fn to_query(&self) -> SearchQuery {
        let mut query = SearchQuery::new(self.query.join(" "))
            .with_num_results(self.num)
            .with_strategy(self.strategy)
            .with_search_type(self.search_type)
            .with_include_domains(self.include_domains.clone())
            .with_exclude_domains(self.exclude_domains.clone())
            .with_page(self.page, self.per_page);
        if !self.providers.is_empty() {
            query = query.with_providers(self.providers.clone());
        }
        if self.from.is_some() || self.to.is_some() {
            query = query.with_date_range(DateRange {
                start: self.from,
                end: self.to,
            });
        }
        query
    }
}

#[derive(Debug, Args)]
pub struct ScrapeArgs {
    /// Absolute http(s) URL.
    pub url: String,

    /// Try this provider first.
    #[arg(short, long)]
    pub provider: Option<ProviderKind>,

    /// Stop after the first candidate.
    #[arg(long)]
    pub no_fallback: bool,
}

impl ScrapeArgs {
    pub fn to_request(&self) -> ScrapeRequest {
        let mut request = ScrapeRequest::new(self.url.clone()).with_fallback(!self.no_fallback);
        if let Some(provider) = self.provider {
            request = request.with_provider(provider);
        }
        request
    }
}

/// Run `command` against `engine` and return the JSON to print.
///
/// # Errors
///
/// Returns the engine's error for failed searches and scrapes.
pub async fn execute(engine: &RetrievalEngine, command: &Command) -> Result<Value> {
    match command {
        Command::Search(args) => {
            let response = engine.search(&args.to_query()).await?;
            Ok(serde_json::to_value(response)?)
        }
        Command::Scrape(args) => {
            let result = engine.scrape(&args.to_request()).await?;
            Ok(serde_json::to_value(result)?)
        }
        Command::Providers => Ok(json!({
            "providers": engine.provider_status(),
            "usage": engine.usage(),
        })),
    }
}
