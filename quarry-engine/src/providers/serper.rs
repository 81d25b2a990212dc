//! Serper.dev Google search.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::aggregator::scoring::position_score;
use crate::config::{DomainAffinity, ProviderConfig};
use crate::error::ProviderError;
use crate::http;
use crate::provider::{ProviderClient, ProviderSearchOutput};
use crate::types::{ProviderKind, ProviderMetadata, SearchQuery, SearchResult};
use crate::usage::UsageRecord;

const DEFAULT_BASE_URL: &str = "https://google.serper.dev";

pub struct SerperClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    affinity: DomainAffinity,
}

#[derive(Debug, Serialize)]
struct SerperRequest {
    q: String,
    num: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    tbs: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperOrganic>,
}

#[derive(Debug, Deserialize)]
struct SerperOrganic {
    #[serde(default)]
    title: String,
    link: String,
    #[serde(default)]
    snippet: String,
    date: Option<String>,
    #[serde(flatten)]
    extra: ProviderMetadata,
}

impl SerperClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http::build_client(config.timeout(), http::API_USER_AGENT)?,
            api_key: config.api_key.clone(),
            base_url: config.endpoint(DEFAULT_BASE_URL),
            affinity: config.affinity.clone(),
        })
    }

    fn build_request(query: &SearchQuery) -> SerperRequest {
        let mut q = query.text().trim().to_owned();
        match query.include_domains() {
            [] => {}
            [only] => q.push_str(&format!(" site:{only}")),
            many => {
                let sites: Vec<String> = many.iter().map(|d| format!("site:{d}")).collect();
                q.push_str(&format!(" ({})", sites.join(" OR ")));
            }
        }
        for domain in query.exclude_domains() {
            q.push_str(&format!(" -site:{domain}"));
        }

        SerperRequest {
            q,
            num: query.num_results(),
            tbs: query.date_range().and_then(|range| date_filter(range.start, range.end)),
        }
    }
}

/// Google custom date range, e.g. `cdr:1,cd_min:01/31/2024,cd_max:02/29/2024`.
fn date_filter(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Option<String> {
    if start.is_none() && end.is_none() {
        return None;
    }
    let mut tbs = "cdr:1".to_owned();
    if let Some(start) = start {
        tbs.push_str(&format!(",cd_min:{}", start.format("%m/%d/%Y")));
    }
    if let Some(end) = end {
        tbs.push_str(&format!(",cd_max:{}", end.format("%m/%d/%Y")));
    }
    Some(tbs)
}

#[async_trait]
impl ProviderClient for SerperClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Serper
    }

    fn affinity(&self) -> &DomainAffinity {
        &self.affinity
    }

    async fn search(&self, query: &SearchQuery) -> Result<ProviderSearchOutput, ProviderError> {
        let api_key = super::require_key(self.kind(), self.api_key.as_deref())?;
        let body = Self::build_request(query);
        tracing::trace!(q = %body.q, "serper request");

        let request = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("X-API-KEY", api_key)
            .json(&body);
        let response: SerperResponse = http::send_json(self.kind(), request).await?;

        let mut completion = String::new();
        let results: Vec<SearchResult> = response
            .organic
            .into_iter()
            .take(query.num_results())
            .enumerate()
            .map(|(position, item)| {
                completion.push_str(&item.title);
                completion.push_str(&item.snippet);
                SearchResult {
                    title: item.title,
                    url: item.link,
                    content: item.snippet,
                    provider: ProviderKind::Serper,
                    score: position_score(position),
                    published_date: super::non_empty(item.date),
                    author: None,
                    provider_metadata: item.extra,
                }
            })
            .collect();

        Ok(ProviderSearchOutput {
            usage: UsageRecord::approximate(&body.q, &completion),
            results,
        })
    }
}
