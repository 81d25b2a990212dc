//! Exa search.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::{DomainAffinity, ProviderConfig};
use crate::error::ProviderError;
use crate::http;
use crate::provider::{ProviderClient, ProviderSearchOutput};
use crate::types::{ProviderKind, ProviderMetadata, SearchQuery, SearchResult};
use crate::usage::UsageRecord;

const DEFAULT_BASE_URL: &str = "https://api.exa.ai";

/// Characters of page text requested per result.
const MAX_TEXT_CHARS: usize = 1_000;

pub struct ExaClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    affinity: DomainAffinity,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExaRequest<'a> {
    query: &'a str,
    #[serde(rename = "type")]
    search_type: &'static str,
    num_results: usize,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    include_domains: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    exclude_domains: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    start_published_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_published_date: Option<String>,
    contents: ExaContents,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExaContents {
    text: ExaText,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExaText {
    max_characters: usize,
}

#[derive(Debug, Deserialize)]
struct ExaResponse {
    #[serde(default)]
    results: Vec<ExaResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExaResult {
    #[serde(default)]
    title: Option<String>,
    url: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    score: Option<f64>,
    published_date: Option<String>,
    author: Option<String>,
    #[serde(flatten)]
    extra: ProviderMetadata,
}

impl ExaClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http::build_client(config.timeout(), http::API_USER_AGENT)?,
            api_key: config.api_key.clone(),
            base_url: config.endpoint(DEFAULT_BASE_URL),
            affinity: config.affinity.clone(),
        })
    }

    fn build_request(query: &SearchQuery) -> ExaRequest<'_> {
        let range = query.date_range();
        ExaRequest {
            query: query.text(),
            search_type: query.search_type().name(),
            num_results: query.num_results(),
            include_domains: query.include_domains(),
            exclude_domains: query.exclude_domains(),
            start_published_date: range.and_then(|r| r.start).map(|d| iso_day(d, false)),
            end_published_date: range.and_then(|r| r.end).map(|d| iso_day(d, true)),
            contents: ExaContents {
                text: ExaText {
                    max_characters: MAX_TEXT_CHARS,
                },
            },
        }
    }
}

/// Start or end of `date` as an ISO 8601 UTC timestamp.
fn iso_day(date: NaiveDate, end_of_day: bool) -> String {
    let time = if end_of_day { "23:59:59.999" } else { "00:00:00.000" };
    format!("{}T{time}Z", date.format("%Y-%m-%d"))
}

#[async_trait]
impl ProviderClient for ExaClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Exa
    }

    fn affinity(&self) -> &DomainAffinity {
        &self.affinity
    }

    async fn search(&self, query: &SearchQuery) -> Result<ProviderSearchOutput, ProviderError> {
        let api_key = super::require_key(self.kind(), self.api_key.as_deref())?;
        let request = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("x-api-key", api_key)
            .json(&Self::build_request(query));
        let response: ExaResponse = http::send_json(self.kind(), request).await?;

        let mut completion = String::new();
        let results = response
            .results
            .into_iter()
            .take(query.num_results())
            .enumerate()
            .map(|(position, item)| {
                let content = item.text.unwrap_or_default();
                let title = item.title.unwrap_or_default();
                completion.push_str(&title);
                completion.push_str(&content);
                SearchResult {
                    title,
                    url: item.url,
                    content,
                    provider: ProviderKind::Exa,
                    score: item
                        .score
                        .unwrap_or_else(|| crate::aggregator::scoring::position_score(position)),
                    published_date: super::non_empty(item.published_date),
                    author: super::non_empty(item.author),
                    provider_metadata: item.extra,
                }
            })
            .collect();

        Ok(ProviderSearchOutput {
            usage: UsageRecord::approximate(query.text(), &completion),
            results,
        })
    }
}
