//! Tavily search.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{DomainAffinity, ProviderConfig};
use crate::error::ProviderError;
use crate::http;
use crate::provider::{ProviderClient, ProviderSearchOutput};
use crate::types::{ProviderKind, ProviderMetadata, SearchQuery, SearchResult, SearchType};
use crate::usage::UsageRecord;

const DEFAULT_BASE_URL: &str = "https://api.tavily.com";

pub struct TavilyClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    affinity: DomainAffinity,
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    max_results: usize,
    search_depth: &'static str,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    include_domains: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    exclude_domains: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: f64,
    published_date: Option<String>,
    #[serde(flatten)]
    extra: ProviderMetadata,
}

impl TavilyClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http::build_client(config.timeout(), http::API_USER_AGENT)?,
            api_key: config.api_key.clone(),
            base_url: config.endpoint(DEFAULT_BASE_URL),
            affinity: config.affinity.clone(),
        })
    }

    fn build_request(query: &SearchQuery) -> TavilyRequest<'_> {
        let range = query.date_range();
        TavilyRequest {
            query: query.text(),
            max_results: query.num_results(),
            search_depth: match query.search_type() {
                SearchType::Neural => "advanced",
                SearchType::Auto | SearchType::Keyword => "basic",
            },
            include_domains: query.include_domains(),
            exclude_domains: query.exclude_domains(),
            start_date: range.and_then(|r| r.start).map(|d| d.format("%Y-%m-%d").to_string()),
            end_date: range.and_then(|r| r.end).map(|d| d.format("%Y-%m-%d").to_string()),
        }
    }
}

#[async_trait]
impl ProviderClient for TavilyClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Tavily
    }

    fn affinity(&self) -> &DomainAffinity {
        &self.affinity
    }

    async fn search(&self, query: &SearchQuery) -> Result<ProviderSearchOutput, ProviderError> {
        let api_key = super::require_key(self.kind(), self.api_key.as_deref())?;
        let request = self
            .client
            .post(format!("{}/search", self.base_url))
            .bearer_auth(api_key)
            .json(&Self::build_request(query));
        let response: TavilyResponse = http::send_json(self.kind(), request).await?;

        let completion: String = response
            .results
            .iter()
            .flat_map(|r| [r.title.as_str(), r.content.as_str()])
            .collect();
        let results = response
            .results
            .into_iter()
            .take(query.num_results())
            .map(|item| SearchResult {
                title: item.title,
                url: item.url,
                content: item.content,
                provider: ProviderKind::Tavily,
                score: item.score,
                published_date: super::non_empty(item.published_date),
                author: None,
                provider_metadata: item.extra,
            })
            .collect();

        Ok(ProviderSearchOutput {
            usage: UsageRecord::approximate(query.text(), &completion),
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DateRange;
    use chrono::NaiveDate;

    #[test]
    fn neural_maps_to_advanced_depth() {
        let query = SearchQuery::new("q").with_search_type(SearchType::Neural);
        assert_eq!(TavilyClient::build_request(&query).search_depth, "advanced");
        let query = SearchQuery::new("q").with_search_type(SearchType::Keyword);
        assert_eq!(TavilyClient::build_request(&query).search_depth, "basic");
    }

    #[test]
    fn request_serialises_filters_and_dates() {
        let query = SearchQuery::new("rust")
            .with_num_results(5)
            .with_include_domains(vec!["docs.rs".into()])
            .with_date_range(DateRange {
                start: NaiveDate::from_ymd_opt(2024, 3, 1),
                end: None,
            });
        let json = serde_json::to_value(TavilyClient::build_request(&query)).expect("serialize");
        assert_eq!(json["query"], "rust");
        assert_eq!(json["max_results"], 5);
        assert_eq!(json["include_domains"][0], "docs.rs");
        assert_eq!(json["start_date"], "2024-03-01");
        assert!(json.get("exclude_domains").is_none());
        assert!(json.get("end_date").is_none());
    }
}
