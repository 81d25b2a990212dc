//! Jina search (`s.jina.ai`) and reader (`r.jina.ai`).
//!
//! Both endpoints report token usage, so Jina is the one backend whose
//! usage records are `native`.

use async_trait::async_trait;
use serde::Deserialize;

use crate::aggregator::scoring::position_score;
use crate::config::{DomainAffinity, ProviderConfig};
use crate::error::ProviderError;
use crate::http;
use crate::provider::{ProviderClient, ProviderScrapeOutput, ProviderSearchOutput};
use crate::types::{OutputFormat, ProviderKind, ProviderMetadata, SearchQuery, SearchResult};
use crate::usage::{estimate_tokens, UsageRecord};

const DEFAULT_SEARCH_URL: &str = "https://s.jina.ai";
const DEFAULT_READER_URL: &str = "https://r.jina.ai";

pub struct JinaClient {
    client: reqwest::Client,
    api_key: Option<String>,
    search_url: String,
    reader_url: String,
    affinity: DomainAffinity,
}

#[derive(Debug, Deserialize)]
struct JinaEnvelope<T> {
    data: T,
    #[serde(default)]
    meta: Option<JinaMeta>,
}

#[derive(Debug, Deserialize)]
struct JinaMeta {
    usage: Option<JinaUsage>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct JinaUsage {
    #[serde(default)]
    tokens: u64,
}

#[derive(Debug, Deserialize)]
struct JinaDocument {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    content: String,
    usage: Option<JinaUsage>,
    #[serde(flatten)]
    extra: ProviderMetadata,
}

impl JinaClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http::build_client(config.timeout(), http::API_USER_AGENT)?,
            api_key: config.api_key.clone(),
            search_url: config.endpoint(DEFAULT_SEARCH_URL),
            reader_url: config.endpoint(DEFAULT_READER_URL),
            affinity: config.affinity.clone(),
        })
    }
}

/// Tokens reported for the whole call, else the per-document sum.
fn reported_tokens(meta: Option<&JinaMeta>, documents: &[&JinaDocument]) -> Option<u64> {
    meta.and_then(|m| m.usage).map(|u| u.tokens).or_else(|| {
        let per_doc: Vec<u64> = documents
            .iter()
            .filter_map(|d| d.usage.map(|u| u.tokens))
            .collect();
        (!per_doc.is_empty()).then(|| per_doc.iter().sum())
    })
}

#[async_trait]
impl ProviderClient for JinaClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Jina
    }

    fn affinity(&self) -> &DomainAffinity {
        &self.affinity
    }

    async fn search(&self, query: &SearchQuery) -> Result<ProviderSearchOutput, ProviderError> {
        let api_key = super::require_key(self.kind(), self.api_key.as_deref())?;
        let request = self
            .client
            .get(format!("{}/", self.search_url))
            .query(&[("q", query.text())])
            .bearer_auth(api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .header("X-Respond-With", "no-content");
        let envelope: JinaEnvelope<Vec<JinaDocument>> =
            http::send_json(self.kind(), request).await?;

        let documents: Vec<&JinaDocument> = envelope.data.iter().collect();
        let usage = match reported_tokens(envelope.meta.as_ref(), &documents) {
            Some(tokens) => UsageRecord::native(estimate_tokens(query.text()), tokens),
            None => {
                let text: String = documents
                    .iter()
                    .flat_map(|d| [d.title.as_str(), d.description.as_str()])
                    .collect();
                UsageRecord::approximate(query.text(), &text)
            }
        };

        let results: Vec<SearchResult> = envelope
            .data
            .into_iter()
            .filter(|d| !d.url.is_empty())
            .enumerate()
            .map(|(position, doc)| SearchResult {
                title: doc.title,
                url: doc.url,
                content: if doc.description.is_empty() {
                    doc.content
                } else {
                    doc.description
                },
                provider: ProviderKind::Jina,
                score: position_score(position),
                published_date: doc
                    .extra
                    .get("date")
                    .and_then(|v| v.as_str())
                    .map(str::to_owned),
                author: None,
                provider_metadata: doc.extra,
            })
            .collect();

        let mut results =
            super::filter_domains(results, query.include_domains(), query.exclude_domains());
        results.truncate(query.num_results());
        Ok(ProviderSearchOutput { results, usage })
    }

    async fn scrape(
        &self,
        url: &str,
        format: OutputFormat,
    ) -> Result<ProviderScrapeOutput, ProviderError> {
        let api_key = super::require_key(self.kind(), self.api_key.as_deref())?;
        let request = self
            .client
            .get(format!("{}/{url}", self.reader_url))
            .bearer_auth(api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .header("X-Return-Format", format.name());
        let envelope: JinaEnvelope<JinaDocument> = http::send_json(self.kind(), request).await?;

        let doc = envelope.data;
        if doc.content.trim().is_empty() {
            return Err(ProviderError::Parse(format!("jina: reader returned no content for {url}")));
        }
        let usage = match reported_tokens(envelope.meta.as_ref(), &[&doc]) {
            Some(tokens) => UsageRecord::native(0, tokens),
            None => UsageRecord::approximate(url, &doc.content),
        };
        let mut metadata = doc.extra;
        if !doc.description.is_empty() {
            metadata.insert("description".into(), doc.description.into());
        }

        Ok(ProviderScrapeOutput {
            content: doc.content,
            format,
            title: super::non_empty(Some(doc.title)),
            metadata,
            usage,
        })
    }
}
