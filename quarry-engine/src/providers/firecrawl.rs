//! Firecrawl scrape API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{DomainAffinity, ProviderConfig};
use crate::error::ProviderError;
use crate::http;
use crate::provider::{ProviderClient, ProviderScrapeOutput};
use crate::types::{OutputFormat, ProviderKind, ProviderMetadata};
use crate::usage::UsageRecord;

const DEFAULT_BASE_URL: &str = "https://api.firecrawl.dev";

pub struct FirecrawlClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    affinity: DomainAffinity,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeBody<'a> {
    url: &'a str,
    formats: [&'static str; 1],
    only_main_content: bool,
}

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    #[serde(default)]
    success: bool,
    data: Option<ScrapeData>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScrapeData {
    markdown: Option<String>,
    html: Option<String>,
    #[serde(default)]
    metadata: ProviderMetadata,
}

impl FirecrawlClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http::build_client(config.timeout(), http::API_USER_AGENT)?,
            api_key: config.api_key.clone(),
            base_url: config.endpoint(DEFAULT_BASE_URL),
            affinity: config.affinity.clone(),
        })
    }
}

/// Firecrawl has no plain-text format; text requests get markdown.
fn wire_format(format: OutputFormat) -> (&'static str, OutputFormat) {
    match format {
        OutputFormat::Html => ("html", OutputFormat::Html),
        OutputFormat::Markdown | OutputFormat::Text => ("markdown", OutputFormat::Markdown),
    }
}

#[async_trait]
impl ProviderClient for FirecrawlClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Firecrawl
    }

    fn affinity(&self) -> &DomainAffinity {
        &self.affinity
    }

    async fn scrape(
        &self,
        url: &str,
        format: OutputFormat,
    ) -> Result<ProviderScrapeOutput, ProviderError> {
        let api_key = super::require_key(self.kind(), self.api_key.as_deref())?;
        let (wire, produced) = wire_format(format);
        let request = self
            .client
            .post(format!("{}/v1/scrape", self.base_url))
            .bearer_auth(api_key)
            .json(&ScrapeBody {
                url,
                formats: [wire],
                only_main_content: true,
            });
        let response: ScrapeResponse = http::send_json(self.kind(), request).await?;

        if !response.success {
            let reason = response.error.unwrap_or_else(|| "scrape unsuccessful".into());
            return Err(ProviderError::PermanentUpstream(format!("firecrawl: {reason}")));
        }
        let data = response
            .data
            .ok_or_else(|| ProviderError::Parse("firecrawl: response has no data".into()))?;
        let content = match produced {
            OutputFormat::Html => data.html,
            _ => data.markdown,
        }
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ProviderError::Parse(format!("firecrawl: no {wire} content for {url}")))?;

        let title = data
            .metadata
            .get("title")
            .and_then(|v| v.as_str())
            .map(str::to_owned);

        Ok(ProviderScrapeOutput {
            usage: UsageRecord::approximate(url, &content),
            content,
            format: produced,
            title,
            metadata: data.metadata,
        })
    }
}
