//! Plain HTTP fetch with local content extraction. Needs no credential and
//! serves as the generic last-resort scraper.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};

use crate::config::{DomainAffinity, ProviderConfig};
use crate::content;
use crate::error::ProviderError;
use crate::http;
use crate::provider::{ProviderClient, ProviderScrapeOutput};
use crate::types::{OutputFormat, ProviderKind, ProviderMetadata};
use crate::usage::UsageRecord;

pub struct DirectClient {
    client: reqwest::Client,
    affinity: DomainAffinity,
    max_chars: usize,
}

impl DirectClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http::build_client(config.timeout(), http::random_user_agent())?,
            affinity: config.affinity.clone(),
            max_chars: content::DEFAULT_MAX_CHARS,
        })
    }
}

#[async_trait]
impl ProviderClient for DirectClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Direct
    }

    fn affinity(&self) -> &DomainAffinity {
        &self.affinity
    }

    async fn scrape(
        &self,
        url: &str,
        format: OutputFormat,
    ) -> Result<ProviderScrapeOutput, ProviderError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "text/html,application/xhtml+xml,text/plain;q=0.9,*/*;q=0.8")
            .send()
            .await
            .map_err(|e| http::transport_error(self.kind(), e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| http::transport_error(self.kind(), e))?;
        http::classify(self.kind(), status, &headers, &body)?;

        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let mut metadata = ProviderMetadata::new();
        metadata.insert("status_code".into(), status.as_u16().into());
        if final_url != url {
            metadata.insert("final_url".into(), final_url.into());
        }
        if !content_type.is_empty() {
            metadata.insert("content_type".into(), content_type.clone().into());
        }

        let (content, produced, title) = if content_type.contains("html") || content_type.is_empty() {
            let page = content::extract(&body, format, self.max_chars)?;
            (page.content, format, page.title)
        } else if content_type.starts_with("text/") {
            let text = content::truncate_to_limit(body.trim(), self.max_chars);
            if text.is_empty() {
                return Err(ProviderError::Parse(format!("direct: empty body from {url}")));
            }
            (text, OutputFormat::Text, None)
        } else {
            return Err(ProviderError::Unsupported(format!(
                "direct: cannot extract content of type '{content_type}'"
            )));
        };

        Ok(ProviderScrapeOutput {
            usage: UsageRecord::approximate(url, &content),
            content,
            format: produced,
            title,
            metadata,
        })
    }
}
