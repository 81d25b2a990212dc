//! Reddit threads through the public `.json` listing endpoint.
//!
//! Bound to reddit domains by default; the thread's post and its
//! highest-scored top-level comments are rendered as markdown.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::config::{DomainAffinity, ProviderConfig};
use crate::error::ProviderError;
use crate::http;
use crate::provider::{ProviderClient, ProviderScrapeOutput};
use crate::types::{OutputFormat, ProviderKind, ProviderMetadata};
use crate::usage::UsageRecord;

const DEFAULT_BASE_URL: &str = "https://www.reddit.com";

/// Top-level comments kept in the rendering.
const MAX_COMMENTS: usize = 20;

pub struct RedditClient {
    client: reqwest::Client,
    base_url: String,
    affinity: DomainAffinity,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    kind: String,
    data: ThingData,
}

#[derive(Debug, Default, Deserialize)]
struct ThingData {
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    subreddit: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: u64,
    #[serde(default)]
    url: String,
    #[serde(default)]
    is_self: bool,
    created_utc: Option<f64>,
}

impl RedditClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http::build_client(config.timeout(), http::API_USER_AGENT)?,
            base_url: config.endpoint(DEFAULT_BASE_URL),
            affinity: config.affinity.clone(),
        })
    }

    /// The `.json` listing URL for a thread URL, rooted at `base_url`.
    ///
    /// `redd.it/<id>` short links become `/comments/<id>.json`.
    fn listing_url(&self, thread_url: &str) -> Result<String, ProviderError> {
        let parsed = Url::parse(thread_url)
            .map_err(|e| ProviderError::Config(format!("reddit: invalid url '{thread_url}': {e}")))?;
        let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
        let path = parsed.path().trim_end_matches('/');

        let path = if host == "redd.it" || host.ends_with(".redd.it") {
            let id = path.trim_start_matches('/');
            if id.is_empty() {
                return Err(ProviderError::Config(format!(
                    "reddit: short link '{thread_url}' has no post id"
                )));
            }
            format!("/comments/{id}")
        } else {
            path.trim_end_matches(".json").to_owned()
        };
        if !path.contains("/comments/") {
            return Err(ProviderError::Unsupported(format!(
                "reddit: '{thread_url}' is not a thread url"
            )));
        }
        Ok(format!("{}{path}.json", self.base_url))
    }
}

fn render(post: &ThingData, comments: &[&ThingData], markdown: bool) -> String {
    let mut out = String::new();
    if markdown {
        out.push_str(&format!("# {}\n\n", post.title));
        out.push_str(&format!(
            "*r/{} · u/{} · {} points · {} comments*\n\n",
            post.subreddit, post.author, post.score, post.num_comments
        ));
    } else {
        out.push_str(&format!("{}\n\n", post.title));
        out.push_str(&format!(
            "r/{} | u/{} | {} points | {} comments\n\n",
            post.subreddit, post.author, post.score, post.num_comments
        ));
    }

    if !post.selftext.trim().is_empty() {
        out.push_str(post.selftext.trim());
        out.push_str("\n\n");
    } else if !post.is_self && !post.url.is_empty() {
        out.push_str(&if markdown {
            format!("[{}]({})\n\n", post.url, post.url)
        } else {
            format!("{}\n\n", post.url)
        });
    }

    if comments.is_empty() {
        return out.trim_end().to_owned();
    }
    out.push_str(if markdown { "## Top comments\n\n" } else { "Top comments\n\n" });
    for comment in comments {
        let body = comment.body.trim().replace('\n', "\n  ");
        if markdown {
            out.push_str(&format!("- **u/{}** ({}): {body}\n", comment.author, comment.score));
        } else {
            out.push_str(&format!("- u/{} ({}): {body}\n", comment.author, comment.score));
        }
    }
    out.trim_end().to_owned()
}

fn is_removed(text: &str) -> bool {
    matches!(text.trim(), "" | "[deleted]" | "[removed]")
}

#[async_trait]
impl ProviderClient for RedditClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Reddit
    }

    fn affinity(&self) -> &DomainAffinity {
        &self.affinity
    }

    async fn scrape(
        &self,
        url: &str,
        format: OutputFormat,
    ) -> Result<ProviderScrapeOutput, ProviderError> {
        let listing_url = self.listing_url(url)?;
        let request = self
            .client
            .get(&listing_url)
            .query(&[("raw_json", "1")]);
        let listings: Vec<Listing> = http::send_json(self.kind(), request).await?;

        let mut listings = listings.into_iter();
        let post = listings
            .next()
            .and_then(|l| l.data.children.into_iter().find(|t| t.kind == "t3"))
            .map(|t| t.data)
            .ok_or_else(|| ProviderError::Parse("reddit: listing has no post".into()))?;

        let comment_things: Vec<Thing> = listings
            .next()
            .map(|l| l.data.children)
            .unwrap_or_default();
        let mut comments: Vec<&ThingData> = comment_things
            .iter()
            .filter(|t| t.kind == "t1" && !is_removed(&t.data.body))
            .map(|t| &t.data)
            .collect();
        comments.sort_by(|a, b| b.score.cmp(&a.score));
        comments.truncate(MAX_COMMENTS);

        let (markdown, produced) = match format {
            OutputFormat::Text => (false, OutputFormat::Text),
            OutputFormat::Markdown | OutputFormat::Html => (true, OutputFormat::Markdown),
        };
        let content = render(&post, &comments, markdown);

        let mut metadata = ProviderMetadata::new();
        metadata.insert("subreddit".into(), post.subreddit.clone().into());
        metadata.insert("author".into(), post.author.clone().into());
        metadata.insert("score".into(), post.score.into());
        metadata.insert("num_comments".into(), post.num_comments.into());
        if let Some(created) = post.created_utc {
            metadata.insert("created_utc".into(), created.into());
        }

        Ok(ProviderScrapeOutput {
            usage: UsageRecord::approximate(url, &content),
            content,
            format: produced,
            title: Some(post.title).filter(|t| !t.is_empty()),
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> RedditClient {
        RedditClient::new(&ProviderConfig::new(ProviderKind::Reddit)).expect("client")
    }

    #[test]
    fn thread_url_maps_to_listing() {
        let client = client();
        assert_eq!(
            client
                .listing_url("https://www.reddit.com/r/rust/comments/abc123/some_title/")
                .expect("listing"),
            "https://www.reddit.com/r/rust/comments/abc123/some_title.json"
        );
        assert_eq!(
            client.listing_url("https://old.reddit.com/r/rust/comments/abc123").expect("listing"),
            "https://www.reddit.com/r/rust/comments/abc123.json"
        );
    }

    #[test]
    fn short_link_maps_to_comments() {
        assert_eq!(
            client().listing_url("https://redd.it/abc123").expect("listing"),
            "https://www.reddit.com/comments/abc123.json"
        );
    }

    #[test]
    fn subreddit_front_page_is_unsupported() {
        let err = client().listing_url("https://www.reddit.com/r/rust").unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED");
    }

    #[test]
    fn render_markdown_thread() {
        let post = ThingData {
            title: "Why Rust?".into(),
            selftext: "Asking for a friend.".into(),
            author: "ferris".into(),
            subreddit: "rust".into(),
            score: 42,
            num_comments: 2,
            is_self: true,
            ..Default::default()
        };
        let comment = ThingData {
            body: "Memory safety.\nAnd speed.".into(),
            author: "crab".into(),
            score: 10,
            ..Default::default()
        };
        let text = render(&post, &[&comment], true);
        assert!(text.starts_with("# Why Rust?\n\n"));
        assert!(text.contains("Asking for a friend."));
        assert!(text.contains("## Top comments"));
        assert!(text.contains("- **u/crab** (10): Memory safety.\n  And speed."));

        let plain = render(&post, &[], false);
        assert!(!plain.contains('#'));
        assert!(!plain.contains("Top comments"));
    }

    #[test]
    fn removed_comments_are_detected() {
        assert!(is_removed("[deleted]"));
        assert!(is_removed("  [removed] "));
        assert!(!is_removed("fine"));
    }
}
