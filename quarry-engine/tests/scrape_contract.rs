//! Scrape Provider Contract Tests
//!
//! These tests verify each scrape backend against a local mock server:
//! - Request format (path, auth, requested output format)
//! - Content, title and metadata mapping
//! - Failure payloads mapped to the right error class

#![allow(clippy::unwrap_used, clippy::expect_used)]

use quarry_engine::providers::{DirectClient, FirecrawlClient, JinaClient, RedditClient};
use quarry_engine::{CountingMethod, OutputFormat, ProviderClient, ProviderConfig, ProviderKind};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn keyed(kind: ProviderKind, server: &MockServer) -> ProviderConfig {
    ProviderConfig::new(kind)
        .with_api_key("test-key")
        .with_base_url(server.uri())
        .with_timeout_secs(5)
}

// ────────────────────────────────────────────────────────────────────────────
// Firecrawl
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_firecrawl_request_format() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/scrape"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "url": "https://example.com/post",
            "formats": ["markdown"],
            "onlyMainContent": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "markdown": "# Post\n\nHello from the post.",
                "metadata": {"title": "Post", "sourceURL": "https://example.com/post", "statusCode": 200}
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = FirecrawlClient::new(&keyed(ProviderKind::Firecrawl, &server)).unwrap();
    let output = client
        .scrape("https://example.com/post", OutputFormat::Text)
        .await
        .unwrap();

    assert_eq!(output.format, OutputFormat::Markdown);
    assert!(output.content.contains("Hello from the post."));
    assert_eq!(output.title.as_deref(), Some("Post"));
    assert_eq!(output.metadata["statusCode"], 200);
    assert_eq!(output.usage.counting_method, CountingMethod::Approximate);
}

#[tokio::test]
async fn test_firecrawl_unsuccessful_payload_is_permanent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/scrape"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "error": "This website is no longer supported"
        })))
        .mount(&server)
        .await;

    let client = FirecrawlClient::new(&keyed(ProviderKind::Firecrawl, &server)).unwrap();
    let err = client
        .scrape("https://example.com", OutputFormat::Markdown)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "UPSTREAM_PERMANENT");
    assert_eq!(err.message(), "firecrawl: This website is no longer supported");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_firecrawl_503_is_transient() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/scrape"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount(&server)
        .await;

    let client = FirecrawlClient::new(&keyed(ProviderKind::Firecrawl, &server)).unwrap();
    let err = client
        .scrape("https://example.com", OutputFormat::Markdown)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "UPSTREAM_TRANSIENT");
    assert_eq!(err.message(), "firecrawl: HTTP 503: Service Unavailable");
}

// ────────────────────────────────────────────────────────────────────────────
// Jina reader
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_jina_reader_request_format() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/https:/+example\.com/guide$"))
        .and(header("Authorization", "Bearer test-key"))
        .and(header("X-Return-Format", "markdown"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "data": {
                "title": "Guide",
                "url": "https://example.com/guide",
                "description": "A guide",
                "content": "# Guide\n\nStep one.",
                "usage": {"tokens": 42}
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = JinaClient::new(&keyed(ProviderKind::Jina, &server)).unwrap();
    let output = client
        .scrape("https://example.com/guide", OutputFormat::Markdown)
        .await
        .unwrap();

    assert_eq!(output.title.as_deref(), Some("Guide"));
    assert!(output.content.contains("Step one."));
    assert_eq!(output.metadata["description"], "A guide");
    assert_eq!(output.usage.counting_method, CountingMethod::Native);
    assert_eq!(output.usage.completion_tokens, 42);
}

// ────────────────────────────────────────────────────────────────────────────
// Direct
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_direct_extracts_main_content() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<html><head><title>Ferris Weekly</title><script>track()</script></head>
               <body><nav>Home | About</nav>
               <article><h2>Issue 1</h2><p>Ferris learns <strong>async</strong>.</p></article>
               <footer>Copyright</footer></body></html>"#,
            "text/html; charset=utf-8",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let client = DirectClient::new(&ProviderConfig::new(ProviderKind::Direct)).unwrap();
    let url = format!("{}/article", server.uri());
    let output = client.scrape(&url, OutputFormat::Markdown).await.unwrap();

    assert_eq!(output.title.as_deref(), Some("Ferris Weekly"));
    assert!(output.content.contains("## Issue 1"));
    assert!(output.content.contains("**async**"));
    assert!(!output.content.contains("track()"));
    assert!(!output.content.contains("Copyright"));
    assert_eq!(output.metadata["status_code"], 200);
}

#[tokio::test]
async fn test_direct_article_about_gateway_timeouts_is_content() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/docs/504"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<html><head><title>504 Gateway Timeout</title></head><body>\
             <article><h1>504 Gateway Timeout</h1>\
             <p>The HyperText Transfer Protocol 504 Gateway Timeout server error \
             response status code indicates that the server did not get a response \
             in time from the upstream server.</p></article></body></html>",
            "text/html",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let client = DirectClient::new(&ProviderConfig::new(ProviderKind::Direct)).unwrap();
    let output = client
        .scrape(&format!("{}/docs/504", server.uri()), OutputFormat::Markdown)
        .await
        .unwrap();

    assert_eq!(output.title.as_deref(), Some("504 Gateway Timeout"));
    assert!(output.content.contains("did not get a response"));
    assert_eq!(output.metadata["status_code"], 200);
}

#[tokio::test]
async fn test_direct_plain_text_passthrough() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("User-agent: *\nDisallow:", "text/plain"),
        )
        .mount(&server)
        .await;

    let client = DirectClient::new(&ProviderConfig::new(ProviderKind::Direct)).unwrap();
    let output = client
        .scrape(&format!("{}/robots.txt", server.uri()), OutputFormat::Markdown)
        .await
        .unwrap();
    assert_eq!(output.format, OutputFormat::Text);
    assert_eq!(output.content, "User-agent: *\nDisallow:");
}

#[tokio::test]
async fn test_direct_binary_is_unsupported() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/file.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("%PDF-1.7", "application/pdf"))
        .mount(&server)
        .await;

    let client = DirectClient::new(&ProviderConfig::new(ProviderKind::Direct)).unwrap();
    let err = client
        .scrape(&format!("{}/file.pdf", server.uri()), OutputFormat::Markdown)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "UNSUPPORTED");
}

#[tokio::test]
async fn test_direct_404_is_permanent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_raw(
            "<html><head><title>Not Found</title></head><body><h1>Not Found</h1></body></html>",
            "text/html",
        ))
        .mount(&server)
        .await;

    let client = DirectClient::new(&ProviderConfig::new(ProviderKind::Direct)).unwrap();
    let err = client
        .scrape(&format!("{}/missing", server.uri()), OutputFormat::Markdown)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "UPSTREAM_PERMANENT");
    assert_eq!(err.message(), "direct: HTTP 404: Not Found");
}

// ────────────────────────────────────────────────────────────────────────────
// Reddit
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_reddit_thread_is_rendered() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/r/rust/comments/abc123/why_rust.json"))
        .and(query_param("raw_json", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"kind": "Listing", "data": {"children": [
                {"kind": "t3", "data": {
                    "title": "Why Rust?", "selftext": "Convince me.", "author": "ferris",
                    "subreddit": "rust", "score": 120, "num_comments": 3, "is_self": true,
                    "created_utc": 1700000000.0
                }}
            ]}},
            {"kind": "Listing", "data": {"children": [
                {"kind": "t1", "data": {"body": "Fearless concurrency.", "author": "a", "score": 5}},
                {"kind": "t1", "data": {"body": "[deleted]", "author": "[deleted]", "score": 50}},
                {"kind": "t1", "data": {"body": "Cargo.", "author": "b", "score": 9}},
                {"kind": "more", "data": {}}
            ]}}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let config = ProviderConfig::new(ProviderKind::Reddit)
        .with_base_url(server.uri())
        .with_timeout_secs(5);
    let client = RedditClient::new(&config).unwrap();
    let output = client
        .scrape(
            "https://www.reddit.com/r/rust/comments/abc123/why_rust/",
            OutputFormat::Markdown,
        )
        .await
        .unwrap();

    assert_eq!(output.title.as_deref(), Some("Why Rust?"));
    assert!(output.content.starts_with("# Why Rust?"));
    assert!(output.content.contains("Convince me."));
    let cargo = output.content.find("Cargo.").unwrap();
    let fearless = output.content.find("Fearless concurrency.").unwrap();
    assert!(cargo < fearless, "comments are ordered by score");
    assert!(!output.content.contains("[deleted]"));
    assert_eq!(output.metadata["subreddit"], "rust");
    assert_eq!(output.metadata["num_comments"], 3);
}
