//! Shared HTTP plumbing for provider clients.
//!
//! Builds per-provider [`reqwest::Client`]s and classifies every response
//! at the transport boundary, so providers only ever see a successful body
//! or a [`ProviderError`] with a short, markup-free message.

use std::time::Duration;

use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use crate::content;
use crate::error::ProviderError;
use crate::types::ProviderKind;

/// Browser User-Agent strings, rotated per client for credential-free scrapers.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
];

/// User-Agent sent to API providers.
pub const API_USER_AGENT: &str = concat!("quarry-engine/", env!("CARGO_PKG_VERSION"));

/// Longest upstream message kept in an error.
const MAX_ERROR_CHARS: usize = 200;

/// Bodies of gateway timeout pages that some CDNs serve with a 2xx status
/// in place of an API response.
const GATEWAY_TIMEOUT_SIGNATURES: &[&str] = &[
    "gateway time-out",
    "gateway timeout",
    "upstream request timeout",
    "error code: 524",
];

/// Build a client with the given request timeout and User-Agent.
///
/// # Errors
///
/// Returns [`ProviderError::Config`] if the client cannot be constructed.
pub fn build_client(timeout: Duration, user_agent: &str) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| ProviderError::Config(format!("failed to build HTTP client: {e}")))
}

/// Select a random browser User-Agent.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Send `request` and return the response headers and the body of a
/// successful response. Unsuccessful statuses are classified with
/// [`classify`].
async fn fetch(
    provider: ProviderKind,
    request: RequestBuilder,
) -> Result<(HeaderMap, String), ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(provider, e))?;
    let status = response.status();
    let headers = response.headers().clone();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(provider, e))?;

    classify(provider, status, &headers, &body)?;
    Ok((headers, body))
}

/// Send `request` to a JSON API and decode the body.
pub async fn send_json<T: DeserializeOwned>(
    provider: ProviderKind,
    request: RequestBuilder,
) -> Result<T, ProviderError> {
    let (headers, body) = fetch(provider, request).await?;
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    decode_api_body(provider, content_type, &body)
}

/// Decode the 2xx body of a JSON API call.
///
/// Some CDNs answer a timed-out API call with a gateway timeout page and a
/// 2xx status. A body that is not JSON but is such a page is
/// `TransientUpstream`; anything else that fails to decode is `Parse`.
pub fn decode_api_body<T: DeserializeOwned>(
    provider: ProviderKind,
    content_type: &str,
    body: &str,
) -> Result<T, ProviderError> {
    decode_json(provider, body).map_err(|err| {
        if looks_like_html(content_type, body) && is_gateway_timeout_page(body) {
            ProviderError::TransientUpstream(format!(
                "{provider}: gateway timeout page: {}",
                sanitize_body(content_type, body)
            ))
        } else {
            err
        }
    })
}

/// Decode a JSON body, mapping failures to [`ProviderError::Parse`].
pub fn decode_json<T: DeserializeOwned>(provider: ProviderKind, body: &str) -> Result<T, ProviderError> {
    serde_json::from_str(body)
        .map_err(|e| ProviderError::Parse(format!("{provider}: invalid response payload: {e}")))
}

/// Classify a response.
///
/// | status | error |
/// |--------|-------|
/// | 401, 403 | `Auth` |
/// | 429 | `RateLimited` with `Retry-After` |
/// | 408, 5xx | `TransientUpstream` |
/// | other 4xx | `PermanentUpstream` |
///
/// Every 2xx passes, whatever its body says.
pub fn classify(
    provider: ProviderKind,
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
) -> Result<(), ProviderError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if status.is_success() {
        return Ok(());
    }

    let code = status.as_u16();
    let message = format!("{provider}: HTTP {code}: {}", sanitize_body(content_type, body));
    Err(match code {
        401 | 403 => ProviderError::Auth(message),
        429 => ProviderError::RateLimited {
            message,
            retry_after: parse_retry_after(headers),
        },
        408 => ProviderError::TransientUpstream(message),
        _ if status.is_server_error() => ProviderError::TransientUpstream(message),
        _ => ProviderError::PermanentUpstream(message),
    })
}

/// Map a `reqwest` transport failure. The request URL is stripped since it
/// may carry credentials in its query.
pub fn transport_error(provider: ProviderKind, error: reqwest::Error) -> ProviderError {
    let error = error.without_url();
    if error.is_builder() {
        ProviderError::Config(format!("{provider}: invalid request: {error}"))
    } else if error.is_timeout() {
        ProviderError::TransientUpstream(format!("{provider}: request timed out"))
    } else if error.is_connect() {
        ProviderError::TransientUpstream(format!("{provider}: connection failed: {error}"))
    } else {
        ProviderError::TransientUpstream(format!("{provider}: transport error: {error}"))
    }
}

/// `Retry-After` as delta-seconds or an HTTP date.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = at.signed_duration_since(chrono::Utc::now());
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

/// Reduce an error body to a short human-readable message.
///
/// HTML pages collapse to their title and visible text; JSON bodies yield
/// their `error.message`, `message`, `error` or `detail` field.
pub fn sanitize_body(content_type: &str, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return "empty response body".to_owned();
    }

    let message = if looks_like_html(content_type, body) {
        content::html_to_text(body)
    } else if let Some(message) = json_error_message(body) {
        message
    } else {
        body.split_whitespace().collect::<Vec<_>>().join(" ")
    };

    match message.char_indices().nth(MAX_ERROR_CHARS) {
        Some((end, _)) => format!("{}...", &message[..end]),
        None => message,
    }
}

fn looks_like_html(content_type: &str, body: &str) -> bool {
    content_type.contains("html") || body.trim_start().starts_with('<')
}

fn is_gateway_timeout_page(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    GATEWAY_TIMEOUT_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

fn json_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let candidates = [
        value.pointer("/error/message"),
        value.get("message"),
        value.get("error"),
        value.get("detail"),
    ];
    let message = candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str().map(str::to_owned));
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(reqwest::header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_str(value).expect("header"));
        }
        map
    }

    #[test]
    fn random_user_agent_is_from_list() {
        let ua = random_user_agent();
        assert!(USER_AGENTS.contains(&ua));
    }

    #[test]
    fn build_client_succeeds() {
        assert!(build_client(Duration::from_secs(5), API_USER_AGENT).is_ok());
    }

    #[test]
    fn classify_status_table() {
        let h = HeaderMap::new();
        let code = |status: u16| {
            classify(
                ProviderKind::Serper,
                StatusCode::from_u16(status).expect("status"),
                &h,
                "{}",
            )
            .unwrap_err()
            .code()
        };
        assert_eq!(code(401), "AUTH_FAILED");
        assert_eq!(code(403), "AUTH_FAILED");
        assert_eq!(code(429), "RATE_LIMITED");
        assert_eq!(code(408), "UPSTREAM_TRANSIENT");
        assert_eq!(code(500), "UPSTREAM_TRANSIENT");
        assert_eq!(code(503), "UPSTREAM_TRANSIENT");
        assert_eq!(code(524), "UPSTREAM_TRANSIENT");
        assert_eq!(code(400), "UPSTREAM_PERMANENT");
        assert_eq!(code(404), "UPSTREAM_PERMANENT");
        assert!(classify(ProviderKind::Serper, StatusCode::OK, &h, "{}").is_ok());
    }

    #[test]
    fn rate_limit_reads_retry_after_seconds() {
        let h = headers(&[(RETRY_AFTER, "7")]);
        match classify(ProviderKind::Exa, StatusCode::TOO_MANY_REQUESTS, &h, "") {
            Err(ProviderError::RateLimited { retry_after, .. }) => {
                assert_eq!(retry_after, Some(Duration::from_secs(7)));
            }
            other => unreachable!("expected rate limit, got {other:?}"),
        }
    }

    #[test]
    fn retry_after_in_the_past_is_zero() {
        let h = headers(&[(RETRY_AFTER, "Wed, 21 Oct 2015 07:28:00 GMT")]);
        assert_eq!(parse_retry_after(&h), Some(Duration::ZERO));
    }

    #[test]
    fn html_error_body_is_sanitised() {
        let h = headers(&[(CONTENT_TYPE, "text/html; charset=utf-8")]);
        let body = "<html><head><title>502 Bad Gateway</title></head>\
                    <body><h1>502 Bad Gateway</h1><script>track()</script></body></html>";
        let err = classify(ProviderKind::Tavily, StatusCode::BAD_GATEWAY, &h, body).unwrap_err();
        let message = err.to_string();
        assert_eq!(message, "[UPSTREAM_TRANSIENT] tavily: HTTP 502: 502 Bad Gateway");
        assert!(!message.contains('<'));
    }

    #[test]
    fn gateway_timeout_page_from_api_is_transient() {
        let body = "<html><body><h1>504 Gateway Time-out</h1></body></html>";
        let err = decode_api_body::<serde_json::Value>(ProviderKind::Jina, "text/html", body)
            .unwrap_err();
        assert_eq!(err.code(), "UPSTREAM_TRANSIENT");
        assert!(err.is_retryable());

        let cloudflare = "<html><body>error code: 524</body></html>";
        let err = decode_api_body::<serde_json::Value>(ProviderKind::Jina, "", cloudflare)
            .unwrap_err();
        assert_eq!(err.code(), "UPSTREAM_TRANSIENT");
    }

    #[test]
    fn other_undecodable_api_bodies_are_parse_errors() {
        let body = "<html><body><p>Maintenance</p></body></html>";
        let err = decode_api_body::<serde_json::Value>(ProviderKind::Exa, "text/html", body)
            .unwrap_err();
        assert_eq!(err.code(), "PARSE_FAILED");
    }

    #[test]
    fn json_mentioning_gateway_timeout_decodes() {
        let body = r#"{"title":"504 Gateway Timeout explained"}"#;
        let value: serde_json::Value =
            decode_api_body(ProviderKind::Serper, "application/json", body).expect("decode");
        assert_eq!(value["title"], "504 Gateway Timeout explained");
    }

    #[test]
    fn success_status_passes_whatever_the_body() {
        let h = headers(&[(CONTENT_TYPE, "text/html")]);
        let body = "<html><body><article><h1>504 Gateway Timeout</h1></article></body></html>";
        assert!(classify(ProviderKind::Direct, StatusCode::OK, &h, body).is_ok());
    }

    #[test]
    fn ordinary_html_success_passes() {
        let h = headers(&[(CONTENT_TYPE, "text/html")]);
        let body = "<html><body><p>Welcome</p></body></html>";
        assert!(classify(ProviderKind::Direct, StatusCode::OK, &h, body).is_ok());
    }

    #[test]
    fn json_error_message_is_extracted() {
        let body = r#"{"error":{"message":"Invalid API key"}}"#;
        assert_eq!(sanitize_body("application/json", body), "Invalid API key");
        assert_eq!(sanitize_body("application/json", r#"{"detail":"bad query"}"#), "bad query");
        assert_eq!(sanitize_body("application/json", r#"{"error":"nope"}"#), "nope");
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(1_000);
        let message = sanitize_body("text/plain", &body);
        assert!(message.len() <= MAX_ERROR_CHARS + 3);
        assert!(message.ends_with("..."));
    }

    #[test]
    fn empty_body_has_placeholder() {
        assert_eq!(sanitize_body("", "  "), "empty response body");
    }
}
