//! URL canonicalisation used as the deduplication identity.
//!
//! Two results refer to the same page when their canonical forms are equal.
//! The rule, applied in order:
//!
//! 1. Parse with [`url::Url`]; input that does not parse is compared verbatim.
//! 2. Lower-case scheme and host (the parser already does this).
//! 3. Upgrade `http` to `https`.
//! 4. Drop the default port and the fragment.
//! 5. Drop tracking parameters: every `utm_*` key plus [`TRACKING_PARAMS`].
//! 6. Sort the remaining query pairs by key, then value.
//! 7. Strip one trailing slash from any path other than `/`.

use url::Url;

/// Tracking-only query keys, matched case-insensitively.
pub const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "msclkid", "mc_cid", "mc_eid", "ref", "ref_src", "si", "feature", "igshid",
    "spm",
];

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Canonical form of `raw`.
///
/// ```
/// use quarry_engine::aggregator::url_normalize::normalize_url;
///
/// let a = normalize_url("http://Example.COM/path/?b=2&a=1&utm_source=x#top");
/// let b = normalize_url("https://example.com/path?a=1&b=2");
/// assert_eq!(a, b);
/// ```
pub fn normalize_url(raw: &str) -> String {
    let Ok(mut parsed) = Url::parse(raw.trim()) else {
        return raw.to_owned();
    };
    if parsed.cannot_be_a_base() {
        return parsed.to_string();
    }

    if parsed.scheme() == "http" {
        let _ = parsed.set_scheme("https");
    }
    if parsed.port() == Some(443) && parsed.scheme() == "https" {
        let _ = parsed.set_port(None);
    }
    parsed.set_fragment(None);

    let mut params: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort();
    if params.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(&params);
    }

    let path = parsed.path().to_owned();
    if path.len() > 1 && path.ends_with('/') {
        parsed.set_path(&path[..path.len() - 1]);
    }

    parsed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_scheme_and_host() {
        assert_eq!(
            normalize_url("HTTPS://Example.COM/Path"),
            "https://example.com/Path"
        );
    }

    #[test]
    fn upgrades_http() {
        assert_eq!(normalize_url("http://example.com/a"), "https://example.com/a");
    }

    #[test]
    fn removes_default_ports() {
        assert_eq!(normalize_url("http://example.com:80/a"), "https://example.com/a");
        assert_eq!(normalize_url("https://example.com:443/a"), "https://example.com/a");
        assert_eq!(normalize_url("http://example.com:443/a"), "https://example.com/a");
        assert_eq!(
            normalize_url("https://example.com:8080/a"),
            "https://example.com:8080/a"
        );
    }

    #[test]
    fn trailing_slash_handling() {
        assert_eq!(normalize_url("https://example.com/path/"), "https://example.com/path");
        assert_eq!(normalize_url("https://example.com/"), "https://example.com/");
        assert_eq!(normalize_url("https://example.com"), "https://example.com/");
    }

    #[test]
    fn strips_tracking_params() {
        let url = "https://example.com/p?q=rust&utm_source=a&UTM_Medium=b&utm_id=c&fbclid=d\
                   &gclid=e&msclkid=f&mc_cid=g&mc_eid=h&ref=i&ref_src=j&si=k&feature=l&igshid=m&spm=n";
        assert_eq!(normalize_url(url), "https://example.com/p?q=rust");
    }

    #[test]
    fn sorts_remaining_params() {
        assert_eq!(
            normalize_url("https://example.com/s?z=1&a=2&m=3&a=1"),
            "https://example.com/s?a=1&a=2&m=3&z=1"
        );
    }

    #[test]
    fn removes_fragment() {
        assert_eq!(normalize_url("https://example.com/page#section"), "https://example.com/page");
    }

    #[test]
    fn unparseable_input_is_verbatim() {
        assert_eq!(normalize_url("not a url"), "not a url");
        assert_eq!(normalize_url(""), "");
    }

    #[test]
    fn path_case_is_preserved() {
        assert_ne!(
            normalize_url("https://example.com/Page"),
            normalize_url("https://example.com/page")
        );
    }
}
