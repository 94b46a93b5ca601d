//! Fixed request shape of the catalog web front-end
//!
//! These values are not secrets. They make session traffic look like the
//! browser client the API expects; the CSRF token and bearer tokens are
//! supplied at runtime.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// Browser headers sent on every session request
pub const DEFAULT_HEADERS: &[(&str, &str)] = &[
    (
        "user-agent",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_14_1) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/70.0.3538.110 Safari/537.36",
    ),
    ("accept", "*/*"),
    ("accept-language", "en-US,en;q=0.9"),
    ("origin", "https://udaan.com"),
    ("authority", "api.udaan.com"),
    ("scheme", "https"),
    ("upgrade-insecure-requests", "1"),
];

/// Body of the token request
pub const AUTH_BODY: &str = "u=-1";

/// Content type of the token request
pub const AUTH_CONTENT_TYPE: &str = "text/plain;charset=UTF-8";

/// Header carrying the CSRF token on the token request
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Token type assumed when the auth response omits `token_type`
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Catalog root listing; also the referer path for token requests
pub const MARKET_ROOT_PATH: &str = "/market/v1";

/// Build the default browser header map.
pub fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(DEFAULT_HEADERS.len());
    for &(name, value) in DEFAULT_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    headers
}
