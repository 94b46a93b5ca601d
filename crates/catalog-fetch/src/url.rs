//! Listing and referer URL construction
//!
//! Catalog nodes carry front-end paths such as `/market/fresh-fruits`. The
//! API serves the same listing under a `/v1` segment right after the
//! 7-byte `/market` prefix, paginated by a `start_value` query parameter.

use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use tracing::warn;

/// Byte offset where the API version segment belongs.
const VERSION_OFFSET: usize = 7;
const VERSION_SEGMENT: &str = "/v1";
const START_PARAM: &str = "start_value";

/// Build the API URL for one page of a listing.
///
/// Any existing `start_value` in the target is replaced.
pub fn api_url(api_base: &str, target_url: &str, start: u64) -> String {
    let mut path = if target_url.starts_with('/') {
        target_url.to_string()
    } else {
        format!("/{target_url}")
    };

    if path.get(VERSION_OFFSET..VERSION_OFFSET + VERSION_SEGMENT.len()) != Some(VERSION_SEGMENT) {
        let at = VERSION_OFFSET.min(path.len());
        if path.is_char_boundary(at) {
            path.insert_str(at, VERSION_SEGMENT);
        }
    }

    let raw = format!("{}{}", api_base.trim_end_matches('/'), path);
    match Url::parse(&raw) {
        Ok(mut url) => {
            let kept: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(key, _)| key != START_PARAM)
                .map(|(key, value)| (key.into_owned(), value.into_owned()))
                .collect();
            url.query_pairs_mut()
                .clear()
                .extend_pairs(kept)
                .append_pair(START_PARAM, &start.to_string());
            url.into()
        }
        Err(e) => {
            warn!(url = %raw, error = %e, "listing URL does not parse, appending start_value verbatim");
            let sep = if raw.contains('?') { '&' } else { '?' };
            format!("{raw}{sep}{START_PARAM}={start}")
        }
    }
}

/// Front-end URL of a catalog node.
pub fn referer_url(base_url: &str, target_url: &str) -> String {
    format!("{base_url}{target_url}")
}

/// Headers identifying which catalog page a listing request comes from.
pub fn referer_headers(base_url: &str, target_url: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    match HeaderValue::from_str(&referer_url(base_url, target_url)) {
        Ok(value) => {
            headers.insert(REFERER, value);
        }
        Err(e) => warn!(target_url, error = %e, "skipping invalid referer header"),
    }
    headers
}
