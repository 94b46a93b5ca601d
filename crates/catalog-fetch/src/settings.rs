//! Runtime settings for talking to the catalog API

use std::time::Duration;

use catalog_auth::CookieFile;
use common::{RetryPolicy, Secret};

/// Number of items per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 12;

/// Everything the fetch layer needs, resolved from configuration.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    /// Front-end origin, used for referer headers
    pub base_url: String,
    /// API origin listing paths are appended to
    pub api_base_url: String,
    /// Token endpoint
    pub auth_url: String,
    pub csrf_token: Secret<String>,
    pub cookies: CookieFile,
    /// Honour proxy environment variables
    pub proxy: bool,
    pub accept_invalid_certs: bool,
    /// Per-request timeout; there is no deadline across retries
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    /// Sizes both the session pool and the page fan-out
    pub worker_count: usize,
    pub page_size: usize,
    /// Extra connection attempts the HTTP client makes on its own before a
    /// request counts as failed. Only connect errors qualify, so a request
    /// that reached the server is never resent below the retry policy.
    pub connect_retries: u32,
}

impl ApiSettings {
    /// Settings with the usual defaults for the given endpoints.
    pub fn new(
        base_url: impl Into<String>,
        api_base_url: impl Into<String>,
        auth_url: impl Into<String>,
        csrf_token: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_base_url: api_base_url.into(),
            auth_url: auth_url.into(),
            csrf_token: Secret::new(csrf_token.into()),
            cookies: CookieFile::default(),
            proxy: false,
            accept_invalid_certs: false,
            request_timeout: Duration::from_secs(10),
            retry: RetryPolicy::new(3, Duration::from_secs(2)),
            worker_count: 1,
            page_size: DEFAULT_PAGE_SIZE,
            connect_retries: 3,
        }
    }
}
