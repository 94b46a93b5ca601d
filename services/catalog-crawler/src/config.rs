//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The CSRF token may live in the TOML file but `CSRF_TOKEN` wins, so it
//! can be kept out of files that get committed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use catalog_auth::CookieFile;
use catalog_fetch::ApiSettings;
use common::{RetryPolicy, Secret};
use serde::Deserialize;
use session_pool::RefreshSchedule;

use crate::output::OutputFormat;

const DEFAULT_CONFIG_FILE: &str = "catalog-crawler.toml";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Catalog API endpoints and request identity
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    /// Front-end origin, sent as referer
    pub base_url: String,
    pub api_base_url: String,
    pub auth_url: String,
    /// Netscape-format cookie jar exported from a browser
    #[serde(default)]
    pub cookie_file: Option<PathBuf>,
    #[serde(default, rename = "csrf_token")]
    csrf_token_raw: Option<String>,
    #[serde(skip)]
    pub csrf_token: Option<Secret<String>>,
    #[serde(default)]
    pub proxy: bool,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

/// Retry and concurrency settings
#[derive(Debug, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,
    /// Sizes both the session pool and the page fan-out
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Transport-level retries when a connection cannot be established;
    /// 0 turns them off
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
}

/// Credential refresh timing
#[derive(Debug, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_refresh_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_misfire_grace")]
    pub misfire_grace_secs: u64,
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_secs: u64,
}

/// Where results go
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
    #[serde(default)]
    pub format: OutputFormat,
    /// Prometheus text dump written when the run ends
    #[serde(default)]
    pub metrics_file: Option<PathBuf>,
}

fn default_max_retry() -> u32 {
    3
}

/// One worker per core, leaving one core for the runtime.
fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

fn default_request_timeout() -> u64 {
    10
}

fn default_retry_delay() -> u64 {
    2
}

fn default_page_size() -> usize {
    catalog_fetch::settings::DEFAULT_PAGE_SIZE
}

fn default_connect_retries() -> u32 {
    3
}

fn default_refresh_interval() -> u64 {
    500
}

fn default_misfire_grace() -> u64 {
    50
}

fn default_monitor_interval() -> u64 {
    20
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retry: default_max_retry(),
            worker_count: default_worker_count(),
            request_timeout_secs: default_request_timeout(),
            retry_delay_secs: default_retry_delay(),
            page_size: default_page_size(),
            connect_retries: default_connect_retries(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_refresh_interval(),
            misfire_grace_secs: default_misfire_grace(),
            monitor_interval_secs: default_monitor_interval(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            format: OutputFormat::Json,
            metrics_file: None,
        }
    }
}

fn require_http(name: &str, url: &str) -> common::Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(common::Error::Config(format!(
            "{name} must start with http:// or https://, got: {url}"
        )))
    }
}

fn require_nonzero(name: &str, value: u64) -> common::Result<()> {
    if value == 0 {
        return Err(common::Error::Config(format!("{name} must be greater than 0")));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        require_http("base_url", &config.api.base_url)?;
        require_http("api_base_url", &config.api.api_base_url)?;
        require_http("auth_url", &config.api.auth_url)?;

        require_nonzero("max_retry", u64::from(config.fetch.max_retry))?;
        require_nonzero("worker_count", config.fetch.worker_count as u64)?;
        require_nonzero("page_size", config.fetch.page_size as u64)?;
        require_nonzero("request_timeout_secs", config.fetch.request_timeout_secs)?;
        require_nonzero("interval_secs", config.refresh.interval_secs)?;
        require_nonzero("monitor_interval_secs", config.refresh.monitor_interval_secs)?;

        // CSRF_TOKEN env var takes precedence over the file value
        let from_file = config.api.csrf_token_raw.take();
        let token = std::env::var("CSRF_TOKEN").ok().or(from_file);
        match token.map(|t| t.trim().to_owned()) {
            Some(t) if !t.is_empty() => config.api.csrf_token = Some(Secret::new(t)),
            _ => {
                return Err(common::Error::Config(
                    "csrf_token must be set in [api] or via CSRF_TOKEN".into(),
                ));
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&Path>) -> PathBuf {
        if let Some(p) = cli_path {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }

    /// Runtime settings for the fetch layer. Reads the cookie file if one is
    /// configured.
    pub fn api_settings(&self) -> catalog_auth::Result<ApiSettings> {
        let csrf = self
            .api
            .csrf_token
            .as_ref()
            .map(|t| t.expose().clone())
            .unwrap_or_default();
        let mut settings = ApiSettings::new(
            self.api.base_url.clone(),
            self.api.api_base_url.clone(),
            self.api.auth_url.clone(),
            csrf,
        );
        if let Some(path) = &self.api.cookie_file {
            settings.cookies = CookieFile::load(path)?;
        }
        settings.proxy = self.api.proxy;
        settings.accept_invalid_certs = self.api.accept_invalid_certs;
        settings.request_timeout = Duration::from_secs(self.fetch.request_timeout_secs);
        settings.retry = RetryPolicy::new(
            self.fetch.max_retry,
            Duration::from_secs(self.fetch.retry_delay_secs),
        );
        settings.worker_count = self.fetch.worker_count;
        settings.page_size = self.fetch.page_size;
        settings.connect_retries = self.fetch.connect_retries;
        Ok(settings)
    }

    pub fn refresh_schedule(&self) -> RefreshSchedule {
        RefreshSchedule {
            interval: Duration::from_secs(self.refresh.interval_secs),
            misfire_grace: Duration::from_secs(self.refresh.misfire_grace_secs),
            monitor_interval: Duration::from_secs(self.refresh.monitor_interval_secs),
        }
    }
}
