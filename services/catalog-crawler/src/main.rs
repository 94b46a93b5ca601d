//! Catalog Crawler
//!
//! Batch job that:
//! 1. Authenticates a pool of sessions against the catalog auth endpoint
//! 2. Keeps their credentials fresh in the background
//! 3. Walks one market's catalog tree, fetching every listing page concurrently
//! 4. Writes per-category and consolidated JSON datasets
//!
//! A credential refresh that runs out of retries ends the process with exit
//! code 1; the crawl never continues on stale credentials.

mod cli;
mod config;
mod crawl;
mod metrics;
mod output;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use catalog_fetch::{Authenticator, Fetcher};
use clap::Parser;
use session_pool::AuthLifecycleManager;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, LogFormat};
use crate::config::Config;
use crate::crawl::{CategoryFilter, Crawler};
use crate::output::OutputWriter;

/// Initialize tracing with LOG_LEVEL / RUST_LOG support.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let started = Instant::now();
    info!(market = %cli.market, "starting catalog-crawler");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus = metrics::install_recorder()?;

    let config_path = Config::resolve_path(cli.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");
    let mut config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    if cli.proxy {
        config.api.proxy = true;
    }
    if let Some(dir) = &cli.folder_loc {
        config.output.directory = dir.clone();
    }
    if let Some(format) = cli.output {
        config.output.format = format;
    }

    info!(
        api_base_url = %config.api.api_base_url,
        workers = config.fetch.worker_count,
        max_retry = config.fetch.max_retry,
        proxy = config.api.proxy,
        output = %config.output.directory.display(),
        format = ?config.output.format,
        "configuration loaded"
    );

    let settings = Arc::new(config.api_settings().context("failed to load cookie file")?);
    let authenticator = Arc::new(Authenticator::new(settings.clone()));

    // Every session must hold a credential before anything is crawled
    let pool = match authenticator.open_pool().await {
        Ok(pool) => Arc::new(pool),
        Err(e) => {
            error!(error = %e, "could not authenticate sessions");
            std::process::exit(1);
        }
    };

    let mut refresher =
        AuthLifecycleManager::new(pool.clone(), authenticator).spawn(config.refresh_schedule());
    let fatal = refresher.take_fatal();
    let fatal = async move {
        match fatal {
            Some(rx) => rx.await.ok(),
            None => None,
        }
    };

    let crawler = Crawler::new(
        Fetcher::new(pool.clone(), settings),
        CategoryFilter::new(cli.include_categories.clone(), cli.exclude_categories.clone()),
        OutputWriter::new(config.output.directory.clone(), config.output.format),
    );

    tokio::select! {
        result = crawler.run(&cli.market) => {
            match result {
                Ok(true) => info!(market = %cli.market, "download completed"),
                Ok(false) => info!(market = %cli.market, "no data found for market"),
                Err(e) => warn!(market = %cli.market, error = %e, "failed to save consolidated data"),
            }
        }
        Some(e) = fatal => {
            error!(error = %e, "credential refresh failed, aborting crawl");
            pool.close();
            std::process::exit(1);
        }
    }

    refresher.stop();
    refresher.join().await;
    pool.close();

    if let Some(path) = &config.output.metrics_file {
        match metrics::write_snapshot(&prometheus, path) {
            Ok(()) => info!(path = %path.display(), "metrics written"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to write metrics"),
        }
    }

    info!(elapsed_secs = started.elapsed().as_secs(), "crawl finished");
    Ok(())
}
