//! Prometheus metrics for a crawl run
//!
//! The crawler is a batch job, so nothing scrapes it; the rendered text is
//! written to `output.metrics_file` when the run ends. Metric names:
//!
//! - `catalog_fetch_attempts_total` (counter): label `outcome`
//! - `catalog_fetch_exhausted_total` (counter)
//! - `catalog_pages_total` (counter): label `outcome`
//! - `catalog_refresh_total` (counter): label `outcome`
//! - `session_pool_available` (gauge)

use std::path::Path;

use anyhow::Context;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder and describe the crawl metrics.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;
    describe();
    Ok(handle)
}

fn describe() {
    metrics::describe_counter!(
        "catalog_fetch_attempts_total",
        "Listing request attempts by outcome"
    );
    metrics::describe_counter!(
        "catalog_fetch_exhausted_total",
        "Listing requests that failed every attempt"
    );
    metrics::describe_counter!("catalog_pages_total", "Listing pages by outcome");
    metrics::describe_counter!("catalog_refresh_total", "Credential refresh cycles by outcome");
    metrics::describe_gauge!("session_pool_available", "Idle sessions in the pool");
}

/// Write the current metrics in Prometheus text format.
pub fn write_snapshot(handle: &PrometheusHandle, path: &Path) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    std::fs::write(path, handle.render())
}
