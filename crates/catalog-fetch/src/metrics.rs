//! Fetch counters
//!
//! - `catalog_fetch_attempts_total` (counter): label `outcome` (`ok` or the
//!   failure kind: `status`, `timeout`, `connect`, `request`, `decode`)
//! - `catalog_fetch_exhausted_total` (counter): fetches that ran out of attempts
//! - `catalog_pages_total` (counter): label `outcome` (`ok`, `absent`)

/// Record one network attempt.
pub fn record_attempt(outcome: &'static str) {
    metrics::counter!("catalog_fetch_attempts_total", "outcome" => outcome).increment(1);
}

/// Record a fetch that used every attempt without success.
pub fn record_exhausted() {
    metrics::counter!("catalog_fetch_exhausted_total").increment(1);
}

/// Record the result of one listing page.
pub fn record_page(found: bool) {
    let outcome = if found { "ok" } else { "absent" };
    metrics::counter!("catalog_pages_total", "outcome" => outcome).increment(1);
}
