//! Paginated listing fetch
//!
//! A listing reports its total item count (`numFound`) on every page. The
//! first page is fetched once to learn that count; then every page start
//! `0, page_size, 2 * page_size, ..` below the count is fetched concurrently,
//! bounded by `worker_count` in-flight tasks.
//!
//! Pages are tagged with their submission index and written into a
//! pre-sized slot vector, so the result order is page order no matter which
//! page finished first. Pages that come back absent are skipped.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::fetch::Fetcher;
use crate::metrics;
use crate::url::{api_url, referer_headers};

/// One listing record, field name to value.
pub type Item = Map<String, Value>;

/// Largest item count a listing may report. Anything above is treated as
/// a broken count rather than sized into page and slot vectors.
pub const MAX_LISTING_ITEMS: u64 = 1_000_000;

const COUNT_FIELD: &str = "numFound";
const LISTINGS_FIELD: &str = "listings";

/// Page starts covering `num_found` items.
pub fn page_starts(num_found: u64, page_size: usize) -> Vec<u64> {
    let step = page_size.max(1) as u64;
    (0..num_found).step_by(step as usize).collect()
}

/// Upper-case the first character of every field name.
///
/// Values are left untouched; a key that collides after normalization keeps
/// the value that came last.
pub fn normalize_keys(item: Item) -> Item {
    item.into_iter()
        .map(|(key, value)| (pascal_case_first(&key), value))
        .collect()
}

fn pascal_case_first(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Items of one page, keys normalized. A page without a `listings` array
/// is an empty page, not an absent one.
fn extract_items(page: Value) -> Vec<Item> {
    let Value::Object(mut page) = page else {
        return Vec::new();
    };
    match page.remove(LISTINGS_FIELD) {
        Some(Value::Array(listings)) => listings
            .into_iter()
            .filter_map(|entry| match entry {
                Value::Object(item) => Some(normalize_keys(item)),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

impl Fetcher {
    /// Fetch one page of a listing, already flattened to items.
    async fn fetch_page(&self, target_url: &str, start: u64) -> Option<Vec<Item>> {
        let url = api_url(&self.settings.api_base_url, target_url, start);
        let headers = referer_headers(&self.settings.base_url, target_url);
        let page = self.fetch(&url, &headers).await;
        metrics::record_page(page.is_some());
        page.map(extract_items)
    }

    /// Fetch every page of the listing at `target_url`, in page order.
    ///
    /// `None` means the item count could not be determined. Once the count
    /// is known the result is always `Some`, empty if every page failed.
    pub async fn fetch_all_pages(&self, target_url: &str) -> Option<Vec<Item>> {
        let count_url = api_url(&self.settings.api_base_url, target_url, 0);
        let headers = referer_headers(&self.settings.base_url, target_url);
        let first = self.fetch(&count_url, &headers).await?;

        let Some(num_found) = first.get(COUNT_FIELD).and_then(Value::as_u64) else {
            warn!(url = %count_url, "listing has no item count, treating as no data");
            return None;
        };
        if num_found > MAX_LISTING_ITEMS {
            warn!(
                url = %count_url,
                num_found,
                max = MAX_LISTING_ITEMS,
                "listing item count out of range, treating as no data"
            );
            return None;
        }
        info!(url = %count_url, num_found, "getting listing pages");

        let starts = page_starts(num_found, self.settings.page_size);
        let mut slots: Vec<Option<Vec<Item>>> = vec![None; starts.len()];
        let limit = Arc::new(Semaphore::new(self.settings.worker_count.max(1)));
        let target: Arc<str> = Arc::from(target_url);

        let mut tasks = JoinSet::new();
        for (index, start) in starts.iter().copied().enumerate() {
            let fetcher = self.clone();
            let limit = limit.clone();
            let target = target.clone();
            let span = info_span!("page", start, page = index);
            tasks.spawn(
                async move {
                    // Semaphore is never closed
                    let _permit = limit.acquire_owned().await.ok();
                    (index, fetcher.fetch_page(&target, start).await)
                }
                .instrument(span),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, page)) => slots[index] = page,
                Err(e) => warn!(url = %count_url, error = %e, "page task failed"),
            }
        }

        let pages = slots.iter().filter(|slot| slot.is_some()).count();
        let items: Vec<Item> = slots.into_iter().flatten().flatten().collect();
        debug!(
            url = %count_url,
            pages,
            missing = starts.len() - pages,
            items = items.len(),
            "listing pages processed"
        );
        Some(items)
    }
}
