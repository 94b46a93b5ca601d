//! Catalog tree-walk
//!
//! The market root listing describes the catalog tree:
//!
//! ```text
//! listingUnits[]        markets, matched by title
//!   l2Units[]           categories (include/exclude filters apply here)
//!     l3Units[]         sub-categories, each with its own listing
//!       l4Units[]       optional products, each with its own listing
//! ```
//!
//! Every sub-category and product listing is fetched with the paginated
//! fetcher. Nodes whose listing is absent are left out. Each category is
//! written to disk as soon as it is finished, in the background, while the
//! walk moves on.

use catalog_auth::MARKET_ROOT_PATH;
use catalog_fetch::{Fetcher, Item, api_url, referer_headers};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::output::OutputWriter;

/// Root of the catalog listing.
#[derive(Debug, Deserialize)]
struct CatalogRoot {
    #[serde(rename = "listingUnits", default)]
    markets: Vec<MarketNode>,
}

#[derive(Debug, Deserialize)]
struct MarketNode {
    title: String,
    #[serde(rename = "l2Units", default)]
    categories: Vec<CategoryNode>,
}

#[derive(Debug, Deserialize)]
struct CategoryNode {
    title: String,
    #[serde(rename = "l3Units", default)]
    sub_categories: Vec<SubCategoryNode>,
}

#[derive(Debug, Deserialize)]
struct SubCategoryNode {
    title: String,
    #[serde(rename = "targetUrl")]
    target_url: String,
    #[serde(rename = "l4Units", default)]
    products: Vec<ProductNode>,
}

#[derive(Debug, Deserialize)]
struct ProductNode {
    title: String,
    #[serde(rename = "targetUrl")]
    target_url: String,
}

/// Crawled market, as written to disk.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MarketData {
    pub market: String,
    #[serde(rename = "Category")]
    pub categories: Vec<CategoryData>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CategoryData {
    pub name: String,
    #[serde(rename = "SubCategory")]
    pub sub_categories: Vec<SubCategoryData>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubCategoryData {
    pub name: String,
    pub products: Vec<ProductData>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProductData {
    pub name: String,
    pub items: Vec<Item>,
}

/// Category include/exclude lists. An include list, when given, is
/// exhaustive; the exclude list is applied after it.
#[derive(Debug, Clone, Default)]
pub struct CategoryFilter {
    include: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
}

impl CategoryFilter {
    pub fn new(include: Option<Vec<String>>, exclude: Option<Vec<String>>) -> Self {
        Self { include, exclude }
    }

    pub fn allows(&self, title: &str) -> bool {
        if let Some(include) = &self.include {
            if !include.iter().any(|c| c == title) {
                info!(category = title, include = ?include, "category not in inclusion list, skipping");
                return false;
            }
        }
        if let Some(exclude) = &self.exclude {
            if exclude.iter().any(|c| c == title) {
                info!(category = title, exclude = ?exclude, "category in exclusion list, skipping");
                return false;
            }
        }
        true
    }
}

/// Walks one market and writes its datasets.
pub struct Crawler {
    fetcher: Fetcher,
    filter: CategoryFilter,
    writer: OutputWriter,
}

impl Crawler {
    pub fn new(fetcher: Fetcher, filter: CategoryFilter, writer: OutputWriter) -> Self {
        Self {
            fetcher,
            filter,
            writer,
        }
    }

    /// Crawl `market` and write the consolidated file.
    ///
    /// Returns `false` when there was no data for the market.
    pub async fn run(&self, market: &str) -> common::Result<bool> {
        let Some(data) = self.crawl_market(market).await else {
            info!(market, "no data found for market");
            return Ok(false);
        };
        self.writer.write(market, market, &data)?;
        info!(market, categories = data.categories.len(), "consolidated market data saved");
        Ok(true)
    }

    /// Walk the catalog tree of `market`, writing one file per category.
    ///
    /// `None` if the root listing is unavailable or has no such market.
    pub async fn crawl_market(&self, market: &str) -> Option<MarketData> {
        let settings = self.fetcher.settings();
        let root_url = api_url(&settings.api_base_url, MARKET_ROOT_PATH, 0);
        let headers = referer_headers(&settings.base_url, MARKET_ROOT_PATH);
        let root = self.fetcher.fetch(&root_url, &headers).await?;

        let root: CatalogRoot = match serde_json::from_value(root) {
            Ok(root) => root,
            Err(e) => {
                warn!(url = %root_url, error = %e, "catalog root has unexpected shape");
                return None;
            }
        };
        let node = root.markets.into_iter().find(|m| m.title == market)?;
        info!(market = %node.title, "getting market data");

        let mut data = MarketData {
            market: node.title.clone(),
            categories: Vec::new(),
        };
        let mut writes = JoinSet::new();

        for category in node.categories {
            if !self.filter.allows(&category.title) {
                continue;
            }
            info!(market, category = %category.title, "getting category data");
            let category_data = self.crawl_category(&category).await;

            let snapshot = MarketData {
                market: market.to_string(),
                categories: vec![category_data.clone()],
            };
            let writer = self.writer.clone();
            let market = market.to_string();
            let name = category.title.clone();
            writes.spawn_blocking(move || {
                if let Err(e) = writer.write(&market, &name, &snapshot) {
                    warn!(market = %market, category = %name, error = %e, "failed to save category data");
                }
            });
            data.categories.push(category_data);
        }

        while let Some(joined) = writes.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "category write task failed");
            }
        }
        Some(data)
    }

    async fn crawl_category(&self, category: &CategoryNode) -> CategoryData {
        let mut sub_categories = Vec::with_capacity(category.sub_categories.len());
        for sub in &category.sub_categories {
            let mut products = Vec::new();

            info!(category = %category.title, sub_category = %sub.title, "getting product info");
            if let Some(items) = self.fetcher.fetch_all_pages(&sub.target_url).await {
                products.push(ProductData {
                    name: sub.title.clone(),
                    items,
                });
            }

            for product in &sub.products {
                info!(
                    category = %category.title,
                    sub_category = %sub.title,
                    product = %product.title,
                    "getting product info"
                );
                match self.fetcher.fetch_all_pages(&product.target_url).await {
                    Some(items) => products.push(ProductData {
                        name: product.title.clone(),
                        items,
                    }),
                    None => debug!(product = %product.title, "no data for product"),
                }
            }

            sub_categories.push(SubCategoryData {
                name: sub.title.clone(),
                products,
            });
        }
        CategoryData {
            name: category.title.clone(),
            sub_categories,
        }
    }
}
