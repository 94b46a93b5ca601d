//! Resilient fetching from the catalog API
//!
//! Builds on the session pool: every request borrows a session, retries a
//! bounded number of times with a fixed backoff, and always hands the session
//! back. Listing endpoints are paginated with a fixed page size; all pages of
//! a listing are fetched concurrently and stitched back together in page
//! order.
//!
//! - `Authenticator` obtains credentials (pool construction and refresh)
//! - `Fetcher::fetch` is the retrying GET primitive; exhaustion is `None`
//! - `Fetcher::fetch_all_pages` is the paginated, order-preserving fan-out

pub mod auth;
pub mod client;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod paginate;
pub mod settings;
pub mod url;

pub use auth::Authenticator;
pub use client::build_session_client;
pub use error::{Error, Result};
pub use fetch::Fetcher;
pub use paginate::{Item, normalize_keys, page_starts};
pub use settings::ApiSettings;
pub use url::{api_url, referer_headers, referer_url};
