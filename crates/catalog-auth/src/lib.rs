//! Bearer credentials for the catalog API
//!
//! The catalog API hands out short-lived bearer tokens from a dedicated auth
//! endpoint. A request there must look like it came from the catalog's own
//! web front-end: browser headers, the site's cookies, and a CSRF header.
//!
//! Credential flow:
//! 1. Session client built with `constants::default_headers()` and a cookie
//!    jar from `cookies::CookieFile`
//! 2. `token::request_token()` POSTs to the auth endpoint (single attempt)
//! 3. The decoded `Credential` becomes the session's `authorization` header
//! 4. Retries and refresh scheduling live with the session pool

pub mod constants;
pub mod cookies;
pub mod credential;
pub mod error;
pub mod token;

pub use constants::*;
pub use cookies::CookieFile;
pub use credential::{Credential, TokenResponse};
pub use error::{Error, Result};
pub use token::{AuthRequest, request_token};
