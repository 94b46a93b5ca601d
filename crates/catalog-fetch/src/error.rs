//! Error types for fetch setup
//!
//! Per-request failures never surface here: a listing fetch that runs out of
//! attempts is an absent result, and a refresh that runs out of attempts is a
//! `session_pool::Error` on the fatal path.

/// Errors from building sessions and the pool.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP client build failed: {0}")]
    Client(String),

    #[error("session pool error: {0}")]
    Pool(#[from] session_pool::Error),

    #[error("credential error: {0}")]
    Credential(#[from] catalog_auth::Error),
}

/// Result alias for fetch setup.
pub type Result<T> = std::result::Result<T, Error>;
