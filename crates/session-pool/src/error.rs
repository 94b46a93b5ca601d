//! Error types for pool operations

/// Errors from pool and refresh operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("session pool closed")]
    PoolClosed,

    #[error("session pool needs at least one session")]
    Empty,

    #[error("session id {0} appears more than once")]
    DuplicateSession(usize),

    #[error("credential refresh exhausted for session {session_id}: {reason}")]
    RefreshExhausted { session_id: usize, reason: String },

    #[error("credential error: {0}")]
    Credential(#[from] catalog_auth::Error),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
