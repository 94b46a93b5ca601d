//! Error types for credential acquisition

/// Errors from a single auth or listing request attempt.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid JSON response: {0}")]
    Decode(String),

    #[error("cookie file error: {0}")]
    CookieFile(String),
}

impl Error {
    /// Classify a transport error from reqwest.
    pub fn from_transport(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else if e.is_connect() {
            Error::Connect(e.to_string())
        } else {
            Error::Http(e.to_string())
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Timeout(_) => "timeout",
            Error::Connect(_) => "connect",
            Error::Http(_) => "request",
            Error::Status { .. } => "status",
            Error::Decode(_) => "decode",
            Error::CookieFile(_) => "cookie_file",
        }
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
