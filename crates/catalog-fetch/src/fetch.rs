//! Retrying GET over the session pool
//!
//! One logical request = one borrowed session + up to `max_retry` attempts.
//! An attempt fails on a transport error (connect, timeout, anything else
//! reqwest reports), on any status other than 200, or on a body that is not
//! JSON; 4xx and 5xx are treated alike. After the last failed attempt the
//! caller gets `None`, never an error. The session goes back to the pool when
//! the guard drops, on every path including panics.

use std::sync::Arc;
use std::time::Duration;

use catalog_auth::Error as AttemptError;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde_json::Value;
use session_pool::{Session, SessionPool};
use tracing::{debug, error, warn};

use crate::metrics;
use crate::settings::ApiSettings;

/// Longest response body excerpt kept for a failed attempt.
const BODY_EXCERPT: usize = 256;

/// Retrying fetch handle. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct Fetcher {
    pub(crate) pool: Arc<SessionPool>,
    pub(crate) settings: Arc<ApiSettings>,
}

impl Fetcher {
    pub fn new(pool: Arc<SessionPool>, settings: Arc<ApiSettings>) -> Self {
        Self { pool, settings }
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    pub fn settings(&self) -> &ApiSettings {
        &self.settings
    }

    /// GET `url` as JSON, retrying per the configured policy.
    ///
    /// Returns `None` when every attempt failed or the pool is shut down.
    pub async fn fetch(&self, url: &str, headers: &HeaderMap) -> Option<Value> {
        let session = match self.pool.checkout().await {
            Ok(session) => session,
            Err(e) => {
                error!(url, error = %e, "cannot acquire session");
                return None;
            }
        };
        let session: &Session = &session;
        let timeout = self.settings.request_timeout;

        let result = self
            .settings
            .retry
            .run(|attempt| async move {
                if attempt.is_retry() {
                    debug!(
                        url,
                        retried = attempt.number - 1,
                        max_retry = attempt.max,
                        "retrying url"
                    );
                }
                match fetch_once(session, url, headers, timeout).await {
                    Ok(body) => {
                        metrics::record_attempt("ok");
                        if attempt.is_retry() {
                            debug!(url, session_id = session.id(), attempt = attempt.number, "retry successful");
                        }
                        Ok(body)
                    }
                    Err(e) => {
                        metrics::record_attempt(e.kind());
                        warn!(
                            url,
                            session_id = session.id(),
                            attempt = attempt.number,
                            max_attempts = attempt.max,
                            kind = e.kind(),
                            error = %e,
                            "fetch attempt failed"
                        );
                        Err(e)
                    }
                }
            })
            .await;

        match result {
            Ok(body) => Some(body),
            Err(exhausted) => {
                metrics::record_exhausted();
                error!(
                    url,
                    attempts = exhausted.attempts,
                    error = %exhausted.last_error,
                    "giving up on url"
                );
                None
            }
        }
    }
}

/// One network attempt with the session's credential.
async fn fetch_once(
    session: &Session,
    url: &str,
    headers: &HeaderMap,
    timeout: Duration,
) -> catalog_auth::Result<Value> {
    let response = session
        .get(url)
        .headers(headers.clone())
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| AttemptError::from_transport(&e))?;

    let status = response.status();
    if status != StatusCode::OK {
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > BODY_EXCERPT {
            let mut end = BODY_EXCERPT;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            body.truncate(end);
        }
        return Err(AttemptError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| AttemptError::from_transport(&e))?;
    serde_json::from_slice(&bytes).map_err(|e| AttemptError::Decode(e.to_string()))
}
