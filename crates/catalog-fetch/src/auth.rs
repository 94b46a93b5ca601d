//! Credential acquisition for sessions
//!
//! Used twice: once per session when the pool is opened, then by the refresh
//! manager through [`CredentialSource`]. Both go through the same bounded
//! retry. Running out of attempts is never swallowed: it fails pool
//! construction, or becomes the refresh manager's fatal error.

use std::sync::Arc;

use catalog_auth::{AuthRequest, Credential, MARKET_ROOT_PATH, request_token};
use session_pool::{CredentialSource, RefreshFuture, Session, SessionPool};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::client::build_session_client;
use crate::error::Result;
use crate::settings::ApiSettings;

/// Obtains bearer credentials from the auth endpoint.
#[derive(Clone)]
pub struct Authenticator {
    settings: Arc<ApiSettings>,
}

impl Authenticator {
    pub fn new(settings: Arc<ApiSettings>) -> Self {
        Self { settings }
    }

    /// Request a credential over `client`, retrying per the configured policy.
    pub async fn obtain(&self, client: &reqwest::Client, session_id: usize) -> session_pool::Result<Credential> {
        let request_id = Uuid::new_v4();
        let referer = format!("{}{}", self.settings.base_url, MARKET_ROOT_PATH);
        let request = AuthRequest {
            auth_url: &self.settings.auth_url,
            csrf_token: self.settings.csrf_token.expose(),
            referer: &referer,
            timeout: self.settings.request_timeout,
        };

        let span = info_span!("auth", %request_id, session_id);
        let result = self
            .settings
            .retry
            .run(|attempt| async move {
                if attempt.is_retry() {
                    debug!(attempt = attempt.number, max_attempts = attempt.max, "retrying token request");
                }
                request_token(client, &request).await.inspect_err(|e| {
                    warn!(
                        attempt = attempt.number,
                        max_attempts = attempt.max,
                        kind = e.kind(),
                        error = %e,
                        "token request failed"
                    );
                })
            })
            .instrument(span.clone())
            .await;

        match result {
            Ok(credential) => {
                span.in_scope(|| debug!("credential obtained"));
                Ok(credential)
            }
            Err(exhausted) => {
                span.in_scope(|| {
                    error!(
                        attempts = exhausted.attempts,
                        error = %exhausted.last_error,
                        "token request retries exhausted"
                    )
                });
                Err(session_pool::Error::RefreshExhausted {
                    session_id,
                    reason: exhausted.last_error.to_string(),
                })
            }
        }
    }

    /// Fresh credential for an idle session, over that session's own client
    /// and cookies.
    pub async fn refresh_credential(&self, session: &Session) -> session_pool::Result<Credential> {
        self.obtain(session.client(), session.id()).await
    }

    /// Build `worker_count` sessions, each with its own client and a fresh
    /// credential, and pool them.
    ///
    /// Sessions are authenticated one after another; the first that cannot
    /// get a credential fails the whole pool.
    pub async fn open_pool(&self) -> Result<SessionPool> {
        let count = self.settings.worker_count.max(1);
        let mut sessions = Vec::with_capacity(count);
        for id in 0..count {
            let client = build_session_client(&self.settings)?;
            let credential = self.obtain(&client, id).await?;
            sessions.push(Session::new(id, client, credential)?);
        }
        info!(sessions = count, "session pool authenticated");
        Ok(SessionPool::new(sessions)?)
    }
}

impl CredentialSource for Authenticator {
    fn refresh<'a>(&'a self, session: &'a Session) -> RefreshFuture<'a> {
        Box::pin(self.refresh_credential(session))
    }
}
