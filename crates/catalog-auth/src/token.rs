//! Auth endpoint token request
//!
//! One POST, one attempt. Retrying, correlation ids, and what to do when
//! every attempt fails are decided by the caller.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, REFERER};
use tracing::debug;

use crate::constants::{AUTH_BODY, AUTH_CONTENT_TYPE, CSRF_HEADER};
use crate::credential::{Credential, TokenResponse};
use crate::error::{Error, Result};

/// Parameters of a token request.
#[derive(Debug, Clone, Copy)]
pub struct AuthRequest<'a> {
    pub auth_url: &'a str,
    pub csrf_token: &'a str,
    pub referer: &'a str,
    pub timeout: Duration,
}

/// Request a fresh bearer token.
///
/// The session's client supplies the browser headers and cookie jar; this
/// adds the CSRF header and the fixed body. Anything other than HTTP 200
/// with a JSON body carrying `accessToken` is an error.
pub async fn request_token(client: &reqwest::Client, request: &AuthRequest<'_>) -> Result<Credential> {
    let response = client
        .post(request.auth_url)
        .header(CONTENT_TYPE, AUTH_CONTENT_TYPE)
        .header(CSRF_HEADER, request.csrf_token)
        .header(REFERER, request.referer)
        .timeout(request.timeout)
        .body(AUTH_BODY)
        .send()
        .await
        .map_err(|e| Error::from_transport(&e))?;

    let status = response.status();
    if status != StatusCode::OK {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::Status {
            status: status.as_u16(),
            body,
        });
    }

    let body = response
        .text()
        .await
        .map_err(|e| Error::from_transport(&e))?;
    let token: TokenResponse = serde_json::from_str(&body)
        .map_err(|e| Error::Decode(format!("invalid auth response: {e}")))?;

    debug!(auth_url = request.auth_url, "auth endpoint issued token");
    Ok(token.into_credential())
}
