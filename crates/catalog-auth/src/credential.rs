//! Bearer credential held by a session
//!
//! A credential is replaced wholesale on refresh, never patched in place.

use std::time::SystemTime;

use common::Secret;
use reqwest::header::HeaderValue;
use serde::Deserialize;

use crate::constants::DEFAULT_TOKEN_TYPE;
use crate::error::{Error, Result};

/// Body returned by the auth endpoint.
///
/// Only `accessToken` is required; anything else in the body is ignored.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenResponse {
    /// Convert into a credential stamped with the current time.
    pub fn into_credential(self) -> Credential {
        let token_type = self
            .token_type
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_string());
        Credential::new(token_type, self.access_token)
    }
}

/// A bearer token plus the time it was obtained.
#[derive(Debug, Clone)]
pub struct Credential {
    token_type: String,
    access_token: Secret<String>,
    obtained_at: SystemTime,
}

impl Credential {
    pub fn new(token_type: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            token_type: token_type.into(),
            access_token: Secret::new(access_token.into()),
            obtained_at: SystemTime::now(),
        }
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    pub fn access_token(&self) -> &str {
        self.access_token.expose()
    }

    pub fn obtained_at(&self) -> SystemTime {
        self.obtained_at
    }

    /// Value for the `authorization` header: `"{token_type} {access_token}"`.
    pub fn authorization(&self) -> Result<HeaderValue> {
        let mut value = HeaderValue::from_str(&format!(
            "{} {}",
            self.token_type,
            self.access_token.expose()
        ))
        .map_err(|e| Error::Decode(format!("token is not a valid header value: {e}")))?;
        value.set_sensitive(true);
        Ok(value)
    }
}
