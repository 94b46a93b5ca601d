//! One authenticated HTTP session

use catalog_auth::Credential;
use reqwest::header::{AUTHORIZATION, HeaderValue};

/// A configured HTTP client plus the credential it authenticates with.
///
/// The client carries the fixed browser headers and its own cookie jar. Only
/// the refresh manager replaces the credential, and only while the session
/// sits in its hands rather than a caller's.
pub struct Session {
    id: usize,
    client: reqwest::Client,
    credential: Credential,
    authorization: HeaderValue,
}

impl Session {
    pub fn new(id: usize, client: reqwest::Client, credential: Credential) -> catalog_auth::Result<Self> {
        let authorization = credential.authorization()?;
        Ok(Self {
            id,
            client,
            credential,
            authorization,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Start a GET carrying this session's bearer credential.
    pub fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header(AUTHORIZATION, self.authorization.clone())
    }

    /// Swap in a new credential. The old one is dropped, not mutated.
    pub(crate) fn replace_credential(&mut self, credential: Credential) -> catalog_auth::Result<()> {
        self.authorization = credential.authorization()?;
        self.credential = credential;
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("credential", &self.credential)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_builds_authorization_header() {
        let session = Session::new(3, reqwest::Client::new(), Credential::new("Bearer", "at_0")).unwrap();
        assert_eq!(session.id(), 3);

        let request = session.get("http://catalog.test/listing").build().unwrap();
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer at_0");
    }

    #[test]
    fn replace_credential_updates_header() {
        let mut session = Session::new(0, reqwest::Client::new(), Credential::new("Bearer", "at_0")).unwrap();
        session
            .replace_credential(Credential::new("Bearer", "at_1"))
            .unwrap();

        assert_eq!(session.credential().access_token(), "at_1");
        let request = session.get("http://catalog.test/listing").build().unwrap();
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer at_1");
    }

    #[test]
    fn invalid_credential_keeps_previous_one() {
        let mut session = Session::new(0, reqwest::Client::new(), Credential::new("Bearer", "at_0")).unwrap();
        assert!(
            session
                .replace_credential(Credential::new("Bearer", "bad\ntoken"))
                .is_err()
        );
        assert_eq!(session.credential().access_token(), "at_0");
    }

    #[test]
    fn debug_does_not_leak_token() {
        let session = Session::new(1, reqwest::Client::new(), Credential::new("Bearer", "at_secret")).unwrap();
        assert!(!format!("{session:?}").contains("at_secret"));
    }
}
