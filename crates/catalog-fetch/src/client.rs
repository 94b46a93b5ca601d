//! Per-session HTTP client construction

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use catalog_auth::default_headers;

use crate::error::{Error, Result};
use crate::settings::ApiSettings;

/// Hosts one session talks to. Transport retries are scoped to them.
struct SessionHosts(Vec<String>);

impl SessionHosts {
    fn from_settings(settings: &ApiSettings) -> Self {
        let mut hosts = Vec::new();
        for url in [&settings.api_base_url, &settings.auth_url] {
            if let Some(host) = reqwest::Url::parse(url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_owned))
            {
                if !hosts.contains(&host) {
                    hosts.push(host);
                }
            }
        }
        Self(hosts)
    }
}

impl<'a> PartialEq<&'a str> for SessionHosts {
    fn eq(&self, host: &&'a str) -> bool {
        self.0.iter().any(|h| h == host)
    }
}

/// True when no connection was established, so the request never reached
/// the server and can be resent safely.
fn is_connect_error(err: &(dyn StdError + 'static)) -> bool {
    err.downcast_ref::<reqwest::Error>()
        .is_some_and(reqwest::Error::is_connect)
}

fn connect_retry_policy(settings: &ApiSettings) -> reqwest::retry::Builder {
    if settings.connect_retries == 0 {
        return reqwest::retry::never();
    }
    reqwest::retry::for_host(SessionHosts::from_settings(settings))
        .max_retries_per_request(settings.connect_retries)
        .classify_fn(|req_rep| {
            if req_rep.error().is_some_and(is_connect_error) {
                req_rep.retryable()
            } else {
                req_rep.success()
            }
        })
}

/// Build the HTTP client for one session.
///
/// Each client gets its own cookie jar seeded from the cookie file, the
/// browser default headers, and keep-alive. Connection failures are retried
/// inside the client up to `connect_retries` times; statuses and timeouts
/// after connecting are left to the caller's retry policy. Proxy environment
/// variables are only honoured when the proxy flag is set.
pub fn build_session_client(settings: &ApiSettings) -> Result<reqwest::Client> {
    let jar = Arc::new(settings.cookies.to_jar());
    let mut builder = reqwest::Client::builder()
        .default_headers(default_headers())
        .cookie_provider(jar)
        .tcp_keepalive(Duration::from_secs(60))
        .connect_timeout(settings.request_timeout)
        .retry(connect_retry_policy(settings))
        .danger_accept_invalid_certs(settings.accept_invalid_certs);
    if !settings.proxy {
        builder = builder.no_proxy();
    }
    builder.build().map_err(|e| Error::Client(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    fn settings_for(api: &str) -> ApiSettings {
        ApiSettings::new(
            "https://catalog.test",
            api,
            "https://auth.catalog.test/token",
            "csrf",
        )
    }

    #[test]
    fn builds_with_and_without_proxy() {
        let mut settings = settings_for("https://api.catalog.test");
        assert!(build_session_client(&settings).is_ok());

        settings.proxy = true;
        settings.accept_invalid_certs = true;
        settings.connect_retries = 0;
        assert!(build_session_client(&settings).is_ok());
    }

    #[test]
    fn retry_scope_covers_api_and_auth_hosts() {
        let hosts = SessionHosts::from_settings(&settings_for("https://api.catalog.test/v1"));
        assert!(hosts == "api.catalog.test");
        assert!(hosts == "auth.catalog.test");
        assert!(hosts != "catalog.test");
    }

    #[tokio::test]
    async fn refused_connection_is_a_connect_error() {
        // Bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let settings = settings_for(&format!("http://{addr}"));
        let client = build_session_client(&settings).unwrap();
        let err = client.get(format!("http://{addr}/x")).send().await.unwrap_err();
        assert!(is_connect_error(&err), "{err}");
    }

    #[tokio::test]
    async fn server_errors_are_not_resent_by_the_client() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            let app = axum::Router::new().route(
                "/x",
                get(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        StatusCode::BAD_GATEWAY
                    }
                }),
            );
            axum::serve(listener, app).await.unwrap();
        });

        let settings = settings_for(&format!("http://{addr}"));
        let client = build_session_client(&settings).unwrap();
        let response = client.get(format!("http://{addr}/x")).send().await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
