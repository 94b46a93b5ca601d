//! Netscape cookie-file loading
//!
//! The catalog front-end only issues tokens to clients carrying the site's
//! cookies, exported from a browser in the classic `cookies.txt` layout:
//! seven tab-separated fields per line (domain, include-subdomains flag,
//! path, secure flag, expiry, name, value). Lines starting with `#` are
//! comments, except the `#HttpOnly_` prefix which marks an HttpOnly cookie.
//! Cookies already expired at load time are dropped. An expiry of 0 or an
//! empty field means a session cookie.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::Url;
use reqwest::cookie::Jar;
use tracing::{debug, warn};

use crate::error::{Error, Result};

const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

/// One cookie parsed from the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieEntry {
    pub domain: String,
    /// When false the cookie is host-only and not sent to subdomains
    pub include_subdomains: bool,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    /// Unix seconds; `None` for session cookies
    pub expires: Option<u64>,
    pub name: String,
    pub value: String,
}

impl CookieEntry {
    /// Origin URL the cookie is scoped to.
    fn origin(&self) -> Option<Url> {
        let host = self.domain.trim_start_matches('.');
        let scheme = if self.secure { "https" } else { "http" };
        Url::parse(&format!("{scheme}://{host}{}", self.path)).ok()
    }

    pub fn is_expired_at(&self, now_secs: u64) -> bool {
        self.expires.is_some_and(|expires| expires <= now_secs)
    }

    /// `Set-Cookie` style string understood by the jar. Host-only cookies
    /// carry no `Domain` attribute, so the jar pins them to the origin host.
    fn set_cookie_string(&self) -> String {
        let mut cookie = format!("{}={}", self.name, self.value);
        if self.include_subdomains {
            cookie.push_str("; Domain=");
            cookie.push_str(&self.domain);
        }
        cookie.push_str("; Path=");
        cookie.push_str(&self.path);
        if self.secure {
            cookie.push_str("; Secure");
        }
        if self.http_only {
            cookie.push_str("; HttpOnly");
        }
        cookie
    }
}

/// Parsed cookie file; each session gets its own jar built from it.
#[derive(Debug, Clone, Default)]
pub struct CookieFile {
    entries: Vec<CookieEntry>,
}

impl CookieFile {
    /// Read and parse a cookie file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::CookieFile(format!("reading {}: {e}", path.display())))?;
        let file = Self::parse(&contents);
        debug!(path = %path.display(), cookies = file.entries.len(), "loaded cookie file");
        Ok(file)
    }

    /// Parse cookie-file contents, skipping malformed lines and cookies
    /// that have already expired.
    pub fn parse(contents: &str) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self::parse_at(contents, now)
    }

    /// [`parse`](Self::parse) with expiry judged against `now_secs`.
    pub fn parse_at(contents: &str, now_secs: u64) -> Self {
        let mut entries = Vec::new();
        for (line_no, raw) in contents.lines().enumerate() {
            let line = raw.trim_end_matches('\r');
            let (line, http_only) = match line.strip_prefix(HTTP_ONLY_PREFIX) {
                Some(rest) => (rest, true),
                None => (line, false),
            };
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != 7 {
                warn!(line = line_no + 1, fields = fields.len(), "skipping malformed cookie line");
                continue;
            }
            let expires = match fields[4].trim() {
                "" | "0" => None,
                raw => match raw.parse::<u64>() {
                    Ok(secs) => Some(secs),
                    Err(_) => {
                        warn!(line = line_no + 1, expires = raw, "skipping cookie with invalid expiry");
                        continue;
                    }
                },
            };
            let entry = CookieEntry {
                domain: fields[0].to_string(),
                include_subdomains: fields[1].eq_ignore_ascii_case("TRUE"),
                path: fields[2].to_string(),
                secure: fields[3].eq_ignore_ascii_case("TRUE"),
                http_only,
                expires,
                name: fields[5].to_string(),
                value: fields[6].to_string(),
            };
            if entry.is_expired_at(now_secs) {
                debug!(line = line_no + 1, name = %entry.name, "dropping expired cookie");
                continue;
            }
            entries.push(entry);
        }
        Self { entries }
    }

    pub fn entries(&self) -> &[CookieEntry] {
        &self.entries
    }

    /// Build a fresh cookie jar holding every cookie from the file.
    pub fn to_jar(&self) -> Jar {
        let jar = Jar::default();
        for entry in &self.entries {
            match entry.origin() {
                Some(url) => jar.add_cookie_str(&entry.set_cookie_string(), &url),
                None => warn!(domain = %entry.domain, name = %entry.name, "skipping cookie with invalid domain"),
            }
        }
        jar
    }
}
