//! Redacting wrapper for bearer tokens and CSRF values
//!
//! Formatting never prints the value, so a `Secret` can sit inside structs
//! that derive `Debug` and inside `tracing` fields. The buffer is zeroed on
//! drop.

use std::fmt;
use zeroize::Zeroize;

const REDACTED: &str = "[REDACTED]";

pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Borrow the raw value. Only call this where it leaves the process
    /// (request headers, bodies).
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self::new(self.0.clone())
    }
}

impl From<String> for Secret<String> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csrf_token_is_redacted() {
        let secret = Secret::new(String::from("csrf-abc123"));
        assert_eq!(format!("{secret:?}"), REDACTED);
        assert_eq!(format!("{secret}"), REDACTED);
        assert_eq!(secret.expose(), "csrf-abc123");
    }

    #[test]
    fn redacted_inside_derived_debug() {
        #[derive(Debug)]
        #[allow(dead_code)]
        struct Settings {
            csrf: Secret<String>,
        }
        let settings = Settings {
            csrf: String::from("csrf-abc123").into(),
        };
        let debug = format!("{settings:?}");
        assert!(!debug.contains("csrf-abc123"), "{debug}");
    }

    #[test]
    fn clone_keeps_value() {
        let secret: Secret<String> = String::from("token").into();
        let copy = secret.clone();
        drop(secret);
        assert_eq!(copy.expose(), "token");
    }
}
