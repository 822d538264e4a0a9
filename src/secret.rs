// src/secret.rs
//! Secret values that must never reach logs, error text or durable storage.

use serde::{Deserialize, Serialize};
use std::fmt;

const REDACTED: &str = "[REDACTED]";

/// A string secret. `Debug` and `Display` print `[REDACTED]`; the value is only
/// reachable through [`Secret::expose`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Scrubs known secret values out of free-form text (error details coming
/// back from the browser or from HTTP collaborators).
#[derive(Clone, Default)]
pub struct Redactor {
    needles: Vec<String>,
}

impl Redactor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, secret: Option<&Secret>) -> Self {
        if let Some(secret) = secret {
            // Very short values would shred unrelated text.
            if secret.expose().len() >= 4 {
                self.needles.push(secret.expose().to_string());
            }
        }
        self
    }

    pub fn redact(&self, text: &str) -> String {
        self.needles
            .iter()
            .fold(text.to_string(), |acc, needle| acc.replace(needle.as_str(), REDACTED))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_never_formats_its_value() {
        let secret = Secret::new("hunter22");
        assert_eq!(format!("{}", secret), "[REDACTED]");
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
        assert_eq!(secret.expose(), "hunter22");
    }

    #[test]
    fn secret_serializes_transparently() {
        let secret = Secret::new("token-value");
        assert_eq!(serde_json::to_string(&secret).unwrap(), "\"token-value\"");
    }

    #[test]
    fn redactor_scrubs_every_occurrence() {
        let password = Secret::new("s3cr3t-pass");
        let redactor = Redactor::new().with(Some(&password)).with(None);
        assert_eq!(
            redactor.redact("typed s3cr3t-pass into #password (s3cr3t-pass)"),
            "typed [REDACTED] into #password ([REDACTED])"
        );
    }

    #[test]
    fn redactor_ignores_tiny_secrets() {
        let redactor = Redactor::new().with(Some(&Secret::new("a")));
        assert_eq!(redactor.redact("a cat"), "a cat");
    }
}
