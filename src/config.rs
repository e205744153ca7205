//! Client configuration parsed from environment variables.
//!
//! Every setting has a default, so an empty environment yields a working
//! config pointed at a local backend. Parsing runs over a lookup function;
//! `from_env` simply plugs in `std::env::var`.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8001";
pub const DEFAULT_STATE_FILE: &str = ".syndicate/session.json";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config parse failed: {0}")]
    Parse(String),
}

/// Which OAuth callback wire contract the backend speaks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CallbackProtocol {
    /// Redirect carries `token` plus a URL-encoded JSON `user` blob.
    #[default]
    DirectToken,
    /// Redirect carries a one-time `code` exchanged via the backend.
    CodeExchange,
}

impl CallbackProtocol {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DirectToken => "direct-token",
            Self::CodeExchange => "code-exchange",
        }
    }
}

impl fmt::Display for CallbackProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallbackProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct-token" | "direct_token" | "token" => Ok(Self::DirectToken),
            "code-exchange" | "code_exchange" | "code" => Ok(Self::CodeExchange),
            other => Err(format!("unknown callback protocol '{other}' (expected 'direct-token' or 'code-exchange')")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Backend origin without trailing slash, e.g. `https://api.example.com`.
    pub backend_url: String,
    /// JSON file backing durable session storage.
    pub state_file: PathBuf,
    pub callback_protocol: CallbackProtocol,
    /// Re-check a restored token against `/api/auth/me` on startup.
    pub validate_on_restore: bool,
    pub timeouts: HttpTimeouts,
    /// Upper bound on the code exchange during callback handling.
    pub callback_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_owned(),
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            callback_protocol: CallbackProtocol::default(),
            validate_on_restore: false,
            timeouts: HttpTimeouts::default(),
            callback_timeout_secs: DEFAULT_CALLBACK_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Build config from process environment.
    ///
    /// Optional:
    /// - `SYNDICATE_BACKEND_URL`: default `http://127.0.0.1:8001`
    /// - `SYNDICATE_STATE_FILE`: default `.syndicate/session.json`
    /// - `SYNDICATE_CALLBACK_PROTOCOL`: `direct-token` (default) or `code-exchange`
    /// - `SYNDICATE_VALIDATE_ON_RESTORE`: boolean word, default off
    /// - `SYNDICATE_REQUEST_TIMEOUT_SECS`: default 30
    /// - `SYNDICATE_CONNECT_TIMEOUT_SECS`: default 10
    /// - `SYNDICATE_CALLBACK_TIMEOUT_SECS`: default 15
    ///
    /// # Errors
    ///
    /// Returns an error if the callback protocol is not recognised.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the callback protocol is not recognised.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend_url = lookup("SYNDICATE_BACKEND_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_owned())
            .trim()
            .trim_end_matches('/')
            .to_owned();
        let state_file = lookup("SYNDICATE_STATE_FILE")
            .filter(|v| !v.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_STATE_FILE), PathBuf::from);
        let callback_protocol = match lookup("SYNDICATE_CALLBACK_PROTOCOL") {
            Some(raw) => raw.parse().map_err(ConfigError::Parse)?,
            None => CallbackProtocol::default(),
        };
        let validate_on_restore = lookup("SYNDICATE_VALIDATE_ON_RESTORE")
            .as_deref()
            .and_then(parse_bool)
            .unwrap_or(false);
        let timeouts = HttpTimeouts {
            request_secs: parse_secs(lookup("SYNDICATE_REQUEST_TIMEOUT_SECS"), DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: parse_secs(lookup("SYNDICATE_CONNECT_TIMEOUT_SECS"), DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        let callback_timeout_secs =
            parse_secs(lookup("SYNDICATE_CALLBACK_TIMEOUT_SECS"), DEFAULT_CALLBACK_TIMEOUT_SECS);

        Ok(Self { backend_url, state_file, callback_protocol, validate_on_restore, timeouts, callback_timeout_secs })
    }

    #[must_use]
    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }
}

/// Accepts the usual boolean words, case-insensitive.
pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Whole seconds; zero or unparsable values fall back to `default`.
fn parse_secs(raw: Option<String>, default: u64) -> u64 {
    raw.and_then(|v| v.trim().parse::<u64>().ok()).filter(|&secs| secs > 0).unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
