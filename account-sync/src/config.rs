//! Configuration module for environment variable parsing.
//!
//! All settings are read once at startup and handed to the web server
//! through [`crate::web::AppState`]. The webhook secret is the only required
//! value; every other setting has a default.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::ledger::MAX_TTL_SECS;
use crate::web::signature::{SecretError, WebhookSecret};

/// Errors that prevent the service from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("WEBHOOK_SECRET is not set")]
    MissingWebhookSecret,

    #[error("WEBHOOK_SECRET is invalid: {0}")]
    InvalidWebhookSecret(#[from] SecretError),

    #[error("ACCOUNT_API_URL `{value}` is not a valid URL: {source}")]
    InvalidAccountApiUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Shared secret used to verify webhook signatures
    pub webhook_secret: WebhookSecret,

    /// Maximum distance in seconds between the signed timestamp and now
    pub signature_tolerance_secs: u64,

    /// Base URL of the account service
    pub account_api_url: Url,

    /// Bearer token for the account service
    pub account_api_key: Option<String>,

    /// Keep accounts in process instead of calling the account service
    pub account_api_in_memory: bool,

    /// HTTP request timeout in milliseconds
    pub request_timeout_ms: u64,

    /// Whether redelivered events are skipped
    pub dedup_enabled: bool,

    /// How long a processed event id is remembered
    pub dedup_ttl_secs: u64,

    /// Whether a created account gets its identity provider id written to metadata
    pub link_external_id: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup("WEBHOOK_SECRET")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingWebhookSecret)?;
        let webhook_secret = WebhookSecret::new(secret.trim())?;

        let raw_url =
            lookup("ACCOUNT_API_URL").unwrap_or_else(|| "http://localhost:3000/api".to_string());
        let account_api_url =
            Url::parse(&raw_url).map_err(|source| ConfigError::InvalidAccountApiUrl {
                value: raw_url.clone(),
                source,
            })?;

        Ok(Config {
            port: parse_or("PORT", lookup("PORT"), 8080),

            webhook_secret,

            signature_tolerance_secs: parse_or(
                "WEBHOOK_TOLERANCE_SECS",
                lookup("WEBHOOK_TOLERANCE_SECS"),
                300,
            ),

            account_api_url,

            account_api_key: lookup("ACCOUNT_API_KEY").filter(|v| !v.trim().is_empty()),

            account_api_in_memory: parse_flag(
                "ACCOUNT_API_IN_MEMORY",
                lookup("ACCOUNT_API_IN_MEMORY"),
                false,
            ),

            request_timeout_ms: parse_or("REQUEST_TIMEOUT_MS", lookup("REQUEST_TIMEOUT_MS"), 8000),

            dedup_enabled: parse_flag(
                "WEBHOOK_DEDUP_ENABLED",
                lookup("WEBHOOK_DEDUP_ENABLED"),
                true,
            ),

            dedup_ttl_secs: cap(
                "WEBHOOK_DEDUP_TTL_SECS",
                parse_or(
                    "WEBHOOK_DEDUP_TTL_SECS",
                    lookup("WEBHOOK_DEDUP_TTL_SECS"),
                    86_400,
                ),
                MAX_TTL_SECS,
            ),

            link_external_id: parse_flag("LINK_EXTERNAL_ID", lookup("LINK_EXTERNAL_ID"), true),
        })
    }

    /// Outbound request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Parse a value, falling back to the default when absent or malformed.
fn parse_or<T: FromStr + Copy>(name: &str, raw: Option<String>, default: T) -> T {
    let Some(raw) = raw else {
        return default;
    };

    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid value, using default");
            default
        }
    }
}

/// Clamp a parsed value to `max`.
fn cap(name: &str, value: u64, max: u64) -> u64 {
    if value > max {
        warn!(env_var = name, value = value, max = max, "Value too large, using maximum");
        return max;
    }
    value
}

/// Parse a boolean flag such as "true", "0" or "off".
fn parse_flag(name: &str, raw: Option<String>, default: bool) -> bool {
    let Some(raw) = raw else {
        return default;
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            warn!(env_var = name, value = %raw, "Invalid flag, using default");
            default
        }
    }
}
