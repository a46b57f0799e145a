//! Configuration module for the receiver and the binaries that host it.
//!
//! `ReceiverConfig` is built once per receiver and never mutated afterwards.
//! `Config` wraps it with process-level settings read from environment
//! variables.

use std::collections::HashSet;
use std::env;
use std::fmt;

use axum::http::HeaderValue;
use thiserror::Error;
use tracing::warn;

use crate::sms::allowlist::{Allowlist, DEFAULT_ALLOWED_ADDRESSES};

/// Charset used for replies and remote config decoding when none is given.
pub const DEFAULT_CHARSET: &str = "utf-8";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("charset '{0}' cannot be used in a Content-Type header")]
    InvalidCharset(String),
}

/// Shared secret issued by the provider.
///
/// Never printed: `Debug` is redacted and there is no `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// How the source address of a request is determined before the allowlist check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SourceAddressPolicy {
    /// Use the transport peer address as-is.
    #[default]
    Peer,

    /// Trust `X-Forwarded-For` only when the peer is one of these proxies.
    /// The rightmost forwarded entry is taken as the source address.
    TrustedProxies(HashSet<String>),
}

/// Immutable settings for one receiver.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Public service identifier (32 chars, opaque)
    pub service_id: String,

    /// Private API secret used as the signature key
    pub secret: Secret,

    /// Charset announced in replies and used to decode the remote config
    pub charset: String,

    /// Addresses notifications are accepted from
    pub allowed_addresses: Allowlist,

    /// Optional URL of the XML service configuration
    pub config_url: Option<String>,

    /// Source address resolution for proxied deployments
    pub source_policy: SourceAddressPolicy,
}

impl ReceiverConfig {
    /// Create a config with the default charset and provider allowlist.
    pub fn new(service_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            secret: Secret::new(secret),
            charset: DEFAULT_CHARSET.to_string(),
            allowed_addresses: Allowlist::new(DEFAULT_ALLOWED_ADDRESSES.iter().copied()),
            config_url: None,
            source_policy: SourceAddressPolicy::Peer,
        }
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    pub fn with_allowed_addresses<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_addresses = Allowlist::new(addresses);
        self
    }

    pub fn with_config_url(mut self, url: impl Into<String>) -> Self {
        self.config_url = Some(url.into());
        self
    }

    pub fn with_source_policy(mut self, policy: SourceAddressPolicy) -> Self {
        self.source_policy = policy;
        self
    }

    /// The `Content-Type` announced on every reply.
    pub fn content_type(&self) -> String {
        format!("text/plain; charset={}", self.charset)
    }

    /// Check settings that would otherwise only fail at request time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_id.is_empty() {
            return Err(ConfigError::Missing("service_id"));
        }
        if self.secret.expose().is_empty() {
            return Err(ConfigError::Missing("secret"));
        }
        if self.charset.is_empty() || HeaderValue::from_str(&self.content_type()).is_err() {
            return Err(ConfigError::InvalidCharset(self.charset.clone()));
        }
        Ok(())
    }
}

/// Process configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the HTTP server to listen on
    pub port: u16,

    /// Receiver settings
    pub receiver: ReceiverConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let service_id = required("FORTUMO_SERVICE_ID")?;
        let secret = required("FORTUMO_SECRET")?;

        let mut receiver = ReceiverConfig::new(service_id, secret);

        if let Ok(charset) = env::var("FORTUMO_CHARSET") {
            receiver = receiver.with_charset(charset.trim());
        }

        if let Some(addresses) = parse_csv("FORTUMO_ALLOWED_IPS") {
            if addresses.is_empty() {
                warn!("allowlist_empty_all_requests_will_be_rejected");
            }
            receiver = receiver.with_allowed_addresses(addresses);
        }

        if let Ok(url) = env::var("FORTUMO_CONFIG_URL") {
            if !url.trim().is_empty() {
                receiver = receiver.with_config_url(url.trim());
            }
        }

        if let Some(proxies) = parse_csv("FORTUMO_TRUSTED_PROXIES") {
            receiver = receiver
                .with_source_policy(SourceAddressPolicy::TrustedProxies(proxies.into_iter().collect()));
        }

        receiver.validate()?;

        Ok(Config {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            receiver,
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

/// Parse a comma-separated list of strings.
fn parse_csv(name: &str) -> Option<Vec<String>> {
    env::var(name).ok().map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}
