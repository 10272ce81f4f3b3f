//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

/// Split a `Name: value` header string.
///
/// Returns `None` when there is no colon or the name is empty.
pub fn parse_header(line: &str) -> Option<(String, String)> {
    let (name, value) = line.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

fn check_headers(field: &str, headers: &[String]) -> Result<(), ConfigError> {
    if let Some(bad) = headers.iter().find(|h| parse_header(h).is_none()) {
        return Err(ConfigError::Invalid { field: field.into(), reason: format!("malformed header {bad:?}") });
    }
    Ok(())
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `net.retries` is 0
    /// - `net.user_agent` or `cache.name` is empty
    /// - any header string is not `Name: value`
    /// - `proxy.endpoint` is not an http(s) URL
    ///
    /// Returns `ConfigError::Missing` if `proxy.endpoint` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.net.retries == 0 {
            return Err(ConfigError::Invalid { field: "net.retries".into(), reason: "must be at least 1".into() });
        }

        if self.net.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "net.user_agent".into(), reason: "must not be empty".into() });
        }

        if self.cache.name.is_empty() {
            return Err(ConfigError::Invalid { field: "cache.name".into(), reason: "must not be empty".into() });
        }

        check_headers("net.headers", &self.net.headers)?;
        check_headers("net.json_headers", &self.net.json_headers)?;
        check_headers("proxy.headers", &self.proxy.headers)?;

        if self.proxy.endpoint.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "proxy.endpoint".into(),
                hint: "set NETJAR_PROXY__ENDPOINT to the challenge proxy API URL".into(),
            });
        }

        match url::Url::parse(&self.proxy.endpoint) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => {}
            Ok(u) => {
                return Err(ConfigError::Invalid {
                    field: "proxy.endpoint".into(),
                    reason: format!("unsupported scheme: {}", u.scheme()),
                });
            }
            Err(e) => {
                return Err(ConfigError::Invalid { field: "proxy.endpoint".into(), reason: e.to_string() });
            }
        }

        if self.net.throttle_min_us > self.net.throttle_max_us {
            tracing::warn!(
                throttle_min_us = self.net.throttle_min_us,
                throttle_max_us = self.net.throttle_max_us,
                "throttle_min_us exceeds throttle_max_us; the bounds will be swapped"
            );
        }

        Ok(())
    }
}
