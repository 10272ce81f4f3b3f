//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (NETJAR_*, sections split on `__`)
//! 2. TOML config file (if NETJAR_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! Each component reads its own section. Per-call request options take
//! precedence over a section, and a section over the defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::CacheTtl;

mod validation;

pub use validation::{ConfigError, parse_header};

/// Application configuration with layered loading.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub net: NetConfig,

    #[serde(default)]
    pub proxy: ProxyConfig,
}

/// File cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Home directory for all caches.
    ///
    /// Set via NETJAR_CACHE__DIR.
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// Subdirectory of `dir` used by this cache.
    #[serde(default = "default_cache_name")]
    pub name: String,

    /// Seconds to keep entries: `0` disables the cache, `-1` keeps forever.
    #[serde(default = "default_cache_ttl")]
    pub ttl: CacheTtl,

    /// Extra entries deleted at random on each prune pass.
    #[serde(default)]
    pub wipe: usize,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./cache")
}

fn default_cache_name() -> String {
    "default".into()
}

fn default_cache_ttl() -> CacheTtl {
    CacheTtl::Seconds(365 * 24 * 3600)
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { dir: default_cache_dir(), name: default_cache_name(), ttl: default_cache_ttl(), wipe: 0 }
    }
}

impl CacheConfig {
    /// Full path of the cache directory (`dir/name`).
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }
}

/// Network transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetConfig {
    /// Total attempts per request, including the first one.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Connect timeout in seconds. `0` leaves it to the HTTP client.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Total request timeout in seconds. `0` means no limit.
    #[serde(default)]
    pub timeout_secs: u64,

    /// Minimum spacing between calls to one host (microseconds).
    #[serde(default = "default_throttle_min_us")]
    pub throttle_min_us: u64,

    /// Upper bound of the randomized spacing (microseconds).
    #[serde(default = "default_throttle_max_us")]
    pub throttle_max_us: u64,

    /// Spacing window used by JSON calls (microseconds).
    #[serde(default = "default_json_throttle_min_us")]
    pub json_throttle_min_us: u64,

    #[serde(default = "default_json_throttle_max_us")]
    pub json_throttle_max_us: u64,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Default headers sent with every request, as `Name: value`.
    #[serde(default)]
    pub headers: Vec<String>,

    /// Default headers for JSON calls, as `Name: value`.
    #[serde(default = "default_json_headers")]
    pub json_headers: Vec<String>,

    /// Netscape cookie jar read before and updated after every request.
    #[serde(default)]
    pub cookie_file: Option<PathBuf>,

    /// Compute throttle delays but never actually sleep.
    #[serde(default)]
    pub skip_sleep: bool,
}

fn default_retries() -> u32 {
    5
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_throttle_min_us() -> u64 {
    2_000_000
}

fn default_throttle_max_us() -> u64 {
    6_000_000
}

fn default_json_throttle_min_us() -> u64 {
    600_000
}

fn default_json_throttle_max_us() -> u64 {
    1_000_000
}

fn default_user_agent() -> String {
    "netjar/0.1".into()
}

fn default_json_headers() -> Vec<String> {
    vec!["X-Requested-With: XMLHttpRequest".into()]
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            connect_timeout_secs: default_connect_timeout_secs(),
            timeout_secs: 0,
            throttle_min_us: default_throttle_min_us(),
            throttle_max_us: default_throttle_max_us(),
            json_throttle_min_us: default_json_throttle_min_us(),
            json_throttle_max_us: default_json_throttle_max_us(),
            user_agent: default_user_agent(),
            headers: Vec::new(),
            json_headers: default_json_headers(),
            cookie_file: None,
            skip_sleep: false,
        }
    }
}

impl NetConfig {
    /// Connect timeout, if one is configured.
    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_secs > 0).then(|| Duration::from_secs(self.connect_timeout_secs))
    }

    /// Total request timeout, if one is configured.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Default throttle window for plain requests.
    pub fn throttle_window(&self) -> (Duration, Duration) {
        (Duration::from_micros(self.throttle_min_us), Duration::from_micros(self.throttle_max_us))
    }

    /// Throttle window for JSON requests.
    pub fn json_throttle_window(&self) -> (Duration, Duration) {
        (Duration::from_micros(self.json_throttle_min_us), Duration::from_micros(self.json_throttle_max_us))
    }

    /// Configuration suitable for tests: no sleeping, no throttle window.
    pub fn unthrottled() -> Self {
        Self {
            throttle_min_us: 0,
            throttle_max_us: 0,
            json_throttle_min_us: 0,
            json_throttle_max_us: 0,
            skip_sleep: true,
            ..Default::default()
        }
    }
}

/// Anti-bot challenge proxy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Route requests through the proxy instead of fetching directly.
    #[serde(default)]
    pub enabled: bool,

    /// Proxy API endpoint.
    #[serde(default = "default_proxy_endpoint")]
    pub endpoint: String,

    /// Keep one browser session per target host.
    #[serde(default = "default_true")]
    pub sessions: bool,

    /// Session lifetime requested from the proxy (seconds, sent as whole minutes).
    #[serde(default = "default_proxy_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// Max time the proxy may spend solving one challenge (seconds).
    #[serde(default = "default_proxy_timeout_secs")]
    pub timeout_secs: u64,

    /// Headers required by the proxy API, as `Name: value`.
    #[serde(default = "default_proxy_headers")]
    pub headers: Vec<String>,
}

fn default_proxy_endpoint() -> String {
    "http://localhost:8191/v1".into()
}

fn default_true() -> bool {
    true
}

fn default_proxy_session_ttl_secs() -> u64 {
    60
}

fn default_proxy_timeout_secs() -> u64 {
    60
}

fn default_proxy_headers() -> Vec<String> {
    vec!["Content-Type: application/json".into()]
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_proxy_endpoint(),
            sessions: true,
            session_ttl_secs: default_proxy_session_ttl_secs(),
            timeout_secs: default_proxy_timeout_secs(),
            headers: default_proxy_headers(),
        }
    }
}

impl ProxyConfig {
    /// `session_ttl_minutes` command field, if configured.
    pub fn session_ttl_minutes(&self) -> Option<u64> {
        (self.session_ttl_secs > 0).then_some(self.session_ttl_secs / 60)
    }

    /// `maxTimeout` command field in milliseconds, if configured.
    pub fn max_timeout_ms(&self) -> Option<u64> {
        (self.timeout_secs > 0).then_some(self.timeout_secs * 1000)
    }
}

impl AppConfig {
    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `NETJAR_`
    /// 2. TOML file from `NETJAR_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("NETJAR_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("NETJAR_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
