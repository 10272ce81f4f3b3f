pub mod cache;
pub mod config;
pub mod cookies;
pub mod error;

pub use cache::{Cache, CacheTtl};
pub use config::{AppConfig, CacheConfig, ConfigError, NetConfig, ProxyConfig};
pub use cookies::{AttrValue, Cookie, CookieMap};
pub use error::Error;
