//! HTTP client side of netjar.
//!
//! [`Transport`] throttles, retries and caches requests and keeps an
//! optional cookie-jar file. [`ProxyTransport`] sends the same requests
//! through a challenge-solving browser proxy. Both implement [`Fetcher`].

pub mod proxy;
pub mod transport;

pub use proxy::{ProxyCommand, ProxyTransport, SolvedPage};
pub use transport::{
    CookieJar, Fetcher, HttpExecutor, JsonReply, Method, RequestBody, RequestSpec, ReqwestExecutor, StatsSummary,
    Transport, TransportStats,
};
