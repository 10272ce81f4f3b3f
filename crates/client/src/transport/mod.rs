//! Throttled, retrying, caching HTTP transport.
//!
//! ### Request lifecycle
//! - Throttle: space calls to the same host by a random delay in a window
//! - Execute: one exchange through the [`HttpExecutor`]
//! - Retry: transient failures are retried until the attempt budget is spent
//!
//! ### Caching
//! - `get_url` answers from the file cache when possible
//! - `get_json` decodes and archives undecodable replies under `err`
//!
//! One request is in flight at a time; every request method takes `&mut self`.

pub mod executor;
pub mod jar;
pub mod spec;
pub mod stats;
pub mod throttle;

pub use executor::{HttpExecutor, HttpRequest, HttpResponse, NetErrorKind, NetFailure, ReqwestExecutor};
pub use jar::CookieJar;
pub use spec::{CacheOptions, Method, RequestBody, RequestSpec, ThrottleOptions};
pub use stats::{StatsSummary, TransportStats};
pub use throttle::ThrottleClock;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use netjar_core::cookies::{self, CookieMap};
use netjar_core::{Cache, Error, NetConfig};

/// Decoded JSON, or the raw reply when it could not be decoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JsonReply {
    Data(Value),
    Malformed { url: String, data: String, errors: BTreeMap<String, String> },
}

impl JsonReply {
    pub fn data(&self) -> Option<&Value> {
        match self {
            JsonReply::Data(v) => Some(v),
            JsonReply::Malformed { .. } => None,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, JsonReply::Malformed { .. })
    }
}

/// Common surface of [`Transport`] and the challenge-proxy transport.
#[async_trait::async_trait]
pub trait Fetcher: Send {
    /// Response body, from cache when available.
    async fn get_url(&mut self, spec: &RequestSpec) -> Result<Bytes, Error>;

    /// Decoded JSON body.
    async fn get_json(&mut self, spec: &RequestSpec) -> Result<JsonReply, Error>;
}

/// HTTP transport with throttling, retries, a response cache and an
/// optional cookie-jar file.
pub struct Transport {
    executor: Box<dyn HttpExecutor>,
    config: NetConfig,
    cache: Cache,
    clock: ThrottleClock,
    stats: TransportStats,
    jar: Option<CookieJar>,
    default_headers: Vec<(String, String)>,
    json_headers: Vec<(String, String)>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("cache", &self.cache)
            .field("stats", &self.stats)
            .field("jar", &self.jar.as_ref().map(CookieJar::path))
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Transport backed by `reqwest`.
    pub fn new(config: NetConfig, cache: Cache) -> Result<Self, Error> {
        let executor = ReqwestExecutor::new(&config)?;
        Self::with_executor(config, cache, executor)
    }

    /// Transport backed by a custom executor.
    pub fn with_executor(config: NetConfig, cache: Cache, executor: impl HttpExecutor + 'static) -> Result<Self, Error> {
        let jar = match &config.cookie_file {
            Some(path) => Some(CookieJar::open(path)?),
            None => None,
        };

        Ok(Self {
            executor: Box::new(executor),
            default_headers: parse_headers(&config.headers),
            json_headers: parse_headers(&config.json_headers),
            config,
            cache,
            clock: ThrottleClock::new(),
            stats: TransportStats::new(),
            jar,
        })
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut Cache {
        &mut self.cache
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    /// Formatted statistics, rebuilt only after new activity.
    pub fn summary(&mut self) -> &StatsSummary {
        self.stats.summary()
    }

    pub fn jar(&self) -> Option<&CookieJar> {
        self.jar.as_ref()
    }

    /// Wait before calling `host`, then record the call.
    ///
    /// Returns the delay chosen, even when sleeping is disabled.
    pub async fn throttle(&mut self, host: &str, min: Duration, max: Duration) -> Duration {
        let wait = self.clock.delay(host, min, max, Instant::now());

        if !wait.is_zero() {
            tracing::debug!(
                "request #{} to {}: sleep {:.3}s (window {:.1}s..{:.1}s)",
                self.clock.calls() + 1,
                host,
                wait.as_secs_f64(),
                min.min(max).as_secs_f64(),
                max.max(min).as_secs_f64()
            );
            self.stats.record_sleep(wait);
            if !self.config.skip_sleep {
                tokio::time::sleep(wait).await;
            }
        }

        self.clock.record(host, Instant::now());
        self.stats.record_call();
        tracing::debug!("request #{} | #{}: {}", self.clock.calls(), self.clock.host_calls(host), host);
        wait
    }

    /// Perform the request, retrying transient failures. Never cached.
    pub async fn execute(&mut self, spec: &RequestSpec) -> Result<HttpResponse, Error> {
        let url = parse_url(&spec.url)?;
        let request = self.build_request(spec, &url);

        let host = spec
            .throttle
            .host
            .clone()
            .or_else(|| url.host_str().map(str::to_string))
            .unwrap_or_else(|| "default".into());
        let (min, max) = spec.throttle.window.unwrap_or_else(|| self.config.throttle_window());

        self.stats.set_last_url(url.as_str());

        let attempts = self.config.retries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.throttle(&host, min, max).await;

            match self.executor.execute(&request).await {
                Ok(response) => {
                    self.stats.record_exchange(response.elapsed, request.wire_size(), response.body.len() as u64);
                    self.absorb_cookies(&url, &response);
                    return Ok(response);
                }
                Err(failure) => {
                    let left = attempts - attempt;
                    if left > 0 && failure.kind.is_retryable() {
                        tracing::debug!("{}", failure);
                        tracing::debug!("retries left: {}", left);
                        continue;
                    }
                    return Err(failure.into());
                }
            }
        }
    }

    /// Body for `spec`, from cache or network.
    pub async fn get_url(&mut self, spec: &RequestSpec) -> Result<Bytes, Error> {
        let key = spec.key().to_string();
        tracing::debug!("get {} [{}]", spec.url, spec.method);

        if spec.cache.bypass {
            return Ok(self.execute(spec).await?.body);
        }

        if spec.cache.refresh {
            self.cache.del(&key);
        }

        if let Some(data) = self.cache.get(&key) {
            return Ok(Bytes::from(data));
        }

        let body = self.execute(spec).await?.body;
        self.cache.put(&key, &body);
        Ok(body)
    }

    /// Decoded JSON for `spec`.
    ///
    /// Uses the JSON throttle window and JSON default headers unless the
    /// request overrides them. Undecodable replies are archived and
    /// returned as [`JsonReply::Malformed`].
    pub async fn get_json(&mut self, spec: &RequestSpec) -> Result<JsonReply, Error> {
        let mut spec = spec.clone();
        spec.headers = spec::merge_headers(&self.json_headers, &spec.headers);
        if spec.throttle.window.is_none() {
            spec.throttle.window = Some(self.config.json_throttle_window());
        }

        let data = self.get_url(&spec).await?;
        Ok(decode_json(&mut self.cache, &spec, &data))
    }

    /// Cookies set by the response to `spec`. Never cached.
    pub async fn fetch_cookies(&mut self, spec: &RequestSpec) -> Result<CookieMap, Error> {
        let response = self.execute(spec).await?;
        Ok(cookies::extract_set_cookies(&response.raw_headers()))
    }

    fn build_request(&self, spec: &RequestSpec, url: &Url) -> HttpRequest {
        let mut headers = spec::merge_headers(&self.default_headers, &spec.headers);

        if !spec::has_header(&headers, "cookie")
            && let Some(value) = self.jar.as_ref().and_then(|jar| jar.header_for(url))
        {
            headers.push(("Cookie".into(), value));
        }

        let body = spec.body.as_ref().map(|b| {
            if let Some(ct) = b.content_type()
                && !spec::has_header(&headers, "content-type")
            {
                headers.push(("Content-Type".into(), ct.into()));
            }
            b.encode()
        });

        HttpRequest { method: spec.method, url: url.clone(), headers, body }
    }

    fn absorb_cookies(&mut self, url: &Url, response: &HttpResponse) {
        let Some(jar) = self.jar.as_mut() else {
            return;
        };

        if jar.absorb(url, response.header_values("set-cookie"))
            && let Err(e) = jar.save()
        {
            tracing::error!("{}", e);
        }
    }
}

#[async_trait::async_trait]
impl Fetcher for Transport {
    async fn get_url(&mut self, spec: &RequestSpec) -> Result<Bytes, Error> {
        Transport::get_url(self, spec).await
    }

    async fn get_json(&mut self, spec: &RequestSpec) -> Result<JsonReply, Error> {
        Transport::get_json(self, spec).await
    }
}

/// Decode `data`, archiving the cache entry of `spec` on failure.
pub(crate) fn decode_json(cache: &mut Cache, spec: &RequestSpec, data: &[u8]) -> JsonReply {
    match serde_json::from_slice::<Value>(data) {
        Ok(value) => JsonReply::Data(value),
        Err(e) => {
            cache.archive(spec.key(), "err");

            let errors = BTreeMap::from([("json".to_string(), e.to_string())]);
            if spec.log_errors {
                tracing::error!("invalid JSON from {}: {}", spec.url, e);
            }
            JsonReply::Malformed { url: spec.url.clone(), data: String::from_utf8_lossy(data).into_owned(), errors }
        }
    }
}

pub(crate) fn parse_url(raw: &str) -> Result<Url, Error> {
    let url = Url::parse(raw.trim()).map_err(|e| Error::InvalidUrl(format!("{raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        "http" | "https" => Err(Error::InvalidUrl(format!("{raw}: missing host"))),
        scheme => Err(Error::InvalidUrl(format!("unsupported scheme: {scheme}"))),
    }
}

fn parse_headers(lines: &[String]) -> Vec<(String, String)> {
    lines.iter().filter_map(|line| netjar_core::config::parse_header(line)).collect()
}

#[cfg(test)]
mod tests;
