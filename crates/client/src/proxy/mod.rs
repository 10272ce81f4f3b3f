//! Challenge-solving proxy client.
//!
//! Target pages are fetched by a FlareSolverr-compatible proxy that drives a
//! real browser. Commands are JSON documents POSTed to the proxy endpoint
//! through an inner [`Transport`], so they share its cache, throttling and
//! statistics.
//!
//! With sessions enabled, one browser session is kept per target host and
//! must be released with [`ProxyTransport::close`].

pub mod command;

pub use command::{Command, ProxyCommand, ProxyCookie, ProxyResult, SolvedPage, Solution};

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;

use netjar_core::cache::ARCHIVE_SUFFIX;
use netjar_core::{Error, ProxyConfig};

use crate::transport::{self, Fetcher, JsonReply, Method, RequestBody, RequestSpec, Transport};

pub struct ProxyTransport {
    inner: Transport,
    config: ProxyConfig,
    headers: Vec<(String, String)>,
    endpoint_host: String,
    /// Live sessions: target host -> creation time (epoch ms).
    sessions: BTreeMap<String, i64>,
    last_solution: Option<SolvedPage>,
}

impl std::fmt::Debug for ProxyTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyTransport")
            .field("endpoint", &self.config.endpoint)
            .field("sessions", &self.sessions)
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl ProxyTransport {
    pub fn new(config: ProxyConfig, inner: Transport) -> Result<Self, Error> {
        let endpoint = transport::parse_url(&config.endpoint)?;
        let endpoint_host = endpoint.host_str().unwrap_or_default().to_string();
        let headers = config.headers.iter().filter_map(|line| netjar_core::config::parse_header(line)).collect();

        Ok(Self { inner, config, headers, endpoint_host, sessions: BTreeMap::new(), last_solution: None })
    }

    pub fn inner(&self) -> &Transport {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut Transport {
        &mut self.inner
    }

    /// Hosts with a live proxy session.
    pub fn sessions(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }

    /// The most recent solution, including the browser cookies.
    pub fn last_solution(&self) -> Option<&SolvedPage> {
        self.last_solution.as_ref()
    }

    /// Page body of `url`, fetched by the proxy browser.
    pub async fn get(&mut self, url: &str) -> Result<String, Error> {
        self.dispatch(ProxyCommand::get(url)).await
    }

    /// Submit `fields` to `url` through the proxy browser.
    pub async fn post(&mut self, url: &str, fields: &[(String, String)]) -> Result<String, Error> {
        self.dispatch(ProxyCommand::post(url, fields)).await
    }

    /// Run a request command and return the solved page body.
    pub async fn dispatch(&mut self, command: ProxyCommand) -> Result<String, Error> {
        self.dispatch_with(command, false).await
    }

    async fn dispatch_with(&mut self, mut command: ProxyCommand, refresh: bool) -> Result<String, Error> {
        if !command.cmd.is_request() {
            return Err(Error::Proxy(format!("{} is not a request command", command.cmd)));
        }
        let Some(url) = command.url.clone() else {
            return Err(Error::Proxy(format!("{} without url", command.cmd)));
        };
        let target = transport::parse_url(&url)?;

        if self.config.sessions {
            let host = target.host_str().unwrap_or_default().to_string();
            if self.sessions.contains_key(&host) {
                tracing::debug!("session used: {}", host);
            } else {
                self.call(ProxyCommand::create_session(&host), false).await?;
                self.sessions.insert(host.clone(), chrono::Utc::now().timestamp_millis());
                tracing::info!("session created: {}", host);
            }
            command.session = Some(host);
        }

        command.session_ttl_minutes = self.config.session_ttl_minutes();
        command.max_timeout = self.config.max_timeout_ms();

        let result = self.call(command, refresh).await?;
        self.accept(result, &url)
    }

    /// Remember the solution of `result` and return the page body.
    fn accept(&mut self, result: ProxyResult, url: &str) -> Result<String, Error> {
        let Some(solution) = result.solution else {
            return Err(Error::Proxy(format!("no solution for {url}")));
        };

        self.last_solution = Some(SolvedPage::from(&solution));
        Ok(solution.response)
    }

    /// Destroy every live session.
    ///
    /// All sessions are attempted and forgotten; the first failure is returned.
    pub async fn close(&mut self) -> Result<(), Error> {
        let mut first = None;

        for host in std::mem::take(&mut self.sessions).into_keys() {
            tracing::info!("session destroy: {}", host);
            if let Err(e) = self.call(ProxyCommand::destroy_session(&host), false).await {
                tracing::error!("{}", e);
                if first.is_none() {
                    first = Some(e);
                }
            }
        }

        first.map_or(Ok(()), Err)
    }

    /// POST `command` to the endpoint and check the reply.
    ///
    /// Request replies are cached under the target URL and throttled per
    /// target host. Session commands skip the cache and are not delayed.
    async fn call(&mut self, command: ProxyCommand, refresh: bool) -> Result<ProxyResult, Error> {
        let json = serde_json::to_string(&command).map_err(|e| Error::Proxy(e.to_string()))?;

        let mut spec = RequestSpec::post(&self.config.endpoint, RequestBody::Text(json));
        spec.headers = self.headers.clone();

        spec = match command.url.as_deref() {
            Some(url) if command.cmd.is_request() => {
                let host = transport::parse_url(url)?.host_str().unwrap_or_default().to_string();
                let (min, max) = self.inner.config().throttle_window();
                let spec = spec.cache_key(url).throttle_host(host).wait(min, max);
                if refresh { spec.refresh() } else { spec }
            }
            _ => spec
                .cache_key(format!("{}?{}", self.config.endpoint, command.cmd))
                .bypass_cache()
                .throttle_host(&self.endpoint_host)
                .wait(Duration::ZERO, Duration::ZERO),
        };

        tracing::debug!("{} {}", command.cmd, command.url.as_deref().or(command.session.as_deref()).unwrap_or(""));

        // only the proxy headers go to the endpoint, never the JSON defaults
        let data = self.inner.get_url(&spec).await?;
        let reply = transport::decode_json(self.inner.cache_mut(), &spec, &data);
        self.settle(spec.key(), command.cmd.is_request(), reply)
    }

    /// Check a decoded reply; failures archive the cache entry under `key`.
    fn settle(&mut self, key: &str, is_request: bool, reply: JsonReply) -> Result<ProxyResult, Error> {
        match check_reply(reply) {
            Ok(result) if is_request && result.solution.is_none() => {
                self.inner.cache_mut().archive(key, ARCHIVE_SUFFIX);
                Err(Error::Proxy(format!("no solution for {key}")))
            }
            Ok(result) => Ok(result),
            Err(message) => {
                self.inner.cache_mut().archive(key, ARCHIVE_SUFFIX);
                Err(Error::Proxy(message))
            }
        }
    }

    /// Solved page for `url` from the cache, without contacting the proxy.
    fn cached(&mut self, url: &str) -> Option<Result<String, Error>> {
        let data = self.inner.cache_mut().get(url)?;
        tracing::debug!("cached proxy reply for {}", url);

        let spec = RequestSpec::post(&self.config.endpoint, RequestBody::Text(String::new())).cache_key(url);
        let reply = transport::decode_json(self.inner.cache_mut(), &spec, &data);
        Some(self.settle(url, true, reply).and_then(|result| self.accept(result, url)))
    }
}

fn check_reply(reply: JsonReply) -> Result<ProxyResult, String> {
    let value = match reply {
        JsonReply::Data(value) => value,
        JsonReply::Malformed { errors, .. } => {
            let errors: Vec<String> = errors.into_iter().map(|(k, v)| format!("{k}: {v}")).collect();
            return Err(format!("invalid reply: {}", errors.join(", ")));
        }
    };

    let result: ProxyResult = serde_json::from_value(value).map_err(|e| format!("invalid reply: {e}"))?;
    match result.failure() {
        Some(message) => Err(message),
        None => Ok(result),
    }
}

impl Drop for ProxyTransport {
    fn drop(&mut self) {
        if !self.sessions.is_empty() {
            let hosts: Vec<&str> = self.sessions().collect();
            tracing::warn!("dropping proxy transport with live sessions: {}", hosts.join(", "));
        }
    }
}

#[async_trait::async_trait]
impl Fetcher for ProxyTransport {
    /// Page body through the proxy. Cache keys and throttle options of
    /// `spec` are replaced by the proxy rules; `refresh` is honoured.
    ///
    /// A cached page is returned without opening a proxy session.
    async fn get_url(&mut self, spec: &RequestSpec) -> Result<Bytes, Error> {
        if !spec.cache.refresh
            && let Some(cached) = self.cached(&spec.url)
        {
            return cached.map(Bytes::from);
        }

        let command = match (&spec.method, &spec.body) {
            (Method::Post, Some(RequestBody::Form(fields))) => ProxyCommand::post(&spec.url, fields),
            (Method::Post, Some(RequestBody::Text(data))) => ProxyCommand::post_raw(&spec.url, data),
            (Method::Post, None) => ProxyCommand::post_raw(&spec.url, ""),
            (Method::Get, _) => ProxyCommand::get(&spec.url),
        };
        let body = self.dispatch_with(command, spec.cache.refresh).await?;
        Ok(Bytes::from(body))
    }

    async fn get_json(&mut self, spec: &RequestSpec) -> Result<JsonReply, Error> {
        let data = Fetcher::get_url(self, spec).await?;
        let spec = RequestSpec { cache: transport::CacheOptions { key: None, ..spec.cache.clone() }, ..spec.clone() };
        Ok(transport::decode_json(self.inner.cache_mut(), &spec, &data))
    }
}
