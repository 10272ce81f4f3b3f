//! The seam between [`Transport`](super::Transport) and the network.
//!
//! An [`HttpExecutor`] performs exactly one HTTP exchange. It never retries,
//! never throttles and never caches; failures are classified into
//! [`NetErrorKind`] so the caller can decide whether to try again.

use std::error::Error as StdError;
use std::fmt;
use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::Client;
use url::Url;

use netjar_core::{Error, NetConfig};

use super::spec::Method;

/// Redirects followed before giving up.
const MAX_REDIRECTS: usize = 10;

/// A fully resolved request, ready to go on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Approximate bytes on the wire: request line, headers and body.
    pub fn wire_size(&self) -> u64 {
        let target = match self.url.query() {
            Some(q) => format!("{}?{}", self.url.path(), q),
            None => self.url.path().to_string(),
        };
        let line = format!("{} {} HTTP/1.1\r\n", self.method, target).len();
        let headers: usize = self.headers.iter().map(|(k, v)| k.len() + v.len() + 4).sum();
        let body = self.body.as_ref().map_or(0, Vec::len);
        (line + headers + 2 + body) as u64
    }
}

/// A completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// Final URL after redirects.
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub elapsed: Duration,
}

impl HttpResponse {
    /// All values of a header, case-insensitive.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Status line plus headers, as they appeared on the wire.
    pub fn raw_headers(&self) -> String {
        let mut raw = format!("HTTP/1.1 {}\r\n", self.status);
        for (k, v) in &self.headers {
            raw.push_str(&format!("{k}: {v}\r\n"));
        }
        raw.push_str("\r\n");
        raw
    }
}

/// Classified network failure, numbered after the libcurl error codes
/// used by most HTTP tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetErrorKind {
    FailedInit,
    UrlMalformat,
    CouldntResolveHost,
    CouldntConnect,
    HttpNotFound,
    ReadError,
    OperationTimedOut,
    HttpPostError,
    SslConnectError,
    TooManyRedirects,
    RecvError,
}

impl NetErrorKind {
    pub fn code(self) -> u32 {
        match self {
            NetErrorKind::FailedInit => 2,
            NetErrorKind::UrlMalformat => 3,
            NetErrorKind::CouldntResolveHost => 6,
            NetErrorKind::CouldntConnect => 7,
            NetErrorKind::HttpNotFound => 22,
            NetErrorKind::ReadError => 26,
            NetErrorKind::OperationTimedOut => 28,
            NetErrorKind::HttpPostError => 34,
            NetErrorKind::SslConnectError => 35,
            NetErrorKind::TooManyRedirects => 47,
            NetErrorKind::RecvError => 56,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NetErrorKind::FailedInit => "FAILED_INIT",
            NetErrorKind::UrlMalformat => "URL_MALFORMAT",
            NetErrorKind::CouldntResolveHost => "COULDNT_RESOLVE_HOST",
            NetErrorKind::CouldntConnect => "COULDNT_CONNECT",
            NetErrorKind::HttpNotFound => "HTTP_NOT_FOUND",
            NetErrorKind::ReadError => "READ_ERROR",
            NetErrorKind::OperationTimedOut => "OPERATION_TIMEDOUT",
            NetErrorKind::HttpPostError => "HTTP_POST_ERROR",
            NetErrorKind::SslConnectError => "SSL_CONNECT_ERROR",
            NetErrorKind::TooManyRedirects => "TOO_MANY_REDIRECTS",
            NetErrorKind::RecvError => "RECV_ERROR",
        }
    }

    /// Transient failures worth another attempt.
    ///
    /// HTTP 404 is included: some origins answer 404 while warming up.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            NetErrorKind::CouldntResolveHost
                | NetErrorKind::CouldntConnect
                | NetErrorKind::HttpNotFound
                | NetErrorKind::ReadError
                | NetErrorKind::OperationTimedOut
                | NetErrorKind::HttpPostError
                | NetErrorKind::SslConnectError
        )
    }
}

/// A failed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetFailure {
    pub kind: NetErrorKind,
    pub message: String,
}

impl NetFailure {
    pub fn new(kind: NetErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

impl fmt::Display for NetFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error #{} {}: {}", self.kind.code(), self.kind.name(), self.message)
    }
}

impl From<NetFailure> for Error {
    fn from(failure: NetFailure) -> Self {
        Error::Transport { code: failure.kind.code(), name: failure.kind.name(), message: failure.message }
    }
}

/// Performs a single HTTP exchange.
#[async_trait::async_trait]
pub trait HttpExecutor: Send + Sync {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, NetFailure>;
}

/// [`HttpExecutor`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestExecutor {
    http: Client,
}

impl ReqwestExecutor {
    /// Build the HTTP client from the network settings.
    pub fn new(config: &NetConfig) -> Result<Self, Error> {
        let mut builder = Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true);

        if let Some(t) = config.connect_timeout() {
            builder = builder.connect_timeout(t);
        }
        if let Some(t) = config.timeout() {
            builder = builder.timeout(t);
        }

        let http = builder.build().map_err(|e| {
            NetFailure::new(NetErrorKind::FailedInit, format!("failed to build HTTP client: {e}"))
        })?;

        Ok(Self { http })
    }
}

#[async_trait::async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, NetFailure> {
        let start = Instant::now();

        let mut builder = self.http.request(request.method.into(), request.url.as_str());
        for (k, v) in &request.headers {
            builder = builder.header(k.as_str(), v.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| classify(&e, request.method))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(NetFailure::new(
                NetErrorKind::HttpNotFound,
                format!("The requested URL returned error: {}", status.as_u16()),
            ));
        }

        let url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();

        let body = response.bytes().await.map_err(|e| classify(&e, request.method))?;
        let elapsed = start.elapsed();

        tracing::debug!(
            "{} {} -> {} in {}ms ({} bytes)",
            request.method,
            request.url,
            status.as_u16(),
            elapsed.as_millis(),
            body.len()
        );

        Ok(HttpResponse { status: status.as_u16(), url, headers, body, elapsed })
    }
}

/// Map a `reqwest` error onto the closest transport code.
fn classify(err: &reqwest::Error, method: Method) -> NetFailure {
    let chain = error_chain(err);
    let lower = chain.to_lowercase();

    let kind = if err.is_timeout() {
        NetErrorKind::OperationTimedOut
    } else if err.is_builder() {
        NetErrorKind::UrlMalformat
    } else if err.is_redirect() {
        NetErrorKind::TooManyRedirects
    } else if err.is_connect() {
        if lower.contains("dns") || lower.contains("lookup") || lower.contains("resolve") {
            NetErrorKind::CouldntResolveHost
        } else if lower.contains("tls") || lower.contains("certificate") || lower.contains("handshake") {
            NetErrorKind::SslConnectError
        } else {
            NetErrorKind::CouldntConnect
        }
    } else if err.is_body() || err.is_decode() || err.is_request() {
        match method {
            Method::Post => NetErrorKind::HttpPostError,
            Method::Get => NetErrorKind::ReadError,
        }
    } else {
        NetErrorKind::RecvError
    };

    NetFailure::new(kind, chain)
}

fn error_chain(err: &reqwest::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(e) = source {
        parts.push(e.to_string());
        source = e.source();
    }
    parts.join(": ")
}
