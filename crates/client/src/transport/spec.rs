//! Per-request options.

use std::fmt;
use std::time::Duration;

/// HTTP method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Method {
    #[default]
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
        })
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        }
    }
}

/// POST payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// Sent as `application/x-www-form-urlencoded`.
    Form(Vec<(String, String)>),
    /// Sent verbatim; the caller supplies the content type.
    Text(String),
}

impl RequestBody {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            RequestBody::Form(fields) => form_encode(fields).into_bytes(),
            RequestBody::Text(text) => text.as_bytes().to_vec(),
        }
    }

    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            RequestBody::Form(_) => Some("application/x-www-form-urlencoded"),
            RequestBody::Text(_) => None,
        }
    }
}

/// Encode fields as a query string.
pub fn form_encode(fields: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .finish()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// Cache id, defaults to the request URL.
    pub key: Option<String>,
    /// Drop any cached entry before reading.
    pub refresh: bool,
    /// Neither read nor write the cache.
    pub bypass: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThrottleOptions {
    /// Throttle group, defaults to the URL host.
    pub host: Option<String>,
    /// `(wait_min, wait_max)`, defaults to the configured window.
    pub window: Option<(Duration, Duration)>,
}

/// Everything needed to perform one logical request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    /// Header overrides; matched case-insensitively against the defaults.
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    pub cache: CacheOptions,
    pub throttle: ThrottleOptions,
    /// Log JSON decode failures at error level.
    pub log_errors: bool,
}

impl RequestSpec {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            cache: CacheOptions::default(),
            throttle: ThrottleOptions::default(),
            log_errors: true,
        }
    }

    pub fn post(url: impl Into<String>, body: RequestBody) -> Self {
        Self { method: Method::Post, body: Some(body), ..Self::get(url) }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache.key = Some(key.into());
        self
    }

    pub fn refresh(mut self) -> Self {
        self.cache.refresh = true;
        self
    }

    pub fn bypass_cache(mut self) -> Self {
        self.cache.bypass = true;
        self
    }

    pub fn throttle_host(mut self, host: impl Into<String>) -> Self {
        self.throttle.host = Some(host.into());
        self
    }

    pub fn wait(mut self, min: Duration, max: Duration) -> Self {
        self.throttle.window = Some((min, max));
        self
    }

    pub fn quiet(mut self) -> Self {
        self.log_errors = false;
        self
    }

    /// Effective cache id.
    pub fn key(&self) -> &str {
        self.cache.key.as_deref().unwrap_or(&self.url)
    }
}

/// Overlay `overrides` on `defaults`; names compare case-insensitively and
/// an override replaces every default of the same name.
pub fn merge_headers(defaults: &[(String, String)], overrides: &[(String, String)]) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = defaults
        .iter()
        .filter(|(k, _)| !overrides.iter().any(|(o, _)| o.eq_ignore_ascii_case(k)))
        .cloned()
        .collect();
    merged.extend(overrides.iter().cloned());
    merged
}

pub fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(k: &str, v: &str) -> (String, String) {
        (k.to_string(), v.to_string())
    }

    #[test]
    fn test_merge_headers_override_wins() {
        let defaults = vec![h("Accept", "text/html"), h("X-Requested-With", "XMLHttpRequest")];
        let overrides = vec![h("accept", "application/json")];

        let merged = merge_headers(&defaults, &overrides);
        assert_eq!(merged, vec![h("X-Requested-With", "XMLHttpRequest"), h("accept", "application/json")]);
        assert!(has_header(&merged, "ACCEPT"));
    }

    #[test]
    fn test_spec_builder() {
        let spec = RequestSpec::get("https://example.com/a").refresh().throttle_host("group").quiet();
        assert_eq!(spec.key(), "https://example.com/a");
        assert!(spec.cache.refresh);
        assert!(!spec.log_errors);
        assert_eq!(spec.throttle.host.as_deref(), Some("group"));

        let spec = spec.cache_key("custom");
        assert_eq!(spec.key(), "custom");
    }

    #[test]
    fn test_form_body() {
        let body = RequestBody::Form(vec![h("q", "a b"), h("x", "&=")]);
        assert_eq!(body.encode(), b"q=a+b&x=%26%3D".to_vec());
        assert_eq!(body.content_type(), Some("application/x-www-form-urlencoded"));
        assert_eq!(RequestBody::Text("{}".into()).content_type(), None);
    }
}
