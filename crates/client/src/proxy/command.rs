//! Wire types of the challenge-proxy JSON API.

use std::fmt;

use serde::{Deserialize, Serialize};

use netjar_core::Cookie;
use netjar_core::cookies::CookieMap;

use crate::transport::spec::form_encode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    #[serde(rename = "request.get")]
    RequestGet,
    #[serde(rename = "request.post")]
    RequestPost,
    #[serde(rename = "sessions.create")]
    SessionsCreate,
    #[serde(rename = "sessions.destroy")]
    SessionsDestroy,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::RequestGet => "request.get",
            Command::RequestPost => "request.post",
            Command::SessionsCreate => "sessions.create",
            Command::SessionsDestroy => "sessions.destroy",
        }
    }

    /// Whether the command fetches a target page.
    pub fn is_request(self) -> bool {
        matches!(self, Command::RequestGet | Command::RequestPost)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One command posted to the proxy endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyCommand {
    pub cmd: Command,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(rename = "postData", default, skip_serializing_if = "Option::is_none")]
    pub post_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_ttl_minutes: Option<u64>,
    #[serde(rename = "maxTimeout", default, skip_serializing_if = "Option::is_none")]
    pub max_timeout: Option<u64>,
}

impl ProxyCommand {
    fn new(cmd: Command) -> Self {
        Self { cmd, url: None, session: None, post_data: None, session_ttl_minutes: None, max_timeout: None }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self { url: Some(url.into()), ..Self::new(Command::RequestGet) }
    }

    pub fn post(url: impl Into<String>, fields: &[(String, String)]) -> Self {
        Self::post_raw(url, form_encode(fields))
    }

    /// POST with an already encoded body.
    pub fn post_raw(url: impl Into<String>, data: impl Into<String>) -> Self {
        Self { url: Some(url.into()), post_data: Some(data.into()), ..Self::new(Command::RequestPost) }
    }

    pub fn create_session(session: impl Into<String>) -> Self {
        Self { session: Some(session.into()), ..Self::new(Command::SessionsCreate) }
    }

    pub fn destroy_session(session: impl Into<String>) -> Self {
        Self { session: Some(session.into()), ..Self::new(Command::SessionsDestroy) }
    }
}

/// Proxy reply envelope.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProxyResult {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub solution: Option<Solution>,
}

impl ProxyResult {
    /// Failure reported by the proxy itself, if any.
    pub fn failure(&self) -> Option<String> {
        if let Some(error) = &self.error {
            return Some(format!("proxy error: {error}"));
        }
        if self.status.as_deref() == Some("error") {
            return Some(format!("proxy error: {}", self.message.as_deref().unwrap_or("unknown")));
        }
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Solution {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub cookies: Vec<ProxyCookie>,
    #[serde(rename = "userAgent", default)]
    pub user_agent: String,
    #[serde(default)]
    pub response: String,
}

/// Browser cookie as reported in a solution.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProxyCookie {
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub expiry: Option<i64>,
    #[serde(rename = "httpOnly", default)]
    pub http_only: Option<bool>,
    #[serde(default)]
    pub secure: Option<bool>,
    #[serde(rename = "sameSite", default)]
    pub same_site: Option<String>,
}

impl From<&ProxyCookie> for Cookie {
    fn from(pc: &ProxyCookie) -> Self {
        let mut cookie = Cookie::new(&pc.name, &pc.value);
        cookie.domain = pc.domain.clone();
        cookie.path = pc.path.clone();
        cookie.expires = pc.expiry;
        cookie.httponly = pc.http_only;
        cookie.secure = pc.secure;
        cookie.samesite = pc.same_site.as_deref().map(str::to_ascii_lowercase);
        cookie
    }
}

/// The last page solved by the proxy.
#[derive(Debug, Clone, PartialEq)]
pub struct SolvedPage {
    /// Final URL in the browser.
    pub url: String,
    pub status: u16,
    pub user_agent: String,
    pub cookies: CookieMap,
}

impl From<&Solution> for SolvedPage {
    fn from(solution: &Solution) -> Self {
        let cookies = solution.cookies.iter().map(|pc| (pc.name.clone(), Cookie::from(pc))).collect();
        Self { url: solution.url.clone(), status: solution.status, user_agent: solution.user_agent.clone(), cookies }
    }
}
