//! Cookie-jar file bound to a transport.
//!
//! Cookies are read from a Netscape jar file, sent with matching requests
//! and updated from `Set-Cookie` response headers. Entries are keyed by
//! name, like every other cookie map in netjar.

use std::path::{Path, PathBuf};

use url::Url;

use netjar_core::Error;
use netjar_core::cookies::{self, Cookie, CookieMap};

#[derive(Debug)]
pub struct CookieJar {
    path: PathBuf,
    cookies: CookieMap,
}

impl CookieJar {
    /// Load `path` if it exists, otherwise start empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let cookies = if path.is_file() { cookies::parse_jar_file(&path)? } else { CookieMap::new() };
        tracing::debug!("cookie jar {} ({} cookies)", path.display(), cookies.len());
        Ok(Self { path, cookies })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cookies(&self) -> &CookieMap {
        &self.cookies
    }

    /// Value for the `Cookie` request header, if any cookie applies to `url`.
    pub fn header_for(&self, url: &Url) -> Option<String> {
        let now = chrono::Utc::now().timestamp();
        let matching: Vec<&Cookie> = self.cookies.values().filter(|c| applies(c, url, now)).collect();
        if matching.is_empty() {
            return None;
        }
        Some(cookies::format_cookie_header(matching))
    }

    /// Apply `Set-Cookie` header values received from `url`.
    ///
    /// Returns whether the jar changed.
    pub fn absorb<'a>(&mut self, url: &Url, set_cookies: impl IntoIterator<Item = &'a str>) -> bool {
        let now = chrono::Utc::now().timestamp();
        let mut changed = false;

        for header in set_cookies {
            let Some(mut cookie) = cookies::parse_set_cookie(header) else {
                continue;
            };

            if cookie.domain.is_none() {
                cookie.domain = url.host_str().map(str::to_string);
            }
            if cookie.path.is_none() {
                cookie.path = Some("/".into());
            }
            if let Some(age) = cookie.max_age {
                cookie.expires = Some(if age > 0 { now + age } else { -1 });
            }

            if matches!(cookie.expires, Some(e) if e < 0) || cookie.is_expired(now) {
                changed |= self.cookies.remove(&cookie.name).is_some();
                continue;
            }

            if self.cookies.get(&cookie.name) != Some(&cookie) {
                self.cookies.insert(cookie.name.clone(), cookie);
                changed = true;
            }
        }

        changed
    }

    /// Write the jar back to its file.
    pub fn save(&self) -> Result<(), Error> {
        cookies::write_jar_file(&self.path, self.cookies.values())
    }
}

fn applies(cookie: &Cookie, url: &Url, now: i64) -> bool {
    if cookie.is_expired(now) {
        return false;
    }
    if cookie.is_secure() && url.scheme() != "https" {
        return false;
    }

    let host = url.host_str().unwrap_or_default();
    let domain_ok = match cookie.domain.as_deref().map(|d| d.trim_start_matches('.')) {
        None | Some("") => true,
        Some(d) => host.eq_ignore_ascii_case(d) || host.to_ascii_lowercase().ends_with(&format!(".{d}")),
    };

    let path_ok = match cookie.path.as_deref() {
        None | Some("") | Some("/") => true,
        Some(p) => url.path().starts_with(p),
    };

    domain_ok && path_ok
}
