//! Netscape / Mozilla cookie-jar text format.

use std::fs;
use std::path::Path;

use super::{Cookie, CookieMap, urldecode, urlencode};
use crate::Error;

const HTTPONLY_PREFIX: &str = "#HttpOnly_";
const JAR_HEADER: &str = "# Netscape HTTP Cookie File";

/// Serialize one cookie as a jar line, without the trailing newline.
///
/// Fields: `domain  subdomains  path  secure  expires  name  value`.
/// Missing attributes fall back to an empty domain, path `/`,
/// not secure and session expiry.
pub fn to_netscape_line(cookie: &Cookie) -> String {
    let domain = match cookie.domain.as_deref() {
        Some(d) if d.starts_with('.') => d.to_string(),
        Some(d) if !d.is_empty() => format!(".{d}"),
        _ => String::new(),
    };
    let subdomains = if domain.is_empty() { "FALSE" } else { "TRUE" };

    let fields: [&str; 7] = [
        domain.as_str(),
        subdomains,
        cookie.path.as_deref().unwrap_or("/"),
        if cookie.is_secure() { "TRUE" } else { "FALSE" },
        &cookie.expires.unwrap_or(0).to_string(),
        &cookie.name,
        &urlencode(&cookie.value),
    ];

    let prefix = if cookie.is_httponly() { HTTPONLY_PREFIX } else { "" };
    format!("{prefix}{}", fields.join("\t"))
}

/// Parse jar text into cookies keyed by name.
///
/// Comments and blank lines are skipped; `#HttpOnly_` lines are cookies.
/// Lines that do not have exactly seven fields are ignored.
pub fn parse_jar(text: &str) -> CookieMap {
    let mut cookies = CookieMap::new();

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || (line.starts_with('#') && !line.starts_with(HTTPONLY_PREFIX)) {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        let [domain, _subdomains, path, secure, expires, name, value] = fields.as_slice() else {
            continue;
        };

        let (domain, httponly) = match domain.strip_prefix(HTTPONLY_PREFIX) {
            Some(rest) => (rest, true),
            None => (*domain, false),
        };

        let cookie = Cookie {
            path: Some(path.to_string()),
            domain: Some(domain.trim_start_matches('.').to_string()),
            expires: Some(expires.trim().parse().unwrap_or(0)),
            secure: Some(*secure == "TRUE"),
            httponly: Some(httponly),
            ..Cookie::new(*name, urldecode(value))
        };
        cookies.insert(cookie.name.clone(), cookie);
    }

    cookies
}

/// Read and parse a jar file.
pub fn parse_jar_file(path: impl AsRef<Path>) -> Result<CookieMap, Error> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| Error::Cookie(format!("read {}: {e}", path.display())))?;
    Ok(parse_jar(&text))
}

/// Write cookies to a jar file, replacing its contents.
pub fn write_jar_file<'a>(path: impl AsRef<Path>, cookies: impl IntoIterator<Item = &'a Cookie>) -> Result<(), Error> {
    let path = path.as_ref();

    let mut out = String::from(JAR_HEADER);
    out.push_str("\n\n");
    for cookie in cookies {
        out.push_str(&to_netscape_line(cookie));
        out.push('\n');
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::Cookie(format!("create {}: {e}", parent.display())))?;
    }
    fs::write(path, out).map_err(|e| Error::Cookie(format!("write {}: {e}", path.display())))?;

    tracing::debug!("cookie jar written {}", path.display());
    Ok(())
}
