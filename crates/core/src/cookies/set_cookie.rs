//! `Set-Cookie` / `Cookie` header handling.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime};
use regex::Regex;

use super::{AttrValue, Cookie, CookieMap, urldecode, urlencode};

static SET_COOKIE_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?mi)^Set-Cookie:[ \t]*([^\r\n]*)").ok());

/// Naive layouts tried after RFC 2822, with any `GMT`/`UTC` zone removed.
const HTTP_DATE_FORMATS: &[&str] = &[
    "%a, %d %b %Y %H:%M:%S",
    "%a, %d-%b-%Y %H:%M:%S",
    "%A, %d-%b-%y %H:%M:%S",
    "%a %b %e %H:%M:%S %Y",
];

/// Parse an HTTP date (RFC 1123, RFC 850, asctime) into epoch seconds.
pub fn parse_http_date(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.timestamp());
    }

    let naive = value
        .strip_suffix(" GMT")
        .or_else(|| value.strip_suffix(" UTC"))
        .unwrap_or(value)
        .trim_end();

    HTTP_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(naive, fmt).ok())
        .map(|dt| dt.and_utc().timestamp())
}

/// Parse the value of a single `Set-Cookie` header (without the header name).
///
/// Returns `None` when the cookie name is empty.
pub fn parse_set_cookie(header: &str) -> Option<Cookie> {
    let mut segments = header.split("; ");

    let (name, value) = split_pair(segments.next()?);
    if name.is_empty() {
        return None;
    }

    let mut cookie = Cookie::new(name, urldecode(value));

    for segment in segments {
        let (key, raw) = split_pair(segment);
        let key = key.to_ascii_lowercase();

        let value = if raw.is_empty() {
            AttrValue::Flag(true)
        } else if let Some(n) = parse_int(raw) {
            AttrValue::Int(n)
        } else if key == "expires" {
            match parse_http_date(raw) {
                Some(ts) => AttrValue::Int(ts),
                None => {
                    tracing::debug!("dropping unparseable cookie date {:?}", raw);
                    continue;
                }
            }
        } else {
            AttrValue::Text(raw.to_lowercase())
        };

        cookie.set_attr(&key, value);
    }

    Some(cookie)
}

/// Build the value of a `Cookie` request header.
pub fn format_cookie_header<'a>(cookies: impl IntoIterator<Item = &'a Cookie>) -> String {
    cookies
        .into_iter()
        .map(|c| format!("{}={}", c.name, urlencode(&c.value)))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Collect every `Set-Cookie` header from a raw response header block.
///
/// Cookies are keyed by name; a later header overrides an earlier one.
pub fn extract_set_cookies(raw: &str) -> CookieMap {
    let mut cookies = CookieMap::new();
    let Some(re) = SET_COOKIE_LINE.as_ref() else {
        return cookies;
    };
    for caps in re.captures_iter(raw) {
        if let Some(cookie) = parse_set_cookie(caps[1].trim_end()) {
            cookies.insert(cookie.name.clone(), cookie);
        }
    }
    cookies
}

fn split_pair(segment: &str) -> (&str, &str) {
    segment.split_once('=').unwrap_or((segment, ""))
}

fn parse_int(raw: &str) -> Option<i64> {
    let digits = raw.strip_prefix(['-', '+']).unwrap_or(raw);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}
