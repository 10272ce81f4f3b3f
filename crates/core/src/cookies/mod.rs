//! Cookie translation between three representations.
//!
//! ### Set-Cookie headers
//! - Split on `"; "`, first segment is `name=value` (value URL-decoded)
//! - Attribute keys lower-cased, valueless attributes become `true`
//! - Integer values coerced, `Expires` parsed as an HTTP date
//!
//! ### Netscape cookie jar
//! - One line per cookie, 7 tab-separated fields:
//!   `domain  subdomains  path  secure  expires  name  value`
//! - `#HttpOnly_` prefix on the domain marks HttpOnly cookies (curl convention)
//!
//! ### Browser profile rows
//! - Firefox `moz_cookies` columns: `name, value, host, path, expiry,
//!   isSecure, isHttpOnly, sameSite`

pub mod cookie;
pub mod diff;
pub mod netscape;
pub mod profile;
pub mod set_cookie;

pub use cookie::{AttrValue, Cookie};
pub use diff::{JarEvent, JarWatcher, diff_jars};
pub use netscape::{parse_jar, parse_jar_file, to_netscape_line, write_jar_file};
pub use profile::{ProfileRow, from_profile_row, load_profile_cookies};
pub use set_cookie::{extract_set_cookies, format_cookie_header, parse_http_date, parse_set_cookie};

use percent_encoding::percent_decode_str;

/// Cookies keyed by name.
pub type CookieMap = std::collections::BTreeMap<String, Cookie>;

/// Form-style encoding: spaces become `+`, reserved bytes are `%XX`.
pub fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Inverse of [`urlencode`]; invalid escapes are kept verbatim.
pub fn urldecode(value: &str) -> String {
    let spaced = value.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urlencode() {
        assert_eq!(urlencode("cookie [7] + value"), "cookie+%5B7%5D+%2B+value");
        assert_eq!(urlencode("15mins"), "15mins");
    }

    #[test]
    fn test_urldecode() {
        assert_eq!(urldecode("cookie+%5B7%5D+%2B+value"), "cookie [7] + value");
        assert_eq!(urldecode("Zu4A6nHwjjFg/kG2oJbY5w=="), "Zu4A6nHwjjFg/kG2oJbY5w==");
        assert_eq!(urldecode("100%"), "100%");
    }
}
