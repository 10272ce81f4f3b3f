//! Normalized cookie model shared by every cookie representation.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Value of a single cookie attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Flag(bool),
    Int(i64),
    Text(String),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Flag(b) => write!(f, "{b}"),
            AttrValue::Int(i) => write!(f, "{i}"),
            AttrValue::Text(s) => f.write_str(s),
        }
    }
}

/// A cookie with the attributes that were actually present in its source.
///
/// Attribute keys are lower-cased (`max-age`, `httponly`, `samesite`).
/// Anything not modelled by a field is kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Epoch seconds, `0` for session cookies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
    #[serde(rename = "max-age", skip_serializing_if = "Option::is_none")]
    pub max_age: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub httponly: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samesite: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, AttrValue>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into(), ..Default::default() }
    }

    /// Store an attribute under its lower-cased key.
    ///
    /// Known attributes go to their field when the value has the expected
    /// shape; everything else lands in `extra`.
    pub fn set_attr(&mut self, key: &str, value: AttrValue) {
        let key = key.to_ascii_lowercase();
        match (key.as_str(), value) {
            ("name", AttrValue::Text(v)) => self.name = v,
            ("value", v) => self.value = v.to_string(),
            ("expires", AttrValue::Int(v)) => self.expires = Some(v),
            ("max-age", AttrValue::Int(v)) => self.max_age = Some(v),
            ("domain", AttrValue::Text(v)) => self.domain = Some(v),
            ("domain", AttrValue::Int(v)) => self.domain = Some(v.to_string()),
            ("path", AttrValue::Text(v)) => self.path = Some(v),
            ("path", AttrValue::Int(v)) => self.path = Some(v.to_string()),
            ("secure", AttrValue::Flag(v)) => self.secure = Some(v),
            ("httponly", AttrValue::Flag(v)) => self.httponly = Some(v),
            ("samesite", AttrValue::Text(v)) => self.samesite = Some(v),
            (_, v) => {
                self.extra.insert(key, v);
            }
        }
    }

    /// All populated attributes in canonical order, `name` and `value` first.
    pub fn attrs(&self) -> Vec<(String, AttrValue)> {
        let mut out = vec![
            ("name".to_string(), AttrValue::Text(self.name.clone())),
            ("value".to_string(), AttrValue::Text(self.value.clone())),
        ];

        let mut push = |key: &str, value: Option<AttrValue>| {
            if let Some(v) = value {
                out.push((key.to_string(), v));
            }
        };
        push("expires", self.expires.map(AttrValue::Int));
        push("max-age", self.max_age.map(AttrValue::Int));
        push("domain", self.domain.clone().map(AttrValue::Text));
        push("path", self.path.clone().map(AttrValue::Text));
        push("secure", self.secure.map(AttrValue::Flag));
        push("httponly", self.httponly.map(AttrValue::Flag));
        push("samesite", self.samesite.clone().map(AttrValue::Text));

        out.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        out
    }

    /// Attributes of `self` that are missing from, or differ in, `other`.
    pub fn changed_since(&self, other: &Cookie) -> Vec<(String, AttrValue)> {
        let before = other.attrs();
        self.attrs()
            .into_iter()
            .filter(|(k, v)| !before.iter().any(|(bk, bv)| bk == k && bv == v))
            .collect()
    }

    pub fn is_httponly(&self) -> bool {
        self.httponly.unwrap_or(false)
    }

    pub fn is_secure(&self) -> bool {
        self.secure.unwrap_or(false)
    }

    /// Session cookies (no expiry or `0`) never expire by time.
    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires, Some(e) if e > 0 && e <= now)
    }

    /// Serialize as a single Netscape cookie-jar line.
    pub fn to_netscape_line(&self) -> String {
        super::netscape::to_netscape_line(self)
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attrs = self.attrs();
        let parts: Vec<String> = attrs.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "Cookie {{ {} }}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_attr_routes_fields() {
        let mut c = Cookie::new("a", "1");
        c.set_attr("Max-Age", AttrValue::Int(900));
        c.set_attr("domain", AttrValue::Text("example.com".into()));
        c.set_attr("HttpOnly", AttrValue::Flag(true));
        c.set_attr("priority", AttrValue::Text("high".into()));
        c.set_attr("max-age", AttrValue::Text("soon".into()));

        assert_eq!(c.max_age, Some(900));
        assert_eq!(c.domain.as_deref(), Some("example.com"));
        assert_eq!(c.httponly, Some(true));
        assert_eq!(c.extra.get("priority"), Some(&AttrValue::Text("high".into())));
        assert_eq!(c.extra.get("max-age"), Some(&AttrValue::Text("soon".into())));
    }

    #[test]
    fn test_numeric_path_and_domain() {
        let c = crate::cookies::parse_set_cookie("sid=1; path=2024; domain=42").unwrap();
        assert_eq!(c.path.as_deref(), Some("2024"));
        assert_eq!(c.domain.as_deref(), Some("42"));
        assert!(c.extra.is_empty());
        assert_eq!(c.to_netscape_line(), ".42\tTRUE\t2024\tFALSE\t0\tsid\t1");
    }

    #[test]
    fn test_attrs_only_present() {
        let c = Cookie { path: Some("/".into()), ..Cookie::new("a", "1") };
        let keys: Vec<String> = c.attrs().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["name", "value", "path"]);
    }

    #[test]
    fn test_changed_since() {
        let old = Cookie { expires: Some(10), path: Some("/".into()), ..Cookie::new("a", "1") };
        let new = Cookie { expires: Some(20), path: Some("/".into()), secure: Some(true), ..Cookie::new("a", "1") };

        let changed = new.changed_since(&old);
        assert_eq!(
            changed,
            vec![("expires".to_string(), AttrValue::Int(20)), ("secure".to_string(), AttrValue::Flag(true))]
        );
        assert!(old.changed_since(&old).is_empty());
    }

    #[test]
    fn test_is_expired() {
        let mut c = Cookie::new("a", "1");
        assert!(!c.is_expired(100));
        c.expires = Some(0);
        assert!(!c.is_expired(100));
        c.expires = Some(50);
        assert!(c.is_expired(100));
        c.expires = Some(150);
        assert!(!c.is_expired(100));
    }

    #[test]
    fn test_display_lists_attrs() {
        let c = Cookie { secure: Some(true), ..Cookie::new("sid", "abc") };
        assert_eq!(c.to_string(), "Cookie { name=sid, value=abc, secure=true }");
    }
}
