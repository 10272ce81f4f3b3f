//! Change tracking for cookie-jar files.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use super::{AttrValue, Cookie, CookieMap, parse_jar_file};

/// A single difference between two loads of the same jar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JarEvent {
    Add(Cookie),
    /// Previous cookie and the attributes of the new one that differ from it.
    Mod { before: Cookie, changed: Vec<(String, AttrValue)> },
    Del(Cookie),
}

impl fmt::Display for JarEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JarEvent::Add(c) => write!(f, "Add: {c}"),
            JarEvent::Del(c) => write!(f, "Del: {c}"),
            JarEvent::Mod { before, changed } => {
                let attrs: Vec<String> = changed.iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, "Mod: {before} >> Attributes {{ {} }}", attrs.join(", "))
            }
        }
    }
}

/// Compare two jar snapshots. Additions come first, then modifications
/// and deletions in the order of the old snapshot.
pub fn diff_jars(old: &CookieMap, new: &CookieMap) -> Vec<JarEvent> {
    let mut events: Vec<JarEvent> = new
        .iter()
        .filter(|(name, _)| !old.contains_key(*name))
        .map(|(_, c)| JarEvent::Add(c.clone()))
        .collect();

    for (name, before) in old {
        match new.get(name) {
            Some(after) => {
                let changed = after.changed_since(before);
                if !changed.is_empty() {
                    events.push(JarEvent::Mod { before: before.clone(), changed });
                }
            }
            None => events.push(JarEvent::Del(before.clone())),
        }
    }

    events
}

/// Remembers the last load of every jar file it has seen.
#[derive(Debug, Default)]
pub struct JarWatcher {
    snapshots: HashMap<PathBuf, CookieMap>,
}

impl JarWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reload `path`, report what changed since the previous reload and
    /// keep the new contents as the reference. A missing or unreadable
    /// file reports nothing and leaves the snapshot untouched.
    pub fn diff_jar_file(&mut self, path: impl AsRef<Path>) -> Vec<JarEvent> {
        let path = path.as_ref();
        if !path.is_file() {
            return Vec::new();
        }

        let new = match parse_jar_file(path) {
            Ok(cookies) => cookies,
            Err(e) => {
                tracing::warn!("{}", e);
                return Vec::new();
            }
        };

        let old = self.snapshots.insert(path.to_path_buf(), new).unwrap_or_default();
        let events = match self.snapshots.get(path) {
            Some(new) => diff_jars(&old, new),
            None => Vec::new(),
        };

        for event in &events {
            tracing::debug!("{} {}", path.display(), event);
        }
        events
    }

    /// Last loaded contents of `path`, if any.
    pub fn snapshot(&self, path: impl AsRef<Path>) -> Option<&CookieMap> {
        self.snapshots.get(path.as_ref())
    }
}
