//! File name generation for cache identifiers.

use sha2::{Digest, Sha256};

/// Slugs longer than this are truncated and disambiguated with a hash.
const MAX_SLUG_LEN: usize = 160;

/// Turn an arbitrary cache identifier into a safe file stem.
///
/// ASCII alphanumerics are lower-cased and kept, every other run of
/// characters becomes a single `-`.
pub fn slug(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    let mut dash = false;

    for c in id.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            dash = false;
        } else if !dash && !out.is_empty() {
            out.push('-');
            dash = true;
        }
    }

    while out.ends_with('-') {
        out.pop();
    }

    if out.len() > MAX_SLUG_LEN {
        out.truncate(MAX_SLUG_LEN);
        out.push('-');
        out.push_str(&short_hash(id));
    }

    if out.is_empty() {
        out.push('_');
    }

    out
}

fn short_hash(id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hex::encode(&hasher.finalize()[..8])
}
