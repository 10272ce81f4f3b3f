//! Disk-backed response cache.
//!
//! Entries live at `dir/name/<slug(id)>.gz`. Expiry is derived from file
//! modification times and applied lazily: the first access of a `Cache`
//! instance deletes everything older than the TTL and, optionally, a few
//! random survivors.
//!
//! A cache directory is owned by a single process. Several processes
//! writing to the same directory are not coordinated.

pub mod slug;
pub mod store;
pub mod ttl;

pub use store::{ARCHIVE_SUFFIX, Cache};
pub use ttl::CacheTtl;
