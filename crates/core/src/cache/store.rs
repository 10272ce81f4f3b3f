//! Gzip file store with lazy pruning.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use rand::seq::SliceRandom;

use super::CacheTtl;
use super::slug::slug;
use crate::config::CacheConfig;

/// Suffix used by [`Cache::archive`] callers without a more specific reason.
pub const ARCHIVE_SUFFIX: &str = "archived";

/// Gzip-compressed file cache keyed by arbitrary string ids.
///
/// The directory is created or pruned on first use, once per instance.
/// Every filesystem failure is logged and reported as a miss or no-op.
#[derive(Debug)]
pub struct Cache {
    dir: PathBuf,
    ttl: CacheTtl,
    wipe: usize,
    prepared: bool,
}

impl Cache {
    /// Create a cache for `config.dir/config.name`. Nothing touches the disk yet.
    pub fn new(config: &CacheConfig) -> Self {
        Self { dir: config.path(), ttl: config.ttl, wipe: config.wipe, prepared: false }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self { dir: PathBuf::new(), ttl: CacheTtl::Disabled, wipe: 0, prepared: false }
    }

    /// Cache directory full path.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> CacheTtl {
        self.ttl
    }

    /// Path of the file backing `id`.
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.gz", slug(id)))
    }

    /// Load and decompress the entry for `id`.
    pub fn get(&mut self, id: &str) -> Option<Vec<u8>> {
        if !self.prepare() {
            return None;
        }

        let path = self.path_for(id);
        if !path.is_file() {
            return None;
        }

        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!("cache read {} failed: {}", path.display(), e);
                return None;
            }
        };

        let mut data = Vec::new();
        if let Err(e) = GzDecoder::new(raw.as_slice()).read_to_end(&mut data) {
            tracing::error!("cache decode {} failed: {}", path.display(), e);
            return None;
        }

        tracing::debug!("cache hit {}", render(&path));
        Some(data)
    }

    /// Compress and store `data` under `id`.
    ///
    /// Returns the number of compressed bytes written.
    pub fn put(&mut self, id: &str, data: &[u8]) -> Option<u64> {
        if !self.prepare() {
            return None;
        }

        let path = self.path_for(id);
        let result = compress(data).and_then(|gz| fs::write(&path, &gz).map(|_| gz.len() as u64));

        match result {
            Ok(bytes) => {
                tracing::debug!("cache put {} ({} bytes)", path.display(), bytes);
                Some(bytes)
            }
            Err(e) => {
                tracing::error!("cache put {} failed: {}", path.display(), e);
                None
            }
        }
    }

    /// Remove the entry for `id`. Absent entries are not an error.
    ///
    /// A disabled cache owns no files and never deletes anything.
    pub fn del(&mut self, id: &str) -> bool {
        if self.ttl.is_disabled() {
            return false;
        }

        let path = self.path_for(id);
        unlink(&path)
    }

    /// Move the entry for `id` aside under a unique, time-suffixed name.
    ///
    /// Returns the new location, or `None` when caching is disabled or
    /// there is nothing to archive.
    pub fn archive(&mut self, id: &str, suffix: &str) -> Option<PathBuf> {
        if self.ttl.is_disabled() {
            return None;
        }

        let old = self.path_for(id);
        if !old.is_file() {
            return None;
        }

        let stamp = chrono::Utc::now().timestamp();
        let mut new = self.path_for(&format!("{id}-{suffix}{stamp}"));
        let mut n = 1;
        while new.exists() {
            new = self.path_for(&format!("{id}-{suffix}{stamp}-{n}"));
            n += 1;
        }

        if let Err(e) = fs::rename(&old, &new) {
            tracing::error!("cache archive {} failed: {}", old.display(), e);
            return None;
        }

        if let Err(e) = fs::File::options()
            .write(true)
            .open(&new)
            .and_then(|f| f.set_modified(SystemTime::now()))
        {
            tracing::debug!("cache archive touch {} failed: {}", new.display(), e);
        }

        tracing::debug!("cache archive {} -> {}", old.display(), render(&new));
        Some(new)
    }

    /// Create or prune the cache directory, once per instance.
    ///
    /// Returns false when the cache is disabled or the directory is unusable.
    fn prepare(&mut self) -> bool {
        if self.ttl.is_disabled() {
            return false;
        }

        if self.prepared {
            return true;
        }

        if self.dir.is_dir() {
            self.prune();
        } else {
            tracing::debug!("cache create {}", self.dir.display());
            if let Err(e) = fs::create_dir_all(&self.dir) {
                tracing::error!("cache create {} failed: {}", self.dir.display(), e);
                return false;
            }
        }

        self.prepared = true;
        true
    }

    fn prune(&self) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("cache scan {} failed: {}", self.dir.display(), e);
                return;
            }
        };

        let threshold = self.ttl.max_age().and_then(|age| SystemTime::now().checked_sub(age));
        if let Some(keep) = threshold {
            tracing::debug!("cache clear before {}", chrono::DateTime::<chrono::Utc>::from(keep).to_rfc2822());
        }

        let mut survivors = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let expired = match (threshold, entry.metadata().and_then(|m| m.modified())) {
                (Some(keep), Ok(mtime)) => mtime < keep,
                _ => false,
            };

            if expired {
                unlink(&path);
            } else {
                survivors.push(path);
            }
        }

        if self.wipe > 0 && !survivors.is_empty() {
            tracing::debug!("cache wipe {} more", self.wipe);
            survivors.shuffle(&mut rand::thread_rng());
            for path in survivors.iter().take(self.wipe) {
                unlink(path);
            }
        }
    }
}

fn compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

fn unlink(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!("cache del {}", path.display());
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            tracing::error!("cache del {} failed: {}", path.display(), e);
            false
        }
    }
}

fn render(path: &Path) -> String {
    let time = fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|t| chrono::DateTime::<chrono::Utc>::from(t).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|_| "unavailable".into());
    format!("{} [{}]", path.display(), time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(dir: &Path, ttl: CacheTtl, wipe: usize) -> CacheConfig {
        CacheConfig { dir: dir.to_path_buf(), name: "test".into(), ttl, wipe }
    }

    fn age(path: &Path, secs: u64) {
        let f = fs::File::options().write(true).open(path).unwrap();
        f.set_modified(SystemTime::now() - Duration::from_secs(secs)).unwrap();
    }

    #[test]
    fn test_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cache = Cache::new(&config(tmp.path(), CacheTtl::Seconds(3600), 0));

        for data in [&b""[..], b"hello", &[0u8, 159, 146, 150, 255][..], "zażółć".as_bytes()] {
            assert!(cache.put("https://example.com/a", data).is_some());
            assert_eq!(cache.get("https://example.com/a").as_deref(), Some(data));
        }
    }

    #[test]
    fn test_creates_dir_lazily() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cache = Cache::new(&config(&tmp.path().join("nested"), CacheTtl::Forever, 0));
        assert!(!cache.dir().exists());

        assert_eq!(cache.get("missing"), None);
        assert!(cache.dir().is_dir());
    }

    #[test]
    fn test_disabled_never_stores() {
        let tmp = tempfile::tempdir().unwrap();
        let mut enabled = Cache::new(&config(tmp.path(), CacheTtl::Forever, 0));
        enabled.put("id", b"data").unwrap();

        let mut cache = Cache::new(&config(tmp.path(), CacheTtl::Disabled, 0));
        assert_eq!(cache.get("id"), None);
        assert_eq!(cache.put("id", b"other"), None);
        assert_eq!(cache.archive("id", ARCHIVE_SUFFIX), None);

        let mut none = Cache::disabled();
        assert_eq!(none.put("x", b"y"), None);
        assert_eq!(none.get("x"), None);
    }

    #[test]
    fn test_disabled_never_deletes() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cache = Cache::new(&config(tmp.path(), CacheTtl::Forever, 0));
        cache.put("https://example.com/page", b"data").unwrap();
        let path = cache.path_for("https://example.com/page");

        let mut disabled = Cache::new(&config(tmp.path(), CacheTtl::Disabled, 0));
        assert!(!disabled.del("https://example.com/page"));
        assert!(path.is_file());

        // the empty directory of `disabled()` resolves against the working directory
        let id = "netjar disabled cache del check";
        let mut none = Cache::disabled();
        let planted = none.path_for(id);
        fs::write(&planted, b"not a cache entry").unwrap();
        let deleted = none.del(id);
        let survived = planted.is_file();
        fs::remove_file(&planted).unwrap();
        assert!(!deleted);
        assert!(survived);
    }

    #[test]
    fn test_expiry_on_prepare() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path(), CacheTtl::Seconds(3600), 0);

        let mut writer = Cache::new(&cfg);
        writer.put("old", b"1").unwrap();
        writer.put("fresh", b"2").unwrap();
        age(&writer.path_for("old"), 7200);
        age(&writer.path_for("fresh"), 60);

        let mut cache = Cache::new(&cfg);
        assert_eq!(cache.get("old"), None);
        assert!(!cache.path_for("old").exists());
        assert_eq!(cache.get("fresh").as_deref(), Some(&b"2"[..]));
    }

    #[test]
    fn test_forever_skips_expiry() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path(), CacheTtl::Forever, 0);

        let mut writer = Cache::new(&cfg);
        writer.put("ancient", b"1").unwrap();
        age(&writer.path_for("ancient"), 10 * 365 * 24 * 3600);

        let mut cache = Cache::new(&cfg);
        assert_eq!(cache.get("ancient").as_deref(), Some(&b"1"[..]));
    }

    #[test]
    fn test_wipe_removes_extra_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let mut writer = Cache::new(&config(tmp.path(), CacheTtl::Forever, 0));
        for i in 0..5 {
            writer.put(&format!("entry{i}"), b"x").unwrap();
        }

        let mut cache = Cache::new(&config(tmp.path(), CacheTtl::Forever, 2));
        let hits = (0..5).filter(|i| cache.get(&format!("entry{i}")).is_some()).count();
        assert_eq!(hits, 3);
    }

    #[test]
    fn test_prune_runs_once_per_instance() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cache = Cache::new(&config(tmp.path(), CacheTtl::Seconds(3600), 0));
        cache.put("a", b"1").unwrap();
        age(&cache.path_for("a"), 7200);

        // already prepared: the stale file is only dropped by the next instance
        assert!(cache.get("a").is_some());
    }

    #[test]
    fn test_shared_dir_last_writer_wins() {
        // two owners of one directory are not coordinated
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path(), CacheTtl::Forever, 0);
        let mut first = Cache::new(&cfg);
        let mut second = Cache::new(&cfg);

        first.put("page", b"first").unwrap();
        second.put("page", b"second").unwrap();

        assert_eq!(first.get("page").as_deref(), Some(&b"second"[..]));
        first.del("page");
        assert_eq!(second.get("page"), None);
    }

    #[test]
    fn test_del() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cache = Cache::new(&config(tmp.path(), CacheTtl::Forever, 0));
        cache.put("a", b"1").unwrap();

        assert!(cache.del("a"));
        assert!(!cache.del("a"));
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn test_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cache = Cache::new(&config(tmp.path(), CacheTtl::Seconds(3600), 0));
        cache.put("https://example.com/api", b"{bad json").unwrap();

        let first = cache.archive("https://example.com/api", "err").unwrap();
        assert!(first.is_file());
        assert!(first.file_name().unwrap().to_string_lossy().contains("-err"));
        assert_eq!(cache.get("https://example.com/api"), None);

        cache.put("https://example.com/api", b"{bad again").unwrap();
        let second = cache.archive("https://example.com/api", "err").unwrap();
        assert_ne!(first, second);

        assert_eq!(cache.archive("https://example.com/api", "err"), None);
    }
}
