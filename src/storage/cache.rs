//! JSON-based report cache.
//!
//! Keeps every cached report in a single JSON file as a map from target to
//! a timestamped entry. The cache is consulted only before and after a scan;
//! read faults are logged and treated as a miss.

use crate::error::{StorageError, StorageResult};
use crate::scanner::traits::ScanReport;
use crate::types::PortRange;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// A cached report with the time it was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub stored_at: DateTime<Utc>,
    pub report: ScanReport,
}

impl CacheEntry {
    /// Whether the entry is still younger than `ttl`.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        // A timestamp in the future (clock skew) counts as fresh.
        (Utc::now() - self.stored_at)
            .to_std()
            .map_or(true, |age| age < ttl)
    }
}

type Entries = BTreeMap<String, CacheEntry>;

/// File-backed report cache.
pub struct ScanCache {
    file: PathBuf,
    ttl: Duration,
}

impl ScanCache {
    /// Create a cache backed by `file`. The file is created on first store.
    pub fn new(file: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            file: file.into(),
            ttl,
        }
    }

    pub fn path(&self) -> &Path {
        &self.file
    }

    /// Get the cached report for `target`, if present and not expired.
    pub fn get(&self, target: &str) -> Option<ScanReport> {
        let entries = match self.load() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, path = %self.file.display(), "cache unreadable, treating as miss");
                return None;
            }
        };

        let entry = entries.get(target)?;
        if entry.is_fresh(self.ttl) {
            debug!(key = target, stored_at = %entry.stored_at, "cache hit");
            Some(entry.report.clone())
        } else {
            debug!(key = target, stored_at = %entry.stored_at, "cache entry expired");
            None
        }
    }

    /// Like [`get`](Self::get), but only a report covering exactly `range` counts as a hit.
    pub fn get_for_range(&self, target: &str, range: PortRange) -> Option<ScanReport> {
        let report = self.get(target)?;
        if report.port_range == range {
            Some(report)
        } else {
            debug!(key = target, cached = %report.port_range, requested = %range, "cached range differs");
            None
        }
    }

    /// Get the raw entry for `target` regardless of age.
    pub fn entry(&self, target: &str) -> StorageResult<Option<CacheEntry>> {
        Ok(self.load()?.remove(target))
    }

    /// Store `report` under `target`, replacing any previous entry.
    pub fn store(&self, target: &str, report: &ScanReport) -> StorageResult<()> {
        // An unreadable file is replaced rather than blocking new results.
        let mut entries = self.load().unwrap_or_else(|e| {
            warn!(error = %e, "discarding unreadable cache");
            Entries::new()
        });
        entries.insert(
            target.to_string(),
            CacheEntry {
                stored_at: Utc::now(),
                report: report.clone(),
            },
        );
        self.save(&entries)?;
        debug!(key = target, "report cached");
        Ok(())
    }

    /// Remove expired entries, returning how many were dropped.
    pub fn purge_expired(&self) -> StorageResult<usize> {
        let mut entries = self.load()?;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(self.ttl));
        let removed = before - entries.len();
        if removed > 0 {
            self.save(&entries)?;
        }
        Ok(removed)
    }

    /// Remove every entry, returning how many were dropped.
    pub fn clear(&self) -> StorageResult<usize> {
        let count = self.load().map(|entries| entries.len()).unwrap_or(0);
        if self.file.exists() {
            fs::remove_file(&self.file).map_err(|e| StorageError::SaveFailed(e.to_string()))?;
        }
        Ok(count)
    }

    fn load(&self) -> StorageResult<Entries> {
        if !self.file.exists() {
            return Ok(Entries::new());
        }

        let content =
            fs::read_to_string(&self.file).map_err(|e| StorageError::LoadFailed(e.to_string()))?;

        serde_json::from_str(&content).map_err(|e| StorageError::LoadFailed(e.to_string()))
    }

    fn save(&self, entries: &Entries) -> StorageResult<()> {
        if let Some(parent) = self.file.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::DirectoryError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(entries)?;
        fs::write(&self.file, content).map_err(|e| StorageError::SaveFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::traits::PortProbeResult;
    use crate::types::{ScanId, Target};

    fn report(target: &str) -> ScanReport {
        ScanReport {
            id: ScanId::new(),
            target: Target::validate(target).unwrap(),
            ip_address: None,
            port_range: PortRange::new(80, 81).unwrap(),
            started_at: Utc::now(),
            duration_ms: 12,
            results: vec![PortProbeResult::open(80, "http"), PortProbeResult::closed(81)],
        }
    }

    fn cache_in(dir: &tempfile::TempDir, ttl: Duration) -> ScanCache {
        ScanCache::new(dir.path().join("cache").join("scan_cache.json"), ttl)
    }

    #[test]
    fn test_missing_file_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir, Duration::from_secs(3600));
        assert!(cache.get("example.com").is_none());
        assert_eq!(cache.purge_expired().unwrap(), 0);
    }

    #[test]
    fn test_store_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir, Duration::from_secs(3600));
        let original = report("example.com");

        cache.store("example.com", &original).unwrap();
        assert_eq!(cache.get("example.com"), Some(original));
        assert!(cache.get("other.example").is_none());
    }

    #[test]
    fn test_hit_requires_matching_range() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir, Duration::from_secs(3600));
        let original = report("example.com");
        cache.store("example.com", &original).unwrap();

        assert_eq!(
            cache.get_for_range("example.com", PortRange::new(80, 81).unwrap()),
            Some(original)
        );
        assert!(cache.get_for_range("example.com", PortRange::single(80)).is_none());
        assert!(cache
            .get_for_range("example.com", PortRange::new(1, 1024).unwrap())
            .is_none());
    }

    #[test]
    fn test_store_replaces_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir, Duration::from_secs(3600));
        let first = report("example.com");
        let second = report("example.com");

        cache.store("example.com", &first).unwrap();
        cache.store("example.com", &second).unwrap();
        assert_eq!(cache.get("example.com").unwrap().id, second.id);
    }

    #[test]
    fn test_expired_entry_is_miss_and_purged() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir, Duration::ZERO);

        cache.store("example.com", &report("example.com")).unwrap();
        assert!(cache.get("example.com").is_none());
        assert!(cache.entry("example.com").unwrap().is_some());

        assert_eq!(cache.purge_expired().unwrap(), 1);
        assert!(cache.entry("example.com").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_degrades_to_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir, Duration::from_secs(3600));
        fs::create_dir_all(cache.path().parent().unwrap()).unwrap();
        fs::write(cache.path(), "{ not json").unwrap();

        assert!(cache.get("example.com").is_none());
        assert!(matches!(cache.purge_expired(), Err(StorageError::LoadFailed(_))));

        cache.store("example.com", &report("example.com")).unwrap();
        assert!(cache.get("example.com").is_some());
    }

    #[test]
    fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir, Duration::from_secs(3600));
        cache.store("a.example", &report("a.example")).unwrap();
        cache.store("b.example", &report("b.example")).unwrap();

        assert_eq!(cache.clear().unwrap(), 2);
        assert!(!cache.path().exists());
        assert_eq!(cache.clear().unwrap(), 0);
    }
}
