//! Explicit memoization of loaded datasets.
//!
//! A dataset is loaded once per canonical source path and reused until the
//! file's signature (modification time + length) changes.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use log::debug;

use crate::data::loader::{load_file, LoadOptions};
use crate::data::model::ReadingSet;
use crate::error::{DataError, Result};

/// Identity of a file's content as far as the cache is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSignature {
    pub modified: Option<SystemTime>,
    pub len: u64,
}

impl SourceSignature {
    /// Read the signature of `path` from filesystem metadata.
    pub fn of(path: &Path) -> Result<Self> {
        let meta = fs::metadata(path).map_err(|e| DataError::io(path, e))?;
        Ok(SourceSignature {
            modified: meta.modified().ok(),
            len: meta.len(),
        })
    }
}

/// Canonical form of `path`, so `./a.csv` and `a.csv` share an entry.
///
/// A file that no longer exists resolves through its parent directory, which
/// keeps eviction after deletion hitting the same key.
fn cache_key(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            fs::canonicalize(parent)
                .map(|dir| dir.join(name))
                .unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}

#[derive(Debug)]
struct CacheEntry {
    signature: SourceSignature,
    data: Arc<ReadingSet>,
}

/// Loaded datasets keyed by canonical source path.
///
/// Cached sets are immutable and shared through `Arc`; a reload after the
/// source changes replaces the entry with a new set and leaves previously
/// returned handles untouched.
#[derive(Debug, Default)]
pub struct DatasetCache {
    options: LoadOptions,
    entries: HashMap<PathBuf, CacheEntry>,
}

impl DatasetCache {
    pub fn new(options: LoadOptions) -> Self {
        DatasetCache {
            options,
            entries: HashMap::new(),
        }
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Return the normalized dataset at `path`, loading it if it is not
    /// cached or the file changed since it was cached.
    pub fn load(&mut self, path: &Path) -> Result<Arc<ReadingSet>> {
        let signature = match SourceSignature::of(path) {
            Ok(sig) => sig,
            Err(e) => {
                self.entries.remove(&cache_key(path));
                return Err(e);
            }
        };
        let key = cache_key(path);

        if let Some(entry) = self.entries.get(&key) {
            if entry.signature == signature {
                debug!("cache hit for {}", path.display());
                return Ok(Arc::clone(&entry.data));
            }
            debug!("{} changed on disk, reloading", path.display());
        }

        match load_file(path, &self.options) {
            Ok(set) => {
                let data = Arc::new(set);
                self.entries.insert(
                    key,
                    CacheEntry {
                        signature,
                        data: Arc::clone(&data),
                    },
                );
                Ok(data)
            }
            Err(e) => {
                self.entries.remove(&key);
                Err(e)
            }
        }
    }

    /// Drop the entry for `path`. Returns whether one existed.
    pub fn invalidate(&mut self, path: &Path) -> bool {
        self.entries.remove(&cache_key(path)).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Measurement;
    use std::io::Write;

    fn write_csv(path: &Path, body: &str) {
        let mut file = fs::File::create(path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file.sync_all().unwrap();
    }

    #[test]
    fn test_cache_hit_returns_same_arc() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readings.csv");
        write_csv(&path, "timestamp,CO2_ppm\n2024-01-01T08:00:00Z,700\n");

        let mut cache = DatasetCache::default();
        let first = cache.load(&path).unwrap();
        let second = cache.load(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_equivalent_paths_share_an_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readings.csv");
        write_csv(&path, "timestamp,CO2_ppm\n2024-01-01T08:00:00Z,700\n");
        let dotted = dir.path().join(".").join("readings.csv");

        let mut cache = DatasetCache::default();
        let first = cache.load(&path).unwrap();
        let second = cache.load(&dotted).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        assert!(cache.invalidate(&dotted));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_changed_file_reloads_into_new_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readings.csv");
        write_csv(&path, "timestamp,CO2_ppm\n2024-01-01T08:00:00Z,700\n");

        let mut cache = DatasetCache::default();
        let first = cache.load(&path).unwrap();

        // Different length guarantees a new signature even on coarse mtime.
        write_csv(
            &path,
            "timestamp,CO2_ppm\n2024-01-01T08:00:00Z,700\n2024-01-01T08:10:00Z,720\n",
        );
        let second = cache.load(&path).unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 2);
        assert_eq!(second.readings[1].get(Measurement::Co2), Some(720.0));
    }

    #[test]
    fn test_invalidate_forces_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readings.csv");
        write_csv(&path, "timestamp,PM1_ug_m3\n2024-01-01T08:00:00Z,3\n");

        let mut cache = DatasetCache::default();
        let first = cache.load(&path).unwrap();
        assert!(cache.invalidate(&path));
        assert!(!cache.invalidate(&path));
        let second = cache.load(&path).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(*first, *second);
    }

    #[test]
    fn test_missing_file_errors_and_evicts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readings.csv");
        write_csv(&path, "timestamp,PM1_ug_m3\n2024-01-01T08:00:00Z,3\n");

        let mut cache = DatasetCache::default();
        cache.load(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert!(matches!(cache.load(&path), Err(DataError::Io { .. })));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_respects_load_options() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readings.csv");
        write_csv(&path, "timestamp,PM1_ug_m3,CO2_ppm\n2024-01-01T08:00:00Z,3,600\n");

        let mut cache = DatasetCache::new(LoadOptions {
            fields: Measurement::particulates(),
        });
        let set = cache.load(&path).unwrap();
        assert_eq!(set.fields, vec![Measurement::Pm1]);
        assert_eq!(set.extra_columns, vec!["CO2_ppm".to_string()]);
    }
}
