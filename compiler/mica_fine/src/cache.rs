//! Persisted fine-grained cache.
//!
//! Per module the cache records the file identity triple `(mtime, size,
//! hash)` plus the module's export fingerprints. On a warm start, a
//! module whose triple matches the file on disk *and* whose imports are
//! all transitively fresh can skip re-analysis; any mismatch anywhere in
//! the chain invalidates the dependents through normal trigger firing.

use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fswatcher::{hash_digest, FileData};

/// File identity triple stored per module.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMeta {
    pub mtime: (u64, u32),
    pub size: u64,
    pub hash: String,
}

impl CacheMeta {
    pub fn of(data: &FileData) -> Self {
        CacheMeta {
            mtime: data.mtime,
            size: data.size,
            hash: data.hash.clone(),
        }
    }

    /// Does the file on disk still match this identity?
    pub fn matches_disk(&self, path: &Path) -> bool {
        let Ok(meta) = fs::metadata(path) else {
            return false;
        };
        if meta.len() != self.size {
            return false;
        }
        let Ok(contents) = fs::read(path) else {
            return false;
        };
        hash_digest(&contents) == self.hash
    }
}

/// One module's cached record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleCache {
    pub module: String,
    pub path: PathBuf,
    pub meta: CacheMeta,
    pub imports: Vec<String>,
    /// Export name to signature fingerprint.
    pub fingerprints: FxHashMap<String, String>,
}

/// The whole cache file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FineCache {
    pub modules: Vec<ModuleCache>,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache format: {0}")]
    Format(#[from] serde_json::Error),
}

impl FineCache {
    pub fn load(path: &Path) -> Result<FineCache, CacheError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let text = serde_json::to_string(self)?;
        fs::write(path, text)?;
        Ok(())
    }

    fn by_module(&self) -> FxHashMap<&str, &ModuleCache> {
        self.modules
            .iter()
            .map(|m| (m.module.as_str(), m))
            .collect()
    }

    /// Modules whose identity triple matches disk *and* whose imports
    /// are all transitively fresh themselves.
    pub fn fresh_modules(&self) -> FxHashSet<String> {
        let by_module = self.by_module();
        // Start from everything individually fresh, then strip modules
        // with stale imports until a fixpoint: staleness is contagious
        // along the import chain.
        let mut fresh: FxHashSet<&str> = self
            .modules
            .iter()
            .filter(|m| m.meta.matches_disk(&m.path))
            .map(|m| m.module.as_str())
            .collect();
        loop {
            let stale: Vec<&str> = fresh
                .iter()
                .copied()
                .filter(|module| {
                    by_module[module]
                        .imports
                        .iter()
                        .any(|import| by_module.contains_key(import.as_str()) && !fresh.contains(import.as_str()))
                })
                .collect();
            if stale.is_empty() {
                return fresh.into_iter().map(str::to_owned).collect();
            }
            for module in stale {
                fresh.remove(module);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write as _;

    fn meta_for(path: &Path) -> CacheMeta {
        let contents = fs::read(path).unwrap();
        CacheMeta {
            mtime: (0, 0),
            size: contents.len() as u64,
            hash: hash_digest(&contents),
        }
    }

    fn write_file(path: &Path, contents: &str) {
        let mut f = fs::File::create(path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    fn entry(module: &str, path: &Path, imports: &[&str]) -> ModuleCache {
        ModuleCache {
            module: module.to_owned(),
            path: path.to_owned(),
            meta: meta_for(path),
            imports: imports.iter().map(|s| (*s).to_owned()).collect(),
            fingerprints: FxHashMap::default(),
        }
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.py");
        write_file(&src, "X = 1\n");
        let cache = FineCache {
            modules: vec![entry("a", &src, &[])],
        };
        let cache_path = dir.path().join("fine.json");
        cache.save(&cache_path).unwrap();
        let loaded = FineCache::load(&cache_path).unwrap();
        assert_eq!(loaded, cache);
    }

    #[test]
    fn matching_chain_is_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.py");
        let b = dir.path().join("b.py");
        write_file(&a, "X = 1\n");
        write_file(&b, "import a\n");
        let cache = FineCache {
            modules: vec![entry("a", &a, &[]), entry("b", &b, &["a"])],
        };
        let fresh = cache.fresh_modules();
        assert!(fresh.contains("a"));
        assert!(fresh.contains("b"));
    }

    #[test]
    fn stale_import_invalidates_the_chain() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.py");
        let b = dir.path().join("b.py");
        let c = dir.path().join("c.py");
        write_file(&a, "X = 1\n");
        write_file(&b, "import a\n");
        write_file(&c, "Y = 2\n");
        let cache = FineCache {
            modules: vec![
                entry("a", &a, &[]),
                entry("b", &b, &["a"]),
                entry("c", &c, &[]),
            ],
        };
        // Invalidate a on disk after the cache was recorded.
        write_file(&a, "X = 2  # edited\n");

        let fresh = cache.fresh_modules();
        assert!(!fresh.contains("a"));
        // b transitively depends on a, so it is stale too.
        assert!(!fresh.contains("b"));
        // c is untouched by the chain.
        assert!(fresh.contains("c"));
    }

    #[test]
    fn missing_file_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.py");
        write_file(&a, "X = 1\n");
        let cache = FineCache {
            modules: vec![entry("a", &a, &[])],
        };
        fs::remove_file(&a).unwrap();
        assert!(cache.fresh_modules().is_empty());
    }
}
