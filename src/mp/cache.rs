//! File-based cache for Materials Project structures.
//!
//! Structures are stored as JSON in ~/.cache/imdefects/structures/, one
//! file per material id, stamped with the time they were fetched.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::structure::Structure;

pub struct StructureCache {
    cache_dir: Option<PathBuf>,
    ttl_hours: u32,
}

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    timestamp: u64,
    structure: Structure,
}

impl StructureCache {
    /// Cache in the per-user cache directory.
    pub fn new(ttl_hours: u32) -> Self {
        let cache_dir = ProjectDirs::from("", "", "imdefects")
            .map(|dirs| dirs.cache_dir().join("structures"));
        Self::with_dir(cache_dir, ttl_hours)
    }

    pub fn with_dir(cache_dir: Option<PathBuf>, ttl_hours: u32) -> Self {
        if ttl_hours > 0 {
            if let Some(ref dir) = cache_dir {
                let _ = fs::create_dir_all(dir);
            }
        }
        Self {
            cache_dir,
            ttl_hours,
        }
    }

    /// Get a cached structure if present and not expired.
    pub fn get(&self, mpid: &str) -> Option<Structure> {
        if self.ttl_hours == 0 {
            return None;
        }
        let content = fs::read_to_string(self.file_path(mpid)?).ok()?;
        let entry: CacheEntry = serde_json::from_str(&content).ok()?;
        let ttl_secs = (self.ttl_hours as u64) * 3600;
        if current_timestamp().saturating_sub(entry.timestamp) < ttl_secs {
            Some(entry.structure)
        } else {
            None
        }
    }

    /// Store a structure; failures to write are ignored.
    pub fn set(&self, mpid: &str, structure: &Structure) {
        if self.ttl_hours == 0 {
            return;
        }
        self.write(mpid, structure, current_timestamp());
    }

    fn write(&self, mpid: &str, structure: &Structure, timestamp: u64) {
        let path = match self.file_path(mpid) {
            Some(path) => path,
            None => return,
        };
        let entry = CacheEntry {
            timestamp,
            structure: structure.clone(),
        };
        match serde_json::to_string(&entry) {
            Ok(content) => {
                if let Err(e) = fs::write(&path, content) {
                    log::debug!("cannot write structure cache {}: {}", path.display(), e);
                }
            }
            Err(e) => log::debug!("cannot serialize structure cache entry: {}", e),
        }
    }

    fn file_path(&self, mpid: &str) -> Option<PathBuf> {
        self.cache_dir.as_ref().map(|dir| {
            let filename = mpid.replace([':', '/', '\\'], "_");
            dir.join(format!("{}.json", filename))
        })
    }
}

/// Get current Unix timestamp in seconds.
fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn structure() -> Structure {
        Structure::from_json_str(
            r#"{"lattice": {"matrix": [[3,0,0],[0,3,0],[0,0,3]]},
                "sites": [{"species": [{"element": "Fe", "occu": 1}], "abc": [0,0,0]}]}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_set_then_get() {
        let temp = TempDir::new().unwrap();
        let cache = StructureCache::with_dir(Some(temp.path().to_path_buf()), 24);

        assert!(cache.get("mp-13").is_none());
        cache.set("mp-13", &structure());
        assert_eq!(cache.get("mp-13"), Some(structure()));
        assert!(cache.get("mp-14").is_none());
    }

    #[test]
    fn test_expired_entry_is_ignored() {
        let temp = TempDir::new().unwrap();
        let cache = StructureCache::with_dir(Some(temp.path().to_path_buf()), 1);
        cache.write("mp-13", &structure(), current_timestamp() - 7200);
        assert!(cache.get("mp-13").is_none());
    }

    #[test]
    fn test_zero_ttl_disables_cache() {
        let temp = TempDir::new().unwrap();
        let cache = StructureCache::with_dir(Some(temp.path().to_path_buf()), 0);
        cache.set("mp-13", &structure());
        assert!(cache.get("mp-13").is_none());
        assert!(!temp.path().join("mp-13.json").exists());
    }
}
