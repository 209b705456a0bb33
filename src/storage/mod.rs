//! Key-value persistence for the exercise library
//!
//! The library lives under a single key, rewritten whole on every change.
//! Backends enforce a byte quota the way browser storage does: a write that
//! would push the total over the quota is refused and nothing changes.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::RecorderError;

pub mod store;

pub use store::ExerciseStore;

pub trait KeyValueStorage: Send {
    fn get(&self, key: &str) -> Result<Option<String>, RecorderError>;

    /// Replace the value under `key` as one unit.
    fn set(&mut self, key: &str, value: &str) -> Result<(), RecorderError>;

    fn remove(&mut self, key: &str) -> Result<(), RecorderError>;

    fn quota_bytes(&self) -> Option<usize>;
}

fn validate_key(key: &str) -> Result<(), RecorderError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(RecorderError::storage(format!("invalid storage key '{}'", key)))
    }
}

fn check_quota(quota: Option<usize>, others: usize, key: &str, value: &str) -> Result<(), RecorderError> {
    if let Some(quota) = quota {
        let needed = others + key.len() + value.len();
        if needed > quota {
            log::error!("Storage quota exceeded writing '{}': {} > {}", key, needed, quota);
            return Err(RecorderError::QuotaExceeded { needed, quota });
        }
    }
    Ok(())
}

/// In-process storage
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
    quota: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: HashMap::new(),
            quota: Some(quota),
        }
    }

    /// Bytes used by every key except `key`, counting keys and values.
    fn used_excluding(&self, key: &str) -> usize {
        self.entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, RecorderError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), RecorderError> {
        validate_key(key)?;
        check_quota(self.quota, self.used_excluding(key), key, value)?;
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), RecorderError> {
        self.entries.remove(key);
        Ok(())
    }

    fn quota_bytes(&self) -> Option<usize> {
        self.quota
    }
}

/// One `<key>.json` file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
    quota: Option<usize>,
}

impl FileStorage {
    /// Open (and create if needed) a storage directory
    pub fn open<P: AsRef<Path>>(dir: P, quota: Option<usize>) -> Result<Self, RecorderError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        log::debug!("Opened file storage at {:?}", dir);
        Ok(Self { dir, quota })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn used_excluding(&self, key: &str) -> Result<usize, RecorderError> {
        let own = format!("{}.json", key);
        let mut total = 0usize;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == own {
                continue;
            }
            if let Some(other_key) = name.strip_suffix(".json") {
                total += other_key.len() + entry.metadata()?.len() as usize;
            }
        }
        Ok(total)
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, RecorderError> {
        validate_key(key)?;
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), RecorderError> {
        validate_key(key)?;
        check_quota(self.quota, self.used_excluding(key)?, key, value)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path_for(key))
            .map_err(|e| RecorderError::Io(e.error))?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), RecorderError> {
        validate_key(key)?;
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn quota_bytes(&self) -> Option<usize> {
        self.quota
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_quota_counts_other_keys() {
        let mut storage = MemoryStorage::with_quota(20);
        storage.set("a", "123456789").unwrap();
        // replacing the same key only counts the new value
        storage.set("a", "1234567890").unwrap();
        let err = storage.set("b", "1234567890").unwrap_err();
        assert!(matches!(err, RecorderError::QuotaExceeded { quota: 20, .. }));
        assert!(storage.get("b").unwrap().is_none());
    }

    #[test]
    fn test_invalid_keys_rejected() {
        let mut storage = MemoryStorage::new();
        assert!(storage.set("../escape", "x").is_err());
        assert!(storage.set("", "x").is_err());
    }

    #[test]
    fn test_file_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::open(dir.path().join("lib"), None).unwrap();
        assert!(storage.get("exercises").unwrap().is_none());

        storage.set("exercises", "[]").unwrap();
        assert_eq!(storage.get("exercises").unwrap().as_deref(), Some("[]"));

        storage.remove("exercises").unwrap();
        storage.remove("exercises").unwrap();
        assert!(storage.get("exercises").unwrap().is_none());
    }

    #[test]
    fn test_file_quota_leaves_previous_value() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::open(dir.path(), Some(32)).unwrap();
        storage.set("exercises", "[1,2,3]").unwrap();

        let big = "x".repeat(64);
        assert!(matches!(
            storage.set("exercises", &big),
            Err(RecorderError::QuotaExceeded { .. })
        ));
        assert_eq!(storage.get("exercises").unwrap().as_deref(), Some("[1,2,3]"));
    }
}
