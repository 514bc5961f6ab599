//! Progress record persistence.
//!
//! Stores keep one record per (user, course) and enforce an optimistic version
//! check on save, so a write based on a stale read is rejected instead of
//! silently overwriting newer work.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::error::{ProgressError, Result};
use crate::progress::ProgressRecord;

/// Persistence backend for progress records.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Persist a new record. Fails with `AlreadyEnrolled` if one exists.
    async fn insert(&self, record: &ProgressRecord) -> Result<()>;

    /// Load the record for a (user, course) pair.
    async fn load(&self, user_id: &str, course_id: &str) -> Result<Option<ProgressRecord>>;

    /// Overwrite a record previously loaded at `record.version`.
    ///
    /// Returns the new version. Fails with `VersionConflict` if the stored
    /// record moved on in the meantime.
    async fn save(&self, record: &ProgressRecord) -> Result<u64>;

    /// All records belonging to a user.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<ProgressRecord>>;
}

fn not_enrolled(record: &ProgressRecord) -> ProgressError {
    ProgressError::NotEnrolled {
        user_id: record.user_id.clone(),
        course_id: record.course_id.clone(),
    }
}

fn already_enrolled(record: &ProgressRecord) -> ProgressError {
    ProgressError::AlreadyEnrolled {
        user_id: record.user_id.clone(),
        course_id: record.course_id.clone(),
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Process-local store backed by a map.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<(String, String), ProgressRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn insert(&self, record: &ProgressRecord) -> Result<()> {
        let mut records = self.records.write().await;
        let key = (record.user_id.clone(), record.course_id.clone());
        if records.contains_key(&key) {
            return Err(already_enrolled(record));
        }
        records.insert(key, record.clone());
        Ok(())
    }

    async fn load(&self, user_id: &str, course_id: &str) -> Result<Option<ProgressRecord>> {
        let records = self.records.read().await;
        Ok(records
            .get(&(user_id.to_string(), course_id.to_string()))
            .cloned())
    }

    async fn save(&self, record: &ProgressRecord) -> Result<u64> {
        let mut records = self.records.write().await;
        let key = (record.user_id.clone(), record.course_id.clone());
        let stored = records.get_mut(&key).ok_or_else(|| not_enrolled(record))?;
        if stored.version != record.version {
            return Err(ProgressError::VersionConflict {
                expected: record.version,
                found: stored.version,
            });
        }

        let mut next = record.clone();
        next.version += 1;
        let version = next.version;
        *stored = next;
        Ok(version)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<ProgressRecord>> {
        let records = self.records.read().await;
        let mut list: Vec<ProgressRecord> = records
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.course_id.cmp(&b.course_id));
        Ok(list)
    }
}

// ---------------------------------------------------------------------------
// JSON directory store
// ---------------------------------------------------------------------------

/// One pretty-printed JSON file per record under a directory.
pub struct JsonDirStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonDirStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            ProgressError::Storage(format!("failed to create {}: {e}", dir.display()))
        })?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, user_id: &str, course_id: &str) -> PathBuf {
        self.dir.join(format!(
            "{}@{}.json",
            encode_component(user_id),
            encode_component(course_id)
        ))
    }

    async fn read(path: &Path) -> Result<Option<ProgressRecord>> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str(&content).map(Some).map_err(|e| {
                ProgressError::Storage(format!("failed to parse {}: {e}", path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ProgressError::Storage(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    async fn write(path: &Path, record: &ProgressRecord) -> Result<()> {
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| ProgressError::Storage(format!("failed to serialize record: {e}")))?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(|e| {
            ProgressError::Storage(format!("failed to write {}: {e}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, path).await.map_err(|e| {
            ProgressError::Storage(format!("failed to replace {}: {e}", path.display()))
        })
    }
}

/// Make an id safe for use in a file name.
fn encode_component(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for b in id.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

#[async_trait]
impl ProgressStore for JsonDirStore {
    async fn insert(&self, record: &ProgressRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.path_for(&record.user_id, &record.course_id);
        if Self::read(&path).await?.is_some() {
            return Err(already_enrolled(record));
        }
        Self::write(&path, record).await
    }

    async fn load(&self, user_id: &str, course_id: &str) -> Result<Option<ProgressRecord>> {
        Self::read(&self.path_for(user_id, course_id)).await
    }

    async fn save(&self, record: &ProgressRecord) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let path = self.path_for(&record.user_id, &record.course_id);
        let stored = Self::read(&path)
            .await?
            .ok_or_else(|| not_enrolled(record))?;
        if stored.version != record.version {
            return Err(ProgressError::VersionConflict {
                expected: record.version,
                found: stored.version,
            });
        }

        let mut next = record.clone();
        next.version += 1;
        Self::write(&path, &next).await?;
        Ok(next.version)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<ProgressRecord>> {
        let prefix = format!("{}@", encode_component(user_id));
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
            ProgressError::Storage(format!("failed to read {}: {e}", self.dir.display()))
        })?;

        let mut list = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ProgressError::Storage(e.to_string()))?
        {
            let path = entry.path();
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".json"));
            if !matches {
                continue;
            }
            match Self::read(&path).await {
                Ok(Some(record)) => list.push(record),
                Ok(None) => {}
                Err(e) => tracing::warn!("skipping {}: {}", path.display(), e),
            }
        }

        list.sort_by(|a, b| a.course_id.cmp(&b.course_id));
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn exercise(store: &dyn ProgressStore) {
        let record = ProgressRecord::new("ada", "rust-101", Utc::now());
        store.insert(&record).await.unwrap();
        assert!(matches!(
            store.insert(&record).await,
            Err(ProgressError::AlreadyEnrolled { .. })
        ));

        let mut loaded = store.load("ada", "rust-101").await.unwrap().unwrap();
        assert_eq!(loaded.version, 0);
        loaded.total_points_earned = 5.0;
        let version = store.save(&loaded).await.unwrap();
        assert_eq!(version, 1);

        // Writing again from the stale read is rejected.
        let err = store.save(&loaded).await.unwrap_err();
        assert!(matches!(
            err,
            ProgressError::VersionConflict {
                expected: 0,
                found: 1
            }
        ));

        let reloaded = store.load("ada", "rust-101").await.unwrap().unwrap();
        assert_eq!(reloaded.total_points_earned, 5.0);
        assert_eq!(reloaded.version, 1);

        store
            .insert(&ProgressRecord::new("ada", "go-101", Utc::now()))
            .await
            .unwrap();
        store
            .insert(&ProgressRecord::new("bob", "rust-101", Utc::now()))
            .await
            .unwrap();
        let courses: Vec<String> = store
            .list_for_user("ada")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.course_id)
            .collect();
        assert_eq!(courses, vec!["go-101", "rust-101"]);

        assert!(store.load("carol", "rust-101").await.unwrap().is_none());
        let orphan = ProgressRecord::new("carol", "rust-101", Utc::now());
        assert!(matches!(
            store.save(&orphan).await,
            Err(ProgressError::NotEnrolled { .. })
        ));
    }

    #[tokio::test]
    async fn memory_store_contract() {
        exercise(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn json_dir_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::open(dir.path().join("progress")).unwrap();
        exercise(&store).await;
        assert!(store.dir().join("ada@rust-101.json").exists());
    }

    #[test]
    fn file_names_are_escaped() {
        assert_eq!(encode_component("ada"), "ada");
        assert_eq!(encode_component("a.b/c@d"), "a%2Eb%2Fc%40d");
    }
}
