//! Snapshot persistence
//!
//! The state machine only needs `load`/`save`; the backing store is
//! swappable. `compare_and_save` adds a version check on top of `save`.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::progress::MigrationProgress;

/// Persistence boundary for migration snapshots
#[async_trait]
pub trait MigrationStore: Send + Sync {
    /// Load a snapshot; `Ok(None)` when not found
    async fn load(&self, id: &str) -> Result<Option<MigrationProgress>, StoreError>;

    /// Store a snapshot unconditionally
    async fn save(&self, id: &str, snapshot: &MigrationProgress) -> Result<(), StoreError>;

    /// Ids of every stored snapshot
    async fn list(&self) -> Result<Vec<String>, StoreError>;

    /// Store `snapshot` only if the stored version equals `expected_version`
    ///
    /// A missing snapshot has version 0. The default is a plain
    /// load-compare-save and is not atomic; stores that can do better
    /// override it.
    async fn compare_and_save(
        &self,
        id: &str,
        expected_version: u64,
        snapshot: &MigrationProgress,
    ) -> Result<(), StoreError> {
        let actual = self.load(id).await?.map_or(0, |p| p.version);
        if actual != expected_version {
            return Err(StoreError::VersionConflict {
                id: id.to_string(),
                expected: expected_version,
                actual,
            });
        }
        self.save(id, snapshot).await
    }
}

/// Process-local store backed by a concurrent map
#[derive(Debug, Default)]
pub struct InMemoryStore {
    snapshots: DashMap<String, MigrationProgress>,
}

impl InMemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// No snapshots stored
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[async_trait]
impl MigrationStore for InMemoryStore {
    async fn load(&self, id: &str) -> Result<Option<MigrationProgress>, StoreError> {
        Ok(self.snapshots.get(id).map(|p| p.value().clone()))
    }

    async fn save(&self, id: &str, snapshot: &MigrationProgress) -> Result<(), StoreError> {
        self.snapshots.insert(id.to_string(), snapshot.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self.snapshots.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }

    async fn compare_and_save(
        &self,
        id: &str,
        expected_version: u64,
        snapshot: &MigrationProgress,
    ) -> Result<(), StoreError> {
        // The entry holds the shard lock for the whole check-and-write
        match self.snapshots.entry(id.to_string()) {
            Entry::Occupied(mut entry) => {
                let actual = entry.get().version;
                if actual != expected_version {
                    return Err(StoreError::VersionConflict {
                        id: id.to_string(),
                        expected: expected_version,
                        actual,
                    });
                }
                entry.insert(snapshot.clone());
            }
            Entry::Vacant(entry) => {
                if expected_version != 0 {
                    return Err(StoreError::VersionConflict {
                        id: id.to_string(),
                        expected: expected_version,
                        actual: 0,
                    });
                }
                entry.insert(snapshot.clone());
            }
        }
        Ok(())
    }
}

/// One pretty-printed JSON file per migration under a directory
///
/// Writes go to a temporary file that is renamed over the target, so a
/// reader never sees a partial snapshot. `compare_and_save` is serialized
/// within the process only.
#[derive(Debug)]
pub struct JsonFileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Store rooted at `root`; the directory is created on first save
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Directory holding the snapshots
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        let valid = !id.is_empty()
            && !id.starts_with('.')
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(StoreError::InvalidKey(id.to_string()));
        }
        Ok(self.root.join(format!("{id}.json")))
    }

    async fn write_atomic(&self, id: &str, snapshot: &MigrationProgress) -> Result<(), StoreError> {
        let path = self.path_for(id)?;
        tokio::fs::create_dir_all(&self.root).await?;
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.root.join(format!(".{id}.json.tmp"));
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!("Saved snapshot {} (version {})", id, snapshot.version);
        Ok(())
    }
}

#[async_trait]
impl MigrationStore for JsonFileStore {
    async fn load(&self, id: &str) -> Result<Option<MigrationProgress>, StoreError> {
        let path = self.path_for(id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, id: &str, snapshot: &MigrationProgress) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.write_atomic(id, snapshot).await
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with('.') {
                continue;
            }
            if let Some(id) = name.strip_suffix(".json") {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn compare_and_save(
        &self,
        id: &str,
        expected_version: u64,
        snapshot: &MigrationProgress,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let actual = self.load(id).await?.map_or(0, |p| p.version);
        if actual != expected_version {
            return Err(StoreError::VersionConflict {
                id: id.to_string(),
                expected: expected_version,
                actual,
            });
        }
        self.write_atomic(id, snapshot).await
    }
}
