//! Credential record persistence.
//!
//! Stores only ever see encrypted payloads. Two backends ship: an in-memory
//! map and a JSON file that is loaded on open and rewritten on every mutation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use persona_core::error::VaultError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

/// One owner's encrypted credential plus its last validation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub owner_id: String,
    /// `iv:tag:ciphertext` hex payload
    pub encrypted_payload: String,
    pub is_valid: bool,
    pub last_validated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persistence seam for credential records. One record per owner;
/// `put` overwrites.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// The backend name (e.g., "memory", "file").
    fn name(&self) -> &str;

    async fn get(&self, owner_id: &str) -> Result<Option<CredentialRecord>, VaultError>;

    async fn put(&self, record: CredentialRecord) -> Result<(), VaultError>;

    /// Returns whether a record existed.
    async fn delete(&self, owner_id: &str) -> Result<bool, VaultError>;

    async fn count(&self) -> Result<usize, VaultError>;
}

/// Process-lifetime store.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    records: RwLock<HashMap<String, CredentialRecord>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, owner_id: &str) -> Result<Option<CredentialRecord>, VaultError> {
        Ok(self.records.read().await.get(owner_id).cloned())
    }

    async fn put(&self, record: CredentialRecord) -> Result<(), VaultError> {
        self.records
            .write()
            .await
            .insert(record.owner_id.clone(), record);
        Ok(())
    }

    async fn delete(&self, owner_id: &str) -> Result<bool, VaultError> {
        Ok(self.records.write().await.remove(owner_id).is_some())
    }

    async fn count(&self) -> Result<usize, VaultError> {
        Ok(self.records.read().await.len())
    }
}

/// JSON-file store: `{ "<owner>": CredentialRecord, ... }`.
///
/// The whole map is held in memory and flushed to disk after each `put` or
/// `delete`. The file is created on first write with owner-only permissions.
pub struct FileCredentialStore {
    path: PathBuf,
    records: RwLock<BTreeMap<String, CredentialRecord>>,
}

impl FileCredentialStore {
    /// Open (or lazily create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, VaultError> {
        let path = path.into();
        let records = Self::load_from_disk(&path)?;
        debug!(path = %path.display(), count = records.len(), "Credential store loaded");
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> Result<BTreeMap<String, CredentialRecord>, VaultError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(VaultError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content).map_err(|e| {
            VaultError::Storage(format!("Corrupt credential file {}: {e}", path.display()))
        })
    }

    fn write_to_disk(&self, content: &str) -> Result<(), VaultError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                VaultError::Storage(format!("Failed to create credential directory: {e}"))
            })?;
        }

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(&self.path)
            .map_err(|e| VaultError::Storage(format!("Failed to open credential file: {e}")))?;

        // mode() only applies on create; tighten files written by older builds
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .map_err(|e| VaultError::Storage(format!("Failed to restrict permissions: {e}")))?;
        }

        file.write_all(content.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| VaultError::Storage(format!("Failed to write credential file: {e}")))
    }

    fn serialize(records: &BTreeMap<String, CredentialRecord>) -> Result<String, VaultError> {
        serde_json::to_string_pretty(records)
            .map_err(|e| VaultError::Storage(format!("Failed to serialize credentials: {e}")))
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, owner_id: &str) -> Result<Option<CredentialRecord>, VaultError> {
        Ok(self.records.read().await.get(owner_id).cloned())
    }

    async fn put(&self, record: CredentialRecord) -> Result<(), VaultError> {
        let mut records = self.records.write().await;
        let previous = records.insert(record.owner_id.clone(), record.clone());
        let content = Self::serialize(&records)?;
        if let Err(e) = self.write_to_disk(&content) {
            // keep memory consistent with disk
            match previous {
                Some(prev) => records.insert(prev.owner_id.clone(), prev),
                None => records.remove(&record.owner_id),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn delete(&self, owner_id: &str) -> Result<bool, VaultError> {
        let mut records = self.records.write().await;
        let Some(previous) = records.remove(owner_id) else {
            return Ok(false);
        };
        let content = Self::serialize(&records)?;
        if let Err(e) = self.write_to_disk(&content) {
            records.insert(owner_id.to_string(), previous);
            return Err(e);
        }
        Ok(true)
    }

    async fn count(&self) -> Result<usize, VaultError> {
        Ok(self.records.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(owner: &str, valid: bool) -> CredentialRecord {
        let now = Utc::now();
        CredentialRecord {
            owner_id: owner.into(),
            encrypted_payload: "00:11:22".into(),
            is_valid: valid,
            last_validated_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn memory_store_put_get_delete() {
        let store = InMemoryCredentialStore::new();
        store.put(record("alice", true)).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.get("alice").await.unwrap().unwrap().is_valid);
        assert!(store.get("bob").await.unwrap().is_none());

        assert!(store.delete("alice").await.unwrap());
        assert!(!store.delete("alice").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn memory_store_last_write_wins() {
        let store = InMemoryCredentialStore::new();
        store.put(record("alice", true)).await.unwrap();
        store.put(record("alice", false)).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(!store.get("alice").await.unwrap().unwrap().is_valid);
    }

    #[tokio::test]
    async fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("credentials.json");

        {
            let store = FileCredentialStore::open(&path).unwrap();
            store.put(record("alice", true)).await.unwrap();
            store.put(record("bob", false)).await.unwrap();
            store.delete("bob").await.unwrap();
        }

        let reopened = FileCredentialStore::open(&path).unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
        let alice = reopened.get("alice").await.unwrap().unwrap();
        assert_eq!(alice.encrypted_payload, "00:11:22");
        assert!(reopened.get("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::open(dir.path().join("absent.json")).unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(store.name(), "file");
    }

    #[test]
    fn file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            FileCredentialStore::open(&path),
            Err(VaultError::Storage(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_store_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let store = FileCredentialStore::open(&path).unwrap();
        store.put(record("alice", true)).await.unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_store_tightens_existing_file() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let store = FileCredentialStore::open(&path).unwrap();
        store.put(record("alice", true)).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        let reopened = FileCredentialStore::open(&path).unwrap();
        assert!(reopened.get("alice").await.unwrap().is_some());
    }
}
