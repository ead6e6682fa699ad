//! Receipt persistence.
//!
//! Two implementations of [`ReceiptRepository`]:
//!
//! - [`InMemoryReceiptRepository`] for tests and one-shot library use.
//! - [`JsonDirRepository`] writes one `<id>.json` per receipt; used by the
//!   CLI so records survive between invocations.
//!
//! Both return owner listings newest first.

use crate::error::ReceiptError;
use crate::record::ReceiptRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[async_trait]
pub trait ReceiptRepository: Send + Sync {
    /// Insert or replace `record`, returning what was stored.
    async fn save(&self, record: ReceiptRecord) -> Result<ReceiptRecord, ReceiptError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ReceiptRecord>, ReceiptError>;

    /// All receipts of `owner`, newest first.
    async fn find_by_owner(&self, owner: &str) -> Result<Vec<ReceiptRecord>, ReceiptError>;
}

fn newest_first(records: &mut [ReceiptRecord]) {
    records.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
}

// ── In-memory ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct InMemoryReceiptRepository {
    records: RwLock<HashMap<Uuid, ReceiptRecord>>,
}

impl InMemoryReceiptRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReceiptRepository for InMemoryReceiptRepository {
    async fn save(&self, record: ReceiptRecord) -> Result<ReceiptRecord, ReceiptError> {
        self.records.write().await.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ReceiptRecord>, ReceiptError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn find_by_owner(&self, owner: &str) -> Result<Vec<ReceiptRecord>, ReceiptError> {
        let mut found: Vec<_> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.owner == owner)
            .cloned()
            .collect();
        newest_first(&mut found);
        Ok(found)
    }
}

// ── JSON directory ───────────────────────────────────────────────────────────

/// One pretty-printed JSON file per receipt.
///
/// Writes go to a temporary file in the same directory and are renamed into
/// place, so a crash never leaves a half-written record behind.
#[derive(Debug, Clone)]
pub struct JsonDirRepository {
    dir: PathBuf,
}

impl JsonDirRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }
}

fn write_atomically(dir: &Path, target: &Path, json: &[u8]) -> Result<(), ReceiptError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| ReceiptError::storage(format!("Failed to create {}", dir.display()), e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| ReceiptError::storage("Failed to create temp file", e))?;
    tmp.write_all(json)
        .map_err(|e| ReceiptError::storage("Failed to write temp file", e))?;
    tmp.persist(target).map_err(|e| {
        ReceiptError::storage(format!("Failed to persist {}", target.display()), e.error)
    })?;
    Ok(())
}

fn decode(path: &Path, bytes: &[u8]) -> Result<ReceiptRecord, ReceiptError> {
    serde_json::from_slice(bytes)
        .map_err(|e| ReceiptError::storage(format!("Corrupt record {}", path.display()), e))
}

#[async_trait]
impl ReceiptRepository for JsonDirRepository {
    async fn save(&self, record: ReceiptRecord) -> Result<ReceiptRecord, ReceiptError> {
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|e| ReceiptError::storage("Failed to serialise record", e))?;
        let dir = self.dir.clone();
        let target = self.path_for(record.id);
        tokio::task::spawn_blocking(move || write_atomically(&dir, &target, &json))
            .await
            .map_err(|e| ReceiptError::Internal(format!("Save task panicked: {}", e)))??;
        debug!("Saved receipt {} ({})", record.id, record.status());
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ReceiptRecord>, ReceiptError> {
        let path = self.path_for(id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => decode(&path, &bytes).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ReceiptError::storage(
                format!("Failed to read {}", path.display()),
                e,
            )),
        }
    }

    async fn find_by_owner(&self, owner: &str) -> Result<Vec<ReceiptRecord>, ReceiptError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ReceiptError::storage(
                    format!("Failed to list {}", self.dir.display()),
                    e,
                ))
            }
        };

        let mut found = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ReceiptError::storage("Failed to list records", e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| ReceiptError::storage(format!("Failed to read {}", path.display()), e))?;
            let record = decode(&path, &bytes)?;
            if record.owner == owner {
                found.push(record);
            }
        }
        newest_first(&mut found);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn exercise(repo: &dyn ReceiptRepository) {
        let first = repo
            .save(ReceiptRecord::new_pending("alice@example.com", None))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = repo
            .save(ReceiptRecord::new_pending("alice@example.com", None))
            .await
            .unwrap();
        repo.save(ReceiptRecord::new_pending("bob@example.com", None))
            .await
            .unwrap();

        let found = repo.find_by_id(first.id).await.unwrap().unwrap();
        assert_eq!(found, first);
        assert!(repo.find_by_id(Uuid::new_v4()).await.unwrap().is_none());

        let listed = repo.find_by_owner("alice@example.com").await.unwrap();
        let ids: Vec<_> = listed.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second.id, first.id], "newest first");

        let mut updated = found;
        updated.mark_failed("missing file metadata or storage path");
        repo.save(updated.clone()).await.unwrap();
        assert_eq!(repo.find_by_id(first.id).await.unwrap(), Some(updated));
    }

    #[tokio::test]
    async fn in_memory_repository() {
        exercise(&InMemoryReceiptRepository::new()).await;
    }

    #[tokio::test]
    async fn json_dir_repository() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonDirRepository::new(dir.path().join("receipts"));
        exercise(&repo).await;

        // A fresh handle on the same directory sees the same data.
        let reopened = JsonDirRepository::new(dir.path().join("receipts"));
        assert_eq!(reopened.find_by_owner("bob@example.com").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn json_dir_missing_directory_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonDirRepository::new(dir.path().join("nope"));
        assert!(repo.find_by_owner("x").await.unwrap().is_empty());
    }
}
