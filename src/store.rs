//! Raw upload storage.
//!
//! The pipeline only ever sees an opaque path token: [`FileStore::store`]
//! hands one out and [`FileStore::load`] takes it back. [`LocalFileStore`]
//! keeps files under one root directory, one sub-directory per owner:
//!
//! ```text
//! upload-dir/
//! └── alice_at_example_com/
//!     └── 20241216_143005_1a2b3c4d.jpg
//! ```

use crate::error::ReceiptError;
use async_trait::async_trait;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Byte storage for uploaded receipts.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Persist `bytes` for `owner`; `file_name` only contributes its extension.
    async fn store(&self, bytes: &[u8], owner: &str, file_name: &str) -> Result<String, ReceiptError>;

    async fn load(&self, token: &str) -> Result<Vec<u8>, ReceiptError>;

    /// Remove a stored file. Deleting a missing file is not an error.
    async fn delete(&self, token: &str) -> Result<(), ReceiptError>;
}

/// [`FileStore`] backed by a local directory.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a token back to a path, refusing anything that escapes the root.
    fn resolve(&self, token: &str) -> Result<PathBuf, ReceiptError> {
        let relative = Path::new(token);
        let safe = !token.trim().is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(ReceiptError::Storage {
                detail: format!("Invalid storage path '{}'", token),
                source: None,
            });
        }
        Ok(self.root.join(relative))
    }
}

/// Owner keys are e-mail addresses; make them safe as directory names.
pub fn sanitize_owner(owner: &str) -> String {
    owner
        .trim()
        .replace('@', "_at_")
        .replace('.', "_")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// `yyyyMMdd_HHmmss_<8 hex chars><ext>`, unique per call.
fn unique_file_name(file_name: &str) -> String {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();
    let id = Uuid::new_v4().simple().to_string();
    format!("{}_{}{}", Utc::now().format("%Y%m%d_%H%M%S"), &id[..8], ext)
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn store(&self, bytes: &[u8], owner: &str, file_name: &str) -> Result<String, ReceiptError> {
        let owner_dir = sanitize_owner(owner);
        if owner_dir.is_empty() {
            return Err(ReceiptError::Validation("Owner cannot be empty".into()));
        }

        let dir = self.root.join(&owner_dir);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ReceiptError::storage(format!("Failed to create {}", dir.display()), e))?;

        let name = unique_file_name(file_name);
        let path = dir.join(&name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ReceiptError::storage(format!("Failed to write {}", path.display()), e))?;

        info!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(format!("{}/{}", owner_dir, name))
    }

    async fn load(&self, token: &str) -> Result<Vec<u8>, ReceiptError> {
        let path = self.resolve(token)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ReceiptError::storage(format!("Failed to read {}", path.display()), e))?;
        debug!("Loaded {} bytes from {}", bytes.len(), path.display());
        Ok(bytes)
    }

    async fn delete(&self, token: &str) -> Result<(), ReceiptError> {
        let path = self.resolve(token)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ReceiptError::storage(
                format!("Failed to delete {}", path.display()),
                e,
            )),
        }
    }
}
