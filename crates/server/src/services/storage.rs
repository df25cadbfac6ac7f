// Blob storage for uploaded attachments, backed by the local filesystem.

use std::path::{Component, Path, PathBuf};

use tokio::fs;
use uuid::Uuid;

use crate::error::{AppError, Result};

const ATTACHMENT_PREFIX: &str = "project-files";

#[derive(Clone, Debug)]
pub struct BlobStore {
    base_path: PathBuf,
}

impl BlobStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(self.base_path.join(ATTACHMENT_PREFIX))
            .await
            .map_err(|e| AppError::Storage(format!("Failed to create storage directory: {e}")))?;
        Ok(())
    }

    /// Store `bytes` under a fresh key and return the key.
    pub async fn store(&self, extension: &str, bytes: &[u8]) -> Result<String> {
        let key = format!("{ATTACHMENT_PREFIX}/{}.{extension}", Uuid::new_v4());
        let path = self.resolve(&key)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Storage(format!("Failed to create directories: {e}")))?;
        }

        fs::write(&path, bytes)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to write blob {key}: {e}")))?;

        Ok(key)
    }

    /// Open the blob stored under `key` for streaming, with its length.
    pub async fn retrieve(&self, key: &str) -> Result<(fs::File, u64)> {
        let path = self.resolve(key)?;

        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::NotFound("Stored file not found".to_string()));
            }
            Err(e) => return Err(AppError::Storage(format!("Failed to open blob {key}: {e}"))),
        };
        let len = file
            .metadata()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to stat blob {key}: {e}")))?
            .len();

        Ok((file, len))
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Storage(format!("Failed to delete blob {key}: {e}"))),
        }
    }

    /// Keys are relative paths without `..` or roots; anything else cannot
    /// have been produced by `store`.
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(AppError::NotFound("Stored file not found".to_string()));
        }
        Ok(self.base_path.join(relative))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use tokio::io::AsyncReadExt;

    use super::*;

    #[tokio::test]
    async fn store_then_retrieve() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        store.init().await.unwrap();

        let key = store.store("pdf", b"%PDF-1.7 body").await.unwrap();
        assert!(key.starts_with("project-files/"));
        assert!(key.ends_with(".pdf"));

        let (mut file, len) = store.retrieve(&key).await.unwrap();
        assert_eq!(len, 13);
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"%PDF-1.7 body");
    }

    #[tokio::test]
    async fn keys_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        let a = store.store("doc", b"a").await.unwrap();
        let b = store.store("doc", b"a").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn traversal_keys_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        for key in ["../etc/passwd", "/etc/passwd", "project-files/../../x", ""] {
            assert_matches!(store.retrieve(key).await, Err(AppError::NotFound(_)));
        }
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        let key = store.store("xlsx", b"sheet").await.unwrap();
        store.delete(&key).await.unwrap();
        store.delete(&key).await.unwrap();
        assert_matches!(store.retrieve(&key).await, Err(AppError::NotFound(_)));
    }
}
