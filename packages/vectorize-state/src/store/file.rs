//! Local filesystem storage adapter

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use super::StorageClient;
use crate::error::{Result, StateError};

/// Filesystem storage rooted at a directory
///
/// Containers map to subdirectories of the root; blob paths map to files
/// under the container. Parent directories are created on write.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn blob_path(&self, container: &str, path: &str) -> PathBuf {
        self.root.join(container).join(path)
    }
}

#[async_trait]
impl StorageClient for FileStorage {
    async fn exists(&self, container: &str, path: &str) -> Result<bool> {
        Ok(fs::try_exists(self.blob_path(container, path)).await?)
    }

    async fn read(&self, container: &str, path: &str) -> Result<Vec<u8>> {
        let blob_path = self.blob_path(container, path);
        match fs::read(&blob_path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StateError::not_found(blob_path.display().to_string()))
            }
            Err(e) => Err(StateError::storage(format!(
                "Failed to read '{}'",
                blob_path.display()
            ))
            .with_source(e)),
        }
    }

    async fn write(&self, container: &str, path: &str, data: &[u8]) -> Result<()> {
        let blob_path = self.blob_path(container, path);
        if let Some(parent) = blob_path.parent() {
            create_dir_all(parent).await?;
        }
        fs::write(&blob_path, data).await.map_err(|e| {
            StateError::storage(format!("Failed to write '{}'", blob_path.display()))
                .with_source(e)
        })
    }
}

async fn create_dir_all(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).await.map_err(|e| {
        StateError::storage(format!("Failed to create directory '{}'", dir.display()))
            .with_source(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_creates_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());

        storage
            .write("vectorization-state", "execution-state/doc.json", b"{}")
            .await
            .unwrap();

        assert!(storage
            .exists("vectorization-state", "execution-state/doc.json")
            .await
            .unwrap());
        assert_eq!(
            storage
                .read("vectorization-state", "execution-state/doc.json")
                .await
                .unwrap(),
            b"{}"
        );
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());

        let err = storage.read("c", "missing.txt").await.unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let storage = FileStorage::new(dir.path());
            storage.write("c", "a.txt", b"payload").await.unwrap();
        }

        let reopened = FileStorage::new(dir.path());
        assert_eq!(reopened.read("c", "a.txt").await.unwrap(), b"payload");
    }
}
