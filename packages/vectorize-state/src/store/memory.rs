//! In-process storage adapter

use async_trait::async_trait;
use dashmap::DashMap;

use super::StorageClient;
use crate::error::{Result, StateError};

/// In-memory storage, one map entry per blob
///
/// Blobs are keyed by `(container, path)`. Used by tests and by embedded
/// deployments that do not need durability across restarts.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blobs: DashMap<(String, String), Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs, across all containers.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl StorageClient for MemoryStorage {
    async fn exists(&self, container: &str, path: &str) -> Result<bool> {
        Ok(self
            .blobs
            .contains_key(&(container.to_string(), path.to_string())))
    }

    async fn read(&self, container: &str, path: &str) -> Result<Vec<u8>> {
        self.blobs
            .get(&(container.to_string(), path.to_string()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StateError::not_found(format!("{container}/{path}")))
    }

    async fn write(&self, container: &str, path: &str, data: &[u8]) -> Result<()> {
        self.blobs
            .insert((container.to_string(), path.to_string()), data.to_vec());
        Ok(())
    }
}
