//! Object storage collaborator

use std::fmt::Debug;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;

#[cfg(test)]
use mockall::automock;

use super::DomainError;

/// Bucket/key blob storage. Objects are visible to `get_object` once
/// `put_object` returns.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync + Debug {
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<(), DomainError>;

    /// `NotFound` when the key is absent
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, DomainError>;

    /// Returns false when nothing was stored under the key
    async fn delete(&self, bucket: &str, key: &str) -> Result<bool, DomainError>;

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, DomainError>;

    async fn upload(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), DomainError> {
        let data = tokio::fs::read(local_path).await.map_err(|e| {
            DomainError::storage(format!("failed to read {}: {}", local_path.display(), e))
        })?;

        self.put_object(bucket, key, Bytes::from(data)).await
    }

    async fn download(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), DomainError> {
        let data = self.get_object(bucket, key).await?;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DomainError::storage(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }

        tokio::fs::write(local_path, &data).await.map_err(|e| {
            DomainError::storage(format!("failed to write {}: {}", local_path.display(), e))
        })
    }
}
