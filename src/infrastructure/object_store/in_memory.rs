//! In-memory object store

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::domain::{DomainError, ObjectStore};

#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<(String, String), Bytes>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<(), DomainError> {
        self.objects
            .write()
            .await
            .insert((bucket.to_string(), key.to_string()), data);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, DomainError> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("Object '{}/{}' not found", bucket, key)))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<bool, DomainError> {
        Ok(self
            .objects
            .write()
            .await
            .remove(&(bucket.to_string(), key.to_string()))
            .is_some())
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, DomainError> {
        Ok(self
            .objects
            .read()
            .await
            .contains_key(&(bucket.to_string(), key.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryObjectStore::new();

        store
            .put_object("uploads", "kb1/a.txt", Bytes::from_static(b"hello"))
            .await
            .unwrap();

        assert!(store.exists("uploads", "kb1/a.txt").await.unwrap());
        assert_eq!(
            store.get_object("uploads", "kb1/a.txt").await.unwrap(),
            Bytes::from_static(b"hello")
        );
        assert!(store.delete("uploads", "kb1/a.txt").await.unwrap());
        assert!(!store.delete("uploads", "kb1/a.txt").await.unwrap());
        assert!(matches!(
            store.get_object("uploads", "kb1/a.txt").await,
            Err(DomainError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_download_writes_local_file() {
        let store = InMemoryObjectStore::new();
        store
            .put_object("b", "k.txt", Bytes::from_static(b"content"))
            .await
            .unwrap();

        let path = std::env::temp_dir()
            .join(format!("obj-{}", uuid::Uuid::new_v4()))
            .join("k.txt");
        store.download("b", "k.txt", &path).await.unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"content");
        let _ = tokio::fs::remove_dir_all(path.parent().unwrap()).await;
    }
}
