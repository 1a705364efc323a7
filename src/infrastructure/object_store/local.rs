//! Filesystem-backed object store: `{root}/{bucket}/{key}`

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::{DomainError, ObjectStore};

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, DomainError> {
        let relative = Path::new(bucket).join(key);

        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(DomainError::validation(format!(
                "Object key '{}/{}' must be a plain relative path",
                bucket, key
            )));
        }

        Ok(self.root.join(relative))
    }
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> DomainError {
    DomainError::storage(format!("failed to {} {}: {}", action, path.display(), e))
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<(), DomainError> {
        let path = self.object_path(bucket, key)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error("create", parent, e))?;
        }

        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| io_error("write", &path, e))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, DomainError> {
        let path = self.object_path(bucket, key)?;

        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(DomainError::not_found(format!(
                "Object '{}/{}' not found",
                bucket, key
            ))),
            Err(e) => Err(io_error("read", &path, e)),
        }
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<bool, DomainError> {
        let path = self.object_path(bucket, key)?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error("delete", &path, e)),
        }
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, DomainError> {
        let path = self.object_path(bucket, key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| io_error("stat", &path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("local-store-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_round_trip_on_disk() {
        let root = temp_root();
        let store = LocalObjectStore::new(&root);

        store
            .put_object("uploads", "kb1/notes.md", Bytes::from_static(b"# Notes"))
            .await
            .unwrap();

        assert!(root.join("uploads/kb1/notes.md").exists());
        assert_eq!(
            store.get_object("uploads", "kb1/notes.md").await.unwrap(),
            Bytes::from_static(b"# Notes")
        );
        assert!(store.delete("uploads", "kb1/notes.md").await.unwrap());
        assert!(!store.exists("uploads", "kb1/notes.md").await.unwrap());

        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let store = LocalObjectStore::new(temp_root());
        let result = store
            .put_object("uploads", "../escape.txt", Bytes::from_static(b"x"))
            .await;

        assert!(matches!(result, Err(DomainError::Validation { .. })));
    }
}
