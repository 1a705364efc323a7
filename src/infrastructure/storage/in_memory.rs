//! In-memory storage implementation

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::domain::storage::{Mutation, Predicate, Storage, StorageEntity, StorageKey};
use crate::domain::DomainError;

/// Thread-safe in-memory storage.
///
/// Every write holds the table lock for its whole duration, so `modify` and
/// `apply` behave like single-row and multi-row transactions.
#[derive(Debug)]
pub struct InMemoryStorage<E>
where
    E: StorageEntity,
{
    entities: RwLock<HashMap<String, E>>,
}

impl<E> Default for InMemoryStorage<E>
where
    E: StorageEntity,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> InMemoryStorage<E>
where
    E: StorageEntity,
{
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, E>>, DomainError> {
        self.entities
            .read()
            .map_err(|e| DomainError::storage(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, E>>, DomainError> {
        self.entities
            .write()
            .map_err(|e| DomainError::storage(format!("Failed to acquire write lock: {}", e)))
    }
}

#[async_trait]
impl<E> Storage<E> for InMemoryStorage<E>
where
    E: StorageEntity + 'static,
{
    async fn get(&self, key: &E::Key) -> Result<Option<E>, DomainError> {
        Ok(self.read()?.get(key.as_str()).cloned())
    }

    async fn list(&self) -> Result<Vec<E>, DomainError> {
        Ok(self.read()?.values().cloned().collect())
    }

    async fn create(&self, entity: E) -> Result<E, DomainError> {
        let key = entity.key().as_str().to_string();
        let mut entities = self.write()?;

        if entities.contains_key(&key) {
            return Err(DomainError::conflict(format!(
                "Entity with key '{}' already exists",
                key
            )));
        }

        entities.insert(key, entity.clone());
        Ok(entity)
    }

    async fn update(&self, entity: E) -> Result<E, DomainError> {
        let key = entity.key().as_str().to_string();
        let mut entities = self.write()?;

        if !entities.contains_key(&key) {
            return Err(DomainError::not_found(format!(
                "Entity with key '{}' not found",
                key
            )));
        }

        entities.insert(key, entity.clone());
        Ok(entity)
    }

    async fn delete(&self, key: &E::Key) -> Result<bool, DomainError> {
        Ok(self.write()?.remove(key.as_str()).is_some())
    }

    async fn modify(&self, key: &E::Key, mutation: Mutation<E>) -> Result<E, DomainError> {
        let mut entities = self.write()?;

        let mut entity = entities.get(key.as_str()).cloned().ok_or_else(|| {
            DomainError::not_found(format!("Entity with key '{}' not found", key.as_str()))
        })?;

        mutation(&mut entity)?;
        entities.insert(key.as_str().to_string(), entity.clone());

        Ok(entity)
    }

    async fn apply(&self, upserts: Vec<E>, deletes: Vec<E::Key>) -> Result<(), DomainError> {
        let mut entities = self.write()?;

        for key in &deletes {
            entities.remove(key.as_str());
        }

        for entity in upserts {
            entities.insert(entity.key().as_str().to_string(), entity);
        }

        Ok(())
    }

    async fn find(&self, predicate: Predicate<'_, E>) -> Result<Vec<E>, DomainError> {
        Ok(self
            .read()?
            .values()
            .filter(|e| predicate(e))
            .cloned()
            .collect())
    }

    async fn exists(&self, key: &E::Key) -> Result<bool, DomainError> {
        Ok(self.read()?.contains_key(key.as_str()))
    }

    async fn count(&self) -> Result<usize, DomainError> {
        Ok(self.read()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
    struct RowId(String);

    impl StorageKey for RowId {
        fn as_str(&self) -> &str {
            &self.0
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        id: RowId,
        group: String,
        value: i32,
    }

    impl StorageEntity for Row {
        type Key = RowId;

        fn key(&self) -> &Self::Key {
            &self.id
        }
    }

    fn row(id: &str, group: &str, value: i32) -> Row {
        Row {
            id: RowId(id.to_string()),
            group: group.to_string(),
            value,
        }
    }

    fn id(s: &str) -> RowId {
        RowId(s.to_string())
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let storage = InMemoryStorage::new();
        storage.create(row("1", "a", 42)).await.unwrap();

        let result = storage.get(&id("1")).await.unwrap();
        assert_eq!(result, Some(row("1", "a", 42)));
    }

    #[tokio::test]
    async fn test_create_conflict() {
        let storage = InMemoryStorage::new();
        storage.create(row("1", "a", 1)).await.unwrap();

        let result = storage.create(row("1", "a", 2)).await;
        assert!(matches!(result, Err(DomainError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_update_missing_row() {
        let storage: InMemoryStorage<Row> = InMemoryStorage::new();

        let result = storage.update(row("missing", "a", 1)).await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_find_filters_rows() {
        let storage = InMemoryStorage::new();
        storage.create(row("1", "a", 1)).await.unwrap();
        storage.create(row("2", "b", 2)).await.unwrap();
        storage.create(row("3", "a", 3)).await.unwrap();

        let mut found = storage.find(&|r: &Row| r.group == "a").await.unwrap();
        found.sort_by_key(|r| r.value);

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].value, 1);
        assert_eq!(found[1].value, 3);
    }

    #[tokio::test]
    async fn test_modify_is_skipped_on_error() {
        let storage = InMemoryStorage::new();
        storage.create(row("1", "a", 1)).await.unwrap();

        let result = storage
            .modify(
                &id("1"),
                Box::new(|r: &mut Row| {
                    r.value = 99;
                    Err(DomainError::validation("rejected"))
                }),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(storage.get(&id("1")).await.unwrap().unwrap().value, 1);
    }

    #[tokio::test]
    async fn test_modify_applies_change() {
        let storage = InMemoryStorage::new();
        storage.create(row("1", "a", 1)).await.unwrap();

        let updated = storage
            .modify(
                &id("1"),
                Box::new(|r: &mut Row| {
                    r.value += 1;
                    Ok(())
                }),
            )
            .await
            .unwrap();

        assert_eq!(updated.value, 2);
    }

    #[tokio::test]
    async fn test_apply_batch() {
        let storage = InMemoryStorage::new();
        storage.create(row("1", "a", 1)).await.unwrap();
        storage.create(row("2", "a", 2)).await.unwrap();

        storage
            .apply(vec![row("2", "b", 20), row("3", "c", 3)], vec![id("1")])
            .await
            .unwrap();

        assert!(!storage.exists(&id("1")).await.unwrap());
        assert_eq!(storage.get(&id("2")).await.unwrap().unwrap().value, 20);
        assert_eq!(storage.count().await.unwrap(), 2);
    }
}
