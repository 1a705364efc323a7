//! Storage trait definition

use std::fmt::Debug;

use async_trait::async_trait;

use crate::domain::DomainError;

use super::entity::{StorageEntity, StorageKey};

/// Row filter used by [`Storage::find`]
pub type Predicate<'a, E> = &'a (dyn Fn(&E) -> bool + Send + Sync);

/// In-place change applied atomically by [`Storage::modify`]
pub type Mutation<E> = Box<dyn FnOnce(&mut E) -> Result<(), DomainError> + Send>;

/// Generic storage trait for CRUD operations on any entity type
#[async_trait]
pub trait Storage<E>: Send + Sync + Debug
where
    E: StorageEntity + 'static,
{
    async fn get(&self, key: &E::Key) -> Result<Option<E>, DomainError>;

    async fn list(&self) -> Result<Vec<E>, DomainError>;

    /// Creates a new entity, returns error if already exists
    async fn create(&self, entity: E) -> Result<E, DomainError>;

    /// Updates an existing entity, returns error if not found
    async fn update(&self, entity: E) -> Result<E, DomainError>;

    /// Deletes an entity by its key, returns true if deleted
    async fn delete(&self, key: &E::Key) -> Result<bool, DomainError>;

    /// Applies a read-modify-write to one row without interleaving other writers.
    ///
    /// The row is left untouched when the mutation returns an error.
    async fn modify(&self, key: &E::Key, mutation: Mutation<E>) -> Result<E, DomainError>;

    /// Upserts and deletes a batch of rows as a single transaction.
    async fn apply(&self, upserts: Vec<E>, deletes: Vec<E::Key>) -> Result<(), DomainError>;

    async fn find(&self, predicate: Predicate<'_, E>) -> Result<Vec<E>, DomainError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|e| predicate(e))
            .collect())
    }

    async fn get_required(&self, key: &E::Key) -> Result<E, DomainError> {
        self.get(key)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("'{}' not found", key.as_str())))
    }

    async fn exists(&self, key: &E::Key) -> Result<bool, DomainError> {
        Ok(self.get(key).await?.is_some())
    }

    async fn count(&self) -> Result<usize, DomainError> {
        Ok(self.list().await?.len())
    }
}
