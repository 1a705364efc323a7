//! Relational persistence abstraction for documents, chunks and knowledge bases

mod entity;
mod repository;

pub use entity::{StorageEntity, StorageKey};
pub use repository::{Mutation, Predicate, Storage};
