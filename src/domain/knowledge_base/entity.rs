//! Knowledge base entity

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::validation::{validate_knowledge_base_id, KnowledgeBaseValidationError};
use crate::domain::storage::{StorageEntity, StorageKey};

/// Knowledge base identifier - alphanumeric + hyphens, max 50 characters
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KnowledgeBaseId(String);

impl KnowledgeBaseId {
    pub fn new(id: impl Into<String>) -> Result<Self, KnowledgeBaseValidationError> {
        let id = id.into();
        validate_knowledge_base_id(&id)?;
        Ok(Self(id))
    }

    /// Generate a fresh `kb-xxxxxxxx` identifier
    pub fn generate() -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("kb-{}", &uuid[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for KnowledgeBaseId {
    type Error = KnowledgeBaseValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<KnowledgeBaseId> for String {
    fn from(id: KnowledgeBaseId) -> Self {
        id.0
    }
}

impl std::fmt::Display for KnowledgeBaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StorageKey for KnowledgeBaseId {
    fn as_str(&self) -> &str {
        &self.0
    }
}

/// A named collection of documents that may inherit the content of other
/// knowledge bases.
///
/// `parents` and `children` mirror each other across nodes. They are only
/// rewritten through [`super::KnowledgeBaseGraph`], which keeps both sides in
/// step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBase {
    id: KnowledgeBaseId,
    owner_id: String,
    name: String,
    #[serde(default)]
    parents: BTreeSet<KnowledgeBaseId>,
    #[serde(default)]
    children: BTreeSet<KnowledgeBaseId>,
    is_hybrid_search_enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl KnowledgeBase {
    pub fn new(
        id: KnowledgeBaseId,
        owner_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, KnowledgeBaseValidationError> {
        let name = name.into();

        if name.trim().is_empty() {
            return Err(KnowledgeBaseValidationError::EmptyName);
        }

        let now = Utc::now();

        Ok(Self {
            id,
            owner_id: owner_id.into(),
            name,
            parents: BTreeSet::new(),
            children: BTreeSet::new(),
            is_hybrid_search_enabled: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn with_hybrid_search(mut self, enabled: bool) -> Self {
        self.is_hybrid_search_enabled = enabled;
        self
    }

    pub fn id(&self) -> &KnowledgeBaseId {
        &self.id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parents(&self) -> &BTreeSet<KnowledgeBaseId> {
        &self.parents
    }

    pub fn children(&self) -> &BTreeSet<KnowledgeBaseId> {
        &self.children
    }

    pub fn is_hybrid_search_enabled(&self) -> bool {
        self.is_hybrid_search_enabled
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Replace both edge sets. Returns true when anything changed.
    pub(crate) fn set_edges(
        &mut self,
        parents: BTreeSet<KnowledgeBaseId>,
        children: BTreeSet<KnowledgeBaseId>,
    ) -> bool {
        if self.parents == parents && self.children == children {
            return false;
        }

        self.parents = parents;
        self.children = children;
        self.updated_at = Utc::now();
        true
    }
}

impl StorageEntity for KnowledgeBase {
    type Key = KnowledgeBaseId;

    fn key(&self) -> &Self::Key {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kb_id(s: &str) -> KnowledgeBaseId {
        KnowledgeBaseId::new(s).unwrap()
    }

    #[test]
    fn test_generated_id_is_valid() {
        let id = KnowledgeBaseId::generate();
        assert!(id.as_str().starts_with("kb-"));
        assert!(KnowledgeBaseId::new(id.as_str()).is_ok());
    }

    #[test]
    fn test_id_serde_validates() {
        let parsed: Result<KnowledgeBaseId, _> = serde_json::from_str("\"bad id\"");
        assert!(parsed.is_err());

        let parsed: KnowledgeBaseId = serde_json::from_str("\"kb1\"").unwrap();
        assert_eq!(parsed, kb_id("kb1"));
    }

    #[test]
    fn test_new_knowledge_base_defaults() {
        let kb = KnowledgeBase::new(kb_id("kb1"), "owner-1", "Manuals").unwrap();

        assert_eq!(kb.owner_id(), "owner-1");
        assert!(kb.parents().is_empty());
        assert!(kb.children().is_empty());
        assert!(kb.is_hybrid_search_enabled());
    }

    #[test]
    fn test_empty_name_rejected() {
        let result = KnowledgeBase::new(kb_id("kb1"), "owner-1", "   ");
        assert_eq!(result.unwrap_err(), KnowledgeBaseValidationError::EmptyName);
    }

    #[test]
    fn test_set_edges_reports_change() {
        let mut kb = KnowledgeBase::new(kb_id("kb1"), "owner-1", "Manuals").unwrap();
        let parents: BTreeSet<_> = [kb_id("kb0")].into_iter().collect();

        assert!(kb.set_edges(parents.clone(), BTreeSet::new()));
        assert!(!kb.set_edges(parents, BTreeSet::new()));
    }
}
