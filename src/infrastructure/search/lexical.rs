//! In-memory BM25 lexical index

use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use unicode_segmentation::UnicodeSegmentation;

use crate::domain::document::{ChunkId, DocumentId};
use crate::domain::knowledge_base::KnowledgeBaseId;
use crate::domain::search::{LexicalEntry, LexicalHit, LexicalIndex};
use crate::domain::DomainError;

const K1: f32 = 1.2;
const B: f32 = 0.75;

/// Lower-cased Unicode word tokens
pub fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words().map(|w| w.to_lowercase()).collect()
}

/// Postings and lengths for one text field
#[derive(Debug, Default)]
struct FieldIndex {
    postings: HashMap<String, HashMap<ChunkId, u32>>,
    lengths: HashMap<ChunkId, usize>,
    total_length: usize,
}

impl FieldIndex {
    fn insert(&mut self, chunk_id: &ChunkId, terms: &[String]) {
        for term in terms {
            *self
                .postings
                .entry(term.clone())
                .or_default()
                .entry(chunk_id.clone())
                .or_insert(0) += 1;
        }

        self.lengths.insert(chunk_id.clone(), terms.len());
        self.total_length += terms.len();
    }

    fn remove(&mut self, chunk_id: &ChunkId, terms: &[String]) {
        for term in terms {
            if let Some(docs) = self.postings.get_mut(term) {
                docs.remove(chunk_id);
                if docs.is_empty() {
                    self.postings.remove(term);
                }
            }
        }

        if let Some(len) = self.lengths.remove(chunk_id) {
            self.total_length -= len;
        }
    }

    /// BM25 score of every chunk matching at least one query term
    fn score(&self, query_terms: &[String], doc_count: usize) -> HashMap<ChunkId, f32> {
        let mut scores = HashMap::new();

        if self.lengths.is_empty() {
            return scores;
        }

        let n = doc_count as f32;
        let avg_len = (self.total_length as f32 / self.lengths.len() as f32).max(1.0);

        for term in query_terms {
            let Some(docs) = self.postings.get(term) else {
                continue;
            };

            let df = docs.len() as f32;
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();

            for (chunk_id, &tf) in docs {
                let tf = tf as f32;
                let len = self.lengths.get(chunk_id).copied().unwrap_or(0) as f32;
                let norm = tf * (K1 + 1.0) / (tf + K1 * (1.0 - B + B * len / avg_len));
                *scores.entry(chunk_id.clone()).or_insert(0.0) += idf * norm;
            }
        }

        scores
    }
}

#[derive(Debug)]
struct StoredEntry {
    entry: LexicalEntry,
    seq: u64,
    original_terms: Vec<String>,
    contextualized_terms: Vec<String>,
}

#[derive(Debug, Default)]
struct Collection {
    entries: HashMap<ChunkId, StoredEntry>,
    original: FieldIndex,
    contextualized: FieldIndex,
    next_seq: u64,
}

impl Collection {
    fn upsert(&mut self, entry: LexicalEntry) {
        let seq = match self.remove(&entry.chunk_id) {
            Some(previous) => previous.seq,
            None => {
                self.next_seq += 1;
                self.next_seq
            }
        };

        let original_terms = tokenize(&entry.original_text);
        let contextualized_terms = tokenize(&entry.contextualized_text);
        self.original.insert(&entry.chunk_id, &original_terms);
        self.contextualized
            .insert(&entry.chunk_id, &contextualized_terms);

        self.entries.insert(
            entry.chunk_id.clone(),
            StoredEntry {
                entry,
                seq,
                original_terms,
                contextualized_terms,
            },
        );
    }

    fn remove(&mut self, chunk_id: &ChunkId) -> Option<StoredEntry> {
        let stored = self.entries.remove(chunk_id)?;
        self.original.remove(chunk_id, &stored.original_terms);
        self.contextualized
            .remove(chunk_id, &stored.contextualized_terms);
        Some(stored)
    }

    /// Best-field scoring: a chunk scores as its better-matching field
    fn search(&self, query: &str, top_k: usize) -> Vec<LexicalHit> {
        let mut seen = HashSet::new();
        let terms: Vec<String> = tokenize(query)
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect();

        if terms.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let n = self.entries.len();
        let mut scores = self.original.score(&terms, n);
        for (chunk_id, score) in self.contextualized.score(&terms, n) {
            let best = scores.entry(chunk_id).or_insert(0.0);
            *best = best.max(score);
        }

        let mut ranked: Vec<(&StoredEntry, f32)> = scores
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .filter_map(|(chunk_id, score)| self.entries.get(&chunk_id).map(|s| (s, score)))
            .collect();

        ranked.sort_by(|(a, sa), (b, sb)| sb.total_cmp(sa).then(a.seq.cmp(&b.seq)));

        ranked
            .into_iter()
            .take(top_k)
            .map(|(stored, score)| LexicalHit {
                chunk_id: stored.entry.chunk_id.clone(),
                document_id: stored.entry.document_id.clone(),
                score,
                contextualized_text: stored.entry.contextualized_text.clone(),
            })
            .collect()
    }
}

/// Per-knowledge-base BM25 collections behind one async lock; a write is
/// visible to every search that starts after it returns
#[derive(Debug, Default)]
pub struct InMemoryLexicalIndex {
    collections: RwLock<HashMap<KnowledgeBaseId, Collection>>,
}

impl InMemoryLexicalIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LexicalIndex for InMemoryLexicalIndex {
    async fn index(
        &self,
        collection: &KnowledgeBaseId,
        entry: LexicalEntry,
    ) -> Result<(), DomainError> {
        self.collections
            .write()
            .await
            .entry(collection.clone())
            .or_default()
            .upsert(entry);
        Ok(())
    }

    async fn index_batch(
        &self,
        collection: &KnowledgeBaseId,
        entries: Vec<LexicalEntry>,
    ) -> Result<(), DomainError> {
        let mut collections = self.collections.write().await;
        let target = collections.entry(collection.clone()).or_default();

        for entry in entries {
            target.upsert(entry);
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &KnowledgeBaseId,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<LexicalHit>, DomainError> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .map(|c| c.search(query, top_k))
            .unwrap_or_default())
    }

    async fn delete(
        &self,
        collection: &KnowledgeBaseId,
        document_id: &DocumentId,
    ) -> Result<usize, DomainError> {
        let mut collections = self.collections.write().await;
        let Some(target) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let doomed: Vec<ChunkId> = target
            .entries
            .values()
            .filter(|s| &s.entry.document_id == document_id)
            .map(|s| s.entry.chunk_id.clone())
            .collect();

        for chunk_id in &doomed {
            target.remove(chunk_id);
        }

        Ok(doomed.len())
    }

    async fn delete_collection(&self, collection: &KnowledgeBaseId) -> Result<bool, DomainError> {
        Ok(self.collections.write().await.remove(collection).is_some())
    }

    async fn migrate(
        &self,
        from: &KnowledgeBaseId,
        to: &KnowledgeBaseId,
    ) -> Result<usize, DomainError> {
        if from == to {
            return Ok(0);
        }

        let mut collections = self.collections.write().await;
        let Some(source) = collections.remove(from) else {
            return Ok(0);
        };

        let mut moved: Vec<StoredEntry> = source.entries.into_values().collect();
        moved.sort_by_key(|s| s.seq);
        let count = moved.len();

        let target = collections.entry(to.clone()).or_default();
        for stored in moved {
            target.upsert(stored.entry);
        }

        Ok(count)
    }

    async fn move_documents(
        &self,
        from: &KnowledgeBaseId,
        to: &KnowledgeBaseId,
        documents: &BTreeSet<DocumentId>,
    ) -> Result<usize, DomainError> {
        if from == to || documents.is_empty() {
            return Ok(0);
        }

        let mut collections = self.collections.write().await;
        let Some(source) = collections.get_mut(from) else {
            return Ok(0);
        };

        let chunk_ids: Vec<ChunkId> = source
            .entries
            .values()
            .filter(|s| documents.contains(&s.entry.document_id))
            .map(|s| s.entry.chunk_id.clone())
            .collect();
        let mut moved: Vec<StoredEntry> = chunk_ids
            .iter()
            .filter_map(|chunk_id| source.remove(chunk_id))
            .collect();
        moved.sort_by_key(|s| s.seq);
        let count = moved.len();

        let target = collections.entry(to.clone()).or_default();
        for stored in moved {
            target.upsert(stored.entry);
        }

        Ok(count)
    }

    async fn count(&self, collection: &KnowledgeBaseId) -> Result<usize, DomainError> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .map_or(0, |c| c.entries.len()))
    }
}
