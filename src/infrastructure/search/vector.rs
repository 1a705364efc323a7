//! In-memory cosine vector index with int8 scalar quantization

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::document::DocumentId;
use crate::domain::embedding::cosine_similarity;
use crate::domain::knowledge_base::KnowledgeBaseId;
use crate::domain::search::{VectorHit, VectorIndex, VectorQuery, VectorRecord};
use crate::domain::DomainError;

/// Candidates kept by the quantized pass per requested result
const OVERSAMPLING: usize = 2;

fn quantize(vector: &[f32]) -> (Vec<i8>, f32) {
    let max_abs = vector.iter().fold(0.0f32, |m, v| m.max(v.abs()));

    if max_abs == 0.0 {
        return (vec![0; vector.len()], 0.0);
    }

    let scale = 127.0 / max_abs;
    let quantized: Vec<i8> = vector
        .iter()
        .map(|v| (v * scale).round().clamp(-127.0, 127.0) as i8)
        .collect();
    let norm = quantized
        .iter()
        .map(|&q| (q as i32 * q as i32) as f32)
        .sum::<f32>()
        .sqrt();

    (quantized, norm)
}

fn quantized_cosine(a: &[i8], a_norm: f32, b: &[i8], b_norm: f32) -> f32 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }

    let dot: i32 = a.iter().zip(b).map(|(&x, &y)| x as i32 * y as i32).sum();
    dot as f32 / (a_norm * b_norm)
}

#[derive(Debug)]
struct StoredVector {
    record: VectorRecord,
    quantized: Vec<i8>,
    quantized_norm: f32,
    seq: u64,
}

#[derive(Debug, Default)]
struct VectorCollection {
    dimension: Option<usize>,
    points: HashMap<String, StoredVector>,
    next_seq: u64,
}

impl VectorCollection {
    fn check_dimension(&self, actual: usize) -> Result<(), DomainError> {
        match self.dimension {
            Some(expected) if expected != actual => {
                Err(DomainError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }

    fn upsert(&mut self, record: VectorRecord) -> Result<(), DomainError> {
        if record.vector.is_empty() {
            return Err(DomainError::validation("Vector cannot be empty"));
        }

        self.check_dimension(record.vector.len())?;
        self.dimension = Some(record.vector.len());

        let seq = match self.points.get(&record.id) {
            Some(existing) => existing.seq,
            None => {
                self.next_seq += 1;
                self.next_seq
            }
        };

        let (quantized, quantized_norm) = quantize(&record.vector);
        self.points.insert(
            record.id.clone(),
            StoredVector {
                record,
                quantized,
                quantized_norm,
                seq,
            },
        );
        Ok(())
    }

    fn search(&self, query: &VectorQuery, allow_quantized: bool) -> Result<Vec<VectorHit>, DomainError> {
        if self.points.is_empty() || query.top_k == 0 || query.knowledge_base_ids.is_empty() {
            return Ok(Vec::new());
        }

        self.check_dimension(query.vector.len())?;

        let candidates = self
            .points
            .values()
            .filter(|p| query.knowledge_base_ids.contains(&p.record.payload.knowledge_base_id));

        let mut scored: Vec<(&StoredVector, f32)> = if allow_quantized && !query.exact {
            let (q, q_norm) = quantize(&query.vector);
            let mut approx: Vec<(&StoredVector, f32)> = candidates
                .map(|p| (p, quantized_cosine(&q, q_norm, &p.quantized, p.quantized_norm)))
                .collect();
            sort_hits(&mut approx);
            approx.truncate(query.top_k * OVERSAMPLING);

            approx
                .into_iter()
                .map(|(p, _)| (p, cosine_similarity(&query.vector, &p.record.vector)))
                .collect()
        } else {
            candidates
                .map(|p| (p, cosine_similarity(&query.vector, &p.record.vector)))
                .collect()
        };

        if let Some(threshold) = query.score_threshold {
            scored.retain(|(_, score)| *score >= threshold);
        }

        sort_hits(&mut scored);

        Ok(scored
            .into_iter()
            .take(query.top_k)
            .map(|(p, score)| VectorHit {
                id: p.record.id.clone(),
                score,
                payload: p.record.payload.clone(),
            })
            .collect())
    }

    fn retain(&mut self, keep: impl Fn(&VectorRecord) -> bool) -> usize {
        let before = self.points.len();
        self.points.retain(|_, p| keep(&p.record));
        before - self.points.len()
    }
}

fn sort_hits(hits: &mut [(&StoredVector, f32)]) {
    hits.sort_by(|(a, sa), (b, sb)| sb.total_cmp(sa).then(a.seq.cmp(&b.seq)));
}

/// Named collections, each behind its own lock so writers to different
/// collections never contend
#[derive(Debug)]
pub struct InMemoryVectorIndex {
    collections: RwLock<HashMap<String, Arc<RwLock<VectorCollection>>>>,
    quantized: bool,
}

impl Default for InMemoryVectorIndex {
    fn default() -> Self {
        Self::new(true)
    }
}

impl InMemoryVectorIndex {
    pub fn new(quantized: bool) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            quantized,
        }
    }

    async fn collection(&self, name: &str) -> Option<Arc<RwLock<VectorCollection>>> {
        self.collections.read().await.get(name).cloned()
    }

    async fn collection_or_create(&self, name: &str) -> Arc<RwLock<VectorCollection>> {
        if let Some(existing) = self.collection(name).await {
            return existing;
        }

        self.collections
            .write()
            .await
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Dimension fixed by the first vector, if any was written
    pub async fn dimension(&self, name: &str) -> Option<usize> {
        match self.collection(name).await {
            Some(c) => c.read().await.dimension,
            None => None,
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, collection: &str, record: VectorRecord) -> Result<(), DomainError> {
        let target = self.collection_or_create(collection).await;
        let mut guard = target.write().await;
        guard.upsert(record)
    }

    async fn upsert_batch(
        &self,
        collection: &str,
        records: Vec<VectorRecord>,
    ) -> Result<(), DomainError> {
        let target = self.collection_or_create(collection).await;
        let mut guard = target.write().await;

        // Validate first so a bad batch writes nothing
        let dimension = guard
            .dimension
            .or_else(|| records.first().map(|r| r.vector.len()));
        if let Some(expected) = dimension {
            if let Some(bad) = records.iter().find(|r| r.vector.len() != expected) {
                return Err(DomainError::DimensionMismatch {
                    expected,
                    actual: bad.vector.len(),
                });
            }
        }

        for record in records {
            guard.upsert(record)?;
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &VectorQuery,
    ) -> Result<Vec<VectorHit>, DomainError> {
        match self.collection(collection).await {
            Some(c) => c.read().await.search(query, self.quantized),
            None => Ok(Vec::new()),
        }
    }

    async fn delete_by_document(
        &self,
        collection: &str,
        document_id: &DocumentId,
    ) -> Result<usize, DomainError> {
        match self.collection(collection).await {
            Some(c) => Ok(c
                .write()
                .await
                .retain(|r| &r.payload.document_id != document_id)),
            None => Ok(0),
        }
    }

    async fn delete_by_knowledge_base(
        &self,
        collection: &str,
        knowledge_base_id: &KnowledgeBaseId,
    ) -> Result<usize, DomainError> {
        match self.collection(collection).await {
            Some(c) => Ok(c
                .write()
                .await
                .retain(|r| &r.payload.knowledge_base_id != knowledge_base_id)),
            None => Ok(0),
        }
    }

    async fn reassign_knowledge_base(
        &self,
        collection: &str,
        from: &KnowledgeBaseId,
        to: &KnowledgeBaseId,
    ) -> Result<usize, DomainError> {
        let Some(c) = self.collection(collection).await else {
            return Ok(0);
        };

        let mut guard = c.write().await;
        let mut moved = 0;

        for point in guard.points.values_mut() {
            if &point.record.payload.knowledge_base_id == from {
                point.record.payload.knowledge_base_id = to.clone();
                moved += 1;
            }
        }

        Ok(moved)
    }

    async fn reassign_documents(
        &self,
        collection: &str,
        documents: &BTreeSet<DocumentId>,
        to: &KnowledgeBaseId,
    ) -> Result<usize, DomainError> {
        let Some(c) = self.collection(collection).await else {
            return Ok(0);
        };

        let mut guard = c.write().await;
        let mut moved = 0;

        for point in guard.points.values_mut() {
            if documents.contains(&point.record.payload.document_id) {
                point.record.payload.knowledge_base_id = to.clone();
                moved += 1;
            }
        }

        Ok(moved)
    }

    async fn count_by_document(
        &self,
        collection: &str,
        document_id: &DocumentId,
    ) -> Result<usize, DomainError> {
        match self.collection(collection).await {
            Some(c) => Ok(c
                .read()
                .await
                .points
                .values()
                .filter(|p| &p.record.payload.document_id == document_id)
                .count()),
            None => Ok(0),
        }
    }
}
