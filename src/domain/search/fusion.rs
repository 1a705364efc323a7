//! Weighted reciprocal-rank fusion

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{LexicalHit, VectorHit};
use crate::domain::document::{ChunkId, DocumentId};
use crate::domain::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    pub semantic: f32,
    pub lexical: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            semantic: 0.8,
            lexical: 0.2,
        }
    }
}

impl FusionWeights {
    pub fn new(semantic: f32, lexical: f32) -> Result<Self, DomainError> {
        let weights = Self { semantic, lexical };
        weights.validate()?;
        Ok(weights)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if !self.semantic.is_finite() || !self.lexical.is_finite() {
            return Err(DomainError::validation("fusion weights must be finite"));
        }

        if self.semantic < 0.0 || self.lexical < 0.0 {
            return Err(DomainError::validation("fusion weights cannot be negative"));
        }

        Ok(())
    }
}

/// A chunk after fusion, carrying where it ranked in each source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub text: String,
    pub score: f32,
    pub semantic_rank: Option<usize>,
    pub lexical_rank: Option<usize>,
}

fn reciprocal(weight: f32, rank: Option<usize>) -> f32 {
    rank.map_or(0.0, |r| weight / (r as f32 + 1.0))
}

/// Fuses two ranked lists keyed by chunk id.
///
/// `score = w_s / (rank_s + 1) + w_l / (rank_l + 1)` with zero-based ranks and
/// a zero term for a missing source. Text comes from the semantic hit when
/// present, otherwise from the lexical hit's contextualized text. Candidates
/// are sorted by descending score; ties keep first-seen order, semantic first.
pub fn fuse(
    semantic: &[VectorHit],
    lexical: &[LexicalHit],
    weights: FusionWeights,
) -> Vec<RankedCandidate> {
    let mut candidates: Vec<RankedCandidate> = Vec::with_capacity(semantic.len() + lexical.len());
    let mut position: HashMap<ChunkId, usize> = HashMap::new();

    for (rank, hit) in semantic.iter().enumerate() {
        if position.contains_key(&hit.payload.chunk_id) {
            continue;
        }

        position.insert(hit.payload.chunk_id.clone(), candidates.len());
        candidates.push(RankedCandidate {
            chunk_id: hit.payload.chunk_id.clone(),
            document_id: hit.payload.document_id.clone(),
            text: hit.payload.text.clone(),
            score: 0.0,
            semantic_rank: Some(rank),
            lexical_rank: None,
        });
    }

    for (rank, hit) in lexical.iter().enumerate() {
        match position.get(&hit.chunk_id) {
            Some(&idx) => {
                let candidate = &mut candidates[idx];
                if candidate.lexical_rank.is_none() {
                    candidate.lexical_rank = Some(rank);
                }
            }
            None => {
                position.insert(hit.chunk_id.clone(), candidates.len());
                candidates.push(RankedCandidate {
                    chunk_id: hit.chunk_id.clone(),
                    document_id: hit.document_id.clone(),
                    text: hit.contextualized_text.clone(),
                    score: 0.0,
                    semantic_rank: None,
                    lexical_rank: Some(rank),
                });
            }
        }
    }

    for candidate in &mut candidates {
        candidate.score = reciprocal(weights.semantic, candidate.semantic_rank)
            + reciprocal(weights.lexical, candidate.lexical_rank);
    }

    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates
}
