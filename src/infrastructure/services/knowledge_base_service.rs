//! Knowledge base service: CRUD plus the inheritance graph operations
//!
//! Graph mutations lock every node whose row they may rewrite, in sorted id
//! order, so `inherit`, `delete` and `merge` on overlapping nodes serialize
//! while disjoint subtrees proceed in parallel. Edge rows for a mutation are
//! written with one `Storage::apply` call.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::document::{Chunk, Document, DocumentId};
use crate::domain::knowledge_base::{KnowledgeBase, KnowledgeBaseGraph, KnowledgeBaseId};
use crate::domain::search::{LexicalIndex, VectorIndex};
use crate::domain::storage::Storage;
use crate::domain::DomainError;
use crate::infrastructure::locks::KeyedLocks;

/// Request to create a new knowledge base
#[derive(Debug, Clone)]
pub struct CreateKnowledgeBaseRequest {
    /// Generated when absent
    pub id: Option<String>,
    pub owner_id: String,
    pub name: String,
    pub hybrid_search: bool,
}

impl CreateKnowledgeBaseRequest {
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            owner_id: owner_id.into(),
            name: name.into(),
            hybrid_search: true,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_hybrid_search(mut self, enabled: bool) -> Self {
        self.hybrid_search = enabled;
        self
    }
}

/// What a merge moved into its target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub merged: Vec<KnowledgeBaseId>,
    pub documents: usize,
    pub lexical_entries: usize,
    pub vectors: usize,
}

pub struct KnowledgeBaseService {
    storage: Arc<dyn Storage<KnowledgeBase>>,
    documents: Arc<dyn Storage<Document>>,
    chunks: Arc<dyn Storage<Chunk>>,
    lexical: Arc<dyn LexicalIndex>,
    vector: Arc<dyn VectorIndex>,
    vector_collection: String,
    locks: KeyedLocks<KnowledgeBaseId>,
}

impl std::fmt::Debug for KnowledgeBaseService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBaseService")
            .field("vector_collection", &self.vector_collection)
            .finish()
    }
}

impl KnowledgeBaseService {
    pub fn new(
        storage: Arc<dyn Storage<KnowledgeBase>>,
        documents: Arc<dyn Storage<Document>>,
        chunks: Arc<dyn Storage<Chunk>>,
        lexical: Arc<dyn LexicalIndex>,
        vector: Arc<dyn VectorIndex>,
        vector_collection: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            documents,
            chunks,
            lexical,
            vector,
            vector_collection: vector_collection.into(),
            locks: KeyedLocks::new(),
        }
    }

    pub async fn get(&self, id: &KnowledgeBaseId) -> Result<Option<KnowledgeBase>, DomainError> {
        self.storage.get(id).await
    }

    pub async fn get_required(&self, id: &KnowledgeBaseId) -> Result<KnowledgeBase, DomainError> {
        self.get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Knowledge base '{}' not found", id)))
    }

    pub async fn list(&self) -> Result<Vec<KnowledgeBase>, DomainError> {
        let mut kbs = self.storage.list().await?;
        kbs.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(kbs)
    }

    #[instrument(skip_all, fields(name = %request.name))]
    pub async fn create(
        &self,
        request: CreateKnowledgeBaseRequest,
    ) -> Result<KnowledgeBase, DomainError> {
        let id = match request.id {
            Some(id) => KnowledgeBaseId::new(id)?,
            None => KnowledgeBaseId::generate(),
        };

        if self.storage.exists(&id).await? {
            return Err(DomainError::conflict(format!(
                "Knowledge base with ID '{}' already exists",
                id
            )));
        }

        let kb = KnowledgeBase::new(id, request.owner_id, request.name)?
            .with_hybrid_search(request.hybrid_search);

        let kb = self.storage.create(kb).await?;
        info!(knowledge_base_id = %kb.id(), "Knowledge base created");
        Ok(kb)
    }

    /// `id` and every knowledge base it inherits from, transitively
    pub async fn expand_scope(
        &self,
        id: &KnowledgeBaseId,
    ) -> Result<BTreeSet<KnowledgeBaseId>, DomainError> {
        let graph = self.load_graph().await?;

        if !graph.contains(id) {
            return Err(DomainError::not_found(format!(
                "Knowledge base '{}' not found",
                id
            )));
        }

        Ok(graph.expand_scope(id))
    }

    /// Makes `target` inherit from `source`, creating the target first when
    /// none is given. Returns the target id.
    #[instrument(skip(self), fields(source = %source))]
    pub async fn inherit(
        &self,
        source: &KnowledgeBaseId,
        target: Option<&KnowledgeBaseId>,
    ) -> Result<KnowledgeBaseId, DomainError> {
        let target = match target {
            Some(target) => target.clone(),
            None => {
                let parent = self.get_required(source).await?;
                let request = CreateKnowledgeBaseRequest::new(
                    parent.owner_id(),
                    format!("{} (inherited)", parent.name()),
                )
                .with_hybrid_search(parent.is_hybrid_search_enabled());
                self.create(request).await?.id().clone()
            }
        };

        // The cycle check reads the source's ancestors, so they are locked too
        let (_guards, mut graph) = self
            .lock_footprint(|graph| {
                let mut footprint = graph.expand_scope(source);
                footprint.insert(target.clone());
                footprint
            })
            .await?;

        graph.inherit(source, &target)?;
        let nodes = BTreeSet::from([source.clone(), target.clone()]);
        self.persist_edges(&graph, &nodes, Vec::new()).await?;

        info!(target = %target, "Inheritance added");
        Ok(target)
    }

    /// Removes the node and severs it upward and downward; its documents,
    /// chunks and index entries go with it
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &KnowledgeBaseId) -> Result<(), DomainError> {
        let (guards, mut graph) = self
            .lock_footprint(|graph| graph.deletion_footprint(id))
            .await?;

        let plan = graph.remove(id)?;
        self.persist_edges(&graph, &plan.touched, vec![id.clone()])
            .await?;
        drop(guards);

        self.purge_content(id).await?;
        info!(touched = plan.touched.len(), "Knowledge base deleted");
        Ok(())
    }

    /// Moves the documents and index entries of every source into `target`,
    /// then removes the source nodes. Sources migrate concurrently; each one
    /// completes both index migrations before the merge reports success.
    /// If any source fails, every source is moved back and the graph is left
    /// untouched.
    #[instrument(skip(self, sources), fields(target = %target, sources = sources.len()))]
    pub async fn merge(
        &self,
        target: &KnowledgeBaseId,
        sources: &[KnowledgeBaseId],
    ) -> Result<MergeReport, DomainError> {
        let mut ordered: Vec<KnowledgeBaseId> = Vec::new();
        for source in sources {
            if source == target {
                return Err(DomainError::validation(
                    "A knowledge base cannot be merged into itself",
                ));
            }
            if !ordered.contains(source) {
                ordered.push(source.clone());
            }
        }

        if ordered.is_empty() {
            return Ok(MergeReport::default());
        }

        let (_guards, mut graph) = self
            .lock_footprint(|graph| {
                let mut footprint = BTreeSet::from([target.clone()]);
                for source in &ordered {
                    footprint.extend(graph.deletion_footprint(source));
                }
                footprint
            })
            .await?;

        for id in std::iter::once(target).chain(ordered.iter()) {
            if !graph.contains(id) {
                return Err(DomainError::not_found(format!(
                    "Knowledge base '{}' not found",
                    id
                )));
            }
        }

        let mut owned = BTreeMap::new();
        for source in &ordered {
            owned.insert(source.clone(), self.documents_of(source).await?);
        }

        let migrations = join_all(ordered.iter().map(|source| self.migrate(source, target))).await;

        let mut report = MergeReport::default();
        let mut failure = None;
        for (source, migration) in ordered.iter().zip(migrations) {
            match migration {
                Ok((documents, lexical_entries, vectors)) => {
                    debug!(source = %source, documents, lexical_entries, vectors, "Source migrated");
                    report.documents += documents;
                    report.lexical_entries += lexical_entries;
                    report.vectors += vectors;
                }
                Err(e) => {
                    warn!(source = %source, error = %e, "Source migration failed");
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
            }
        }

        if let Some(e) = failure {
            // Every source goes back, including those that migrated cleanly
            for (source, documents) in &owned {
                self.restore(source, target, documents).await;
            }
            return Err(e);
        }

        let mut touched = BTreeSet::new();
        for source in &ordered {
            touched.extend(graph.remove(source)?.touched);
        }
        for source in &ordered {
            touched.remove(source);
        }
        self.persist_edges(&graph, &touched, ordered.clone()).await?;

        report.merged = ordered;
        info!(
            documents = report.documents,
            lexical_entries = report.lexical_entries,
            vectors = report.vectors,
            "Knowledge bases merged"
        );
        Ok(report)
    }

    /// Reassigns one source's content to `target`: (documents, lexical, vectors)
    async fn migrate(
        &self,
        source: &KnowledgeBaseId,
        target: &KnowledgeBaseId,
    ) -> Result<(usize, usize, usize), DomainError> {
        let (lexical_entries, vectors) = futures::try_join!(
            self.lexical.migrate(source, target),
            self.vector
                .reassign_knowledge_base(&self.vector_collection, source, target),
        )?;

        let documents: Vec<Document> = self
            .documents
            .find(&|d: &Document| d.knowledge_base_id() == source)
            .await?
            .into_iter()
            .map(|mut d| {
                d.reassign(target.clone());
                d
            })
            .collect();
        let document_count = documents.len();
        self.documents.apply(documents, Vec::new()).await?;

        let chunks: Vec<Chunk> = self
            .chunks
            .find(&|c: &Chunk| c.knowledge_base_id() == source)
            .await?
            .into_iter()
            .map(|mut c| {
                c.reassign(target.clone());
                c
            })
            .collect();
        self.chunks.apply(chunks, Vec::new()).await?;

        Ok((document_count, lexical_entries, vectors))
    }

    async fn documents_of(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
    ) -> Result<BTreeSet<DocumentId>, DomainError> {
        Ok(self
            .documents
            .find(&|d: &Document| d.knowledge_base_id() == knowledge_base_id)
            .await?
            .into_iter()
            .map(|d| d.id().clone())
            .collect())
    }

    /// Moves `documents` and their chunks back from `target` into `source`.
    /// Each step runs even when an earlier one fails; failures are logged.
    async fn restore(
        &self,
        source: &KnowledgeBaseId,
        target: &KnowledgeBaseId,
        documents: &BTreeSet<DocumentId>,
    ) {
        if documents.is_empty() {
            return;
        }

        if let Err(e) = self.lexical.move_documents(target, source, documents).await {
            error!(source = %source, error = %e, "Lexical restore failed");
        }
        if let Err(e) = self
            .vector
            .reassign_documents(&self.vector_collection, documents, source)
            .await
        {
            error!(source = %source, error = %e, "Vector restore failed");
        }

        let rows = async {
            let moved_back: Vec<Document> = self
                .documents
                .find(&|d: &Document| documents.contains(d.id()))
                .await?
                .into_iter()
                .map(|mut d| {
                    d.reassign(source.clone());
                    d
                })
                .collect();
            self.documents.apply(moved_back, Vec::new()).await?;

            let chunks: Vec<Chunk> = self
                .chunks
                .find(&|c: &Chunk| documents.contains(c.document_id()))
                .await?
                .into_iter()
                .map(|mut c| {
                    c.reassign(source.clone());
                    c
                })
                .collect();
            self.chunks.apply(chunks, Vec::new()).await
        };
        if let Err(e) = rows.await {
            error!(source = %source, error = %e, "Row restore failed");
        }

        info!(source = %source, documents = documents.len(), "Source restored after failed merge");
    }

    /// Drops everything stored for a removed knowledge base
    async fn purge_content(&self, id: &KnowledgeBaseId) -> Result<(), DomainError> {
        self.lexical.delete_collection(id).await?;
        let vectors = self
            .vector
            .delete_by_knowledge_base(&self.vector_collection, id)
            .await?;

        let chunk_keys = self
            .chunks
            .find(&|c: &Chunk| c.knowledge_base_id() == id)
            .await?
            .into_iter()
            .map(|c| c.id().clone())
            .collect();
        self.chunks.apply(Vec::new(), chunk_keys).await?;

        let documents = self
            .documents
            .find(&|d: &Document| d.knowledge_base_id() == id)
            .await?;
        if !documents.is_empty() {
            warn!(
                knowledge_base_id = %id,
                documents = documents.len(),
                "Removing documents of deleted knowledge base"
            );
        }
        let document_keys = documents.into_iter().map(|d| d.id().clone()).collect();
        self.documents.apply(Vec::new(), document_keys).await?;

        debug!(knowledge_base_id = %id, vectors, "Knowledge base content purged");
        Ok(())
    }

    /// Locks the footprint computed from the current graph. If the graph
    /// grew while waiting, the locks are released and the footprint recomputed.
    async fn lock_footprint<F>(
        &self,
        footprint: F,
    ) -> Result<(Vec<OwnedMutexGuard<()>>, KnowledgeBaseGraph), DomainError>
    where
        F: Fn(&KnowledgeBaseGraph) -> BTreeSet<KnowledgeBaseId>,
    {
        let mut wanted = footprint(&self.load_graph().await?);

        loop {
            let guards = self.locks.acquire_all(&wanted).await;
            let graph = self.load_graph().await?;
            let needed = footprint(&graph);

            if needed.is_subset(&wanted) {
                return Ok((guards, graph));
            }

            drop(guards);
            wanted.extend(needed);
        }
    }

    async fn load_graph(&self) -> Result<KnowledgeBaseGraph, DomainError> {
        let nodes = self.storage.list().await?;
        Ok(KnowledgeBaseGraph::from_nodes(&nodes))
    }

    /// Writes the graph's edge sets for `nodes` and removes `deleted` rows in
    /// one batch
    async fn persist_edges(
        &self,
        graph: &KnowledgeBaseGraph,
        nodes: &BTreeSet<KnowledgeBaseId>,
        deleted: Vec<KnowledgeBaseId>,
    ) -> Result<(), DomainError> {
        let mut upserts = Vec::new();

        for id in nodes {
            if deleted.contains(id) {
                continue;
            }
            let Some(mut kb) = self.storage.get(id).await? else {
                continue;
            };
            let (parents, children) = graph.edges_of(id);
            if kb.set_edges(parents, children) {
                upserts.push(kb);
            }
        }

        self.storage.apply(upserts, deleted).await
    }
}
