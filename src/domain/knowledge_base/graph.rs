//! Parent/child adjacency between knowledge bases
//!
//! A knowledge base searches its own content plus everything its ancestors
//! hold. The graph owns both directions of every edge so that a mutation can
//! never leave `parents` and `children` disagreeing.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::{KnowledgeBase, KnowledgeBaseId};
use crate::domain::error::GraphViolation;
use crate::domain::DomainError;

/// Outcome of removing a node: the nodes whose edge sets changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionPlan {
    pub removed: KnowledgeBaseId,
    pub touched: BTreeSet<KnowledgeBaseId>,
}

#[derive(Debug, Clone, Default)]
pub struct KnowledgeBaseGraph {
    parents: BTreeMap<KnowledgeBaseId, BTreeSet<KnowledgeBaseId>>,
    children: BTreeMap<KnowledgeBaseId, BTreeSet<KnowledgeBaseId>>,
}

impl KnowledgeBaseGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the adjacency from stored rows.
    ///
    /// Edges are read from both sides, so a row whose mirror was lost still
    /// yields a symmetric graph.
    pub fn from_nodes<'a>(nodes: impl IntoIterator<Item = &'a KnowledgeBase>) -> Self {
        let mut graph = Self::new();
        let nodes: Vec<&KnowledgeBase> = nodes.into_iter().collect();

        for node in &nodes {
            graph.add_node(node.id().clone());
        }

        for node in &nodes {
            for parent in node.parents() {
                if graph.contains(parent) {
                    graph.link(parent.clone(), node.id().clone());
                }
            }
            for child in node.children() {
                if graph.contains(child) {
                    graph.link(node.id().clone(), child.clone());
                }
            }
        }

        graph
    }

    pub fn add_node(&mut self, id: KnowledgeBaseId) {
        self.parents.entry(id.clone()).or_default();
        self.children.entry(id).or_default();
    }

    pub fn contains(&self, id: &KnowledgeBaseId) -> bool {
        self.parents.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn parents_of(&self, id: &KnowledgeBaseId) -> BTreeSet<KnowledgeBaseId> {
        self.parents.get(id).cloned().unwrap_or_default()
    }

    pub fn children_of(&self, id: &KnowledgeBaseId) -> BTreeSet<KnowledgeBaseId> {
        self.children.get(id).cloned().unwrap_or_default()
    }

    /// Edge sets to persist for `id`: (parents, children)
    pub fn edges_of(
        &self,
        id: &KnowledgeBaseId,
    ) -> (BTreeSet<KnowledgeBaseId>, BTreeSet<KnowledgeBaseId>) {
        (self.parents_of(id), self.children_of(id))
    }

    /// Validate that `target` may start inheriting from `source`.
    pub fn check_inherit(
        &self,
        source: &KnowledgeBaseId,
        target: &KnowledgeBaseId,
    ) -> Result<(), GraphViolation> {
        if source == target {
            return Err(GraphViolation::SelfReference);
        }

        let target_parents = self.parents.get(target);

        if target_parents.is_some_and(|p| p.contains(source)) {
            return Err(GraphViolation::AlreadyRelated);
        }

        if target_parents.is_some_and(|p| !p.is_empty()) {
            return Err(GraphViolation::AlreadyInheriting);
        }

        if self.expand_scope(source).contains(target) {
            return Err(GraphViolation::CycleDetected);
        }

        Ok(())
    }

    /// Make `target` inherit from `source`
    pub fn inherit(
        &mut self,
        source: &KnowledgeBaseId,
        target: &KnowledgeBaseId,
    ) -> Result<(), DomainError> {
        for id in [source, target] {
            if !self.contains(id) {
                return Err(DomainError::not_found(format!(
                    "Knowledge base '{}' not found",
                    id
                )));
            }
        }

        self.check_inherit(source, target).map_err(DomainError::graph)?;
        self.link(source.clone(), target.clone());

        Ok(())
    }

    /// `id` plus the transitive closure of its parents.
    ///
    /// Terminates on cyclic input because every node is visited once.
    pub fn expand_scope(&self, id: &KnowledgeBaseId) -> BTreeSet<KnowledgeBaseId> {
        let mut scope = BTreeSet::new();
        let mut queue = VecDeque::from([id.clone()]);

        while let Some(current) = queue.pop_front() {
            if !scope.insert(current.clone()) {
                continue;
            }

            if let Some(parents) = self.parents.get(&current) {
                queue.extend(parents.iter().filter(|p| !scope.contains(*p)).cloned());
            }
        }

        scope
    }

    /// Transitive parents of `id`, excluding `id`
    pub fn ancestors(&self, id: &KnowledgeBaseId) -> BTreeSet<KnowledgeBaseId> {
        let mut scope = self.expand_scope(id);
        scope.remove(id);
        scope
    }

    /// Transitive children of `id` in breadth-first order, excluding `id`
    pub fn descendants(&self, id: &KnowledgeBaseId) -> Vec<KnowledgeBaseId> {
        let mut seen = BTreeSet::from([id.clone()]);
        let mut order = Vec::new();
        let mut queue: VecDeque<KnowledgeBaseId> = self.children_of(id).into_iter().collect();

        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }

            if let Some(children) = self.children.get(&current) {
                queue.extend(children.iter().filter(|c| !seen.contains(*c)).cloned());
            }

            order.push(current);
        }

        order
    }

    /// Nodes whose edge sets a removal of `id` may rewrite, `id` included
    pub fn deletion_footprint(&self, id: &KnowledgeBaseId) -> BTreeSet<KnowledgeBaseId> {
        let mut footprint = self.expand_scope(id);
        footprint.extend(self.descendants(id));
        footprint
    }

    /// Remove `id`, cutting it from its parents' child sets and cutting it and
    /// its ancestors from every descendant's parent set.
    pub fn remove(&mut self, id: &KnowledgeBaseId) -> Result<DeletionPlan, DomainError> {
        if !self.contains(id) {
            return Err(DomainError::not_found(format!(
                "Knowledge base '{}' not found",
                id
            )));
        }

        let mut touched = BTreeSet::new();

        for parent in self.parents_of(id) {
            if let Some(children) = self.children.get_mut(&parent) {
                children.remove(id);
            }
            touched.insert(parent);
        }

        let mut severed = self.ancestors(id);
        severed.insert(id.clone());

        for descendant in self.descendants(id) {
            let Some(parents) = self.parents.get_mut(&descendant) else {
                continue;
            };

            let cut: Vec<KnowledgeBaseId> = parents.intersection(&severed).cloned().collect();

            for ancestor in &cut {
                parents.remove(ancestor);

                if let Some(children) = self.children.get_mut(ancestor) {
                    children.remove(&descendant);
                }

                if ancestor != id {
                    touched.insert(ancestor.clone());
                }
            }

            touched.insert(descendant);
        }

        self.parents.remove(id);
        self.children.remove(id);
        touched.remove(id);

        Ok(DeletionPlan {
            removed: id.clone(),
            touched,
        })
    }

    fn link(&mut self, parent: KnowledgeBaseId, child: KnowledgeBaseId) {
        self.children
            .entry(parent.clone())
            .or_default()
            .insert(child.clone());
        self.parents.entry(child).or_default().insert(parent);
    }

    /// Every edge recorded on one side is recorded on the other
    pub fn is_symmetric(&self) -> bool {
        let down = self
            .children
            .iter()
            .all(|(p, cs)| cs.iter().all(|c| self.parents_of(c).contains(p)));
        let up = self
            .parents
            .iter()
            .all(|(c, ps)| ps.iter().all(|p| self.children_of(p).contains(c)));
        down && up
    }
}
