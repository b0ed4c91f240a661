//! Step/journey hierarchy for upward scope search.
//!
//! [`ScopeTree`] is derived once from a [`NodeStore`] after compilation and
//! is immutable afterwards. Each entry records its enclosing journey and the
//! load-transitions declared directly on it, so that
//! [`ScopeTree::last_on_load_from`] is a plain parent-pointer walk with early
//! termination rather than a traversal of the node tree.

use std::collections::HashMap;

use crate::error::CoreError;
use crate::id::NodeId;
use crate::node::{NodeKind, TransitionTrigger};
use crate::store::{NodeSource, NodeStore};

/// Whether a scope is a journey or a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Journey,
    Step,
}

/// One journey or step in the scope tree.
#[derive(Debug, Clone)]
pub struct ScopeEntry {
    pub id: NodeId,
    pub kind: ScopeKind,
    /// Enclosing journey. `None` for top-level journeys.
    pub parent: Option<NodeId>,
    /// Load-transitions declared directly on this scope, in declared order.
    pub on_load: Vec<NodeId>,
}

/// Immutable step/journey hierarchy of a compiled form.
#[derive(Debug, Clone, Default)]
pub struct ScopeTree {
    scopes: HashMap<NodeId, ScopeEntry>,
    /// Steps in declaration order.
    steps: Vec<NodeId>,
}

impl ScopeTree {
    /// Derives the scope tree from a compiled form.
    ///
    /// Returns [`CoreError::NotAScope`] for a load-transition that is not
    /// contained in any step or journey.
    pub fn build(nodes: &NodeStore) -> Result<Self, CoreError> {
        let mut tree = ScopeTree::default();

        for node in nodes.iter() {
            let kind = match node.kind {
                NodeKind::Journey(_) => ScopeKind::Journey,
                NodeKind::Step(_) => ScopeKind::Step,
                _ => continue,
            };
            let parent = node.parent.and_then(|p| enclosing_scope(nodes, p));
            tree.scopes.insert(
                node.id,
                ScopeEntry {
                    id: node.id,
                    kind,
                    parent,
                    on_load: Vec::new(),
                },
            );
            if kind == ScopeKind::Step {
                tree.steps.push(node.id);
            }
        }

        for node in nodes.iter() {
            let is_load = node
                .kind
                .as_transition()
                .is_some_and(|t| t.trigger == TransitionTrigger::Load);
            if !is_load {
                continue;
            }
            let scope = node
                .parent
                .and_then(|p| enclosing_scope(nodes, p))
                .ok_or(CoreError::NotAScope { id: node.id })?;
            if let Some(entry) = tree.scopes.get_mut(&scope) {
                entry.on_load.push(node.id);
            }
        }

        Ok(tree)
    }

    /// Steps in declaration order.
    pub fn steps(&self) -> &[NodeId] {
        &self.steps
    }

    pub fn get(&self, id: NodeId) -> Option<&ScopeEntry> {
        self.scopes.get(&id)
    }

    pub fn is_step(&self, id: NodeId) -> bool {
        self.scopes
            .get(&id)
            .is_some_and(|entry| entry.kind == ScopeKind::Step)
    }

    /// Iterates `from` and its enclosing journeys, innermost first.
    pub fn ancestors(&self, from: NodeId) -> impl Iterator<Item = &ScopeEntry> + '_ {
        let mut current = self.scopes.get(&from);
        std::iter::from_fn(move || {
            let entry = current?;
            current = entry.parent.and_then(|p| self.scopes.get(&p));
            Some(entry)
        })
    }

    /// Walks upward from `step` through its enclosing journeys. The first
    /// scope that declares any load-transition yields its last-declared one.
    pub fn last_on_load_from(&self, step: NodeId) -> Option<NodeId> {
        self.ancestors(step)
            .find_map(|entry| entry.on_load.last().copied())
    }
}

/// Nearest journey or step at or above `id`.
fn enclosing_scope(nodes: &NodeStore, id: NodeId) -> Option<NodeId> {
    nodes
        .find_enclosing(id, &mut |node| node.kind.is_scope())
        .map(|node| node.id)
}
