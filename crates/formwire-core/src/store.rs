//! The node store: an arena of form nodes indexed by [`NodeId`].
//!
//! [`NodeStore`] owns every structural node and pseudo-node of a compiled
//! form. Besides id lookup it maintains three derived indices that the wiring
//! passes rely on:
//! - parent -> children, in insertion order;
//! - the list of reference nodes (so "find references" never walks the
//!   whole arena);
//! - the canonical pseudo-node index keyed by [`PseudoKey`]. All pseudo-node
//!   creation goes through [`NodeStore::find_or_create_pseudo`].
//!
//! The derived indices are never serialized; they are rebuilt when a store
//! is deserialized.
//!
//! [`NodeSource`] abstracts read access so that a request overlay layered on
//! top of a shared store can be wired with the same code as the store itself.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::NodeId;
use crate::node::{Node, NodeKind};
use crate::pseudo::{PseudoKey, PseudoKind, PseudoNode};

/// Read access to form nodes.
///
/// Implemented by [`NodeStore`] and by layered views (shared form + request
/// overlay) in the runtime crate.
pub trait NodeSource {
    /// Looks up a node by id.
    fn node(&self, id: NodeId) -> Option<&Node>;

    /// Looks up a pseudo-node by its canonical identity.
    fn pseudo(&self, key: &PseudoKey) -> Option<NodeId>;

    /// Pseudo-nodes of `kind` scoped to `scope`, in creation order.
    fn pseudo_ids_of(&self, kind: PseudoKind, scope: NodeId) -> Vec<NodeId>;

    /// Looks up a node, failing with [`CoreError::NodeNotFound`] if absent.
    fn get(&self, id: NodeId) -> Result<&Node, CoreError> {
        self.node(id).ok_or(CoreError::NodeNotFound { id })
    }

    /// Returns the containing node of `id`, if any.
    fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|node| node.parent)
    }

    /// Walks parent links starting at (and including) `id` and returns the
    /// first node accepted by `pred`.
    fn find_enclosing(
        &self,
        id: NodeId,
        pred: &mut dyn FnMut(&Node) -> bool,
    ) -> Option<&Node> {
        let mut current = Some(id);
        while let Some(cur) = current {
            let node = self.node(cur)?;
            if pred(node) {
                return Some(node);
            }
            current = node.parent;
        }
        None
    }

    /// The step a node belongs to. Pseudo-nodes belong to their scope.
    fn owning_step(&self, id: NodeId) -> Option<NodeId> {
        if let Some(pseudo) = self.node(id).and_then(|n| n.kind.as_pseudo()) {
            return Some(pseudo.scope);
        }
        self.find_enclosing(id, &mut |node| matches!(node.kind, NodeKind::Step(_)))
            .map(|node| node.id)
    }
}

/// Write access for pseudo-node synthesis.
///
/// Synthesis only ever adds pseudo-nodes, and only through the canonical
/// locate-or-create accessor.
pub trait PseudoSink: NodeSource {
    /// Locates the pseudo-node with identity `(kind, scope, key)` or creates
    /// it. Returns the id and whether it was created.
    fn find_or_create_pseudo(
        &mut self,
        kind: PseudoKind,
        scope: NodeId,
        key: &str,
        origin: Option<NodeId>,
    ) -> Result<(NodeId, bool), CoreError>;
}

/// Arena of form nodes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "StoredNodes", into = "StoredNodes")]
pub struct NodeStore {
    nodes: IndexMap<NodeId, Node>,
    children: HashMap<NodeId, Vec<NodeId>>,
    references: Vec<NodeId>,
    pseudo_index: HashMap<PseudoKey, NodeId>,
    pseudo_nodes: Vec<NodeId>,
    next_id: u32,
}

/// Serialized form of a [`NodeStore`]: nodes in id order plus the id counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredNodes {
    nodes: Vec<Node>,
    next_id: u32,
}

impl NodeStore {
    /// Creates an empty store whose ids start at zero.
    pub fn new() -> Self {
        NodeStore::default()
    }

    /// Creates an empty store whose ids start at `first_id`.
    ///
    /// Request overlays start above the shared form's watermark so that
    /// overlay ids never collide with form ids.
    pub fn starting_at(first_id: u32) -> Self {
        NodeStore {
            next_id: first_id,
            ..NodeStore::default()
        }
    }

    /// The id the next inserted node will receive.
    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    /// Number of nodes in the store.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Looks up a node, failing with [`CoreError::NodeNotFound`] if absent.
    pub fn get(&self, id: NodeId) -> Result<&Node, CoreError> {
        self.nodes.get(&id).ok_or(CoreError::NodeNotFound { id })
    }

    /// Mutable lookup, for the form builder. Wiring passes never mutate
    /// existing nodes.
    pub fn get_mut(&mut self, id: NodeId) -> Result<&mut Node, CoreError> {
        self.nodes.get_mut(&id).ok_or(CoreError::NodeNotFound { id })
    }

    /// Iterates nodes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Children of `id`, in insertion order.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All reference expression nodes, in insertion order.
    pub fn reference_ids(&self) -> &[NodeId] {
        &self.references
    }

    /// All pseudo-nodes, in creation order.
    pub fn pseudo_ids(&self) -> &[NodeId] {
        &self.pseudo_nodes
    }

    /// Pseudo-nodes of `kind` scoped to `scope`, in creation order.
    pub fn pseudo_nodes_of(
        &self,
        kind: PseudoKind,
        scope: NodeId,
    ) -> impl Iterator<Item = (NodeId, &PseudoNode)> + '_ {
        self.pseudo_nodes.iter().filter_map(move |&id| {
            let pseudo = self.nodes.get(&id)?.kind.as_pseudo()?;
            (pseudo.kind == kind && pseudo.scope == scope).then_some((id, pseudo))
        })
    }

    /// Inserts a new node under `parent` and returns its id.
    ///
    /// Pseudo-nodes are rejected with [`CoreError::DuplicatePseudoNode`] if
    /// their identity is already taken; use
    /// [`find_or_create_pseudo`](Self::find_or_create_pseudo) instead.
    pub fn insert(&mut self, parent: Option<NodeId>, kind: NodeKind) -> Result<NodeId, CoreError> {
        let id = NodeId(self.next_id);
        self.insert_node(Node::new(id, parent, kind))?;
        Ok(id)
    }

    /// Inserts a node with a caller-chosen id. Bumps the id counter past it.
    pub fn insert_node(&mut self, node: Node) -> Result<(), CoreError> {
        let id = node.id;
        if self.nodes.contains_key(&id) {
            return Err(CoreError::DuplicateNode { id });
        }
        if let Some(pseudo) = node.kind.as_pseudo() {
            let key = pseudo.identity();
            if let Some(&existing) = self.pseudo_index.get(&key) {
                return Err(CoreError::DuplicatePseudoNode { key, existing });
            }
            self.pseudo_index.insert(key, id);
            self.pseudo_nodes.push(id);
        }
        if matches!(node.kind, NodeKind::Reference(_)) {
            self.references.push(id);
        }
        if let Some(parent) = node.parent {
            self.children.entry(parent).or_default().push(id);
        }
        self.next_id = self.next_id.max(id.0 + 1);
        self.nodes.insert(id, node);
        Ok(())
    }

    /// Locates the pseudo-node with identity `(kind, scope, key)` or creates
    /// it under `scope`. Returns the id and whether it was created.
    ///
    /// An existing pseudo-node keeps its original `origin`.
    pub fn find_or_create_pseudo(
        &mut self,
        kind: PseudoKind,
        scope: NodeId,
        key: &str,
        origin: Option<NodeId>,
    ) -> Result<(NodeId, bool), CoreError> {
        let identity = PseudoKey::new(kind, scope, key);
        if let Some(&existing) = self.pseudo_index.get(&identity) {
            return Ok((existing, false));
        }
        let pseudo = PseudoNode {
            kind,
            scope,
            key: key.to_string(),
            origin,
        };
        let id = self.insert(Some(scope), NodeKind::Pseudo(pseudo))?;
        Ok((id, true))
    }

    /// Removes every node whose id is at or above `watermark` and resets the
    /// id counter to it. Indices are pruned to match.
    ///
    /// Undoes a batch of insertions made after reading
    /// [`next_id`](Self::next_id).
    pub fn truncate(&mut self, watermark: u32) {
        if watermark >= self.next_id {
            return;
        }
        let kept = |id: &NodeId| id.0 < watermark;
        self.nodes.retain(|id, _| kept(id));
        self.children.retain(|parent, _| kept(parent));
        for children in self.children.values_mut() {
            children.retain(kept);
        }
        self.children.retain(|_, children| !children.is_empty());
        self.references.retain(kept);
        self.pseudo_nodes.retain(kept);
        self.pseudo_index.retain(|_, id| kept(id));
        self.next_id = watermark;
    }

    /// Collects `root` and all its descendants in pre-order.
    pub fn subtree(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }
}

impl NodeSource for NodeStore {
    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    fn pseudo(&self, key: &PseudoKey) -> Option<NodeId> {
        self.pseudo_index.get(key).copied()
    }

    fn pseudo_ids_of(&self, kind: PseudoKind, scope: NodeId) -> Vec<NodeId> {
        self.pseudo_nodes_of(kind, scope).map(|(id, _)| id).collect()
    }
}

impl PseudoSink for NodeStore {
    fn find_or_create_pseudo(
        &mut self,
        kind: PseudoKind,
        scope: NodeId,
        key: &str,
        origin: Option<NodeId>,
    ) -> Result<(NodeId, bool), CoreError> {
        NodeStore::find_or_create_pseudo(self, kind, scope, key, origin)
    }
}

impl TryFrom<StoredNodes> for NodeStore {
    type Error = CoreError;

    fn try_from(stored: StoredNodes) -> Result<Self, Self::Error> {
        let mut store = NodeStore::new();
        for node in stored.nodes {
            store.insert_node(node)?;
        }
        store.next_id = store.next_id.max(stored.next_id);
        Ok(store)
    }
}

impl From<NodeStore> for StoredNodes {
    fn from(store: NodeStore) -> Self {
        let mut nodes: Vec<Node> = store.nodes.into_values().collect();
        nodes.sort_by_key(|node| node.id);
        StoredNodes {
            nodes,
            next_id: store.next_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{FieldNode, JourneyNode, StepNode};
    use crate::reference::ReferenceNode;

    fn journey_with_step(store: &mut NodeStore) -> (NodeId, NodeId) {
        let journey = store
            .insert(None, NodeKind::Journey(JourneyNode { code: "j".into() }))
            .unwrap();
        let step = store
            .insert(Some(journey), NodeKind::Step(StepNode { path: "/s".into() }))
            .unwrap();
        (journey, step)
    }

    #[test]
    fn insert_assigns_sequential_ids_and_children() {
        let mut store = NodeStore::new();
        let (journey, step) = journey_with_step(&mut store);
        assert_eq!(journey, NodeId(0));
        assert_eq!(step, NodeId(1));
        assert_eq!(store.children(journey), &[step]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn get_missing_node_errors() {
        let store = NodeStore::new();
        match store.get(NodeId(5)) {
            Err(CoreError::NodeNotFound { id }) => assert_eq!(id, NodeId(5)),
            other => panic!("expected NodeNotFound, got {other:?}"),
        }
    }

    #[test]
    fn references_are_indexed_on_insert() {
        let mut store = NodeStore::new();
        let (_, step) = journey_with_step(&mut store);
        let reference = store
            .insert(
                Some(step),
                NodeKind::Reference(ReferenceNode::new(["answers", "email"])),
            )
            .unwrap();
        assert_eq!(store.reference_ids(), &[reference]);
    }

    #[test]
    fn truncate_drops_nodes_above_watermark() {
        let mut store = NodeStore::new();
        let (journey, step) = journey_with_step(&mut store);
        let mark = store.next_id();

        store
            .insert(
                Some(step),
                NodeKind::Reference(ReferenceNode::new(["answers", "email"])),
            )
            .unwrap();
        store
            .insert(Some(journey), NodeKind::Step(StepNode { path: "/t".into() }))
            .unwrap();
        store
            .find_or_create_pseudo(PseudoKind::Post, step, "email", None)
            .unwrap();

        store.truncate(mark);
        assert_eq!(store.len(), 2);
        assert_eq!(store.next_id(), mark);
        assert_eq!(store.children(journey), &[step]);
        assert!(store.children(step).is_empty());
        assert!(store.reference_ids().is_empty());
        assert!(store.pseudo_ids().is_empty());
        assert!(store
            .pseudo(&PseudoKey::new(PseudoKind::Post, step, "email"))
            .is_none());

        // Ids are handed out again from the watermark.
        let (again, created) = store
            .find_or_create_pseudo(PseudoKind::Post, step, "email", None)
            .unwrap();
        assert!(created);
        assert_eq!(again, NodeId(mark));
    }

    #[test]
    fn find_or_create_pseudo_is_idempotent() {
        let mut store = NodeStore::new();
        let (_, step) = journey_with_step(&mut store);
        let (first, created) = store
            .find_or_create_pseudo(PseudoKind::Post, step, "email", None)
            .unwrap();
        assert!(created);
        let (second, created) = store
            .find_or_create_pseudo(PseudoKind::Post, step, "email", Some(NodeId(99)))
            .unwrap();
        assert!(!created);
        assert_eq!(first, second);
        assert_eq!(store.pseudo_ids().len(), 1);

        let pseudo = store.get(first).unwrap().kind.as_pseudo().unwrap();
        assert_eq!(pseudo.origin, None);
    }

    #[test]
    fn pseudo_identity_includes_kind_and_scope() {
        let mut store = NodeStore::new();
        let (journey, step) = journey_with_step(&mut store);
        let other = store
            .insert(Some(journey), NodeKind::Step(StepNode { path: "/t".into() }))
            .unwrap();
        let (a, _) = store
            .find_or_create_pseudo(PseudoKind::Post, step, "email", None)
            .unwrap();
        let (b, _) = store
            .find_or_create_pseudo(PseudoKind::AnswerLocal, step, "email", None)
            .unwrap();
        let (c, _) = store
            .find_or_create_pseudo(PseudoKind::Post, other, "email", None)
            .unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(store.pseudo_nodes_of(PseudoKind::Post, step).count(), 1);
    }

    #[test]
    fn direct_insert_of_duplicate_pseudo_is_rejected() {
        let mut store = NodeStore::new();
        let (_, step) = journey_with_step(&mut store);
        store
            .find_or_create_pseudo(PseudoKind::Query, step, "page", None)
            .unwrap();
        let duplicate = NodeKind::Pseudo(PseudoNode {
            kind: PseudoKind::Query,
            scope: step,
            key: "page".into(),
            origin: None,
        });
        assert!(matches!(
            store.insert(Some(step), duplicate),
            Err(CoreError::DuplicatePseudoNode { .. })
        ));
    }

    #[test]
    fn owning_step_walks_parents() {
        let mut store = NodeStore::new();
        let (journey, step) = journey_with_step(&mut store);
        let field = store
            .insert(
                Some(step),
                NodeKind::Field(FieldNode {
                    code: "email".into(),
                    variant: "text".into(),
                    formatters: Default::default(),
                    default_value: None,
                }),
            )
            .unwrap();
        assert_eq!(store.owning_step(field), Some(step));
        assert_eq!(store.owning_step(journey), None);
    }

    #[test]
    fn starting_at_offsets_ids() {
        let mut overlay = NodeStore::starting_at(100);
        let id = overlay
            .insert(None, NodeKind::Journey(JourneyNode { code: "j".into() }))
            .unwrap();
        assert_eq!(id, NodeId(100));
        assert_eq!(overlay.next_id(), 101);
    }

    #[test]
    fn subtree_is_preorder() {
        let mut store = NodeStore::new();
        let (journey, step) = journey_with_step(&mut store);
        let second = store
            .insert(Some(journey), NodeKind::Step(StepNode { path: "/t".into() }))
            .unwrap();
        assert_eq!(store.subtree(journey), vec![journey, step, second]);
    }

    #[test]
    fn serde_roundtrip_rebuilds_indices() {
        let mut store = NodeStore::new();
        let (_, step) = journey_with_step(&mut store);
        store
            .insert(
                Some(step),
                NodeKind::Reference(ReferenceNode::new(["answers", "email"])),
            )
            .unwrap();
        store
            .find_or_create_pseudo(PseudoKind::AnswerRemote, step, "email", None)
            .unwrap();

        let json = serde_json::to_string(&store).unwrap();
        let back: NodeStore = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), store.len());
        assert_eq!(back.reference_ids(), store.reference_ids());
        assert_eq!(back.children(step), store.children(step));
        assert!(back
            .pseudo(&PseudoKey::new(PseudoKind::AnswerRemote, step, "email"))
            .is_some());
        assert_eq!(back.next_id(), store.next_id());
    }
}
