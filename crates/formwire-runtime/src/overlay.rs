//! Request-scoped overlays over a shared wired form.
//!
//! A [`RequestScope`] owns an overlay [`NodeStore`] and an overlay
//! [`DependencyGraph`] whose ids start above the shared form's watermarks.
//! Everything created during the request (collection iterations, their
//! pseudo-nodes and edges) lives in the overlay; the shared form is only
//! ever read, so no locking is needed and nothing leaks between requests.
//!
//! [`LayeredNodes`] presents base and overlay as one [`NodeSource`], which is
//! what lets the wiring modules run unchanged on request-time nodes.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use formwire_core::schedule::evaluation_order;
use formwire_core::{
    CoreError, DependencyEdge, DependencyGraph, IterationNode, Namespace, Node, NodeId, NodeKind,
    NodeSource, NodeStore, PseudoKey, PseudoKind, PseudoSink, ScopeTree,
};
use formwire_wiring::{
    in_open_template, synthesize_batch, wire_nodes, WiredForm, WiringError, WiringReport,
};

use crate::answers::{producer_roles, AnswerHistory, AnswerSource};
use crate::error::RuntimeError;

/// Unique request identifier (UUID v4 newtype).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A base store with an overlay on top. `O` is `&NodeStore` for reading and
/// `&mut NodeStore` for synthesis.
pub struct LayeredNodes<'a, O> {
    base: &'a NodeStore,
    overlay: O,
}

impl<'a, O> LayeredNodes<'a, O>
where
    O: Deref<Target = NodeStore>,
{
    pub fn new(base: &'a NodeStore, overlay: O) -> Self {
        LayeredNodes { base, overlay }
    }
}

impl<O> NodeSource for LayeredNodes<'_, O>
where
    O: Deref<Target = NodeStore>,
{
    fn node(&self, id: NodeId) -> Option<&Node> {
        self.overlay.node(id).or_else(|| self.base.node(id))
    }

    fn pseudo(&self, key: &PseudoKey) -> Option<NodeId> {
        self.base.pseudo(key).or_else(|| self.overlay.pseudo(key))
    }

    fn pseudo_ids_of(&self, kind: PseudoKind, scope: NodeId) -> Vec<NodeId> {
        let mut ids = self.base.pseudo_ids_of(kind, scope);
        ids.extend(self.overlay.pseudo_ids_of(kind, scope));
        ids
    }
}

impl<O> PseudoSink for LayeredNodes<'_, O>
where
    O: DerefMut<Target = NodeStore>,
{
    /// Base pseudo-nodes win; new ones are created in the overlay.
    fn find_or_create_pseudo(
        &mut self,
        kind: PseudoKind,
        scope: NodeId,
        key: &str,
        origin: Option<NodeId>,
    ) -> Result<(NodeId, bool), CoreError> {
        if let Some(existing) = self.base.pseudo(&PseudoKey::new(kind, scope, key)) {
            return Ok((existing, false));
        }
        self.overlay
            .deref_mut()
            .find_or_create_pseudo(kind, scope, key, origin)
    }
}

/// One materialized collection iteration.
#[derive(Debug, Clone, Serialize)]
pub struct Iteration {
    /// The iteration node, parent of the cloned template.
    pub node: NodeId,
    pub collection: NodeId,
    pub index: usize,
    /// The step the collection belongs to.
    pub step: NodeId,
    /// Cloned template nodes, in pre-order.
    pub nodes: Vec<NodeId>,
    /// Pseudo-nodes synthesized for the iteration.
    pub pseudo_nodes: Vec<NodeId>,
    /// Template field code to iteration field code.
    pub renamed: IndexMap<String, String>,
    pub report: WiringReport,
}

/// Mutable per-request state layered over a shared wired form.
pub struct RequestScope {
    id: RequestId,
    form: Arc<WiredForm>,
    nodes: NodeStore,
    graph: DependencyGraph,
    iterations: HashMap<(NodeId, usize), Iteration>,
    answers: AnswerHistory,
}

impl RequestScope {
    pub fn new(form: Arc<WiredForm>) -> Self {
        let nodes = NodeStore::starting_at(form.node_watermark());
        let graph = DependencyGraph::starting_at(form.edge_watermark());
        let id = RequestId(Uuid::new_v4());
        tracing::debug!(request = %id, form = %form.form.code, "request scope opened");
        RequestScope {
            id,
            form,
            nodes,
            graph,
            iterations: HashMap::new(),
            answers: AnswerHistory::new(),
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn form(&self) -> &Arc<WiredForm> {
        &self.form
    }

    /// Nodes created in this request.
    pub fn overlay_nodes(&self) -> &NodeStore {
        &self.nodes
    }

    /// Edges added in this request.
    pub fn overlay_graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Base and overlay nodes as one source.
    pub fn nodes(&self) -> LayeredNodes<'_, &NodeStore> {
        LayeredNodes::new(&self.form.form.nodes, &self.nodes)
    }

    pub fn answers(&self) -> &AnswerHistory {
        &self.answers
    }

    pub fn answers_mut(&mut self) -> &mut AnswerHistory {
        &mut self.answers
    }

    /// Edges into `consumer` from the shared graph, then from the overlay.
    pub fn edges_to(&self, consumer: NodeId) -> impl Iterator<Item = &DependencyEdge> + '_ {
        self.form
            .graph
            .edges_to(consumer)
            .chain(self.graph.edges_to(consumer))
    }

    /// Edges out of `producer` from the shared graph, then from the overlay.
    pub fn edges_from(&self, producer: NodeId) -> impl Iterator<Item = &DependencyEdge> + '_ {
        self.form
            .graph
            .edges_from(producer)
            .chain(self.graph.edges_from(producer))
    }

    /// A standalone copy of the shared graph with the overlay merged in.
    pub fn merged_graph(&self) -> DependencyGraph {
        let mut merged = self.form.graph.clone();
        merged.extend_from(&self.graph);
        merged
    }

    /// Producers before consumers over shared and overlay edges.
    pub fn evaluation_order(&self) -> Result<Vec<NodeId>, RuntimeError> {
        Ok(evaluation_order([&self.form.graph, &self.graph])?)
    }

    /// The local answer pseudo-node of `code` in `step`, if any.
    pub fn answer_node(&self, step: NodeId, code: &str) -> Option<NodeId> {
        self.nodes()
            .pseudo(&PseudoKey::new(PseudoKind::AnswerLocal, step, code))
    }

    /// Producers of the local answer `code` in `step`, in replay order.
    pub fn answer_producers(&self, step: NodeId, code: &str) -> Vec<(AnswerSource, NodeId)> {
        match self.answer_node(step, code) {
            Some(answer) => producer_roles(self.edges_to(answer)),
            None => Vec::new(),
        }
    }

    /// Finds a collection by code: first in the shared form, then among the
    /// nested collections copied into this request's iterations.
    pub fn collection_by_code(&self, code: &str) -> Result<NodeId, RuntimeError> {
        self.form
            .form
            .nodes
            .iter()
            .chain(self.nodes.iter())
            .find(|node| node.kind.as_collection().is_some_and(|c| c.code == code))
            .map(|node| node.id)
            .ok_or_else(|| RuntimeError::UnknownCollection(code.to_string()))
    }

    pub fn iteration(&self, collection: NodeId, index: usize) -> Option<&Iteration> {
        self.iterations.get(&(collection, index))
    }

    /// Instantiates iteration `index` of `collection` in the overlay and
    /// wires it incrementally.
    ///
    /// The template subtree is cloned under a new iteration node. Field and
    /// nested collection codes of the template become
    /// `{collection}_{index}_{code}`, with `answers` and `post` references
    /// inside the clone rewritten to match. Pseudo-nodes are synthesized for
    /// the new nodes and only the new nodes are wired; a nested template stays
    /// open until its copy is materialized in turn.
    ///
    /// Materializing the same iteration twice returns the first result. On
    /// failure the overlay is rolled back to its state before the call.
    pub fn materialize_iteration(
        &mut self,
        collection: NodeId,
        index: usize,
    ) -> Result<&Iteration, RuntimeError> {
        if self.iterations.contains_key(&(collection, index)) {
            return Ok(&self.iterations[&(collection, index)]);
        }

        let node_mark = self.nodes.next_id();
        let edge_mark = self.graph.next_edge_id();
        match self.build_iteration(collection, index) {
            Ok(record) => {
                tracing::debug!(
                    request = %self.id,
                    collection = %collection,
                    index,
                    nodes = record.nodes.len(),
                    pseudo_nodes = record.pseudo_nodes.len(),
                    edges = record.report.edges(),
                    "iteration materialized"
                );
                Ok(self
                    .iterations
                    .entry((collection, index))
                    .or_insert(record))
            }
            Err(err) => {
                self.nodes.truncate(node_mark);
                self.graph.truncate(edge_mark);
                tracing::warn!(
                    request = %self.id,
                    collection = %collection,
                    index,
                    error = %err,
                    "iteration rolled back"
                );
                Err(err)
            }
        }
    }

    fn build_iteration(
        &mut self,
        collection: NodeId,
        index: usize,
    ) -> Result<Iteration, RuntimeError> {
        let form = Arc::clone(&self.form);
        let base = &form.form.nodes;
        let template = Template::read(base, &self.nodes, &form.scopes, collection)?;
        let step = template.step;
        let prefix = format!("{}_{}", template.code, index);

        let mut renamed = IndexMap::new();
        let mut shadowed = HashSet::new();
        for (node, direct) in &template.nodes {
            let Some(field) = node.kind.as_field() else {
                continue;
            };
            if *direct {
                renamed
                    .entry(field.code.clone())
                    .or_insert_with(|| format!("{}_{}", prefix, field.code));
            } else {
                shadowed.insert(field.code.clone());
            }
        }

        let view = LayeredNodes::new(base, &self.nodes);
        for code in renamed.values() {
            let key = PseudoKey::new(PseudoKind::AnswerLocal, step, code.as_str());
            if view.pseudo(&key).is_some() {
                return Err(RuntimeError::CodeCollision {
                    code: code.clone(),
                    step,
                });
            }
        }

        let iteration = self.nodes.insert(
            Some(collection),
            NodeKind::Iteration(IterationNode { collection, index }),
        )?;
        let first = self.nodes.next_id();
        let id_map: HashMap<NodeId, NodeId> = template
            .nodes
            .iter()
            .enumerate()
            .map(|(offset, (node, _))| (node.id, NodeId(first + offset as u32)))
            .collect();

        let renames = Renames {
            prefix: &prefix,
            fields: &renamed,
            shadowed: &shadowed,
        };
        let mut cloned = Vec::with_capacity(template.nodes.len());
        for (node, direct) in &template.nodes {
            let mut kind = node.kind.clone();
            kind.remap_ids(|id| id_map.get(&id).copied().unwrap_or(id));
            renames.apply(&mut kind, *direct);
            let parent = match node.parent {
                Some(parent) if parent == collection => Some(iteration),
                Some(parent) => Some(id_map.get(&parent).copied().unwrap_or(parent)),
                None => None,
            };
            let new_id = id_map[&node.id];
            self.nodes.insert_node(Node::new(new_id, parent, kind))?;
            cloned.push(new_id);
        }

        let mut batch = Vec::with_capacity(cloned.len() + 1);
        batch.push(iteration);
        batch.extend(&cloned);
        let pseudo_nodes = {
            let mut layered = LayeredNodes::new(base, &mut self.nodes);
            synthesize_batch(&mut layered, step, &batch)?
        };
        batch.extend(&pseudo_nodes);

        let layered = LayeredNodes::new(base, &self.nodes);
        let report = wire_nodes(&layered, &form.scopes, &mut self.graph, &batch, &form.config)?;

        Ok(Iteration {
            node: iteration,
            collection,
            index,
            step,
            nodes: cloned,
            pseudo_nodes,
            renamed,
            report,
        })
    }
}

/// A collection template read out of the layered view.
struct Template {
    code: String,
    step: NodeId,
    /// Template nodes in pre-order, each flagged `true` when it belongs to
    /// this template rather than to a template nested in it.
    nodes: Vec<(Node, bool)>,
}

impl Template {
    /// Reads `collection` and its template. The collection lives in the base
    /// form or, when an enclosing iteration copied it, in the overlay.
    fn read(
        base: &NodeStore,
        overlay: &NodeStore,
        scopes: &ScopeTree,
        collection: NodeId,
    ) -> Result<Self, RuntimeError> {
        let view = LayeredNodes::new(base, overlay);
        let definition = view.get(collection)?;
        let Some(template) = definition.kind.as_collection() else {
            return Err(RuntimeError::NotACollection { id: collection });
        };
        if in_open_template(&view, definition) {
            return Err(RuntimeError::OpenTemplate { id: collection });
        }
        let step = view
            .owning_step(collection)
            .filter(|&step| scopes.is_step(step))
            .ok_or(WiringError::UnknownStep { id: collection })?;

        let store = if overlay.contains(collection) { overlay } else { base };
        let mut nodes = Vec::new();
        let mut stack: Vec<NodeId> = store.children(collection).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let node = store.get(id)?;
            // Iterations of a nested copy are not part of its template.
            if matches!(node.kind, NodeKind::Iteration(_)) {
                continue;
            }
            let scope = node.parent.and_then(|parent| {
                view.find_enclosing(parent, &mut |n| {
                    matches!(n.kind, NodeKind::Collection(_) | NodeKind::Iteration(_))
                })
            });
            let direct = scope.map(|scope| scope.id) == Some(collection);
            nodes.push((node.clone(), direct));
            stack.extend(store.children(id).iter().rev().copied());
        }

        Ok(Template {
            code: template.code.clone(),
            step,
            nodes,
        })
    }
}

/// Code renames for one iteration.
struct Renames<'a> {
    /// `{collection}_{index}`.
    prefix: &'a str,
    /// Template field code to iteration field code.
    fields: &'a IndexMap<String, String>,
    /// Field codes defined by nested templates.
    shadowed: &'a HashSet<String>,
}

impl Renames<'_> {
    /// Renames codes in a cloned node. Fields and collections are renamed only
    /// when `direct`. An `answers`/`post` reference inside a nested template
    /// keeps a key that a nested field defines.
    fn apply(&self, kind: &mut NodeKind, direct: bool) {
        match kind {
            NodeKind::Field(field) if direct => {
                if let Some(code) = self.fields.get(&field.code) {
                    field.code = code.clone();
                }
            }
            NodeKind::Collection(collection) if direct => {
                collection.code = format!("{}_{}", self.prefix, collection.code);
            }
            NodeKind::Reference(reference) => {
                let keyed = reference.is_in(Namespace::Answers) || reference.is_in(Namespace::Post);
                if !keyed {
                    return;
                }
                let Some(segment) = reference.path.get_mut(1) else {
                    return;
                };
                if !direct && self.shadowed.contains(segment.as_str()) {
                    return;
                }
                if let Some(code) = self.fields.get(segment.as_str()) {
                    *segment = code.clone();
                }
            }
            _ => {}
        }
    }
}
