//! The wiring context handed to every pseudo-node wiring module.
//!
//! [`WiringContext`] is a facade over the node source, the dependency graph
//! being built, the scope tree and the precomputed membership of the step
//! being wired. Modules read nodes only through it and write only edges
//! through [`WiringContext::add_edge`].
//!
//! [`StepMembership`] is computed once per form: it assigns every field,
//! reference and collection to its owning step and separates the nodes that
//! sit inside a collection template from the rest.

use std::collections::HashMap;

use tracing::warn;

use formwire_core::{
    CoreError, DependencyGraph, EdgeMetadata, EdgeRole, Namespace, Node, NodeId, NodeKind,
    NodeSource, NodeStore, PseudoKey, PseudoKind, PseudoNode, ReferenceNode, ScopeTree,
};

use crate::config::{MalformedReferencePolicy, WiringConfig};
use crate::error::WiringError;

/// Nodes of one step that wiring needs to find without scanning the form.
#[derive(Debug, Clone, Default)]
pub struct ScopeMembers {
    /// Fields outside collection templates.
    pub fields: Vec<NodeId>,
    /// Reference expressions outside collection templates.
    pub references: Vec<NodeId>,
    /// Reference expressions inside a collection template.
    pub template_references: Vec<NodeId>,
    /// Collections outside collection templates.
    pub collections: Vec<NodeId>,
}

static NO_MEMBERS: ScopeMembers = ScopeMembers {
    fields: Vec::new(),
    references: Vec::new(),
    template_references: Vec::new(),
    collections: Vec::new(),
};

/// Per-step membership of a compiled form.
#[derive(Debug, Clone, Default)]
pub struct StepMembership {
    by_step: HashMap<NodeId, ScopeMembers>,
}

impl StepMembership {
    /// Assigns fields, references and collections to their owning step.
    /// Nodes outside any step are not wired and are left out.
    pub fn build(nodes: &NodeStore) -> Self {
        let mut membership = StepMembership::default();
        for node in nodes.iter() {
            if !matches!(
                node.kind,
                NodeKind::Field(_) | NodeKind::Reference(_) | NodeKind::Collection(_)
            ) {
                continue;
            }
            let Some(step) = nodes.owning_step(node.id) else {
                continue;
            };
            let templated = in_template(nodes, node);
            let members = membership.by_step.entry(step).or_default();
            match (&node.kind, templated) {
                (NodeKind::Reference(_), true) => members.template_references.push(node.id),
                (NodeKind::Reference(_), false) => members.references.push(node.id),
                (NodeKind::Field(_), false) => members.fields.push(node.id),
                (NodeKind::Collection(_), false) => members.collections.push(node.id),
                _ => {}
            }
        }
        membership
    }

    /// Members of `step`; empty if the step has none.
    pub fn members(&self, step: NodeId) -> &ScopeMembers {
        self.by_step.get(&step).unwrap_or(&NO_MEMBERS)
    }
}

/// Returns `true` if a strict ancestor of `node` is a collection or a
/// collection iteration.
pub fn in_template(nodes: &dyn NodeSource, node: &Node) -> bool {
    node.parent
        .and_then(|parent| {
            nodes.find_enclosing(parent, &mut |n| {
                matches!(n.kind, NodeKind::Collection(_) | NodeKind::Iteration(_))
            })
        })
        .is_some()
}

/// Returns `true` if the nearest collection or iteration strictly above
/// `node` is a collection, i.e. `node` belongs to a template that has not
/// been instantiated.
pub fn in_open_template<S: NodeSource + ?Sized>(nodes: &S, node: &Node) -> bool {
    node.parent
        .and_then(|parent| {
            nodes.find_enclosing(parent, &mut |n| {
                matches!(n.kind, NodeKind::Collection(_) | NodeKind::Iteration(_))
            })
        })
        .is_some_and(|scope| matches!(scope.kind, NodeKind::Collection(_)))
}

/// Returns `true` for a field, collection or reference inside an open
/// template. Such nodes are synthesized and wired per iteration only.
/// `@item` references are excluded: they read the template's own item.
pub fn awaits_iteration<S: NodeSource + ?Sized>(nodes: &S, node: &Node) -> bool {
    let deferred = match &node.kind {
        NodeKind::Field(_) | NodeKind::Collection(_) => true,
        NodeKind::Reference(reference) => !reference.is_in(Namespace::Item),
        _ => false,
    };
    deferred && in_open_template(nodes, node)
}

/// Read-only facade over one step's wiring inputs, plus the edge sink.
pub struct WiringContext<'a> {
    nodes: &'a dyn NodeSource,
    graph: &'a mut DependencyGraph,
    scopes: &'a ScopeTree,
    members: &'a ScopeMembers,
    step: NodeId,
    config: &'a WiringConfig,
}

impl<'a> WiringContext<'a> {
    pub fn new(
        nodes: &'a dyn NodeSource,
        graph: &'a mut DependencyGraph,
        scopes: &'a ScopeTree,
        members: &'a ScopeMembers,
        step: NodeId,
        config: &'a WiringConfig,
    ) -> Self {
        WiringContext {
            nodes,
            graph,
            scopes,
            members,
            step,
            config,
        }
    }

    pub fn nodes(&self) -> &'a dyn NodeSource {
        self.nodes
    }

    pub fn graph(&self) -> &DependencyGraph {
        self.graph
    }

    pub fn config(&self) -> &'a WiringConfig {
        self.config
    }

    /// The step being wired.
    pub fn current_step(&self) -> NodeId {
        self.step
    }

    /// Looks up a node; a missing id is an internal-consistency failure.
    pub fn node(&self, id: NodeId) -> Result<&'a Node, WiringError> {
        let nodes = self.nodes;
        Ok(nodes.get(id)?)
    }

    /// Looks up a node that must be a pseudo-node.
    pub fn pseudo(&self, id: NodeId) -> Result<&'a PseudoNode, WiringError> {
        let node = self.node(id)?;
        node.kind.as_pseudo().ok_or_else(|| {
            CoreError::UnexpectedKind {
                id,
                expected: "pseudo",
                actual: node.kind.tag(),
            }
            .into()
        })
    }

    /// The pseudo-node of `kind` keyed by `key` in the current step.
    pub fn find_pseudo_node(&self, kind: PseudoKind, key: &str) -> Option<NodeId> {
        self.nodes
            .pseudo(&PseudoKey::new(kind, self.step, key))
    }

    /// All pseudo-nodes of `kind` in the current step.
    pub fn find_pseudo_nodes_by_type(&self, kind: PseudoKind) -> Vec<NodeId> {
        self.nodes.pseudo_ids_of(kind, self.step)
    }

    /// References of the current step (outside collection templates) whose
    /// first path segment selects `namespace`. Linear in the step's
    /// references.
    pub fn find_reference_nodes(&self, namespace: Namespace) -> Vec<(NodeId, &'a ReferenceNode)> {
        self.filter_references(&self.members.references, namespace)
    }

    /// Like [`find_reference_nodes`](Self::find_reference_nodes) but over
    /// references inside collection templates.
    pub fn find_template_reference_nodes(
        &self,
        namespace: Namespace,
    ) -> Vec<(NodeId, &'a ReferenceNode)> {
        self.filter_references(&self.members.template_references, namespace)
    }

    /// Nearest load-transition at or above `step`, if any.
    pub fn find_last_on_load_transition_from(&self, step: NodeId) -> Option<NodeId> {
        self.scopes.last_on_load_from(step)
    }

    /// Adds a dependency edge. Returns `false` if it already existed.
    pub fn add_edge(
        &mut self,
        producer: NodeId,
        consumer: NodeId,
        role: EdgeRole,
        metadata: EdgeMetadata,
    ) -> bool {
        self.graph.add_edge(producer, consumer, role, metadata)
    }

    /// Applies the malformed-reference policy to a reference whose path names
    /// no lookup key.
    pub fn malformed_reference(
        &self,
        id: NodeId,
        reference: &ReferenceNode,
    ) -> Result<(), WiringError> {
        match self.config.malformed_references {
            MalformedReferencePolicy::Skip => {
                warn!(reference = %id, path = ?reference.path, "skipping reference without lookup key");
                Ok(())
            }
            MalformedReferencePolicy::Reject => Err(WiringError::MalformedReference {
                id,
                path: reference.path.clone(),
            }),
        }
    }

    /// Checks the step's template references against the policies that
    /// incremental wiring would apply to each iteration: short keyed paths
    /// under [`MalformedReferencePolicy::Reject`] and `@self` outside a field
    /// under strict self references.
    pub fn check_template_references(&self) -> Result<(), WiringError> {
        let nodes = self.nodes;
        for &id in &self.members.template_references {
            let Some(reference) = nodes.node(id).and_then(|n| n.kind.as_reference()) else {
                continue;
            };
            match reference.namespace() {
                Some(Namespace::SelfValue) if self.config.strict_self_references => {
                    let in_field = nodes
                        .parent(id)
                        .and_then(|parent| {
                            nodes.find_enclosing(parent, &mut |n| matches!(n.kind, NodeKind::Field(_)))
                        })
                        .is_some();
                    if !in_field {
                        return Err(WiringError::SelfOutsideField { id });
                    }
                }
                Some(namespace) if namespace.is_keyed() => {
                    if reference.lookup_key(namespace).is_none() {
                        self.malformed_reference(id, reference)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn filter_references(
        &self,
        ids: &[NodeId],
        namespace: Namespace,
    ) -> Vec<(NodeId, &'a ReferenceNode)> {
        let nodes = self.nodes;
        ids.iter()
            .filter_map(|&id| {
                let reference = nodes.node(id)?.kind.as_reference()?;
                reference.is_in(namespace).then_some((id, reference))
            })
            .collect()
    }
}
