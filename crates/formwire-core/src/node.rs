//! Node types of a compiled form.
//!
//! Every entry in the [`NodeStore`](crate::store::NodeStore) is a [`Node`]: an
//! id, an optional parent (AST containment) and a [`NodeKind`] carrying the
//! kind-specific properties. Structural kinds come from the form compiler;
//! [`NodeKind::Pseudo`] entries are synthesized by the wiring passes and
//! [`NodeKind::Iteration`] entries by the request runtime.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::id::NodeId;
use crate::pseudo::PseudoNode;
use crate::reference::ReferenceNode;

/// A node of the compiled form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Containing node. `None` only for top-level journeys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
}

impl Node {
    pub fn new(id: NodeId, parent: Option<NodeId>, kind: NodeKind) -> Self {
        Node { id, parent, kind }
    }
}

/// Discriminated property bag of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Journey(JourneyNode),
    Step(StepNode),
    Block(BlockNode),
    Collection(CollectionNode),
    Field(FieldNode),
    Reference(ReferenceNode),
    Function(FunctionNode),
    Literal(LiteralNode),
    Transition(TransitionNode),
    Pseudo(PseudoNode),
    Iteration(IterationNode),
}

/// A journey: a named group of steps and nested journeys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JourneyNode {
    pub code: String,
}

/// A step: one page of the journey, the unit pseudo-nodes are scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepNode {
    pub path: String,
}

/// A non-repeating content block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockNode {
    pub variant: String,
}

/// A repeated block. Its children form the template instantiated once per
/// collection item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionNode {
    pub code: String,
    /// Expression producing the collection's items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<NodeId>,
}

/// A field definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldNode {
    pub code: String,
    pub variant: String,
    /// Formatter expressions, applied in declared order.
    #[serde(default)]
    pub formatters: SmallVec<[NodeId; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<NodeId>,
}

/// A condition or transformer call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionNode {
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<NodeId>,
}

/// A constant value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiteralNode {
    pub value: serde_json::Value,
}

/// Request lifecycle phase a transition runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionTrigger {
    Load,
    Access,
    Action,
    Submit,
}

/// A lifecycle transition attached to a step or journey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionNode {
    pub trigger: TransitionTrigger,
    /// Effect calls run by this transition, in order.
    #[serde(default)]
    pub effects: Vec<NodeId>,
}

/// One request-time instance of a collection template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationNode {
    pub collection: NodeId,
    pub index: usize,
}

impl NodeKind {
    /// Returns the short tag of this kind, as used in serialized form.
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::Journey(_) => "journey",
            NodeKind::Step(_) => "step",
            NodeKind::Block(_) => "block",
            NodeKind::Collection(_) => "collection",
            NodeKind::Field(_) => "field",
            NodeKind::Reference(_) => "reference",
            NodeKind::Function(_) => "function",
            NodeKind::Literal(_) => "literal",
            NodeKind::Transition(_) => "transition",
            NodeKind::Pseudo(_) => "pseudo",
            NodeKind::Iteration(_) => "iteration",
        }
    }

    /// Returns `true` for journeys and steps.
    pub fn is_scope(&self) -> bool {
        matches!(self, NodeKind::Journey(_) | NodeKind::Step(_))
    }

    pub fn as_field(&self) -> Option<&FieldNode> {
        match self {
            NodeKind::Field(field) => Some(field),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&ReferenceNode> {
        match self {
            NodeKind::Reference(reference) => Some(reference),
            _ => None,
        }
    }

    pub fn as_pseudo(&self) -> Option<&PseudoNode> {
        match self {
            NodeKind::Pseudo(pseudo) => Some(pseudo),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&CollectionNode> {
        match self {
            NodeKind::Collection(collection) => Some(collection),
            _ => None,
        }
    }

    pub fn as_transition(&self) -> Option<&TransitionNode> {
        match self {
            NodeKind::Transition(transition) => Some(transition),
            _ => None,
        }
    }

    /// Node ids this kind refers to through its properties (not through
    /// parent links).
    pub fn linked_ids(&self) -> Vec<NodeId> {
        match self {
            NodeKind::Collection(c) => c.source.into_iter().collect(),
            NodeKind::Field(f) => f
                .formatters
                .iter()
                .copied()
                .chain(f.default_value)
                .collect(),
            NodeKind::Function(f) => f.arguments.clone(),
            NodeKind::Transition(t) => t.effects.clone(),
            NodeKind::Pseudo(p) => p.origin.into_iter().collect(),
            NodeKind::Iteration(i) => vec![i.collection],
            NodeKind::Journey(_)
            | NodeKind::Step(_)
            | NodeKind::Block(_)
            | NodeKind::Reference(_)
            | NodeKind::Literal(_) => Vec::new(),
        }
    }

    /// Rewrites every linked id through `map`. Used when a template subtree
    /// is cloned under fresh ids.
    pub fn remap_ids(&mut self, mut map: impl FnMut(NodeId) -> NodeId) {
        match self {
            NodeKind::Collection(c) => c.source = c.source.map(&mut map),
            NodeKind::Field(f) => {
                for formatter in f.formatters.iter_mut() {
                    *formatter = map(*formatter);
                }
                f.default_value = f.default_value.map(&mut map);
            }
            NodeKind::Function(f) => {
                for arg in f.arguments.iter_mut() {
                    *arg = map(*arg);
                }
            }
            NodeKind::Transition(t) => {
                for effect in t.effects.iter_mut() {
                    *effect = map(*effect);
                }
            }
            NodeKind::Pseudo(p) => p.origin = p.origin.map(&mut map),
            NodeKind::Iteration(i) => i.collection = map(i.collection),
            NodeKind::Journey(_)
            | NodeKind::Step(_)
            | NodeKind::Block(_)
            | NodeKind::Reference(_)
            | NodeKind::Literal(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn field() -> NodeKind {
        NodeKind::Field(FieldNode {
            code: "email".into(),
            variant: "text".into(),
            formatters: smallvec![NodeId(4), NodeId(5)],
            default_value: Some(NodeId(6)),
        })
    }

    #[test]
    fn tags_match_serde_names() {
        let json = serde_json::to_value(field()).unwrap();
        assert_eq!(json["type"], "field");
        assert_eq!(field().tag(), "field");
    }

    #[test]
    fn linked_ids_for_field_lists_formatters_then_default() {
        assert_eq!(field().linked_ids(), vec![NodeId(4), NodeId(5), NodeId(6)]);
    }

    #[test]
    fn remap_rewrites_every_link() {
        let mut kind = field();
        kind.remap_ids(|id| NodeId(id.0 + 100));
        assert_eq!(kind.linked_ids(), vec![NodeId(104), NodeId(105), NodeId(106)]);
    }

    #[test]
    fn reference_has_no_links() {
        let kind = NodeKind::Reference(ReferenceNode::new(["answers", "email"]));
        assert!(kind.linked_ids().is_empty());
        assert!(kind.as_reference().is_some());
        assert!(kind.as_field().is_none());
    }

    #[test]
    fn serde_roundtrip_node() {
        let node = Node::new(NodeId(3), Some(NodeId(1)), field());
        let json = serde_json::to_string(&node).unwrap();
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(node, back);
    }

    #[test]
    fn scopes_are_journeys_and_steps() {
        assert!(NodeKind::Step(StepNode { path: "/a".into() }).is_scope());
        assert!(NodeKind::Journey(JourneyNode { code: "j".into() }).is_scope());
        assert!(!field().is_scope());
    }
}
