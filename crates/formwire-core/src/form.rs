//! CompiledForm: the node tree handed over by the form compiler.
//!
//! [`CompiledForm`] wraps a [`NodeStore`] with a form code and builder
//! methods for every structural node kind. The compiler (or a test) uses the
//! builder; the wiring passes only read the store and add pseudo-nodes
//! through find-or-create.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::NodeId;
use crate::node::{
    BlockNode, CollectionNode, FieldNode, FunctionNode, JourneyNode, LiteralNode, NodeKind,
    StepNode, TransitionNode, TransitionTrigger,
};
use crate::reference::ReferenceNode;
use crate::store::NodeStore;

/// A compiled form definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledForm {
    /// Stable form code the form is registered under.
    pub code: String,
    pub nodes: NodeStore,
}

impl CompiledForm {
    pub fn new(code: impl Into<String>) -> Self {
        CompiledForm {
            code: code.into(),
            nodes: NodeStore::new(),
        }
    }

    /// Parses a compiled form from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serializes the form to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    // -----------------------------------------------------------------------
    // Structure
    // -----------------------------------------------------------------------

    pub fn add_journey(&mut self, parent: Option<NodeId>, code: &str) -> Result<NodeId, CoreError> {
        if let Some(parent) = parent {
            self.expect_kind(parent, "journey", |k| matches!(k, NodeKind::Journey(_)))?;
        }
        self.nodes
            .insert(parent, NodeKind::Journey(JourneyNode { code: code.into() }))
    }

    pub fn add_step(&mut self, journey: NodeId, path: &str) -> Result<NodeId, CoreError> {
        self.expect_kind(journey, "journey", |k| matches!(k, NodeKind::Journey(_)))?;
        self.nodes
            .insert(Some(journey), NodeKind::Step(StepNode { path: path.into() }))
    }

    pub fn add_block(&mut self, parent: NodeId, variant: &str) -> Result<NodeId, CoreError> {
        self.nodes.get(parent)?;
        self.nodes.insert(
            Some(parent),
            NodeKind::Block(BlockNode {
                variant: variant.into(),
            }),
        )
    }

    /// Adds a repeated block. `source` is an expression (usually a `data`
    /// reference) yielding the items; it must not live inside the collection.
    pub fn add_collection(
        &mut self,
        parent: NodeId,
        code: &str,
        source: Option<NodeId>,
    ) -> Result<NodeId, CoreError> {
        self.nodes.get(parent)?;
        if let Some(source) = source {
            self.nodes.get(source)?;
        }
        self.nodes.insert(
            Some(parent),
            NodeKind::Collection(CollectionNode {
                code: code.into(),
                source,
            }),
        )
    }

    pub fn add_field(&mut self, parent: NodeId, code: &str, variant: &str) -> Result<NodeId, CoreError> {
        self.nodes.get(parent)?;
        self.nodes.insert(
            Some(parent),
            NodeKind::Field(FieldNode {
                code: code.into(),
                variant: variant.into(),
                formatters: Default::default(),
                default_value: None,
            }),
        )
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    pub fn add_reference<I, S>(&mut self, parent: NodeId, path: I) -> Result<NodeId, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.nodes.get(parent)?;
        self.nodes
            .insert(Some(parent), NodeKind::Reference(ReferenceNode::new(path)))
    }

    pub fn add_function(
        &mut self,
        parent: NodeId,
        name: &str,
        arguments: Vec<NodeId>,
    ) -> Result<NodeId, CoreError> {
        self.nodes.get(parent)?;
        self.nodes.insert(
            Some(parent),
            NodeKind::Function(FunctionNode {
                name: name.into(),
                arguments,
            }),
        )
    }

    pub fn add_literal(&mut self, parent: NodeId, value: serde_json::Value) -> Result<NodeId, CoreError> {
        self.nodes.get(parent)?;
        self.nodes
            .insert(Some(parent), NodeKind::Literal(LiteralNode { value }))
    }

    /// Appends a formatter call to `field` and returns the call's id.
    pub fn add_formatter(&mut self, field: NodeId, name: &str) -> Result<NodeId, CoreError> {
        self.expect_kind(field, "field", |k| matches!(k, NodeKind::Field(_)))?;
        let formatter = self.add_function(field, name, Vec::new())?;
        if let NodeKind::Field(f) = &mut self.nodes.get_mut(field)?.kind {
            f.formatters.push(formatter);
        }
        Ok(formatter)
    }

    /// Sets `field`'s default-value expression.
    pub fn set_default_value(&mut self, field: NodeId, expression: NodeId) -> Result<(), CoreError> {
        self.nodes.get(expression)?;
        self.expect_kind(field, "field", |k| matches!(k, NodeKind::Field(_)))?;
        if let NodeKind::Field(f) = &mut self.nodes.get_mut(field)?.kind {
            f.default_value = Some(expression);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Adds a lifecycle transition to a step or journey.
    pub fn add_transition(&mut self, scope: NodeId, trigger: TransitionTrigger) -> Result<NodeId, CoreError> {
        self.expect_kind(scope, "step or journey", NodeKind::is_scope)?;
        self.nodes.insert(
            Some(scope),
            NodeKind::Transition(TransitionNode {
                trigger,
                effects: Vec::new(),
            }),
        )
    }

    /// Appends an effect call to a transition and returns the call's id.
    pub fn add_effect(&mut self, transition: NodeId, name: &str) -> Result<NodeId, CoreError> {
        self.expect_kind(transition, "transition", |k| matches!(k, NodeKind::Transition(_)))?;
        let effect = self.add_function(transition, name, Vec::new())?;
        if let NodeKind::Transition(t) = &mut self.nodes.get_mut(transition)?.kind {
            t.effects.push(effect);
        }
        Ok(effect)
    }

    fn expect_kind(
        &self,
        id: NodeId,
        expected: &'static str,
        pred: impl Fn(&NodeKind) -> bool,
    ) -> Result<(), CoreError> {
        let node = self.nodes.get(id)?;
        if pred(&node.kind) {
            Ok(())
        } else {
            Err(CoreError::UnexpectedKind {
                id,
                expected,
                actual: node.kind.tag(),
            })
        }
    }
}
