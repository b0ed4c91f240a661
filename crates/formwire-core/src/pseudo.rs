//! Pseudo-node identity.
//!
//! A pseudo-node stands for an implicit data source or sink the form author
//! never wrote down ("the submitted value of field X"). Its identity is the
//! explicit `(kind, scope, key)` tuple in [`PseudoKey`]; the node store keeps
//! one canonical index over these keys so that no two passes can create the
//! same pseudo-node twice.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::NodeId;
use crate::reference::Namespace;

/// The data-source family a pseudo-node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PseudoKind {
    /// Resolved answer of a field declared in the current step.
    AnswerLocal,
    /// Resolved answer of a field declared in another step, loaded by effect.
    AnswerRemote,
    /// Raw submitted value of a field.
    Post,
    /// Query-string parameter of the current request.
    Query,
    /// Route parameter of the current request.
    Params,
    /// External data loaded by load-time effects.
    Data,
    /// Current item of a collection (or of one collection iteration).
    Item,
}

impl PseudoKind {
    /// Returns a short, stable name used in diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            PseudoKind::AnswerLocal => "answer_local",
            PseudoKind::AnswerRemote => "answer_remote",
            PseudoKind::Post => "post",
            PseudoKind::Query => "query",
            PseudoKind::Params => "params",
            PseudoKind::Data => "data",
            PseudoKind::Item => "item",
        }
    }

    /// The reference namespace whose paths read this family, if any.
    pub fn namespace(&self) -> Namespace {
        match self {
            PseudoKind::AnswerLocal | PseudoKind::AnswerRemote => Namespace::Answers,
            PseudoKind::Post => Namespace::Post,
            PseudoKind::Query => Namespace::Query,
            PseudoKind::Params => Namespace::Params,
            PseudoKind::Data => Namespace::Data,
            PseudoKind::Item => Namespace::Item,
        }
    }
}

impl fmt::Display for PseudoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical identity of a pseudo-node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PseudoKey {
    pub kind: PseudoKind,
    /// The step the pseudo-node is resolved in.
    pub scope: NodeId,
    /// Field code, parameter name, data key or item key.
    pub key: String,
}

impl PseudoKey {
    pub fn new(kind: PseudoKind, scope: NodeId, key: impl Into<String>) -> Self {
        PseudoKey {
            kind,
            scope,
            key: key.into(),
        }
    }
}

impl fmt::Display for PseudoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})@{}", self.kind, self.key, self.scope)
    }
}

/// Properties of a pseudo-node stored in the node store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PseudoNode {
    pub kind: PseudoKind,
    pub scope: NodeId,
    pub key: String,
    /// The node this pseudo-node was synthesized for: the field definition
    /// for answers and posts, the collection or iteration for items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<NodeId>,
}

impl PseudoNode {
    /// Returns the canonical identity of this pseudo-node.
    pub fn identity(&self) -> PseudoKey {
        PseudoKey::new(self.kind, self.scope, self.key.clone())
    }
}

/// Builds the lookup key an item pseudo-node is registered under.
///
/// The collection template itself uses the bare collection id; each
/// request-time iteration appends its index.
pub fn item_key(collection: NodeId, iteration: Option<usize>) -> String {
    match iteration {
        Some(index) => format!("{}#{}", collection.0, index),
        None => collection.0.to_string(),
    }
}
