//! Core error types for formwire-core.
//!
//! Uses `thiserror` for structured, matchable error variants. Every variant
//! here is an internal-consistency failure: the compiled tree handed to the
//! core does not hold together, which points at a defect upstream rather than
//! a condition a request can recover from.

use thiserror::Error;

use crate::id::NodeId;
use crate::pseudo::PseudoKey;

/// Core errors produced by the formwire-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A node id was not found in the node store.
    #[error("node not found: NodeId({id})", id = id.0)]
    NodeNotFound { id: NodeId },

    /// A pseudo-node records an originating node that is not in the store.
    #[error("pseudo-node {pseudo} references missing originating node {origin}")]
    OriginMissing { pseudo: NodeId, origin: NodeId },

    /// A node was expected to be of a specific kind.
    #[error("node {id} is a {actual}, expected {expected}")]
    UnexpectedKind {
        id: NodeId,
        expected: &'static str,
        actual: &'static str,
    },

    /// A node that must live inside a step or journey has no enclosing scope.
    #[error("node {id} is not contained in any step or journey")]
    NotAScope { id: NodeId },

    /// Two nodes were inserted with the same id.
    #[error("duplicate node id: {id}")]
    DuplicateNode { id: NodeId },

    /// A pseudo-node was inserted directly while one with the same identity
    /// already exists. Pseudo-nodes must go through find-or-create.
    #[error("duplicate pseudo-node {key}: already present as {existing}")]
    DuplicatePseudoNode { key: PseudoKey, existing: NodeId },

    /// Evaluation order cannot be derived because the dependency graph has a
    /// cycle through the named node.
    #[error("dependency cycle detected through node {node}")]
    CycleDetected { node: NodeId },
}
