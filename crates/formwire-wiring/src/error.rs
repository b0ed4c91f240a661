//! Wiring error types.

use std::path::PathBuf;

use thiserror::Error;

use formwire_core::{CoreError, NodeId};

/// Errors produced while synthesizing or wiring pseudo-nodes.
///
/// Every variant aborts the pass that raised it. At registration time that
/// means the form is not registered; at request time, the request fails.
#[derive(Debug, Error)]
pub enum WiringError {
    /// The compiled tree is internally inconsistent.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A reference path too short to name a lookup key, under the `reject`
    /// policy.
    #[error("malformed reference {id}: path {path:?} names no lookup key")]
    MalformedReference { id: NodeId, path: Vec<String> },

    /// A `@self` reference outside any field, under strict self references.
    #[error("self reference {id} is not inside a field")]
    SelfOutsideField { id: NodeId },

    /// A pseudo-node that must carry an originating node has none.
    #[error("pseudo-node {id} has no originating node")]
    MissingOrigin { id: NodeId },

    /// A node handed to incremental wiring does not belong to a known step.
    #[error("node {id} does not belong to a known step")]
    UnknownStep { id: NodeId },

    /// The wiring configuration could not be parsed.
    #[error("invalid wiring config: {0}")]
    Config(#[from] serde_json::Error),

    /// The wiring configuration file could not be read.
    #[error("cannot read wiring config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An unrecognized malformed-reference policy name.
    #[error("unknown malformed-reference policy '{0}' (expected 'skip' or 'reject')")]
    UnknownPolicy(String),
}
