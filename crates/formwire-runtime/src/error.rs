//! Runtime error types.
//!
//! [`RuntimeError`] wraps the wiring and core errors a registration or a
//! request can hit, plus the runtime's own lookup failures.

use formwire_core::{CoreError, NodeId};
use formwire_wiring::WiringError;

/// Errors from form registration and request-scoped operations.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Synthesis or wiring failed. At registration the form is not stored;
    /// in a request, the request fails.
    #[error(transparent)]
    Wiring(#[from] WiringError),

    /// The node tree is internally inconsistent.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// No form is registered under this code.
    #[error("unknown form '{0}'")]
    UnknownForm(String),

    /// A node asked to iterate is not a collection.
    #[error("node {id} is not a collection")]
    NotACollection { id: NodeId },

    /// A collection inside a template that has not been instantiated. Its
    /// iterations come from the enclosing iteration's copy of it.
    #[error("collection {id} belongs to an open template")]
    OpenTemplate { id: NodeId },

    /// An iteration field code is already a local answer of the step.
    #[error("iteration field code '{code}' collides with an answer of step {step}")]
    CodeCollision { code: String, step: NodeId },

    /// No collection of the form has this code.
    #[error("form has no collection '{0}'")]
    UnknownCollection(String),

    /// A form could not be serialized for fingerprinting or output.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
