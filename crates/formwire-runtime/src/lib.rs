//! Request-time runtime for wired forms.
//!
//! [`FormRegistry`] wires each form once and shares it across requests.
//! A [`RequestScope`] layers per-request nodes and edges over the shared
//! form: collection iterations are materialized and wired there, and the
//! request's [`AnswerHistory`] records how each answer changed.

pub mod answers;
pub mod error;
pub mod hash;
pub mod overlay;
pub mod registry;

// Re-export commonly used types
pub use answers::{producer_roles, AnswerHistory, AnswerSource, Checkpoint, Mutation};
pub use error::RuntimeError;
pub use hash::fingerprint;
pub use overlay::{Iteration, LayeredNodes, RequestId, RequestScope};
pub use registry::{FormRegistry, Registration, RegistrationOutcome};
