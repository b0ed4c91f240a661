//! Pseudo-node synthesis and dependency wiring for compiled forms.
//!
//! Two entry points:
//! - [`WiredForm::wire`]: compile-time pass over a whole form, run once per
//!   registration.
//! - [`wire_nodes`]: incremental pass over a batch of request-time nodes,
//!   typically one collection iteration.
//!
//! Both run the same family modules (see [`modules::modules`]) through a
//! [`WiringContext`], so a request overlay is wired by exactly the rules the
//! form was.

pub mod config;
pub mod context;
pub mod error;
pub mod incremental;
pub mod index;
pub mod modules;
pub mod orchestrator;
pub mod synthesize;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::{MalformedReferencePolicy, WiringConfig};
pub use context::{awaits_iteration, in_open_template, ScopeMembers, StepMembership, WiringContext};
pub use error::WiringError;
pub use incremental::wire_nodes;
pub use index::ReferenceIndex;
pub use modules::{WireStats, WiringModule};
pub use orchestrator::{wire_all, WiredForm, WiringReport};
pub use synthesize::{synthesize_batch, synthesize_step};
