//! Core data model for the formwire dependency-graph engine.
//!
//! - [`store`]: the node arena and the canonical pseudo-node index
//! - [`graph`]: the dependency edge set produced by wiring
//! - [`scope`]: the immutable step/journey hierarchy
//! - [`schedule`]: evaluation order over wired edges

pub mod edge;
pub mod error;
pub mod form;
pub mod graph;
pub mod id;
pub mod node;
pub mod pseudo;
pub mod reference;
pub mod schedule;
pub mod scope;
pub mod store;

// Re-export commonly used types
pub use edge::{DependencyEdge, EdgeMetadata, EdgeRole};
pub use error::CoreError;
pub use form::CompiledForm;
pub use graph::DependencyGraph;
pub use id::{EdgeId, NodeId};
pub use node::{IterationNode, Node, NodeKind, TransitionTrigger};
pub use pseudo::{item_key, PseudoKey, PseudoKind, PseudoNode};
pub use reference::{Namespace, ReferenceNode};
pub use scope::ScopeTree;
pub use store::{NodeSource, NodeStore, PseudoSink};
