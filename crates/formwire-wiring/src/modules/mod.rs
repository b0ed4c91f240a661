//! Pseudo-node wiring modules, one per data-source family.
//!
//! Every module implements [`WiringModule`] with two entry points:
//! - [`wire`](WiringModule::wire): compile-time pass over one step. Builds a
//!   consumer index once, then for each of its pseudo-nodes wires producers
//!   before consumers.
//! - [`wire_nodes`](WiringModule::wire_nodes): incremental pass over a batch
//!   of request-time nodes. Wires producers of new pseudo-nodes, then pushes
//!   one consumer edge per new reference by direct lookup. Nothing outside
//!   the batch is rescanned.
//!
//! [`modules`] lists them in the fixed order the orchestrator runs them.

pub mod answer;
pub mod item;
pub mod keyed;
pub mod self_value;

use std::ops::AddAssign;

use serde::Serialize;

use formwire_core::{EdgeMetadata, EdgeRole, Namespace, NodeId, PseudoKind, PseudoNode};

use crate::context::WiringContext;
use crate::error::WiringError;

pub use answer::AnswerModule;
pub use item::ItemModule;
pub use keyed::{KeyedSourceModule, DATA, PARAMS, POST, QUERY};
pub use self_value::SelfModule;

/// Edges added by one module pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WireStats {
    pub producers: usize,
    pub consumers: usize,
}

impl WireStats {
    pub fn total(&self) -> usize {
        self.producers + self.consumers
    }
}

impl AddAssign for WireStats {
    fn add_assign(&mut self, rhs: Self) {
        self.producers += rhs.producers;
        self.consumers += rhs.consumers;
    }
}

/// A pseudo-node family's wiring logic.
pub trait WiringModule {
    /// Short name for logs and reports.
    fn name(&self) -> &'static str;

    /// Compile-time wiring of the context's step.
    fn wire(&self, ctx: &mut WiringContext<'_>) -> Result<WireStats, WiringError>;

    /// Incremental wiring of `batch`, all of which belongs to the context's
    /// step.
    fn wire_nodes(
        &self,
        ctx: &mut WiringContext<'_>,
        batch: &[NodeId],
    ) -> Result<WireStats, WiringError>;
}

/// All modules in run order. Families that other families read from come
/// first.
pub fn modules() -> [&'static dyn WiringModule; 7] {
    [
        &POST,
        &QUERY,
        &PARAMS,
        &DATA,
        &AnswerModule,
        &SelfModule,
        &ItemModule,
    ]
}

/// Adds one consumer edge per reference, from `pseudo` to the reference.
/// Returns the number of edges added.
pub(crate) fn connect_consumers(
    ctx: &mut WiringContext<'_>,
    pseudo: NodeId,
    key: &str,
    namespace: Namespace,
    references: &[NodeId],
) -> usize {
    let mut added = 0;
    for &reference in references {
        let metadata = EdgeMetadata::keyed(key).with_reference(namespace);
        if ctx.add_edge(pseudo, reference, EdgeRole::DataFlow, metadata) {
            added += 1;
        }
    }
    added
}

/// Adds the load-transition producer edge for `pseudo`, if the current step
/// has a load-transition anywhere above it.
pub(crate) fn connect_on_load(ctx: &mut WiringContext<'_>, pseudo: NodeId, key: &str) -> usize {
    let step = ctx.current_step();
    match ctx.find_last_on_load_transition_from(step) {
        Some(load) => usize::from(ctx.add_edge(
            load,
            pseudo,
            EdgeRole::Effect,
            EdgeMetadata::keyed(key).with_property(formwire_core::edge::property::ON_LOAD),
        )),
        None => 0,
    }
}

/// Pseudo-nodes of `kind` among `batch`, in batch order.
pub(crate) fn batch_pseudo_nodes<'a>(
    ctx: &WiringContext<'a>,
    batch: &[NodeId],
    kind: PseudoKind,
) -> Result<Vec<(NodeId, &'a PseudoNode)>, WiringError> {
    let mut found = Vec::new();
    for &id in batch {
        if let Some(pseudo) = ctx.node(id)?.kind.as_pseudo() {
            if pseudo.kind == kind {
                found.push((id, pseudo));
            }
        }
    }
    Ok(found)
}

/// Well-formed references of `namespace` among `batch` with their lookup
/// keys. Short paths go through the malformed-reference policy.
pub(crate) fn batch_keyed_references<'a>(
    ctx: &WiringContext<'a>,
    batch: &[NodeId],
    namespace: Namespace,
) -> Result<Vec<(NodeId, &'a str)>, WiringError> {
    let mut found = Vec::new();
    for &id in batch {
        let Some(reference) = ctx.node(id)?.kind.as_reference() else {
            continue;
        };
        if !reference.is_in(namespace) {
            continue;
        }
        match reference.lookup_key(namespace) {
            Some(key) => found.push((id, key)),
            None => ctx.malformed_reference(id, reference)?,
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modules_run_in_fixed_order() {
        let names: Vec<&str> = modules().iter().map(|m| m.name()).collect();
        assert_eq!(
            names,
            vec!["post", "query", "params", "data", "answer", "self", "item"]
        );
    }

    #[test]
    fn stats_accumulate() {
        let mut stats = WireStats::default();
        stats += WireStats { producers: 2, consumers: 1 };
        stats += WireStats { producers: 1, consumers: 4 };
        assert_eq!(stats, WireStats { producers: 3, consumers: 5 });
        assert_eq!(stats.total(), 8);
    }
}
