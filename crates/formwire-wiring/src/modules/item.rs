//! `@item` wiring for collections.
//!
//! Each collection gets one item pseudo-node keyed by the collection id; each
//! request-time iteration gets its own, keyed by collection id and index (see
//! [`item_key`]). The producer is the collection's source expression. The
//! consumers are the `["@item", ...]` references whose nearest enclosing
//! collection or iteration is the one the pseudo-node stands for.

use tracing::{debug, warn};

use formwire_core::edge::property;
use formwire_core::{
    item_key, CoreError, EdgeMetadata, EdgeRole, Namespace, NodeId, NodeKind, NodeSource,
    PseudoKind, PseudoNode,
};

use super::{batch_pseudo_nodes, connect_consumers, WireStats, WiringModule};
use crate::context::WiringContext;
use crate::error::WiringError;
use crate::index::ReferenceIndex;

/// Item key of the nearest collection or iteration strictly above `id`.
pub fn item_scope_key(nodes: &dyn NodeSource, id: NodeId) -> Option<String> {
    let parent = nodes.parent(id)?;
    let scope = nodes.find_enclosing(parent, &mut |n| {
        matches!(n.kind, NodeKind::Collection(_) | NodeKind::Iteration(_))
    })?;
    match &scope.kind {
        NodeKind::Collection(_) => Some(item_key(scope.id, None)),
        NodeKind::Iteration(iteration) => {
            Some(item_key(iteration.collection, Some(iteration.index)))
        }
        _ => None,
    }
}

/// Wiring for [`PseudoKind::Item`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemModule;

impl ItemModule {
    /// Connects the collection source to an item pseudo-node.
    fn wire_producer(
        ctx: &mut WiringContext<'_>,
        id: NodeId,
        pseudo: &PseudoNode,
    ) -> Result<usize, WiringError> {
        let origin = pseudo.origin.ok_or(WiringError::MissingOrigin { id })?;
        let nodes = ctx.nodes();
        let node = nodes
            .node(origin)
            .ok_or(CoreError::OriginMissing { pseudo: id, origin })?;

        let (collection, position) = match &node.kind {
            NodeKind::Collection(_) => (origin, None),
            NodeKind::Iteration(iteration) => (iteration.collection, Some(iteration.index)),
            other => {
                return Err(CoreError::UnexpectedKind {
                    id: origin,
                    expected: "collection",
                    actual: other.tag(),
                }
                .into())
            }
        };
        let definition = nodes.get(collection)?;
        let Some(collection_node) = definition.kind.as_collection() else {
            return Err(CoreError::UnexpectedKind {
                id: collection,
                expected: "collection",
                actual: definition.kind.tag(),
            }
            .into());
        };
        let Some(source) = collection_node.source else {
            return Ok(0);
        };

        let property = match position {
            Some(index) => property::item(index),
            None => property::SOURCE.to_string(),
        };
        let metadata = EdgeMetadata::keyed(collection_node.code.as_str()).with_property(property);
        Ok(usize::from(ctx.add_edge(source, id, EdgeRole::DataFlow, metadata)))
    }
}

impl WiringModule for ItemModule {
    fn name(&self) -> &'static str {
        "item"
    }

    fn wire(&self, ctx: &mut WiringContext<'_>) -> Result<WireStats, WiringError> {
        let nodes = ctx.nodes();
        let mut index = ReferenceIndex::default();
        for (reference, _) in ctx.find_template_reference_nodes(Namespace::Item) {
            match item_scope_key(nodes, reference) {
                Some(key) => index.insert(&key, reference),
                None => warn!(reference = %reference, "skipping item reference outside any collection"),
            }
        }
        for (reference, _) in ctx.find_reference_nodes(Namespace::Item) {
            warn!(reference = %reference, "skipping item reference outside any collection");
        }

        let mut stats = WireStats::default();
        for id in ctx.find_pseudo_nodes_by_type(PseudoKind::Item) {
            let pseudo = ctx.pseudo(id)?;
            stats.producers += Self::wire_producer(ctx, id, pseudo)?;
            stats.consumers +=
                connect_consumers(ctx, id, &pseudo.key, Namespace::Item, index.get(&pseudo.key));
        }

        debug!(
            step = %ctx.current_step(),
            references = index.len(),
            producers = stats.producers,
            consumers = stats.consumers,
            "wired collection items"
        );
        Ok(stats)
    }

    fn wire_nodes(
        &self,
        ctx: &mut WiringContext<'_>,
        batch: &[NodeId],
    ) -> Result<WireStats, WiringError> {
        let mut stats = WireStats::default();

        for (id, pseudo) in batch_pseudo_nodes(ctx, batch, PseudoKind::Item)? {
            stats.producers += Self::wire_producer(ctx, id, pseudo)?;
        }
        for &id in batch {
            let is_item = ctx
                .node(id)?
                .kind
                .as_reference()
                .is_some_and(|reference| reference.is_in(Namespace::Item));
            if !is_item {
                continue;
            }
            let Some(key) = item_scope_key(ctx.nodes(), id) else {
                warn!(reference = %id, "skipping item reference outside any collection");
                continue;
            };
            if let Some(pseudo) = ctx.find_pseudo_node(PseudoKind::Item, &key) {
                stats.consumers += connect_consumers(ctx, pseudo, &key, Namespace::Item, &[id]);
            }
        }
        Ok(stats)
    }
}
