//! Answer wiring: local and remote answer pseudo-nodes.
//!
//! A local answer (field declared in the step being wired) has up to four
//! producer families, wired in this order:
//! 1. the field's post value (`post`)
//! 2. each formatter, in declared order (`formatters[i]`)
//! 3. the field's default value expression (`defaultValue`)
//! 4. the nearest load-transition (`onLoad`, [`EdgeRole::Effect`])
//!
//! A remote answer (field of another step) can only be produced by the
//! nearest load-transition.
//!
//! Consumers are the step's `["answers", code, ...]` references. When a code
//! has both a local and a remote pseudo-node, the local one claims every
//! consumer.

use tracing::debug;

use formwire_core::edge::property;
use formwire_core::node::FieldNode;
use formwire_core::{CoreError, EdgeMetadata, EdgeRole, Namespace, NodeId, PseudoKind, PseudoNode};

use super::{
    batch_keyed_references, batch_pseudo_nodes, connect_consumers, connect_on_load, WireStats,
    WiringModule,
};
use crate::context::WiringContext;
use crate::error::WiringError;
use crate::index::ReferenceIndex;

/// Wiring for [`PseudoKind::AnswerLocal`] and [`PseudoKind::AnswerRemote`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AnswerModule;

impl AnswerModule {
    /// Resolves the field definition a local answer was synthesized for.
    fn origin_field<'a>(
        ctx: &WiringContext<'a>,
        id: NodeId,
        pseudo: &PseudoNode,
    ) -> Result<&'a FieldNode, WiringError> {
        let origin = pseudo.origin.ok_or(WiringError::MissingOrigin { id })?;
        let node = ctx
            .nodes()
            .node(origin)
            .ok_or(CoreError::OriginMissing { pseudo: id, origin })?;
        node.kind.as_field().ok_or_else(|| {
            CoreError::UnexpectedKind {
                id: origin,
                expected: "field",
                actual: node.kind.tag(),
            }
            .into()
        })
    }

    fn wire_local_producers(
        ctx: &mut WiringContext<'_>,
        id: NodeId,
        pseudo: &PseudoNode,
    ) -> Result<usize, WiringError> {
        let field = Self::origin_field(ctx, id, pseudo)?;
        let code = pseudo.key.as_str();
        let mut added = 0;

        if let Some(post) = ctx.find_pseudo_node(PseudoKind::Post, code) {
            let metadata = EdgeMetadata::keyed(code).with_property(property::POST);
            added += usize::from(ctx.add_edge(post, id, EdgeRole::DataFlow, metadata));
        }
        for (position, &formatter) in field.formatters.iter().enumerate() {
            let metadata = EdgeMetadata::keyed(code).with_property(property::formatter(position));
            added += usize::from(ctx.add_edge(formatter, id, EdgeRole::DataFlow, metadata));
        }
        if let Some(default) = field.default_value {
            let metadata = EdgeMetadata::keyed(code).with_property(property::DEFAULT_VALUE);
            added += usize::from(ctx.add_edge(default, id, EdgeRole::DataFlow, metadata));
        }
        added += connect_on_load(ctx, id, code);
        Ok(added)
    }
}

impl WiringModule for AnswerModule {
    fn name(&self) -> &'static str {
        "answer"
    }

    fn wire(&self, ctx: &mut WiringContext<'_>) -> Result<WireStats, WiringError> {
        let index = ReferenceIndex::build(ctx, Namespace::Answers)?;
        let mut stats = WireStats::default();

        for id in ctx.find_pseudo_nodes_by_type(PseudoKind::AnswerLocal) {
            let pseudo = ctx.pseudo(id)?;
            stats.producers += Self::wire_local_producers(ctx, id, pseudo)?;
            stats.consumers += connect_consumers(
                ctx,
                id,
                &pseudo.key,
                Namespace::Answers,
                index.get(&pseudo.key),
            );
        }

        for id in ctx.find_pseudo_nodes_by_type(PseudoKind::AnswerRemote) {
            let pseudo = ctx.pseudo(id)?;
            stats.producers += connect_on_load(ctx, id, &pseudo.key);
            if ctx
                .find_pseudo_node(PseudoKind::AnswerLocal, &pseudo.key)
                .is_some()
            {
                continue;
            }
            stats.consumers += connect_consumers(
                ctx,
                id,
                &pseudo.key,
                Namespace::Answers,
                index.get(&pseudo.key),
            );
        }

        debug!(
            step = %ctx.current_step(),
            references = index.len(),
            producers = stats.producers,
            consumers = stats.consumers,
            "wired answers"
        );
        Ok(stats)
    }

    fn wire_nodes(
        &self,
        ctx: &mut WiringContext<'_>,
        batch: &[NodeId],
    ) -> Result<WireStats, WiringError> {
        let mut stats = WireStats::default();

        for (id, pseudo) in batch_pseudo_nodes(ctx, batch, PseudoKind::AnswerLocal)? {
            stats.producers += Self::wire_local_producers(ctx, id, pseudo)?;
        }
        for (id, pseudo) in batch_pseudo_nodes(ctx, batch, PseudoKind::AnswerRemote)? {
            stats.producers += connect_on_load(ctx, id, &pseudo.key);
        }
        for (reference, code) in batch_keyed_references(ctx, batch, Namespace::Answers)? {
            let target = ctx
                .find_pseudo_node(PseudoKind::AnswerLocal, code)
                .or_else(|| ctx.find_pseudo_node(PseudoKind::AnswerRemote, code));
            if let Some(target) = target {
                stats.consumers +=
                    connect_consumers(ctx, target, code, Namespace::Answers, &[reference]);
            }
        }
        Ok(stats)
    }
}
