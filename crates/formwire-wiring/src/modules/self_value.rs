//! `@self` wiring.
//!
//! A `["@self", ...]` reference reads the answer of the field it sits in.
//! There is no dedicated pseudo-node: the reference becomes a consumer of the
//! enclosing field's local answer.

use tracing::{debug, warn};

use formwire_core::{EdgeMetadata, EdgeRole, Namespace, NodeId, NodeKind, PseudoKind};

use super::{WireStats, WiringModule};
use crate::context::WiringContext;
use crate::error::WiringError;

/// Wiring for `@self` references.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfModule;

impl SelfModule {
    /// Connects one `@self` reference to its field's local answer.
    fn wire_reference(ctx: &mut WiringContext<'_>, reference: NodeId) -> Result<usize, WiringError> {
        let nodes = ctx.nodes();
        let field = nodes
            .parent(reference)
            .and_then(|parent| {
                nodes.find_enclosing(parent, &mut |n| matches!(n.kind, NodeKind::Field(_)))
            })
            .and_then(|node| node.kind.as_field());

        let Some(field) = field else {
            if ctx.config().strict_self_references {
                return Err(WiringError::SelfOutsideField { id: reference });
            }
            warn!(reference = %reference, "skipping self reference outside any field");
            return Ok(0);
        };

        let Some(answer) = ctx.find_pseudo_node(PseudoKind::AnswerLocal, &field.code) else {
            debug!(reference = %reference, field = %field.code, "no local answer for self reference");
            return Ok(0);
        };
        let metadata = EdgeMetadata::keyed(field.code.as_str()).with_reference(Namespace::SelfValue);
        Ok(usize::from(ctx.add_edge(answer, reference, EdgeRole::DataFlow, metadata)))
    }
}

impl WiringModule for SelfModule {
    fn name(&self) -> &'static str {
        "self"
    }

    fn wire(&self, ctx: &mut WiringContext<'_>) -> Result<WireStats, WiringError> {
        let mut stats = WireStats::default();
        for (reference, _) in ctx.find_reference_nodes(Namespace::SelfValue) {
            stats.consumers += Self::wire_reference(ctx, reference)?;
        }
        Ok(stats)
    }

    fn wire_nodes(
        &self,
        ctx: &mut WiringContext<'_>,
        batch: &[NodeId],
    ) -> Result<WireStats, WiringError> {
        let mut stats = WireStats::default();
        for &id in batch {
            let is_self = ctx
                .node(id)?
                .kind
                .as_reference()
                .is_some_and(|reference| reference.is_in(Namespace::SelfValue));
            if is_self {
                stats.consumers += Self::wire_reference(ctx, id)?;
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WiringConfig;
    use crate::test_support::FormFixture;

    #[test]
    fn self_reference_reads_enclosing_field_answer() {
        let mut fx = FormFixture::new();
        let field = fx.field(fx.step, "email");
        let validation = fx.form.add_function(field, "isEmail", Vec::new()).unwrap();
        let reference = fx.reference(validation, &["@self"]);
        let wired = fx.wire();

        let local = wired.pseudo(PseudoKind::AnswerLocal, fx.step, "email");
        let edge = wired.graph.edges_to(reference).next().unwrap();
        assert_eq!(edge.producer, local);
        assert_eq!(edge.metadata.reference, Some(Namespace::SelfValue));
        assert_eq!(edge.metadata.field_code.as_deref(), Some("email"));
    }

    #[test]
    fn self_reference_outside_field_is_skipped_by_default() {
        let mut fx = FormFixture::new();
        let reference = fx.reference(fx.step, &["@self"]);
        let wired = fx.wire();
        assert_eq!(wired.graph.edges_to(reference).count(), 0);
    }

    #[test]
    fn strict_mode_rejects_self_outside_field() {
        let mut fx = FormFixture::new();
        let reference = fx.reference(fx.step, &["@self"]);
        let config = WiringConfig {
            strict_self_references: true,
            ..WiringConfig::default()
        };
        let err = FormFixture::try_wire_form(fx.form.clone(), &config).unwrap_err();
        assert!(matches!(err, WiringError::SelfOutsideField { id } if id == reference));
    }

    #[test]
    fn nested_fields_resolve_to_the_innermost() {
        let mut fx = FormFixture::new();
        let outer = fx.field(fx.step, "address");
        let inner = fx.field(outer, "postcode");
        let reference = fx.reference(inner, &["@self", "trimmed"]);
        let wired = fx.wire();

        let postcode = wired.pseudo(PseudoKind::AnswerLocal, fx.step, "postcode");
        assert_eq!(wired.graph.producers_of(reference), vec![postcode]);
    }
}
