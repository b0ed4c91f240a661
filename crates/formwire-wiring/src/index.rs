//! Consumer index: references grouped by lookup key.
//!
//! Built once per module per step. Looking up a pseudo-node's consumers is
//! then a hash lookup, which makes consumer wiring linear in
//! references + pseudo-nodes instead of their product.

use std::collections::HashMap;

use smallvec::SmallVec;

use formwire_core::{Namespace, NodeId};

use crate::context::WiringContext;
use crate::error::WiringError;

/// Well-formed references of one namespace, grouped by lookup key.
#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    by_key: HashMap<String, SmallVec<[NodeId; 2]>>,
    len: usize,
}

impl ReferenceIndex {
    /// Indexes every reference of the current step in `namespace`.
    ///
    /// References too short to carry a key are handed to the context's
    /// malformed-reference policy and never enter the index.
    pub fn build(ctx: &WiringContext<'_>, namespace: Namespace) -> Result<Self, WiringError> {
        let mut index = ReferenceIndex::default();
        for (id, reference) in ctx.find_reference_nodes(namespace) {
            match reference.lookup_key(namespace) {
                Some(key) => index.insert(key, id),
                None => ctx.malformed_reference(id, reference)?,
            }
        }
        Ok(index)
    }

    pub fn insert(&mut self, key: &str, reference: NodeId) {
        self.by_key.entry(key.to_string()).or_default().push(reference);
        self.len += 1;
    }

    /// References keyed by `key`, in step order.
    pub fn get(&self, key: &str) -> &[NodeId] {
        self.by_key.get(key).map(|ids| ids.as_slice()).unwrap_or(&[])
    }

    /// Number of indexed references.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, reference: NodeId) -> bool {
        self.by_key.values().any(|ids| ids.contains(&reference))
    }
}
