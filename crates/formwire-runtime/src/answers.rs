//! Per-request answer mutation history.
//!
//! [`AnswerHistory`] records every value an answer takes during a request,
//! tagged with the producer that supplied it. [`producer_roles`] classifies
//! the wired producers of an answer pseudo-node into the same categories so
//! they can be replayed in precedence order.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use formwire_core::edge::property;
use formwire_core::{DependencyEdge, NodeId};

/// Which kind of producer supplied an answer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    /// A load-transition effect.
    Load,
    /// The field's default value expression.
    Default,
    /// The submitted (post) value.
    Post,
    /// The `i`th formatter of the field.
    Formatter(usize),
    /// An action effect that sets the answer directly.
    Action,
}

impl AnswerSource {
    /// Classifies a producer edge by its `property` metadata.
    pub fn from_property(property: &str) -> Option<AnswerSource> {
        match property {
            property::ON_LOAD => Some(AnswerSource::Load),
            property::DEFAULT_VALUE => Some(AnswerSource::Default),
            property::POST => Some(AnswerSource::Post),
            other => property::parse_formatter(other).map(AnswerSource::Formatter),
        }
    }
}

/// One recorded value of an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    pub source: AnswerSource,
    pub value: serde_json::Value,
}

/// A position in an [`AnswerHistory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Checkpoint(usize);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    code: String,
    mutation: Mutation,
}

/// Ordered log of answer mutations for one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnswerHistory {
    log: Vec<Entry>,
    /// Field code to positions in `log`.
    by_code: IndexMap<String, Vec<usize>>,
}

impl AnswerHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a mutation of `code`.
    pub fn record(&mut self, code: &str, source: AnswerSource, value: serde_json::Value) {
        let position = self.log.len();
        self.log.push(Entry {
            code: code.to_string(),
            mutation: Mutation { source, value },
        });
        self.by_code.entry(code.to_string()).or_default().push(position);
    }

    /// Records a default only if `code` has no value yet. Returns whether it
    /// was applied.
    pub fn apply_default(&mut self, code: &str, value: serde_json::Value) -> bool {
        if self.current(code).is_some() {
            return false;
        }
        self.record(code, AnswerSource::Default, value);
        true
    }

    /// The latest value of `code`.
    pub fn current(&self, code: &str) -> Option<&serde_json::Value> {
        self.last(code).map(|mutation| &mutation.value)
    }

    /// The producer that supplied the latest value of `code`.
    pub fn source_of(&self, code: &str) -> Option<AnswerSource> {
        self.last(code).map(|mutation| mutation.source)
    }

    /// Every mutation of `code`, oldest first.
    pub fn mutations(&self, code: &str) -> Vec<&Mutation> {
        self.by_code
            .get(code)
            .map(|positions| positions.iter().map(|&i| &self.log[i].mutation).collect())
            .unwrap_or_default()
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.log.len())
    }

    /// Mutations recorded after `checkpoint`, in order, with their codes.
    pub fn delta_since(&self, checkpoint: Checkpoint) -> Vec<(&str, &Mutation)> {
        self.log
            .get(checkpoint.0..)
            .unwrap_or_default()
            .iter()
            .map(|entry| (entry.code.as_str(), &entry.mutation))
            .collect()
    }

    /// Number of recorded mutations.
    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    fn last(&self, code: &str) -> Option<&Mutation> {
        let &position = self.by_code.get(code)?.last()?;
        Some(&self.log[position].mutation)
    }
}

/// Classifies the producer edges of an answer pseudo-node and sorts them
/// into replay order: load, default, post, then formatters by index.
///
/// Edges without a recognized `property` are left out.
pub fn producer_roles<'a>(
    edges: impl IntoIterator<Item = &'a DependencyEdge>,
) -> Vec<(AnswerSource, NodeId)> {
    let mut roles: Vec<(AnswerSource, NodeId)> = edges
        .into_iter()
        .filter_map(|edge| {
            let source = AnswerSource::from_property(edge.metadata.property.as_deref()?)?;
            Some((source, edge.producer))
        })
        .collect();
    roles.sort_by_key(|&(source, _)| source);
    roles
}
