//! Reference expressions and their namespaces.
//!
//! A reference reads a value through an ordered path such as
//! `["answers", "email"]` or `["data", "address", "postcode"]`. The first
//! segment selects the [`Namespace`]; for keyed namespaces the second segment
//! is the lookup key (field code, parameter name, data key).

use std::fmt;

use serde::{Deserialize, Serialize};

/// The namespace selected by the first segment of a reference path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Namespace {
    #[serde(rename = "answers")]
    Answers,
    #[serde(rename = "post")]
    Post,
    #[serde(rename = "query")]
    Query,
    #[serde(rename = "params")]
    Params,
    #[serde(rename = "data")]
    Data,
    /// The enclosing field's own answer.
    #[serde(rename = "@self")]
    SelfValue,
    /// The current collection item.
    #[serde(rename = "@item")]
    Item,
}

impl Namespace {
    pub const ALL: [Namespace; 7] = [
        Namespace::Answers,
        Namespace::Post,
        Namespace::Query,
        Namespace::Params,
        Namespace::Data,
        Namespace::SelfValue,
        Namespace::Item,
    ];

    /// The literal first path segment for this namespace.
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Answers => "answers",
            Namespace::Post => "post",
            Namespace::Query => "query",
            Namespace::Params => "params",
            Namespace::Data => "data",
            Namespace::SelfValue => "@self",
            Namespace::Item => "@item",
        }
    }

    /// Parses a first path segment.
    pub fn parse(segment: &str) -> Option<Namespace> {
        Namespace::ALL.into_iter().find(|ns| ns.as_str() == segment)
    }

    /// Keyed namespaces need a second path segment naming the lookup key.
    /// `@self` and `@item` are resolved structurally instead.
    pub fn is_keyed(&self) -> bool {
        !matches!(self, Namespace::SelfValue | Namespace::Item)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reference expression node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceNode {
    pub path: Vec<String>,
}

impl ReferenceNode {
    pub fn new<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ReferenceNode {
            path: path.into_iter().map(Into::into).collect(),
        }
    }

    /// The namespace named by the first segment, if it is a known one.
    pub fn namespace(&self) -> Option<Namespace> {
        self.path.first().and_then(|segment| Namespace::parse(segment))
    }

    /// Returns `true` if the first segment selects `namespace`, regardless of
    /// whether the path is long enough to carry a key.
    pub fn is_in(&self, namespace: Namespace) -> bool {
        self.path.first().map(String::as_str) == Some(namespace.as_str())
    }

    /// Returns the lookup key when the path is well-formed for `namespace`:
    /// first segment matches and there are at least two segments.
    pub fn lookup_key(&self, namespace: Namespace) -> Option<&str> {
        if !self.is_in(namespace) || self.path.len() < 2 {
            return None;
        }
        Some(self.path[1].as_str())
    }

    /// Path segments after the lookup key (nested property access).
    pub fn nested(&self) -> &[String] {
        self.path.get(2..).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_namespace() {
        for ns in Namespace::ALL {
            assert_eq!(Namespace::parse(ns.as_str()), Some(ns));
        }
        assert_eq!(Namespace::parse("unknown"), None);
    }

    #[test]
    fn lookup_key_requires_two_segments() {
        assert_eq!(ReferenceNode::new(Vec::<String>::new()).lookup_key(Namespace::Answers), None);
        assert_eq!(ReferenceNode::new(["answers"]).lookup_key(Namespace::Answers), None);
        assert_eq!(
            ReferenceNode::new(["answers", "email"]).lookup_key(Namespace::Answers),
            Some("email")
        );
    }

    #[test]
    fn lookup_key_requires_matching_namespace() {
        let reference = ReferenceNode::new(["data", "email"]);
        assert_eq!(reference.lookup_key(Namespace::Answers), None);
        assert_eq!(reference.lookup_key(Namespace::Data), Some("email"));
    }

    #[test]
    fn short_path_is_still_in_namespace() {
        let reference = ReferenceNode::new(["answers"]);
        assert!(reference.is_in(Namespace::Answers));
        assert_eq!(reference.namespace(), Some(Namespace::Answers));
    }

    #[test]
    fn nested_segments_follow_the_key() {
        let reference = ReferenceNode::new(["data", "address", "postcode"]);
        assert_eq!(reference.nested(), &["postcode".to_string()]);
        assert!(ReferenceNode::new(["data"]).nested().is_empty());
    }

    #[test]
    fn self_and_item_are_not_keyed() {
        assert!(Namespace::Answers.is_keyed());
        assert!(!Namespace::SelfValue.is_keyed());
        assert!(!Namespace::Item.is_keyed());
    }

    #[test]
    fn namespace_serializes_as_segment() {
        assert_eq!(serde_json::to_string(&Namespace::SelfValue).unwrap(), "\"@self\"");
        assert_eq!(serde_json::to_string(&Namespace::Answers).unwrap(), "\"answers\"");
    }
}
