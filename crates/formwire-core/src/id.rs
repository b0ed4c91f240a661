//! Stable ID newtypes for form entities.
//!
//! Both IDs are distinct newtype wrappers over `u32`, so a `NodeId` cannot be
//! accidentally used where an `EdgeId` is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable node identifier, unique within one compiled form (and, for request
/// overlays, above the form's id watermark).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Stable dependency-edge identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub u32);

// Display implementations -- just print the inner value.

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
