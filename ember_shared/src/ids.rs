//! # Identifiers
//!
//! Small integer id types used across the engine. Both reserve 0 as the
//! null/invalid value.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of a live object inside one `GameWorld`.
///
/// Ids are assigned sequentially by the owning world and are never reused
/// while that world is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub i32);

impl ObjectId {
    /// The null id, referring to no object.
    pub const NONE: ObjectId = ObjectId(0);

    pub fn new(id: i32) -> Self {
        ObjectId(id)
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a registered type in the reflection registry.
///
/// Ids are assigned manually; the convention is a date-based `yymmddnnnn`
/// number where `nnnn` counts the types registered on that day. They must be
/// unique within a process. 0 is reserved for "no type".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeId(pub i32);

impl TypeId {
    /// The null type id.
    pub const NONE: TypeId = TypeId(0);

    pub fn new(id: i32) -> Self {
        TypeId(id)
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_ids() {
        assert!(ObjectId::NONE.is_null());
        assert!(ObjectId::default().is_null());
        assert!(ObjectId::new(7).is_valid());
        assert!(TypeId::NONE.is_null());
        assert!(TypeId::new(21_07_11_0001).is_valid());
    }
}
