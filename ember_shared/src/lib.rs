//! # SharedModule
//!
//! Shared types used by every layer of the Ember engine core: object and
//! type identifiers, the math types the scene graph is built from, and the
//! lifecycle/update-tick definitions. Kept free of engine logic so that
//! tooling crates can depend on it without pulling in the world model.

pub mod ids;
pub mod lifecycle;
pub mod types;

// Re-export commonly used items for convenience
pub use ids::{ObjectId, TypeId};
pub use lifecycle::{GameUpdateSets, ObjectLifecycleState};
pub use types::{Box3, Quat, Transform3D, Vec2i, Vector3};
