//! # Ember Engine Core
//!
//! The data backbone of the Ember editor and runtime:
//!
//! - [`registry`]: a runtime reflection registry. Types are described by
//!   [`registry::TypeDesc`] records holding accessor-based member lists,
//!   capability blocks (construct/clone/assign/compare) and collection
//!   traits, with inheritance flattened into each descriptor during a
//!   one-time registration pass.
//! - [`registry::chain`]: [`registry::chain::MemberChain`], a typed path
//!   from a root object to any reachable field, crossing nested structs and
//!   collection indices.
//! - [`serialization`]: a generic JSON (de)serializer that walks descriptors
//!   and live values, plus the scene/prefab file format.
//! - [`object`], [`actor`], [`world`]: the object model with identity, lifecycle,
//!   parent/child hierarchy and prefab instantiation with id remapping.
//! - [`inspector`]: the editor-facing selection state and the command-based
//!   undo/redo engine.
//!
//! The registry is explicitly constructed and passed around; build one with
//! [`TypeRegistry::new`], add the engine types with [`register_engine_types`],
//! append game types, then call `perform_registration` exactly once before
//! any lookup.

pub mod actor;
pub mod inspector;
pub mod object;
pub mod physics;
pub mod registry;
pub mod serialization;
pub mod traits_camera;
pub mod world;

pub mod objects;

pub use actor::Actor;
pub use inspector::commands::{CommandError, InspectorCmd};
pub use inspector::{EditContext, GameInspector, SelectionState};
pub use object::{GameObject, GameObjectCore, ObjectTrait};
pub use registry::chain::MemberChain;
pub use registry::{MemberDesc, RegistryError, TypeDesc, TypeRegistry};
pub use serialization::SerialError;
pub use world::{GameWorld, WorldError};

/// Registers every type the engine core ships with: primitives, math types,
/// the object/actor bases, the built-in object types and trait families.
///
/// Call this on a fresh registry before adding game types and before
/// `perform_registration`.
pub fn register_engine_types(lib: &mut TypeRegistry) {
    registry::register_primitive_types(lib);
    object::register_game_object_type(lib);
    actor::register_actor_type(lib);
    traits_camera::register_trait_camera_types(lib);
    objects::register_builtin_objects(lib);
}
