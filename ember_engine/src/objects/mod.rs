//! # Built-in Object Types
//!
//! The object types the engine ships with. Games add their own the same
//! way: a struct embedding [`Actor`] (or just [`GameObjectCore`]), a
//! [`GameObject`] impl, and a registration hook contributing the type
//! descriptor.

use crate::actor::Actor;
use crate::object::{GameObject, GameObjectCore, ObjectTrait};
use crate::registry::{core_type_ids, TypeRegistry};
use crate::traits_camera::TraitCamera;
use ember_shared::{ObjectId, TypeId, Vector3};
use std::any::Any;
use std::collections::BTreeMap;

/// How a locator is drawn by editor tooling.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LocatorDisplayMode {
    Hidden,
    #[default]
    Marker,
    Axes,
}

/// A placeable marker object: a named point in space that other objects can
/// reference, with a handful of annotations for level-design bookkeeping.
#[derive(Default)]
pub struct LocatorActor {
    pub actor: Actor,
    pub marker_color: Vector3,
    pub display_mode: LocatorDisplayMode,

    /// Another object this locator points at (a spawn target, a camera
    /// anchor, ...). Remapped like any other object reference when the
    /// locator is duplicated or instantiated from a prefab.
    pub linked_object: ObjectId,

    pub tags: Vec<String>,
    pub notes: BTreeMap<String, String>,
}

impl GameObject for LocatorActor {
    fn core(&self) -> &GameObjectCore {
        &self.actor.core
    }

    fn core_mut(&mut self) -> &mut GameObjectCore {
        &mut self.actor.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn as_actor(&self) -> Option<&Actor> {
        Some(&self.actor)
    }

    fn as_actor_mut(&mut self) -> Option<&mut Actor> {
        Some(&mut self.actor)
    }
}

/// An actor that provides the gameplay camera.
#[derive(Default)]
pub struct CameraActor {
    pub actor: Actor,
    pub camera: TraitCamera,
}

impl GameObject for CameraActor {
    fn core(&self) -> &GameObjectCore {
        &self.actor.core
    }

    fn core_mut(&mut self) -> &mut GameObjectCore {
        &mut self.actor.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn as_actor(&self) -> Option<&Actor> {
        Some(&self.actor)
    }

    fn as_actor_mut(&mut self) -> Option<&mut Actor> {
        Some(&mut self.actor)
    }

    fn find_trait(&self, family: TypeId) -> Option<&dyn ObjectTrait> {
        if family == TraitCamera::FAMILY_ID {
            Some(&self.camera)
        } else {
            None
        }
    }

    fn find_trait_mut(&mut self, family: TypeId) -> Option<&mut dyn ObjectTrait> {
        if family == TraitCamera::FAMILY_ID {
            Some(&mut self.camera)
        } else {
            None
        }
    }
}

pub fn register_builtin_objects(lib: &mut TypeRegistry) {
    lib.add_type::<LocatorDisplayMode>("LocatorDisplayMode", core_type_ids::LOCATOR_DISPLAY_MODE)
        .constructible::<LocatorDisplayMode>()
        .copyable::<LocatorDisplayMode>()
        .comparable::<LocatorDisplayMode>()
        .enumeration::<LocatorDisplayMode, i32>(
            |mode| *mode as i64,
            |raw| match raw {
                0 => Some(LocatorDisplayMode::Hidden),
                1 => Some(LocatorDisplayMode::Marker),
                2 => Some(LocatorDisplayMode::Axes),
                _ => None,
            },
        )
        .enum_value(0, "Hidden")
        .enum_value(1, "Marker")
        .enum_value(2, "Axes");

    lib.add_type::<LocatorActor>("LocatorActor", core_type_ids::LOCATOR_ACTOR)
        .constructible::<LocatorActor>()
        .inherits::<LocatorActor, Actor>(core_type_ids::ACTOR, |o| &o.actor, |o| &mut o.actor)
        .member::<LocatorActor, Vector3>(
            "marker_color",
            |o| &o.marker_color,
            |o| &mut o.marker_color,
            crate::registry::member_flags::VEC3_AS_COLOR,
        )
        .member::<LocatorActor, LocatorDisplayMode>(
            "display_mode",
            |o| &o.display_mode,
            |o| &mut o.display_mode,
            0,
        )
        .member::<LocatorActor, ObjectId>(
            "linked_object",
            |o| &o.linked_object,
            |o| &mut o.linked_object,
            0,
        )
        .member::<LocatorActor, Vec<String>>("tags", |o| &o.tags, |o| &mut o.tags, 0)
        .member::<LocatorActor, BTreeMap<String, String>>(
            "notes",
            |o| &o.notes,
            |o| &mut o.notes,
            0,
        )
        .allocatable::<LocatorActor>("Utils");

    lib.add_type::<CameraActor>("CameraActor", core_type_ids::CAMERA_ACTOR)
        .constructible::<CameraActor>()
        .inherits::<CameraActor, Actor>(core_type_ids::ACTOR, |o| &o.actor, |o| &mut o.actor)
        .member::<CameraActor, TraitCamera>("camera", |o| &o.camera, |o| &mut o.camera, 0)
        .allocatable::<CameraActor>("Gameplay");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::get_trait;
    use crate::register_engine_types;
    use crate::world::GameWorld;
    use ember_shared::GameUpdateSets;
    use std::sync::Arc;

    fn make_world() -> GameWorld {
        let mut lib = TypeRegistry::new();
        register_engine_types(&mut lib);
        lib.perform_registration().unwrap();
        GameWorld::new(Arc::new(lib))
    }

    #[test]
    fn builtin_types_are_allocatable_game_objects() {
        let world = make_world();
        let lib = world.registry();
        assert!(lib.game_object_types().contains(&core_type_ids::LOCATOR_ACTOR));
        assert!(lib.game_object_types().contains(&core_type_ids::CAMERA_ACTOR));
        // The bases themselves are not allocatable.
        assert!(!lib.game_object_types().contains(&core_type_ids::ACTOR));
        assert!(!lib.game_object_types().contains(&core_type_ids::GAME_OBJECT));
    }

    #[test]
    fn camera_trait_lookup_and_provider_search() {
        let mut world = make_world();
        let locator = world
            .alloc_object(core_type_ids::LOCATOR_ACTOR, ObjectId::NONE, None)
            .unwrap();
        let camera = world
            .alloc_object(core_type_ids::CAMERA_ACTOR, ObjectId::NONE, None)
            .unwrap();
        world.update(&GameUpdateSets::paused_step());

        assert!(get_trait::<TraitCamera>(world.get_object(locator).unwrap()).is_none());
        assert!(get_trait::<TraitCamera>(world.get_object(camera).unwrap()).is_some());

        assert_eq!(world.find_camera_provider(), Some(camera));
        // The provider sticks once found.
        assert_eq!(world.camera_provider, camera);
    }

    #[test]
    fn default_display_names_use_the_type_name() {
        let mut world = make_world();
        let a = world
            .alloc_object(core_type_ids::LOCATOR_ACTOR, ObjectId::NONE, None)
            .unwrap();
        let b = world
            .alloc_object(core_type_ids::LOCATOR_ACTOR, ObjectId::NONE, None)
            .unwrap();

        let name_a = world.get_object(a).unwrap().display_name().to_string();
        let name_b = world.get_object(b).unwrap().display_name().to_string();
        assert!(name_a.starts_with("LocatorActor_"));
        assert!(name_b.starts_with("LocatorActor_"));
        assert_ne!(name_a, name_b);
    }
}
