//! # Object Model
//!
//! [`GameObject`] is the behavior contract every world-owned entity
//! implements; [`GameObjectCore`] is the identity block each concrete type
//! embeds (directly or through [`crate::actor::Actor`]): object id, type id,
//! display name, lifecycle state and the dirty counter the editor watches.
//!
//! Capabilities are attached as [`ObjectTrait`]s looked up by a family type
//! id; `find_trait` plus a downcast replaces RTTI-style casts.

use crate::registry::{core_type_ids, member_flags, TypeRegistry};
use ember_shared::{GameUpdateSets, ObjectId, ObjectLifecycleState, TypeId};
use std::any::Any;

/// The identity block embedded in every game object.
#[derive(Debug, Clone, Default)]
pub struct GameObjectCore {
    pub id: ObjectId,
    pub type_id: TypeId,
    pub display_name: String,
    pub state: ObjectLifecycleState,

    /// Bumped on every structural change; the editor uses it to refresh
    /// cached views of the object.
    dirty_index: u64,
}

impl GameObjectCore {
    /// Called by the world right after allocation. The id and type of a live
    /// object never change afterwards.
    pub(crate) fn initialize(&mut self, id: ObjectId, type_id: TypeId, display_name: String) {
        self.id = id;
        self.type_id = type_id;
        self.display_name = display_name;
        self.state = ObjectLifecycleState::AwaitingCreation;
    }

    pub fn dirty_index(&self) -> u64 {
        self.dirty_index
    }

    pub fn make_dirty(&mut self) {
        self.dirty_index += 1;
    }

    /// Display name plus id, for diagnostics; names are not unique.
    pub fn debug_display_name(&self) -> String {
        format!("{} (id {})", self.display_name, self.id)
    }
}

/// A composable capability attached to a game object, looked up by its
/// family type id rather than its concrete type.
pub trait ObjectTrait: Any {
    fn family(&self) -> TypeId;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Marker for trait types with a statically known family id.
pub trait TraitFamily {
    const FAMILY: TypeId;
}

/// The contract every world-owned entity implements.
///
/// The lifecycle hooks have empty defaults; concrete types override what
/// they need. `as_any`/`as_any_mut` expose the concrete value to the
/// reflection layer.
pub trait GameObject: Any {
    fn core(&self) -> &GameObjectCore;
    fn core_mut(&mut self) -> &mut GameObjectCore;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// The actor view of this object, when it has a spatial presence.
    fn as_actor(&self) -> Option<&crate::actor::Actor> {
        None
    }

    fn as_actor_mut(&mut self) -> Option<&mut crate::actor::Actor> {
        None
    }

    /// Looks up an attached trait by family id.
    fn find_trait(&self, _family: TypeId) -> Option<&dyn ObjectTrait> {
        None
    }

    fn find_trait_mut(&mut self, _family: TypeId) -> Option<&mut dyn ObjectTrait> {
        None
    }

    /// Called once, right after the world allocates the object.
    fn on_create(&mut self) {}

    /// Regular per-tick update. The object may read others but must only
    /// modify itself here; use `post_update` for manipulations other objects
    /// could observe mid-tick.
    fn update(&mut self, _update_sets: &GameUpdateSets) {}

    fn post_update(&mut self, _update_sets: &GameUpdateSets) {}

    /// Called when the object enters or leaves the playing set.
    fn on_play_state_changed(&mut self, _is_starting_to_play: bool) {}

    /// Called after a command or deserialization changed a member.
    fn on_member_changed(&mut self) {}

    /// Called on a freshly created duplicate once the duplication (including
    /// id remapping) has finished.
    fn on_duplication_complete(&mut self) {}
}

impl dyn GameObject {
    pub fn id(&self) -> ObjectId {
        self.core().id
    }

    pub fn type_id(&self) -> TypeId {
        self.core().type_id
    }

    pub fn display_name(&self) -> &str {
        &self.core().display_name
    }

    pub fn is_actor(&self) -> bool {
        self.as_actor().is_some()
    }
}

/// Typed trait lookup: `get_trait::<TraitCamera>(object)`.
pub fn get_trait<T: ObjectTrait + TraitFamily>(object: &dyn GameObject) -> Option<&T> {
    object
        .find_trait(T::FAMILY)
        .and_then(|t| t.as_any().downcast_ref::<T>())
}

pub fn get_trait_mut<T: ObjectTrait + TraitFamily>(object: &mut dyn GameObject) -> Option<&mut T> {
    object
        .find_trait_mut(T::FAMILY)
        .and_then(|t| t.as_any_mut().downcast_mut::<T>())
}

/// True for the display-name member of the shared identity block (own or
/// inherited). Duplication skips it so the duplicate can receive a freshly
/// generated name.
pub fn is_display_name_member(member: &crate::registry::MemberDesc) -> bool {
    member.name == "display_name"
        && (member.owner_type == core_type_ids::GAME_OBJECT
            || member.inherited_from == core_type_ids::GAME_OBJECT)
}

/// Registers the reflection data of the shared identity block. The id is
/// saveable but handled specially by object-level serialization, and neither
/// field is copied when instantiating prefabs with fresh ids.
pub fn register_game_object_type(lib: &mut TypeRegistry) {
    lib.add_type::<GameObjectCore>("GameObject", core_type_ids::GAME_OBJECT)
        .member::<GameObjectCore, ObjectId>("id", |c| &c.id, |c| &mut c.id, 0)
        .member_flag(member_flags::PREFAB_DONT_COPY)
        .member_flag(member_flags::NON_EDITABLE)
        .member::<GameObjectCore, String>(
            "display_name",
            |c| &c.display_name,
            |c| &mut c.display_name,
            0,
        )
        .member_flag(member_flags::PREFAB_DONT_COPY);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirty_counter_is_monotonic() {
        let mut core = GameObjectCore::default();
        let d0 = core.dirty_index();
        core.make_dirty();
        core.make_dirty();
        assert_eq!(core.dirty_index(), d0 + 2);
    }

    #[test]
    fn core_initialization() {
        let mut core = GameObjectCore::default();
        core.initialize(ObjectId(5), TypeId(77), "Thing_0".into());
        assert_eq!(core.id, ObjectId(5));
        assert_eq!(core.state, ObjectLifecycleState::AwaitingCreation);
        assert!(core.debug_display_name().contains("Thing_0"));
    }
}
