//! # Actor
//!
//! The spatial base every placeable object embeds: a world transform, the
//! binding transform that ties it to its parent in the hierarchy, and a
//! local bounding box for selection/tools.
//!
//! Transform changes go through the world (`GameWorld::set_transform_ex`)
//! because they propagate to children and to the physics backend; the
//! methods here only touch the actor's own stored state.

use crate::object::GameObjectCore;
use crate::registry::{core_type_ids, member_flags, TypeRegistry};
use ember_shared::{Box3, Transform3D, Vector3};

/// The spatial state embedded in every placeable object.
#[derive(Debug, Clone, Default)]
pub struct Actor {
    pub core: GameObjectCore,

    /// The actor's world transform.
    pub logic_transform: Transform3D,

    /// The actor's transform relative to its parent, captured at reparent
    /// time and reapplied whenever the parent moves.
    pub binding_to_parent_transform: Transform3D,

    /// When set, the actor only inherits the parent's scaled translation,
    /// not its rotation.
    pub binding_ignore_rotation: bool,

    /// Local-space bounds, maintained by the concrete type.
    pub local_bounds: Box3,
}

impl Actor {
    pub fn transform(&self) -> &Transform3D {
        &self.logic_transform
    }

    pub fn position(&self) -> Vector3 {
        self.logic_transform.translation
    }

    /// Directly stores a new world transform without any propagation.
    /// World code uses this; everyone else should go through
    /// `GameWorld::set_transform`.
    pub(crate) fn store_transform(&mut self, transform: Transform3D) {
        self.logic_transform = transform;
        self.core.make_dirty();
    }
}

/// True for the actor's world-transform member (own or inherited). Writes
/// to it must go through `GameWorld::set_transform` so children and the
/// physics backend stay in sync, which is why serialization and duplication
/// special-case it.
pub fn is_actor_transform_member(member: &crate::registry::MemberDesc) -> bool {
    member.name == "logic_transform"
        && (member.owner_type == core_type_ids::ACTOR
            || member.inherited_from == core_type_ids::ACTOR)
}

/// Registers the actor base type. Concrete actor types inherit it, which
/// pulls the identity members and the transform members into their own
/// descriptors.
pub fn register_actor_type(lib: &mut TypeRegistry) {
    lib.add_type::<Actor>("Actor", core_type_ids::ACTOR)
        .inherits::<Actor, GameObjectCore>(
            core_type_ids::GAME_OBJECT,
            |a| &a.core,
            |a| &mut a.core,
        )
        .member::<Actor, Transform3D>(
            "logic_transform",
            |a| &a.logic_transform,
            |a| &mut a.logic_transform,
            0,
        )
        .member::<Actor, Transform3D>(
            "binding_to_parent_transform",
            |a| &a.binding_to_parent_transform,
            |a| &mut a.binding_to_parent_transform,
            member_flags::NON_EDITABLE,
        )
        .member::<Actor, bool>(
            "binding_ignore_rotation",
            |a| &a.binding_ignore_rotation,
            |a| &mut a.binding_ignore_rotation,
            0,
        );
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_shared::Quat;

    #[test]
    fn store_transform_marks_dirty() {
        let mut actor = Actor::default();
        let before = actor.core.dirty_index();
        actor.store_transform(Transform3D::new(
            Vector3::new(1.0, 2.0, 3.0),
            Quat::identity(),
            Vector3::one(),
        ));
        assert_eq!(actor.position(), Vector3::new(1.0, 2.0, 3.0));
        assert!(actor.core.dirty_index() > before);
    }
}
