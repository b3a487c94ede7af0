//! # Inspector Commands
//!
//! Every editor mutation is a command: a unit of reversible change carrying
//! exactly the data needed to apply, redo and undo itself without consulting
//! other history entries. Member edits store deep copies of the before and
//! after values addressed by a member chain; object deletion stores a
//! serialized prefab of the doomed subtree; duplication composes the
//! in-world clone pass with an existing-objects-creation record for its own
//! redo/undo.
//!
//! A command whose target object no longer exists at undo/redo time reports
//! `CommandError::TargetMissing` instead of silently doing nothing.

use crate::actor::Actor;
use crate::inspector::EditContext;
use crate::registry::chain::MemberChain;
use crate::registry::{member_flags, TypeRegistry};
use crate::serialization::{serialize_game_world_to_string, SerialError};
use crate::world::{GameWorld, WorldError};
use ember_shared::{ObjectId, Transform3D, TypeId};
use log::warn;
use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Errors reported by command entry points.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command target object {0} no longer exists")]
    TargetMissing(ObjectId),

    #[error("the command has not been applied yet")]
    NotApplied,

    #[error("the command records already-performed work and cannot be applied")]
    AlreadyApplied,

    #[error("member chain could not be resolved on object {0}")]
    ChainBroken(ObjectId),

    #[error("value of type '{0}' could not be copied")]
    CopyFailed(String),

    #[error(transparent)]
    World(#[from] WorldError),

    #[error(transparent)]
    Serial(#[from] SerialError),
}

/// A reversible unit of editor change.
pub trait InspectorCmd {
    fn apply(&mut self, ctx: &mut EditContext) -> Result<(), CommandError>;
    fn redo(&mut self, ctx: &mut EditContext) -> Result<(), CommandError>;
    fn undo(&mut self, ctx: &mut EditContext) -> Result<(), CommandError>;

    /// Short human-readable description, shown in notifications and menus.
    fn text(&self) -> String {
        "<command>".to_string()
    }
}

/// Copy hook for member changes whose write must go through a setter with
/// side effects (the actor transform updating children and physics).
pub type CustomCopyFn =
    fn(&mut EditContext, ObjectId, &dyn Any) -> Result<(), CommandError>;

fn set_actor_world_transform(
    ctx: &mut EditContext,
    id: ObjectId,
    value: &dyn Any,
) -> Result<(), CommandError> {
    let transform = value
        .downcast_ref::<Transform3D>()
        .ok_or_else(|| CommandError::CopyFailed("Transform3D".to_string()))?;
    ctx.world.set_transform_ex(id, *transform, true, true)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// CmdMemberChange
// ---------------------------------------------------------------------------

/// Changes one member of one object, storing deep copies of the before and
/// after values.
pub struct CmdMemberChange {
    object_id: ObjectId,
    chain: MemberChain,
    original_value: Box<dyn Any>,
    new_value: Box<dyn Any>,
    custom_copy: Option<CustomCopyFn>,
    label: String,
}

impl CmdMemberChange {
    pub fn new(
        lib: &TypeRegistry,
        object_id: ObjectId,
        chain: MemberChain,
        original_value: &dyn Any,
        new_value: &dyn Any,
        custom_copy: Option<CustomCopyFn>,
    ) -> Result<Self, CommandError> {
        let leaf = chain
            .leaf_type(lib)
            .ok_or(CommandError::ChainBroken(object_id))?;
        let clone_fn = leaf
            .clone_fn
            .clone()
            .ok_or_else(|| CommandError::CopyFailed(leaf.name.clone()))?;

        let original_value = clone_fn(original_value)
            .ok_or_else(|| CommandError::CopyFailed(leaf.name.clone()))?;
        let new_value =
            clone_fn(new_value).ok_or_else(|| CommandError::CopyFailed(leaf.name.clone()))?;

        let label = match chain.knots.last() {
            Some(knot) => format!("Change {}", knot.member.pretty_name),
            None => "Change Member".to_string(),
        };

        Ok(Self {
            object_id,
            chain,
            original_value,
            new_value,
            custom_copy,
            label,
        })
    }

    /// A member change addressed by member name on the object's own type.
    pub fn new_for_member(
        world: &GameWorld,
        object_id: ObjectId,
        member_name: &str,
        original_value: &dyn Any,
        new_value: &dyn Any,
    ) -> Result<Self, CommandError> {
        let lib = world.registry();
        let type_id = world
            .get_object(object_id)
            .ok_or(CommandError::TargetMissing(object_id))?
            .core()
            .type_id;
        let member = lib
            .find_member(type_id, member_name)
            .ok_or(CommandError::ChainBroken(object_id))?;

        Self::new(
            lib,
            object_id,
            MemberChain::from_member(member, None),
            original_value,
            new_value,
            None,
        )
    }

    /// A world-transform change for an actor. Apply/undo go through the
    /// transform setter so children and physics stay in sync.
    pub fn new_transform_change(
        world: &GameWorld,
        actor_id: ObjectId,
        original_transform: &Transform3D,
        new_transform: &Transform3D,
    ) -> Result<Self, CommandError> {
        let lib = world.registry();
        let type_id = world
            .get_object(actor_id)
            .ok_or(CommandError::TargetMissing(actor_id))?
            .core()
            .type_id;
        let member = lib
            .find_member(type_id, "logic_transform")
            .ok_or(CommandError::ChainBroken(actor_id))?;

        Self::new(
            lib,
            actor_id,
            MemberChain::from_member(member, None),
            original_transform,
            new_transform,
            Some(set_actor_world_transform),
        )
    }

    fn apply_value(&self, ctx: &mut EditContext, which_new: bool) -> Result<(), CommandError> {
        let value: &dyn Any = if which_new {
            self.new_value.as_ref()
        } else {
            self.original_value.as_ref()
        };

        if let Some(custom_copy) = self.custom_copy {
            if ctx.world.get_object(self.object_id).is_none() {
                return Err(CommandError::TargetMissing(self.object_id));
            }
            custom_copy(ctx, self.object_id, value)?;
        } else {
            let registry = ctx.world.registry_arc();
            let object = ctx
                .world
                .get_object_mut(self.object_id)
                .ok_or(CommandError::TargetMissing(self.object_id))?;
            if !self.chain.write_value(&registry, object.as_any_mut(), value) {
                return Err(CommandError::ChainBroken(self.object_id));
            }
        }

        if let Some(object) = ctx.world.get_object_mut(self.object_id) {
            object.on_member_changed();
            object.core_mut().make_dirty();
        }

        // Transform tools cache the selected object's state; bumping the
        // selection counter forces them to re-read it after an undo/redo.
        ctx.selection.bump_change_index();
        Ok(())
    }
}

impl InspectorCmd for CmdMemberChange {
    fn apply(&mut self, ctx: &mut EditContext) -> Result<(), CommandError> {
        self.apply_value(ctx, true)
    }

    fn redo(&mut self, ctx: &mut EditContext) -> Result<(), CommandError> {
        self.apply_value(ctx, true)
    }

    fn undo(&mut self, ctx: &mut EditContext) -> Result<(), CommandError> {
        self.apply_value(ctx, false)
    }

    fn text(&self) -> String {
        self.label.clone()
    }
}

// ---------------------------------------------------------------------------
// CmdObjectCreation
// ---------------------------------------------------------------------------

/// Creates one object of a registered type. Redo re-creates it with the
/// same id; undo deletes it.
pub struct CmdObjectCreation {
    object_type: TypeId,
    created_id: ObjectId,
}

impl CmdObjectCreation {
    pub fn new(object_type: TypeId) -> Self {
        Self {
            object_type,
            created_id: ObjectId::NONE,
        }
    }

    pub fn created_object_id(&self) -> ObjectId {
        self.created_id
    }
}

impl InspectorCmd for CmdObjectCreation {
    fn apply(&mut self, ctx: &mut EditContext) -> Result<(), CommandError> {
        let id = ctx
            .world
            .alloc_object(self.object_type, self.created_id, None)?;
        self.created_id = id;
        Ok(())
    }

    fn redo(&mut self, ctx: &mut EditContext) -> Result<(), CommandError> {
        self.apply(ctx)
    }

    fn undo(&mut self, ctx: &mut EditContext) -> Result<(), CommandError> {
        if self.created_id.is_null() {
            return Err(CommandError::NotApplied);
        }
        if ctx.world.get_object(self.created_id).is_none() {
            return Err(CommandError::TargetMissing(self.created_id));
        }
        ctx.world.object_delete(self.created_id);
        Ok(())
    }

    fn text(&self) -> String {
        "Create Object".to_string()
    }
}

// ---------------------------------------------------------------------------
// CmdObjectDeletion / CmdExistingObjectCreation
// ---------------------------------------------------------------------------

struct ParentAndChildren {
    parent: ObjectId,
    children: Vec<ObjectId>,
}

fn capture_hierarchy(
    world: &GameWorld,
    ids: &BTreeSet<ObjectId>,
) -> HashMap<ObjectId, ParentAndChildren> {
    ids.iter()
        .map(|id| {
            (
                *id,
                ParentAndChildren {
                    parent: world.get_parent_id(*id),
                    children: world.get_children_list(*id),
                },
            )
        })
        .collect()
}

fn restore_hierarchy(
    world: &mut GameWorld,
    hierarchy: &HashMap<ObjectId, ParentAndChildren>,
) {
    // Restoration may be partial while sibling commands in a compound have
    // not run yet, so individual failures are tolerated; the last command
    // to restore its objects completes the picture.
    for (id, links) in hierarchy {
        if links.parent.is_valid() {
            let _ = world.set_parent_of(*id, links.parent);
        }
        for child in &links.children {
            let _ = world.set_parent_of(*child, *id);
        }
    }
}

/// Deletes a set of objects. The whole doomed subtree is serialized up
/// front; undo re-instantiates it with the original ids and restores the
/// recorded parent/child links.
pub struct CmdObjectDeletion {
    deleted_ids: BTreeSet<ObjectId>,
    original_hierarchy: HashMap<ObjectId, ParentAndChildren>,
    prefab_json: String,
}

impl CmdObjectDeletion {
    pub fn new(world: &GameWorld, ids: BTreeSet<ObjectId>) -> Result<Self, CommandError> {
        let original_hierarchy = capture_hierarchy(world, &ids);
        let prefab = world.create_prefab(true, Some(&ids))?;
        let prefab_json = serialize_game_world_to_string(&prefab)?;

        Ok(Self {
            deleted_ids: ids,
            original_hierarchy,
            prefab_json,
        })
    }
}

impl InspectorCmd for CmdObjectDeletion {
    fn apply(&mut self, ctx: &mut EditContext) -> Result<(), CommandError> {
        for id in &self.deleted_ids {
            ctx.world.object_delete(*id);
        }
        Ok(())
    }

    fn redo(&mut self, ctx: &mut EditContext) -> Result<(), CommandError> {
        self.apply(ctx)
    }

    fn undo(&mut self, ctx: &mut EditContext) -> Result<(), CommandError> {
        ctx.world
            .instantiate_prefab_from_json(&self.prefab_json, false)?;
        restore_hierarchy(ctx.world, &self.original_hierarchy);
        Ok(())
    }

    fn text(&self) -> String {
        format!("Delete {} Object(s)", self.deleted_ids.len())
    }
}

/// Records objects that already exist (instantiated prefabs, finished
/// duplicates) so their creation becomes reversible. Apply is an error;
/// redo re-instantiates the recorded snapshot, undo deletes the objects.
pub struct CmdExistingObjectCreation {
    target_ids: BTreeSet<ObjectId>,
    original_hierarchy: HashMap<ObjectId, ParentAndChildren>,
    prefab_json: String,
}

impl CmdExistingObjectCreation {
    pub fn new(world: &GameWorld, ids: BTreeSet<ObjectId>) -> Result<Self, CommandError> {
        let original_hierarchy = capture_hierarchy(world, &ids);
        let prefab = world.create_prefab(true, Some(&ids))?;
        let prefab_json = serialize_game_world_to_string(&prefab)?;

        Ok(Self {
            target_ids: ids,
            original_hierarchy,
            prefab_json,
        })
    }
}

impl InspectorCmd for CmdExistingObjectCreation {
    fn apply(&mut self, _ctx: &mut EditContext) -> Result<(), CommandError> {
        // The objects were created by whoever recorded this command.
        Err(CommandError::AlreadyApplied)
    }

    fn redo(&mut self, ctx: &mut EditContext) -> Result<(), CommandError> {
        ctx.world
            .instantiate_prefab_from_json(&self.prefab_json, false)?;
        restore_hierarchy(ctx.world, &self.original_hierarchy);
        Ok(())
    }

    fn undo(&mut self, ctx: &mut EditContext) -> Result<(), CommandError> {
        for id in &self.target_ids {
            ctx.world.object_delete(*id);
        }
        Ok(())
    }

    fn text(&self) -> String {
        format!("Create {} Object(s)", self.target_ids.len())
    }
}

// ---------------------------------------------------------------------------
// CmdActorGrouping
// ---------------------------------------------------------------------------

/// Reparents a set of actors under a common parent. Objects whose current
/// parent is also in the set keep their parent, preserving the internal
/// hierarchy of the group.
pub struct CmdActorGrouping {
    parent_id: ObjectId,
    new_children_and_old_parents: HashMap<ObjectId, ObjectId>,
}

impl CmdActorGrouping {
    pub fn new(
        world: &GameWorld,
        parent_id: ObjectId,
        objects_to_group: BTreeSet<ObjectId>,
    ) -> Result<Self, CommandError> {
        let mut new_children_and_old_parents = HashMap::new();

        for id in &objects_to_group {
            if world.get_actor(*id).is_none() {
                return Err(CommandError::TargetMissing(*id));
            }
            let previous_parent = world.get_parent_id(*id);
            if !objects_to_group.contains(&previous_parent) {
                new_children_and_old_parents.insert(*id, previous_parent);
            }
        }

        Ok(Self {
            parent_id,
            new_children_and_old_parents,
        })
    }
}

impl InspectorCmd for CmdActorGrouping {
    fn apply(&mut self, ctx: &mut EditContext) -> Result<(), CommandError> {
        for child in self.new_children_and_old_parents.keys() {
            let _ = ctx.world.set_parent_of(*child, ObjectId::NONE);
            ctx.world.set_parent_of(*child, self.parent_id)?;
        }
        Ok(())
    }

    fn redo(&mut self, ctx: &mut EditContext) -> Result<(), CommandError> {
        self.apply(ctx)
    }

    fn undo(&mut self, ctx: &mut EditContext) -> Result<(), CommandError> {
        for (child, old_parent) in &self.new_children_and_old_parents {
            let _ = ctx.world.set_parent_of(*child, ObjectId::NONE);
            if old_parent.is_valid() {
                ctx.world.set_parent_of(*child, *old_parent)?;
            }
        }
        Ok(())
    }

    fn text(&self) -> String {
        "Group Objects".to_string()
    }
}

// ---------------------------------------------------------------------------
// CmdCompound
// ---------------------------------------------------------------------------

/// An ordered list of sub-commands applied as one history entry.
///
/// Apply and redo run in forward order, undo in reverse order. The reverse
/// order is a correctness requirement: later sub-commands may depend on
/// earlier ones having already run.
pub struct CmdCompound {
    label: String,
    cmds: Vec<Box<dyn InspectorCmd>>,
}

impl CmdCompound {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            cmds: Vec::new(),
        }
    }

    pub fn add_command(&mut self, cmd: Box<dyn InspectorCmd>) {
        self.cmds.push(cmd);
    }

    pub fn is_empty(&self) -> bool {
        self.cmds.is_empty()
    }
}

impl InspectorCmd for CmdCompound {
    fn apply(&mut self, ctx: &mut EditContext) -> Result<(), CommandError> {
        for cmd in &mut self.cmds {
            cmd.apply(ctx)?;
        }
        Ok(())
    }

    fn redo(&mut self, ctx: &mut EditContext) -> Result<(), CommandError> {
        for cmd in &mut self.cmds {
            cmd.redo(ctx)?;
        }
        Ok(())
    }

    fn undo(&mut self, ctx: &mut EditContext) -> Result<(), CommandError> {
        for cmd in self.cmds.iter_mut().rev() {
            cmd.undo(ctx)?;
        }
        Ok(())
    }

    fn text(&self) -> String {
        self.label.clone()
    }
}

// ---------------------------------------------------------------------------
// CmdDuplicateSpecial
// ---------------------------------------------------------------------------

/// Duplicates a set of objects and remaps every `ObjectId` reference that
/// points at another duplicated sibling to its duplicate, so the internal
/// relationships of the set survive while references to outside objects
/// stay untouched. Redo/undo are delegated to an existing-objects-creation
/// record captured right after the first apply.
pub struct CmdDuplicateSpecial {
    source_ids: BTreeSet<ObjectId>,
    created_ids: Vec<ObjectId>,
    helper: Option<CmdExistingObjectCreation>,
}

impl CmdDuplicateSpecial {
    pub fn new(source_ids: BTreeSet<ObjectId>) -> Self {
        Self {
            source_ids,
            created_ids: Vec::new(),
            helper: None,
        }
    }

    pub fn created_ids(&self) -> &[ObjectId] {
        &self.created_ids
    }
}

impl InspectorCmd for CmdDuplicateSpecial {
    fn apply(&mut self, ctx: &mut EditContext) -> Result<(), CommandError> {
        // Clone every source object, building the source→duplicate map.
        let mut dest_of: HashMap<ObjectId, ObjectId> = HashMap::new();
        let mut src_of: HashMap<ObjectId, ObjectId> = HashMap::new();
        self.created_ids.clear();

        for src_id in &self.source_ids {
            if ctx.world.get_object(*src_id).is_none() {
                return Err(CommandError::TargetMissing(*src_id));
            }
            let dest_id = ctx.world.duplicate_object(*src_id)?;
            self.created_ids.push(dest_id);
            dest_of.insert(*src_id, dest_id);
            src_of.insert(dest_id, *src_id);
        }

        // Remap references between duplicated siblings. References to
        // objects outside the duplicated set are left alone.
        for dest_id in &self.created_ids {
            ctx.world
                .remap_object_id_members(*dest_id, &dest_of, member_flags::NON_EDITABLE)?;
        }

        // Mirror the source hierarchy among the duplicates: a duplicate
        // whose source parent was also duplicated goes under that parent's
        // duplicate.
        for dest_id in &self.created_ids {
            if ctx.world.get_actor(*dest_id).is_none() {
                continue;
            }
            let src_id = src_of[dest_id];
            let source_parent = ctx.world.get_parent_id(src_id);
            if source_parent.is_null() {
                continue;
            }
            if let Some(parent_duplicate) = dest_of.get(&source_parent) {
                if let Err(err) = ctx.world.set_parent_of(*dest_id, *parent_duplicate) {
                    warn!("cannot re-parent duplicated object {dest_id}: {err}");
                }
            }
        }

        for dest_id in &self.created_ids {
            if let Some(object) = ctx.world.get_object_mut(*dest_id) {
                object.on_duplication_complete();
            }
        }

        self.helper = Some(CmdExistingObjectCreation::new(
            ctx.world,
            self.created_ids.iter().copied().collect(),
        )?);
        Ok(())
    }

    fn redo(&mut self, ctx: &mut EditContext) -> Result<(), CommandError> {
        self.helper
            .as_mut()
            .ok_or(CommandError::NotApplied)?
            .redo(ctx)
    }

    fn undo(&mut self, ctx: &mut EditContext) -> Result<(), CommandError> {
        self.helper
            .as_mut()
            .ok_or(CommandError::NotApplied)?
            .undo(ctx)
    }

    fn text(&self) -> String {
        format!("Duplicate {} Object(s)", self.source_ids.len())
    }
}

// ---------------------------------------------------------------------------
// Helpers used by tools
// ---------------------------------------------------------------------------

/// Convenience used by transform tools: records and applies a transform
/// change for an actor, reading the current transform as the "before" value.
pub fn change_actor_transform(
    inspector: &mut crate::inspector::GameInspector,
    actor_id: ObjectId,
    new_transform: Transform3D,
) -> Result<(), CommandError> {
    let original = *inspector
        .world
        .get_actor(actor_id)
        .ok_or(CommandError::TargetMissing(actor_id))
        .map(Actor::transform)?;

    let cmd =
        CmdMemberChange::new_transform_change(&inspector.world, actor_id, &original, &new_transform)?;
    inspector.append_command(Box::new(cmd), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspector::GameInspector;
    use crate::object::{GameObject, GameObjectCore};
    use crate::registry::{core_type_ids, TypeRegistry};
    use crate::register_engine_types;
    use ember_shared::{GameUpdateSets, Vector3};
    use std::sync::Arc;

    const TEST_ACTOR_ID: TypeId = TypeId(21_09_10_0001);

    #[derive(Default)]
    struct TestActor {
        actor: Actor,
        health: i32,
        linked: ObjectId,
        tags: Vec<String>,
    }

    impl GameObject for TestActor {
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

    fn register_test_actor(lib: &mut TypeRegistry) {
        lib.add_type::<TestActor>("TestActor", TEST_ACTOR_ID)
            .constructible::<TestActor>()
            .inherits::<TestActor, Actor>(core_type_ids::ACTOR, |t| &t.actor, |t| &mut t.actor)
            .member::<TestActor, i32>("health", |t| &t.health, |t| &mut t.health, 0)
            .member::<TestActor, ObjectId>("linked", |t| &t.linked, |t| &mut t.linked, 0)
            .member::<TestActor, Vec<String>>("tags", |t| &t.tags, |t| &mut t.tags, 0)
            .allocatable::<TestActor>("Test");
    }

    fn make_inspector() -> GameInspector {
        let mut lib = TypeRegistry::new();
        register_engine_types(&mut lib);
        register_test_actor(&mut lib);
        lib.perform_registration().unwrap();

        GameInspector::new(crate::world::GameWorld::new(Arc::new(lib)))
    }

    fn tick(inspector: &mut GameInspector) {
        inspector.update(&GameUpdateSets::paused_step());
    }

    fn position_of(inspector: &GameInspector, id: ObjectId) -> Vector3 {
        inspector.world.get_actor(id).unwrap().position()
    }

    #[test]
    fn member_change_apply_undo_redo() {
        let mut inspector = make_inspector();
        let id = inspector
            .world
            .alloc_object(TEST_ACTOR_ID, ObjectId::NONE, Some("TestActor"))
            .unwrap();
        tick(&mut inspector);

        assert_eq!(position_of(&inspector, id), Vector3::zero());

        change_actor_transform(
            &mut inspector,
            id,
            Transform3D::from_translation(Vector3::new(1.0, 0.0, 0.0)),
        )
        .unwrap();
        assert_eq!(position_of(&inspector, id), Vector3::new(1.0, 0.0, 0.0));

        assert!(inspector.undo_command().unwrap());
        assert_eq!(position_of(&inspector, id), Vector3::zero());

        assert!(inspector.redo_command().unwrap());
        assert_eq!(position_of(&inspector, id), Vector3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn plain_member_change_roundtrip() {
        let mut inspector = make_inspector();
        let id = inspector
            .world
            .alloc_object(TEST_ACTOR_ID, ObjectId::NONE, None)
            .unwrap();
        tick(&mut inspector);

        let cmd = CmdMemberChange::new_for_member(
            &inspector.world,
            id,
            "health",
            &0i32 as &dyn Any,
            &75i32 as &dyn Any,
        )
        .unwrap();
        inspector.append_command(Box::new(cmd), true).unwrap();

        let health = |inspector: &GameInspector| {
            inspector
                .world
                .get_object(id)
                .unwrap()
                .as_any()
                .downcast_ref::<TestActor>()
                .unwrap()
                .health
        };

        assert_eq!(health(&inspector), 75);
        inspector.undo_command().unwrap();
        assert_eq!(health(&inspector), 0);
        inspector.redo_command().unwrap();
        assert_eq!(health(&inspector), 75);
    }

    #[test]
    fn history_truncates_on_divergent_append() {
        let mut inspector = make_inspector();
        let id = inspector
            .world
            .alloc_object(TEST_ACTOR_ID, ObjectId::NONE, None)
            .unwrap();
        tick(&mut inspector);

        for x in 1..=3 {
            change_actor_transform(
                &mut inspector,
                id,
                Transform3D::from_translation(Vector3::new(x as f32, 0.0, 0.0)),
            )
            .unwrap();
        }
        assert_eq!(inspector.history_len(), 3);

        inspector.undo_command().unwrap();
        inspector.undo_command().unwrap();
        assert!(inspector.can_redo());

        change_actor_transform(
            &mut inspector,
            id,
            Transform3D::from_translation(Vector3::new(9.0, 0.0, 0.0)),
        )
        .unwrap();

        // The two undone commands are gone for good.
        assert_eq!(inspector.history_len(), 2);
        assert!(!inspector.can_redo());
        assert_eq!(position_of(&inspector, id), Vector3::new(9.0, 0.0, 0.0));
    }

    #[test]
    fn object_creation_undo_redo_keeps_the_id() {
        let mut inspector = make_inspector();

        let mut cmd = CmdObjectCreation::new(TEST_ACTOR_ID);
        {
            let mut ctx = EditContext {
                world: &mut inspector.world,
                selection: &mut inspector.selection,
            };
            cmd.apply(&mut ctx).unwrap();
        }
        let id = cmd.created_object_id();
        assert!(id.is_valid());
        inspector.append_command(Box::new(cmd), false).unwrap();
        tick(&mut inspector);
        assert!(inspector.world.get_object(id).is_some());

        inspector.undo_command().unwrap();
        tick(&mut inspector);
        assert!(inspector.world.get_object(id).is_none());

        inspector.redo_command().unwrap();
        tick(&mut inspector);
        assert!(inspector.world.get_object(id).is_some());
        assert_eq!(inspector.world.get_object(id).unwrap().id(), id);
    }

    #[test]
    fn deletion_undo_restores_objects_and_hierarchy() {
        let mut inspector = make_inspector();
        let parent = inspector
            .world
            .alloc_object(TEST_ACTOR_ID, ObjectId::NONE, Some("Parent"))
            .unwrap();
        let child = inspector
            .world
            .alloc_object(TEST_ACTOR_ID, ObjectId::NONE, Some("Child"))
            .unwrap();
        tick(&mut inspector);

        inspector.world.set_parent_of(child, parent).unwrap();

        let mut targets = BTreeSet::new();
        targets.insert(parent);
        targets.insert(child);
        let cmd = CmdObjectDeletion::new(&inspector.world, targets).unwrap();
        inspector.append_command(Box::new(cmd), true).unwrap();
        tick(&mut inspector);

        assert!(inspector.world.get_object(parent).is_none());
        assert!(inspector.world.get_object(child).is_none());
        assert!(inspector.world.get_children_of(parent).is_none());

        inspector.undo_command().unwrap();
        tick(&mut inspector);

        assert!(inspector.world.get_object(parent).is_some());
        assert!(inspector.world.get_object(child).is_some());
        assert_eq!(inspector.world.get_parent_id(child), parent);
    }

    #[test]
    fn duplicate_remaps_internal_references_only() {
        let mut inspector = make_inspector();
        let a = inspector
            .world
            .alloc_object(TEST_ACTOR_ID, ObjectId::NONE, Some("A"))
            .unwrap();
        let b = inspector
            .world
            .alloc_object(TEST_ACTOR_ID, ObjectId::NONE, Some("B"))
            .unwrap();
        tick(&mut inspector);

        // A references B.
        inspector
            .world
            .get_object_mut(a)
            .unwrap()
            .as_any_mut()
            .downcast_mut::<TestActor>()
            .unwrap()
            .linked = b;

        let linked_of = |inspector: &GameInspector, id: ObjectId| {
            inspector
                .world
                .get_object(id)
                .unwrap()
                .as_any()
                .downcast_ref::<TestActor>()
                .unwrap()
                .linked
        };

        // Duplicating both: the duplicate of A must point at the duplicate
        // of B.
        let mut both = BTreeSet::new();
        both.insert(a);
        both.insert(b);
        let mut cmd = CmdDuplicateSpecial::new(both);
        {
            let mut ctx = EditContext {
                world: &mut inspector.world,
                selection: &mut inspector.selection,
            };
            cmd.apply(&mut ctx).unwrap();
        }
        let created = cmd.created_ids().to_vec();
        assert_eq!(created.len(), 2);

        let a_dup = created
            .iter()
            .copied()
            .find(|id| linked_of(&inspector, *id).is_valid())
            .expect("one duplicate must carry the reference");
        let b_dup = created
            .iter()
            .copied()
            .find(|id| *id != a_dup)
            .unwrap();
        assert_eq!(linked_of(&inspector, a_dup), b_dup);

        // Duplicating A alone: the reference keeps pointing at the original
        // B.
        let mut only_a = BTreeSet::new();
        only_a.insert(a);
        let mut cmd = CmdDuplicateSpecial::new(only_a);
        {
            let mut ctx = EditContext {
                world: &mut inspector.world,
                selection: &mut inspector.selection,
            };
            cmd.apply(&mut ctx).unwrap();
        }
        let created = cmd.created_ids().to_vec();
        assert_eq!(created.len(), 1);
        assert_eq!(linked_of(&inspector, created[0]), b);
    }

    #[test]
    fn grouping_apply_and_undo() {
        let mut inspector = make_inspector();
        let parent = inspector
            .world
            .alloc_object(TEST_ACTOR_ID, ObjectId::NONE, None)
            .unwrap();
        let x = inspector
            .world
            .alloc_object(TEST_ACTOR_ID, ObjectId::NONE, None)
            .unwrap();
        let y = inspector
            .world
            .alloc_object(TEST_ACTOR_ID, ObjectId::NONE, None)
            .unwrap();
        tick(&mut inspector);

        // y starts under x; grouping both must preserve that inner link.
        inspector.world.set_parent_of(y, x).unwrap();

        let mut group = BTreeSet::new();
        group.insert(x);
        group.insert(y);
        let cmd = CmdActorGrouping::new(&inspector.world, parent, group).unwrap();
        inspector.append_command(Box::new(cmd), true).unwrap();

        assert_eq!(inspector.world.get_parent_id(x), parent);
        assert_eq!(inspector.world.get_parent_id(y), x);

        inspector.undo_command().unwrap();
        assert_eq!(inspector.world.get_parent_id(x), ObjectId::NONE);
        assert_eq!(inspector.world.get_parent_id(y), x);
    }

    #[test]
    fn compound_undo_runs_in_reverse_order() {
        let mut inspector = make_inspector();
        let id = inspector
            .world
            .alloc_object(TEST_ACTOR_ID, ObjectId::NONE, None)
            .unwrap();
        tick(&mut inspector);

        // Two dependent edits of the same member: 0 -> 10 -> 20. Undoing in
        // reverse order restores 0; forward order would leave 10.
        let first = CmdMemberChange::new_for_member(
            &inspector.world,
            id,
            "health",
            &0i32 as &dyn Any,
            &10i32 as &dyn Any,
        )
        .unwrap();
        let second = CmdMemberChange::new_for_member(
            &inspector.world,
            id,
            "health",
            &10i32 as &dyn Any,
            &20i32 as &dyn Any,
        )
        .unwrap();

        let mut compound = CmdCompound::new("Edit Health Twice");
        compound.add_command(Box::new(first));
        compound.add_command(Box::new(second));
        inspector.append_command(Box::new(compound), true).unwrap();

        let health = |inspector: &GameInspector| {
            inspector
                .world
                .get_object(id)
                .unwrap()
                .as_any()
                .downcast_ref::<TestActor>()
                .unwrap()
                .health
        };
        assert_eq!(health(&inspector), 20);

        inspector.undo_command().unwrap();
        assert_eq!(health(&inspector), 0);

        inspector.redo_command().unwrap();
        assert_eq!(health(&inspector), 20);
    }

    #[test]
    fn undo_on_empty_history_is_a_noop() {
        let mut inspector = make_inspector();
        assert!(!inspector.undo_command().unwrap());
        assert!(!inspector.redo_command().unwrap());
    }
}
