//! # Game World
//!
//! [`GameWorld`] owns every allocated game object, maintains their lifetime
//! (allocate → awaiting creation → playing → deferred kill), the
//! parent/child hierarchy, and prefab instantiation with object-id
//! remapping. It also carries the scene-level settings that are persisted
//! with the world file (lighting, grid, gravity).
//!
//! The world is stepped once per frame with [`GameWorld::update`], even when
//! paused: newly allocated objects are promoted into the playing set at the
//! start of the tick, and deletion requests buffered by
//! [`GameWorld::object_delete`] are processed right after, so a deleted id
//! stops resolving exactly one tick after the request.

use crate::actor::{is_actor_transform_member, Actor};
use crate::object::{is_display_name_member, GameObject};
use crate::physics::{ManifoldBook, PhysicsBackend};
use crate::registry::chain::MemberChain;
use crate::registry::{core_type_ids, member_flags, TypeRegistry};
use crate::serialization::{
    self, deserialize_object, serialize_object, SerialError,
};
use crate::traits_camera::TraitCamera;
use ember_shared::{
    GameUpdateSets, ObjectId, ObjectLifecycleState, Transform3D, TypeId, Vec2i, Vector3,
};
use log::{error, warn};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors reported by world entry points.
#[derive(Debug, Error)]
pub enum WorldError {
    #[error("object id {0} is already in use")]
    IdTaken(ObjectId),

    #[error("type {0} is not registered")]
    UnknownType(TypeId),

    #[error("type '{0}' is not an allocatable game object")]
    TypeNotAllocatable(String),

    #[error("type {0} does not inherit Actor")]
    NotAnActorType(TypeId),

    #[error("no object with id {0}")]
    NoSuchObject(ObjectId),

    #[error("object {0} is not an actor")]
    NotAnActor(ObjectId),

    #[error("parenting {child} under {parent} would create a hierarchy cycle")]
    HierarchyCycle { child: ObjectId, parent: ObjectId },
}

/// A world operation queued to run after the current update tick.
pub enum PostSceneTask {
    LoadWorldFromFile(PathBuf),
    SetWorldState { json: String },
}

/// The container of all live game objects and their shared scene state.
pub struct GameWorld {
    registry: Arc<TypeRegistry>,

    objects: HashMap<ObjectId, Box<dyn GameObject>>,

    /// Ids allocated since the last tick; promoted to playing on the next.
    awaiting_creation: Vec<ObjectId>,

    /// Playing ids grouped by concrete type for typed iteration.
    playing_by_type: BTreeMap<TypeId, Vec<ObjectId>>,

    /// Deletion requests buffered until the next tick.
    pending_kill: BTreeSet<ObjectId>,

    // The hierarchy maps are kept consistent with each other: a child has at
    // most one parent and appears in exactly that parent's child set.
    children_of: HashMap<ObjectId, BTreeSet<ObjectId>>,
    parent_of: HashMap<ObjectId, ObjectId>,

    next_object_id: i32,
    next_name_index: i32,

    pub total_steps_taken: i32,
    pub time_spent_playing: f32,

    /// The object providing the gameplay camera, if any.
    pub camera_provider: ObjectId,

    // Scene settings persisted with the world file.
    pub ambient_light: Vector3,
    pub rim_light: Vector3,
    pub rim_cosine_width: f32,
    pub sky_color_bottom: Vector3,
    pub sky_color_top: Vector3,
    pub grid_should_draw: bool,
    pub grid_num_segments: Vec2i,
    pub grid_segments_spacing: f32,
    pub default_gravity: Vector3,
    pub physics_sim_num_sub_steps: i32,

    /// The file this world was loaded from / saved to, if any.
    pub working_file_path: Option<PathBuf>,

    physics: Option<Box<dyn PhysicsBackend>>,
    pub manifolds: ManifoldBook,

    post_scene_tasks: Vec<PostSceneTask>,
}

impl GameWorld {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            objects: HashMap::new(),
            awaiting_creation: Vec::new(),
            playing_by_type: BTreeMap::new(),
            pending_kill: BTreeSet::new(),
            children_of: HashMap::new(),
            parent_of: HashMap::new(),
            next_object_id: 1,
            next_name_index: 0,
            total_steps_taken: 0,
            time_spent_playing: 0.0,
            camera_provider: ObjectId::NONE,
            ambient_light: Vector3::splat(0.25),
            rim_light: Vector3::splat(0.1),
            rim_cosine_width: 0.3,
            sky_color_bottom: Vector3::splat(0.419),
            sky_color_top: Vector3::splat(0.133),
            grid_should_draw: true,
            grid_num_segments: Vec2i::splat(10),
            grid_segments_spacing: 1.0,
            default_gravity: Vector3::new(0.0, -10.0, 0.0),
            physics_sim_num_sub_steps: 3,
            working_file_path: None,
            physics: None,
            manifolds: ManifoldBook::default(),
            post_scene_tasks: Vec::new(),
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn registry_arc(&self) -> Arc<TypeRegistry> {
        self.registry.clone()
    }

    pub fn set_physics_backend(&mut self, backend: Box<dyn PhysicsBackend>) {
        self.physics = Some(backend);
        if let Some(backend) = &mut self.physics {
            backend.set_gravity(self.default_gravity);
        }
    }

    pub fn set_default_gravity(&mut self, gravity: Vector3) {
        self.default_gravity = gravity;
        if let Some(backend) = &mut self.physics {
            backend.set_gravity(gravity);
        }
    }

    /// Destroys every object and resets the scene state to its defaults.
    pub fn clear(&mut self) {
        let playing: Vec<ObjectId> = self.playing_object_ids(false);
        for id in playing {
            if let Some(object) = self.objects.get_mut(&id) {
                object.on_play_state_changed(false);
            }
        }

        self.objects.clear();
        self.awaiting_creation.clear();
        self.playing_by_type.clear();
        self.pending_kill.clear();
        self.children_of.clear();
        self.parent_of.clear();
        self.post_scene_tasks.clear();
        self.manifolds.clear();

        self.next_object_id = 1;
        self.next_name_index = 0;
        self.total_steps_taken = 0;
        self.time_spent_playing = 0.0;

        self.camera_provider = ObjectId::NONE;
        self.ambient_light = Vector3::splat(0.25);
        self.rim_light = Vector3::splat(0.1);
        self.rim_cosine_width = 0.3;
        self.sky_color_bottom = Vector3::splat(0.419);
        self.sky_color_top = Vector3::splat(0.133);
        self.grid_should_draw = true;
        self.grid_num_segments = Vec2i::splat(10);
        self.grid_segments_spacing = 1.0;
        self.default_gravity = Vector3::new(0.0, -10.0, 0.0);
        self.physics_sim_num_sub_steps = 3;
        self.working_file_path = None;
    }

    /// Hands out a fresh object id, unique for this world's lifetime.
    pub fn get_new_id(&mut self) -> ObjectId {
        let id = ObjectId(self.next_object_id);
        self.next_object_id += 1;
        id
    }

    pub fn is_id_taken(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub(crate) fn next_object_id_raw(&self) -> i32 {
        self.next_object_id
    }

    pub(crate) fn set_next_object_id_raw(&mut self, next: i32) {
        self.next_object_id = next.max(self.next_object_id);
    }

    pub(crate) fn next_name_index_raw(&self) -> i32 {
        self.next_name_index
    }

    pub(crate) fn set_next_name_index_raw(&mut self, next: i32) {
        self.next_name_index = next;
    }

    /// Used for giving objects unique-ish names; duplicate names are still
    /// allowed.
    pub fn get_next_name_index(&mut self) -> i32 {
        let index = self.next_name_index;
        self.next_name_index += 1;
        index
    }

    /// Creates a new object of the registered type. With a valid
    /// `specific_id` the object gets exactly that id (rejected when taken);
    /// otherwise a fresh id is assigned. The object joins the
    /// awaiting-creation set and starts playing on the next tick.
    pub fn alloc_object(
        &mut self,
        type_id: TypeId,
        specific_id: ObjectId,
        name: Option<&str>,
    ) -> Result<ObjectId, WorldError> {
        if specific_id.is_valid() && self.is_id_taken(specific_id) {
            return Err(WorldError::IdTaken(specific_id));
        }

        let registry = self.registry.clone();
        let td = registry
            .find(type_id)
            .ok_or(WorldError::UnknownType(type_id))?;

        let inherits_object = registry.does_inherit(type_id, core_type_ids::GAME_OBJECT);
        let Some(object_desc) = td.game_object.as_ref().filter(|_| inherits_object) else {
            return Err(WorldError::TypeNotAllocatable(td.name.clone()));
        };

        let mut object = (object_desc.alloc)();

        let id = if specific_id.is_valid() {
            // Keep the id counter ahead of explicitly placed ids so later
            // fresh allocations cannot collide.
            self.next_object_id = self.next_object_id.max(specific_id.0 + 1);
            specific_id
        } else {
            self.get_new_id()
        };

        let display_name = match name {
            Some(name) => name.to_string(),
            None => format!("{}_{}", td.name, self.get_next_name_index()),
        };

        object.core_mut().initialize(id, type_id, display_name);
        object.on_create();

        self.objects.insert(id, object);
        self.awaiting_creation.push(id);
        Ok(id)
    }

    /// Type-checked allocation of an actor type.
    pub fn alloc_actor(
        &mut self,
        type_id: TypeId,
        specific_id: ObjectId,
        name: Option<&str>,
    ) -> Result<ObjectId, WorldError> {
        if !self.registry.does_inherit(type_id, core_type_ids::ACTOR) {
            return Err(WorldError::NotAnActorType(type_id));
        }
        self.alloc_object(type_id, specific_id, name)
    }

    /// Requests permanent deletion. The object survives until the start of
    /// the next tick, where it is deselected, unparented and destroyed.
    pub fn object_delete(&mut self, id: ObjectId) {
        self.pending_kill.insert(id);
    }

    pub fn get_object(&self, id: ObjectId) -> Option<&dyn GameObject> {
        self.objects.get(&id).map(|b| b.as_ref())
    }

    pub fn get_object_mut(&mut self, id: ObjectId) -> Option<&mut dyn GameObject> {
        match self.objects.get_mut(&id) {
            Some(b) => Some(b.as_mut()),
            None => None,
        }
    }

    /// The actor view of the object, when it exists and is an actor.
    pub fn get_actor(&self, id: ObjectId) -> Option<&Actor> {
        self.get_object(id).and_then(|o| o.as_actor())
    }

    pub fn get_actor_mut(&mut self, id: ObjectId) -> Option<&mut Actor> {
        self.get_object_mut(id).and_then(|o| o.as_actor_mut())
    }

    /// The first object with the given display name, searching playing
    /// objects first, then the awaiting-creation set.
    pub fn get_object_id_by_name(&self, name: &str) -> Option<ObjectId> {
        for id in self.playing_object_ids(true) {
            if let Some(object) = self.get_object(id) {
                if object.display_name() == name {
                    return Some(id);
                }
            }
        }
        None
    }

    pub fn get_actor_id_by_name(&self, name: &str) -> Option<ObjectId> {
        self.get_object_id_by_name(name)
            .filter(|id| self.get_actor(*id).is_some())
    }

    /// A snapshot of all playing object ids, grouped by type in type-id
    /// order; optionally including objects still awaiting creation.
    pub fn playing_object_ids(&self, include_awaiting: bool) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self
            .playing_by_type
            .values()
            .flat_map(|list| list.iter().copied())
            .collect();
        if include_awaiting {
            ids.extend(self.awaiting_creation.iter().copied());
        }
        ids
    }

    /// The playing objects of one concrete type, in creation order.
    pub fn objects_of_type(&self, type_id: TypeId) -> Option<&[ObjectId]> {
        self.playing_by_type.get(&type_id).map(Vec::as_slice)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Steps the world: promotes awaiting objects, processes deferred
    /// deletions, steps physics and updates every playing object. Returns
    /// the ids destroyed this tick so the caller (the inspector) can drop
    /// them from its selection.
    pub fn update(&mut self, update_sets: &GameUpdateSets) -> Vec<ObjectId> {
        // Promote objects allocated since the last tick.
        let awaiting = std::mem::take(&mut self.awaiting_creation);
        for id in awaiting {
            let Some(object) = self.objects.get_mut(&id) else {
                continue;
            };
            object.core_mut().state = ObjectLifecycleState::Playing;
            let type_id = object.core().type_id;
            object.on_play_state_changed(true);
            self.playing_by_type.entry(type_id).or_default().push(id);
        }

        // Process deferred deletions. Runs after promotion, so an object
        // deleted on the tick it would have been promoted still passes
        // through the playing set.
        let destroyed = self.process_pending_kills();

        // Physics.
        if update_sets.is_playing() {
            if let Some(backend) = &mut self.physics {
                let num_sub_steps = self.physics_sim_num_sub_steps.max(1);
                let manifolds = backend.step_simulation(update_sets.dt, num_sub_steps);
                self.manifolds.rebuild(manifolds);
            }
        } else if let Some(backend) = &mut self.physics {
            backend.refresh_queries();
        }

        // Update, then post-update, every playing object.
        let playing = self.playing_object_ids(false);
        for id in &playing {
            if let Some(object) = self.objects.get_mut(id) {
                object.update(update_sets);
            }
        }
        for id in &playing {
            if let Some(object) = self.objects.get_mut(id) {
                object.post_update(update_sets);
            }
        }

        if update_sets.is_playing() {
            self.time_spent_playing += update_sets.dt;
        }
        self.total_steps_taken += 1;

        // Deferred world-level operations (level switches and similar).
        let tasks = std::mem::take(&mut self.post_scene_tasks);
        for task in tasks {
            match task {
                PostSceneTask::LoadWorldFromFile(path) => {
                    if let Err(err) = serialization::load_game_world_from_file(self, &path) {
                        error!("post-scene world load of '{}' failed: {err}", path.display());
                    }
                }
                PostSceneTask::SetWorldState { json } => {
                    if let Err(err) = serialization::load_game_world_from_str(self, &json) {
                        error!("post-scene world state change failed: {err}");
                    }
                }
            }
        }

        destroyed
    }

    fn process_pending_kills(&mut self) -> Vec<ObjectId> {
        let kill_ids: Vec<ObjectId> = std::mem::take(&mut self.pending_kill).into_iter().collect();
        let mut destroyed = Vec::new();

        for id in kill_ids {
            if !self.objects.contains_key(&id) {
                continue;
            }

            if let Some(object) = self.objects.get_mut(&id) {
                object.core_mut().state = ObjectLifecycleState::PendingKill;
                object.on_play_state_changed(false);
            }

            // Unparent the object and orphan its children so nothing keeps
            // referring to the dead id through the hierarchy.
            let is_actor = self.get_actor(id).is_some();
            if is_actor {
                let _ = self.set_parent_of(id, ObjectId::NONE);
                for child in self.get_children_list(id) {
                    let _ = self.set_parent_of(child, ObjectId::NONE);
                }
            }
            self.scrub_hierarchy(id);

            if let Some(object) = self.objects.get(&id) {
                let type_id = object.core().type_id;
                if let Some(list) = self.playing_by_type.get_mut(&type_id) {
                    list.retain(|x| *x != id);
                    if list.is_empty() {
                        self.playing_by_type.remove(&type_id);
                    }
                }
            }
            self.awaiting_creation.retain(|x| *x != id);

            if let Some(mut object) = self.objects.remove(&id) {
                object.core_mut().state = ObjectLifecycleState::Destroyed;
            }

            self.manifolds.remove_body(id);
            if let Some(backend) = &mut self.physics {
                backend.on_object_destroyed(id);
            }

            destroyed.push(id);
        }

        destroyed
    }

    /// Removes every hierarchy-map trace of `id`.
    fn scrub_hierarchy(&mut self, id: ObjectId) {
        if let Some(parent) = self.parent_of.remove(&id) {
            if let Some(children) = self.children_of.get_mut(&parent) {
                children.remove(&id);
                if children.is_empty() {
                    self.children_of.remove(&parent);
                }
            }
        }
        if let Some(children) = self.children_of.remove(&id) {
            for child in children {
                self.parent_of.remove(&child);
            }
        }
    }

    pub fn add_post_scene_task(&mut self, task: PostSceneTask) {
        self.post_scene_tasks.push(task);
    }

    pub fn add_post_scene_task_load_world_from_file(&mut self, path: impl Into<PathBuf>) {
        self.post_scene_tasks
            .push(PostSceneTask::LoadWorldFromFile(path.into()));
    }

    /// Makes `new_parent` the parent of `child`.
    ///
    /// Fails when the parenting would create a cycle (the new parent is the
    /// child or one of its descendants) or when either actor is missing.
    /// Passing a null parent unparents the child. On success the child's
    /// binding-to-parent transform is recomputed so its visual position is
    /// preserved.
    pub fn set_parent_of(&mut self, child: ObjectId, new_parent: ObjectId) -> Result<(), WorldError> {
        if child == new_parent {
            return Err(WorldError::HierarchyCycle {
                child,
                parent: new_parent,
            });
        }

        if new_parent.is_valid() {
            let mut descendants = BTreeSet::new();
            self.get_all_children(&mut descendants, child);
            if descendants.contains(&new_parent) {
                return Err(WorldError::HierarchyCycle {
                    child,
                    parent: new_parent,
                });
            }
        }

        if self.get_actor(child).is_none() {
            return Err(WorldError::NoSuchObject(child));
        }

        // Detach from the current parent, if any.
        if let Some(old_parent) = self.parent_of.remove(&child) {
            if let Some(children) = self.children_of.get_mut(&old_parent) {
                children.remove(&child);
                if children.is_empty() {
                    self.children_of.remove(&old_parent);
                }
            }
        }

        if new_parent.is_null() {
            if let Some(actor) = self.get_actor_mut(child) {
                actor.binding_to_parent_transform = Transform3D::identity();
            }
            return Ok(());
        }

        let Some(parent_actor) = self.get_actor(new_parent) else {
            return Err(WorldError::NoSuchObject(new_parent));
        };
        let parent_transform = *parent_actor.transform();

        self.parent_of.insert(child, new_parent);
        self.children_of.entry(new_parent).or_default().insert(child);

        if let Some(child_actor) = self.get_actor_mut(child) {
            let binding = child_actor
                .transform()
                .compute_binding_transform(&parent_transform);
            child_actor.binding_to_parent_transform = binding;
        }

        Ok(())
    }

    pub fn get_parent_id(&self, child: ObjectId) -> ObjectId {
        self.parent_of.get(&child).copied().unwrap_or(ObjectId::NONE)
    }

    /// Walks up the hierarchy to the topmost ancestor; null when the object
    /// has no parent.
    pub fn get_root_parent_id(&self, mut child: ObjectId) -> ObjectId {
        let mut root = ObjectId::NONE;
        loop {
            let parent = self.get_parent_id(child);
            if parent.is_null() {
                return root;
            }
            root = parent;
            child = parent;
        }
    }

    pub fn get_children_of(&self, parent: ObjectId) -> Option<&BTreeSet<ObjectId>> {
        self.children_of.get(&parent)
    }

    pub fn get_children_list(&self, parent: ObjectId) -> Vec<ObjectId> {
        self.children_of
            .get(&parent)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Appends all descendants of `parent` to `result`.
    pub fn get_all_children(&self, result: &mut BTreeSet<ObjectId>, parent: ObjectId) {
        let Some(children) = self.children_of.get(&parent) else {
            return;
        };
        for child in children {
            result.insert(*child);
            self.get_all_children(result, *child);
        }
    }

    /// Appends all ancestors of `id` to `result`.
    pub fn get_all_parents(&self, result: &mut BTreeSet<ObjectId>, mut id: ObjectId) {
        loop {
            id = self.get_parent_id(id);
            if id.is_null() {
                return;
            }
            result.insert(id);
        }
    }

    /// Appends every object connected to `id` through the hierarchy (its
    /// root ancestor and that root's whole subtree), excluding `id` itself
    /// unless it was already present.
    pub fn get_all_relatives_of(&self, result: &mut BTreeSet<ObjectId>, id: ObjectId) {
        let had_initial = result.contains(&id);

        let root = self.get_root_parent_id(id);
        let top = if root.is_null() { id } else { root };

        self.get_all_children(result, top);
        result.insert(top);

        if !had_initial {
            result.remove(&id);
        }
    }

    /// Sets an actor's world transform, propagating to the physics backend
    /// and to every child through its binding transform.
    pub fn set_transform(
        &mut self,
        id: ObjectId,
        transform: Transform3D,
        kill_velocity: bool,
    ) -> Result<(), WorldError> {
        self.set_transform_ex(id, transform, kill_velocity, false)
    }

    /// Sets an actor's transform relative to its parent.
    pub fn set_local_transform(
        &mut self,
        id: ObjectId,
        local: Transform3D,
        kill_velocity: bool,
    ) -> Result<(), WorldError> {
        let parent = self.get_parent_id(id);
        let world_transform = match self.get_actor(parent) {
            Some(parent_actor) => parent_actor.transform().combine(&local),
            None => local,
        };
        self.set_transform_ex(id, world_transform, kill_velocity, true)
    }

    pub fn set_transform_ex(
        &mut self,
        id: ObjectId,
        new_transform: Transform3D,
        kill_velocity: bool,
        recompute_binding: bool,
    ) -> Result<(), WorldError> {
        {
            let actor = self
                .get_actor_mut(id)
                .ok_or(WorldError::NotAnActor(id))?;
            actor.store_transform(new_transform);
        }

        if let Some(backend) = &mut self.physics {
            backend.on_actor_transformed(id, &new_transform, kill_velocity);
        }

        if recompute_binding {
            let parent = self.get_parent_id(id);
            if let Some(parent_transform) = self.get_actor(parent).map(|a| *a.transform()) {
                // A zero parent scale would make the binding unrecoverable,
                // so it is left untouched in that case.
                if !parent_transform.scale.has_any_zero_component(1e-6) {
                    let binding = new_transform.compute_binding_transform(&parent_transform);
                    if let Some(actor) = self.get_actor_mut(id) {
                        actor.binding_to_parent_transform = binding;
                    }
                }
            }
        }

        for child_id in self.get_children_list(id) {
            let Some(child) = self.get_actor(child_id) else {
                continue;
            };
            let child_world = if child.binding_ignore_rotation {
                let mut t = *child.transform();
                t.translation = new_transform.translation
                    + child
                        .binding_to_parent_transform
                        .translation
                        .mul_comp(&new_transform.scale);
                t
            } else {
                Transform3D::apply_binding_transform(
                    &child.binding_to_parent_transform,
                    &new_transform,
                )
            };
            self.set_transform_ex(child_id, child_world, kill_velocity, recompute_binding)?;
        }

        Ok(())
    }

    /// The object currently providing the gameplay camera: the recorded
    /// provider when it still has a camera trait, otherwise the first
    /// playing object that does (which then becomes the provider).
    pub fn find_camera_provider(&mut self) -> Option<ObjectId> {
        if self.camera_provider.is_valid() {
            if let Some(object) = self.get_object(self.camera_provider) {
                if object.find_trait(TraitCamera::FAMILY_ID).is_some() {
                    return Some(self.camera_provider);
                }
            }
        }

        let found = self.playing_object_ids(false).into_iter().find(|id| {
            self.get_object(*id)
                .map_or(false, |o| o.find_trait(TraitCamera::FAMILY_ID).is_some())
        });

        if let Some(id) = found {
            self.camera_provider = id;
        }
        found
    }

    /// Clones an object in place: same type, member-wise copy of every
    /// editable member, fresh id and a generated display name. References to
    /// other objects are left pointing at the originals; the duplicate
    /// command remaps them afterwards.
    ///
    /// `on_duplication_complete` is NOT called here; the caller finishes the
    /// duplication once remapping is done.
    pub fn duplicate_object(&mut self, src_id: ObjectId) -> Result<ObjectId, WorldError> {
        let registry = self.registry.clone();

        let (type_id, src_name) = {
            let src = self
                .get_object(src_id)
                .ok_or(WorldError::NoSuchObject(src_id))?;
            (src.core().type_id, src.display_name().to_string())
        };
        let td = registry
            .find(type_id)
            .ok_or(WorldError::UnknownType(type_id))?;

        let display_name = self.generate_duplicate_name(&src_name);
        let dest_id = self.alloc_object(type_id, ObjectId::NONE, Some(&display_name))?;

        let mut copies: Vec<(MemberChain, Box<dyn Any>)> = Vec::new();
        let mut transform: Option<Transform3D> = None;
        {
            let src = self
                .get_object(src_id)
                .ok_or(WorldError::NoSuchObject(src_id))?;
            let src_any = src.as_any();

            for member in &td.members {
                if !member.is_editable() || is_display_name_member(member) {
                    continue;
                }

                let chain = MemberChain::from_member(member, None);
                if is_actor_transform_member(member) {
                    if let Some(value) = chain.read_value(&registry, src_any) {
                        if let Ok(tf) = value.downcast::<Transform3D>() {
                            transform = Some(*tf);
                        }
                    }
                    continue;
                }

                match chain.read_value(&registry, src_any) {
                    Some(value) => copies.push((chain, value)),
                    None => warn!(
                        "cannot duplicate member '{}::{}': not readable",
                        td.name, member.name
                    ),
                }
            }
        }

        {
            let dest = self
                .get_object_mut(dest_id)
                .ok_or(WorldError::NoSuchObject(dest_id))?;
            let dest_any = dest.as_any_mut();
            for (chain, value) in &copies {
                if !chain.write_value(&registry, &mut *dest_any, value.as_ref()) {
                    warn!("failed to copy a member while duplicating object {src_id}");
                }
            }
        }

        if let Some(tf) = transform {
            self.set_transform(dest_id, tf, true)?;
        }

        Ok(dest_id)
    }

    /// `"Wall_3"` duplicated becomes `"Wall_<next index>"`: a trailing
    /// `_<digits>` suffix is stripped before probing for an unused name.
    fn generate_duplicate_name(&mut self, source_name: &str) -> String {
        let mut base = source_name.to_string();
        if let Some(pos) = base.rfind('_') {
            let suffix = &base[pos + 1..];
            if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) {
                base.truncate(pos);
            }
        }

        for _ in 0..1000 {
            let candidate = format!("{}_{}", base, self.get_next_name_index());
            if self.get_object_id_by_name(&candidate).is_none() {
                return candidate;
            }
        }
        format!("{base}_cpy")
    }

    /// Rewrites every reachable `ObjectId`-typed field of the object through
    /// `map`. Members with any of `skip_flags` set are left untouched.
    pub fn remap_object_id_members(
        &mut self,
        id: ObjectId,
        map: &HashMap<ObjectId, ObjectId>,
        skip_flags: u32,
    ) -> Result<(), WorldError> {
        let registry = self.registry.clone();

        let type_id = self
            .get_object(id)
            .ok_or(WorldError::NoSuchObject(id))?
            .core()
            .type_id;
        let td = registry
            .find(type_id)
            .ok_or(WorldError::UnknownType(type_id))?;

        // First find every chain addressing an ObjectId, then rewrite them;
        // the two phases keep the borrows simple.
        let mut chains: Vec<MemberChain> = Vec::new();
        {
            let object = self.get_object(id).ok_or(WorldError::NoSuchObject(id))?;
            let any = object.as_any();
            for member in &td.members {
                if member.flags & skip_flags != 0 {
                    continue;
                }
                let mut chain = MemberChain::new();
                if !chain.add(&registry, member, None) {
                    continue;
                }
                chain.for_each_member(&registry, any, &mut |c| {
                    if c.leaf_type_id(&registry) == Some(core_type_ids::OBJECT_ID) {
                        chains.push(c.clone());
                    }
                });
            }
        }

        let object = self.get_object_mut(id).ok_or(WorldError::NoSuchObject(id))?;
        let any = object.as_any_mut();
        for chain in &chains {
            let Some(slot) = chain.follow_mut(&registry, &mut *any) else {
                continue;
            };
            if let Some(reference) = slot.downcast_mut::<ObjectId>() {
                if let Some(new_id) = map.get(reference) {
                    *reference = *new_id;
                }
            }
        }

        Ok(())
    }

    /// Builds a standalone prefab world from (a subset of) this world's
    /// objects, preserving their hierarchy. With `keep_original_ids` the
    /// prefab objects keep this world's ids.
    pub fn create_prefab(
        &self,
        keep_original_ids: bool,
        subset: Option<&BTreeSet<ObjectId>>,
    ) -> Result<GameWorld, SerialError> {
        let mut prefab = GameWorld::new(self.registry.clone());
        prefab.instantiate_prefab_from(self, !keep_original_ids, subset)?;
        Ok(prefab)
    }

    /// Instantiates (a subset of) another world's objects into this one.
    ///
    /// Every object is serialized and deserialized back with either its
    /// original or a fresh id; afterwards each `ObjectId`-typed field of the
    /// new objects is rewritten through the old-id→new-id map, and the
    /// parent/child relations of the source are re-established between the
    /// new objects. This is the shared mechanism behind duplication, prefab
    /// files and undo of deletions.
    pub fn instantiate_prefab_from(
        &mut self,
        prefab: &GameWorld,
        generate_new_ids: bool,
        subset: Option<&BTreeSet<ObjectId>>,
    ) -> Result<Vec<ObjectId>, SerialError> {
        let mut created: Vec<ObjectId> = Vec::new();
        let mut old_to_new: HashMap<ObjectId, ObjectId> = HashMap::new();
        let mut old_parent_of: HashMap<ObjectId, ObjectId> = HashMap::new();

        for prefab_id in prefab.playing_object_ids(true) {
            if let Some(subset) = subset {
                if !subset.contains(&prefab_id) {
                    continue;
                }
            }

            let Some(prefab_object) = prefab.get_object(prefab_id) else {
                continue;
            };

            let value = serialize_object(self.registry.as_ref(), prefab_object)?;
            let result = deserialize_object(self, &value, generate_new_ids)?;

            old_to_new.insert(result.original_id, result.id);
            old_parent_of.insert(result.id, prefab.get_parent_id(result.original_id));
            created.push(result.id);
        }

        // Rewrite object references among the instantiated set.
        for id in &created {
            if let Err(err) =
                self.remap_object_id_members(*id, &old_to_new, member_flags::PREFAB_DONT_COPY)
            {
                warn!("prefab id remap failed for object {id}: {err}");
            }
        }

        // Re-establish the hierarchy between the instantiated objects.
        for id in &created {
            let Some(original_parent) = old_parent_of.get(id) else {
                continue;
            };
            if original_parent.is_null() {
                continue;
            }
            if let Some(new_parent) = old_to_new.get(original_parent) {
                if let Err(err) = self.set_parent_of(*id, *new_parent) {
                    warn!("prefab hierarchy restore failed for object {id}: {err}");
                }
            }
        }

        Ok(created)
    }

    /// The hierarchy as (parent, children) pairs in parent-id order, for
    /// serialization.
    pub fn hierarchy_pairs(&self) -> Vec<(ObjectId, Vec<ObjectId>)> {
        let mut pairs: Vec<(ObjectId, Vec<ObjectId>)> = self
            .children_of
            .iter()
            .map(|(parent, children)| (*parent, children.iter().copied().collect()))
            .collect();
        pairs.sort_by_key(|(parent, _)| *parent);
        pairs
    }

    /// Writes a parent/child link straight into the hierarchy maps, without
    /// touching binding transforms. Only world loading uses this: the
    /// binding transforms were serialized with the actors and must not be
    /// recomputed.
    pub(crate) fn insert_hierarchy_link(&mut self, parent: ObjectId, child: ObjectId) {
        self.children_of.entry(parent).or_default().insert(child);
        self.parent_of.insert(child, parent);
    }

    /// Instantiates a serialized prefab/world JSON document into this world.
    pub fn instantiate_prefab_from_json(
        &mut self,
        json: &str,
        generate_new_ids: bool,
    ) -> Result<Vec<ObjectId>, SerialError> {
        let mut prefab = GameWorld::new(self.registry.clone());
        serialization::load_game_world_from_str(&mut prefab, json)?;
        self.instantiate_prefab_from(&prefab, generate_new_ids, None)
    }

    /// Instantiates a prefab/world file into this world.
    pub fn instantiate_prefab_from_file(
        &mut self,
        path: impl AsRef<std::path::Path>,
        generate_new_ids: bool,
    ) -> Result<Vec<ObjectId>, SerialError> {
        let mut prefab = GameWorld::new(self.registry.clone());
        serialization::load_game_world_from_file(&mut prefab, path)?;
        self.instantiate_prefab_from(&prefab, generate_new_ids, None)
    }
}
