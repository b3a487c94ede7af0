//! # Generic Serialization
//!
//! JSON (de)serialization of arbitrary registered values, driven purely by
//! [`TypeDesc`] records. The dispatch order is fixed and mirrored exactly
//! between the two directions:
//!
//! 1. primitive scalars (bool, the integer widths, floats, String),
//! 2. the spatial transform, with identity sub-fields omitted,
//! 3. enums, as their underlying integer,
//! 4. vector-like types, as an ordered array,
//! 5. map-like types, as an array of `{key, value}` pairs (keys need not be
//!    strings, so a JSON object cannot hold them),
//! 6. anything else is treated as a struct of its registered members.
//!
//! On top of that sit the object record format (`type`/`id`/`members`) and
//! the world document (settings, hierarchy, actors) described in the module
//! functions below.
//!
//! Loading is tolerant of missing members and missing optional world keys
//! (the in-memory value is kept); a member that is present but fails to
//! apply aborts that object's load. Earlier members stay applied in that
//! case, so callers must discard the object; `deserialize_object` does
//! exactly that by deleting the half-built object.

use crate::actor::is_actor_transform_member;
use crate::object::GameObject;
use crate::registry::{core_type_ids, member_flags, MemberAccess, TypeDesc, TypeRegistry};
use crate::world::{GameWorld, WorldError};
use ember_shared::{GameUpdateSets, ObjectId, Quat, Transform3D, TypeId, Vector3};
use log::{error, warn};
use serde_json::{json, Map, Value};
use std::any::Any;
use std::path::Path;

/// Version written into world documents.
pub const SCENE_FORMAT_VERSION: i32 = 1;

/// Errors reported by serialization entry points.
#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("missing required key '{0}'")]
    MissingKey(&'static str),

    #[error("no registered type is named '{0}'")]
    UnknownTypeName(String),

    #[error("type {0} is not registered")]
    UnknownType(TypeId),

    #[error("value does not match type '{0}'")]
    ValueMismatch(String),

    #[error("type '{0}' has no serializable shape")]
    UnsupportedType(String),

    #[error("member '{0}' failed to deserialize")]
    MemberFailed(String),

    #[error(transparent)]
    World(#[from] WorldError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn as_i64_lossy(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_u64().map(|u| u as i64))
        .or_else(|| value.as_f64().map(|f| f as i64))
}

fn as_f64_lossy(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_i64().map(|i| i as f64))
        .or_else(|| value.as_u64().map(|u| u as f64))
}

fn mismatch(td: &TypeDesc) -> SerialError {
    SerialError::ValueMismatch(td.name.clone())
}

/// Serializes one value of the described type into a JSON tree. The value
/// is never mutated.
pub fn serialize_value(
    lib: &TypeRegistry,
    td: &TypeDesc,
    value: &dyn Any,
) -> Result<Value, SerialError> {
    use core_type_ids as ids;

    // Primitive scalars.
    if td.type_id == ids::BOOL {
        return Ok(json!(value.downcast_ref::<bool>().ok_or_else(|| mismatch(td))?));
    }
    if td.type_id == ids::I32 {
        return Ok(json!(value.downcast_ref::<i32>().ok_or_else(|| mismatch(td))?));
    }
    if td.type_id == ids::U32 {
        return Ok(json!(value.downcast_ref::<u32>().ok_or_else(|| mismatch(td))?));
    }
    if td.type_id == ids::I64 {
        return Ok(json!(value.downcast_ref::<i64>().ok_or_else(|| mismatch(td))?));
    }
    if td.type_id == ids::U64 {
        return Ok(json!(value.downcast_ref::<u64>().ok_or_else(|| mismatch(td))?));
    }
    if td.type_id == ids::F32 {
        return Ok(json!(value.downcast_ref::<f32>().ok_or_else(|| mismatch(td))?));
    }
    if td.type_id == ids::F64 {
        return Ok(json!(value.downcast_ref::<f64>().ok_or_else(|| mismatch(td))?));
    }
    if td.type_id == ids::STRING {
        return Ok(json!(value.downcast_ref::<String>().ok_or_else(|| mismatch(td))?));
    }

    // The spatial transform. Rotation and scale are identity for most
    // objects and every object carries at least two transforms, so default
    // sub-fields are omitted to keep scene files small.
    if td.type_id == ids::TRANSFORM3D {
        let transform = value
            .downcast_ref::<Transform3D>()
            .ok_or_else(|| mismatch(td))?;
        let vec3_td = lib
            .find(ids::VECTOR3)
            .ok_or(SerialError::UnknownType(ids::VECTOR3))?;
        let quat_td = lib
            .find(ids::QUAT)
            .ok_or(SerialError::UnknownType(ids::QUAT))?;

        let mut out = Map::new();
        if transform.translation != Vector3::zero() {
            out.insert(
                "p".to_string(),
                serialize_value(lib, vec3_td, &transform.translation)?,
            );
        }
        if transform.rotation != Quat::identity() {
            out.insert(
                "r".to_string(),
                serialize_value(lib, quat_td, &transform.rotation)?,
            );
        }
        if transform.scale != Vector3::one() {
            out.insert(
                "s".to_string(),
                serialize_value(lib, vec3_td, &transform.scale)?,
            );
        }
        return Ok(Value::Object(out));
    }

    // Enums serialize as their underlying integer.
    if let Some(traits) = &td.enum_traits {
        let raw = (traits.to_underlying)(value).ok_or_else(|| mismatch(td))?;
        return Ok(json!(raw));
    }

    // Vector-like types serialize as an ordered array.
    if let Some(traits) = &td.vector_traits {
        let element_td = lib
            .find(traits.element_type)
            .ok_or(SerialError::UnknownType(traits.element_type))?;

        let len = (traits.len)(value);
        let mut out = Vec::with_capacity(len);
        for index in 0..len {
            let element = (traits.get)(value, index).ok_or_else(|| mismatch(td))?;
            out.push(serialize_value(lib, element_td, element)?);
        }
        return Ok(Value::Array(out));
    }

    // Map-like types serialize as an array of {key, value} pairs; keys may
    // not be strings, so a JSON object cannot represent them.
    if let Some(traits) = &td.map_traits {
        let key_td = lib
            .find(traits.key_type)
            .ok_or(SerialError::UnknownType(traits.key_type))?;
        let value_td = lib
            .find(traits.value_type)
            .ok_or(SerialError::UnknownType(traits.value_type))?;

        let len = (traits.len)(value);
        let mut out = Vec::with_capacity(len);
        for index in 0..len {
            let (key, entry_value) =
                (traits.get_nth_pair)(value, index).ok_or_else(|| mismatch(td))?;
            let mut pair = Map::new();
            pair.insert(
                "key".to_string(),
                serialize_value(lib, key_td, key.as_ref())?,
            );
            pair.insert(
                "value".to_string(),
                serialize_value(lib, value_td, entry_value.as_ref())?,
            );
            out.push(Value::Object(pair));
        }
        return Ok(Value::Array(out));
    }

    // Anything else must be a struct with registered members.
    if td.members.is_empty() {
        error!("type '{}' has no serializable shape", td.name);
        return Err(SerialError::UnsupportedType(td.name.clone()));
    }

    let mut out = Map::new();
    for member in &td.members {
        if !member.is_saveable() {
            continue;
        }

        let Some(member_td) = lib.find(member.type_id) else {
            error!("member '{}::{}' has no type descriptor", td.name, member.name);
            continue;
        };

        let serialized = match &member.access {
            MemberAccess::Direct { get, .. } => match get(value) {
                Some(field) => serialize_value(lib, member_td, field),
                None => Err(mismatch(td)),
            },
            MemberAccess::Virtual { read, .. } => match read(value) {
                Some(staged) => serialize_value(lib, member_td, staged.as_ref()),
                None => Err(mismatch(td)),
            },
        };

        match serialized {
            Ok(json_value) => {
                out.insert(member.name.clone(), json_value);
            }
            Err(err) => {
                error!("failed to serialize member '{}::{}': {err}", td.name, member.name);
            }
        }
    }

    Ok(Value::Object(out))
}

/// Deserializes a JSON tree into an existing value of the described type.
///
/// Missing struct members are left at their current value. A member that is
/// present but fails aborts the call; members applied before the failure
/// stay applied.
pub fn deserialize_value(
    lib: &TypeRegistry,
    dest: &mut dyn Any,
    json: &Value,
    td: &TypeDesc,
) -> Result<(), SerialError> {
    use core_type_ids as ids;

    // Primitive scalars; numeric conversions are best-effort static casts.
    if td.type_id == ids::BOOL {
        let v = json.as_bool().ok_or_else(|| mismatch(td))?;
        *dest.downcast_mut::<bool>().ok_or_else(|| mismatch(td))? = v;
        return Ok(());
    }
    if td.type_id == ids::I32 {
        let v = as_i64_lossy(json).ok_or_else(|| mismatch(td))?;
        *dest.downcast_mut::<i32>().ok_or_else(|| mismatch(td))? = v as i32;
        return Ok(());
    }
    if td.type_id == ids::U32 {
        let v = as_i64_lossy(json).ok_or_else(|| mismatch(td))?;
        *dest.downcast_mut::<u32>().ok_or_else(|| mismatch(td))? = v as u32;
        return Ok(());
    }
    if td.type_id == ids::I64 {
        let v = as_i64_lossy(json).ok_or_else(|| mismatch(td))?;
        *dest.downcast_mut::<i64>().ok_or_else(|| mismatch(td))? = v;
        return Ok(());
    }
    if td.type_id == ids::U64 {
        let v = json
            .as_u64()
            .or_else(|| as_i64_lossy(json).map(|i| i as u64))
            .ok_or_else(|| mismatch(td))?;
        *dest.downcast_mut::<u64>().ok_or_else(|| mismatch(td))? = v;
        return Ok(());
    }
    if td.type_id == ids::F32 {
        let v = as_f64_lossy(json).ok_or_else(|| mismatch(td))?;
        *dest.downcast_mut::<f32>().ok_or_else(|| mismatch(td))? = v as f32;
        return Ok(());
    }
    if td.type_id == ids::F64 {
        let v = as_f64_lossy(json).ok_or_else(|| mismatch(td))?;
        *dest.downcast_mut::<f64>().ok_or_else(|| mismatch(td))? = v;
        return Ok(());
    }
    if td.type_id == ids::STRING {
        let v = json.as_str().ok_or_else(|| mismatch(td))?;
        *dest.downcast_mut::<String>().ok_or_else(|| mismatch(td))? = v.to_string();
        return Ok(());
    }

    // The spatial transform: absent sub-fields keep whatever value the
    // destination already holds, NOT identity. The transform may have been
    // pre-populated before this call.
    if td.type_id == ids::TRANSFORM3D {
        let object = json.as_object().ok_or_else(|| mismatch(td))?;
        let vec3_td = lib
            .find(ids::VECTOR3)
            .ok_or(SerialError::UnknownType(ids::VECTOR3))?;
        let quat_td = lib
            .find(ids::QUAT)
            .ok_or(SerialError::UnknownType(ids::QUAT))?;

        let transform = dest
            .downcast_mut::<Transform3D>()
            .ok_or_else(|| SerialError::ValueMismatch("Transform3D".to_string()))?;

        if let Some(jp) = object.get("p") {
            deserialize_value(lib, &mut transform.translation, jp, vec3_td)?;
        }
        if let Some(jr) = object.get("r") {
            deserialize_value(lib, &mut transform.rotation, jr, quat_td)?;
        }
        if let Some(js) = object.get("s") {
            deserialize_value(lib, &mut transform.scale, js, vec3_td)?;
        }
        return Ok(());
    }

    // Enums read back from the underlying integer.
    if let Some(traits) = &td.enum_traits {
        let raw = as_i64_lossy(json).ok_or_else(|| mismatch(td))?;
        if !(traits.from_underlying)(dest, raw) {
            return Err(mismatch(td));
        }
        return Ok(());
    }

    // Vector-like: resize first, then fill each element in place.
    if let Some(traits) = &td.vector_traits {
        let array = json.as_array().ok_or_else(|| mismatch(td))?;
        let element_td = lib
            .find(traits.element_type)
            .ok_or(SerialError::UnknownType(traits.element_type))?;

        if !(traits.resize)(&mut *dest, array.len()) {
            return Err(mismatch(td));
        }
        for (index, element_json) in array.iter().enumerate() {
            let slot = (traits.get_mut)(&mut *dest, index).ok_or_else(|| mismatch(td))?;
            deserialize_value(lib, slot, element_json, element_td)?;
        }
        return Ok(());
    }

    // Map-like: build a scratch key/value per entry and insert.
    if let Some(traits) = &td.map_traits {
        let array = json.as_array().ok_or_else(|| mismatch(td))?;
        let key_td = lib
            .find(traits.key_type)
            .ok_or(SerialError::UnknownType(traits.key_type))?;
        let value_td = lib
            .find(traits.value_type)
            .ok_or(SerialError::UnknownType(traits.value_type))?;

        let key_default = key_td
            .default_fn
            .as_ref()
            .ok_or_else(|| SerialError::UnsupportedType(key_td.name.clone()))?;
        let value_default = value_td
            .default_fn
            .as_ref()
            .ok_or_else(|| SerialError::UnsupportedType(value_td.name.clone()))?;

        for entry in array {
            let pair = entry.as_object().ok_or_else(|| mismatch(td))?;
            let jkey = pair.get("key").ok_or(SerialError::MissingKey("key"))?;
            let jvalue = pair.get("value").ok_or(SerialError::MissingKey("value"))?;

            let mut key = key_default();
            let mut value = value_default();
            deserialize_value(lib, key.as_mut(), jkey, key_td)?;
            deserialize_value(lib, value.as_mut(), jvalue, value_td)?;

            if !(traits.insert)(&mut *dest, key.as_ref(), value.as_ref()) {
                return Err(mismatch(td));
            }
        }
        return Ok(());
    }

    // Struct of registered members.
    if td.members.is_empty() {
        return Err(SerialError::UnsupportedType(td.name.clone()));
    }
    let object = json.as_object().ok_or_else(|| mismatch(td))?;

    for member in &td.members {
        if !member.is_saveable() {
            continue;
        }

        let Some(member_json) = object.get(&member.name) else {
            warn!(
                "member '{}::{}' is missing from the document; keeping the current value",
                td.name, member.name
            );
            continue;
        };

        let member_td = lib
            .find(member.type_id)
            .ok_or(SerialError::UnknownType(member.type_id))?;

        let applied = match &member.access {
            MemberAccess::Direct { get_mut, .. } => match get_mut(&mut *dest) {
                Some(slot) => {
                    deserialize_value(lib, slot, member_json, member_td)?;
                    true
                }
                None => false,
            },
            MemberAccess::Virtual { write, .. } => {
                let Some(default_fn) = member_td.default_fn.as_ref() else {
                    return Err(SerialError::UnsupportedType(member_td.name.clone()));
                };
                let mut staged = default_fn();
                deserialize_value(lib, staged.as_mut(), member_json, member_td)?;
                write(&mut *dest, staged.as_ref())
            }
        };

        if !applied {
            return Err(SerialError::MemberFailed(format!(
                "{}::{}",
                td.name, member.name
            )));
        }
    }

    Ok(())
}

/// The per-object record: `{"type": ..., "id": ..., "members": {...}}`.
pub fn serialize_object(
    lib: &TypeRegistry,
    object: &dyn GameObject,
) -> Result<Value, SerialError> {
    let td = lib
        .find(object.core().type_id)
        .ok_or(SerialError::UnknownType(object.core().type_id))?;

    let mut record = Map::new();
    record.insert("type".to_string(), json!(td.name));
    record.insert("id".to_string(), json!(object.id().0));

    let mut members = Map::new();
    let any = object.as_any();
    for member in &td.members {
        if !member.is_saveable() {
            continue;
        }
        let Some(member_td) = lib.find(member.type_id) else {
            error!("member '{}::{}' has no type descriptor", td.name, member.name);
            continue;
        };

        let serialized = match &member.access {
            MemberAccess::Direct { get, .. } => {
                get(any).map(|field| serialize_value(lib, member_td, field))
            }
            MemberAccess::Virtual { read, .. } => {
                read(any).map(|staged| serialize_value(lib, member_td, staged.as_ref()))
            }
        };

        match serialized {
            Some(Ok(json_value)) => {
                members.insert(member.name.clone(), json_value);
            }
            Some(Err(err)) => error!(
                "failed to serialize member '{}::{}': {err}",
                td.name, member.name
            ),
            None => error!(
                "member '{}::{}' is unreachable on its own object",
                td.name, member.name
            ),
        }
    }
    record.insert("members".to_string(), Value::Object(members));

    Ok(record.into())
}

/// The result of deserializing one object record.
pub struct DeserializedObject {
    /// The id of the object in the destination world.
    pub id: ObjectId,
    /// The id recorded in the document.
    pub original_id: ObjectId,
}

/// Allocates and fills an object from its serialized record.
///
/// With `generate_new_id` the object receives a fresh id and prefab-excluded
/// members (id, display name) are not applied; otherwise the recorded id is
/// used and must be free. A member that fails to apply aborts the load and
/// deletes the half-built object.
pub fn deserialize_object(
    world: &mut GameWorld,
    json: &Value,
    generate_new_id: bool,
) -> Result<DeserializedObject, SerialError> {
    let registry = world.registry_arc();

    let record = json
        .as_object()
        .ok_or_else(|| SerialError::ValueMismatch("object record".to_string()))?;

    let original_id = ObjectId(
        record
            .get("id")
            .and_then(as_i64_lossy)
            .ok_or(SerialError::MissingKey("id"))? as i32,
    );
    let type_name = record
        .get("type")
        .and_then(Value::as_str)
        .ok_or(SerialError::MissingKey("type"))?;

    let td = registry
        .find_by_name(type_name)
        .ok_or_else(|| SerialError::UnknownTypeName(type_name.to_string()))?;

    let desired_id = if generate_new_id {
        ObjectId::NONE
    } else {
        original_id
    };
    let id = world.alloc_object(td.type_id, desired_id, None)?;

    let empty = Map::new();
    let members_json = match record.get("members").and_then(Value::as_object) {
        Some(members) => members,
        None => {
            warn!("object record '{type_name}' has no members key");
            &empty
        }
    };

    let mut pending_transform: Option<Transform3D> = None;
    let applied = apply_object_members(
        world,
        &registry,
        id,
        td,
        members_json,
        generate_new_id,
        &mut pending_transform,
    );
    if let Err(err) = applied {
        world.object_delete(id);
        return Err(err);
    }

    // The world transform goes through the regular setter so children and
    // the physics backend see it.
    if let Some(transform) = pending_transform {
        world.set_transform(id, transform, true)?;
    }

    if let Some(object) = world.get_object_mut(id) {
        object.core_mut().make_dirty();
        object.on_member_changed();
    }

    Ok(DeserializedObject { id, original_id })
}

fn apply_object_members(
    world: &mut GameWorld,
    lib: &TypeRegistry,
    id: ObjectId,
    td: &TypeDesc,
    members_json: &Map<String, Value>,
    generate_new_id: bool,
    pending_transform: &mut Option<Transform3D>,
) -> Result<(), SerialError> {
    let object = world
        .get_object_mut(id)
        .ok_or(WorldError::NoSuchObject(id))?;
    let any = object.as_any_mut();

    for member in &td.members {
        if !member.is_saveable() {
            continue;
        }
        if generate_new_id && member.flags & member_flags::PREFAB_DONT_COPY != 0 {
            continue;
        }

        let Some(member_json) = members_json.get(&member.name) else {
            warn!(
                "member '{}::{}' is missing from the document; keeping the default",
                td.name, member.name
            );
            continue;
        };

        let member_td = lib
            .find(member.type_id)
            .ok_or(SerialError::UnknownType(member.type_id))?;

        if is_actor_transform_member(member) {
            let mut transform = Transform3D::identity();
            deserialize_value(lib, &mut transform, member_json, member_td)?;
            *pending_transform = Some(transform);
            continue;
        }

        match &member.access {
            MemberAccess::Direct { get_mut, .. } => {
                let slot = get_mut(&mut *any).ok_or_else(|| {
                    SerialError::MemberFailed(format!("{}::{}", td.name, member.name))
                })?;
                deserialize_value(lib, slot, member_json, member_td)?;
            }
            MemberAccess::Virtual { write, .. } => {
                let default_fn = member_td
                    .default_fn
                    .as_ref()
                    .ok_or_else(|| SerialError::UnsupportedType(member_td.name.clone()))?;
                let mut staged = default_fn();
                deserialize_value(lib, staged.as_mut(), member_json, member_td)?;
                if !write(&mut *any, staged.as_ref()) {
                    return Err(SerialError::MemberFailed(format!(
                        "{}::{}",
                        td.name, member.name
                    )));
                }
            }
        }
    }

    Ok(())
}

/// Serializes the whole world: format version, scene settings, the
/// parent/child hierarchy and every object (playing and awaiting creation).
pub fn serialize_game_world(world: &GameWorld) -> Result<Value, SerialError> {
    let registry = world.registry_arc();
    let mut doc = Map::new();

    doc.insert("version".to_string(), json!(SCENE_FORMAT_VERSION));
    doc.insert("nextNameIndex".to_string(), json!(world.next_name_index_raw()));
    doc.insert("nextActorId".to_string(), json!(world.next_object_id_raw()));
    doc.insert("cameraProvider".to_string(), json!(world.camera_provider.0));

    doc.insert(
        "ambientLightColor".to_string(),
        serde_json::to_value(world.ambient_light)?,
    );
    doc.insert(
        "rimLightColor".to_string(),
        serde_json::to_value(world.rim_light)?,
    );
    doc.insert("rimCosineWidth".to_string(), json!(world.rim_cosine_width));
    doc.insert(
        "skyColorBottom".to_string(),
        serde_json::to_value(world.sky_color_bottom)?,
    );
    doc.insert(
        "skyColorTop".to_string(),
        serde_json::to_value(world.sky_color_top)?,
    );

    doc.insert("gridShouldDraw".to_string(), json!(world.grid_should_draw));
    doc.insert(
        "gridNumSegments".to_string(),
        serde_json::to_value(world.grid_num_segments)?,
    );
    doc.insert(
        "gridSegmentsSpacing".to_string(),
        json!(world.grid_segments_spacing),
    );

    doc.insert(
        "defaultGravity".to_string(),
        serde_json::to_value(world.default_gravity)?,
    );
    doc.insert(
        "physicsSimNumSubSteps".to_string(),
        json!(world.physics_sim_num_sub_steps),
    );

    // Hierarchy as a flat [parentId, [childId, ...], ...] array. Only the
    // children map is written; the parent map is rebuilt from it on load.
    let mut hierarchy = Vec::new();
    for (parent, children) in world.hierarchy_pairs() {
        hierarchy.push(json!(parent.0));
        hierarchy.push(Value::Array(
            children.iter().map(|child| json!(child.0)).collect(),
        ));
    }
    doc.insert("hierarchy".to_string(), Value::Array(hierarchy));

    let mut actors = Vec::new();
    for id in world.playing_object_ids(true) {
        let Some(object) = world.get_object(id) else {
            continue;
        };
        match serialize_object(&registry, object) {
            Ok(record) => actors.push(record),
            Err(err) => error!("failed to serialize object {id}: {err}"),
        }
    }
    doc.insert("actors".to_string(), Value::Array(actors));

    Ok(doc.into())
}

pub fn serialize_game_world_to_string(world: &GameWorld) -> Result<String, SerialError> {
    let doc = serialize_game_world(world)?;
    Ok(serde_json::to_string(&doc)?)
}

fn load_world_setting<T: serde::de::DeserializeOwned>(
    doc: &Map<String, Value>,
    key: &str,
    dest: &mut T,
) {
    let Some(value) = doc.get(key) else {
        return;
    };
    match serde_json::from_value::<T>(value.clone()) {
        Ok(parsed) => *dest = parsed,
        Err(err) => warn!("world key '{key}' has an unexpected shape ({err}); keeping the default"),
    }
}

/// Replaces this world's contents with a parsed world document.
///
/// Missing optional keys keep the freshly reset defaults; objects that fail
/// to load are skipped with an error. Finishes with one paused update tick
/// so every loaded object is promoted to playing.
pub fn load_game_world(world: &mut GameWorld, doc: &Value) -> Result<(), SerialError> {
    let doc = doc
        .as_object()
        .ok_or_else(|| SerialError::ValueMismatch("world document".to_string()))?;

    world.clear();

    if let Some(next) = doc.get("nextNameIndex").and_then(as_i64_lossy) {
        world.set_next_name_index_raw(next as i32);
    }
    if let Some(next) = doc.get("nextActorId").and_then(as_i64_lossy) {
        world.set_next_object_id_raw(next as i32);
    }
    if let Some(provider) = doc.get("cameraProvider").and_then(as_i64_lossy) {
        world.camera_provider = ObjectId(provider as i32);
    }

    load_world_setting(doc, "ambientLightColor", &mut world.ambient_light);
    load_world_setting(doc, "rimLightColor", &mut world.rim_light);
    load_world_setting(doc, "rimCosineWidth", &mut world.rim_cosine_width);
    load_world_setting(doc, "skyColorBottom", &mut world.sky_color_bottom);
    load_world_setting(doc, "skyColorTop", &mut world.sky_color_top);
    load_world_setting(doc, "gridShouldDraw", &mut world.grid_should_draw);
    load_world_setting(doc, "gridNumSegments", &mut world.grid_num_segments);
    load_world_setting(doc, "gridSegmentsSpacing", &mut world.grid_segments_spacing);
    load_world_setting(doc, "defaultGravity", &mut world.default_gravity);
    load_world_setting(
        doc,
        "physicsSimNumSubSteps",
        &mut world.physics_sim_num_sub_steps,
    );

    match doc.get("actors").and_then(Value::as_array) {
        Some(actors) => {
            for record in actors {
                if let Err(err) = deserialize_object(world, record, false) {
                    error!("failed to load an object: {err}");
                }
            }
        }
        None => warn!("world document has no actors key"),
    }

    // Re-apply every actor transform through the regular setter so the
    // physics backend picks the loaded poses up.
    for id in world.playing_object_ids(true) {
        if let Some(transform) = world.get_actor(id).map(|a| *a.transform()) {
            let _ = world.set_transform(id, transform, true);
        }
    }

    // Restore the hierarchy. The links are written straight into the maps:
    // the serialized binding transforms are authoritative and must not be
    // recomputed from the current poses.
    if let Some(hierarchy) = doc.get("hierarchy").and_then(Value::as_array) {
        let mut index = 0;
        while index + 1 < hierarchy.len() {
            let parent = hierarchy[index].as_i64().map(|p| ObjectId(p as i32));
            let children = hierarchy[index + 1].as_array();
            if let (Some(parent), Some(children)) = (parent, children) {
                for child in children {
                    if let Some(child) = child.as_i64() {
                        world.insert_hierarchy_link(parent, ObjectId(child as i32));
                    }
                }
            }
            index += 2;
        }
    }

    // Keep the id counter ahead of everything that was loaded, in case the
    // document's counter key was absent or stale.
    let max_loaded = world
        .playing_object_ids(true)
        .into_iter()
        .map(|id| id.0)
        .max()
        .unwrap_or(0);
    world.set_next_object_id_raw(max_loaded + 1);

    world.update(&GameUpdateSets::paused_step());
    Ok(())
}

pub fn load_game_world_from_str(world: &mut GameWorld, json: &str) -> Result<(), SerialError> {
    let doc: Value = serde_json::from_str(json)?;
    load_game_world(world, &doc)
}

pub fn load_game_world_from_file(
    world: &mut GameWorld,
    path: impl AsRef<Path>,
) -> Result<(), SerialError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    load_game_world_from_str(world, &text)?;
    world.working_file_path = Some(path.to_path_buf());
    Ok(())
}

pub fn save_game_world_to_file(
    world: &mut GameWorld,
    path: impl AsRef<Path>,
) -> Result<(), SerialError> {
    let path = path.as_ref();
    let doc = serialize_game_world(world)?;
    std::fs::write(path, serde_json::to_string_pretty(&doc)?)?;
    world.working_file_path = Some(path.to_path_buf());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{register_primitive_types, TypeRegistry};
    use ember_shared::Vec2i;
    use std::collections::BTreeMap;

    #[derive(Debug, Default, Clone, Copy, PartialEq)]
    enum Surface {
        #[default]
        Smooth,
        Rough,
        Sticky,
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Material {
        label: String,
        roughness: f32,
        surface: Surface,
        layer_weights: Vec<f32>,
        annotations: BTreeMap<String, String>,
        grid: Vec2i,
        attach_point: Transform3D,
    }

    const SURFACE_ID: TypeId = TypeId(21_09_03_0001);
    const MATERIAL_ID: TypeId = TypeId(21_09_03_0002);

    fn build_registry() -> TypeRegistry {
        let mut lib = TypeRegistry::new();
        register_primitive_types(&mut lib);

        lib.add_value_type::<Surface>("Surface", SURFACE_ID)
            .enumeration::<Surface, i32>(
                |s| *s as i64,
                |raw| match raw {
                    0 => Some(Surface::Smooth),
                    1 => Some(Surface::Rough),
                    2 => Some(Surface::Sticky),
                    _ => None,
                },
            )
            .enum_value(0, "Smooth")
            .enum_value(1, "Rough")
            .enum_value(2, "Sticky");

        lib.add_value_type::<Material>("Material", MATERIAL_ID)
            .member::<Material, String>("label", |m| &m.label, |m| &mut m.label, 0)
            .member::<Material, f32>("roughness", |m| &m.roughness, |m| &mut m.roughness, 0)
            .member::<Material, Surface>("surface", |m| &m.surface, |m| &mut m.surface, 0)
            .member::<Material, Vec<f32>>(
                "layer_weights",
                |m| &m.layer_weights,
                |m| &mut m.layer_weights,
                0,
            )
            .member::<Material, BTreeMap<String, String>>(
                "annotations",
                |m| &m.annotations,
                |m| &mut m.annotations,
                0,
            )
            .member::<Material, Vec2i>("grid", |m| &m.grid, |m| &mut m.grid, 0)
            .member::<Material, Transform3D>(
                "attach_point",
                |m| &m.attach_point,
                |m| &mut m.attach_point,
                0,
            );

        lib.perform_registration().unwrap();
        lib
    }

    fn sample_material() -> Material {
        let mut annotations = BTreeMap::new();
        annotations.insert("author".to_string(), "tools".to_string());
        annotations.insert("review".to_string(), "pending".to_string());

        Material {
            label: "brushed metal".into(),
            roughness: 0.375,
            surface: Surface::Rough,
            layer_weights: vec![1.0, 0.25, 0.5],
            annotations,
            grid: Vec2i::new(4, 8),
            attach_point: Transform3D::from_translation(Vector3::new(0.0, 2.0, 0.0)),
        }
    }

    #[test]
    fn value_roundtrip_preserves_everything() {
        let lib = build_registry();
        let td = lib.find(MATERIAL_ID).unwrap();

        let source = sample_material();
        let json = serialize_value(&lib, td, &source).unwrap();

        let mut restored = Material::default();
        deserialize_value(&lib, &mut restored, &json, td).unwrap();
        assert_eq!(source, restored);
    }

    #[test]
    fn enum_serializes_as_underlying_integer() {
        let lib = build_registry();
        let td = lib.find(SURFACE_ID).unwrap();
        let json = serialize_value(&lib, td, &Surface::Sticky).unwrap();
        assert_eq!(json, json!(2));
    }

    #[test]
    fn map_serializes_as_key_value_pairs() {
        let lib = build_registry();
        let td = lib.find(MATERIAL_ID).unwrap();
        let json = serialize_value(&lib, td, &sample_material()).unwrap();

        let annotations = json.get("annotations").unwrap().as_array().unwrap();
        assert_eq!(annotations.len(), 2);
        assert!(annotations[0].get("key").is_some());
        assert!(annotations[0].get("value").is_some());
    }

    #[test]
    fn transform_identity_fields_are_omitted() {
        let lib = build_registry();
        let td = lib.find(core_type_ids::TRANSFORM3D).unwrap();

        let transform = Transform3D::from_translation(Vector3::new(1.0, 0.0, 0.0));
        let json = serialize_value(&lib, td, &transform).unwrap();

        assert!(json.get("p").is_some());
        assert!(json.get("r").is_none());
        assert!(json.get("s").is_none());
    }

    #[test]
    fn omitted_transform_fields_keep_preexisting_values() {
        let lib = build_registry();
        let td = lib.find(core_type_ids::TRANSFORM3D).unwrap();

        // The destination already has a non-identity scale; the document
        // only carries a translation, so the scale must survive.
        let mut dest = Transform3D::identity();
        dest.scale = Vector3::splat(3.0);

        let json = json!({ "p": { "x": 5.0, "y": 0.0, "z": 0.0 } });
        deserialize_value(&lib, &mut dest, &json, td).unwrap();

        assert_eq!(dest.translation, Vector3::new(5.0, 0.0, 0.0));
        assert_eq!(dest.scale, Vector3::splat(3.0));
    }

    #[test]
    fn missing_member_is_tolerated() {
        let lib = build_registry();
        let td = lib.find(MATERIAL_ID).unwrap();

        let mut dest = sample_material();
        let json = json!({ "roughness": 0.9 });
        deserialize_value(&lib, &mut dest, &json, td).unwrap();

        assert_eq!(dest.roughness, 0.9);
        assert_eq!(dest.label, "brushed metal");
    }

    #[test]
    fn wrong_value_kind_fails() {
        let lib = build_registry();
        let td = lib.find(MATERIAL_ID).unwrap();

        let mut dest = Material::default();
        let json = json!({ "roughness": "not a number" });
        assert!(deserialize_value(&lib, &mut dest, &json, td).is_err());
    }

    #[test]
    fn vector_resizes_to_incoming_length() {
        let lib = build_registry();
        let td = lib.find(core_type_ids::VEC_F32).unwrap();

        let mut dest: Vec<f32> = vec![9.0; 10];
        let json = json!([1.0, 2.0]);
        deserialize_value(&lib, &mut dest, &json, td).unwrap();
        assert_eq!(dest, vec![1.0, 2.0]);
    }

    // -- world document -----------------------------------------------------

    use crate::objects::LocatorActor;
    use crate::register_engine_types;
    use crate::registry::core_type_ids::LOCATOR_ACTOR;
    use std::sync::Arc;

    fn make_world() -> GameWorld {
        let mut lib = TypeRegistry::new();
        register_engine_types(&mut lib);
        lib.perform_registration().unwrap();
        GameWorld::new(Arc::new(lib))
    }

    fn populate(world: &mut GameWorld) -> (ObjectId, ObjectId) {
        let anchor = world
            .alloc_object(LOCATOR_ACTOR, ObjectId::NONE, Some("Anchor"))
            .unwrap();
        let satellite = world
            .alloc_object(LOCATOR_ACTOR, ObjectId::NONE, Some("Satellite"))
            .unwrap();
        world.update(&GameUpdateSets::paused_step());

        {
            let locator = world
                .get_object_mut(anchor)
                .unwrap()
                .as_any_mut()
                .downcast_mut::<LocatorActor>()
                .unwrap();
            locator.marker_color = Vector3::new(0.2, 0.4, 0.8);
            locator.tags = vec!["nav".into()];
            locator.linked_object = satellite;
        }
        world
            .set_transform(
                anchor,
                Transform3D::from_translation(Vector3::new(4.0, 0.0, -2.0)),
                true,
            )
            .unwrap();
        world
            .set_transform(
                satellite,
                Transform3D::from_translation(Vector3::new(4.0, 3.0, -2.0)),
                true,
            )
            .unwrap();
        world.set_parent_of(satellite, anchor).unwrap();

        world.ambient_light = Vector3::new(0.5, 0.5, 0.6);
        world.grid_should_draw = false;
        world.physics_sim_num_sub_steps = 7;

        (anchor, satellite)
    }

    #[test]
    fn object_record_roundtrip() {
        let mut world = make_world();
        let (anchor, _) = populate(&mut world);
        let registry = world.registry_arc();

        let record = serialize_object(&registry, world.get_object(anchor).unwrap()).unwrap();
        assert_eq!(record.get("type").unwrap(), &json!("LocatorActor"));
        assert_eq!(record.get("id").unwrap(), &json!(anchor.0));

        // Restore into a fresh world with the recorded id.
        let mut other = GameWorld::new(registry);
        let restored = deserialize_object(&mut other, &record, false).unwrap();
        assert_eq!(restored.id, anchor);
        assert_eq!(restored.original_id, anchor);

        let locator = other
            .get_object(restored.id)
            .unwrap()
            .as_any()
            .downcast_ref::<LocatorActor>()
            .unwrap();
        assert_eq!(locator.marker_color, Vector3::new(0.2, 0.4, 0.8));
        assert_eq!(locator.tags, vec!["nav".to_string()]);
        assert_eq!(
            other.get_actor(restored.id).unwrap().position(),
            Vector3::new(4.0, 0.0, -2.0)
        );
        assert_eq!(
            other.get_object(restored.id).unwrap().display_name(),
            "Anchor"
        );
    }

    #[test]
    fn unresolvable_type_name_fails_that_object() {
        let mut world = make_world();
        let record = json!({
            "type": "NoSuchType",
            "id": 3,
            "members": {}
        });
        assert!(matches!(
            deserialize_object(&mut world, &record, false),
            Err(SerialError::UnknownTypeName(_))
        ));
        assert_eq!(world.object_count(), 0);
    }

    #[test]
    fn world_document_roundtrip() {
        let mut world = make_world();
        let (anchor, satellite) = populate(&mut world);

        let text = serialize_game_world_to_string(&world).unwrap();

        let mut restored = GameWorld::new(world.registry_arc());
        load_game_world_from_str(&mut restored, &text).unwrap();

        assert_eq!(restored.object_count(), 2);
        assert_eq!(restored.get_object_id_by_name("Anchor"), Some(anchor));
        assert_eq!(restored.get_object_id_by_name("Satellite"), Some(satellite));
        assert_eq!(restored.get_parent_id(satellite), anchor);
        assert_eq!(restored.ambient_light, Vector3::new(0.5, 0.5, 0.6));
        assert!(!restored.grid_should_draw);
        assert_eq!(restored.physics_sim_num_sub_steps, 7);
        assert_eq!(
            restored.get_actor(satellite).unwrap().position(),
            Vector3::new(4.0, 3.0, -2.0)
        );

        // Loaded objects are playing (the load finishes with a tick), and
        // fresh ids stay clear of the loaded ones.
        let next = restored
            .alloc_object(LOCATOR_ACTOR, ObjectId::NONE, None)
            .unwrap();
        assert!(next.0 > satellite.0);
    }

    #[test]
    fn world_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("level.json");

        let mut world = make_world();
        populate(&mut world);
        save_game_world_to_file(&mut world, &path).unwrap();
        assert_eq!(world.working_file_path.as_deref(), Some(path.as_path()));

        let mut restored = GameWorld::new(world.registry_arc());
        load_game_world_from_file(&mut restored, &path).unwrap();
        assert_eq!(restored.object_count(), 2);
        assert_eq!(restored.working_file_path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn missing_optional_world_keys_keep_defaults() {
        let mut world = make_world();
        load_game_world_from_str(&mut world, r#"{ "version": 1, "actors": [] }"#).unwrap();
        assert_eq!(world.ambient_light, Vector3::splat(0.25));
        assert_eq!(world.physics_sim_num_sub_steps, 3);
        assert_eq!(world.object_count(), 0);
    }
}
