//! # Type Registry
//!
//! Runtime reflection for the engine. Every type that participates in
//! serialization, member chains or the command engine is described by a
//! [`TypeDesc`]: its members (as accessor pairs rather than byte offsets),
//! its capability blocks (construct/clone/assign/compare) and, where
//! applicable, enum/vector/map collection traits.
//!
//! A [`TypeRegistry`] is an explicitly constructed object that is passed to
//! whatever needs lookups; there is no global registry. The only process-wide
//! state is the inventory of deferred registration functions that game crates
//! can submit with [`submit_type_registration`]; every registry runs those
//! during [`TypeRegistry::perform_registration`].
//!
//! Registration is a two-phase affair, as in the editor's startup:
//! descriptors are added (directly or from hooks), then
//! `perform_registration` resolves member type ids, flattens inheritance by
//! copying superclass members into each subclass with composed accessors,
//! and caches the set of allocatable game-object types. The pass is
//! idempotent; cyclic or unresolvable inheritance is reported instead of
//! looping forever.

pub mod chain;

use crate::object::GameObject;
use ember_shared::{Box3, ObjectId, Quat, Transform3D, TypeId, Vec2i, Vector3};
use log::warn;
use once_cell::sync::Lazy;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Flags attached to a registered member.
pub mod member_flags {
    /// The member must not be edited through the inspector UI or commands.
    pub const NON_EDITABLE: u32 = 1 << 0;
    /// The member is skipped by serialization.
    pub const NON_SAVEABLE: u32 = 1 << 1;
    /// UI hint: the float is displayed in degrees.
    pub const FLOAT_AS_DEGREES: u32 = 1 << 2;
    /// UI hint: the vector is displayed as a color.
    pub const VEC3_AS_COLOR: u32 = 1 << 3;
    /// The member is not copied when instantiating a prefab with fresh ids.
    pub const PREFAB_DONT_COPY: u32 = 1 << 4;
}

/// Type ids of everything the engine registers itself, date-based by
/// convention (`yymmddnnnn`).
pub mod core_type_ids {
    use ember_shared::TypeId;

    pub const BOOL: TypeId = TypeId(21_03_06_0001);
    pub const I32: TypeId = TypeId(21_03_06_0002);
    pub const U32: TypeId = TypeId(21_03_06_0003);
    pub const I64: TypeId = TypeId(21_03_06_0004);
    pub const U64: TypeId = TypeId(21_03_06_0005);
    pub const F32: TypeId = TypeId(21_03_06_0006);
    pub const F64: TypeId = TypeId(21_03_06_0007);
    pub const STRING: TypeId = TypeId(21_03_06_0008);

    pub const VEC2I: TypeId = TypeId(21_03_06_0009);
    pub const VECTOR3: TypeId = TypeId(21_03_06_0010);
    pub const QUAT: TypeId = TypeId(21_03_06_0011);
    pub const TRANSFORM3D: TypeId = TypeId(21_03_06_0012);
    pub const BOX3: TypeId = TypeId(21_03_06_0013);
    pub const OBJECT_ID: TypeId = TypeId(21_03_06_0014);

    pub const VEC_I32: TypeId = TypeId(21_03_06_0015);
    pub const VEC_F32: TypeId = TypeId(21_03_06_0016);
    pub const VEC_STRING: TypeId = TypeId(21_03_06_0017);
    pub const VEC_OBJECT_ID: TypeId = TypeId(21_03_06_0018);
    pub const MAP_STRING_STRING: TypeId = TypeId(21_03_06_0019);

    pub const GAME_OBJECT: TypeId = TypeId(21_03_07_0001);
    pub const ACTOR: TypeId = TypeId(21_03_07_0002);
    pub const TRAIT_CAMERA: TypeId = TypeId(21_03_07_0003);
    pub const LOCATOR_ACTOR: TypeId = TypeId(21_03_07_0004);
    pub const CAMERA_ACTOR: TypeId = TypeId(21_03_07_0005);
    pub const LOCATOR_DISPLAY_MODE: TypeId = TypeId(21_03_07_0006);
}

/// Errors reported by registry entry points.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid type registration: {0}")]
    InvalidRegistration(String),

    #[error("inheritance could not be resolved for: {0:?} (cyclic or missing superclass)")]
    UnresolvedInheritance(Vec<String>),

    #[error("type {0} is not registered")]
    UnknownType(TypeId),

    #[error("no registered type is named '{0}'")]
    UnknownTypeName(String),
}

// Erased accessor signatures. All of them are cheap Arc'd closures built from
// plain fn pointers at registration time.
pub type GetFn = Arc<dyn Fn(&dyn Any) -> Option<&dyn Any> + Send + Sync>;
pub type GetMutFn = Arc<dyn Fn(&mut dyn Any) -> Option<&mut dyn Any> + Send + Sync>;
pub type ReadFn = Arc<dyn Fn(&dyn Any) -> Option<Box<dyn Any>> + Send + Sync>;
pub type WriteFn = Arc<dyn Fn(&mut dyn Any, &dyn Any) -> bool + Send + Sync>;

pub type DefaultFn = Arc<dyn Fn() -> Box<dyn Any> + Send + Sync>;
pub type CloneFn = Arc<dyn Fn(&dyn Any) -> Option<Box<dyn Any>> + Send + Sync>;
pub type AssignFn = Arc<dyn Fn(&mut dyn Any, &dyn Any) -> bool + Send + Sync>;
pub type EqualsFn = Arc<dyn Fn(&dyn Any, &dyn Any) -> Option<bool> + Send + Sync>;
pub type AllocObjectFn = Arc<dyn Fn() -> Box<dyn GameObject> + Send + Sync>;

// Helpers that pin the higher-ranked lifetimes of borrowing closures, so the
// compiler accepts them as the erased accessor types above.
fn hr_get<F>(f: F) -> F
where
    F: for<'a> Fn(&'a dyn Any) -> Option<&'a dyn Any>,
{
    f
}

fn hr_get_mut<F>(f: F) -> F
where
    F: for<'a> Fn(&'a mut dyn Any) -> Option<&'a mut dyn Any>,
{
    f
}

fn hr_index<F>(f: F) -> F
where
    F: for<'a> Fn(&'a dyn Any, usize) -> Option<&'a dyn Any>,
{
    f
}

fn hr_index_mut<F>(f: F) -> F
where
    F: for<'a> Fn(&'a mut dyn Any, usize) -> Option<&'a mut dyn Any>,
{
    f
}

/// How a member is reached on its owning value.
#[derive(Clone)]
pub enum MemberAccess {
    /// A plain field: the accessors project a borrow straight into the
    /// owning value, and member chains can be followed through it.
    Direct { get: GetFn, get_mut: GetMutFn },

    /// The member is only exposed through get/set functions by value
    /// (a computed property). Chains stop here; callers must go through
    /// `read`/`write` instead of `follow`.
    Virtual { read: ReadFn, write: WriteFn },
}

impl MemberAccess {
    pub fn is_direct(&self) -> bool {
        matches!(self, MemberAccess::Direct { .. })
    }
}

/// Description of one member of a registered type.
#[derive(Clone)]
pub struct MemberDesc {
    /// The type this member (now) belongs to. For inherited members this is
    /// the subclass after flattening.
    pub owner_type: TypeId,

    pub name: String,

    /// UI label derived from the field name.
    pub pretty_name: String,

    /// Type of the member value. Resolved during `perform_registration`.
    pub type_id: TypeId,

    /// `member_flags` bits.
    pub flags: u32,

    /// When the member was copied down from a superclass during flattening,
    /// the superclass it came from; null otherwise.
    pub inherited_from: TypeId,

    pub access: MemberAccess,

    member_rust: std::any::TypeId,
}

impl MemberDesc {
    pub fn is_editable(&self) -> bool {
        self.flags & member_flags::NON_EDITABLE == 0
    }

    pub fn is_saveable(&self) -> bool {
        self.flags & member_flags::NON_SAVEABLE == 0
    }

    pub fn is_direct(&self) -> bool {
        self.access.is_direct()
    }
}

/// Trait block for enum types: conversion to and from the underlying integer.
#[derive(Clone)]
pub struct EnumTraits {
    pub underlying_type: TypeId,
    pub to_underlying: Arc<dyn Fn(&dyn Any) -> Option<i64> + Send + Sync>,
    pub from_underlying: Arc<dyn Fn(&mut dyn Any, i64) -> bool + Send + Sync>,
    /// Value/name pairs for UI enumeration.
    pub value_names: Vec<(i64, String)>,
    underlying_rust: std::any::TypeId,
}

/// Trait block for vector-like types.
#[derive(Clone)]
pub struct VectorTraits {
    pub element_type: TypeId,
    pub len: Arc<dyn Fn(&dyn Any) -> usize + Send + Sync>,
    pub get: Arc<dyn Fn(&dyn Any, usize) -> Option<&dyn Any> + Send + Sync>,
    pub get_mut: Arc<dyn Fn(&mut dyn Any, usize) -> Option<&mut dyn Any> + Send + Sync>,
    pub resize: Arc<dyn Fn(&mut dyn Any, usize) -> bool + Send + Sync>,
    pub erase_at: Arc<dyn Fn(&mut dyn Any, usize) -> bool + Send + Sync>,
    pub push: Arc<dyn Fn(&mut dyn Any, &dyn Any) -> bool + Send + Sync>,
    element_rust: std::any::TypeId,
}

/// Trait block for map-like types.
#[derive(Clone)]
pub struct MapTraits {
    pub key_type: TypeId,
    pub value_type: TypeId,
    pub len: Arc<dyn Fn(&dyn Any) -> usize + Send + Sync>,
    /// Clones out the n-th key/value pair in iteration order.
    pub get_nth_pair: Arc<dyn Fn(&dyn Any, usize) -> Option<(Box<dyn Any>, Box<dyn Any>)> + Send + Sync>,
    pub insert: Arc<dyn Fn(&mut dyn Any, &dyn Any, &dyn Any) -> bool + Send + Sync>,
    key_rust: std::any::TypeId,
    value_rust: std::any::TypeId,
}

/// Extra description for allocatable game-object types.
#[derive(Clone)]
pub struct GameObjectDesc {
    /// Menu category used by the editor for grouping.
    pub category: Option<String>,
    pub alloc: AllocObjectFn,
}

/// A superclass relation: which type is inherited and how to project a
/// borrow of the subclass value to the embedded superclass value.
#[derive(Clone)]
pub struct SuperClassEntry {
    pub type_id: TypeId,
    pub project: GetFn,
    pub project_mut: GetMutFn,
}

/// The runtime reflection record for one registered type.
#[derive(Clone)]
pub struct TypeDesc {
    pub name: String,
    pub type_id: TypeId,

    /// Members in declaration order; after `perform_registration` inherited
    /// members appear first, in superclass declaration order.
    pub members: Vec<MemberDesc>,

    pub superclasses: Vec<SuperClassEntry>,

    pub default_fn: Option<DefaultFn>,
    pub clone_fn: Option<CloneFn>,
    pub assign_fn: Option<AssignFn>,
    pub equals_fn: Option<EqualsFn>,

    pub enum_traits: Option<EnumTraits>,
    pub vector_traits: Option<VectorTraits>,
    pub map_traits: Option<MapTraits>,
    pub game_object: Option<GameObjectDesc>,

    rust_type: std::any::TypeId,
    errors: Vec<String>,
}

impl TypeDesc {
    fn create<T: 'static>(name: &str, type_id: TypeId) -> Self {
        Self {
            name: name.to_string(),
            type_id,
            members: Vec::new(),
            superclasses: Vec::new(),
            default_fn: None,
            clone_fn: None,
            assign_fn: None,
            equals_fn: None,
            enum_traits: None,
            vector_traits: None,
            map_traits: None,
            game_object: None,
            rust_type: std::any::TypeId::of::<T>(),
            errors: Vec::new(),
        }
    }

    fn check_owner<T: 'static>(&mut self, what: &str) -> bool {
        if std::any::TypeId::of::<T>() != self.rust_type {
            self.errors.push(format!(
                "{} registered on '{}' with a mismatched owner type",
                what, self.name
            ));
            return false;
        }
        true
    }

    /// Wires the construct capability. Required for types that are built
    /// from scratch during deserialization (map scratch pairs, virtual
    /// member staging).
    pub fn constructible<T: Default + 'static>(&mut self) -> &mut Self {
        if self.check_owner::<T>("constructible") {
            self.default_fn = Some(Arc::new(|| Box::new(T::default()) as Box<dyn Any>));
        }
        self
    }

    /// Wires clone and assign capabilities.
    pub fn copyable<T: Clone + 'static>(&mut self) -> &mut Self {
        if self.check_owner::<T>("copyable") {
            self.clone_fn = Some(Arc::new(|v: &dyn Any| {
                v.downcast_ref::<T>()
                    .map(|v| Box::new(v.clone()) as Box<dyn Any>)
            }));
            self.assign_fn = Some(Arc::new(|dest: &mut dyn Any, src: &dyn Any| {
                match (dest.downcast_mut::<T>(), src.downcast_ref::<T>()) {
                    (Some(dest), Some(src)) => {
                        *dest = src.clone();
                        true
                    }
                    _ => false,
                }
            }));
        }
        self
    }

    /// Wires the compare capability.
    pub fn comparable<T: PartialEq + 'static>(&mut self) -> &mut Self {
        if self.check_owner::<T>("comparable") {
            self.equals_fn = Some(Arc::new(|a: &dyn Any, b: &dyn Any| {
                match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
                    (Some(a), Some(b)) => Some(a == b),
                    _ => None,
                }
            }));
        }
        self
    }

    /// Registers a plain field member. The member's type id is resolved from
    /// `M`'s own registration during `perform_registration`.
    pub fn member<T: 'static, M: 'static>(
        &mut self,
        name: &str,
        get: fn(&T) -> &M,
        get_mut: fn(&mut T) -> &mut M,
        flags: u32,
    ) -> &mut Self {
        if !self.check_owner::<T>("member") {
            return self;
        }

        let erased_get: GetFn = Arc::new(hr_get(move |obj: &dyn Any| {
            obj.downcast_ref::<T>().map(|t| get(t) as &dyn Any)
        }));
        let erased_get_mut: GetMutFn = Arc::new(hr_get_mut(move |obj: &mut dyn Any| {
            obj.downcast_mut::<T>().map(|t| get_mut(t) as &mut dyn Any)
        }));

        self.members.push(MemberDesc {
            owner_type: self.type_id,
            name: name.to_string(),
            pretty_name: compute_pretty_name(name),
            type_id: TypeId::NONE,
            flags,
            inherited_from: TypeId::NONE,
            access: MemberAccess::Direct {
                get: erased_get,
                get_mut: erased_get_mut,
            },
            member_rust: std::any::TypeId::of::<M>(),
        });
        self
    }

    /// Registers a computed member exposed through get/set functions by
    /// value. Member chains cannot be followed through it.
    pub fn member_virtual<T: 'static, M: Clone + 'static>(
        &mut self,
        name: &str,
        read: fn(&T) -> M,
        write: fn(&mut T, M),
        flags: u32,
    ) -> &mut Self {
        if !self.check_owner::<T>("member_virtual") {
            return self;
        }

        let erased_read: ReadFn = Arc::new(move |obj: &dyn Any| {
            obj.downcast_ref::<T>()
                .map(|t| Box::new(read(t)) as Box<dyn Any>)
        });
        let erased_write: WriteFn = Arc::new(move |obj: &mut dyn Any, value: &dyn Any| {
            match (obj.downcast_mut::<T>(), value.downcast_ref::<M>()) {
                (Some(t), Some(v)) => {
                    write(t, v.clone());
                    true
                }
                _ => false,
            }
        });

        self.members.push(MemberDesc {
            owner_type: self.type_id,
            name: name.to_string(),
            pretty_name: compute_pretty_name(name),
            type_id: TypeId::NONE,
            flags,
            inherited_from: TypeId::NONE,
            access: MemberAccess::Virtual {
                read: erased_read,
                write: erased_write,
            },
            member_rust: std::any::TypeId::of::<M>(),
        });
        self
    }

    /// Adds flags to the most recently registered member.
    pub fn member_flag(&mut self, flag: u32) -> &mut Self {
        match self.members.last_mut() {
            Some(member) => member.flags |= flag,
            None => self
                .errors
                .push(format!("member_flag on '{}' without a member", self.name)),
        }
        self
    }

    /// Overrides the UI label of the most recently registered member.
    pub fn member_pretty_name(&mut self, pretty: &str) -> &mut Self {
        match self.members.last_mut() {
            Some(member) => member.pretty_name = pretty.to_string(),
            None => self.errors.push(format!(
                "member_pretty_name on '{}' without a member",
                self.name
            )),
        }
        self
    }

    /// Records that `T` embeds the superclass `P` reachable through the given
    /// projections. `P`'s members are copied into this descriptor during
    /// `perform_registration`.
    pub fn inherits<T: 'static, P: 'static>(
        &mut self,
        super_id: TypeId,
        project: fn(&T) -> &P,
        project_mut: fn(&mut T) -> &mut P,
    ) -> &mut Self {
        if !self.check_owner::<T>("inherits") {
            return self;
        }

        let erased: GetFn = Arc::new(hr_get(move |obj: &dyn Any| {
            obj.downcast_ref::<T>().map(|t| project(t) as &dyn Any)
        }));
        let erased_mut: GetMutFn = Arc::new(hr_get_mut(move |obj: &mut dyn Any| {
            obj.downcast_mut::<T>().map(|t| project_mut(t) as &mut dyn Any)
        }));

        self.superclasses.push(SuperClassEntry {
            type_id: super_id,
            project: erased,
            project_mut: erased_mut,
        });
        self
    }

    /// Marks this as an enum stored as `I`, with explicit conversions.
    pub fn enumeration<T: 'static, I: 'static>(
        &mut self,
        to_underlying: fn(&T) -> i64,
        from_underlying: fn(i64) -> Option<T>,
    ) -> &mut Self {
        if !self.check_owner::<T>("enumeration") {
            return self;
        }

        self.enum_traits = Some(EnumTraits {
            underlying_type: TypeId::NONE,
            to_underlying: Arc::new(move |v: &dyn Any| v.downcast_ref::<T>().map(to_underlying)),
            from_underlying: Arc::new(move |dest: &mut dyn Any, raw: i64| {
                match (dest.downcast_mut::<T>(), from_underlying(raw)) {
                    (Some(dest), Some(value)) => {
                        *dest = value;
                        true
                    }
                    _ => false,
                }
            }),
            value_names: Vec::new(),
            underlying_rust: std::any::TypeId::of::<I>(),
        });
        self
    }

    /// Registers an enum value name for UI enumeration.
    pub fn enum_value(&mut self, value: i64, name: &str) -> &mut Self {
        match self.enum_traits.as_mut() {
            Some(traits) => traits.value_names.push((value, name.to_string())),
            None => self.errors.push(format!(
                "enum_value on '{}' which is not an enumeration",
                self.name
            )),
        }
        self
    }

    /// Marks this as a `Vec<E>` and wires the collection accessors.
    pub fn vector_like<E: Default + Clone + 'static>(&mut self) -> &mut Self {
        if !self.check_owner::<Vec<E>>("vector_like") {
            return self;
        }

        self.vector_traits = Some(VectorTraits {
            element_type: TypeId::NONE,
            len: Arc::new(|v: &dyn Any| v.downcast_ref::<Vec<E>>().map_or(0, Vec::len)),
            get: Arc::new(hr_index(move |v: &dyn Any, index: usize| {
                v.downcast_ref::<Vec<E>>()
                    .and_then(|v| v.get(index))
                    .map(|e| e as &dyn Any)
            })),
            get_mut: Arc::new(hr_index_mut(move |v: &mut dyn Any, index: usize| {
                v.downcast_mut::<Vec<E>>()
                    .and_then(|v| v.get_mut(index))
                    .map(|e| e as &mut dyn Any)
            })),
            resize: Arc::new(|v: &mut dyn Any, len: usize| match v.downcast_mut::<Vec<E>>() {
                Some(v) => {
                    v.resize_with(len, E::default);
                    true
                }
                None => false,
            }),
            erase_at: Arc::new(|v: &mut dyn Any, index: usize| match v.downcast_mut::<Vec<E>>() {
                Some(v) if index < v.len() => {
                    v.remove(index);
                    true
                }
                _ => false,
            }),
            push: Arc::new(|v: &mut dyn Any, element: &dyn Any| {
                match (v.downcast_mut::<Vec<E>>(), element.downcast_ref::<E>()) {
                    (Some(v), Some(e)) => {
                        v.push(e.clone());
                        true
                    }
                    _ => false,
                }
            }),
            element_rust: std::any::TypeId::of::<E>(),
        });
        self
    }

    /// Marks this as a `BTreeMap<K, V>` and wires the collection accessors.
    pub fn map_like<K: Ord + Clone + 'static, V: Clone + 'static>(&mut self) -> &mut Self {
        if !self.check_owner::<BTreeMap<K, V>>("map_like") {
            return self;
        }

        self.map_traits = Some(MapTraits {
            key_type: TypeId::NONE,
            value_type: TypeId::NONE,
            len: Arc::new(|m: &dyn Any| m.downcast_ref::<BTreeMap<K, V>>().map_or(0, BTreeMap::len)),
            get_nth_pair: Arc::new(|m: &dyn Any, index: usize| {
                m.downcast_ref::<BTreeMap<K, V>>().and_then(|m| {
                    m.iter().nth(index).map(|(k, v)| {
                        (
                            Box::new(k.clone()) as Box<dyn Any>,
                            Box::new(v.clone()) as Box<dyn Any>,
                        )
                    })
                })
            }),
            insert: Arc::new(|m: &mut dyn Any, key: &dyn Any, value: &dyn Any| {
                match (
                    m.downcast_mut::<BTreeMap<K, V>>(),
                    key.downcast_ref::<K>(),
                    value.downcast_ref::<V>(),
                ) {
                    (Some(m), Some(k), Some(v)) => {
                        m.insert(k.clone(), v.clone());
                        true
                    }
                    _ => false,
                }
            }),
            key_rust: std::any::TypeId::of::<K>(),
            value_rust: std::any::TypeId::of::<V>(),
        });
        self
    }

    /// Marks this type as an allocatable game object shown in the editor's
    /// creation menus.
    pub fn allocatable<T: GameObject + Default + 'static>(&mut self, category: &str) -> &mut Self {
        if self.check_owner::<T>("allocatable") {
            self.game_object = Some(GameObjectDesc {
                category: if category.is_empty() {
                    None
                } else {
                    Some(category.to_string())
                },
                alloc: Arc::new(|| Box::new(T::default()) as Box<dyn GameObject>),
            });
        }
        self
    }

    pub fn find_member_by_name(&self, member_name: &str) -> Option<&MemberDesc> {
        self.members.iter().find(|m| m.name == member_name)
    }

    pub fn is_enum(&self) -> bool {
        self.enum_traits.is_some()
    }

    pub fn is_vector_like(&self) -> bool {
        self.vector_traits.is_some()
    }

    pub fn is_map_like(&self) -> bool {
        self.map_traits.is_some()
    }
}

/// Computes the UI label for a member name: the `m_` prefix is stripped,
/// underscores become spaces, camel-case words are split, and the first
/// letter is capitalized.
pub fn compute_pretty_name(name: &str) -> String {
    let stripped = name.strip_prefix("m_").unwrap_or(name);

    let mut pretty = String::with_capacity(stripped.len() + 4);
    let mut first = true;
    let mut prev_was_space = false;
    for ch in stripped.chars() {
        if first {
            pretty.extend(ch.to_uppercase());
            first = false;
            continue;
        }

        if ch == '_' {
            pretty.push(' ');
            prev_was_space = true;
            continue;
        }

        if ch.is_uppercase() && !prev_was_space {
            pretty.push(' ');
        }

        if prev_was_space {
            pretty.extend(ch.to_uppercase());
        } else {
            pretty.push(ch);
        }
        prev_was_space = false;
    }

    pretty
}

/// Hook signature for deferred type registration.
pub type RegistrationFn = fn(&mut TypeRegistry);

static REGISTRATION_INVENTORY: Lazy<Mutex<Vec<RegistrationFn>>> =
    Lazy::new(|| Mutex::new(Vec::new()));

/// Submits a registration function to the process-wide inventory. Every
/// registry runs the inventory (once each) during `perform_registration`,
/// which lets game crates contribute their types without owning the
/// registry construction site.
pub fn submit_type_registration(hook: RegistrationFn) {
    REGISTRATION_INVENTORY.lock().unwrap().push(hook);
}

/// The registry of all reflected types.
pub struct TypeRegistry {
    types: BTreeMap<TypeId, TypeDesc>,
    rust_to_type: HashMap<std::any::TypeId, TypeId>,
    game_object_types: BTreeSet<TypeId>,
    flattened: HashSet<TypeId>,
    pending_hooks: Vec<RegistrationFn>,
    applied_inventory: usize,
    conflicts: Vec<String>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            types: BTreeMap::new(),
            rust_to_type: HashMap::new(),
            game_object_types: BTreeSet::new(),
            flattened: HashSet::new(),
            pending_hooks: Vec::new(),
            applied_inventory: 0,
            conflicts: Vec::new(),
        }
    }

    /// Adds a bare descriptor for `T`. Capabilities and members are wired
    /// through the returned builder.
    pub fn add_type<T: 'static>(&mut self, name: &str, type_id: TypeId) -> &mut TypeDesc {
        if type_id.is_null() {
            self.conflicts
                .push(format!("type '{}' registered with the null type id", name));
        }

        let rust = std::any::TypeId::of::<T>();
        if let Some(existing) = self.rust_to_type.get(&rust) {
            if *existing != type_id {
                self.conflicts.push(format!(
                    "type '{}' registered twice with different type ids ({} and {})",
                    name, existing, type_id
                ));
            }
        }
        if self.types.contains_key(&type_id) {
            // Re-registering the same type is tolerated; the descriptor is
            // rebuilt from scratch.
            warn!("type id {} ('{}') is being re-registered", type_id, name);
            self.flattened.remove(&type_id);
        }

        self.rust_to_type.insert(rust, type_id);
        self.types
            .insert(type_id, TypeDesc::create::<T>(name, type_id));
        self.types.get_mut(&type_id).unwrap()
    }

    /// Adds a descriptor for a plain value type, wiring the construct, copy
    /// and compare capabilities in one go.
    pub fn add_value_type<T: Default + Clone + PartialEq + 'static>(
        &mut self,
        name: &str,
        type_id: TypeId,
    ) -> &mut TypeDesc {
        let td = self.add_type::<T>(name, type_id);
        td.constructible::<T>().copyable::<T>().comparable::<T>();
        td
    }

    /// Adds a descriptor for `Vec<E>` with all collection traits wired.
    pub fn add_vector_type<E: Default + Clone + PartialEq + 'static>(
        &mut self,
        name: &str,
        type_id: TypeId,
    ) -> &mut TypeDesc {
        let td = self.add_value_type::<Vec<E>>(name, type_id);
        td.vector_like::<E>();
        td
    }

    /// Adds a descriptor for `BTreeMap<K, V>` with all collection traits
    /// wired.
    pub fn add_map_type<K, V>(&mut self, name: &str, type_id: TypeId) -> &mut TypeDesc
    where
        K: Ord + Default + Clone + PartialEq + 'static,
        V: Default + Clone + PartialEq + 'static,
    {
        let td = self.add_value_type::<BTreeMap<K, V>>(name, type_id);
        td.map_like::<K, V>();
        td
    }

    /// Queues a registration function to run at the next
    /// `perform_registration`.
    pub fn add_registration_fn(&mut self, hook: RegistrationFn) {
        self.pending_hooks.push(hook);
    }

    pub fn find(&self, type_id: TypeId) -> Option<&TypeDesc> {
        self.types.get(&type_id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&TypeDesc> {
        self.types.values().find(|td| td.name == name)
    }

    pub fn find_for<T: 'static>(&self) -> Option<&TypeDesc> {
        self.type_id_of::<T>().and_then(|id| self.find(id))
    }

    pub fn type_id_of<T: 'static>(&self) -> Option<TypeId> {
        self.rust_to_type.get(&std::any::TypeId::of::<T>()).copied()
    }

    pub fn find_member(&self, type_id: TypeId, member_name: &str) -> Option<&MemberDesc> {
        self.find(type_id)
            .and_then(|td| td.find_member_by_name(member_name))
    }

    /// True when `child` inherits `parent` anywhere up its superclass chain.
    pub fn does_inherit(&self, child: TypeId, parent: TypeId) -> bool {
        let Some(td) = self.find(child) else {
            return false;
        };

        for superclass in &td.superclasses {
            if superclass.type_id == parent || self.does_inherit(superclass.type_id, parent) {
                return true;
            }
        }
        false
    }

    /// The cached set of allocatable game-object types, for UI enumeration.
    pub fn game_object_types(&self) -> &BTreeSet<TypeId> {
        &self.game_object_types
    }

    pub fn all_type_ids(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.types.keys().copied()
    }

    /// Runs all deferred registration hooks, resolves member types, flattens
    /// inheritance and caches the game-object type set.
    ///
    /// Idempotent: calling it twice produces the same member lists as
    /// calling it once. Cyclic or missing inheritance is reported as
    /// `UnresolvedInheritance` instead of looping.
    pub fn perform_registration(&mut self) -> Result<(), RegistryError> {
        // Process-wide inventory first, then the per-registry queue; hooks
        // may queue further hooks.
        loop {
            let inventory: Vec<RegistrationFn> = {
                let inventory = REGISTRATION_INVENTORY.lock().unwrap();
                inventory[self.applied_inventory.min(inventory.len())..].to_vec()
            };
            self.applied_inventory += inventory.len();
            for hook in inventory {
                hook(self);
            }

            let pending = std::mem::take(&mut self.pending_hooks);
            if pending.is_empty() {
                break;
            }
            for hook in pending {
                hook(self);
            }
        }

        self.resolve_member_types();
        self.report_registration_errors()?;
        self.flatten_inheritance()?;

        // Cache the allocatable game-object types.
        let cached: BTreeSet<TypeId> = self
            .types
            .values()
            .filter(|td| {
                td.game_object.is_some() && self.does_inherit(td.type_id, core_type_ids::GAME_OBJECT)
            })
            .map(|td| td.type_id)
            .collect();
        self.game_object_types = cached;

        Ok(())
    }

    fn resolve_member_types(&mut self) {
        let rust_to_type = self.rust_to_type.clone();
        let resolve = |rust: std::any::TypeId| rust_to_type.get(&rust).copied();

        for td in self.types.values_mut() {
            for member in &mut td.members {
                match resolve(member.member_rust) {
                    Some(id) => member.type_id = id,
                    None => td.errors.push(format!(
                        "member '{}::{}' has an unregistered type",
                        td.name, member.name
                    )),
                }
            }

            if let Some(traits) = td.vector_traits.as_mut() {
                match resolve(traits.element_rust) {
                    Some(id) => traits.element_type = id,
                    None => td.errors.push(format!(
                        "vector type '{}' has an unregistered element type",
                        td.name
                    )),
                }
            }

            if let Some(traits) = td.map_traits.as_mut() {
                match (resolve(traits.key_rust), resolve(traits.value_rust)) {
                    (Some(key), Some(value)) => {
                        traits.key_type = key;
                        traits.value_type = value;
                    }
                    _ => td.errors.push(format!(
                        "map type '{}' has an unregistered key or value type",
                        td.name
                    )),
                }
            }

            if let Some(traits) = td.enum_traits.as_mut() {
                match resolve(traits.underlying_rust) {
                    Some(id) => traits.underlying_type = id,
                    None => td.errors.push(format!(
                        "enum '{}' has an unregistered underlying type",
                        td.name
                    )),
                }
            }
        }
    }

    fn report_registration_errors(&mut self) -> Result<(), RegistryError> {
        let mut all: Vec<String> = std::mem::take(&mut self.conflicts);
        for td in self.types.values_mut() {
            all.append(&mut td.errors);
        }

        if all.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::InvalidRegistration(all.join("; ")))
        }
    }

    fn flatten_inheritance(&mut self) -> Result<(), RegistryError> {
        loop {
            let mut progressed = false;
            let mut all_complete = true;

            let ids: Vec<TypeId> = self.types.keys().copied().collect();
            for type_id in ids {
                if self.flattened.contains(&type_id) {
                    continue;
                }

                let td = &self.types[&type_id];
                if td.superclasses.is_empty() {
                    self.flattened.insert(type_id);
                    progressed = true;
                    continue;
                }

                let supers_ready = td
                    .superclasses
                    .iter()
                    .all(|s| self.flattened.contains(&s.type_id));
                if !supers_ready {
                    all_complete = false;
                    continue;
                }

                // Copy each superclass's members to the front of the member
                // list, composing the accessors through the projection so the
                // inherited member is addressed on the subclass value.
                let superclasses = td.superclasses.clone();
                let mut inherited: Vec<MemberDesc> = Vec::new();
                for superclass in &superclasses {
                    let super_td = self
                        .types
                        .get(&superclass.type_id)
                        .ok_or_else(|| RegistryError::UnknownType(superclass.type_id))?;

                    for member in &super_td.members {
                        let mut copy = member.clone();
                        copy.owner_type = type_id;
                        copy.access = compose_access(&member.access, superclass);
                        if copy.inherited_from.is_null() {
                            copy.inherited_from = superclass.type_id;
                        }
                        inherited.push(copy);
                    }
                }

                let td = self.types.get_mut(&type_id).unwrap();
                inherited.append(&mut td.members);
                td.members = inherited;

                self.flattened.insert(type_id);
                progressed = true;
            }

            if all_complete {
                return Ok(());
            }
            if !progressed {
                let stuck: Vec<String> = self
                    .types
                    .values()
                    .filter(|td| !self.flattened.contains(&td.type_id))
                    .map(|td| td.name.clone())
                    .collect();
                return Err(RegistryError::UnresolvedInheritance(stuck));
            }
        }
    }
}

fn compose_access(access: &MemberAccess, superclass: &SuperClassEntry) -> MemberAccess {
    match access {
        MemberAccess::Direct { get, get_mut } => {
            let project = superclass.project.clone();
            let project_mut = superclass.project_mut.clone();
            let get = get.clone();
            let get_mut = get_mut.clone();
            MemberAccess::Direct {
                get: Arc::new(hr_get(move |obj: &dyn Any| {
                    project(obj).and_then(|base| get(base))
                })),
                get_mut: Arc::new(hr_get_mut(move |obj: &mut dyn Any| {
                    project_mut(obj).and_then(|base| get_mut(base))
                })),
            }
        }
        MemberAccess::Virtual { read, write } => {
            let project = superclass.project.clone();
            let project_mut = superclass.project_mut.clone();
            let read = read.clone();
            let write = write.clone();
            MemberAccess::Virtual {
                read: Arc::new(move |obj: &dyn Any| project(obj).and_then(|base| read(base))),
                write: Arc::new(move |obj: &mut dyn Any, value: &dyn Any| {
                    project_mut(obj).map_or(false, |base| write(base, value))
                }),
            }
        }
    }
}

/// Registers the primitive, math and id types the serializer special-cases,
/// plus a few commonly used collection instantiations.
pub fn register_primitive_types(lib: &mut TypeRegistry) {
    use core_type_ids::*;

    lib.add_value_type::<bool>("bool", BOOL);
    lib.add_value_type::<i32>("i32", I32);
    lib.add_value_type::<u32>("u32", U32);
    lib.add_value_type::<i64>("i64", I64);
    lib.add_value_type::<u64>("u64", U64);
    lib.add_value_type::<f32>("f32", F32);
    lib.add_value_type::<f64>("f64", F64);
    lib.add_value_type::<String>("String", STRING);

    lib.add_value_type::<Vec2i>("Vec2i", VEC2I)
        .member::<Vec2i, i32>("x", |v| &v.x, |v| &mut v.x, 0)
        .member::<Vec2i, i32>("y", |v| &v.y, |v| &mut v.y, 0);

    lib.add_value_type::<Vector3>("Vector3", VECTOR3)
        .member::<Vector3, f32>("x", |v| &v.x, |v| &mut v.x, 0)
        .member::<Vector3, f32>("y", |v| &v.y, |v| &mut v.y, 0)
        .member::<Vector3, f32>("z", |v| &v.z, |v| &mut v.z, 0);

    lib.add_value_type::<Quat>("Quat", QUAT)
        .member::<Quat, f32>("x", |v| &v.x, |v| &mut v.x, 0)
        .member::<Quat, f32>("y", |v| &v.y, |v| &mut v.y, 0)
        .member::<Quat, f32>("z", |v| &v.z, |v| &mut v.z, 0)
        .member::<Quat, f32>("w", |v| &v.w, |v| &mut v.w, 0);

    // Transform3D is special-cased by the serializer, but still carries
    // members so member chains can address its parts.
    lib.add_value_type::<Transform3D>("Transform3D", TRANSFORM3D)
        .member::<Transform3D, Vector3>("translation", |t| &t.translation, |t| &mut t.translation, 0)
        .member::<Transform3D, Quat>("rotation", |t| &t.rotation, |t| &mut t.rotation, 0)
        .member::<Transform3D, Vector3>("scale", |t| &t.scale, |t| &mut t.scale, 0);

    lib.add_value_type::<Box3>("Box3", BOX3)
        .member::<Box3, Vector3>("min", |b| &b.min, |b| &mut b.min, 0)
        .member::<Box3, Vector3>("max", |b| &b.max, |b| &mut b.max, 0);

    lib.add_value_type::<ObjectId>("ObjectId", OBJECT_ID)
        .member::<ObjectId, i32>("id", |v| &v.0, |v| &mut v.0, 0);

    lib.add_vector_type::<i32>("Vec<i32>", VEC_I32);
    lib.add_vector_type::<f32>("Vec<f32>", VEC_F32);
    lib.add_vector_type::<String>("Vec<String>", VEC_STRING);
    lib.add_vector_type::<ObjectId>("Vec<ObjectId>", VEC_OBJECT_ID);
    lib.add_map_type::<String, String>("BTreeMap<String, String>", MAP_STRING_STRING);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, Clone, PartialEq)]
    struct Base {
        health: i32,
        label: String,
    }

    #[derive(Default, Clone, PartialEq)]
    struct Derived {
        base: Base,
        speed: f32,
    }

    const BASE_ID: TypeId = TypeId(21_09_01_0001);
    const DERIVED_ID: TypeId = TypeId(21_09_01_0002);

    fn build_registry() -> TypeRegistry {
        let mut lib = TypeRegistry::new();
        register_primitive_types(&mut lib);

        lib.add_value_type::<Base>("Base", BASE_ID)
            .member::<Base, i32>("health", |b| &b.health, |b| &mut b.health, 0)
            .member::<Base, String>("label", |b| &b.label, |b| &mut b.label, 0);

        lib.add_value_type::<Derived>("Derived", DERIVED_ID)
            .inherits::<Derived, Base>(BASE_ID, |d| &d.base, |d| &mut d.base)
            .member::<Derived, f32>("speed", |d| &d.speed, |d| &mut d.speed, 0);

        lib.perform_registration().unwrap();
        lib
    }

    #[test]
    fn lookup_by_id_and_name() {
        let lib = build_registry();
        assert_eq!(lib.find(BASE_ID).unwrap().name, "Base");
        assert_eq!(lib.find_by_name("Derived").unwrap().type_id, DERIVED_ID);
        assert!(lib.find(TypeId(999)).is_none());
        assert!(lib.find_by_name("Nope").is_none());
    }

    #[test]
    fn inheritance_is_flattened_with_base_members_first() {
        let lib = build_registry();
        let derived = lib.find(DERIVED_ID).unwrap();

        let names: Vec<&str> = derived.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["health", "label", "speed"]);

        let health = derived.find_member_by_name("health").unwrap();
        assert_eq!(health.owner_type, DERIVED_ID);
        assert_eq!(health.inherited_from, BASE_ID);

        // The composed accessor reads through the embedded base.
        let value = Derived {
            base: Base {
                health: 42,
                label: "x".into(),
            },
            speed: 1.0,
        };
        let MemberAccess::Direct { get, .. } = &health.access else {
            panic!("expected a direct member");
        };
        let read = get(&value as &dyn Any).unwrap();
        assert_eq!(*read.downcast_ref::<i32>().unwrap(), 42);
    }

    #[test]
    fn registration_pass_is_idempotent() {
        let mut lib = build_registry();
        let before = lib.find(DERIVED_ID).unwrap().members.len();
        lib.perform_registration().unwrap();
        let after = lib.find(DERIVED_ID).unwrap().members.len();
        assert_eq!(before, after);
    }

    #[test]
    fn cyclic_inheritance_is_reported() {
        #[derive(Default, Clone, PartialEq)]
        struct A(i32);
        #[derive(Default, Clone, PartialEq)]
        struct B(i32);

        let mut lib = TypeRegistry::new();
        register_primitive_types(&mut lib);

        const A_ID: TypeId = TypeId(21_09_01_0003);
        const B_ID: TypeId = TypeId(21_09_01_0004);

        // The projections are nonsense, but the cycle is what matters: the
        // flattening pass must report it rather than spin.
        lib.add_value_type::<A>("A", A_ID)
            .inherits::<A, A>(B_ID, |a| a, |a| a);
        lib.add_value_type::<B>("B", B_ID)
            .inherits::<B, B>(A_ID, |b| b, |b| b);

        match lib.perform_registration() {
            Err(RegistryError::UnresolvedInheritance(stuck)) => {
                assert!(stuck.contains(&"A".to_string()));
                assert!(stuck.contains(&"B".to_string()));
            }
            other => panic!("expected UnresolvedInheritance, got {:?}", other.err()),
        }
    }

    #[test]
    fn wrong_owner_member_is_a_registration_error() {
        let mut lib = TypeRegistry::new();
        register_primitive_types(&mut lib);

        const A_ID: TypeId = TypeId(21_09_01_0005);
        lib.add_value_type::<Base>("Base", A_ID)
            // Deliberately register a member with the wrong owner type.
            .member::<Vector3, f32>("x", |v| &v.x, |v| &mut v.x, 0);

        assert!(matches!(
            lib.perform_registration(),
            Err(RegistryError::InvalidRegistration(_))
        ));
    }

    #[test]
    fn unregistered_member_type_is_reported() {
        // Vec<u8> is never registered, so the member type cannot resolve.
        #[derive(Default, Clone, PartialEq)]
        struct Holder {
            value: Vec<u8>,
        }

        let mut lib = TypeRegistry::new();
        register_primitive_types(&mut lib);

        const HOLDER_ID: TypeId = TypeId(21_09_01_0007);
        lib.add_value_type::<Holder>("Holder", HOLDER_ID).member::<Holder, Vec<u8>>(
            "value",
            |h| &h.value,
            |h| &mut h.value,
            0,
        );

        assert!(matches!(
            lib.perform_registration(),
            Err(RegistryError::InvalidRegistration(_))
        ));
    }

    #[test]
    fn pretty_names() {
        assert_eq!(compute_pretty_name("logic_transform"), "Logic Transform");
        assert_eq!(compute_pretty_name("m_displayName"), "Display Name");
        assert_eq!(compute_pretty_name("speed"), "Speed");
    }

    #[test]
    fn submitted_registration_hooks_run_on_perform() {
        #[derive(Default, Clone, PartialEq)]
        struct HookContributed {
            value: i32,
        }

        fn register_hook_type(lib: &mut TypeRegistry) {
            lib.add_value_type::<HookContributed>("HookContributed", TypeId(21_09_20_0001))
                .member::<HookContributed, i32>("value", |h| &h.value, |h| &mut h.value, 0);
        }

        submit_type_registration(register_hook_type);

        let mut lib = TypeRegistry::new();
        register_primitive_types(&mut lib);
        lib.perform_registration().unwrap();
        assert!(lib.find_by_name("HookContributed").is_some());
    }

    #[test]
    fn vector_traits_roundtrip() {
        let lib = build_registry();
        let td = lib.find(core_type_ids::VEC_I32).unwrap();
        let traits = td.vector_traits.as_ref().unwrap();

        let mut values: Vec<i32> = vec![1, 2, 3];
        {
            let any: &mut dyn Any = &mut values;
            assert!((traits.resize)(any, 5));
            assert_eq!((traits.len)(any), 5);
            assert!((traits.erase_at)(any, 0));
            let element = (traits.get)(any, 0).unwrap();
            assert_eq!(*element.downcast_ref::<i32>().unwrap(), 2);
        }
    }
}
