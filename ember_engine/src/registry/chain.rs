//! # Member Chains
//!
//! A [`MemberChain`] is a path from a root value to a (possibly deeply
//! nested) member: a list of knots, each naming a member of the previous
//! knot's type and, for vector-like members, optionally an element index.
//!
//! Chains are how the command engine and the prefab id-remapper address
//! fields without compile-time knowledge of the owning type. `add` refuses
//! knots that do not fit the chain's current leaf type, so a well-formed
//! chain can always be followed against a root of the expected type.

use super::{MemberAccess, MemberDesc, TypeDesc, TypeRegistry};
use ember_shared::TypeId;
use log::error;
use std::any::Any;

/// One step of a chain: a member plus an optional collection index.
#[derive(Clone)]
pub struct ChainKnot {
    pub member: MemberDesc,

    /// When the member is vector-like, addressing an element instead of the
    /// whole collection.
    pub array_index: Option<usize>,
}

/// A reflective path to a member of a member of a member...
#[derive(Clone, Default)]
pub struct MemberChain {
    pub knots: Vec<ChainKnot>,
}

impl MemberChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a single-knot chain.
    pub fn from_member(member: &MemberDesc, array_index: Option<usize>) -> Self {
        Self {
            knots: vec![ChainKnot {
                member: member.clone(),
                array_index,
            }],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.knots.is_empty()
    }

    /// Appends a knot. Returns false (and leaves the chain untouched) when
    /// the member's owner type does not match the chain's current leaf type,
    /// which guards against building chains across unrelated types.
    pub fn add(
        &mut self,
        lib: &TypeRegistry,
        member: &MemberDesc,
        array_index: Option<usize>,
    ) -> bool {
        if let Some(leaf) = self.leaf_type_id(lib) {
            if member.owner_type != leaf {
                return false;
            }
        } else if !self.knots.is_empty() {
            // A broken chain never accepts further knots.
            return false;
        }

        self.knots.push(ChainKnot {
            member: member.clone(),
            array_index,
        });
        true
    }

    pub fn pop(&mut self) {
        self.knots.pop();
    }

    pub fn clear(&mut self) {
        self.knots.clear();
    }

    /// The semantic type of the chain's leaf: the last member's type, or the
    /// element type when the last knot indexes into a vector-like member.
    pub fn leaf_type<'l>(&self, lib: &'l TypeRegistry) -> Option<&'l TypeDesc> {
        let last = self.knots.last()?;
        let td = lib.find(last.member.type_id)?;

        if last.array_index.is_some() {
            if let Some(traits) = &td.vector_traits {
                return lib.find(traits.element_type);
            }
        }
        Some(td)
    }

    pub fn leaf_type_id(&self, lib: &TypeRegistry) -> Option<TypeId> {
        self.leaf_type(lib).map(|td| td.type_id)
    }

    /// The leaf member when the chain does not index into a collection.
    pub fn leaf_member_if_not_indexing(&self) -> Option<&MemberDesc> {
        let last = self.knots.last()?;
        if last.array_index.is_some() {
            return None;
        }
        Some(&last.member)
    }

    /// Walks the chain from `root` and borrows the addressed field.
    ///
    /// Returns `None` when any knot is an accessor-only member (those must
    /// be read/written through [`MemberChain::read_value`] and
    /// [`MemberChain::write_value`]) or when the root does not match the
    /// chain's owning type.
    pub fn follow<'a>(&self, lib: &TypeRegistry, root: &'a dyn Any) -> Option<&'a dyn Any> {
        self.follow_knots(lib, root, self.knots.len())
    }

    fn follow_knots<'a>(
        &self,
        lib: &TypeRegistry,
        root: &'a dyn Any,
        count: usize,
    ) -> Option<&'a dyn Any> {
        let mut current = root;
        for knot in &self.knots[..count] {
            let MemberAccess::Direct { get, .. } = &knot.member.access else {
                return None;
            };
            current = get(current)?;

            if let Some(index) = knot.array_index {
                let td = lib.find(knot.member.type_id)?;
                let traits = td.vector_traits.as_ref()?;
                current = (traits.get)(current, index)?;
            }
        }
        Some(current)
    }

    /// Mutable twin of [`MemberChain::follow`].
    pub fn follow_mut<'a>(
        &self,
        lib: &TypeRegistry,
        root: &'a mut dyn Any,
    ) -> Option<&'a mut dyn Any> {
        self.follow_knots_mut(lib, root, self.knots.len())
    }

    fn follow_knots_mut<'a>(
        &self,
        lib: &TypeRegistry,
        root: &'a mut dyn Any,
        count: usize,
    ) -> Option<&'a mut dyn Any> {
        let mut current = root;
        for knot in &self.knots[..count] {
            let MemberAccess::Direct { get_mut, .. } = &knot.member.access else {
                return None;
            };
            current = get_mut(current)?;

            if let Some(index) = knot.array_index {
                let td = lib.find(knot.member.type_id)?;
                let traits = td.vector_traits.as_ref()?;
                current = (traits.get_mut)(current, index)?;
            }
        }
        Some(current)
    }

    /// Clones the addressed value out of `root`, going through the leaf's
    /// get-accessor when the leaf is accessor-only.
    pub fn read_value(&self, lib: &TypeRegistry, root: &dyn Any) -> Option<Box<dyn Any>> {
        let last = self.knots.last()?;

        if let MemberAccess::Virtual { read, .. } = &last.member.access {
            if last.array_index.is_some() {
                return None;
            }
            let parent = self.follow_knots(lib, root, self.knots.len() - 1)?;
            return read(parent);
        }

        let leaf = self.follow(lib, root)?;
        let td = self.leaf_type(lib)?;
        let clone_fn = td.clone_fn.as_ref()?;
        clone_fn(leaf)
    }

    /// Writes `value` into the field addressed by the chain, going through
    /// the leaf's set-accessor when the leaf is accessor-only. Returns false
    /// when the chain cannot be resolved against `root` or the value type
    /// does not match.
    pub fn write_value(&self, lib: &TypeRegistry, root: &mut dyn Any, value: &dyn Any) -> bool {
        let Some(last) = self.knots.last() else {
            return false;
        };

        if let MemberAccess::Virtual { write, .. } = &last.member.access {
            if last.array_index.is_some() {
                return false;
            }
            let Some(parent) = self.follow_knots_mut(lib, root, self.knots.len() - 1) else {
                return false;
            };
            return write(parent, value);
        }

        let Some(td) = self.leaf_type(lib) else {
            return false;
        };
        let Some(assign_fn) = td.assign_fn.clone() else {
            error!("member chain leaf type '{}' is not assignable", td.name);
            return false;
        };
        match self.follow_mut(lib, root) {
            Some(dest) => assign_fn(dest, value),
            None => false,
        }
    }

    /// Recursively visits this chain and every reachable sub-member below
    /// it: nested struct members and vector elements. Accessor-only members
    /// are visited as their own node but not descended into.
    pub fn for_each_member(
        &self,
        lib: &TypeRegistry,
        root: &dyn Any,
        visit: &mut dyn FnMut(&MemberChain),
    ) {
        if self.knots.is_empty() {
            return;
        }
        self.for_each_member_inner(lib, root, visit);
    }

    fn for_each_member_inner(
        &self,
        lib: &TypeRegistry,
        root: &dyn Any,
        visit: &mut dyn FnMut(&MemberChain),
    ) {
        let Some(td) = self.leaf_type(lib) else {
            return;
        };

        visit(self);

        // Accessor-only leaves are terminal: there is no stable borrow of
        // their value to descend into.
        if let Some(last) = self.knots.last() {
            if !last.member.is_direct() {
                return;
            }
        }

        // Struct members.
        let members: Vec<MemberDesc> = td.members.clone();
        for member in &members {
            let mut chain = self.clone();
            if chain.add(lib, member, None) {
                chain.for_each_member_inner(lib, root, visit);
            }
        }

        // Vector elements: revisit the last knot once per element.
        if let Some(traits) = &td.vector_traits {
            if self.knots.last().map_or(false, |k| k.array_index.is_none()) {
                if let Some(vector) = self.follow(lib, root) {
                    let len = (traits.len)(vector);
                    for index in 0..len {
                        let mut chain = self.clone();
                        chain.knots.last_mut().unwrap().array_index = Some(index);
                        chain.for_each_member_inner(lib, root, visit);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{core_type_ids, register_primitive_types};
    use ember_shared::ObjectId;

    #[derive(Default, Clone, PartialEq)]
    struct Waypoint {
        target: ObjectId,
        weight: f32,
    }

    #[derive(Default, Clone, PartialEq)]
    struct Route {
        name: String,
        waypoints: Vec<Waypoint>,
        speed_limit: f32,
    }

    const WAYPOINT_ID: TypeId = TypeId(21_09_02_0001);
    const VEC_WAYPOINT_ID: TypeId = TypeId(21_09_02_0002);
    const ROUTE_ID: TypeId = TypeId(21_09_02_0003);

    fn build_registry() -> TypeRegistry {
        let mut lib = TypeRegistry::new();
        register_primitive_types(&mut lib);

        lib.add_value_type::<Waypoint>("Waypoint", WAYPOINT_ID)
            .member::<Waypoint, ObjectId>("target", |w| &w.target, |w| &mut w.target, 0)
            .member::<Waypoint, f32>("weight", |w| &w.weight, |w| &mut w.weight, 0);

        lib.add_vector_type::<Waypoint>("Vec<Waypoint>", VEC_WAYPOINT_ID);

        lib.add_value_type::<Route>("Route", ROUTE_ID)
            .member::<Route, String>("name", |r| &r.name, |r| &mut r.name, 0)
            .member::<Route, Vec<Waypoint>>("waypoints", |r| &r.waypoints, |r| &mut r.waypoints, 0)
            .member_virtual::<Route, f32>(
                "speed_limit",
                |r| r.speed_limit,
                |r, v| r.speed_limit = v,
                0,
            );

        lib.perform_registration().unwrap();
        lib
    }

    fn sample_route() -> Route {
        Route {
            name: "patrol".into(),
            waypoints: vec![
                Waypoint {
                    target: ObjectId(3),
                    weight: 1.0,
                },
                Waypoint {
                    target: ObjectId(7),
                    weight: 0.5,
                },
            ],
            speed_limit: 12.0,
        }
    }

    #[test]
    fn add_rejects_mismatched_owner() {
        let lib = build_registry();
        let route_td = lib.find(ROUTE_ID).unwrap();
        let waypoint_td = lib.find(WAYPOINT_ID).unwrap();

        let mut chain = MemberChain::new();
        assert!(chain.add(&lib, route_td.find_member_by_name("name").unwrap(), None));

        // `Waypoint::target` is not a member of String.
        assert!(!chain.add(&lib, waypoint_td.find_member_by_name("target").unwrap(), None));
        assert_eq!(chain.knots.len(), 1);
    }

    #[test]
    fn follow_through_vector_index() {
        let lib = build_registry();
        let route_td = lib.find(ROUTE_ID).unwrap();
        let waypoint_td = lib.find(WAYPOINT_ID).unwrap();

        let mut chain = MemberChain::new();
        assert!(chain.add(
            &lib,
            route_td.find_member_by_name("waypoints").unwrap(),
            Some(1)
        ));
        assert!(chain.add(&lib, waypoint_td.find_member_by_name("target").unwrap(), None));
        assert_eq!(chain.leaf_type_id(&lib), Some(core_type_ids::OBJECT_ID));

        let route = sample_route();
        let leaf = chain.follow(&lib, &route as &dyn Any).unwrap();
        assert_eq!(*leaf.downcast_ref::<ObjectId>().unwrap(), ObjectId(7));
    }

    #[test]
    fn write_through_chain() {
        let lib = build_registry();
        let route_td = lib.find(ROUTE_ID).unwrap();

        let mut route = sample_route();
        let mut chain = MemberChain::new();
        assert!(chain.add(&lib, route_td.find_member_by_name("name").unwrap(), None));

        let new_name = "escort".to_string();
        assert!(chain.write_value(&lib, &mut route as &mut dyn Any, &new_name as &dyn Any));
        assert_eq!(route.name, "escort");
    }

    #[test]
    fn virtual_member_follow_is_none_but_read_write_work() {
        let lib = build_registry();
        let route_td = lib.find(ROUTE_ID).unwrap();

        let mut route = sample_route();
        let mut chain = MemberChain::new();
        assert!(chain.add(
            &lib,
            route_td.find_member_by_name("speed_limit").unwrap(),
            None
        ));

        assert!(chain.follow(&lib, &route as &dyn Any).is_none());

        let read = chain.read_value(&lib, &route as &dyn Any).unwrap();
        assert_eq!(*read.downcast_ref::<f32>().unwrap(), 12.0);

        let new_value = 30.0f32;
        assert!(chain.write_value(&lib, &mut route as &mut dyn Any, &new_value as &dyn Any));
        assert_eq!(route.speed_limit, 30.0);
    }

    #[test]
    fn for_each_member_visits_vector_elements_once() {
        let lib = build_registry();
        let route_td = lib.find(ROUTE_ID).unwrap();

        let route = sample_route();
        let mut object_id_leaves = 0;
        let mut visited = 0;

        for member in &route_td.members {
            let mut chain = MemberChain::new();
            assert!(chain.add(&lib, member, None));
            chain.for_each_member(&lib, &route as &dyn Any, &mut |c| {
                visited += 1;
                if c.leaf_type_id(&lib) == Some(core_type_ids::OBJECT_ID) {
                    object_id_leaves += 1;
                }
            });
        }

        // One ObjectId leaf per waypoint element.
        assert_eq!(object_id_leaves, 2);
        assert!(visited > 4);
    }
}
