//! # Camera Trait
//!
//! The camera-providing capability. An object that attaches a
//! [`TraitCamera`] can be picked as the world's camera provider; the editor
//! falls back to its own camera when no playing object provides one.

use crate::object::{ObjectTrait, TraitFamily};
use crate::registry::{core_type_ids, TypeRegistry};
use ember_shared::TypeId;
use std::any::Any;

/// Projection parameters of a gameplay camera.
#[derive(Debug, Clone, PartialEq)]
pub struct TraitCamera {
    /// Vertical field of view, radians.
    pub fov: f32,
    pub near_plane: f32,
    pub far_plane: f32,
}

impl TraitCamera {
    pub const FAMILY_ID: TypeId = core_type_ids::TRAIT_CAMERA;
}

impl Default for TraitCamera {
    fn default() -> Self {
        Self {
            fov: 60.0_f32.to_radians(),
            near_plane: 0.1,
            far_plane: 10000.0,
        }
    }
}

impl ObjectTrait for TraitCamera {
    fn family(&self) -> TypeId {
        Self::FAMILY_ID
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl TraitFamily for TraitCamera {
    const FAMILY: TypeId = TraitCamera::FAMILY_ID;
}

pub fn register_trait_camera_types(lib: &mut TypeRegistry) {
    lib.add_value_type::<TraitCamera>("TraitCamera", core_type_ids::TRAIT_CAMERA)
        .member::<TraitCamera, f32>("fov", |c| &c.fov, |c| &mut c.fov, 0)
        .member::<TraitCamera, f32>("near_plane", |c| &c.near_plane, |c| &mut c.near_plane, 0)
        .member::<TraitCamera, f32>("far_plane", |c| &c.far_plane, |c| &mut c.far_plane, 0);
}
