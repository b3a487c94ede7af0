//! # Common Types
//!
//! The math types the scene graph is built from. Only the operations the
//! engine core actually needs are implemented: transform composition,
//! inversion and the parent/child binding-transform math used when
//! reparenting actors.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Neg, Sub};

/// A 3-component float vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn splat(v: f32) -> Self {
        Self { x: v, y: v, z: v }
    }

    pub fn zero() -> Self {
        Self::splat(0.0)
    }

    pub fn one() -> Self {
        Self::splat(1.0)
    }

    /// Component-wise reciprocal; components that are zero map to a large
    /// finite value instead of infinity so the result stays usable.
    pub fn reciprocal_safe(&self) -> Self {
        let inv = |v: f32| if v != 0.0 { 1.0 / v } else { 1e-6 };
        Self::new(inv(self.x), inv(self.y), inv(self.z))
    }

    /// Component-wise multiplication.
    pub fn mul_comp(&self, rhs: &Vector3) -> Self {
        Self::new(self.x * rhs.x, self.y * rhs.y, self.z * rhs.z)
    }

    pub fn has_any_zero_component(&self, eps: f32) -> bool {
        self.x.abs() <= eps || self.y.abs() <= eps || self.z.abs() <= eps
    }
}

impl Default for Vector3 {
    fn default() -> Self {
        Self::zero()
    }
}

impl Add for Vector3 {
    type Output = Vector3;
    fn add(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vector3 {
    type Output = Vector3;
    fn sub(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vector3 {
    type Output = Vector3;
    fn mul(self, rhs: f32) -> Vector3 {
        Vector3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vector3 {
    type Output = Vector3;
    fn neg(self) -> Vector3 {
        Vector3::new(-self.x, -self.y, -self.z)
    }
}

/// A 2-component integer vector (grid dimensions and similar settings).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vec2i {
    pub x: i32,
    pub y: i32,
}

impl Vec2i {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn splat(v: i32) -> Self {
        Self { x: v, y: v }
    }
}

impl Default for Vec2i {
    fn default() -> Self {
        Self::splat(0)
    }
}

/// A rotation quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    pub fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }

    /// Rotation of `angle` radians around the (normalized) `axis`.
    pub fn from_axis_angle(axis: Vector3, angle: f32) -> Self {
        let half = angle * 0.5;
        let s = half.sin();
        Self::new(axis.x * s, axis.y * s, axis.z * s, half.cos())
    }

    pub fn conjugate(&self) -> Self {
        Self::new(-self.x, -self.y, -self.z, self.w)
    }

    pub fn length_sqr(&self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w
    }

    pub fn inverse(&self) -> Self {
        let len_sqr = self.length_sqr();
        if len_sqr == 0.0 {
            return Self::identity();
        }
        let inv = 1.0 / len_sqr;
        let c = self.conjugate();
        Self::new(c.x * inv, c.y * inv, c.z * inv, c.w * inv)
    }

    /// Hamilton product, `self` applied after `rhs`.
    pub fn mul_quat(&self, rhs: &Quat) -> Quat {
        Quat::new(
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        )
    }

    /// Rotates a point by this quaternion.
    pub fn rotate_point(&self, p: Vector3) -> Vector3 {
        let qv = Vector3::new(self.x, self.y, self.z);
        let uv = cross(qv, p);
        let uuv = cross(qv, uv);
        p + (uv * self.w + uuv) * 2.0
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::identity()
    }
}

fn cross(a: Vector3, b: Vector3) -> Vector3 {
    Vector3::new(
        a.y * b.z - a.z * b.y,
        a.z * b.x - a.x * b.z,
        a.x * b.y - a.y * b.x,
    )
}

/// A translation/rotation/scale transform, the spatial state of every actor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform3D {
    pub translation: Vector3,
    pub rotation: Quat,
    pub scale: Vector3,
}

impl Transform3D {
    pub fn new(translation: Vector3, rotation: Quat, scale: Vector3) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    pub fn identity() -> Self {
        Self {
            translation: Vector3::zero(),
            rotation: Quat::identity(),
            scale: Vector3::one(),
        }
    }

    pub fn from_translation(translation: Vector3) -> Self {
        Self {
            translation,
            ..Self::identity()
        }
    }

    /// Composes two transforms; the translation of `rhs` is applied in the
    /// orientation and scale of `self`, not in the world basis.
    pub fn combine(&self, rhs: &Transform3D) -> Transform3D {
        Transform3D {
            rotation: self.rotation.mul_quat(&rhs.rotation),
            scale: self.scale.mul_comp(&rhs.scale),
            translation: self.translation
                + self.rotation.rotate_point(rhs.translation.mul_comp(&self.scale)),
        }
    }

    pub fn inverse_simple(&self) -> Transform3D {
        let inv_rotation = self.rotation.inverse();
        let inv_scale = self.scale.reciprocal_safe();
        Transform3D {
            rotation: inv_rotation,
            scale: inv_scale,
            translation: inv_rotation.rotate_point(inv_scale.mul_comp(&-self.translation)),
        }
    }

    /// Computes the transform of `self` relative to `parent`, such that
    /// `apply_binding_transform(binding, parent) == self`.
    pub fn compute_binding_transform(&self, parent: &Transform3D) -> Transform3D {
        let parent_inv_scale = parent.scale.reciprocal_safe();
        let parent_inv_rotation = parent.rotation.inverse();

        Transform3D {
            scale: parent_inv_scale.mul_comp(&self.scale),
            rotation: parent_inv_rotation.mul_quat(&self.rotation),
            translation: parent_inv_rotation
                .rotate_point(self.translation - parent.translation)
                .mul_comp(&parent_inv_scale),
        }
    }

    /// Re-derives a child world transform from its stored binding transform
    /// and the parent's current world transform.
    pub fn apply_binding_transform(binding: &Transform3D, parent: &Transform3D) -> Transform3D {
        parent.combine(binding)
    }
}

impl Default for Transform3D {
    fn default() -> Self {
        Self::identity()
    }
}

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Box3 {
    pub min: Vector3,
    pub max: Vector3,
}

impl Box3 {
    pub fn new(min: Vector3, max: Vector3) -> Self {
        Self { min, max }
    }

    /// An empty box: min above max, so any union fixes it up.
    pub fn empty() -> Self {
        Self {
            min: Vector3::splat(f32::MAX),
            max: Vector3::splat(f32::MIN),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn expand_to_point(&mut self, p: Vector3) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }
}

impl Default for Box3 {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    fn approx_v(a: Vector3, b: Vector3) -> bool {
        approx(a.x, b.x) && approx(a.y, b.y) && approx(a.z, b.z)
    }

    #[test]
    fn quat_rotation_roundtrip() {
        let q = Quat::from_axis_angle(Vector3::new(0.0, 1.0, 0.0), std::f32::consts::FRAC_PI_2);
        let p = Vector3::new(1.0, 0.0, 0.0);
        let rotated = q.rotate_point(p);
        assert!(approx_v(rotated, Vector3::new(0.0, 0.0, -1.0)));
        let back = q.inverse().rotate_point(rotated);
        assert!(approx_v(back, p));
    }

    #[test]
    fn combine_with_identity_is_noop() {
        let t = Transform3D::new(
            Vector3::new(1.0, 2.0, 3.0),
            Quat::from_axis_angle(Vector3::new(0.0, 0.0, 1.0), 0.7),
            Vector3::new(2.0, 2.0, 2.0),
        );
        let id = Transform3D::identity();
        assert_eq!(t.combine(&id), t);
    }

    #[test]
    fn binding_transform_roundtrip() {
        let parent = Transform3D::new(
            Vector3::new(5.0, 0.0, -1.0),
            Quat::from_axis_angle(Vector3::new(0.0, 1.0, 0.0), 0.5),
            Vector3::new(2.0, 1.0, 1.0),
        );
        let child = Transform3D::new(
            Vector3::new(1.0, 2.0, 3.0),
            Quat::from_axis_angle(Vector3::new(1.0, 0.0, 0.0), -0.25),
            Vector3::new(1.0, 3.0, 1.0),
        );

        let binding = child.compute_binding_transform(&parent);
        let rebuilt = Transform3D::apply_binding_transform(&binding, &parent);

        assert!(approx_v(rebuilt.translation, child.translation));
        assert!(approx_v(rebuilt.scale, child.scale));
        assert!(approx(rebuilt.rotation.x, child.rotation.x));
        assert!(approx(rebuilt.rotation.w, child.rotation.w));
    }

    #[test]
    fn inverse_composes_to_identity_for_uniform_scale() {
        let t = Transform3D::new(
            Vector3::new(-2.0, 4.0, 1.0),
            Quat::from_axis_angle(Vector3::new(0.0, 1.0, 0.0), 1.2),
            Vector3::splat(2.0),
        );
        let round = t.combine(&t.inverse_simple());
        assert!(approx_v(round.translation, Vector3::zero()));
        assert!(approx_v(round.scale, Vector3::one()));
        assert!(approx(round.rotation.w.abs(), 1.0));
    }

    #[test]
    fn box_expansion() {
        let mut b = Box3::empty();
        assert!(b.is_empty());
        b.expand_to_point(Vector3::new(-1.0, 0.0, 2.0));
        b.expand_to_point(Vector3::new(3.0, -2.0, 0.0));
        assert!(!b.is_empty());
        assert_eq!(b.min, Vector3::new(-1.0, -2.0, 0.0));
        assert_eq!(b.max, Vector3::new(3.0, 0.0, 2.0));
    }
}
