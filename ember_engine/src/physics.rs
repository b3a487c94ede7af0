//! # Physics Seam
//!
//! The engine core does not own a physics solver; it owns the contract a
//! backend must satisfy and the per-tick contact-manifold bookkeeping the
//! gameplay layer queries. A backend wrapping an actual rigid-body engine
//! plugs in through [`PhysicsBackend`]; the world calls it once per tick.

use ember_shared::{ObjectId, Transform3D, Vector3};
use std::collections::HashMap;

/// One contact manifold between two bodies, reported by the backend after a
/// simulation step.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactManifold {
    pub body_a: ObjectId,
    pub body_b: ObjectId,
    pub num_contacts: u32,
}

impl ContactManifold {
    /// The other participant, given one of the two.
    pub fn other(&self, body: ObjectId) -> Option<ObjectId> {
        if self.body_a == body {
            Some(self.body_b)
        } else if self.body_b == body {
            Some(self.body_a)
        } else {
            None
        }
    }
}

/// The contract between the world and an external rigid-body engine.
pub trait PhysicsBackend {
    fn set_gravity(&mut self, gravity: Vector3);

    /// An actor moved through the editor or a command; the backend should
    /// teleport the matching rigid body (and optionally zero velocities).
    fn on_actor_transformed(&mut self, id: ObjectId, transform: &Transform3D, kill_velocity: bool);

    /// The object is gone; any rigid body for it must be dropped.
    fn on_object_destroyed(&mut self, id: ObjectId);

    /// Steps the simulation and reports the resulting contact manifolds.
    fn step_simulation(&mut self, dt: f32, num_sub_steps: i32) -> Vec<ContactManifold>;

    /// Called on paused ticks so collision queries used by editor tools stay
    /// current without stepping the simulation.
    fn refresh_queries(&mut self) {}
}

/// The per-tick manifold bookkeeping, rebuilt from the backend's report.
#[derive(Default)]
pub struct ManifoldBook {
    by_body: HashMap<ObjectId, Vec<ContactManifold>>,
}

impl ManifoldBook {
    pub fn clear(&mut self) {
        self.by_body.clear();
    }

    /// Replaces the book's contents with this tick's manifolds. Manifolds
    /// without contacts are not listed.
    pub fn rebuild(&mut self, manifolds: Vec<ContactManifold>) {
        self.by_body.clear();
        for manifold in manifolds {
            if manifold.num_contacts == 0 {
                continue;
            }
            self.by_body
                .entry(manifold.body_a)
                .or_default()
                .push(manifold.clone());
            self.by_body
                .entry(manifold.body_b)
                .or_default()
                .push(manifold);
        }
    }

    pub fn manifolds_for(&self, body: ObjectId) -> Option<&[ContactManifold]> {
        self.by_body.get(&body).map(Vec::as_slice)
    }

    /// Removes every manifold the body participates in, including the
    /// entries listed under the other participant. Used when a body is
    /// invalidated mid-tick.
    pub fn remove_body(&mut self, body: ObjectId) {
        let Some(manifolds) = self.by_body.remove(&body) else {
            return;
        };

        for manifold in manifolds {
            if let Some(other) = manifold.other(body) {
                if let Some(list) = self.by_body.get_mut(&other) {
                    list.retain(|m| m.other(other) != Some(body));
                    if list.is_empty() {
                        self.by_body.remove(&other);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifold(a: i32, b: i32) -> ContactManifold {
        ContactManifold {
            body_a: ObjectId(a),
            body_b: ObjectId(b),
            num_contacts: 2,
        }
    }

    #[test]
    fn rebuild_indexes_both_participants() {
        let mut book = ManifoldBook::default();
        book.rebuild(vec![manifold(1, 2), manifold(2, 3)]);

        assert_eq!(book.manifolds_for(ObjectId(1)).unwrap().len(), 1);
        assert_eq!(book.manifolds_for(ObjectId(2)).unwrap().len(), 2);
        assert!(book.manifolds_for(ObjectId(9)).is_none());
    }

    #[test]
    fn remove_body_scrubs_other_lists() {
        let mut book = ManifoldBook::default();
        book.rebuild(vec![manifold(1, 2), manifold(2, 3)]);

        book.remove_body(ObjectId(2));
        assert!(book.manifolds_for(ObjectId(2)).is_none());
        assert!(book.manifolds_for(ObjectId(1)).is_none());
        assert!(book.manifolds_for(ObjectId(3)).is_none());
    }

    #[test]
    fn contactless_manifolds_are_dropped() {
        let mut book = ManifoldBook::default();
        book.rebuild(vec![ContactManifold {
            body_a: ObjectId(1),
            body_b: ObjectId(2),
            num_contacts: 0,
        }]);
        assert!(book.manifolds_for(ObjectId(1)).is_none());
    }
}
