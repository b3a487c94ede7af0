//! # Object Lifecycle Types
//!
//! Shared definitions for the object lifecycle and the per-frame update
//! settings the world is stepped with.

use serde::{Deserialize, Serialize};

/// The current state of an object in its lifecycle.
///
/// Objects move `AwaitingCreation -> Playing` on the world tick after their
/// allocation, and leave through `PendingKill -> Destroyed` on the tick
/// after a deletion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectLifecycleState {
    /// Allocated and visible to lookups, but not yet part of the update loop.
    AwaitingCreation,

    /// Active and part of the live simulation.
    Playing,

    /// A deletion was requested; the object survives until the next tick.
    PendingKill,

    /// The object has been removed from the world.
    Destroyed,
}

impl Default for ObjectLifecycleState {
    fn default() -> Self {
        ObjectLifecycleState::AwaitingCreation
    }
}

/// The settings passed to the world for one update tick.
///
/// The world is always stepped, even when paused in the editor; game objects
/// must tolerate being updated while the editor mutates them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameUpdateSets {
    /// Delta time for this tick, in seconds.
    pub dt: f32,

    /// True when the game simulation is paused (usually: editing).
    pub is_paused: bool,
}

impl GameUpdateSets {
    pub fn new(dt: f32, is_paused: bool) -> Self {
        Self { dt, is_paused }
    }

    /// A zero-length paused tick, used by tools that only need the world's
    /// bookkeeping (promotion, deferred deletion) to run.
    pub fn paused_step() -> Self {
        Self {
            dt: 0.0,
            is_paused: true,
        }
    }

    pub fn is_game_paused(&self) -> bool {
        self.is_paused
    }

    pub fn is_playing(&self) -> bool {
        !self.is_paused
    }
}

impl Default for GameUpdateSets {
    fn default() -> Self {
        Self::paused_step()
    }
}
