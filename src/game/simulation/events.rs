//! Orders into the simulation and notifications out of it.
//!
//! Orders are applied in the `Input` set sorted by `(player_id, entity)`.
//! Notifications are written in the `Resolve` set in ascending entity order,
//! so every peer sees the same sequence.

use bevy::prelude::*;

use crate::game::fixed_math::{FixedNum, FixedVec2};

// ============================================================================
// Orders
// ============================================================================

#[derive(Message, Debug, Clone, Copy, PartialEq)]
pub struct MoveOrder {
    pub player_id: u8,
    pub entity: Entity,
    pub goal: FixedVec2,
    pub goal_radius: FixedNum,
    /// Drive straight at the goal without a planned route.
    pub raw: bool,
}

#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopOrder {
    pub player_id: u8,
    pub entity: Entity,
    /// Zero the velocity instead of braking.
    pub hard: bool,
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitArrived {
    pub entity: Entity,
}

/// The unit cannot currently reach its goal.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitMoveFailed {
    pub entity: Entity,
}

#[derive(Message, Debug, Clone, Copy, PartialEq)]
pub struct UnitCrushed {
    pub collider: Entity,
    pub collidee: Entity,
    pub impulse: FixedVec2,
}

#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitCollided {
    pub collider: Entity,
    pub collidee: Entity,
}

#[derive(Message, Debug, Clone, Copy, PartialEq)]
pub struct FeatureCrushed {
    pub collider: Entity,
    pub feature: Entity,
    pub impulse: FixedVec2,
}

#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureCollided {
    pub collider: Entity,
    pub feature: Entity,
}

/// Position after the resolve step, for units that moved this tick.
#[derive(Message, Debug, Clone, Copy, PartialEq)]
pub struct UnitMoved {
    pub entity: Entity,
    pub pos: FixedVec2,
}
