//! Per-unit ground movement.
//!
//! One [`MovementController`] drives one unit from its position to a goal:
//! it pulls waypoints from the path service, decides whether the next one may
//! be taken early, steers around other units, and integrates speed and
//! heading under the unit's acceleration and turn limits.
//!
//! The work of a tick is split the same way the simulation schedule is:
//!
//! - **waypoints**: traversal plan, `follow_path`, waypoint skipping (parallel)
//! - **avoidance**: obstacle-avoidance steering direction (parallel)
//! - **speed**: heading and speed integration, reverse decisions (parallel)
//! - **controller**: order transitions, path requests, commit/resolve steps (serial)
//! - **idle**: idling bookkeeping and the periodic slow update (serial)
//!
//! Parallel methods only touch the controller and its own body. Everything
//! they learn about neighbours comes from the [`SolidTable`] snapshot.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::game::fixed_math::{heading_to_vec, FixedNum, FixedVec2};
use crate::game::path::PathProvider;
use crate::game::quad_field::QuadField;
use crate::game::simulation::SimConfig;
use crate::game::solid::{PhysicalState, SolidTable};
use crate::game::terrain::{MoveClassRegistry, TerrainMap, MINIMUM_MASS};

mod avoidance;
mod controller;
mod idle;
mod speed;
mod waypoints;

pub use controller::{HeadingIntent, MoveEvent, MoveFlags, MovementController};
pub use speed::{braking_distance, DefaultSpeedPolicy, SpeedControl, SpeedPolicy};

#[cfg(test)]
mod tests;

/// Slow updates a unit may idle through before its order fails.
pub const MAX_IDLING_SLOWUPDATES: i32 = 16;

/// Top-level order state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProgressState {
    #[default]
    Idle,
    Active,
    Done,
    Failed,
}

/// Kinematic state of anything that occupies space.
#[derive(Component, Clone, Copy, Debug, PartialEq)]
pub struct MovableBody {
    pub pos: FixedVec2,
    pub velocity: FixedVec2,
    pub heading: i16,
    /// Facing on the ground plane, always `heading_to_vec(heading)`.
    pub front: FixedVec2,
    pub radius: FixedNum,
    pub mass: FixedNum,
    pub faction: u8,
    pub state: PhysicalState,
}

impl MovableBody {
    pub fn new(pos: FixedVec2, heading: i16, radius: FixedNum, mass: FixedNum, faction: u8) -> Self {
        Self {
            pos,
            velocity: FixedVec2::ZERO,
            heading,
            front: heading_to_vec(heading),
            radius,
            mass: mass.max(MINIMUM_MASS),
            faction,
            state: PhysicalState::grounded_blocker(),
        }
    }

    pub fn speed(&self) -> FixedNum {
        self.velocity.length()
    }

    pub fn right(&self) -> FixedVec2 {
        self.front.right()
    }

    pub fn set_heading(&mut self, heading: i16) {
        self.heading = heading;
        self.front = heading_to_vec(heading);
    }

    pub fn add_heading(&mut self, delta: i16) {
        self.set_heading(self.heading.wrapping_add(delta));
    }
}

/// Read-only world view handed to one unit during a parallel phase.
#[derive(Clone, Copy)]
pub struct MoveContext<'a> {
    /// The unit being updated.
    pub owner: Entity,
    pub terrain: &'a TerrainMap,
    pub quad_field: &'a QuadField,
    pub solids: &'a SolidTable,
    pub paths: &'a dyn PathProvider,
    pub policy: &'a dyn SpeedPolicy,
    pub config: &'a SimConfig,
    pub move_classes: &'a MoveClassRegistry,
    pub frame: u64,
}

/// What serial order transitions need: terrain for path requests, the path
/// service and the current frame.
#[derive(Clone, Copy)]
pub struct Planner<'a> {
    pub terrain: &'a TerrainMap,
    pub paths: &'a dyn PathProvider,
    pub config: &'a SimConfig,
    pub frame: u64,
}

impl<'a> MoveContext<'a> {
    pub fn for_owner(self, owner: Entity) -> Self {
        Self { owner, ..self }
    }

    pub fn planner(&self) -> Planner<'a> {
        Planner {
            terrain: self.terrain,
            paths: self.paths,
            config: self.config,
            frame: self.frame,
        }
    }
}
