//! Resource definitions for the simulation.

use bevy::prelude::*;
use rustc_hash::FxHashMap;
use std::time::Duration;

use crate::game::fixed_math::{FixedNum, FixedVec2};
use crate::game::terrain::SQUARE_SIZE;

// ============================================================================
// Tick & Performance
// ============================================================================

/// Simulation tick counter, advanced once per fixed step.
#[derive(Resource, Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimTick(pub u64);

impl SimTick {
    pub fn increment(&mut self) {
        self.0 += 1;
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

#[derive(Resource, Default, Debug)]
pub struct SimPerformance {
    pub last_duration: Duration,
}

// ============================================================================
// Simulation Configuration
// ============================================================================

/// Engine-wide movement settings in fixed point.
///
/// Built once from [`InitialConfig`](crate::game::config::InitialConfig) at
/// startup. Changing it mid-match desyncs peers that did not make the same
/// change on the same tick.
#[derive(Resource, Clone, Debug, PartialEq)]
pub struct SimConfig {
    pub tick_rate: f64,
    /// Map extent in squares.
    pub map_width: usize,
    pub map_height: usize,
    pub quad_size: i32,
    pub num_factions: usize,

    /// Collision pushes never exceed `max_speed` times this per tick.
    pub max_collision_push_multiplier: FixedNum,
    /// Ticks between obstacle-avoidance evaluations.
    pub avoidance_update_rate: u32,
    /// Ticks without waypoint progress before a deferred repath runs.
    pub repath_delay: u64,
    /// Minimum ticks between two repaths of one unit.
    pub repath_max_rate: u64,
    pub slow_update_rate: u64,

    pub allow_unit_collision_overlap: bool,
    pub allow_crushing_allied_units: bool,
    pub allow_pushing_enemy_units: bool,
    pub allow_sep_axis_collision_test: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate: 30.0,
            map_width: 128,
            map_height: 128,
            quad_size: 128,
            num_factions: 4,
            max_collision_push_multiplier: FixedNum::from_num(2),
            avoidance_update_rate: 3,
            repath_delay: 60,
            repath_max_rate: 150,
            slow_update_rate: 15,
            allow_unit_collision_overlap: true,
            allow_crushing_allied_units: false,
            allow_pushing_enemy_units: false,
            allow_sep_axis_collision_test: false,
        }
    }
}

impl SimConfig {
    pub fn world_width(&self) -> i32 {
        self.map_width as i32 * SQUARE_SIZE
    }

    pub fn world_height(&self) -> i32 {
        self.map_height as i32 * SQUARE_SIZE
    }
}

/// Static blocking footprints currently stamped into the terrain, keyed by owner.
#[derive(Resource, Default, Debug)]
pub struct BlockingFootprints(pub FxHashMap<Entity, StampedFootprint>);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StampedFootprint {
    pub pos: FixedVec2,
    pub xsize: i32,
    pub zsize: i32,
}
