//! Common data shared by every object that takes up space.
//!
//! Units, features, projectiles and repulsers are a closed set of kinds that
//! all carry the same physical description. The movement and collision code
//! never needs per-kind behaviour beyond what [`ObjectKind`] and the named
//! state flags express, so there is no trait object on the query path.
//!
//! [`SolidTable`] is the per-tick read-only snapshot that parallel phases use
//! to look at neighbours without touching their live components.

use bevy::prelude::*;
use rustc_hash::FxHashMap;

use crate::game::fixed_math::{FixedNum, FixedVec2};
use crate::game::movement::ProgressState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Unit,
    Feature,
    Projectile,
    Repulser,
}

/// Physical state as named booleans.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PhysicalState {
    pub moving: bool,
    pub skidding: bool,
    pub flying: bool,
    /// Takes part in collisions and claims space.
    pub blocking: bool,
    pub push_resistant: bool,
    pub crushable: bool,
}

impl PhysicalState {
    pub fn grounded_blocker() -> Self {
        Self { blocking: true, ..Default::default() }
    }

    /// Thrown through the air after an impulse; ignores and is ignored by ground collisions.
    pub fn skidding_in_air(&self) -> bool {
        self.skidding && self.flying
    }

    pub fn off_ground(&self) -> bool {
        self.skidding || self.flying
    }
}

/// What other units may know about a unit's current order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MoverInfo {
    pub progress: ProgressState,
    pub goal_pos: FixedVec2,
    pub goal_radius: FixedNum,
    pub owner_radius: FixedNum,
    pub curr_waypoint: FixedVec2,
    pub next_waypoint: FixedVec2,
}

impl MoverInfo {
    pub fn is_at_goal_pos(&self, pos: FixedVec2, radius: FixedNum) -> bool {
        (pos - self.goal_pos).length_squared() < radius * radius
    }

    pub fn has_active_order(&self) -> bool {
        self.progress == ProgressState::Active
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SolidObject {
    pub kind: ObjectKind,
    pub pos: FixedVec2,
    pub velocity: FixedVec2,
    pub speed: FixedNum,
    pub front: FixedVec2,
    pub heading: i16,
    pub radius: FixedNum,
    pub mass: FixedNum,
    pub faction: u8,
    /// Footprint half extents in world units (x, z).
    pub half_extents: FixedVec2,
    pub axis_stretch: FixedNum,
    pub separation_distance: FixedNum,
    pub crush_resistance: FixedNum,
    pub state: PhysicalState,
    /// Has a move class, so it can be pushed and steered around.
    pub mobile: bool,
    pub mover: Option<MoverInfo>,
}

impl Default for SolidObject {
    fn default() -> Self {
        Self {
            kind: ObjectKind::Unit,
            pos: FixedVec2::ZERO,
            velocity: FixedVec2::ZERO,
            speed: FixedNum::ZERO,
            front: FixedVec2::new(FixedNum::ZERO, FixedNum::ONE),
            heading: 0,
            radius: FixedNum::ONE,
            mass: FixedNum::from_num(100),
            faction: 0,
            half_extents: FixedVec2::new(FixedNum::from_num(4), FixedNum::from_num(4)),
            axis_stretch: FixedNum::ZERO,
            separation_distance: FixedNum::ZERO,
            crush_resistance: FixedNum::ZERO,
            state: PhysicalState::grounded_blocker(),
            mobile: false,
            mover: None,
        }
    }
}

impl SolidObject {
    pub fn right(&self) -> FixedVec2 {
        self.front.right()
    }

    /// Crushing needs more crush strength than the object's resistance.
    pub fn resists_crush(&self, crush_strength: FixedNum) -> bool {
        !self.state.crushable || self.crush_resistance > crush_strength
    }

    pub fn momentum(&self) -> FixedNum {
        self.speed * self.mass
    }
}

/// Restricts which solids a query returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SolidFilter {
    pub blocking_only: bool,
    pub grounded_only: bool,
}

impl SolidFilter {
    pub const ANY: Self = Self { blocking_only: false, grounded_only: false };
    pub const BLOCKING: Self = Self { blocking_only: true, grounded_only: false };
    pub const GROUNDED_BLOCKING: Self = Self { blocking_only: true, grounded_only: true };

    pub fn accepts(&self, solid: &SolidObject) -> bool {
        if self.blocking_only && !solid.state.blocking {
            return false;
        }
        if self.grounded_only && solid.state.off_ground() {
            return false;
        }
        true
    }
}

/// Read access to object data by entity.
pub trait SolidLookup {
    fn solid(&self, entity: Entity) -> Option<&SolidObject>;
}

/// Snapshot of every registered object, refreshed in the serial phases.
#[derive(Resource, Default, Clone, Debug)]
pub struct SolidTable {
    objects: FxHashMap<Entity, SolidObject>,
}

impl SolidTable {
    pub fn insert(&mut self, entity: Entity, solid: SolidObject) {
        self.objects.insert(entity, solid);
    }

    pub fn remove(&mut self, entity: Entity) -> Option<SolidObject> {
        self.objects.remove(&entity)
    }

    pub fn get(&self, entity: Entity) -> Option<&SolidObject> {
        self.objects.get(&entity)
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut SolidObject> {
        self.objects.get_mut(&entity)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl SolidLookup for SolidTable {
    fn solid(&self, entity: Entity) -> Option<&SolidObject> {
        self.objects.get(&entity)
    }
}
