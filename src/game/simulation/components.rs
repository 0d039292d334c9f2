//! Simulation components and spawn helpers.

use bevy::prelude::*;

use crate::game::fixed_math::{FixedNum, FixedVec2};
use crate::game::movement::{MovableBody, MovementController};
use crate::game::quad_field::OccupiedQuads;
use crate::game::solid::PhysicalState;
use crate::game::terrain::{MoveClass, MoveClassId, SQUARE_SIZE};

/// Marker plus crush data for ground units.
#[derive(Component, Clone, Copy, Debug, Default, PartialEq)]
pub struct Unit {
    pub crush_resistance: FixedNum,
}

/// A feature (wreck, rock, tree). Static features stamp their footprint
/// into the terrain while blocking.
#[derive(Component, Clone, Copy, Debug, PartialEq)]
pub struct Feature {
    pub xsize: i32,
    pub zsize: i32,
    pub crush_resistance: FixedNum,
    /// Position the feature is currently indexed at in the quad field.
    pub indexed_at: Option<FixedVec2>,
}

impl Feature {
    pub fn new(xsize: i32, zsize: i32) -> Self {
        Self {
            xsize: xsize.max(1),
            zsize: zsize.max(1),
            crush_resistance: FixedNum::ZERO,
            indexed_at: None,
        }
    }

    pub fn half_extents(&self) -> FixedVec2 {
        let half = FixedNum::from_num(SQUARE_SIZE / 2);
        FixedVec2::new(FixedNum::from_num(self.xsize) * half, FixedNum::from_num(self.zsize) * half)
    }

    pub fn axis_stretch(&self) -> FixedNum {
        FixedNum::from_num((self.xsize - self.zsize).abs()) / FixedNum::from_num(self.xsize + self.zsize)
    }
}

/// Components of a ground unit of move class `class_id`.
pub fn unit_bundle(
    pos: FixedVec2,
    heading: i16,
    class_id: MoveClassId,
    mc: &MoveClass,
    faction: u8,
) -> (Unit, MovableBody, MovementController, MoveClassId, OccupiedQuads) {
    let radius = mc.min_exterior_radius();
    let body = MovableBody::new(pos, heading, radius, mc.mass, faction);
    let mut controller = MovementController::new(mc, radius);
    controller.old_pos = pos;
    controller.old_heading = heading;
    (Unit::default(), body, controller, class_id, OccupiedQuads::default())
}

/// Components of a blocking feature.
pub fn feature_bundle(pos: FixedVec2, xsize: i32, zsize: i32, mass: FixedNum) -> (Feature, MovableBody) {
    let feature = Feature::new(xsize, zsize);
    let radius = feature.half_extents().length();
    let mut body = MovableBody::new(pos, 0, radius, mass, 0);
    body.state = PhysicalState::grounded_blocker();
    (feature, body)
}
