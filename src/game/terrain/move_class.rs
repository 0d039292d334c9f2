use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::SQUARE_SIZE;
use crate::game::fixed_math::{FixedNum, FixedVec2, MAX_HEADING};

/// Lightest mass a body may have; mass ratios divide by summed masses.
pub const MINIMUM_MASS: FixedNum = FixedNum::ONE;

/// Index into [`MoveClassRegistry`].
#[derive(Component, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MoveClassId(pub u16);

/// Movement limits and footprint shared by every unit of one type.
///
/// Speeds are world units per tick, accelerations are per tick squared and
/// `turn_rate` is heading units per tick.
#[derive(Clone, Debug, PartialEq)]
pub struct MoveClass {
    pub name: String,
    pub xsize: i32,
    pub zsize: i32,
    pub max_speed: FixedNum,
    pub max_reverse_speed: FixedNum,
    pub turn_rate: i32,
    pub acc_rate: FixedNum,
    pub dec_rate: FixedNum,
    pub mass: FixedNum,
    pub separation_distance: FixedNum,
    pub crush_strength: FixedNum,
    pub push_resistant: bool,
    pub avoid_mobiles_on_path: bool,
    pub allow_terrain_collisions: bool,
    pub turn_in_place: bool,
    pub turn_in_place_speed_limit: FixedNum,
    /// Degrees; turns sharper than this slow the unit down to the speed limit above.
    pub turn_in_place_angle_limit: FixedNum,
}

impl Default for MoveClass {
    fn default() -> Self {
        Self {
            name: "tank2x2".to_string(),
            xsize: 2,
            zsize: 2,
            max_speed: FixedNum::from_num(2),
            max_reverse_speed: FixedNum::ZERO,
            turn_rate: 600,
            acc_rate: FixedNum::from_num(0.1),
            dec_rate: FixedNum::from_num(0.2),
            mass: FixedNum::from_num(100),
            separation_distance: FixedNum::ZERO,
            crush_strength: FixedNum::from_num(10),
            push_resistant: false,
            avoid_mobiles_on_path: true,
            allow_terrain_collisions: true,
            turn_in_place: true,
            turn_in_place_speed_limit: FixedNum::from_num(0.5),
            turn_in_place_angle_limit: FixedNum::ZERO,
        }
    }
}

impl MoveClass {
    /// Applies the engine's lower bounds: turn rate in `[1, MAX_HEADING - 1]`,
    /// acceleration and deceleration at least 0.01, mass at least
    /// [`MINIMUM_MASS`].
    pub fn sanitized(mut self) -> Self {
        let floor = FixedNum::from_num(0.01);
        self.turn_rate = self.turn_rate.clamp(1, MAX_HEADING as i32 - 1);
        self.acc_rate = self.acc_rate.max(floor);
        self.dec_rate = self.dec_rate.max(floor);
        self.xsize = self.xsize.max(1);
        self.zsize = self.zsize.max(1);
        self.max_speed = self.max_speed.max(FixedNum::ZERO);
        self.max_reverse_speed = self.max_reverse_speed.max(FixedNum::ZERO);
        self.mass = self.mass.max(MINIMUM_MASS);
        self
    }

    /// Radius of the circle enclosing the footprint rectangle.
    pub fn min_exterior_radius(&self) -> FixedNum {
        let (x, z) = (FixedNum::from_num(self.xsize), FixedNum::from_num(self.zsize));
        (x * x + z * z).sqrt() * FixedNum::from_num(SQUARE_SIZE / 2)
    }

    /// Radius of the circle touching the footprint's longer side.
    pub fn max_interior_radius(&self) -> FixedNum {
        FixedNum::from_num(self.xsize.max(self.zsize) * SQUARE_SIZE / 2)
    }

    /// 0 for square footprints, approaching 1 for long thin ones.
    pub fn axis_stretch(&self) -> FixedNum {
        let (x, z) = (self.xsize, self.zsize);
        FixedNum::from_num((x - z).abs()) / FixedNum::from_num(x + z)
    }

    /// Footprint in squares scaled by `scale`; `footprint(SQUARE_SIZE / 2)` gives half extents in world units.
    pub fn footprint(&self, scale: FixedNum) -> FixedVec2 {
        FixedVec2::new(FixedNum::from_num(self.xsize) * scale, FixedNum::from_num(self.zsize) * scale)
    }

    pub fn half_extents(&self) -> FixedVec2 {
        self.footprint(FixedNum::from_num(SQUARE_SIZE / 2))
    }

    pub fn can_reverse(&self) -> bool {
        self.max_reverse_speed > FixedNum::ZERO
    }
}

/// All move classes known to one simulation.
#[derive(Resource, Clone, Debug)]
pub struct MoveClassRegistry {
    classes: Vec<MoveClass>,
}

impl Default for MoveClassRegistry {
    fn default() -> Self {
        Self { classes: vec![MoveClass::default()] }
    }
}

impl MoveClassRegistry {
    pub fn new(classes: Vec<MoveClass>) -> Self {
        let classes: Vec<MoveClass> = classes.into_iter().map(MoveClass::sanitized).collect();
        if classes.is_empty() {
            return Self::default();
        }
        Self { classes }
    }

    pub fn register(&mut self, class: MoveClass) -> MoveClassId {
        self.classes.push(class.sanitized());
        MoveClassId((self.classes.len() - 1) as u16)
    }

    /// Falls back to the first class for unknown ids.
    pub fn get(&self, id: MoveClassId) -> &MoveClass {
        self.classes.get(id.0 as usize).unwrap_or(&self.classes[0])
    }

    pub fn find(&self, name: &str) -> Option<MoveClassId> {
        self.classes
            .iter()
            .position(|c| c.name == name)
            .map(|i| MoveClassId(i as u16))
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Half of the widest footprint in world units; widens collision searches.
    pub fn largest_footprint_half(&self) -> FixedNum {
        let widest = self
            .classes
            .iter()
            .map(|c| c.xsize.max(c.zsize))
            .max()
            .unwrap_or(1);
        FixedNum::from_num(widest * SQUARE_SIZE / 2)
    }
}
