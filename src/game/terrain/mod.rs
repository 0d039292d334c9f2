//! Ground terrain as seen by movement.
//!
//! The map is a grid of `SQUARE_SIZE`-sized squares. Each square carries a
//! speed modifier (0 means impassable) and may be claimed by a static
//! blocking object such as a building or a wreck. Both layers are read by
//! the movement controller (speed caps, waypoint checks) and by the static
//! collision handler.
//!
//! - **TerrainMap**: square grid, speed modifiers, structure blocking
//! - **move_class**: per-unit-type movement limits and footprint geometry

use bevy::prelude::*;
use fixedbitset::FixedBitSet;

use crate::game::fixed_math::{FixedNum, FixedVec2};

pub mod move_class;

pub use move_class::{MoveClass, MoveClassId, MoveClassRegistry, MINIMUM_MASS};

#[cfg(test)]
mod tests;

/// World units per terrain square.
pub const SQUARE_SIZE: i32 = 8;

pub fn square_size() -> FixedNum {
    FixedNum::from_num(SQUARE_SIZE)
}

/// Blocking status of a single square.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockState {
    /// Speed modifier is zero or the square lies off the map.
    pub impassable: bool,
    /// A static blocking object claims this square.
    pub structure: bool,
}

impl BlockState {
    pub fn is_open(self) -> bool {
        !self.impassable && !self.structure
    }
}

#[derive(Resource, Clone, Debug)]
pub struct TerrainMap {
    pub width: usize,
    pub height: usize,
    speed_mods: Vec<FixedNum>,
    structures: FixedBitSet,
    structure_claims: Vec<u16>,
}

impl Default for TerrainMap {
    fn default() -> Self {
        Self::new(64, 64)
    }
}

impl TerrainMap {
    /// Flat, fully passable terrain of `width x height` squares.
    pub fn new(width: usize, height: usize) -> Self {
        let size = width * height;
        Self {
            width,
            height,
            speed_mods: vec![FixedNum::ONE; size],
            structures: FixedBitSet::with_capacity(size),
            structure_claims: vec![0; size],
        }
    }

    pub fn world_width(&self) -> FixedNum {
        FixedNum::from_num(self.width as i64 * SQUARE_SIZE as i64)
    }

    pub fn world_height(&self) -> FixedNum {
        FixedNum::from_num(self.height as i64 * SQUARE_SIZE as i64)
    }

    #[inline]
    pub fn in_bounds(&self, x: i32, z: i32) -> bool {
        x >= 0 && z >= 0 && (x as usize) < self.width && (z as usize) < self.height
    }

    #[inline]
    pub fn get_index(&self, x: i32, z: i32) -> usize {
        z as usize * self.width + x as usize
    }

    /// Square containing a world position; may lie off the map.
    pub fn world_to_square(&self, pos: FixedVec2) -> (i32, i32) {
        let s = square_size();
        (
            (pos.x / s).floor().to_num::<i32>(),
            (pos.y / s).floor().to_num::<i32>(),
        )
    }

    pub fn square_center(&self, x: i32, z: i32) -> FixedVec2 {
        let s = square_size();
        let half = s / FixedNum::from_num(2);
        FixedVec2::new(FixedNum::from_num(x) * s + half, FixedNum::from_num(z) * s + half)
    }

    /// Clamp into `[0, size - 1]` on both axes.
    pub fn clamp_in_bounds(&self, pos: FixedVec2) -> FixedVec2 {
        let max = FixedVec2::new(
            self.world_width() - FixedNum::ONE,
            self.world_height() - FixedNum::ONE,
        );
        pos.clamp(FixedVec2::ZERO, max)
    }

    pub fn pos_in_bounds(&self, pos: FixedVec2) -> bool {
        pos.x >= FixedNum::ZERO
            && pos.y >= FixedNum::ZERO
            && pos.x <= self.world_width()
            && pos.y <= self.world_height()
    }

    // ========================================================================
    // Speed modifiers
    // ========================================================================

    pub fn square_speed_mod(&self, x: i32, z: i32) -> FixedNum {
        if !self.in_bounds(x, z) {
            return FixedNum::ZERO;
        }
        self.speed_mods[self.get_index(x, z)]
    }

    pub fn pos_speed_mod(&self, pos: FixedVec2) -> FixedNum {
        let (x, z) = self.world_to_square(pos);
        self.square_speed_mod(x, z)
    }

    pub fn set_square_speed_mod(&mut self, x: i32, z: i32, speed_mod: FixedNum) {
        if self.in_bounds(x, z) {
            let idx = self.get_index(x, z);
            self.speed_mods[idx] = speed_mod.max(FixedNum::ZERO);
        }
    }

    /// Marks an inclusive square rectangle impassable (cliffs, water for land units).
    pub fn set_impassable_rect(&mut self, x0: i32, z0: i32, x1: i32, z1: i32) {
        for z in z0.min(z1)..=z0.max(z1) {
            for x in x0.min(x1)..=x0.max(x1) {
                self.set_square_speed_mod(x, z, FixedNum::ZERO);
            }
        }
    }

    // ========================================================================
    // Structure blocking
    // ========================================================================

    pub fn square_block(&self, x: i32, z: i32) -> BlockState {
        if !self.in_bounds(x, z) {
            return BlockState { impassable: true, structure: false };
        }
        let idx = self.get_index(x, z);
        BlockState {
            impassable: self.speed_mods[idx] <= FixedNum::ZERO,
            structure: self.structures.contains(idx),
        }
    }

    pub fn is_structure_blocked(&self, x: i32, z: i32) -> bool {
        self.in_bounds(x, z) && self.structures.contains(self.get_index(x, z))
    }

    /// Inclusive square range covered by a footprint centred on `pos`.
    pub fn footprint_squares(&self, pos: FixedVec2, xsize: i32, zsize: i32) -> (i32, i32, i32, i32) {
        let (cx, cz) = self.world_to_square(pos);
        let (hx, hz) = (xsize >> 1, zsize >> 1);
        (cx - hx, cz - hz, cx - hx + xsize.max(1) - 1, cz - hz + zsize.max(1) - 1)
    }

    /// Claims the footprint squares for a static blocker. Claims are counted so
    /// overlapping blockers release correctly.
    pub fn block_footprint(&mut self, pos: FixedVec2, xsize: i32, zsize: i32) {
        let (x0, z0, x1, z1) = self.footprint_squares(pos, xsize, zsize);
        for z in z0.max(0)..=z1.min(self.height as i32 - 1) {
            for x in x0.max(0)..=x1.min(self.width as i32 - 1) {
                let idx = self.get_index(x, z);
                self.structure_claims[idx] = self.structure_claims[idx].saturating_add(1);
                self.structures.insert(idx);
            }
        }
    }

    pub fn unblock_footprint(&mut self, pos: FixedVec2, xsize: i32, zsize: i32) {
        let (x0, z0, x1, z1) = self.footprint_squares(pos, xsize, zsize);
        for z in z0.max(0)..=z1.min(self.height as i32 - 1) {
            for x in x0.max(0)..=x1.min(self.width as i32 - 1) {
                let idx = self.get_index(x, z);
                self.structure_claims[idx] = self.structure_claims[idx].saturating_sub(1);
                if self.structure_claims[idx] == 0 {
                    self.structures.set(idx, false);
                }
            }
        }
    }

    // ========================================================================
    // Movement queries
    // ========================================================================

    /// Whether a unit of this class may stand with its footprint centred on `pos`.
    ///
    /// The centre square must be passable and no footprint square may be
    /// claimed by a structure. Footprint squares hanging off the map edge are
    /// ignored.
    pub fn test_move_square(&self, mc: &MoveClass, pos: FixedVec2) -> bool {
        let (cx, cz) = self.world_to_square(pos);
        if self.square_speed_mod(cx, cz) <= FixedNum::ZERO {
            return false;
        }
        let (x0, z0, x1, z1) = self.footprint_squares(pos, mc.xsize, mc.zsize);
        for z in z0.max(0)..=z1.min(self.height as i32 - 1) {
            for x in x0.max(0)..=x1.min(self.width as i32 - 1) {
                if self.structures.contains(self.get_index(x, z)) {
                    return false;
                }
            }
        }
        true
    }

    /// Square-level openness check used by displacement: on the map and passable.
    pub fn is_square_open(&self, mc: &MoveClass, pos: FixedVec2) -> bool {
        self.pos_in_bounds(pos) && self.test_move_square(mc, pos)
    }

    /// Straight-line check from `from` to `to`, sampled once per half square.
    /// The starting square is not tested so a unit pressed against an obstacle
    /// can still look past it.
    pub fn raw_line_clear(&self, mc: &MoveClass, from: FixedVec2, to: FixedVec2) -> bool {
        let delta = to - from;
        let step = square_size() / FixedNum::from_num(2);
        let dist = delta.length();
        if dist <= step {
            return self.test_move_square(mc, to);
        }
        let samples = (dist / step).ceil().to_num::<i64>();
        let start_square = self.world_to_square(from);
        for i in 1..=samples {
            let t = FixedNum::from_num(i) / FixedNum::from_num(samples);
            let p = from + delta * t;
            if self.world_to_square(p) == start_square {
                continue;
            }
            if !self.test_move_square(mc, p) {
                return false;
            }
        }
        true
    }
}
