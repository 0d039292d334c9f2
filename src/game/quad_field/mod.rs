//! Uniform-grid spatial index ("quad field").
//!
//! The world is cut into square quads of `quad_size` world units. Every quad
//! keeps non-owning entity lists for the objects overlapping it. Lookups cost
//! O(quads touched) no matter how many objects exist.
//!
//! - **regions**: which quads a circle, rectangle or ray touches
//! - **membership**: incremental insert/remove/move bookkeeping per object kind
//! - **query**: exact object queries on top of the region walks
//! - **scratch**: per-thread buffers so concurrent reads never allocate
//!
//! Membership only changes in serial phases; reads may run from any thread.

use bevy::prelude::*;
use smallvec::SmallVec;
use thiserror::Error;

use crate::game::fixed_math::{FixedNum, FixedVec2};

pub mod membership;
pub mod query;
pub mod regions;
pub mod scratch;

pub use scratch::{QueryScratchPool, Scratch};

#[cfg(test)]
mod tests;

/// Upper bound on a quad's circumscribed radius as a fraction of its side
/// (sqrt(2)/2 rounded up). Widens circle queries so edge overlaps are kept.
pub const QUAD_RADIUS_FACTOR: f64 = 0.72;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuadFieldError {
    #[error("quad size must be positive, got {0}")]
    InvalidQuadSize(i32),
    #[error("map extent {extent} is not a positive multiple of quad size {quad_size}")]
    NotDivisible { extent: i32, quad_size: i32 },
    #[error("at least one faction bucket is required")]
    NoFactions,
}

/// Quads an object currently occupies, cached for incremental updates.
#[derive(Component, Clone, Debug, Default, PartialEq, Eq)]
pub struct OccupiedQuads(pub SmallVec<[usize; 8]>);

/// One grid cell.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Quad {
    pub units: Vec<Entity>,
    /// Units again, bucketed by faction (ally team).
    pub faction_units: Vec<Vec<Entity>>,
    pub features: Vec<Entity>,
    pub projectiles: Vec<Entity>,
    pub repulsers: Vec<Entity>,
}

impl Quad {
    fn new(num_factions: usize) -> Self {
        Self {
            faction_units: vec![Vec::new(); num_factions],
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
            && self.features.is_empty()
            && self.projectiles.is_empty()
            && self.repulsers.is_empty()
    }

    pub fn entry_count(&self) -> usize {
        self.units.len() + self.features.len() + self.projectiles.len() + self.repulsers.len()
    }
}

/// Appends `e` unless already present. Returns whether it was added.
pub(crate) fn push_unique(list: &mut Vec<Entity>, e: Entity) -> bool {
    if list.contains(&e) {
        return false;
    }
    list.push(e);
    true
}

/// Removes `e` keeping the order of the rest. Returns whether it was present.
pub(crate) fn erase(list: &mut Vec<Entity>, e: Entity) -> bool {
    match list.iter().position(|x| *x == e) {
        Some(i) => {
            list.remove(i);
            true
        }
        None => false,
    }
}

#[derive(Resource, Clone, Debug)]
pub struct QuadField {
    quads: Vec<Quad>,
    num_quads_x: i32,
    num_quads_z: i32,
    quad_size: i32,
    world_width: i32,
    world_height: i32,
    num_factions: usize,
}

impl Default for QuadField {
    fn default() -> Self {
        let quad_size = 128;
        Self {
            quads: vec![Quad::new(1)],
            num_quads_x: 1,
            num_quads_z: 1,
            quad_size,
            world_width: quad_size,
            world_height: quad_size,
            num_factions: 1,
        }
    }
}

impl QuadField {
    /// Builds the grid for a `world_width x world_height` map.
    ///
    /// Both extents must be positive multiples of `quad_size`.
    pub fn new(
        world_width: i32,
        world_height: i32,
        quad_size: i32,
        num_factions: usize,
    ) -> Result<Self, QuadFieldError> {
        if quad_size <= 0 {
            return Err(QuadFieldError::InvalidQuadSize(quad_size));
        }
        for extent in [world_width, world_height] {
            if extent <= 0 || extent % quad_size != 0 {
                return Err(QuadFieldError::NotDivisible { extent, quad_size });
            }
        }
        if num_factions == 0 {
            return Err(QuadFieldError::NoFactions);
        }

        let num_quads_x = world_width / quad_size;
        let num_quads_z = world_height / quad_size;
        let count = (num_quads_x * num_quads_z) as usize;

        info!(
            "[QUAD] Grid {}x{} quads of {} units ({} factions)",
            num_quads_x, num_quads_z, quad_size, num_factions
        );

        Ok(Self {
            quads: vec![Quad::new(num_factions); count],
            num_quads_x,
            num_quads_z,
            quad_size,
            world_width,
            world_height,
            num_factions,
        })
    }

    pub fn num_quads_x(&self) -> i32 {
        self.num_quads_x
    }

    pub fn num_quads_z(&self) -> i32 {
        self.num_quads_z
    }

    pub fn num_quads(&self) -> usize {
        self.quads.len()
    }

    pub fn quad_size(&self) -> i32 {
        self.quad_size
    }

    pub fn num_factions(&self) -> usize {
        self.num_factions
    }

    pub fn quad(&self, idx: usize) -> &Quad {
        &self.quads[idx]
    }

    pub fn quads(&self) -> &[Quad] {
        &self.quads
    }

    pub(crate) fn quad_mut(&mut self, idx: usize) -> &mut Quad {
        &mut self.quads[idx]
    }

    pub(crate) fn qs(&self) -> FixedNum {
        FixedNum::from_num(self.quad_size)
    }

    #[inline]
    pub(crate) fn clamp_x(&self, x: i64) -> i32 {
        x.clamp(0, self.num_quads_x as i64 - 1) as i32
    }

    #[inline]
    pub(crate) fn clamp_z(&self, z: i64) -> i32 {
        z.clamp(0, self.num_quads_z as i64 - 1) as i32
    }

    /// Grid column and row for a position, clamped to the grid edge.
    pub fn world_pos_to_quad(&self, pos: FixedVec2) -> (i32, i32) {
        let qs = self.qs();
        (
            self.clamp_x((pos.x / qs).to_num::<i64>()),
            self.clamp_z((pos.y / qs).to_num::<i64>()),
        )
    }

    pub fn world_pos_to_quad_idx(&self, pos: FixedVec2) -> usize {
        let (x, z) = self.world_pos_to_quad(pos);
        (z * self.num_quads_x + x) as usize
    }

    /// Centre of a quad in world units.
    pub fn quad_center(&self, x: i32, z: i32) -> FixedVec2 {
        let qs = self.qs();
        let half = qs / FixedNum::from_num(2);
        FixedVec2::new(FixedNum::from_num(x) * qs + half, FixedNum::from_num(z) * qs + half)
    }

    /// Clamp into the playable area, `[0, extent - 1]` on both axes.
    pub fn clamp_in_bounds(&self, pos: FixedVec2) -> FixedVec2 {
        pos.clamp(
            FixedVec2::ZERO,
            FixedVec2::new(
                FixedNum::from_num(self.world_width - 1),
                FixedNum::from_num(self.world_height - 1),
            ),
        )
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    pub fn total_entries(&self) -> usize {
        self.quads.iter().map(Quad::entry_count).sum()
    }

    pub fn non_empty_quads(&self) -> usize {
        self.quads.iter().filter(|q| !q.is_empty()).count()
    }

    /// Everything listed in one quad, or `None` past the grid.
    pub fn quad_contents(&self, idx: usize) -> Option<&Quad> {
        self.quads.get(idx)
    }

    /// Drops every reference to a despawned entity. Scans the whole grid, so
    /// only used when the cached quad list is gone with the entity.
    pub fn purge(&mut self, entity: Entity) {
        for quad in self.quads.iter_mut() {
            erase(&mut quad.units, entity);
            for bucket in quad.faction_units.iter_mut() {
                erase(bucket, entity);
            }
            erase(&mut quad.features, entity);
            erase(&mut quad.projectiles, entity);
            erase(&mut quad.repulsers, entity);
        }
    }
}
