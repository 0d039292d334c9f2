//! Incremental membership bookkeeping.
//!
//! Every insert is idempotent and every remove of an absent entry is a no-op.
//! Moves diff the freshly computed quad list against the cached
//! [`OccupiedQuads`] and only touch quads whose membership changed.

use bevy::prelude::*;
use smallvec::SmallVec;

use super::{erase, push_unique, OccupiedQuads, QuadField, Scratch};
use crate::game::fixed_math::{FixedNum, FixedVec2};

impl QuadField {
    // ========================================================================
    // Units
    // ========================================================================

    /// Re-indexes a unit after it moved. Returns whether its quad set changed.
    pub fn moved_unit(
        &mut self,
        entity: Entity,
        faction: u8,
        pos: FixedVec2,
        radius: FixedNum,
        occupied: &mut OccupiedQuads,
    ) -> bool {
        let fresh = self.quads_in_circle(pos, radius);
        if fresh.as_slice() == occupied.0.as_slice() {
            return false;
        }

        let faction = faction as usize;
        for &qi in occupied.0.iter() {
            if !fresh.contains(&qi) {
                let quad = self.quad_mut(qi);
                erase(&mut quad.units, entity);
                if let Some(bucket) = quad.faction_units.get_mut(faction) {
                    erase(bucket, entity);
                }
            }
        }
        for &qi in fresh.iter() {
            let quad = self.quad_mut(qi);
            push_unique(&mut quad.units, entity);
            if let Some(bucket) = quad.faction_units.get_mut(faction) {
                push_unique(bucket, entity);
            }
        }

        occupied.0 = SmallVec::from_slice(&fresh);
        true
    }

    /// Inserting is the same diff starting from whatever is cached.
    pub fn insert_unit(
        &mut self,
        entity: Entity,
        faction: u8,
        pos: FixedVec2,
        radius: FixedNum,
        occupied: &mut OccupiedQuads,
    ) -> bool {
        self.moved_unit(entity, faction, pos, radius, occupied)
    }

    pub fn remove_unit(&mut self, entity: Entity, faction: u8, occupied: &mut OccupiedQuads) {
        for &qi in occupied.0.iter() {
            let quad = self.quad_mut(qi);
            erase(&mut quad.units, entity);
            if let Some(bucket) = quad.faction_units.get_mut(faction as usize) {
                erase(bucket, entity);
            }
        }
        occupied.0.clear();
    }

    // ========================================================================
    // Features
    // ========================================================================

    pub fn add_feature(&mut self, entity: Entity, pos: FixedVec2, radius: FixedNum) {
        let quads = self.quads_in_circle(pos, radius);
        for &qi in quads.iter() {
            push_unique(&mut self.quad_mut(qi).features, entity);
        }
    }

    /// Features do not cache their quads; removal recomputes them from the
    /// position they were added at.
    pub fn remove_feature(&mut self, entity: Entity, pos: FixedVec2, radius: FixedNum) {
        let quads = self.quads_in_circle(pos, radius);
        for &qi in quads.iter() {
            erase(&mut self.quad_mut(qi).features, entity);
        }
    }

    pub fn moved_feature(&mut self, entity: Entity, old_pos: FixedVec2, new_pos: FixedVec2, radius: FixedNum) {
        self.remove_feature(entity, old_pos, radius);
        self.add_feature(entity, new_pos, radius);
    }

    // ========================================================================
    // Projectiles
    // ========================================================================

    /// Hit-scan projectiles cover their whole ray once; others sit in the
    /// single quad under their position.
    pub fn add_projectile(
        &mut self,
        entity: Entity,
        pos: FixedVec2,
        dir: FixedVec2,
        range: FixedNum,
        hitscan: bool,
        occupied: &mut OccupiedQuads,
    ) {
        occupied.0.clear();
        if hitscan {
            let quads = self.quads_on_ray(pos, dir, range);
            for &qi in quads.iter() {
                push_unique(&mut self.quad_mut(qi).projectiles, entity);
            }
            occupied.0.extend_from_slice(&quads);
        } else {
            let qi = self.world_pos_to_quad_idx(pos);
            push_unique(&mut self.quad_mut(qi).projectiles, entity);
            occupied.0.push(qi);
        }
    }

    pub fn remove_projectile(&mut self, entity: Entity, occupied: &mut OccupiedQuads) {
        for &qi in occupied.0.iter() {
            erase(&mut self.quad_mut(qi).projectiles, entity);
        }
        occupied.0.clear();
    }

    /// Hit-scan projectiles never move in the index.
    pub fn moved_projectile(&mut self, entity: Entity, pos: FixedVec2, hitscan: bool, occupied: &mut OccupiedQuads) {
        if hitscan {
            return;
        }
        let qi = self.world_pos_to_quad_idx(pos);
        if occupied.0.last() == Some(&qi) {
            return;
        }
        self.remove_projectile(entity, occupied);
        push_unique(&mut self.quad_mut(qi).projectiles, entity);
        occupied.0.push(qi);
    }

    // ========================================================================
    // Repulsers
    // ========================================================================

    pub fn moved_repulser(&mut self, entity: Entity, pos: FixedVec2, radius: FixedNum, occupied: &mut OccupiedQuads) -> bool {
        let fresh: Scratch<Vec<usize>> = self.quads_in_circle(pos, radius);
        if fresh.as_slice() == occupied.0.as_slice() {
            return false;
        }
        for &qi in occupied.0.iter() {
            erase(&mut self.quad_mut(qi).repulsers, entity);
        }
        for &qi in fresh.iter() {
            push_unique(&mut self.quad_mut(qi).repulsers, entity);
        }
        occupied.0 = SmallVec::from_slice(&fresh);
        true
    }

    pub fn remove_repulser(&mut self, entity: Entity, occupied: &mut OccupiedQuads) {
        for &qi in occupied.0.iter() {
            erase(&mut self.quad_mut(qi).repulsers, entity);
        }
        occupied.0.clear();
    }
}
