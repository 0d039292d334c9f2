//! Exact object queries.
//!
//! Each query walks the quads of a region, visits every listed object once
//! (objects spanning several quads are deduplicated with a scratch mark set)
//! and keeps those passing an exact distance or bounds test. Results keep
//! first-seen order, so they only depend on index contents.

use bevy::prelude::*;
use rustc_hash::FxHashSet;

use super::{QuadField, Scratch};
use crate::game::fixed_math::{FixedNum, FixedVec2};
use crate::game::solid::{SolidFilter, SolidLookup, SolidObject};

fn within_radius(pos: FixedVec2, radius: FixedNum, solid: &SolidObject) -> bool {
    let reach = radius + solid.radius;
    pos.distance_squared(solid.pos) < reach * reach
}

fn within_rect(mins: FixedVec2, maxs: FixedVec2, p: FixedVec2) -> bool {
    p.x >= mins.x && p.x <= maxs.x && p.y >= mins.y && p.y <= maxs.y
}

#[derive(Clone, Copy)]
enum Bucket {
    Units,
    Faction(usize),
    Features,
    Projectiles,
}

impl QuadField {
    /// Visits each distinct entity of `bucket` across `quads` in first-seen order.
    fn collect_distinct(
        &self,
        quads: &[usize],
        bucket: Bucket,
        mut keep: impl FnMut(Entity) -> bool,
    ) -> Scratch<Vec<Entity>> {
        let mut seen = Scratch::<FxHashSet<Entity>>::acquire();
        let mut out = Scratch::<Vec<Entity>>::acquire();
        for &qi in quads {
            let quad = self.quad(qi);
            let list: &[Entity] = match bucket {
                Bucket::Units => &quad.units,
                Bucket::Faction(f) => quad.faction_units.get(f).map_or(&[][..], |v| v.as_slice()),
                Bucket::Features => &quad.features,
                Bucket::Projectiles => &quad.projectiles,
            };
            for &e in list {
                if seen.insert(e) && keep(e) {
                    out.push(e);
                }
            }
        }
        out
    }

    /// Every unit listed in the quads touched by the circle, without an exact test.
    pub fn units_in_quads(&self, pos: FixedVec2, radius: FixedNum) -> Scratch<Vec<Entity>> {
        let quads = self.quads_in_circle(pos, radius);
        self.collect_distinct(&quads, Bucket::Units, |_| true)
    }

    /// Units whose circle overlaps the query circle on the ground plane.
    pub fn units_in_radius(&self, pos: FixedVec2, radius: FixedNum, lookup: &impl SolidLookup) -> Scratch<Vec<Entity>> {
        let quads = self.quads_in_circle(pos, radius);
        self.collect_distinct(&quads, Bucket::Units, |e| {
            lookup.solid(e).is_some_and(|s| within_radius(pos, radius, s))
        })
    }

    /// Units of one faction overlapping the query circle.
    pub fn faction_units_in_radius(
        &self,
        pos: FixedVec2,
        radius: FixedNum,
        faction: u8,
        lookup: &impl SolidLookup,
    ) -> Scratch<Vec<Entity>> {
        let quads = self.quads_in_circle(pos, radius);
        self.collect_distinct(&quads, Bucket::Faction(faction as usize), |e| {
            lookup.solid(e).is_some_and(|s| within_radius(pos, radius, s))
        })
    }

    /// Units whose centre lies inside `[mins, maxs]`.
    pub fn units_in_rectangle(&self, mins: FixedVec2, maxs: FixedVec2, lookup: &impl SolidLookup) -> Scratch<Vec<Entity>> {
        let quads = self.quads_in_rectangle(mins, maxs);
        self.collect_distinct(&quads, Bucket::Units, |e| {
            lookup.solid(e).is_some_and(|s| within_rect(mins, maxs, s.pos))
        })
    }

    pub fn features_in_radius(&self, pos: FixedVec2, radius: FixedNum, lookup: &impl SolidLookup) -> Scratch<Vec<Entity>> {
        let quads = self.quads_in_circle(pos, radius);
        self.collect_distinct(&quads, Bucket::Features, |e| {
            lookup.solid(e).is_some_and(|s| within_radius(pos, radius, s))
        })
    }

    pub fn features_in_rectangle(&self, mins: FixedVec2, maxs: FixedVec2, lookup: &impl SolidLookup) -> Scratch<Vec<Entity>> {
        let quads = self.quads_in_rectangle(mins, maxs);
        self.collect_distinct(&quads, Bucket::Features, |e| {
            lookup.solid(e).is_some_and(|s| within_rect(mins, maxs, s.pos))
        })
    }

    pub fn projectiles_in_radius(&self, pos: FixedVec2, radius: FixedNum, lookup: &impl SolidLookup) -> Scratch<Vec<Entity>> {
        let quads = self.quads_in_circle(pos, radius);
        self.collect_distinct(&quads, Bucket::Projectiles, |e| {
            lookup.solid(e).is_some_and(|s| within_radius(pos, radius, s))
        })
    }

    pub fn projectiles_in_rectangle(&self, mins: FixedVec2, maxs: FixedVec2, lookup: &impl SolidLookup) -> Scratch<Vec<Entity>> {
        let quads = self.quads_in_rectangle(mins, maxs);
        self.collect_distinct(&quads, Bucket::Projectiles, |e| {
            lookup.solid(e).is_some_and(|s| within_rect(mins, maxs, s.pos))
        })
    }

    /// Units and features overlapping the circle and accepted by `filter`.
    /// Per quad, units come before features.
    pub fn solids_in_radius(
        &self,
        pos: FixedVec2,
        radius: FixedNum,
        filter: SolidFilter,
        lookup: &impl SolidLookup,
    ) -> Scratch<Vec<Entity>> {
        let quads = self.quads_in_circle(pos, radius);
        let mut seen = Scratch::<FxHashSet<Entity>>::acquire();
        let mut out = Scratch::<Vec<Entity>>::acquire();
        for &qi in quads.iter() {
            let quad = self.quad(qi);
            for &e in quad.units.iter().chain(quad.features.iter()) {
                if !seen.insert(e) {
                    continue;
                }
                if lookup.solid(e).is_some_and(|s| filter.accepts(s) && within_radius(pos, radius, s)) {
                    out.push(e);
                }
            }
        }
        out
    }

    /// True when nothing accepted by `filter` overlaps the circle.
    pub fn no_solids_in_radius(
        &self,
        pos: FixedVec2,
        radius: FixedNum,
        filter: SolidFilter,
        lookup: &impl SolidLookup,
    ) -> bool {
        let quads = self.quads_in_circle(pos, radius);
        quads.iter().all(|&qi| {
            let quad = self.quad(qi);
            quad.units
                .iter()
                .chain(quad.features.iter())
                .filter_map(|&e| lookup.solid(e))
                .all(|s| !(filter.accepts(s) && within_radius(pos, radius, s)))
        })
    }
}
