//! Quad index walks. All results are row-major (z outer, x inner) and
//! identical for identical inputs.

use super::{QuadField, Scratch, QUAD_RADIUS_FACTOR};
use crate::game::fixed_math::{FixedNum, FixedVec2};

impl QuadField {
    /// Quads overlapping the disk at `pos` (clamped onto the map) with `radius`.
    ///
    /// The candidate rectangle is filtered by distance to each quad centre
    /// against `radius + 0.72 * quad_size`, which over-approximates a quad's
    /// circumscribed radius so no true overlap is missed.
    pub fn quads_in_circle_into(&self, pos: FixedVec2, radius: FixedNum, out: &mut Vec<usize>) {
        out.clear();
        let pos = self.clamp_in_bounds(pos);
        let r = FixedVec2::new(radius, radius);
        let (min_x, min_z) = self.world_pos_to_quad(pos - r);
        let (max_x, max_z) = self.world_pos_to_quad(pos + r);
        if max_z < min_z || max_x < min_x {
            return;
        }

        let reach = radius + self.qs() * FixedNum::from_num(QUAD_RADIUS_FACTOR);
        let max_sq = reach * reach;

        for z in min_z..=max_z {
            for x in min_x..=max_x {
                if pos.distance_squared(self.quad_center(x, z)) < max_sq {
                    out.push((z * self.num_quads_x + x) as usize);
                }
            }
        }
    }

    pub fn quads_in_circle(&self, pos: FixedVec2, radius: FixedNum) -> Scratch<Vec<usize>> {
        let mut out = Scratch::<Vec<usize>>::acquire();
        self.quads_in_circle_into(pos, radius, &mut out);
        out
    }

    /// Quads covering the inclusive axis-aligned rectangle `[mins, maxs]`.
    pub fn quads_in_rectangle_into(&self, mins: FixedVec2, maxs: FixedVec2, out: &mut Vec<usize>) {
        out.clear();
        let (min_x, min_z) = self.world_pos_to_quad(mins);
        let (max_x, max_z) = self.world_pos_to_quad(maxs);
        if max_z < min_z || max_x < min_x {
            return;
        }
        for z in min_z..=max_z {
            for x in min_x..=max_x {
                out.push((z * self.num_quads_x + x) as usize);
            }
        }
    }

    pub fn quads_in_rectangle(&self, mins: FixedVec2, maxs: FixedVec2) -> Scratch<Vec<usize>> {
        let mut out = Scratch::<Vec<usize>>::acquire();
        self.quads_in_rectangle_into(mins, maxs, &mut out);
        out
    }

    /// Quads crossed by the segment `start + dir * t`, `t` in `[0, length]`.
    pub fn quads_on_ray_into(&self, start: FixedVec2, dir: FixedVec2, length: FixedNum, out: &mut Vec<usize>) {
        out.clear();
        let qs = self.qs();
        let to = start + dir * length;

        let no_x_dir = (start.x / qs).floor() == (to.x / qs).floor();
        let no_z_dir = (start.y / qs).floor() == (to.y / qs).floor();

        if no_x_dir && no_z_dir {
            out.push(self.world_pos_to_quad_idx(start));
            return;
        }

        // Single row; also keeps the z division below away from dir.z == 0.
        if no_z_dir {
            let mut start_x = self.clamp_x((start.x / qs).to_num::<i64>());
            let mut final_x = self.clamp_x((to.x / qs).to_num::<i64>());
            if final_x < start_x {
                std::mem::swap(&mut start_x, &mut final_x);
            }
            let row = self.clamp_z((start.y / qs).to_num::<i64>()) * self.num_quads_x;
            for x in start_x..=final_x {
                out.push((row + x) as usize);
            }
            return;
        }

        self.walk_rows(start, dir, to, length, FixedNum::ZERO, out);
    }

    pub fn quads_on_ray(&self, start: FixedVec2, dir: FixedVec2, length: FixedNum) -> Scratch<Vec<usize>> {
        let mut out = Scratch::<Vec<usize>>::acquire();
        self.quads_on_ray_into(start, dir, length, &mut out);
        out
    }

    /// Like [`Self::quads_on_ray_into`] for a ray of half-width `width`.
    ///
    /// Rays that stay within one quad row degrade to a rectangle query
    /// padded by `width`. Otherwise the far end is pushed out along the ray
    /// and every row's column span is widened by the perpendicular share of
    /// `width`.
    pub fn quads_on_wide_ray_into(
        &self,
        start: FixedVec2,
        dir: FixedVec2,
        length: FixedNum,
        width: FixedNum,
        out: &mut Vec<usize>,
    ) {
        out.clear();
        let qs = self.qs();
        let base_to = start + dir * length;

        let no_z_dir = (start.y / qs).floor() == (base_to.y / qs).floor();
        if no_z_dir {
            let pad = FixedVec2::new(width, width);
            let mins = FixedVec2::new(start.x.min(base_to.x), start.y.min(base_to.y)) - pad;
            let maxs = FixedVec2::new(start.x.max(base_to.x), start.y.max(base_to.y)) + pad;
            self.quads_in_rectangle_into(mins, maxs, out);
            return;
        }

        let planar = dir.normalize();
        let width_factor = (planar.y / dir.y).abs() * width;
        let to = base_to + dir * width_factor;
        let length = (to - start).length();
        let margin_x = (width * planar.y).abs();

        self.walk_rows(start, dir, to, length, margin_x, out);
    }

    pub fn quads_on_wide_ray(
        &self,
        start: FixedVec2,
        dir: FixedVec2,
        length: FixedNum,
        width: FixedNum,
    ) -> Scratch<Vec<usize>> {
        let mut out = Scratch::<Vec<usize>>::acquire();
        self.quads_on_wide_ray_into(start, dir, length, width, &mut out);
        out
    }

    /// Row-by-row walk shared by the thin and wide rays. For each touched row
    /// the ray parameter range inside the row gives the column span, padded by
    /// `margin_x` world units on both sides. `dir.y` must be non-zero.
    fn walk_rows(
        &self,
        start: FixedVec2,
        dir: FixedVec2,
        to: FixedVec2,
        length: FixedNum,
        margin_x: FixedNum,
        out: &mut Vec<usize>,
    ) {
        let qs = self.qs();
        let nz = FixedNum::from_num(self.num_quads_z);

        let mut start_zuc = start.y / qs;
        let mut final_zuc = to.y / qs;
        if final_zuc < start_zuc {
            std::mem::swap(&mut start_zuc, &mut final_zuc);
        }

        let start_z = self.clamp_z(start_zuc.to_num::<i64>());
        let final_z = self.clamp_z(final_zuc.to_num::<i64>());

        for z in start_z..=final_z {
            let zf = FixedNum::from_num(z);
            let mut t0 = (zf * qs - start.y) / dir.y;
            let mut t1 = ((zf + FixedNum::ONE) * qs - start.y) / dir.y;

            if (start_zuc < FixedNum::ZERO && z == 0) || (start_zuc >= nz && z == final_z) {
                t0 = (start_zuc * qs - start.y) / dir.y;
            }
            if (final_zuc < FixedNum::ZERO && z == 0) || (final_zuc >= nz && z == final_z) {
                t1 = ((final_zuc + FixedNum::ONE) * qs - start.y) / dir.y;
            }

            let t0 = t0.max(FixedNum::ZERO).min(length);
            let t1 = t1.max(FixedNum::ZERO).min(length);

            let mut map_start_x = dir.x * t0 + start.x;
            let mut map_final_x = dir.x * t1 + start.x;
            if map_final_x < map_start_x {
                std::mem::swap(&mut map_start_x, &mut map_final_x);
            }

            let start_x = self.clamp_x(((map_start_x - margin_x) / qs).to_num::<i64>());
            let final_x = self.clamp_x(((map_final_x + margin_x) / qs).to_num::<i64>());

            let row = z * self.num_quads_x;
            for x in start_x..=final_x {
                out.push((row + x) as usize);
            }
        }
    }
}
