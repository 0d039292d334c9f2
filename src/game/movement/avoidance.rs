use bevy::prelude::*;

use super::{MoveContext, MovableBody, MovementController};
use crate::game::fixed_math::{clamp, sign, sq, FixedNum, FixedVec2};
use crate::game::solid::SolidFilter;
use crate::game::terrain::MoveClass;

/// Ticks per second; scales how far ahead neighbours are considered.
const GAME_SPEED: i32 = 30;
const DESIRED_DIR_WEIGHT: f64 = 0.5;
const LAST_DIR_MIX_ALPHA: f64 = 0.7;
/// cos(120 degrees); neighbours further behind than this are ignored.
const MAX_AVOIDEE_COSINE: f64 = -0.5;

impl MovementController {
    pub fn update_obstacle_avoidance(&mut self, body: &MovableBody, mc: &MoveClass, ctx: &MoveContext) {
        let want_reverse = self.want_reverse(body, mc);
        let desired = if self.flags.at_goal {
            body.front
        } else if want_reverse {
            -self.waypoint_dir
        } else {
            self.waypoint_dir
        };
        self.obstacle_avoidance_dir(body, mc, ctx, desired);
    }

    /// Steers around mobile neighbours ahead of the unit. Re-evaluated every
    /// `avoidance_update_rate` ticks, staggered by entity index; in between
    /// the last result is kept while avoiding.
    pub fn obstacle_avoidance_dir(
        &mut self,
        body: &MovableBody,
        mc: &MoveClass,
        ctx: &MoveContext,
        desired: FixedVec2,
    ) -> FixedVec2 {
        if self.want_to_stop() {
            self.last_avoidance_dir = body.front;
            return self.last_avoidance_dir;
        }

        let rate = ctx.config.avoidance_update_rate.max(1) as u64;
        let owner = ctx.owner;
        if (ctx.frame + owner.index() as u64) % rate != 0 {
            if !self.flags.avoiding_units {
                self.last_avoidance_dir = desired;
            }
            return self.last_avoidance_dir;
        }

        self.flags.avoiding_units = false;
        self.last_avoidance_dir = desired;

        if body.front.dot(desired) < FixedNum::ZERO {
            return self.last_avoidance_dir;
        }

        let speed_factor = self.current_speed.max(FixedNum::ONE);
        let avoidance_radius = speed_factor * body.radius * FixedNum::from_num(2);
        let avoider_radius = mc.min_exterior_radius();
        let avoider_right = body.right();
        let goal_dist_sq = body.pos.distance_squared(self.goal);
        let look_ahead = speed_factor * FixedNum::from_num(GAME_SPEED);

        let mut avoidance_vec = FixedVec2::ZERO;

        let nearby = ctx
            .quad_field
            .solids_in_radius(body.pos, avoidance_radius, SolidFilter::BLOCKING, ctx.solids);
        for &entity in nearby.iter() {
            if entity == owner {
                continue;
            }
            let Some(avoidee) = ctx.solids.get(entity) else {
                continue;
            };
            if !avoidee.mobile || avoidee.state.off_ground() {
                continue;
            }
            if !avoidee.resists_crush(mc.crush_strength) {
                continue;
            }

            if !avoidee.state.push_resistant
                && (!mc.avoid_mobiles_on_path || (!avoidee.state.moving && avoidee.faction == body.faction))
            {
                continue;
            }

            let avoidee_vector = (body.pos + body.velocity) - (avoidee.pos + avoidee.velocity);
            let avoidee_radius = avoidee.half_extents.length();
            let radius_sum = avoider_radius + avoidee_radius;
            let mass_scale = avoidee.mass / (body.mass + avoidee.mass);
            let dist_sq = avoidee_vector.length_squared();
            let dist = dist_sq.sqrt() + FixedNum::from_num(0.01);

            if body.front.dot(-(avoidee_vector / dist)) < FixedNum::from_num(MAX_AVOIDEE_COSINE) {
                continue;
            }
            if dist_sq >= sq(look_ahead + radius_sum) {
                continue;
            }
            if dist_sq >= goal_dist_sq {
                continue;
            }

            let avoidee_right = avoidee.right();
            let mut avoider_turn_sign = -sign(avoidee.pos.dot(avoider_right) - body.pos.dot(avoider_right));
            let avoidee_turn_sign = -sign(body.pos.dot(avoidee_right) - avoidee.pos.dot(avoidee_right));

            let cos_angle = clamp(body.front.dot(avoidee.front), -FixedNum::ONE, FixedNum::ONE);
            let response = (FixedNum::ONE - cos_angle) + FixedNum::from_num(0.1);
            let fall_off = FixedNum::ONE - FixedNum::ONE.min(dist / (FixedNum::from_num(5) * radius_sum));

            if cos_angle < FixedNum::ZERO {
                avoider_turn_sign = avoider_turn_sign.max(avoidee_turn_sign);
            }

            avoidance_vec += avoider_right * (avoider_turn_sign * response * fall_off * mass_scale);
            self.flags.avoiding_units = true;
        }

        let dir = desired.mix(avoidance_vec, FixedNum::from_num(DESIRED_DIR_WEIGHT)).normalize();
        let dir = dir.mix(self.last_avoidance_dir, FixedNum::from_num(LAST_DIR_MIX_ALPHA)).normalize();
        self.last_avoidance_dir = dir;
        dir
    }
}
