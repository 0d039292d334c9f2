use bevy::prelude::*;

use super::{MovableBody, MovementController, Planner, ProgressState, MAX_IDLING_SLOWUPDATES};
use crate::game::fixed_math::{heading_delta, sq, FixedNum, FixedVec2, MAX_HEADING};
use crate::game::terrain::{MoveClass, SQUARE_SIZE};

/// Positions closer than this on both axes count as unchanged.
const MOVE_EPSILON: f64 = 0.0001;

fn nearly_zero(v: FixedVec2) -> bool {
    let eps = FixedNum::from_num(MOVE_EPSILON);
    v.x.abs() <= eps && v.y.abs() <= eps
}

impl MovementController {
    /// Idling bookkeeping after the resolve step. A unit idles when it makes
    /// no headway toward its waypoint relative to how far it moved.
    pub fn owner_moved(&mut self, body: &mut MovableBody) -> bool {
        let pos_dif = body.pos - self.old_pos;

        if nearly_zero(pos_dif) {
            body.velocity = FixedVec2::ZERO;
            let turned = (heading_delta(body.heading, self.old_heading) as i32).abs();
            self.flags.idling = !self.flags.at_goal && turned < self.turn_rate;
            return false;
        }

        self.old_pos = body.pos;

        let moved_sq = pos_dif.length_squared();
        let ffd = body.front * (moved_sq * FixedNum::from_num(0.5));
        let wpd = if self.flags.reversing { -self.waypoint_dir } else { self.waypoint_dir };

        let progress_sq = sq(self.curr_waypoint_dist - self.prev_waypoint_dist);
        self.flags.idling = progress_sq < ffd.dot(wpd) && moved_sq < sq(body.speed() * FixedNum::from_num(0.5));
        true
    }

    /// Periodic upkeep: stuck detection, deferred repaths and bounds repair.
    pub fn slow_update(&mut self, owner: Entity, body: &mut MovableBody, mc: &MoveClass, planner: &Planner) {
        if self.progress == ProgressState::Active {
            self.update_idling_slow(owner, body, mc, planner);
            if self.progress == ProgressState::Active && self.flags.want_repath {
                self.update_deferred_repath(owner, body, mc, planner);
            }
        }

        if !body.state.flying && !planner.terrain.pos_in_bounds(body.pos) {
            let clamped = planner.terrain.clamp_in_bounds(body.pos);
            warn!(
                "[MOVE] {:?} out of bounds | pos: ({:.1}, {:.1})",
                owner,
                body.pos.x.to_num::<f32>(),
                body.pos.y.to_num::<f32>()
            );
            body.pos = clamped;
            self.old_pos = clamped;
        }
    }

    fn update_idling_slow(&mut self, owner: Entity, body: &MovableBody, mc: &MoveClass, planner: &Planner) {
        if self.path_id.is_none() {
            self.re_request_path(owner, body, mc, planner, true);
            return;
        }

        self.num_idling_slow_updates = if self.flags.idling {
            (self.num_idling_slow_updates + 1).min(MAX_IDLING_SLOWUPDATES)
        } else {
            (self.num_idling_slow_updates - 1).max(0)
        };

        if self.num_idling_updates <= MAX_HEADING as i32 / self.turn_rate {
            return;
        }
        if self.num_idling_slow_updates < MAX_IDLING_SLOWUPDATES {
            if self.flags.idling {
                debug!("[MOVE] {:?} idling | updates: {}", owner, self.num_idling_updates);
                self.flags.force_static_object_check = true;
                self.re_request_path(owner, body, mc, planner, true);
            }
        } else {
            self.fail(owner, planner);
        }
    }

    fn update_deferred_repath(&mut self, owner: Entity, body: &MovableBody, mc: &MoveClass, planner: &Planner) {
        let frame = planner.frame;
        let ten = FixedNum::from_num(10);
        let cur_dist = (self.curr_waypoint.pos.distance(body.pos) * ten).floor() / ten;
        if cur_dist < self.best_last_waypoint_dist {
            self.best_last_waypoint_dist = cur_dist;
            self.want_repath_frame = frame;
        }

        let config = planner.config;
        let time_for_repath = frame >= self.want_repath_frame + config.repath_delay
            && (frame >= self.last_repath_frame + config.repath_max_rate || self.flags.last_waypoint);
        if !time_for_repath {
            return;
        }

        if self.flags.last_waypoint {
            self.best_last_waypoint_dist /= FixedNum::from_num(SQUARE_SIZE);
            if self.best_last_waypoint_dist < self.best_reattempted_last_waypoint_dist {
                self.flags.last_waypoint = false;
                self.best_reattempted_last_waypoint_dist = self.best_last_waypoint_dist;
            } else {
                self.best_reattempted_last_waypoint_dist = FixedNum::MAX;
            }
        }

        if self.flags.last_waypoint {
            self.fail(owner, planner);
        } else {
            self.re_request_path(owner, body, mc, planner, true);
        }
    }
}
