use bevy::prelude::*;

use super::{MoveContext, MovableBody, MovementController};
use crate::game::collision;
use crate::game::fixed_math::{clamp, heading_delta, sq, vec_to_heading, FixedNum, FixedVec2, HEADING_UNITS, MAX_HEADING};
use crate::game::path::PathHandle;
use crate::game::terrain::{square_size, MoveClass};

/// Distance covered while braking from `speed` at `rate` per tick.
pub fn braking_distance(speed: FixedNum, rate: FixedNum) -> FixedNum {
    if rate <= FixedNum::ZERO {
        return FixedNum::ZERO;
    }
    sq(speed) / (rate * FixedNum::from_num(2))
}

/// Turns target speeds and headings into per-tick changes.
///
/// Swappable so restored units can ease back into motion instead of
/// snapping to their target speed.
pub trait SpeedPolicy: Send + Sync + 'static {
    #[allow(clippy::too_many_arguments)]
    fn delta_speed(
        &self,
        path: Option<PathHandle>,
        target_speed: FixedNum,
        current_speed: FixedNum,
        acc_rate: FixedNum,
        dec_rate: FixedNum,
        want_reverse: bool,
        is_reversing: bool,
    ) -> FixedNum;

    fn delta_heading(&self, path: Option<PathHandle>, wanted: i16, current: i16, turn_rate: i32) -> i16;
}

/// Accelerates and turns at the unit's full rates.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultSpeedPolicy;

impl SpeedPolicy for DefaultSpeedPolicy {
    fn delta_speed(
        &self,
        _path: Option<PathHandle>,
        target_speed: FixedNum,
        current_speed: FixedNum,
        acc_rate: FixedNum,
        dec_rate: FixedNum,
        want_reverse: bool,
        is_reversing: bool,
    ) -> FixedNum {
        let target = if want_reverse { -target_speed } else { target_speed };
        let current = if is_reversing { -current_speed } else { current_speed };
        let raw = target - current;
        if raw < FixedNum::ZERO {
            -raw.abs().min(dec_rate)
        } else {
            raw.min(acc_rate)
        }
    }

    fn delta_heading(&self, _path: Option<PathHandle>, wanted: i16, current: i16, turn_rate: i32) -> i16 {
        let delta = heading_delta(wanted, current) as i32;
        delta.clamp(-turn_rate, turn_rate) as i16
    }
}

/// The policy used by this simulation.
#[derive(Resource)]
pub struct SpeedControl(pub Box<dyn SpeedPolicy>);

impl Default for SpeedControl {
    fn default() -> Self {
        Self(Box::new(DefaultSpeedPolicy))
    }
}

impl MovementController {
    /// Integration step: applies the steering intent, builds the speed
    /// vector and asks the terrain how much of it can be taken.
    pub fn integrate(&mut self, body: &mut MovableBody, mc: &MoveClass, ctx: &MoveContext) {
        self.resultant_force = FixedVec2::ZERO;
        if body.state.skidding {
            return;
        }

        match std::mem::take(&mut self.heading_intent) {
            super::HeadingIntent::Move(heading) => {
                self.change_heading(body, ctx, heading);
                let want_reverse = self.want_reverse(body, mc);
                self.change_speed(body, mc, ctx, self.max_wanted_speed, want_reverse);
            }
            super::HeadingIntent::Stop => self.change_speed(body, mc, ctx, FixedNum::ZERO, false),
            super::HeadingIntent::None => {}
        }

        let old_vector = body.velocity;
        let new_vector = self.speed_vector(body);
        self.update_owner_pos(body, mc, ctx, old_vector, new_vector);
    }

    pub fn change_heading(&mut self, body: &mut MovableBody, ctx: &MoveContext, heading: i16) {
        self.wanted_heading = heading;
        if body.heading == heading {
            return;
        }
        let delta = ctx.policy.delta_heading(self.path_id, heading, body.heading, self.turn_rate);
        body.add_heading(delta);
    }

    /// Picks this tick's speed change toward `new_wanted_speed`, capped by
    /// terrain, turn sharpness, braking distance and post-collision turning.
    pub fn change_speed(
        &mut self,
        body: &MovableBody,
        mc: &MoveClass,
        ctx: &MoveContext,
        new_wanted_speed: FixedNum,
        want_reverse: bool,
    ) {
        self.wanted_speed = new_wanted_speed;
        if self.wanted_speed <= FixedNum::ZERO && self.current_speed < FixedNum::from_num(0.01) {
            self.delta_speed = -self.current_speed;
            return;
        }

        let mut target = if want_reverse { self.max_reverse_speed } else { self.max_speed };

        if self.wanted_speed > FixedNum::ZERO {
            let mut ground_mod = ctx.terrain.pos_speed_mod(body.pos);
            if ground_mod == FixedNum::ZERO {
                ground_mod = ctx.terrain.pos_speed_mod(body.pos + body.front * square_size());
            }

            let cur_goal_dist_sq = body.pos.distance_squared(self.goal);
            let start_braking = cur_goal_dist_sq <= sq(braking_distance(self.current_speed, self.dec_rate));

            let waypoint_dif = if self.flags.reversing { -self.waypoint_dir } else { self.waypoint_dir };
            let turn_delta = heading_delta(body.heading, vec_to_heading(waypoint_dif));
            let mut max_speed_to_make_turn = FixedNum::MAX;

            if turn_delta != 0 {
                let req_turn_angle = (FixedNum::from_num(180)
                    * FixedNum::from_num(heading_delta(body.heading, self.wanted_heading))
                    / FixedNum::from_num(MAX_HEADING))
                .abs();
                let max_turn_angle =
                    FixedNum::from_num(self.turn_rate) * FixedNum::from_num(360) / FixedNum::from_num(HEADING_UNITS);
                let turn_max_speed = if self.flags.reversing { self.max_reverse_speed } else { self.max_speed };
                let mut turn_mod_speed = turn_max_speed;
                if req_turn_angle != FixedNum::ZERO {
                    turn_mod_speed *= clamp(max_turn_angle / req_turn_angle, FixedNum::from_num(0.1), FixedNum::ONE);
                }

                if self.waypoint_dir.length_squared() > FixedNum::from_num(0.1) {
                    if !mc.turn_in_place {
                        let floor = mc.turn_in_place_speed_limit.min(turn_max_speed);
                        target = clamp(turn_mod_speed, floor, turn_max_speed);
                    } else if req_turn_angle > mc.turn_in_place_angle_limit {
                        target = turn_mod_speed;
                    }
                }

                if self.flags.at_end_of_path {
                    let frames_to_turn = FixedNum::from_num(HEADING_UNITS) / FixedNum::from_num(self.turn_rate);
                    let circle_speed = self.curr_waypoint_dist * FixedNum::from_num(std::f64::consts::PI) / frames_to_turn;
                    target = target.min(circle_speed);
                }
            }

            if self.limit_speed_for_turning > 0 {
                let offset = heading_delta(vec_to_heading(self.waypoint_dir), body.heading);
                let frames_to_turn = (FixedNum::from_num(offset) / FixedNum::from_num(self.turn_rate))
                    .abs()
                    .max(FixedNum::from_num(0.0001));
                max_speed_to_make_turn =
                    (self.curr_waypoint_dist / frames_to_turn * FixedNum::from_num(0.95)).max(FixedNum::from_num(0.01));
            }

            self.wanted_speed *= ground_mod.max(FixedNum::ONE);
            target *= ground_mod;
            if start_braking || self.want_to_stop() {
                target = FixedNum::ZERO;
            }
            target = target.min(self.wanted_speed).min(max_speed_to_make_turn);
        } else {
            target = FixedNum::ZERO;
        }

        self.delta_speed = ctx.policy.delta_speed(
            self.path_id,
            target,
            self.current_speed,
            self.acc_rate,
            self.dec_rate,
            want_reverse,
            self.flags.reversing,
        );
    }

    /// Whether backing up reaches the goal sooner than turning around.
    pub fn want_reverse(&self, body: &MovableBody, mc: &MoveClass) -> bool {
        if !mc.can_reverse() || self.max_reverse_speed <= FixedNum::ZERO {
            return false;
        }
        if self.max_speed <= FixedNum::ZERO {
            return true;
        }
        if self.acc_rate <= FixedNum::ZERO || self.dec_rate <= FixedNum::ZERO || self.turn_rate <= 0 {
            return false;
        }
        if self.waypoint_dir.dot(body.front) >= FixedNum::ZERO {
            return false;
        }

        let goal_dist = self.goal.distance(body.pos);
        let goal_fwd_eta = goal_dist / self.max_speed;
        let goal_rev_eta = goal_dist / self.max_reverse_speed;

        let fwd_turn = FixedNum::from_num(
            (heading_delta(vec_to_heading(self.waypoint_dir), body.heading) as i32).unsigned_abs(),
        );
        let rev_turn = FixedNum::from_num(MAX_HEADING) - fwd_turn;

        let turn_rate = FixedNum::from_num(self.turn_rate);
        let turn_time_mod = FixedNum::from_num(5);
        let fwd_turn_time = (fwd_turn / turn_rate - turn_time_mod).max(FixedNum::ZERO);
        let rev_turn_time = (rev_turn / turn_rate - turn_time_mod).max(FixedNum::ZERO);

        let eighth = FixedNum::from_num(0.125);
        let apx_fwd = (self.current_speed - eighth * fwd_turn_time * self.dec_rate).max(FixedNum::ZERO);
        let apx_rev = (self.current_speed - eighth * rev_turn_time * self.dec_rate).max(FixedNum::ZERO);

        let (fwd_dec_time, rev_dec_time, fwd_acc_time, rev_acc_time) = if self.flags.reversing {
            (
                apx_fwd / self.dec_rate,
                FixedNum::ZERO,
                self.max_speed / self.acc_rate,
                (self.max_reverse_speed - apx_rev) / self.acc_rate,
            )
        } else {
            (
                FixedNum::ZERO,
                apx_rev / self.dec_rate,
                (self.max_speed - apx_fwd) / self.acc_rate,
                self.max_reverse_speed / self.acc_rate,
            )
        };

        let fwd_eta = goal_fwd_eta + fwd_turn_time + fwd_acc_time + fwd_dec_time;
        let rev_eta = goal_rev_eta + rev_turn_time + rev_dec_time + rev_acc_time;
        fwd_eta > rev_eta
    }

    /// Velocity for this tick along the current facing.
    pub fn speed_vector(&self, body: &MovableBody) -> FixedVec2 {
        let speed = body.speed();
        if self.wanted_speed == FixedNum::ZERO && speed - self.delta_speed <= FixedNum::from_num(0.01) {
            return FixedVec2::ZERO;
        }
        let signed = if self.flags.reversing { -speed } else { speed };
        body.front * (signed + self.delta_speed)
    }

    /// Sets the velocity and records how far the terrain lets the unit move.
    pub fn update_owner_pos(
        &mut self,
        body: &mut MovableBody,
        mc: &MoveClass,
        ctx: &MoveContext,
        old_vector: FixedVec2,
        new_vector: FixedVec2,
    ) {
        self.old_speed = old_vector.dot(body.front);
        self.new_speed = new_vector.dot(body.front);

        if old_vector != new_vector {
            body.velocity = new_vector;
        }
        if new_vector.is_zero() {
            return;
        }

        let resultant = collision::update_pos(ctx.terrain, mc, body, self.flags.position_stuck, new_vector);
        if resultant != new_vector {
            self.mark_repath(ctx.frame);
        }
        if !resultant.is_zero() {
            self.resultant_force = resultant;
            self.flags.position_stuck = false;
        } else if self.flags.position_stuck {
            self.resultant_force = new_vector;
        }
    }
}
