use super::{HeadingIntent, MoveContext, MovableBody, MovementController, ProgressState};
use crate::game::fixed_math::{clamp, sq, vec_to_heading, FixedNum, FixedVec2, MAX_HEADING};
use crate::game::path::{Waypoint, WaypointKind};
use crate::game::terrain::{square_size, MoveClass, TerrainMap, SQUARE_SIZE};

/// Whether any footprint square around `pos` is claimed by a structure.
fn structure_under(terrain: &TerrainMap, mc: &MoveClass, pos: FixedVec2) -> bool {
    let (x0, z0, x1, z1) = terrain.footprint_squares(pos, mc.xsize, mc.zsize);
    (z0..=z1).any(|z| (x0..=x1).any(|x| terrain.in_bounds(x, z) && terrain.is_structure_blocked(x, z)))
}

impl MovementController {
    /// Steering step: switches to a freshly planned route once it resolves,
    /// then updates the avoidance direction and follows the path.
    pub fn update_traversal_plan(&mut self, body: &MovableBody, mc: &MoveClass, ctx: &MoveContext) {
        self.old_heading = body.heading;

        if let Some(next) = self.next_path_id {
            let lookahead = self.waypoint_lookahead();
            let first = ctx.paths.next_waypoint(next, body.pos, lookahead);
            if !first.is_unresolved() {
                if !self.flags.use_raw_movement {
                    self.curr_waypoint = first;
                    self.next_waypoint = ctx.paths.next_waypoint(next, first.pos, lookahead);
                    self.flags.last_waypoint = false;
                    self.flags.want_repath = false;
                    self.flags.at_end_of_path = false;
                }
                self.delete_path_id = self.path_id;
                self.path_id = Some(next);
                self.next_path_id = None;
            }
        }

        if body.state.skidding || body.state.flying {
            return;
        }

        self.update_obstacle_avoidance(body, mc, ctx);
        self.follow_path(body, mc, ctx);
    }

    /// Decides arrival and waypoint advancement, then records the heading
    /// intent for the integration phase.
    pub fn follow_path(&mut self, body: &MovableBody, mc: &MoveClass, ctx: &MoveContext) {
        if self.want_to_stop() {
            // a routed order with no route left only ends by arriving
            if !self.flags.use_raw_movement
                && self.progress == ProgressState::Active
                && body.pos.distance_squared(self.goal) <= self.min_goal_dist_sq()
            {
                self.flags.at_goal = true;
                self.flags.pathing_arrived = true;
            }
            self.curr_waypoint.kind = WaypointKind::Temporary;
            self.next_waypoint.kind = WaypointKind::Temporary;
            self.heading_intent = HeadingIntent::Stop;
            return;
        }

        let pos = body.pos;
        let front = body.front;

        self.prev_waypoint_dist = self.curr_waypoint_dist;
        self.curr_waypoint_dist = self.curr_waypoint.pos.distance(pos);

        let cur_goal_dist_sq = pos.distance_squared(self.goal);
        let min_goal_dist_sq = self.min_goal_dist_sq();
        let spd_goal_dist_sq = sq(self.current_speed * FixedNum::from_num(1.05));

        let to_goal = front.dot(self.goal - pos);
        let to_goal_next = front.dot(self.goal - (pos + body.velocity));
        let overshoot = if self.flags.reversing {
            to_goal < FixedNum::ZERO && to_goal_next >= FixedNum::ZERO
        } else {
            to_goal > FixedNum::ZERO && to_goal_next <= FixedNum::ZERO
        };

        self.flags.at_goal |= cur_goal_dist_sq <= min_goal_dist_sq;
        self.flags.at_goal |= cur_goal_dist_sq <= spd_goal_dist_sq && overshoot;
        self.flags.at_end_of_path |= self.flags.at_goal;

        if !self.flags.at_goal {
            if self.flags.idling {
                if self.num_idling_updates < MAX_HEADING as i32 {
                    self.num_idling_updates += 1;
                }
            } else if self.num_idling_updates > 0 {
                self.num_idling_updates -= 1;
            }
        }

        if self.flags.at_end_of_path && !self.flags.at_goal {
            self.flags.at_end_of_path = !self.path_id.is_some_and(|p| ctx.paths.path_updated(p));
        }

        if !self.flags.at_end_of_path && !self.flags.use_raw_movement {
            self.set_next_waypoint(body, mc, ctx);
        } else if self.flags.at_goal {
            self.flags.pathing_arrived = true;
        }

        self.set_waypoint_dir(pos);
        self.flags.want_reverse = self.want_reverse(body, mc);

        self.heading_intent = HeadingIntent::Move(vec_to_heading(self.last_avoidance_dir));
    }

    /// Points `waypoint_dir` at the current waypoint. Left alone when the
    /// unit stands on it.
    pub fn set_waypoint_dir(&mut self, pos: FixedVec2) {
        let offset = self.curr_waypoint.pos - pos;
        if offset.is_zero() {
            return;
        }
        self.waypoint_dir = offset.normalize();
    }

    /// Whether the unit may drop its current waypoint for the next one.
    pub fn can_set_next_waypoint(&mut self, body: &MovableBody, mc: &MoveClass, ctx: &MoveContext) -> bool {
        let Some(path) = self.path_id else {
            return false;
        };
        if self.flags.at_end_of_path {
            return false;
        }

        let pos = body.pos;

        if ctx.paths.path_updated(path) {
            let lookahead = self.waypoint_lookahead();
            self.curr_waypoint = ctx.paths.next_waypoint(path, pos, lookahead);
            self.next_waypoint = ctx.paths.next_waypoint(path, self.curr_waypoint.pos, lookahead);
            self.curr_waypoint_dist = self.curr_waypoint.pos.distance(pos);
            self.set_waypoint_dir(pos);
            self.flags.want_repath = false;
            ctx.paths.clear_path_updated(path);
        }

        if self.curr_waypoint.is_unresolved() || self.next_waypoint.is_unresolved() {
            return true;
        }

        let cwp_dist_sq = self.curr_waypoint.pos.distance_squared(pos);
        let allow_skip = cwp_dist_sq < sq(FixedNum::from_num(SQUARE_SIZE - 1));

        if !allow_skip && !self.curr_waypoint.is_skip_request() && !self.next_waypoint.is_skip_request() {
            let dir_sign = if self.flags.reversing { -FixedNum::ONE } else { FixedNum::ONE };
            let turn_radius = self.turn_radius() * FixedNum::from_num(2);
            let waypoint_dot = clamp(self.waypoint_dir.dot(body.front * dir_sign), -FixedNum::ONE, FixedNum::ONE);

            if self.curr_waypoint_dist > turn_radius {
                return false;
            }
            let one_tick = square_size().max(self.current_speed * FixedNum::from_num(1.05));
            if self.curr_waypoint_dist > one_tick && waypoint_dot >= FixedNum::from_num(0.995) {
                return false;
            }
        }

        if !ctx.terrain.raw_line_clear(mc, pos, self.next_waypoint.pos) {
            return false;
        }

        let cur_goal_dist_sq = self.curr_waypoint.pos.distance_squared(self.goal);
        let min_goal_dist_sq = self.min_goal_dist_sq();
        self.flags.at_end_of_path |= cur_goal_dist_sq <= min_goal_dist_sq;

        if !self.flags.at_end_of_path {
            self.flags.last_waypoint |= self.curr_waypoint.pos == self.next_waypoint.pos
                && ctx.paths.current_waypoint_unreachable(path)
                && cwp_dist_sq <= min_goal_dist_sq;
            if self.flags.last_waypoint {
                self.flags.pathing_failed = true;
                return false;
            }
        }

        if self.flags.at_end_of_path {
            self.curr_waypoint = Waypoint::resolved(self.goal);
            self.next_waypoint = Waypoint::resolved(self.goal);
            return false;
        }

        true
    }

    /// Advances to the next waypoint when allowed and flags blocked or
    /// unreachable waypoints.
    pub fn set_next_waypoint(&mut self, body: &MovableBody, mc: &MoveClass, ctx: &MoveContext) {
        if self.can_set_next_waypoint(body, mc, ctx) {
            if let Some(path) = self.path_id {
                let lookahead = self.waypoint_lookahead();
                loop {
                    self.curr_waypoint = self.next_waypoint;
                    self.next_waypoint = ctx.paths.next_waypoint(path, self.curr_waypoint.pos, lookahead);
                    if !(self.curr_waypoint.is_unresolved() && !self.next_waypoint.is_unresolved()) {
                        break;
                    }
                }
            }
            if self.limit_speed_for_turning > 0 {
                self.limit_speed_for_turning -= 1;
            }
            self.flags.want_repath = false;
        }

        if self.next_waypoint.is_unreachable() {
            self.flags.pathing_failed = true;
            return;
        }

        if structure_under(ctx.terrain, mc, self.curr_waypoint.pos)
            || structure_under(ctx.terrain, mc, self.next_waypoint.pos)
        {
            self.mark_repath(ctx.frame);
        }
    }
}
