use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::{braking_distance, MovableBody, Planner, ProgressState};
use crate::game::fixed_math::{sq, FixedNum, FixedVec2};
use crate::game::path::{PathHandle, PathRequest, Waypoint, WAYPOINT_RADIUS};
use crate::game::solid::MoverInfo;
use crate::game::terrain::{square_size, MoveClass};

// ============================================================================
// Supporting Types
// ============================================================================

/// What the integration phase should do with heading and speed this tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HeadingIntent {
    #[default]
    None,
    /// Turn toward the heading and accelerate toward the wanted speed.
    Move(i16),
    /// Brake to a halt without turning.
    Stop,
}

/// Sticky per-order flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveFlags {
    pub at_goal: bool,
    pub at_end_of_path: bool,
    pub want_repath: bool,
    pub want_reverse: bool,
    pub reversing: bool,
    pub idling: bool,
    pub use_raw_movement: bool,
    pub pathing_failed: bool,
    pub pathing_arrived: bool,
    pub position_stuck: bool,
    pub force_static_object_check: bool,
    pub avoiding_units: bool,
    pub last_waypoint: bool,
    /// The order is a plain move; goal tolerance widens while idling.
    pub move_order: bool,
}

/// Something the controller noticed during a parallel phase. Drained into
/// outbound messages in the resolve phase, in entity order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MoveEvent {
    Arrived,
    Failed,
    UnitCrushed { collidee: Entity, impulse: FixedVec2 },
    UnitCollided { collidee: Entity },
    FeatureCrushed { feature: Entity, impulse: FixedVec2 },
    FeatureCollided { feature: Entity },
    FeatureMoved { feature: Entity, displacement: FixedVec2 },
}

// ============================================================================
// Controller
// ============================================================================

/// Per-unit ground movement state.
#[derive(Component, Clone, Debug)]
pub struct MovementController {
    pub progress: ProgressState,
    pub flags: MoveFlags,
    pub heading_intent: HeadingIntent,

    pub goal: FixedVec2,
    pub goal_radius: FixedNum,
    /// Added to the goal radius when the goal square cannot hold the unit.
    pub extra_radius: FixedNum,
    pub owner_radius: FixedNum,

    pub curr_waypoint: Waypoint,
    pub next_waypoint: Waypoint,
    pub path_id: Option<PathHandle>,
    pub next_path_id: Option<PathHandle>,
    /// Replaced path, deleted in the next serial phase.
    pub delete_path_id: Option<PathHandle>,

    pub max_speed: FixedNum,
    pub max_reverse_speed: FixedNum,
    pub max_wanted_speed: FixedNum,
    pub wanted_speed: FixedNum,
    pub current_speed: FixedNum,
    pub delta_speed: FixedNum,
    pub turn_rate: i32,
    pub acc_rate: FixedNum,
    pub dec_rate: FixedNum,
    pub wanted_heading: i16,

    pub waypoint_dir: FixedVec2,
    pub curr_waypoint_dist: FixedNum,
    pub prev_waypoint_dist: FixedNum,
    pub last_avoidance_dir: FixedVec2,

    pub num_idling_updates: i32,
    pub num_idling_slow_updates: i32,
    pub limit_speed_for_turning: i32,

    pub want_repath_frame: u64,
    pub last_repath_frame: u64,
    pub best_last_waypoint_dist: FixedNum,
    pub best_reattempted_last_waypoint_dist: FixedNum,

    pub old_pos: FixedVec2,
    pub old_heading: i16,
    /// Displacement to apply in the next serial phase.
    pub resultant_force: FixedVec2,
    pub force_from_moving: FixedVec2,
    pub force_from_static: FixedVec2,
    pub old_speed: FixedNum,
    pub new_speed: FixedNum,

    pub outbox: SmallVec<[MoveEvent; 4]>,
}

impl MovementController {
    pub fn new(mc: &MoveClass, owner_radius: FixedNum) -> Self {
        Self {
            progress: ProgressState::Idle,
            flags: MoveFlags { move_order: true, ..Default::default() },
            heading_intent: HeadingIntent::None,
            goal: FixedVec2::ZERO,
            goal_radius: FixedNum::ZERO,
            extra_radius: FixedNum::ZERO,
            owner_radius,
            curr_waypoint: Waypoint::default(),
            next_waypoint: Waypoint::default(),
            path_id: None,
            next_path_id: None,
            delete_path_id: None,
            max_speed: mc.max_speed,
            max_reverse_speed: mc.max_reverse_speed,
            max_wanted_speed: mc.max_speed,
            wanted_speed: FixedNum::ZERO,
            current_speed: FixedNum::ZERO,
            delta_speed: FixedNum::ZERO,
            turn_rate: mc.turn_rate.max(1),
            acc_rate: mc.acc_rate,
            dec_rate: mc.dec_rate,
            wanted_heading: 0,
            waypoint_dir: FixedVec2::ZERO,
            curr_waypoint_dist: FixedNum::ZERO,
            prev_waypoint_dist: FixedNum::ZERO,
            last_avoidance_dir: FixedVec2::ZERO,
            num_idling_updates: 0,
            num_idling_slow_updates: 0,
            limit_speed_for_turning: 0,
            want_repath_frame: 0,
            last_repath_frame: 0,
            best_last_waypoint_dist: FixedNum::MAX,
            best_reattempted_last_waypoint_dist: FixedNum::MAX,
            old_pos: FixedVec2::ZERO,
            old_heading: 0,
            resultant_force: FixedVec2::ZERO,
            force_from_moving: FixedVec2::ZERO,
            force_from_static: FixedVec2::ZERO,
            old_speed: FixedNum::ZERO,
            new_speed: FixedNum::ZERO,
            outbox: SmallVec::new(),
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn curr_waypoint(&self) -> Waypoint {
        self.curr_waypoint
    }

    pub fn next_waypoint(&self) -> Waypoint {
        self.next_waypoint
    }

    pub fn is_active(&self) -> bool {
        self.progress == ProgressState::Active
    }

    pub fn is_at_goal_pos(&self, pos: FixedVec2, radius: FixedNum) -> bool {
        (pos - self.goal).length_squared() < sq(radius)
    }

    /// No route to follow and nothing raw to chase.
    pub fn want_to_stop(&self) -> bool {
        self.path_id.is_none() && (!self.flags.use_raw_movement || self.flags.at_end_of_path)
    }

    /// Lookahead used when pulling waypoints from the path service.
    pub fn waypoint_lookahead(&self) -> FixedNum {
        FixedNum::from_num(WAYPOINT_RADIUS).max(self.current_speed * FixedNum::from_num(1.05))
    }

    /// Radius of the circle the unit drives at its current speed and turn
    /// rate, never less than one tick of travel.
    pub fn turn_radius(&self) -> FixedNum {
        let frames_per_circle = FixedNum::from_num(65536) / FixedNum::from_num(self.turn_rate);
        let circle = self.current_speed * frames_per_circle / FixedNum::from_num(std::f64::consts::TAU);
        circle.max(self.current_speed * FixedNum::from_num(1.05))
    }

    /// Goal tolerance, widened by idling slow updates for plain move orders.
    pub fn min_goal_dist_sq(&self) -> FixedNum {
        let base = self.goal_radius + self.extra_radius;
        if self.flags.move_order {
            sq(base * FixedNum::from_num(self.num_idling_slow_updates + 1))
        } else {
            sq(base)
        }
    }

    /// Where the unit comes to rest if it starts braking now.
    pub fn here(&self, body: &MovableBody) -> FixedVec2 {
        let dist = braking_distance(self.current_speed, self.dec_rate);
        if self.flags.reversing {
            body.pos - body.front * dist
        } else {
            body.pos + body.front * dist
        }
    }

    pub fn mover_info(&self) -> MoverInfo {
        MoverInfo {
            progress: self.progress,
            goal_pos: self.goal,
            goal_radius: self.goal_radius,
            owner_radius: self.owner_radius,
            curr_waypoint: self.curr_waypoint.pos,
            next_waypoint: self.next_waypoint.pos,
        }
    }

    // ========================================================================
    // Traffic Hooks
    // ========================================================================

    /// Asks the follower to move past its current waypoint.
    pub fn trigger_skip_waypoint(&mut self) {
        self.curr_waypoint = Waypoint::skip_requested(self.curr_waypoint.pos);
    }

    /// Treats the order as complete; the commit phase calls `arrived`.
    pub fn trigger_call_arrived(&mut self) {
        self.flags.at_end_of_path = true;
        self.flags.at_goal = true;
        self.flags.pathing_arrived = true;
    }

    // ========================================================================
    // Order Transitions (serial)
    // ========================================================================

    /// Begins a path-following order toward `goal`.
    pub fn start_moving(
        &mut self,
        owner: Entity,
        body: &MovableBody,
        mc: &MoveClass,
        planner: &Planner,
        goal: FixedVec2,
        goal_radius: FixedNum,
    ) {
        let terrain = planner.terrain;
        let max = FixedVec2::new(
            terrain.world_width() - square_size(),
            terrain.world_height() - square_size(),
        );
        self.goal = goal.clamp(FixedVec2::ZERO, max);
        self.goal_radius = goal_radius;
        self.extra_radius = if terrain.test_move_square(mc, self.goal) {
            FixedNum::ZERO
        } else {
            (self.owner_radius - goal_radius).max(FixedNum::ZERO)
        };

        self.flags.at_goal =
            self.goal.distance_squared(body.pos) < sq(self.goal_radius + self.extra_radius);
        self.flags.use_raw_movement = false;
        self.reset_order_counters();

        debug!(
            "[MOVE] {:?} start | goal: ({:.1}, {:.1}) r: {:.1} at_goal: {}",
            owner,
            self.goal.x.to_num::<f32>(),
            self.goal.y.to_num::<f32>(),
            self.goal_radius.to_num::<f32>(),
            self.flags.at_goal
        );

        if self.flags.at_goal {
            self.arrived(owner, planner);
            return;
        }

        self.re_request_path(owner, body, mc, planner, true);
        self.best_reattempted_last_waypoint_dist = FixedNum::MAX;
    }

    /// Moves straight at `goal` without asking for a route.
    pub fn start_moving_raw(&mut self, body: &MovableBody, mc: &MoveClass, planner: &Planner, goal: FixedVec2, goal_radius: FixedNum) {
        self.goal = goal;
        self.goal_radius = goal_radius;
        self.extra_radius = if planner.terrain.test_move_square(mc, goal) {
            FixedNum::ZERO
        } else {
            (self.owner_radius - goal_radius).max(FixedNum::ZERO)
        };
        self.curr_waypoint = Waypoint::resolved(goal);
        self.next_waypoint = Waypoint::resolved(goal);
        self.set_waypoint_dir(body.pos);
        self.flags.at_goal = goal.distance_squared(body.pos) < sq(self.goal_radius + self.extra_radius);
        self.flags.use_raw_movement = true;
        self.reset_order_counters();
    }

    fn reset_order_counters(&mut self) {
        self.flags.at_end_of_path = false;
        self.flags.last_waypoint = false;
        self.flags.pathing_arrived = false;
        self.flags.pathing_failed = false;
        self.progress = ProgressState::Active;
        self.num_idling_updates = 0;
        self.num_idling_slow_updates = 0;
        self.curr_waypoint_dist = FixedNum::ZERO;
        self.prev_waypoint_dist = FixedNum::ZERO;
    }

    /// Ends the order where the unit can brake to. Always lands in `Done`.
    pub fn stop_moving(&mut self, owner: Entity, body: &mut MovableBody, planner: &Planner, hard_stop: bool) {
        if !self.flags.at_goal {
            let here = self.here(body);
            self.goal = here;
            self.curr_waypoint = Waypoint::resolved(here);
        }
        if hard_stop {
            body.velocity = FixedVec2::ZERO;
            self.current_speed = FixedNum::ZERO;
        }
        self.stop_engine(planner);
        self.flags.at_goal = true;
        self.flags.at_end_of_path |= self.flags.use_raw_movement;
        self.progress = ProgressState::Done;
        debug!("[MOVE] {:?} stop | hard: {}", owner, hard_stop);
    }

    /// Completes an active order.
    pub fn arrived(&mut self, owner: Entity, planner: &Planner) {
        if self.progress != ProgressState::Active {
            return;
        }
        self.outbox.push(MoveEvent::Arrived);
        self.stop_engine(planner);
        self.progress = ProgressState::Done;
        debug!("[MOVE] {:?} arrived", owner);
    }

    /// Gives up on the order.
    pub fn fail(&mut self, owner: Entity, planner: &Planner) {
        self.stop_engine(planner);
        self.progress = ProgressState::Failed;
        self.outbox.push(MoveEvent::Failed);
        debug!("[MOVE] {:?} failed | frame: {}", owner, planner.frame);
    }

    /// Asks for a new route. A forced request plans immediately; otherwise
    /// the request is deferred to the slow update.
    pub fn re_request_path(&mut self, owner: Entity, body: &MovableBody, mc: &MoveClass, planner: &Planner, force: bool) {
        if !force {
            self.mark_repath(planner.frame);
            return;
        }
        debug!("[PATH] {:?} re-request | frame: {}", owner, planner.frame);
        self.start_engine(owner, body, mc, planner);
        self.flags.want_repath = false;
        self.last_repath_frame = planner.frame;
    }

    /// Deferred half of [`Self::re_request_path`]; safe in parallel phases.
    pub fn mark_repath(&mut self, frame: u64) {
        if !self.flags.want_repath {
            self.flags.want_repath = true;
            self.want_repath_frame = frame;
            self.best_last_waypoint_dist = FixedNum::MAX;
        }
    }

    fn start_engine(&mut self, owner: Entity, body: &MovableBody, mc: &MoveClass, planner: &Planner) {
        if self.path_id.is_none() {
            self.path_id = self.get_new_path(owner, body, mc, planner);
            return;
        }
        if let Some(stale) = self.next_path_id.take() {
            planner.paths.delete_path(stale);
        }
        self.next_path_id = self.get_new_path(owner, body, mc, planner);
        if self.next_path_id == self.path_id {
            self.next_path_id = None;
        }
    }

    fn stop_engine(&mut self, planner: &Planner) {
        self.delete_all_paths(planner);
        self.wanted_speed = FixedNum::ZERO;
        self.limit_speed_for_turning = 0;
        self.best_reattempted_last_waypoint_dist = FixedNum::MAX;
    }

    fn get_new_path(&mut self, owner: Entity, body: &MovableBody, mc: &MoveClass, planner: &Planner) -> Option<PathHandle> {
        if self.flags.use_raw_movement {
            return None;
        }
        let radius = self.goal_radius + self.extra_radius;
        if body.pos.distance_squared(self.goal) <= sq(radius) {
            return None;
        }

        let request = PathRequest {
            owner,
            move_class: mc,
            start: body.pos,
            goal: self.goal,
            goal_radius: radius,
        };
        let Some(handle) = planner.paths.request_path(planner.terrain, &request) else {
            debug!("[PATH] {:?} request rejected", owner);
            self.fail(owner, planner);
            return None;
        };

        self.flags.at_goal = false;
        self.flags.at_end_of_path = false;
        self.flags.last_waypoint = false;
        let lookahead = self.waypoint_lookahead();
        self.curr_waypoint = planner.paths.next_waypoint(handle, body.pos, lookahead);
        self.next_waypoint = planner.paths.next_waypoint(handle, self.curr_waypoint.pos, lookahead);
        self.set_waypoint_dir(body.pos);
        Some(handle)
    }

    fn delete_all_paths(&mut self, planner: &Planner) {
        for path in [self.path_id.take(), self.next_path_id.take()].into_iter().flatten() {
            planner.paths.delete_path(path);
        }
    }

    /// Releases every handle the controller holds. Used when the owner despawns.
    pub fn release_paths(&mut self, planner: &Planner) {
        self.delete_all_paths(planner);
        if let Some(path) = self.delete_path_id.take() {
            planner.paths.delete_path(path);
        }
    }

    // ========================================================================
    // Commit / Resolve Steps (serial)
    // ========================================================================

    /// Commit step: applies the integrated displacement, finishes deferred
    /// path work and settles speed for the collision phase.
    pub fn update_pre_collisions(
        &mut self,
        owner: Entity,
        body: &mut MovableBody,
        planner: &Planner,
    ) {
        if !self.resultant_force.is_zero() {
            body.pos += self.resultant_force;
        }

        if let Some(path) = self.delete_path_id.take() {
            planner.paths.delete_path(path);
        }
        if self.flags.pathing_arrived {
            self.arrived(owner, planner);
            self.flags.pathing_arrived = false;
        }
        if self.flags.pathing_failed {
            self.fail(owner, planner);
            self.flags.pathing_failed = false;
        }

        self.update_owner_speed(body);
        self.old_speed = FixedNum::ZERO;
        self.new_speed = FixedNum::ZERO;
    }

    /// Records the signed speed along the facing.
    pub fn update_owner_speed(&mut self, body: &mut MovableBody) {
        body.state.moving = self.new_speed.abs() > FixedNum::from_num(0.01);
        self.flags.reversing = self.new_speed < FixedNum::ZERO;
        self.current_speed = self.new_speed.abs();
        self.delta_speed = FixedNum::ZERO;
    }

    /// Resolve step: applies the collision displacement and updates idling.
    /// Returns whether the owner actually moved this tick.
    pub fn update(&mut self, body: &mut MovableBody) -> bool {
        if !self.resultant_force.is_zero() {
            body.pos += self.resultant_force;
        }
        self.owner_moved(body)
    }
}
