use bevy::prelude::*;

use super::*;
use crate::game::path::{GridPathProvider, PathHandle, PathRequest, Waypoint, WaypointKind};
use crate::game::solid::{ObjectKind, SolidObject};
use crate::game::terrain::MoveClass;

fn n(v: f32) -> FixedNum {
    FixedNum::from_num(v)
}

fn v(x: f32, z: f32) -> FixedVec2 {
    FixedVec2::from_f32(x, z)
}

const EAST: i16 = 16384;

struct Fixture {
    terrain: TerrainMap,
    quad_field: QuadField,
    solids: SolidTable,
    paths: GridPathProvider,
    policy: DefaultSpeedPolicy,
    config: SimConfig,
    move_classes: MoveClassRegistry,
}

impl Fixture {
    fn new() -> Self {
        Self {
            terrain: TerrainMap::new(64, 64),
            quad_field: QuadField::new(512, 512, 128, 4).unwrap(),
            solids: SolidTable::default(),
            paths: GridPathProvider::default(),
            policy: DefaultSpeedPolicy,
            config: SimConfig::default(),
            move_classes: MoveClassRegistry::default(),
        }
    }

    fn ctx(&self, owner: Entity, frame: u64) -> MoveContext<'_> {
        MoveContext {
            owner,
            terrain: &self.terrain,
            quad_field: &self.quad_field,
            solids: &self.solids,
            paths: &self.paths,
            policy: &self.policy,
            config: &self.config,
            move_classes: &self.move_classes,
            frame,
        }
    }

    fn request(&self, owner: Entity, mc: &MoveClass, start: FixedVec2, goal: FixedVec2) -> PathHandle {
        let request = PathRequest { owner, move_class: mc, start, goal, goal_radius: n(8.0) };
        self.paths.request_path(&self.terrain, &request).unwrap()
    }
}

fn unit(pos: FixedVec2, heading: i16, mc: &MoveClass) -> (MovableBody, MovementController) {
    let body = MovableBody::new(pos, heading, mc.min_exterior_radius(), mc.mass, 0);
    let mut ctrl = MovementController::new(mc, body.radius);
    ctrl.old_pos = pos;
    ctrl.old_heading = heading;
    (body, ctrl)
}

/// Runs the per-unit phases of one tick in schedule order.
fn tick(ctrl: &mut MovementController, body: &mut MovableBody, mc: &MoveClass, fx: &Fixture, owner: Entity, frame: u64) {
    let ctx = fx.ctx(owner, frame);
    ctrl.update_traversal_plan(body, mc, &ctx);
    ctrl.integrate(body, mc, &ctx);
    ctrl.update_pre_collisions(owner, body, &ctx.planner());
    ctrl.handle_object_collisions(body, mc, &ctx);
    ctrl.update(body);
}

// ============================================================================
// Speed policy and kinematics
// ============================================================================

#[test]
fn test_braking_distance() {
    assert!((braking_distance(n(2.0), n(0.2)) - n(10.0)).abs() < n(0.01));
    assert_eq!(braking_distance(n(2.0), FixedNum::ZERO), FixedNum::ZERO);
}

#[test]
fn test_default_policy_respects_rates() {
    let policy = DefaultSpeedPolicy;
    let (acc, dec) = (n(0.1), n(0.2));

    assert_eq!(policy.delta_speed(None, n(2.0), FixedNum::ZERO, acc, dec, false, false), acc);
    assert_eq!(policy.delta_speed(None, FixedNum::ZERO, n(2.0), acc, dec, false, false), -dec);
    assert_eq!(policy.delta_speed(None, n(1.05), n(1.0), acc, dec, false, false), n(1.05) - n(1.0));
    // reversing toward a forward target first has to cancel the reverse speed
    assert_eq!(policy.delta_speed(None, n(1.0), n(1.0), acc, dec, false, true), acc);
}

#[test]
fn test_default_policy_turns_the_short_way() {
    let policy = DefaultSpeedPolicy;
    assert_eq!(policy.delta_heading(None, 1000, 0, 600), 600);
    assert_eq!(policy.delta_heading(None, -1000, 0, 600), -600);
    assert_eq!(policy.delta_heading(None, 100, 0, 600), 100);
    // across the +-32768 seam the short way is positive
    assert_eq!(policy.delta_heading(None, -30000, 30000, 600), 600);
}

#[test]
fn test_here_is_braking_point() {
    let mc = MoveClass::default();
    let (body, mut ctrl) = unit(v(100.0, 100.0), EAST, &mc);
    ctrl.current_speed = n(2.0);

    let here = ctrl.here(&body);
    assert!((here - v(110.0, 100.0)).length() < n(0.01), "{:?}", here);

    ctrl.flags.reversing = true;
    let here = ctrl.here(&body);
    assert!((here - v(90.0, 100.0)).length() < n(0.01), "{:?}", here);
}

#[test]
fn test_want_reverse_for_short_hop_behind() {
    let mc = MoveClass { max_reverse_speed: n(1.0), ..Default::default() };
    let (body, mut ctrl) = unit(v(100.0, 100.0), EAST, &mc);

    ctrl.goal = v(90.0, 100.0);
    ctrl.waypoint_dir = v(-1.0, 0.0);
    assert!(ctrl.want_reverse(&body, &mc));

    ctrl.goal = v(110.0, 100.0);
    ctrl.waypoint_dir = v(1.0, 0.0);
    assert!(!ctrl.want_reverse(&body, &mc));

    let forward_only = MoveClass::default();
    let (body, mut ctrl) = unit(v(100.0, 100.0), EAST, &forward_only);
    ctrl.goal = v(90.0, 100.0);
    ctrl.waypoint_dir = v(-1.0, 0.0);
    assert!(!ctrl.want_reverse(&body, &forward_only));
}

// ============================================================================
// Orders
// ============================================================================

#[test]
fn test_start_moving_requests_route() {
    let fx = Fixture::new();
    let mc = MoveClass::default();
    let owner = Entity::from_bits(1);
    let (body, mut ctrl) = unit(v(100.0, 100.0), EAST, &mc);

    ctrl.start_moving(owner, &body, &mc, &fx.ctx(owner, 1).planner(), v(300.0, 100.0), n(8.0));

    assert_eq!(ctrl.progress, ProgressState::Active);
    assert!(ctrl.path_id.is_some());
    assert_eq!(ctrl.curr_waypoint.kind, WaypointKind::Resolved);
    assert!(!ctrl.flags.at_goal);
    assert_eq!(fx.paths.live_paths(), 1);
}

#[test]
fn test_start_moving_inside_goal_needs_no_route() {
    let fx = Fixture::new();
    let mc = MoveClass::default();
    let owner = Entity::from_bits(1);
    let (body, mut ctrl) = unit(v(100.0, 100.0), EAST, &mc);

    ctrl.start_moving(owner, &body, &mc, &fx.ctx(owner, 1).planner(), v(104.0, 100.0), n(8.0));

    assert!(ctrl.flags.at_goal);
    assert!(ctrl.path_id.is_none());
    assert_eq!(fx.paths.live_paths(), 0);
}

#[test]
fn test_routed_order_inside_goal_arrives_at_once() {
    let fx = Fixture::new();
    let mc = MoveClass::default();
    let owner = Entity::from_bits(1);
    let (mut body, mut ctrl) = unit(v(100.0, 100.0), EAST, &mc);

    ctrl.start_moving(owner, &body, &mc, &fx.ctx(owner, 1).planner(), v(104.0, 100.0), n(8.0));

    assert_eq!(ctrl.progress, ProgressState::Done);
    assert_eq!(ctrl.outbox.as_slice(), &[MoveEvent::Arrived]);

    // later ticks and slow updates neither re-plan nor notify twice
    for frame in 2..=60 {
        tick(&mut ctrl, &mut body, &mc, &fx, owner, frame);
        if frame % 15 == 0 {
            ctrl.slow_update(owner, &mut body, &mc, &fx.ctx(owner, frame).planner());
        }
    }
    assert_eq!(ctrl.progress, ProgressState::Done);
    assert_eq!(ctrl.outbox.as_slice(), &[MoveEvent::Arrived]);
    assert_eq!(fx.paths.live_paths(), 0);
}

#[test]
fn test_active_routed_order_without_route_arrives_inside_goal() {
    let fx = Fixture::new();
    let mc = MoveClass::default();
    let owner = Entity::from_bits(1);
    let (mut body, mut ctrl) = unit(v(100.0, 100.0), EAST, &mc);
    // resumed state: routed order underway, no route since the unit is already there
    ctrl.progress = ProgressState::Active;
    ctrl.goal = v(104.0, 100.0);
    ctrl.goal_radius = n(8.0);

    tick(&mut ctrl, &mut body, &mc, &fx, owner, 1);

    assert_eq!(ctrl.progress, ProgressState::Done);
    assert!(ctrl.flags.at_goal);
    assert_eq!(ctrl.outbox.as_slice(), &[MoveEvent::Arrived]);
}

#[test]
fn test_stop_moving_always_completes() {
    let fx = Fixture::new();
    let mc = MoveClass::default();
    let owner = Entity::from_bits(1);
    let (mut body, mut ctrl) = unit(v(100.0, 100.0), EAST, &mc);
    let planner = fx.ctx(owner, 1).planner();

    ctrl.start_moving(owner, &body, &mc, &planner, v(300.0, 100.0), n(8.0));
    ctrl.current_speed = n(2.0);
    ctrl.stop_moving(owner, &mut body, &planner, false);

    assert_eq!(ctrl.progress, ProgressState::Done);
    assert!(ctrl.path_id.is_none());
    assert_eq!(fx.paths.live_paths(), 0);
    assert!((ctrl.goal - v(110.0, 100.0)).length() < n(0.01));

    ctrl.stop_moving(owner, &mut body, &planner, true);
    assert_eq!(ctrl.current_speed, FixedNum::ZERO);
    assert_eq!(body.velocity, FixedVec2::ZERO);
}

#[test]
fn test_arrival_inside_goal_radius() {
    let fx = Fixture::new();
    let mc = MoveClass::default();
    let owner = Entity::from_bits(1);
    let (mut body, mut ctrl) = unit(v(100.0, 100.0), EAST, &mc);
    let ctx = fx.ctx(owner, 1);

    ctrl.start_moving_raw(&body, &mc, &ctx.planner(), v(200.0, 100.0), n(8.0));
    assert!(!ctrl.flags.at_goal);

    // squared distance 16 is inside a radius of 8
    body.pos = v(196.0, 100.0);
    ctrl.follow_path(&body, &mc, &ctx);
    assert!(ctrl.flags.at_goal);

    ctrl.update_pre_collisions(owner, &mut body, &ctx.planner());
    assert_eq!(ctrl.progress, ProgressState::Done);
    assert_eq!(ctrl.outbox.as_slice(), &[MoveEvent::Arrived]);
}

#[test]
fn test_raw_move_arrives_without_overshoot() {
    let fx = Fixture::new();
    let mc = MoveClass::default();
    let owner = Entity::from_bits(1);
    let (mut body, mut ctrl) = unit(v(100.0, 100.0), EAST, &mc);
    let goal = v(160.0, 100.0);

    ctrl.start_moving_raw(&body, &mc, &fx.ctx(owner, 0).planner(), goal, n(8.0));
    for frame in 1..=300 {
        tick(&mut ctrl, &mut body, &mc, &fx, owner, frame);
    }

    assert_eq!(ctrl.progress, ProgressState::Done);
    assert!(ctrl.outbox.contains(&MoveEvent::Arrived));
    assert_eq!(ctrl.current_speed, FixedNum::ZERO);
    assert!(body.pos.distance(goal) <= n(16.0), "ended at {:?}", body.pos);
    assert!(body.pos.x <= goal.x + n(16.0));
}

#[test]
fn test_routed_move_reaches_goal() {
    let fx = Fixture::new();
    let mc = MoveClass::default();
    let owner = Entity::from_bits(1);
    let (mut body, mut ctrl) = unit(v(132.0, 100.0), EAST, &mc);
    let goal = v(220.0, 100.0);

    ctrl.start_moving(owner, &body, &mc, &fx.ctx(owner, 0).planner(), goal, n(16.0));
    assert!(ctrl.path_id.is_some());

    for frame in 1..=1200 {
        tick(&mut ctrl, &mut body, &mc, &fx, owner, frame);
        if ctrl.progress != ProgressState::Active {
            break;
        }
    }

    assert_eq!(ctrl.progress, ProgressState::Done, "stopped at {:?}", body.pos);
    assert!(body.pos.distance(goal) <= n(40.0), "ended at {:?}", body.pos);
}

// ============================================================================
// Waypoints
// ============================================================================

fn follower_on_route(fx: &Fixture, mc: &MoveClass, owner: Entity) -> (MovableBody, MovementController) {
    let (body, mut ctrl) = unit(v(100.0, 100.0), EAST, mc);
    ctrl.progress = ProgressState::Active;
    ctrl.path_id = Some(fx.request(owner, mc, body.pos, v(300.0, 100.0)));
    ctrl.goal = v(300.0, 100.0);
    ctrl.goal_radius = n(8.0);
    ctrl.curr_waypoint = Waypoint::resolved(v(130.0, 100.0));
    ctrl.next_waypoint = Waypoint::resolved(v(160.0, 100.0));
    ctrl.curr_waypoint_dist = n(30.0);
    ctrl.waypoint_dir = v(1.0, 0.0);
    ctrl.current_speed = n(2.0);
    (body, ctrl)
}

#[test]
fn test_distant_aligned_waypoint_is_kept() {
    let fx = Fixture::new();
    let mc = MoveClass::default();
    let owner = Entity::from_bits(1);
    let (body, mut ctrl) = follower_on_route(&fx, &mc, owner);

    assert!(!ctrl.can_set_next_waypoint(&body, &mc, &fx.ctx(owner, 1)));
}

#[test]
fn test_waypoint_beyond_twice_turn_radius_is_kept() {
    let fx = Fixture::new();
    let mc = MoveClass::default();
    let owner = Entity::from_bits(1);
    // heading 0 faces +z
    let (body, mut ctrl) = unit(v(100.0, 60.0), 0, &mc);
    ctrl.progress = ProgressState::Active;
    ctrl.path_id = Some(fx.request(owner, &mc, body.pos, v(100.0, 460.0)));
    ctrl.goal = v(100.0, 460.0);
    ctrl.goal_radius = n(8.0);
    ctrl.curr_waypoint = Waypoint::resolved(v(100.0, 260.0));
    ctrl.next_waypoint = Waypoint::resolved(v(100.0, 460.0));
    ctrl.curr_waypoint_dist = n(200.0);
    ctrl.waypoint_dir = v(0.0, 1.0);
    // 600 heading units per tick at this speed turns on a circle of radius 50
    ctrl.turn_rate = 600;
    ctrl.current_speed = n(50.0 * std::f32::consts::TAU * 600.0 / 65536.0);

    let radius = ctrl.turn_radius();
    assert!((radius - n(50.0)).abs() < n(0.05), "turn radius {}", radius);
    assert!(!ctrl.can_set_next_waypoint(&body, &mc, &fx.ctx(owner, 1)));
    assert_eq!(ctrl.curr_waypoint.pos, v(100.0, 260.0));
}

#[test]
fn test_skip_request_lets_follower_advance() {
    let fx = Fixture::new();
    let mc = MoveClass::default();
    let owner = Entity::from_bits(1);
    let (body, mut ctrl) = follower_on_route(&fx, &mc, owner);

    ctrl.trigger_skip_waypoint();
    assert!(ctrl.curr_waypoint.is_skip_request());
    assert!(ctrl.can_set_next_waypoint(&body, &mc, &fx.ctx(owner, 1)));
}

#[test]
fn test_waypoint_behind_wall_is_kept() {
    let mut fx = Fixture::new();
    fx.terrain.set_impassable_rect(18, 0, 18, 63);
    let mc = MoveClass::default();
    let owner = Entity::from_bits(1);
    let (body, mut ctrl) = follower_on_route(&fx, &mc, owner);

    ctrl.trigger_skip_waypoint();
    assert!(!ctrl.can_set_next_waypoint(&body, &mc, &fx.ctx(owner, 1)));
}

// ============================================================================
// Avoidance
// ============================================================================

fn avoider(fx: &mut Fixture, mc: &MoveClass, other_faction: u8) -> (Entity, MovableBody, MovementController) {
    let owner = Entity::from_bits(3);
    let (body, mut ctrl) = unit(v(200.0, 200.0), 0, mc);
    ctrl.flags.use_raw_movement = true;
    ctrl.goal = v(200.0, 400.0);
    ctrl.waypoint_dir = v(0.0, 1.0);

    let other = Entity::from_bits(4);
    let pos = v(203.0, 215.0);
    let mut occupied = crate::game::quad_field::OccupiedQuads::default();
    fx.quad_field.insert_unit(other, other_faction, pos, body.radius, &mut occupied);
    fx.solids.insert(
        other,
        SolidObject {
            kind: ObjectKind::Unit,
            pos,
            front: v(0.0, 1.0),
            radius: body.radius,
            faction: other_faction,
            half_extents: mc.half_extents(),
            mobile: true,
            ..Default::default()
        },
    );
    (owner, body, ctrl)
}

#[test]
fn test_avoids_enemy_ahead() {
    let mut fx = Fixture::new();
    let mc = MoveClass::default();
    let (owner, body, mut ctrl) = avoider(&mut fx, &mc, 1);

    let dir = ctrl.obstacle_avoidance_dir(&body, &mc, &fx.ctx(owner, 3), v(0.0, 1.0));

    assert!(ctrl.flags.avoiding_units);
    assert!(dir.x < FixedNum::ZERO, "should veer away from +x: {:?}", dir);
    assert!(dir.y > FixedNum::ZERO);
}

#[test]
fn test_massless_class_still_avoids() {
    let mut fx = Fixture::new();
    let mc = MoveClass { mass: FixedNum::ZERO, ..Default::default() }.sanitized();
    let (owner, body, mut ctrl) = avoider(&mut fx, &mc, 1);
    assert_eq!(body.mass, FixedNum::ONE);

    let dir = ctrl.obstacle_avoidance_dir(&body, &mc, &fx.ctx(owner, 3), v(0.0, 1.0));

    assert!(ctrl.flags.avoiding_units);
    assert!(dir.x < FixedNum::ZERO, "{:?}", dir);
}

#[test]
fn test_body_mass_has_floor() {
    let body = MovableBody::new(v(10.0, 10.0), 0, n(8.0), FixedNum::ZERO, 0);
    assert_eq!(body.mass, FixedNum::ONE);
}

#[test]
fn test_resting_ally_is_not_avoided() {
    let mut fx = Fixture::new();
    let mc = MoveClass::default();
    let (owner, body, mut ctrl) = avoider(&mut fx, &mc, 0);

    let dir = ctrl.obstacle_avoidance_dir(&body, &mc, &fx.ctx(owner, 3), v(0.0, 1.0));

    assert!(!ctrl.flags.avoiding_units);
    assert_eq!(dir.x, FixedNum::ZERO);
}

#[test]
fn test_avoidance_is_staggered() {
    let mut fx = Fixture::new();
    let mc = MoveClass::default();
    let (owner, body, mut ctrl) = avoider(&mut fx, &mc, 1);

    // off-cycle frames keep the desired direction while not avoiding
    let dir = ctrl.obstacle_avoidance_dir(&body, &mc, &fx.ctx(owner, 4), v(0.0, 1.0));
    assert!(!ctrl.flags.avoiding_units);
    assert_eq!(dir, v(0.0, 1.0));
}

// ============================================================================
// Slow update
// ============================================================================

#[test]
fn test_slow_update_requests_missing_route() {
    let fx = Fixture::new();
    let mc = MoveClass::default();
    let owner = Entity::from_bits(1);
    let (mut body, mut ctrl) = unit(v(100.0, 100.0), EAST, &mc);
    ctrl.progress = ProgressState::Active;
    ctrl.goal = v(300.0, 100.0);
    ctrl.goal_radius = n(8.0);

    ctrl.slow_update(owner, &mut body, &mc, &fx.ctx(owner, 30).planner());

    assert!(ctrl.path_id.is_some());
    assert_eq!(ctrl.last_repath_frame, 30);
}

#[test]
fn test_idling_too_long_fails_order() {
    let fx = Fixture::new();
    let mc = MoveClass::default();
    let owner = Entity::from_bits(1);
    let (mut body, mut ctrl) = unit(v(100.0, 100.0), EAST, &mc);
    ctrl.progress = ProgressState::Active;
    ctrl.path_id = Some(fx.request(owner, &mc, body.pos, v(300.0, 100.0)));
    ctrl.flags.idling = true;
    ctrl.num_idling_updates = 100;
    ctrl.num_idling_slow_updates = MAX_IDLING_SLOWUPDATES - 1;

    ctrl.slow_update(owner, &mut body, &mc, &fx.ctx(owner, 30).planner());

    assert_eq!(ctrl.progress, ProgressState::Failed);
    assert!(ctrl.outbox.contains(&MoveEvent::Failed));
    assert!(ctrl.path_id.is_none());
    assert_eq!(fx.paths.live_paths(), 0);
}

#[test]
fn test_deferred_repath_waits_for_delay() {
    let fx = Fixture::new();
    let mc = MoveClass::default();
    let owner = Entity::from_bits(1);
    let (mut body, mut ctrl) = unit(v(100.0, 100.0), EAST, &mc);
    ctrl.progress = ProgressState::Active;
    ctrl.goal = v(300.0, 100.0);
    ctrl.path_id = Some(fx.request(owner, &mc, body.pos, ctrl.goal));
    ctrl.curr_waypoint = Waypoint::resolved(v(140.0, 100.0));
    ctrl.mark_repath(0);
    ctrl.best_last_waypoint_dist = FixedNum::ZERO;

    ctrl.slow_update(owner, &mut body, &mc, &fx.ctx(owner, 30).planner());
    assert!(ctrl.flags.want_repath);
    assert!(ctrl.next_path_id.is_none());

    ctrl.slow_update(owner, &mut body, &mc, &fx.ctx(owner, 200).planner());
    assert!(!ctrl.flags.want_repath);
    assert!(ctrl.next_path_id.is_some());
    assert_eq!(ctrl.last_repath_frame, 200);
}

#[test]
fn test_slow_update_pulls_unit_back_on_map() {
    let fx = Fixture::new();
    let mc = MoveClass::default();
    let owner = Entity::from_bits(1);
    let (mut body, mut ctrl) = unit(v(-5.0, 50.0), EAST, &mc);

    ctrl.slow_update(owner, &mut body, &mc, &fx.ctx(owner, 30).planner());
    assert_eq!(body.pos, v(0.0, 50.0));
    assert_eq!(ctrl.old_pos, body.pos);
}

#[test]
fn test_owner_moved_tracks_idling() {
    let mc = MoveClass::default();
    let (mut body, mut ctrl) = unit(v(100.0, 100.0), EAST, &mc);
    body.velocity = v(1.0, 0.0);

    assert!(!ctrl.owner_moved(&mut body));
    assert!(ctrl.flags.idling);
    assert_eq!(body.velocity, FixedVec2::ZERO);

    ctrl.flags.at_goal = true;
    assert!(!ctrl.owner_moved(&mut body));
    assert!(!ctrl.flags.idling);

    body.pos = v(102.0, 100.0);
    assert!(ctrl.owner_moved(&mut body));
    assert_eq!(ctrl.old_pos, body.pos);
}
