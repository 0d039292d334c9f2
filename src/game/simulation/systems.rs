//! The per-tick phase systems.
//!
//! Parallel phases (`Steering`, `Integration`, `Physics`) use `par_iter_mut`
//! and only write the unit's own components. Serial phases (`Input`,
//! `Commit`, `Resolve`) visit units in ascending entity order.

use bevy::ecs::system::SystemParam;
use bevy::prelude::*;

use crate::game::movement::{MoveContext, MoveEvent, MovableBody, MovementController, SpeedControl};
use crate::game::path::PathService;
use crate::game::quad_field::QuadField;
use crate::game::solid::SolidTable;
use crate::game::terrain::{MoveClassId, MoveClassRegistry, TerrainMap};
use quadmotion_macros::profile;

use super::components::{Feature, Unit};
use super::events::*;
use super::resources::*;

/// Read-only world view shared by the movement phases.
#[derive(SystemParam)]
pub struct SimWorld<'w> {
    pub terrain: Res<'w, TerrainMap>,
    pub quad_field: Res<'w, QuadField>,
    pub solids: Res<'w, SolidTable>,
    pub paths: Res<'w, PathService>,
    pub policy: Res<'w, SpeedControl>,
    pub config: Res<'w, SimConfig>,
    pub move_classes: Res<'w, MoveClassRegistry>,
    pub tick: Res<'w, SimTick>,
}

impl SimWorld<'_> {
    /// Context with a placeholder owner; use [`MoveContext::for_owner`] per unit.
    pub fn context(&self) -> MoveContext<'_> {
        MoveContext {
            owner: Entity::PLACEHOLDER,
            terrain: &self.terrain,
            quad_field: &self.quad_field,
            solids: &self.solids,
            paths: self.paths.0.as_ref(),
            policy: self.policy.0.as_ref(),
            config: &self.config,
            move_classes: &self.move_classes,
            frame: self.tick.0,
        }
    }
}

/// Outbound notifications written in the resolve phase.
#[derive(SystemParam)]
pub struct Notifications<'w> {
    pub arrived: MessageWriter<'w, UnitArrived>,
    pub failed: MessageWriter<'w, UnitMoveFailed>,
    pub unit_crushed: MessageWriter<'w, UnitCrushed>,
    pub unit_collided: MessageWriter<'w, UnitCollided>,
    pub feature_crushed: MessageWriter<'w, FeatureCrushed>,
    pub feature_collided: MessageWriter<'w, FeatureCollided>,
    pub moved: MessageWriter<'w, UnitMoved>,
}

/// Feature displacements gathered during resolve, applied right after it.
#[derive(Resource, Default, Debug)]
pub struct PendingFeatureMoves(pub Vec<(Entity, crate::game::fixed_math::FixedVec2)>);

// ============================================================================
// Tick Management
// ============================================================================

pub fn increment_sim_tick(mut tick: ResMut<SimTick>) {
    tick.increment();
}

// ============================================================================
// Input
// ============================================================================

/// Applies stop orders, then move orders, each sorted by `(player_id, entity)`.
pub fn process_orders(
    mut move_orders: MessageReader<MoveOrder>,
    mut stop_orders: MessageReader<StopOrder>,
    mut units: Query<(&mut MovementController, &mut MovableBody, &MoveClassId)>,
    world: SimWorld,
) {
    let ctx = world.context();
    let planner = ctx.planner();

    let mut stops: Vec<StopOrder> = stop_orders.read().copied().collect();
    stops.sort_by_key(|o| (o.player_id, o.entity));
    for order in stops {
        let Ok((mut controller, mut body, _)) = units.get_mut(order.entity) else {
            warn!("[SIM] Stop order for unknown unit {:?}", order.entity);
            continue;
        };
        controller.stop_moving(order.entity, &mut body, &planner, order.hard);
    }

    let mut moves: Vec<MoveOrder> = move_orders.read().copied().collect();
    moves.sort_by_key(|o| (o.player_id, o.entity));
    for order in moves {
        let Ok((mut controller, body, class)) = units.get_mut(order.entity) else {
            warn!("[SIM] Move order for unknown unit {:?}", order.entity);
            continue;
        };
        let mc = ctx.move_classes.get(*class);
        if order.raw {
            controller.start_moving_raw(&body, mc, &planner, order.goal, order.goal_radius);
        } else {
            controller.start_moving(order.entity, &body, mc, &planner, order.goal, order.goal_radius);
        }
    }
}

// ============================================================================
// Parallel Phases
// ============================================================================

/// Traversal plan: path switching, avoidance and waypoint following.
/// Units whose order is done or failed still run here and brake to rest.
#[profile(2)]
pub fn steer_units(
    tick: Res<SimTick>,
    mut units: Query<(Entity, &mut MovementController, &MovableBody, &MoveClassId)>,
    world: SimWorld,
) {
    let ctx = world.context();
    units.par_iter_mut().for_each(|(entity, mut controller, body, class)| {
        let mc = ctx.move_classes.get(*class);
        controller.update_traversal_plan(body, mc, &ctx.for_owner(entity));
    });
    crate::profile_log!(tick, "[SIM] Steering | units: {}", units.iter().len());
}

/// Heading, speed and terrain-aware displacement. Covers every unit,
/// finished orders included.
#[profile(2)]
pub fn integrate_units(
    tick: Res<SimTick>,
    mut units: Query<(Entity, &mut MovementController, &mut MovableBody, &MoveClassId)>,
    world: SimWorld,
) {
    let ctx = world.context();
    units.par_iter_mut().for_each(|(entity, mut controller, mut body, class)| {
        let mc = ctx.move_classes.get(*class);
        controller.integrate(&mut body, mc, &ctx.for_owner(entity));
    });
}

/// Collision response against the snapshot taken at the end of commit.
/// A finished order leaves its unit solid: it still blocks and gets pushed.
#[profile(2)]
pub fn handle_collisions(
    tick: Res<SimTick>,
    mut units: Query<(Entity, &mut MovementController, &MovableBody, &MoveClassId)>,
    world: SimWorld,
) {
    let ctx = world.context();
    units.par_iter_mut().for_each(|(entity, mut controller, body, class)| {
        let mc = ctx.move_classes.get(*class);
        controller.handle_object_collisions(body, mc, &ctx.for_owner(entity));
    });
}

// ============================================================================
// Serial Phases
// ============================================================================

/// Applies integrated displacements and deferred path work, then lets the
/// path service run its queued searches.
#[profile(2)]
pub fn commit_moves(
    tick: Res<SimTick>,
    mut units: Query<(Entity, &mut MovementController, &mut MovableBody)>,
    world: SimWorld,
) {
    let planner = world.context().planner();
    let mut rows: Vec<_> = units.iter_mut().collect();
    rows.sort_unstable_by_key(|(entity, ..)| *entity);

    for (entity, mut controller, mut body) in rows {
        controller.update_pre_collisions(entity, &mut body, &planner);
    }
    world.paths.0.update(&world.terrain);
}

/// Applies collision displacements, runs the slow update on its period and
/// turns outboxes into notifications.
#[profile(2)]
pub fn resolve_units(
    tick: Res<SimTick>,
    mut units: Query<(Entity, &mut MovementController, &mut MovableBody, &MoveClassId), With<Unit>>,
    world: SimWorld,
    mut pending: ResMut<PendingFeatureMoves>,
    mut out: Notifications,
) {
    let ctx = world.context();
    let planner = ctx.planner();
    let run_slow_update = tick.0 % ctx.config.slow_update_rate.max(1) == 0;

    let mut rows: Vec<_> = units.iter_mut().collect();
    rows.sort_unstable_by_key(|(entity, ..)| *entity);

    for (entity, mut controller, mut body, class) in rows {
        if controller.update(&mut body) {
            out.moved.write(UnitMoved { entity, pos: body.pos });
        }
        if run_slow_update {
            let mc = ctx.move_classes.get(*class);
            controller.slow_update(entity, &mut body, mc, &planner);
        }

        for event in controller.outbox.drain(..) {
            match event {
                MoveEvent::Arrived => {
                    out.arrived.write(UnitArrived { entity });
                }
                MoveEvent::Failed => {
                    out.failed.write(UnitMoveFailed { entity });
                }
                MoveEvent::UnitCrushed { collidee, impulse } => {
                    out.unit_crushed.write(UnitCrushed { collider: entity, collidee, impulse });
                }
                MoveEvent::UnitCollided { collidee } => {
                    out.unit_collided.write(UnitCollided { collider: entity, collidee });
                }
                MoveEvent::FeatureCrushed { feature, impulse } => {
                    out.feature_crushed.write(FeatureCrushed { collider: entity, feature, impulse });
                }
                MoveEvent::FeatureCollided { feature } => {
                    out.feature_collided.write(FeatureCollided { collider: entity, feature });
                }
                MoveEvent::FeatureMoved { feature, displacement } => {
                    pending.0.push((feature, displacement));
                }
            }
        }
    }
}

pub fn apply_feature_moves(
    mut pending: ResMut<PendingFeatureMoves>,
    mut features: Query<&mut MovableBody, With<Feature>>,
) {
    for (entity, displacement) in pending.0.drain(..) {
        if let Ok(mut body) = features.get_mut(entity) {
            body.pos += displacement;
        }
    }
}

// ============================================================================
// Status
// ============================================================================

pub fn sim_start(
    #[allow(unused_variables)] stats: Res<SimPerformance>,
    #[allow(unused_variables)] tick: Res<SimTick>,
    #[allow(unused_variables)] units: Query<&MovementController>,
) {
    crate::profile_log!(
        tick,
        "[SIM STATUS] Tick: {} | Units: {} | Active: {} | Last sim duration: {:?}",
        tick.0,
        units.iter().len(),
        units.iter().filter(|c| c.is_active()).count(),
        stats.last_duration
    );
}

#[profile(16)]
pub fn sim_end(mut stats: ResMut<SimPerformance>, time: Res<Time<Fixed>>) {
    stats.last_duration = time.delta();
}
