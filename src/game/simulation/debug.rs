//! Diagnostics driven by [`DiagnosticsConfig`]. Read-only with respect to
//! simulation state.

use bevy::prelude::*;

use crate::game::config::DiagnosticsConfig;
use crate::game::movement::{MovableBody, MovementController, ProgressState};
use crate::game::path::PathService;
use crate::game::quad_field::QuadField;

use super::events::{FeatureCrushed, UnitCollided, UnitCrushed};
use super::resources::SimTick;

/// Order-independent digest of unit positions and headings.
pub fn state_checksum<'a>(bodies: impl Iterator<Item = (Entity, &'a MovableBody)>) -> u64 {
    bodies.fold(0u64, |acc, (entity, body)| {
        let mut h = entity.to_bits().wrapping_mul(0x9E37_79B9_7F4A_7C15);
        h ^= body.pos.x.to_bits() as u64;
        h = h.rotate_left(17) ^ body.pos.y.to_bits() as u64;
        h = h.rotate_left(17) ^ body.heading as u16 as u64;
        acc.wrapping_add(h)
    })
}

pub fn log_collision_events(
    diagnostics: Res<DiagnosticsConfig>,
    tick: Res<SimTick>,
    mut collided: MessageReader<UnitCollided>,
    mut crushed: MessageReader<UnitCrushed>,
    mut features_crushed: MessageReader<FeatureCrushed>,
) {
    if !diagnostics.log_collision_events {
        collided.clear();
        crushed.clear();
        features_crushed.clear();
        return;
    }
    for e in collided.read() {
        debug!("[COLLISION] tick: {} | {:?} hit {:?}", tick.0, e.collider, e.collidee);
    }
    for e in crushed.read() {
        info!("[COLLISION] tick: {} | {:?} crushed {:?}", tick.0, e.collider, e.collidee);
    }
    for e in features_crushed.read() {
        info!("[COLLISION] tick: {} | {:?} crushed feature {:?}", tick.0, e.collider, e.feature);
    }
}

pub fn log_status(
    diagnostics: Res<DiagnosticsConfig>,
    tick: Res<SimTick>,
    paths: Res<PathService>,
    quad_field: Res<QuadField>,
    units: Query<(Entity, &MovableBody, &MovementController)>,
) {
    let every = |n: u64| n > 0 && tick.0 % n == 0;

    if every(diagnostics.status_interval) {
        let mut counts = [0usize; 4];
        for (_, _, controller) in units.iter() {
            let slot = match controller.progress {
                ProgressState::Idle => 0,
                ProgressState::Active => 1,
                ProgressState::Done => 2,
                ProgressState::Failed => 3,
            };
            counts[slot] += 1;
        }
        info!(
            "[SIM STATUS] tick: {} | idle: {} active: {} done: {} failed: {} | paths: {} | quads: {}/{} entries: {}",
            tick.0,
            counts[0],
            counts[1],
            counts[2],
            counts[3],
            paths.0.live_paths(),
            quad_field.non_empty_quads(),
            quad_field.num_quads(),
            quad_field.total_entries()
        );
    }

    if every(diagnostics.checksum_interval) {
        let checksum = state_checksum(units.iter().map(|(e, b, _)| (e, b)));
        info!(
            "[SYNC] tick: {} | state: {:016x} | paths: {:08x}",
            tick.0,
            checksum,
            paths.0.path_checksum()
        );
    }
}
