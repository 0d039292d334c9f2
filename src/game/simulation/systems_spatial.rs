//! Serial bookkeeping around the parallel phases: quad membership, the solid
//! snapshot, feature footprints and despawn cleanup.
//!
//! Every system here iterates in ascending entity order so quad contents and
//! therefore query results are identical on every peer.

use bevy::prelude::*;

use crate::game::fixed_math::FixedNum;
use crate::game::movement::{MovableBody, MovementController};
use crate::game::path::PathService;
use crate::game::quad_field::{OccupiedQuads, QuadField};
use crate::game::solid::{ObjectKind, SolidObject, SolidTable};
use crate::game::terrain::{MoveClassId, MoveClassRegistry, TerrainMap};
use quadmotion_macros::profile;

use super::components::{Feature, Unit};
use super::resources::{BlockingFootprints, SimTick, StampedFootprint};

/// Re-indexes every unit whose bounding circle changed quads.
#[profile(2)]
pub fn refresh_unit_membership(
    tick: Res<SimTick>,
    mut quad_field: ResMut<QuadField>,
    mut units: Query<(Entity, &MovableBody, &mut OccupiedQuads), With<Unit>>,
) {
    let mut rows: Vec<_> = units.iter_mut().collect();
    rows.sort_unstable_by_key(|(entity, ..)| *entity);

    let mut changed = 0usize;
    for (entity, body, mut occupied) in rows {
        if quad_field.moved_unit(entity, body.faction, body.pos, body.radius, &mut occupied) {
            changed += 1;
        }
    }
    crate::profile_log!(tick, "[QUAD] Membership refresh | changed: {}", changed);
}

/// Indexes new or moved features and keeps static blockers stamped into
/// the terrain. Footprint changes are reported to the path service.
pub fn refresh_features(
    mut quad_field: ResMut<QuadField>,
    mut terrain: ResMut<TerrainMap>,
    mut stamped: ResMut<BlockingFootprints>,
    paths: Res<PathService>,
    mut features: Query<(Entity, &MovableBody, &mut Feature)>,
) {
    let mut rows: Vec<_> = features.iter_mut().collect();
    rows.sort_unstable_by_key(|(entity, ..)| *entity);

    for (entity, body, mut feature) in rows {
        match feature.indexed_at {
            None => quad_field.add_feature(entity, body.pos, body.radius),
            Some(old) if old != body.pos => quad_field.moved_feature(entity, old, body.pos, body.radius),
            Some(_) => {}
        }
        feature.indexed_at = Some(body.pos);

        let wanted = (body.state.blocking && !body.state.moving).then_some(StampedFootprint {
            pos: body.pos,
            xsize: feature.xsize,
            zsize: feature.zsize,
        });
        let current = stamped.0.get(&entity).copied();
        if wanted == current {
            continue;
        }
        if let Some(old) = current {
            terrain.unblock_footprint(old.pos, old.xsize, old.zsize);
            notify_terrain_changed(&terrain, &paths, old);
            stamped.0.remove(&entity);
        }
        if let Some(new) = wanted {
            terrain.block_footprint(new.pos, new.xsize, new.zsize);
            notify_terrain_changed(&terrain, &paths, new);
            stamped.0.insert(entity, new);
        }
    }
}

fn notify_terrain_changed(terrain: &TerrainMap, paths: &PathService, footprint: StampedFootprint) {
    let (x0, z0, x1, z1) = terrain.footprint_squares(footprint.pos, footprint.xsize, footprint.zsize);
    paths.0.terrain_changed(terrain, (x0, z0), (x1, z1));
}

/// Rebuilds the read-only snapshot the parallel phases look at neighbours through.
pub fn rebuild_solid_snapshot(
    mut solids: ResMut<SolidTable>,
    registry: Res<MoveClassRegistry>,
    units: Query<(Entity, &Unit, &MovableBody, &MoveClassId, Option<&MovementController>)>,
    features: Query<(Entity, &Feature, &MovableBody)>,
) {
    for (entity, unit, body, class, controller) in units.iter() {
        let mc = registry.get(*class);
        let mut state = body.state;
        state.push_resistant = mc.push_resistant;
        solids.insert(
            entity,
            SolidObject {
                kind: ObjectKind::Unit,
                pos: body.pos,
                velocity: body.velocity,
                speed: body.speed(),
                front: body.front,
                heading: body.heading,
                radius: body.radius,
                mass: body.mass,
                faction: body.faction,
                half_extents: mc.half_extents(),
                axis_stretch: mc.axis_stretch(),
                separation_distance: mc.separation_distance,
                crush_resistance: unit.crush_resistance,
                state,
                mobile: true,
                mover: controller.map(MovementController::mover_info),
            },
        );
    }

    for (entity, feature, body) in features.iter() {
        solids.insert(
            entity,
            SolidObject {
                kind: ObjectKind::Feature,
                pos: body.pos,
                velocity: body.velocity,
                speed: body.speed(),
                front: body.front,
                heading: body.heading,
                radius: body.radius,
                mass: body.mass,
                faction: body.faction,
                half_extents: feature.half_extents(),
                axis_stretch: feature.axis_stretch(),
                separation_distance: FixedNum::ZERO,
                crush_resistance: feature.crush_resistance,
                state: body.state,
                mobile: false,
                mover: None,
            },
        );
    }
}

/// Drops every trace of despawned objects: quad entries, snapshot rows,
/// path handles and terrain stamps.
pub fn purge_despawned(
    mut removed: RemovedComponents<MovableBody>,
    mut quad_field: ResMut<QuadField>,
    mut solids: ResMut<SolidTable>,
    mut terrain: ResMut<TerrainMap>,
    mut stamped: ResMut<BlockingFootprints>,
    paths: Res<PathService>,
) {
    let mut gone: Vec<Entity> = removed.read().collect();
    gone.sort_unstable();
    gone.dedup();

    for entity in gone {
        quad_field.purge(entity);
        solids.remove(entity);
        let released = paths.0.delete_owner_paths(entity);
        if let Some(old) = stamped.0.remove(&entity) {
            terrain.unblock_footprint(old.pos, old.xsize, old.zsize);
            notify_terrain_changed(&terrain, &paths, old);
        }
        debug!("[SIM] Purged {:?} | released paths: {}", entity, released);
    }
}
