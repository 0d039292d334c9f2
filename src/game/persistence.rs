//! Save and restore of per-unit movement state.
//!
//! A snapshot is a version header followed by the unit records, both
//! bincode-encoded inside a zlib stream. Path handles are not saved: they
//! mean nothing to a fresh path provider, so an active unit asks for a new
//! route when it is restored.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use bevy::ecs::system::SystemState;
use bevy::prelude::*;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::fixed_math::{FixedNum, FixedVec2};
use crate::game::movement::{MoveFlags, MovableBody, MovementController, Planner, ProgressState};
use crate::game::path::Waypoint;
use crate::game::simulation::{SimTick, SimWorld};
use crate::game::terrain::{MoveClass, MoveClassId};

pub const MOVE_STATE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("snapshot io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding failed: {0}")]
    Codec(#[from] bincode::Error),
    #[error("snapshot version {found} does not match {expected}")]
    VersionMismatch { found: u32, expected: u32 },
}

/// Everything needed to put one controller back where it was.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MoveStateRecord {
    pub pos: FixedVec2,
    pub velocity: FixedVec2,
    pub heading: i16,
    pub moving: bool,

    pub progress: ProgressState,
    pub flags: MoveFlags,
    pub goal: FixedVec2,
    pub goal_radius: FixedNum,
    pub extra_radius: FixedNum,
    pub curr_waypoint: Waypoint,
    pub next_waypoint: Waypoint,

    pub current_speed: FixedNum,
    pub wanted_speed: FixedNum,
    pub max_wanted_speed: FixedNum,
    pub wanted_heading: i16,
    pub waypoint_dir: FixedVec2,

    pub num_idling_updates: i32,
    pub num_idling_slow_updates: i32,
    pub want_repath_frame: u64,
    pub last_repath_frame: u64,
}

impl MoveStateRecord {
    pub fn capture(controller: &MovementController, body: &MovableBody) -> Self {
        Self {
            pos: body.pos,
            velocity: body.velocity,
            heading: body.heading,
            moving: body.state.moving,
            progress: controller.progress,
            flags: controller.flags,
            goal: controller.goal,
            goal_radius: controller.goal_radius,
            extra_radius: controller.extra_radius,
            curr_waypoint: controller.curr_waypoint,
            next_waypoint: controller.next_waypoint,
            current_speed: controller.current_speed,
            wanted_speed: controller.wanted_speed,
            max_wanted_speed: controller.max_wanted_speed,
            wanted_heading: controller.wanted_heading,
            waypoint_dir: controller.waypoint_dir,
            num_idling_updates: controller.num_idling_updates,
            num_idling_slow_updates: controller.num_idling_slow_updates,
            want_repath_frame: controller.want_repath_frame,
            last_repath_frame: controller.last_repath_frame,
        }
    }
}

/// One saved unit, keyed by its entity bits at save time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub id: u64,
    pub state: MoveStateRecord,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveStateSnapshot {
    pub tick: u64,
    /// Sorted by `id`.
    pub units: Vec<UnitRecord>,
}

impl MovementController {
    /// Reinstates saved state. Held path handles are released first; an
    /// active path-following order gets a fresh route from `planner`.
    pub fn restore(
        &mut self,
        owner: Entity,
        body: &mut MovableBody,
        mc: &MoveClass,
        planner: &Planner,
        record: &MoveStateRecord,
    ) {
        self.release_paths(planner);

        body.pos = record.pos;
        body.velocity = record.velocity;
        body.set_heading(record.heading);
        body.state.moving = record.moving;

        self.progress = record.progress;
        self.flags = record.flags;
        self.goal = record.goal;
        self.goal_radius = record.goal_radius;
        self.extra_radius = record.extra_radius;
        self.curr_waypoint = record.curr_waypoint;
        self.next_waypoint = record.next_waypoint;
        self.current_speed = record.current_speed;
        self.wanted_speed = record.wanted_speed;
        self.max_wanted_speed = record.max_wanted_speed;
        self.wanted_heading = record.wanted_heading;
        self.waypoint_dir = record.waypoint_dir;
        self.num_idling_updates = record.num_idling_updates;
        self.num_idling_slow_updates = record.num_idling_slow_updates;
        self.want_repath_frame = record.want_repath_frame;
        self.last_repath_frame = record.last_repath_frame;

        self.old_pos = body.pos;
        self.old_heading = body.heading;
        self.resultant_force = FixedVec2::ZERO;
        self.outbox.clear();

        if self.progress == ProgressState::Active && !self.flags.use_raw_movement {
            let last_repath = self.last_repath_frame;
            self.re_request_path(owner, body, mc, planner, true);
            self.last_repath_frame = last_repath;
        }
    }
}

// ============================================================================
// Encoding
// ============================================================================

pub fn write_snapshot<W: Write>(writer: W, snapshot: &MoveStateSnapshot) -> Result<(), PersistenceError> {
    let mut encoder = ZlibEncoder::new(writer, Compression::default());
    bincode::serialize_into(&mut encoder, &MOVE_STATE_VERSION)?;
    bincode::serialize_into(&mut encoder, snapshot)?;
    encoder.finish()?;
    Ok(())
}

pub fn read_snapshot<R: Read>(reader: R) -> Result<MoveStateSnapshot, PersistenceError> {
    let mut decoder = ZlibDecoder::new(reader);
    let version: u32 = bincode::deserialize_from(&mut decoder)?;
    if version != MOVE_STATE_VERSION {
        return Err(PersistenceError::VersionMismatch { found: version, expected: MOVE_STATE_VERSION });
    }
    Ok(bincode::deserialize_from(&mut decoder)?)
}

pub fn save_snapshot(path: impl AsRef<Path>, snapshot: &MoveStateSnapshot) -> Result<(), PersistenceError> {
    let file = File::create(path)?;
    write_snapshot(BufWriter::new(file), snapshot)
}

pub fn load_snapshot(path: impl AsRef<Path>) -> Result<MoveStateSnapshot, PersistenceError> {
    let file = File::open(path)?;
    read_snapshot(BufReader::new(file))
}

// ============================================================================
// World access
// ============================================================================

/// Captures every unit with a controller, in entity order.
pub fn capture_units(world: &mut World) -> MoveStateSnapshot {
    let tick = world.resource::<SimTick>().get();
    let mut query = world.query::<(Entity, &MovementController, &MovableBody)>();
    let mut units: Vec<UnitRecord> = query
        .iter(world)
        .map(|(entity, controller, body)| UnitRecord {
            id: entity.to_bits(),
            state: MoveStateRecord::capture(controller, body),
        })
        .collect();
    units.sort_by_key(|u| u.id);
    MoveStateSnapshot { tick, units }
}

/// Restores saved units onto the live entities with matching ids and
/// rewinds the tick counter. Returns how many units were restored.
pub fn restore_units(world: &mut World, snapshot: &MoveStateSnapshot) -> usize {
    world.resource_mut::<SimTick>().0 = snapshot.tick;

    let records: FxHashMap<u64, &MoveStateRecord> = snapshot.units.iter().map(|u| (u.id, &u.state)).collect();

    let mut state: SystemState<(
        SimWorld,
        Query<(Entity, &MoveClassId, &mut MovableBody, &mut MovementController)>,
    )> = SystemState::new(world);
    let (sim, mut units) = state.get_mut(world);
    let ctx = sim.context();
    let planner = ctx.planner();

    let mut restored = 0;
    let mut ordered: Vec<_> = units.iter_mut().collect();
    ordered.sort_by_key(|(entity, ..)| *entity);
    for (entity, class, mut body, mut controller) in ordered {
        let Some(record) = records.get(&entity.to_bits()) else {
            continue;
        };
        let mc = ctx.move_classes.get(*class);
        controller.restore(entity, &mut body, mc, &planner, record);
        restored += 1;
    }

    info!("[SAVE] Restored {} of {} units | tick: {}", restored, snapshot.units.len(), snapshot.tick);
    restored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> MoveStateRecord {
        MoveStateRecord {
            pos: FixedVec2::from_f32(12.5, 40.0),
            velocity: FixedVec2::from_f32(1.0, 0.0),
            heading: 16384,
            moving: true,
            progress: ProgressState::Active,
            flags: MoveFlags { move_order: true, want_repath: true, ..Default::default() },
            goal: FixedVec2::from_f32(200.0, 40.0),
            goal_radius: FixedNum::from_num(8),
            extra_radius: FixedNum::ZERO,
            curr_waypoint: Waypoint::resolved(FixedVec2::from_f32(60.0, 40.0)),
            next_waypoint: Waypoint::skip_requested(FixedVec2::from_f32(100.0, 40.0)),
            current_speed: FixedNum::ONE,
            wanted_speed: FixedNum::from_num(2),
            max_wanted_speed: FixedNum::from_num(2),
            wanted_heading: 16000,
            waypoint_dir: FixedVec2::from_f32(1.0, 0.0),
            num_idling_updates: 3,
            num_idling_slow_updates: 1,
            want_repath_frame: 90,
            last_repath_frame: 30,
        }
    }

    #[test]
    fn test_snapshot_survives_encoding() {
        let snapshot = MoveStateSnapshot {
            tick: 451,
            units: vec![UnitRecord { id: 7, state: record() }, UnitRecord { id: 9, state: record() }],
        };

        let mut bytes = Vec::new();
        write_snapshot(&mut bytes, &snapshot).unwrap();
        let decoded = read_snapshot(bytes.as_slice()).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn test_version_mismatch_is_rejected() {
        let mut bytes = Vec::new();
        let mut encoder = ZlibEncoder::new(&mut bytes, Compression::default());
        bincode::serialize_into(&mut encoder, &(MOVE_STATE_VERSION + 1)).unwrap();
        bincode::serialize_into(&mut encoder, &MoveStateSnapshot::default()).unwrap();
        encoder.finish().unwrap();

        match read_snapshot(bytes.as_slice()) {
            Err(PersistenceError::VersionMismatch { found, expected }) => {
                assert_eq!(found, MOVE_STATE_VERSION + 1);
                assert_eq!(expected, MOVE_STATE_VERSION);
            }
            other => panic!("expected version mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_garbage_is_a_codec_or_io_error() {
        let result = read_snapshot(&b"definitely not zlib"[..]);
        assert!(matches!(result, Err(PersistenceError::Io(_)) | Err(PersistenceError::Codec(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = load_snapshot("does/not/exist.qms");
        assert!(matches!(result, Err(PersistenceError::Io(_))));
    }
}
