use bevy::prelude::*;
use quadmotion::game::fixed_math::{FixedNum, FixedVec2};
use quadmotion::game::movement::{MovableBody, MovementController, ProgressState};
use quadmotion::game::persistence::{capture_units, read_snapshot, restore_units, write_snapshot};
use quadmotion::game::simulation::{unit_bundle, MoveOrder, SimTick, SimulationPlugin};
use quadmotion::game::terrain::{MoveClassId, MoveClassRegistry};

fn sim_app() -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins);
    app.add_plugins(SimulationPlugin);
    app.update();
    app
}

/// Two widely spaced units, one routed and one raw.
fn spawn_pair(app: &mut App) -> (Entity, Entity) {
    let mc = app.world().resource::<MoveClassRegistry>().get(MoveClassId(0)).clone();
    let routed = app
        .world_mut()
        .spawn(unit_bundle(FixedVec2::from_int(100, 100), 0, MoveClassId(0), &mc, 0))
        .id();
    let raw = app
        .world_mut()
        .spawn(unit_bundle(FixedVec2::from_int(100, 700), 16384, MoveClassId(0), &mc, 0))
        .id();
    (routed, raw)
}

fn run_ticks(app: &mut App, n: usize) {
    for _ in 0..n {
        app.world_mut().run_schedule(FixedUpdate);
    }
}

fn state(app: &App, entity: Entity) -> (MovableBody, ProgressState) {
    let body = *app.world().get::<MovableBody>(entity).unwrap();
    let progress = app.world().get::<MovementController>(entity).unwrap().progress;
    (body, progress)
}

#[test]
fn test_restored_units_resume_their_orders() {
    let mut original = sim_app();
    let (routed, raw) = spawn_pair(&mut original);
    original.world_mut().write_message(MoveOrder {
        player_id: 0,
        entity: routed,
        goal: FixedVec2::from_int(500, 300),
        goal_radius: FixedNum::from_num(16),
        raw: false,
    });
    original.world_mut().write_message(MoveOrder {
        player_id: 0,
        entity: raw,
        goal: FixedVec2::from_int(600, 700),
        goal_radius: FixedNum::from_num(16),
        raw: true,
    });
    run_ticks(&mut original, 60);

    let snapshot = capture_units(original.world_mut());
    assert_eq!(snapshot.tick, 60);
    assert_eq!(snapshot.units.len(), 2);

    let mut bytes = Vec::new();
    write_snapshot(&mut bytes, &snapshot).unwrap();
    let loaded = read_snapshot(bytes.as_slice()).unwrap();

    // A fresh world spawning in the same order hands out the same ids
    let mut restored = sim_app();
    let (routed2, raw2) = spawn_pair(&mut restored);
    assert_eq!((routed2, raw2), (routed, raw));

    let count = restore_units(restored.world_mut(), &loaded);
    assert_eq!(count, 2);
    assert_eq!(restored.world().resource::<SimTick>().0, 60);

    for entity in [routed, raw] {
        let (a, pa) = state(&original, entity);
        let (b, pb) = state(&restored, entity);
        assert_eq!(a.pos, b.pos);
        assert_eq!(a.heading, b.heading);
        assert_eq!(a.velocity, b.velocity);
        assert_eq!(pa, pb);
        assert_eq!(pa, ProgressState::Active);
    }

    run_ticks(&mut original, 400);
    run_ticks(&mut restored, 400);

    for entity in [routed, raw] {
        let (a, pa) = state(&original, entity);
        let (b, pb) = state(&restored, entity);
        assert_eq!(pa, ProgressState::Done, "original {:?} did not finish", entity);
        assert_eq!(pb, ProgressState::Done, "restored {:?} did not finish", entity);
        let drift = (a.pos - b.pos).length();
        assert!(drift < FixedNum::from_num(40), "{:?} ended {} apart", entity, drift);
    }
}

#[test]
fn test_records_for_missing_units_are_skipped() {
    let mut original = sim_app();
    spawn_pair(&mut original);
    run_ticks(&mut original, 5);
    let snapshot = capture_units(original.world_mut());

    let mut restored = sim_app();
    let mc = restored.world().resource::<MoveClassRegistry>().get(MoveClassId(0)).clone();
    restored
        .world_mut()
        .spawn(unit_bundle(FixedVec2::from_int(300, 300), 0, MoveClassId(0), &mc, 0));

    assert_eq!(restore_units(restored.world_mut(), &snapshot), 1);
}
