use bevy::prelude::*;
use quadmotion::game::fixed_math::{FixedNum, FixedVec2};
use quadmotion::game::movement::MovableBody;
use quadmotion::game::path::PathService;
use quadmotion::game::simulation::debug::state_checksum;
use quadmotion::game::simulation::{feature_bundle, unit_bundle, MoveOrder, SimulationPlugin};
use quadmotion::game::terrain::{MoveClassId, MoveClassRegistry, TerrainMap};

/// Builds an app and fills it with a seeded crowd: a few walls, a few
/// features and `units` units of two factions, all sent to random goals.
fn seeded_app(seed: u64, units: usize) -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins);
    app.add_plugins(SimulationPlugin);
    app.update();

    let mut rng = fastrand::Rng::with_seed(seed);
    {
        let mut terrain = app.world_mut().resource_mut::<TerrainMap>();
        for _ in 0..4 {
            let x = rng.i32(20..100);
            let z = rng.i32(20..100);
            terrain.set_impassable_rect(x, z, x + rng.i32(0..3), z + rng.i32(4..12));
        }
    }

    for _ in 0..6 {
        let pos = FixedVec2::from_int(rng.i32(100..900), rng.i32(100..900));
        app.world_mut().spawn(feature_bundle(pos, 2, 2, FixedNum::from_num(400)));
    }

    let mc = app.world().resource::<MoveClassRegistry>().get(MoveClassId(0)).clone();
    let mut entities = Vec::new();
    for i in 0..units {
        let pos = FixedVec2::from_int(rng.i32(100..900), rng.i32(100..900));
        let id = app
            .world_mut()
            .spawn(unit_bundle(pos, rng.i16(..), MoveClassId(0), &mc, (i % 2) as u8))
            .id();
        entities.push(id);
    }

    for entity in entities {
        app.world_mut().write_message(MoveOrder {
            player_id: (rng.u8(..) % 2),
            entity,
            goal: FixedVec2::from_int(rng.i32(100..900), rng.i32(100..900)),
            goal_radius: FixedNum::from_num(16),
            raw: rng.bool(),
        });
    }
    app
}

fn checksums(app: &mut App) -> (u64, u32) {
    let world = app.world_mut();
    let mut query = world.query::<(Entity, &MovableBody)>();
    let state = state_checksum(query.iter(world));
    let paths = world.resource::<PathService>().path_checksum();
    (state, paths)
}

#[test]
fn test_identical_inputs_give_identical_states() {
    let mut app1 = seeded_app(12345, 120);
    let mut app2 = seeded_app(12345, 120);

    for tick in 1..=240 {
        app1.world_mut().run_schedule(FixedUpdate);
        app2.world_mut().run_schedule(FixedUpdate);

        if tick % 40 == 0 {
            let c1 = checksums(&mut app1);
            let c2 = checksums(&mut app2);
            println!("Tick {}: {:016x}/{:08x} vs {:016x}/{:08x}", tick, c1.0, c1.1, c2.0, c2.1);
            assert_eq!(c1, c2, "simulations diverged at tick {}", tick);
        }
    }
}

#[test]
fn test_different_seeds_give_different_states() {
    let mut app1 = seeded_app(1, 40);
    let mut app2 = seeded_app(2, 40);

    for _ in 0..30 {
        app1.world_mut().run_schedule(FixedUpdate);
        app2.world_mut().run_schedule(FixedUpdate);
    }

    assert_ne!(checksums(&mut app1).0, checksums(&mut app2).0);
}
