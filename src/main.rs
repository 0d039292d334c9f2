use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bevy::app::ScheduleRunnerPlugin;
use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use quadmotion::game::config::{read_initial_config, INITIAL_CONFIG_PATH};
use quadmotion::game::fixed_math::{FixedNum, FixedVec2};
use quadmotion::game::movement::MovableBody;
use quadmotion::game::path::PathService;
use quadmotion::game::simulation::debug::state_checksum;
use quadmotion::game::simulation::{
    feature_bundle, systems, unit_bundle, MoveOrder, SimConfig, SimSet, SimTick, UnitArrived, UnitMoveFailed,
};
use quadmotion::game::terrain::{MoveClassId, MoveClassRegistry, TerrainMap, SQUARE_SIZE};
use quadmotion::game::QuadmotionPlugin;

const LOG_PREFIX: &str = "quadmotion";
const KEEP_LOGS: usize = 25;

const SCENARIO_SEED: u64 = 0x5eed_1234;
const SCENARIO_UNITS: usize = 200;
const SCENARIO_FEATURES: usize = 24;
const SCENARIO_TICKS: u64 = 1800;

fn setup_file_logging() -> Option<String> {
    let log_dir = PathBuf::from("logs");
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("Failed to create logs directory: {}", e);
        return None;
    }

    cleanup_old_logs(&log_dir, KEEP_LOGS);

    let now = chrono::Local::now();
    let log_filename = format!("{}_{}.log", LOG_PREFIX, now.format("%Y%m%d_%H%M%S"));
    let log_path = log_dir.join(&log_filename).to_string_lossy().to_string();

    // one file per run, never rotated
    let file_appender = RollingFileAppender::new(Rotation::NEVER, &log_dir, &log_filename);
    let file_layer = fmt::layer().with_writer(file_appender).with_ansi(false);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bevy_ecs=info,quadmotion=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    Some(log_path)
}

fn cleanup_old_logs(log_dir: &Path, keep_count: usize) {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return;
    };
    let mut log_files: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .is_some_and(|s| s.starts_with(LOG_PREFIX) && s.ends_with(".log"))
        })
        .collect();

    // oldest first
    log_files.sort_by_key(|e| e.metadata().ok().and_then(|m| m.modified().ok()));

    if log_files.len() > keep_count {
        for file in log_files.iter().take(log_files.len() - keep_count) {
            let _ = fs::remove_file(file.path());
        }
    }
}

// ============================================================================
// Headless Scenario
// ============================================================================

#[derive(Resource)]
struct ScenarioRng(StdRng);

#[derive(Resource, Default)]
struct ScenarioStats {
    arrived: usize,
    failed: usize,
}

fn random_pos(rng: &mut StdRng, terrain: &TerrainMap) -> FixedVec2 {
    let margin = SQUARE_SIZE * 4;
    let w = terrain.world_width().to_num::<i32>() - margin;
    let h = terrain.world_height().to_num::<i32>() - margin;
    FixedVec2::from_int(rng.random_range(margin..w), rng.random_range(margin..h))
}

fn spawn_scenario(
    mut commands: Commands,
    mut rng: ResMut<ScenarioRng>,
    terrain: Res<TerrainMap>,
    registry: Res<MoveClassRegistry>,
) {
    let rng = &mut rng.0;

    for _ in 0..SCENARIO_FEATURES {
        let pos = random_pos(rng, &terrain);
        let size = rng.random_range(1..=3);
        commands.spawn(feature_bundle(pos, size, size, FixedNum::from_num(500)));
    }

    let class_id = MoveClassId(0);
    let mc = registry.get(class_id);
    for i in 0..SCENARIO_UNITS {
        let pos = random_pos(rng, &terrain);
        let heading = rng.random::<i16>();
        let faction = (i % 2) as u8;
        commands.spawn(unit_bundle(pos, heading, class_id, mc, faction));
    }

    info!("[SCENARIO] Spawned {} units and {} features", SCENARIO_UNITS, SCENARIO_FEATURES);
}

/// Sends every unit somewhere new every 600 ticks.
fn issue_orders(
    tick: Res<SimTick>,
    terrain: Res<TerrainMap>,
    mut rng: ResMut<ScenarioRng>,
    units: Query<Entity, With<MovableBody>>,
    mut orders: MessageWriter<MoveOrder>,
) {
    if tick.0 % 600 != 1 {
        return;
    }
    let mut entities: Vec<Entity> = units.iter().collect();
    entities.sort();
    for entity in entities {
        let goal = random_pos(&mut rng.0, &terrain);
        orders.write(MoveOrder {
            player_id: 0,
            entity,
            goal,
            goal_radius: FixedNum::from_num(SQUARE_SIZE * 2),
            raw: false,
        });
    }
}

fn finish_scenario(
    tick: Res<SimTick>,
    mut stats: ResMut<ScenarioStats>,
    mut arrived: MessageReader<UnitArrived>,
    mut failed: MessageReader<UnitMoveFailed>,
    bodies: Query<(Entity, &MovableBody)>,
    paths: Res<PathService>,
    config: Res<SimConfig>,
    mut exit: MessageWriter<AppExit>,
) {
    stats.arrived += arrived.read().count();
    stats.failed += failed.read().count();

    if tick.0 < SCENARIO_TICKS {
        return;
    }
    info!(
        "[SCENARIO] Done | ticks: {} ({:.1}s sim) | arrived: {} | failed: {} | state: {:016x} | paths: {:08x}",
        tick.0,
        tick.0 as f64 / config.tick_rate,
        stats.arrived,
        stats.failed,
        state_checksum(bodies.iter()),
        paths.path_checksum()
    );
    exit.write(AppExit::Success);
}

fn main() {
    let log_file = setup_file_logging();
    if let Some(path) = &log_file {
        println!("Logging to {}", path);
    }

    // Headless: every frame advances exactly one fixed step
    let tick_rate = read_initial_config(INITIAL_CONFIG_PATH).tick_rate.max(1.0);

    App::new()
        .add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::ZERO)))
        .insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_secs_f64(1.0 / tick_rate)))
        .add_plugins(AssetPlugin::default())
        .add_plugins(QuadmotionPlugin)
        .insert_resource(ScenarioRng(StdRng::seed_from_u64(SCENARIO_SEED)))
        .init_resource::<ScenarioStats>()
        .add_systems(PostStartup, spawn_scenario)
        .add_systems(
            FixedUpdate,
            (
                issue_orders.in_set(SimSet::Input).before(systems::process_orders),
                finish_scenario.after(SimSet::Resolve),
            ),
        )
        .run();
}
