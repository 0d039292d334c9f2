/// Simulation layer: the deterministic per-tick movement pipeline.
///
/// This module is organized into:
/// - **components**: unit and feature components plus spawn helpers
/// - **resources**: `SimConfig`, tick counter, stamped footprints
/// - **events**: orders in, notifications out
/// - **systems**: the phase systems and the shared world view
/// - **systems_spatial**: membership, snapshot and despawn bookkeeping
/// - **systems_config**: startup construction from the initial config
/// - **debug**: diagnostics logging

use bevy::prelude::*;

use crate::game::config::DiagnosticsConfig;
use crate::game::movement::SpeedControl;
use crate::game::path::PathService;
use crate::game::quad_field::QuadField;
use crate::game::solid::SolidTable;
use crate::game::terrain::{MoveClassRegistry, TerrainMap};

pub mod components;
pub mod debug;
pub mod events;
pub mod resources;
pub mod systems;
pub mod systems_config;
pub mod systems_spatial;

pub use components::*;
pub use events::*;
pub use resources::*;
pub use systems::{PendingFeatureMoves, SimWorld};

/// Phases of one simulation tick, run in this order.
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum SimSet {
    Input,       // Orders, despawn cleanup
    Steering,    // Traversal plan and avoidance (parallel)
    Integration, // Heading, speed, terrain-aware displacement (parallel)
    Commit,      // Apply displacements, path upkeep, membership, snapshot
    Physics,     // Collision response against the snapshot (parallel)
    Resolve,     // Apply pushes, notifications, slow update, membership
}

pub struct SimulationPlugin;

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        let defaults = SimConfig::default();
        app.insert_resource(Time::<Fixed>::from_hz(defaults.tick_rate));

        // Placeholders until init_simulation_from_config runs at startup
        app.insert_resource(TerrainMap::new(defaults.map_width, defaults.map_height));
        app.insert_resource(defaults.build_quad_field().unwrap_or_default());
        app.insert_resource(defaults);
        app.init_resource::<MoveClassRegistry>();
        app.init_resource::<PathService>();
        app.init_resource::<SpeedControl>();
        app.init_resource::<SolidTable>();
        app.init_resource::<SimTick>();
        app.init_resource::<SimPerformance>();
        app.init_resource::<BlockingFootprints>();
        app.init_resource::<PendingFeatureMoves>();
        app.init_resource::<DiagnosticsConfig>();

        app.add_message::<MoveOrder>();
        app.add_message::<StopOrder>();
        app.add_message::<UnitArrived>();
        app.add_message::<UnitMoveFailed>();
        app.add_message::<UnitCrushed>();
        app.add_message::<UnitCollided>();
        app.add_message::<FeatureCrushed>();
        app.add_message::<FeatureCollided>();
        app.add_message::<UnitMoved>();

        app.configure_sets(
            FixedUpdate,
            (
                SimSet::Input,
                SimSet::Steering,
                SimSet::Integration,
                SimSet::Commit,
                SimSet::Physics,
                SimSet::Resolve,
            )
                .chain(),
        );

        app.add_systems(Startup, systems_config::init_simulation_from_config);

        app.add_systems(
            FixedUpdate,
            (
                systems::increment_sim_tick.before(systems::sim_start),
                systems::sim_start.before(SimSet::Input),
                (
                    systems_spatial::purge_despawned,
                    systems_spatial::refresh_features,
                    systems_spatial::refresh_unit_membership,
                    systems_spatial::rebuild_solid_snapshot,
                    systems::process_orders,
                )
                    .chain()
                    .in_set(SimSet::Input),
                systems::steer_units.in_set(SimSet::Steering),
                systems::integrate_units.in_set(SimSet::Integration),
                (
                    systems::commit_moves,
                    systems_spatial::refresh_unit_membership,
                    systems_spatial::rebuild_solid_snapshot,
                )
                    .chain()
                    .in_set(SimSet::Commit),
                systems::handle_collisions.in_set(SimSet::Physics),
                (
                    systems::resolve_units,
                    systems::apply_feature_moves,
                    systems_spatial::refresh_features,
                    systems_spatial::refresh_unit_membership,
                    systems_spatial::rebuild_solid_snapshot,
                )
                    .chain()
                    .in_set(SimSet::Resolve),
                (debug::log_collision_events, debug::log_status, systems::sim_end).after(SimSet::Resolve),
            ),
        );
    }
}
