//! Startup: builds the fixed-point simulation resources from [`InitialConfig`].

use bevy::prelude::*;

use crate::game::config::InitialConfig;
use crate::game::fixed_math::FixedNum;
use crate::game::path::{GridPathProvider, PathService};
use crate::game::quad_field::{QuadField, QuadFieldError};
use crate::game::terrain::{MoveClassRegistry, TerrainMap};

use super::resources::SimConfig;

impl SimConfig {
    /// The only float-to-fixed conversion point for engine-wide settings.
    pub fn from_initial(config: &InitialConfig) -> Self {
        Self {
            tick_rate: config.tick_rate,
            map_width: config.map_width,
            map_height: config.map_height,
            quad_size: config.quad_size,
            num_factions: config.num_factions,
            max_collision_push_multiplier: FixedNum::from_num(config.max_collision_push_multiplier.clamp(0.0, 1000.0)),
            avoidance_update_rate: config.avoidance_update_rate.max(1),
            repath_delay: config.repath_delay,
            repath_max_rate: config.repath_max_rate,
            slow_update_rate: config.slow_update_rate.max(1),
            allow_unit_collision_overlap: config.allow_unit_collision_overlap,
            allow_crushing_allied_units: config.allow_crushing_allied_units,
            allow_pushing_enemy_units: config.allow_pushing_enemy_units,
            allow_sep_axis_collision_test: config.allow_sep_axis_collision_test,
        }
    }

    /// Quad grid sized to the map.
    pub fn build_quad_field(&self) -> Result<QuadField, QuadFieldError> {
        QuadField::new(self.world_width(), self.world_height(), self.quad_size, self.num_factions)
    }
}

/// Installs every simulation resource derived from the initial config.
/// A grid that cannot be built is fatal: the error is logged and the app
/// exits with an error code.
pub fn init_simulation_from_config(
    mut commands: Commands,
    mut fixed_time: ResMut<Time<Fixed>>,
    initial_config: Option<Res<InitialConfig>>,
    mut exit: MessageWriter<AppExit>,
) {
    let fallback = InitialConfig::default();
    let config = match &initial_config {
        Some(cfg) => cfg.as_ref(),
        None => {
            warn!("[CONFIG] InitialConfig not found, using defaults");
            &fallback
        }
    };

    let sim_config = SimConfig::from_initial(config);
    let quad_field = match sim_config.build_quad_field() {
        Ok(field) => field,
        Err(e) => {
            error!("[CONFIG] Cannot build quad field: {}", e);
            exit.write(AppExit::error());
            return;
        }
    };

    fixed_time.set_timestep_seconds(1.0 / config.tick_rate.max(1.0));

    let classes = config.move_classes.iter().map(|c| c.to_move_class()).collect::<Vec<_>>();
    info!(
        "[CONFIG] Simulation initialized | map: {}x{} squares, quad: {}, move classes: {}",
        sim_config.map_width,
        sim_config.map_height,
        sim_config.quad_size,
        classes.len()
    );

    commands.insert_resource(TerrainMap::new(sim_config.map_width, sim_config.map_height));
    commands.insert_resource(quad_field);
    commands.insert_resource(MoveClassRegistry::new(classes));
    commands.insert_resource(PathService(Box::new(GridPathProvider::new(config.path_max_iterations))));
    commands.insert_resource(sim_config);
}
