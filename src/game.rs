use bevy::prelude::*;

pub mod collision;
pub mod config;
pub mod fixed_math;
pub mod movement;
pub mod path;
pub mod persistence;
pub mod quad_field;
pub mod simulation;
pub mod solid;
pub mod terrain;

use config::QuadmotionConfigPlugin;
use simulation::SimulationPlugin;

/// Config loading plus the simulation. Needs `AssetPlugin` for the
/// diagnostics asset; tests that run without assets add [`SimulationPlugin`]
/// on its own.
pub struct QuadmotionPlugin;

impl Plugin for QuadmotionPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins((QuadmotionConfigPlugin, SimulationPlugin));
    }
}
