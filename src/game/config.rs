use bevy::prelude::*;
use bevy_common_assets::ron::RonAssetPlugin;
use serde::{Deserialize, Serialize};

use crate::game::fixed_math::FixedNum;
use crate::game::terrain::MoveClass;

pub const INITIAL_CONFIG_PATH: &str = "assets/initial_config.ron";

/// Static configuration loaded once at startup. Every value here feeds the
/// deterministic simulation, so all peers must load identical files and
/// nothing may change mid-match.
#[derive(Resource, Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct InitialConfig {
    pub tick_rate: f64,
    /// Map extent in squares.
    pub map_width: usize,
    pub map_height: usize,
    pub quad_size: i32,
    pub num_factions: usize,

    // Engine-wide movement options
    pub max_collision_push_multiplier: f32,
    pub avoidance_update_rate: u32,
    pub repath_delay: u64,
    pub repath_max_rate: u64,
    pub slow_update_rate: u64,
    pub allow_unit_collision_overlap: bool,
    pub allow_crushing_allied_units: bool,
    pub allow_pushing_enemy_units: bool,
    pub allow_sep_axis_collision_test: bool,

    // Pathfinding
    pub path_max_iterations: usize,

    pub move_classes: Vec<MoveClassConfig>,
}

impl Default for InitialConfig {
    fn default() -> Self {
        Self {
            tick_rate: 30.0,
            map_width: 128,
            map_height: 128,
            quad_size: 128,
            num_factions: 4,
            max_collision_push_multiplier: 2.0,
            avoidance_update_rate: 3,
            repath_delay: 60,
            repath_max_rate: 150,
            slow_update_rate: 15,
            allow_unit_collision_overlap: true,
            allow_crushing_allied_units: false,
            allow_pushing_enemy_units: false,
            allow_sep_axis_collision_test: false,
            path_max_iterations: 65_536,
            move_classes: vec![MoveClassConfig::default()],
        }
    }
}

/// One ground move definition as written in the config file.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct MoveClassConfig {
    pub name: String,
    pub xsize: i32,
    pub zsize: i32,
    pub max_speed: f32,
    pub max_reverse_speed: f32,
    pub turn_rate: i32,
    pub acc_rate: f32,
    pub dec_rate: f32,
    pub mass: f32,
    pub separation_distance: f32,
    pub crush_strength: f32,
    pub push_resistant: bool,
    pub avoid_mobiles_on_path: bool,
    pub allow_terrain_collisions: bool,
    pub turn_in_place: bool,
    pub turn_in_place_speed_limit: f32,
    pub turn_in_place_angle_limit: f32,
}

impl Default for MoveClassConfig {
    fn default() -> Self {
        Self {
            name: "tank2x2".to_string(),
            xsize: 2,
            zsize: 2,
            max_speed: 2.0,
            max_reverse_speed: 0.0,
            turn_rate: 600,
            acc_rate: 0.1,
            dec_rate: 0.2,
            mass: 100.0,
            separation_distance: 0.0,
            crush_strength: 10.0,
            push_resistant: false,
            avoid_mobiles_on_path: true,
            allow_terrain_collisions: true,
            turn_in_place: true,
            turn_in_place_speed_limit: 0.5,
            turn_in_place_angle_limit: 0.0,
        }
    }
}

impl MoveClassConfig {
    /// The only float-to-fixed conversion point for move classes.
    pub fn to_move_class(&self) -> MoveClass {
        MoveClass {
            name: self.name.clone(),
            xsize: self.xsize,
            zsize: self.zsize,
            max_speed: FixedNum::from_num(self.max_speed),
            max_reverse_speed: FixedNum::from_num(self.max_reverse_speed),
            turn_rate: self.turn_rate,
            acc_rate: FixedNum::from_num(self.acc_rate),
            dec_rate: FixedNum::from_num(self.dec_rate),
            mass: FixedNum::from_num(self.mass),
            separation_distance: FixedNum::from_num(self.separation_distance),
            crush_strength: FixedNum::from_num(self.crush_strength),
            push_resistant: self.push_resistant,
            avoid_mobiles_on_path: self.avoid_mobiles_on_path,
            allow_terrain_collisions: self.allow_terrain_collisions,
            turn_in_place: self.turn_in_place,
            turn_in_place_speed_limit: FixedNum::from_num(self.turn_in_place_speed_limit),
            turn_in_place_angle_limit: FixedNum::from_num(self.turn_in_place_angle_limit),
        }
        .sanitized()
    }
}

/// Hot-reloadable diagnostics. Never read by simulation math.
#[derive(Asset, TypePath, Resource, Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Ticks between status lines; 0 disables them.
    pub status_interval: u64,
    pub log_collision_events: bool,
    /// Ticks between state checksum lines; 0 disables them.
    pub checksum_interval: u64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            status_interval: 300,
            log_collision_events: false,
            checksum_interval: 0,
        }
    }
}

#[derive(Resource)]
pub struct DiagnosticsConfigHandle(pub Handle<DiagnosticsConfig>);

/// Loads [`InitialConfig`] and keeps [`DiagnosticsConfig`] in sync with its
/// asset file. Needs the asset plugin; headless tests skip it and insert
/// the resources directly.
pub struct QuadmotionConfigPlugin;

impl Plugin for QuadmotionConfigPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(RonAssetPlugin::<DiagnosticsConfig>::new(&["diagnostics.ron"]))
            .init_resource::<DiagnosticsConfig>()
            .add_systems(PreStartup, load_initial_config)
            .add_systems(Startup, setup_diagnostics_config)
            .add_systems(Update, apply_diagnostics_config);
    }
}

/// Parses the initial config, falling back to defaults on any failure.
pub fn read_initial_config(path: &str) -> InitialConfig {
    match std::fs::read_to_string(path) {
        Ok(contents) => match ron::from_str::<InitialConfig>(&contents) {
            Ok(config) => {
                info!("[CONFIG] Loaded initial config | path: {}", path);
                config
            }
            Err(e) => {
                error!("[CONFIG] Failed to parse {}: {}", path, e);
                error!("[CONFIG] Using default InitialConfig");
                InitialConfig::default()
            }
        },
        Err(e) => {
            error!("[CONFIG] Failed to read {}: {}", path, e);
            error!("[CONFIG] Using default InitialConfig");
            InitialConfig::default()
        }
    }
}

fn load_initial_config(mut commands: Commands) {
    commands.insert_resource(read_initial_config(INITIAL_CONFIG_PATH));
}

fn setup_diagnostics_config(mut commands: Commands, asset_server: Res<AssetServer>) {
    let handle = asset_server.load("diagnostics.ron");
    commands.insert_resource(DiagnosticsConfigHandle(handle));
}

fn apply_diagnostics_config(
    handle: Res<DiagnosticsConfigHandle>,
    assets: Res<Assets<DiagnosticsConfig>>,
    mut events: MessageReader<AssetEvent<DiagnosticsConfig>>,
    mut current: ResMut<DiagnosticsConfig>,
) {
    for event in events.read() {
        if event.is_modified(handle.0.id()) || event.is_loaded_with_dependencies(handle.0.id()) {
            if let Some(config) = assets.get(&handle.0) {
                info!("[CONFIG] Diagnostics config loaded/updated");
                *current = config.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_fills_defaults() {
        let parsed: InitialConfig = ron::from_str("(map_width: 64, allow_pushing_enemy_units: true)").unwrap();
        assert_eq!(parsed.map_width, 64);
        assert!(parsed.allow_pushing_enemy_units);
        assert_eq!(parsed.quad_size, 128);
        assert_eq!(parsed.move_classes.len(), 1);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = read_initial_config("does/not/exist.ron");
        assert_eq!(config, InitialConfig::default());
    }

    #[test]
    fn test_move_class_conversion_sanitizes() {
        let raw = MoveClassConfig { turn_rate: 0, acc_rate: 0.0, mass: 0.0, ..Default::default() };
        let mc = raw.to_move_class();
        assert_eq!(mc.turn_rate, 1);
        assert!(mc.acc_rate >= FixedNum::from_num(0.01));
        assert_eq!(mc.mass, FixedNum::ONE);
        assert_eq!(mc.max_speed, FixedNum::from_num(2));
    }
}
