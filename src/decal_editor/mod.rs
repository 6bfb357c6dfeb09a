pub mod camera;
pub mod decal;
pub mod editor;
pub mod export;
pub mod history;
pub mod interaction;
pub mod jobs;
pub mod mirror;
pub mod raster;
pub mod resolver;
pub mod scene;
pub mod settings;
pub mod state;
pub mod ui;
pub mod viewport;

pub const SETTINGS_PATH: &str = "config/decal_studio.ron";
pub const ASSETS_DIR: &str = "assets";
pub const GRID_EXTENT_UNITS: i32 = 10;
pub const GRID_MAJOR_STEP_UNITS: i32 = 5;
pub const DEFAULT_CAMERA_YAW_DEG: f32 = 35.0;
pub const DEFAULT_CAMERA_PITCH_DEG: f32 = -18.0;
/// Depth bias for decal quads so they win depth ties with the surface below.
pub const DECAL_DEPTH_BIAS: f32 = 8.0;
