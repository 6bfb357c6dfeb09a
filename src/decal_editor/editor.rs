use crate::decal_editor::camera::{
    MouseCaptureState, OrbitCameraState, UiInteractionState, orbit_camera_system,
    sync_mouse_capture, update_camera_viewport,
};
use crate::decal_editor::jobs::{
    FileJobs, RasterQueue, RasterSources, TextureCache, poll_file_jobs, poll_raster_results,
    start_requested_export,
};
use crate::decal_editor::scene::{
    MeshRegistry, SceneBounds, clear_model_after_reset, prepare_loaded_model,
};
use crate::decal_editor::state::load_initial_state;
use crate::decal_editor::ui::ui_system;
use crate::decal_editor::viewport::{
    PointerState, draw_grid_system, draw_selection_outline, keyboard_shortcuts_system,
    pointer_input_system, setup_editor_scene, sync_decal_visuals, sync_wireframe,
};
use bevy::pbr::wireframe::WireframePlugin;
use bevy::prelude::*;
use bevy::render::RenderPlugin;
use bevy::render::settings::{WgpuFeatures, WgpuSettings};
use bevy::window::{PresentMode, Window, WindowPlugin};
use bevy_egui::{EguiPlugin, EguiPrimaryContextPass};

pub fn run() {
    let state = load_initial_state();
    let sources = RasterSources::from_settings(&state.settings);
    let resolution = (state.settings.window_width, state.settings.window_height);

    App::new()
        .insert_non_send_resource(RasterQueue::start(&sources))
        .insert_non_send_resource(FileJobs::default())
        .insert_resource(sources)
        .insert_resource(state)
        .insert_resource(OrbitCameraState::default())
        .insert_resource(UiInteractionState::default())
        .insert_resource(MouseCaptureState::default())
        .insert_resource(PointerState::default())
        .insert_resource(MeshRegistry::default())
        .insert_resource(SceneBounds::default())
        .insert_resource(TextureCache::default())
        .add_plugins(
            DefaultPlugins
                .set(WindowPlugin {
                    primary_window: Some(Window {
                        title: "Decal Studio".to_string(),
                        resolution: resolution.into(),
                        present_mode: PresentMode::AutoVsync,
                        ..Default::default()
                    }),
                    ..Default::default()
                })
                .set(RenderPlugin {
                    render_creation: WgpuSettings {
                        features: WgpuFeatures::POLYGON_MODE_LINE,
                        ..Default::default()
                    }
                    .into(),
                    ..Default::default()
                }),
        )
        .add_plugins(WireframePlugin::default())
        .add_plugins(EguiPlugin::default())
        .add_systems(Startup, setup_editor_scene)
        .add_systems(
            Update,
            (
                poll_file_jobs,
                prepare_loaded_model,
                clear_model_after_reset,
                keyboard_shortcuts_system,
                pointer_input_system,
                start_requested_export,
                poll_raster_results,
                sync_decal_visuals,
            )
                .chain(),
        )
        .add_systems(Update, update_camera_viewport)
        .add_systems(Update, sync_mouse_capture)
        .add_systems(Update, orbit_camera_system.after(pointer_input_system))
        .add_systems(Update, sync_wireframe.after(prepare_loaded_model))
        .add_systems(Update, (draw_grid_system, draw_selection_outline))
        .add_systems(EguiPrimaryContextPass, ui_system)
        .run();
}
