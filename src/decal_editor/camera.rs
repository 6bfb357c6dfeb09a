use crate::decal_editor::scene::{ModelBounds, SceneBounds};
use crate::decal_editor::state::EditorState;
use crate::decal_editor::{DEFAULT_CAMERA_PITCH_DEG, DEFAULT_CAMERA_YAW_DEG};
use bevy::camera::Viewport;
use bevy::input::mouse::{AccumulatedMouseMotion, AccumulatedMouseScroll};
use bevy::prelude::*;
use bevy::window::{CursorGrabMode, CursorOptions, PrimaryWindow, Window};
use std::f32::consts::TAU;

/// One full turn every 30 seconds.
const AUTO_ROTATE_SPEED: f32 = TAU / 30.0;
pub const ZOOM_IN_STEP: f32 = 0.8;
pub const ZOOM_OUT_STEP: f32 = 1.25;

#[derive(Component)]
pub struct EditorCamera;

#[derive(Resource, Debug, Clone)]
pub struct OrbitCameraState {
    pub target: Vec3,
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub fov: f32,
}

impl Default for OrbitCameraState {
    fn default() -> Self {
        Self {
            target: Vec3::new(0.0, 0.5, 0.0),
            distance: 4.0,
            yaw: DEFAULT_CAMERA_YAW_DEG.to_radians(),
            pitch: DEFAULT_CAMERA_PITCH_DEG.to_radians(),
            min_distance: 0.1,
            max_distance: 5000.0,
            fov: std::f32::consts::FRAC_PI_4,
        }
    }
}

impl OrbitCameraState {
    /// Looks at the model's center from the front, far enough that its
    /// largest extent fits the vertical field of view.
    pub fn frame(&mut self, bounds: &ModelBounds, aspect: f32) {
        let size = bounds.size();
        let max_dim = size.max_element();
        if max_dim <= 0.0 {
            return;
        }
        let fit = 1.2 / (self.fov * 0.5).tan();
        let aspect_boost = if aspect > 0.0 && aspect < 1.0 { 1.0 / aspect } else { 1.0 };
        let distance = max_dim * fit * aspect_boost;

        self.target = bounds.center();
        self.yaw = 0.0;
        self.pitch = -(size.y * 0.1).atan2(distance);
        self.distance = distance.hypot(size.y * 0.1);
        self.max_distance = self.max_distance.max(self.distance * 4.0);
    }

    /// Scales the orbit distance. Steps that would leave the allowed range are ignored.
    pub fn zoom(&mut self, factor: f32) -> bool {
        let next = self.distance * factor;
        if (factor < 1.0 && next < self.min_distance) || (factor > 1.0 && next > self.max_distance) {
            return false;
        }
        self.distance = next;
        true
    }

    pub fn position(&self) -> Vec3 {
        self.target - camera_forward(self.yaw, self.pitch) * self.distance
    }
}

#[derive(Resource, Default)]
pub struct UiInteractionState {
    pub wants_pointer_input: bool,
    pub wants_keyboard_input: bool,
    pub side_panel_width: f32,
    pub inspector_width: f32,
}

#[derive(Resource, Default)]
pub struct MouseCaptureState {
    pub active: bool,
    pub restore_position: Option<Vec2>,
}

pub fn update_camera_viewport(
    windows: Query<&Window, With<PrimaryWindow>>,
    ui_state: Res<UiInteractionState>,
    mut camera_query: Query<&mut Camera, With<EditorCamera>>,
) {
    let Ok(window) = windows.single() else {
        return;
    };

    let physical_width = window.physical_width();
    let physical_height = window.physical_height().max(1);
    if physical_width == 0 {
        return;
    }

    let scale = window.scale_factor();
    let left_px = (ui_state.side_panel_width.max(0.0) * scale) as u32;
    let right_px = (ui_state.inspector_width.max(0.0) * scale) as u32;
    let viewport_x = left_px.min(physical_width.saturating_sub(1));
    let viewport_width = physical_width
        .saturating_sub(viewport_x)
        .saturating_sub(right_px)
        .max(1);

    let viewport = Some(Viewport {
        physical_position: UVec2::new(viewport_x, 0),
        physical_size: UVec2::new(viewport_width, physical_height),
        depth: 0.0..1.0,
    });

    for mut camera in &mut camera_query {
        camera.viewport = viewport.clone();
    }
}

pub fn orbit_camera_system(
    time: Res<Time>,
    mouse_motion: Res<AccumulatedMouseMotion>,
    mouse_scroll: Res<AccumulatedMouseScroll>,
    mouse_buttons: Res<ButtonInput<MouseButton>>,
    windows: Query<&Window, With<PrimaryWindow>>,
    ui_state: Res<UiInteractionState>,
    scene_bounds: Res<SceneBounds>,
    mut orbit: ResMut<OrbitCameraState>,
    mut state: ResMut<EditorState>,
    mut camera_query: Query<(&mut Transform, &Camera), With<EditorCamera>>,
) {
    let mouse_delta = Vec2::new(mouse_motion.delta.x, -mouse_motion.delta.y);
    let scroll_delta = mouse_scroll.delta.y;

    if state.request_center_view {
        if let Some(bounds) = scene_bounds.0 {
            let aspect = camera_query
                .iter()
                .next()
                .and_then(|(_, camera)| camera.logical_viewport_size())
                .map_or(1.0, |size| size.x / size.y.max(1.0));
            orbit.frame(&bounds, aspect);
        }
        state.request_center_view = false;
    }

    let pointer_in_window = windows
        .single()
        .ok()
        .and_then(|w| w.cursor_position())
        .is_some();
    let navigation_allowed = !state.interaction.camera_locked();
    let can_capture_mouse = pointer_in_window && !ui_state.wants_pointer_input && navigation_allowed;

    if can_capture_mouse {
        if mouse_buttons.pressed(MouseButton::Right) && mouse_delta.length_squared() > 0.0 {
            orbit.yaw -= mouse_delta.x * 0.006;
            orbit.pitch = (orbit.pitch + mouse_delta.y * 0.006).clamp(-1.45, 1.45);
        }

        if mouse_buttons.pressed(MouseButton::Middle) && mouse_delta.length_squared() > 0.0 {
            let forward = camera_forward(orbit.yaw, orbit.pitch);
            let mut right = forward.cross(Vec3::Y);
            if right.length_squared() < 1e-6 {
                right = Vec3::X;
            }
            right = right.normalize();
            let up = right.cross(forward).normalize_or_zero();

            let pan_scale = orbit.distance * 0.0018;
            orbit.target += (-mouse_delta.x * right + mouse_delta.y * up) * pan_scale;
        }

        if scroll_delta.abs() > f32::EPSILON {
            let zoom_factor = (1.0 - scroll_delta * 0.10).clamp(0.2, 5.0);
            orbit.distance =
                (orbit.distance * zoom_factor).clamp(orbit.min_distance, orbit.max_distance);
        }
    }

    if state.view.auto_rotate && navigation_allowed {
        orbit.yaw += AUTO_ROTATE_SPEED * time.delta_secs();
    }

    let camera_position = orbit.position();
    for (mut transform, _) in &mut camera_query {
        *transform = Transform::from_translation(camera_position).looking_at(orbit.target, Vec3::Y);
    }
}

pub fn sync_mouse_capture(
    mouse_buttons: Res<ButtonInput<MouseButton>>,
    ui_state: Res<UiInteractionState>,
    state: Res<EditorState>,
    mut capture_state: ResMut<MouseCaptureState>,
    mut window_query: Query<(&mut Window, &mut CursorOptions), With<PrimaryWindow>>,
) {
    let Ok((mut window, mut cursor_options)) = window_query.single_mut() else {
        return;
    };

    let interaction_pressed =
        mouse_buttons.pressed(MouseButton::Right) || mouse_buttons.pressed(MouseButton::Middle);
    let pointer_in_window = window.cursor_position().is_some();
    let should_capture = window.focused
        && interaction_pressed
        && pointer_in_window
        && !ui_state.wants_pointer_input
        && !state.interaction.camera_locked();

    if should_capture {
        if !capture_state.active {
            capture_state.restore_position = window.cursor_position();
            capture_state.active = true;
        }
        cursor_options.visible = false;
        cursor_options.grab_mode = CursorGrabMode::Locked;
    } else {
        if capture_state.active {
            if let Some(pos) = capture_state.restore_position.take() {
                window.set_cursor_position(Some(pos));
            }
        }
        capture_state.active = false;
        cursor_options.visible = true;
        cursor_options.grab_mode = CursorGrabMode::None;
    }
}

/// Y-up viewing direction; yaw 0 looks down -Z.
fn camera_forward(yaw: f32, pitch: f32) -> Vec3 {
    Vec3::new(
        -yaw.sin() * pitch.cos(),
        pitch.sin(),
        -yaw.cos() * pitch.cos(),
    )
    .normalize_or_zero()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_box() -> ModelBounds {
        ModelBounds {
            min: Vec3::new(-0.5, 0.0, -0.5),
            max: Vec3::new(0.5, 1.0, 0.5),
        }
    }

    #[test]
    fn framing_centers_and_backs_off() {
        let mut orbit = OrbitCameraState::default();
        orbit.frame(&unit_box(), 1.5);
        assert_eq!(orbit.target, Vec3::new(0.0, 0.5, 0.0));
        let expected = 1.2 / (std::f32::consts::FRAC_PI_8).tan();
        let position = orbit.position();
        assert_relative_eq!(position.z, expected, epsilon = 1.0e-4);
        assert_relative_eq!(position.y, 0.5 + 0.1, epsilon = 1.0e-4);
        assert_relative_eq!(position.x, 0.0, epsilon = 1.0e-4);
    }

    #[test]
    fn portrait_viewport_backs_off_further() {
        let mut wide = OrbitCameraState::default();
        wide.frame(&unit_box(), 1.5);
        let mut tall = OrbitCameraState::default();
        tall.frame(&unit_box(), 0.5);
        assert!(tall.distance > wide.distance * 1.9);
    }

    #[test]
    fn zoom_steps_respect_limits() {
        let mut orbit = OrbitCameraState {
            distance: 1.0,
            min_distance: 0.9,
            max_distance: 1.2,
            ..Default::default()
        };
        assert!(!orbit.zoom(ZOOM_IN_STEP));
        assert_relative_eq!(orbit.distance, 1.0);
        assert!(orbit.zoom(ZOOM_OUT_STEP * 0.9));
        assert!(!orbit.zoom(ZOOM_OUT_STEP));
    }

    #[test]
    fn forward_is_y_up() {
        assert_relative_eq!(camera_forward(0.0, 0.0).z, -1.0);
        assert!(camera_forward(0.0, -0.3).y < 0.0);
    }
}
