use crate::decal_editor::camera::{OrbitCameraState, UiInteractionState, ZOOM_IN_STEP, ZOOM_OUT_STEP};
use crate::decal_editor::decal::{Decal, DecalColor, DecalId, DecalKind, DecalPatch};
use crate::decal_editor::interaction::ToolMode;
use crate::decal_editor::jobs::{FileJobs, spawn_model_import};
use crate::decal_editor::scene::SceneBounds;
use crate::decal_editor::state::{EditorAction, EditorState};
use bevy::math::Vec3;
use bevy::prelude::{NonSendMut, Res, ResMut};
use bevy_egui::{EguiContexts, egui};
use std::f32::consts::PI;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp"];
const SIZE_RANGE: (f32, f32) = (0.01, 1.5);
const OPACITY_RANGE: (f32, f32) = (0.1, 1.0);

pub fn ui_system(
    mut contexts: EguiContexts,
    mut state: ResMut<EditorState>,
    mut jobs: NonSendMut<FileJobs>,
    mut ui_state: ResMut<UiInteractionState>,
    mut orbit: ResMut<OrbitCameraState>,
    scene_bounds: Res<SceneBounds>,
) {
    let Ok(ctx) = contexts.ctx_mut() else {
        return;
    };

    egui::TopBottomPanel::top("decal_studio_top_bar").show(ctx, |ui| {
        ui.horizontal_wrapped(|ui| {
            ui.heading("Decal Studio");
            ui.separator();

            if ui
                .add_enabled(!jobs.running, egui::Button::new("Load Model"))
                .clicked()
            {
                if let Some(path) = rfd::FileDialog::new()
                    .add_filter("glTF binary", &["glb"])
                    .set_title("Load model")
                    .pick_file()
                {
                    if let Err(err) = spawn_model_import(&mut state, &mut jobs, path) {
                        state.status = err;
                    }
                }
            }

            let editing = !state.interaction.review;
            if ui
                .add_enabled(editing && state.history().can_undo(), egui::Button::new("Undo"))
                .clicked()
            {
                state.dispatch(EditorAction::Undo);
            }
            if ui
                .add_enabled(editing && state.history().can_redo(), egui::Button::new("Redo"))
                .clicked()
            {
                state.dispatch(EditorAction::Redo);
            }

            let mut review = state.interaction.review;
            if ui.toggle_value(&mut review, "Review").changed() {
                state.dispatch(EditorAction::SetReviewMode(review));
            }

            if ui
                .add_enabled(
                    state.model.is_some() && !jobs.running,
                    egui::Button::new("Export GLB"),
                )
                .clicked()
            {
                if let Some(path) = rfd::FileDialog::new()
                    .add_filter("glTF binary", &["glb"])
                    .set_title("Export scene")
                    .set_file_name(default_export_name())
                    .save_file()
                {
                    state.export_request = Some(path);
                }
            }

            if ui.button("Reset").clicked() {
                state.dispatch(EditorAction::Reset);
            }

            ui.toggle_value(&mut state.view.sidebar_visible, "Sidebar");

            ui.separator();
            ui.label(format!("Status: {}", state.status));
            if jobs.running || state.loading {
                ui.spinner();
            }
        });
    });

    let side_panel_width = if state.view.sidebar_visible {
        let response = egui::SidePanel::left("decal_studio_tools")
            .resizable(true)
            .default_width(280.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    if !state.interaction.review {
                        tools_section(ui, &mut state);
                        ui.separator();
                        layers_section(ui, &mut state);
                        ui.separator();
                    }
                    view_section(ui, &mut state, &mut orbit, &scene_bounds);
                });
            });
        response.response.rect.width()
    } else {
        0.0
    };

    let selected = state
        .selected_decal()
        .filter(|_| !state.interaction.review)
        .cloned();
    let inspector_width = match selected {
        Some(decal) => {
            egui::SidePanel::right("decal_studio_inspector")
                .resizable(true)
                .default_width(300.0)
                .show(ctx, |ui| inspector(ui, &mut state, &decal))
                .response
                .rect
                .width()
        }
        None => 0.0,
    };

    if state.interaction.tool.is_placement() && !state.interaction.review {
        placement_banner(ctx, &mut state);
    }

    // Sliders, pickers and text fields edit live; the gesture is committed
    // once nothing is being dragged or typed into.
    let settled = !ctx.is_using_pointer() && !ctx.wants_keyboard_input();
    if settled && state.interaction.dragging().is_none() && state.has_pending_edits() {
        state.dispatch(EditorAction::CommitEdits);
    }

    ui_state.wants_pointer_input = ctx.wants_pointer_input() || ctx.is_pointer_over_area();
    ui_state.wants_keyboard_input = ctx.wants_keyboard_input();
    ui_state.side_panel_width = side_panel_width;
    ui_state.inspector_width = inspector_width;
}

fn tools_section(ui: &mut egui::Ui, state: &mut EditorState) {
    ui.heading("Tools");
    let has_model = state.model.is_some();
    ui.horizontal(|ui| {
        for tool in [ToolMode::Select, ToolMode::PlaceText] {
            let active = state.interaction.tool == tool;
            if ui
                .add_enabled(has_model, egui::Button::new(tool.label()).selected(active))
                .clicked()
            {
                state.dispatch(EditorAction::SetTool(tool));
            }
        }

        let active = state.interaction.tool == ToolMode::PlaceLogo;
        if ui
            .add_enabled(has_model, egui::Button::new(ToolMode::PlaceLogo.label()).selected(active))
            .clicked()
        {
            match pick_image("Choose image") {
                Some(path) => {
                    state.dispatch(EditorAction::SetPendingLogo(path));
                }
                None if state.pending_logo.is_some() => {
                    state.dispatch(EditorAction::SetTool(ToolMode::PlaceLogo));
                }
                None => {}
            }
        }
    });

    ui.label("New text");
    let mut text = state.pending_text.clone();
    if ui.text_edit_singleline(&mut text).changed() {
        state.dispatch(EditorAction::SetPendingText(text));
    }
    if !has_model {
        ui.small("Load a model to start placing decals.");
    }
}

fn layers_section(ui: &mut egui::Ui, state: &mut EditorState) {
    ui.heading(format!("Layers ({})", state.decals().len()));
    if state.decals().is_empty() {
        ui.small("No decals yet.");
        return;
    }

    let rows: Vec<(DecalId, String, bool)> = state
        .decals()
        .iter()
        .map(|decal| (decal.id, decal.label(), decal.visible))
        .collect();
    let selected = state.selected();

    for (id, label, visible) in rows {
        ui.horizontal(|ui| {
            let mut shown = visible;
            if ui.checkbox(&mut shown, "").on_hover_text("Visible").changed() {
                let patch = DecalPatch {
                    visible: Some(shown),
                    ..Default::default()
                };
                state.dispatch(EditorAction::Edit(id, patch));
            }
            if ui.selectable_label(selected == Some(id), label).clicked() {
                state.dispatch(EditorAction::Select(Some(id)));
            }
            if ui.small_button("Delete").clicked() {
                state.dispatch(EditorAction::Remove(id));
            }
        });
    }
}

fn view_section(
    ui: &mut egui::Ui,
    state: &mut EditorState,
    orbit: &mut OrbitCameraState,
    scene_bounds: &SceneBounds,
) {
    ui.heading("View");
    ui.horizontal(|ui| {
        ui.checkbox(&mut state.view.show_grid, "Grid");
        ui.checkbox(&mut state.view.auto_rotate, "Auto-rotate");
        ui.checkbox(&mut state.view.wireframe, "Wireframe");
    });
    ui.horizontal(|ui| {
        if ui.button("Zoom In").clicked() {
            orbit.zoom(ZOOM_IN_STEP);
        }
        if ui.button("Zoom Out").clicked() {
            orbit.zoom(ZOOM_OUT_STEP);
        }
        if ui.button("Reset View").clicked() {
            if scene_bounds.0.is_some() {
                state.request_center_view = true;
            } else {
                *orbit = OrbitCameraState::default();
            }
        }
    });
    ui.small("RMB rotate, MMB pan, wheel zoom. Drag a selected decal to move it.");
}

fn inspector(ui: &mut egui::Ui, state: &mut EditorState, decal: &Decal) {
    let id = decal.id;
    ui.heading(decal.kind.label());
    ui.separator();

    match decal.kind {
        DecalKind::Text => {
            ui.label("Text");
            let mut content = decal.content.clone();
            if ui.text_edit_singleline(&mut content).changed() {
                state.dispatch(EditorAction::PreviewEdit(id, DecalPatch::content(content)));
            }

            ui.label("Color");
            ui.horizontal_wrapped(|ui| {
                for swatch in state.settings.swatches() {
                    let [r, g, b] = swatch.0;
                    let button = egui::Button::new("")
                        .fill(egui::Color32::from_rgb(r, g, b))
                        .min_size(egui::vec2(20.0, 20.0))
                        .selected(swatch == decal.color);
                    if ui.add(button).on_hover_text(swatch.to_hex()).clicked() {
                        state.dispatch(EditorAction::Edit(id, DecalPatch::color(swatch)));
                    }
                }
                let mut rgb = decal.color.0;
                if ui.color_edit_button_srgb(&mut rgb).changed() {
                    state.dispatch(EditorAction::PreviewEdit(id, DecalPatch::color(DecalColor(rgb))));
                }
            });
        }
        DecalKind::Logo => {
            ui.label(decal.label());
            if ui.button("Replace Image").clicked() {
                if let Some(path) = pick_image("Replace image") {
                    state.dispatch(EditorAction::Edit(id, DecalPatch::content(path)));
                }
            }
        }
    }

    ui.separator();
    let model_scale = state.model_scale();
    let mut size = decal.size();
    let size_range = model_scale * SIZE_RANGE.0..=model_scale * SIZE_RANGE.1;
    if ui
        .add(egui::Slider::new(&mut size, size_range).text("Size"))
        .changed()
    {
        let patch = DecalPatch {
            scale: Some(Vec3::splat(size)),
            ..Default::default()
        };
        state.dispatch(EditorAction::PreviewEdit(id, patch));
    }

    let mut roll = decal.rotation.z;
    if ui
        .add(egui::Slider::new(&mut roll, -PI..=PI).text("Rotation"))
        .changed()
    {
        let patch = DecalPatch {
            rotation: Some(Vec3::new(decal.rotation.x, decal.rotation.y, roll)),
            ..Default::default()
        };
        state.dispatch(EditorAction::PreviewEdit(id, patch));
    }

    let mut opacity = decal.opacity;
    if ui
        .add(egui::Slider::new(&mut opacity, OPACITY_RANGE.0..=OPACITY_RANGE.1).text("Opacity"))
        .changed()
    {
        let patch = DecalPatch {
            opacity: Some(opacity),
            ..Default::default()
        };
        state.dispatch(EditorAction::PreviewEdit(id, patch));
    }

    let mut mirror = decal.mirror;
    if ui.checkbox(&mut mirror, "Mirror across X").changed() {
        let patch = DecalPatch {
            mirror: Some(mirror),
            ..Default::default()
        };
        state.dispatch(EditorAction::Edit(id, patch));
    }

    ui.separator();
    ui.horizontal(|ui| {
        if ui.button("Duplicate").clicked() {
            state.dispatch(EditorAction::Duplicate(id));
        }
        if ui.button("Delete").clicked() {
            state.dispatch(EditorAction::Remove(id));
        }
    });
    ui.small(format!("On mesh: {}", decal.mesh));
}

fn placement_banner(ctx: &egui::Context, state: &mut EditorState) {
    let message = match state.interaction.tool {
        ToolMode::PlaceLogo => "Click on the model to place the image",
        _ => "Click on the model to place text",
    };
    egui::Area::new(egui::Id::new("decal_studio_placement_banner"))
        .anchor(egui::Align2::CENTER_TOP, egui::vec2(0.0, 48.0))
        .show(ctx, |ui| {
            egui::Frame::popup(ui.style()).show(ui, |ui| {
                ui.horizontal(|ui| {
                    ui.label(message);
                    if ui.small_button("Cancel").clicked() {
                        state.dispatch(EditorAction::SetTool(ToolMode::Select));
                    }
                });
            });
        });
}

fn pick_image(title: &str) -> Option<String> {
    rfd::FileDialog::new()
        .add_filter("Images", IMAGE_EXTENSIONS)
        .set_title(title)
        .pick_file()
        .map(|path: PathBuf| path.to_string_lossy().into_owned())
}

pub fn default_export_name() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    format!("decal_studio_export_{millis}.glb")
}
