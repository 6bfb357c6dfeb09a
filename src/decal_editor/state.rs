//! Session state and the one entry point that changes it.
//!
//! Every user action goes through [`EditorState::dispatch`]. Structural edits
//! push exactly one history entry; drags, slider scrubbing and typing update
//! the working document and are committed once when the gesture ends.

use crate::decal_editor::decal::{self, Decal, DecalId, DecalIdAllocator, DecalKind, DecalPatch, DecalSpec};
use crate::decal_editor::history::{History, HistoryEntry};
use crate::decal_editor::interaction::{Interaction, PointerTarget, SurfaceHit, ToolMode};
use crate::decal_editor::settings::{EditorSettings, load_initial_settings};
use bevy::prelude::Resource;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum EditorAction {
    SetTool(ToolMode),
    Click(PointerTarget),
    PointerDown(PointerTarget),
    PointerMove(Option<SurfaceHit>),
    PointerUp,
    Select(Option<DecalId>),
    /// Discrete edit, one history entry.
    Edit(DecalId, DecalPatch),
    /// Live edit, committed later by `CommitEdits`.
    PreviewEdit(DecalId, DecalPatch),
    CommitEdits,
    Remove(DecalId),
    Duplicate(DecalId),
    DeleteSelected { text_input_focused: bool },
    Undo,
    Redo,
    SetReviewMode(bool),
    SetPendingText(String),
    SetPendingLogo(String),
    ModelLoaded { source: String, scale: f32 },
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing changed.
    Ignored,
    /// Working state changed without a history entry.
    Transient,
    /// A history entry was pushed (or undo/redo moved the cursor).
    Committed,
}

#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub source: String,
    pub scale: f32,
}

#[derive(Debug, Clone)]
pub struct ViewOptions {
    pub show_grid: bool,
    pub auto_rotate: bool,
    pub sidebar_visible: bool,
    /// Draws the model meshes as wireframe. Decal quads stay solid.
    pub wireframe: bool,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            show_grid: true,
            auto_rotate: false,
            sidebar_visible: true,
            wireframe: false,
        }
    }
}

#[derive(Resource)]
pub struct EditorState {
    pub settings: EditorSettings,
    decals: Vec<Decal>,
    selected: Option<DecalId>,
    history: History,
    ids: DecalIdAllocator,
    /// Bumped by every reset; imports started before it are stale.
    import_epoch: u64,
    pub interaction: Interaction,
    pub model: Option<LoadedModel>,
    pub pending_text: String,
    pub pending_logo: Option<String>,
    pub view: ViewOptions,
    pub loading: bool,
    pub request_center_view: bool,
    /// Destination picked for an export that has not started yet.
    pub export_request: Option<PathBuf>,
    pub status: String,
}

impl EditorState {
    pub fn new(settings: EditorSettings) -> Self {
        Self {
            pending_text: settings.default_text.clone(),
            settings,
            decals: Vec::new(),
            selected: None,
            history: History::new(),
            ids: DecalIdAllocator::default(),
            import_epoch: 0,
            interaction: Interaction::default(),
            model: None,
            pending_logo: None,
            view: ViewOptions::default(),
            loading: false,
            request_center_view: false,
            export_request: None,
            status: "Load a .glb model to begin".to_string(),
        }
    }

    pub fn decals(&self) -> &[Decal] {
        &self.decals
    }

    pub fn selected(&self) -> Option<DecalId> {
        self.selected
    }

    pub fn selected_decal(&self) -> Option<&Decal> {
        self.selected.and_then(|id| decal::find(&self.decals, id))
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn import_epoch(&self) -> u64 {
        self.import_epoch
    }

    pub fn model_scale(&self) -> f32 {
        self.model.as_ref().map_or(1.0, |model| model.scale)
    }

    /// Live edits that have not been committed to history yet.
    pub fn has_pending_edits(&self) -> bool {
        self.decals != self.history.current().decals
    }

    pub fn snapshot(&self) -> HistoryEntry {
        HistoryEntry::new(self.decals.clone(), self.selected)
    }

    pub fn dispatch(&mut self, action: EditorAction) -> Outcome {
        debug!(?action, "dispatch");
        if self.interaction.review && action_edits(&action) {
            return Outcome::Ignored;
        }

        match action {
            EditorAction::SetTool(tool) => self.set_tool(tool),
            EditorAction::Click(target) => self.click(target),
            EditorAction::PointerDown(target) => self.pointer_down(target),
            EditorAction::PointerMove(hit) => self.pointer_move(hit),
            EditorAction::PointerUp => self.pointer_up(),
            EditorAction::Select(id) => self.select(id),
            EditorAction::Edit(id, patch) => self.edit(id, &patch),
            EditorAction::PreviewEdit(id, patch) => self.preview_edit(id, &patch),
            EditorAction::CommitEdits => self.commit_if_changed(),
            EditorAction::Remove(id) => self.remove(id),
            EditorAction::Duplicate(id) => self.duplicate(id),
            EditorAction::DeleteSelected { text_input_focused } => {
                match self.selected.filter(|_| !text_input_focused) {
                    Some(id) => self.remove(id),
                    None => Outcome::Ignored,
                }
            }
            EditorAction::Undo => self.undo(),
            EditorAction::Redo => self.redo(),
            EditorAction::SetReviewMode(review) => self.set_review(review),
            EditorAction::SetPendingText(text) => {
                self.pending_text = text;
                Outcome::Transient
            }
            EditorAction::SetPendingLogo(reference) => {
                self.pending_logo = Some(reference);
                self.selected = None;
                self.interaction.tool = ToolMode::PlaceLogo;
                self.status = "Click the model to place the image".to_string();
                Outcome::Transient
            }
            EditorAction::ModelLoaded { source, scale } => {
                self.load_model(source, scale);
                Outcome::Committed
            }
            EditorAction::Reset => {
                self.reset();
                Outcome::Committed
            }
        }
    }

    fn set_tool(&mut self, tool: ToolMode) -> Outcome {
        let before = (self.interaction.tool, self.selected);
        self.interaction.tool = tool;
        if tool.is_placement() {
            self.selected = None;
        }
        if before == (self.interaction.tool, self.selected) {
            Outcome::Ignored
        } else {
            Outcome::Transient
        }
    }

    fn click(&mut self, target: PointerTarget) -> Outcome {
        match target {
            PointerTarget::Surface(hit) => self.place(&hit),
            PointerTarget::Decal(id) => self.select(Some(id)),
            PointerTarget::Background => {
                if self.selected.take().is_some() {
                    Outcome::Transient
                } else {
                    Outcome::Ignored
                }
            }
        }
    }

    fn place(&mut self, hit: &SurfaceHit) -> Outcome {
        let (kind, content) = match self.interaction.tool {
            ToolMode::Select => return Outcome::Ignored,
            ToolMode::PlaceText => (DecalKind::Text, self.pending_text.clone()),
            ToolMode::PlaceLogo => match &self.pending_logo {
                Some(reference) => (DecalKind::Logo, reference.clone()),
                None => {
                    self.status = "Choose an image before placing a logo".to_string();
                    return Outcome::Ignored;
                }
            },
        };

        let placement = hit.resolve();
        let spec = DecalSpec {
            kind,
            content,
            position: placement.position,
            rotation: placement.rotation,
            base_size: self.model_scale() * self.settings.base_size_ratio,
            mesh: hit.mesh.clone(),
            color: self.settings.text_color(),
        };
        let created = decal::create(&mut self.ids, spec);
        info!(id = %created.id, mesh = %created.mesh, "placed {} decal", kind.label());
        self.status = format!("Placed {} on {}", kind.label().to_lowercase(), created.mesh);

        let id = created.id;
        let mut decals = self.decals.clone();
        decals.push(created);
        self.interaction.tool = ToolMode::Select;
        self.commit(decals, Some(id))
    }

    fn select(&mut self, id: Option<DecalId>) -> Outcome {
        let id = id.filter(|id| decal::find(&self.decals, *id).is_some());
        // Only the selected decal may be dragged; losing it ends the drag.
        if self.interaction.dragging().is_some_and(|dragged| Some(dragged) != id) {
            self.interaction.end_drag();
            self.commit_if_changed();
        }
        let before = (self.interaction.tool, self.selected);
        self.selected = id;
        if id.is_some() {
            self.interaction.tool = ToolMode::Select;
        }
        if before == (self.interaction.tool, self.selected) {
            Outcome::Ignored
        } else {
            Outcome::Transient
        }
    }

    fn pointer_down(&mut self, target: PointerTarget) -> Outcome {
        let PointerTarget::Decal(id) = target else {
            return Outcome::Ignored;
        };
        if !self.interaction.can_start_drag(id, self.selected) {
            return Outcome::Ignored;
        }
        // Pending slider/text edits get their own entry before the drag starts.
        self.commit_if_changed();
        self.interaction.begin_drag(id);
        Outcome::Transient
    }

    fn pointer_move(&mut self, hit: Option<SurfaceHit>) -> Outcome {
        let (Some(id), Some(hit)) = (self.interaction.dragging(), hit) else {
            return Outcome::Ignored;
        };
        let placement = hit.resolve();
        let patch = DecalPatch::placement(placement.position, placement.rotation, hit.mesh);
        self.decals = decal::update(&self.decals, id, &patch);
        self.interaction.record_move();
        Outcome::Transient
    }

    fn pointer_up(&mut self) -> Outcome {
        match self.interaction.end_drag() {
            Some(session) => {
                debug!(id = %session.decal, moves = session.moves, "drag finished");
                match self.commit_if_changed() {
                    Outcome::Ignored => Outcome::Transient,
                    outcome => outcome,
                }
            }
            None => Outcome::Ignored,
        }
    }

    fn edit(&mut self, id: DecalId, patch: &DecalPatch) -> Outcome {
        let decals = decal::update(&self.decals, id, patch);
        if decals == self.decals && self.decals == self.history.current().decals {
            return Outcome::Ignored;
        }
        self.commit(decals, self.selected)
    }

    fn preview_edit(&mut self, id: DecalId, patch: &DecalPatch) -> Outcome {
        let decals = decal::update(&self.decals, id, patch);
        if decals == self.decals {
            return Outcome::Ignored;
        }
        self.decals = decals;
        Outcome::Transient
    }

    /// Pushes the working document when its decals differ from the current entry.
    fn commit_if_changed(&mut self) -> Outcome {
        if self.decals == self.history.current().decals {
            return Outcome::Ignored;
        }
        self.commit(self.decals.clone(), self.selected)
    }

    fn commit(&mut self, decals: Vec<Decal>, selected: Option<DecalId>) -> Outcome {
        self.decals = decals;
        self.selected = selected;
        self.history.push(self.snapshot());
        Outcome::Committed
    }

    fn remove(&mut self, id: DecalId) -> Outcome {
        if decal::find(&self.decals, id).is_none() {
            return Outcome::Ignored;
        }
        let (decals, selected) = decal::remove(&self.decals, id, self.selected);
        info!(%id, "decal removed");
        self.status = "Decal removed".to_string();
        self.commit(decals, selected)
    }

    fn duplicate(&mut self, id: DecalId) -> Outcome {
        let Some((decals, copy)) = decal::duplicate(
            &self.decals,
            id,
            self.model_scale(),
            self.settings.duplicate_offset_ratio,
            &mut self.ids,
        ) else {
            return Outcome::Ignored;
        };
        info!(source = %id, %copy, "decal duplicated");
        self.status = "Decal duplicated".to_string();
        self.commit(decals, Some(copy))
    }

    fn undo(&mut self) -> Outcome {
        self.interaction.end_drag();
        self.commit_if_changed();
        let Some(entry) = self.history.undo().cloned() else {
            return Outcome::Ignored;
        };
        self.restore(entry);
        self.status = "Undo".to_string();
        Outcome::Committed
    }

    fn redo(&mut self) -> Outcome {
        self.interaction.end_drag();
        if self.commit_if_changed() == Outcome::Committed {
            // A fresh entry just replaced the redo branch.
            return Outcome::Committed;
        }
        let Some(entry) = self.history.redo().cloned() else {
            return Outcome::Ignored;
        };
        self.restore(entry);
        self.status = "Redo".to_string();
        Outcome::Committed
    }

    fn restore(&mut self, entry: HistoryEntry) {
        self.decals = entry.decals;
        self.selected = entry.selected;
    }

    fn set_review(&mut self, review: bool) -> Outcome {
        if self.interaction.review == review {
            return Outcome::Ignored;
        }
        if review {
            self.interaction.end_drag();
            self.commit_if_changed();
            self.interaction.tool = ToolMode::Select;
        }
        self.interaction.review = review;
        self.status = if review { "Review mode" } else { "Design mode" }.to_string();
        Outcome::Transient
    }

    fn load_model(&mut self, source: String, scale: f32) {
        info!(%source, scale, "model ready");
        self.decals.clear();
        self.selected = None;
        self.history.reset();
        self.interaction = Interaction::default();
        self.view.wireframe = false;
        self.model = Some(LoadedModel { source, scale });
        self.loading = false;
        self.request_center_view = true;
        self.status = "Model loaded".to_string();
    }

    fn reset(&mut self) {
        let settings = self.settings.clone();
        let ids = std::mem::take(&mut self.ids);
        let import_epoch = self.import_epoch + 1;
        *self = Self::new(settings);
        self.ids = ids;
        self.import_epoch = import_epoch;
        info!(import_epoch, "session reset");
    }
}

/// Actions that review mode refuses.
fn action_edits(action: &EditorAction) -> bool {
    !matches!(
        action,
        EditorAction::SetReviewMode(_)
            | EditorAction::ModelLoaded { .. }
            | EditorAction::Reset
            | EditorAction::PointerUp
            | EditorAction::PointerMove(_)
    )
}

pub fn load_initial_state() -> EditorState {
    EditorState::new(load_initial_settings())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decal_editor::decal::{DecalColor, MeshKey};
    use bevy::math::{Affine3A, Vec3};
    use pretty_assertions::assert_eq;

    fn hit(x: f32, mesh: &str) -> SurfaceHit {
        SurfaceHit {
            point: Vec3::new(x, 0.5, 0.2),
            normal: Vec3::Z,
            mesh: MeshKey::new(mesh),
            mesh_world: Affine3A::IDENTITY,
        }
    }

    fn loaded() -> EditorState {
        let mut state = EditorState::new(EditorSettings::default());
        state.dispatch(EditorAction::ModelLoaded {
            source: "uploads/test.glb".to_string(),
            scale: 2.0,
        });
        state
    }

    fn place_text(state: &mut EditorState, x: f32) -> DecalId {
        state.dispatch(EditorAction::SetTool(ToolMode::PlaceText));
        assert_eq!(
            state.dispatch(EditorAction::Click(PointerTarget::Surface(hit(x, "Body")))),
            Outcome::Committed
        );
        state.selected().expect("new decal is selected")
    }

    #[test]
    fn placement_returns_to_select_with_new_decal() {
        let mut state = loaded();
        let id = place_text(&mut state, 0.0);
        assert_eq!(state.interaction.tool, ToolMode::Select);
        assert_eq!(state.history().len(), 2);
        let placed = state.selected_decal().expect("placed");
        assert_eq!(placed.id, id);
        assert_eq!(placed.content, "BRAND NAME");
        assert_eq!(placed.scale, Vec3::splat(2.0 * 0.15));
    }

    #[test]
    fn select_mode_surface_click_does_nothing() {
        let mut state = loaded();
        let outcome = state.dispatch(EditorAction::Click(PointerTarget::Surface(hit(0.0, "Body"))));
        assert_eq!(outcome, Outcome::Ignored);
        assert!(state.decals().is_empty());
    }

    #[test]
    fn logo_placement_needs_an_image() {
        let mut state = loaded();
        state.dispatch(EditorAction::SetTool(ToolMode::PlaceLogo));
        let outcome = state.dispatch(EditorAction::Click(PointerTarget::Surface(hit(0.0, "Body"))));
        assert_eq!(outcome, Outcome::Ignored);

        state.dispatch(EditorAction::SetPendingLogo("art/logo.png".to_string()));
        state.dispatch(EditorAction::Click(PointerTarget::Surface(hit(0.0, "Body"))));
        let placed = state.selected_decal().expect("logo placed");
        assert_eq!(placed.kind, DecalKind::Logo);
        assert_eq!(placed.content, "art/logo.png");
    }

    #[test]
    fn switching_to_a_placement_tool_clears_selection() {
        let mut state = loaded();
        place_text(&mut state, 0.0);
        state.dispatch(EditorAction::SetTool(ToolMode::PlaceText));
        assert_eq!(state.selected(), None);
    }

    #[test]
    fn background_click_clears_selection_without_history() {
        let mut state = loaded();
        place_text(&mut state, 0.0);
        let len = state.history().len();
        assert_eq!(
            state.dispatch(EditorAction::Click(PointerTarget::Background)),
            Outcome::Transient
        );
        assert_eq!(state.selected(), None);
        assert_eq!(state.history().len(), len);
    }

    #[test]
    fn drag_pushes_exactly_once() {
        let mut state = loaded();
        let id = place_text(&mut state, 0.0);
        let len = state.history().len();

        assert_eq!(
            state.dispatch(EditorAction::PointerDown(PointerTarget::Decal(id))),
            Outcome::Transient
        );
        assert!(state.interaction.camera_locked());
        for step in 1..=5 {
            state.dispatch(EditorAction::PointerMove(Some(hit(step as f32 * 0.1, "Sleeve"))));
        }
        assert_eq!(state.history().len(), len);

        assert_eq!(state.dispatch(EditorAction::PointerUp), Outcome::Committed);
        assert_eq!(state.history().len(), len + 1);
        assert!(!state.interaction.camera_locked());

        let moved = state.selected_decal().expect("still selected");
        assert_eq!(moved.mesh, MeshKey::new("Sleeve"));
        assert!((moved.position.x - 0.5).abs() < 1.0e-5);
    }

    #[test]
    fn deselecting_mid_drag_ends_the_drag() {
        let mut state = loaded();
        let id = place_text(&mut state, 0.0);
        let len = state.history().len();

        state.dispatch(EditorAction::PointerDown(PointerTarget::Decal(id)));
        state.dispatch(EditorAction::PointerMove(Some(hit(0.3, "Body"))));
        assert_eq!(state.dispatch(EditorAction::Select(None)), Outcome::Transient);
        assert_eq!(state.interaction.dragging(), None);
        assert!(!state.interaction.camera_locked());
        assert_eq!(state.history().len(), len + 1);
        assert!(!state.has_pending_edits());

        let x = state.decals()[0].position.x;
        assert_eq!(
            state.dispatch(EditorAction::PointerMove(Some(hit(0.9, "Body")))),
            Outcome::Ignored
        );
        assert_eq!(state.decals()[0].position.x, x);
        assert_eq!(state.dispatch(EditorAction::PointerUp), Outcome::Ignored);
        assert_eq!(state.history().len(), len + 1);
    }

    #[test]
    fn reselecting_the_dragged_decal_keeps_the_drag() {
        let mut state = loaded();
        let id = place_text(&mut state, 0.0);
        state.dispatch(EditorAction::PointerDown(PointerTarget::Decal(id)));
        state.dispatch(EditorAction::Select(Some(id)));
        assert_eq!(state.interaction.dragging(), Some(id));
    }

    #[test]
    fn wireframe_toggle_resets_with_a_new_model() {
        let mut state = loaded();
        assert!(!state.view.wireframe);
        state.view.wireframe = true;
        place_text(&mut state, 0.0);
        assert!(state.view.wireframe);

        state.dispatch(EditorAction::ModelLoaded {
            source: "uploads/other.glb".to_string(),
            scale: 1.0,
        });
        assert!(!state.view.wireframe);
    }

    #[test]
    fn drag_needs_the_decal_to_be_selected_first() {
        let mut state = loaded();
        let id = place_text(&mut state, 0.0);
        state.dispatch(EditorAction::Click(PointerTarget::Background));
        assert_eq!(
            state.dispatch(EditorAction::PointerDown(PointerTarget::Decal(id))),
            Outcome::Ignored
        );
    }

    #[test]
    fn click_without_move_does_not_push() {
        let mut state = loaded();
        let id = place_text(&mut state, 0.0);
        let len = state.history().len();
        state.dispatch(EditorAction::PointerDown(PointerTarget::Decal(id)));
        assert_eq!(state.dispatch(EditorAction::PointerUp), Outcome::Transient);
        assert_eq!(state.history().len(), len);
    }

    #[test]
    fn preview_edits_commit_once() {
        let mut state = loaded();
        let id = place_text(&mut state, 0.0);
        let len = state.history().len();
        for step in 1..=10 {
            let patch = DecalPatch {
                opacity: Some(1.0 - step as f32 * 0.05),
                ..Default::default()
            };
            state.dispatch(EditorAction::PreviewEdit(id, patch));
        }
        assert_eq!(state.history().len(), len);
        assert!(state.has_pending_edits());
        assert_eq!(state.dispatch(EditorAction::CommitEdits), Outcome::Committed);
        assert_eq!(state.dispatch(EditorAction::CommitEdits), Outcome::Ignored);
        assert!(!state.has_pending_edits());
        assert_eq!(state.history().len(), len + 1);
    }

    #[test]
    fn delete_key_is_guarded() {
        let mut state = loaded();
        place_text(&mut state, 0.0);
        assert_eq!(
            state.dispatch(EditorAction::DeleteSelected { text_input_focused: true }),
            Outcome::Ignored
        );
        assert_eq!(state.decals().len(), 1);
        assert_eq!(
            state.dispatch(EditorAction::DeleteSelected { text_input_focused: false }),
            Outcome::Committed
        );
        assert!(state.decals().is_empty());
        assert_eq!(
            state.dispatch(EditorAction::DeleteSelected { text_input_focused: false }),
            Outcome::Ignored
        );
    }

    #[test]
    fn review_mode_blocks_editing() {
        let mut state = loaded();
        let id = place_text(&mut state, 0.0);
        state.dispatch(EditorAction::SetReviewMode(true));
        let len = state.history().len();

        assert_eq!(
            state.dispatch(EditorAction::Edit(id, DecalPatch::color(DecalColor([0, 0, 0])))),
            Outcome::Ignored
        );
        assert_eq!(state.dispatch(EditorAction::SetTool(ToolMode::PlaceText)), Outcome::Ignored);
        assert_eq!(state.dispatch(EditorAction::PointerDown(PointerTarget::Decal(id))), Outcome::Ignored);
        assert_eq!(state.dispatch(EditorAction::Click(PointerTarget::Background)), Outcome::Ignored);
        assert_eq!(state.dispatch(EditorAction::Undo), Outcome::Ignored);
        assert_eq!(state.history().len(), len);

        state.dispatch(EditorAction::SetReviewMode(false));
        assert_eq!(state.dispatch(EditorAction::Undo), Outcome::Committed);
    }

    #[test]
    fn duplicate_selects_copy() {
        let mut state = loaded();
        let id = place_text(&mut state, 0.0);
        assert_eq!(state.dispatch(EditorAction::Duplicate(id)), Outcome::Committed);
        let copy = state.selected_decal().expect("copy selected");
        assert_ne!(copy.id, id);
        assert!((copy.position.x - 0.1).abs() < 1.0e-5);
    }

    #[test]
    fn model_load_resets_history_but_not_ids() {
        let mut state = loaded();
        let first = place_text(&mut state, 0.0);
        state.dispatch(EditorAction::ModelLoaded {
            source: "uploads/other.glb".to_string(),
            scale: 1.0,
        });
        assert_eq!(state.history().len(), 1);
        assert!(state.decals().is_empty());
        let second = place_text(&mut state, 0.0);
        assert_ne!(first, second);
    }

    #[test]
    fn reset_returns_to_initial_state() {
        let mut state = loaded();
        place_text(&mut state, 0.0);
        state.dispatch(EditorAction::Reset);
        assert!(state.model.is_none());
        assert!(state.decals().is_empty());
        assert_eq!(state.history().len(), 1);
        assert_eq!(state.interaction.tool, ToolMode::Select);
    }

    #[test]
    fn reset_makes_earlier_imports_stale() {
        let mut state = loaded();
        let epoch = state.import_epoch();
        state.loading = true;
        state.dispatch(EditorAction::Reset);
        assert_eq!(state.import_epoch(), epoch + 1);
        assert!(!state.loading);

        state.dispatch(EditorAction::ModelLoaded {
            source: "uploads/next.glb".to_string(),
            scale: 1.0,
        });
        assert_eq!(state.import_epoch(), epoch + 1);
    }

    #[test]
    fn undo_flushes_uncommitted_preview_first() {
        let mut state = loaded();
        let id = place_text(&mut state, 0.0);
        state.dispatch(EditorAction::PreviewEdit(id, DecalPatch::content("typed")));
        assert_eq!(state.dispatch(EditorAction::Undo), Outcome::Committed);
        assert_eq!(state.selected_decal().map(|d| d.content.as_str()), Some("BRAND NAME"));
        assert_eq!(state.dispatch(EditorAction::Redo), Outcome::Committed);
        assert_eq!(state.selected_decal().map(|d| d.content.as_str()), Some("typed"));
    }
}
