use crate::decal_editor::decal::{DecalId, MeshKey};
use crate::decal_editor::resolver::{Placement, resolve_placement};
use bevy::math::{Affine3A, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolMode {
    #[default]
    Select,
    PlaceText,
    PlaceLogo,
}

impl ToolMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Select => "Pick",
            Self::PlaceText => "Text",
            Self::PlaceLogo => "Asset",
        }
    }

    pub fn is_placement(self) -> bool {
        !matches!(self, Self::Select)
    }
}

/// A ray hit on model geometry, in world space.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceHit {
    pub point: Vec3,
    pub normal: Vec3,
    pub mesh: MeshKey,
    pub mesh_world: Affine3A,
}

impl SurfaceHit {
    pub fn resolve(&self) -> Placement {
        resolve_placement(self.point, self.normal, &self.mesh_world)
    }
}

/// What the pointer landed on. Mirrored instances never show up here.
#[derive(Debug, Clone, PartialEq)]
pub enum PointerTarget {
    Surface(SurfaceHit),
    Decal(DecalId),
    Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragSession {
    pub decal: DecalId,
    pub moves: u32,
}

/// Tool mode, review flag and the active drag, if any.
#[derive(Debug, Clone, Default)]
pub struct Interaction {
    pub tool: ToolMode,
    pub review: bool,
    drag: Option<DragSession>,
}

impl Interaction {
    pub fn dragging(&self) -> Option<DecalId> {
        self.drag.map(|drag| drag.decal)
    }

    /// Orbit, pan and zoom stay off while a decal is being dragged.
    pub fn camera_locked(&self) -> bool {
        self.drag.is_some()
    }

    pub fn can_start_drag(&self, target: DecalId, selected: Option<DecalId>) -> bool {
        !self.review
            && self.tool == ToolMode::Select
            && self.drag.is_none()
            && selected == Some(target)
    }

    pub fn begin_drag(&mut self, decal: DecalId) {
        self.drag = Some(DragSession { decal, moves: 0 });
    }

    pub fn record_move(&mut self) {
        if let Some(drag) = self.drag.as_mut() {
            drag.moves += 1;
        }
    }

    pub fn end_drag(&mut self) -> Option<DragSession> {
        self.drag.take()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutKey {
    Z,
    Y,
    Delete,
    Backspace,
    Escape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    Undo,
    Redo,
    Delete,
    Cancel,
}

/// `primary` is Ctrl on Windows/Linux and Cmd on macOS.
pub fn shortcut(key: ShortcutKey, primary: bool, shift: bool) -> Option<Shortcut> {
    match (key, primary, shift) {
        (ShortcutKey::Z, true, false) => Some(Shortcut::Undo),
        (ShortcutKey::Z, true, true) | (ShortcutKey::Y, true, _) => Some(Shortcut::Redo),
        (ShortcutKey::Delete | ShortcutKey::Backspace, false, _) => Some(Shortcut::Delete),
        (ShortcutKey::Escape, _, _) => Some(Shortcut::Cancel),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ShortcutKey::Z, true, false, Some(Shortcut::Undo))]
    #[case(ShortcutKey::Z, true, true, Some(Shortcut::Redo))]
    #[case(ShortcutKey::Y, true, false, Some(Shortcut::Redo))]
    #[case(ShortcutKey::Z, false, false, None)]
    #[case(ShortcutKey::Y, false, false, None)]
    #[case(ShortcutKey::Delete, false, false, Some(Shortcut::Delete))]
    #[case(ShortcutKey::Backspace, false, false, Some(Shortcut::Delete))]
    #[case(ShortcutKey::Escape, false, false, Some(Shortcut::Cancel))]
    fn maps_shortcuts(
        #[case] key: ShortcutKey,
        #[case] primary: bool,
        #[case] shift: bool,
        #[case] expected: Option<Shortcut>,
    ) {
        assert_eq!(shortcut(key, primary, shift), expected);
    }

    #[test]
    fn drag_requires_selected_decal_in_select_mode() {
        let mut ids = crate::decal_editor::decal::DecalIdAllocator::default();
        let a = ids.allocate();
        let b = ids.allocate();
        let mut interaction = Interaction::default();

        assert!(interaction.can_start_drag(a, Some(a)));
        assert!(!interaction.can_start_drag(a, Some(b)));
        assert!(!interaction.can_start_drag(a, None));

        interaction.tool = ToolMode::PlaceText;
        assert!(!interaction.can_start_drag(a, Some(a)));

        interaction.tool = ToolMode::Select;
        interaction.review = true;
        assert!(!interaction.can_start_drag(a, Some(a)));
    }

    #[test]
    fn drag_locks_camera_until_released() {
        let mut ids = crate::decal_editor::decal::DecalIdAllocator::default();
        let a = ids.allocate();
        let mut interaction = Interaction::default();
        interaction.begin_drag(a);
        interaction.record_move();
        assert!(interaction.camera_locked());
        assert_eq!(interaction.dragging(), Some(a));

        let session = interaction.end_drag().expect("drag was active");
        assert_eq!(session.moves, 1);
        assert!(!interaction.camera_locked());
    }
}
