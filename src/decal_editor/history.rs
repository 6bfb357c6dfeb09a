//! Linear undo/redo over whole-document snapshots.
//!
//! `entries[0]` is the empty floor state. Pushing after an undo drops the
//! redo tail and nothing else.

use crate::decal_editor::decal::{Decal, DecalId};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryEntry {
    pub decals: Vec<Decal>,
    pub selected: Option<DecalId>,
}

impl HistoryEntry {
    pub fn new(decals: Vec<Decal>, selected: Option<DecalId>) -> Self {
        Self { decals, selected }
    }
}

#[derive(Debug, Clone)]
pub struct History {
    entries: Vec<HistoryEntry>,
    index: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl History {
    pub fn new() -> Self {
        Self {
            entries: vec![HistoryEntry::default()],
            index: 0,
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.truncate(self.index + 1);
        self.entries.push(entry);
        self.index = self.entries.len() - 1;
    }

    pub fn undo(&mut self) -> Option<&HistoryEntry> {
        if self.index == 0 {
            return None;
        }
        self.index -= 1;
        Some(&self.entries[self.index])
    }

    pub fn redo(&mut self) -> Option<&HistoryEntry> {
        if self.index + 1 >= self.entries.len() {
            return None;
        }
        self.index += 1;
        Some(&self.entries[self.index])
    }

    pub fn current(&self) -> &HistoryEntry {
        &self.entries[self.index]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.entries.len()
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decal_editor::decal::{
        DecalColor, DecalIdAllocator, DecalKind, DecalSpec, MeshKey, create,
    };
    use bevy::math::Vec3;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn entry_with(ids: &mut DecalIdAllocator, previous: &HistoryEntry) -> HistoryEntry {
        let decal = create(
            ids,
            DecalSpec {
                kind: DecalKind::Text,
                content: "X".to_string(),
                position: Vec3::ZERO,
                rotation: Vec3::ZERO,
                base_size: 1.0,
                mesh: MeshKey::new("Body"),
                color: DecalColor::DEFAULT,
            },
        );
        let selected = Some(decal.id);
        let mut decals = previous.decals.clone();
        decals.push(decal);
        HistoryEntry::new(decals, selected)
    }

    #[test]
    fn starts_at_floor() {
        let history = History::new();
        assert_eq!(history.len(), 1);
        assert_eq!(history.index(), 0);
        assert_eq!(history.current(), &HistoryEntry::default());
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn boundaries_are_noops() {
        let mut history = History::new();
        assert!(history.undo().is_none());
        assert!(history.redo().is_none());
        assert_eq!(history.index(), 0);

        let mut ids = DecalIdAllocator::default();
        let entry = entry_with(&mut ids, history.current());
        history.push(entry);
        assert!(history.redo().is_none());
        assert_eq!(history.index(), 1);
    }

    #[test]
    fn floor_survives_repeated_undo() {
        let mut history = History::new();
        let mut ids = DecalIdAllocator::default();
        for _ in 0..3 {
            let entry = entry_with(&mut ids, history.current());
            history.push(entry);
        }
        for _ in 0..10 {
            history.undo();
        }
        assert_eq!(history.index(), 0);
        assert_eq!(history.len(), 4);
        assert!(history.current().decals.is_empty());
    }

    proptest! {
        #[test]
        fn n_creates_then_n_undos_round_trip(n in 1usize..24) {
            let mut history = History::new();
            let mut ids = DecalIdAllocator::default();
            for _ in 0..n {
                let entry = entry_with(&mut ids, history.current());
                history.push(entry);
            }
            let newest = history.current().clone();

            for _ in 0..n {
                prop_assert!(history.undo().is_some());
            }
            prop_assert!(history.current().decals.is_empty());
            prop_assert_eq!(history.current().selected, None);

            for _ in 0..n {
                prop_assert!(history.redo().is_some());
            }
            prop_assert_eq!(history.current(), &newest);
        }

        #[test]
        fn push_after_undo_drops_exactly_the_redo_tail(len in 2usize..16, back in 1usize..15) {
            let mut history = History::new();
            let mut ids = DecalIdAllocator::default();
            while history.len() < len {
                let entry = entry_with(&mut ids, history.current());
                history.push(entry);
            }
            let back = back.min(history.index());
            for _ in 0..back {
                history.undo();
            }
            let i = history.index();
            prop_assert!(i < history.len() - 1);

            // one more undo when possible, then a fresh push
            let i = if history.undo().is_some() { i - 1 } else { i };
            let entry = entry_with(&mut ids, history.current());
            history.push(entry);
            prop_assert_eq!(history.len(), i + 2);
            prop_assert_eq!(history.index(), i + 1);
            prop_assert!(!history.can_redo());
        }
    }
}
