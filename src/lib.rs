pub mod decal_editor;
