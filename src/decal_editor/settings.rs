use crate::decal_editor::SETTINGS_PATH;
use crate::decal_editor::decal::DecalColor;
use crate::decal_editor::raster::DEFAULT_RASTER_SIZE;
use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: ron::error::SpannedError,
    },
}

/// Read-only editor tuning. The file is optional and never written back.
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorSettings {
    pub window_width: u32,
    pub window_height: u32,
    pub raster_size: u32,
    pub preferred_font: PathBuf,
    pub fallback_fonts: Vec<PathBuf>,
    /// New decal edge length as a fraction of the model's largest extent.
    pub base_size_ratio: f32,
    /// Duplicate offset along local X as a fraction of the model's largest extent.
    pub duplicate_offset_ratio: f32,
    pub default_text: String,
    pub default_color: String,
    pub color_swatches: Vec<String>,
    pub upload_dir: PathBuf,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            window_width: 1400,
            window_height: 900,
            raster_size: DEFAULT_RASTER_SIZE,
            preferred_font: PathBuf::from("assets/fonts/PlusJakartaSans-ExtraBold.ttf"),
            fallback_fonts: vec![
                PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf"),
                PathBuf::from("/usr/share/fonts/TTF/DejaVuSans-Bold.ttf"),
                PathBuf::from("/System/Library/Fonts/Supplemental/Arial Bold.ttf"),
                PathBuf::from("C:\\Windows\\Fonts\\arialbd.ttf"),
            ],
            base_size_ratio: 0.15,
            duplicate_offset_ratio: 0.05,
            default_text: "BRAND NAME".to_string(),
            default_color: DecalColor::DEFAULT.to_hex(),
            color_swatches: [
                "#3b82f6", "#ef4444", "#22c55e", "#f59e0b", "#8b5cf6", "#ec4899", "#ffffff",
                "#000000", "#71717a",
            ]
            .iter()
            .map(|hex| hex.to_string())
            .collect(),
            upload_dir: PathBuf::from("uploads"),
        }
    }
}

impl EditorSettings {
    pub fn text_color(&self) -> DecalColor {
        DecalColor::parse_hex(&self.default_color).unwrap_or_default()
    }

    pub fn swatches(&self) -> Vec<DecalColor> {
        self.color_swatches
            .iter()
            .filter_map(|hex| DecalColor::parse_hex(hex))
            .collect()
    }
}

pub fn load_settings(path: &Path) -> Result<EditorSettings, SettingsError> {
    if !path.exists() {
        return Ok(EditorSettings::default());
    }
    let text = fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ron::de::from_str::<EditorSettings>(&text).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_initial_settings() -> EditorSettings {
    let path = Path::new(SETTINGS_PATH);
    match load_settings(path) {
        Ok(settings) => {
            info!("editor settings loaded from {}", path.display());
            settings
        }
        Err(err) => {
            warn!("falling back to built-in editor settings: {err}");
            EditorSettings::default()
        }
    }
}
