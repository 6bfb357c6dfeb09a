//! Decal content → square RGBA buffer.
//!
//! A raster depends only on [`RasterKey`]; moving, scaling or re-targeting a
//! decal never requires a new one. Failures are logged and produce a
//! transparent buffer.

use crate::decal_editor::decal::{Decal, DecalColor, DecalKind};
use ab_glyph::{Font, FontArc, GlyphId, PxScale, ScaleFont, point};
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_RASTER_SIZE: u32 = 1024;
/// Glyph height relative to the buffer edge (180px on a 1024px canvas).
const TEXT_HEIGHT_RATIO: f32 = 180.0 / 1024.0;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("failed to read font {path}: {source}")]
    FontIo {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path} is not a usable font face")]
    FontInvalid { path: PathBuf },
    #[error("failed to load image {reference}: {source}")]
    Image {
        reference: String,
        source: image::ImageError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RasterKey {
    pub kind: DecalKind,
    pub content: String,
    pub color: DecalColor,
    pub mirrored: bool,
}

impl RasterKey {
    pub fn for_decal(decal: &Decal, mirrored: bool) -> Self {
        // Logos ignore color, so a recolor must not invalidate their raster.
        let color = match decal.kind {
            DecalKind::Text => decal.color,
            DecalKind::Logo => DecalColor::DEFAULT,
        };
        Self {
            kind: decal.kind,
            content: decal.content.clone(),
            color,
            mirrored,
        }
    }
}

/// Font faces in order of preference, loaded once up front.
#[derive(Clone, Default)]
pub struct FontBook {
    faces: Vec<(PathBuf, FontArc)>,
}

impl FontBook {
    pub fn load(preferred: &Path, fallbacks: &[PathBuf]) -> Self {
        let mut faces = Vec::new();
        for path in std::iter::once(preferred).chain(fallbacks.iter().map(PathBuf::as_path)) {
            match load_face(path) {
                Ok(font) => faces.push((path.to_path_buf(), font)),
                Err(err) => debug!("font candidate skipped: {err}"),
            }
        }

        match faces.first() {
            Some((path, _)) if path == preferred => info!("text face: {}", path.display()),
            Some((path, _)) => warn!(
                "preferred face {} unavailable, falling back to {}",
                preferred.display(),
                path.display()
            ),
            None => warn!("no font face available; text decals will render empty"),
        }

        Self { faces }
    }

    pub fn best(&self) -> Option<&FontArc> {
        self.faces.first().map(|(_, font)| font)
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

fn load_face(path: &Path) -> Result<FontArc, RasterError> {
    let bytes = fs::read(path).map_err(|source| RasterError::FontIo {
        path: path.to_path_buf(),
        source,
    })?;
    FontArc::try_from_vec(bytes).map_err(|_| RasterError::FontInvalid {
        path: path.to_path_buf(),
    })
}

/// Where logo content comes from.
pub trait ImageSource: Send + Sync {
    fn load(&self, reference: &str) -> Result<DynamicImage, RasterError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FsImageSource;

impl ImageSource for FsImageSource {
    fn load(&self, reference: &str) -> Result<DynamicImage, RasterError> {
        image::open(reference).map_err(|source| RasterError::Image {
            reference: reference.to_string(),
            source,
        })
    }
}

pub fn rasterize(
    key: &RasterKey,
    fonts: &FontBook,
    images: &dyn ImageSource,
    size: u32,
) -> RgbaImage {
    let size = size.max(1);
    let mut canvas = RgbaImage::new(size, size);

    match key.kind {
        DecalKind::Text => match fonts.best() {
            Some(font) => draw_text(&mut canvas, &key.content, key.color, font),
            None => warn!("no font face loaded, text decal '{}' left empty", key.content),
        },
        DecalKind::Logo => match images.load(&key.content) {
            Ok(logo) => {
                canvas = imageops::resize(&logo.to_rgba8(), size, size, FilterType::Triangle);
            }
            Err(err) => warn!("{err}; using a transparent texture"),
        },
    }

    if key.mirrored {
        imageops::flip_horizontal_in_place(&mut canvas);
    }
    canvas
}

fn draw_text(canvas: &mut RgbaImage, text: &str, color: DecalColor, font: &FontArc) {
    let size = canvas.width() as f32;
    let scale = PxScale::from(size * TEXT_HEIGHT_RATIO);
    let scaled = font.as_scaled(scale);

    let mut advances = Vec::with_capacity(text.len());
    let mut caret = 0.0_f32;
    let mut previous: Option<GlyphId> = None;
    for ch in text.chars() {
        let id = scaled.glyph_id(ch);
        if let Some(prev) = previous {
            caret += scaled.kern(prev, id);
        }
        advances.push((id, caret));
        caret += scaled.h_advance(id);
        previous = Some(id);
    }

    let origin_x = (size - caret) * 0.5;
    let baseline = size * 0.5 + (scaled.ascent() + scaled.descent()) * 0.5;
    let [r, g, b] = color.0;
    let (width, height) = canvas.dimensions();

    for (id, offset) in advances {
        let glyph = id.with_scale_and_position(scale, point(origin_x + offset, baseline));
        let Some(outlined) = font.outline_glyph(glyph) else {
            continue;
        };
        let bounds = outlined.px_bounds();
        outlined.draw(|x, y, coverage| {
            let px = bounds.min.x as i32 + x as i32;
            let py = bounds.min.y as i32 + y as i32;
            if px < 0 || py < 0 || px >= width as i32 || py >= height as i32 {
                return;
            }
            let alpha = (coverage.clamp(0.0, 1.0) * 255.0).round() as u8;
            let pixel = canvas.get_pixel_mut(px as u32, py as u32);
            if alpha > pixel.0[3] {
                *pixel = Rgba([r, g, b, alpha]);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    struct MemoryImages(HashMap<String, DynamicImage>);

    impl ImageSource for MemoryImages {
        fn load(&self, reference: &str) -> Result<DynamicImage, RasterError> {
            self.0
                .get(reference)
                .cloned()
                .ok_or_else(|| RasterError::Image {
                    reference: reference.to_string(),
                    source: image::ImageError::IoError(std::io::Error::from(
                        std::io::ErrorKind::NotFound,
                    )),
                })
        }
    }

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    fn split_logo() -> MemoryImages {
        let mut img = RgbaImage::new(8, 8);
        for (x, _, pixel) in img.enumerate_pixels_mut() {
            *pixel = if x < 4 { RED } else { BLUE };
        }
        MemoryImages(HashMap::from([(
            "logo.png".to_string(),
            DynamicImage::ImageRgba8(img),
        )]))
    }

    fn logo_key(content: &str, mirrored: bool) -> RasterKey {
        RasterKey {
            kind: DecalKind::Logo,
            content: content.to_string(),
            color: DecalColor::DEFAULT,
            mirrored,
        }
    }

    #[test]
    fn logo_fills_buffer() {
        let out = rasterize(&logo_key("logo.png", false), &FontBook::default(), &split_logo(), 16);
        assert_eq!(out.dimensions(), (16, 16));
        assert_eq!(*out.get_pixel(0, 8), RED);
        assert_eq!(*out.get_pixel(15, 8), BLUE);
    }

    #[test]
    fn mirrored_logo_is_flipped() {
        let out = rasterize(&logo_key("logo.png", true), &FontBook::default(), &split_logo(), 16);
        assert_eq!(*out.get_pixel(0, 8), BLUE);
        assert_eq!(*out.get_pixel(15, 8), RED);
    }

    #[test]
    fn missing_logo_is_transparent() {
        let out = rasterize(&logo_key("gone.png", false), &FontBook::default(), &split_logo(), 8);
        assert!(out.pixels().all(|pixel| pixel.0[3] == 0));
    }

    #[test]
    fn text_without_faces_is_transparent() {
        let key = RasterKey {
            kind: DecalKind::Text,
            content: "HELLO".to_string(),
            color: DecalColor::DEFAULT,
            mirrored: false,
        };
        let out = rasterize(&key, &FontBook::default(), &split_logo(), 32);
        assert!(out.pixels().all(|pixel| pixel.0[3] == 0));
    }

    #[test]
    fn missing_font_paths_leave_book_empty() {
        let book = FontBook::load(
            Path::new("/definitely/missing/face.ttf"),
            &[PathBuf::from("/also/missing.otf")],
        );
        assert!(book.is_empty());
    }

    #[test]
    fn text_uses_decal_color_when_a_face_exists() {
        let candidates = [
            "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
            "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
            "/Library/Fonts/Arial Bold.ttf",
            "C:\\Windows\\Fonts\\arialbd.ttf",
        ];
        let Some(path) = candidates.iter().map(Path::new).find(|path| path.exists()) else {
            return;
        };
        let book = FontBook::load(path, &[]);
        let key = RasterKey {
            kind: DecalKind::Text,
            content: "X".to_string(),
            color: DecalColor([10, 20, 30]),
            mirrored: false,
        };
        let out = rasterize(&key, &book, &FsImageSource, 256);
        let inked: Vec<_> = out.pixels().filter(|pixel| pixel.0[3] > 0).collect();
        assert!(!inked.is_empty());
        assert!(inked.iter().all(|pixel| pixel.0[..3] == [10, 20, 30]));
    }

    #[test]
    fn logo_key_ignores_color() {
        use crate::decal_editor::decal::{DecalIdAllocator, DecalSpec, MeshKey, create};
        use bevy::math::Vec3;

        let mut ids = DecalIdAllocator::default();
        let logo = create(
            &mut ids,
            DecalSpec {
                kind: DecalKind::Logo,
                content: "logo.png".to_string(),
                position: Vec3::ZERO,
                rotation: Vec3::ZERO,
                base_size: 1.0,
                mesh: MeshKey::new("Body"),
                color: DecalColor([1, 1, 1]),
            },
        );
        let mut recolored = logo.clone();
        recolored.color = DecalColor([200, 0, 0]);
        assert_eq!(
            RasterKey::for_decal(&logo, false),
            RasterKey::for_decal(&recolored, false)
        );
        assert_ne!(
            RasterKey::for_decal(&logo, false),
            RasterKey::for_decal(&logo, true)
        );
    }
}
