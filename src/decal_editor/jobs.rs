use crate::decal_editor::ASSETS_DIR;
use crate::decal_editor::decal::DecalId;
use crate::decal_editor::export::{
    ExportScene, GlbExporter, SceneExporter, export_decals, export_mesh,
};
use crate::decal_editor::raster::{FontBook, FsImageSource, ImageSource, RasterKey, rasterize};
use crate::decal_editor::settings::EditorSettings;
use crate::decal_editor::scene::{MeshRegistry, ModelRoot, SceneBounds, spawn_model};
use crate::decal_editor::state::EditorState;
use anyhow::Context;
use bevy::asset::RenderAssetUsages;
use bevy::prelude::*;
use bevy::render::render_resource::{Extent3d, TextureDimension, TextureFormat};
use image::RgbaImage;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Fonts and image loader shared by the raster worker and the exporter.
#[derive(Resource, Clone)]
pub struct RasterSources {
    pub fonts: FontBook,
    pub images: Arc<dyn ImageSource>,
    pub size: u32,
}

impl RasterSources {
    pub fn from_settings(settings: &EditorSettings) -> Self {
        Self {
            fonts: FontBook::load(&settings.preferred_font, &settings.fallback_fonts),
            images: Arc::new(FsImageSource),
            size: settings.raster_size.max(1),
        }
    }

    pub fn exporter(&self) -> GlbExporter {
        GlbExporter {
            fonts: self.fonts.clone(),
            images: Arc::clone(&self.images),
            raster_size: self.size,
        }
    }
}

/// One rendered instance of a decal: `(id, mirrored)`.
pub type RasterSlot = (DecalId, bool);

#[derive(Debug, Clone)]
pub struct RasterRequest {
    pub slot: RasterSlot,
    pub generation: u64,
    pub key: RasterKey,
}

pub struct RasterResult {
    pub slot: RasterSlot,
    pub generation: u64,
    pub image: RgbaImage,
}

#[derive(Debug)]
struct SlotEntry {
    key: RasterKey,
    generation: u64,
    texture: Option<Handle<Image>>,
}

/// Latest raster request and finished texture per slot.
///
/// Generations come from one counter that only grows, so a result is current
/// exactly when its generation equals the slot's latest request.
#[derive(Resource, Default, Debug)]
pub struct TextureCache {
    slots: HashMap<RasterSlot, SlotEntry>,
    next_generation: u64,
}

impl TextureCache {
    /// Returns the generation to rasterize under, or `None` when the slot
    /// already has (or is waiting for) a raster of `key`.
    pub fn request(&mut self, slot: RasterSlot, key: &RasterKey) -> Option<u64> {
        if self.slots.get(&slot).is_some_and(|entry| entry.key == *key) {
            return None;
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        let texture = self.slots.remove(&slot).and_then(|entry| entry.texture);
        self.slots.insert(
            slot,
            SlotEntry {
                key: key.clone(),
                generation,
                texture,
            },
        );
        Some(generation)
    }

    pub fn is_current(&self, slot: RasterSlot, generation: u64) -> bool {
        self.slots
            .get(&slot)
            .is_some_and(|entry| entry.generation == generation)
    }

    /// Stores a finished texture; stale or orphaned results are refused.
    pub fn accept(&mut self, slot: RasterSlot, generation: u64, texture: Handle<Image>) -> bool {
        match self.slots.get_mut(&slot) {
            Some(entry) if entry.generation == generation => {
                entry.texture = Some(texture);
                true
            }
            _ => false,
        }
    }

    pub fn texture(&self, slot: RasterSlot) -> Option<&Handle<Image>> {
        self.slots.get(&slot).and_then(|entry| entry.texture.as_ref())
    }

    pub fn retain(&mut self, mut live: impl FnMut(&RasterSlot) -> bool) {
        self.slots.retain(|slot, _| live(slot));
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

/// Keeps only the newest request per slot, preserving first-seen order.
pub fn coalesce(requests: Vec<RasterRequest>) -> Vec<RasterRequest> {
    let mut order = Vec::new();
    let mut newest: HashMap<RasterSlot, RasterRequest> = HashMap::new();
    for request in requests {
        match newest.get(&request.slot) {
            Some(existing) if existing.generation >= request.generation => {}
            Some(_) => {
                newest.insert(request.slot, request);
            }
            None => {
                order.push(request.slot);
                newest.insert(request.slot, request);
            }
        }
    }
    order
        .into_iter()
        .filter_map(|slot| newest.remove(&slot))
        .collect()
}

/// Background rasterizer fed through a channel and polled every frame.
pub struct RasterQueue {
    requests: Sender<RasterRequest>,
    results: Receiver<RasterResult>,
}

impl RasterQueue {
    pub fn start(sources: &RasterSources) -> Self {
        let RasterSources {
            fonts,
            images,
            size,
        } = sources.clone();
        let (request_tx, request_rx) = channel::<RasterRequest>();
        let (result_tx, result_rx) = channel();

        std::thread::spawn(move || {
            while let Ok(first) = request_rx.recv() {
                let mut batch = vec![first];
                batch.extend(request_rx.try_iter());
                for request in coalesce(batch) {
                    let image = rasterize(&request.key, &fonts, images.as_ref(), size);
                    let result = RasterResult {
                        slot: request.slot,
                        generation: request.generation,
                        image,
                    };
                    if result_tx.send(result).is_err() {
                        return;
                    }
                }
            }
            debug!("raster worker stopped");
        });

        Self {
            requests: request_tx,
            results: result_rx,
        }
    }

    pub fn submit(&mut self, request: RasterRequest) {
        debug!(slot = ?request.slot, generation = request.generation, "raster requested");
        if self.requests.send(request).is_err() {
            warn!("raster worker is gone; decal texture will not update");
        }
    }

    pub fn drain(&mut self) -> Vec<RasterResult> {
        self.results.try_iter().collect()
    }
}

pub fn rgba_to_image(raster: RgbaImage) -> Image {
    let (width, height) = raster.dimensions();
    Image::new(
        Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        raster.into_raw(),
        TextureFormat::Rgba8UnormSrgb,
        RenderAssetUsages::default(),
    )
}

/// Turns finished rasters into textures, dropping anything stale.
pub fn poll_raster_results(
    mut queue: NonSendMut<RasterQueue>,
    mut cache: ResMut<TextureCache>,
    mut images: ResMut<Assets<Image>>,
) {
    for result in queue.drain() {
        if !cache.is_current(result.slot, result.generation) {
            debug!(slot = ?result.slot, generation = result.generation, "stale raster dropped");
            continue;
        }
        let handle = images.add(rgba_to_image(result.image));
        cache.accept(result.slot, result.generation, handle);
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("{0} is not a binary glTF (.glb) file")]
    NotGlb(PathBuf),
}

/// Copies a picked model into the asset folder under a fresh name and
/// returns its asset path.
pub fn copy_into_uploads(source: &Path, assets_root: &Path, upload_dir: &Path) -> anyhow::Result<String> {
    let is_glb = source
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("glb"));
    if !is_glb {
        return Err(ImportError::NotGlb(source.to_path_buf()).into());
    }

    let target_dir = assets_root.join(upload_dir);
    fs::create_dir_all(&target_dir)
        .with_context(|| format!("creating {}", target_dir.display()))?;

    let relative = upload_dir.join(format!("{}.glb", Uuid::new_v4()));
    let target = assets_root.join(&relative);
    fs::copy(source, &target)
        .with_context(|| format!("copying {} to {}", source.display(), target.display()))?;

    Ok(relative.to_string_lossy().replace('\\', "/"))
}

#[derive(Debug)]
pub enum FileJobResult {
    ModelImported {
        /// Session import epoch when the copy started.
        epoch: u64,
        result: Result<String, String>,
    },
    Exported(Result<(PathBuf, usize), String>),
}

impl FileJobResult {
    /// Imports started before the last reset must not bring a model back.
    pub fn is_stale(&self, state: &EditorState) -> bool {
        match self {
            Self::ModelImported { epoch, .. } => *epoch != state.import_epoch(),
            Self::Exported(_) => false,
        }
    }
}

/// Import/export work that must stay off the frame loop.
pub struct FileJobs {
    pub tx: Sender<FileJobResult>,
    pub rx: Receiver<FileJobResult>,
    pub running: bool,
}

impl Default for FileJobs {
    fn default() -> Self {
        let (tx, rx) = channel();
        Self {
            tx,
            rx,
            running: false,
        }
    }
}

pub fn spawn_model_import(
    state: &mut EditorState,
    jobs: &mut FileJobs,
    source: PathBuf,
) -> Result<(), String> {
    if jobs.running {
        return Err("another file job is running".to_string());
    }

    let upload_dir = state.settings.upload_dir.clone();
    let epoch = state.import_epoch();
    state.loading = true;
    state.status = format!("Importing {}...", source.display());
    jobs.running = true;
    let tx = jobs.tx.clone();

    std::thread::spawn(move || {
        let result = copy_into_uploads(&source, Path::new(ASSETS_DIR), &upload_dir)
            .map_err(|err| format!("{err:#}"));
        let _ = tx.send(FileJobResult::ModelImported { epoch, result });
    });

    Ok(())
}

pub fn spawn_export(
    state: &mut EditorState,
    jobs: &mut FileJobs,
    exporter: GlbExporter,
    scene: ExportScene,
    path: PathBuf,
) -> Result<(), String> {
    if jobs.running {
        return Err("another file job is running".to_string());
    }

    state.status = format!("Exporting to {}...", path.display());
    jobs.running = true;
    let tx = jobs.tx.clone();

    std::thread::spawn(move || {
        let result = exporter
            .write(&scene, &path)
            .with_context(|| format!("exporting {}", path.display()))
            .map(|bytes| (path, bytes))
            .map_err(|err| format!("{err:#}"));
        let _ = tx.send(FileJobResult::Exported(result));
    });

    Ok(())
}

pub fn poll_file_jobs(
    mut commands: Commands,
    asset_server: Res<AssetServer>,
    mut state: ResMut<EditorState>,
    mut jobs: NonSendMut<FileJobs>,
    mut cache: ResMut<TextureCache>,
    mut registry: ResMut<MeshRegistry>,
    mut bounds: ResMut<SceneBounds>,
    roots: Query<Entity, With<ModelRoot>>,
) {
    let Ok(result) = jobs.rx.try_recv() else {
        return;
    };
    jobs.running = false;

    if result.is_stale(&state) {
        info!("dropping model import started before the last reset");
        return;
    }

    match result {
        FileJobResult::ModelImported {
            result: Ok(asset_path),
            ..
        } => {
            cache.clear();
            bounds.0 = None;
            spawn_model(&mut commands, &asset_server, &roots, &mut registry, &asset_path);
            state.status = "Preparing model...".to_string();
        }
        FileJobResult::ModelImported { result: Err(err), .. } => {
            error!("model import failed: {err}");
            state.loading = false;
            state.status = format!("Import failed: {err}");
        }
        FileJobResult::Exported(Ok((path, bytes))) => {
            info!("export finished: {} ({bytes} bytes)", path.display());
            state.status = format!("Exported {}", path.display());
        }
        FileJobResult::Exported(Err(err)) => {
            error!("export failed: {err}");
            state.status = format!("Export failed: {err}");
        }
    }
}

/// Snapshots the scene for a pending export request and hands it to a worker.
pub fn start_requested_export(
    mut state: ResMut<EditorState>,
    mut jobs: NonSendMut<FileJobs>,
    sources: Res<RasterSources>,
    registry: Res<MeshRegistry>,
    meshes: Res<Assets<Mesh>>,
    materials: Res<Assets<StandardMaterial>>,
    images: Res<Assets<Image>>,
    model_meshes: Query<(
        &Mesh3d,
        &GlobalTransform,
        Option<&MeshMaterial3d<StandardMaterial>>,
    )>,
) {
    if jobs.running || state.export_request.is_none() {
        return;
    }
    let Some(path) = state.export_request.take() else {
        return;
    };

    let mut scene = ExportScene::default();
    let mut mesh_index = HashMap::new();
    for (key, entity) in registry.iter() {
        let Ok((mesh, world, material)) = model_meshes.get(entity) else {
            continue;
        };
        let Some(mesh) = meshes.get(&mesh.0) else {
            continue;
        };
        let material = material.and_then(|material| materials.get(&material.0));
        match export_mesh(key.as_str(), mesh, world, material, &images) {
            Some(exported) => {
                mesh_index.insert(key.clone(), scene.meshes.len());
                scene.meshes.push(exported);
            }
            None => warn!("mesh '{key}' is not a triangle list, left out of the export"),
        }
    }
    scene.decals = export_decals(state.decals(), |key| {
        registry
            .resolve(key)
            .and_then(|(resolved, _)| mesh_index.get(resolved).copied())
    });
    info!(
        meshes = scene.meshes.len(),
        decals = scene.decals.len(),
        "export snapshot taken"
    );

    if let Err(err) = spawn_export(&mut state, &mut jobs, sources.exporter(), scene, path) {
        state.status = format!("Export not started: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decal_editor::decal::{DecalColor, DecalIdAllocator, DecalKind};
    use pretty_assertions::assert_eq;

    fn key(content: &str) -> RasterKey {
        RasterKey {
            kind: DecalKind::Text,
            content: content.to_string(),
            color: DecalColor::DEFAULT,
            mirrored: false,
        }
    }

    fn slots() -> (RasterSlot, RasterSlot) {
        let mut ids = DecalIdAllocator::default();
        let id = ids.allocate();
        ((id, false), (id, true))
    }

    #[test]
    fn same_key_is_requested_once() {
        let (slot, _) = slots();
        let mut cache = TextureCache::default();
        assert_eq!(cache.request(slot, &key("A")), Some(1));
        assert_eq!(cache.request(slot, &key("A")), None);
        assert_eq!(cache.request(slot, &key("B")), Some(2));
    }

    #[test]
    fn stale_generation_is_refused() {
        let (slot, _) = slots();
        let mut cache = TextureCache::default();
        let first = cache.request(slot, &key("A")).expect("first");
        let second = cache.request(slot, &key("B")).expect("second");

        assert!(!cache.accept(slot, first, Handle::default()));
        assert!(cache.texture(slot).is_none());
        assert!(cache.accept(slot, second, Handle::default()));
        assert!(cache.texture(slot).is_some());
    }

    #[test]
    fn cleared_cache_refuses_late_results() {
        let (slot, mirror) = slots();
        let mut cache = TextureCache::default();
        let generation = cache.request(slot, &key("A")).expect("request");
        cache.request(mirror, &key("A"));
        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.accept(slot, generation, Handle::default()));

        // A fresh request after the clear never reuses an old generation.
        assert!(cache.request(slot, &key("A")).is_some_and(|g| g > generation));
    }

    #[test]
    fn retain_drops_removed_slots() {
        let (slot, mirror) = slots();
        let mut cache = TextureCache::default();
        cache.request(slot, &key("A"));
        cache.request(mirror, &key("A"));
        cache.retain(|s| !s.1);
        assert_eq!(cache.len(), 1);
        assert!(cache.is_current(slot, 1));
    }

    #[test]
    fn coalesce_keeps_newest_per_slot() {
        let (slot, mirror) = slots();
        let batch = vec![
            RasterRequest { slot, generation: 1, key: key("A") },
            RasterRequest { slot: mirror, generation: 2, key: key("A") },
            RasterRequest { slot, generation: 3, key: key("AB") },
        ];
        let kept = coalesce(batch);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].slot, slot);
        assert_eq!(kept[0].generation, 3);
        assert_eq!(kept[0].key, key("AB"));
        assert_eq!(kept[1].slot, mirror);
    }

    #[test]
    fn uploads_are_copied_under_a_fresh_name() {
        let dir = tempfile::tempdir().expect("temp dir");
        let source = dir.path().join("shirt.GLB");
        fs::write(&source, b"glTF").expect("write source");
        let assets = dir.path().join("assets");

        let first = copy_into_uploads(&source, &assets, Path::new("uploads")).expect("copy");
        let second = copy_into_uploads(&source, &assets, Path::new("uploads")).expect("copy");

        assert_ne!(first, second);
        assert!(first.starts_with("uploads/"));
        assert!(first.ends_with(".glb"));
        assert_eq!(fs::read(assets.join(&first)).expect("copied"), b"glTF");
    }

    #[test]
    fn non_glb_uploads_are_refused() {
        let dir = tempfile::tempdir().expect("temp dir");
        let source = dir.path().join("shirt.obj");
        fs::write(&source, b"o shirt").expect("write source");
        let err = copy_into_uploads(&source, dir.path(), Path::new("uploads")).expect_err("refused");
        assert!(err.downcast_ref::<ImportError>().is_some());
    }

    #[test]
    fn missing_source_reports_context() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = copy_into_uploads(&dir.path().join("gone.glb"), dir.path(), Path::new("uploads"))
            .expect_err("missing file");
        assert!(format!("{err:#}").contains("copying"));
    }

    #[test]
    fn imports_from_before_a_reset_are_stale() {
        use crate::decal_editor::state::EditorAction;

        let mut state = EditorState::new(EditorSettings::default());
        let started = FileJobResult::ModelImported {
            epoch: state.import_epoch(),
            result: Ok("uploads/shirt.glb".to_string()),
        };
        assert!(!started.is_stale(&state));

        state.dispatch(EditorAction::Reset);
        assert!(started.is_stale(&state));
        assert!(!FileJobResult::Exported(Err("disk full".to_string())).is_stale(&state));
    }
}
