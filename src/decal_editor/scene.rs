//! Loaded model bookkeeping: spawning the glTF scene, measuring it once its
//! meshes exist, standing it on the ground plane and naming every mesh so
//! decals can refer to it.

use crate::decal_editor::decal::MeshKey;
use crate::decal_editor::jobs::TextureCache;
use crate::decal_editor::state::{EditorAction, EditorState};
use bevy::camera::primitives::Aabb;
use bevy::prelude::*;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Component)]
pub struct ModelRoot;

/// Root whose meshes have not been measured and registered yet.
#[derive(Component)]
pub struct PendingModel {
    pub source: String,
}

/// Attached to every registered model mesh.
#[derive(Component, Debug, Clone)]
pub struct TargetMesh(pub MeshKey);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelBounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl ModelBounds {
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let (min, max) = points.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Some(Self { min, max })
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Largest extent; every size-dependent default scales with it.
    pub fn scale(&self) -> f32 {
        self.size().max_element()
    }

    /// Vertical shift that puts the lowest point on `y = 0`.
    pub fn ground_offset(&self) -> f32 {
        -self.min.y
    }

    pub fn translated(&self, offset: Vec3) -> Self {
        Self {
            min: self.min + offset,
            max: self.max + offset,
        }
    }
}

/// World-space corners of a mesh's local bounding box.
pub fn aabb_corners(aabb: &Aabb, world: &GlobalTransform) -> [Vec3; 8] {
    let center = Vec3::from(aabb.center);
    let half = Vec3::from(aabb.half_extents);
    let mut corners = [Vec3::ZERO; 8];
    for (i, corner) in corners.iter_mut().enumerate() {
        let sign = Vec3::new(
            if i & 1 == 0 { -1.0 } else { 1.0 },
            if i & 2 == 0 { -1.0 } else { 1.0 },
            if i & 4 == 0 { -1.0 } else { 1.0 },
        );
        *corner = world.transform_point(center + half * sign);
    }
    corners
}

#[derive(Resource, Default)]
pub struct SceneBounds(pub Option<ModelBounds>);

/// Model meshes by key, in scene traversal order.
#[derive(Resource, Default, Debug)]
pub struct MeshRegistry {
    entries: Vec<(MeshKey, Entity)>,
}

impl MeshRegistry {
    /// Registers a mesh and returns its key. Unnamed meshes get a generated
    /// id; repeated names get a `#n` suffix so every key is unique.
    pub fn register(&mut self, name: Option<&str>, entity: Entity) -> MeshKey {
        let base = match name.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => name.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        let mut key = MeshKey::new(base.clone());
        let mut n = 2;
        while self.contains(&key) {
            key = MeshKey::new(format!("{base}#{n}"));
            n += 1;
        }
        self.entries.push((key.clone(), entity));
        key
    }

    pub fn contains(&self, key: &MeshKey) -> bool {
        self.entries.iter().any(|(existing, _)| existing == key)
    }

    /// Entity for `key`, falling back to the first registered mesh.
    pub fn resolve(&self, key: &MeshKey) -> Option<(&MeshKey, Entity)> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .or_else(|| self.entries.first())
            .map(|(key, entity)| (key, *entity))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MeshKey, Entity)> {
        self.entries.iter().map(|(key, entity)| (key, *entity))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Replaces any loaded model with the scene at `asset_path` (relative to `assets/`).
pub fn spawn_model(
    commands: &mut Commands,
    asset_server: &AssetServer,
    existing: impl IntoIterator<Item = Entity>,
    registry: &mut MeshRegistry,
    asset_path: &str,
) {
    for entity in existing {
        commands.entity(entity).despawn();
    }
    registry.clear();

    let scene = asset_server.load(GltfAssetLabel::Scene(0).from_asset(asset_path.to_string()));
    commands.spawn((
        SceneRoot(scene),
        Transform::default(),
        Visibility::default(),
        ModelRoot,
        PendingModel {
            source: asset_path.to_string(),
        },
    ));
    info!("loading model {asset_path}");
}

/// Finishes a pending model once all of its meshes have bounds.
pub fn prepare_loaded_model(
    mut commands: Commands,
    mut state: ResMut<EditorState>,
    mut registry: ResMut<MeshRegistry>,
    mut scene_bounds: ResMut<SceneBounds>,
    mut roots: Query<(Entity, &PendingModel, &mut Transform)>,
    children: Query<&Children>,
    mesh_entities: Query<(), With<Mesh3d>>,
    measured: Query<(&GlobalTransform, &Aabb, Option<&Name>), With<Mesh3d>>,
) {
    let Ok((root, pending, mut transform)) = roots.single_mut() else {
        return;
    };

    let meshes: Vec<Entity> = children
        .iter_descendants(root)
        .filter(|entity| mesh_entities.contains(*entity))
        .collect();
    if meshes.is_empty() || meshes.iter().any(|entity| !measured.contains(*entity)) {
        return;
    }

    let corners = meshes.iter().filter_map(|entity| measured.get(*entity).ok()).flat_map(
        |(world, aabb, _)| aabb_corners(aabb, world),
    );
    let Some(bounds) = ModelBounds::from_points(corners) else {
        return;
    };

    let lift = Vec3::Y * bounds.ground_offset();
    transform.translation += lift;

    registry.clear();
    for entity in &meshes {
        let name = measured
            .get(*entity)
            .ok()
            .and_then(|(_, _, name)| name.map(|name| name.as_str().to_string()));
        let key = registry.register(name.as_deref(), *entity);
        debug!(mesh = %key, "registered model mesh");
        let mut mesh_commands = commands.entity(*entity);
        mesh_commands.insert(TargetMesh(key.clone()));
        if name.is_none() {
            mesh_commands.insert(Name::new(key.0));
        }
    }

    let grounded = bounds.translated(lift);
    scene_bounds.0 = Some(grounded);
    commands.entity(root).remove::<PendingModel>();
    state.dispatch(EditorAction::ModelLoaded {
        source: pending.source.clone(),
        scale: grounded.scale().max(f32::EPSILON),
    });
    info!(
        meshes = registry.len(),
        "model measured: size {:?}, lifted by {:.3}",
        grounded.size(),
        lift.y
    );
}

/// Whether spawned model roots outlived the session, finished or still pending.
pub fn model_roots_orphaned(state: &EditorState) -> bool {
    state.model.is_none() && !state.loading
}

/// Removes every model root once the session no longer references one.
pub fn clear_model_after_reset(
    mut commands: Commands,
    state: Res<EditorState>,
    mut registry: ResMut<MeshRegistry>,
    mut scene_bounds: ResMut<SceneBounds>,
    mut cache: ResMut<TextureCache>,
    roots: Query<Entity, With<ModelRoot>>,
) {
    if !model_roots_orphaned(&state) || roots.is_empty() {
        return;
    }
    for root in &roots {
        commands.entity(root).despawn();
    }
    registry.clear();
    scene_bounds.0 = None;
    cache.clear();
    info!("model unloaded");
}
