//! The 3D view: scene setup, pointer and keyboard input turned into editor
//! actions, and the quad entities that draw every decal projection.

use crate::decal_editor::camera::{EditorCamera, UiInteractionState};
use crate::decal_editor::decal::{Decal, DecalChanges, DecalId};
use crate::decal_editor::interaction::{PointerTarget, Shortcut, ShortcutKey, SurfaceHit, ToolMode, shortcut};
use crate::decal_editor::jobs::{RasterQueue, RasterRequest, RasterSlot, TextureCache};
use crate::decal_editor::mirror::{Projection, projections, quad_frame};
use crate::decal_editor::raster::RasterKey;
use crate::decal_editor::scene::{MeshRegistry, TargetMesh};
use crate::decal_editor::state::{EditorAction, EditorState};
use crate::decal_editor::{DECAL_DEPTH_BIAS, GRID_EXTENT_UNITS, GRID_MAJOR_STEP_UNITS};
use bevy::camera::ClearColorConfig;
use bevy::camera::visibility::RenderLayers;
use bevy::pbr::wireframe::Wireframe;
use bevy::picking::mesh_picking::ray_cast::{MeshRayCast, MeshRayCastSettings, RayMeshHit};
use bevy::prelude::*;
use bevy::window::PrimaryWindow;
use bevy_egui::PrimaryEguiContext;
use std::collections::{HashMap, HashSet};

/// Cursor travel (logical px) under which a press and release count as a click.
const CLICK_SLOP_PX: f32 = 4.0;
const OUTLINE_MARGIN: f32 = 1.1;

/// Drawn quad for one decal projection.
#[derive(Component, Debug, Clone, Copy)]
pub struct DecalQuad {
    pub decal: DecalId,
    pub mirrored: bool,
    interactive: bool,
}

impl From<&Projection> for DecalQuad {
    fn from(projection: &Projection) -> Self {
        Self {
            decal: projection.decal,
            mirrored: projection.mirrored,
            interactive: projection.is_interactive(),
        }
    }
}

/// Whether a ray may stop on this quad. Mirrored quads let it pass through.
pub fn pickable(quad: &DecalQuad) -> bool {
    quad.interactive
}

#[derive(Debug)]
pub struct DecalVisual {
    pub entity: Entity,
    pub parent: Entity,
    pub material: Handle<StandardMaterial>,
    /// Decal state the entity currently reflects.
    pub shown: Decal,
}

#[derive(Resource)]
pub struct DecalVisuals {
    pub quad: Handle<Mesh>,
    pub entries: HashMap<RasterSlot, DecalVisual>,
}

#[derive(Resource, Default)]
pub struct PointerState {
    press: Option<(Vec2, PointerTarget)>,
    last_cursor: Option<Vec2>,
}

pub fn setup_editor_scene(mut commands: Commands, mut meshes: ResMut<Assets<Mesh>>) {
    commands.spawn((
        Camera3d::default(),
        Camera {
            clear_color: ClearColorConfig::Custom(Color::srgb(0.012, 0.012, 0.02)),
            ..default()
        },
        Transform::default(),
        EditorCamera,
    ));
    commands.spawn((
        Camera2d,
        Camera {
            order: 1,
            clear_color: ClearColorConfig::None,
            ..default()
        },
        RenderLayers::layer(31),
        PrimaryEguiContext,
    ));

    commands.spawn((
        DirectionalLight {
            color: Color::srgb(1.0, 0.97, 0.92),
            shadows_enabled: true,
            illuminance: 12_000.0,
            ..default()
        },
        Transform::from_xyz(4.0, 7.0, 5.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
    commands.spawn((
        DirectionalLight {
            color: Color::srgb(0.75, 0.82, 1.0),
            illuminance: 3_500.0,
            ..default()
        },
        Transform::from_xyz(-5.0, 3.0, -4.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    commands.insert_resource(DecalVisuals {
        quad: meshes.add(Rectangle::new(1.0, 1.0)),
        entries: HashMap::new(),
    });
}

fn surface_from(
    entity: Entity,
    hit: &RayMeshHit,
    targets: &Query<(&TargetMesh, &GlobalTransform)>,
) -> Option<SurfaceHit> {
    let (target, world) = targets.get(entity).ok()?;
    Some(SurfaceHit {
        point: hit.point,
        normal: hit.normal,
        mesh: target.0.clone(),
        mesh_world: world.affine(),
    })
}

/// Nearest model surface under the ray, ignoring every decal quad.
fn surface_hit(
    ray_cast: &mut MeshRayCast,
    ray: Ray3d,
    targets: &Query<(&TargetMesh, &GlobalTransform)>,
) -> Option<SurfaceHit> {
    let filter = |entity: Entity| targets.contains(entity);
    let settings = MeshRayCastSettings::default().with_filter(&filter);
    let (entity, hit) = ray_cast.cast_ray(ray, &settings).first().cloned()?;
    surface_from(entity, &hit, targets)
}

/// Mirrored quads are not pickable; a ray through one reaches whatever lies behind it.
fn pick(
    ray_cast: &mut MeshRayCast,
    ray: Ray3d,
    targets: &Query<(&TargetMesh, &GlobalTransform)>,
    quads: &Query<&DecalQuad>,
) -> PointerTarget {
    let filter = |entity: Entity| {
        targets.contains(entity) || quads.get(entity).is_ok_and(pickable)
    };
    let settings = MeshRayCastSettings::default().with_filter(&filter);
    let Some((entity, hit)) = ray_cast.cast_ray(ray, &settings).first().cloned() else {
        return PointerTarget::Background;
    };
    if let Ok(quad) = quads.get(entity) {
        return PointerTarget::Decal(quad.decal);
    }
    surface_from(entity, &hit, targets).map_or(PointerTarget::Background, PointerTarget::Surface)
}

pub fn pointer_input_system(
    mouse_buttons: Res<ButtonInput<MouseButton>>,
    windows: Query<&Window, With<PrimaryWindow>>,
    cameras: Query<(&Camera, &GlobalTransform), With<EditorCamera>>,
    ui_state: Res<UiInteractionState>,
    mut pointer: ResMut<PointerState>,
    mut state: ResMut<EditorState>,
    mut ray_cast: MeshRayCast,
    targets: Query<(&TargetMesh, &GlobalTransform)>,
    quads: Query<&DecalQuad>,
) {
    let cursor = windows.single().ok().and_then(|window| window.cursor_position());
    let Ok((camera, camera_transform)) = cameras.single() else {
        return;
    };
    let ray = cursor.and_then(|cursor| {
        let rect = camera.logical_viewport_rect()?;
        if !rect.contains(cursor) {
            return None;
        }
        camera.viewport_to_world(camera_transform, cursor - rect.min).ok()
    });

    if state.interaction.dragging().is_some() {
        if !mouse_buttons.pressed(MouseButton::Left) || cursor.is_none() {
            state.dispatch(EditorAction::PointerUp);
            pointer.press = None;
        } else if cursor != pointer.last_cursor {
            let hit = ray.and_then(|ray| surface_hit(&mut ray_cast, ray, &targets));
            state.dispatch(EditorAction::PointerMove(hit));
        }
        pointer.last_cursor = cursor;
        return;
    }
    pointer.last_cursor = cursor;

    if mouse_buttons.just_pressed(MouseButton::Left) && !ui_state.wants_pointer_input {
        if let (Some(ray), Some(at)) = (ray, cursor) {
            let target = pick(&mut ray_cast, ray, &targets, &quads);
            state.dispatch(EditorAction::PointerDown(target.clone()));
            pointer.press = Some((at, target));
        }
    }

    if mouse_buttons.just_released(MouseButton::Left) {
        if let (Some((start, target)), Some(end)) = (pointer.press.take(), cursor) {
            if start.distance(end) <= CLICK_SLOP_PX {
                state.dispatch(EditorAction::Click(target));
            }
        }
    }
}

pub fn keyboard_shortcuts_system(
    keys: Res<ButtonInput<KeyCode>>,
    ui_state: Res<UiInteractionState>,
    mut state: ResMut<EditorState>,
) {
    let primary = keys.any_pressed([
        KeyCode::ControlLeft,
        KeyCode::ControlRight,
        KeyCode::SuperLeft,
        KeyCode::SuperRight,
    ]);
    let shift = keys.any_pressed([KeyCode::ShiftLeft, KeyCode::ShiftRight]);
    let typing = ui_state.wants_keyboard_input;

    let pressed: Vec<ShortcutKey> = keys
        .get_just_pressed()
        .filter_map(|key| match key {
            KeyCode::KeyZ => Some(ShortcutKey::Z),
            KeyCode::KeyY => Some(ShortcutKey::Y),
            KeyCode::Delete => Some(ShortcutKey::Delete),
            KeyCode::Backspace => Some(ShortcutKey::Backspace),
            KeyCode::Escape => Some(ShortcutKey::Escape),
            _ => None,
        })
        .collect();

    for key in pressed {
        let action = match shortcut(key, primary, shift) {
            Some(Shortcut::Undo) if !typing => EditorAction::Undo,
            Some(Shortcut::Redo) if !typing => EditorAction::Redo,
            Some(Shortcut::Delete) => EditorAction::DeleteSelected {
                text_input_focused: typing,
            },
            Some(Shortcut::Cancel) if state.interaction.tool.is_placement() => {
                EditorAction::SetTool(ToolMode::Select)
            }
            Some(Shortcut::Cancel) => EditorAction::Select(None),
            _ => continue,
        };
        state.dispatch(action);
    }
}

fn quad_transform(projection: &Projection, decal: &Decal) -> Transform {
    let size = Vec2::new(decal.scale.x, decal.scale.y);
    let (translation, rotation, scale) = quad_frame(projection.position, projection.rotation, size);
    Transform {
        translation,
        rotation,
        scale,
    }
}

fn apply_material(material: &mut StandardMaterial, decal: &Decal) {
    // Fully transparent until the first raster arrives.
    let alpha = if material.base_color_texture.is_some() {
        decal.opacity
    } else {
        0.0
    };
    material.base_color = Color::srgba(1.0, 1.0, 1.0, alpha);
    material.perceptual_roughness = decal.roughness;
    material.metallic = decal.metalness;
}

fn decal_material(decal: &Decal, texture: Option<Handle<Image>>) -> StandardMaterial {
    let mut material = StandardMaterial {
        base_color_texture: texture,
        alpha_mode: AlphaMode::Blend,
        double_sided: true,
        cull_mode: None,
        depth_bias: DECAL_DEPTH_BIAS,
        ..default()
    };
    apply_material(&mut material, decal);
    material
}

fn request_raster(cache: &mut TextureCache, queue: &mut RasterQueue, slot: RasterSlot, decal: &Decal) {
    let key = RasterKey::for_decal(decal, slot.1);
    if let Some(generation) = cache.request(slot, &key) {
        queue.submit(RasterRequest {
            slot,
            generation,
            key,
        });
    }
}

/// Brings decal quads in line with the working document. Only the parts a
/// change touches are updated; moving a decal never re-rasterizes it.
pub fn sync_decal_visuals(
    mut commands: Commands,
    state: Res<EditorState>,
    registry: Res<MeshRegistry>,
    mut visuals: ResMut<DecalVisuals>,
    mut cache: ResMut<TextureCache>,
    mut queue: NonSendMut<RasterQueue>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut transforms: Query<&mut Transform, With<DecalQuad>>,
) {
    let DecalVisuals { quad, entries } = &mut *visuals;
    let mut drawn = HashSet::new();

    for decal in state.decals() {
        let Some((_, parent)) = registry.resolve(&decal.mesh) else {
            continue;
        };
        for projection in projections(decal) {
            let slot = (decal.id, projection.mirrored);
            drawn.insert(slot);
            let transform = quad_transform(&projection, decal);

            let Some(visual) = entries.get_mut(&slot) else {
                request_raster(&mut cache, &mut queue, slot, decal);
                let material = materials.add(decal_material(decal, cache.texture(slot).cloned()));
                let entity = commands
                    .spawn((
                        Mesh3d(quad.clone()),
                        MeshMaterial3d(material.clone()),
                        transform,
                        DecalQuad::from(&projection),
                    ))
                    .id();
                commands.entity(parent).add_child(entity);
                entries.insert(
                    slot,
                    DecalVisual {
                        entity,
                        parent,
                        material,
                        shown: decal.clone(),
                    },
                );
                continue;
            };

            let changes = DecalChanges::between(&visual.shown, decal);
            if visual.parent != parent {
                commands.entity(parent).add_child(visual.entity);
                visual.parent = parent;
            }
            if changes.needs_transform() {
                if let Ok(mut current) = transforms.get_mut(visual.entity) {
                    *current = transform;
                }
            }
            if changes.needs_raster() {
                request_raster(&mut cache, &mut queue, slot, decal);
            }

            let texture = cache.texture(slot);
            let texture_changed = materials
                .get(&visual.material)
                .is_some_and(|material| material.base_color_texture.as_ref() != texture);
            if changes.needs_material() || texture_changed {
                let texture = texture.cloned();
                if let Some(material) = materials.get_mut(&visual.material) {
                    if texture_changed {
                        material.base_color_texture = texture;
                    }
                    apply_material(material, decal);
                }
            }
            if !changes.is_empty() {
                visual.shown = decal.clone();
            }
        }
    }

    entries.retain(|slot, visual| {
        let keep = drawn.contains(slot);
        if !keep {
            commands.entity(visual.entity).try_despawn();
        }
        keep
    });

    // Hidden decals keep their textures so showing them again is instant.
    let decals = state.decals();
    cache.retain(|(id, mirrored)| {
        decals
            .iter()
            .any(|decal| decal.id == *id && (!*mirrored || decal.mirror))
    });
}

pub fn draw_selection_outline(
    mut gizmos: Gizmos,
    state: Res<EditorState>,
    visuals: Res<DecalVisuals>,
    globals: Query<&GlobalTransform>,
) {
    if state.interaction.review {
        return;
    }
    let Some(decal) = state.selected_decal() else {
        return;
    };
    let Some(visual) = visuals.entries.get(&(decal.id, false)) else {
        return;
    };
    let Ok(parent) = globals.get(visual.parent) else {
        return;
    };

    let size = Vec2::new(decal.scale.x, decal.scale.y) * OUTLINE_MARGIN;
    let (translation, rotation, _) = quad_frame(decal.position, decal.rotation, size);
    let local = Transform {
        translation,
        rotation,
        scale: size.extend(decal.projection_depth()),
    };
    gizmos.cube(parent.mul_transform(local), Color::srgba(0.23, 0.51, 0.96, 0.6));
}

/// Keeps the model meshes' wireframe in line with the view toggle.
pub fn sync_wireframe(
    mut commands: Commands,
    state: Res<EditorState>,
    meshes: Query<(Entity, Has<Wireframe>), With<TargetMesh>>,
) {
    let wanted = state.view.wireframe;
    for (entity, drawn) in &meshes {
        match (wanted, drawn) {
            (true, false) => {
                commands.entity(entity).insert(Wireframe);
            }
            (false, true) => {
                commands.entity(entity).remove::<Wireframe>();
            }
            _ => {}
        }
    }
}

pub fn draw_grid_system(mut gizmos: Gizmos, state: Res<EditorState>) {
    if !state.view.show_grid {
        return;
    }

    let extent = GRID_EXTENT_UNITS as f32;
    let y = 0.0;

    for i in -GRID_EXTENT_UNITS..=GRID_EXTENT_UNITS {
        let f = i as f32;
        let is_major = i % GRID_MAJOR_STEP_UNITS == 0;
        let color = if is_major {
            Color::srgba(0.23, 0.51, 0.96, 0.45)
        } else {
            Color::srgba(0.12, 0.12, 0.14, 0.6)
        };

        gizmos.line(Vec3::new(-extent, y, f), Vec3::new(extent, y, f), color);
        gizmos.line(Vec3::new(f, y, -extent), Vec3::new(f, y, extent), color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decal_editor::decal::{DecalColor, DecalIdAllocator, DecalKind, DecalSpec, MeshKey, create};
    use crate::decal_editor::mirror::{mirrored, primary};
    use approx::assert_relative_eq;

    fn decal() -> Decal {
        let mut ids = DecalIdAllocator::default();
        let mut decal = create(
            &mut ids,
            DecalSpec {
                kind: DecalKind::Text,
                content: "HI".to_string(),
                position: Vec3::new(0.1, 0.2, 0.3),
                rotation: Vec3::ZERO,
                base_size: 0.2,
                mesh: MeshKey::new("Body"),
                color: DecalColor::DEFAULT,
            },
        );
        decal.scale = Vec3::new(0.4, 0.2, 0.2);
        decal.opacity = 0.5;
        decal
    }

    #[test]
    fn quad_uses_visible_extents() {
        let decal = decal();
        let transform = quad_transform(&primary(&decal), &decal);
        assert_eq!(transform.scale, Vec3::new(0.4, 0.2, 1.0));
        assert_relative_eq!(transform.translation.x, 0.1);
        assert!(transform.translation.z > 0.3);
    }

    #[test]
    fn material_stays_invisible_until_textured() {
        let decal = decal();
        let mut material = decal_material(&decal, None);
        assert_eq!(material.base_color.alpha(), 0.0);

        material.base_color_texture = Some(Handle::default());
        apply_material(&mut material, &decal);
        assert_relative_eq!(material.base_color.alpha(), 0.5);
        assert_eq!(material.alpha_mode, AlphaMode::Blend);
    }

    #[test]
    fn only_primary_quads_are_pickable() {
        let mut decal = decal();
        decal.mirror = true;
        let quads: Vec<DecalQuad> = projections(&decal).map(|p| DecalQuad::from(&p)).collect();
        assert_eq!(quads.len(), 2);
        assert!(pickable(&DecalQuad::from(&primary(&decal))));
        assert!(!pickable(&DecalQuad::from(&mirrored(&decal))));
        assert_eq!(
            quads.iter().filter(|quad| pickable(quad)).map(|quad| quad.mirrored).collect::<Vec<_>>(),
            vec![false]
        );
    }

    #[test]
    fn wireframe_follows_the_toggle_on_model_meshes_only() {
        use crate::decal_editor::settings::EditorSettings;
        use bevy::ecs::system::RunSystemOnce;

        let mut world = World::new();
        world.insert_resource(EditorState::new(EditorSettings::default()));
        let mesh = world.spawn(TargetMesh(MeshKey::new("Body"))).id();
        let quad = world.spawn(DecalQuad::from(&primary(&decal()))).id();

        world.resource_mut::<EditorState>().view.wireframe = true;
        world.run_system_once(sync_wireframe).expect("system runs");
        assert!(world.entity(mesh).contains::<Wireframe>());
        assert!(!world.entity(quad).contains::<Wireframe>());

        world.resource_mut::<EditorState>().view.wireframe = false;
        world.run_system_once(sync_wireframe).expect("system runs");
        assert!(!world.entity(mesh).contains::<Wireframe>());
    }
}
