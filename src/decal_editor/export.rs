//! Binary glTF export of the decorated model.
//!
//! Model meshes become root nodes carrying their world matrix. Every visible
//! decal projection becomes a textured quad node parented to its mesh node,
//! so the quad inherits the mesh transform exactly as it does in the viewport.

use crate::decal_editor::decal::{Decal, MeshKey};
use crate::decal_editor::mirror::{projections, quad_frame};
use crate::decal_editor::raster::{FontBook, ImageSource, RasterKey, rasterize};
use bevy::math::{Mat4, Vec2, Vec3};
use bevy::mesh::{PrimitiveTopology, VertexAttributeValues};
use bevy::prelude::{Assets, GlobalTransform, Image, Mesh, StandardMaterial};
use image::{ImageFormat, RgbaImage};
use serde_json::{Map, Value, json};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

const GLB_MAGIC: u32 = 0x4654_6C67;
const GLB_VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

const FLOAT: u32 = 5126;
const UNSIGNED_INT: u32 = 5125;
const ARRAY_BUFFER: u32 = 34962;
const ELEMENT_ARRAY_BUFFER: u32 = 34963;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("nothing to export: the scene has no meshes")]
    EmptyScene,
    #[error("mesh '{0}' has no triangle data")]
    InvalidMesh(String),
    #[error("failed to encode decal texture: {0}")]
    Png(#[from] image::ImageError),
    #[error("failed to encode scene description: {0}")]
    Json(#[from] serde_json::Error),
    #[error("scene exceeds the 4 GiB binary glTF limit")]
    TooLarge,
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ExportMesh {
    pub name: String,
    pub world: Mat4,
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub uvs: Option<Vec<[f32; 2]>>,
    pub indices: Option<Vec<u32>>,
    /// Linear RGBA.
    pub base_color: [f32; 4],
    pub base_color_png: Option<Vec<u8>>,
    pub roughness: f32,
    pub metalness: f32,
}

#[derive(Debug, Clone)]
pub struct ExportDecal {
    pub name: String,
    /// Index into [`ExportScene::meshes`].
    pub mesh: usize,
    pub position: Vec3,
    pub rotation: Vec3,
    pub size: Vec2,
    pub key: RasterKey,
    pub opacity: f32,
    pub roughness: f32,
    pub metalness: f32,
}

impl ExportDecal {
    /// Quad transform in the parent mesh's local space.
    pub fn local_matrix(&self) -> Mat4 {
        let (translation, rotation, scale) = quad_frame(self.position, self.rotation, self.size);
        Mat4::from_scale_rotation_translation(scale, rotation, translation)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExportScene {
    pub meshes: Vec<ExportMesh>,
    pub decals: Vec<ExportDecal>,
}

pub trait SceneExporter: Send {
    fn encode(&self, scene: &ExportScene) -> Result<Vec<u8>, ExportError>;

    fn write(&self, scene: &ExportScene, path: &Path) -> Result<usize, ExportError> {
        let bytes = self.encode(scene)?;
        fs::write(path, &bytes).map_err(|source| ExportError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!("exported {} bytes to {}", bytes.len(), path.display());
        Ok(bytes.len())
    }
}

/// Writes `.glb` files, rasterizing decal content on the calling thread.
pub struct GlbExporter {
    pub fonts: FontBook,
    pub images: Arc<dyn ImageSource>,
    pub raster_size: u32,
}

impl SceneExporter for GlbExporter {
    fn encode(&self, scene: &ExportScene) -> Result<Vec<u8>, ExportError> {
        if scene.meshes.is_empty() {
            return Err(ExportError::EmptyScene);
        }

        let mut doc = Document::default();
        let mut mesh_nodes = Vec::with_capacity(scene.meshes.len());
        for mesh in &scene.meshes {
            mesh_nodes.push(doc.add_model_mesh(mesh)?);
        }

        if !scene.decals.is_empty() {
            let quad = doc.add_quad_geometry();
            for decal in &scene.decals {
                let Some(parent) = mesh_nodes.get(decal.mesh).copied() else {
                    continue;
                };
                let raster = rasterize(&decal.key, &self.fonts, self.images.as_ref(), self.raster_size);
                let node = doc.add_decal(decal, &quad, &encode_png(&raster)?);
                doc.children[parent].push(node);
            }
        }

        let (json, bin) = doc.finish(&mesh_nodes);
        encode_glb(&serde_json::to_vec(&json)?, &bin)
    }
}

/// Snapshot of a model mesh for export. Only indexed or plain triangle lists
/// with float positions are supported.
pub fn export_mesh(
    name: &str,
    mesh: &Mesh,
    world: &GlobalTransform,
    material: Option<&StandardMaterial>,
    images: &Assets<Image>,
) -> Option<ExportMesh> {
    if mesh.primitive_topology() != PrimitiveTopology::TriangleList {
        return None;
    }
    let positions = match mesh.attribute(Mesh::ATTRIBUTE_POSITION)? {
        VertexAttributeValues::Float32x3(values) => values.clone(),
        _ => return None,
    };
    let normals = match mesh.attribute(Mesh::ATTRIBUTE_NORMAL) {
        Some(VertexAttributeValues::Float32x3(values)) => Some(values.clone()),
        _ => None,
    };
    let uvs = match mesh.attribute(Mesh::ATTRIBUTE_UV_0) {
        Some(VertexAttributeValues::Float32x2(values)) => Some(values.clone()),
        _ => None,
    };
    let indices = mesh
        .indices()
        .map(|indices| indices.iter().map(|i| i as u32).collect());

    let (base_color, base_color_png, roughness, metalness) = match material {
        Some(material) => {
            let png = material
                .base_color_texture
                .as_ref()
                .and_then(|handle| images.get(handle))
                .and_then(|image| match image.clone().try_into_dynamic() {
                    Ok(dynamic) => encode_png(&dynamic.to_rgba8()).ok(),
                    Err(err) => {
                        warn!("texture of mesh '{name}' not exported: {err}");
                        None
                    }
                });
            let linear = material.base_color.to_linear();
            (
                [linear.red, linear.green, linear.blue, linear.alpha],
                png,
                material.perceptual_roughness,
                material.metallic,
            )
        }
        None => ([0.8, 0.8, 0.8, 1.0], None, 0.5, 0.0),
    };

    Some(ExportMesh {
        name: name.to_string(),
        world: world.to_matrix(),
        positions,
        normals,
        uvs,
        indices,
        base_color,
        base_color_png,
        roughness,
        metalness,
    })
}

/// One export quad per visible projection; decals whose mesh cannot be
/// resolved are left out.
pub fn export_decals(
    decals: &[Decal],
    mesh_index: impl Fn(&MeshKey) -> Option<usize>,
) -> Vec<ExportDecal> {
    let mut out = Vec::new();
    for decal in decals {
        let Some(mesh) = mesh_index(&decal.mesh) else {
            warn!(id = %decal.id, mesh = %decal.mesh, "decal has no target mesh, not exported");
            continue;
        };
        for projection in projections(decal) {
            let name = if projection.mirrored {
                format!("{} mirror", decal.id)
            } else {
                decal.id.to_string()
            };
            out.push(ExportDecal {
                name,
                mesh,
                position: projection.position,
                rotation: projection.rotation,
                size: Vec2::new(decal.scale.x, decal.scale.y),
                key: RasterKey::for_decal(decal, projection.mirrored),
                opacity: decal.opacity,
                roughness: decal.roughness,
                metalness: decal.metalness,
            });
        }
    }
    out
}

/// Frames a JSON document and its binary buffer as a `.glb` file.
pub fn encode_glb(json: &[u8], bin: &[u8]) -> Result<Vec<u8>, ExportError> {
    let json_len = padded(json.len());
    let bin_len = padded(bin.len());
    let total = 12 + 8 + json_len + if bin.is_empty() { 0 } else { 8 + bin_len };
    let total = u32::try_from(total).map_err(|_| ExportError::TooLarge)?;

    let mut out = Vec::with_capacity(total as usize);
    out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    out.extend_from_slice(&GLB_VERSION.to_le_bytes());
    out.extend_from_slice(&total.to_le_bytes());

    out.extend_from_slice(&(json_len as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    out.extend_from_slice(json);
    out.resize(out.len() + json_len - json.len(), b' ');

    if !bin.is_empty() {
        out.extend_from_slice(&(bin_len as u32).to_le_bytes());
        out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
        out.extend_from_slice(bin);
        out.resize(out.len() + bin_len - bin.len(), 0);
    }
    Ok(out)
}

fn padded(len: usize) -> usize {
    len.div_ceil(4) * 4
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ExportError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// Accessor indices of the shared unit quad.
struct QuadGeometry {
    positions: usize,
    normals: usize,
    uvs: usize,
    indices: usize,
}

#[derive(Default)]
struct Document {
    bin: Vec<u8>,
    views: Vec<Value>,
    accessors: Vec<Value>,
    meshes: Vec<Value>,
    materials: Vec<Value>,
    images: Vec<Value>,
    textures: Vec<Value>,
    nodes: Vec<Value>,
    children: Vec<Vec<usize>>,
}

impl Document {
    fn push_view(&mut self, bytes: &[u8], target: Option<u32>) -> usize {
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }
        let mut view = Map::new();
        view.insert("buffer".into(), json!(0));
        view.insert("byteOffset".into(), json!(self.bin.len()));
        view.insert("byteLength".into(), json!(bytes.len()));
        if let Some(target) = target {
            view.insert("target".into(), json!(target));
        }
        self.bin.extend_from_slice(bytes);
        self.views.push(Value::Object(view));
        self.views.len() - 1
    }

    fn push_accessor(&mut self, accessor: Value) -> usize {
        self.accessors.push(accessor);
        self.accessors.len() - 1
    }

    fn push_vec3(&mut self, data: &[[f32; 3]], with_bounds: bool) -> usize {
        let bytes: Vec<u8> = data.iter().flatten().flat_map(|v| v.to_le_bytes()).collect();
        let view = self.push_view(&bytes, Some(ARRAY_BUFFER));
        let mut accessor = json!({
            "bufferView": view,
            "componentType": FLOAT,
            "count": data.len(),
            "type": "VEC3",
        });
        if with_bounds {
            let (min, max) = data.iter().fold(
                (Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)),
                |(min, max), p| (min.min(Vec3::from(*p)), max.max(Vec3::from(*p))),
            );
            accessor["min"] = json!(min.to_array());
            accessor["max"] = json!(max.to_array());
        }
        self.push_accessor(accessor)
    }

    fn push_vec2(&mut self, data: &[[f32; 2]]) -> usize {
        let bytes: Vec<u8> = data.iter().flatten().flat_map(|v| v.to_le_bytes()).collect();
        let view = self.push_view(&bytes, Some(ARRAY_BUFFER));
        self.push_accessor(json!({
            "bufferView": view,
            "componentType": FLOAT,
            "count": data.len(),
            "type": "VEC2",
        }))
    }

    fn push_indices(&mut self, data: &[u32]) -> usize {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        let view = self.push_view(&bytes, Some(ELEMENT_ARRAY_BUFFER));
        self.push_accessor(json!({
            "bufferView": view,
            "componentType": UNSIGNED_INT,
            "count": data.len(),
            "type": "SCALAR",
        }))
    }

    fn push_texture(&mut self, png: &[u8]) -> usize {
        let view = self.push_view(png, None);
        self.images.push(json!({ "bufferView": view, "mimeType": "image/png" }));
        self.textures.push(json!({ "sampler": 0, "source": self.images.len() - 1 }));
        self.textures.len() - 1
    }

    fn push_node(&mut self, node: Value) -> usize {
        self.nodes.push(node);
        self.children.push(Vec::new());
        self.nodes.len() - 1
    }

    fn add_model_mesh(&mut self, mesh: &ExportMesh) -> Result<usize, ExportError> {
        if mesh.positions.is_empty() {
            return Err(ExportError::InvalidMesh(mesh.name.clone()));
        }
        let vertex_count = mesh.positions.len();
        if let Some(indices) = &mesh.indices {
            if indices.is_empty() || indices.iter().any(|i| *i as usize >= vertex_count) {
                return Err(ExportError::InvalidMesh(mesh.name.clone()));
            }
        }

        let mut attributes = Map::new();
        attributes.insert("POSITION".into(), json!(self.push_vec3(&mesh.positions, true)));
        if let Some(normals) = mesh.normals.as_ref().filter(|n| n.len() == vertex_count) {
            attributes.insert("NORMAL".into(), json!(self.push_vec3(normals, false)));
        }
        if let Some(uvs) = mesh.uvs.as_ref().filter(|uv| uv.len() == vertex_count) {
            attributes.insert("TEXCOORD_0".into(), json!(self.push_vec2(uvs)));
        }

        let mut pbr = json!({
            "baseColorFactor": mesh.base_color,
            "metallicFactor": mesh.metalness,
            "roughnessFactor": mesh.roughness,
        });
        if let (Some(png), true) = (&mesh.base_color_png, attributes.contains_key("TEXCOORD_0")) {
            let texture = self.push_texture(png);
            pbr["baseColorTexture"] = json!({ "index": texture });
        }
        self.materials.push(json!({
            "name": mesh.name,
            "pbrMetallicRoughness": pbr,
            "doubleSided": true,
        }));

        let mut primitive = json!({
            "attributes": attributes,
            "material": self.materials.len() - 1,
        });
        if let Some(indices) = &mesh.indices {
            primitive["indices"] = json!(self.push_indices(indices));
        }
        self.meshes.push(json!({ "name": mesh.name, "primitives": [primitive] }));

        Ok(self.push_node(json!({
            "name": mesh.name,
            "mesh": self.meshes.len() - 1,
            "matrix": mesh.world.to_cols_array(),
        })))
    }

    fn add_quad_geometry(&mut self) -> QuadGeometry {
        QuadGeometry {
            positions: self.push_vec3(
                &[
                    [-0.5, -0.5, 0.0],
                    [0.5, -0.5, 0.0],
                    [0.5, 0.5, 0.0],
                    [-0.5, 0.5, 0.0],
                ],
                true,
            ),
            normals: self.push_vec3(&[[0.0, 0.0, 1.0]; 4], false),
            uvs: self.push_vec2(&[[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]]),
            indices: self.push_indices(&[0, 1, 2, 0, 2, 3]),
        }
    }

    fn add_decal(&mut self, decal: &ExportDecal, quad: &QuadGeometry, png: &[u8]) -> usize {
        let texture = self.push_texture(png);
        self.materials.push(json!({
            "name": decal.name,
            "pbrMetallicRoughness": {
                "baseColorTexture": { "index": texture },
                "baseColorFactor": [1.0, 1.0, 1.0, decal.opacity.clamp(0.0, 1.0)],
                "metallicFactor": decal.metalness,
                "roughnessFactor": decal.roughness,
            },
            "alphaMode": "BLEND",
            "doubleSided": true,
        }));
        self.meshes.push(json!({
            "name": decal.name,
            "primitives": [{
                "attributes": {
                    "POSITION": quad.positions,
                    "NORMAL": quad.normals,
                    "TEXCOORD_0": quad.uvs,
                },
                "indices": quad.indices,
                "material": self.materials.len() - 1,
            }],
        }));
        self.push_node(json!({
            "name": decal.name,
            "mesh": self.meshes.len() - 1,
            "matrix": decal.local_matrix().to_cols_array(),
        }))
    }

    fn finish(mut self, roots: &[usize]) -> (Value, Vec<u8>) {
        for (node, children) in self.nodes.iter_mut().zip(&self.children) {
            if !children.is_empty() {
                node["children"] = json!(children);
            }
        }

        let mut root = Map::new();
        root.insert(
            "asset".into(),
            json!({ "version": "2.0", "generator": concat!("decal-studio ", env!("CARGO_PKG_VERSION")) }),
        );
        root.insert("scene".into(), json!(0));
        root.insert("scenes".into(), json!([{ "nodes": roots }]));
        root.insert("nodes".into(), json!(self.nodes));
        root.insert("meshes".into(), json!(self.meshes));
        root.insert("materials".into(), json!(self.materials));
        root.insert("accessors".into(), json!(self.accessors));
        root.insert("bufferViews".into(), json!(self.views));
        root.insert("buffers".into(), json!([{ "byteLength": self.bin.len() }]));
        if !self.textures.is_empty() {
            root.insert("images".into(), json!(self.images));
            root.insert("textures".into(), json!(self.textures));
            root.insert(
                "samplers".into(),
                json!([{ "magFilter": 9729, "minFilter": 9987, "wrapS": 33071, "wrapT": 33071 }]),
            );
        }
        (Value::Object(root), self.bin)
    }
}
