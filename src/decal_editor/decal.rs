use bevy::math::Vec3;
use std::fmt;

/// Projection depth as a fraction of the larger visible extent.
pub const DEPTH_FACTOR: f32 = 0.3;
/// Smallest offset a duplicate is moved by, so it never lands on its source.
pub const MIN_DUPLICATE_OFFSET: f32 = 1.0e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DecalId(u64);

impl DecalId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DecalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "decal-{}", self.0)
    }
}

/// Hands out decal ids for the whole session. Undo never rewinds it, so an id
/// that existed once is never handed out again.
#[derive(Debug, Default)]
pub struct DecalIdAllocator {
    next: u64,
}

impl DecalIdAllocator {
    pub fn allocate(&mut self) -> DecalId {
        self.next += 1;
        DecalId(self.next)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecalKind {
    Text,
    Logo,
}

impl DecalKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Text => "Text",
            Self::Logo => "Logo",
        }
    }
}

/// Mesh a decal is attached to: the node name, or a generated id for unnamed meshes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshKey(pub String);

impl MeshKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MeshKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// sRGB foreground color of a text decal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecalColor(pub [u8; 3]);

impl DecalColor {
    pub const DEFAULT: Self = Self([0x3b, 0x82, 0xf6]);

    pub fn parse_hex(raw: &str) -> Option<Self> {
        let hex = raw.trim().strip_prefix('#').unwrap_or(raw.trim());
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self([channel(0)?, channel(2)?, channel(4)?]))
    }

    pub fn to_hex(self) -> String {
        let [r, g, b] = self.0;
        format!("#{r:02x}{g:02x}{b:02x}")
    }
}

impl Default for DecalColor {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decal {
    pub id: DecalId,
    pub kind: DecalKind,
    pub content: String,
    /// Anchor in the target mesh's local space.
    pub position: Vec3,
    /// XYZ Euler angles in the target mesh's local space; +Z faces out of the surface.
    pub rotation: Vec3,
    pub scale: Vec3,
    pub mesh: MeshKey,
    pub color: DecalColor,
    pub opacity: f32,
    pub roughness: f32,
    pub metalness: f32,
    pub visible: bool,
    pub mirror: bool,
}

impl Decal {
    pub fn projection_depth(&self) -> f32 {
        self.scale.x.max(self.scale.y) * DEPTH_FACTOR
    }

    pub fn size(&self) -> f32 {
        self.scale.x.max(self.scale.y)
    }

    pub fn label(&self) -> String {
        match self.kind {
            DecalKind::Text => self.content.clone(),
            DecalKind::Logo => {
                let name = self
                    .content
                    .rsplit(['/', '\\'])
                    .next()
                    .filter(|name| !name.is_empty())
                    .unwrap_or("image");
                format!("Logo: {name}")
            }
        }
    }
}

/// Everything the placement gesture knows about a new decal.
#[derive(Debug, Clone)]
pub struct DecalSpec {
    pub kind: DecalKind,
    pub content: String,
    pub position: Vec3,
    pub rotation: Vec3,
    pub base_size: f32,
    pub mesh: MeshKey,
    pub color: DecalColor,
}

pub fn create(allocator: &mut DecalIdAllocator, spec: DecalSpec) -> Decal {
    Decal {
        id: allocator.allocate(),
        kind: spec.kind,
        content: spec.content,
        position: spec.position,
        rotation: spec.rotation,
        scale: Vec3::splat(spec.base_size),
        mesh: spec.mesh,
        color: spec.color,
        opacity: 1.0,
        roughness: 0.5,
        metalness: 0.0,
        visible: true,
        mirror: false,
    }
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecalPatch {
    pub content: Option<String>,
    pub position: Option<Vec3>,
    pub rotation: Option<Vec3>,
    pub scale: Option<Vec3>,
    pub mesh: Option<MeshKey>,
    pub color: Option<DecalColor>,
    pub opacity: Option<f32>,
    pub roughness: Option<f32>,
    pub metalness: Option<f32>,
    pub visible: Option<bool>,
    pub mirror: Option<bool>,
}

impl DecalPatch {
    pub fn placement(position: Vec3, rotation: Vec3, mesh: MeshKey) -> Self {
        Self {
            position: Some(position),
            rotation: Some(rotation),
            mesh: Some(mesh),
            ..Default::default()
        }
    }

    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn color(color: DecalColor) -> Self {
        Self {
            color: Some(color),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_to(&self, decal: &mut Decal) {
        if let Some(content) = &self.content {
            decal.content.clone_from(content);
        }
        if let Some(position) = self.position {
            decal.position = position;
        }
        if let Some(rotation) = self.rotation {
            decal.rotation = rotation;
        }
        if let Some(scale) = self.scale {
            decal.scale = scale;
        }
        if let Some(mesh) = &self.mesh {
            decal.mesh.clone_from(mesh);
        }
        if let Some(color) = self.color {
            decal.color = color;
        }
        if let Some(opacity) = self.opacity {
            decal.opacity = opacity;
        }
        if let Some(roughness) = self.roughness {
            decal.roughness = roughness;
        }
        if let Some(metalness) = self.metalness {
            decal.metalness = metalness;
        }
        if let Some(visible) = self.visible {
            decal.visible = visible;
        }
        if let Some(mirror) = self.mirror {
            decal.mirror = mirror;
        }
    }
}

pub fn find(decals: &[Decal], id: DecalId) -> Option<&Decal> {
    decals.iter().find(|decal| decal.id == id)
}

pub fn update(decals: &[Decal], id: DecalId, patch: &DecalPatch) -> Vec<Decal> {
    decals
        .iter()
        .map(|decal| {
            let mut decal = decal.clone();
            if decal.id == id {
                patch.apply_to(&mut decal);
            }
            decal
        })
        .collect()
}

/// Returns the remaining decals and the selection that survives the removal.
pub fn remove(
    decals: &[Decal],
    id: DecalId,
    selected: Option<DecalId>,
) -> (Vec<Decal>, Option<DecalId>) {
    let remaining = decals
        .iter()
        .filter(|decal| decal.id != id)
        .cloned()
        .collect();
    let selected = selected.filter(|selected| *selected != id);
    (remaining, selected)
}

pub fn duplicate(
    decals: &[Decal],
    id: DecalId,
    reference_scale: f32,
    offset_ratio: f32,
    allocator: &mut DecalIdAllocator,
) -> Option<(Vec<Decal>, DecalId)> {
    let source = find(decals, id)?;
    let offset = (reference_scale * offset_ratio)
        .abs()
        .max(MIN_DUPLICATE_OFFSET);
    let copy = Decal {
        id: allocator.allocate(),
        position: source.position + Vec3::X * offset,
        ..source.clone()
    };
    let new_id = copy.id;
    let mut out = decals.to_vec();
    out.push(copy);
    Some((out, new_id))
}

/// Field-level diff between two states of the same decal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecalChanges {
    pub kind: bool,
    pub content: bool,
    pub color: bool,
    pub mirror: bool,
    pub transform: bool,
    pub mesh: bool,
    pub material: bool,
    pub visible: bool,
}

impl DecalChanges {
    pub fn between(old: &Decal, new: &Decal) -> Self {
        Self {
            kind: old.kind != new.kind,
            content: old.content != new.content,
            color: old.color != new.color,
            mirror: old.mirror != new.mirror,
            transform: old.position != new.position
                || old.rotation != new.rotation
                || old.scale != new.scale,
            mesh: old.mesh != new.mesh,
            material: old.opacity != new.opacity
                || old.roughness != new.roughness
                || old.metalness != new.metalness,
            visible: old.visible != new.visible,
        }
    }

    /// Only these fields feed the rasterizer; transform edits never do.
    pub fn needs_raster(&self) -> bool {
        self.kind || self.content || self.color || self.mirror
    }

    pub fn needs_transform(&self) -> bool {
        self.transform || self.mesh
    }

    pub fn needs_material(&self) -> bool {
        self.material
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn spec(content: &str) -> DecalSpec {
        DecalSpec {
            kind: DecalKind::Text,
            content: content.to_string(),
            position: Vec3::new(0.1, 0.2, 0.3),
            rotation: Vec3::new(0.0, 0.5, 0.0),
            base_size: 0.15,
            mesh: MeshKey::new("Body"),
            color: DecalColor::DEFAULT,
        }
    }

    #[test]
    fn create_applies_defaults() {
        let mut ids = DecalIdAllocator::default();
        let decal = create(&mut ids, spec("X"));
        assert_eq!(decal.scale, Vec3::splat(0.15));
        assert_eq!(decal.opacity, 1.0);
        assert_eq!(decal.roughness, 0.5);
        assert_eq!(decal.metalness, 0.0);
        assert!(decal.visible);
        assert!(!decal.mirror);
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let mut ids = DecalIdAllocator::default();
        let a = create(&mut ids, spec("A"));
        let b = create(&mut ids, spec("B"));
        assert_ne!(a.id, b.id);
        assert!(b.id > a.id);
    }

    #[test]
    fn update_unknown_id_is_noop() {
        let mut ids = DecalIdAllocator::default();
        let decals = vec![create(&mut ids, spec("A"))];
        let stranger = ids.allocate();
        let after = update(&decals, stranger, &DecalPatch::content("changed"));
        assert_eq!(after, decals);
    }

    #[test]
    fn update_touches_only_patched_fields() {
        let mut ids = DecalIdAllocator::default();
        let decals = vec![create(&mut ids, spec("A")), create(&mut ids, spec("B"))];
        let target = decals[1].id;
        let after = update(&decals, target, &DecalPatch::color(DecalColor([1, 2, 3])));
        assert_eq!(after[0], decals[0]);
        assert_eq!(after[1].color, DecalColor([1, 2, 3]));
        assert_eq!(after[1].content, "B");
    }

    #[test]
    fn remove_clears_selection_of_removed_decal() {
        let mut ids = DecalIdAllocator::default();
        let decals = vec![create(&mut ids, spec("A")), create(&mut ids, spec("B"))];
        let (left, selected) = remove(&decals, decals[0].id, Some(decals[0].id));
        assert_eq!(left.len(), 1);
        assert_eq!(selected, None);

        let (_, selected) = remove(&decals, decals[0].id, Some(decals[1].id));
        assert_eq!(selected, Some(decals[1].id));
    }

    #[rstest]
    #[case(1.0)]
    #[case(0.0)]
    #[case(-2.0)]
    fn duplicate_moves_copy_off_source(#[case] reference_scale: f32) {
        let mut ids = DecalIdAllocator::default();
        let mut source = create(&mut ids, spec("A"));
        source.opacity = 0.4;
        source.color = DecalColor([9, 9, 9]);
        let decals = vec![source.clone()];

        let (after, new_id) = duplicate(&decals, source.id, reference_scale, 0.05, &mut ids)
            .expect("source exists");
        let copy = find(&after, new_id).expect("copy is stored");

        assert_ne!(copy.id, source.id);
        assert_ne!(copy.position, source.position);
        assert!(copy.position.x > source.position.x);
        assert_eq!(copy.position.y, source.position.y);
        assert_eq!(copy.position.z, source.position.z);
        assert_eq!(copy.kind, source.kind);
        assert_eq!(copy.content, source.content);
        assert_eq!(copy.color, source.color);
        assert_eq!(copy.opacity, source.opacity);
        assert_eq!(copy.rotation, source.rotation);
        assert_eq!(copy.scale, source.scale);
    }

    #[test]
    fn duplicate_of_unknown_id_is_none() {
        let mut ids = DecalIdAllocator::default();
        let missing = ids.allocate();
        assert!(duplicate(&[], missing, 1.0, 0.05, &mut ids).is_none());
    }

    #[rstest]
    #[case("#3b82f6", Some(DecalColor([0x3b, 0x82, 0xf6])))]
    #[case("ffffff", Some(DecalColor([255, 255, 255])))]
    #[case("#12345", None)]
    #[case("#zzzzzz", None)]
    fn parses_hex_colors(#[case] raw: &str, #[case] expected: Option<DecalColor>) {
        assert_eq!(DecalColor::parse_hex(raw), expected);
    }

    #[test]
    fn transform_changes_do_not_request_raster() {
        let mut ids = DecalIdAllocator::default();
        let old = create(&mut ids, spec("A"));
        let mut moved = old.clone();
        moved.position.x += 1.0;
        moved.scale *= 2.0;
        let changes = DecalChanges::between(&old, &moved);
        assert!(changes.needs_transform());
        assert!(!changes.needs_raster());

        let mut recolored = old.clone();
        recolored.color = DecalColor([0, 0, 0]);
        assert!(DecalChanges::between(&old, &recolored).needs_raster());

        let mut mirrored = old.clone();
        mirrored.mirror = true;
        assert!(DecalChanges::between(&old, &mirrored).needs_raster());
    }
}
