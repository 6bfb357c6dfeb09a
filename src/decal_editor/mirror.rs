//! Derived mirror instances. A mirrored decal is computed from its primary on
//! demand and never stored, picked or dragged on its own.

use crate::decal_editor::decal::{Decal, DecalId};
use crate::decal_editor::resolver::rotation_quat;
use bevy::math::{Quat, Vec2, Vec3};

/// Offset of a rendered quad along its own normal, relative to its size.
pub const SURFACE_LIFT_RATIO: f32 = 0.002;

/// Reflects a local placement across the mesh's YZ plane.
pub fn mirror_placement(position: Vec3, rotation: Vec3) -> (Vec3, Vec3) {
    (
        Vec3::new(-position.x, position.y, position.z),
        Vec3::new(rotation.x, -rotation.y, -rotation.z),
    )
}

/// One rendered instance of a decal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub decal: DecalId,
    pub mirrored: bool,
    pub position: Vec3,
    pub rotation: Vec3,
}

impl Projection {
    /// Only the primary instance reacts to picking and dragging.
    pub fn is_interactive(&self) -> bool {
        !self.mirrored
    }
}

/// Translation, rotation and scale of the flat quad drawn for a projection,
/// in the target mesh's local space.
pub fn quad_frame(position: Vec3, rotation: Vec3, size: Vec2) -> (Vec3, Quat, Vec3) {
    let rotation = rotation_quat(rotation);
    let lift = rotation * Vec3::Z * (size.max_element() * SURFACE_LIFT_RATIO);
    (position + lift, rotation, size.extend(1.0))
}

pub fn primary(decal: &Decal) -> Projection {
    Projection {
        decal: decal.id,
        mirrored: false,
        position: decal.position,
        rotation: decal.rotation,
    }
}

pub fn mirrored(decal: &Decal) -> Projection {
    let (position, rotation) = mirror_placement(decal.position, decal.rotation);
    Projection {
        decal: decal.id,
        mirrored: true,
        position,
        rotation,
    }
}

/// Instances to render for a decal: none when hidden, two when mirrored.
pub fn projections(decal: &Decal) -> impl Iterator<Item = Projection> {
    let visible = decal.visible;
    let primary = visible.then(|| primary(decal));
    let mirrored = (visible && decal.mirror).then(|| mirrored(decal));
    primary.into_iter().chain(mirrored)
}
