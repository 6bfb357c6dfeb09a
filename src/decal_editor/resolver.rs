//! Turns a world-space surface hit into a decal anchor in the hit mesh's
//! local space.
//!
//! Points go through the inverse world transform. Normals go through the
//! transpose of the linear part, which is the inverse-transpose rule read in
//! the world-to-local direction and keeps non-uniformly scaled meshes correct.

use bevy::math::{Affine3A, EulerRot, Mat3, Quat, Vec3};

/// Nudge applied to a forward vector that is parallel to the up hint.
const PARALLEL_NUDGE: f32 = 1.0e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub position: Vec3,
    /// XYZ Euler angles whose +Z axis is the local surface normal.
    pub rotation: Vec3,
}

pub fn resolve_placement(hit_point: Vec3, hit_normal: Vec3, mesh_world: &Affine3A) -> Placement {
    let position = mesh_world.inverse().transform_point3(hit_point);
    let linear = Mat3::from(mesh_world.matrix3);
    let local_normal = linear.transpose() * hit_normal;
    Placement {
        position,
        rotation: look_rotation(local_normal),
    }
}

/// Euler angles of a frame whose +Z points along `forward`, with +Y as the up hint.
pub fn look_rotation(forward: Vec3) -> Vec3 {
    let mut z = forward.normalize_or_zero();
    if z == Vec3::ZERO {
        return Vec3::ZERO;
    }

    let mut x = Vec3::Y.cross(z);
    if x.length_squared() < 1.0e-12 {
        z.z += PARALLEL_NUDGE;
        z = z.normalize();
        x = Vec3::Y.cross(z);
    }
    let x = x.normalize();
    let y = z.cross(x);

    let (rx, ry, rz) = Quat::from_mat3(&Mat3::from_cols(x, y, z)).to_euler(EulerRot::XYZ);
    Vec3::new(rx, ry, rz)
}

pub fn rotation_quat(rotation: Vec3) -> Quat {
    Quat::from_euler(EulerRot::XYZ, rotation.x, rotation.y, rotation.z)
}

/// Projection axis of a decal with the given Euler rotation.
pub fn forward_axis(rotation: Vec3) -> Vec3 {
    rotation_quat(rotation) * Vec3::Z
}
