//! Small transform helpers shared by the node hierarchy, the physics bridge
//! and the script interpreter.
//!
//! Authored and scripted rotations are Euler angles in degrees using the XYZ
//! order; everything at runtime is a unit quaternion.

use glam::{EulerRot, Mat3, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Converts XYZ Euler angles expressed in degrees into a unit quaternion.
pub fn euler_degrees_to_quat(degrees: Vec3) -> Quat {
    Quat::from_euler(
        EulerRot::XYZ,
        degrees.x.to_radians(),
        degrees.y.to_radians(),
        degrees.z.to_radians(),
    )
    .normalize()
}

/// Converts a quaternion back into XYZ Euler angles in degrees.
pub fn quat_to_euler_degrees(rotation: Quat) -> Vec3 {
    let (x, y, z) = rotation.normalize().to_euler(EulerRot::XYZ);
    Vec3::new(x.to_degrees(), y.to_degrees(), z.to_degrees())
}

/// Position, rotation and scale triple.
///
/// Used both for world poses and for the cached parent-relative offset of a
/// node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn new(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            position,
            rotation,
            scale,
        }
    }

    /// Composes the TRS matrix.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Decomposes an affine matrix into its TRS parts.
    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, position) = matrix.to_scale_rotation_translation();
        Self {
            position,
            rotation: rotation.normalize(),
            scale,
        }
    }
}

/// Computes the offset that keeps `world` where it is once it hangs below
/// `parent`.
///
/// The position is expressed in the parent's rotated frame and divided by the
/// parent's scale per axis; a zero scale axis counts as one.
pub fn offset_from_parent(parent: &Transform, world: &Transform) -> Transform {
    let inverse_rotation = parent.rotation.inverse();
    let local = inverse_rotation * (world.position - parent.position);
    let divisor = Vec3::new(
        non_zero_or_one(parent.scale.x),
        non_zero_or_one(parent.scale.y),
        non_zero_or_one(parent.scale.z),
    );
    let scale = Vec3::new(
        world.scale.x / non_zero_or_one(parent.scale.x),
        world.scale.y / non_zero_or_one(parent.scale.y),
        world.scale.z / non_zero_or_one(parent.scale.z),
    );
    Transform {
        position: local / divisor,
        rotation: (inverse_rotation * world.rotation).normalize(),
        scale,
    }
}

/// Offset reproducing `world` exactly through [`apply_offset`]. Used when a
/// parented node's world pose is written directly.
pub fn offset_for_world_pose(parent: &Transform, world: &Transform) -> Transform {
    let inverse_rotation = parent.rotation.inverse();
    Transform {
        position: inverse_rotation * (world.position - parent.position),
        rotation: (inverse_rotation * world.rotation).normalize(),
        scale: world.scale,
    }
}

/// Derives a child's world position and rotation from its parent and offset.
///
/// Scale is intentionally not compounded; callers keep the child's own scale.
pub fn apply_offset(parent: &Transform, offset: &Transform) -> (Vec3, Quat) {
    let position = parent.position + parent.rotation * offset.position;
    let rotation = (parent.rotation * offset.rotation).normalize();
    (position, rotation)
}

/// Local transform of `world` relative to `parent_world`, obtained by
/// decomposing `inverse(parent_world) * world`.
pub fn decompose_relative(parent_world: Mat4, world: Mat4) -> Transform {
    Transform::from_matrix(parent_world.inverse() * world)
}

/// Rotation whose +Z axis points from `eye` towards `target`, using `up` as
/// the reference axis. Returns `None` when the two points coincide.
pub fn look_rotation(eye: Vec3, target: Vec3, up: Vec3) -> Option<Quat> {
    let forward = (target - eye).try_normalize()?;
    let mut right = up.cross(forward);
    if right.length_squared() < 1e-8 {
        // Looking straight along the up axis; nudge the reference.
        let nudged = if up.z.abs() < 0.9 { Vec3::Z } else { Vec3::X };
        right = nudged.cross(forward);
    }
    let right = right.normalize();
    let new_up = forward.cross(right);
    Some(Quat::from_mat3(&Mat3::from_cols(right, new_up, forward)).normalize())
}

fn non_zero_or_one(value: f32) -> f32 {
    if value == 0.0 {
        1.0
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn euler_round_trip_preserves_angles() {
        let degrees = Vec3::new(10.0, 20.0, 30.0);
        let back = quat_to_euler_degrees(euler_degrees_to_quat(degrees));
        assert!(back.abs_diff_eq(degrees, 1e-3));
    }

    #[test]
    fn offset_then_apply_restores_world_pose() {
        let parent = Transform::new(
            Vec3::new(1.0, 2.0, 3.0),
            euler_degrees_to_quat(Vec3::new(0.0, 90.0, 0.0)),
            Vec3::ONE,
        );
        let world = Transform::new(
            Vec3::new(4.0, 2.0, 3.0),
            euler_degrees_to_quat(Vec3::new(0.0, 45.0, 0.0)),
            Vec3::ONE,
        );
        let offset = offset_from_parent(&parent, &world);
        let (position, rotation) = apply_offset(&parent, &offset);
        assert!(position.abs_diff_eq(world.position, 1e-4));
        assert!(rotation.abs_diff_eq(world.rotation, 1e-4));
    }

    #[test]
    fn direct_writes_survive_scaled_parents() {
        let parent = Transform::new(Vec3::X, Quat::IDENTITY, Vec3::splat(2.0));
        let world = Transform::new(Vec3::new(5.0, 1.0, 0.0), Quat::IDENTITY, Vec3::ONE);
        let offset = offset_for_world_pose(&parent, &world);
        let (position, _) = apply_offset(&parent, &offset);
        assert!(position.abs_diff_eq(world.position, 1e-5));
    }

    #[test]
    fn zero_parent_scale_counts_as_one() {
        let parent = Transform::new(Vec3::ZERO, Quat::IDENTITY, Vec3::new(0.0, 2.0, 1.0));
        let world = Transform::new(Vec3::new(2.0, 2.0, 2.0), Quat::IDENTITY, Vec3::ONE);
        let offset = offset_from_parent(&parent, &world);
        assert_relative_eq!(offset.position.x, 2.0);
        assert_relative_eq!(offset.position.y, 1.0);
        assert_relative_eq!(offset.position.z, 2.0);
    }

    #[test]
    fn look_rotation_points_forward_axis_at_target() {
        let rotation = look_rotation(Vec3::ZERO, Vec3::new(5.0, 0.0, 0.0), Vec3::Y).unwrap();
        let forward = rotation * Vec3::Z;
        assert!(forward.abs_diff_eq(Vec3::X, 1e-5));
        assert!(look_rotation(Vec3::ONE, Vec3::ONE, Vec3::Y).is_none());
    }

    #[test]
    fn relative_decomposition_matches_offset() {
        let parent = Transform::new(Vec3::new(0.0, 1.0, 0.0), Quat::IDENTITY, Vec3::ONE);
        let child = Transform::new(Vec3::new(3.0, 1.0, 0.0), Quat::IDENTITY, Vec3::ONE);
        let local = decompose_relative(parent.matrix(), child.matrix());
        assert!(local.position.abs_diff_eq(Vec3::new(3.0, 0.0, 0.0), 1e-5));
    }
}
