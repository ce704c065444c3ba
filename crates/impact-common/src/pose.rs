//! Rigid poses (position + rotation) in world space.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Position and rotation of an object in world space.
///
/// Forward is `+Z`, up is `+Y`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// World position.
    pub position: Vec3,
    /// World rotation.
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    /// Pose at the origin with no rotation.
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    /// Creates a new pose.
    #[must_use]
    pub const fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Creates an unrotated pose at a position.
    #[must_use]
    pub const fn from_position(position: Vec3) -> Self {
        Self::new(position, Quat::IDENTITY)
    }

    /// Creates a pose at `position` facing `forward` (rotation about `+Y` only).
    #[must_use]
    pub fn facing(position: Vec3, forward: Vec3) -> Self {
        let flat = Vec3::new(forward.x, 0.0, forward.z);
        if flat.length_squared() < f32::EPSILON {
            return Self::from_position(position);
        }
        Self::new(position, Quat::from_rotation_y(flat.x.atan2(flat.z)))
    }

    /// Forward direction.
    #[must_use]
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }

    /// Up direction.
    #[must_use]
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// Transforms a point from local space into world space.
    #[must_use]
    pub fn transform_point(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation * local
    }

    /// Transforms a world point into this pose's local space.
    #[must_use]
    pub fn inverse_transform_point(&self, world: Vec3) -> Vec3 {
        self.rotation.inverse() * (world - self.position)
    }

    /// Returns this pose translated by `offset`.
    #[must_use]
    pub fn translated(&self, offset: Vec3) -> Self {
        Self::new(self.position + offset, self.rotation)
    }

    /// Interpolates between two poses (linear position, spherical rotation).
    #[must_use]
    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self::new(
            self.position.lerp(other.position, t),
            self.rotation.slerp(other.rotation, t),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_follows_rotation() {
        let pose = Pose::facing(Vec3::ZERO, Vec3::X);
        assert!((pose.forward() - Vec3::X).length() < 1e-5);
    }

    #[test]
    fn test_local_round_trip() {
        let pose = Pose::facing(Vec3::new(1.0, 2.0, 3.0), Vec3::new(-1.0, 0.0, 1.0));
        let world = pose.transform_point(Vec3::new(0.5, 0.0, 2.0));
        let local = pose.inverse_transform_point(world);
        assert!((local - Vec3::new(0.5, 0.0, 2.0)).length() < 1e-4);
    }

    #[test]
    fn test_lerp_endpoints() {
        let a = Pose::from_position(Vec3::ZERO);
        let b = Pose::facing(Vec3::new(2.0, 0.0, 0.0), Vec3::X);
        assert_eq!(a.lerp(&b, 0.0).position, a.position);
        assert!((a.lerp(&b, 1.0).position - b.position).length() < 1e-5);
        assert!((a.lerp(&b, 0.5).position - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-5);
    }
}
