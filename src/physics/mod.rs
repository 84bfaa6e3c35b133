//! Rigid-body world contract required by the physics bridge components.
//!
//! The runtime never simulates anything itself: bodies, colliders and joints
//! are created through [`PhysicsWorld`] and the node transforms are
//! synchronised against it every frame. Removal calls are idempotent.

use glam::{Quat, Vec3};

use crate::error::PhysicsError;
use crate::scene::{BodyKind, ShapeDescription};

mod headless;

pub use headless::HeadlessPhysics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColliderHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JointHandle(pub u64);

/// Initial state of a rigid body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidBodyDesc {
    pub kind: BodyKind,
    pub position: Vec3,
    pub rotation: Quat,
    pub mass: f32,
}

/// Joint frames are expressed in each body's local space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JointKind {
    /// Locks body B to body A. `frame2` is B's rotation relative to A.
    Fixed {
        anchor1: Vec3,
        anchor2: Vec3,
        frame2: Quat,
    },
    /// Hinge around `axis`, given in body A's local frame.
    Revolute {
        axis: Vec3,
        anchor1: Vec3,
        anchor2: Vec3,
    },
}

/// Drive applied to a revolute joint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotorConfig {
    Velocity {
        target_velocity: f32,
        factor: f32,
    },
    /// `target_position` is in radians.
    Position {
        target_position: f32,
        stiffness: f32,
        damping: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub body: BodyHandle,
    pub collider: ColliderHandle,
    pub distance: f32,
    pub point: Vec3,
}

/// Capabilities the runtime needs from a physics engine.
pub trait PhysicsWorld: Send {
    fn create_body(&mut self, desc: &RigidBodyDesc) -> BodyHandle;

    fn create_collider(
        &mut self,
        shape: &ShapeDescription,
        body: BodyHandle,
    ) -> Result<ColliderHandle, PhysicsError>;

    /// Returns `false` when the collider was already gone.
    fn remove_collider(&mut self, collider: ColliderHandle) -> bool;

    /// Returns `false` when the body was already gone. Attached colliders and
    /// joints go with it.
    fn remove_body(&mut self, body: BodyHandle) -> bool;

    fn contains_body(&self, body: BodyHandle) -> bool;

    fn body_pose(&self, body: BodyHandle) -> Option<(Vec3, Quat)>;

    fn set_translation(&mut self, body: BodyHandle, position: Vec3);

    fn set_rotation(&mut self, body: BodyHandle, rotation: Quat);

    fn apply_force(&mut self, body: BodyHandle, force: Vec3);

    fn apply_impulse(&mut self, body: BodyHandle, impulse: Vec3);

    fn set_linear_velocity(&mut self, body: BodyHandle, velocity: Vec3);

    fn linear_velocity(&self, body: BodyHandle) -> Option<Vec3>;

    fn create_joint(
        &mut self,
        kind: JointKind,
        body_a: BodyHandle,
        body_b: BodyHandle,
    ) -> Result<JointHandle, PhysicsError>;

    fn configure_motor(&mut self, joint: JointHandle, motor: MotorConfig)
        -> Result<(), PhysicsError>;

    fn remove_joint(&mut self, joint: JointHandle) -> bool;

    /// Closest hit along `direction` within `max_distance`.
    fn cast_ray(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<RayHit>;

    /// Bodies overlapping `shape` placed at the given pose. Backs the
    /// `overlaps` script expression.
    fn intersections_with_shape(
        &self,
        shape: &ShapeDescription,
        position: Vec3,
        rotation: Quat,
    ) -> Vec<BodyHandle>;

    fn step(&mut self, delta: f32);
}
