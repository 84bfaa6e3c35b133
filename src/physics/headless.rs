use std::collections::BTreeMap;
use std::sync::Arc;

use glam::{Quat, Vec3};
use parking_lot::RwLock;

use super::{
    BodyHandle, ColliderHandle, JointHandle, JointKind, MotorConfig, PhysicsWorld, RayHit,
    RigidBodyDesc,
};
use crate::error::PhysicsError;
use crate::scene::{BodyKind, ShapeDescription};

#[derive(Debug, Clone)]
struct Body {
    kind: BodyKind,
    position: Vec3,
    rotation: Quat,
    velocity: Vec3,
    force: Vec3,
    inverse_mass: f32,
}

#[derive(Debug, Clone)]
struct Collider {
    body: BodyHandle,
    radius: f32,
}

#[derive(Debug, Clone)]
struct Joint {
    kind: JointKind,
    body_a: BodyHandle,
    body_b: BodyHandle,
    /// B's rotation relative to A at creation, for hinges.
    rest: Quat,
    angle: f32,
    motor: Option<MotorConfig>,
    motor_updates: u32,
}

#[derive(Debug)]
struct PhysicsState {
    gravity: Vec3,
    next_handle: u64,
    bodies: BTreeMap<BodyHandle, Body>,
    colliders: BTreeMap<ColliderHandle, Collider>,
    joints: BTreeMap<JointHandle, Joint>,
}

impl PhysicsState {
    fn allocate(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn body_radius(&self, body: BodyHandle) -> Option<f32> {
        self.colliders
            .values()
            .filter(|collider| collider.body == body)
            .map(|collider| collider.radius)
            .reduce(f32::max)
    }

    fn integrate(&mut self, delta: f32) {
        let gravity = self.gravity;
        for body in self.bodies.values_mut() {
            if body.kind != BodyKind::Dynamic {
                body.force = Vec3::ZERO;
                continue;
            }
            body.velocity += (gravity + body.force * body.inverse_mass) * delta;
            body.position += body.velocity * delta;
            body.force = Vec3::ZERO;
        }
    }

    fn solve_joints(&mut self, delta: f32) {
        let handles: Vec<JointHandle> = self.joints.keys().copied().collect();
        for handle in handles {
            let Some(joint) = self.joints.get_mut(&handle) else {
                continue;
            };
            let (Some(a), Some(b)) = (
                self.bodies.get(&joint.body_a).cloned(),
                self.bodies.get(&joint.body_b),
            ) else {
                continue;
            };
            if b.kind != BodyKind::Dynamic {
                continue;
            }
            let (position, rotation) = match joint.kind {
                JointKind::Fixed {
                    anchor1,
                    anchor2,
                    frame2,
                } => {
                    let rotation = (a.rotation * frame2.inverse()).normalize();
                    (a.position + a.rotation * anchor1 - rotation * anchor2, rotation)
                }
                JointKind::Revolute {
                    axis,
                    anchor1,
                    anchor2,
                } => {
                    joint.angle = drive_angle(joint.angle, joint.motor, delta);
                    let hinge = Quat::from_axis_angle(axis.normalize_or_zero(), joint.angle);
                    let rotation = (a.rotation * hinge * joint.rest).normalize();
                    (a.position + a.rotation * anchor1 - rotation * anchor2, rotation)
                }
            };
            if let Some(b) = self.bodies.get_mut(&joint.body_b) {
                b.position = position;
                b.rotation = rotation;
                b.velocity = a.velocity;
            }
        }
    }
}

fn drive_angle(angle: f32, motor: Option<MotorConfig>, delta: f32) -> f32 {
    match motor {
        None => angle,
        Some(MotorConfig::Velocity {
            target_velocity, ..
        }) => angle + target_velocity * delta,
        Some(MotorConfig::Position {
            target_position,
            stiffness,
            ..
        }) => angle + (target_position - angle) * (stiffness * delta).clamp(0.0, 1.0),
    }
}

fn bounding_radius(shape: &ShapeDescription) -> f32 {
    match shape {
        ShapeDescription::Cuboid { half_extents } => half_extents.length(),
        ShapeDescription::Ball { radius } => radius.max(0.0),
    }
}

fn ray_sphere(origin: Vec3, direction: Vec3, center: Vec3, radius: f32) -> Option<f32> {
    let oc = origin - center;
    let b = oc.dot(direction);
    let c = oc.length_squared() - radius * radius;
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }
    let root = discriminant.sqrt();
    let near = -b - root;
    if near >= 0.0 {
        return Some(near);
    }
    let far = -b + root;
    (far >= 0.0).then_some(0.0)
}

/// Reference world with bounding-sphere queries and kinematic joint solving.
///
/// Good enough to drive the runtime headlessly and in tests; hosts embedding
/// a real engine implement [`PhysicsWorld`] over it instead. Clones share the
/// same world.
#[derive(Clone, Debug)]
pub struct HeadlessPhysics {
    inner: Arc<RwLock<PhysicsState>>,
}

impl Default for HeadlessPhysics {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, -9.81, 0.0))
    }
}

impl HeadlessPhysics {
    pub fn new(gravity: Vec3) -> Self {
        Self {
            inner: Arc::new(RwLock::new(PhysicsState {
                gravity,
                next_handle: 0,
                bodies: BTreeMap::new(),
                colliders: BTreeMap::new(),
                joints: BTreeMap::new(),
            })),
        }
    }

    pub fn body_count(&self) -> usize {
        self.inner.read().bodies.len()
    }

    pub fn collider_count(&self) -> usize {
        self.inner.read().colliders.len()
    }

    pub fn joint_count(&self) -> usize {
        self.inner.read().joints.len()
    }

    pub fn joint_kind(&self, joint: JointHandle) -> Option<JointKind> {
        self.inner.read().joints.get(&joint).map(|j| j.kind)
    }

    pub fn joint_bodies(&self, joint: JointHandle) -> Option<(BodyHandle, BodyHandle)> {
        self.inner
            .read()
            .joints
            .get(&joint)
            .map(|j| (j.body_a, j.body_b))
    }

    pub fn joints(&self) -> Vec<JointHandle> {
        self.inner.read().joints.keys().copied().collect()
    }

    pub fn motor(&self, joint: JointHandle) -> Option<MotorConfig> {
        self.inner.read().joints.get(&joint).and_then(|j| j.motor)
    }

    /// How many times the joint's motor was (re)configured.
    pub fn motor_updates(&self, joint: JointHandle) -> u32 {
        self.inner
            .read()
            .joints
            .get(&joint)
            .map(|j| j.motor_updates)
            .unwrap_or(0)
    }
}

impl PhysicsWorld for HeadlessPhysics {
    fn create_body(&mut self, desc: &RigidBodyDesc) -> BodyHandle {
        let mut state = self.inner.write();
        let handle = BodyHandle(state.allocate());
        let inverse_mass = if desc.mass > 0.0 { 1.0 / desc.mass } else { 0.0 };
        state.bodies.insert(
            handle,
            Body {
                kind: desc.kind,
                position: desc.position,
                rotation: desc.rotation.normalize(),
                velocity: Vec3::ZERO,
                force: Vec3::ZERO,
                inverse_mass,
            },
        );
        handle
    }

    fn create_collider(
        &mut self,
        shape: &ShapeDescription,
        body: BodyHandle,
    ) -> Result<ColliderHandle, PhysicsError> {
        let mut state = self.inner.write();
        if !state.bodies.contains_key(&body) {
            return Err(PhysicsError::UnknownBody(body.0));
        }
        let handle = ColliderHandle(state.allocate());
        state.colliders.insert(
            handle,
            Collider {
                body,
                radius: bounding_radius(shape),
            },
        );
        Ok(handle)
    }

    fn remove_collider(&mut self, collider: ColliderHandle) -> bool {
        self.inner.write().colliders.remove(&collider).is_some()
    }

    fn remove_body(&mut self, body: BodyHandle) -> bool {
        let mut state = self.inner.write();
        if state.bodies.remove(&body).is_none() {
            return false;
        }
        state.colliders.retain(|_, collider| collider.body != body);
        state
            .joints
            .retain(|_, joint| joint.body_a != body && joint.body_b != body);
        true
    }

    fn contains_body(&self, body: BodyHandle) -> bool {
        self.inner.read().bodies.contains_key(&body)
    }

    fn body_pose(&self, body: BodyHandle) -> Option<(Vec3, Quat)> {
        self.inner
            .read()
            .bodies
            .get(&body)
            .map(|b| (b.position, b.rotation))
    }

    fn set_translation(&mut self, body: BodyHandle, position: Vec3) {
        if let Some(body) = self.inner.write().bodies.get_mut(&body) {
            body.position = position;
        }
    }

    fn set_rotation(&mut self, body: BodyHandle, rotation: Quat) {
        if let Some(body) = self.inner.write().bodies.get_mut(&body) {
            body.rotation = rotation.normalize();
        }
    }

    fn apply_force(&mut self, body: BodyHandle, force: Vec3) {
        if let Some(body) = self.inner.write().bodies.get_mut(&body) {
            body.force += force;
        }
    }

    fn apply_impulse(&mut self, body: BodyHandle, impulse: Vec3) {
        if let Some(body) = self.inner.write().bodies.get_mut(&body) {
            if body.kind == BodyKind::Dynamic {
                body.velocity += impulse * body.inverse_mass;
            }
        }
    }

    fn set_linear_velocity(&mut self, body: BodyHandle, velocity: Vec3) {
        if let Some(body) = self.inner.write().bodies.get_mut(&body) {
            body.velocity = velocity;
        }
    }

    fn linear_velocity(&self, body: BodyHandle) -> Option<Vec3> {
        self.inner.read().bodies.get(&body).map(|b| b.velocity)
    }

    fn create_joint(
        &mut self,
        kind: JointKind,
        body_a: BodyHandle,
        body_b: BodyHandle,
    ) -> Result<JointHandle, PhysicsError> {
        let mut state = self.inner.write();
        let rotation_a = state
            .bodies
            .get(&body_a)
            .map(|b| b.rotation)
            .ok_or(PhysicsError::UnknownBody(body_a.0))?;
        let rotation_b = state
            .bodies
            .get(&body_b)
            .map(|b| b.rotation)
            .ok_or(PhysicsError::UnknownBody(body_b.0))?;
        let handle = JointHandle(state.allocate());
        state.joints.insert(
            handle,
            Joint {
                kind,
                body_a,
                body_b,
                rest: (rotation_a.inverse() * rotation_b).normalize(),
                angle: 0.0,
                motor: None,
                motor_updates: 0,
            },
        );
        Ok(handle)
    }

    fn configure_motor(
        &mut self,
        joint: JointHandle,
        motor: MotorConfig,
    ) -> Result<(), PhysicsError> {
        let mut state = self.inner.write();
        let joint_state = state
            .joints
            .get_mut(&joint)
            .ok_or(PhysicsError::UnknownJoint(joint.0))?;
        joint_state.motor = Some(motor);
        joint_state.motor_updates += 1;
        Ok(())
    }

    fn remove_joint(&mut self, joint: JointHandle) -> bool {
        self.inner.write().joints.remove(&joint).is_some()
    }

    fn cast_ray(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<RayHit> {
        let direction = direction.try_normalize()?;
        let state = self.inner.read();
        state
            .colliders
            .iter()
            .filter_map(|(handle, collider)| {
                let body = state.bodies.get(&collider.body)?;
                let distance = ray_sphere(origin, direction, body.position, collider.radius)?;
                (distance <= max_distance).then_some(RayHit {
                    body: collider.body,
                    collider: *handle,
                    distance,
                    point: origin + direction * distance,
                })
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    fn intersections_with_shape(
        &self,
        shape: &ShapeDescription,
        position: Vec3,
        _rotation: Quat,
    ) -> Vec<BodyHandle> {
        let radius = bounding_radius(shape);
        let state = self.inner.read();
        state
            .bodies
            .iter()
            .filter(|(handle, body)| {
                state
                    .body_radius(**handle)
                    .map(|r| body.position.distance(position) <= r + radius)
                    .unwrap_or(false)
            })
            .map(|(handle, _)| *handle)
            .collect()
    }

    fn step(&mut self, delta: f32) {
        if delta <= 0.0 {
            return;
        }
        let mut state = self.inner.write();
        state.integrate(delta);
        state.solve_joints(delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn dynamic_at(position: Vec3) -> RigidBodyDesc {
        RigidBodyDesc {
            kind: BodyKind::Dynamic,
            position,
            rotation: Quat::IDENTITY,
            mass: 1.0,
        }
    }

    #[test]
    fn gravity_pulls_dynamic_bodies_only() {
        let mut world = HeadlessPhysics::default();
        let falling = world.create_body(&dynamic_at(Vec3::Y * 10.0));
        let floor = world.create_body(&RigidBodyDesc {
            kind: BodyKind::Fixed,
            ..dynamic_at(Vec3::ZERO)
        });
        world.step(0.5);
        assert!(world.body_pose(falling).unwrap().0.y < 10.0);
        assert_eq!(world.body_pose(floor).unwrap().0, Vec3::ZERO);
    }

    #[test]
    fn removal_is_idempotent() {
        let mut world = HeadlessPhysics::default();
        let body = world.create_body(&dynamic_at(Vec3::ZERO));
        let collider = world.create_collider(&ShapeDescription::default(), body).unwrap();
        assert!(world.remove_collider(collider));
        assert!(!world.remove_collider(collider));
        assert!(world.remove_body(body));
        assert!(!world.remove_body(body));
        assert!(!world.contains_body(body));
    }

    #[test]
    fn ray_hits_nearest_sphere() {
        let mut world = HeadlessPhysics::new(Vec3::ZERO);
        let near = world.create_body(&dynamic_at(Vec3::new(0.0, 0.0, -5.0)));
        let far = world.create_body(&dynamic_at(Vec3::new(0.0, 0.0, -10.0)));
        for body in [near, far] {
            world
                .create_collider(&ShapeDescription::Ball { radius: 1.0 }, body)
                .unwrap();
        }
        let hit = world.cast_ray(Vec3::ZERO, Vec3::NEG_Z, 100.0).unwrap();
        assert_eq!(hit.body, near);
        assert_relative_eq!(hit.distance, 4.0, epsilon = 1e-5);
        assert!(world.cast_ray(Vec3::ZERO, Vec3::NEG_Z, 3.0).is_none());
        assert!(world.cast_ray(Vec3::ZERO, Vec3::ZERO, 3.0).is_none());
    }

    #[test]
    fn fixed_joint_carries_body_b_along() {
        let mut world = HeadlessPhysics::new(Vec3::ZERO);
        let a = world.create_body(&RigidBodyDesc {
            kind: BodyKind::Kinematic,
            ..dynamic_at(Vec3::ZERO)
        });
        let b = world.create_body(&dynamic_at(Vec3::X * 2.0));
        world
            .create_joint(
                JointKind::Fixed {
                    anchor1: Vec3::ZERO,
                    anchor2: Vec3::new(-2.0, 0.0, 0.0),
                    frame2: Quat::IDENTITY,
                },
                a,
                b,
            )
            .unwrap();
        world.set_translation(a, Vec3::Y);
        world.step(0.1);
        let (position, _) = world.body_pose(b).unwrap();
        assert!(position.abs_diff_eq(Vec3::new(2.0, 1.0, 0.0), 1e-5));
    }

    #[test]
    fn motor_configuration_is_counted() {
        let mut world = HeadlessPhysics::new(Vec3::ZERO);
        let a = world.create_body(&dynamic_at(Vec3::ZERO));
        let b = world.create_body(&dynamic_at(Vec3::X));
        let joint = world
            .create_joint(
                JointKind::Revolute {
                    axis: Vec3::Z,
                    anchor1: Vec3::X,
                    anchor2: Vec3::ZERO,
                },
                a,
                b,
            )
            .unwrap();
        let motor = MotorConfig::Velocity {
            target_velocity: 1.0,
            factor: 1.0,
        };
        world.configure_motor(joint, motor).unwrap();
        assert_eq!(world.motor_updates(joint), 1);
        assert_eq!(world.motor(joint), Some(motor));
        assert!(world.configure_motor(JointHandle(999), motor).is_err());
    }
}
