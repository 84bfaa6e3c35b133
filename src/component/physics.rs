use glam::Vec3;
use log::{debug, warn};

use crate::manager::SceneNodeManager;
use crate::node::NodeId;
use crate::physics::{BodyHandle, ColliderHandle, RigidBodyDesc};
use crate::scene::{BodyKind, PhysicsDescription};

use super::{Component, ComponentKind, ComponentType};

/// Bridges a node to a rigid body in the physics world.
///
/// Dynamic bodies own their node's pose: every update copies the simulated
/// pose into the node, unless something else moved the node since the last
/// sync, in which case the node's pose is pushed into the body instead.
/// Fixed and kinematic bodies follow their node.
pub struct PhysicsComponent {
    description: PhysicsDescription,
    body: Option<BodyHandle>,
    collider: Option<ColliderHandle>,
    synced_revision: u64,
    enabled: bool,
}

impl PhysicsComponent {
    /// Creates the body and collider from the node's current world pose.
    pub fn new(owner: &NodeId, description: PhysicsDescription, scene: &mut SceneNodeManager) -> Self {
        let mut component = Self {
            description,
            body: None,
            collider: None,
            synced_revision: 0,
            enabled: false,
        };
        component.create_body(owner, scene);
        component
    }

    pub fn description(&self) -> &PhysicsDescription {
        &self.description
    }

    pub fn body(&self) -> Option<BodyHandle> {
        self.body
    }

    pub fn collider(&self) -> Option<ColliderHandle> {
        self.collider
    }

    pub fn apply_directional_force(&mut self, scene: &mut SceneNodeManager, force: Vec3) {
        if let Some(body) = self.body {
            scene.physics_mut().apply_force(body, force);
        }
    }

    pub fn apply_directional_impulse(&mut self, scene: &mut SceneNodeManager, impulse: Vec3) {
        if let Some(body) = self.body {
            scene.physics_mut().apply_impulse(body, impulse);
        }
    }

    pub fn set_velocity(&mut self, scene: &mut SceneNodeManager, velocity: Vec3) {
        if let Some(body) = self.body {
            scene.physics_mut().set_linear_velocity(body, velocity);
        }
    }

    fn drives_node(&self) -> bool {
        self.description.body == BodyKind::Dynamic
    }

    fn create_body(&mut self, owner: &NodeId, scene: &mut SceneNodeManager) {
        let Some(node) = scene.node(owner) else {
            return;
        };
        let desc = RigidBodyDesc {
            kind: self.description.body,
            position: node.position(),
            rotation: node.rotation(),
            mass: self.description.mass,
        };
        self.synced_revision = node.revision();

        let body = scene.physics_mut().create_body(&desc);
        match scene.physics_mut().create_collider(&self.description.shape, body) {
            Ok(collider) => self.collider = Some(collider),
            Err(err) => warn!("{owner}: collider creation failed: {err}"),
        }
        self.body = Some(body);
        debug!("{owner}: created {:?} body {:?}", self.description.body, body);

        let driven = self.drives_node();
        if let Some(node) = scene.node_mut(owner) {
            node.is_physics_driven = driven;
        }
    }

    fn remove_body(&mut self, owner: &NodeId, scene: &mut SceneNodeManager) {
        if let Some(collider) = self.collider.take() {
            scene.physics_mut().remove_collider(collider);
        }
        if let Some(body) = self.body.take() {
            scene.physics_mut().remove_body(body);
        }
        if let Some(node) = scene.node_mut(owner) {
            node.is_physics_driven = false;
        }
    }
}

impl Component for PhysicsComponent {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Physics
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn enable(&mut self, owner: &NodeId, scene: &mut SceneNodeManager) {
        let registered = self
            .body
            .map(|body| scene.physics().contains_body(body))
            .unwrap_or(false);
        if !registered {
            self.body = None;
            self.collider = None;
            self.create_body(owner, scene);
        }
        self.enabled = true;
    }

    fn disable(&mut self, owner: &NodeId, scene: &mut SceneNodeManager) {
        self.remove_body(owner, scene);
        self.enabled = false;
    }

    fn update(&mut self, owner: &NodeId, scene: &mut SceneNodeManager, _delta: f32) {
        let Some(body) = self.body else {
            return;
        };
        let Some((revision, position, rotation)) = scene
            .node(owner)
            .map(|node| (node.revision(), node.position(), node.rotation()))
        else {
            return;
        };

        if !self.drives_node() || revision != self.synced_revision {
            scene.physics_mut().set_translation(body, position);
            scene.physics_mut().set_rotation(body, rotation);
            if self.drives_node() {
                debug!("{owner}: moved externally; resynchronising body");
            }
        } else if let Some((position, rotation)) = scene.physics().body_pose(body) {
            if let Some(node) = scene.node_mut(owner) {
                node.apply_physics_pose(position, rotation);
            }
        }
        if let Some(node) = scene.node(owner) {
            self.synced_revision = node.revision();
        }

        scene.update_world_matrix(owner);
        scene.refresh_offset(owner);
    }

    fn destroy(&mut self, owner: &NodeId, scene: &mut SceneNodeManager) {
        self.remove_body(owner, scene);
        self.enabled = false;
    }
}

impl ComponentType for PhysicsComponent {
    const KIND: ComponentKind = ComponentKind::Physics;
}
