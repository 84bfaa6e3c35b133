use glam::Vec3;
use log::warn;

use crate::input::{KeyCode, NamedKey};
use crate::manager::SceneNodeManager;
use crate::node::NodeId;
use crate::scene::ControllerDescription;

use super::{Component, ComponentKind, ComponentType, PhysicsComponent};

/// Keyboard-driven movement. With a physics body the controller steers the
/// body's horizontal velocity and Space jumps; otherwise it moves the node.
pub struct PlayerControllerComponent {
    description: ControllerDescription,
    enabled: bool,
}

impl PlayerControllerComponent {
    pub fn new(description: ControllerDescription) -> Self {
        Self {
            description,
            enabled: false,
        }
    }

    pub fn description(&self) -> &ControllerDescription {
        &self.description
    }
}

impl Component for PlayerControllerComponent {
    fn kind(&self) -> ComponentKind {
        ComponentKind::PlayerController
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn enable(&mut self, _owner: &NodeId, _scene: &mut SceneNodeManager) {
        self.enabled = true;
    }

    fn disable(&mut self, _owner: &NodeId, _scene: &mut SceneNodeManager) {
        self.enabled = false;
    }

    fn update(&mut self, owner: &NodeId, scene: &mut SceneNodeManager, delta: f32) {
        let input = scene.input_handle();
        let direction = input.movement_vector();
        let jump = input.was_pressed(KeyCode::Named(NamedKey::Space));
        let speed = self.description.speed;
        let jump_impulse = self.description.jump_impulse;

        let driven = scene.with_component_as::<PhysicsComponent, _, _>(owner, |physics, scene| {
            let Some(body) = physics.body() else {
                return false;
            };
            let vertical = scene.physics().linear_velocity(body).unwrap_or(Vec3::ZERO).y;
            physics.set_velocity(scene, Vec3::new(direction.x * speed, vertical, direction.z * speed));
            if jump {
                physics.apply_directional_impulse(scene, Vec3::Y * jump_impulse);
            }
            true
        });

        if driven != Some(true) && direction != Vec3::ZERO {
            if let Err(err) = scene.translate(owner, direction * speed * delta) {
                warn!("{owner}: player movement failed: {err}");
            }
        }
    }

    fn destroy(&mut self, _owner: &NodeId, _scene: &mut SceneNodeManager) {
        self.enabled = false;
    }
}

impl ComponentType for PlayerControllerComponent {
    const KIND: ComponentKind = ComponentKind::PlayerController;
}
