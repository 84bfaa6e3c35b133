use log::debug;

use crate::manager::SceneNodeManager;
use crate::node::NodeId;
use crate::scene::CameraDescription;

use super::{Component, ComponentKind, ComponentType};

/// Registers its node as the active camera. The first enabled camera wins;
/// later ones only take over when the active camera goes away.
pub struct CameraComponent {
    description: CameraDescription,
    enabled: bool,
}

impl CameraComponent {
    pub fn new(description: CameraDescription) -> Self {
        Self {
            description,
            enabled: false,
        }
    }

    pub fn description(&self) -> &CameraDescription {
        &self.description
    }
}

impl Component for CameraComponent {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Camera
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn enable(&mut self, owner: &NodeId, scene: &mut SceneNodeManager) {
        self.enabled = true;
        if scene.active_camera().is_none() {
            debug!("{owner} is now the active camera");
            scene.set_active_camera(Some(owner.clone()));
        }
    }

    fn disable(&mut self, owner: &NodeId, scene: &mut SceneNodeManager) {
        self.enabled = false;
        if scene.active_camera() == Some(owner) {
            scene.set_active_camera(None);
        }
    }

    fn update(&mut self, owner: &NodeId, scene: &mut SceneNodeManager, _delta: f32) {
        if scene.active_camera().is_none() {
            scene.set_active_camera(Some(owner.clone()));
        }
    }

    fn destroy(&mut self, owner: &NodeId, scene: &mut SceneNodeManager) {
        self.disable(owner, scene);
    }
}

impl ComponentType for CameraComponent {
    const KIND: ComponentKind = ComponentKind::Camera;
}
