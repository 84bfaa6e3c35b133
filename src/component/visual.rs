use crate::manager::SceneNodeManager;
use crate::node::NodeId;
use crate::render::VisualProxy;
use crate::scene::{ObjectKind, SceneObject};

use super::{Component, ComponentKind, ComponentType};

/// Mirrors a mesh or light node into the renderer.
pub struct VisualComponent {
    proxy: VisualProxy,
    enabled: bool,
    registered: bool,
}

impl VisualComponent {
    pub fn new(proxy: VisualProxy) -> Self {
        Self {
            proxy,
            enabled: false,
            registered: false,
        }
    }

    pub fn from_description(description: &SceneObject) -> Option<Self> {
        let proxy = match &description.kind {
            ObjectKind::Mesh(mesh) => VisualProxy::Mesh {
                mesh: mesh.mesh.clone(),
                color: mesh.color,
            },
            ObjectKind::Light(light) => VisualProxy::Light {
                color: light.color,
                intensity: light.intensity,
            },
            _ => return None,
        };
        Some(Self::new(proxy))
    }

    pub fn proxy(&self) -> &VisualProxy {
        &self.proxy
    }

    fn push_transform(&self, owner: &NodeId, scene: &mut SceneNodeManager) {
        if let Some((world, visible)) = scene
            .node(owner)
            .map(|node| (node.world_matrix(), node.is_visible()))
        {
            scene.renderer_mut().update_transform(owner, world, visible);
        }
    }
}

impl Component for VisualComponent {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Visual
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn enable(&mut self, owner: &NodeId, scene: &mut SceneNodeManager) {
        if !self.registered {
            scene.renderer_mut().add_proxy(owner, self.proxy.clone());
            self.registered = true;
        }
        self.enabled = true;
        self.push_transform(owner, scene);
    }

    fn disable(&mut self, owner: &NodeId, scene: &mut SceneNodeManager) {
        if self.registered {
            scene.renderer_mut().remove_proxy(owner);
            self.registered = false;
        }
        self.enabled = false;
    }

    fn late_update(&mut self, owner: &NodeId, scene: &mut SceneNodeManager) {
        self.push_transform(owner, scene);
    }

    fn destroy(&mut self, owner: &NodeId, scene: &mut SceneNodeManager) {
        self.disable(owner, scene);
    }
}

impl ComponentType for VisualComponent {
    const KIND: ComponentKind = ComponentKind::Visual;
}
