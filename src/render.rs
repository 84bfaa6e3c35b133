//! Renderer contract consumed by visual and camera components.
//!
//! Drawing itself lives outside the runtime; a backend only has to accept
//! proxies, per-frame transforms and the camera/lighting globals.

use std::collections::HashMap;
use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use parking_lot::RwLock;

use crate::node::NodeId;

/// Camera parameters consumed by the renderer's uniform buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraParams {
    pub view_proj: Mat4,
    pub position: Vec3,
}

impl CameraParams {
    /// Perspective camera looking down the -Z axis of `rotation`.
    pub fn from_pose(
        position: Vec3,
        rotation: Quat,
        fov_degrees: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        let forward = rotation * Vec3::NEG_Z;
        let up = rotation * Vec3::Y;
        let view = Mat4::look_at_rh(position, position + forward, up);
        let projection = Mat4::perspective_rh_gl(
            fov_degrees.to_radians(),
            aspect.max(0.01),
            near.max(0.001),
            far.max(near + 0.001),
        );
        Self {
            view_proj: projection * view,
            position,
        }
    }

    /// View used when the scene has no camera.
    pub fn fallback(aspect: f32) -> Self {
        let position = Vec3::new(0.0, 2.0, 6.0);
        let view = Mat4::look_at_rh(position, Vec3::ZERO, Vec3::Y);
        let projection = Mat4::perspective_rh_gl(60f32.to_radians(), aspect.max(0.01), 0.1, 100.0);
        Self {
            view_proj: projection * view,
            position,
        }
    }
}

/// Lighting state consumed by the renderer's uniform buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct LightParams {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for LightParams {
    fn default() -> Self {
        Self {
            position: Vec3::new(3.0, 5.0, -3.0),
            color: Vec3::splat(1.0),
            intensity: 1.0,
        }
    }
}

/// What a visual component asks the renderer to display.
#[derive(Clone, Debug, PartialEq)]
pub enum VisualProxy {
    Mesh { mesh: Option<String>, color: Vec3 },
    Light { color: Vec3, intensity: f32 },
}

/// Display-scene capability required by the runtime.
pub trait RenderBackend: Send {
    fn add_proxy(&mut self, id: &NodeId, proxy: VisualProxy);

    /// Returns `false` when nothing was registered under `id`.
    fn remove_proxy(&mut self, id: &NodeId) -> bool;

    fn update_transform(&mut self, id: &NodeId, world: Mat4, visible: bool);

    fn update_globals(&mut self, camera: &CameraParams, light: &LightParams);

    /// Viewport aspect ratio used for the camera projection.
    fn aspect(&self) -> f32 {
        16.0 / 9.0
    }
}

#[derive(Clone, Debug)]
pub struct RenderedProxy {
    pub proxy: VisualProxy,
    pub world: Mat4,
    pub visible: bool,
}

#[derive(Default)]
struct RenderState {
    proxies: HashMap<NodeId, RenderedProxy>,
    camera: Option<CameraParams>,
    light: Option<LightParams>,
    frames: u64,
}

/// Backend that records everything it is told. Clones share state, so a host
/// can keep a handle for inspection after giving one to the manager.
#[derive(Clone, Default)]
pub struct HeadlessRenderer {
    inner: Arc<RwLock<RenderState>>,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn proxy(&self, id: &NodeId) -> Option<RenderedProxy> {
        self.inner.read().proxies.get(id).cloned()
    }

    pub fn proxy_count(&self) -> usize {
        self.inner.read().proxies.len()
    }

    pub fn camera(&self) -> Option<CameraParams> {
        self.inner.read().camera.clone()
    }

    pub fn light(&self) -> Option<LightParams> {
        self.inner.read().light.clone()
    }

    /// Number of `update_globals` calls, one per simulated frame.
    pub fn frames(&self) -> u64 {
        self.inner.read().frames
    }
}

impl RenderBackend for HeadlessRenderer {
    fn add_proxy(&mut self, id: &NodeId, proxy: VisualProxy) {
        self.inner.write().proxies.insert(
            id.clone(),
            RenderedProxy {
                proxy,
                world: Mat4::IDENTITY,
                visible: true,
            },
        );
    }

    fn remove_proxy(&mut self, id: &NodeId) -> bool {
        self.inner.write().proxies.remove(id).is_some()
    }

    fn update_transform(&mut self, id: &NodeId, world: Mat4, visible: bool) {
        if let Some(entry) = self.inner.write().proxies.get_mut(id) {
            entry.world = world;
            entry.visible = visible;
        }
    }

    fn update_globals(&mut self, camera: &CameraParams, light: &LightParams) {
        let mut state = self.inner.write();
        state.camera = Some(camera.clone());
        state.light = Some(light.clone());
        state.frames += 1;
    }
}
