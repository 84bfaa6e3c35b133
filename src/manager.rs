use std::collections::HashSet;
use std::sync::Arc;

use glam::{Quat, Vec3};
use indexmap::IndexMap;
use log::{debug, info, warn};
use serde::Serialize;

use crate::component::{self, Component, ComponentKind, ComponentType, PhysicsComponent};
use crate::error::SceneError;
use crate::input::InputState;
use crate::math::{
    decompose_relative, look_rotation, offset_for_world_pose, offset_from_parent,
    quat_to_euler_degrees, Transform,
};
use crate::node::{NodeId, SceneNode};
use crate::physics::{BodyHandle, HeadlessPhysics, PhysicsWorld};
use crate::render::{CameraParams, HeadlessRenderer, LightParams, RenderBackend};
use crate::scene::{ObjectKind, Scene, SceneObject};
use crate::scripting::value::Value;
use crate::scripting::variables::VariableStore;

/// Broadcast raised by `emitEvent`, queued until the host drains it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeEvent {
    pub name: String,
    pub payload: Value,
    pub source: Option<NodeId>,
    /// Simulated seconds since the session started.
    pub time: f64,
}

/// Flattened node state reported to hosts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeState {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub position: Vec3,
    /// Euler angles in degrees.
    pub rotation: Vec3,
    pub scale: Vec3,
    pub parent: Option<NodeId>,
    pub visible: bool,
}

/// Owns every runtime node of a scene session together with the external
/// collaborators components talk to.
///
/// Nodes live in an arena keyed by id; hierarchy links are ids. All
/// structural edits go through the manager so parent/child links, offsets and
/// storage state stay consistent.
pub struct SceneNodeManager {
    nodes: IndexMap<NodeId, SceneNode>,
    roots: Vec<NodeId>,
    physics: Box<dyn PhysicsWorld>,
    renderer: Box<dyn RenderBackend>,
    input: Arc<InputState>,
    variables: VariableStore,
    events: Vec<RuntimeEvent>,
    active_camera: Option<NodeId>,
    elapsed: f64,
}

impl SceneNodeManager {
    pub fn new(
        physics: Box<dyn PhysicsWorld>,
        renderer: Box<dyn RenderBackend>,
        input: Arc<InputState>,
    ) -> Self {
        Self {
            nodes: IndexMap::new(),
            roots: Vec::new(),
            physics,
            renderer,
            input,
            variables: VariableStore::new(),
            events: Vec::new(),
            active_camera: None,
            elapsed: 0.0,
        }
    }

    /// Manager backed by the headless physics world and renderer.
    pub fn headless() -> Self {
        Self::new(
            Box::new(HeadlessPhysics::default()),
            Box::new(HeadlessRenderer::new()),
            Arc::new(InputState::new()),
        )
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &NodeId) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id)
    }

    /// Every node in registration order.
    pub fn all_nodes(&self) -> impl Iterator<Item = &SceneNode> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().cloned().collect()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&SceneNode> {
        self.nodes.values().find(|node| node.name() == name)
    }

    pub fn physics(&self) -> &dyn PhysicsWorld {
        self.physics.as_ref()
    }

    pub fn physics_mut(&mut self) -> &mut dyn PhysicsWorld {
        self.physics.as_mut()
    }

    pub fn renderer(&self) -> &dyn RenderBackend {
        self.renderer.as_ref()
    }

    pub fn renderer_mut(&mut self) -> &mut dyn RenderBackend {
        self.renderer.as_mut()
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    pub fn input_handle(&self) -> Arc<InputState> {
        Arc::clone(&self.input)
    }

    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut VariableStore {
        &mut self.variables
    }

    /// Bulk-sets global variables, e.g. from the editor's variable panel.
    pub fn update_variables(&mut self, values: impl IntoIterator<Item = (String, Value)>) {
        self.variables.update_globals(values);
    }

    /// Simulated seconds since the session started.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn active_camera(&self) -> Option<&NodeId> {
        self.active_camera.as_ref()
    }

    pub fn set_active_camera(&mut self, id: Option<NodeId>) {
        self.active_camera = id;
    }

    /// Registers a detached node as a new root. Components are not attached;
    /// see [`attach_components`](Self::attach_components).
    pub fn add_node(&mut self, node: SceneNode) -> Result<NodeId, SceneError> {
        let id = node.id().clone();
        if self.nodes.contains_key(&id) {
            return Err(SceneError::DuplicateId(id));
        }
        debug!("registering node {} ({})", id, node.name());
        self.nodes.insert(id.clone(), node);
        self.roots.push(id.clone());
        Ok(id)
    }

    /// Instantiates an authored scene on top of what is already loaded.
    ///
    /// Authored positions are world-space; nesting only establishes the
    /// parent links. Components are attached once the whole hierarchy
    /// exists, so they can look up any other node.
    pub fn load_scene(&mut self, scene: &Scene) -> Result<Vec<NodeId>, SceneError> {
        let mut seen = HashSet::new();
        check_ids(&scene.objects, &mut seen, &self.nodes)?;

        let mut created = Vec::new();
        let mut links = Vec::new();
        for object in &scene.objects {
            self.instantiate(object, None, &mut created, &mut links)?;
        }
        for (child, parent) in &links {
            self.set_parent(child, Some(parent))?;
        }
        self.update_all_world_matrices();
        for id in &created {
            self.attach_components(id);
        }
        self.update_all_world_matrices();
        info!("instantiated {} node(s)", created.len());
        Ok(created)
    }

    fn instantiate(
        &mut self,
        object: &SceneObject,
        parent: Option<&NodeId>,
        created: &mut Vec<NodeId>,
        links: &mut Vec<(NodeId, NodeId)>,
    ) -> Result<(), SceneError> {
        let id = self.add_node(SceneNode::from_description(object.clone()))?;
        created.push(id.clone());
        if let Some(parent) = parent {
            links.push((id.clone(), parent.clone()));
        }
        for child in &object.children {
            self.instantiate(child, Some(&id), created, links)?;
        }
        Ok(())
    }

    /// Builds every component the node's description implies and is not
    /// attached yet.
    pub fn attach_components(&mut self, id: &NodeId) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        for kind in component::kinds_for(node.description()) {
            let present = self
                .nodes
                .get(id)
                .map(|node| node.has_component(kind))
                .unwrap_or(true);
            if present {
                continue;
            }
            if let Some(component) = component::build(kind, id, self) {
                self.attach_component(id, component);
            }
        }
    }

    /// Attaches `component` and brings it in line with the node's storage
    /// state. A second component of the same kind is rejected.
    pub fn attach_component(&mut self, id: &NodeId, mut component: Box<dyn Component>) {
        let kind = component.kind();
        let Some(node) = self.nodes.get_mut(id) else {
            component.destroy(id, self);
            return;
        };
        let stored = node.stored;
        if let Err(mut rejected) = node.components.insert(component) {
            warn!("{id} already has a {kind} component; ignoring the new one");
            rejected.destroy(id, self);
            return;
        }
        self.set_component_enabled(id, kind, !stored);
    }

    /// Enables or disables one component, deferring the change if the
    /// component is currently executing.
    pub fn set_component_enabled(&mut self, id: &NodeId, kind: ComponentKind, enabled: bool) {
        let checked_out = match self.nodes.get_mut(id) {
            Some(node) if node.components.is_checked_out(kind) => {
                node.components.request_enabled(kind, enabled);
                true
            }
            Some(_) => false,
            None => return,
        };
        if !checked_out {
            self.with_component(id, kind, |component, scene| {
                if enabled {
                    component.enable(id, scene);
                } else {
                    component.disable(id, scene);
                }
            });
        }
    }

    /// Checks a component out of its node, runs `f` with full access to the
    /// manager, then puts it back.
    ///
    /// Enable requests made meanwhile are applied before the component
    /// returns; if the node was removed meanwhile the component is destroyed
    /// instead.
    pub fn with_component<R>(
        &mut self,
        id: &NodeId,
        kind: ComponentKind,
        f: impl FnOnce(&mut dyn Component, &mut Self) -> R,
    ) -> Option<R> {
        let mut component = self.nodes.get_mut(id)?.components.take(kind)?;
        let result = f(component.as_mut(), self);
        let pending = match self.nodes.get_mut(id) {
            Some(node) => node.components.take_pending(kind),
            None => {
                component.destroy(id, self);
                return Some(result);
            }
        };
        match pending {
            Some(true) => component.enable(id, self),
            Some(false) => component.disable(id, self),
            None => {}
        }
        match self.nodes.get_mut(id) {
            Some(node) => node.components.restore(component),
            None => component.destroy(id, self),
        }
        Some(result)
    }

    /// Typed variant of [`with_component`](Self::with_component).
    pub fn with_component_as<T, R, F>(&mut self, id: &NodeId, f: F) -> Option<R>
    where
        T: ComponentType,
        F: FnOnce(&mut T, &mut Self) -> R,
    {
        self.with_component(id, T::KIND, |component, scene| {
            component
                .as_any_mut()
                .downcast_mut::<T>()
                .map(|typed| f(typed, scene))
        })
        .flatten()
    }

    /// Moves `child` under `parent` (or to the root level), keeping its
    /// world pose at this instant.
    pub fn set_parent(&mut self, child: &NodeId, parent: Option<&NodeId>) -> Result<(), SceneError> {
        let current = self
            .nodes
            .get(child)
            .ok_or_else(|| SceneError::NodeNotFound(child.clone()))?
            .parent()
            .cloned();
        if let Some(parent) = parent {
            if !self.contains(parent) {
                return Err(SceneError::NodeNotFound(parent.clone()));
            }
            if parent == child || self.is_ancestor(child, parent) {
                return Err(SceneError::CyclicParent {
                    child: child.clone(),
                    parent: parent.clone(),
                });
            }
        }
        if current.as_ref() == parent {
            return Ok(());
        }

        match &current {
            Some(old) => {
                if let Some(old) = self.nodes.get_mut(old) {
                    old.children.retain(|id| id != child);
                }
            }
            None => self.roots.retain(|id| id != child),
        }

        match parent {
            Some(parent_id) => {
                let parent_transform = match self.nodes.get_mut(parent_id) {
                    Some(parent_node) => {
                        parent_node.children.push(child.clone());
                        parent_node.transform()
                    }
                    None => return Err(SceneError::NodeNotFound(parent_id.clone())),
                };
                if let Some(node) = self.nodes.get_mut(child) {
                    node.offset_from_parent =
                        Some(offset_from_parent(&parent_transform, &node.transform()));
                    node.parent = Some(parent_id.clone());
                }
            }
            None => {
                if let Some(node) = self.nodes.get_mut(child) {
                    node.offset_from_parent = None;
                    node.parent = None;
                }
                self.roots.push(child.clone());
            }
        }
        debug!("parented {child} under {parent:?}");
        self.refresh_storage(child);
        Ok(())
    }

    /// True when `ancestor` appears on the parent chain of `node`.
    pub fn is_ancestor(&self, ancestor: &NodeId, node: &NodeId) -> bool {
        let mut cursor = self.nodes.get(node).and_then(|n| n.parent());
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            cursor = self.nodes.get(id).and_then(|n| n.parent());
        }
        false
    }

    fn under_storage(&self, id: &NodeId) -> bool {
        let mut cursor = self.nodes.get(id).and_then(|n| n.parent());
        while let Some(parent) = cursor {
            match self.nodes.get(parent) {
                Some(node) if node.node_type() == "storage" => return true,
                Some(node) => cursor = node.parent(),
                None => break,
            }
        }
        false
    }

    /// Re-evaluates storage membership for the subtree at `id`, toggling the
    /// components of every node whose membership flipped.
    fn refresh_storage(&mut self, id: &NodeId) {
        for node_id in self.subtree(id) {
            let stored = self.under_storage(&node_id);
            let kinds = match self.nodes.get_mut(&node_id) {
                Some(node) if node.stored != stored => {
                    node.stored = stored;
                    node.components.kinds()
                }
                _ => continue,
            };
            debug!(
                "{node_id} {} storage",
                if stored { "entered" } else { "left" }
            );
            for kind in kinds {
                self.set_component_enabled(&node_id, kind, !stored);
            }
        }
    }

    /// `id` and all its descendants, parents before children.
    pub fn subtree(&self, id: &NodeId) -> Vec<NodeId> {
        let mut ordered = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                stack.extend(node.children().iter().rev().cloned());
                ordered.push(current);
            }
        }
        ordered
    }

    /// Recomputes the effective transform of `id` and its descendants,
    /// top-down, each exactly once.
    pub fn update_world_matrix(&mut self, id: &NodeId) {
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            let parent = self
                .nodes
                .get(&current)
                .and_then(|node| node.parent())
                .and_then(|parent| self.nodes.get(parent))
                .map(SceneNode::transform);
            if let Some(node) = self.nodes.get_mut(&current) {
                node.recompose(parent.as_ref());
                stack.extend(node.children().iter().rev().cloned());
            }
        }
    }

    pub fn update_all_world_matrices(&mut self) {
        for root in self.roots.clone() {
            self.update_world_matrix(&root);
        }
    }

    /// Re-derives the parent-relative offset from the current world matrices.
    /// Used after physics wrote a pose into a parented node.
    pub fn refresh_offset(&mut self, id: &NodeId) {
        let parent_world = self
            .nodes
            .get(id)
            .and_then(|node| node.parent())
            .and_then(|parent| self.nodes.get(parent))
            .map(SceneNode::world_matrix);
        if let (Some(parent_world), Some(node)) = (parent_world, self.nodes.get_mut(id)) {
            node.offset_from_parent = Some(decompose_relative(parent_world, node.transform().matrix()));
        }
    }

    fn write_transform(
        &mut self,
        id: &NodeId,
        write: impl FnOnce(&mut SceneNode),
    ) -> Result<(), SceneError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| SceneError::NodeNotFound(id.clone()))?;
        write(node);
        let world = node.transform();
        let parent = node.parent().cloned();
        if let Some(parent_transform) = parent
            .as_ref()
            .and_then(|parent| self.nodes.get(parent))
            .map(SceneNode::transform)
        {
            if let Some(node) = self.nodes.get_mut(id) {
                node.offset_from_parent = Some(offset_for_world_pose(&parent_transform, &world));
            }
        }
        self.update_world_matrix(id);
        Ok(())
    }

    pub fn set_position(&mut self, id: &NodeId, position: Vec3) -> Result<(), SceneError> {
        self.write_transform(id, |node| node.set_position(position))
    }

    pub fn translate(&mut self, id: &NodeId, delta: Vec3) -> Result<(), SceneError> {
        self.write_transform(id, |node| node.set_position(node.position() + delta))
    }

    pub fn set_rotation(&mut self, id: &NodeId, rotation: Quat) -> Result<(), SceneError> {
        self.write_transform(id, |node| node.set_rotation(rotation))
    }

    /// Applies `delta` in the node's local frame.
    pub fn rotate_by(&mut self, id: &NodeId, delta: Quat) -> Result<(), SceneError> {
        self.write_transform(id, |node| node.set_rotation(node.rotation() * delta))
    }

    pub fn set_scale(&mut self, id: &NodeId, scale: Vec3) -> Result<(), SceneError> {
        self.write_transform(id, |node| node.set_scale(scale))
    }

    /// Turns the node towards `point` with world up as reference. Cameras
    /// aim their -Z axis, everything else +Z.
    pub fn look_at(&mut self, id: &NodeId, point: Vec3) -> Result<(), SceneError> {
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| SceneError::NodeNotFound(id.clone()))?;
        let eye = node.position();
        let aim = if node.node_type() == "camera" {
            eye * 2.0 - point
        } else {
            point
        };
        match look_rotation(eye, aim, Vec3::Y) {
            Some(rotation) => self.set_rotation(id, rotation),
            None => Ok(()),
        }
    }

    pub fn set_property(&mut self, id: &NodeId, name: &str, value: Value) -> Result<(), SceneError> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| SceneError::NodeNotFound(id.clone()))?
            .set_property(name, value);
        Ok(())
    }

    /// Deep-copies the subtree at `id` under fresh ids, next to the original.
    /// Children are cloned before components are rebuilt.
    pub fn clone_subtree(&mut self, id: &NodeId) -> Result<NodeId, SceneError> {
        let parent = self
            .nodes
            .get(id)
            .ok_or_else(|| SceneError::NodeNotFound(id.clone()))?
            .parent()
            .cloned();
        let copy = self.clone_node(id, parent.as_ref())?;
        self.update_world_matrix(&copy);
        debug!("cloned {id} as {copy}");
        Ok(copy)
    }

    fn clone_node(&mut self, source: &NodeId, parent: Option<&NodeId>) -> Result<NodeId, SceneError> {
        let original = self
            .nodes
            .get(source)
            .ok_or_else(|| SceneError::NodeNotFound(source.clone()))?;
        let new_id = NodeId::generate();
        let mut node = SceneNode::from_description(original.description().duplicate(new_id.as_str()));
        node.copy_runtime_state(original);
        let children = original.children().to_vec();
        let kinds = original.components().kinds();

        let id = self.add_node(node)?;
        if let Some(parent) = parent {
            self.set_parent(&id, Some(parent))?;
        }
        for child in &children {
            self.clone_node(child, Some(&id))?;
        }
        for kind in kinds {
            if let Some(component) = component::build(kind, &id, self) {
                self.attach_component(&id, component);
            }
        }
        Ok(id)
    }

    /// Removes `id` and its whole subtree, deepest nodes first, destroying
    /// their components.
    pub fn remove_node(&mut self, id: &NodeId) -> Result<(), SceneError> {
        if !self.contains(id) {
            return Err(SceneError::NodeNotFound(id.clone()));
        }
        let mut doomed = self.subtree(id);
        doomed.reverse();
        for node_id in doomed {
            let Some(mut node) = self.nodes.shift_remove(&node_id) else {
                continue;
            };
            match node.parent() {
                Some(parent) => {
                    if let Some(parent) = self.nodes.get_mut(parent) {
                        parent.children.retain(|child| child != &node_id);
                    }
                }
                None => self.roots.retain(|root| root != &node_id),
            }
            if self.active_camera.as_ref() == Some(&node_id) {
                self.active_camera = None;
            }
            for mut component in node.components.drain() {
                component.destroy(&node_id, self);
            }
            debug!("removed node {node_id}");
        }
        Ok(())
    }

    /// Node owning the physics body `body`, if any.
    pub fn node_for_body(&self, body: BodyHandle) -> Option<NodeId> {
        self.nodes
            .values()
            .find(|node| {
                node.component::<PhysicsComponent>()
                    .and_then(PhysicsComponent::body)
                    == Some(body)
            })
            .map(|node| node.id().clone())
    }

    pub fn emit_event(&mut self, name: impl Into<String>, payload: Value, source: Option<NodeId>) {
        let event = RuntimeEvent {
            name: name.into(),
            payload,
            source,
            time: self.elapsed,
        };
        info!(
            "event \"{}\" from {} payload={}",
            event.name,
            event
                .source
                .as_ref()
                .map(NodeId::as_str)
                .unwrap_or("host"),
            event.payload
        );
        self.events.push(event);
    }

    pub fn drain_events(&mut self) -> Vec<RuntimeEvent> {
        std::mem::take(&mut self.events)
    }

    /// Runs one frame: physics step, component updates, hierarchy
    /// propagation, late updates and renderer globals.
    pub fn update(&mut self, delta: f32) {
        self.elapsed += delta as f64;
        self.physics.step(delta);

        let ids = self.node_ids();
        for id in &ids {
            for kind in self.active_kinds(id) {
                self.with_component(id, kind, |component, scene| {
                    if component.is_enabled() {
                        component.update(id, scene, delta);
                    }
                });
            }
        }

        self.update_all_world_matrices();

        for id in &ids {
            for kind in self.active_kinds(id) {
                self.with_component(id, kind, |component, scene| {
                    if component.is_enabled() {
                        component.late_update(id, scene);
                    }
                });
            }
        }

        let camera = self.camera_params();
        let light = self.light_params();
        self.renderer.update_globals(&camera, &light);
        self.input.end_frame();
    }

    fn active_kinds(&self, id: &NodeId) -> Vec<ComponentKind> {
        match self.nodes.get(id) {
            Some(node) if !node.stored => node.components.kinds(),
            _ => Vec::new(),
        }
    }

    /// View-projection of the active camera, or the default view.
    pub fn camera_params(&self) -> CameraParams {
        let aspect = self.renderer.aspect();
        self.active_camera
            .as_ref()
            .and_then(|id| self.nodes.get(id))
            .and_then(|node| match &node.description().kind {
                ObjectKind::Camera(camera) => Some(CameraParams::from_pose(
                    node.position(),
                    node.rotation(),
                    camera.fov,
                    aspect,
                    camera.near,
                    camera.far,
                )),
                _ => None,
            })
            .unwrap_or_else(|| CameraParams::fallback(aspect))
    }

    /// First light outside storage, or the default light.
    pub fn light_params(&self) -> LightParams {
        self.nodes
            .values()
            .filter(|node| !node.is_stored())
            .find_map(|node| match &node.description().kind {
                ObjectKind::Light(light) => Some(LightParams {
                    position: node.position(),
                    color: light.color,
                    intensity: light.intensity.max(0.1),
                }),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn node_states(&self) -> Vec<NodeState> {
        self.nodes
            .values()
            .map(|node| NodeState {
                id: node.id().clone(),
                name: node.name().to_string(),
                node_type: node.node_type().to_string(),
                position: node.position(),
                rotation: quat_to_euler_degrees(node.rotation()),
                scale: node.scale(),
                parent: node.parent().cloned(),
                visible: node.is_visible(),
            })
            .collect()
    }

    /// World transform of `id` as a TRS triple.
    pub fn world_transform(&self, id: &NodeId) -> Option<Transform> {
        self.nodes
            .get(id)
            .map(|node| Transform::from_matrix(node.world_matrix()))
    }
}

fn check_ids(
    objects: &[SceneObject],
    seen: &mut HashSet<String>,
    existing: &IndexMap<NodeId, SceneNode>,
) -> Result<(), SceneError> {
    for object in objects {
        let id = NodeId::new(object.id.clone());
        if existing.contains_key(&id) || !seen.insert(object.id.clone()) {
            return Err(SceneError::DuplicateId(id));
        }
        check_ids(&object.children, seen, existing)?;
    }
    Ok(())
}
