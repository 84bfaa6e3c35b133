use std::collections::BTreeMap;
use std::fmt;

use glam::{Mat4, Quat, Vec3};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::component::{Component, ComponentKind, ComponentType};
use crate::math::{apply_offset, euler_degrees_to_quat, Transform};
use crate::scene::SceneObject;
use crate::scripting::value::Value;

/// Stable node identifier, assigned at authoring time or when cloning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random identifier for cloned nodes.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Typed reference string understood by the target resolver.
    pub fn reference(&self) -> String {
        format!("#id:{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Runtime entity wrapping one authored object.
///
/// Transform fields are always world-space. Hierarchy links are ids into the
/// owning [`SceneNodeManager`](crate::SceneNodeManager) arena; the manager
/// keeps `parent`, `children` and `offset_from_parent` consistent.
pub struct SceneNode {
    id: NodeId,
    name: String,
    node_type: String,
    description: SceneObject,
    position: Vec3,
    rotation: Quat,
    scale: Vec3,
    world_matrix: Mat4,
    pub(crate) is_physics_driven: bool,
    pub(crate) offset_from_parent: Option<Transform>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) components: ComponentSet,
    pub(crate) stored: bool,
    revision: u64,
    visible: bool,
    properties: BTreeMap<String, Value>,
}

impl fmt::Debug for SceneNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("node_type", &self.node_type)
            .field("position", &self.position)
            .field("rotation", &self.rotation)
            .field("scale", &self.scale)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("components", &self.components.kinds())
            .finish()
    }
}

impl SceneNode {
    /// Builds a detached node from an authored description.
    pub fn from_description(mut description: SceneObject) -> Self {
        description.children.clear();
        let position = description.position;
        let rotation = euler_degrees_to_quat(description.rotation);
        let scale = description.scale;
        let properties = description
            .properties
            .iter()
            .map(|(key, value)| (key.clone(), Value::from_json(value)))
            .collect();
        Self {
            id: NodeId::new(description.id.clone()),
            name: description.name.clone(),
            node_type: description.type_tag().to_string(),
            description,
            position,
            rotation,
            scale,
            world_matrix: Mat4::from_scale_rotation_translation(scale, rotation, position),
            is_physics_driven: false,
            offset_from_parent: None,
            parent: None,
            children: Vec::new(),
            components: ComponentSet::default(),
            stored: false,
            revision: 0,
            visible: true,
            properties,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn description(&self) -> &SceneObject {
        &self.description
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    pub fn transform(&self) -> Transform {
        Transform::new(self.position, self.rotation, self.scale)
    }

    pub fn world_matrix(&self) -> Mat4 {
        self.world_matrix
    }

    pub fn is_physics_driven(&self) -> bool {
        self.is_physics_driven
    }

    pub fn offset_from_parent(&self) -> Option<&Transform> {
        self.offset_from_parent.as_ref()
    }

    pub fn parent(&self) -> Option<&NodeId> {
        self.parent.as_ref()
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// True while the node sits below a storage container.
    pub fn is_stored(&self) -> bool {
        self.stored
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Counter bumped by every transform write that did not come from the
    /// physics bridge. Physics uses it to detect external moves.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn components(&self) -> &ComponentSet {
        &self.components
    }

    pub fn has_component(&self, kind: ComponentKind) -> bool {
        self.components.contains(kind)
    }

    /// Typed component lookup; `None` when absent or currently executing.
    pub fn component<T: ComponentType>(&self) -> Option<&T> {
        self.components.get_as::<T>()
    }

    pub fn component_mut<T: ComponentType>(&mut self) -> Option<&mut T> {
        self.components.get_as_mut::<T>()
    }

    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    /// Reads a single-segment property, built-ins first.
    pub fn property(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(Value::String(self.name.clone())),
            "type" => Some(Value::String(self.node_type.clone())),
            "id" => Some(Value::String(self.id.to_string())),
            "visible" => Some(Value::Bool(self.visible)),
            "position" => Some(Value::Vector(self.position)),
            "scale" => Some(Value::Vector(self.scale)),
            "rotation" => Some(Value::Vector(crate::math::quat_to_euler_degrees(self.rotation))),
            _ => self.properties.get(name).cloned(),
        }
    }

    /// Generic property setter used for anything outside the transform.
    pub fn set_property(&mut self, name: &str, value: Value) {
        match name {
            "name" => self.name = value.to_string(),
            "visible" => self.visible = value.is_truthy(),
            _ => {
                self.properties.insert(name.to_string(), value);
            }
        }
    }

    pub(crate) fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.revision += 1;
    }

    pub(crate) fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation.normalize();
        self.revision += 1;
    }

    pub(crate) fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.revision += 1;
    }

    /// Takes over the live state of `source` when cloning.
    pub(crate) fn copy_runtime_state(&mut self, source: &SceneNode) {
        self.name = source.name.clone();
        self.position = source.position;
        self.rotation = source.rotation;
        self.scale = source.scale;
        self.world_matrix = source.world_matrix;
        self.visible = source.visible;
        self.properties = source.properties.clone();
    }

    /// Writes a pose read back from the physics world without marking the
    /// node as externally moved.
    pub(crate) fn apply_physics_pose(&mut self, position: Vec3, rotation: Quat) {
        self.position = position;
        self.rotation = rotation.normalize();
    }

    /// Recomputes this node's transform from its parent's pose and rebuilds
    /// the world matrix. Exactly one policy applies: physics-driven nodes
    /// keep their fields, parented nodes derive position and rotation from
    /// the offset, roots use their fields as-is.
    pub(crate) fn recompose(&mut self, parent: Option<&Transform>) {
        if !self.is_physics_driven {
            if let (Some(parent), Some(offset)) = (parent, self.offset_from_parent.as_ref()) {
                let (position, rotation) = apply_offset(parent, offset);
                self.position = position;
                self.rotation = rotation;
            }
        }
        self.world_matrix =
            Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position);
    }
}

struct ComponentSlot {
    component: Option<Box<dyn Component>>,
    pending_enabled: Option<bool>,
}

/// Ordered component registry holding at most one instance per kind.
///
/// While a component runs it is checked out of its slot; the slot keeps the
/// kind registered so clones and lookups by kind stay accurate.
#[derive(Default)]
pub struct ComponentSet {
    slots: IndexMap<ComponentKind, ComponentSlot>,
}

impl ComponentSet {
    /// Adds a component, handing it back if its kind is already present.
    pub fn insert(&mut self, component: Box<dyn Component>) -> Result<(), Box<dyn Component>> {
        let kind = component.kind();
        if self.slots.contains_key(&kind) {
            return Err(component);
        }
        self.slots.insert(
            kind,
            ComponentSlot {
                component: Some(component),
                pending_enabled: None,
            },
        );
        Ok(())
    }

    pub fn contains(&self, kind: ComponentKind) -> bool {
        self.slots.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<ComponentKind> {
        self.slots.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, kind: ComponentKind) -> Option<&dyn Component> {
        self.slots.get(&kind)?.component.as_deref()
    }

    pub fn get_as<T: ComponentType>(&self) -> Option<&T> {
        self.get(T::KIND)?.as_any().downcast_ref::<T>()
    }

    pub fn get_as_mut<T: ComponentType>(&mut self) -> Option<&mut T> {
        let component = self.slots.get_mut(&T::KIND)?.component.as_deref_mut()?;
        component.as_any_mut().downcast_mut::<T>()
    }

    pub(crate) fn take(&mut self, kind: ComponentKind) -> Option<Box<dyn Component>> {
        self.slots.get_mut(&kind)?.component.take()
    }

    /// Returns a checked-out component and any enable request recorded while
    /// it was away.
    pub(crate) fn restore(&mut self, component: Box<dyn Component>) {
        if let Some(slot) = self.slots.get_mut(&component.kind()) {
            slot.component = Some(component);
        }
    }

    pub(crate) fn take_pending(&mut self, kind: ComponentKind) -> Option<bool> {
        self.slots.get_mut(&kind)?.pending_enabled.take()
    }

    pub(crate) fn request_enabled(&mut self, kind: ComponentKind, enabled: bool) {
        if let Some(slot) = self.slots.get_mut(&kind) {
            slot.pending_enabled = Some(enabled);
        }
    }

    pub(crate) fn is_checked_out(&self, kind: ComponentKind) -> bool {
        self.slots
            .get(&kind)
            .map(|slot| slot.component.is_none())
            .unwrap_or(false)
    }

    pub(crate) fn drain(&mut self) -> Vec<Box<dyn Component>> {
        self.slots
            .drain(..)
            .filter_map(|(_, slot)| slot.component)
            .collect()
    }
}
