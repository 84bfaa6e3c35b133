//! Capabilities attachable to a [`SceneNode`](crate::SceneNode).
//!
//! Components are owned by their node but receive the manager explicitly
//! while they run, so they can reach other nodes, the physics world and the
//! renderer without global state.

use std::any::Any;
use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::manager::SceneNodeManager;
use crate::node::NodeId;
use crate::physics::BodyHandle;
use crate::scene::{ObjectKind, SceneObject};
use crate::scripting::target::resolve_target;

pub mod camera;
pub mod constraint;
pub mod motor;
pub mod physics;
pub mod player;
pub mod script;
pub mod visual;
pub mod waypoint;

pub use camera::CameraComponent;
pub use constraint::ConstraintComponent;
pub use motor::MotorComponent;
pub use physics::PhysicsComponent;
pub use player::PlayerControllerComponent;
pub use script::ScriptComponent;
pub use visual::VisualComponent;
pub use waypoint::WaypointNavigatorComponent;

/// Explicit component tag; a node holds at most one component per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentKind {
    Visual,
    Camera,
    Physics,
    Constraint,
    Motor,
    PlayerController,
    WaypointNavigator,
    Script,
}

impl ComponentKind {
    pub fn name(self) -> &'static str {
        match self {
            ComponentKind::Visual => "Visual",
            ComponentKind::Camera => "Camera",
            ComponentKind::Physics => "Physics",
            ComponentKind::Constraint => "Constraint",
            ComponentKind::Motor => "Motor",
            ComponentKind::PlayerController => "PlayerController",
            ComponentKind::WaypointNavigator => "WaypointNavigator",
            ComponentKind::Script => "Script",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Downcasting support for boxed components.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Base contract shared by every component.
///
/// The enabled flag is independent of attachment: a disabled component stays
/// on its node and can be enabled again later.
pub trait Component: AsAny {
    fn kind(&self) -> ComponentKind;

    fn is_enabled(&self) -> bool;

    fn enable(&mut self, owner: &NodeId, scene: &mut SceneNodeManager);

    fn disable(&mut self, owner: &NodeId, scene: &mut SceneNodeManager);

    /// Per-frame simulation step, before world matrices are recomposed.
    fn update(&mut self, _owner: &NodeId, _scene: &mut SceneNodeManager, _delta: f32) {}

    /// Runs after world matrices are up to date for the frame.
    fn late_update(&mut self, _owner: &NodeId, _scene: &mut SceneNodeManager) {}

    /// Releases external resources. Called once, when the node goes away.
    fn destroy(&mut self, owner: &NodeId, scene: &mut SceneNodeManager);
}

/// Implemented by concrete components to enable typed lookups.
pub trait ComponentType: Component + Sized {
    const KIND: ComponentKind;
}

/// Component kinds implied by an authored object, in construction order.
pub fn kinds_for(description: &SceneObject) -> Vec<ComponentKind> {
    let mut kinds = Vec::new();
    match description.kind {
        ObjectKind::Mesh(_) | ObjectKind::Light(_) => kinds.push(ComponentKind::Visual),
        ObjectKind::Camera(_) => kinds.push(ComponentKind::Camera),
        ObjectKind::Group | ObjectKind::Storage => {}
    }
    if description.physics.is_some() {
        kinds.push(ComponentKind::Physics);
    }
    if description.constraint.is_some() {
        kinds.push(ComponentKind::Constraint);
    }
    if description.motor.is_some() {
        kinds.push(ComponentKind::Motor);
    }
    if description.controller.is_some() {
        kinds.push(ComponentKind::PlayerController);
    }
    if description.waypoints.is_some() {
        kinds.push(ComponentKind::WaypointNavigator);
    }
    if description.script.is_some() {
        kinds.push(ComponentKind::Script);
    }
    kinds
}

/// Constructs a fresh component of `kind` for `owner` from its description.
///
/// Returns `None`, with a warning, when the description carries nothing the
/// kind can be built from.
pub fn build(
    kind: ComponentKind,
    owner: &NodeId,
    scene: &mut SceneNodeManager,
) -> Option<Box<dyn Component>> {
    let description = scene.node(owner)?.description().clone();
    let component: Option<Box<dyn Component>> = match kind {
        ComponentKind::Visual => {
            VisualComponent::from_description(&description).map(|c| Box::new(c) as _)
        }
        ComponentKind::Camera => match description.kind {
            ObjectKind::Camera(camera) => Some(Box::new(CameraComponent::new(camera))),
            _ => None,
        },
        ComponentKind::Physics => description
            .physics
            .as_ref()
            .map(|physics| Box::new(PhysicsComponent::new(owner, physics.clone(), scene)) as _),
        ComponentKind::Constraint => description
            .constraint
            .map(|constraint| Box::new(ConstraintComponent::new(constraint)) as _),
        ComponentKind::Motor => description
            .motor
            .map(|motor| Box::new(MotorComponent::new(motor)) as _),
        ComponentKind::PlayerController => description
            .controller
            .map(|controller| Box::new(PlayerControllerComponent::new(controller)) as _),
        ComponentKind::WaypointNavigator => description
            .waypoints
            .map(|waypoints| Box::new(WaypointNavigatorComponent::new(waypoints)) as _),
        ComponentKind::Script => description
            .script
            .as_ref()
            .map(|script| Box::new(ScriptComponent::from_description(owner, script)) as _),
    };
    if component.is_none() {
        warn!("cannot build a {kind} component for {owner}; skipping");
    }
    component
}

/// Finds the node an authored description refers to: a plain id first, then
/// any target reference relative to `owner`.
pub(crate) fn find_node(scene: &SceneNodeManager, owner: &NodeId, reference: &str) -> Option<NodeId> {
    let id = NodeId::new(reference);
    if scene.contains(&id) {
        return Some(id);
    }
    resolve_target(reference, Some(owner), scene).ok()
}

/// Physics body of `id`, once its physics component has one.
pub(crate) fn body_of(scene: &SceneNodeManager, id: &NodeId) -> Option<BodyHandle> {
    scene.node(id)?.component::<PhysicsComponent>()?.body()
}
