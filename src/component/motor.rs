use glam::Vec3;
use log::debug;

use crate::error::{PhysicsError, ScriptError};
use crate::manager::SceneNodeManager;
use crate::node::NodeId;
use crate::physics::{BodyHandle, JointHandle, JointKind, MotorConfig};
use crate::scene::{DriveMode, MotorAxis, MotorDescription};
use crate::scripting::value::Value;

use super::{body_of, find_node, Component, ComponentKind, ComponentType};

/// Live values set by scripts on top of the authored motor description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotorOverrides {
    pub mode: Option<DriveMode>,
    pub target_velocity: Option<f32>,
    pub velocity_factor: Option<f32>,
    /// Degrees.
    pub target_position: Option<f32>,
    pub stiffness: Option<f32>,
    pub damping: Option<f32>,
}

/// Drives a wheel node around a revolute joint anchored on the host node.
///
/// The joint motor is only reconfigured when the effective parameters change.
pub struct MotorComponent {
    description: MotorDescription,
    overrides: MotorOverrides,
    joint: Option<JointHandle>,
    bodies: Option<(BodyHandle, BodyHandle)>,
    applied_velocity: Option<(f32, f32)>,
    applied_position: Option<(f32, f32, f32)>,
    enabled: bool,
}

impl MotorComponent {
    pub fn new(description: MotorDescription) -> Self {
        Self {
            description,
            overrides: MotorOverrides::default(),
            joint: None,
            bodies: None,
            applied_velocity: None,
            applied_position: None,
            enabled: false,
        }
    }

    pub fn joint(&self) -> Option<JointHandle> {
        self.joint
    }

    pub fn overrides(&self) -> &MotorOverrides {
        &self.overrides
    }

    pub fn mode(&self) -> DriveMode {
        self.overrides.mode.unwrap_or(self.description.mode)
    }

    /// Applies a live override by parameter name, as used by `setMotor`.
    pub fn set_override(&mut self, parameter: &str, value: &Value) -> Result<(), ScriptError> {
        let number = || {
            value
                .as_number()
                .map(|n| n as f32)
                .ok_or_else(|| ScriptError::parse(value.to_string(), "number"))
        };
        match parameter.trim() {
            "mode" => {
                let mode = match value.to_string().trim().to_ascii_lowercase().as_str() {
                    "velocity" => DriveMode::Velocity,
                    "position" => DriveMode::Position,
                    _ => return Err(ScriptError::parse(value.to_string(), "drive mode")),
                };
                self.overrides.mode = Some(mode);
            }
            "targetVelocity" | "velocity" => self.overrides.target_velocity = Some(number()?),
            "velocityFactor" | "factor" => self.overrides.velocity_factor = Some(number()?),
            "targetPosition" | "position" => self.overrides.target_position = Some(number()?),
            "stiffness" => self.overrides.stiffness = Some(number()?),
            "damping" => self.overrides.damping = Some(number()?),
            other => return Err(ScriptError::InvalidProperty(format!("motor.{other}"))),
        }
        Ok(())
    }

    pub fn clear_overrides(&mut self) {
        self.overrides = MotorOverrides::default();
    }

    /// Authored parameters with live overrides applied.
    pub fn effective_config(&self) -> MotorConfig {
        let authored = &self.description;
        let overrides = &self.overrides;
        match self.mode() {
            DriveMode::Velocity => MotorConfig::Velocity {
                target_velocity: overrides.target_velocity.unwrap_or(authored.target_velocity),
                factor: overrides.velocity_factor.unwrap_or(authored.velocity_factor),
            },
            DriveMode::Position => MotorConfig::Position {
                target_position: overrides
                    .target_position
                    .unwrap_or(authored.target_position)
                    .to_radians(),
                stiffness: overrides.stiffness.unwrap_or(authored.stiffness),
                damping: overrides.damping.unwrap_or(authored.damping),
            },
        }
    }

    fn ensure_joint(
        &mut self,
        owner: &NodeId,
        scene: &mut SceneNodeManager,
    ) -> Result<JointHandle, PhysicsError> {
        let wheel = find_node(scene, owner, &self.description.wheel)
            .ok_or_else(|| PhysicsError::NotReady(self.description.wheel.clone()))?;
        let host_body =
            body_of(scene, owner).ok_or_else(|| PhysicsError::NotReady(owner.to_string()))?;
        let wheel_body =
            body_of(scene, &wheel).ok_or_else(|| PhysicsError::NotReady(wheel.to_string()))?;
        if let Some(joint) = self.joint {
            if self.bodies == Some((host_body, wheel_body)) {
                return Ok(joint);
            }
        }
        self.release(scene);

        let (host_position, host_rotation) = scene
            .physics()
            .body_pose(host_body)
            .ok_or(PhysicsError::UnknownBody(host_body.0))?;
        let (wheel_position, _) = scene
            .physics()
            .body_pose(wheel_body)
            .ok_or(PhysicsError::UnknownBody(wheel_body.0))?;

        let to_local = host_rotation.inverse();
        let world_axis = match self.description.axis {
            MotorAxis::X => Vec3::X,
            MotorAxis::Y => Vec3::Y,
            MotorAxis::Z => Vec3::Z,
            MotorAxis::Auto => (wheel_position - host_position)
                .cross(Vec3::Y)
                .try_normalize()
                .unwrap_or(Vec3::X),
        };
        let kind = JointKind::Revolute {
            axis: (to_local * world_axis).normalize(),
            anchor1: to_local * (wheel_position - host_position),
            anchor2: Vec3::ZERO,
        };
        let joint = scene.physics_mut().create_joint(kind, host_body, wheel_body)?;
        debug!("{owner}: revolute joint {joint:?} towards {wheel}");
        self.joint = Some(joint);
        self.bodies = Some((host_body, wheel_body));
        Ok(joint)
    }

    fn drive(&mut self, joint: JointHandle, scene: &mut SceneNodeManager) -> Result<(), PhysicsError> {
        let config = self.effective_config();
        match config {
            MotorConfig::Velocity {
                target_velocity,
                factor,
            } => {
                let key = (target_velocity, factor);
                if self.applied_velocity == Some(key) {
                    return Ok(());
                }
                scene.physics_mut().configure_motor(joint, config)?;
                self.applied_velocity = Some(key);
                self.applied_position = None;
            }
            MotorConfig::Position {
                target_position,
                stiffness,
                damping,
            } => {
                let key = (target_position, stiffness, damping);
                if self.applied_position == Some(key) {
                    return Ok(());
                }
                scene.physics_mut().configure_motor(joint, config)?;
                self.applied_position = Some(key);
                self.applied_velocity = None;
            }
        }
        Ok(())
    }

    fn release(&mut self, scene: &mut SceneNodeManager) {
        if let Some(joint) = self.joint.take() {
            scene.physics_mut().remove_joint(joint);
        }
        self.bodies = None;
        self.applied_velocity = None;
        self.applied_position = None;
    }

    fn step(&mut self, owner: &NodeId, scene: &mut SceneNodeManager) -> Result<(), PhysicsError> {
        let joint = self.ensure_joint(owner, scene)?;
        self.drive(joint, scene)
    }
}

impl Component for MotorComponent {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Motor
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn enable(&mut self, owner: &NodeId, scene: &mut SceneNodeManager) {
        self.enabled = true;
        let _ = self.step(owner, scene);
    }

    fn disable(&mut self, _owner: &NodeId, scene: &mut SceneNodeManager) {
        self.release(scene);
        self.enabled = false;
    }

    fn update(&mut self, owner: &NodeId, scene: &mut SceneNodeManager, _delta: f32) {
        if self.step(owner, scene).is_err() {
            // Joint or bodies went away; start over next frame.
            self.joint = None;
            self.bodies = None;
            self.applied_velocity = None;
            self.applied_position = None;
        }
    }

    fn destroy(&mut self, owner: &NodeId, scene: &mut SceneNodeManager) {
        self.disable(owner, scene);
    }
}

impl ComponentType for MotorComponent {
    const KIND: ComponentKind = ComponentKind::Motor;
}
