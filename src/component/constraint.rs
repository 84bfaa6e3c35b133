use log::debug;

use crate::error::PhysicsError;
use crate::manager::SceneNodeManager;
use crate::node::NodeId;
use crate::physics::{BodyHandle, JointHandle, JointKind};
use crate::scene::ConstraintDescription;

use super::{body_of, find_node, Component, ComponentKind, ComponentType};

/// Welds two physics bodies together with a fixed joint.
///
/// The joint is created lazily: both referenced nodes need a physics body
/// first, and load order does not guarantee that. Until then every update
/// retries quietly. If either body is replaced the joint is rebuilt.
pub struct ConstraintComponent {
    description: ConstraintDescription,
    joint: Option<JointHandle>,
    bodies: Option<(BodyHandle, BodyHandle)>,
    enabled: bool,
}

impl ConstraintComponent {
    pub fn new(description: ConstraintDescription) -> Self {
        Self {
            description,
            joint: None,
            bodies: None,
            enabled: false,
        }
    }

    pub fn joint(&self) -> Option<JointHandle> {
        self.joint
    }

    pub fn is_initialized(&self) -> bool {
        self.joint.is_some()
    }

    fn resolve_bodies(
        &self,
        owner: &NodeId,
        scene: &SceneNodeManager,
    ) -> Result<(BodyHandle, BodyHandle), PhysicsError> {
        let node_a = match &self.description.body_a {
            Some(reference) => find_node(scene, owner, reference)
                .ok_or_else(|| PhysicsError::NotReady(reference.clone()))?,
            None => owner.clone(),
        };
        let node_b = find_node(scene, owner, &self.description.body_b)
            .ok_or_else(|| PhysicsError::NotReady(self.description.body_b.clone()))?;
        let body_a =
            body_of(scene, &node_a).ok_or_else(|| PhysicsError::NotReady(node_a.to_string()))?;
        let body_b =
            body_of(scene, &node_b).ok_or_else(|| PhysicsError::NotReady(node_b.to_string()))?;
        Ok((body_a, body_b))
    }

    fn try_initialize(
        &mut self,
        owner: &NodeId,
        scene: &mut SceneNodeManager,
    ) -> Result<(), PhysicsError> {
        let (body_a, body_b) = self.resolve_bodies(owner, scene)?;
        if self.joint.is_some() && self.bodies == Some((body_a, body_b)) {
            return Ok(());
        }
        self.release(scene);

        let (position_a, rotation_a) = scene
            .physics()
            .body_pose(body_a)
            .ok_or(PhysicsError::UnknownBody(body_a.0))?;
        let (position_b, rotation_b) = scene
            .physics()
            .body_pose(body_b)
            .ok_or(PhysicsError::UnknownBody(body_b.0))?;

        // Body B's frame is expressed relative to its current pose so the
        // joint starts satisfied.
        let inverse_b = rotation_b.inverse();
        let kind = JointKind::Fixed {
            anchor1: glam::Vec3::ZERO,
            anchor2: inverse_b * (position_a - position_b),
            frame2: (inverse_b * rotation_a).normalize(),
        };
        let joint = scene.physics_mut().create_joint(kind, body_a, body_b)?;
        debug!("{owner}: fixed joint {joint:?} between {body_a:?} and {body_b:?}");
        self.joint = Some(joint);
        self.bodies = Some((body_a, body_b));
        Ok(())
    }

    fn release(&mut self, scene: &mut SceneNodeManager) {
        if let Some(joint) = self.joint.take() {
            scene.physics_mut().remove_joint(joint);
        }
        self.bodies = None;
    }
}

impl Component for ConstraintComponent {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Constraint
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn enable(&mut self, owner: &NodeId, scene: &mut SceneNodeManager) {
        self.enabled = true;
        // Not ready yet is expected; update keeps trying.
        let _ = self.try_initialize(owner, scene);
    }

    fn disable(&mut self, _owner: &NodeId, scene: &mut SceneNodeManager) {
        self.release(scene);
        self.enabled = false;
    }

    fn update(&mut self, owner: &NodeId, scene: &mut SceneNodeManager, _delta: f32) {
        if self.try_initialize(owner, scene).is_err() {
            self.joint = None;
            self.bodies = None;
        }
    }

    fn destroy(&mut self, owner: &NodeId, scene: &mut SceneNodeManager) {
        self.disable(owner, scene);
    }
}

impl ComponentType for ConstraintComponent {
    const KIND: ComponentKind = ComponentKind::Constraint;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use glam::Vec3;

    use super::*;
    use crate::input::InputState;
    use crate::math::euler_degrees_to_quat;
    use crate::physics::{HeadlessPhysics, PhysicsWorld};
    use crate::render::HeadlessRenderer;
    use crate::scene::{MeshDescription, ObjectKind, PhysicsDescription, Scene, SceneObject};

    fn body(id: &str, position: Vec3) -> SceneObject {
        let mut object = SceneObject::new(id, id, ObjectKind::Mesh(MeshDescription::default()))
            .with_position(position);
        object.physics = Some(PhysicsDescription::default());
        object
    }

    fn manager(physics: &HeadlessPhysics) -> SceneNodeManager {
        SceneNodeManager::new(
            Box::new(physics.clone()),
            Box::new(HeadlessRenderer::new()),
            Arc::new(InputState::new()),
        )
    }

    #[test]
    fn joint_waits_for_both_bodies() {
        let physics = HeadlessPhysics::default();
        let mut scene = manager(&physics);
        let mut anchor = body("a", Vec3::ZERO);
        anchor.constraint = Some(ConstraintDescription {
            body_a: None,
            body_b: "b".into(),
        });
        scene.load_scene(&Scene { objects: vec![anchor] }).unwrap();
        scene.update(1.0 / 60.0);
        assert_eq!(physics.joint_count(), 0);

        scene
            .load_scene(&Scene {
                objects: vec![body("b", Vec3::new(2.0, 0.0, 0.0))],
            })
            .unwrap();
        scene.update(1.0 / 60.0);
        assert_eq!(physics.joint_count(), 1);
        let component = scene
            .node(&NodeId::new("a"))
            .unwrap()
            .component::<ConstraintComponent>()
            .unwrap();
        assert!(component.is_initialized());
    }

    #[test]
    fn joint_frame_matches_current_poses() {
        let physics = HeadlessPhysics::default();
        let mut scene = manager(&physics);
        let mut a = body("a", Vec3::new(1.0, 2.0, 0.0));
        a.rotation = Vec3::new(0.0, 90.0, 0.0);
        a.constraint = Some(ConstraintDescription {
            body_a: None,
            body_b: "@name:b".into(),
        });
        scene
            .load_scene(&Scene {
                objects: vec![a, body("b", Vec3::new(3.0, 2.0, 1.0))],
            })
            .unwrap();
        scene.update(1.0 / 60.0);
        let joint = physics.joints()[0];
        let Some(JointKind::Fixed {
            anchor2, frame2, ..
        }) = physics.joint_kind(joint)
        else {
            panic!("expected a fixed joint");
        };
        let rotation_a = euler_degrees_to_quat(Vec3::new(0.0, 90.0, 0.0));
        assert!(anchor2.abs_diff_eq(Vec3::new(-2.0, 0.0, -1.0), 1e-5));
        assert!(frame2.abs_diff_eq(rotation_a, 1e-5));
    }

    #[test]
    fn removing_a_body_drops_and_rebuilds_the_joint() {
        let physics = HeadlessPhysics::default();
        let mut scene = manager(&physics);
        let mut a = body("a", Vec3::ZERO);
        a.constraint = Some(ConstraintDescription {
            body_a: None,
            body_b: "b".into(),
        });
        scene
            .load_scene(&Scene {
                objects: vec![a, body("b", Vec3::X)],
            })
            .unwrap();
        scene.update(1.0 / 60.0);
        assert_eq!(physics.joint_count(), 1);
        let b = NodeId::new("b");
        scene.set_component_enabled(&b, ComponentKind::Physics, false);
        assert_eq!(physics.joint_count(), 0);
        scene.update(1.0 / 60.0);
        assert_eq!(physics.joint_count(), 0);
        scene.set_component_enabled(&b, ComponentKind::Physics, true);
        scene.update(1.0 / 60.0);
        assert_eq!(physics.joint_count(), 1);
        assert!(physics.contains_body(body_of(&scene, &b).unwrap()));
    }
}
