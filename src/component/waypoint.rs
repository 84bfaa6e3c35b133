use log::warn;

use crate::manager::SceneNodeManager;
use crate::node::NodeId;
use crate::scene::WaypointDescription;

use super::{Component, ComponentKind, ComponentType};

/// Walks its node through authored waypoints at constant speed.
pub struct WaypointNavigatorComponent {
    description: WaypointDescription,
    next: usize,
    finished: bool,
    enabled: bool,
}

impl WaypointNavigatorComponent {
    pub fn new(description: WaypointDescription) -> Self {
        Self {
            description,
            next: 0,
            finished: false,
            enabled: false,
        }
    }

    /// Index of the waypoint currently headed for.
    pub fn next_index(&self) -> usize {
        self.next
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Component for WaypointNavigatorComponent {
    fn kind(&self) -> ComponentKind {
        ComponentKind::WaypointNavigator
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
        let points = &self.description.points;
        if self.finished || points.is_empty() || self.description.speed <= 0.0 {
            return;
        }
        let Some(mut position) = scene.node(owner).map(|node| node.position()) else {
            return;
        };

        let mut budget = self.description.speed * delta;
        // Bounded so coincident looping points cannot spin forever.
        for _ in 0..=points.len() {
            let target = points[self.next];
            let distance = position.distance(target);
            if distance > budget {
                position += (target - position) / distance * budget;
                break;
            }
            position = target;
            budget -= distance;
            self.next += 1;
            if self.next == points.len() {
                if self.description.looping {
                    self.next = 0;
                } else {
                    self.next = points.len() - 1;
                    self.finished = true;
                    break;
                }
            }
            if budget <= 0.0 {
                break;
            }
        }

        if let Err(err) = scene.set_position(owner, position) {
            warn!("{owner}: waypoint movement failed: {err}");
        }
    }

    fn destroy(&mut self, _owner: &NodeId, _scene: &mut SceneNodeManager) {
        self.enabled = false;
    }
}

impl ComponentType for WaypointNavigatorComponent {
    const KIND: ComponentKind = ComponentKind::WaypointNavigator;
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::scene::{ObjectKind, Scene, SceneObject};

    fn patrol(looping: bool) -> SceneNodeManager {
        let mut object = SceneObject::new("guard", "Guard", ObjectKind::Group);
        object.waypoints = Some(WaypointDescription {
            points: vec![Vec3::new(2.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 2.0)],
            speed: 1.0,
            looping,
        });
        let mut manager = SceneNodeManager::headless();
        manager.load_scene(&Scene { objects: vec![object] }).unwrap();
        manager
    }

    fn guard(manager: &SceneNodeManager) -> Vec3 {
        manager.node(&NodeId::new("guard")).unwrap().position()
    }

    #[test]
    fn moves_at_constant_speed_across_corners() {
        let mut manager = patrol(false);
        manager.update(1.0);
        assert!(guard(&manager).abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), 1e-5));
        manager.update(1.5);
        assert!(guard(&manager).abs_diff_eq(Vec3::new(2.0, 0.0, 0.5), 1e-5));
    }

    #[test]
    fn stops_at_last_point_unless_looping() {
        let mut manager = patrol(false);
        manager.update(10.0);
        assert_eq!(guard(&manager), Vec3::new(2.0, 0.0, 2.0));
        manager.update(1.0);
        assert_eq!(guard(&manager), Vec3::new(2.0, 0.0, 2.0));

        let mut looping = patrol(true);
        looping.update(4.5);
        // 2 to the first point, 2 to the second, 0.5 back towards the first.
        assert!(guard(&looping).abs_diff_eq(Vec3::new(2.0, 0.0, 1.5), 1e-5));
    }
}
