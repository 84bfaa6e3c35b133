use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;

use crate::config::RuntimeConfig;
use crate::input::InputState;
use crate::manager::{RuntimeEvent, SceneNodeManager};
use crate::node::NodeId;
use crate::physics::HeadlessPhysics;
use crate::render::HeadlessRenderer;
use crate::scene::{Scene, SceneObject};
use crate::scripting::compiler::compile_script;

/// One scene session: configuration, the node manager and handles to the
/// headless physics world and renderer it drives.
pub struct Session {
    config: RuntimeConfig,
    manager: SceneNodeManager,
    physics: HeadlessPhysics,
    renderer: HeadlessRenderer,
    input: Arc<InputState>,
    frame: u64,
}

impl Session {
    pub fn new(config: RuntimeConfig) -> Self {
        let physics = HeadlessPhysics::new(config.gravity);
        let renderer = HeadlessRenderer::new();
        let input = Arc::new(InputState::new());
        let manager = SceneNodeManager::new(
            Box::new(physics.clone()),
            Box::new(renderer.clone()),
            Arc::clone(&input),
        );
        Self {
            config,
            manager,
            physics,
            renderer,
            input,
            frame: 0,
        }
    }

    pub fn load_scene(&mut self, scene: &Scene) -> Result<Vec<NodeId>> {
        let created = self
            .manager
            .load_scene(scene)
            .context("failed to instantiate scene")?;
        info!("session holds {} node(s)", self.manager.len());
        Ok(created)
    }

    /// Advances one frame of `config.frame_delta` seconds.
    pub fn step(&mut self) {
        let delta = self.config.frame_delta;
        self.step_by(delta);
    }

    pub fn step_by(&mut self, delta: f32) {
        self.manager.update(delta);
        self.frame += 1;
    }

    pub fn run_frames(&mut self, frames: u32) {
        for _ in 0..frames {
            self.step();
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn manager(&self) -> &SceneNodeManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut SceneNodeManager {
        &mut self.manager
    }

    pub fn physics(&self) -> &HeadlessPhysics {
        &self.physics
    }

    pub fn renderer(&self) -> &HeadlessRenderer {
        &self.renderer
    }

    pub fn input(&self) -> &Arc<InputState> {
        &self.input
    }

    /// Frames simulated so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn drain_events(&mut self) -> Vec<RuntimeEvent> {
        self.manager.drain_events()
    }
}

/// Reads a scene from disk; `.json` files are parsed as JSON, anything else
/// as XML.
pub fn load_scene_file(path: impl AsRef<Path>) -> Result<Scene> {
    let path = path.as_ref();
    let source = fs::read_to_string(path)
        .with_context(|| format!("failed to read scene {}", path.display()))?;
    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if is_json {
        Scene::from_json(&source).context("failed to parse scene JSON")
    } else {
        Scene::from_xml(&source).context("failed to parse scene XML")
    }
}

pub fn print_scene_summary(scene: &Scene) {
    println!("Loaded scene with {} objects", scene.object_count());
    fn walk(objects: &[SceneObject], depth: usize) {
        for object in objects {
            println!("{}- {} ({})", " ".repeat(depth * 2 + 1), object.name, object.type_tag());
            walk(&object.children, depth + 1);
        }
    }
    walk(&scene.objects, 0);
}

/// Prints the compiled op tree of every scripted object.
pub fn print_compiled_scripts(scene: &Scene) -> Result<()> {
    fn walk(objects: &[SceneObject]) -> Result<()> {
        for object in objects {
            if let Some(script) = &object.script {
                let ops = compile_script(&script.blocks);
                let json = serde_json::to_string_pretty(&ops)
                    .with_context(|| format!("failed to serialise ops of {}", object.name))?;
                println!("Compiled script of {}:\n{json}", object.name);
            }
            walk(&object.children)?;
        }
        Ok(())
    }
    walk(&scene.objects)
}

pub fn print_events(events: &[RuntimeEvent]) {
    for event in events {
        println!(
            "Event {} from {} at {:.2}s: {}",
            event.name,
            event.source.as_ref().map(NodeId::as_str).unwrap_or("host"),
            event.time,
            event.payload
        );
    }
}

pub fn print_final_state(manager: &SceneNodeManager) {
    println!("Final object states:");
    for state in manager.node_states() {
        println!(
            " - {} pos=({:.2}, {:.2}, {:.2}) rot=({:.2}, {:.2}, {:.2})",
            state.name,
            state.position.x,
            state.position.y,
            state.position.z,
            state.rotation.x,
            state.rotation.y,
            state.rotation.z
        );
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::scene::{ObjectKind, PhysicsDescription};

    #[test]
    fn session_uses_configured_gravity_and_delta() {
        let config = RuntimeConfig {
            gravity: Vec3::ZERO,
            frame_delta: 0.5,
            ..RuntimeConfig::default()
        };
        let mut session = Session::new(config);
        let mut crate_object = SceneObject::new("crate", "Crate", ObjectKind::Group)
            .with_position(Vec3::Y);
        crate_object.physics = Some(PhysicsDescription::default());
        session
            .load_scene(&Scene {
                objects: vec![crate_object],
            })
            .unwrap();
        session.run_frames(4);
        assert_eq!(session.frame(), 4);
        assert!((session.manager().elapsed() - 2.0).abs() < 1e-9);
        assert_eq!(session.physics().body_count(), 1);
        let node = session.manager().node(&NodeId::new("crate")).unwrap();
        assert_eq!(node.position(), Vec3::Y);
    }
}
