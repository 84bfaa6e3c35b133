use std::sync::Arc;

use log::debug;

use crate::manager::SceneNodeManager;
use crate::node::NodeId;
use crate::scene::ScriptDescription;
use crate::scripting::compiler::compile_script;
use crate::scripting::context::RuntimeContext;
use crate::scripting::interpreter::{ExecutionState, Interpreter};
use crate::scripting::op::OpNode;

use super::{Component, ComponentKind, ComponentType};

/// Runs a compiled script on its node.
///
/// The program starts on the first update after the component is enabled and
/// is resumed every following frame while it has a pending continuation.
/// Disabling stops the run and drops the script's local variables, as does a
/// run that stops itself; enabling again restarts it from the top.
pub struct ScriptComponent {
    script_id: String,
    program: Arc<[OpNode]>,
    interpreter: Interpreter,
    started: bool,
    enabled: bool,
}

impl ScriptComponent {
    pub fn new(script_id: impl Into<String>, program: Vec<OpNode>) -> Self {
        Self {
            script_id: script_id.into(),
            program: program.into(),
            interpreter: Interpreter::new(),
            started: false,
            enabled: false,
        }
    }

    /// Compiles the authored blocks once; the op tree is immutable afterwards.
    /// Locals are keyed by the owning node, so clones never share them.
    pub fn from_description(owner: &NodeId, description: &ScriptDescription) -> Self {
        let program = compile_script(&description.blocks);
        debug!(
            "{owner}: compiled script {} into {} statement(s)",
            description.id.as_deref().unwrap_or("(unnamed)"),
            program.len()
        );
        Self::new(owner.as_str(), program)
    }

    pub fn script_id(&self) -> &str {
        &self.script_id
    }

    pub fn program(&self) -> &[OpNode] {
        &self.program
    }

    pub fn state(&self) -> ExecutionState {
        self.interpreter.state()
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Stops the current run, if any.
    pub fn stop(&mut self, scene: &mut SceneNodeManager) {
        self.interpreter.stop();
        scene.variables_mut().clear_locals(&self.script_id);
        self.started = false;
    }
}

impl Component for ScriptComponent {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Script
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn enable(&mut self, _owner: &NodeId, _scene: &mut SceneNodeManager) {
        self.enabled = true;
    }

    fn disable(&mut self, _owner: &NodeId, scene: &mut SceneNodeManager) {
        if self.started {
            self.stop(scene);
        }
        self.enabled = false;
    }

    fn update(&mut self, owner: &NodeId, scene: &mut SceneNodeManager, delta: f32) {
        let mut ctx = RuntimeContext::new(scene, Some(owner.clone()), self.script_id.as_str());
        if !self.started {
            self.started = true;
            let state = self.interpreter.run(Arc::clone(&self.program), &mut ctx);
            debug!("{owner}: script started ({state:?})");
        } else if self.interpreter.is_suspended() {
            self.interpreter.resume(&mut ctx, delta);
        }
    }

    fn destroy(&mut self, _owner: &NodeId, scene: &mut SceneNodeManager) {
        self.stop(scene);
        self.enabled = false;
    }
}

impl ComponentType for ScriptComponent {
    const KIND: ComponentKind = ComponentKind::Script;
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use serde_json::json;

    use super::*;
    use crate::scene::{MeshDescription, ObjectKind, Scene, SceneObject};
    use crate::scripting::value::Value;

    fn scripted(blocks: serde_json::Value) -> SceneNodeManager {
        let mut object = SceneObject::new("box", "Box", ObjectKind::Mesh(MeshDescription::default()));
        object.script = Some(ScriptDescription {
            id: Some("mover".into()),
            blocks: serde_json::from_value(blocks).unwrap(),
        });
        let mut manager = SceneNodeManager::headless();
        manager.load_scene(&Scene { objects: vec![object] }).unwrap();
        manager
    }

    fn position(manager: &SceneNodeManager) -> Vec3 {
        manager.node(&NodeId::new("box")).unwrap().position()
    }

    #[test]
    fn script_starts_on_first_update_and_resumes_after_wait() {
        let mut manager = scripted(json!([
            {"type": "move", "parameters": {"position": "1, 0, 0"}},
            {"type": "wait", "parameters": {"duration": 0.05}},
            {"type": "move", "parameters": {"position": "0, 1, 0"}}
        ]));
        assert_eq!(position(&manager), Vec3::ZERO);
        manager.update(0.02);
        assert_eq!(position(&manager), Vec3::X);
        manager.update(0.02);
        manager.update(0.02);
        assert_eq!(position(&manager), Vec3::X);
        manager.update(0.02);
        assert_eq!(position(&manager), Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn disabling_stops_and_clears_locals() {
        let mut manager = scripted(json!([
            {"type": "setVariable", "parameters": {"name": "hits", "value": 2, "scope": "local"}},
            {"type": "forever", "children": [
                {"type": "move", "parameters": {"position": "0, 0, 1"}}
            ]}
        ]));
        let id = NodeId::new("box");
        manager.update(0.016);
        manager.update(0.016);
        assert_eq!(position(&manager).z, 2.0);
        assert_eq!(manager.variables().get("box", "hits"), Some(&Value::Number(2.0)));

        manager.set_component_enabled(&id, ComponentKind::Script, false);
        manager.update(0.016);
        assert_eq!(position(&manager).z, 2.0);
        assert!(manager.variables().get("box", "hits").is_none());
        let state = manager
            .node(&id)
            .unwrap()
            .component::<ScriptComponent>()
            .unwrap()
            .state();
        assert_eq!(state, ExecutionState::Stopped);
    }

    #[test]
    fn stop_script_statement_clears_locals() {
        let mut manager = scripted(json!([
            {"type": "setVariable", "parameters": {"name": "hits", "value": 2, "scope": "local"}},
            {"type": "stopScript"},
            {"type": "move", "parameters": {"position": "1, 0, 0"}}
        ]));
        let id = NodeId::new("box");
        manager.update(0.016);
        let state = manager
            .node(&id)
            .unwrap()
            .component::<ScriptComponent>()
            .unwrap()
            .state();
        assert_eq!(state, ExecutionState::Stopped);
        assert!(manager.variables().get("box", "hits").is_none());
        assert_eq!(position(&manager), Vec3::ZERO);

        manager.update(0.016);
        assert!(manager.variables().get("box", "hits").is_none());
    }

    #[test]
    fn script_destroying_its_node_stops_cleanly() {
        let mut manager = scripted(json!([
            {"type": "destroy"},
            {"type": "move", "parameters": {"position": "1, 0, 0"}}
        ]));
        manager.update(0.016);
        assert!(manager.is_empty());
        manager.update(0.016);
    }
}
