use approx::assert_relative_eq;
use glam::{Mat4, Quat, Vec3};
use once_cell::sync::Lazy;
use serde_json::json;

use stagecraft_runtime::scene::{MeshDescription, ObjectKind, ScriptDescription};
use stagecraft_runtime::scripting::{compile_script, resolve_target};
use stagecraft_runtime::{NodeId, Scene, SceneNodeManager, SceneObject, TargetError, Value};

static PATROL_BLOCKS: Lazy<Vec<serde_json::Value>> = Lazy::new(|| {
    vec![
        json!({"type": "setVariable", "parameters": {"name": "laps", "value": 0}}),
        json!({"type": "forever", "children": [
            {"type": "ifElse",
             "parameters": {"condition": {"type": "compare", "parameters": {"a": {"variable": "laps"}, "operator": "<", "b": 3}}},
             "children": [
                {"type": "move", "parameters": {"position": "1, 0, 0"}},
                {"type": "changeVariable", "parameters": {"name": "laps"}},
                {"type": "wait", "parameters": {"duration": 0.5}}
             ],
             "elseChildren": [{"type": "stopScript"}]}
        ]}),
    ]
});

fn mesh(id: &str, name: &str) -> SceneObject {
    SceneObject::new(id, name, ObjectKind::Mesh(MeshDescription::default()))
}

fn scripted(id: &str, blocks: Vec<serde_json::Value>) -> SceneObject {
    let mut object = mesh(id, id);
    object.script = Some(ScriptDescription { id: None, blocks });
    object
}

fn load(objects: Vec<SceneObject>) -> SceneNodeManager {
    let mut manager = SceneNodeManager::headless();
    manager.load_scene(&Scene { objects }).unwrap();
    manager
}

fn assert_vec3_eq(actual: Vec3, expected: Vec3) {
    assert_relative_eq!(actual.x, expected.x, epsilon = 1e-4);
    assert_relative_eq!(actual.y, expected.y, epsilon = 1e-4);
    assert_relative_eq!(actual.z, expected.z, epsilon = 1e-4);
}

#[test]
fn child_follows_moved_parent() {
    let parent = mesh("p", "P").with_child(mesh("c", "C").with_position(Vec3::new(2.0, 0.0, 0.0)));
    let mut manager = load(vec![parent]);
    let (p, c) = (NodeId::new("p"), NodeId::new("c"));

    manager.set_position(&p, Vec3::new(10.0, 0.0, 0.0)).unwrap();
    manager.update_world_matrix(&c);
    assert_vec3_eq(manager.node(&c).unwrap().position(), Vec3::new(12.0, 0.0, 0.0));
}

#[test]
fn child_pose_composes_parent_rotation_and_offset() {
    let parent = mesh("p", "P").with_child(mesh("c", "C").with_position(Vec3::new(0.0, 0.0, 3.0)));
    let mut manager = load(vec![parent]);
    let (p, c) = (NodeId::new("p"), NodeId::new("c"));

    let turn = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
    manager.set_position(&p, Vec3::new(1.0, 2.0, 0.0)).unwrap();
    manager.set_rotation(&p, turn).unwrap();
    manager.update_world_matrix(&c);

    let parent_node = manager.node(&p).unwrap();
    let child = manager.node(&c).unwrap();
    let offset = *child.offset_from_parent().unwrap();
    assert_vec3_eq(
        child.position(),
        parent_node.position() + parent_node.rotation() * offset.position,
    );
    assert!(child.rotation().abs_diff_eq(parent_node.rotation() * offset.rotation, 1e-5));
    assert_vec3_eq(child.position(), Vec3::new(4.0, 2.0, 0.0));
}

#[test]
fn reparenting_keeps_world_pose() {
    let mut tilted = mesh("b", "B").with_position(Vec3::new(5.0, 0.0, 0.0));
    tilted.rotation = Vec3::new(0.0, 0.0, 30.0);
    let mut manager = load(vec![mesh("a", "A").with_position(Vec3::new(-3.0, 1.0, 0.0)), tilted]);
    let (a, b) = (NodeId::new("a"), NodeId::new("b"));
    manager.set_rotation(&a, Quat::from_rotation_x(0.7)).unwrap();

    let before = manager.node(&b).unwrap().transform();
    manager.set_parent(&b, Some(&a)).unwrap();
    manager.update_world_matrix(&b);
    let after = manager.node(&b).unwrap().transform();

    assert_vec3_eq(after.position, before.position);
    assert!(after.rotation.abs_diff_eq(before.rotation, 1e-5));
    assert_eq!(manager.node(&b).unwrap().parent(), Some(&a));
}

#[test]
fn set_position_script_updates_world_matrix() {
    let mut manager = load(vec![scripted(
        "box",
        vec![json!({"type": "set", "parameters": {"property": "position", "value": "5,5,5"}})],
    )]);
    manager.update(1.0 / 60.0);

    let node = manager.node(&NodeId::new("box")).unwrap();
    assert_eq!(node.position(), Vec3::splat(5.0));
    let composed = Mat4::from_scale_rotation_translation(node.scale(), node.rotation(), node.position());
    assert!(node.world_matrix().abs_diff_eq(composed, 1e-6));
}

#[test]
fn string_conditions_follow_script_truthiness() {
    let mut manager = load(vec![scripted(
        "box",
        vec![
            json!({"type": "if", "parameters": {"condition": "0"}, "children": [
                {"type": "setVariable", "parameters": {"name": "zero", "value": true}}
            ]}),
            json!({"type": "if", "parameters": {"condition": "1"}, "children": [
                {"type": "setVariable", "parameters": {"name": "one", "value": true}}
            ]}),
        ],
    )]);
    manager.update(1.0 / 60.0);

    assert!(manager.variables().global("zero").is_none());
    assert_eq!(manager.variables().global("one"), Some(&Value::Bool(true)));
}

#[test]
fn failing_move_is_logged_and_script_continues() {
    let mut manager = load(vec![scripted(
        "box",
        vec![
            json!({"type": "move", "parameters": {"position": {"variable": "nowhere"}}}),
            json!({"type": "setVariable", "parameters": {"name": "reached", "value": 1}}),
        ],
    )]);
    manager.update(1.0 / 60.0);

    assert_eq!(manager.node(&NodeId::new("box")).unwrap().position(), Vec3::ZERO);
    assert_eq!(manager.variables().global("reached"), Some(&Value::Number(1.0)));
}

#[test]
fn patrol_script_waits_between_steps_and_stops_itself() {
    let mut manager = load(vec![scripted("guard", PATROL_BLOCKS.clone())]);
    let guard = NodeId::new("guard");

    manager.update(0.1);
    assert_vec3_eq(manager.node(&guard).unwrap().position(), Vec3::X);

    for _ in 0..4 {
        manager.update(0.1);
    }
    assert_vec3_eq(manager.node(&guard).unwrap().position(), Vec3::X);

    for _ in 0..40 {
        manager.update(0.1);
    }
    assert_vec3_eq(manager.node(&guard).unwrap().position(), Vec3::new(3.0, 0.0, 0.0));
    assert_eq!(manager.variables().global("laps"), Some(&Value::Number(3.0)));
}

#[test]
fn compiling_twice_is_deterministic() {
    assert_eq!(compile_script(&PATROL_BLOCKS), compile_script(&PATROL_BLOCKS));
}

#[test]
fn relative_and_id_targets_resolve() {
    let manager = load(vec![mesh("p", "P").with_child(mesh("c", "C"))]);
    let (p, c) = (NodeId::new("p"), NodeId::new("c"));

    assert_eq!(resolve_target(".", Some(&c), &manager), Ok(c.clone()));
    assert_eq!(resolve_target("..", Some(&c), &manager), Ok(p.clone()));
    assert_eq!(resolve_target("#id:c", None, &manager), Ok(c.clone()));
    assert_eq!(resolve_target("#id:c", Some(&p), &manager), Ok(c));
    assert_eq!(
        resolve_target("..", Some(&p), &manager),
        Err(TargetError::NoSpecificObject("..".into()))
    );
}
