//! Cooperative executor for compiled scripts.
//!
//! Execution state is an explicit stack of frames rather than a thread or a
//! future. `run` starts a program and executes until the first suspension
//! point (`wait`, the end of a `forever` pass) or completion; every later
//! `resume` advances timers by the frame delta and continues. Because the
//! whole continuation is data, `stop` can discard it synchronously.

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::Vec3;
use log::{debug, error, info, warn};

use super::context::RuntimeContext;
use super::op::{OpNode, Operation};
use super::value::Value;
use super::variables::VariableScope;
use crate::component::{MotorComponent, PhysicsComponent};
use crate::error::ScriptError;
use crate::math::{euler_degrees_to_quat, quat_to_euler_degrees};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Idle,
    Running,
    Completed,
    Stopped,
}

/// Why a suspension ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    Elapsed,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Waiter(u64);

/// Cancellation flag plus the waiters currently suspended on it.
///
/// Each waiter is settled exactly once, either by its timer or by
/// [`trigger`](Self::trigger).
#[derive(Debug, Default)]
pub struct StopSignal {
    triggered: bool,
    next_waiter: u64,
    pending: Vec<Waiter>,
    settled: BTreeMap<Waiter, WakeReason>,
}

impl StopSignal {
    pub fn register(&mut self) -> Waiter {
        self.next_waiter += 1;
        let waiter = Waiter(self.next_waiter);
        if self.triggered {
            self.settled.insert(waiter, WakeReason::Stopped);
        } else {
            self.pending.push(waiter);
        }
        waiter
    }

    /// Settles a pending waiter; `false` if it was already settled.
    pub fn settle(&mut self, waiter: Waiter, reason: WakeReason) -> bool {
        let Some(index) = self.pending.iter().position(|w| *w == waiter) else {
            return false;
        };
        self.pending.swap_remove(index);
        self.settled.insert(waiter, reason);
        true
    }

    /// Raises the flag and wakes every pending waiter. Returns how many were
    /// woken; a second call wakes nobody.
    pub fn trigger(&mut self) -> usize {
        self.triggered = true;
        let woken = self.pending.len();
        for waiter in self.pending.drain(..) {
            self.settled.insert(waiter, WakeReason::Stopped);
        }
        woken
    }

    pub fn reset(&mut self) {
        self.triggered = false;
        self.pending.clear();
        self.settled.clear();
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered
    }

    pub fn outcome(&self, waiter: Waiter) -> Option<WakeReason> {
        self.settled.get(&waiter).copied()
    }

    /// Takes the outcome of a settled waiter, forgetting it.
    pub fn release(&mut self, waiter: Waiter) -> Option<WakeReason> {
        self.settled.remove(&waiter)
    }

    /// Waiters still pending or settled but not yet released.
    pub fn tracked(&self) -> usize {
        self.pending.len() + self.settled.len()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[derive(Debug)]
enum Frame {
    Block {
        ops: Arc<[OpNode]>,
        next: usize,
    },
    Forever {
        body: Arc<[OpNode]>,
    },
    /// Suspends until the next resume.
    Yield,
    Wait {
        remaining_ms: f64,
        waiter: Waiter,
    },
    Repeat {
        body: Arc<[OpNode]>,
        remaining: u64,
        index: u64,
        index_var: Option<String>,
    },
    Iterate {
        body: Arc<[OpNode]>,
        items: Vec<Value>,
        next: usize,
        item_var: String,
        index_var: Option<String>,
    },
}

/// What a statement asks the driver to do next.
enum Flow {
    Next,
    Enter(Frame),
    Stop,
}

enum Step {
    Finished,
    Suspended,
    Pop,
    Push(Frame),
    Execute(OpNode),
    Iteration {
        bindings: Vec<(String, Value)>,
        body: Arc<[OpNode]>,
    },
}

/// One interpreter instance per script component.
#[derive(Debug)]
pub struct Interpreter {
    state: ExecutionState,
    signal: StopSignal,
    frames: Vec<Frame>,
    executed: u64,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            state: ExecutionState::Idle,
            signal: StopSignal::default(),
            frames: Vec::new(),
            executed: 0,
        }
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    /// True while the program has a continuation waiting for `resume`.
    pub fn is_suspended(&self) -> bool {
        self.state == ExecutionState::Running && !self.frames.is_empty()
    }

    pub fn signal(&self) -> &StopSignal {
        &self.signal
    }

    /// Statements executed since the last `run`.
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Starts `program` from the top, discarding any previous continuation.
    pub fn run(&mut self, program: Arc<[OpNode]>, ctx: &mut RuntimeContext<'_>) -> ExecutionState {
        self.signal.reset();
        self.executed = 0;
        self.frames.clear();
        self.frames.push(Frame::Block {
            ops: program,
            next: 0,
        });
        self.state = ExecutionState::Running;
        self.drive(ctx);
        self.state
    }

    /// Advances pending timers by `delta` seconds and continues execution.
    pub fn resume(&mut self, ctx: &mut RuntimeContext<'_>, delta: f32) -> ExecutionState {
        if self.state != ExecutionState::Running {
            return self.state;
        }
        match self.frames.last_mut() {
            Some(Frame::Yield) => {
                self.frames.pop();
            }
            Some(Frame::Wait {
                remaining_ms,
                waiter,
            }) => {
                *remaining_ms -= delta as f64 * 1000.0;
                if *remaining_ms > 0.0 {
                    return self.state;
                }
                let waiter = *waiter;
                self.signal.settle(waiter, WakeReason::Elapsed);
                self.signal.release(waiter);
                self.frames.pop();
            }
            _ => {}
        }
        self.drive(ctx);
        self.state
    }

    /// Cancels the current run. Idempotent; pending waits are resolved
    /// immediately and nothing executes afterwards.
    pub fn stop(&mut self) {
        if self.state == ExecutionState::Stopped {
            return;
        }
        let woken = self.signal.trigger();
        if woken > 0 {
            debug!("stop resolved {woken} pending wait(s)");
        }
        self.frames.clear();
        self.state = ExecutionState::Stopped;
    }

    /// Stops from inside a run and drops the script's local variables.
    fn halt(&mut self, ctx: &mut RuntimeContext<'_>) {
        self.stop();
        ctx.scene.variables_mut().clear_locals(&ctx.script_id);
    }

    fn drive(&mut self, ctx: &mut RuntimeContext<'_>) {
        loop {
            if self.signal.is_triggered() {
                self.halt(ctx);
                return;
            }
            if let Some(node) = &ctx.node {
                if !ctx.scene.contains(node) {
                    debug!("script {} lost its node; stopping", ctx.script_id);
                    self.halt(ctx);
                    return;
                }
            }
            match self.next_step() {
                Step::Finished => {
                    self.state = ExecutionState::Completed;
                    return;
                }
                Step::Suspended => return,
                Step::Pop => {
                    self.frames.pop();
                }
                Step::Push(frame) => self.frames.push(frame),
                Step::Iteration { bindings, body } => {
                    for (name, value) in bindings {
                        ctx.set_local(&name, value);
                    }
                    self.frames.push(Frame::Block { ops: body, next: 0 });
                }
                Step::Execute(op) => {
                    self.executed += 1;
                    match self.execute(&op, ctx) {
                        Ok(Flow::Next) => {}
                        Ok(Flow::Enter(frame)) => self.frames.push(frame),
                        Ok(Flow::Stop) => {
                            self.halt(ctx);
                            return;
                        }
                        Err(err) => {
                            error!("script {}: {} failed: {err}", ctx.script_id, op.kind());
                        }
                    }
                }
            }
        }
    }

    fn next_step(&mut self) -> Step {
        let Some(frame) = self.frames.last_mut() else {
            return Step::Finished;
        };
        match frame {
            Frame::Block { ops, next } => match ops.get(*next) {
                Some(op) => {
                    *next += 1;
                    Step::Execute(op.clone())
                }
                None => Step::Pop,
            },
            Frame::Forever { body } => {
                let body = Arc::clone(body);
                // Body runs first; the yield underneath ends the pass.
                self.frames.push(Frame::Yield);
                Step::Push(Frame::Block { ops: body, next: 0 })
            }
            Frame::Yield | Frame::Wait { .. } => Step::Suspended,
            Frame::Repeat {
                body,
                remaining,
                index,
                index_var,
            } => {
                if *remaining == 0 {
                    return Step::Pop;
                }
                let bindings = index_var
                    .iter()
                    .map(|name| (name.clone(), Value::Number(*index as f64)))
                    .collect();
                *remaining -= 1;
                *index += 1;
                Step::Iteration {
                    bindings,
                    body: Arc::clone(body),
                }
            }
            Frame::Iterate {
                body,
                items,
                next,
                item_var,
                index_var,
            } => {
                let Some(item) = items.get(*next) else {
                    return Step::Pop;
                };
                let mut bindings = vec![(item_var.clone(), item.clone())];
                if let Some(index_var) = index_var {
                    bindings.push((index_var.clone(), Value::Number(*next as f64)));
                }
                *next += 1;
                Step::Iteration {
                    bindings,
                    body: Arc::clone(body),
                }
            }
        }
    }

    fn execute(&mut self, op: &OpNode, ctx: &mut RuntimeContext<'_>) -> Result<Flow, ScriptError> {
        let op = match op {
            OpNode::Operation(op) => op,
            // Bare values in statement position do nothing.
            OpNode::Literal { .. } | OpNode::Variable { .. } => return Ok(Flow::Next),
        };
        match op.operation.as_str() {
            "if" => {
                let condition = ctx.operand(op, "condition")?.unwrap_or_default();
                Ok(enter_if(condition.is_truthy(), &op.children))
            }
            "ifElse" => {
                let condition = ctx.operand(op, "condition")?.unwrap_or_default();
                if condition.is_truthy() {
                    Ok(enter_if(true, &op.children))
                } else {
                    Ok(enter_if(true, &op.else_children))
                }
            }
            "forever" => Ok(Flow::Enter(Frame::Forever {
                body: Arc::clone(&op.children),
            })),
            "loopFor" => loop_for(op, ctx),
            "loopThrough" => loop_through(op, ctx),
            "wait" => {
                let seconds = ctx.number(op, "duration", 0.0)?;
                let remaining_ms = if seconds.is_finite() { seconds.max(0.0) * 1000.0 } else { 0.0 };
                let waiter = self.signal.register();
                Ok(Flow::Enter(Frame::Wait {
                    remaining_ms,
                    waiter,
                }))
            }
            "stopScript" => Ok(Flow::Stop),
            other => {
                statement(other, op, ctx)?;
                Ok(Flow::Next)
            }
        }
    }
}

fn enter_if(condition: bool, block: &Arc<[OpNode]>) -> Flow {
    if condition && !block.is_empty() {
        Flow::Enter(Frame::Block {
            ops: Arc::clone(block),
            next: 0,
        })
    } else {
        Flow::Next
    }
}

fn optional_name(ctx: &RuntimeContext<'_>, op: &Operation, name: &str) -> Result<Option<String>, ScriptError> {
    let text = ctx.text(op, name)?;
    Ok((!text.trim().is_empty()).then(|| text.trim().to_string()))
}

fn loop_for(op: &Operation, ctx: &mut RuntimeContext<'_>) -> Result<Flow, ScriptError> {
    let times = match ctx.operand(op, "times")? {
        Some(value) => value.as_number().unwrap_or(f64::NAN),
        None => f64::NAN,
    };
    if !times.is_finite() {
        warn!("loopFor: invalid iteration count; skipping loop");
        return Ok(Flow::Next);
    }
    let remaining = times.floor().max(0.0) as u64;
    if remaining == 0 || op.children.is_empty() {
        return Ok(Flow::Next);
    }
    Ok(Flow::Enter(Frame::Repeat {
        body: Arc::clone(&op.children),
        remaining,
        index: 0,
        index_var: optional_name(ctx, op, "indexVar")?,
    }))
}

fn loop_through(op: &Operation, ctx: &mut RuntimeContext<'_>) -> Result<Flow, ScriptError> {
    let Some(item_var) = optional_name(ctx, op, "itemVar")? else {
        warn!("loopThrough: no item variable given; skipping loop");
        return Ok(Flow::Next);
    };
    let collection = ctx.operand(op, "array")?.unwrap_or_default();
    let collection = match collection {
        Value::String(raw) => serde_json::from_str::<serde_json::Value>(&raw)
            .map(|json| Value::from_json(&json))
            .unwrap_or(Value::String(raw)),
        other => other,
    };
    let items = match collection {
        Value::List(items) => items,
        Value::Object(map) => map.into_values().collect(),
        other => {
            warn!("loopThrough: {} is not iterable; skipping loop", other.type_name());
            return Ok(Flow::Next);
        }
    };
    if items.is_empty() || op.children.is_empty() {
        return Ok(Flow::Next);
    }
    Ok(Flow::Enter(Frame::Iterate {
        body: Arc::clone(&op.children),
        items,
        next: 0,
        item_var,
        index_var: optional_name(ctx, op, "indexVar")?,
    }))
}

/// Statements that complete synchronously.
fn statement(kind: &str, op: &Operation, ctx: &mut RuntimeContext<'_>) -> Result<(), ScriptError> {
    match kind {
        "set" => set_property(op, ctx),
        "move" | "moveTo" => {
            let Some(target) = ctx.target(op)? else {
                return Ok(());
            };
            let position = ctx.required(op, "position")?.parse_vector()?;
            if kind == "move" {
                ctx.scene.translate(&target, position)?;
            } else {
                ctx.scene.set_position(&target, position)?;
            }
            Ok(())
        }
        "rotate" => {
            let Some(target) = ctx.target(op)? else {
                return Ok(());
            };
            let degrees = ctx.required(op, "rotation")?.parse_vector()?;
            ctx.scene.rotate_by(&target, euler_degrees_to_quat(degrees))?;
            Ok(())
        }
        "lookAt" => {
            let Some(target) = ctx.target(op)? else {
                return Ok(());
            };
            let point = ctx.required(op, "position")?.parse_vector()?;
            ctx.scene.look_at(&target, point)?;
            Ok(())
        }
        "directionalForce" | "directionalImpulse" | "directionalVelocity" => {
            let Some(target) = ctx.target(op)? else {
                return Ok(());
            };
            let vector = ctx.required(op, "vector")?.parse_vector()?;
            ctx.scene
                .with_component_as::<PhysicsComponent, _, _>(&target, |physics, scene| match kind {
                    "directionalForce" => physics.apply_directional_force(scene, vector),
                    "directionalImpulse" => physics.apply_directional_impulse(scene, vector),
                    _ => physics.set_velocity(scene, vector),
                })
                .ok_or(ScriptError::MissingComponent {
                    node: target,
                    component: "Physics",
                })
        }
        "clone" => {
            let Some(target) = ctx.target(op)? else {
                return Ok(());
            };
            let copy = ctx.scene.clone_subtree(&target)?;
            if let Some(variable) = optional_name(ctx, op, "variable")? {
                let scope = VariableScope::parse(&ctx.text(op, "scope")?);
                ctx.set_variable(&variable, Value::String(copy.reference()), scope);
            }
            Ok(())
        }
        "destroy" => {
            if let Some(target) = ctx.target(op)? {
                ctx.scene.remove_node(&target)?;
            }
            Ok(())
        }
        "parent" => {
            let Some(target) = ctx.target(op)? else {
                return Ok(());
            };
            let reference = ctx.text(op, "parent")?;
            if reference.trim().is_empty() || reference.trim() == "null" {
                ctx.scene.set_parent(&target, None)?;
                return Ok(());
            }
            if let Some(parent) = ctx.target_named(op, "parent")? {
                ctx.scene.set_parent(&target, Some(&parent))?;
            }
            Ok(())
        }
        "unparent" => {
            if let Some(target) = ctx.target(op)? {
                ctx.scene.set_parent(&target, None)?;
            }
            Ok(())
        }
        "emitEvent" => {
            let Some(name) = optional_name(ctx, op, "name")? else {
                warn!("emitEvent: event name is empty; nothing emitted");
                return Ok(());
            };
            let payload = ctx.operand(op, "payload")?.unwrap_or_default();
            let source = ctx.node.clone();
            ctx.scene.emit_event(name, payload, source);
            Ok(())
        }
        "setVariable" => {
            let Some(name) = optional_name(ctx, op, "name")? else {
                warn!("setVariable: variable name is empty");
                return Ok(());
            };
            let value = ctx.operand(op, "value")?.unwrap_or_default();
            let scope = VariableScope::parse(&ctx.text(op, "scope")?);
            ctx.set_variable(&name, value, scope);
            Ok(())
        }
        "changeVariable" => {
            let Some(name) = optional_name(ctx, op, "name")? else {
                warn!("changeVariable: variable name is empty");
                return Ok(());
            };
            let by = ctx.number(op, "by", 1.0)?;
            let current = ctx.variable(&name).as_number().unwrap_or(0.0);
            ctx.assign(&name, Value::Number(current + by));
            Ok(())
        }
        "log" => {
            let message = ctx.operand(op, "message")?.unwrap_or_default();
            info!("[{}] {message}", ctx.script_id);
            Ok(())
        }
        "setMotor" => {
            let Some(target) = ctx.target(op)? else {
                return Ok(());
            };
            let parameter = ctx.text(op, "parameter")?;
            let value = ctx.operand(op, "value")?.unwrap_or_default();
            ctx.scene
                .with_component_as::<MotorComponent, _, _>(&target, |motor, _| {
                    motor.set_override(&parameter, &value)
                })
                .unwrap_or(Err(ScriptError::MissingComponent {
                    node: target,
                    component: "Motor",
                }))
        }
        other => {
            warn!("unknown statement \"{other}\"; skipping");
            Ok(())
        }
    }
}

/// `set` with dotted transform paths and generic properties.
fn set_property(op: &Operation, ctx: &mut RuntimeContext<'_>) -> Result<(), ScriptError> {
    let Some(target) = ctx.target(op)? else {
        return Ok(());
    };
    let path = ctx.text(op, "property")?;
    let value = ctx.operand(op, "value")?.unwrap_or_default();
    let segments: Vec<&str> = path.split('.').map(str::trim).collect();
    let root = segments.first().copied().unwrap_or_default();
    if !matches!(root, "position" | "scale" | "rotation") {
        if segments.len() > 1 || root.is_empty() {
            warn!("set: unsupported property path \"{path}\"");
            return Ok(());
        }
        ctx.scene.set_property(&target, root, value)?;
        return Ok(());
    }
    let node = ctx
        .scene
        .node(&target)
        .ok_or_else(|| ScriptError::InvalidProperty(path.clone()))?;
    let current = match root {
        "position" => node.position(),
        "scale" => node.scale(),
        _ => quat_to_euler_degrees(node.rotation()),
    };
    let vector = match segments.as_slice() {
        [_] => value.parse_vector()?,
        [_, axis] => {
            let component = value
                .as_number()
                .ok_or_else(|| ScriptError::parse(value.to_string(), "number"))?
                as f32;
            with_axis(current, axis, component).ok_or_else(|| ScriptError::InvalidProperty(path.clone()))?
        }
        _ => return Err(ScriptError::InvalidProperty(path.clone())),
    };
    match root {
        "position" => ctx.scene.set_position(&target, vector)?,
        "scale" => ctx.scene.set_scale(&target, vector)?,
        _ => ctx.scene.set_rotation(&target, euler_degrees_to_quat(vector))?,
    }
    Ok(())
}

fn with_axis(mut vector: Vec3, axis: &str, value: f32) -> Option<Vec3> {
    match axis {
        "x" => vector.x = value,
        "y" => vector.y = value,
        "z" => vector.z = value,
        _ => return None,
    }
    Some(vector)
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use serde_json::json;

    use super::*;
    use crate::manager::SceneNodeManager;
    use crate::node::NodeId;
    use crate::scene::{MeshDescription, ObjectKind, Scene, SceneObject};
    use crate::scripting::compiler::compile_script;

    fn scene() -> SceneNodeManager {
        let mut manager = SceneNodeManager::headless();
        manager
            .load_scene(&Scene {
                objects: vec![SceneObject::new(
                    "box",
                    "Box",
                    ObjectKind::Mesh(MeshDescription::default()),
                )],
            })
            .unwrap();
        manager
    }

    fn program(blocks: serde_json::Value) -> Arc<[OpNode]> {
        let blocks: Vec<serde_json::Value> = serde_json::from_value(blocks).unwrap();
        compile_script(&blocks).into()
    }

    fn run(manager: &mut SceneNodeManager, blocks: serde_json::Value) -> Interpreter {
        let mut interpreter = Interpreter::new();
        let mut ctx = RuntimeContext::new(manager, Some(NodeId::new("box")), "box");
        interpreter.run(program(blocks), &mut ctx);
        interpreter
    }

    fn resume(manager: &mut SceneNodeManager, interpreter: &mut Interpreter, delta: f32) {
        let mut ctx = RuntimeContext::new(manager, Some(NodeId::new("box")), "box");
        interpreter.resume(&mut ctx, delta);
    }

    fn counter(manager: &SceneNodeManager) -> f64 {
        manager
            .variables()
            .global("count")
            .and_then(Value::as_number)
            .unwrap_or(0.0)
    }

    fn position(manager: &SceneNodeManager) -> Vec3 {
        manager.node(&NodeId::new("box")).unwrap().position()
    }

    fn count_block() -> serde_json::Value {
        json!({"type": "changeVariable", "parameters": {"name": "count"}})
    }

    #[test]
    fn loop_for_runs_floor_of_times() {
        for (times, expected) in [(json!(3.7), 3.0), (json!(-2), 0.0), (json!("4"), 4.0)] {
            let mut manager = scene();
            run(
                &mut manager,
                json!([{"type": "loopFor", "parameters": {"times": times}, "children": [count_block()]}]),
            );
            assert_eq!(counter(&manager), expected, "times = {times}");
        }
    }

    #[test]
    fn loop_for_with_invalid_count_is_skipped() {
        let mut manager = scene();
        let interpreter = run(
            &mut manager,
            json!([
                {"type": "loopFor", "parameters": {"times": "NaN"}, "children": [count_block()]},
                {"type": "loopFor", "parameters": {"times": "lots"}, "children": [count_block()]},
                {"type": "setVariable", "parameters": {"name": "after", "value": true}}
            ]),
        );
        assert_eq!(counter(&manager), 0.0);
        assert_eq!(manager.variables().global("after"), Some(&Value::Bool(true)));
        assert_eq!(interpreter.state(), ExecutionState::Completed);
    }

    #[test]
    fn loop_index_is_bound_locally() {
        let mut manager = scene();
        run(
            &mut manager,
            json!([{"type": "loopFor", "parameters": {"times": 3, "indexVar": "i"}, "children": [
                {"type": "setVariable", "parameters": {"name": "last", "value": {"variable": "i"}}}
            ]}]),
        );
        assert_eq!(manager.variables().global("last"), Some(&Value::Number(2.0)));
        assert_eq!(manager.variables().get("box", "i"), Some(&Value::Number(2.0)));
        assert!(manager.variables().global("i").is_none());
    }

    #[test]
    fn loop_through_visits_items_and_skips_scalars() {
        let mut manager = scene();
        run(
            &mut manager,
            json!([
                {"type": "loopThrough", "parameters": {"array": [1, 2, 3], "itemVar": "n"}, "children": [
                    {"type": "changeVariable", "parameters": {"name": "count", "by": {"variable": "n"}}}
                ]},
                {"type": "loopThrough", "parameters": {"array": 5, "itemVar": "n"}, "children": [count_block()]},
                {"type": "loopThrough", "parameters": {"array": [1]}, "children": [count_block()]}
            ]),
        );
        assert_eq!(counter(&manager), 6.0);
    }

    #[test]
    fn if_uses_script_truthiness() {
        let mut manager = scene();
        run(
            &mut manager,
            json!([
                {"type": "if", "parameters": {"condition": "0"}, "children": [count_block()]},
                {"type": "if", "parameters": {"condition": "false"}, "children": [count_block()]},
                {"type": "if", "parameters": {"condition": ""}, "children": [count_block()]},
                {"type": "if", "parameters": {"condition": "1"}, "children": [count_block()]}
            ]),
        );
        assert_eq!(counter(&manager), 1.0);
    }

    #[test]
    fn if_else_takes_the_else_branch() {
        let mut manager = scene();
        run(
            &mut manager,
            json!([{"type": "ifElse", "parameters": {"condition": 0},
                    "children": [{"type": "setVariable", "parameters": {"name": "branch", "value": "then"}}],
                    "elseChildren": [{"type": "setVariable", "parameters": {"name": "branch", "value": "else"}}]}]),
        );
        assert_eq!(manager.variables().global("branch"), Some(&Value::from("else")));
    }

    #[test]
    fn failing_statement_does_not_stop_siblings() {
        let mut manager = scene();
        let interpreter = run(
            &mut manager,
            json!([
                {"type": "move"},
                {"type": "move", "parameters": {"position": "not a vector"}},
                {"type": "teleport"},
                {"type": "move", "parameters": {"position": "(1, 2, 3)"}}
            ]),
        );
        assert_eq!(position(&manager), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(interpreter.executed(), 4);
        assert_eq!(interpreter.state(), ExecutionState::Completed);
    }

    #[test]
    fn set_position_updates_world_matrix() {
        let mut manager = scene();
        run(
            &mut manager,
            json!([
                {"type": "set", "parameters": {"property": "position", "value": "5,5,5"}},
                {"type": "set", "parameters": {"property": "rotation.y", "value": 45}},
                {"type": "set", "parameters": {"property": "health", "value": 3}},
                {"type": "set", "parameters": {"property": "color.r", "value": 1}}
            ]),
        );
        let node = manager.node(&NodeId::new("box")).unwrap();
        assert_eq!(node.position(), Vec3::splat(5.0));
        let expected = glam::Mat4::from_scale_rotation_translation(node.scale(), node.rotation(), node.position());
        assert!(node.world_matrix().abs_diff_eq(expected, 1e-6));
        assert!((quat_to_euler_degrees(node.rotation()).y - 45.0).abs() < 1e-2);
        assert_eq!(node.property("health"), Some(Value::Number(3.0)));
        assert!(node.property("color").is_none());
    }

    #[test]
    fn stop_during_wait_resolves_immediately() {
        let mut manager = scene();
        let mut interpreter = run(
            &mut manager,
            json!([
                {"type": "wait", "parameters": {"duration": 10}},
                count_block()
            ]),
        );
        assert!(interpreter.is_suspended());
        assert_eq!(interpreter.signal().pending(), 1);

        interpreter.stop();
        assert_eq!(interpreter.state(), ExecutionState::Stopped);
        assert_eq!(interpreter.signal().pending(), 0);
        assert_eq!(interpreter.signal().outcome(Waiter(1)), Some(WakeReason::Stopped));

        resume(&mut manager, &mut interpreter, 20.0);
        assert_eq!(counter(&manager), 0.0);
        interpreter.stop();
        assert_eq!(interpreter.state(), ExecutionState::Stopped);
    }

    #[test]
    fn wait_elapses_across_frames() {
        let mut manager = scene();
        let mut interpreter = run(
            &mut manager,
            json!([{"type": "wait", "parameters": {"duration": 0.1}}, count_block()]),
        );
        resume(&mut manager, &mut interpreter, 0.06);
        assert_eq!(counter(&manager), 0.0);
        resume(&mut manager, &mut interpreter, 0.06);
        assert_eq!(counter(&manager), 1.0);
        assert_eq!(interpreter.state(), ExecutionState::Completed);
        assert_eq!(interpreter.signal().tracked(), 0);
    }

    #[test]
    fn zero_wait_still_yields_a_frame() {
        let mut manager = scene();
        let mut interpreter = run(
            &mut manager,
            json!([{"type": "wait", "parameters": {"duration": 0}}, count_block()]),
        );
        assert_eq!(counter(&manager), 0.0);
        resume(&mut manager, &mut interpreter, 0.0);
        assert_eq!(counter(&manager), 1.0);
    }

    #[test]
    fn forever_runs_one_pass_per_frame_until_stopped() {
        let mut manager = scene();
        let mut interpreter = run(&mut manager, json!([{"type": "forever", "children": [count_block()]}]));
        assert_eq!(counter(&manager), 1.0);
        for _ in 0..4 {
            resume(&mut manager, &mut interpreter, 0.016);
        }
        assert_eq!(counter(&manager), 5.0);
        interpreter.stop();
        resume(&mut manager, &mut interpreter, 0.016);
        assert_eq!(counter(&manager), 5.0);
    }

    #[test]
    fn stop_script_ends_the_run() {
        let mut manager = scene();
        let interpreter = run(&mut manager, json!([count_block(), {"type": "stopScript"}, count_block()]));
        assert_eq!(counter(&manager), 1.0);
        assert_eq!(interpreter.state(), ExecutionState::Stopped);
    }

    #[test]
    fn run_again_after_stop_starts_fresh() {
        let mut manager = scene();
        let mut interpreter = run(&mut manager, json!([{"type": "stopScript"}]));
        assert_eq!(interpreter.state(), ExecutionState::Stopped);
        let mut ctx = RuntimeContext::new(&mut manager, Some(NodeId::new("box")), "box");
        let state = interpreter.run(program(json!([count_block()])), &mut ctx);
        assert_eq!(state, ExecutionState::Completed);
        assert!(!interpreter.signal().is_triggered());
        assert_eq!(counter(&manager), 1.0);
    }

    #[test]
    fn clone_stores_reference_and_emit_event_is_queued() {
        let mut manager = scene();
        run(
            &mut manager,
            json!([
                {"type": "clone", "parameters": {"variable": "copy"}},
                {"type": "move", "parameters": {"target": {"variable": "copy"}, "position": "0, 1, 0"}},
                {"type": "emitEvent", "parameters": {"name": "spawned", "payload": {"variable": "copy"}}},
                {"type": "emitEvent", "parameters": {"name": ""}}
            ]),
        );
        assert_eq!(manager.len(), 2);
        let reference = manager.variables().global("copy").cloned().unwrap();
        let id = NodeId::new(reference.to_string().trim_start_matches("#id:"));
        assert_eq!(manager.node(&id).unwrap().position(), Vec3::Y);
        assert_eq!(position(&manager), Vec3::ZERO);
        let events = manager.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload, reference);
        assert_eq!(events[0].source, Some(NodeId::new("box")));
    }

    #[test]
    fn infinite_loop_count_is_skipped() {
        let mut manager = scene();
        let interpreter = run(
            &mut manager,
            json!([
                {"type": "loopFor", "parameters": {"times": "Infinity"}, "children": [count_block()]},
                {"type": "loopFor", "parameters": {"times": "-inf"}, "children": [count_block()]}
            ]),
        );
        assert_eq!(counter(&manager), 0.0);
        assert_eq!(interpreter.state(), ExecutionState::Completed);
    }

    #[test]
    fn stop_script_clears_local_variables() {
        let mut manager = scene();
        let interpreter = run(
            &mut manager,
            json!([
                {"type": "setVariable", "parameters": {"name": "hits", "value": 2, "scope": "local"}},
                {"type": "setVariable", "parameters": {"name": "total", "value": 7}},
                {"type": "stopScript"}
            ]),
        );
        assert_eq!(interpreter.state(), ExecutionState::Stopped);
        assert!(manager.variables().get("box", "hits").is_none());
        assert_eq!(manager.variables().global("total"), Some(&Value::Number(7.0)));
    }

    #[test]
    fn completed_run_keeps_local_variables() {
        let mut manager = scene();
        let interpreter = run(
            &mut manager,
            json!([{"type": "setVariable", "parameters": {"name": "hits", "value": 2, "scope": "local"}}]),
        );
        assert_eq!(interpreter.state(), ExecutionState::Completed);
        assert_eq!(manager.variables().get("box", "hits"), Some(&Value::Number(2.0)));
        assert!(manager.variables().global("hits").is_none());
    }

    #[test]
    fn long_running_wait_loop_does_not_accumulate_waiters() {
        let mut manager = scene();
        let mut interpreter = run(
            &mut manager,
            json!([{"type": "forever", "children": [{"type": "wait", "parameters": {"duration": 0}}]}]),
        );
        for _ in 0..10_000 {
            resume(&mut manager, &mut interpreter, 0.016);
            assert!(interpreter.signal().tracked() <= 1);
        }
        assert!(interpreter.is_suspended());
        interpreter.stop();
        assert_eq!(interpreter.state(), ExecutionState::Stopped);
    }

    #[test]
    fn stop_signal_settles_each_waiter_once() {
        let mut signal = StopSignal::default();
        let first = signal.register();
        let second = signal.register();
        assert!(signal.settle(first, WakeReason::Elapsed));
        assert!(!signal.settle(first, WakeReason::Stopped));
        assert_eq!(signal.trigger(), 1);
        assert_eq!(signal.trigger(), 0);
        assert_eq!(signal.outcome(first), Some(WakeReason::Elapsed));
        assert_eq!(signal.outcome(second), Some(WakeReason::Stopped));
        let late = signal.register();
        assert_eq!(signal.outcome(late), Some(WakeReason::Stopped));
        assert_eq!(signal.release(first), Some(WakeReason::Elapsed));
        assert_eq!(signal.release(first), None);
        assert_eq!(signal.tracked(), 2);
    }
}
