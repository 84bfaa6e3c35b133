//! Per-activation context handed to the interpreter, and expression
//! evaluation against it.

use std::cmp::Ordering;

use glam::{Quat, Vec3};
use log::warn;
use rand::Rng;

use super::op::{OpNode, Operation};
use super::target::resolve_target;
use super::value::Value;
use super::variables::VariableScope;
use crate::error::ScriptError;
use crate::manager::SceneNodeManager;
use crate::math::quat_to_euler_degrees;
use crate::node::NodeId;
use crate::scene::ShapeDescription;

const DEFAULT_RAY_LENGTH: f64 = 100.0;
const DEFAULT_OVERLAP_RADIUS: f64 = 0.5;

/// What a running script can see: the scene, the node it is attached to and
/// the id its local variables are keyed by.
pub struct RuntimeContext<'a> {
    pub scene: &'a mut SceneNodeManager,
    pub node: Option<NodeId>,
    pub script_id: String,
}

impl<'a> RuntimeContext<'a> {
    pub fn new(scene: &'a mut SceneNodeManager, node: Option<NodeId>, script_id: impl Into<String>) -> Self {
        Self {
            scene,
            node,
            script_id: script_id.into(),
        }
    }

    pub fn variable(&self, name: &str) -> Value {
        self.scene
            .variables()
            .get(&self.script_id, name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_local(&mut self, name: &str, value: Value) {
        let script_id = self.script_id.clone();
        self.scene.variables_mut().set_local(&script_id, name, value);
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.scene.variables_mut().set_global(name, value);
    }

    pub fn set_variable(&mut self, name: &str, value: Value, scope: VariableScope) {
        match scope {
            VariableScope::Local => self.set_local(name, value),
            VariableScope::Global => self.set_global(name, value),
        }
    }

    /// Writes to the binding `name` already resolves to, globally otherwise.
    pub fn assign(&mut self, name: &str, value: Value) {
        let script_id = self.script_id.clone();
        self.scene.variables_mut().assign(&script_id, name, value);
    }

    /// Evaluated operand, `None` when the parameter is absent.
    pub fn operand(&self, op: &Operation, name: &str) -> Result<Option<Value>, ScriptError> {
        op.param(name).map(|param| self.evaluate(param)).transpose()
    }

    /// Evaluated operand that must be present and non-null.
    pub fn required(&self, op: &Operation, name: &'static str) -> Result<Value, ScriptError> {
        match self.operand(op, name)? {
            Some(value) if !value.is_null() => Ok(value),
            _ => Err(ScriptError::missing(&op.operation, name)),
        }
    }

    pub fn text(&self, op: &Operation, name: &str) -> Result<String, ScriptError> {
        Ok(match self.operand(op, name)? {
            None | Some(Value::Null) => String::new(),
            Some(value) => value.to_string(),
        })
    }

    pub fn number(&self, op: &Operation, name: &str, default: f64) -> Result<f64, ScriptError> {
        match self.operand(op, name)? {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value
                .as_number()
                .ok_or_else(|| ScriptError::parse(value.to_string(), "number")),
        }
    }

    /// Resolves the `target` operand, defaulting to the script's own node.
    /// Resolution failures are logged and yield `None`.
    pub fn target(&self, op: &Operation) -> Result<Option<NodeId>, ScriptError> {
        self.target_named(op, "target")
    }

    pub fn target_named(&self, op: &Operation, name: &str) -> Result<Option<NodeId>, ScriptError> {
        let reference = self.text(op, name)?;
        match resolve_target(&reference, self.node.as_ref(), &*self.scene) {
            Ok(id) => Ok(Some(id)),
            Err(err) => {
                warn!("{}: {err}", op.operation);
                Ok(None)
            }
        }
    }

    pub fn evaluate(&self, op: &OpNode) -> Result<Value, ScriptError> {
        match op {
            OpNode::Literal { value } => Ok(value.clone()),
            OpNode::Variable { name } => Ok(self.variable(name)),
            OpNode::Operation(op) => self.evaluate_operation(op),
        }
    }

    fn evaluate_operation(&self, op: &Operation) -> Result<Value, ScriptError> {
        let value = match op.operation.as_str() {
            "add" => {
                let (a, b) = self.pair(op)?;
                match (&a, &b) {
                    (Value::Vector(_), _) | (_, Value::Vector(_)) => {
                        Value::Vector(a.parse_vector()? + b.parse_vector()?)
                    }
                    _ => match (a.as_number(), b.as_number()) {
                        (Some(x), Some(y)) => Value::Number(x + y),
                        _ => Value::String(format!("{a}{b}")),
                    },
                }
            }
            "subtract" => {
                let (a, b) = self.pair(op)?;
                match (&a, &b) {
                    (Value::Vector(_), _) | (_, Value::Vector(_)) => {
                        Value::Vector(a.parse_vector()? - b.parse_vector()?)
                    }
                    _ => Value::Number(expect_number(&a)? - expect_number(&b)?),
                }
            }
            "multiply" => {
                let (a, b) = self.pair(op)?;
                match (&a, &b) {
                    (Value::Vector(v), other) | (other, Value::Vector(v)) => {
                        Value::Vector(*v * expect_number(other)? as f32)
                    }
                    _ => Value::Number(expect_number(&a)? * expect_number(&b)?),
                }
            }
            "divide" => {
                let (a, b) = self.pair(op)?;
                match &a {
                    Value::Vector(v) => Value::Vector(*v / expect_number(&b)? as f32),
                    _ => Value::Number(expect_number(&a)? / expect_number(&b)?),
                }
            }
            "modulo" => {
                let (a, b) = self.pair(op)?;
                Value::Number(expect_number(&a)? % expect_number(&b)?)
            }
            "compare" => {
                let (a, b) = self.pair(op)?;
                let operator = self.text(op, "operator")?;
                Value::Bool(compare(&a, &b, if operator.is_empty() { "==" } else { &operator })?)
            }
            "and" => {
                let (a, b) = self.pair(op)?;
                Value::Bool(a.is_truthy() && b.is_truthy())
            }
            "or" => {
                let (a, b) = self.pair(op)?;
                Value::Bool(a.is_truthy() || b.is_truthy())
            }
            "not" => Value::Bool(!self.operand(op, "value")?.unwrap_or_default().is_truthy()),
            "join" => {
                let (a, b) = self.pair(op)?;
                Value::String(format!("{}{}", display_or_empty(&a), display_or_empty(&b)))
            }
            "vector3" => Value::Vector(Vec3::new(
                self.number(op, "x", 0.0)? as f32,
                self.number(op, "y", 0.0)? as f32,
                self.number(op, "z", 0.0)? as f32,
            )),
            "getVariable" => self.variable(&self.text(op, "name")?),
            "getProperty" => {
                let property = self.text(op, "property")?;
                match self.target(op)? {
                    Some(id) => self.property_of(&id, &property),
                    None => Value::Null,
                }
            }
            "keyPressed" => Value::Bool(self.scene.input().is_down_by_name(&self.text(op, "key")?)),
            "random" => {
                let mut min = self.number(op, "min", 0.0)?;
                let mut max = self.number(op, "max", 1.0)?;
                if min > max {
                    std::mem::swap(&mut min, &mut max);
                }
                let mut rng = rand::thread_rng();
                if !min.is_finite() || !max.is_finite() {
                    Value::Number(f64::NAN)
                } else if min == max {
                    Value::Number(min)
                } else if min.fract() == 0.0 && max.fract() == 0.0 {
                    Value::Number(rng.gen_range(min as i64..=max as i64) as f64)
                } else {
                    Value::Number(rng.gen_range(min..max))
                }
            }
            "distance" => {
                let a = self.point(op, "a")?;
                let b = self.point(op, "b")?;
                Value::Number(a.distance(b) as f64)
            }
            "raycast" => {
                let origin = self.point(op, "origin")?;
                let direction = self.required(op, "direction")?.parse_vector()?;
                let max = self.number(op, "maxDistance", DEFAULT_RAY_LENGTH)?;
                self.scene
                    .physics()
                    .cast_ray(origin, direction, max as f32)
                    .and_then(|hit| self.scene.node_for_body(hit.body))
                    .map(|id| Value::String(id.reference()))
                    .unwrap_or_default()
            }
            "overlaps" => {
                let center = match self.operand(op, "position")? {
                    Some(value) if !value.is_null() => self.point(op, "position")?,
                    _ => self
                        .node
                        .as_ref()
                        .and_then(|id| self.scene.node(id))
                        .map(|node| node.position())
                        .unwrap_or(Vec3::ZERO),
                };
                let radius = self.number(op, "radius", DEFAULT_OVERLAP_RADIUS)?.max(0.0) as f32;
                let shape = ShapeDescription::Ball { radius };
                let hits = self
                    .scene
                    .physics()
                    .intersections_with_shape(&shape, center, Quat::IDENTITY)
                    .into_iter()
                    .filter_map(|body| self.scene.node_for_body(body))
                    .filter(|id| Some(id) != self.node.as_ref())
                    .map(|id| Value::String(id.reference()))
                    .collect();
                Value::List(hits)
            }
            other => {
                warn!("unknown expression \"{other}\"; evaluating to null");
                Value::Null
            }
        };
        Ok(value)
    }

    fn pair(&self, op: &Operation) -> Result<(Value, Value), ScriptError> {
        Ok((
            self.operand(op, "a")?.unwrap_or_default(),
            self.operand(op, "b")?.unwrap_or_default(),
        ))
    }

    /// A vector operand, or the position of the node a reference string
    /// resolves to.
    fn point(&self, op: &Operation, name: &'static str) -> Result<Vec3, ScriptError> {
        let value = self.required(op, name)?;
        match value.parse_vector() {
            Ok(point) => Ok(point),
            Err(err) => match &value {
                Value::String(reference) => resolve_target(reference, self.node.as_ref(), &*self.scene)
                    .ok()
                    .and_then(|id| self.scene.node(&id).map(|node| node.position()))
                    .ok_or(err),
                _ => Err(err),
            },
        }
    }

    /// Property lookup supporting `position.x` style paths.
    pub fn property_of(&self, id: &NodeId, path: &str) -> Value {
        let Some(node) = self.scene.node(id) else {
            return Value::Null;
        };
        let mut segments = path.split('.');
        let root = segments.next().unwrap_or_default();
        let axis = segments.next();
        let vector = match root {
            "position" => node.position(),
            "scale" => node.scale(),
            "rotation" => quat_to_euler_degrees(node.rotation()),
            _ => return node.property(path).unwrap_or_default(),
        };
        match axis {
            None => Value::Vector(vector),
            Some("x") => Value::Number(vector.x as f64),
            Some("y") => Value::Number(vector.y as f64),
            Some("z") => Value::Number(vector.z as f64),
            Some(_) => Value::Null,
        }
    }
}

fn expect_number(value: &Value) -> Result<f64, ScriptError> {
    value
        .as_number()
        .ok_or_else(|| ScriptError::parse(value.to_string(), "number"))
}

fn display_or_empty(value: &Value) -> String {
    if value.is_null() {
        String::new()
    } else {
        value.to_string()
    }
}

fn compare(a: &Value, b: &Value, operator: &str) -> Result<bool, ScriptError> {
    let ordering = match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ if operator == "==" || operator == "!=" => {
            let equal = match (a, b) {
                (Value::Vector(_), _) | (_, Value::Vector(_)) => {
                    matches!((a.parse_vector(), b.parse_vector()), (Ok(x), Ok(y)) if x == y)
                }
                _ => a.to_string() == b.to_string(),
            };
            return Ok(equal == (operator == "=="));
        }
        _ => Some(a.to_string().cmp(&b.to_string())),
    };
    Ok(match operator {
        "==" => ordering == Some(Ordering::Equal),
        "!=" => ordering != Some(Ordering::Equal),
        "<" => ordering == Some(Ordering::Less),
        "<=" => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        ">" => ordering == Some(Ordering::Greater),
        ">=" => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        other => return Err(ScriptError::parse(other, "comparison operator")),
    })
}
