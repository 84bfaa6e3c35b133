use std::collections::BTreeMap;
use std::fmt;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::ScriptError;

/// Dynamically typed script value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Vector(Vec3),
    List(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Converts authored JSON. Objects with exactly numeric `x`, `y` and `z`
    /// keys stay objects; [`parse_vector`](Self::parse_vector) accepts them.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), Value::from_json(value)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                serde_json::Value::from(*n as i64)
            }
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Vector(v) => serde_json::json!({ "x": v.x, "y": v.y, "z": v.z }),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }

    /// Script truthiness: `""`, `"0"`, `"false"`, `0`, `NaN`, `null` and
    /// `false` are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => {
                let trimmed = s.trim();
                !(trimmed.is_empty() || trimmed == "0" || trimmed.eq_ignore_ascii_case("false"))
            }
            Value::Vector(_) | Value::List(_) | Value::Object(_) => true,
        }
    }

    /// Numeric view; strings are parsed, booleans are 0/1, anything else is
    /// `None`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Accepts a vector, an object with `x`/`y`/`z`, a three-number list or a
    /// `"(x, y, z)"` / `"x, y, z"` string.
    pub fn parse_vector(&self) -> Result<Vec3, ScriptError> {
        let fail = || ScriptError::parse(self.to_string(), "vector");
        match self {
            Value::Vector(v) => Ok(*v),
            Value::Object(map) => {
                let axis = |name: &str| {
                    map.get(name)
                        .and_then(Value::as_number)
                        .map(|n| n as f32)
                        .ok_or_else(fail)
                };
                Ok(Vec3::new(axis("x")?, axis("y")?, axis("z")?))
            }
            Value::List(items) if items.len() == 3 => {
                let mut axes = [0.0f32; 3];
                for (slot, item) in axes.iter_mut().zip(items) {
                    *slot = item.as_number().ok_or_else(fail)? as f32;
                }
                Ok(Vec3::from_array(axes))
            }
            Value::String(raw) => {
                let inner = raw.trim();
                let inner = inner
                    .strip_prefix('(')
                    .and_then(|s| s.strip_suffix(')'))
                    .unwrap_or(inner);
                let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
                if parts.len() != 3 {
                    return Err(fail());
                }
                let mut axes = [0.0f32; 3];
                for (slot, part) in axes.iter_mut().zip(&parts) {
                    *slot = part.parse::<f32>().map_err(|_| fail())?;
                }
                Ok(Vec3::from_array(axes))
            }
            _ => Err(fail()),
        }
    }

    /// Name used by the persisted variable shape.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Bool(_) => "boolean",
            Value::Null | Value::Vector(_) | Value::List(_) | Value::Object(_) => "object",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::Vector(v) => write!(f, "({}, {}, {})", v.x, v.y, v.z),
            Value::List(_) | Value::Object(_) => f.write_str(&self.to_json().to_string()),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec3> for Value {
    fn from(value: Vec3) -> Self {
        Value::Vector(value)
    }
}
