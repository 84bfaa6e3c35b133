//! Lowers editor authoring data (block and chip trees) into [`OpNode`]s.
//!
//! Compilation is pure: the same input always yields the same tree, and a
//! malformed unit only drops itself, never its siblings.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;
use serde::Deserialize;

use super::op::{OpNode, Operation};
use super::value::Value;

/// One authored block or chip.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthoredUnit {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub parameters: Option<BTreeMap<String, AuthoredValue>>,
    #[serde(default)]
    pub fields: Option<Vec<AuthoredField>>,
    #[serde(default)]
    pub children: Vec<serde_json::Value>,
    #[serde(default)]
    pub else_children: Vec<serde_json::Value>,
}

/// Parameter value: a variable reference, a nested unit or a plain literal.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AuthoredValue {
    Variable(VariableReference),
    Unit(Box<AuthoredUnit>),
    Literal(serde_json::Value),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableReference {
    pub variable: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Number,
    Text,
    Dropdown,
    Boolean,
    #[serde(other)]
    Other,
}

/// Declared input slot of a unit.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthoredField {
    pub name: String,
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub value: Option<AuthoredValue>,
    #[serde(default)]
    pub inputs: Vec<serde_json::Value>,
}

fn default_field_type() -> FieldType {
    FieldType::Other
}

/// Compiles a script's top-level block list, skipping blocks that fail.
pub fn compile_script(blocks: &[serde_json::Value]) -> Vec<OpNode> {
    blocks.iter().filter_map(compile).collect()
}

/// Compiles one authored unit; `None` when it is not a valid unit.
pub fn compile(item: &serde_json::Value) -> Option<OpNode> {
    match AuthoredUnit::deserialize(item) {
        Ok(unit) => compile_unit(&unit),
        Err(err) => {
            debug!("dropping malformed authored unit: {err}");
            None
        }
    }
}

pub fn compile_unit(unit: &AuthoredUnit) -> Option<OpNode> {
    if unit.kind.trim().is_empty() {
        return None;
    }
    let mut params = BTreeMap::new();
    if let Some(parameters) = &unit.parameters {
        for (name, value) in parameters {
            params.insert(name.clone(), compile_value(value));
        }
    }
    if let Some(fields) = &unit.fields {
        for field in fields {
            params
                .entry(field.name.clone())
                .or_insert_with(|| compile_field(field));
        }
    }
    Some(OpNode::Operation(Operation {
        operation: unit.kind.clone(),
        params,
        children: Arc::from(compile_script(&unit.children)),
        else_children: Arc::from(compile_script(&unit.else_children)),
    }))
}

fn compile_value(value: &AuthoredValue) -> OpNode {
    match value {
        AuthoredValue::Variable(reference) => OpNode::variable(reference.variable.clone()),
        AuthoredValue::Unit(unit) => {
            compile_unit(unit).unwrap_or(OpNode::Literal { value: Value::Null })
        }
        AuthoredValue::Literal(json) => OpNode::Literal {
            value: Value::from_json(json),
        },
    }
}

/// Attached input beats a provided value, which beats the type default.
fn compile_field(field: &AuthoredField) -> OpNode {
    if let Some(input) = field.inputs.iter().find_map(compile) {
        return input;
    }
    match &field.value {
        Some(value) if !is_empty_value(value) => compile_value(value),
        _ => OpNode::Literal {
            value: default_for(field.field_type),
        },
    }
}

fn is_empty_value(value: &AuthoredValue) -> bool {
    match value {
        AuthoredValue::Literal(serde_json::Value::Null) => true,
        AuthoredValue::Literal(serde_json::Value::String(s)) => s.is_empty(),
        _ => false,
    }
}

fn default_for(field_type: FieldType) -> Value {
    match field_type {
        FieldType::Number => Value::Number(0.0),
        FieldType::Text => Value::String(String::new()),
        FieldType::Boolean => Value::Bool(false),
        FieldType::Dropdown | FieldType::Other => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parameters_compile_to_literals_variables_and_nested_units() {
        let op = compile(&json!({
            "type": "move",
            "parameters": {
                "target": "@name:Crate",
                "position": {"variable": "offset"},
                "speed": {"type": "add", "parameters": {"a": 1, "b": 2}}
            }
        }))
        .unwrap();
        let expected = OpNode::operation("move")
            .with_param("target", OpNode::literal("@name:Crate"))
            .with_param("position", OpNode::variable("offset"))
            .with_param(
                "speed",
                OpNode::operation("add")
                    .with_param("a", OpNode::literal(1.0))
                    .with_param("b", OpNode::literal(2.0)),
            );
        assert_eq!(op, expected);
    }

    #[test]
    fn vector_objects_stay_literals() {
        let op = compile(&json!({
            "type": "moveTo",
            "parameters": {"position": {"x": 1, "y": 2, "z": 3}}
        }))
        .unwrap();
        let OpNode::Operation(op) = op else {
            panic!("expected operation");
        };
        assert!(matches!(op.param("position"), Some(OpNode::Literal { .. })));
    }

    #[test]
    fn fields_prefer_input_then_value_then_default() {
        let op = compile(&json!({
            "type": "loopFor",
            "fields": [
                {"name": "times", "type": "number", "value": 3,
                 "inputs": [{"type": "random", "parameters": {"min": 1, "max": 2}}, {"type": "other"}]},
                {"name": "indexVar", "type": "text", "value": ""},
                {"name": "enabled", "type": "boolean"},
                {"name": "mode", "type": "dropdown", "value": null},
                {"name": "count", "type": "number", "value": 7}
            ]
        }))
        .unwrap();
        let OpNode::Operation(op) = op else {
            panic!("expected operation");
        };
        assert_eq!(op.param("times").map(OpNode::kind), Some("random"));
        assert_eq!(op.param("indexVar"), Some(&OpNode::literal("")));
        assert_eq!(op.param("enabled"), Some(&OpNode::literal(false)));
        assert_eq!(op.param("mode"), Some(&OpNode::Literal { value: Value::Null }));
        assert_eq!(op.param("count"), Some(&OpNode::literal(7.0)));
    }

    #[test]
    fn invalid_children_are_dropped_without_aborting_siblings() {
        let op = compile(&json!({
            "type": "if",
            "parameters": {"condition": "1"},
            "children": [{"type": "log"}, {"nope": true}, 42, {"type": ""}, {"type": "wait"}]
        }))
        .unwrap();
        let OpNode::Operation(op) = op else {
            panic!("expected operation");
        };
        let kinds: Vec<&str> = op.children.iter().map(OpNode::kind).collect();
        assert_eq!(kinds, ["log", "wait"]);
    }

    #[test]
    fn compilation_is_deterministic() {
        let blocks = vec![json!({
            "type": "forever",
            "children": [{"type": "rotate", "parameters": {"rotation": "0, 5, 0", "target": ""}}]
        })];
        assert_eq!(compile_script(&blocks), compile_script(&blocks));
    }
}
