use std::collections::BTreeMap;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};

use super::value::Value;

/// Node of a compiled script. Immutable once produced by the compiler.
#[derive(Debug, Clone, PartialEq)]
pub enum OpNode {
    Literal { value: Value },
    Variable { name: String },
    Operation(Operation),
}

/// A statement or expression: `operation` names the kind, `params` hold its
/// operands, `children`/`else_children` hold nested statement blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub operation: String,
    pub params: BTreeMap<String, OpNode>,
    pub children: Arc<[OpNode]>,
    pub else_children: Arc<[OpNode]>,
}

/// Flat `{kind, ...params, children?, elseChildren?}` shape used by
/// `--dump-ops` and the wasm facade.
impl Serialize for OpNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        match self {
            OpNode::Literal { value } => {
                map.serialize_entry("kind", "literal")?;
                map.serialize_entry("value", value)?;
            }
            OpNode::Variable { name } => {
                map.serialize_entry("kind", "variable")?;
                map.serialize_entry("name", name)?;
            }
            OpNode::Operation(op) => {
                map.serialize_entry("kind", &op.operation)?;
                for (name, param) in &op.params {
                    map.serialize_entry(name, param)?;
                }
                if !op.children.is_empty() {
                    map.serialize_entry("children", &*op.children)?;
                }
                if !op.else_children.is_empty() {
                    map.serialize_entry("elseChildren", &*op.else_children)?;
                }
            }
        }
        map.end()
    }
}

impl OpNode {
    pub fn literal(value: impl Into<Value>) -> Self {
        OpNode::Literal {
            value: value.into(),
        }
    }

    pub fn variable(name: impl Into<String>) -> Self {
        OpNode::Variable { name: name.into() }
    }

    pub fn operation(kind: impl Into<String>) -> Self {
        OpNode::Operation(Operation {
            operation: kind.into(),
            params: BTreeMap::new(),
            children: Arc::from(Vec::new()),
            else_children: Arc::from(Vec::new()),
        })
    }

    /// Builder: adds an operand. No effect on literals and variables.
    pub fn with_param(mut self, name: impl Into<String>, value: OpNode) -> Self {
        if let OpNode::Operation(op) = &mut self {
            op.params.insert(name.into(), value);
        }
        self
    }

    pub fn with_children(mut self, children: Vec<OpNode>) -> Self {
        if let OpNode::Operation(op) = &mut self {
            op.children = Arc::from(children);
        }
        self
    }

    pub fn with_else_children(mut self, children: Vec<OpNode>) -> Self {
        if let OpNode::Operation(op) = &mut self {
            op.else_children = Arc::from(children);
        }
        self
    }

    /// Operation kind, `literal` or `variable`.
    pub fn kind(&self) -> &str {
        match self {
            OpNode::Literal { .. } => "literal",
            OpNode::Variable { .. } => "variable",
            OpNode::Operation(op) => &op.operation,
        }
    }
}

impl Operation {
    pub fn param(&self, name: &str) -> Option<&OpNode> {
        self.params.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_as_tagged_tree() {
        let op = OpNode::operation("if")
            .with_param("condition", OpNode::literal("1"))
            .with_children(vec![OpNode::operation("log")
                .with_param("message", OpNode::variable("greeting"))]);
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(
            json,
            json!({
                "kind": "if",
                "condition": {"kind": "literal", "value": "1"},
                "children": [{
                    "kind": "log",
                    "message": {"kind": "variable", "name": "greeting"}
                }]
            })
        );
    }

    #[test]
    fn builders_ignore_leaf_nodes() {
        let leaf = OpNode::literal(1.0).with_param("x", OpNode::literal(2.0));
        assert_eq!(leaf, OpNode::literal(1.0));
        assert_eq!(leaf.kind(), "literal");
    }
}
