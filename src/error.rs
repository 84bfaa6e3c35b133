use thiserror::Error;

use crate::node::NodeId;

/// Failures raised by hierarchy and lifecycle operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneError {
    #[error("node {0} does not exist")]
    NodeNotFound(NodeId),
    #[error("cannot parent {child} under {parent}: it would create a cycle")]
    CyclicParent { child: NodeId, parent: NodeId },
    #[error("duplicate node id {0}")]
    DuplicateId(NodeId),
}

/// Reasons a target reference could not be resolved to a node.
///
/// These are returned, never raised; callers decide whether to warn or abort.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("no current object to resolve \"{0}\" against")]
    NoCurrentNode(String),
    #[error("no object with id \"{0}\"")]
    IdNotFound(String),
    #[error("no object named \"{0}\"")]
    NameNotFound(String),
    #[error("no object of type \"{0}\"")]
    TypeNotFound(String),
    #[error("absolute path \"{0}\" is empty")]
    EmptyPath(String),
    #[error("path \"{path}\": no root object named \"{segment}\"")]
    RootNotFound { path: String, segment: String },
    #[error("path \"{path}\": no child named \"{segment}\"")]
    ChildNotFound { path: String, segment: String },
    #[error("path \"{0}\" resolves to the scene root; no specific object targeted")]
    NoSpecificObject(String),
}

/// Errors raised while executing a single script statement.
///
/// They propagate to the statement boundary, get logged there and never stop
/// the surrounding script.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("{operation}: missing required operand \"{operand}\"")]
    MissingOperand {
        operation: String,
        operand: &'static str,
    },
    #[error("cannot parse {raw} as {expected}")]
    Parse { raw: String, expected: &'static str },
    #[error("object {node} has no {component} component")]
    MissingComponent {
        node: NodeId,
        component: &'static str,
    },
    #[error("invalid property path \"{0}\"")]
    InvalidProperty(String),
    #[error(transparent)]
    Target(#[from] TargetError),
    #[error(transparent)]
    Scene(#[from] SceneError),
}

impl ScriptError {
    pub fn missing(operation: &str, operand: &'static str) -> Self {
        Self::MissingOperand {
            operation: operation.to_string(),
            operand,
        }
    }

    pub fn parse(raw: impl Into<String>, expected: &'static str) -> Self {
        Self::Parse {
            raw: raw.into(),
            expected,
        }
    }
}

/// Errors reported by a physics world implementation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    #[error("rigid body {0} is not registered")]
    UnknownBody(u64),
    #[error("joint {0} is not registered")]
    UnknownJoint(u64),
    #[error("{0} is not ready yet")]
    NotReady(String),
}
