//! String addressing scheme scripts use to reach other nodes.
//!
//! | Form | Meaning |
//! |---|---|
//! | `""`, `(self)` | the current node |
//! | `#id:<id>` | node with that stable id |
//! | `@name:<name>` | first node with that name |
//! | `$first:<type>` | first node of that type |
//! | `/a/b` | root `a`, then its child `b` |
//! | `../b`, `./b`, `b` | path relative to the current node |

use crate::error::TargetError;
use crate::manager::SceneNodeManager;
use crate::node::NodeId;

/// Position while walking a relative path; `Root` sits above every root node.
#[derive(Debug, Clone, PartialEq)]
enum Cursor {
    Node(NodeId),
    Root,
}

/// Resolves `reference` against `current`. Failures are returned with a
/// readable reason; nothing here logs or panics.
pub fn resolve_target(
    reference: &str,
    current: Option<&NodeId>,
    scene: &SceneNodeManager,
) -> Result<NodeId, TargetError> {
    let reference = reference.trim();
    if reference.is_empty() || reference == "(self)" {
        return current
            .filter(|id| scene.contains(id))
            .cloned()
            .ok_or_else(|| TargetError::NoCurrentNode(reference.to_string()));
    }
    if let Some(id) = reference.strip_prefix("#id:") {
        let id = NodeId::new(id);
        return if scene.contains(&id) {
            Ok(id)
        } else {
            Err(TargetError::IdNotFound(id.to_string()))
        };
    }
    if let Some(name) = reference.strip_prefix("@name:") {
        return scene
            .all_nodes()
            .find(|node| node.name() == name)
            .map(|node| node.id().clone())
            .ok_or_else(|| TargetError::NameNotFound(name.to_string()));
    }
    if let Some(node_type) = reference.strip_prefix("$first:") {
        return scene
            .all_nodes()
            .find(|node| node.node_type() == node_type)
            .map(|node| node.id().clone())
            .ok_or_else(|| TargetError::TypeNotFound(node_type.to_string()));
    }
    if let Some(path) = reference.strip_prefix('/') {
        return resolve_absolute(reference, path, scene);
    }
    let start = current
        .filter(|id| scene.contains(id))
        .cloned()
        .ok_or_else(|| TargetError::NoCurrentNode(reference.to_string()))?;
    resolve_relative(reference, start, scene)
}

fn resolve_absolute(
    reference: &str,
    path: &str,
    scene: &SceneNodeManager,
) -> Result<NodeId, TargetError> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let first = segments
        .next()
        .ok_or_else(|| TargetError::EmptyPath(reference.to_string()))?;
    let mut cursor = root_named(scene, first).ok_or_else(|| TargetError::RootNotFound {
        path: reference.to_string(),
        segment: first.to_string(),
    })?;
    for segment in segments {
        cursor = child_named(scene, &cursor, segment).ok_or_else(|| {
            TargetError::ChildNotFound {
                path: reference.to_string(),
                segment: segment.to_string(),
            }
        })?;
    }
    Ok(cursor)
}

fn resolve_relative(
    reference: &str,
    start: NodeId,
    scene: &SceneNodeManager,
) -> Result<NodeId, TargetError> {
    let mut cursor = Cursor::Node(start);
    for segment in reference.split('/').filter(|s| !s.is_empty()) {
        cursor = match (segment, cursor) {
            (".", cursor) => Some(cursor),
            ("..", Cursor::Node(id)) => Some(
                scene
                    .node(&id)
                    .and_then(|node| node.parent().cloned())
                    .map(Cursor::Node)
                    .unwrap_or(Cursor::Root),
            ),
            ("..", Cursor::Root) => Some(Cursor::Root),
            (name, Cursor::Node(id)) => child_named(scene, &id, name).map(Cursor::Node),
            (name, Cursor::Root) => root_named(scene, name).map(Cursor::Node),
        }
        .ok_or_else(|| TargetError::ChildNotFound {
            path: reference.to_string(),
            segment: segment.to_string(),
        })?;
    }
    match cursor {
        Cursor::Node(id) => Ok(id),
        Cursor::Root => Err(TargetError::NoSpecificObject(reference.to_string())),
    }
}

fn root_named(scene: &SceneNodeManager, name: &str) -> Option<NodeId> {
    scene
        .roots()
        .iter()
        .find(|id| scene.node(id).map(|n| n.name() == name).unwrap_or(false))
        .cloned()
}

fn child_named(scene: &SceneNodeManager, parent: &NodeId, name: &str) -> Option<NodeId> {
    scene
        .node(parent)?
        .children()
        .iter()
        .find(|id| scene.node(id).map(|n| n.name() == name).unwrap_or(false))
        .cloned()
}
