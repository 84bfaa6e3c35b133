//! Scene runtime for a visual-programming game editor.
//!
//! The crate owns the runtime scene graph ([`SceneNodeManager`]), the
//! components attached to its nodes, the bridge to an external physics world
//! and the block-script compiler and interpreter. Drawing and physics
//! simulation stay behind the [`RenderBackend`] and [`PhysicsWorld`]
//! contracts so the core remains headless, testable and easy to embed.

pub mod app;
pub mod component;
pub mod config;
pub mod error;
pub mod input;
pub mod manager;
pub mod math;
pub mod node;
pub mod physics;
pub mod render;
pub mod scene;
pub mod scripting;
#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub use component::{Component, ComponentKind, ComponentType};
pub use config::RuntimeConfig;
pub use error::{PhysicsError, SceneError, ScriptError, TargetError};
pub use input::{InputState, KeyCode, NamedKey};
pub use manager::{NodeState, RuntimeEvent, SceneNodeManager};
pub use node::{NodeId, SceneNode};
pub use physics::{HeadlessPhysics, PhysicsWorld};
pub use render::{CameraParams, HeadlessRenderer, LightParams, RenderBackend};
pub use scene::{Scene, SceneObject};
pub use scripting::{Interpreter, OpNode, RuntimeContext, Value};
