//! Block scripting: authoring data is compiled once into an immutable op tree
//! and executed cooperatively, one frame at a time, by an [`Interpreter`].

pub mod compiler;
pub mod context;
pub mod interpreter;
pub mod op;
pub mod target;
pub mod value;
pub mod variables;

pub use compiler::{compile, compile_script};
pub use context::RuntimeContext;
pub use interpreter::{ExecutionState, Interpreter, StopSignal};
pub use op::{OpNode, Operation};
pub use target::resolve_target;
pub use value::Value;
pub use variables::{Variable, VariableScope, VariableStore};
