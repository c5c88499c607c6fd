mod alu;
mod interpreter;
mod invocation;
mod resolve;

pub use interpreter::{execute_fragment, execute_vertex};
pub use invocation::{BuiltinMut, Invocation};
