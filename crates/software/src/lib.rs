//! Software executor: runs compiled programs over batches of fragment and vertex
//! invocations on a pool of worker threads.

mod backend;
mod dispatch;
mod pool;
mod util;
mod vm;

pub use backend::*;
pub use dispatch::*;
pub use pool::*;
pub use util::ThreadPool;
pub use vm::*;
