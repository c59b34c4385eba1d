//! Dispatch of persisted tasks onto a bounded worker pool.
//!
//! ```text
//! begin_processing(id)
//!   ↓
//! repo.get → task.begin_processing() → repo.save     (caller waits for this)
//!   ↓
//! allowlist + ScriptRegistry lookup ── miss ──→ task.fail("Unsupported task type")
//!   ↓
//! WorkerPool::submit(script::execute(..))           (caller does not wait)
//! ```

mod engine;
mod pool;
mod registry;

pub use engine::Executor;
pub use pool::{TokioWorkerPool, WorkerPool};
pub use registry::ScriptRegistry;
