//! Per-task-type work and the adapter that turns its outcome into a terminal
//! task state.

pub mod contract;
pub mod run;

pub use contract::{require_keys, KillSwitch, ScriptContext, TaskScript};
pub use run::execute;
