//! Task lifecycle core for the image registry task service.
//!
//! The crate owns the task state machine, the factory that mints new tasks,
//! the repository/store contracts the scripts run against, and the executor
//! that moves a persisted task onto the worker pool.

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod image;
pub mod script;
pub mod store;
pub mod stream;
pub mod task;
pub mod util;
