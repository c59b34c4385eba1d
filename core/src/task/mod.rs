//! Task entity, status state machine, factory and repository contract.
//!
//! ```text
//! pending ──begin_processing──▶ processing ──succeed──▶ success
//!    │                              │ └──────fail─────▶ failure
//!    └────────kill────────▶ killed ◀┘
//! ```

pub mod entity;
pub mod factory;
pub mod memory;
pub mod repository;
pub mod transitions;
pub mod types;

pub use entity::Task;
pub use factory::TaskFactory;
pub use memory::InMemoryTaskRepository;
pub use repository::{ListParams, SortDir, SortKey, TaskFilters, TaskRepository};
pub use transitions::{StatusTransition, TransitionError};
pub use types::{TaskInput, TaskStatus, TaskType};
