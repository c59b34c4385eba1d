use thiserror::Error;

use super::error::{RepoError, TaskError};

/// Errors visible to callers of the executor's dispatch API. Failures that
/// happen while a script runs never surface here; they end up on the task.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Repository(#[from] RepoError),

    #[error("executor is not running")]
    NotRunning,

    #[error("worker pool is closed; task '{0}' was not dispatched")]
    PoolClosed(String),

    #[error("task '{0}' kept changing while it was being claimed")]
    Contended(String),
}

impl ExecutorError {
    /// True when the task was not in a status that allows the request.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::Task(e) if e.is_invalid_state())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Repository(e) if e.is_not_found())
    }
}
