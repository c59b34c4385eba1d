use thiserror::Error;

use crate::task::TransitionError;

/// Errors raised by the task entity and the task factory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("invalid task type: '{0}'")]
    InvalidTaskType(String),

    #[error("invalid task status: '{0}'")]
    InvalidTaskStatus(String),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("invalid task input: {0}")]
    InvalidInput(String),

    #[error("new_task() requires a request context")]
    MissingContext,

    #[error("task expiry falls outside the representable time range")]
    ExpiryOutOfRange,
}

impl TaskError {
    /// True when the error comes from an illegal status change.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidTransition(_))
    }
}

/// Errors raised by task and image repositories.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} '{id}' already exists")]
    Duplicate { kind: &'static str, id: String },

    #[error("{kind} '{id}' was modified concurrently")]
    Conflict { kind: &'static str, id: String },

    #[error("repository backend error: {0}")]
    Backend(String),
}

impl RepoError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Errors raised while building or mutating image records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("attribute '{0}' is reserved")]
    ReservedAttribute(String),

    #[error("invalid value for image property '{key}': {reason}")]
    InvalidProperty { key: String, reason: String },

    #[error("image status cannot change from '{from}' to '{to}'")]
    InvalidStatus { from: String, to: String },
}
