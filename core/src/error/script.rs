use std::time::Duration;

use thiserror::Error;

use super::error::{ImageError, RepoError, TaskError};
use super::store::StoreError;

/// Errors a task script can end with. The execution adapter turns every one
/// of them into a terminal task state; none of them escape the worker.
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("{0}")]
    Invalid(String),

    #[error("Invalid location: {0}")]
    BadStoreUri(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Duplicate(String),

    #[error("{0}")]
    Store(StoreError),

    #[error("{0}")]
    Repository(RepoError),

    #[error("{0}")]
    Task(#[from] TaskError),

    #[error("task exceeded its time budget of {0:?}")]
    Timeout(Duration),

    #[error("task was cancelled")]
    Cancelled,

    #[error("{0}")]
    Internal(String),
}

impl ScriptError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    /// Short category name used as the prefix of a task failure message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Invalid(_) => "Invalid",
            Self::BadStoreUri(_) => "BadStoreUri",
            Self::NotFound(_) => "NotFound",
            Self::Duplicate(_) => "Duplicate",
            Self::Store(_) => "StoreError",
            Self::Repository(RepoError::NotFound { .. }) => "NotFound",
            Self::Repository(RepoError::Duplicate { .. }) => "Duplicate",
            Self::Repository(_) => "RepositoryError",
            Self::Task(_) => "TaskError",
            Self::Timeout(_) => "Timeout",
            Self::Cancelled => "Cancelled",
            Self::Internal(_) => "InternalError",
        }
    }

    /// Message stored on a failed task: `"<Kind>: <detail>"`.
    pub fn failure_message(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}

impl From<StoreError> for ScriptError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => Self::NotFound(msg),
            StoreError::Duplicate(msg) => Self::Duplicate(msg),
            StoreError::BadStoreUri(loc) => Self::BadStoreUri(loc),
            StoreError::Cancelled => Self::Cancelled,
            other => Self::Store(other),
        }
    }
}

impl From<ImageError> for ScriptError {
    fn from(err: ImageError) -> Self {
        Self::Invalid(err.to_string())
    }
}

impl From<RepoError> for ScriptError {
    fn from(err: RepoError) -> Self {
        Self::Repository(err)
    }
}
