//! Status transition rules.

use super::types::TaskStatus;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid task status transition from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
    #[error("cannot transition from terminal status {state}")]
    FromTerminalState { state: TaskStatus },
}

pub struct StatusTransition;

impl StatusTransition {
    /// Checks that moving from `from` to `to` is legal.
    pub fn validate(from: TaskStatus, to: TaskStatus) -> Result<(), TransitionError> {
        if Self::is_terminal(from) {
            return Err(TransitionError::FromTerminalState { state: from });
        }

        let is_valid = matches!(
            (from, to),
            (TaskStatus::Pending, TaskStatus::Processing)
                | (TaskStatus::Processing, TaskStatus::Success)
                | (TaskStatus::Processing, TaskStatus::Failure)
                // cancellation is allowed before and during processing
                | (TaskStatus::Pending, TaskStatus::Killed)
                | (TaskStatus::Processing, TaskStatus::Killed)
        );

        if is_valid {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition { from, to })
        }
    }

    pub fn is_terminal(status: TaskStatus) -> bool {
        matches!(
            status,
            TaskStatus::Success | TaskStatus::Failure | TaskStatus::Killed
        )
    }

    /// Human readable description used in log lines.
    pub fn describe(status: TaskStatus) -> &'static str {
        match status {
            TaskStatus::Pending => "waiting for dispatch",
            TaskStatus::Processing => "running on a worker",
            TaskStatus::Success => "finished successfully",
            TaskStatus::Failure => "finished with an error",
            TaskStatus::Killed => "cancelled",
        }
    }
}
