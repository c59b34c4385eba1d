use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::transitions::StatusTransition;
use super::types::{TaskInput, TaskStatus, TaskType};
use crate::error::TaskError;

const DEFAULT_KILL_MESSAGE: &str = "Task was killed";

/// A unit of asynchronous work with a tracked lifecycle.
///
/// Status, result and message only change through [`Task::begin_processing`],
/// [`Task::succeed`], [`Task::fail`] and [`Task::kill`]. The entity does not
/// coordinate concurrent mutation; the repository's optimistic check on
/// `updated_at` does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    task_id: String,
    #[serde(rename = "type")]
    task_type: TaskType,
    status: TaskStatus,
    input: TaskInput,
    result: Option<Value>,
    owner: Option<String>,
    message: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    /// Refreshed by the repository on every save.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Builds a task from raw values, rejecting unknown type or status names.
    pub fn new(
        task_id: impl Into<String>,
        task_type: &str,
        status: &str,
        input: TaskInput,
        result: Option<Value>,
        owner: Option<String>,
        message: Option<String>,
        expires_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, TaskError> {
        let task_type: TaskType = task_type.parse()?;
        let status: TaskStatus = status.parse()?;
        Ok(Self {
            task_id: task_id.into(),
            task_type,
            status,
            input,
            result,
            owner,
            message,
            expires_at,
            created_at,
            updated_at,
        })
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn input(&self) -> &TaskInput {
        &self.input
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_terminal(&self) -> bool {
        StatusTransition::is_terminal(self.status)
    }

    /// pending → processing
    pub fn begin_processing(&mut self) -> Result<(), TaskError> {
        self.transition(TaskStatus::Processing)
    }

    /// processing → success
    pub fn succeed(&mut self, result: Value) -> Result<(), TaskError> {
        self.transition(TaskStatus::Success)?;
        self.result = Some(result);
        self.message = None;
        Ok(())
    }

    /// processing → failure
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), TaskError> {
        self.transition(TaskStatus::Failure)?;
        self.message = Some(message.into());
        self.result = None;
        Ok(())
    }

    /// pending|processing → killed
    pub fn kill(&mut self, message: Option<String>) -> Result<(), TaskError> {
        self.transition(TaskStatus::Killed)?;
        self.message = Some(message.unwrap_or_else(|| DEFAULT_KILL_MESSAGE.to_string()));
        self.result = None;
        Ok(())
    }

    fn transition(&mut self, to: TaskStatus) -> Result<(), TaskError> {
        StatusTransition::validate(self.status, to)?;
        tracing::debug!(
            target: "imgtask.task",
            stage = "task.transition",
            task_id = %self.task_id,
            from = %self.status,
            to = %to,
            "task {}",
            StatusTransition::describe(to)
        );
        self.status = to;
        Ok(())
    }
}
