use chrono::{Duration, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::entity::Task;
use super::types::TaskStatus;
use crate::config::{TaskConfig, MAX_TASK_TIME_TO_LIVE_HOURS};
use crate::context::RequestContext;
use crate::error::TaskError;

/// Mints new pending tasks. Does not persist them.
#[derive(Debug, Clone)]
pub struct TaskFactory {
    time_to_live: Option<Duration>,
}

impl TaskFactory {
    /// `ttl_hours == 0` means tasks never expire. Values above
    /// [`MAX_TASK_TIME_TO_LIVE_HOURS`] are clamped to it.
    pub fn new(ttl_hours: u64) -> Self {
        let time_to_live = match ttl_hours {
            0 => None,
            n => i64::try_from(n.min(MAX_TASK_TIME_TO_LIVE_HOURS))
                .ok()
                .and_then(Duration::try_hours),
        };
        Self { time_to_live }
    }

    pub fn from_config(cfg: &TaskConfig) -> Self {
        Self::new(cfg.task_time_to_live_hours)
    }

    /// Builds a task from a `{"type": ..., "input": {...}}` envelope.
    pub fn new_task(&self, ctx: Option<&RequestContext>, raw: &Value) -> Result<Task, TaskError> {
        let ctx = ctx.ok_or(TaskError::MissingContext)?;

        let task_type = match raw.get("type") {
            Some(Value::String(s)) => s.as_str(),
            Some(other) => return Err(TaskError::InvalidTaskType(other.to_string())),
            None => return Err(TaskError::InvalidTaskType(String::new())),
        };
        let input = match raw.get("input") {
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return Err(TaskError::InvalidInput(
                    "'input' must be a JSON object".to_string(),
                ))
            }
            None => return Err(TaskError::InvalidInput("missing 'input'".to_string())),
        };

        let created_at = Utc::now();
        let expires_at = match self.time_to_live {
            Some(ttl) => Some(
                created_at
                    .checked_add_signed(ttl)
                    .ok_or(TaskError::ExpiryOutOfRange)?,
            ),
            None => None,
        };

        let task = Task::new(
            Uuid::new_v4().to_string(),
            task_type,
            TaskStatus::Pending.as_str(),
            input,
            None,
            ctx.owner.clone(),
            None,
            expires_at,
            created_at,
            created_at,
        )?;

        tracing::info!(
            target: "imgtask.task",
            stage = "task.factory.new",
            task_id = %task.task_id(),
            task_type = %task.task_type(),
            owner = ?task.owner()
        );
        Ok(task)
    }
}

impl Default for TaskFactory {
    fn default() -> Self {
        Self::from_config(&TaskConfig::default())
    }
}
