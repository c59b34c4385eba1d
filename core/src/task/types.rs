use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TaskError;

/// Free-form task input; required keys are checked by the script.
pub type TaskInput = serde_json::Map<String, serde_json::Value>;

/// Kinds of task the service knows about. Which of them a deployment actually
/// runs is decided by the `valid_tasks_type` allowlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Import,
    Export,
    Clone,
}

impl TaskType {
    pub const ALL: [TaskType; 3] = [TaskType::Import, TaskType::Export, TaskType::Clone];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Export => "export",
            Self::Clone => "clone",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| TaskError::InvalidTaskType(s.to_string()))
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Success,
    Failure,
    Killed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::Processing,
        TaskStatus::Success,
        TaskStatus::Failure,
        TaskStatus::Killed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Killed => "killed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| TaskError::InvalidTaskStatus(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_type_round_trips_through_str() {
        for ty in TaskType::ALL {
            assert_eq!(ty.as_str().parse::<TaskType>().unwrap(), ty);
        }
        assert_eq!(
            "bulk".parse::<TaskType>(),
            Err(TaskError::InvalidTaskType("bulk".into()))
        );
    }

    #[test]
    fn status_rejects_unknown_values() {
        assert_eq!("killed".parse::<TaskStatus>(), Ok(TaskStatus::Killed));
        assert_eq!(
            "inprogress".parse::<TaskStatus>(),
            Err(TaskError::InvalidTaskStatus("inprogress".into()))
        );
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let v = serde_json::to_value(TaskStatus::Processing).unwrap();
        assert_eq!(v, serde_json::json!("processing"));
        let ty: TaskType = serde_json::from_value(serde_json::json!("export")).unwrap();
        assert_eq!(ty, TaskType::Export);
    }
}
