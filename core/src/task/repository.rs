use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::entity::Task;
use super::types::{TaskStatus, TaskType};
use crate::error::RepoError;

/// Persistence boundary for tasks.
///
/// `save` must reject a write whose `updated_at` no longer matches the stored
/// row (`RepoError::Conflict`) and must refresh `updated_at` on success.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn get(&self, task_id: &str) -> Result<Task, RepoError>;
    async fn save(&self, task: &mut Task) -> Result<(), RepoError>;
    async fn list(&self, params: &ListParams) -> Result<Vec<Task>, RepoError>;
    async fn add(&self, task: &mut Task) -> Result<(), RepoError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilters {
    pub task_type: Option<TaskType>,
    pub status: Option<TaskStatus>,
    pub owner: Option<String>,
}

impl TaskFilters {
    pub fn matches(&self, task: &Task) -> bool {
        self.task_type.is_none_or(|t| t == task.task_type())
            && self.status.is_none_or(|s| s == task.status())
            && self
                .owner
                .as_deref()
                .is_none_or(|o| task.owner() == Some(o))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    CreatedAt,
    UpdatedAt,
    Id,
    Type,
    Status,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    Asc,
    #[default]
    Desc,
}

/// Listing parameters. `limit: None` returns everything, `Some(0)` nothing;
/// `marker` is the id of the last task of the previous page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    pub filters: TaskFilters,
    pub marker: Option<String>,
    pub limit: Option<usize>,
    pub sort_key: SortKey,
    pub sort_dir: SortDir,
}
