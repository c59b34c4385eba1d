//! In-process task repository.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use super::entity::Task;
use super::repository::{ListParams, SortDir, SortKey, TaskRepository};
use crate::error::RepoError;

const KIND: &str = "task";

/// Tasks kept in a map behind an async `RwLock`. Writes are serialised per
/// row by comparing `updated_at` (optimistic concurrency).
#[derive(Clone, Default)]
pub struct InMemoryTaskRepository {
    rows: Arc<RwLock<HashMap<String, Task>>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

/// Next `updated_at`, strictly after the stored one even when the clock has
/// not moved.
fn next_stamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn get(&self, task_id: &str) -> Result<Task, RepoError> {
        self.rows
            .read()
            .await
            .get(task_id)
            .cloned()
            .ok_or_else(|| RepoError::not_found(KIND, task_id))
    }

    async fn save(&self, task: &mut Task) -> Result<(), RepoError> {
        let mut rows = self.rows.write().await;
        let stored = rows
            .get_mut(task.task_id())
            .ok_or_else(|| RepoError::not_found(KIND, task.task_id()))?;

        if stored.updated_at != task.updated_at {
            tracing::debug!(
                target: "imgtask.repo",
                stage = "task.save.conflict",
                task_id = %task.task_id(),
                stored = %stored.updated_at,
                given = %task.updated_at
            );
            return Err(RepoError::Conflict {
                kind: KIND,
                id: task.task_id().to_string(),
            });
        }

        task.updated_at = next_stamp(stored.updated_at);
        *stored = task.clone();
        Ok(())
    }

    async fn list(&self, params: &ListParams) -> Result<Vec<Task>, RepoError> {
        if params.limit == Some(0) {
            return Ok(Vec::new());
        }

        let rows = self.rows.read().await;
        let mut tasks: Vec<Task> = rows
            .values()
            .filter(|t| params.filters.matches(t))
            .cloned()
            .collect();

        tasks.sort_by(|a, b| {
            let ord = match params.sort_key {
                SortKey::CreatedAt => a.created_at().cmp(&b.created_at()),
                SortKey::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                SortKey::Id => a.task_id().cmp(b.task_id()),
                SortKey::Type => a.task_type().cmp(&b.task_type()),
                SortKey::Status => a.status().cmp(&b.status()),
            }
            // stable paging when the sort key ties
            .then_with(|| a.task_id().cmp(b.task_id()));
            match params.sort_dir {
                SortDir::Asc => ord,
                SortDir::Desc => ord.reverse(),
            }
        });

        if let Some(marker) = params.marker.as_deref() {
            let pos = tasks
                .iter()
                .position(|t| t.task_id() == marker)
                .ok_or_else(|| RepoError::not_found(KIND, marker))?;
            tasks.drain(..=pos);
        }

        if let Some(limit) = params.limit {
            tasks.truncate(limit);
        }
        Ok(tasks)
    }

    async fn add(&self, task: &mut Task) -> Result<(), RepoError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(task.task_id()) {
            return Err(RepoError::Duplicate {
                kind: KIND,
                id: task.task_id().to_string(),
            });
        }
        rows.insert(task.task_id().to_string(), task.clone());
        tracing::debug!(target: "imgtask.repo", stage = "task.add", task_id = %task.task_id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::task::{TaskFactory, TaskFilters, TaskStatus, TaskType};
    use serde_json::json;

    fn new_task(ty: &str, owner: &str) -> Task {
        TaskFactory::new(48)
            .new_task(
                Some(&RequestContext::new(Some(owner.to_string()))),
                &json!({"type": ty, "input": {}}),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn get_unknown_id_is_not_found() {
        let repo = InMemoryTaskRepository::new();
        let err = repo.get("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn add_rejects_duplicates() {
        let repo = InMemoryTaskRepository::new();
        let mut task = new_task("import", "a");
        repo.add(&mut task).await.unwrap();
        let err = repo.add(&mut task).await.unwrap_err();
        assert!(matches!(err, RepoError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn save_refreshes_updated_at_and_detects_stale_writes() {
        let repo = InMemoryTaskRepository::new();
        let mut task = new_task("import", "a");
        repo.add(&mut task).await.unwrap();

        let mut first = repo.get(task.task_id()).await.unwrap();
        let mut second = repo.get(task.task_id()).await.unwrap();

        let before = first.updated_at;
        first.begin_processing().unwrap();
        repo.save(&mut first).await.unwrap();
        assert!(first.updated_at > before);

        second.begin_processing().unwrap();
        let err = repo.save(&mut second).await.unwrap_err();
        assert!(err.is_conflict());

        let stored = repo.get(task.task_id()).await.unwrap();
        assert_eq!(stored.status(), TaskStatus::Processing);
        assert_eq!(stored.updated_at, first.updated_at);
    }

    #[tokio::test]
    async fn list_filters_sorts_and_pages() {
        let repo = InMemoryTaskRepository::new();
        for (ty, owner) in [("import", "a"), ("export", "a"), ("import", "b"), ("import", "a")] {
            let mut t = new_task(ty, owner);
            repo.add(&mut t).await.unwrap();
        }

        let imports = repo
            .list(&ListParams {
                filters: TaskFilters {
                    task_type: Some(TaskType::Import),
                    owner: Some("a".into()),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(imports.len(), 2);
        assert!(imports
            .iter()
            .all(|t| t.task_type() == TaskType::Import && t.owner() == Some("a")));

        let by_id = ListParams {
            sort_key: SortKey::Id,
            sort_dir: SortDir::Asc,
            ..Default::default()
        };
        let all = repo.list(&by_id).await.unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|w| w[0].task_id() < w[1].task_id()));

        let after_first = repo
            .list(&ListParams {
                marker: Some(all[0].task_id().to_string()),
                ..by_id.clone()
            })
            .await
            .unwrap();
        assert_eq!(after_first.len(), 3);
        assert_eq!(after_first[0].task_id(), all[1].task_id());

        let limited = repo
            .list(&ListParams {
                limit: Some(2),
                ..by_id.clone()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);

        let none = repo
            .list(&ListParams {
                limit: Some(0),
                ..by_id.clone()
            })
            .await
            .unwrap();
        assert!(none.is_empty());

        let err = repo
            .list(&ListParams {
                marker: Some("nope".into()),
                ..by_id
            })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
