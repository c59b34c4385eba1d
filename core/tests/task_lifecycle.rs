mod common;

use common::{add_task, executor};
use imgtask_core::api::{ListParams, RequestContext, Services, TaskFilters, TaskStatus};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn successful_run_serializes_every_field() {
    let services = Services::in_memory("images");
    let executor = executor(&services, &["import"]);
    let id = add_task(&services, json!({"type": "import", "input": {"echo": 7}})).await;

    assert_ok!(executor.begin_processing(&id, &RequestContext::default()).await);
    executor.wait_idle().await;

    let task = services.task_repo.get(&id).await.unwrap();
    let value = serde_json::to_value(&task).unwrap();
    assert_eq!(value["task_id"], json!(id));
    assert_eq!(value["type"], json!("import"));
    assert_eq!(value["status"], json!("success"));
    assert_eq!(value["input"], json!({"echo": 7}));
    assert_eq!(value["result"], json!({"echo": 7}));
    assert_eq!(value["owner"], json!("owner-1"));
    assert_eq!(value["message"], json!(null));
    for key in ["expires_at", "created_at", "updated_at"] {
        assert!(value[key].is_string(), "{key} missing");
    }
}

#[tokio::test]
async fn missing_key_fails_and_result_stays_empty() {
    let services = Services::in_memory("images");
    let executor = executor(&services, &["import"]);
    let id = add_task(&services, json!({"type": "import", "input": {}})).await;

    assert_ok!(executor.begin_processing(&id, &RequestContext::default()).await);
    executor.wait_idle().await;

    let task = services.task_repo.get(&id).await.unwrap();
    assert_eq!(task.status(), TaskStatus::Failure);
    assert_eq!(task.result(), None);
    assert_eq!(
        task.message(),
        Some("Invalid: Input does not contain 'echo' field")
    );
}

#[tokio::test]
async fn terminal_tasks_cannot_be_dispatched_again() {
    let services = Services::in_memory("images");
    let executor = executor(&services, &["import"]);
    let id = add_task(&services, json!({"type": "import", "input": {"echo": 1}})).await;

    assert_ok!(executor.begin_processing(&id, &RequestContext::default()).await);
    executor.wait_idle().await;

    let err = assert_err!(executor.begin_processing(&id, &RequestContext::default()).await);
    assert!(err.is_invalid_state());
}

#[tokio::test]
async fn many_tasks_finish_on_a_small_pool() {
    let services = Services::in_memory("images");
    let executor = executor(&services, &["import", "clone"]);

    let mut ids = Vec::new();
    for i in 0..10 {
        let ty = if i % 2 == 0 { "import" } else { "clone" };
        ids.push(add_task(&services, json!({"type": ty, "input": {"echo": i}})).await);
    }
    for id in &ids {
        assert_ok!(executor.begin_processing(id, &RequestContext::default()).await);
    }
    executor.wait_idle().await;
    assert_eq!(executor.in_flight(), 0);

    let done = services
        .task_repo
        .list(&ListParams {
            filters: TaskFilters {
                status: Some(TaskStatus::Success),
                ..Default::default()
            },
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(done.len(), 10);
}
