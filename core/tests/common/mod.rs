#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use imgtask_core::api::{
    require_keys, AppConfig, Executor, RequestContext, ScriptContext, ScriptError,
    ScriptRegistry, Services, Task, TaskFactory, TaskScript, TaskType,
};
use serde_json::{json, Value};

/// Echoes its input back as the task result after the required `echo` key
/// has been checked.
pub struct EchoScript;

#[async_trait]
impl TaskScript for EchoScript {
    fn name(&self) -> &str {
        "echo"
    }

    fn required_keys(&self) -> &'static [&'static str] {
        &["echo"]
    }

    fn validate(&self, task: &Task) -> Result<(), ScriptError> {
        require_keys(task.input(), self.required_keys())
    }

    async fn perform(&self, task: &Task, _ctx: &ScriptContext) -> Result<Value, ScriptError> {
        Ok(json!({"echo": task.input()["echo"].clone()}))
    }
}

pub fn executor(services: &Services, allow: &[&str]) -> Executor {
    let mut cfg = AppConfig::default();
    cfg.tasks.valid_tasks_type = allow.iter().map(|s| s.to_string()).collect();
    cfg.executor.pool_size = 2;
    let registry = ScriptRegistry::new()
        .with(TaskType::Import, Arc::new(EchoScript))
        .with(TaskType::Clone, Arc::new(EchoScript));
    let executor = Executor::from_config(&cfg, services.clone(), registry);
    executor.start();
    executor
}

pub async fn add_task(services: &Services, raw: Value) -> String {
    let mut task = TaskFactory::default()
        .new_task(Some(&RequestContext::new(Some("owner-1".into()))), &raw)
        .unwrap();
    services.task_repo.add(&mut task).await.unwrap();
    task.task_id().to_string()
}
