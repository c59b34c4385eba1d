//! `run` and `config` subcommands.
use std::path::Path;

use imgtask_core::api::{
    AppConfig, Executor, RequestContext, ServicesFactory, Task, TaskFactory, TaskStatus,
};
use imgtask_plugins::factory::build_registry;
use imgtask_plugins::services::PluginServicesFactory;
use serde_json::{json, Value};

use crate::commands::cli::RunArgs;
use crate::error::CliError;

const INTERRUPTED: &str = "Task was interrupted";

/// Exit code for a task that ran to a terminal state.
pub fn exit_code_for_status(status: TaskStatus) -> i32 {
    match status {
        TaskStatus::Success => 0,
        _ => 2,
    }
}

pub fn read_input(args: &RunArgs) -> Result<Value, CliError> {
    let raw = match (&args.input, &args.input_file) {
        (Some(s), _) => s.clone(),
        (None, Some(path)) => std::fs::read_to_string(Path::new(path))?,
        (None, None) => "{}".to_string(),
    };
    let value: Value =
        serde_json::from_str(&raw).map_err(|e| CliError::Input(e.to_string()))?;
    if !value.is_object() {
        return Err(CliError::Input("expected a JSON object".into()));
    }
    Ok(value)
}

/// Creates the task, runs it on a fresh executor and returns the final row.
/// Ctrl-C kills the task and waits for the script to notice.
pub async fn run_task(cfg: &AppConfig, args: RunArgs) -> Result<Task, CliError> {
    let input = read_input(&args)?;
    let services = PluginServicesFactory
        .build_services(cfg)
        .await
        .map_err(|e| CliError::Config(format!("{e:#}")))?;

    let request = RequestContext {
        owner: args.owner.clone(),
        auth_token: args.auth_token.clone(),
    };
    let mut task = TaskFactory::from_config(&cfg.tasks)
        .new_task(Some(&request), &json!({"type": args.task_type, "input": input}))?;
    services.task_repo.add(&mut task).await?;
    let task_id = task.task_id().to_string();

    let executor = Executor::from_config(cfg, services.clone(), build_registry(cfg));
    executor.start();
    executor.begin_processing(&task_id, &request).await?;

    tokio::select! {
        _ = executor.wait_idle() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!(target: "imgtask.cli", stage = "cli.interrupt", task_id = %task_id);
            match executor.kill(&task_id, Some(INTERRUPTED.to_string())).await {
                Ok(()) => {}
                Err(e) if e.is_invalid_state() => {}
                Err(e) => return Err(e.into()),
            }
            executor.wait_idle().await;
        }
    }
    executor.stop();

    let task = services.task_repo.get(&task_id).await?;
    tracing::info!(
        target: "imgtask.cli",
        stage = "cli.run.done",
        task_id = %task_id,
        status = %task.status()
    );
    Ok(task)
}

pub fn render_task(task: &Task) -> Result<String, CliError> {
    serde_json::to_string_pretty(task).map_err(|e| CliError::Command(e.to_string()))
}

pub fn render_config(cfg: &AppConfig) -> Result<String, CliError> {
    toml::to_string_pretty(cfg).map_err(|e| CliError::Config(e.to_string()))
}
