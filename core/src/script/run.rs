use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;

use super::contract::{ScriptContext, TaskScript};
use crate::error::ScriptError;
use crate::task::{Task, TaskRepository, TaskStatus};

/// Runs `script` for `task_id` and records the terminal state.
///
/// Nothing escapes: validation errors, store errors, timeouts and panics all
/// end as `failure` (or `killed` once the kill switch fired). A task that is
/// gone or no longer `processing` is logged and left alone.
pub async fn execute(
    script: Arc<dyn TaskScript>,
    task_id: &str,
    ctx: ScriptContext,
    timeout: Option<Duration>,
) {
    let repo = ctx.services.task_repo.clone();

    let task = match repo.get(task_id).await {
        Ok(task) => task,
        Err(e) if e.is_not_found() => {
            tracing::warn!(
                target: "imgtask.script",
                stage = "script.task_missing",
                script = %script.name(),
                task_id = %task_id
            );
            return;
        }
        Err(e) => {
            tracing::error!(
                target: "imgtask.script",
                stage = "script.load_failed",
                script = %script.name(),
                task_id = %task_id,
                error = %e
            );
            return;
        }
    };

    if task.status() != TaskStatus::Processing {
        tracing::warn!(
            target: "imgtask.script",
            stage = "script.not_processing",
            task_id = %task_id,
            status = %task.status()
        );
        return;
    }

    tracing::info!(
        target: "imgtask.script",
        stage = "script.start",
        script = %script.name(),
        task_id = %task_id,
        task_type = %task.task_type()
    );

    let outcome = run_guarded(script.as_ref(), &task, &ctx, timeout).await;
    record_outcome(repo.as_ref(), task, outcome, &ctx).await;
}

/// Upper bound on how long a script may keep running after its budget is
/// spent. Scripts get as long again as their budget, capped here.
const MAX_TIMEOUT_GRACE: Duration = Duration::from_secs(30);

async fn run_guarded(
    script: &dyn TaskScript,
    task: &Task,
    ctx: &ScriptContext,
    timeout: Option<Duration>,
) -> Result<Value, ScriptError> {
    let work = async {
        script.validate(task)?;
        script.perform(task, ctx).await
    };
    let guarded = AssertUnwindSafe(work)
        .catch_unwind()
        .map(|res| res.unwrap_or_else(|panic| Err(ScriptError::Internal(panic_message(panic)))));

    let Some(limit) = timeout else {
        return guarded.await;
    };

    tokio::pin!(guarded);
    tokio::select! {
        res = &mut guarded => res,
        _ = tokio::time::sleep(limit) => {
            // Cancel through the streams so stores clean up after themselves,
            // then give the script a bounded window to unwind.
            ctx.expire();
            let grace = limit.min(MAX_TIMEOUT_GRACE);
            tracing::warn!(
                target: "imgtask.script",
                stage = "script.timeout",
                task_id = %task.task_id(),
                limit = ?limit,
                grace = ?grace
            );
            match tokio::time::timeout(grace, &mut guarded).await {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(_)) => Err(ScriptError::Timeout(limit)),
                Err(_) => {
                    tracing::error!(
                        target: "imgtask.script",
                        stage = "script.timeout.abandoned",
                        task_id = %task.task_id()
                    );
                    Err(ScriptError::Timeout(limit))
                }
            }
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("script panicked: {detail}")
}

/// Applies the outcome and saves. One reload-and-retry on a concurrent write.
async fn record_outcome(
    repo: &dyn TaskRepository,
    mut task: Task,
    outcome: Result<Value, ScriptError>,
    ctx: &ScriptContext,
) {
    let task_id = task.task_id().to_string();

    for attempt in 0..2 {
        let applied = match &outcome {
            Ok(result) => task.succeed(result.clone()),
            Err(e) if ctx.kill.is_fired() || matches!(e, ScriptError::Cancelled) => {
                task.kill(ctx.kill.reason())
            }
            Err(e) => task.fail(e.failure_message()),
        };
        if let Err(e) = applied {
            tracing::warn!(
                target: "imgtask.script",
                stage = "script.outcome_rejected",
                task_id = %task_id,
                status = %task.status(),
                error = %e
            );
            return;
        }

        match repo.save(&mut task).await {
            Ok(()) => {
                tracing::info!(
                    target: "imgtask.script",
                    stage = "script.finish",
                    task_id = %task_id,
                    status = %task.status(),
                    message = ?task.message()
                );
                return;
            }
            Err(e) if e.is_conflict() && attempt == 0 => {
                task = match repo.get(&task_id).await {
                    Ok(fresh) if !fresh.is_terminal() => fresh,
                    Ok(fresh) => {
                        tracing::info!(
                            target: "imgtask.script",
                            stage = "script.already_terminal",
                            task_id = %task_id,
                            status = %fresh.status()
                        );
                        return;
                    }
                    Err(e) => {
                        tracing::error!(
                            target: "imgtask.script",
                            stage = "script.reload_failed",
                            task_id = %task_id,
                            error = %e
                        );
                        return;
                    }
                };
            }
            Err(e) => {
                tracing::error!(
                    target: "imgtask.script",
                    stage = "script.save_failed",
                    task_id = %task_id,
                    error = %e
                );
                return;
            }
        }
    }
}
