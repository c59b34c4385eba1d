use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;

use super::pool::{TokioWorkerPool, WorkerPool};
use super::registry::ScriptRegistry;
use crate::config::AppConfig;
use crate::context::{RequestContext, Services};
use crate::error::ExecutorError;
use crate::script::{self, KillSwitch, ScriptContext};
use crate::task::{Task, TaskStatus};

/// How many times a status change is retried when the row keeps moving
/// underneath us.
const SAVE_ATTEMPTS: usize = 5;

type KillSwitches = Arc<Mutex<HashMap<String, KillSwitch>>>;

/// Moves persisted tasks onto the worker pool.
///
/// Constructed once at startup; nothing is dispatched before [`Executor::start`]
/// or after [`Executor::stop`].
pub struct Executor {
    services: Services,
    registry: ScriptRegistry,
    allowlist: HashSet<String>,
    pool: Arc<dyn WorkerPool>,
    task_timeout: Option<Duration>,
    running: AtomicBool,
    kill_switches: KillSwitches,
}

impl Executor {
    pub fn new(
        cfg: &AppConfig,
        services: Services,
        registry: ScriptRegistry,
        pool: Arc<dyn WorkerPool>,
    ) -> Self {
        let allowlist: HashSet<String> = cfg
            .tasks
            .valid_tasks_type
            .iter()
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        let task_timeout = (cfg.tasks.task_timeout_secs > 0)
            .then(|| Duration::from_secs(cfg.tasks.task_timeout_secs));

        tracing::debug!(
            target: "imgtask.executor",
            stage = "executor.new",
            allowlist = ?allowlist,
            scripts = ?registry,
            timeout_secs = cfg.tasks.task_timeout_secs
        );

        Self {
            services,
            registry,
            allowlist,
            pool,
            task_timeout,
            running: AtomicBool::new(false),
            kill_switches: Arc::default(),
        }
    }

    /// Uses a [`TokioWorkerPool`] sized from `executor.pool_size`.
    pub fn from_config(cfg: &AppConfig, services: Services, registry: ScriptRegistry) -> Self {
        let pool = Arc::new(TokioWorkerPool::new(cfg.executor.pool_size));
        tracing::debug!(
            target: "imgtask.executor",
            stage = "executor.pool",
            pool_size = pool.size()
        );
        Self::new(cfg, services, registry, pool)
    }

    pub fn start(&self) {
        self.running.store(true, Ordering::Release);
        tracing::info!(target: "imgtask.executor", stage = "executor.start");
    }

    /// Stops accepting dispatches. Runs already submitted continue; use
    /// [`Executor::wait_idle`] to wait for them.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.pool.close();
        tracing::info!(
            target: "imgtask.executor",
            stage = "executor.stop",
            in_flight = self.pool.in_flight()
        );
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) && !self.pool.is_closed()
    }

    pub fn in_flight(&self) -> usize {
        self.pool.in_flight()
    }

    pub async fn wait_idle(&self) {
        self.pool.wait_idle().await
    }

    /// Claims a pending task (pending -> processing, persisted before this
    /// returns) and submits its script to the pool.
    ///
    /// An unsupported task type is failed on the spot and is not an error
    /// for the caller. A task that is missing or not pending is.
    pub async fn begin_processing(
        &self,
        task_id: &str,
        request: &RequestContext,
    ) -> Result<(), ExecutorError> {
        if !self.is_running() {
            return Err(ExecutorError::NotRunning);
        }

        let mut task = self.claim(task_id).await?;
        let task_type = task.task_type();

        let script = self
            .allowlist
            .contains(task_type.as_str())
            .then(|| self.registry.get(task_type))
            .flatten();
        let Some(script) = script else {
            tracing::warn!(
                target: "imgtask.executor",
                stage = "executor.unsupported_type",
                task_id = %task_id,
                task_type = %task_type
            );
            self.finish_without_run(&mut task, format!("Unsupported task type: {task_type}"))
                .await?;
            return Ok(());
        };

        let kill = KillSwitch::new();
        lock(&self.kill_switches).insert(task_id.to_string(), kill.clone());

        let ctx = ScriptContext::new(request.clone(), self.services.clone()).with_kill_switch(kill);
        let switches = self.kill_switches.clone();
        let timeout = self.task_timeout;
        let id = task_id.to_string();
        let work = async move {
            script::execute(script, &id, ctx, timeout).await;
            lock(&switches).remove(&id);
        }
        .boxed();

        if let Err(e) = self.pool.submit(task_id, work) {
            lock(&self.kill_switches).remove(task_id);
            tracing::error!(
                target: "imgtask.executor",
                stage = "executor.submit_failed",
                task_id = %task_id,
                error = %e
            );
            self.finish_without_run(&mut task, format!("Task could not be dispatched: {e}"))
                .await?;
            return Err(e);
        }

        tracing::info!(
            target: "imgtask.executor",
            stage = "executor.dispatched",
            task_id = %task_id,
            task_type = %task_type,
            in_flight = self.pool.in_flight()
        );
        Ok(())
    }

    /// Stops a task. Pending tasks are killed directly; a processing task
    /// running here gets its kill switch fired and the script records
    /// `killed` once it notices. Terminal tasks cannot be killed.
    pub async fn kill(&self, task_id: &str, message: Option<String>) -> Result<(), ExecutorError> {
        let repo = &self.services.task_repo;

        for _ in 0..SAVE_ATTEMPTS {
            let mut task = repo.get(task_id).await?;

            if task.status() == TaskStatus::Processing {
                let switch = lock(&self.kill_switches).get(task_id).cloned();
                if let Some(switch) = switch {
                    switch.fire(message);
                    tracing::info!(
                        target: "imgtask.executor",
                        stage = "executor.kill.signalled",
                        task_id = %task_id
                    );
                    return Ok(());
                }
            }

            task.kill(message.clone())?;
            match repo.save(&mut task).await {
                Ok(()) => {
                    tracing::info!(
                        target: "imgtask.executor",
                        stage = "executor.kill.recorded",
                        task_id = %task_id
                    );
                    return Ok(());
                }
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(ExecutorError::Contended(task_id.to_string()))
    }

    /// Reload/transition/save until the save lands. A racing claimant's
    /// write makes the reload come back `processing`, and the transition
    /// then fails with an invalid-state error.
    async fn claim(&self, task_id: &str) -> Result<Task, ExecutorError> {
        let repo = &self.services.task_repo;

        for _ in 0..SAVE_ATTEMPTS {
            let mut task = repo.get(task_id).await?;
            task.begin_processing()?;
            match repo.save(&mut task).await {
                Ok(()) => return Ok(task),
                Err(e) if e.is_conflict() => {
                    tracing::debug!(
                        target: "imgtask.executor",
                        stage = "executor.claim.conflict",
                        task_id = %task_id
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ExecutorError::Contended(task_id.to_string()))
    }

    async fn finish_without_run(&self, task: &mut Task, message: String) -> Result<(), ExecutorError> {
        let repo = &self.services.task_repo;
        for _ in 0..SAVE_ATTEMPTS {
            task.fail(message.clone())?;
            match repo.save(task).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_conflict() => {
                    *task = repo.get(task.task_id()).await?;
                    if task.is_terminal() {
                        return Ok(());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ExecutorError::Contended(task.task_id().to_string()))
    }
}

fn lock(switches: &KillSwitches) -> MutexGuard<'_, HashMap<String, KillSwitch>> {
    switches.lock().unwrap_or_else(PoisonError::into_inner)
}
