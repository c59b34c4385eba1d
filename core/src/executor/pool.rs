use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::{Notify, Semaphore};

use crate::error::ExecutorError;

/// Concurrency substrate the executor hands script runs to.
#[async_trait]
pub trait WorkerPool: Send + Sync {
    /// Queues `work` and returns without waiting for it to start.
    fn submit(&self, label: &str, work: BoxFuture<'static, ()>) -> Result<(), ExecutorError>;

    /// Submitted units that have not finished yet, queued ones included.
    fn in_flight(&self) -> usize;

    /// Resolves once nothing is in flight.
    async fn wait_idle(&self);

    /// Rejects further submissions. Work already queued still runs.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Tokio tasks gated by a semaphore of `size` permits.
pub struct TokioWorkerPool {
    size: usize,
    permits: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
    closed: AtomicBool,
}

impl TokioWorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            permits: Arc::new(Semaphore::new(size)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

struct InFlightGuard {
    counter: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.counter.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

#[async_trait]
impl WorkerPool for TokioWorkerPool {
    fn submit(&self, label: &str, work: BoxFuture<'static, ()>) -> Result<(), ExecutorError> {
        if self.is_closed() {
            return Err(ExecutorError::PoolClosed(label.to_string()));
        }
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| ExecutorError::PoolClosed(label.to_string()))?;

        self.in_flight.fetch_add(1, Ordering::AcqRel);
        let guard = InFlightGuard {
            counter: self.in_flight.clone(),
            idle: self.idle.clone(),
        };
        let permits = self.permits.clone();
        let label = label.to_string();

        handle.spawn(async move {
            let _guard = guard;
            let Ok(_permit) = permits.acquire_owned().await else {
                tracing::error!(target: "imgtask.executor", stage = "pool.permit_closed", unit = %label);
                return;
            };
            tracing::trace!(target: "imgtask.executor", stage = "pool.unit.start", unit = %label);
            work.await;
        });
        Ok(())
    }

    fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
