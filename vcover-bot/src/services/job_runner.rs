//! Bounded worker pool for long-running backend jobs
//!
//! A backend job can run for the full inference timeout. Jobs are moved off
//! the invocation's task onto worker tasks, at most `max_concurrent` at a
//! time, and the invocation suspends on a [`PendingJob`] until the result
//! arrives or the timeout elapses.
//!
//! The time limit is enforced by the worker itself: a job still queued at
//! its deadline never starts, and a running job is dropped at its deadline.
//! Either way the worker slot is free again once the limit has passed.

use crate::services::gradio_client::BackendError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Job wait errors
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Failed(#[from] BackendError),

    /// Worker panicked or was aborted before reporting
    #[error("Job worker exited without a result")]
    WorkerLost,
}

/// Result handle of a submitted job
pub struct PendingJob<T> {
    name: &'static str,
    timeout: Duration,
    deadline: Instant,
    rx: oneshot::Receiver<Result<T, JobError>>,
    handle: JoinHandle<()>,
}

impl<T> PendingJob<T> {
    /// Wait for the job result, at most until the job's deadline
    pub async fn result(self) -> Result<T, JobError> {
        match tokio::time::timeout_at(self.deadline, self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(JobError::WorkerLost),
            Err(_) => {
                tracing::warn!(
                    job = self.name,
                    timeout_secs = self.timeout.as_secs(),
                    "Job timed out"
                );
                Err(JobError::Timeout(self.timeout))
            }
        }
    }

    /// Whether the worker task has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Bounded job runner
#[derive(Clone)]
pub struct JobRunner {
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl JobRunner {
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Spawn `job` on a worker once a slot is free
    ///
    /// `timeout` counts from submission and covers both queueing and
    /// running. `on_orphan` receives a successful result nobody is waiting
    /// for any more (the waiter was dropped), so owned resources can be
    /// released.
    pub fn submit<T, F, O>(
        &self,
        name: &'static str,
        timeout: Duration,
        job: F,
        on_orphan: O,
    ) -> PendingJob<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, BackendError>> + Send + 'static,
        O: FnOnce(T) + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let permits = Arc::clone(&self.permits);
        let deadline = Instant::now() + timeout;

        let handle = tokio::spawn(async move {
            let permit = match tokio::time::timeout_at(deadline, permits.acquire_owned()).await {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => {
                    let _ = tx.send(Err(JobError::Failed(BackendError::ProtocolError(
                        "job runner closed".to_string(),
                    ))));
                    return;
                }
                Err(_) => {
                    tracing::info!(job = name, "Job expired while queued, skipped");
                    let _ = tx.send(Err(JobError::Timeout(timeout)));
                    return;
                }
            };

            tracing::debug!(job = name, "Job started on worker");
            let result = match tokio::time::timeout_at(deadline, job).await {
                Ok(result) => result.map_err(JobError::from),
                Err(_) => {
                    tracing::warn!(job = name, "Job exceeded its time limit, cancelled");
                    Err(JobError::Timeout(timeout))
                }
            };
            drop(permit);

            if let Err(Ok(value)) = tx.send(result) {
                tracing::info!(job = name, "Job finished after its waiter gave up");
                on_orphan(value);
            }
        });

        PendingJob {
            name,
            timeout,
            deadline,
            rx,
            handle,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Free worker slots right now
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }
}
