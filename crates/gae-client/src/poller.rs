//! Completion polling for engine jobs.
//!
//! The engine never pushes completion; a job is done once a status read shows
//! `progress >= total`. The only suspension point in a poll loop is the timed
//! wait between reads, which a deadline or cancellation token can cut short.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use gae_types::{GaeError, JobHandle, Result};

use crate::backoff::PollBackoff;
use crate::gateway::EngineGateway;

// ---------------------------------------------------------------------------
// ProgressObserver
// ---------------------------------------------------------------------------

/// Receives every status observation made while waiting on a job.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, job: &JobHandle, progress: u64, total: u64);
}

pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_progress(&self, _job: &JobHandle, _progress: u64, _total: u64) {}
}

// ---------------------------------------------------------------------------
// PollOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Completed { polls: u32 },
    TimedOut { waited: Duration },
}

// ---------------------------------------------------------------------------
// JobPoller
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct JobPoller {
    gateway: EngineGateway,
    backoff: PollBackoff,
    deadline: Option<Duration>,
    cancel: CancellationToken,
    observer: Arc<dyn ProgressObserver>,
}

impl JobPoller {
    pub fn new(gateway: EngineGateway, backoff: PollBackoff) -> Self {
        Self {
            gateway,
            backoff,
            deadline: None,
            cancel: CancellationToken::new(),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Bound each wait; `None` keeps the unbounded behaviour.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Wait until `job` completes, the deadline passes, or the wait is cancelled.
    ///
    /// Errors: `RequestError`/`ResponseShapeError` from a status read,
    /// `JobFailed` when the engine flags the job, `Cancelled` on cancellation.
    pub async fn await_job(&self, job: &JobHandle) -> Result<PollOutcome> {
        let started = Instant::now();
        let mut polls: u32 = 0;

        loop {
            let status = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(GaeError::Cancelled { job_id: job.id.0 });
                }
                status = self.gateway.fetch_status(job.id) => status?,
            };
            polls += 1;
            self.observer.on_progress(job, status.progress, status.total);

            if let Some(failure) = status.failure {
                tracing::warn!(job_id = %job.id, kind = %job.kind, code = failure.code, "Job failed on engine");
                return Err(GaeError::JobFailed {
                    job_id: job.id.0,
                    code: failure.code,
                    message: failure.message,
                });
            }
            if status.is_complete() {
                tracing::info!(job_id = %job.id, kind = %job.kind, polls, "Job completed");
                return Ok(PollOutcome::Completed { polls });
            }

            tracing::info!(
                job_id = %job.id,
                kind = %job.kind,
                progress = status.progress,
                total = status.total,
                "Job still running"
            );

            let mut delay = self.backoff.delay_for_attempt(polls as usize - 1);
            if let Some(deadline) = self.deadline {
                let waited = started.elapsed();
                if waited >= deadline {
                    tracing::warn!(job_id = %job.id, waited_ms = waited.as_millis() as u64, "Job wait timed out");
                    return Ok(PollOutcome::TimedOut { waited });
                }
                delay = delay.min(deadline - waited);
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(GaeError::Cancelled { job_id: job.id.0 });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Like [`await_job`](Self::await_job), with a timeout turned into `TimedOut`.
    pub async fn await_completion(&self, job: &JobHandle) -> Result<u32> {
        match self.await_job(job).await? {
            PollOutcome::Completed { polls } => Ok(polls),
            PollOutcome::TimedOut { waited } => Err(GaeError::TimedOut {
                job_id: job.id.0,
                waited_ms: waited.as_millis() as u64,
            }),
        }
    }

    /// Poll every job on its own task and wait for all of them.
    ///
    /// Never fails fast: each job's result is returned in input order.
    pub async fn await_all(&self, jobs: Vec<JobHandle>) -> Vec<(JobHandle, Result<u32>)> {
        let mut join_set = JoinSet::new();
        for (index, job) in jobs.iter().cloned().enumerate() {
            let poller = self.clone();
            join_set.spawn(async move {
                let result = poller.await_completion(&job).await;
                (index, result)
            });
        }

        let mut results: Vec<Option<Result<u32>>> = jobs.iter().map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(join_err) => tracing::error!("Poll task aborted: {}", join_err),
            }
        }

        jobs.into_iter()
            .zip(results)
            .map(|(job, result)| {
                let result = result.unwrap_or_else(|| {
                    Err(GaeError::Other(format!(
                        "poll task for job {} did not finish",
                        job.id
                    )))
                });
                (job, result)
            })
            .collect()
    }
}
