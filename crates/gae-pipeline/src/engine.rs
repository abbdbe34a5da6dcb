//! Pipeline runner: load, compute, store, then a teardown that always runs.
//!
//! Every job id is appended to a [`ResourceLedger`] the moment the engine
//! hands it out; the graph id once its load job has completed. Whatever happens in the forward stages, the ledger is
//! drained against the engine before [`PipelineRunner::run`] returns.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use gae_client::{EngineGateway, EngineTransport, JobPoller, PollBackoff, Session};
use gae_types::{
    CleanupFailure, EngineConfig, GaeError, GraphHandle, JobHandle, JobKind, PipelineRequest,
    Result, Stage,
};

use crate::events::{EventEmitter, PipelineEvent};
use crate::ledger::{Resource, ResourceLedger};
use crate::mapping::ResultMapping;
use crate::payload::{self, LOAD_PATH, STORE_PATH};

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// A forward stage that did not complete.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {error}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub error: GaeError,
}

/// Final outcome of a run. There are no partial results.
#[derive(Debug)]
pub enum PipelineResult {
    /// Every stage completed and every resource was deleted.
    Done,
    /// Every stage completed but some deletions failed.
    Degraded { leaked: Vec<CleanupFailure> },
    /// A stage failed. `cleanup` lists deletions that also failed.
    Failed {
        stage: Stage,
        error: GaeError,
        cleanup: Vec<CleanupFailure>,
    },
}

impl PipelineResult {
    pub fn label(&self) -> &'static str {
        match self {
            PipelineResult::Done => "done",
            PipelineResult::Degraded { .. } => "degraded",
            PipelineResult::Failed { .. } => "failed",
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, PipelineResult::Done)
    }

    /// Deletions that did not succeed, regardless of outcome.
    pub fn cleanup_failures(&self) -> &[CleanupFailure] {
        match self {
            PipelineResult::Done => &[],
            PipelineResult::Degraded { leaked } => leaked.as_slice(),
            PipelineResult::Failed { cleanup, .. } => cleanup.as_slice(),
        }
    }

}

/// Everything a caller learns about a finished run.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub result: PipelineResult,
    /// Resources deleted during teardown, in deletion order.
    pub released: Vec<Resource>,
    pub duration: Duration,
}

impl RunReport {
    /// Process exit code: 0 done, 1 failed, 2 degraded.
    pub fn exit_code(&self) -> i32 {
        match self.result {
            PipelineResult::Done => 0,
            PipelineResult::Failed { .. } => 1,
            PipelineResult::Degraded { .. } => 2,
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "run {} {} in {}ms",
            self.run_id,
            self.result.label(),
            self.duration.as_millis()
        )?;
        if let PipelineResult::Failed { stage, error, .. } = &self.result {
            writeln!(f, "  failed stage: {stage}")?;
            writeln!(f, "  error: {error}")?;
        }
        for resource in &self.released {
            writeln!(f, "  released {} {}", resource.kind(), resource.id())?;
        }
        for failure in self.result.cleanup_failures() {
            writeln!(f, "  leaked {failure}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PipelineRunner
// ---------------------------------------------------------------------------

/// Drives one [`PipelineRequest`] against an engine deployment.
pub struct PipelineRunner {
    config: EngineConfig,
    transport: Arc<dyn EngineTransport>,
    events: EventEmitter,
    cancel: CancellationToken,
}

impl PipelineRunner {
    pub fn new(config: EngineConfig, transport: Arc<dyn EngineTransport>) -> Self {
        Self {
            config,
            transport,
            events: EventEmitter::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    /// Cancelling `token` aborts in-flight waits; teardown still runs.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    /// Run the whole pipeline. Never returns before teardown has finished.
    ///
    /// Teardown runs inside this future, so dropping it (or racing it against
    /// `tokio::time::timeout`) leaks whatever the ledger holds. Stop a run by
    /// cancelling the token passed to [`PipelineRunner::with_cancellation`]
    /// and awaiting the report.
    pub async fn run(&self, request: &PipelineRequest) -> RunReport {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        tracing::info!(
            run_id = %run_id,
            database = %request.database,
            algorithms = request.algorithms.len(),
            "Pipeline run started"
        );
        self.events.emit(PipelineEvent::RunStarted {
            run_id: run_id.to_string(),
            database: request.database.clone(),
            algorithms: request.algorithms.iter().map(|a| a.name.clone()).collect(),
        });

        let gateway = match self.prepare(request).await {
            Ok(gateway) => gateway,
            // Nothing was created on the engine yet, so there is nothing to release.
            Err(failure) => {
                let result = PipelineResult::Failed {
                    stage: failure.stage,
                    error: failure.error,
                    cleanup: Vec::new(),
                };
                return self.finish(run_id, started, result, Vec::new());
            }
        };

        let ledger = ResourceLedger::new();
        let forward = self.drive(&gateway, request, &ledger).await;
        let (released, leaked) = self.teardown(&gateway, &ledger).await;

        let result = match forward {
            Err(failure) => PipelineResult::Failed {
                stage: failure.stage,
                error: failure.error,
                cleanup: leaked,
            },
            Ok(()) if leaked.is_empty() => PipelineResult::Done,
            Ok(()) => PipelineResult::Degraded { leaked },
        };
        self.finish(run_id, started, result, released)
    }

    fn finish(
        &self,
        run_id: Uuid,
        started: Instant,
        result: PipelineResult,
        released: Vec<Resource>,
    ) -> RunReport {
        let duration = started.elapsed();
        match &result {
            PipelineResult::Done => tracing::info!(run_id = %run_id, "Pipeline run finished"),
            PipelineResult::Degraded { leaked } => tracing::warn!(
                run_id = %run_id,
                leaked = leaked.len(),
                "Pipeline run finished with leaked resources"
            ),
            PipelineResult::Failed { stage, error, .. } => tracing::error!(
                run_id = %run_id,
                stage = %stage,
                error = %error,
                "Pipeline run failed"
            ),
        }
        self.events.emit(PipelineEvent::RunFinished {
            run_id: run_id.to_string(),
            outcome: result.label().to_string(),
            duration_ms: duration.as_millis() as u64,
        });
        RunReport {
            run_id,
            result,
            released,
            duration,
        }
    }

    /// Validate inputs and acquire the credential.
    async fn prepare(&self, request: &PipelineRequest) -> std::result::Result<EngineGateway, StageFailure> {
        self.stage(Stage::Validate, async {
            self.config.validate()?;
            request.validate()
        })
        .await?;

        let session = Session::new(self.transport.clone());
        let credential = self
            .stage(Stage::Authenticate, session.acquire_for(&self.config))
            .await?;

        Ok(EngineGateway::new(
            self.transport.clone(),
            &self.config,
            credential,
        ))
    }

    async fn drive(
        &self,
        gateway: &EngineGateway,
        request: &PipelineRequest,
        ledger: &ResourceLedger,
    ) -> std::result::Result<(), StageFailure> {
        let poller = JobPoller::new(gateway.clone(), PollBackoff::from_config(&self.config))
            .with_deadline(self.config.job_deadline)
            .with_cancellation(self.cancel.child_token())
            .with_observer(Arc::new(self.events.clone()));

        let graph = self
            .stage(Stage::Load, self.load(gateway, &poller, request, ledger))
            .await?;
        let mapping = self
            .stage(
                Stage::Compute,
                self.compute(gateway, &poller, request, graph, ledger),
            )
            .await?;
        self.stage(
            Stage::Store,
            self.store(gateway, &poller, request, &mapping, ledger),
        )
        .await
    }

    /// Run one forward stage with logging and events around it.
    async fn stage<T, F>(&self, stage: Stage, work: F) -> std::result::Result<T, StageFailure>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            let error = GaeError::Other(format!("run cancelled before {stage} stage"));
            tracing::warn!(stage = %stage, "Run cancelled; skipping stage");
            self.events.emit(PipelineEvent::StageFailed {
                stage,
                error: error.to_string(),
            });
            return Err(StageFailure { stage, error });
        }

        tracing::info!(stage = %stage, "Stage started");
        self.events.emit(PipelineEvent::StageStarted { stage });
        let started = Instant::now();

        match work.await {
            Ok(value) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                tracing::info!(stage = %stage, duration_ms, "Stage completed");
                self.events
                    .emit(PipelineEvent::StageCompleted { stage, duration_ms });
                Ok(value)
            }
            Err(error) => {
                tracing::error!(stage = %stage, error = %error, "Stage failed");
                self.events.emit(PipelineEvent::StageFailed {
                    stage,
                    error: error.to_string(),
                });
                Err(StageFailure { stage, error })
            }
        }
    }

    async fn register(&self, ledger: &ResourceLedger, job: &JobHandle) {
        ledger.register_job(job.clone()).await;
        self.events
            .emit(PipelineEvent::JobSubmitted { job: job.clone() });
    }

    async fn wait(&self, poller: &JobPoller, job: &JobHandle) -> Result<u32> {
        let polls = poller.await_completion(job).await?;
        self.events.emit(PipelineEvent::JobCompleted {
            job: job.clone(),
            polls,
        });
        Ok(polls)
    }

    async fn load(
        &self,
        gateway: &EngineGateway,
        poller: &JobPoller,
        request: &PipelineRequest,
        ledger: &ResourceLedger,
    ) -> Result<GraphHandle> {
        let body = payload::load_body(request, gateway.naming());
        let submission = gateway.submit_raw(LOAD_PATH, body).await?;

        let job = submission.job(JobKind::Load)?;
        self.register(ledger, &job).await;
        let graph = submission.graph()?;
        tracing::info!(job_id = %job.id, graph_id = graph.id, "Load submitted");

        // The graph only exists on the engine once its load job completes.
        self.wait(poller, &job).await?;
        ledger.register_graph(graph).await;
        Ok(graph)
    }

    async fn compute(
        &self,
        gateway: &EngineGateway,
        poller: &JobPoller,
        request: &PipelineRequest,
        graph: GraphHandle,
        ledger: &ResourceLedger,
    ) -> Result<ResultMapping> {
        let mut submitted = Vec::with_capacity(request.algorithms.len());
        let mut first_error = None;

        for spec in &request.algorithms {
            let body = payload::algorithm_body(&graph, spec, gateway.naming());
            let kind = JobKind::Algorithm(spec.name.clone());
            match gateway.submit(&spec.path(), kind, body).await {
                Ok(job) => {
                    self.register(ledger, &job).await;
                    submitted.push((job, spec));
                }
                Err(error) => {
                    tracing::error!(
                        algorithm = %spec.name,
                        error = %error,
                        "Algorithm submission failed; no further submissions"
                    );
                    first_error = Some(error);
                    break;
                }
            }
        }

        // Already-submitted jobs are awaited even after a submission failure.
        let jobs = submitted.iter().map(|(job, _)| job.clone()).collect();
        let results = poller.await_all(jobs).await;

        let mut mapping = ResultMapping::new();
        for ((job, spec), (_, result)) in submitted.iter().zip(results) {
            match result {
                Ok(polls) => {
                    self.events.emit(PipelineEvent::JobCompleted {
                        job: job.clone(),
                        polls,
                    });
                    mapping.push(job, spec.attribute_name());
                }
                Err(error) => {
                    tracing::warn!(job_id = %job.id, algorithm = %spec.name, error = %error, "Algorithm job did not complete");
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(mapping),
        }
    }

    async fn store(
        &self,
        gateway: &EngineGateway,
        poller: &JobPoller,
        request: &PipelineRequest,
        mapping: &ResultMapping,
        ledger: &ResourceLedger,
    ) -> Result<()> {
        let body = payload::store_body(request, mapping, gateway.naming());
        let job = gateway.submit(STORE_PATH, JobKind::Store, body).await?;
        self.register(ledger, &job).await;
        tracing::info!(
            job_id = %job.id,
            target = %request.target_collection,
            attributes = mapping.job_ids().len(),
            "Store submitted"
        );
        self.wait(poller, &job).await?;
        Ok(())
    }

    /// Delete every ledger entry, jobs before the graph, collecting failures.
    ///
    /// Deletions ignore the cancellation token.
    async fn teardown(
        &self,
        gateway: &EngineGateway,
        ledger: &ResourceLedger,
    ) -> (Vec<Resource>, Vec<CleanupFailure>) {
        let pending = ledger.release_order().await;
        tracing::info!(resources = pending.len(), "Cleanup started");
        self.events.emit(PipelineEvent::StageStarted {
            stage: Stage::Cleanup,
        });
        let started = Instant::now();

        let mut released = Vec::with_capacity(pending.len());
        let mut leaked = Vec::new();
        for resource in pending {
            let (kind, id) = (resource.kind(), resource.id());
            match gateway.remove(kind, id).await {
                Ok(()) => {
                    self.events
                        .emit(PipelineEvent::ResourceReleased { kind, id });
                    released.push(resource);
                }
                Err(error) => {
                    tracing::warn!(kind = %kind, id, error = %error, "Failed to delete engine resource");
                    self.events.emit(PipelineEvent::ResourceLeaked {
                        kind,
                        id,
                        error: error.to_string(),
                    });
                    leaked.push(CleanupFailure {
                        kind,
                        id,
                        error: error.to_string(),
                    });
                }
            }
        }

        if leaked.is_empty() {
            let duration_ms = started.elapsed().as_millis() as u64;
            self.events.emit(PipelineEvent::StageCompleted {
                stage: Stage::Cleanup,
                duration_ms,
            });
        } else {
            self.events.emit(PipelineEvent::StageFailed {
                stage: Stage::Cleanup,
                error: GaeError::CleanupError {
                    failures: leaked.clone(),
                }
                .to_string(),
            });
        }
        (released, leaked)
    }
}
