//! Pipeline event system for observability.
//!
//! Emits [`PipelineEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! external observers (loggers, progress bars, reports) can follow a run
//! without coupling to the runner internals. The emitter doubles as the
//! job poller's progress observer.

use serde::{Deserialize, Serialize};

use gae_client::ProgressObserver;
use gae_types::{JobHandle, ResourceKind, Stage};

/// Events emitted during a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    RunStarted {
        run_id: String,
        database: String,
        algorithms: Vec<String>,
    },
    StageStarted {
        stage: Stage,
    },
    StageCompleted {
        stage: Stage,
        duration_ms: u64,
    },
    StageFailed {
        stage: Stage,
        error: String,
    },
    JobSubmitted {
        job: JobHandle,
    },
    JobProgress {
        job: JobHandle,
        progress: u64,
        total: u64,
    },
    JobCompleted {
        job: JobHandle,
        polls: u32,
    },
    ResourceReleased {
        kind: ResourceKind,
        id: u64,
    },
    ResourceLeaked {
        kind: ResourceKind,
        id: u64,
        error: String,
    },
    RunFinished {
        run_id: String,
        outcome: String,
        duration_ms: u64,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<PipelineEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ProgressObserver for EventEmitter {
    fn on_progress(&self, job: &JobHandle, progress: u64, total: u64) {
        self.emit(PipelineEvent::JobProgress {
            job: job.clone(),
            progress,
            total,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gae_types::JobKind;

    #[tokio::test]
    async fn emitter_sends_and_receives() {
        let emitter = EventEmitter::new(16);
        let mut rx = emitter.subscribe();

        emitter.emit(PipelineEvent::StageStarted { stage: Stage::Load });

        match rx.recv().await.unwrap() {
            PipelineEvent::StageStarted { stage } => assert_eq!(stage, Stage::Load),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn progress_observer_publishes_job_progress() {
        let emitter = EventEmitter::new(16);
        let mut rx = emitter.subscribe();
        let observer: &dyn ProgressObserver = &emitter;

        observer.on_progress(&JobHandle::new(3, JobKind::Load), 40, 100);

        match rx.recv().await.unwrap() {
            PipelineEvent::JobProgress {
                job,
                progress,
                total,
            } => {
                assert_eq!(job.id.0, 3);
                assert_eq!(progress, 40);
                assert_eq!(total, 100);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn emit_with_no_subscribers_does_not_panic() {
        let emitter = EventEmitter::new(16);
        emitter.emit(PipelineEvent::StageFailed {
            stage: Stage::Compute,
            error: "something went wrong".into(),
        });
    }

    #[test]
    fn leaked_resource_serializes_kind() {
        let event = PipelineEvent::ResourceLeaked {
            kind: ResourceKind::Graph,
            id: 8,
            error: "busy".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["ResourceLeaked"]["kind"], "graph");
        assert_eq!(json["ResourceLeaked"]["id"], 8);
    }
}
