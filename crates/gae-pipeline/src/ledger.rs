//! Append-only record of engine resources owed a deletion call.
//!
//! Jobs are added the moment a submission returns their id, not when they
//! complete. A graph is added once its load job has completed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use gae_types::{GraphHandle, JobHandle, ResourceKind};

/// A job or graph that must be released.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Resource {
    Job(JobHandle),
    Graph(GraphHandle),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Job(_) => ResourceKind::Job,
            Resource::Graph(_) => ResourceKind::Graph,
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            Resource::Job(job) => job.id.0,
            Resource::Graph(graph) => graph.id,
        }
    }
}

/// Thread-safe, append-only resource ledger.
///
/// Cloning yields another handle to the **same** entries, so concurrent
/// submission paths can register into one ledger.
#[derive(Clone, Default)]
pub struct ResourceLedger {
    entries: Arc<tokio::sync::Mutex<Vec<Resource>>>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_job(&self, job: JobHandle) {
        tracing::debug!(job_id = %job.id, kind = %job.kind, "Registered job for cleanup");
        self.entries.lock().await.push(Resource::Job(job));
    }

    pub async fn register_graph(&self, graph: GraphHandle) {
        tracing::debug!(graph_id = graph.id, "Registered graph for cleanup");
        self.entries.lock().await.push(Resource::Graph(graph));
    }

    /// Entries in release order: jobs first, in registration order, then graphs.
    ///
    /// Jobs reference the graph they ran on, so the graph goes last.
    pub async fn release_order(&self) -> Vec<Resource> {
        let entries = self.entries.lock().await;
        let (mut jobs, graphs): (Vec<Resource>, Vec<Resource>) = entries
            .iter()
            .cloned()
            .partition(|r| r.kind() == ResourceKind::Job);
        jobs.extend(graphs);
        jobs
    }
}
