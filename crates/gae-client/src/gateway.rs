//! Authenticated create/read/delete operations against engine jobs and graphs.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use gae_types::{
    Credential, EngineConfig, GaeError, GraphHandle, JobHandle, JobId, JobKind, ResourceKind,
    Result, WireNaming,
};

use crate::fields::{self, FieldLookup};
use crate::transport::{EngineRequest, EngineTransport, HttpMethod};

// ---------------------------------------------------------------------------
// Response models
// ---------------------------------------------------------------------------

/// Failure reported by the engine in a job status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobFailure {
    pub code: i64,
    pub message: String,
}

/// One observation of a job's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    pub progress: u64,
    pub total: u64,
    pub failure: Option<JobFailure>,
}

impl JobStatus {
    pub fn is_complete(&self) -> bool {
        self.progress >= self.total
    }

    fn from_body(body: &Value) -> Result<Self> {
        let progress = fields::PROGRESS.u64(body).unwrap_or(0);
        let total = fields::TOTAL.require_u64(body)?;
        let code = fields::ERROR_CODE.i64(body).unwrap_or(0);
        let failed = fields::ERROR_FLAG.bool(body).unwrap_or(code != 0);
        let failure = failed.then(|| JobFailure {
            code,
            message: fields::ERROR_MESSAGE
                .str(body)
                .unwrap_or("engine reported an error")
                .to_string(),
        });
        Ok(Self {
            progress,
            total,
            failure,
        })
    }
}

/// The body of a successful submission; identifiers are read on demand.
#[derive(Debug, Clone)]
pub struct Submission {
    body: Value,
}

impl Submission {
    pub fn job(&self, kind: JobKind) -> Result<JobHandle> {
        let id = fields::JOB_ID.require_u64(&self.body)?;
        Ok(JobHandle::new(id, kind))
    }

    pub fn graph(&self) -> Result<GraphHandle> {
        let id = fields::GRAPH_ID.require_u64(&self.body)?;
        Ok(GraphHandle { id })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineVersion {
    pub version: String,
    pub api_min_version: Option<u64>,
    pub api_max_version: Option<u64>,
}

/// Row of `GET /v1/jobs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub job_id: u64,
    pub graph_id: Option<u64>,
    pub comp_type: Option<String>,
    pub progress: u64,
    pub total: Option<u64>,
    pub failed: bool,
}

/// Row of `GET /v1/graphs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphSummary {
    pub graph_id: u64,
    pub number_of_vertices: Option<u64>,
    pub number_of_edges: Option<u64>,
    pub memory_usage: Option<u64>,
}

const API_MIN: FieldLookup = FieldLookup::new(&["apiMinVersion", "api_min_version"]);
const API_MAX: FieldLookup = FieldLookup::new(&["apiMaxVersion", "api_max_version"]);
const VERSION: FieldLookup = FieldLookup::new(&["version"]);

// ---------------------------------------------------------------------------
// EngineGateway
// ---------------------------------------------------------------------------

/// Issues authenticated calls and normalizes their outcomes.
///
/// Cloning is cheap; clones share the transport and credential, so polling
/// tasks can each hold one.
#[derive(Clone)]
pub struct EngineGateway {
    transport: Arc<dyn EngineTransport>,
    base_url: Arc<str>,
    credential: Credential,
    naming: WireNaming,
}

impl EngineGateway {
    pub fn new(transport: Arc<dyn EngineTransport>, config: &EngineConfig, credential: Credential) -> Self {
        Self {
            transport,
            base_url: Arc::from(config.engine_url.trim_end_matches('/')),
            credential,
            naming: config.wire_naming,
        }
    }

    /// Naming used for request envelope keys.
    pub fn naming(&self) -> WireNaming {
        self.naming
    }

    /// POST `payload` to `path` and return the raw submission body.
    pub async fn submit_raw(&self, path: &str, payload: Value) -> Result<Submission> {
        let body = self.send(HttpMethod::Post, path, Some(payload)).await?;
        Ok(Submission { body })
    }

    /// POST `payload` to `path` and extract the created job.
    pub async fn submit(&self, path: &str, kind: JobKind, payload: Value) -> Result<JobHandle> {
        let job = self.submit_raw(path, payload).await?.job(kind)?;
        tracing::info!(job_id = %job.id, kind = %job.kind, path = %path, "Submitted job");
        Ok(job)
    }

    /// Read the current progress of a job. A missing `progress` field reads as 0.
    pub async fn fetch_status(&self, job_id: JobId) -> Result<JobStatus> {
        let path = format!("{}/{}", ResourceKind::Job.collection_path(), job_id);
        let body = self.send(HttpMethod::Get, &path, None).await?;
        JobStatus::from_body(&body)
    }

    /// Delete a job or graph. Failures are returned to the caller.
    pub async fn remove(&self, kind: ResourceKind, id: u64) -> Result<()> {
        let path = format!("{}/{}", kind.collection_path(), id);
        self.send(HttpMethod::Delete, &path, None).await?;
        tracing::debug!(kind = %kind, id, "Deleted engine resource");
        Ok(())
    }

    pub async fn version(&self) -> Result<EngineVersion> {
        let body = self.send(HttpMethod::Get, "/v1/version", None).await?;
        Ok(EngineVersion {
            version: VERSION.require_str(&body)?.to_string(),
            api_min_version: API_MIN.u64(&body),
            api_max_version: API_MAX.u64(&body),
        })
    }

    pub async fn list_jobs(&self) -> Result<Vec<JobSummary>> {
        let body = self.send(HttpMethod::Get, "/v1/jobs", None).await?;
        list_items(&body)?
            .iter()
            .map(|item| -> Result<JobSummary> {
                Ok(JobSummary {
                    job_id: fields::JOB_ID.require_u64(item)?,
                    graph_id: fields::GRAPH_ID.u64(item),
                    comp_type: fields::COMP_TYPE.str(item).map(String::from),
                    progress: fields::PROGRESS.u64(item).unwrap_or(0),
                    total: fields::TOTAL.u64(item),
                    failed: fields::ERROR_FLAG.bool(item).unwrap_or(false),
                })
            })
            .collect()
    }

    pub async fn list_graphs(&self) -> Result<Vec<GraphSummary>> {
        let body = self.send(HttpMethod::Get, "/v1/graphs", None).await?;
        list_items(&body)?
            .iter()
            .map(|item| -> Result<GraphSummary> {
                Ok(GraphSummary {
                    graph_id: fields::GRAPH_ID.require_u64(item)?,
                    number_of_vertices: fields::VERTEX_COUNT.u64(item),
                    number_of_edges: fields::EDGE_COUNT.u64(item),
                    memory_usage: fields::MEMORY_USAGE.u64(item),
                })
            })
            .collect()
    }

    async fn send(&self, method: HttpMethod, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut request =
            EngineRequest::new(method, url).with_authorization(self.credential.header_value());
        if let Some(body) = body {
            request = request.with_body(body);
        }

        let resp = self.transport.execute(request).await?;
        if !resp.is_success() {
            tracing::warn!(
                method = method.as_str(),
                path = %path,
                status = resp.status,
                "Engine request failed"
            );
            return Err(GaeError::RequestError {
                method: method.as_str().to_string(),
                path: path.to_string(),
                status: resp.status,
                body: resp.body,
            });
        }

        if resp.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&resp.body).unwrap_or(Value::String(resp.body)))
    }
}

/// List endpoints return a bare array on some deployments and a wrapped one
/// on others.
fn list_items(body: &Value) -> Result<&Vec<Value>> {
    const WRAPPERS: FieldLookup = FieldLookup::new(&["result", "jobs", "graphs"]);
    body.as_array()
        .or_else(|| WRAPPERS.find(body).and_then(Value::as_array))
        .ok_or_else(|| GaeError::ResponseShapeError {
            field: "<array>".to_string(),
            body: body.to_string(),
        })
}
