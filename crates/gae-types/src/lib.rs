//! Shared types, errors, request model, and configuration for the graph
//! analytics orchestrator.
//!
//! This crate provides the foundational types used across the other crates:
//! - `GaeError`: unified error taxonomy
//! - `Credential`: bearer token acquired once per run
//! - `JobHandle` / `GraphHandle`: the only engine-side state the client keeps
//! - `PipelineRequest`: full description of one load/compute/store run
//! - `EngineConfig`: explicit per-deployment configuration

mod config;

pub use config::{EngineConfig, WireNaming};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

/// Unified error type for all orchestrator subsystems.
#[derive(Debug, thiserror::Error)]
pub enum GaeError {
    // === Authentication ===
    #[error("Authentication against {endpoint} failed: {message}")]
    AuthError { endpoint: String, message: String },

    // === Engine responses ===
    #[error("Engine returned HTTP {status} for {method} {path}: {body}")]
    RequestError {
        method: String,
        path: String,
        status: u16,
        body: String,
    },

    #[error("Response is missing field '{field}': {body}")]
    ResponseShapeError { field: String, body: String },

    // === Job lifecycle ===
    #[error("Job {job_id} did not complete within {waited_ms}ms")]
    TimedOut { job_id: u64, waited_ms: u64 },

    #[error("Wait for job {job_id} was cancelled")]
    Cancelled { job_id: u64 },

    #[error("Job {job_id} failed on the engine (code {code}): {message}")]
    JobFailed {
        job_id: u64,
        code: i64,
        message: String,
    },

    #[error("Cleanup failed for {} resource(s)", failures.len())]
    CleanupError { failures: Vec<CleanupFailure> },

    // === Generic ===
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl GaeError {
    /// Returns `true` if the error is permanent for the whole run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, GaeError::AuthError { .. } | GaeError::Config(_))
    }

    /// The HTTP status this error corresponds to, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            GaeError::AuthError { .. } => Some(401),
            GaeError::RequestError { status, .. } => Some(*status),
            GaeError::TimedOut { .. } => Some(504),
            GaeError::Config(_) => Some(400),
            _ => None,
        }
    }
}

/// A convenience alias for `Result<T, GaeError>`.
pub type Result<T> = std::result::Result<T, GaeError>;

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// Bearer token plus the moment it was issued.
#[derive(Clone)]
pub struct Credential {
    token: String,
    issued_at: chrono::DateTime<chrono::Utc>,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            issued_at: chrono::Utc::now(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn issued_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.issued_at
    }

    /// Value for the `Authorization` header.
    pub fn header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Engine-side handles
// ---------------------------------------------------------------------------

/// Identifier of an engine job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a job was submitted for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Load,
    Algorithm(String),
    Store,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Load => write!(f, "load"),
            JobKind::Algorithm(name) => write!(f, "algorithm:{name}"),
            JobKind::Store => write!(f, "store"),
        }
    }
}

/// A submitted job. Id and kind are all the client retains.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: JobId,
    pub kind: JobKind,
}

impl JobHandle {
    pub fn new(id: u64, kind: JobKind) -> Self {
        Self { id: JobId(id), kind }
    }
}

/// Identifier of a graph materialized inside the engine by a load job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphHandle {
    pub id: u64,
}

impl fmt::Display for GraphHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Engine resource families that can be deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Job,
    Graph,
}

impl ResourceKind {
    /// Collection path under `/v1`.
    pub fn collection_path(&self) -> &'static str {
        match self {
            ResourceKind::Job => "/v1/jobs",
            ResourceKind::Graph => "/v1/graphs",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Job => write!(f, "job"),
            ResourceKind::Graph => write!(f, "graph"),
        }
    }
}

/// A deletion that did not succeed during teardown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupFailure {
    pub kind: ResourceKind,
    pub id: u64,
    pub error: String,
}

impl fmt::Display for CleanupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.kind, self.id, self.error)
    }
}

// ---------------------------------------------------------------------------
// Stage: pipeline stage names used in outcomes and events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validate,
    Authenticate,
    Load,
    Compute,
    Store,
    Cleanup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Validate => "validate",
            Stage::Authenticate => "authenticate",
            Stage::Load => "load",
            Stage::Compute => "compute",
            Stage::Store => "store",
            Stage::Cleanup => "cleanup",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// AlgorithmSpec / PipelineRequest
// ---------------------------------------------------------------------------

/// One algorithm to run against the loaded graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmSpec {
    /// Engine operation name, e.g. `wcc`, `pagerank`, `labelpropagation`.
    pub name: String,
    /// Algorithm-specific parameters, sent verbatim next to the graph id.
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    /// Output attribute; defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl AlgorithmSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: serde_json::Map::new(),
            attribute: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Name the results are materialized under when stored.
    pub fn attribute_name(&self) -> &str {
        self.attribute.as_deref().unwrap_or(&self.name)
    }

    /// Submission path for this algorithm.
    pub fn path(&self) -> String {
        format!("/v1/{}", self.name)
    }
}

/// Parallelism and batch-size hints forwarded to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchHints {
    pub parallelism: u32,
    pub batch_size: u64,
}

impl BatchHints {
    pub fn load_defaults() -> Self {
        Self {
            parallelism: 10,
            batch_size: 4_000_000,
        }
    }

    pub fn store_defaults() -> Self {
        Self {
            parallelism: 4,
            batch_size: 10_000,
        }
    }
}

fn default_vertex_attributes() -> Vec<String> {
    vec!["_id".to_string()]
}

/// Full description of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub database: String,
    /// Named graph the engine resolves into collections. Excludes the
    /// explicit collection lists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_name: Option<String>,
    #[serde(default)]
    pub vertex_collections: Vec<String>,
    #[serde(default)]
    pub edge_collections: Vec<String>,
    #[serde(default = "default_vertex_attributes")]
    pub vertex_attributes: Vec<String>,
    pub algorithms: Vec<AlgorithmSpec>,
    pub target_collection: String,
    #[serde(default = "BatchHints::load_defaults")]
    pub load: BatchHints,
    #[serde(default = "BatchHints::store_defaults")]
    pub store: BatchHints,
    /// Per vertex collection, the attributes copied next to the results.
    #[serde(default)]
    pub store_vertex_attributes: BTreeMap<String, Vec<String>>,
}

impl PipelineRequest {
    pub fn new(database: impl Into<String>, target_collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            graph_name: None,
            vertex_collections: Vec::new(),
            edge_collections: Vec::new(),
            vertex_attributes: default_vertex_attributes(),
            algorithms: Vec::new(),
            target_collection: target_collection.into(),
            load: BatchHints::load_defaults(),
            store: BatchHints::store_defaults(),
            store_vertex_attributes: BTreeMap::new(),
        }
    }

    pub fn with_graph_name(mut self, name: impl Into<String>) -> Self {
        self.graph_name = Some(name.into());
        self
    }

    pub fn with_vertex_collection(mut self, name: impl Into<String>) -> Self {
        self.vertex_collections.push(name.into());
        self
    }

    pub fn with_edge_collection(mut self, name: impl Into<String>) -> Self {
        self.edge_collections.push(name.into());
        self
    }

    pub fn with_algorithm(mut self, spec: AlgorithmSpec) -> Self {
        self.algorithms.push(spec);
        self
    }

    /// Reject requests the engine would refuse or that would clobber results.
    pub fn validate(&self) -> Result<()> {
        if self.database.trim().is_empty() {
            return Err(GaeError::Config("database must not be empty".into()));
        }
        let named = self
            .graph_name
            .as_deref()
            .is_some_and(|name| !name.trim().is_empty());
        let no_collections = self.vertex_collections.is_empty() && self.edge_collections.is_empty();
        let both_collections =
            !self.vertex_collections.is_empty() && !self.edge_collections.is_empty();
        let graph_ok = if named { no_collections } else { both_collections };
        if !graph_ok {
            return Err(GaeError::Config(
                "Either specify the graph_name or ensure that vertex_collections and edge_collections are not empty".into(),
            ));
        }
        if self.target_collection.trim().is_empty() {
            return Err(GaeError::Config("target collection must not be empty".into()));
        }
        if self.algorithms.is_empty() {
            return Err(GaeError::Config("at least one algorithm is required".into()));
        }
        let mut seen = HashSet::new();
        for spec in &self.algorithms {
            if spec.name.trim().is_empty() || spec.name.contains('/') {
                return Err(GaeError::Config(format!(
                    "invalid algorithm name '{}'",
                    spec.name
                )));
            }
            if !seen.insert(spec.attribute_name()) {
                return Err(GaeError::Config(format!(
                    "attribute '{}' is produced by more than one algorithm",
                    spec.attribute_name()
                )));
            }
        }
        if self.load.parallelism == 0 || self.store.parallelism == 0 {
            return Err(GaeError::Config("parallelism must be positive".into()));
        }
        Ok(())
    }

    /// Read a request from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let request: Self = serde_json::from_str(&data)?;
        tracing::debug!(
            path = %path.display(),
            algorithms = request.algorithms.len(),
            "Loaded pipeline request"
        );
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> PipelineRequest {
        PipelineRequest::new("d", "out")
            .with_vertex_collection("V")
            .with_edge_collection("E")
            .with_algorithm(AlgorithmSpec::new("wcc"))
    }

    #[test]
    fn error_display_request_error() {
        let err = GaeError::RequestError {
            method: "POST".into(),
            path: "/v1/wcc".into(),
            status: 500,
            body: "boom".into(),
        };
        assert_eq!(
            err.to_string(),
            "Engine returned HTTP 500 for POST /v1/wcc: boom"
        );
    }

    #[test]
    fn error_display_shape_error() {
        let err = GaeError::ResponseShapeError {
            field: "job_id".into(),
            body: "{}".into(),
        };
        assert_eq!(err.to_string(), "Response is missing field 'job_id': {}");
    }

    #[test]
    fn error_display_cleanup_counts_failures() {
        let err = GaeError::CleanupError {
            failures: vec![
                CleanupFailure {
                    kind: ResourceKind::Job,
                    id: 1,
                    error: "x".into(),
                },
                CleanupFailure {
                    kind: ResourceKind::Graph,
                    id: 2,
                    error: "y".into(),
                },
            ],
        };
        assert_eq!(err.to_string(), "Cleanup failed for 2 resource(s)");
    }

    #[test]
    fn error_display_timed_out() {
        let err = GaeError::TimedOut {
            job_id: 7,
            waited_ms: 1500,
        };
        assert_eq!(err.to_string(), "Job 7 did not complete within 1500ms");
    }

    #[test]
    fn terminal_errors() {
        assert!(GaeError::AuthError {
            endpoint: "x".into(),
            message: "denied".into()
        }
        .is_terminal());
        assert!(GaeError::Config("bad".into()).is_terminal());
        assert!(!GaeError::Cancelled { job_id: 1 }.is_terminal());
    }

    #[test]
    fn http_status_mapping() {
        let err = GaeError::RequestError {
            method: "GET".into(),
            path: "/v1/jobs/1".into(),
            status: 404,
            body: String::new(),
        };
        assert_eq!(err.http_status(), Some(404));
        assert_eq!(
            GaeError::TimedOut {
                job_id: 1,
                waited_ms: 0
            }
            .http_status(),
            Some(504)
        );
        assert_eq!(GaeError::Other("x".into()).http_status(), None);
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: GaeError = json_err.into();
        assert!(matches!(err, GaeError::Json(_)));
    }

    #[test]
    fn credential_header_and_redacted_debug() {
        let cred = Credential::new("secret-token");
        assert_eq!(cred.header_value(), "Bearer secret-token");
        let dbg = format!("{cred:?}");
        assert!(!dbg.contains("secret-token"));
        assert!(dbg.contains("<redacted>"));
        assert!(cred.issued_at() <= chrono::Utc::now());
    }

    #[test]
    fn job_kind_display() {
        assert_eq!(JobKind::Load.to_string(), "load");
        assert_eq!(JobKind::Algorithm("wcc".into()).to_string(), "algorithm:wcc");
        assert_eq!(JobKind::Store.to_string(), "store");
    }

    #[test]
    fn stage_serializes_to_snake_case() {
        assert_eq!(serde_json::to_string(&Stage::Compute).unwrap(), "\"compute\"");
        assert_eq!(Stage::Authenticate.to_string(), "authenticate");
    }

    #[test]
    fn resource_paths() {
        assert_eq!(ResourceKind::Job.collection_path(), "/v1/jobs");
        assert_eq!(ResourceKind::Graph.collection_path(), "/v1/graphs");
    }

    #[test]
    fn attribute_defaults_to_algorithm_name() {
        let spec = AlgorithmSpec::new("irank");
        assert_eq!(spec.attribute_name(), "irank");
        assert_eq!(spec.path(), "/v1/irank");
        let spec = spec.with_attribute("rank");
        assert_eq!(spec.attribute_name(), "rank");
    }

    #[test]
    fn validate_accepts_minimal_request() {
        assert!(sample_request().validate().is_ok());
    }

    #[test]
    fn validate_rejects_duplicate_attributes() {
        let req = sample_request().with_algorithm(AlgorithmSpec::new("scc").with_attribute("wcc"));
        let err = req.validate().unwrap_err();
        assert!(matches!(err, GaeError::Config(msg) if msg.contains("'wcc'")));
    }

    #[test]
    fn validate_accepts_graph_name_alone() {
        let req = PipelineRequest::new("d", "out")
            .with_graph_name("social")
            .with_algorithm(AlgorithmSpec::new("wcc"));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn validate_requires_graph_name_or_both_collection_lists() {
        let only_vertices = PipelineRequest::new("d", "out")
            .with_vertex_collection("V")
            .with_algorithm(AlgorithmSpec::new("wcc"));
        let err = only_vertices.validate().unwrap_err();
        assert!(matches!(err, GaeError::Config(msg) if msg.contains("graph_name")));

        let neither = PipelineRequest::new("d", "out").with_algorithm(AlgorithmSpec::new("wcc"));
        assert!(neither.validate().is_err());

        let blank_name = PipelineRequest::new("d", "out")
            .with_graph_name("  ")
            .with_algorithm(AlgorithmSpec::new("wcc"));
        assert!(blank_name.validate().is_err());
    }

    #[test]
    fn validate_rejects_graph_name_with_collections() {
        let req = sample_request().with_graph_name("social");
        assert!(req.validate().is_err());

        let partial = PipelineRequest::new("d", "out")
            .with_graph_name("social")
            .with_edge_collection("E")
            .with_algorithm(AlgorithmSpec::new("wcc"));
        assert!(partial.validate().is_err());
    }

    #[test]
    fn validate_rejects_missing_algorithms() {
        let mut req = sample_request();
        req.algorithms.clear();
        assert!(req.validate().is_err());
    }

    #[test]
    fn validate_rejects_path_like_algorithm_name() {
        let req = sample_request().with_algorithm(AlgorithmSpec::new("jobs/1"));
        assert!(req.validate().is_err());
    }

    #[test]
    fn request_defaults_from_json() {
        let req: PipelineRequest = serde_json::from_str(
            r#"{
                "database": "d",
                "vertex_collections": ["V"],
                "edge_collections": ["E"],
                "algorithms": [{"name": "wcc"}],
                "target_collection": "out"
            }"#,
        )
        .unwrap();
        assert_eq!(req.vertex_attributes, vec!["_id".to_string()]);
        assert_eq!(req.load, BatchHints::load_defaults());
        assert_eq!(req.store, BatchHints::store_defaults());
        assert!(req.algorithms[0].params.is_empty());
        assert!(req.store_vertex_attributes.is_empty());
        assert!(req.graph_name.is_none());
    }

    #[test]
    fn request_with_graph_name_from_json() {
        let req: PipelineRequest = serde_json::from_str(
            r#"{
                "database": "d",
                "graph_name": "social",
                "algorithms": [{"name": "wcc"}],
                "target_collection": "out"
            }"#,
        )
        .unwrap();
        assert_eq!(req.graph_name.as_deref(), Some("social"));
        assert!(req.vertex_collections.is_empty());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn request_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request.json");
        let req = sample_request().with_algorithm(
            AlgorithmSpec::new("pagerank").with_param("damping_factor", serde_json::json!(0.85)),
        );
        std::fs::write(&path, serde_json::to_string_pretty(&req).unwrap()).unwrap();

        let loaded = PipelineRequest::load(&path).unwrap();
        assert_eq!(loaded, req);
    }

    #[test]
    fn request_load_missing_file_is_io_error() {
        let err = PipelineRequest::load(Path::new("/nonexistent/request.json")).unwrap_err();
        assert!(matches!(err, GaeError::Io(_)));
    }
}
