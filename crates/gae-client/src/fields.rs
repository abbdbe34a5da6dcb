//! Tolerant field access for engine responses.
//!
//! Engine deployments have shipped both `job_id` and `jobId` style field
//! names. Each [`FieldLookup`] is an ordered list of candidate names; the first
//! one present wins, so the rest of the client sees one stable shape.

use serde_json::Value;

use gae_types::{GaeError, Result};

/// Ordered candidate names for one logical response field.
#[derive(Debug, Clone, Copy)]
pub struct FieldLookup {
    candidates: &'static [&'static str],
}

pub const JOB_ID: FieldLookup = FieldLookup::new(&["job_id", "jobId"]);
pub const GRAPH_ID: FieldLookup = FieldLookup::new(&["graph_id", "graphId"]);
pub const TOKEN: FieldLookup = FieldLookup::new(&["jwt", "token"]);
pub const PROGRESS: FieldLookup = FieldLookup::new(&["progress"]);
pub const TOTAL: FieldLookup = FieldLookup::new(&["total"]);
pub const ERROR_FLAG: FieldLookup = FieldLookup::new(&["error"]);
pub const ERROR_CODE: FieldLookup = FieldLookup::new(&["error_code", "errorCode"]);
pub const ERROR_MESSAGE: FieldLookup = FieldLookup::new(&["error_message", "errorMessage"]);
pub const COMP_TYPE: FieldLookup = FieldLookup::new(&["comp_type", "compType"]);
pub const VERTEX_COUNT: FieldLookup = FieldLookup::new(&["number_of_vertices", "numberOfVertices"]);
pub const EDGE_COUNT: FieldLookup = FieldLookup::new(&["number_of_edges", "numberOfEdges"]);
pub const MEMORY_USAGE: FieldLookup = FieldLookup::new(&["memory_usage", "memoryUsage"]);

impl FieldLookup {
    pub const fn new(candidates: &'static [&'static str]) -> Self {
        Self { candidates }
    }

    /// Name reported in shape errors.
    pub fn canonical(&self) -> &'static str {
        self.candidates.first().copied().unwrap_or("<unnamed>")
    }

    /// First non-null candidate present in `body`.
    pub fn find<'a>(&self, body: &'a Value) -> Option<&'a Value> {
        self.candidates
            .iter()
            .filter_map(|name| body.get(*name))
            .find(|v| !v.is_null())
    }

    /// Unsigned integer, accepting JSON numbers and numeric strings.
    pub fn u64(&self, body: &Value) -> Option<u64> {
        self.find(body).and_then(as_u64)
    }

    pub fn i64(&self, body: &Value) -> Option<i64> {
        self.find(body).and_then(|v| {
            v.as_i64()
                .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
        })
    }

    pub fn str<'a>(&self, body: &'a Value) -> Option<&'a str> {
        self.find(body).and_then(Value::as_str)
    }

    pub fn bool(&self, body: &Value) -> Option<bool> {
        self.find(body).and_then(Value::as_bool)
    }

    pub fn require_u64(&self, body: &Value) -> Result<u64> {
        self.u64(body).ok_or_else(|| self.missing(body))
    }

    pub fn require_str<'a>(&self, body: &'a Value) -> Result<&'a str> {
        self.str(body).ok_or_else(|| self.missing(body))
    }

    fn missing(&self, body: &Value) -> GaeError {
        GaeError::ResponseShapeError {
            field: self.canonical().to_string(),
            body: body.to_string(),
        }
    }
}

fn as_u64(v: &Value) -> Option<u64> {
    if let Some(n) = v.as_u64() {
        return Some(n);
    }
    if let Some(s) = v.as_str() {
        return s.trim().parse().ok();
    }
    // Some engines report counters as floats.
    v.as_f64()
        .filter(|f| *f >= 0.0 && f.fract() == 0.0)
        .map(|f| f as u64)
}
