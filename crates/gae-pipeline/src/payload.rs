//! Request bodies for the load, algorithm, and store submissions.
//!
//! Envelope keys follow the configured [`WireNaming`], except the graph
//! selection keys of the load body, which camel-case deployments still read
//! in snake case. Algorithm parameters are passed through untouched.

use serde_json::{json, Map, Value};

use gae_types::{AlgorithmSpec, GraphHandle, PipelineRequest, WireNaming};

use crate::mapping::ResultMapping;

pub const LOAD_PATH: &str = "/v1/loaddata";
pub const STORE_PATH: &str = "/v1/storeresults";

struct Envelope {
    naming: WireNaming,
    fields: Map<String, Value>,
}

impl Envelope {
    fn new(naming: WireNaming) -> Self {
        Self {
            naming,
            fields: Map::new(),
        }
    }

    fn from_params(naming: WireNaming, params: &Map<String, Value>) -> Self {
        Self {
            naming,
            fields: params.clone(),
        }
    }

    fn put(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(self.naming.key(key).into_owned(), value);
        self
    }

    /// Insert `key` verbatim, whatever the naming.
    fn put_raw(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    fn put_nonempty(self, key: &str, values: &[String]) -> Self {
        if values.is_empty() {
            self
        } else {
            self.put_raw(key, json!(values))
        }
    }

    fn finish(self) -> Value {
        Value::Object(self.fields)
    }
}

pub fn load_body(request: &PipelineRequest, naming: WireNaming) -> Value {
    let mut envelope = Envelope::new(naming).put_raw("database", json!(request.database));
    if let Some(name) = &request.graph_name {
        envelope = envelope.put_raw("graph_name", json!(name));
    }
    envelope
        .put_nonempty("vertex_collections", &request.vertex_collections)
        .put_raw("vertex_attributes", json!(request.vertex_attributes))
        .put_nonempty("edge_collections", &request.edge_collections)
        .put("parallelism", json!(request.load.parallelism))
        .put("batch_size", json!(request.load.batch_size))
        .finish()
}

pub fn algorithm_body(graph: &GraphHandle, spec: &AlgorithmSpec, naming: WireNaming) -> Value {
    Envelope::from_params(naming, &spec.params)
        .put("graph_id", json!(graph.id))
        .finish()
}

pub fn store_body(request: &PipelineRequest, mapping: &ResultMapping, naming: WireNaming) -> Value {
    Envelope::new(naming)
        .put("job_ids", json!(mapping.job_ids()))
        .put("attribute_names", json!(mapping.attribute_names()))
        .put("vertex_collections", json!(request.store_vertex_attributes))
        .put("database", json!(request.database))
        .put("target_collection", json!(request.target_collection))
        .put("parallelism", json!(request.store.parallelism))
        .put("batch_size", json!(request.store.batch_size))
        .finish()
}
