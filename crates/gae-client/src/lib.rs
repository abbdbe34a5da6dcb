//! Client side of the graph analytics engine's job-based REST interface.
//!
//! Provides the `EngineTransport` seam with a reqwest-backed `HttpTransport`,
//! `Session` for bearer credentials, `EngineGateway` for schema-tolerant
//! job/graph operations, and `JobPoller` for completion polling.

mod backoff;
pub mod fields;
mod gateway;
mod poller;
mod session;
mod transport;

pub use backoff::PollBackoff;
pub use gateway::{
    EngineGateway, EngineVersion, GraphSummary, JobFailure, JobStatus, JobSummary, Submission,
};
pub use poller::{JobPoller, NoopObserver, PollOutcome, ProgressObserver};
pub use session::Session;
pub use transport::{EngineRequest, EngineTransport, HttpMethod, HttpTransport, RawResponse};
