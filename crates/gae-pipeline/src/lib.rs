//! Load, compute, store, and cleanup orchestration for the graph analytics
//! engine.
//!
//! [`PipelineRunner`] sequences the stages of one run, fanning algorithm jobs
//! out over a shared loaded graph and rejoining them before the store. Every
//! job is recorded in a [`ResourceLedger`] at submission time, the graph once
//! it has loaded, and all of them are released on every exit path.

pub mod engine;
pub mod events;
pub mod ledger;
pub mod mapping;
pub mod payload;

pub use engine::{PipelineResult, PipelineRunner, RunReport, StageFailure};
pub use events::{EventEmitter, PipelineEvent};
pub use ledger::{Resource, ResourceLedger};
pub use mapping::ResultMapping;
