// shortline: runs dependent Spark stages on a transient cluster and publishes
// each pipeline's outcome for the pipelines that depend on it.

pub mod config;
pub mod error;
pub mod hooks;
pub mod orchestrator;
pub mod pipeline;
pub mod sensors;
pub mod signals;

pub use config::Config;
pub use error::{ErrorCode, PipelineError, Result};
pub use hooks::{CompletionHook, HttpObjectAcl, ObjectAcl, PublishArtifact, artifact_location};
pub use orchestrator::{Orchestrator, PipelineReport, RunOptions, Settings, StageResult};
pub use pipeline::{COMBINE_PIPELINE, PipelineDefinition, StageDefinition, combine_pipeline};
pub use sensors::{Expectation, await_signals};
pub use shortline_runtime as runtime;
pub use signals::{CLUSTER_ID_KEY, JsonFileStore, MemoryStore, PipelineState, SignalStore, state_key};
