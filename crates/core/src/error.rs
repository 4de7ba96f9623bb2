//! Pipeline-level errors and their stable codes.

use std::fmt;

use serde::{Deserialize, Serialize};
use shortline_runtime::TerminalStatus;
use thiserror::Error;

use crate::orchestrator::StageResult;

/// Errors that abort a stage or a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
	/// Lifecycle failure raised by the runtime crate.
	#[error(transparent)]
	Runtime(#[from] shortline_runtime::Error),

	#[error("stage {stage} failed (job {job}, status {status})")]
	JobFailure {
		stage: String,
		job: String,
		status: TerminalStatus,
		result: Box<StageResult>,
	},

	#[error("upstream pipeline {pipeline} is marked FAILED")]
	UpstreamFailed { pipeline: String },

	#[error("completion hook for stage {stage} failed: {reason}")]
	Hook { stage: String, reason: String },

	#[error("signal store error: {0}")]
	Store(String),

	#[error("configuration error: {0}")]
	Config(String),

	#[error("unknown stage: {0}")]
	UnknownStage(String),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl PipelineError {
	pub fn code(&self) -> ErrorCode {
		use shortline_runtime::Error as Runtime;

		match self {
			PipelineError::Runtime(err) => match err {
				Runtime::ClusterUnreachable { .. } => ErrorCode::ClusterUnreachable,
				Runtime::SessionCreate { .. } => ErrorCode::SessionCreateFailed,
				Runtime::Timeout { .. } => ErrorCode::Timeout,
				Runtime::Submission { .. } => ErrorCode::SubmissionFailed,
				Runtime::Cleanup { .. } => ErrorCode::CleanupFailed,
				Runtime::Cancelled => ErrorCode::Cancelled,
				Runtime::Status { .. } | Runtime::Http(_) | Runtime::Url(_) => ErrorCode::HttpError,
				Runtime::Json(_) => ErrorCode::JsonError,
				Runtime::Io(_) => ErrorCode::IoError,
			},
			PipelineError::JobFailure { .. } => ErrorCode::JobFailed,
			PipelineError::UpstreamFailed { .. } => ErrorCode::UpstreamFailed,
			PipelineError::Hook { .. } => ErrorCode::HookFailed,
			PipelineError::Store(_) => ErrorCode::StoreError,
			PipelineError::Config(_) | PipelineError::UnknownStage(_) => ErrorCode::ConfigError,
			PipelineError::Io(_) => ErrorCode::IoError,
			PipelineError::Json(_) => ErrorCode::JsonError,
		}
	}

	/// Whether the run was stopped by a cancellation request.
	pub fn is_cancelled(&self) -> bool {
		matches!(self, PipelineError::Runtime(shortline_runtime::Error::Cancelled))
	}
}

/// Stable error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	ClusterUnreachable,
	SessionCreateFailed,
	Timeout,
	SubmissionFailed,
	JobFailed,
	CleanupFailed,
	UpstreamFailed,
	Cancelled,
	HookFailed,
	StoreError,
	ConfigError,
	HttpError,
	IoError,
	JsonError,
	InvalidInput,
}

impl fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let code = match self {
			ErrorCode::ClusterUnreachable => "CLUSTER_UNREACHABLE",
			ErrorCode::SessionCreateFailed => "SESSION_CREATE_FAILED",
			ErrorCode::Timeout => "TIMEOUT",
			ErrorCode::SubmissionFailed => "SUBMISSION_FAILED",
			ErrorCode::JobFailed => "JOB_FAILED",
			ErrorCode::CleanupFailed => "CLEANUP_FAILED",
			ErrorCode::UpstreamFailed => "UPSTREAM_FAILED",
			ErrorCode::Cancelled => "CANCELLED",
			ErrorCode::HookFailed => "HOOK_FAILED",
			ErrorCode::StoreError => "STORE_ERROR",
			ErrorCode::ConfigError => "CONFIG_ERROR",
			ErrorCode::HttpError => "HTTP_ERROR",
			ErrorCode::IoError => "IO_ERROR",
			ErrorCode::JsonError => "JSON_ERROR",
			ErrorCode::InvalidInput => "INVALID_INPUT",
		};
		f.write_str(code)
	}
}

pub type Result<T> = std::result::Result<T, PipelineError>;
