use serde_json::json;
use shortline::{ErrorCode, PipelineError};
use thiserror::Error;

use crate::output::CommandError;

#[derive(Debug, Error)]
pub enum CliError {
	#[error(transparent)]
	Pipeline(#[from] PipelineError),

	#[error("{0:#}")]
	Config(#[from] anyhow::Error),

	#[error("{0}")]
	InvalidInput(String),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl From<shortline::runtime::Error> for CliError {
	fn from(err: shortline::runtime::Error) -> Self {
		CliError::Pipeline(err.into())
	}
}

impl CliError {
	pub fn code(&self) -> ErrorCode {
		match self {
			CliError::Pipeline(err) => err.code(),
			CliError::Config(_) => ErrorCode::ConfigError,
			CliError::InvalidInput(_) => ErrorCode::InvalidInput,
			CliError::Json(_) => ErrorCode::JsonError,
		}
	}

	/// Envelope form, with the stage outcome attached to job failures.
	pub fn to_command_error(&self) -> CommandError {
		let error = CommandError::new(self.code(), self.to_string());
		match self {
			CliError::Pipeline(PipelineError::JobFailure { result, .. }) => error.with_details(json!({
				"stage": result.stage,
				"job": result.job,
				"status": result.status,
				"markerLine": result.marker_line,
				"logs": result.logs,
			})),
			CliError::Pipeline(PipelineError::UpstreamFailed { pipeline }) => error.with_details(json!({ "upstream": pipeline })),
			_ => error,
		}
	}
}

pub type Result<T> = std::result::Result<T, CliError>;
