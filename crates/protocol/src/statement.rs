//! Statement (job) payloads.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::SessionKind;

/// Statement identifier, unique within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatementId(pub u64);

impl fmt::Display for StatementId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Statement execution state as reported by the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementState {
	Waiting,
	Running,
	Available,
	Error,
	Cancelling,
	Cancelled,
	#[serde(other)]
	Unknown,
}

/// Result status carried in a finished statement's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStatus {
	Ok,
	Error,
	#[serde(other)]
	Unknown,
}

/// Output block of a finished statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementOutput {
	pub status: OutputStatus,
	#[serde(default)]
	pub execution_count: Option<u64>,
	#[serde(default)]
	pub data: Option<Value>,
	#[serde(default)]
	pub ename: Option<String>,
	#[serde(default)]
	pub evalue: Option<String>,
	#[serde(default)]
	pub traceback: Vec<String>,
}

/// `GET /sessions/{id}/statements/{sid}` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
	pub id: StatementId,
	pub state: StatementState,
	#[serde(default)]
	pub code: Option<String>,
	#[serde(default)]
	pub output: Option<StatementOutput>,
	#[serde(default)]
	pub progress: Option<f64>,
}

/// Job state as seen by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
	Queued,
	Running,
	Available,
	Ok,
	Error,
	Cancelled,
	Unknown,
}

impl fmt::Display for JobState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			JobState::Queued => "queued",
			JobState::Running => "running",
			JobState::Available => "available",
			JobState::Ok => "ok",
			JobState::Error => "error",
			JobState::Cancelled => "cancelled",
			JobState::Unknown => "unknown",
		};
		f.write_str(name)
	}
}

impl Statement {
	/// Maps the statement state and output status onto a [`JobState`].
	///
	/// A finished statement reports `available`; its output status decides
	/// between `ok` and `error`. An `available` statement without an output
	/// block stays `available`.
	pub fn job_state(&self) -> JobState {
		match self.state {
			StatementState::Waiting => JobState::Queued,
			StatementState::Running | StatementState::Cancelling => JobState::Running,
			StatementState::Available => match self.output.as_ref().map(|o| o.status) {
				None => JobState::Available,
				Some(OutputStatus::Ok) => JobState::Ok,
				Some(OutputStatus::Error) => JobState::Error,
				Some(OutputStatus::Unknown) => JobState::Unknown,
			},
			StatementState::Error => JobState::Error,
			StatementState::Cancelled => JobState::Cancelled,
			StatementState::Unknown => JobState::Unknown,
		}
	}

	/// Returns `true` once the statement can no longer change state.
	pub fn is_finished(&self) -> bool {
		matches!(
			self.state,
			StatementState::Available | StatementState::Error | StatementState::Cancelled
		)
	}
}

/// `POST /sessions/{id}/statements` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitStatementRequest {
	pub code: String,
	pub kind: SessionKind,
}
