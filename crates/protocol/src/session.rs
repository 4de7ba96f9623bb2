//! Interactive session payloads.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Numeric session identifier assigned by the execution endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Session state as reported by the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
	NotStarted,
	Starting,
	Recovering,
	Idle,
	Busy,
	ShuttingDown,
	Error,
	Dead,
	Killed,
	Success,
	#[serde(other)]
	Unknown,
}

/// Coarse lifecycle phase tracked locally for an owned session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
	Starting,
	Idle,
	Busy,
	Dead,
}

impl SessionState {
	/// Collapses the remote state onto the local lifecycle phase.
	pub fn phase(self) -> SessionPhase {
		match self {
			SessionState::NotStarted | SessionState::Starting | SessionState::Recovering | SessionState::Unknown => SessionPhase::Starting,
			SessionState::Idle => SessionPhase::Idle,
			SessionState::Busy | SessionState::ShuttingDown => SessionPhase::Busy,
			SessionState::Error | SessionState::Dead | SessionState::Killed | SessionState::Success => SessionPhase::Dead,
		}
	}

	/// Returns `true` when nothing is running on the session and it can be
	/// reclaimed without interrupting work.
	///
	/// `Unknown` is treated as active so that an unrecognized state is never
	/// killed.
	pub fn is_inactive(self) -> bool {
		matches!(
			self,
			SessionState::Idle | SessionState::Error | SessionState::Dead | SessionState::Killed | SessionState::Success
		)
	}

	/// Returns `true` for states the session cannot leave.
	pub fn is_final(self) -> bool {
		matches!(self, SessionState::Error | SessionState::Dead | SessionState::Killed | SessionState::Success)
	}
}

impl fmt::Display for SessionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			SessionState::NotStarted => "not_started",
			SessionState::Starting => "starting",
			SessionState::Recovering => "recovering",
			SessionState::Idle => "idle",
			SessionState::Busy => "busy",
			SessionState::ShuttingDown => "shutting_down",
			SessionState::Error => "error",
			SessionState::Dead => "dead",
			SessionState::Killed => "killed",
			SessionState::Success => "success",
			SessionState::Unknown => "unknown",
		};
		f.write_str(name)
	}
}

/// Interpreter kind requested for a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
	#[default]
	Pyspark,
	Spark,
	Sparkr,
	Sql,
}

/// One entry of `GET /sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
	pub id: SessionId,
	pub state: SessionState,
	#[serde(default)]
	pub kind: Option<SessionKind>,
	#[serde(default)]
	pub app_id: Option<String>,
	#[serde(default)]
	pub name: Option<String>,
}

/// `GET /sessions` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionList {
	#[serde(default)]
	pub from: u64,
	#[serde(default)]
	pub total: u64,
	#[serde(default)]
	pub sessions: Vec<SessionInfo>,
}

/// `POST /sessions` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
	pub kind: SessionKind,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Map::is_empty")]
	pub conf: Map<String, Value>,
}

/// `GET /sessions/{id}/state` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStateResponse {
	pub id: SessionId,
	pub state: SessionState,
}
