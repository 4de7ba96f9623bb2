//! Error taxonomy for the remote execution lifecycle.

use std::time::Duration;

use shortline_protocol::SessionId;
use thiserror::Error;

/// Errors raised while discovering clusters or driving sessions and jobs.
#[derive(Debug, Error)]
pub enum Error {
	#[error("cluster {cluster_id} is unreachable: {reason}")]
	ClusterUnreachable { cluster_id: String, reason: String },

	#[error("failed to create session on {address}: {reason}")]
	SessionCreate { address: String, reason: String },

	#[error("timed out waiting for {what} after {attempts} polls ({elapsed:?})")]
	Timeout { what: String, attempts: u32, elapsed: Duration },

	#[error("submission to session {session_id} failed: {reason}")]
	Submission { session_id: SessionId, reason: String },

	#[error("failed to terminate session {session_id}: {reason}")]
	Cleanup { session_id: SessionId, reason: String },

	#[error("endpoint returned {status} for {url}: {body}")]
	Status { url: String, status: u16, body: String },

	#[error("operation cancelled")]
	Cancelled,

	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("invalid endpoint URL: {0}")]
	Url(#[from] url::ParseError),
}

impl Error {
	/// Returns `true` for HTTP 404 responses.
	pub fn is_not_found(&self) -> bool {
		match self {
			Error::Status { status, .. } => *status == 404,
			Error::Http(err) => err.status().is_some_and(|s| s.as_u16() == 404),
			_ => false,
		}
	}
}

pub type Result<T> = std::result::Result<T, Error>;
