//! Session log pages.

use serde::{Deserialize, Serialize};

use crate::session::SessionId;

/// `GET /sessions/{id}/log?from=&size=` response.
///
/// `from` echoes the requested offset and `total` is the number of lines the
/// endpoint currently holds for the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogPage {
	pub id: SessionId,
	#[serde(default)]
	pub from: u64,
	#[serde(default)]
	pub total: u64,
	#[serde(default)]
	pub log: Vec<String>,
}
