//! Cluster directory payloads.
//!
//! The directory answers `GET /clusters/{id}` with the same PascalCase shape a
//! managed-cluster `DescribeCluster` call returns.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Liveness of a compute cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
	Running,
	Terminated,
	Unknown,
}

impl fmt::Display for Liveness {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Liveness::Running => f.write_str("running"),
			Liveness::Terminated => f.write_str("terminated"),
			Liveness::Unknown => f.write_str("unknown"),
		}
	}
}

/// Raw lifecycle state string reported by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterState(pub String);

impl ClusterState {
	pub fn liveness(&self) -> Liveness {
		match self.0.as_str() {
			"STARTING" | "BOOTSTRAPPING" | "RUNNING" | "WAITING" => Liveness::Running,
			"TERMINATING" | "TERMINATED" | "TERMINATED_WITH_ERRORS" => Liveness::Terminated,
			_ => Liveness::Unknown,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StateChangeReason {
	#[serde(default)]
	pub code: Option<String>,
	#[serde(default)]
	pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClusterStatus {
	pub state: ClusterState,
	#[serde(default)]
	pub state_change_reason: Option<StateChangeReason>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClusterDescription {
	pub id: String,
	#[serde(default)]
	pub name: Option<String>,
	pub status: ClusterStatus,
	#[serde(default)]
	pub master_public_dns_name: Option<String>,
}

/// `GET /clusters/{id}` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeClusterResponse {
	pub cluster: ClusterDescription,
}
