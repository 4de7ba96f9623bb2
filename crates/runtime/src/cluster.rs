//! Cluster discovery: liveness and network address resolution.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use shortline_protocol::{DescribeClusterResponse, Liveness};
use tracing::{debug, error};
use url::Url;

use crate::error::{Error, Result};

/// Network location of a cluster's execution endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterAddress {
	host: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	port: Option<u16>,
}

impl ClusterAddress {
	pub fn new(host: impl Into<String>) -> Self {
		Self { host: host.into(), port: None }
	}

	pub fn with_port(host: impl Into<String>, port: u16) -> Self {
		Self {
			host: host.into(),
			port: Some(port),
		}
	}

	pub fn host(&self) -> &str {
		&self.host
	}

	/// Port override; `None` means the endpoint's default port.
	pub fn port(&self) -> Option<u16> {
		self.port
	}
}

impl fmt::Display for ClusterAddress {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.port {
			Some(port) => write!(f, "{}:{}", self.host, port),
			None => f.write_str(&self.host),
		}
	}
}

/// Resolved view of one cluster.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterHandle {
	pub id: String,
	pub address: Option<ClusterAddress>,
	pub liveness: Liveness,
	/// State string as reported by the directory.
	pub state: String,
}

impl ClusterHandle {
	pub fn is_terminated(&self) -> bool {
		self.liveness == Liveness::Terminated
	}
}

/// Read-only source of cluster state.
#[async_trait]
pub trait ClusterDirectory: Send + Sync {
	async fn describe(&self, cluster_id: &str) -> Result<ClusterHandle>;
}

/// Cluster client contract used by the orchestrator.
pub struct ClusterClient<'a> {
	directory: &'a dyn ClusterDirectory,
}

impl<'a> ClusterClient<'a> {
	pub fn new(directory: &'a dyn ClusterDirectory) -> Self {
		Self { directory }
	}

	pub async fn describe(&self, cluster_id: &str) -> Result<ClusterHandle> {
		self.directory.describe(cluster_id).await
	}

	pub async fn is_terminated(&self, cluster_id: &str) -> Result<bool> {
		Ok(self.describe(cluster_id).await?.is_terminated())
	}

	/// Resolves the endpoint address of a live cluster.
	pub async fn resolve_address(&self, cluster_id: &str) -> Result<ClusterAddress> {
		let handle = self.describe(cluster_id).await?;
		ensure_reachable(handle)
	}
}

/// Converts a described cluster into its address, rejecting terminated
/// clusters and clusters that have not published an address yet.
pub fn ensure_reachable(handle: ClusterHandle) -> Result<ClusterAddress> {
	if handle.is_terminated() {
		error!(target: "shortline.cluster", cluster_id = %handle.id, state = %handle.state, "cluster has been terminated");
		return Err(Error::ClusterUnreachable {
			cluster_id: handle.id,
			reason: format!("cluster is {}", handle.state),
		});
	}
	match handle.address {
		Some(address) => {
			debug!(target: "shortline.cluster", cluster_id = %handle.id, %address, "resolved cluster address");
			Ok(address)
		}
		None => {
			error!(target: "shortline.cluster", cluster_id = %handle.id, state = %handle.state, "cluster has no address");
			Err(Error::ClusterUnreachable {
				cluster_id: handle.id,
				reason: format!("no master address published (state {})", handle.state),
			})
		}
	}
}

/// Directory backed by `GET {base}/clusters/{id}`.
#[derive(Debug, Clone)]
pub struct HttpClusterDirectory {
	http: reqwest::Client,
	base: Url,
}

impl HttpClusterDirectory {
	pub fn new(base: &str, timeout: Duration) -> Result<Self> {
		let mut base = Url::parse(base)?;
		if !base.path().ends_with('/') {
			let path = format!("{}/", base.path());
			base.set_path(&path);
		}
		let http = reqwest::Client::builder().timeout(timeout).build()?;
		Ok(Self { http, base })
	}

	async fn fetch(&self, cluster_id: &str) -> std::result::Result<DescribeClusterResponse, String> {
		let url = self.base.join(&format!("clusters/{cluster_id}")).map_err(|e| e.to_string())?;
		let response = self.http.get(url.clone()).send().await.map_err(|e| e.to_string())?;
		let status = response.status();
		if !status.is_success() {
			return Err(format!("directory returned {status} for {url}"));
		}
		response.json().await.map_err(|e| format!("invalid directory response: {e}"))
	}
}

#[async_trait]
impl ClusterDirectory for HttpClusterDirectory {
	async fn describe(&self, cluster_id: &str) -> Result<ClusterHandle> {
		let described = self.fetch(cluster_id).await.map_err(|reason| {
			error!(target: "shortline.cluster", %cluster_id, %reason, "cluster lookup failed");
			Error::ClusterUnreachable {
				cluster_id: cluster_id.to_string(),
				reason,
			}
		})?;
		let cluster = described.cluster;
		let liveness = cluster.status.state.liveness();
		Ok(ClusterHandle {
			id: cluster.id,
			address: cluster.master_public_dns_name.filter(|h| !h.is_empty()).map(ClusterAddress::new),
			liveness,
			state: cluster.status.state.0,
		})
	}
}

/// Directory for a fixed, always-running endpoint.
#[derive(Debug, Clone)]
pub struct StaticClusterDirectory {
	address: ClusterAddress,
}

impl StaticClusterDirectory {
	pub fn new(address: ClusterAddress) -> Self {
		Self { address }
	}
}

#[async_trait]
impl ClusterDirectory for StaticClusterDirectory {
	async fn describe(&self, cluster_id: &str) -> Result<ClusterHandle> {
		Ok(ClusterHandle {
			id: cluster_id.to_string(),
			address: Some(self.address.clone()),
			liveness: Liveness::Running,
			state: "STATIC".to_string(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn handle(state: &str, liveness: Liveness, address: Option<&str>) -> ClusterHandle {
		ClusterHandle {
			id: "j-1".to_string(),
			address: address.map(ClusterAddress::new),
			liveness,
			state: state.to_string(),
		}
	}

	#[test]
	fn terminated_cluster_is_unreachable() {
		let err = ensure_reachable(handle("TERMINATED", Liveness::Terminated, Some("master"))).unwrap_err();
		match err {
			Error::ClusterUnreachable { cluster_id, reason } => {
				assert_eq!(cluster_id, "j-1");
				assert!(reason.contains("TERMINATED"));
			}
			other => panic!("unexpected error: {other:?}"),
		}
	}

	#[test]
	fn missing_address_is_unreachable() {
		let err = ensure_reachable(handle("STARTING", Liveness::Running, None)).unwrap_err();
		assert!(matches!(err, Error::ClusterUnreachable { .. }));
	}

	#[test]
	fn running_cluster_resolves() {
		let address = ensure_reachable(handle("WAITING", Liveness::Running, Some("master"))).unwrap();
		assert_eq!(address.host(), "master");
	}

	#[tokio::test]
	async fn static_directory_is_always_running() {
		let directory = StaticClusterDirectory::new(ClusterAddress::with_port("localhost", 8998));
		let client = ClusterClient::new(&directory);
		assert!(!client.is_terminated("local").await.unwrap());
		assert_eq!(client.resolve_address("local").await.unwrap().to_string(), "localhost:8998");
	}
}
