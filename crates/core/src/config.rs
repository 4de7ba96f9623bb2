//! Configuration model.
//!
//! Every field has a default so that a partial (or absent) file is valid.
//! Locating the file and applying command-line overrides is left to the
//! binary.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shortline_runtime::endpoint::DEFAULT_ENDPOINT_PORT;
use shortline_runtime::protocol::{CreateSessionRequest, SessionKind};
use shortline_runtime::tracker::DEFAULT_LOG_PAGE_SIZE;
use shortline_runtime::{DEFAULT_FAILURE_MARKER, EndpointOptions, PollPolicy};

use crate::error::{PipelineError, Result};
use crate::orchestrator::Settings;
use crate::pipeline::COMBINE_PIPELINE;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
	pub cluster: ClusterConfig,
	pub polling: PollingConfig,
	/// Substring that marks a job as failed when it appears in its log.
	pub failure_marker: String,
	pub store: StoreConfig,
	pub aws: AwsConfig,
	pub app: AppConfig,
	pub pipeline: PipelineConfig,
	pub object_store: ObjectStoreConfig,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			cluster: ClusterConfig::default(),
			polling: PollingConfig::default(),
			failure_marker: DEFAULT_FAILURE_MARKER.to_string(),
			store: StoreConfig::default(),
			aws: AwsConfig::default(),
			app: AppConfig::default(),
			pipeline: PipelineConfig::default(),
			object_store: ObjectStoreConfig::default(),
		}
	}
}

impl Config {
	/// Reads a config file.
	pub fn from_path(path: &Path) -> Result<Self> {
		let contents = fs::read_to_string(path).map_err(|err| PipelineError::Config(format!("failed to read {}: {err}", path.display())))?;
		Self::parse(&contents).map_err(|err| PipelineError::Config(format!("{}: {err}", path.display())))
	}

	pub fn parse(contents: &str) -> std::result::Result<Self, serde_json::Error> {
		serde_json::from_str(contents)
	}

	/// Resolves relative paths in the file against `base`.
	pub fn resolve_paths(&mut self, base: &Path) {
		if self.pipeline.etl_dir.is_relative() {
			self.pipeline.etl_dir = base.join(&self.pipeline.etl_dir);
		}
		if let Some(path) = self.store.path.as_mut().filter(|p| p.is_relative()) {
			*path = base.join(&*path);
		}
	}

	pub fn endpoint_options(&self) -> EndpointOptions {
		EndpointOptions {
			scheme: self.cluster.scheme.clone(),
			port: self.cluster.endpoint_port,
			request_timeout: Duration::from_secs(self.cluster.request_timeout_secs),
			..EndpointOptions::default()
		}
	}

	pub fn settings(&self) -> Settings {
		Settings {
			session_poll: self.polling.session.policy(),
			job_poll: self.polling.job.policy(),
			sensor_poll: self.polling.sensor.policy(),
			failure_marker: self.failure_marker.clone(),
			log_page_size: self.polling.log_page_size,
			session_request: CreateSessionRequest {
				kind: self.cluster.session_kind,
				name: None,
				conf: self.cluster.session_conf.clone(),
			},
		}
	}
}

/// Where clusters are looked up and how their endpoint is reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterConfig {
	/// Base URL of the cluster directory (`GET {url}/clusters/{id}`).
	pub directory_url: Option<String>,
	/// Fixed endpoint host, bypassing the directory.
	pub host: Option<String>,
	pub endpoint_port: u16,
	pub scheme: String,
	pub request_timeout_secs: u64,
	pub session_kind: SessionKind,
	/// Spark configuration sent with every new session.
	pub session_conf: serde_json::Map<String, serde_json::Value>,
}

impl Default for ClusterConfig {
	fn default() -> Self {
		Self {
			directory_url: None,
			host: None,
			endpoint_port: DEFAULT_ENDPOINT_PORT,
			scheme: "http".to_string(),
			request_timeout_secs: 30,
			session_kind: SessionKind::default(),
			session_conf: serde_json::Map::new(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollConfig {
	pub interval_ms: u64,
	pub max_attempts: u32,
}

impl PollConfig {
	pub const fn new(interval_ms: u64, max_attempts: u32) -> Self {
		Self { interval_ms, max_attempts }
	}

	pub fn policy(&self) -> PollPolicy {
		PollPolicy::new(Duration::from_millis(self.interval_ms), self.max_attempts.max(1))
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollingConfig {
	/// Session readiness: 10 minutes.
	pub session: PollConfig,
	/// Job completion: 4 hours.
	pub job: PollConfig,
	/// Signal sensors: 24 hours.
	pub sensor: PollConfig,
	pub log_page_size: u64,
}

impl Default for PollingConfig {
	fn default() -> Self {
		Self {
			session: PollConfig::new(5_000, 120),
			job: PollConfig::new(5_000, 2_880),
			sensor: PollConfig::new(120_000, 720),
			log_page_size: DEFAULT_LOG_PAGE_SIZE,
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
	/// Signal store file; the binary supplies a per-user default.
	pub path: Option<PathBuf>,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AwsConfig {
	pub region_name: String,
	pub access_key_id: String,
	pub secret_access_key: String,
}

impl Default for AwsConfig {
	fn default() -> Self {
		Self {
			region_name: "us-east-1".to_string(),
			access_key_id: String::new(),
			secret_access_key: String::new(),
		}
	}
}

impl fmt::Debug for AwsConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AwsConfig")
			.field("region_name", &self.region_name)
			.field("access_key_id", &self.access_key_id)
			.field("secret_access_key", &"***")
			.finish()
	}
}

/// Storage locations handed to the jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
	pub db_host: String,
	pub table_stock_prices: String,
	pub table_short_interests_nasdaq: String,
	pub table_short_interests_nyse: String,
	pub table_short_analysis: String,
}

impl Default for AppConfig {
	fn default() -> Self {
		Self {
			db_host: String::new(),
			table_stock_prices: "/stock_prices".to_string(),
			table_short_interests_nasdaq: "/short_interests_nasdaq".to_string(),
			table_short_interests_nyse: "/short_interests_nyse".to_string(),
			table_short_analysis: "/short_analysis".to_string(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
	pub name: String,
	/// Directory holding the job payloads and shared modules.
	pub etl_dir: PathBuf,
	pub upstream: Vec<String>,
}

impl Default for PipelineConfig {
	fn default() -> Self {
		Self {
			name: COMBINE_PIPELINE.to_string(),
			etl_dir: PathBuf::from("etl"),
			upstream: vec!["short_interests".to_string(), "prices".to_string()],
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectStoreConfig {
	pub endpoint: String,
	pub request_timeout_secs: u64,
}

impl Default for ObjectStoreConfig {
	fn default() -> Self {
		Self {
			endpoint: "https://s3.amazonaws.com".to_string(),
			request_timeout_secs: 30,
		}
	}
}
