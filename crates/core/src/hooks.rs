//! Side effects that run after a stage succeeds.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, warn};
use url::Url;

use crate::error::{PipelineError, Result};
use crate::orchestrator::StageResult;

/// Callback invoked once for a stage that finished with a success verdict.
#[async_trait]
pub trait CompletionHook: Send + Sync {
	/// Short name used in logs.
	fn name(&self) -> &str;

	async fn on_success(&self, result: &StageResult) -> Result<()>;
}

/// Access-control capability of the object store.
#[async_trait]
pub trait ObjectAcl: Send + Sync {
	async fn set_public_read(&self, bucket: &str, key: &str) -> Result<()>;
}

/// S3-compatible ACL client speaking the REST `?acl` subresource.
///
/// Requests are sent unsigned, so the endpoint must accept them as-is
/// (a gateway, a bucket policy allowing ACL writes, or a local emulator).
pub struct HttpObjectAcl {
	http: Client,
	endpoint: Url,
}

impl HttpObjectAcl {
	pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
		let endpoint = Url::parse(endpoint).map_err(|err| PipelineError::Config(format!("object store endpoint {endpoint:?}: {err}")))?;
		let http = Client::builder()
			.timeout(timeout)
			.build()
			.map_err(shortline_runtime::Error::from)?;
		Ok(Self { http, endpoint })
	}

	fn object_url(&self, bucket: &str, key: &str) -> Result<Url> {
		let base = self.endpoint.as_str().trim_end_matches('/');
		Url::parse(&format!("{base}/{bucket}/{key}?acl")).map_err(|err| PipelineError::Config(format!("object {bucket}/{key}: {err}")))
	}
}

#[async_trait]
impl ObjectAcl for HttpObjectAcl {
	async fn set_public_read(&self, bucket: &str, key: &str) -> Result<()> {
		let url = self.object_url(bucket, key)?;
		let response = self
			.http
			.put(url.clone())
			.header("x-amz-acl", "public-read")
			.send()
			.await
			.map_err(shortline_runtime::Error::from)?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(shortline_runtime::Error::Status {
				url: url.to_string(),
				status: status.as_u16(),
				body,
			}
			.into());
		}
		Ok(())
	}
}

/// Derives `(bucket, key)` of the CSV export of `table` under `db_host`.
///
/// Only `s3://` and `s3a://` hosts map to object storage; the bucket is the
/// last path segment of the host and the key is the table path without its
/// leading `/`, suffixed with `.csv`.
pub fn artifact_location(db_host: &str, table: &str) -> Option<(String, String)> {
	let path = db_host.strip_prefix("s3a://").or_else(|| db_host.strip_prefix("s3://"))?;
	let bucket = path.trim_end_matches('/').rsplit('/').next()?;
	if bucket.is_empty() {
		return None;
	}
	let table = table.strip_prefix('/').unwrap_or(table);
	Some((bucket.to_string(), format!("{table}.csv")))
}

/// Makes the stage's exported artifact publicly readable.
pub struct PublishArtifact {
	acl: Arc<dyn ObjectAcl>,
	db_host: String,
	table: String,
}

impl PublishArtifact {
	pub fn new(acl: Arc<dyn ObjectAcl>, db_host: impl Into<String>, table: impl Into<String>) -> Self {
		Self {
			acl,
			db_host: db_host.into(),
			table: table.into(),
		}
	}
}

#[async_trait]
impl CompletionHook for PublishArtifact {
	fn name(&self) -> &str {
		"publish_artifact"
	}

	async fn on_success(&self, result: &StageResult) -> Result<()> {
		let Some((bucket, key)) = artifact_location(&self.db_host, &self.table) else {
			info!(
				target: "shortline.pipeline",
				stage = %result.stage,
				db_host = %self.db_host,
				"artifact is not on object storage; nothing to publish"
			);
			return Ok(());
		};

		info!(target: "shortline.pipeline", stage = %result.stage, %bucket, %key, "publishing artifact");
		self.acl.set_public_read(&bucket, &key).await.map_err(|err| {
			warn!(target: "shortline.pipeline", stage = %result.stage, %bucket, %key, error = %err, "failed to publish artifact");
			PipelineError::Hook {
				stage: result.stage.clone(),
				reason: err.to_string(),
			}
		})
	}
}

#[cfg(test)]
mod tests {
	use parking_lot::Mutex;

	use super::*;
	use crate::orchestrator::StageResult;

	#[derive(Default)]
	struct RecordingAcl {
		calls: Mutex<Vec<(String, String)>>,
	}

	#[async_trait]
	impl ObjectAcl for RecordingAcl {
		async fn set_public_read(&self, bucket: &str, key: &str) -> Result<()> {
			self.calls.lock().push((bucket.to_string(), key.to_string()));
			Ok(())
		}
	}

	#[test]
	fn locations_derive_from_s3_hosts() {
		assert_eq!(
			artifact_location("s3a://short-interest-data", "/short_analysis"),
			Some(("short-interest-data".to_string(), "short_analysis.csv".to_string()))
		);
		assert_eq!(
			artifact_location("s3://warehouse/exports/", "reports/daily"),
			Some(("exports".to_string(), "reports/daily.csv".to_string()))
		);
		assert_eq!(artifact_location("/home/hadoop/data", "/short_analysis"), None);
		assert_eq!(artifact_location("hdfs:///data", "/short_analysis"), None);
	}

	#[tokio::test]
	async fn publishes_s3_artifacts() {
		let acl = Arc::new(RecordingAcl::default());
		let hook = PublishArtifact::new(acl.clone(), "s3a://short-interest-data", "/short_analysis");
		hook.on_success(&StageResult::succeeded("combine", "quality_check")).await.unwrap();
		assert_eq!(
			*acl.calls.lock(),
			vec![("short-interest-data".to_string(), "short_analysis.csv".to_string())]
		);
	}

	#[tokio::test]
	async fn local_hosts_are_a_no_op() {
		let acl = Arc::new(RecordingAcl::default());
		let hook = PublishArtifact::new(acl.clone(), "/tmp/warehouse", "/short_analysis");
		hook.on_success(&StageResult::succeeded("combine", "quality_check")).await.unwrap();
		assert!(acl.calls.lock().is_empty());
	}

	#[test]
	fn object_urls_address_the_acl_subresource() {
		let acl = HttpObjectAcl::new("http://127.0.0.1:9000/", Duration::from_secs(1)).unwrap();
		let url = acl.object_url("bucket", "short_analysis.csv").unwrap();
		assert_eq!(url.as_str(), "http://127.0.0.1:9000/bucket/short_analysis.csv?acl");
	}
}
