//! Pipeline definitions and the built-in `combine` pipeline.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use shortline_runtime::JobDescriptor;
use shortline_runtime::job::JobDescriptorBuilder;

use crate::config::{AppConfig, AwsConfig, Config};
use crate::error::{PipelineError, Result};
use crate::hooks::{CompletionHook, ObjectAcl, PublishArtifact};

/// Name of the built-in pipeline.
pub const COMBINE_PIPELINE: &str = "combine";

/// One job of a pipeline plus what to do once it succeeds.
#[derive(Clone)]
pub struct StageDefinition {
	pub descriptor: JobDescriptor,
	pub hook: Option<Arc<dyn CompletionHook>>,
}

impl StageDefinition {
	pub fn new(descriptor: JobDescriptor) -> Self {
		Self { descriptor, hook: None }
	}

	pub fn with_hook(mut self, hook: Arc<dyn CompletionHook>) -> Self {
		self.hook = Some(hook);
		self
	}

	pub fn name(&self) -> &str {
		self.descriptor.name()
	}
}

impl fmt::Debug for StageDefinition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("StageDefinition")
			.field("descriptor", &self.descriptor)
			.field("hook", &self.hook.as_ref().map(|h| h.name()))
			.finish()
	}
}

/// Ordered stages gated on the outcome of upstream pipelines.
#[derive(Debug, Clone)]
pub struct PipelineDefinition {
	pub name: String,
	/// Pipelines that must not be `FAILED` for this one to run.
	pub upstream: Vec<String>,
	pub stages: Vec<StageDefinition>,
}

impl PipelineDefinition {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			upstream: Vec::new(),
			stages: Vec::new(),
		}
	}

	pub fn upstream(mut self, pipeline: impl Into<String>) -> Self {
		self.upstream.push(pipeline.into());
		self
	}

	pub fn stage(mut self, stage: StageDefinition) -> Self {
		self.stages.push(stage);
		self
	}

	pub fn find_stage(&self, name: &str) -> Result<&StageDefinition> {
		self.stages
			.iter()
			.find(|s| s.name() == name)
			.ok_or_else(|| PipelineError::UnknownStage(name.to_string()))
	}

	pub fn stage_names(&self) -> Vec<&str> {
		self.stages.iter().map(StageDefinition::name).collect()
	}
}

/// The day before `run_date`, formatted `YYYY-MM-DD`.
pub fn yesterday(run_date: NaiveDate) -> Result<String> {
	run_date
		.pred_opt()
		.map(|d| d.format("%Y-%m-%d").to_string())
		.ok_or_else(|| PipelineError::Config(format!("no day precedes {run_date}")))
}

/// Builds the `combine` pipeline for `run_date`.
///
/// `combine_datasets` joins prices with both exchanges' short interests into
/// the analysis table; `quality_check` validates that table and, when it
/// succeeds, publishes its CSV export through `acl`.
pub fn combine_pipeline(config: &Config, run_date: NaiveDate, acl: Arc<dyn ObjectAcl>) -> Result<PipelineDefinition> {
	let etl_dir = config.pipeline.etl_dir.as_path();
	let date = yesterday(run_date)?;
	let app = &config.app;

	let combine = with_modules(JobDescriptor::builder("combine_datasets", etl_dir.join("combine.py")), etl_dir)
		.arg("YESTERDAY_DATE", date.as_str());
	let combine = with_credentials(combine, &config.aws)
		.arg("DB_HOST", app.db_host.as_str())
		.arg("TABLE_STOCK_PRICES", app.table_stock_prices.as_str())
		.arg("TABLE_SHORT_INTERESTS_NASDAQ", app.table_short_interests_nasdaq.as_str())
		.arg("TABLE_SHORT_INTERESTS_NYSE", app.table_short_interests_nyse.as_str())
		.arg("TABLE_SHORT_ANALYSIS", app.table_short_analysis.as_str())
		.build();

	let quality = with_modules(JobDescriptor::builder("quality_check", etl_dir.join("combine_quality.py")), etl_dir);
	let quality = with_credentials(quality, &config.aws)
		.arg("YESTERDAY_DATE", date.as_str())
		.arg("DB_HOST", app.db_host.as_str())
		.arg("TABLE_SHORT_ANALYSIS", app.table_short_analysis.as_str())
		.build();

	let mut pipeline = PipelineDefinition::new(config.pipeline.name.as_str())
		.stage(StageDefinition::new(combine))
		.stage(StageDefinition::new(quality).with_hook(publish_hook(app, acl)));
	pipeline.upstream = config.pipeline.upstream.clone();
	Ok(pipeline)
}

fn with_modules(builder: JobDescriptorBuilder, etl_dir: &Path) -> JobDescriptorBuilder {
	builder.module(etl_dir.join("common.py")).module(etl_dir.join("helpers.py"))
}

fn with_credentials(builder: JobDescriptorBuilder, aws: &AwsConfig) -> JobDescriptorBuilder {
	builder
		.secret("AWS_ACCESS_KEY_ID", aws.access_key_id.as_str())
		.secret("AWS_SECRET_ACCESS_KEY", aws.secret_access_key.as_str())
}

fn publish_hook(app: &AppConfig, acl: Arc<dyn ObjectAcl>) -> Arc<dyn CompletionHook> {
	Arc::new(PublishArtifact::new(acl, app.db_host.as_str(), app.table_short_analysis.as_str()))
}
