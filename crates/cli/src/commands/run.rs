use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use serde_json::Value;
use shortline::{HttpObjectAcl, PipelineDefinition, RunOptions, combine_pipeline};
use tracing::info;

use super::{interrupt_signal, orchestrator};
use crate::config::Loaded;
use crate::error::Result;

fn pipeline(loaded: &Loaded, date: Option<NaiveDate>) -> Result<PipelineDefinition> {
	let config = &loaded.config;
	let run_date = date.unwrap_or_else(|| Local::now().date_naive());
	let acl = HttpObjectAcl::new(
		&config.object_store.endpoint,
		Duration::from_secs(config.object_store.request_timeout_secs),
	)?;
	info!(target: "shortline", pipeline = %config.pipeline.name, %run_date, "building pipeline");
	Ok(combine_pipeline(config, run_date, Arc::new(acl))?)
}

pub async fn run(loaded: &Loaded, date: Option<NaiveDate>, cluster_id: Option<String>, wait: bool) -> Result<Value> {
	let pipeline = pipeline(loaded, date)?;
	let orchestrator = orchestrator(loaded)?;
	let options = RunOptions {
		cluster_id,
		wait_for_signals: wait,
	};

	let report = orchestrator.run_pipeline(&pipeline, &options, &mut interrupt_signal()).await?;
	Ok(serde_json::to_value(report)?)
}

/// Runs one stage; the pipeline's `COMPLETED` state is left untouched.
pub async fn stage(loaded: &Loaded, name: &str, date: Option<NaiveDate>, cluster_id: Option<String>) -> Result<Value> {
	let pipeline = pipeline(loaded, date)?;
	let stage = pipeline.find_stage(name)?;
	let orchestrator = orchestrator(loaded)?;

	let result = orchestrator
		.run_stage(&pipeline, stage, cluster_id.as_deref(), &mut interrupt_signal())
		.await?;
	Ok(serde_json::to_value(result)?)
}
