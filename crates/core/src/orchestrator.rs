//! Sequential stage execution.
//!
//! A stage runs through a fixed sequence:
//!
//! 1. refuse to start if any upstream pipeline is `FAILED` (no remote contact),
//! 2. resolve the cluster and refuse to start if it has terminated,
//! 3. reclaim inactive sessions, then open a session and wait until it is idle,
//! 4. submit the job and track it to a verdict,
//! 5. terminate the session (always, exactly once),
//! 6. turn a failure verdict into an error, or run the completion hook.
//!
//! Any error persists `FAILED` for the pipeline before it surfaces, which is
//! what blocks dependent pipelines.

use std::sync::Arc;

use serde::Serialize;
use shortline_runtime::protocol::{CreateSessionRequest, SessionId};
use shortline_runtime::tracker::DEFAULT_LOG_PAGE_SIZE;
use shortline_runtime::{
	CancelSignal, ClusterAddress, ClusterClient, ClusterDirectory, DEFAULT_FAILURE_MARKER, ExecutionEndpoint, JobHandle, JobSubmitter,
	JobTracker, LogLine, PollPolicy, SessionHandle, SessionManager, TerminalStatus, TrackReport, Verdict,
};
use tracing::{error, info, warn};

use crate::error::{PipelineError, Result};
use crate::pipeline::{PipelineDefinition, StageDefinition};
use crate::sensors::{Expectation, await_signals};
use crate::signals::{CLUSTER_ID_KEY, PipelineState, SignalStore, read_state, state_key, write_state};

/// Outcome of one stage.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageResult {
	pub pipeline: String,
	pub stage: String,
	pub cluster_id: String,
	pub session: SessionId,
	/// `session/statement` of the tracked job.
	pub job: String,
	pub status: TerminalStatus,
	pub verdict: Verdict,
	pub logs: Vec<LogLine>,
	pub marker_line: Option<LogLine>,
	pub polls: u32,
}

impl StageResult {
	fn from_report(pipeline: &str, cluster_id: &str, handle: &JobHandle, report: TrackReport) -> Self {
		Self {
			pipeline: pipeline.to_string(),
			stage: handle.stage.clone(),
			cluster_id: cluster_id.to_string(),
			session: handle.session,
			job: handle.to_string(),
			status: report.status,
			verdict: report.verdict,
			logs: report.logs,
			marker_line: report.marker_line,
			polls: report.polls,
		}
	}

	pub fn is_success(&self) -> bool {
		self.verdict == Verdict::Success
	}

	#[cfg(test)]
	pub(crate) fn succeeded(pipeline: &str, stage: &str) -> Self {
		Self {
			pipeline: pipeline.to_string(),
			stage: stage.to_string(),
			cluster_id: "j-test".to_string(),
			session: SessionId(0),
			job: "0/0".to_string(),
			status: TerminalStatus::Ok,
			verdict: Verdict::Success,
			logs: Vec::new(),
			marker_line: None,
			polls: 1,
		}
	}
}

/// Outcome of a full pipeline run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
	pub pipeline: String,
	pub cluster_id: String,
	pub state: PipelineState,
	pub stages: Vec<StageResult>,
}

/// Per-run knobs.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
	/// Overrides the id stored under `cluster_id`.
	pub cluster_id: Option<String>,
	/// Block on sensors before the first stage.
	pub wait_for_signals: bool,
}

/// Polling bounds and session parameters.
#[derive(Debug, Clone)]
pub struct Settings {
	pub session_poll: PollPolicy,
	pub job_poll: PollPolicy,
	pub sensor_poll: PollPolicy,
	pub failure_marker: String,
	pub log_page_size: u64,
	pub session_request: CreateSessionRequest,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			session_poll: PollPolicy::default(),
			job_poll: PollPolicy::default(),
			sensor_poll: PollPolicy::default(),
			failure_marker: DEFAULT_FAILURE_MARKER.to_string(),
			log_page_size: DEFAULT_LOG_PAGE_SIZE,
			session_request: CreateSessionRequest::default(),
		}
	}
}

/// Runs pipeline stages against a cluster.
pub struct Orchestrator {
	directory: Arc<dyn ClusterDirectory>,
	endpoint: Arc<dyn ExecutionEndpoint>,
	signals: Arc<dyn SignalStore>,
	settings: Settings,
}

impl Orchestrator {
	pub fn new(directory: Arc<dyn ClusterDirectory>, endpoint: Arc<dyn ExecutionEndpoint>, signals: Arc<dyn SignalStore>) -> Self {
		Self {
			directory,
			endpoint,
			signals,
			settings: Settings::default(),
		}
	}

	pub fn with_settings(mut self, settings: Settings) -> Self {
		self.settings = settings;
		self
	}

	pub fn settings(&self) -> &Settings {
		&self.settings
	}

	pub fn signals(&self) -> &dyn SignalStore {
		self.signals.as_ref()
	}

	pub fn clusters(&self) -> ClusterClient<'_> {
		ClusterClient::new(self.directory.as_ref())
	}

	pub fn sessions(&self) -> SessionManager<'_> {
		SessionManager::new(self.endpoint.as_ref(), self.settings.session_poll).with_request(self.settings.session_request.clone())
	}

	/// Returns `requested`, or the id published under `cluster_id`.
	pub fn resolve_cluster_id(&self, requested: Option<&str>) -> Result<String> {
		if let Some(id) = requested {
			return Ok(id.to_string());
		}
		match self.signals.get(CLUSTER_ID_KEY)? {
			Some(id) if !id.trim().is_empty() => Ok(id.trim().to_string()),
			_ => Err(shortline_runtime::Error::ClusterUnreachable {
				cluster_id: "<unset>".to_string(),
				reason: format!("no cluster id given and none stored under {CLUSTER_ID_KEY:?}"),
			}
			.into()),
		}
	}

	/// Resolves the cluster address for `requested` (or the stored id).
	pub async fn resolve_address(&self, requested: Option<&str>) -> Result<(String, ClusterAddress)> {
		let cluster_id = self.resolve_cluster_id(requested)?;
		let address = self.clusters().resolve_address(&cluster_id).await?;
		Ok((cluster_id, address))
	}

	/// Waits until the pipeline may start.
	///
	/// In order: no previous run of `pipeline` is still recorded, a cluster id
	/// has been published, and every upstream pipeline has published a state.
	pub async fn await_preconditions(&self, pipeline: &PipelineDefinition, cancel: &mut CancelSignal) -> Result<()> {
		let store = self.signals.as_ref();
		let policy = self.settings.sensor_poll;

		await_signals(store, &[state_key(&pipeline.name)], Expectation::Absent, policy, cancel).await?;
		await_signals(store, &[CLUSTER_ID_KEY.to_string()], Expectation::Present, policy, cancel).await?;
		let upstream: Vec<String> = pipeline.upstream.iter().map(|p| state_key(p)).collect();
		await_signals(store, &upstream, Expectation::Present, policy, cancel).await?;
		Ok(())
	}

	/// Runs every stage in order and publishes `COMPLETED` after the last one.
	///
	/// The first failing stage stops the run; later stages are not started.
	pub async fn run_pipeline(&self, pipeline: &PipelineDefinition, options: &RunOptions, cancel: &mut CancelSignal) -> Result<PipelineReport> {
		if options.wait_for_signals {
			self.await_preconditions(pipeline, cancel).await?;
		}
		info!(target: "shortline.pipeline", pipeline = %pipeline.name, stages = ?pipeline.stage_names(), "starting pipeline");

		let mut stages = Vec::with_capacity(pipeline.stages.len());
		for stage in &pipeline.stages {
			let result = self.run_stage(pipeline, stage, options.cluster_id.as_deref(), cancel).await?;
			stages.push(result);
		}

		write_state(self.signals.as_ref(), &pipeline.name, PipelineState::Completed)?;
		let cluster_id = stages.last().map(|s| s.cluster_id.clone()).unwrap_or_default();
		info!(target: "shortline.pipeline", pipeline = %pipeline.name, %cluster_id, "pipeline completed");

		Ok(PipelineReport {
			pipeline: pipeline.name.clone(),
			cluster_id,
			state: PipelineState::Completed,
			stages,
		})
	}

	/// Runs one stage of `pipeline`.
	///
	/// A failure verdict is returned as [`PipelineError::JobFailure`] carrying
	/// the full [`StageResult`]. Every error persists `FAILED` for `pipeline`.
	pub async fn run_stage(
		&self,
		pipeline: &PipelineDefinition,
		stage: &StageDefinition,
		cluster_id: Option<&str>,
		cancel: &mut CancelSignal,
	) -> Result<StageResult> {
		let outcome = self.execute_stage(pipeline, stage, cluster_id, cancel).await;
		if let Err(err) = &outcome {
			error!(
				target: "shortline.pipeline",
				pipeline = %pipeline.name,
				stage = %stage.name(),
				code = %err.code(),
				error = %err,
				"stage failed"
			);
			self.mark_failed(&pipeline.name);
		}
		outcome
	}

	async fn execute_stage(
		&self,
		pipeline: &PipelineDefinition,
		stage: &StageDefinition,
		cluster_id: Option<&str>,
		cancel: &mut CancelSignal,
	) -> Result<StageResult> {
		self.check_upstream(pipeline)?;

		let (cluster_id, address) = self.resolve_address(cluster_id).await?;
		info!(target: "shortline.pipeline", pipeline = %pipeline.name, stage = %stage.name(), %cluster_id, %address, "running stage");

		let sessions = self.sessions();
		sessions.kill_inactive_sessions(&address).await?;
		let mut session = sessions.create_session(&address).await?;

		let tracked = self.submit_and_track(&sessions, &mut session, stage, cancel).await;
		sessions.terminate(session).await;
		let (handle, report) = tracked?;

		let result = StageResult::from_report(&pipeline.name, &cluster_id, &handle, report);
		if !result.is_success() {
			error!(
				target: "shortline.pipeline",
				pipeline = %pipeline.name,
				stage = %result.stage,
				job = %result.job,
				status = %result.status,
				marker_line = result.marker_line.as_ref().map(LogLine::as_str),
				"job failed"
			);
			return Err(PipelineError::JobFailure {
				stage: result.stage.clone(),
				job: result.job.clone(),
				status: result.status,
				result: Box::new(result),
			});
		}

		if let Some(hook) = &stage.hook {
			info!(target: "shortline.pipeline", stage = %result.stage, hook = hook.name(), "running completion hook");
			hook.on_success(&result).await.map_err(|err| match err {
				PipelineError::Hook { .. } => err,
				other => PipelineError::Hook {
					stage: result.stage.clone(),
					reason: other.to_string(),
				},
			})?;
		}

		info!(target: "shortline.pipeline", pipeline = %pipeline.name, stage = %result.stage, job = %result.job, "stage succeeded");
		Ok(result)
	}

	/// Everything between session creation and termination.
	async fn submit_and_track(
		&self,
		sessions: &SessionManager<'_>,
		session: &mut SessionHandle,
		stage: &StageDefinition,
		cancel: &mut CancelSignal,
	) -> Result<(JobHandle, TrackReport)> {
		sessions.wait_until_ready(session, cancel).await?;
		let handle = JobSubmitter::new(self.endpoint.as_ref())
			.with_kind(self.settings.session_request.kind)
			.submit(session, &stage.descriptor)
			.await?;
		let report = JobTracker::new(self.endpoint.as_ref(), self.settings.job_poll)
			.with_marker(self.settings.failure_marker.as_str())
			.with_page_size(self.settings.log_page_size)
			.track(&handle, cancel)
			.await?;
		Ok((handle, report))
	}

	fn check_upstream(&self, pipeline: &PipelineDefinition) -> Result<()> {
		for upstream in &pipeline.upstream {
			if read_state(self.signals.as_ref(), upstream)? == Some(PipelineState::Failed) {
				warn!(target: "shortline.pipeline", pipeline = %pipeline.name, %upstream, "upstream pipeline failed; skipping");
				return Err(PipelineError::UpstreamFailed {
					pipeline: upstream.clone(),
				});
			}
		}
		Ok(())
	}

	// A store failure here must not replace the error being reported.
	fn mark_failed(&self, pipeline: &str) {
		if let Err(err) = write_state(self.signals.as_ref(), pipeline, PipelineState::Failed) {
			error!(target: "shortline.signals", pipeline, error = %err, "failed to persist FAILED state");
		}
	}
}
