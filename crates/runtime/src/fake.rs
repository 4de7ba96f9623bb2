//! In-memory fakes for the cluster directory and execution endpoint.
//!
//! These let the lifecycle components and the orchestrator be exercised
//! without a live cluster. The endpoint fake is scripted: session readiness
//! and job progress replay a fixed sequence of states, and the job log is
//! revealed progressively so that cursor handling is observable.
//!
//! # Example
//!
//! ```ignore
//! let endpoint = FakeEndpoint::new();
//! endpoint.script_job(&[JobState::Queued, JobState::Running, JobState::Ok], &["start", "done"]);
//! let tracker = JobTracker::new(&endpoint, policy);
//! let report = tracker.track(&handle, &mut cancel).await?;
//! assert_eq!(endpoint.delete_count(), 0);
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use shortline_protocol::{
	CreateSessionRequest, JobState, Liveness, LogPage, OutputStatus, SessionId, SessionInfo, SessionState, Statement, StatementId,
	StatementOutput, StatementState, SubmitStatementRequest,
};

use crate::cluster::{ClusterAddress, ClusterDirectory, ClusterHandle};
use crate::endpoint::ExecutionEndpoint;
use crate::error::{Error, Result};

fn rejected(status: u16, body: &str) -> Error {
	Error::Status {
		url: "fake://endpoint".to_string(),
		status,
		body: body.to_string(),
	}
}

/// Converts a scripted job state into the statement the endpoint would return.
fn statement_for(id: StatementId, state: JobState) -> Statement {
	let (state, output) = match state {
		JobState::Queued => (StatementState::Waiting, None),
		JobState::Running => (StatementState::Running, None),
		JobState::Available => (StatementState::Available, None),
		JobState::Ok => (StatementState::Available, Some(output(OutputStatus::Ok))),
		JobState::Error => (StatementState::Available, Some(output(OutputStatus::Error))),
		JobState::Cancelled => (StatementState::Cancelled, None),
		JobState::Unknown => (StatementState::Available, Some(output(OutputStatus::Unknown))),
	};
	Statement {
		id,
		state,
		code: None,
		output,
		progress: None,
	}
}

fn output(status: OutputStatus) -> StatementOutput {
	let failed = status == OutputStatus::Error;
	StatementOutput {
		status,
		execution_count: Some(0),
		data: None,
		ename: failed.then(|| "Py4JJavaError".to_string()),
		evalue: failed.then(|| "An error occurred while calling o71.csv".to_string()),
		traceback: if failed {
			vec!["Traceback (most recent call last):".to_string()]
		} else {
			Vec::new()
		},
	}
}

#[derive(Default)]
struct EndpointState {
	sessions: BTreeMap<SessionId, SessionState>,
	next_session: u64,
	session_script: VecDeque<SessionState>,
	job_script: VecDeque<JobState>,
	job_polls_total: usize,
	logs: Vec<String>,
	visible_logs: usize,
	create_rejection: Option<String>,
	submit_rejection: Option<String>,
	fail_deletes: bool,
	calls: Vec<&'static str>,
	deletes: Vec<SessionId>,
	state_polls: usize,
	statement_polls: usize,
	log_requests: Vec<(u64, u64)>,
	submitted: Vec<SubmitStatementRequest>,
}

/// Scripted [`ExecutionEndpoint`].
#[derive(Default)]
pub struct FakeEndpoint {
	state: Mutex<EndpointState>,
}

impl FakeEndpoint {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a pre-existing session, e.g. a straggler from an earlier run.
	pub fn seed_session(&self, id: SessionId, state: SessionState) {
		let mut inner = self.state.lock();
		inner.next_session = inner.next_session.max(id.0 + 1);
		inner.sessions.insert(id, state);
	}

	/// States returned by successive readiness polls; the last one repeats.
	pub fn script_session_states(&self, states: &[SessionState]) {
		self.state.lock().session_script = states.iter().copied().collect();
	}

	/// States returned by successive job polls (the last one repeats) and the
	/// job log, revealed proportionally to poll progress.
	pub fn script_job(&self, states: &[JobState], logs: &[&str]) {
		let mut inner = self.state.lock();
		inner.job_script = states.iter().copied().collect();
		inner.job_polls_total = states.len();
		inner.logs = logs.iter().map(|l| l.to_string()).collect();
		inner.visible_logs = 0;
	}

	pub fn reject_session_creation(&self, reason: &str) {
		self.state.lock().create_rejection = Some(reason.to_string());
	}

	pub fn reject_submission(&self, reason: &str) {
		self.state.lock().submit_rejection = Some(reason.to_string());
	}

	pub fn fail_deletes(&self) {
		self.state.lock().fail_deletes = true;
	}

	/// Operation names in call order.
	pub fn calls(&self) -> Vec<&'static str> {
		self.state.lock().calls.clone()
	}

	pub fn was_contacted(&self) -> bool {
		!self.state.lock().calls.is_empty()
	}

	pub fn create_count(&self) -> usize {
		self.state.lock().calls.iter().filter(|c| **c == "create_session").count()
	}

	pub fn delete_count(&self) -> usize {
		self.state.lock().deletes.len()
	}

	/// Number of delete calls targeting `id`.
	pub fn deletes_of(&self, id: SessionId) -> usize {
		self.state.lock().deletes.iter().filter(|d| **d == id).count()
	}

	pub fn state_polls(&self) -> usize {
		self.state.lock().state_polls
	}

	pub fn statement_polls(&self) -> usize {
		self.state.lock().statement_polls
	}

	/// `(from, size)` of every log request.
	pub fn log_requests(&self) -> Vec<(u64, u64)> {
		self.state.lock().log_requests.clone()
	}

	pub fn submitted(&self) -> Vec<SubmitStatementRequest> {
		self.state.lock().submitted.clone()
	}

	pub fn session_ids(&self) -> Vec<SessionId> {
		self.state.lock().sessions.keys().copied().collect()
	}
}

fn next_scripted<T: Copy>(script: &mut VecDeque<T>) -> Option<T> {
	if script.len() > 1 { script.pop_front() } else { script.front().copied() }
}

#[async_trait]
impl ExecutionEndpoint for FakeEndpoint {
	async fn list_sessions(&self, _address: &ClusterAddress) -> Result<Vec<SessionInfo>> {
		let mut inner = self.state.lock();
		inner.calls.push("list_sessions");
		Ok(inner
			.sessions
			.iter()
			.map(|(id, state)| SessionInfo {
				id: *id,
				state: *state,
				kind: None,
				app_id: None,
				name: None,
			})
			.collect())
	}

	async fn create_session(&self, _address: &ClusterAddress, request: &CreateSessionRequest) -> Result<SessionInfo> {
		let mut inner = self.state.lock();
		inner.calls.push("create_session");
		if let Some(reason) = inner.create_rejection.clone() {
			return Err(rejected(503, &reason));
		}
		let id = SessionId(inner.next_session);
		inner.next_session += 1;
		inner.sessions.insert(id, SessionState::Starting);
		Ok(SessionInfo {
			id,
			state: SessionState::Starting,
			kind: Some(request.kind),
			app_id: None,
			name: request.name.clone(),
		})
	}

	async fn session_state(&self, _address: &ClusterAddress, session: SessionId) -> Result<SessionState> {
		let mut inner = self.state.lock();
		inner.calls.push("session_state");
		inner.state_polls += 1;
		if !inner.sessions.contains_key(&session) {
			return Err(rejected(404, "session not found"));
		}
		let state = next_scripted(&mut inner.session_script).unwrap_or(SessionState::Idle);
		inner.sessions.insert(session, state);
		Ok(state)
	}

	async fn submit_statement(&self, _address: &ClusterAddress, session: SessionId, request: &SubmitStatementRequest) -> Result<Statement> {
		let mut inner = self.state.lock();
		inner.calls.push("submit_statement");
		if let Some(reason) = inner.submit_rejection.clone() {
			return Err(rejected(400, &reason));
		}
		if inner.sessions.get(&session) != Some(&SessionState::Idle) {
			return Err(rejected(409, "session is not idle"));
		}
		inner.sessions.insert(session, SessionState::Busy);
		inner.submitted.push(request.clone());
		Ok(statement_for(StatementId(0), JobState::Queued))
	}

	async fn statement(&self, _address: &ClusterAddress, _session: SessionId, statement: StatementId) -> Result<Statement> {
		let mut inner = self.state.lock();
		inner.calls.push("statement");
		inner.statement_polls += 1;
		let state = next_scripted(&mut inner.job_script).unwrap_or(JobState::Ok);
		let total = inner.job_polls_total.max(1);
		let polls = inner.statement_polls.min(total);
		inner.visible_logs = inner.logs.len() * polls / total;
		Ok(statement_for(statement, state))
	}

	async fn session_log(&self, _address: &ClusterAddress, session: SessionId, from: u64, size: u64) -> Result<LogPage> {
		let mut inner = self.state.lock();
		inner.calls.push("session_log");
		inner.log_requests.push((from, size));
		let visible = inner.visible_logs;
		let start = (from as usize).min(visible);
		let end = start.saturating_add(size as usize).min(visible);
		Ok(LogPage {
			id: session,
			from,
			total: visible as u64,
			log: inner.logs[start..end].to_vec(),
		})
	}

	async fn delete_session(&self, _address: &ClusterAddress, session: SessionId) -> Result<()> {
		let mut inner = self.state.lock();
		inner.calls.push("delete_session");
		inner.deletes.push(session);
		if inner.fail_deletes {
			return Err(rejected(500, "kill failed"));
		}
		match inner.sessions.remove(&session) {
			Some(_) => Ok(()),
			None => Err(rejected(404, "session not found")),
		}
	}
}

/// In-memory [`ClusterDirectory`].
#[derive(Default)]
pub struct FakeDirectory {
	clusters: Mutex<HashMap<String, ClusterHandle>>,
	lookups: Mutex<usize>,
}

impl FakeDirectory {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&self, id: &str, state: &str, liveness: Liveness, host: Option<&str>) {
		self.clusters.lock().insert(
			id.to_string(),
			ClusterHandle {
				id: id.to_string(),
				address: host.map(ClusterAddress::new),
				liveness,
				state: state.to_string(),
			},
		);
	}

	/// Directory with one waiting cluster.
	pub fn running(id: &str, host: &str) -> Self {
		let directory = Self::new();
		directory.insert(id, "WAITING", Liveness::Running, Some(host));
		directory
	}

	/// Directory with one terminated cluster.
	pub fn terminated(id: &str) -> Self {
		let directory = Self::new();
		directory.insert(id, "TERMINATED", Liveness::Terminated, None);
		directory
	}

	pub fn lookups(&self) -> usize {
		*self.lookups.lock()
	}
}

#[async_trait]
impl ClusterDirectory for FakeDirectory {
	async fn describe(&self, cluster_id: &str) -> Result<ClusterHandle> {
		*self.lookups.lock() += 1;
		self.clusters
			.lock()
			.get(cluster_id)
			.cloned()
			.ok_or_else(|| Error::ClusterUnreachable {
				cluster_id: cluster_id.to_string(),
				reason: "unknown cluster".to_string(),
			})
	}
}
