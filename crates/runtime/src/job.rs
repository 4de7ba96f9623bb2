//! Unit-of-work descriptors and submission.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use shortline_protocol::{SessionId, SessionKind, SessionPhase, StatementId, SubmitStatementRequest};
use tracing::{error, info};

use crate::cluster::ClusterAddress;
use crate::endpoint::ExecutionEndpoint;
use crate::error::{Error, Result};
use crate::session::SessionHandle;

/// Scalar argument value bound into a job's namespace.
#[derive(Clone, PartialEq)]
pub enum ArgValue {
	Str(String),
	Int(i64),
	Float(f64),
	Bool(bool),
	/// Credential; rendered into the payload but never logged.
	Secret(String),
}

impl ArgValue {
	/// Source literal for the pyspark interpreter.
	pub fn literal(&self) -> String {
		match self {
			ArgValue::Str(s) | ArgValue::Secret(s) => serde_json::Value::String(s.clone()).to_string(),
			ArgValue::Int(i) => i.to_string(),
			ArgValue::Float(f) if f.is_finite() => format!("{f:?}"),
			ArgValue::Float(f) if f.is_nan() => "float('nan')".to_string(),
			ArgValue::Float(f) => format!("float('{}inf')", if f.is_sign_negative() { "-" } else { "" }),
			ArgValue::Bool(true) => "True".to_string(),
			ArgValue::Bool(false) => "False".to_string(),
		}
	}

	pub fn is_secret(&self) -> bool {
		matches!(self, ArgValue::Secret(_))
	}
}

impl fmt::Debug for ArgValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ArgValue::Str(s) => f.debug_tuple("Str").field(s).finish(),
			ArgValue::Int(i) => f.debug_tuple("Int").field(i).finish(),
			ArgValue::Float(v) => f.debug_tuple("Float").field(v).finish(),
			ArgValue::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
			ArgValue::Secret(_) => f.write_str("Secret(***)"),
		}
	}
}

impl From<&str> for ArgValue {
	fn from(value: &str) -> Self {
		ArgValue::Str(value.to_string())
	}
}

impl From<String> for ArgValue {
	fn from(value: String) -> Self {
		ArgValue::Str(value)
	}
}

impl From<i64> for ArgValue {
	fn from(value: i64) -> Self {
		ArgValue::Int(value)
	}
}

impl From<f64> for ArgValue {
	fn from(value: f64) -> Self {
		ArgValue::Float(value)
	}
}

impl From<bool> for ArgValue {
	fn from(value: bool) -> Self {
		ArgValue::Bool(value)
	}
}

/// Immutable description of one remote job.
#[derive(Debug, Clone)]
pub struct JobDescriptor {
	name: String,
	payload: PathBuf,
	args: Vec<(String, ArgValue)>,
	modules: Vec<PathBuf>,
}

impl JobDescriptor {
	pub fn builder(name: impl Into<String>, payload: impl Into<PathBuf>) -> JobDescriptorBuilder {
		JobDescriptorBuilder {
			inner: JobDescriptor {
				name: name.into(),
				payload: payload.into(),
				args: Vec::new(),
				modules: Vec::new(),
			},
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn payload(&self) -> &Path {
		&self.payload
	}

	/// Arguments in declaration order.
	pub fn args(&self) -> &[(String, ArgValue)] {
		&self.args
	}

	pub fn arg(&self, name: &str) -> Option<&ArgValue> {
		self.args.iter().find(|(k, _)| k == name).map(|(_, v)| v)
	}

	/// Auxiliary modules loaded before the payload, in order.
	pub fn modules(&self) -> &[PathBuf] {
		&self.modules
	}

	/// Argument names, with secrets included by name only.
	pub fn arg_names(&self) -> Vec<&str> {
		self.args.iter().map(|(k, _)| k.as_str()).collect()
	}

	/// Composes the submitted code: argument bindings, then modules, then the
	/// payload.
	pub async fn compose(&self) -> std::io::Result<String> {
		let mut code = String::new();
		for (name, value) in &self.args {
			code.push_str(name);
			code.push_str(" = ");
			code.push_str(&value.literal());
			code.push('\n');
		}
		for path in self.modules.iter().chain(std::iter::once(&self.payload)) {
			let source = tokio::fs::read_to_string(path)
				.await
				.map_err(|e| std::io::Error::new(e.kind(), format!("cannot read {}: {e}", path.display())))?;
			code.push('\n');
			code.push_str(&source);
			if !source.ends_with('\n') {
				code.push('\n');
			}
		}
		Ok(code)
	}
}

/// Builder for [`JobDescriptor`]; the descriptor is frozen by [`build`](Self::build).
#[derive(Debug)]
pub struct JobDescriptorBuilder {
	inner: JobDescriptor,
}

impl JobDescriptorBuilder {
	/// Binds an argument; a repeated name replaces the earlier value in place.
	pub fn arg(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
		let name = name.into();
		let value = value.into();
		match self.inner.args.iter_mut().find(|(k, _)| *k == name) {
			Some(slot) => slot.1 = value,
			None => self.inner.args.push((name, value)),
		}
		self
	}

	pub fn secret(self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.arg(name, ArgValue::Secret(value.into()))
	}

	pub fn module(mut self, path: impl Into<PathBuf>) -> Self {
		self.inner.modules.push(path.into());
		self
	}

	pub fn build(self) -> JobDescriptor {
		self.inner
	}
}

/// Correlates a submitted descriptor with its running statement.
#[derive(Debug, Clone, Serialize)]
pub struct JobHandle {
	pub stage: String,
	pub session: SessionId,
	pub address: ClusterAddress,
	pub statement: StatementId,
}

impl fmt::Display for JobHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}", self.session, self.statement)
	}
}

/// Submits descriptors through an idle session.
pub struct JobSubmitter<'a> {
	endpoint: &'a dyn ExecutionEndpoint,
	kind: SessionKind,
}

impl<'a> JobSubmitter<'a> {
	pub fn new(endpoint: &'a dyn ExecutionEndpoint) -> Self {
		Self {
			endpoint,
			kind: SessionKind::Pyspark,
		}
	}

	/// Interpreter the statement is submitted to; matches the session kind.
	pub fn with_kind(mut self, kind: SessionKind) -> Self {
		self.kind = kind;
		self
	}

	/// Submits `descriptor` and marks the session busy.
	pub async fn submit(&self, session: &mut SessionHandle, descriptor: &JobDescriptor) -> Result<JobHandle> {
		let session_id = session.id;
		let reject = |reason: String| {
			error!(target: "shortline.job", %session_id, stage = descriptor.name(), %reason, "submission rejected");
			Error::Submission { session_id, reason }
		};

		if session.phase != SessionPhase::Idle {
			return Err(reject(format!("session is {:?}, expected idle", session.phase)));
		}

		let code = descriptor.compose().await.map_err(|e| reject(e.to_string()))?;
		let request = SubmitStatementRequest { code, kind: self.kind };
		let statement = self
			.endpoint
			.submit_statement(&session.address, session_id, &request)
			.await
			.map_err(|e| reject(e.to_string()))?;

		session.phase = SessionPhase::Busy;
		info!(
			target: "shortline.job",
			%session_id,
			statement_id = %statement.id,
			stage = descriptor.name(),
			payload = %descriptor.payload().display(),
			args = ?descriptor.arg_names(),
			"job submitted"
		);

		Ok(JobHandle {
			stage: descriptor.name().to_string(),
			session: session_id,
			address: session.address.clone(),
			statement: statement.id,
		})
	}
}

#[cfg(test)]
mod tests {
	use std::fs;

	use shortline_protocol::SessionState;
	use tempfile::TempDir;

	use super::*;
	use crate::fake::FakeEndpoint;

	fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
		let path = dir.path().join(name);
		fs::write(&path, content).unwrap();
		path
	}

	fn idle_session() -> SessionHandle {
		SessionHandle {
			id: SessionId(7),
			address: ClusterAddress::new("master"),
			phase: SessionPhase::Idle,
		}
	}

	#[test]
	fn literals_render_scalars() {
		assert_eq!(ArgValue::from("2024-01-01").literal(), "\"2024-01-01\"");
		assert_eq!(ArgValue::from("it's \"quoted\"").literal(), r#""it's \"quoted\"""#);
		assert_eq!(ArgValue::Int(12).literal(), "12");
		assert_eq!(ArgValue::Float(1.0).literal(), "1.0");
		assert_eq!(ArgValue::Bool(true).literal(), "True");
	}

	#[test]
	fn secrets_are_redacted_in_debug() {
		let descriptor = JobDescriptor::builder("combine_datasets", "combine.py")
			.secret("AWS_SECRET_ACCESS_KEY", "hunter2")
			.build();
		let rendered = format!("{descriptor:?}");
		assert!(!rendered.contains("hunter2"));
		assert!(rendered.contains("Secret(***)"));
	}

	#[test]
	fn repeated_argument_replaces_in_place() {
		let descriptor = JobDescriptor::builder("s", "p.py").arg("A", "1").arg("B", "2").arg("A", "3").build();
		assert_eq!(descriptor.arg_names(), vec!["A", "B"]);
		assert_eq!(descriptor.arg("A"), Some(&ArgValue::from("3")));
	}

	#[tokio::test]
	async fn compose_orders_args_modules_payload() {
		let dir = TempDir::new().unwrap();
		let common = write(&dir, "common.py", "def common(): pass");
		let payload = write(&dir, "combine.py", "print('combine')\n");
		let descriptor = JobDescriptor::builder("combine_datasets", &payload)
			.arg("YESTERDAY_DATE", "2024-01-01")
			.module(&common)
			.build();

		let code = descriptor.compose().await.unwrap();
		assert_eq!(code, "YESTERDAY_DATE = \"2024-01-01\"\n\ndef common(): pass\n\nprint('combine')\n");
	}

	#[tokio::test]
	async fn submit_marks_session_busy_and_passes_code() {
		let dir = TempDir::new().unwrap();
		let payload = write(&dir, "combine.py", "run()\n");
		let endpoint = FakeEndpoint::new();
		endpoint.seed_session(SessionId(7), SessionState::Idle);
		let descriptor = JobDescriptor::builder("combine_datasets", &payload).arg("DB_HOST", "s3a://bucket").build();
		let mut session = idle_session();

		let handle = JobSubmitter::new(&endpoint).submit(&mut session, &descriptor).await.unwrap();
		assert_eq!(handle.session, SessionId(7));
		assert_eq!(handle.stage, "combine_datasets");
		assert_eq!(session.phase, SessionPhase::Busy);

		let submitted = endpoint.submitted();
		assert_eq!(submitted.len(), 1);
		assert!(submitted[0].code.starts_with("DB_HOST = \"s3a://bucket\"\n"));
		assert_eq!(submitted[0].kind, SessionKind::Pyspark);
	}

	#[tokio::test]
	async fn busy_session_rejects_second_job() {
		let dir = TempDir::new().unwrap();
		let payload = write(&dir, "combine.py", "run()\n");
		let endpoint = FakeEndpoint::new();
		let descriptor = JobDescriptor::builder("combine_datasets", &payload).build();
		let mut session = idle_session();
		session.phase = SessionPhase::Busy;

		let err = JobSubmitter::new(&endpoint).submit(&mut session, &descriptor).await.unwrap_err();
		assert!(matches!(err, Error::Submission { session_id: SessionId(7), .. }));
		assert!(!endpoint.was_contacted());
	}

	#[tokio::test]
	async fn missing_payload_is_submission_error() {
		let endpoint = FakeEndpoint::new();
		let descriptor = JobDescriptor::builder("combine_datasets", "/nonexistent/combine.py").build();
		let mut session = idle_session();

		let err = JobSubmitter::new(&endpoint).submit(&mut session, &descriptor).await.unwrap_err();
		match err {
			Error::Submission { reason, .. } => assert!(reason.contains("/nonexistent/combine.py")),
			other => panic!("unexpected error: {other:?}"),
		}
		assert_eq!(session.phase, SessionPhase::Idle);
	}

	#[tokio::test]
	async fn endpoint_rejection_is_submission_error() {
		let dir = TempDir::new().unwrap();
		let payload = write(&dir, "combine.py", "run()\n");
		let endpoint = FakeEndpoint::new();
		endpoint.seed_session(SessionId(7), SessionState::Idle);
		endpoint.reject_submission("malformed code");
		let descriptor = JobDescriptor::builder("combine_datasets", &payload).build();
		let mut session = idle_session();

		let err = JobSubmitter::new(&endpoint).submit(&mut session, &descriptor).await.unwrap_err();
		assert!(matches!(err, Error::Submission { .. }));
	}
}
