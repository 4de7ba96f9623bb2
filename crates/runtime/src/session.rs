//! Interactive session lifecycle on a resolved cluster endpoint.
//!
//! The endpoint never garbage-collects sessions on its own, so a new session is
//! always preceded by reclaiming inactive ones left behind by earlier runs.

use serde::Serialize;
use shortline_protocol::{CreateSessionRequest, SessionId, SessionInfo, SessionPhase, SessionState};
use tracing::{debug, error, info, warn};

use crate::cluster::ClusterAddress;
use crate::endpoint::ExecutionEndpoint;
use crate::error::{Error, Result};
use crate::poll::{CancelSignal, PollPolicy, pause};

/// A session opened by this process.
///
/// Not `Clone`: the handle is consumed by [`SessionManager::terminate`].
#[derive(Debug, Serialize)]
pub struct SessionHandle {
	pub id: SessionId,
	pub address: ClusterAddress,
	pub phase: SessionPhase,
}

/// Selects sessions that can be reclaimed from a snapshot of remote state.
pub fn select_inactive(sessions: &[SessionInfo]) -> Vec<SessionId> {
	sessions.iter().filter(|s| s.state.is_inactive()).map(|s| s.id).collect()
}

/// Opens, waits on and terminates sessions for one caller.
pub struct SessionManager<'a> {
	endpoint: &'a dyn ExecutionEndpoint,
	policy: PollPolicy,
	request: CreateSessionRequest,
}

impl<'a> SessionManager<'a> {
	pub fn new(endpoint: &'a dyn ExecutionEndpoint, policy: PollPolicy) -> Self {
		Self {
			endpoint,
			policy,
			request: CreateSessionRequest::default(),
		}
	}

	/// Overrides the body sent when creating sessions.
	pub fn with_request(mut self, request: CreateSessionRequest) -> Self {
		self.request = request;
		self
	}

	/// Lists every session currently known to the endpoint.
	pub async fn list(&self, address: &ClusterAddress) -> Result<Vec<SessionInfo>> {
		self.endpoint.list_sessions(address).await
	}

	/// Terminates every session that is not in active use.
	///
	/// Returns the ids that were terminated. Individual kill failures are logged
	/// and skipped; a second call with no new sessions is a no-op.
	pub async fn kill_inactive_sessions(&self, address: &ClusterAddress) -> Result<Vec<SessionId>> {
		let sessions = self.endpoint.list_sessions(address).await.map_err(|e| {
			error!(target: "shortline.session", %address, error = %e, "failed to enumerate sessions");
			Error::SessionCreate {
				address: address.to_string(),
				reason: format!("cannot enumerate sessions: {e}"),
			}
		})?;

		let mut killed = Vec::new();
		for id in select_inactive(&sessions) {
			match self.endpoint.delete_session(address, id).await {
				Ok(()) => {
					info!(target: "shortline.session", %address, session_id = %id, "killed inactive session");
					killed.push(id);
				}
				Err(e) if e.is_not_found() => {
					debug!(target: "shortline.session", session_id = %id, "inactive session already gone");
				}
				Err(e) => {
					warn!(target: "shortline.session", %address, session_id = %id, error = %e, "failed to kill inactive session");
				}
			}
		}
		Ok(killed)
	}

	/// Opens a new session.
	pub async fn create_session(&self, address: &ClusterAddress) -> Result<SessionHandle> {
		let info = self.endpoint.create_session(address, &self.request).await.map_err(|e| {
			error!(target: "shortline.session", %address, error = %e, "session creation failed");
			Error::SessionCreate {
				address: address.to_string(),
				reason: e.to_string(),
			}
		})?;
		info!(target: "shortline.session", %address, session_id = %info.id, state = %info.state, "session created");
		Ok(SessionHandle {
			id: info.id,
			address: address.clone(),
			phase: info.state.phase(),
		})
	}

	/// Polls the session until it is idle.
	///
	/// A session that dies while starting fails immediately instead of waiting
	/// out the remaining attempts.
	pub async fn wait_until_ready(&self, session: &mut SessionHandle, cancel: &mut CancelSignal) -> Result<()> {
		for attempt in 1..=self.policy.max_attempts {
			let state = self.endpoint.session_state(&session.address, session.id).await?;
			session.phase = state.phase();
			debug!(target: "shortline.session", session_id = %session.id, %state, attempt, "session state");

			if state == SessionState::Idle {
				info!(target: "shortline.session", session_id = %session.id, "session ready");
				return Ok(());
			}
			if state.is_final() {
				error!(target: "shortline.session", session_id = %session.id, %state, "session died before becoming ready");
				return Err(Error::SessionCreate {
					address: session.address.to_string(),
					reason: format!("session {} entered state {state}", session.id),
				});
			}
			if attempt < self.policy.max_attempts {
				pause(self.policy.interval, cancel).await?;
			}
		}

		error!(target: "shortline.session", session_id = %session.id, attempts = self.policy.max_attempts, "session never became ready");
		Err(self.policy.timeout(format!("session {} readiness", session.id)))
	}

	/// Kills the session, consuming the handle.
	///
	/// Failures are logged and reported as `false`; they never propagate.
	pub async fn terminate(&self, mut session: SessionHandle) -> bool {
		match self.endpoint.delete_session(&session.address, session.id).await {
			Ok(()) => {
				session.phase = SessionPhase::Dead;
				info!(target: "shortline.session", session_id = %session.id, "session terminated");
				true
			}
			Err(e) if e.is_not_found() => {
				debug!(target: "shortline.session", session_id = %session.id, "session already gone");
				true
			}
			Err(e) => {
				let cleanup = Error::Cleanup {
					session_id: session.id,
					reason: e.to_string(),
				};
				warn!(target: "shortline.session", session_id = %session.id, error = %cleanup, "session cleanup failed");
				false
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;
	use crate::poll::never_cancelled;
	use crate::fake::FakeEndpoint;

	fn info(id: u64, state: SessionState) -> SessionInfo {
		SessionInfo {
			id: SessionId(id),
			state,
			kind: None,
			app_id: None,
			name: None,
		}
	}

	fn fast() -> PollPolicy {
		PollPolicy::new(Duration::from_millis(1), 5)
	}

	#[test]
	fn select_inactive_skips_busy_and_starting() {
		let snapshot = vec![
			info(1, SessionState::Idle),
			info(2, SessionState::Busy),
			info(3, SessionState::Dead),
			info(4, SessionState::Starting),
			info(5, SessionState::Error),
			info(6, SessionState::Unknown),
		];
		assert_eq!(select_inactive(&snapshot), vec![SessionId(1), SessionId(3), SessionId(5)]);
	}

	#[test]
	fn select_inactive_on_empty_snapshot_is_empty() {
		assert!(select_inactive(&[]).is_empty());
	}

	#[tokio::test]
	async fn kill_inactive_sessions_is_idempotent() {
		let endpoint = FakeEndpoint::new();
		endpoint.seed_session(SessionId(1), SessionState::Idle);
		endpoint.seed_session(SessionId(2), SessionState::Busy);
		endpoint.seed_session(SessionId(3), SessionState::Dead);
		let manager = SessionManager::new(&endpoint, fast());
		let address = ClusterAddress::new("master");

		let first = manager.kill_inactive_sessions(&address).await.unwrap();
		assert_eq!(first, vec![SessionId(1), SessionId(3)]);

		let second = manager.kill_inactive_sessions(&address).await.unwrap();
		assert!(second.is_empty());
		assert_eq!(endpoint.delete_count(), 2);
	}

	#[tokio::test]
	async fn wait_until_ready_polls_until_idle() {
		let endpoint = FakeEndpoint::new();
		endpoint.script_session_states(&[SessionState::Starting, SessionState::Starting, SessionState::Idle]);
		let manager = SessionManager::new(&endpoint, fast());
		let mut session = manager.create_session(&ClusterAddress::new("master")).await.unwrap();
		let mut cancel = never_cancelled();

		manager.wait_until_ready(&mut session, &mut cancel).await.unwrap();
		assert_eq!(session.phase, SessionPhase::Idle);
		assert_eq!(endpoint.state_polls(), 3);
	}

	#[tokio::test]
	async fn wait_until_ready_times_out() {
		let endpoint = FakeEndpoint::new();
		endpoint.script_session_states(&[SessionState::Starting]);
		let manager = SessionManager::new(&endpoint, fast());
		let mut session = manager.create_session(&ClusterAddress::new("master")).await.unwrap();
		let mut cancel = never_cancelled();

		let err = manager.wait_until_ready(&mut session, &mut cancel).await.unwrap_err();
		assert!(matches!(err, Error::Timeout { attempts: 5, .. }));
		assert_eq!(endpoint.state_polls(), 5);
	}

	#[tokio::test]
	async fn dead_session_fails_fast() {
		let endpoint = FakeEndpoint::new();
		endpoint.script_session_states(&[SessionState::Starting, SessionState::Dead]);
		let manager = SessionManager::new(&endpoint, fast());
		let mut session = manager.create_session(&ClusterAddress::new("master")).await.unwrap();
		let mut cancel = never_cancelled();

		let err = manager.wait_until_ready(&mut session, &mut cancel).await.unwrap_err();
		assert!(matches!(err, Error::SessionCreate { .. }));
		assert_eq!(endpoint.state_polls(), 2);
	}

	#[tokio::test]
	async fn rejected_creation_is_session_create_error() {
		let endpoint = FakeEndpoint::new();
		endpoint.reject_session_creation("cluster at capacity");
		let manager = SessionManager::new(&endpoint, fast());
		let err = manager.create_session(&ClusterAddress::new("master")).await.unwrap_err();
		match err {
			Error::SessionCreate { address, reason } => {
				assert_eq!(address, "master");
				assert!(reason.contains("capacity"));
			}
			other => panic!("unexpected error: {other:?}"),
		}
	}

	#[tokio::test]
	async fn terminate_failure_is_swallowed() {
		let endpoint = FakeEndpoint::new();
		let manager = SessionManager::new(&endpoint, fast());
		let session = manager.create_session(&ClusterAddress::new("master")).await.unwrap();
		endpoint.fail_deletes();
		assert!(!manager.terminate(session).await);
		assert_eq!(endpoint.delete_count(), 1);
	}
}
