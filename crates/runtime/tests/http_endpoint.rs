//! Drives the HTTP clients against an in-process REST endpoint.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use shortline_runtime::poll::never_cancelled;
use shortline_runtime::protocol::SessionId;
use shortline_runtime::{
	ClusterAddress, ClusterClient, EndpointOptions, Error, HttpClusterDirectory, JobDescriptor, JobSubmitter, JobTracker, LivyClient, PollPolicy,
	SessionManager, TerminalStatus, Verdict,
};
use tokio::net::TcpListener;

#[derive(Default)]
struct Remote {
	sessions: BTreeMap<u64, &'static str>,
	next_id: u64,
	state_polls: usize,
	statement_polls: usize,
	log: Vec<String>,
	code: Vec<String>,
	deleted: Vec<u64>,
	missing_requested_by: usize,
}

type Shared = Arc<Mutex<Remote>>;

#[derive(Deserialize)]
struct LogQuery {
	from: usize,
	size: usize,
}

fn requested_by(remote: &Shared, headers: &HeaderMap) {
	if !headers.contains_key("x-requested-by") {
		remote.lock().missing_requested_by += 1;
	}
}

async fn list_sessions(State(remote): State<Shared>) -> Json<Value> {
	let remote = remote.lock();
	let sessions: Vec<Value> = remote.sessions.iter().map(|(id, state)| json!({ "id": id, "state": state })).collect();
	Json(json!({ "from": 0, "total": sessions.len(), "sessions": sessions }))
}

async fn create_session(State(remote): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
	requested_by(&remote, &headers);
	assert_eq!(body["kind"], "pyspark");
	let mut remote = remote.lock();
	let id = remote.next_id;
	remote.next_id += 1;
	remote.sessions.insert(id, "starting");
	(StatusCode::CREATED, Json(json!({ "id": id, "state": "starting", "kind": "pyspark" })))
}

async fn session_state(State(remote): State<Shared>, Path(id): Path<u64>) -> Result<Json<Value>, StatusCode> {
	let mut remote = remote.lock();
	remote.state_polls += 1;
	let polls = remote.state_polls;
	let state = remote.sessions.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
	if *state == "starting" && polls >= 2 {
		*state = "idle";
	}
	Ok(Json(json!({ "id": id, "state": *state })))
}

async fn submit(State(remote): State<Shared>, headers: HeaderMap, Path(id): Path<u64>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
	requested_by(&remote, &headers);
	let mut remote = remote.lock();
	remote.code.push(body["code"].as_str().unwrap_or_default().to_string());
	remote.sessions.insert(id, "busy");
	(StatusCode::CREATED, Json(json!({ "id": 0, "state": "waiting", "output": null })))
}

async fn statement(State(remote): State<Shared>, Path((_id, sid)): Path<(u64, u64)>) -> Json<Value> {
	let mut remote = remote.lock();
	remote.statement_polls += 1;
	match remote.statement_polls {
		1 => {
			remote.log.push("start".to_string());
			Json(json!({ "id": sid, "state": "running", "progress": 0.5 }))
		}
		_ => {
			remote.log.push("(FAIL) task 3 of 12".to_string());
			remote.log.push("done".to_string());
			Json(json!({ "id": sid, "state": "available", "progress": 1.0, "output": { "status": "ok", "execution_count": 0, "data": {} } }))
		}
	}
}

async fn session_log(State(remote): State<Shared>, Path(id): Path<u64>, Query(query): Query<LogQuery>) -> Json<Value> {
	let remote = remote.lock();
	let start = query.from.min(remote.log.len());
	let end = (start + query.size).min(remote.log.len());
	Json(json!({ "id": id, "from": query.from, "total": remote.log.len(), "log": remote.log[start..end].to_vec() }))
}

async fn delete_session(State(remote): State<Shared>, headers: HeaderMap, Path(id): Path<u64>) -> StatusCode {
	requested_by(&remote, &headers);
	let mut remote = remote.lock();
	remote.deleted.push(id);
	match remote.sessions.remove(&id) {
		Some(_) => StatusCode::OK,
		None => StatusCode::NOT_FOUND,
	}
}

async fn describe_cluster(Path(id): Path<String>) -> Result<Json<Value>, StatusCode> {
	match id.as_str() {
		"j-live" => Ok(Json(json!({
			"Cluster": { "Id": "j-live", "Status": { "State": "WAITING" }, "MasterPublicDnsName": "127.0.0.1" }
		}))),
		"j-gone" => Ok(Json(json!({
			"Cluster": { "Id": "j-gone", "Status": { "State": "TERMINATED_WITH_ERRORS" } }
		}))),
		_ => Err(StatusCode::NOT_FOUND),
	}
}

async fn serve(remote: Shared) -> u16 {
	let app = Router::new()
		.route("/sessions", get(list_sessions).post(create_session))
		.route("/sessions/{id}", axum::routing::delete(delete_session))
		.route("/sessions/{id}/state", get(session_state))
		.route("/sessions/{id}/statements", axum::routing::post(submit))
		.route("/sessions/{id}/statements/{sid}", get(statement))
		.route("/sessions/{id}/log", get(session_log))
		.route("/clusters/{id}", get(describe_cluster))
		.with_state(remote);
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let port = listener.local_addr().unwrap().port();
	tokio::spawn(async move {
		axum::serve(listener, app).await.unwrap();
	});
	port
}

fn fast(max_attempts: u32) -> PollPolicy {
	PollPolicy::new(Duration::from_millis(5), max_attempts)
}

#[tokio::test]
async fn full_lifecycle_over_http() {
	let remote: Shared = Arc::new(Mutex::new(Remote::default()));
	remote.lock().sessions.insert(41, "idle");
	remote.lock().sessions.insert(42, "busy");
	remote.lock().next_id = 43;
	let port = serve(remote.clone()).await;

	let dir = tempfile::TempDir::new().unwrap();
	let payload = dir.path().join("combine.py");
	std::fs::write(&payload, "logger.warn('done!')\n").unwrap();

	let client = LivyClient::new(EndpointOptions {
		port,
		..EndpointOptions::default()
	})
	.unwrap();
	let address = ClusterAddress::new("127.0.0.1");
	let manager = SessionManager::new(&client, fast(10));
	let mut cancel = never_cancelled();

	let killed = manager.kill_inactive_sessions(&address).await.unwrap();
	assert_eq!(killed, vec![SessionId(41)]);

	let mut session = manager.create_session(&address).await.unwrap();
	assert_eq!(session.id, SessionId(43));
	manager.wait_until_ready(&mut session, &mut cancel).await.unwrap();

	let descriptor = JobDescriptor::builder("combine_datasets", &payload)
		.arg("YESTERDAY_DATE", "2024-01-01")
		.secret("AWS_SECRET_ACCESS_KEY", "s3cr3t")
		.build();
	let handle = JobSubmitter::new(&client).submit(&mut session, &descriptor).await.unwrap();
	let report = JobTracker::new(&client, fast(10)).track(&handle, &mut cancel).await.unwrap();
	assert!(manager.terminate(session).await);

	assert_eq!(report.status, TerminalStatus::Ok);
	assert_eq!(report.verdict, Verdict::Failure);
	assert_eq!(report.logs.len(), 3);

	let remote = remote.lock();
	assert_eq!(remote.deleted, vec![41, 43]);
	assert_eq!(remote.code.len(), 1);
	assert!(remote.code[0].starts_with("YESTERDAY_DATE = \"2024-01-01\"\nAWS_SECRET_ACCESS_KEY = \"s3cr3t\"\n"));
	assert!(remote.code[0].ends_with("logger.warn('done!')\n"));
	assert_eq!(remote.missing_requested_by, 0);
}

#[tokio::test]
async fn terminate_treats_missing_session_as_gone() {
	let remote: Shared = Arc::new(Mutex::new(Remote::default()));
	let port = serve(remote.clone()).await;
	let client = LivyClient::new(EndpointOptions {
		port,
		..EndpointOptions::default()
	})
	.unwrap();
	let manager = SessionManager::new(&client, fast(3));
	let address = ClusterAddress::new("127.0.0.1");

	let session = manager.create_session(&address).await.unwrap();
	remote.lock().sessions.clear();
	assert!(manager.terminate(session).await);
}

#[tokio::test]
async fn cluster_directory_reports_liveness() {
	let remote: Shared = Arc::new(Mutex::new(Remote::default()));
	let port = serve(remote).await;
	let directory = HttpClusterDirectory::new(&format!("http://127.0.0.1:{port}"), Duration::from_secs(5)).unwrap();
	let clusters = ClusterClient::new(&directory);

	let address = clusters.resolve_address("j-live").await.unwrap();
	assert_eq!(address.host(), "127.0.0.1");
	assert!(clusters.is_terminated("j-gone").await.unwrap());

	let err = clusters.resolve_address("j-gone").await.unwrap_err();
	assert!(matches!(err, Error::ClusterUnreachable { ref cluster_id, .. } if cluster_id == "j-gone"));

	let err = clusters.describe("j-missing").await.unwrap_err();
	assert!(matches!(err, Error::ClusterUnreachable { .. }));
}
