//! Runs the built-in pipeline end to end over HTTP against in-process fakes of
//! the cluster directory, the execution endpoint and the object store.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use shortline::runtime::poll::never_cancelled;
use shortline::runtime::{EndpointOptions, HttpClusterDirectory, LivyClient, PollPolicy};
use shortline::{
	CLUSTER_ID_KEY, Config, ErrorCode, HttpObjectAcl, JsonFileStore, Orchestrator, PipelineError, PipelineState, RunOptions, Settings,
	SignalStore, combine_pipeline, state_key,
};
use tempfile::TempDir;
use tokio::net::TcpListener;

#[derive(Default)]
struct Remote {
	sessions: BTreeMap<u64, &'static str>,
	next_id: u64,
	statement_polls: BTreeMap<u64, usize>,
	logs: BTreeMap<u64, Vec<String>>,
	submitted: Vec<String>,
	deleted: Vec<u64>,
	acl_puts: Vec<(String, String, Option<String>)>,
	fail_marker_in: Option<&'static str>,
}

type Shared = Arc<Mutex<Remote>>;

#[derive(Deserialize)]
struct LogQuery {
	from: usize,
	size: usize,
}

async fn list_sessions(State(remote): State<Shared>) -> Json<Value> {
	let remote = remote.lock();
	let sessions: Vec<Value> = remote.sessions.iter().map(|(id, state)| json!({ "id": id, "state": state })).collect();
	Json(json!({ "from": 0, "total": sessions.len(), "sessions": sessions }))
}

async fn create_session(State(remote): State<Shared>) -> (StatusCode, Json<Value>) {
	let mut remote = remote.lock();
	let id = remote.next_id;
	remote.next_id += 1;
	remote.sessions.insert(id, "idle");
	(StatusCode::CREATED, Json(json!({ "id": id, "state": "starting" })))
}

async fn session_state(State(remote): State<Shared>, Path(id): Path<u64>) -> Result<Json<Value>, StatusCode> {
	let remote = remote.lock();
	let state = remote.sessions.get(&id).ok_or(StatusCode::NOT_FOUND)?;
	Ok(Json(json!({ "id": id, "state": state })))
}

async fn submit(State(remote): State<Shared>, Path(id): Path<u64>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
	let mut remote = remote.lock();
	let code = body["code"].as_str().unwrap_or_default().to_string();
	let failing = remote.fail_marker_in.is_some_and(|stage| code.contains(stage));
	let lines = if failing {
		vec!["start".to_string(), "(FAIL) task 3 of 12".to_string(), "done".to_string()]
	} else {
		vec!["start".to_string(), "done".to_string()]
	};
	remote.submitted.push(code);
	remote.logs.insert(id, lines);
	remote.sessions.insert(id, "busy");
	(StatusCode::CREATED, Json(json!({ "id": 0, "state": "waiting" })))
}

async fn statement(State(remote): State<Shared>, Path((id, sid)): Path<(u64, u64)>) -> Json<Value> {
	let mut remote = remote.lock();
	let polls = remote.statement_polls.entry(id).or_default();
	*polls += 1;
	if *polls < 2 {
		Json(json!({ "id": sid, "state": "running" }))
	} else {
		Json(json!({ "id": sid, "state": "available", "output": { "status": "ok", "execution_count": 0 } }))
	}
}

async fn session_log(State(remote): State<Shared>, Path(id): Path<u64>, Query(query): Query<LogQuery>) -> Json<Value> {
	let remote = remote.lock();
	let log = remote.logs.get(&id).cloned().unwrap_or_default();
	let start = query.from.min(log.len());
	let end = (start + query.size).min(log.len());
	Json(json!({ "id": id, "from": query.from, "total": log.len(), "log": log[start..end].to_vec() }))
}

async fn delete_session(State(remote): State<Shared>, Path(id): Path<u64>) -> StatusCode {
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
			"Cluster": { "Id": "j-live", "Name": "spark", "Status": { "State": "WAITING" }, "MasterPublicDnsName": "127.0.0.1" }
		}))),
		"j-gone" => Ok(Json(json!({
			"Cluster": { "Id": "j-gone", "Status": { "State": "TERMINATED" } }
		}))),
		_ => Err(StatusCode::NOT_FOUND),
	}
}

async fn put_acl(
	State(remote): State<Shared>,
	Path((bucket, key)): Path<(String, String)>,
	RawQuery(query): RawQuery,
	headers: HeaderMap,
) -> StatusCode {
	let acl = headers.get("x-amz-acl").and_then(|v| v.to_str().ok()).map(str::to_string);
	let mut remote = remote.lock();
	if query.as_deref() == Some("acl") {
		remote.acl_puts.push((bucket, key, acl));
	}
	StatusCode::OK
}

async fn bind(app: Router) -> u16 {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let port = listener.local_addr().unwrap().port();
	tokio::spawn(async move {
		axum::serve(listener, app).await.unwrap();
	});
	port
}

struct World {
	remote: Shared,
	dir: TempDir,
	orchestrator: Orchestrator,
	config: Config,
	object_store: String,
}

async fn world() -> World {
	let remote: Shared = Arc::new(Mutex::new(Remote::default()));
	remote.lock().sessions.insert(3, "dead");
	remote.lock().next_id = 10;

	let livy = Router::new()
		.route("/sessions", get(list_sessions).post(create_session))
		.route("/sessions/{id}", axum::routing::delete(delete_session))
		.route("/sessions/{id}/state", get(session_state))
		.route("/sessions/{id}/statements", post(submit))
		.route("/sessions/{id}/statements/{sid}", get(statement))
		.route("/sessions/{id}/log", get(session_log))
		.route("/clusters/{id}", get(describe_cluster))
		.with_state(remote.clone());
	let livy_port = bind(livy).await;

	let s3 = Router::new().route("/{bucket}/{key}", put(put_acl)).with_state(remote.clone());
	let s3_port = bind(s3).await;

	let dir = TempDir::new().unwrap();
	for file in ["combine.py", "combine_quality.py", "common.py", "helpers.py"] {
		std::fs::write(dir.path().join(file), format!("# {file}\n")).unwrap();
	}

	let mut config = Config::default();
	config.pipeline.etl_dir = dir.path().to_path_buf();
	config.app.db_host = "s3a://short-interest-data".to_string();
	config.aws.access_key_id = "AKIDEXAMPLE".to_string();
	config.aws.secret_access_key = "wJalrXUtnFEMI".to_string();
	config.cluster.endpoint_port = livy_port;

	let store = Arc::new(JsonFileStore::new(dir.path().join("signals.json")));
	store.set(CLUSTER_ID_KEY, "j-live").unwrap();

	let directory = HttpClusterDirectory::new(&format!("http://127.0.0.1:{livy_port}"), Duration::from_secs(5)).unwrap();
	let endpoint = LivyClient::new(EndpointOptions {
		port: livy_port,
		..EndpointOptions::default()
	})
	.unwrap();
	let poll = PollPolicy::new(Duration::from_millis(5), 20);
	let orchestrator = Orchestrator::new(Arc::new(directory), Arc::new(endpoint), store).with_settings(Settings {
		session_poll: poll,
		job_poll: poll,
		sensor_poll: poll,
		..config.settings()
	});

	World {
		remote,
		dir,
		orchestrator,
		config,
		object_store: format!("http://127.0.0.1:{s3_port}"),
	}
}

fn run_date() -> NaiveDate {
	NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
}

#[tokio::test]
async fn clean_run_publishes_the_analysis_and_completes() {
	let w = world().await;
	let acl = Arc::new(HttpObjectAcl::new(&w.object_store, Duration::from_secs(5)).unwrap());
	let pipeline = combine_pipeline(&w.config, run_date(), acl).unwrap();

	let report = w
		.orchestrator
		.run_pipeline(&pipeline, &RunOptions::default(), &mut never_cancelled())
		.await
		.unwrap();

	assert_eq!(report.state, PipelineState::Completed);
	assert_eq!(report.stages.len(), 2);

	let remote = w.remote.lock();
	assert_eq!(remote.submitted.len(), 2);
	assert!(remote.submitted[0].starts_with("YESTERDAY_DATE = \"2024-01-01\"\n"));
	assert!(remote.submitted[0].ends_with("# combine.py\n"));
	assert!(remote.submitted[1].ends_with("# combine_quality.py\n"));
	// The dead straggler, then one session per stage.
	assert_eq!(remote.deleted, vec![3, 10, 11]);
	assert_eq!(
		remote.acl_puts,
		vec![(
			"short-interest-data".to_string(),
			"short_analysis.csv".to_string(),
			Some("public-read".to_string())
		)]
	);
	drop(remote);

	let store = JsonFileStore::new(w.dir.path().join("signals.json"));
	assert_eq!(store.get(&state_key("combine")).unwrap().as_deref(), Some("COMPLETED"));
}

#[tokio::test]
async fn marker_in_first_stage_stops_the_run() {
	let w = world().await;
	w.remote.lock().fail_marker_in = Some("# combine.py");
	let acl = Arc::new(HttpObjectAcl::new(&w.object_store, Duration::from_secs(5)).unwrap());
	let pipeline = combine_pipeline(&w.config, run_date(), acl).unwrap();

	let err = w
		.orchestrator
		.run_pipeline(&pipeline, &RunOptions::default(), &mut never_cancelled())
		.await
		.unwrap_err();

	assert!(matches!(err, PipelineError::JobFailure { ref stage, .. } if stage == "combine_datasets"));
	let remote = w.remote.lock();
	assert_eq!(remote.submitted.len(), 1);
	assert_eq!(remote.deleted, vec![3, 10]);
	assert!(remote.acl_puts.is_empty());
	drop(remote);

	let store = JsonFileStore::new(w.dir.path().join("signals.json"));
	assert_eq!(store.get(&state_key("combine")).unwrap().as_deref(), Some("FAILED"));
}

#[tokio::test]
async fn terminated_cluster_fails_before_any_session() {
	let w = world().await;
	let acl = Arc::new(HttpObjectAcl::new(&w.object_store, Duration::from_secs(5)).unwrap());
	let pipeline = combine_pipeline(&w.config, run_date(), acl).unwrap();
	let options = RunOptions {
		cluster_id: Some("j-gone".to_string()),
		..RunOptions::default()
	};

	let err = w
		.orchestrator
		.run_pipeline(&pipeline, &options, &mut never_cancelled())
		.await
		.unwrap_err();

	assert_eq!(err.code(), ErrorCode::ClusterUnreachable);
	let remote = w.remote.lock();
	assert!(remote.submitted.is_empty());
	assert!(remote.deleted.is_empty());
	assert_eq!(remote.next_id, 10);
}
