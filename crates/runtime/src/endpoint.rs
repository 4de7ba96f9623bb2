//! Remote execution endpoint seam and its HTTP implementation.
//!
//! The endpoint exposes interactive sessions over REST:
//!
//! | operation | request |
//! |---|---|
//! | list sessions | `GET /sessions` |
//! | create session | `POST /sessions` |
//! | session state | `GET /sessions/{id}/state` |
//! | submit statement | `POST /sessions/{id}/statements` |
//! | statement state | `GET /sessions/{id}/statements/{sid}` |
//! | session log | `GET /sessions/{id}/log?from=&size=` |
//! | kill session | `DELETE /sessions/{id}` |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shortline_protocol::{
	CreateSessionRequest, LogPage, SessionId, SessionInfo, SessionList, SessionState, SessionStateResponse, Statement, StatementId,
	SubmitStatementRequest,
};
use tracing::trace;
use url::Url;

use crate::cluster::ClusterAddress;
use crate::error::{Error, Result};

/// Default port the execution endpoint listens on.
pub const DEFAULT_ENDPOINT_PORT: u16 = 8998;

/// Header required by endpoints running with CSRF protection enabled.
const REQUESTED_BY_HEADER: &str = "X-Requested-By";

/// Operations the lifecycle components need from the execution endpoint.
///
/// Every call is a single read or write against the endpoint; none of them
/// retry.
#[async_trait]
pub trait ExecutionEndpoint: Send + Sync {
	async fn list_sessions(&self, address: &ClusterAddress) -> Result<Vec<SessionInfo>>;

	async fn create_session(&self, address: &ClusterAddress, request: &CreateSessionRequest) -> Result<SessionInfo>;

	async fn session_state(&self, address: &ClusterAddress, session: SessionId) -> Result<SessionState>;

	async fn submit_statement(&self, address: &ClusterAddress, session: SessionId, request: &SubmitStatementRequest) -> Result<Statement>;

	async fn statement(&self, address: &ClusterAddress, session: SessionId, statement: StatementId) -> Result<Statement>;

	async fn session_log(&self, address: &ClusterAddress, session: SessionId, from: u64, size: u64) -> Result<LogPage>;

	async fn delete_session(&self, address: &ClusterAddress, session: SessionId) -> Result<()>;
}

/// Connection settings for [`LivyClient`].
#[derive(Debug, Clone)]
pub struct EndpointOptions {
	pub scheme: String,
	pub port: u16,
	pub request_timeout: Duration,
	pub requested_by: String,
}

impl Default for EndpointOptions {
	fn default() -> Self {
		Self {
			scheme: "http".to_string(),
			port: DEFAULT_ENDPOINT_PORT,
			request_timeout: Duration::from_secs(30),
			requested_by: "shortline".to_string(),
		}
	}
}

/// HTTP client for the interactive session REST API.
#[derive(Debug, Clone)]
pub struct LivyClient {
	http: reqwest::Client,
	options: EndpointOptions,
}

impl LivyClient {
	pub fn new(options: EndpointOptions) -> Result<Self> {
		let http = reqwest::Client::builder().timeout(options.request_timeout).build()?;
		Ok(Self { http, options })
	}

	/// Builds `{scheme}://{host}:{port}{path}` for a cluster address.
	pub fn url(&self, address: &ClusterAddress, path: &str) -> Result<Url> {
		let port = address.port().unwrap_or(self.options.port);
		let base = Url::parse(&format!("{}://{}:{}/", self.options.scheme, address.host(), port))?;
		Ok(base.join(path.trim_start_matches('/'))?)
	}

	async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, url: &Url) -> Result<T> {
		trace!(target: "shortline.endpoint", %url, "request");
		let response = check_status(request.send().await?, url).await?;
		Ok(response.json().await?)
	}
}

async fn check_status(response: Response, url: &Url) -> Result<Response> {
	let status = response.status();
	if status.is_success() {
		return Ok(response);
	}
	let body = response.text().await.unwrap_or_default();
	Err(Error::Status {
		url: url.to_string(),
		status: status.as_u16(),
		body,
	})
}

#[async_trait]
impl ExecutionEndpoint for LivyClient {
	async fn list_sessions(&self, address: &ClusterAddress) -> Result<Vec<SessionInfo>> {
		let url = self.url(address, "sessions")?;
		let list: SessionList = self.send(self.http.get(url.clone()), &url).await?;
		Ok(list.sessions)
	}

	async fn create_session(&self, address: &ClusterAddress, request: &CreateSessionRequest) -> Result<SessionInfo> {
		let url = self.url(address, "sessions")?;
		let builder = self
			.http
			.post(url.clone())
			.header(REQUESTED_BY_HEADER, &self.options.requested_by)
			.json(request);
		self.send(builder, &url).await
	}

	async fn session_state(&self, address: &ClusterAddress, session: SessionId) -> Result<SessionState> {
		let url = self.url(address, &format!("sessions/{session}/state"))?;
		let state: SessionStateResponse = self.send(self.http.get(url.clone()), &url).await?;
		Ok(state.state)
	}

	async fn submit_statement(&self, address: &ClusterAddress, session: SessionId, request: &SubmitStatementRequest) -> Result<Statement> {
		let url = self.url(address, &format!("sessions/{session}/statements"))?;
		let builder = self
			.http
			.post(url.clone())
			.header(REQUESTED_BY_HEADER, &self.options.requested_by)
			.json(request);
		self.send(builder, &url).await
	}

	async fn statement(&self, address: &ClusterAddress, session: SessionId, statement: StatementId) -> Result<Statement> {
		let url = self.url(address, &format!("sessions/{session}/statements/{statement}"))?;
		self.send(self.http.get(url.clone()), &url).await
	}

	async fn session_log(&self, address: &ClusterAddress, session: SessionId, from: u64, size: u64) -> Result<LogPage> {
		let mut url = self.url(address, &format!("sessions/{session}/log"))?;
		url.query_pairs_mut()
			.append_pair("from", &from.to_string())
			.append_pair("size", &size.to_string());
		self.send(self.http.get(url.clone()), &url).await
	}

	async fn delete_session(&self, address: &ClusterAddress, session: SessionId) -> Result<()> {
		let url = self.url(address, &format!("sessions/{session}"))?;
		let response = self
			.http
			.delete(url.clone())
			.header(REQUESTED_BY_HEADER, &self.options.requested_by)
			.send()
			.await?;
		check_status(response, &url).await.map(|_| ())
	}
}
