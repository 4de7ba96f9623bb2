use serde_json::{Value, json};

use super::orchestrator;
use crate::config::Loaded;
use crate::error::Result;

pub async fn list(loaded: &Loaded, cluster_id: Option<String>) -> Result<Value> {
	let orchestrator = orchestrator(loaded)?;
	let (cluster_id, address) = orchestrator.resolve_address(cluster_id.as_deref()).await?;
	let sessions = orchestrator.sessions().list(&address).await?;

	Ok(json!({
		"clusterId": cluster_id,
		"address": address.to_string(),
		"sessions": sessions,
	}))
}

pub async fn kill_inactive(loaded: &Loaded, cluster_id: Option<String>) -> Result<Value> {
	let orchestrator = orchestrator(loaded)?;
	let (cluster_id, address) = orchestrator.resolve_address(cluster_id.as_deref()).await?;
	let killed = orchestrator.sessions().kill_inactive_sessions(&address).await?;

	Ok(json!({
		"clusterId": cluster_id,
		"killed": killed,
	}))
}
