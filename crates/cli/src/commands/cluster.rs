use serde_json::{Value, json};

use super::orchestrator;
use crate::config::Loaded;
use crate::error::Result;

pub async fn status(loaded: &Loaded, cluster_id: Option<String>) -> Result<Value> {
	let orchestrator = orchestrator(loaded)?;
	let cluster_id = orchestrator.resolve_cluster_id(cluster_id.as_deref())?;
	let handle = orchestrator.clusters().describe(&cluster_id).await?;

	Ok(json!({
		"clusterId": handle.id,
		"state": handle.state,
		"liveness": handle.liveness,
		"terminated": handle.is_terminated(),
		"address": handle.address.as_ref().map(ToString::to_string),
	}))
}
