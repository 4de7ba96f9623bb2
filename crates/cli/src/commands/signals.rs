use serde_json::{Value, json};
use shortline::signals::clear_state;
use shortline::{PipelineState, SignalStore};

use super::store;
use crate::cli::SignalsAction;
use crate::config::Loaded;
use crate::error::{CliError, Result};

pub fn run(loaded: &Loaded, action: SignalsAction) -> Result<Value> {
	let store = store(loaded);
	let path = loaded.store_path.display().to_string();

	match action {
		SignalsAction::List => Ok(json!({ "store": path, "signals": store.entries()? })),
		SignalsAction::Get { key } => {
			let value = store.get(&key)?;
			Ok(json!({ "key": key, "value": value }))
		}
		SignalsAction::Set { key, value } => {
			validate(&key, &value)?;
			store.set(&key, &value)?;
			Ok(json!({ "key": key, "value": value }))
		}
		SignalsAction::Clear { key } => {
			let removed = store.remove(&key)?;
			Ok(json!({ "key": key, "removed": removed }))
		}
		SignalsAction::Reset => {
			let pipeline = &loaded.config.pipeline.name;
			let removed = clear_state(store.as_ref(), pipeline)?;
			Ok(json!({ "pipeline": pipeline, "removed": removed }))
		}
	}
}

/// State keys only accept values dependents understand.
fn validate(key: &str, value: &str) -> Result<()> {
	if key.ends_with("_state") && value.parse::<PipelineState>().is_err() {
		return Err(CliError::InvalidInput(format!(
			"{key} must be {} or {}, got {value:?}",
			PipelineState::Failed,
			PipelineState::Completed
		)));
	}
	if key.trim().is_empty() {
		return Err(CliError::InvalidInput("signal key must not be empty".to_string()));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn state_keys_require_known_values() {
		assert!(validate("prices_state", "COMPLETED").is_ok());
		assert!(validate("prices_state", "FAILED").is_ok());
		assert!(matches!(validate("prices_state", "RUNNING"), Err(CliError::InvalidInput(_))));
		assert!(validate("cluster_id", "j-2AXXXXXXGAPLF").is_ok());
		assert!(validate(" ", "x").is_err());
	}
}
