//! Cross-pipeline signals.
//!
//! Pipelines communicate through a flat key/value store: each pipeline
//! publishes its outcome under `{pipeline}_state`, and the active cluster id
//! lives under [`CLUSTER_ID_KEY`]. The store is shared with processes outside
//! this one, so the file-backed implementation re-reads on every access and
//! writes are last-write-wins.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

/// Key holding the id of the cluster pipelines should run on.
pub const CLUSTER_ID_KEY: &str = "cluster_id";

const SIGNALS_SCHEMA_VERSION: u32 = 1;

/// Outcome a pipeline publishes for its dependents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
	Failed,
	Completed,
}

impl PipelineState {
	pub fn as_str(self) -> &'static str {
		match self {
			PipelineState::Failed => "FAILED",
			PipelineState::Completed => "COMPLETED",
		}
	}
}

impl fmt::Display for PipelineState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for PipelineState {
	type Err = PipelineError;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"FAILED" => Ok(PipelineState::Failed),
			"COMPLETED" => Ok(PipelineState::Completed),
			other => Err(PipelineError::Store(format!("unrecognised pipeline state {other:?}"))),
		}
	}
}

/// Key under which `pipeline` publishes its state.
pub fn state_key(pipeline: &str) -> String {
	format!("{pipeline}_state")
}

/// Flat string key/value store shared between pipelines.
pub trait SignalStore: Send + Sync {
	fn get(&self, key: &str) -> Result<Option<String>>;

	fn set(&self, key: &str, value: &str) -> Result<()>;

	/// Removes `key`, returning whether it was present.
	fn remove(&self, key: &str) -> Result<bool>;

	/// Snapshot of every key.
	fn entries(&self) -> Result<BTreeMap<String, String>>;
}

/// Reads the published state of `pipeline`.
///
/// Values other than `FAILED` or `COMPLETED` are treated as unset.
pub fn read_state(store: &dyn SignalStore, pipeline: &str) -> Result<Option<PipelineState>> {
	Ok(store.get(&state_key(pipeline))?.and_then(|raw| raw.parse().ok()))
}

pub fn write_state(store: &dyn SignalStore, pipeline: &str, state: PipelineState) -> Result<()> {
	info!(target: "shortline.signals", pipeline, %state, "publishing pipeline state");
	store.set(&state_key(pipeline), state.as_str())
}

/// Clears the state of `pipeline` so that it can run again.
pub fn clear_state(store: &dyn SignalStore, pipeline: &str) -> Result<bool> {
	let removed = store.remove(&state_key(pipeline))?;
	info!(target: "shortline.signals", pipeline, removed, "cleared pipeline state");
	Ok(removed)
}

/// Process-local store, mainly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
	entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
		let store = Self::new();
		store
			.entries
			.lock()
			.extend(entries.into_iter().map(|(k, v)| (k.to_string(), v.to_string())));
		store
	}
}

impl SignalStore for MemoryStore {
	fn get(&self, key: &str) -> Result<Option<String>> {
		Ok(self.entries.lock().get(key).cloned())
	}

	fn set(&self, key: &str, value: &str) -> Result<()> {
		self.entries.lock().insert(key.to_string(), value.to_string());
		Ok(())
	}

	fn remove(&self, key: &str) -> Result<bool> {
		Ok(self.entries.lock().remove(key).is_some())
	}

	fn entries(&self) -> Result<BTreeMap<String, String>> {
		Ok(self.entries.lock().clone())
	}
}

/// On-disk format for a signal store file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalFile {
	pub schema: u32,
	#[serde(default)]
	pub signals: BTreeMap<String, String>,
	#[serde(default)]
	pub updated_at: Option<u64>,
}

impl Default for SignalFile {
	fn default() -> Self {
		Self {
			schema: SIGNALS_SCHEMA_VERSION,
			signals: BTreeMap::new(),
			updated_at: None,
		}
	}
}

/// JSON-file-backed store.
///
/// A missing file reads as empty. A file that exists but cannot be parsed is
/// an error rather than an empty store, so a corrupt file never hides a
/// `FAILED` signal.
#[derive(Debug)]
pub struct JsonFileStore {
	path: PathBuf,
	// Serializes read-modify-write cycles within this process.
	lock: Mutex<()>,
}

impl JsonFileStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			lock: Mutex::new(()),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load(&self) -> Result<SignalFile> {
		let content = match fs::read_to_string(&self.path) {
			Ok(content) => content,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(SignalFile::default()),
			Err(err) => return Err(err.into()),
		};
		if content.trim().is_empty() {
			return Ok(SignalFile::default());
		}
		serde_json::from_str(&content).map_err(|err| PipelineError::Store(format!("{}: {err}", self.path.display())))
	}

	fn save(&self, mut file: SignalFile) -> Result<()> {
		if let Some(parent) = self.path.parent() {
			fs::create_dir_all(parent)?;
		}
		file.schema = SIGNALS_SCHEMA_VERSION;
		file.updated_at = Some(now_ts());
		let json = serde_json::to_string_pretty(&file)?;
		fs::write(&self.path, json)?;
		debug!(target: "shortline.signals", path = %self.path.display(), keys = file.signals.len(), "saved signal store");
		Ok(())
	}
}

impl SignalStore for JsonFileStore {
	fn get(&self, key: &str) -> Result<Option<String>> {
		let _guard = self.lock.lock();
		Ok(self.load()?.signals.remove(key))
	}

	fn set(&self, key: &str, value: &str) -> Result<()> {
		let _guard = self.lock.lock();
		let mut file = self.load()?;
		file.signals.insert(key.to_string(), value.to_string());
		self.save(file)
	}

	fn remove(&self, key: &str) -> Result<bool> {
		let _guard = self.lock.lock();
		let mut file = self.load()?;
		if file.signals.remove(key).is_none() {
			return Ok(false);
		}
		self.save(file)?;
		Ok(true)
	}

	fn entries(&self) -> Result<BTreeMap<String, String>> {
		let _guard = self.lock.lock();
		Ok(self.load()?.signals)
	}
}

fn now_ts() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
