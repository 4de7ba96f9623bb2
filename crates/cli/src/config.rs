//! Config file discovery and command-line overrides.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use shortline::Config;

const APP_DIR_NAME: &str = "shortline";
const CONFIG_FILE_NAME: &str = "config.json";
const STORE_FILE_NAME: &str = "signals.json";
pub const CONFIG_ENV: &str = "SHORTLINE_CONFIG";

/// Effective configuration plus where it came from.
#[derive(Debug)]
pub struct Loaded {
	pub config: Config,
	pub config_path: Option<PathBuf>,
	pub store_path: PathBuf,
}

#[derive(Debug, Default)]
pub struct Overrides {
	pub config_path: Option<PathBuf>,
	pub store_path: Option<PathBuf>,
}

/// Loads the config file and applies `overrides`.
///
/// An explicitly named file (flag or environment) must exist; the per-user
/// default is optional.
pub fn load(overrides: Overrides) -> Result<Loaded> {
	let explicit = overrides
		.config_path
		.or_else(|| env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()).map(PathBuf::from));
	let required = explicit.is_some();
	let config_path = explicit.or_else(default_config_path);

	let mut config = match config_path.as_deref() {
		Some(path) => read_config_file(path, required)?,
		None => Config::default(),
	};
	if let Some(base) = config_path.as_deref().and_then(Path::parent) {
		config.resolve_paths(base);
	}

	let store_path = match overrides.store_path.or_else(|| config.store.path.clone()) {
		Some(path) => path,
		None => default_store_path().context("failed to resolve data directory; pass --store or set store.path")?,
	};

	Ok(Loaded {
		config,
		config_path,
		store_path,
	})
}

fn read_config_file(path: &Path, required: bool) -> Result<Config> {
	if !path.exists() {
		if required {
			bail!("config file not found at {}", path.display());
		}
		return Ok(Config::default());
	}
	Config::from_path(path).with_context(|| format!("failed to load config file {}", path.display()))
}

fn default_config_path() -> Option<PathBuf> {
	dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

fn default_store_path() -> Option<PathBuf> {
	dirs::data_dir().map(|dir| dir.join(APP_DIR_NAME).join(STORE_FILE_NAME))
}
