mod cluster;
mod run;
mod sessions;
mod signals;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use serde_json::Value;
use shortline::runtime::{CancelSignal, ClusterAddress, ClusterDirectory, HttpClusterDirectory, LivyClient, StaticClusterDirectory};
use shortline::{JsonFileStore, Orchestrator};
use tokio::sync::watch;
use tracing::{error, warn};

use crate::cli::{Cli, ClusterAction, Commands, SessionsAction, SignalsAction};
use crate::config::{self, Loaded, Overrides};
use crate::error::{CliError, Result};
use crate::output::{ResultBuilder, print_result};

/// Runs the parsed command, prints its envelope and reports success.
pub async fn dispatch(cli: Cli) -> bool {
	let start = Instant::now();
	let format = cli.format;
	let command = command_name(&cli.command);

	let outcome = execute(cli).await;
	let builder = ResultBuilder::<Value>::new(command).started_at(start);
	let result = match outcome {
		Ok(data) => builder.data(data).build(),
		Err(err) => {
			error!(target: "shortline", command, code = %err.code(), error = %err, "command failed");
			builder.error(err.to_command_error()).build()
		}
	};
	print_result(&result, format);
	result.ok
}

async fn execute(cli: Cli) -> Result<Value> {
	let loaded = config::load(Overrides {
		config_path: cli.config,
		store_path: cli.store,
	})?;

	match cli.command {
		Commands::Run { date, cluster_id, wait } => run::run(&loaded, date, cluster_id, wait).await,
		Commands::Stage { name, date, cluster_id } => run::stage(&loaded, &name, date, cluster_id).await,
		Commands::Cluster {
			action: ClusterAction::Status { cluster_id },
		} => cluster::status(&loaded, cluster_id).await,
		Commands::Sessions { action } => match action {
			SessionsAction::List { cluster_id } => sessions::list(&loaded, cluster_id).await,
			SessionsAction::KillInactive { cluster_id } => sessions::kill_inactive(&loaded, cluster_id).await,
		},
		Commands::Signals { action } => signals::run(&loaded, action),
	}
}

fn command_name(command: &Commands) -> &'static str {
	match command {
		Commands::Run { .. } => "run",
		Commands::Stage { .. } => "stage",
		Commands::Cluster { .. } => "cluster status",
		Commands::Sessions { action } => match action {
			SessionsAction::List { .. } => "sessions list",
			SessionsAction::KillInactive { .. } => "sessions kill-inactive",
		},
		Commands::Signals { action } => match action {
			SignalsAction::List => "signals list",
			SignalsAction::Get { .. } => "signals get",
			SignalsAction::Set { .. } => "signals set",
			SignalsAction::Clear { .. } => "signals clear",
			SignalsAction::Reset => "signals reset",
		},
	}
}

fn store(loaded: &Loaded) -> Arc<JsonFileStore> {
	Arc::new(JsonFileStore::new(&loaded.store_path))
}

/// Wires the configured directory, endpoint client and signal store.
fn orchestrator(loaded: &Loaded) -> Result<Orchestrator> {
	let cluster = &loaded.config.cluster;
	let timeout = Duration::from_secs(cluster.request_timeout_secs);
	let directory: Arc<dyn ClusterDirectory> = match (&cluster.host, &cluster.directory_url) {
		(Some(host), _) => Arc::new(StaticClusterDirectory::new(ClusterAddress::new(host.as_str()))),
		(None, Some(url)) => Arc::new(HttpClusterDirectory::new(url, timeout)?),
		(None, None) => {
			return Err(CliError::Config(anyhow!(
				"no cluster configured; set cluster.host or cluster.directoryUrl"
			)));
		}
	};
	let endpoint = Arc::new(LivyClient::new(loaded.config.endpoint_options())?);

	Ok(Orchestrator::new(directory, endpoint, store(loaded)).with_settings(loaded.config.settings()))
}

/// Cancellation signal flipped by Ctrl-C.
fn interrupt_signal() -> CancelSignal {
	let (tx, rx) = watch::channel(false);
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			warn!(target: "shortline", "interrupt received; cancelling after the current poll");
			let _ = tx.send(true);
		}
	});
	rx
}
