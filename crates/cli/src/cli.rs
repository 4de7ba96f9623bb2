use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "shortline")]
#[command(about = "Run Spark pipeline stages on a transient cluster")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug, -vvv trace)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Config file (defaults to $SHORTLINE_CONFIG, then the user config dir)
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Signal store file
	#[arg(long, global = true, value_name = "FILE")]
	pub store: Option<PathBuf>,

	/// Output format
	#[arg(short, long, global = true, value_enum, default_value = "text")]
	pub format: OutputFormat,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Run the combine pipeline
	Run {
		/// Run date; jobs process the day before (defaults to today)
		#[arg(long, value_name = "YYYY-MM-DD")]
		date: Option<NaiveDate>,

		/// Cluster to run on (defaults to the stored cluster id)
		#[arg(long)]
		cluster_id: Option<String>,

		/// Wait for upstream signals before starting
		#[arg(long)]
		wait: bool,
	},

	/// Run a single stage of the combine pipeline
	Stage {
		/// Stage name, e.g. combine_datasets or quality_check
		name: String,

		#[arg(long, value_name = "YYYY-MM-DD")]
		date: Option<NaiveDate>,

		#[arg(long)]
		cluster_id: Option<String>,
	},

	/// Inspect the cluster
	Cluster {
		#[command(subcommand)]
		action: ClusterAction,
	},

	/// Inspect and reclaim sessions on the cluster endpoint
	Sessions {
		#[command(subcommand)]
		action: SessionsAction,
	},

	/// Read and write pipeline signals
	Signals {
		#[command(subcommand)]
		action: SignalsAction,
	},
}

#[derive(Subcommand, Debug)]
pub enum ClusterAction {
	/// Describe the cluster and its liveness
	Status {
		#[arg(long)]
		cluster_id: Option<String>,
	},
}

#[derive(Subcommand, Debug)]
pub enum SessionsAction {
	/// List sessions on the cluster endpoint
	List {
		#[arg(long)]
		cluster_id: Option<String>,
	},
	/// Terminate every session that is not in active use
	KillInactive {
		#[arg(long)]
		cluster_id: Option<String>,
	},
}

#[derive(Subcommand, Debug)]
pub enum SignalsAction {
	/// Show every stored signal
	List,
	/// Show one signal
	Get { key: String },
	/// Set a signal
	Set { key: String, value: String },
	/// Remove a signal
	Clear { key: String },
	/// Clear the pipeline's own state so it can run again
	Reset,
}
