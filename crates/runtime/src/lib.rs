//! Remote execution lifecycle: cluster discovery, interactive sessions, job
//! submission and job tracking.
//!
//! Every component talks to the outside world through two seams:
//! [`ClusterDirectory`] for cluster state and [`ExecutionEndpoint`] for the
//! session/statement REST surface. HTTP implementations of both live here;
//! tests substitute in-memory fakes.

pub mod cluster;
pub mod endpoint;
pub mod error;
pub mod fake;
pub mod job;
pub mod poll;
pub mod session;
pub mod tracker;

pub use cluster::{ClusterAddress, ClusterClient, ClusterDirectory, ClusterHandle, HttpClusterDirectory, StaticClusterDirectory};
pub use endpoint::{EndpointOptions, ExecutionEndpoint, LivyClient};
pub use error::{Error, Result};
pub use job::{ArgValue, JobDescriptor, JobHandle, JobSubmitter};
pub use poll::{CancelSignal, PollPolicy};
pub use session::{SessionHandle, SessionManager, select_inactive};
pub use shortline_protocol as protocol;
pub use tracker::{DEFAULT_FAILURE_MARKER, JobTracker, LogLine, TerminalStatus, TrackReport, Verdict, classify, contains_failure_marker};
