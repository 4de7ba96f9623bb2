//! Bounded polling primitives shared by readiness waits and job tracking.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{Error, Result};

/// Cancellation signal observed between poll iterations.
///
/// The sender side flips the value to `true` to request cancellation. A
/// dropped sender means cancellation can no longer be requested.
pub type CancelSignal = watch::Receiver<bool>;

/// Fixed-interval polling bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
	pub interval: Duration,
	pub max_attempts: u32,
}

impl PollPolicy {
	pub const fn new(interval: Duration, max_attempts: u32) -> Self {
		Self { interval, max_attempts }
	}

	/// Upper bound on the time spent sleeping between attempts.
	pub fn max_wait(&self) -> Duration {
		self.interval * self.max_attempts.saturating_sub(1)
	}

	/// Timeout error for `what` after exhausting this policy.
	pub fn timeout(&self, what: impl Into<String>) -> Error {
		Error::Timeout {
			what: what.into(),
			attempts: self.max_attempts,
			elapsed: self.max_wait(),
		}
	}
}

impl Default for PollPolicy {
	fn default() -> Self {
		Self::new(Duration::from_secs(5), 120)
	}
}

/// Returns `Err(Cancelled)` if cancellation has already been requested.
pub fn check_cancelled(cancel: &CancelSignal) -> Result<()> {
	if *cancel.borrow() { Err(Error::Cancelled) } else { Ok(()) }
}

/// Sleeps for `interval` unless cancellation is requested first.
pub async fn pause(interval: Duration, cancel: &mut CancelSignal) -> Result<()> {
	check_cancelled(cancel)?;
	let deadline = Instant::now() + interval;
	loop {
		tokio::select! {
			_ = tokio::time::sleep_until(deadline) => return Ok(()),
			changed = cancel.changed() => match changed {
				Ok(()) => check_cancelled(cancel)?,
				Err(_) => {
					tokio::time::sleep_until(deadline).await;
					return Ok(());
				}
			},
		}
	}
}

/// A signal that is never cancelled.
pub fn never_cancelled() -> CancelSignal {
	let (_tx, rx) = watch::channel(false);
	rx
}
