//! Gates that hold a pipeline back until its signals line up.

use shortline_runtime::poll::{check_cancelled, pause};
use shortline_runtime::{CancelSignal, PollPolicy};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::signals::SignalStore;

/// What a sensor waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
	/// Every key has a value.
	Present,
	/// No key has a value.
	Absent,
}

impl Expectation {
	fn satisfied_by(self, value: Option<&str>) -> bool {
		match self {
			Expectation::Present => value.is_some(),
			Expectation::Absent => value.is_none(),
		}
	}
}

/// Polls `store` until every key in `keys` meets `expectation`.
///
/// Returns the number of polls it took. Fails with `Timeout` once
/// `policy.max_attempts` polls have come up short.
pub async fn await_signals(
	store: &dyn SignalStore,
	keys: &[String],
	expectation: Expectation,
	policy: PollPolicy,
	cancel: &mut CancelSignal,
) -> Result<u32> {
	let mut polls = 0;
	loop {
		check_cancelled(cancel)?;
		polls += 1;

		let mut pending = Vec::new();
		for key in keys {
			if !expectation.satisfied_by(store.get(key)?.as_deref()) {
				pending.push(key.as_str());
			}
		}
		if pending.is_empty() {
			info!(target: "shortline.signals", ?keys, ?expectation, polls, "signals ready");
			return Ok(polls);
		}
		debug!(target: "shortline.signals", ?pending, ?expectation, poll = polls, "waiting on signals");

		if polls >= policy.max_attempts {
			warn!(target: "shortline.signals", ?pending, ?expectation, polls, "gave up waiting on signals");
			return Err(policy.timeout(format!("signals {pending:?} to be {expectation:?}")).into());
		}
		pause(policy.interval, cancel).await?;
	}
}
