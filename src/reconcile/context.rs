//! Per-invocation cancellation and deadline.

// std
use std::future::Future;
// crates.io
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
// self
use crate::_prelude::*;

/// Cancellation signal and deadline supplied by the invoking framework.
#[derive(Clone, Debug)]
pub struct ReconcileContext {
	cancel: CancellationToken,
	deadline: Instant,
}
impl ReconcileContext {
	/// Context expiring `timeout` from now.
	pub fn new(cancel: CancellationToken, timeout: Duration) -> Self {
		Self { cancel, deadline: Instant::now() + timeout }
	}

	/// Context expiring at `deadline`.
	pub fn with_deadline(cancel: CancellationToken, deadline: Instant) -> Self {
		Self { cancel, deadline }
	}

	/// Context that is never cancelled and expires after `timeout`.
	pub fn detached(timeout: Duration) -> Self {
		Self::new(CancellationToken::new(), timeout)
	}

	/// Cancellation token.
	pub fn cancellation(&self) -> &CancellationToken {
		&self.cancel
	}

	/// Deadline.
	pub fn deadline(&self) -> Instant {
		self.deadline
	}

	/// Time left before the deadline.
	pub fn remaining(&self) -> Duration {
		self.deadline.saturating_duration_since(Instant::now())
	}

	/// Whether further remote calls would be abandoned immediately.
	pub fn is_interrupted(&self) -> bool {
		self.cancel.is_cancelled() || self.remaining().is_zero()
	}

	/// Race `fut` against cancellation and the deadline.
	pub async fn run<F, T>(&self, fut: F) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		tokio::select! {
			biased;
			_ = self.cancel.cancelled() => Err(Error::Cancelled),
			res = time::timeout_at(self.deadline, fut) => res.unwrap_or(Err(Error::DeadlineExceeded)),
		}
	}
}
