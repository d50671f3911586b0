//! Backoff hints handed to the invoking framework alongside retryable outcomes.

// std
use std::cell::RefCell;
// crates.io
use rand::{Rng, SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
// self
use crate::{_prelude::*, error::ErrorKind};

thread_local! {
	static SMALL_RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_rng(&mut rand::rng()));
}

/// Supported jitter strategies for backoff hints.
#[derive(Clone, Debug, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
	/// No jitter; deterministic schedule.
	None,
	/// Randomize within the upper fifth of the current backoff.
	#[default]
	Full,
	/// Decorrelated jitter per AWS architecture guidance.
	Decorrelated,
}

/// Exponential backoff driven by the resource's consecutive failure count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
	/// Delay after the first failure.
	pub initial_backoff: Duration,
	/// Upper bound applied to exponential growth.
	pub max_backoff: Duration,
	/// Strategy used to randomize the computed backoff.
	pub jitter: JitterStrategy,
}
impl BackoffPolicy {
	/// Validate invariants for backoff configuration.
	pub fn validate(&self) -> Result<()> {
		if self.initial_backoff.is_zero() {
			return Err(Error::Validation {
				field: "reconcile.backoff.initial_secs",
				reason: "Must be greater than zero.".into(),
			});
		}
		if self.max_backoff < self.initial_backoff {
			return Err(Error::Validation {
				field: "reconcile.backoff.max_secs",
				reason: "Must be greater than or equal to initial_secs.".into(),
			});
		}

		Ok(())
	}

	/// Backoff after `failures` consecutive failures; `0` and `1` both yield the initial delay.
	pub fn compute_backoff(&self, failures: u32) -> Duration {
		let exponent = failures.saturating_sub(1).min(32);
		let base = self.initial_backoff.saturating_mul(1 << exponent.min(31));
		let bounded = base.min(self.max_backoff).max(self.initial_backoff);

		self.apply_jitter(bounded, exponent)
	}

	/// Backoff hint for a failure of `kind`, honouring a provider supplied `retry_after`.
	pub fn hint(&self, kind: ErrorKind, failures: u32, retry_after: Option<Duration>) -> Duration {
		match kind {
			ErrorKind::StatusWriteConflict => Duration::ZERO,
			ErrorKind::ProviderRateLimited => {
				let backoff = self.compute_backoff(failures);

				retry_after.map_or(backoff, |hint| hint.max(backoff))
			},
			_ => self.compute_backoff(failures),
		}
	}

	fn apply_jitter(&self, bounded: Duration, attempt: u32) -> Duration {
		match self.jitter {
			JitterStrategy::None => bounded,
			JitterStrategy::Full => {
				let lower = bounded.mul_f64(0.8).max(self.initial_backoff);

				random_within(lower, bounded)
			},
			JitterStrategy::Decorrelated => {
				let prev = if attempt == 0 { self.initial_backoff } else { bounded };
				let ceiling = self.max_backoff.min(prev.mul_f64(3.0));

				random_within(self.initial_backoff, ceiling.max(self.initial_backoff))
			},
		}
	}
}
impl Default for BackoffPolicy {
	fn default() -> Self {
		Self {
			initial_backoff: Duration::from_secs(5),
			max_backoff: Duration::from_secs(300),
			jitter: JitterStrategy::Full,
		}
	}
}

fn random_within(min: Duration, max: Duration) -> Duration {
	if max <= min {
		return max;
	}

	SMALL_RNG.with(|cell| {
		let mut rng = cell.borrow_mut();
		let nanos = max.as_nanos() - min.as_nanos();
		let jitter = rng.random_range(0..=nanos.min(u64::MAX as u128));

		min + Duration::from_nanos(jitter as u64)
	})
}
