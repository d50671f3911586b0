//! Result of one reconciliation invocation.

// self
use crate::{_prelude::*, error::ErrorKind};

/// What a successful invocation changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Change {
	/// Remote registration and secret already matched; no provider mutation.
	Unchanged,
	/// A registration was created for a resource that had none.
	Created,
	/// An existing registration was updated.
	Updated,
	/// A registration that vanished remotely was created again.
	Recreated,
	/// The registration matched but credentials were reissued.
	Rotated,
	/// The registration and secret were removed.
	Deleted,
	/// Deletion found nothing to remove.
	Absent,
}
impl Change {
	/// Stable identifier used in events and metric labels.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Unchanged => "unchanged",
			Self::Created => "created",
			Self::Updated => "updated",
			Self::Recreated => "recreated",
			Self::Rotated => "rotated",
			Self::Deleted => "deleted",
			Self::Absent => "absent",
		}
	}

	/// Whether a provider-side registration was mutated.
	pub fn mutated_registration(self) -> bool {
		matches!(self, Self::Created | Self::Updated | Self::Recreated | Self::Deleted)
	}
}

/// Outcome handed back to the invoking framework.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
	/// The resource converged.
	Applied(Change),
	/// Transient failure; retry after `backoff`.
	Retry {
		/// Failure classification.
		kind: ErrorKind,
		/// Suggested delay before the next attempt.
		backoff: Duration,
	},
	/// Permanent failure; do not retry until the spec changes.
	Terminal {
		/// Failure classification.
		kind: ErrorKind,
		/// Operator facing description.
		message: String,
	},
}
impl Outcome {
	/// Whether the resource converged.
	pub fn is_applied(&self) -> bool {
		matches!(self, Self::Applied(_))
	}

	/// Applied change, if any.
	pub fn change(&self) -> Option<Change> {
		match self {
			Self::Applied(change) => Some(*change),
			_ => None,
		}
	}

	/// Failure classification, if any.
	pub fn error_kind(&self) -> Option<ErrorKind> {
		match self {
			Self::Applied(_) => None,
			Self::Retry { kind, .. } | Self::Terminal { kind, .. } => Some(*kind),
		}
	}

	/// Backoff hint for retryable failures.
	pub fn backoff(&self) -> Option<Duration> {
		match self {
			Self::Retry { backoff, .. } => Some(*backoff),
			_ => None,
		}
	}

	/// `success`, `retry` or `terminal`.
	pub fn result_label(&self) -> &'static str {
		match self {
			Self::Applied(_) => "success",
			Self::Retry { .. } => "retry",
			Self::Terminal { .. } => "terminal",
		}
	}
}
