//! Partitioning of consumed Maskinporten scopes by provider-side access state.

// std
use std::collections::HashSet;
// crates.io
use serde::{Deserialize, Serialize};

/// Approval state of a scope access record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScopeAccessState {
	/// Consumer may use the scope.
	Approved,
	/// Awaiting approval by the scope owner.
	Pending,
	/// Access refused by the scope owner.
	Denied,
	/// Any state this controller does not recognise.
	#[serde(other)]
	Unknown,
}

/// Provider-side record describing whether a consumer may use a scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeAccess {
	/// Fully qualified scope name.
	pub scope: String,
	/// Organisation number of the consumer, when reported.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub consumer_orgno: Option<String>,
	/// Approval state.
	pub state: ScopeAccessState,
}
impl ScopeAccess {
	/// Build a record for the given scope and state.
	pub fn new(scope: impl Into<String>, state: ScopeAccessState) -> Self {
		Self { scope: scope.into(), consumer_orgno: None, state }
	}
}

/// Desired scopes split by whether the client may use them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilteredScopes {
	/// Scopes with an approved access record, in desired order.
	pub valid: Vec<String>,
	/// Every other desired scope, in desired order.
	pub invalid: Vec<String>,
}
impl FilteredScopes {
	/// Whether any desired scope was rejected.
	pub fn has_invalid(&self) -> bool {
		!self.invalid.is_empty()
	}
}

/// Split `desired` into scopes with an approved access record and everything else.
///
/// Output preserves first-occurrence order of `desired`; duplicates are collapsed.
pub fn filter_scopes<S>(desired: &[S], accessible: &[ScopeAccess]) -> FilteredScopes
where
	S: AsRef<str>,
{
	let approved: HashSet<&str> = accessible
		.iter()
		.filter(|record| record.state == ScopeAccessState::Approved)
		.map(|record| record.scope.as_str())
		.collect();
	let mut seen = HashSet::with_capacity(desired.len());
	let mut filtered = FilteredScopes::default();

	for scope in desired {
		let scope = scope.as_ref();

		if !seen.insert(scope) {
			continue;
		}
		if approved.contains(scope) {
			filtered.valid.push(scope.to_owned());
		} else {
			filtered.invalid.push(scope.to_owned());
		}
	}

	filtered
}
