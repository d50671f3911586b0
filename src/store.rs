//! Declarative resource store seam.

pub mod memory;

pub use memory::MemoryClientStore;

// std
use std::fmt::Debug;
// crates.io
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
// self
use crate::{
	_prelude::*,
	resource::{ClientKind, ClientResource, ObservedStatus, ResourceKey},
};

/// Severity of a resource event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
	/// Progress.
	Normal,
	/// Something an operator should look at.
	Warning,
}

/// Event attached to a resource.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
	/// Severity.
	#[serde(rename = "type")]
	pub event_type: EventType,
	/// Machine readable reason.
	pub reason: String,
	/// Human readable detail.
	pub message: String,
}
impl Event {
	/// Progress event.
	pub fn normal(reason: impl Into<String>, message: impl Into<String>) -> Self {
		Self { event_type: EventType::Normal, reason: reason.into(), message: message.into() }
	}

	/// Warning event.
	pub fn warning(reason: impl Into<String>, message: impl Into<String>) -> Self {
		Self { event_type: EventType::Warning, reason: reason.into(), message: message.into() }
	}
}

/// Desired-state resources with an optimistic-concurrency status sub-document.
///
/// Resources are addressed by kind and key; the same key may exist once per kind.
#[async_trait]
pub trait ClientStore: Debug + Send + Sync {
	/// Read one resource.
	async fn get(&self, kind: ClientKind, key: &ResourceKey) -> Result<Option<ClientResource>>;

	/// Read every managed resource of every kind.
	async fn list(&self) -> Result<Vec<ClientResource>>;

	/// Replace the status when the stored resource version still equals `resource_version`.
	///
	/// Returns the new resource version, or [`Error::StatusWriteConflict`] when the resource
	/// changed concurrently.
	async fn update_status(
		&self,
		kind: ClientKind,
		key: &ResourceKey,
		resource_version: u64,
		status: &ObservedStatus,
	) -> Result<u64>;

	/// Release a resource whose deletion was requested once remote cleanup finished.
	async fn finalize(&self, kind: ClientKind, key: &ResourceKey) -> Result<()>;

	/// Attach an event to a resource.
	async fn record_event(&self, kind: ClientKind, key: &ResourceKey, event: Event) -> Result<()>;
}
