//! In-memory [`ClientStore`] for development mode and tests. Not durable.

// std
use std::collections::{BTreeMap, HashMap};
// crates.io
use async_trait::async_trait;
use tokio::sync::RwLock;
// self
use crate::{
	_prelude::*,
	resource::{ClientKind, ClientResource, ClientSpec, ObservedStatus, ResourceKey},
	store::{ClientStore, Event},
};

type StoreKey = (ClientKind, ResourceKey);

#[derive(Debug, Default)]
struct Inner {
	resources: BTreeMap<StoreKey, ClientResource>,
	events: HashMap<StoreKey, Vec<Event>>,
	injected_conflicts: usize,
	unavailable: bool,
}

/// Resource store backed by a map behind an async lock.
#[derive(Clone, Debug, Default)]
pub struct MemoryClientStore {
	inner: Arc<RwLock<Inner>>,
}
impl MemoryClientStore {
	/// Empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Create a resource or replace its spec, bumping the generation when the spec changed.
	pub async fn apply(&self, key: ResourceKey, uid: &str, spec: ClientSpec) -> ClientResource {
		let mut inner = self.inner.write().await;
		let store_key = (spec.kind(), key.clone());
		let resource = inner
			.resources
			.entry(store_key)
			.and_modify(|existing| {
				if existing.spec != spec {
					existing.generation += 1;
					existing.spec = spec.clone();
				}

				existing.resource_version += 1;
			})
			.or_insert_with(|| ClientResource::new(key, uid, spec.clone()));

		resource.clone()
	}

	/// Mark a resource for deletion; it stays readable until finalized.
	pub async fn request_deletion(&self, kind: ClientKind, key: &ResourceKey) -> bool {
		let mut inner = self.inner.write().await;

		match inner.resources.get_mut(&(kind, key.clone())) {
			Some(resource) => {
				resource.deletion_requested = true;
				resource.resource_version += 1;

				true
			},
			None => false,
		}
	}

	/// Drop the status sub-document, as a restore from backup without status would.
	pub async fn wipe_status(&self, kind: ClientKind, key: &ResourceKey) {
		let mut inner = self.inner.write().await;

		if let Some(resource) = inner.resources.get_mut(&(kind, key.clone())) {
			resource.status = ObservedStatus::default();
			resource.resource_version += 1;
		}
	}

	/// Make the next `count` status writes fail as if another writer got there first.
	pub async fn inject_status_conflicts(&self, count: usize) {
		self.inner.write().await.injected_conflicts = count;
	}

	/// Toggle simulated unavailability of every read and write.
	pub async fn set_unavailable(&self, unavailable: bool) {
		self.inner.write().await.unavailable = unavailable;
	}

	/// Events recorded for a resource, oldest first.
	pub async fn events(&self, kind: ClientKind, key: &ResourceKey) -> Vec<Event> {
		self.inner.read().await.events.get(&(kind, key.clone())).cloned().unwrap_or_default()
	}
}
#[async_trait]
impl ClientStore for MemoryClientStore {
	async fn get(&self, kind: ClientKind, key: &ResourceKey) -> Result<Option<ClientResource>> {
		let inner = self.inner.read().await;

		ensure_available(&inner)?;

		Ok(inner.resources.get(&(kind, key.clone())).cloned())
	}

	async fn list(&self) -> Result<Vec<ClientResource>> {
		let inner = self.inner.read().await;

		ensure_available(&inner)?;

		Ok(inner.resources.values().cloned().collect())
	}

	async fn update_status(
		&self,
		kind: ClientKind,
		key: &ResourceKey,
		resource_version: u64,
		status: &ObservedStatus,
	) -> Result<u64> {
		let mut inner = self.inner.write().await;

		ensure_available(&inner)?;

		let injected = inner.injected_conflicts > 0;

		if injected {
			inner.injected_conflicts -= 1;
		}

		let resource = inner
			.resources
			.get_mut(&(kind, key.clone()))
			.ok_or_else(|| Error::ResourceStore(format!("{kind} {key} does not exist.")))?;

		if injected {
			resource.resource_version += 1;
		}
		if resource.resource_version != resource_version {
			return Err(Error::StatusWriteConflict { resource: key.to_string() });
		}

		resource.status = status.clone();
		resource.resource_version += 1;

		Ok(resource.resource_version)
	}

	async fn finalize(&self, kind: ClientKind, key: &ResourceKey) -> Result<()> {
		let mut inner = self.inner.write().await;

		ensure_available(&inner)?;

		let store_key = (kind, key.clone());

		if inner.resources.get(&store_key).is_some_and(|resource| !resource.deletion_requested) {
			return Err(Error::ResourceStore(format!("{kind} {key} is not marked for deletion.")));
		}

		inner.resources.remove(&store_key);

		Ok(())
	}

	async fn record_event(&self, kind: ClientKind, key: &ResourceKey, event: Event) -> Result<()> {
		let mut inner = self.inner.write().await;

		ensure_available(&inner)?;
		inner.events.entry((kind, key.clone())).or_default().push(event);

		Ok(())
	}
}

fn ensure_available(inner: &Inner) -> Result<()> {
	if inner.unavailable {
		Err(Error::ResourceStore("Resource store is unavailable.".into()))
	} else {
		Ok(())
	}
}
