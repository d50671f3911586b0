//! In-memory [`SecretStore`].

// std
use std::sync::atomic::{AtomicBool, Ordering};
// crates.io
use async_trait::async_trait;
use tokio::sync::RwLock;
// self
use crate::{
	_prelude::*,
	secret::{Secret, SecretStore},
};

/// Secret store backed by a map; can simulate an outage.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
	secrets: RwLock<BTreeMap<(String, String), Secret>>,
	unavailable: AtomicBool,
}
impl MemorySecretStore {
	/// Empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Toggle simulated unavailability.
	pub fn set_unavailable(&self, unavailable: bool) {
		self.unavailable.store(unavailable, Ordering::Relaxed);
	}

	/// Every stored secret.
	pub async fn snapshot(&self) -> Vec<Secret> {
		self.secrets.read().await.values().cloned().collect()
	}

	fn ensure_available(&self) -> Result<()> {
		if self.unavailable.load(Ordering::Relaxed) {
			Err(Error::SecretStore("Secret store is unavailable.".into()))
		} else {
			Ok(())
		}
	}
}
#[async_trait]
impl SecretStore for MemorySecretStore {
	async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
		self.ensure_available()?;

		Ok(self.secrets.read().await.get(&(namespace.to_owned(), name.to_owned())).cloned())
	}

	async fn put(&self, secret: Secret) -> Result<()> {
		self.ensure_available()?;
		self.secrets
			.write()
			.await
			.insert((secret.namespace.clone(), secret.name.clone()), secret);

		Ok(())
	}

	async fn delete(&self, namespace: &str, name: &str) -> Result<bool> {
		self.ensure_available()?;

		Ok(self.secrets.write().await.remove(&(namespace.to_owned(), name.to_owned())).is_some())
	}
}
