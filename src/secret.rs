//! Credential secrets: the store seam and the materializer that owns their contents.

pub mod memory;

pub use memory::MemorySecretStore;

// std
use std::fmt::Debug;
// crates.io
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
// self
use crate::{
	_prelude::*,
	resource::{ClientKind, ClientResource},
};

/// Label marking secrets written by this controller.
pub const TYPE_LABEL_VALUE: &str = "digdirator.nais.io";

/// Weak back-reference from a secret to the resource it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
	/// Owning resource kind.
	pub kind: ClientKind,
	/// Owning resource name.
	pub name: String,
	/// Owning resource uid.
	pub uid: String,
}

/// Key-value object persisted in the cluster secret store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
	/// Namespace.
	pub namespace: String,
	/// Name, unique within the namespace.
	pub name: String,
	/// Labels.
	pub labels: BTreeMap<String, String>,
	/// Owner.
	pub owner: OwnerReference,
	/// Payload.
	pub data: BTreeMap<String, String>,
}

/// Cluster secret store seam.
#[async_trait]
pub trait SecretStore: Debug + Send + Sync {
	/// Read a secret.
	async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

	/// Create or overwrite a secret.
	async fn put(&self, secret: Secret) -> Result<()>;

	/// Remove a secret; `false` when it did not exist.
	async fn delete(&self, namespace: &str, name: &str) -> Result<bool>;
}

/// Result of materializing a credential bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutOutcome {
	/// No secret existed.
	Created,
	/// An existing secret was overwritten in place.
	Updated,
	/// The stored secret already held the bundle.
	Unchanged,
}

/// Writes credential bundles under a name derived from the owning resource.
#[derive(Clone, Debug)]
pub struct SecretMaterializer {
	store: Arc<dyn SecretStore>,
}
impl SecretMaterializer {
	/// Materializer over `store`.
	pub fn new(store: Arc<dyn SecretStore>) -> Self {
		Self { store }
	}

	/// Stable secret name for `owner`.
	pub fn secret_name(owner: &ClientResource) -> String {
		format!("{}-{}", owner.key.name, owner.kind().as_str())
	}

	/// Current secret of `owner`; secrets held by another incarnation of the name are ignored.
	pub async fn get(&self, owner: &ClientResource) -> Result<Option<Secret>> {
		let name = Self::secret_name(owner);
		let secret = self.store.get(&owner.key.namespace, &name).await?;

		Ok(secret.filter(|secret| secret.owner.uid == owner.uid))
	}

	/// Create the secret, or overwrite it when the bundle differs.
	pub async fn put(
		&self,
		owner: &ClientResource,
		data: BTreeMap<String, String>,
	) -> Result<PutOutcome> {
		let desired = Secret {
			namespace: owner.key.namespace.clone(),
			name: Self::secret_name(owner),
			labels: BTreeMap::from([
				("app".to_owned(), owner.key.name.clone()),
				("type".to_owned(), TYPE_LABEL_VALUE.to_owned()),
			]),
			owner: OwnerReference {
				kind: owner.kind(),
				name: owner.key.name.clone(),
				uid: owner.uid.clone(),
			},
			data,
		};
		let outcome = match self.store.get(&desired.namespace, &desired.name).await? {
			Some(existing) if existing == desired => return Ok(PutOutcome::Unchanged),
			Some(_) => PutOutcome::Updated,
			None => PutOutcome::Created,
		};

		tracing::debug!(
			namespace = %desired.namespace,
			name = %desired.name,
			?outcome,
			"writing credential secret"
		);

		self.store.put(desired).await?;

		Ok(outcome)
	}

	/// Remove the secret of `owner`; succeeds when it is already gone.
	///
	/// A secret of the same name held by another incarnation of the resource is left alone.
	pub async fn delete(&self, owner: &ClientResource) -> Result<()> {
		let namespace = &owner.key.namespace;
		let name = Self::secret_name(owner);

		match self.store.get(namespace, &name).await? {
			Some(secret) if secret.owner.uid == owner.uid => {
				if self.store.delete(namespace, &name).await? {
					tracing::debug!(%namespace, %name, "deleted credential secret");
				}
			},
			Some(secret) => {
				tracing::debug!(
					%namespace,
					%name,
					holder = %secret.owner.uid,
					"credential secret belongs to another owner; keeping it"
				);
			},
			None => {},
		}

		Ok(())
	}
}
