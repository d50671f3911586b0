//! Desired-state resources, their observed status and the spec fingerprint.

// std
use std::fmt::{Display, Formatter, Result as FmtResult};
// crates.io
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;
// self
use crate::{_prelude::*, error::ErrorKind};

/// Namespaced identity of a desired-state resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
	/// Namespace owning the resource.
	pub namespace: String,
	/// Resource name, unique within the namespace and kind.
	pub name: String,
}
impl ResourceKey {
	/// Construct a key from namespace and name.
	pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
		Self { namespace: namespace.into(), name: name.into() }
	}
}
impl Display for ResourceKey {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		write!(f, "{}/{}", self.namespace, self.name)
	}
}

/// Kind of client registration a resource asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClientKind {
	/// Interactive OpenID Connect client.
	#[serde(rename = "IDPorten")]
	IdPorten,
	/// Machine-to-machine OAuth2 client.
	Maskinporten,
}
impl ClientKind {
	/// Every kind, in declaration order.
	pub const ALL: [Self; 2] = [Self::IdPorten, Self::Maskinporten];

	/// Lowercase label used in secret names and metrics.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::IdPorten => "idporten",
			Self::Maskinporten => "maskinporten",
		}
	}
}
impl Display for ClientKind {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Desired state of an interactive login client.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdPortenSpec {
	/// Display name registered with the provider.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub client_name: Option<String>,
	/// Landing page of the application.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub client_uri: Option<Url>,
	/// Login callback URIs.
	#[serde(default)]
	pub redirect_uris: Vec<Url>,
	/// URIs the provider may redirect to after logout.
	#[serde(default)]
	pub post_logout_redirect_uris: Vec<Url>,
	/// Front-channel logout callback.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub frontchannel_logout_uri: Option<Url>,
	/// Access token lifetime in seconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub access_token_lifetime: Option<u32>,
	/// Session lifetime in seconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub session_lifetime: Option<u32>,
}

/// Desired state of a machine-to-machine client.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskinportenSpec {
	/// Display name registered with the provider.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub client_name: Option<String>,
	/// Scopes the application wants to consume.
	#[serde(default)]
	pub consumed_scopes: Vec<String>,
	/// Scopes the application exposes to other consumers.
	#[serde(default)]
	pub exposed_scopes: Vec<String>,
}

/// Desired client registration, tagged by kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ClientSpec {
	/// Interactive login client.
	#[serde(rename = "IDPorten")]
	IdPorten(IdPortenSpec),
	/// Machine-to-machine client.
	Maskinporten(MaskinportenSpec),
}
impl ClientSpec {
	/// Kind of registration this spec asks for.
	pub fn kind(&self) -> ClientKind {
		match self {
			Self::IdPorten(_) => ClientKind::IdPorten,
			Self::Maskinporten(_) => ClientKind::Maskinporten,
		}
	}

	/// Hex-encoded SHA-256 over the canonical JSON encoding of the spec.
	pub fn fingerprint(&self) -> Result<String> {
		let encoded = serde_json::to_vec(self)?;

		Ok(format!("{:x}", Sha256::digest(&encoded)))
	}
}

/// Lifecycle states of a registration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SyncState {
	/// Nothing registered yet.
	#[default]
	Unregistered,
	/// Remote registration created, credentials not yet issued.
	Registering,
	/// Remote registration and credentials match the desired spec.
	Registered,
	/// A changed spec is being applied.
	Reconciling,
	/// Last attempt failed; awaiting retry.
	Degraded,
	/// Resource deletion is pending remote cleanup.
	Deleting,
	/// Remote registration and credentials removed.
	Deregistered,
}
impl SyncState {
	/// Every state, in declaration order.
	pub const ALL: [Self; 7] = [
		Self::Unregistered,
		Self::Registering,
		Self::Registered,
		Self::Reconciling,
		Self::Degraded,
		Self::Deleting,
		Self::Deregistered,
	];

	/// Stable identifier used in metric labels.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Unregistered => "Unregistered",
			Self::Registering => "Registering",
			Self::Registered => "Registered",
			Self::Reconciling => "Reconciling",
			Self::Degraded => "Degraded",
			Self::Deleting => "Deleting",
			Self::Deregistered => "Deregistered",
		}
	}
}

/// Condition types reported in status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
	/// Registration and credentials are in sync with the spec.
	Ready,
	/// Some consumed scopes were not granted.
	ScopesDenied,
}

/// Kubernetes-style status condition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
	/// Condition type.
	#[serde(rename = "type")]
	pub kind: ConditionType,
	/// Whether the condition currently holds.
	pub status: bool,
	/// Machine readable reason.
	pub reason: String,
	/// Human readable detail.
	pub message: String,
	/// When `status` last flipped.
	pub last_transition_time: DateTime<Utc>,
}

/// Status sub-document owned exclusively by the reconciler.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedStatus {
	/// Lifecycle state.
	#[serde(default)]
	pub state: SyncState,
	/// Registration identifier assigned by the provider.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub client_id: Option<String>,
	/// Fingerprint of the last successfully applied spec.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub applied_hash: Option<String>,
	/// Time of the last successful synchronization.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub synchronized_at: Option<DateTime<Utc>>,
	/// Consumed scopes registered with the provider.
	#[serde(default)]
	pub granted_scopes: Vec<String>,
	/// Consumed scopes left out because access is not approved.
	#[serde(default)]
	pub denied_scopes: Vec<String>,
	/// Key identifiers currently registered for the client.
	#[serde(default)]
	pub key_ids: Vec<String>,
	/// Classification of the last failure, cleared on success.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error_kind: Option<ErrorKind>,
	/// Failures since the last success.
	#[serde(default)]
	pub consecutive_failures: u32,
	/// Generation of the spec the status describes.
	#[serde(default)]
	pub observed_generation: u64,
	/// Status conditions.
	#[serde(default)]
	pub conditions: Vec<Condition>,
}
impl ObservedStatus {
	/// Look up a condition by type.
	pub fn condition(&self, kind: ConditionType) -> Option<&Condition> {
		self.conditions.iter().find(|condition| condition.kind == kind)
	}

	/// Insert or replace a condition, keeping the transition time when `status` is unchanged.
	pub fn set_condition(
		&mut self,
		kind: ConditionType,
		status: bool,
		reason: impl Into<String>,
		message: impl Into<String>,
	) {
		let reason = reason.into();
		let message = message.into();

		if let Some(existing) = self.conditions.iter_mut().find(|condition| condition.kind == kind)
		{
			if existing.status != status {
				existing.last_transition_time = Utc::now();
			}

			existing.status = status;
			existing.reason = reason;
			existing.message = message;
		} else {
			self.conditions.push(Condition {
				kind,
				status,
				reason,
				message,
				last_transition_time: Utc::now(),
			});
		}
	}

	/// Drop a condition.
	pub fn remove_condition(&mut self, kind: ConditionType) {
		self.conditions.retain(|condition| condition.kind != kind);
	}

	/// Whether the last attempt succeeded.
	pub fn is_ready(&self) -> bool {
		self.state == SyncState::Registered
			&& self.error_kind.is_none()
			&& self.condition(ConditionType::Ready).is_some_and(|condition| condition.status)
	}
}

/// A desired-state resource as read from the resource store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientResource {
	/// Namespaced identity.
	pub key: ResourceKey,
	/// Unique identifier of this incarnation of the resource.
	pub uid: String,
	/// Optimistic-concurrency token, bumped on every write.
	pub resource_version: u64,
	/// Spec generation, bumped on spec changes only.
	pub generation: u64,
	/// Set once deletion was requested; removal waits for cleanup.
	#[serde(default)]
	pub deletion_requested: bool,
	/// Desired state.
	pub spec: ClientSpec,
	/// Observed state.
	#[serde(default)]
	pub status: ObservedStatus,
}
impl ClientResource {
	/// Build a fresh resource with empty status.
	pub fn new(key: ResourceKey, uid: impl Into<String>, spec: ClientSpec) -> Self {
		Self {
			key,
			uid: uid.into(),
			resource_version: 1,
			generation: 1,
			deletion_requested: false,
			spec,
			status: ObservedStatus::default(),
		}
	}

	/// Kind of registration this resource asks for.
	pub fn kind(&self) -> ClientKind {
		self.spec.kind()
	}

	/// Provider-side description, unique per cluster, namespace and name.
	pub fn unique_name(&self, cluster: &str) -> String {
		format!("{cluster}:{}:{}", self.key.namespace, self.key.name)
	}
}
