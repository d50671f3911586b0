//! Registration payloads exchanged with the registration API.

// std
use std::collections::BTreeSet;
// crates.io
use serde::{Deserialize, Serialize};
use url::Url;

/// Token endpoint authentication method used by every managed client.
pub const PRIVATE_KEY_JWT: &str = "private_key_jwt";
/// Grant type used by machine-to-machine clients.
pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Provider-side integration type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationType {
	/// Interactive login.
	IdPorten,
	/// Machine-to-machine.
	Maskinporten,
	/// Types this controller never creates.
	#[serde(other)]
	Other,
}

/// Desired-owned registration fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRegistration {
	/// Display name.
	pub client_name: String,
	/// `{cluster}:{namespace}:{name}`, unique per managed resource.
	pub description: String,
	/// Integration type.
	pub integration_type: IntegrationType,
	/// Application type, always `web`.
	pub application_type: String,
	/// Landing page.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub client_uri: Option<Url>,
	/// Login callbacks.
	#[serde(default)]
	pub redirect_uris: Vec<Url>,
	/// Post-logout redirect targets.
	#[serde(default)]
	pub post_logout_redirect_uris: Vec<Url>,
	/// Front-channel logout callback.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub frontchannel_logout_uri: Option<Url>,
	/// Allowed grant types.
	#[serde(default)]
	pub grant_types: Vec<String>,
	/// Scopes the client may request.
	#[serde(default)]
	pub scopes: Vec<String>,
	/// Token endpoint authentication method.
	pub token_endpoint_auth_method: String,
	/// Access token lifetime in seconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub access_token_lifetime: Option<u32>,
	/// Session lifetime in seconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub authorization_lifetime: Option<u32>,
	/// Refresh token lifetime in seconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token_lifetime: Option<u32>,
	/// Refresh token reuse policy.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token_usage: Option<String>,
}
impl ClientRegistration {
	/// Whether `remote` disagrees with any field this registration sets.
	///
	/// Lists compare as sets; optional fields left unset here are owned by the provider.
	pub fn differs_from(&self, remote: &Self) -> bool {
		fn optional<T: PartialEq>(desired: &Option<T>, remote: &Option<T>) -> bool {
			desired.is_some() && desired != remote
		}

		self.client_name != remote.client_name
			|| self.description != remote.description
			|| self.integration_type != remote.integration_type
			|| self.application_type != remote.application_type
			|| self.token_endpoint_auth_method != remote.token_endpoint_auth_method
			|| self.client_uri != remote.client_uri
			|| self.frontchannel_logout_uri != remote.frontchannel_logout_uri
			|| !same_set(&self.redirect_uris, &remote.redirect_uris)
			|| !same_set(&self.post_logout_redirect_uris, &remote.post_logout_redirect_uris)
			|| !same_set(&self.grant_types, &remote.grant_types)
			|| !same_set(&self.scopes, &remote.scopes)
			|| optional(&self.access_token_lifetime, &remote.access_token_lifetime)
			|| optional(&self.authorization_lifetime, &remote.authorization_lifetime)
			|| optional(&self.refresh_token_lifetime, &remote.refresh_token_lifetime)
			|| optional(&self.refresh_token_usage, &remote.refresh_token_usage)
	}
}

/// Registration as reported by the provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredClient {
	/// Provider assigned identifier.
	pub client_id: String,
	/// Registered fields.
	#[serde(flatten)]
	pub registration: ClientRegistration,
}

fn same_set<T: Ord>(desired: &[T], remote: &[T]) -> bool {
	desired.iter().collect::<BTreeSet<_>>() == remote.iter().collect::<BTreeSet<_>>()
}
