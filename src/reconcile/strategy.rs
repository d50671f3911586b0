//! Kind-specific behavior plugged into the shared convergence engine.

// std
use std::fmt::Debug;
// self
use crate::{
	_prelude::*,
	jwk::ClientJwk,
	provider::{ClientRegistration, ProviderMetadata},
	resource::{ClientKind, ClientResource},
};

/// Secret key suffix holding the registration identifier.
pub const CLIENT_ID: &str = "CLIENT_ID";
/// Secret key suffix holding the private client JWK.
pub const CLIENT_JWK: &str = "CLIENT_JWK";
/// Secret key suffix holding the discovery document location.
pub const WELL_KNOWN_URL: &str = "WELL_KNOWN_URL";
/// Secret key suffix holding the provider issuer.
pub const ISSUER: &str = "ISSUER";
/// Secret key suffix holding the provider key set location.
pub const JWKS_URI: &str = "JWKS_URI";
/// Secret key suffix holding the token endpoint.
pub const TOKEN_ENDPOINT: &str = "TOKEN_ENDPOINT";

/// Payload building and validation for one client kind.
pub trait RegistrationStrategy: Debug + Send + Sync {
	/// Kind this strategy handles.
	fn kind(&self) -> ClientKind;

	/// Prefix of every key in the credential secret.
	fn secret_prefix(&self) -> &'static str;

	/// Reject specs that can never be registered.
	fn validate(&self, resource: &ClientResource) -> Result<()>;

	/// Scopes to check against the provider's access records; empty skips the check.
	fn consumed_scopes<'a>(&self, resource: &'a ClientResource) -> &'a [String];

	/// Desired registration, given the approved subset of consumed scopes.
	fn build_registration(
		&self,
		resource: &ClientResource,
		cluster_name: &str,
		granted_scopes: &[String],
	) -> Result<ClientRegistration>;

	/// Kind-specific secret entries on top of the common bundle, keys without prefix.
	fn extra_secret_data(
		&self,
		resource: &ClientResource,
		registration: &ClientRegistration,
	) -> Result<BTreeMap<String, String>>;

	/// Full credential bundle.
	fn secret_data(
		&self,
		resource: &ClientResource,
		client_id: &str,
		jwk: &ClientJwk,
		metadata: &ProviderMetadata,
		registration: &ClientRegistration,
	) -> Result<BTreeMap<String, String>> {
		let prefix = self.secret_prefix();
		let mut data = BTreeMap::from([
			(CLIENT_ID, client_id.to_owned()),
			(CLIENT_JWK, serde_json::to_string(jwk)?),
			(WELL_KNOWN_URL, metadata.well_known_url.to_string()),
			(ISSUER, metadata.issuer.clone()),
			(JWKS_URI, metadata.jwks_uri.to_string()),
			(TOKEN_ENDPOINT, metadata.token_endpoint.to_string()),
		])
		.into_iter()
		.map(|(suffix, value)| (secret_key(prefix, suffix), value))
		.collect::<BTreeMap<_, _>>();

		for (suffix, value) in self.extra_secret_data(resource, registration)? {
			data.insert(secret_key(prefix, &suffix), value);
		}

		Ok(data)
	}
}

/// `{prefix}_{suffix}`.
pub fn secret_key(prefix: &str, suffix: &str) -> String {
	format!("{prefix}_{suffix}")
}

pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Error {
	Error::InvalidSpec { field, reason: reason.into() }
}

pub(crate) fn kind_mismatch(expected: ClientKind, resource: &ClientResource) -> Error {
	invalid("kind", format!("Expected a {expected} spec, found {}.", resource.kind()))
}
