//! Interactive login clients.

// crates.io
use url::Url;
// self
use crate::{
	_prelude::*,
	provider::{
		ClientRegistration, IntegrationType,
		registration::PRIVATE_KEY_JWT,
	},
	reconcile::strategy::{RegistrationStrategy, invalid, kind_mismatch},
	resource::{ClientKind, ClientResource, ClientSpec, IdPortenSpec},
};

/// Default access token lifetime in seconds.
pub const DEFAULT_ACCESS_TOKEN_LIFETIME: u32 = 3600;
/// Default session lifetime in seconds.
pub const DEFAULT_SESSION_LIFETIME: u32 = 7200;

const MAX_ACCESS_TOKEN_LIFETIME: u32 = 3600;
const MAX_SESSION_LIFETIME: u32 = 7200;
const GRANT_TYPES: [&str; 2] = ["authorization_code", "refresh_token"];
const SCOPES: [&str; 2] = ["openid", "profile"];

/// ID-porten registration rules.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdPortenStrategy;
impl IdPortenStrategy {
	fn spec<'a>(&self, resource: &'a ClientResource) -> Result<&'a IdPortenSpec> {
		match &resource.spec {
			ClientSpec::IdPorten(spec) => Ok(spec),
			ClientSpec::Maskinporten(_) => Err(kind_mismatch(ClientKind::IdPorten, resource)),
		}
	}
}
impl RegistrationStrategy for IdPortenStrategy {
	fn kind(&self) -> ClientKind {
		ClientKind::IdPorten
	}

	fn secret_prefix(&self) -> &'static str {
		"IDPORTEN"
	}

	fn validate(&self, resource: &ClientResource) -> Result<()> {
		let spec = self.spec(resource)?;

		if spec.redirect_uris.is_empty() {
			return Err(invalid("redirectUris", "At least one redirect URI is required."));
		}

		let uris = spec
			.redirect_uris
			.iter()
			.map(|uri| ("redirectUris", uri))
			.chain(spec.post_logout_redirect_uris.iter().map(|uri| ("postLogoutRedirectUris", uri)))
			.chain(spec.frontchannel_logout_uri.iter().map(|uri| ("frontchannelLogoutUri", uri)))
			.chain(spec.client_uri.iter().map(|uri| ("clientUri", uri)));

		for (field, uri) in uris {
			require_https(field, uri)?;
		}

		if let Some(lifetime) = spec.access_token_lifetime
			&& !(1..=MAX_ACCESS_TOKEN_LIFETIME).contains(&lifetime)
		{
			return Err(invalid(
				"accessTokenLifetime",
				format!("Must be between 1 and {MAX_ACCESS_TOKEN_LIFETIME} seconds."),
			));
		}
		if let Some(lifetime) = spec.session_lifetime
			&& !(1..=MAX_SESSION_LIFETIME).contains(&lifetime)
		{
			return Err(invalid(
				"sessionLifetime",
				format!("Must be between 1 and {MAX_SESSION_LIFETIME} seconds."),
			));
		}

		Ok(())
	}

	fn consumed_scopes<'a>(&self, _: &'a ClientResource) -> &'a [String] {
		&[]
	}

	fn build_registration(
		&self,
		resource: &ClientResource,
		cluster_name: &str,
		_: &[String],
	) -> Result<ClientRegistration> {
		let spec = self.spec(resource)?;
		let description = resource.unique_name(cluster_name);
		let session_lifetime = spec.session_lifetime.unwrap_or(DEFAULT_SESSION_LIFETIME);

		Ok(ClientRegistration {
			client_name: spec.client_name.clone().unwrap_or_else(|| description.clone()),
			description,
			integration_type: IntegrationType::IdPorten,
			application_type: "web".into(),
			client_uri: spec.client_uri.clone(),
			redirect_uris: spec.redirect_uris.clone(),
			post_logout_redirect_uris: spec.post_logout_redirect_uris.clone(),
			frontchannel_logout_uri: spec.frontchannel_logout_uri.clone(),
			grant_types: GRANT_TYPES.map(str::to_owned).to_vec(),
			scopes: SCOPES.map(str::to_owned).to_vec(),
			token_endpoint_auth_method: PRIVATE_KEY_JWT.into(),
			access_token_lifetime: Some(
				spec.access_token_lifetime.unwrap_or(DEFAULT_ACCESS_TOKEN_LIFETIME),
			),
			authorization_lifetime: Some(session_lifetime),
			refresh_token_lifetime: Some(session_lifetime),
			refresh_token_usage: Some("ONETIME".into()),
		})
	}

	fn extra_secret_data(
		&self,
		_: &ClientResource,
		registration: &ClientRegistration,
	) -> Result<BTreeMap<String, String>> {
		let mut data = BTreeMap::new();

		if let Some(uri) = registration.redirect_uris.first() {
			data.insert("REDIRECT_URI".to_owned(), uri.to_string());
		}

		Ok(data)
	}
}

fn require_https(field: &'static str, uri: &Url) -> Result<()> {
	if uri.scheme() == "https" {
		Ok(())
	} else {
		Err(invalid(field, format!("{uri} must use HTTPS.")))
	}
}
