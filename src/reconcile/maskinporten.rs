//! Machine-to-machine clients.

// self
use crate::{
	_prelude::*,
	provider::{
		ClientRegistration, IntegrationType,
		registration::{JWT_BEARER_GRANT, PRIVATE_KEY_JWT},
	},
	reconcile::strategy::{RegistrationStrategy, invalid, kind_mismatch},
	resource::{ClientKind, ClientResource, ClientSpec, MaskinportenSpec},
};

/// Maskinporten registration rules.
#[derive(Clone, Copy, Debug, Default)]
pub struct MaskinportenStrategy;
impl MaskinportenStrategy {
	fn spec<'a>(&self, resource: &'a ClientResource) -> Result<&'a MaskinportenSpec> {
		match &resource.spec {
			ClientSpec::Maskinporten(spec) => Ok(spec),
			ClientSpec::IdPorten(_) => Err(kind_mismatch(ClientKind::Maskinporten, resource)),
		}
	}
}
impl RegistrationStrategy for MaskinportenStrategy {
	fn kind(&self) -> ClientKind {
		ClientKind::Maskinporten
	}

	fn secret_prefix(&self) -> &'static str {
		"MASKINPORTEN"
	}

	fn validate(&self, resource: &ClientResource) -> Result<()> {
		let spec = self.spec(resource)?;
		let scopes = spec
			.consumed_scopes
			.iter()
			.map(|scope| ("consumedScopes", scope))
			.chain(spec.exposed_scopes.iter().map(|scope| ("exposedScopes", scope)));

		for (field, scope) in scopes {
			if scope.is_empty() || scope.chars().any(char::is_whitespace) {
				return Err(invalid(
					field,
					format!("Scope {scope:?} must be non-empty and contain no whitespace."),
				));
			}
		}

		Ok(())
	}

	fn consumed_scopes<'a>(&self, resource: &'a ClientResource) -> &'a [String] {
		match &resource.spec {
			ClientSpec::Maskinporten(spec) => &spec.consumed_scopes,
			ClientSpec::IdPorten(_) => &[],
		}
	}

	fn build_registration(
		&self,
		resource: &ClientResource,
		cluster_name: &str,
		granted_scopes: &[String],
	) -> Result<ClientRegistration> {
		let spec = self.spec(resource)?;
		let description = resource.unique_name(cluster_name);

		Ok(ClientRegistration {
			client_name: spec.client_name.clone().unwrap_or_else(|| description.clone()),
			description,
			integration_type: IntegrationType::Maskinporten,
			application_type: "web".into(),
			client_uri: None,
			redirect_uris: Vec::new(),
			post_logout_redirect_uris: Vec::new(),
			frontchannel_logout_uri: None,
			grant_types: vec![JWT_BEARER_GRANT.into()],
			scopes: granted_scopes.to_vec(),
			token_endpoint_auth_method: PRIVATE_KEY_JWT.into(),
			access_token_lifetime: None,
			authorization_lifetime: None,
			refresh_token_lifetime: None,
			refresh_token_usage: None,
		})
	}

	fn extra_secret_data(
		&self,
		_: &ClientResource,
		registration: &ClientRegistration,
	) -> Result<BTreeMap<String, String>> {
		Ok(BTreeMap::from([("SCOPES".to_owned(), registration.scopes.join(" "))]))
	}
}
