//! Provider discovery metadata.

// crates.io
use reqwest::Client;
use serde::Deserialize;
use url::Url;
// self
use crate::{_prelude::*, error::ProviderErrorKind};

/// Snapshot of a provider's discovery document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderMetadata {
	/// Location the document was fetched from.
	pub well_known_url: Url,
	/// Issuer identifier; also the audience of client assertions.
	pub issuer: String,
	/// Token endpoint.
	pub token_endpoint: Url,
	/// Provider signing keys.
	pub jwks_uri: Url,
	/// Interactive login endpoint, OpenID providers only.
	pub authorization_endpoint: Option<Url>,
	/// Logout endpoint, OpenID providers only.
	pub end_session_endpoint: Option<Url>,
}
impl ProviderMetadata {
	/// Fetch and parse the discovery document at `well_known_url`.
	pub async fn discover(http: &Client, well_known_url: &Url) -> Result<Self> {
		let response = http
			.get(well_known_url.clone())
			.send()
			.await
			.map_err(|err| Error::provider_transport("discover", err))?;
		let status = response.status();

		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();

			return Err(Error::Provider {
				kind: ProviderErrorKind::Unavailable,
				operation: "discover",
				status: Some(status),
				message: body.trim().to_owned(),
				retry_after: None,
			});
		}

		let document: Document =
			response.json().await.map_err(|err| Error::provider_transport("discover", err))?;

		if document.issuer.trim().is_empty() {
			return Err(Error::Validation {
				field: "well_known_url",
				reason: "Discovery document has an empty issuer.".into(),
			});
		}

		tracing::info!(issuer = %document.issuer, %well_known_url, "discovered provider metadata");

		Ok(Self {
			well_known_url: well_known_url.clone(),
			issuer: document.issuer,
			token_endpoint: document.token_endpoint,
			jwks_uri: document.jwks_uri,
			authorization_endpoint: document.authorization_endpoint,
			end_session_endpoint: document.end_session_endpoint,
		})
	}
}

#[derive(Deserialize)]
struct Document {
	issuer: String,
	token_endpoint: Url,
	jwks_uri: Url,
	#[serde(default)]
	authorization_endpoint: Option<Url>,
	#[serde(default)]
	end_session_endpoint: Option<Url>,
}
