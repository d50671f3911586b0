//! Admin access tokens obtained with the JWT bearer grant.

// crates.io
use reqwest::Client;
use serde::Deserialize;
use url::Url;
// self
use crate::{
	_prelude::*,
	error::ProviderErrorKind,
	provider::{client::retry_after, registration::JWT_BEARER_GRANT},
	signer::AssertionSigner,
};

/// Exchanges a fresh client assertion for a single-use access token.
#[derive(Clone, Debug)]
pub struct TokenExchange {
	http: Client,
	signer: AssertionSigner,
	token_endpoint: Url,
	audience: String,
}
impl TokenExchange {
	/// Exchange against `token_endpoint`, with assertions addressed to `audience`.
	pub fn new(
		http: Client,
		signer: AssertionSigner,
		token_endpoint: Url,
		audience: impl Into<String>,
	) -> Self {
		Self { http, signer, token_endpoint, audience: audience.into() }
	}

	/// Sign a new assertion and trade it for an access token. Nothing is cached.
	pub async fn access_token(&self) -> Result<String> {
		let assertion = self.signer.sign(&self.audience).await?;
		let response = self
			.http
			.post(self.token_endpoint.clone())
			.form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
			.send()
			.await
			.map_err(|err| Error::provider_transport("token", err))?;
		let status = response.status();

		if !status.is_success() {
			let retry_after = retry_after(response.headers());
			let kind = match ProviderErrorKind::from_status(status) {
				ProviderErrorKind::InvalidRequest => ProviderErrorKind::AuthFailure,
				ProviderErrorKind::NotFound => ProviderErrorKind::Unavailable,
				kind => kind,
			};
			let body = response.text().await.unwrap_or_default();

			return Err(Error::Provider {
				kind,
				operation: "token",
				status: Some(status),
				message: body.trim().to_owned(),
				retry_after,
			});
		}

		let token: TokenResponse =
			response.json().await.map_err(|err| Error::provider_transport("token", err))?;

		Ok(token.access_token)
	}
}

#[derive(Deserialize)]
struct TokenResponse {
	access_token: String,
}
