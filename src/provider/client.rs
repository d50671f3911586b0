//! Typed client for the registration API.
//!
//! Every call authenticates with a freshly exchanged access token. No call is retried here;
//! failures are mapped onto [`ProviderErrorKind`] and returned to the caller.

// std
use std::time::SystemTime;
// crates.io
use http::{HeaderMap, StatusCode, header::RETRY_AFTER};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, de::DeserializeOwned};
use url::Url;
// self
use crate::{
	_prelude::*,
	error::ProviderErrorKind,
	jwk::ClientJwks,
	provider::{
		metadata::ProviderMetadata,
		registration::{ClientRegistration, RegisteredClient},
		token::TokenExchange,
	},
	scope::ScopeAccess,
	signer::AssertionSigner,
};

/// Result of a delete call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
	/// The registration was removed.
	Deleted,
	/// No registration existed under the identifier.
	NotFound,
}

/// Registration API client for one provider.
#[derive(Clone, Debug)]
pub struct ProviderClient {
	http: Client,
	base_url: Url,
	tokens: TokenExchange,
}
impl ProviderClient {
	/// Client against `base_url`, authenticating at the provider described by `metadata`.
	pub fn new(
		http: Client,
		base_url: Url,
		signer: AssertionSigner,
		metadata: &ProviderMetadata,
	) -> Self {
		let tokens = TokenExchange::new(
			http.clone(),
			signer,
			metadata.token_endpoint.clone(),
			metadata.issuer.clone(),
		);

		Self { http, base_url, tokens }
	}

	/// Register a new client.
	pub async fn create(&self, registration: &ClientRegistration) -> Result<RegisteredClient> {
		let request = self.request(Method::POST, &["clients"]).await?.json(registration);
		let client: RegisteredClient = parse("create", self.send("create", request).await?).await?;

		tracing::info!(
			client_id = %client.client_id,
			description = %registration.description,
			"created client registration"
		);

		Ok(client)
	}

	/// Fetch a registration; `None` when the provider does not know the identifier.
	pub async fn get(&self, client_id: &str) -> Result<Option<RegisteredClient>> {
		let request = self.request(Method::GET, &["clients", client_id]).await?;

		match self.send("get", request).await {
			Ok(response) => parse("get", response).await.map(Some),
			Err(err) if err.provider_kind() == Some(ProviderErrorKind::NotFound) => Ok(None),
			Err(err) => Err(err),
		}
	}

	/// Replace the desired-owned fields of a registration.
	pub async fn update(
		&self,
		client_id: &str,
		registration: &ClientRegistration,
	) -> Result<RegisteredClient> {
		let request =
			self.request(Method::PUT, &["clients", client_id]).await?.json(registration);
		let client = parse("update", self.send("update", request).await?).await?;

		tracing::info!(client_id, "updated client registration");

		Ok(client)
	}

	/// Remove a registration.
	pub async fn delete(&self, client_id: &str) -> Result<DeleteOutcome> {
		let request = self.request(Method::DELETE, &["clients", client_id]).await?;

		match self.send("delete", request).await {
			Ok(_) => {
				tracing::info!(client_id, "deleted client registration");

				Ok(DeleteOutcome::Deleted)
			},
			Err(err) if err.provider_kind() == Some(ProviderErrorKind::NotFound) => {
				tracing::debug!(client_id, "client registration already absent");

				Ok(DeleteOutcome::NotFound)
			},
			Err(err) => Err(err),
		}
	}

	/// Replace the public keys a client may authenticate with.
	pub async fn register_keys(&self, client_id: &str, jwks: &ClientJwks) -> Result<()> {
		let request =
			self.request(Method::POST, &["clients", client_id, "jwks"]).await?.json(jwks);

		self.send("register_keys", request).await?;

		tracing::debug!(client_id, key_ids = ?jwks.key_ids(), "registered client keys");

		Ok(())
	}

	/// Scope access records visible to the controller.
	pub async fn accessible_scopes(&self) -> Result<Vec<ScopeAccess>> {
		let request = self.request(Method::GET, &["scopes", "access", "all"]).await?;

		parse("accessible_scopes", self.send("accessible_scopes", request).await?).await
	}

	async fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
		let url = self.endpoint(segments)?;
		let token = self.tokens.access_token().await?;

		Ok(self.http.request(method, url).bearer_auth(token))
	}

	fn endpoint(&self, segments: &[&str]) -> Result<Url> {
		let mut url = self.base_url.clone();

		url.path_segments_mut()
			.map_err(|_| Error::Validation {
				field: "admin_base_url",
				reason: "Cannot be used as a base URL.".into(),
			})?
			.pop_if_empty()
			.extend(["api", "v1"])
			.extend(segments);

		Ok(url)
	}

	async fn send(&self, operation: &'static str, request: RequestBuilder) -> Result<Response> {
		let response =
			request.send().await.map_err(|err| Error::provider_transport(operation, err))?;
		let status = response.status();

		if status.is_success() {
			return Ok(response);
		}

		Err(failure(operation, status, response).await)
	}
}

#[derive(Deserialize)]
struct ErrorPayload {
	#[serde(default)]
	error: Option<String>,
	#[serde(default)]
	error_description: Option<String>,
}

/// Parse a `Retry-After` header given as delta-seconds or an HTTP date.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
	let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

	if let Ok(seconds) = raw.parse::<u64>() {
		return Some(Duration::from_secs(seconds));
	}

	let at = httpdate::parse_http_date(raw).ok()?;

	Some(at.duration_since(SystemTime::now()).unwrap_or(Duration::ZERO))
}

async fn failure(operation: &'static str, status: StatusCode, response: Response) -> Error {
	let kind = ProviderErrorKind::from_status(status);
	let retry_after = retry_after(response.headers());
	let body = response.text().await.unwrap_or_default();
	let message = match serde_json::from_str::<ErrorPayload>(&body) {
		Ok(ErrorPayload { error: Some(error), error_description: Some(description) }) =>
			format!("{error}: {description}"),
		Ok(ErrorPayload { error: Some(error), .. }) => error,
		Ok(ErrorPayload { error_description: Some(description), .. }) => description,
		_ => body.trim().to_owned(),
	};

	tracing::debug!(operation, %status, %kind, %message, "registration api call failed");

	Error::Provider { kind, operation, status: Some(status), message, retry_after }
}

async fn parse<T>(operation: &'static str, response: Response) -> Result<T>
where
	T: DeserializeOwned,
{
	response.json().await.map_err(|err| Error::provider_transport(operation, err))
}
