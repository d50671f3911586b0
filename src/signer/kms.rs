//! Cloud KMS backed [`KeySigner`].

// crates.io
use async_trait::async_trait;
use base64::prelude::*;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use url::Url;
// self
use crate::{
	_prelude::*,
	signer::{KeySigner, SigningAlgorithm},
};

/// Public Cloud KMS endpoint.
pub const DEFAULT_KMS_ENDPOINT: &str = "https://cloudkms.googleapis.com";
/// Instance metadata endpoint handing out access tokens for the attached service account.
pub const METADATA_TOKEN_URL: &str =
	"http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// How the signer authenticates against KMS.
#[derive(Clone)]
pub enum KmsCredentials {
	/// Fixed bearer token.
	Static(String),
	/// Token fetched from the instance metadata server on every call.
	MetadataServer(Url),
}
impl std::fmt::Debug for KmsCredentials {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Static(_) => f.write_str("Static(***)"),
			Self::MetadataServer(url) => f.debug_tuple("MetadataServer").field(url).finish(),
		}
	}
}

/// Signs digests with `asymmetricSign`; the private key never leaves KMS.
#[derive(Clone, Debug)]
pub struct KmsSigner {
	client: Client,
	endpoint: Url,
	credentials: KmsCredentials,
}
impl KmsSigner {
	/// Build a signer against `endpoint`.
	pub fn new(client: Client, endpoint: Url, credentials: KmsCredentials) -> Self {
		Self { client, endpoint, credentials }
	}

	/// Signer against the public endpoint using metadata-server credentials.
	pub fn with_defaults(client: Client) -> Result<Self> {
		let endpoint = Url::parse(DEFAULT_KMS_ENDPOINT)?;
		let metadata = Url::parse(METADATA_TOKEN_URL)?;

		Ok(Self::new(client, endpoint, KmsCredentials::MetadataServer(metadata)))
	}

	async fn access_token(&self) -> Result<String> {
		match &self.credentials {
			KmsCredentials::Static(token) => Ok(token.clone()),
			KmsCredentials::MetadataServer(url) => {
				let response = self
					.client
					.get(url.clone())
					.header("Metadata-Flavor", "Google")
					.send()
					.await
					.map_err(|err| unavailable("metadata token request failed", err))?;
				let response = ensure_success("metadata token request", response).await?;
				let token: MetadataToken = response
					.json()
					.await
					.map_err(|err| unavailable("metadata token response unreadable", err))?;

				Ok(token.access_token)
			},
		}
	}
}
#[async_trait]
impl KeySigner for KmsSigner {
	async fn sign(
		&self,
		key_path: &str,
		digest: &[u8],
		algorithm: SigningAlgorithm,
	) -> Result<Vec<u8>> {
		let token = self.access_token().await?;
		let url = format!(
			"{}/v1/{}:asymmetricSign",
			self.endpoint.as_str().trim_end_matches('/'),
			key_path.trim_start_matches('/')
		);
		let request = SignRequest { digest: SignDigest { sha256: BASE64_STANDARD.encode(digest) } };
		let response = self
			.client
			.post(url)
			.bearer_auth(token)
			.json(&request)
			.send()
			.await
			.map_err(|err| unavailable("asymmetricSign request failed", err))?;
		let response = ensure_success("asymmetricSign", response).await?;
		let body: SignResponse = response
			.json()
			.await
			.map_err(|err| unavailable("asymmetricSign response unreadable", err))?;
		let signature = BASE64_STANDARD.decode(body.signature.as_bytes()).map_err(|err| {
			Error::SigningUnavailable(format!("asymmetricSign returned invalid base64: {err}."))
		})?;

		tracing::debug!(key_path, ?algorithm, "kms signature obtained");

		Ok(signature)
	}
}

#[derive(Serialize)]
struct SignRequest {
	digest: SignDigest,
}

#[derive(Serialize)]
struct SignDigest {
	sha256: String,
}

#[derive(Deserialize)]
struct SignResponse {
	signature: String,
}

#[derive(Deserialize)]
struct MetadataToken {
	access_token: String,
}

fn unavailable(context: &str, err: reqwest::Error) -> Error {
	Error::SigningUnavailable(format!("{context}: {err}."))
}

async fn ensure_success(operation: &str, response: Response) -> Result<Response> {
	let status = response.status();

	if status.is_success() {
		return Ok(response);
	}

	let body = response.text().await.unwrap_or_default();

	Err(Error::SigningUnavailable(format!("{operation} returned {status}: {}", body.trim())))
}
