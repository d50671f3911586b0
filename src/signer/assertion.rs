//! Compact JWT client assertions.

// crates.io
use base64::prelude::*;
use jsonwebtoken::Header;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	signer::{CertificateChain, KeySigner, SigningAlgorithm, ecdsa_der_to_jose},
};

/// Default lifetime of a client assertion.
pub const DEFAULT_ASSERTION_TTL: Duration = Duration::from_secs(120);

/// Process-wide signing configuration, immutable after startup.
#[derive(Clone, Debug)]
pub struct SignerConfig {
	/// Remote key resource path.
	pub key_path: String,
	/// Certificate chain matching the remote key.
	pub certificate_chain: CertificateChain,
	/// Algorithm fixed by the remote key type.
	pub algorithm: SigningAlgorithm,
	/// Client identifier the controller authenticates as (`iss` and `sub`).
	pub issuer: String,
	/// Scopes requested for the admin access token.
	pub scopes: Vec<String>,
	/// Assertion lifetime.
	pub assertion_ttl: Duration,
}

/// Claims carried by a client assertion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
	/// Issuer.
	pub iss: String,
	/// Subject.
	pub sub: String,
	/// Audience, the provider issuer.
	pub aud: String,
	/// Space separated scopes.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub scope: Option<String>,
	/// Issued-at, seconds since the epoch.
	pub iat: i64,
	/// Expiry, seconds since the epoch.
	pub exp: i64,
	/// Unique assertion id.
	pub jti: String,
}

/// Produces a fresh signed assertion per call; nothing is cached.
#[derive(Clone, Debug)]
pub struct AssertionSigner {
	config: Arc<SignerConfig>,
	backend: Arc<dyn KeySigner>,
}
impl AssertionSigner {
	/// Build a signer over the given remote backend.
	pub fn new(config: SignerConfig, backend: Arc<dyn KeySigner>) -> Result<Self> {
		if config.key_path.trim().is_empty() {
			return Err(Error::Validation { field: "kms.key_path", reason: "Must not be empty.".into() });
		}
		if config.issuer.trim().is_empty() {
			return Err(Error::Validation { field: "client_id", reason: "Must not be empty.".into() });
		}
		if config.assertion_ttl.is_zero() {
			return Err(Error::Validation {
				field: "assertion_ttl",
				reason: "Must be greater than zero.".into(),
			});
		}

		Ok(Self { config: Arc::new(config), backend })
	}

	/// Immutable signing configuration.
	pub fn config(&self) -> &SignerConfig {
		&self.config
	}

	/// Fresh claims for `audience` with a new `jti` and an expiry of `now + ttl`.
	pub fn claims(&self, audience: &str) -> AssertionClaims {
		let iat = Utc::now().timestamp();
		let ttl = i64::try_from(self.config.assertion_ttl.as_secs()).unwrap_or(i64::MAX);
		let scope = (!self.config.scopes.is_empty()).then(|| self.config.scopes.join(" "));

		AssertionClaims {
			iss: self.config.issuer.clone(),
			sub: self.config.issuer.clone(),
			aud: audience.to_owned(),
			scope,
			iat,
			exp: iat.saturating_add(ttl),
			jti: uuid::Uuid::new_v4().to_string(),
		}
	}

	/// Sign a fresh assertion for `audience`.
	pub async fn sign(&self, audience: &str) -> Result<String> {
		let claims = self.claims(audience);

		self.sign_claims(&claims).await
	}

	/// Sign the supplied claims through the remote backend.
	pub async fn sign_claims(&self, claims: &AssertionClaims) -> Result<String> {
		let algorithm = self.config.algorithm;
		let mut header = Header::new(algorithm.jwt_algorithm());

		header.typ = Some("JWT".into());
		header.x5c = Some(self.config.certificate_chain.x5c());
		header.x5t_s256 = Some(self.config.certificate_chain.leaf_thumbprint());

		let signing_input = format!(
			"{}.{}",
			BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
			BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?)
		);
		let digest = Sha256::digest(signing_input.as_bytes());
		let signature = self.backend.sign(&self.config.key_path, &digest, algorithm).await?;
		let signature = match algorithm {
			SigningAlgorithm::Es256 => ecdsa_der_to_jose(&signature, 32)?,
			SigningAlgorithm::Rs256 | SigningAlgorithm::Ps256 => signature,
		};

		tracing::trace!(jti = %claims.jti, aud = %claims.aud, "signed client assertion");

		Ok(format!("{signing_input}.{}", BASE64_URL_SAFE_NO_PAD.encode(signature)))
	}
}
