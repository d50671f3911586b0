//! Process-wide controller configuration.
//!
//! Loaded once at startup from an optional YAML file merged with `DIGDIRATOR_`-prefixed
//! environment variables (`__` separates nested keys), validated, then shared read-only.

// std
use std::path::{Path, PathBuf};
// crates.io
use figment::{
	Figment,
	providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Deserializer, Serialize};
use url::Url;
// self
use crate::{
	_prelude::*,
	reconcile::backoff::{BackoffPolicy, JitterStrategy},
	resource::ClientKind,
	signer::{
		CertificateChain, SignerConfig, SigningAlgorithm, assertion::DEFAULT_ASSERTION_TTL,
		kms::DEFAULT_KMS_ENDPOINT,
	},
};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "DIGDIRATOR_";

const REDACTED: &str = "***REDACTED***";

/// Immutable controller configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
	/// Cluster name, part of every registration description.
	pub cluster_name: String,
	/// Base URL of the registration API.
	pub admin_base_url: Url,
	/// Relaxes HTTPS enforcement for local development.
	#[serde(default)]
	pub development_mode: bool,
	/// Controller credentials towards ID-porten.
	pub idporten: ProviderConfig,
	/// Controller credentials towards Maskinporten, required when the feature is enabled.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub maskinporten: Option<ProviderConfig>,
	/// Feature toggles.
	#[serde(default)]
	pub features: Features,
	/// Reconciliation tuning.
	#[serde(default)]
	pub reconcile: ReconcileSettings,
	/// Metrics collector tuning.
	#[serde(default)]
	pub metrics: MetricsSettings,
}
impl Config {
	/// Load from `path` (when given) and the environment, then validate.
	pub fn load(path: Option<&Path>) -> Result<Self> {
		let mut figment = Figment::new();

		if let Some(path) = path {
			if !path.exists() {
				return Err(Error::Validation {
					field: "config_path",
					reason: format!("Config file {} does not exist.", path.display()),
				});
			}

			figment = figment.merge(Yaml::file(path));
		}

		Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
	}

	/// Extract and validate from an assembled figment.
	pub fn from_figment(figment: Figment) -> Result<Self> {
		let config: Self = figment.extract()?;

		config.validate()?;

		Ok(config)
	}

	/// Validate the configuration, reporting the first offending field.
	pub fn validate(&self) -> Result<()> {
		if self.cluster_name.trim().is_empty() {
			return Err(Error::Validation { field: "cluster_name", reason: "Must not be empty.".into() });
		}

		self.require_https("admin_base_url", &self.admin_base_url)?;
		self.idporten.validate()?;
		self.require_https("idporten.well_known_url", &self.idporten.well_known_url)?;
		self.require_https("idporten.kms.endpoint", &self.idporten.kms.endpoint()?)?;

		if self.features.maskinporten {
			let Some(maskinporten) = &self.maskinporten else {
				return Err(Error::Validation {
					field: "maskinporten",
					reason: "Required when features.maskinporten is enabled.".into(),
				});
			};

			maskinporten.validate()?;
			self.require_https("maskinporten.well_known_url", &maskinporten.well_known_url)?;
			self.require_https("maskinporten.kms.endpoint", &maskinporten.kms.endpoint()?)?;
		}

		self.reconcile.validate()?;

		if self.metrics.refresh_interval_secs == 0 {
			return Err(Error::Validation {
				field: "metrics.refresh_interval_secs",
				reason: "Must be greater than zero.".into(),
			});
		}

		Ok(())
	}

	/// Provider credentials for `kind`, absent when that kind is disabled.
	pub fn provider(&self, kind: ClientKind) -> Option<&ProviderConfig> {
		match kind {
			ClientKind::IdPorten => Some(&self.idporten),
			ClientKind::Maskinporten =>
				self.maskinporten.as_ref().filter(|_| self.features.maskinporten),
		}
	}

	/// Copy safe to log: key paths and client identifiers are masked.
	pub fn redacted(&self) -> Self {
		let mut redacted = self.clone();

		redacted.idporten.redact();

		if let Some(maskinporten) = redacted.maskinporten.as_mut() {
			maskinporten.redact();
		}

		redacted
	}

	fn require_https(&self, field: &'static str, url: &Url) -> Result<()> {
		if self.development_mode || url.scheme() == "https" {
			Ok(())
		} else {
			Err(Error::Validation { field, reason: format!("{url} must use HTTPS.") })
		}
	}
}

/// Controller credentials for one provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
	/// Client the controller authenticates as.
	pub client_id: String,
	/// Scopes requested for admin access tokens; a space separated string or a list.
	#[serde(default, deserialize_with = "deserialize_scopes")]
	pub scopes: Vec<String>,
	/// Provider discovery document.
	pub well_known_url: Url,
	/// PEM certificate chain matching the KMS key.
	pub cert_chain_path: PathBuf,
	/// Remote signing key.
	pub kms: KmsConfig,
	/// Algorithm fixed by the KMS key type.
	#[serde(default)]
	pub algorithm: SigningAlgorithm,
	/// Client assertion lifetime.
	#[serde(default = "default_assertion_ttl_secs")]
	pub assertion_ttl_secs: u64,
}
impl ProviderConfig {
	/// Validate the provider credentials.
	pub fn validate(&self) -> Result<()> {
		if self.client_id.trim().is_empty() {
			return Err(Error::Validation { field: "client_id", reason: "Must not be empty.".into() });
		}
		if self.kms.key_path.trim().is_empty() {
			return Err(Error::Validation { field: "kms.key_path", reason: "Must not be empty.".into() });
		}
		if self.assertion_ttl_secs == 0 {
			return Err(Error::Validation {
				field: "assertion_ttl_secs",
				reason: "Must be greater than zero.".into(),
			});
		}

		Ok(())
	}

	/// Assemble the signer configuration, reading the certificate chain from disk.
	pub fn signer_config(&self) -> Result<SignerConfig> {
		let certificate_chain = CertificateChain::from_file(&self.cert_chain_path)?;

		Ok(SignerConfig {
			key_path: self.kms.key_path.clone(),
			certificate_chain,
			algorithm: self.algorithm,
			issuer: self.client_id.clone(),
			scopes: self.scopes.clone(),
			assertion_ttl: Duration::from_secs(self.assertion_ttl_secs),
		})
	}

	fn redact(&mut self) {
		REDACTED.clone_into(&mut self.client_id);
		REDACTED.clone_into(&mut self.kms.key_path);
	}
}

/// Remote signing key location.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KmsConfig {
	/// Full key version resource path.
	pub key_path: String,
	/// KMS API endpoint override.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub endpoint: Option<Url>,
}
impl KmsConfig {
	/// Configured endpoint, or the public KMS endpoint.
	pub fn endpoint(&self) -> Result<Url> {
		match &self.endpoint {
			Some(endpoint) => Ok(endpoint.clone()),
			None => Ok(Url::parse(DEFAULT_KMS_ENDPOINT)?),
		}
	}
}

/// Feature toggles.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
	/// Reconcile Maskinporten clients.
	#[serde(default)]
	pub maskinporten: bool,
}

/// Reconciliation tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSettings {
	/// Upper bound for a single invocation.
	pub timeout_secs: u64,
	/// Interval at which the invoking framework re-queues settled resources. Denied scopes are
	/// checked for approval again at the same cadence.
	pub resync_interval_secs: u64,
	/// Status write attempts before surfacing a conflict.
	pub status_write_attempts: u32,
	/// Modulus size for minted client keys.
	pub client_key_bits: usize,
	/// Backoff hint tuning.
	pub backoff: BackoffSettings,
}
impl ReconcileSettings {
	/// Per-invocation deadline.
	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_secs)
	}

	/// Re-queue interval for settled resources.
	pub fn resync_interval(&self) -> Duration {
		Duration::from_secs(self.resync_interval_secs)
	}

	/// Backoff policy derived from the configured bounds.
	pub fn backoff_policy(&self) -> BackoffPolicy {
		BackoffPolicy {
			initial_backoff: Duration::from_secs(self.backoff.initial_secs),
			max_backoff: Duration::from_secs(self.backoff.max_secs),
			jitter: self.backoff.jitter,
		}
	}

	fn validate(&self) -> Result<()> {
		if self.timeout_secs == 0 {
			return Err(Error::Validation {
				field: "reconcile.timeout_secs",
				reason: "Must be greater than zero.".into(),
			});
		}
		if self.status_write_attempts == 0 {
			return Err(Error::Validation {
				field: "reconcile.status_write_attempts",
				reason: "Must be at least 1.".into(),
			});
		}
		if self.client_key_bits < 2048 {
			return Err(Error::Validation {
				field: "reconcile.client_key_bits",
				reason: "Must be at least 2048.".into(),
			});
		}

		self.backoff_policy().validate()
	}
}
impl Default for ReconcileSettings {
	fn default() -> Self {
		Self {
			timeout_secs: 30,
			resync_interval_secs: 60 * 60,
			status_write_attempts: 3,
			client_key_bits: crate::jwk::DEFAULT_CLIENT_KEY_BITS,
			backoff: BackoffSettings::default(),
		}
	}
}

/// Backoff bounds in seconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffSettings {
	/// Delay after the first failure.
	pub initial_secs: u64,
	/// Cap on exponential growth.
	pub max_secs: u64,
	/// Randomization strategy.
	pub jitter: JitterStrategy,
}
impl Default for BackoffSettings {
	fn default() -> Self {
		let policy = BackoffPolicy::default();

		Self {
			initial_secs: policy.initial_backoff.as_secs(),
			max_secs: policy.max_backoff.as_secs(),
			jitter: policy.jitter,
		}
	}
}

/// Metrics collector tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
	/// Gauge refresh interval.
	pub refresh_interval_secs: u64,
}
impl MetricsSettings {
	/// Gauge refresh interval.
	pub fn refresh_interval(&self) -> Duration {
		Duration::from_secs(self.refresh_interval_secs)
	}
}
impl Default for MetricsSettings {
	fn default() -> Self {
		Self { refresh_interval_secs: 60 }
	}
}

fn default_assertion_ttl_secs() -> u64 {
	DEFAULT_ASSERTION_TTL.as_secs()
}

fn deserialize_scopes<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Scopes {
		Joined(String),
		List(Vec<String>),
	}

	let scopes = match Scopes::deserialize(deserializer)? {
		Scopes::Joined(joined) => joined.split_whitespace().map(str::to_owned).collect(),
		Scopes::List(list) => list.into_iter().filter(|scope| !scope.trim().is_empty()).collect(),
	};

	Ok(scopes)
}
