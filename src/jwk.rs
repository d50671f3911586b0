//! Client key material registered with the provider and handed to workloads.

// std
use std::fmt::{Debug, Formatter, Result as FmtResult};
// crates.io
use base64::prelude::*;
use rsa::{
	RsaPrivateKey,
	pkcs1::{EncodeRsaPrivateKey, RsaPrivateKey as Pkcs1PrivateKey},
	rand_core::OsRng,
};
use serde::{Deserialize, Serialize};
// self
use crate::_prelude::*;

/// Default modulus size for minted client keys.
pub const DEFAULT_CLIENT_KEY_BITS: usize = 2048;

/// RSA JSON Web Key. Private members are present only on keys destined for the secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientJwk {
	/// Key type, always `RSA`.
	pub kty: String,
	/// Key identifier.
	pub kid: String,
	/// Intended use, always `sig`.
	#[serde(rename = "use")]
	pub key_use: String,
	/// Algorithm the key signs with.
	pub alg: String,
	/// Modulus.
	pub n: String,
	/// Public exponent.
	pub e: String,
	/// Private exponent.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub d: Option<String>,
	/// First prime factor.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub p: Option<String>,
	/// Second prime factor.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub q: Option<String>,
	/// First factor CRT exponent.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub dp: Option<String>,
	/// Second factor CRT exponent.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub dq: Option<String>,
	/// First CRT coefficient.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub qi: Option<String>,
}
impl ClientJwk {
	/// Encode an RSA private key together with its CRT values.
	pub fn from_private_key(kid: impl Into<String>, key: &RsaPrivateKey) -> Result<Self> {
		let der = key.to_pkcs1_der().map_err(|err| Error::KeyMaterial(err.to_string()))?;
		let parts = Pkcs1PrivateKey::try_from(der.as_bytes())
			.map_err(|err| Error::KeyMaterial(err.to_string()))?;

		if parts.other_prime_infos.is_some() {
			return Err(Error::KeyMaterial("Multi-prime keys are not supported.".into()));
		}

		Ok(Self {
			kty: "RSA".into(),
			kid: kid.into(),
			key_use: "sig".into(),
			alg: "RS256".into(),
			n: encode(parts.modulus.as_bytes()),
			e: encode(parts.public_exponent.as_bytes()),
			d: Some(encode(parts.private_exponent.as_bytes())),
			p: Some(encode(parts.prime1.as_bytes())),
			q: Some(encode(parts.prime2.as_bytes())),
			dp: Some(encode(parts.exponent1.as_bytes())),
			dq: Some(encode(parts.exponent2.as_bytes())),
			qi: Some(encode(parts.coefficient.as_bytes())),
		})
	}

	/// Copy without private members, suitable for registration.
	pub fn public(&self) -> Self {
		Self {
			kty: self.kty.clone(),
			kid: self.kid.clone(),
			key_use: self.key_use.clone(),
			alg: self.alg.clone(),
			n: self.n.clone(),
			e: self.e.clone(),
			d: None,
			p: None,
			q: None,
			dp: None,
			dq: None,
			qi: None,
		}
	}

	/// Whether the key carries private members.
	pub fn is_private(&self) -> bool {
		self.d.is_some()
	}
}
impl Debug for ClientJwk {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("ClientJwk")
			.field("kid", &self.kid)
			.field("alg", &self.alg)
			.field("private", &self.is_private())
			.finish_non_exhaustive()
	}
}

/// Public key set registered for a client.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientJwks {
	/// Registered keys, newest first.
	pub keys: Vec<ClientJwk>,
}
impl ClientJwks {
	/// Public set holding `current` followed by `previous` when its `kid` differs.
	pub fn rotation(current: &ClientJwk, previous: Option<&ClientJwk>) -> Self {
		let mut keys = vec![current.public()];

		if let Some(previous) = previous.filter(|previous| previous.kid != current.kid) {
			keys.push(previous.public());
		}

		Self { keys }
	}

	/// Identifiers of every key in the set.
	pub fn key_ids(&self) -> Vec<String> {
		self.keys.iter().map(|key| key.kid.clone()).collect()
	}
}

/// Produces fresh client keys.
pub trait KeyMinter: Debug + Send + Sync {
	/// Mint a new private key with a unique `kid`.
	fn mint(&self) -> Result<ClientJwk>;
}

/// Generates RSA keys from the operating system RNG.
#[derive(Clone, Debug)]
pub struct RsaKeyMinter {
	bits: usize,
}
impl RsaKeyMinter {
	/// Minter producing keys with a `bits`-wide modulus.
	pub fn new(bits: usize) -> Self {
		Self { bits }
	}
}
impl Default for RsaKeyMinter {
	fn default() -> Self {
		Self::new(DEFAULT_CLIENT_KEY_BITS)
	}
}
impl KeyMinter for RsaKeyMinter {
	fn mint(&self) -> Result<ClientJwk> {
		let key = RsaPrivateKey::new(&mut OsRng, self.bits)
			.map_err(|err| Error::KeyMaterial(err.to_string()))?;
		let kid = uuid::Uuid::new_v4().to_string();

		tracing::debug!(%kid, bits = self.bits, "minted client key");

		ClientJwk::from_private_key(kid, &key)
	}
}

fn encode(value: &[u8]) -> String {
	BASE64_URL_SAFE_NO_PAD.encode(value)
}
