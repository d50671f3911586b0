//! Client assertions signed by a key that never leaves the remote key-management service.

pub mod assertion;
pub mod certificate;
pub mod kms;

pub use assertion::{AssertionClaims, AssertionSigner, SignerConfig};
pub use certificate::CertificateChain;
pub use kms::{KmsCredentials, KmsSigner};

// std
use std::fmt::Debug;
// crates.io
use async_trait::async_trait;
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
// self
use crate::_prelude::*;

/// Remote signing capability.
///
/// Implementations receive a SHA-256 digest and return the signature in the backend's native
/// encoding (PKCS#1/PSS bytes for RSA, DER for ECDSA). Transport and authorization failures
/// surface as [`Error::SigningUnavailable`].
#[async_trait]
pub trait KeySigner: Debug + Send + Sync {
	/// Sign `digest` with the key at `key_path`.
	async fn sign(&self, key_path: &str, digest: &[u8], algorithm: SigningAlgorithm)
	-> Result<Vec<u8>>;
}

/// Signing algorithms supported for client assertions; the digest is always SHA-256.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigningAlgorithm {
	/// RSASSA-PKCS1-v1_5.
	#[default]
	#[serde(rename = "RS256")]
	Rs256,
	/// RSASSA-PSS.
	#[serde(rename = "PS256")]
	Ps256,
	/// ECDSA over P-256.
	#[serde(rename = "ES256")]
	Es256,
}
impl SigningAlgorithm {
	/// Matching JOSE algorithm.
	pub fn jwt_algorithm(self) -> Algorithm {
		match self {
			Self::Rs256 => Algorithm::RS256,
			Self::Ps256 => Algorithm::PS256,
			Self::Es256 => Algorithm::ES256,
		}
	}
}

/// Convert a DER-encoded ECDSA signature into the fixed-width `r || s` form JOSE expects.
pub fn ecdsa_der_to_jose(der: &[u8], component_len: usize) -> Result<Vec<u8>> {
	fn malformed(reason: &str) -> Error {
		Error::SigningUnavailable(format!("Malformed ECDSA signature: {reason}."))
	}

	fn read_len(input: &[u8], at: &mut usize) -> Result<usize> {
		let first = *input.get(*at).ok_or_else(|| malformed("truncated length"))?;

		*at += 1;

		if first & 0x80 == 0 {
			return Ok(first as usize);
		}

		let octets = (first & 0x7f) as usize;

		if octets == 0 || octets > 2 {
			return Err(malformed("unsupported length encoding"));
		}

		let mut len = 0usize;

		for _ in 0..octets {
			let byte = *input.get(*at).ok_or_else(|| malformed("truncated length"))?;

			len = (len << 8) | byte as usize;
			*at += 1;
		}

		Ok(len)
	}

	fn read_integer<'a>(input: &'a [u8], at: &mut usize) -> Result<&'a [u8]> {
		if input.get(*at) != Some(&0x02) {
			return Err(malformed("expected INTEGER"));
		}

		*at += 1;

		let len = read_len(input, at)?;
		let value = input.get(*at..*at + len).ok_or_else(|| malformed("truncated INTEGER"))?;

		*at += len;

		Ok(value)
	}

	if der.first() != Some(&0x30) {
		return Err(malformed("expected SEQUENCE"));
	}

	let mut at = 1;
	let seq_len = read_len(der, &mut at)?;

	if at + seq_len != der.len() {
		return Err(malformed("trailing bytes"));
	}

	let r = read_integer(der, &mut at)?;
	let s = read_integer(der, &mut at)?;
	let mut out = vec![0u8; component_len * 2];

	for (component, offset) in [(r, 0), (s, component_len)] {
		let trimmed = match component.iter().position(|b| *b != 0) {
			Some(start) => &component[start..],
			None => &[][..],
		};

		if trimmed.len() > component_len {
			return Err(malformed("component too large"));
		}

		let start = offset + component_len - trimmed.len();

		out[start..offset + component_len].copy_from_slice(trimmed);
	}

	Ok(out)
}
