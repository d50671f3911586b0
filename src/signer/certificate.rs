//! PEM certificate chains for the `x5c` and `x5t#S256` assertion headers.

// std
use std::path::Path;
// crates.io
use base64::prelude::*;
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

const BEGIN_CERTIFICATE: &str = "-----BEGIN CERTIFICATE-----";
const END_CERTIFICATE: &str = "-----END CERTIFICATE-----";

/// DER certificates ordered leaf first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateChain {
	certificates: Arc<[Vec<u8>]>,
}
impl CertificateChain {
	/// Parse every `CERTIFICATE` block in a PEM document.
	pub fn from_pem(pem: &str) -> Result<Self> {
		let mut certificates = Vec::new();
		let mut body: Option<String> = None;

		for line in pem.lines().map(str::trim) {
			if line == BEGIN_CERTIFICATE {
				if body.is_some() {
					return Err(invalid("Nested BEGIN CERTIFICATE marker."));
				}

				body = Some(String::new());
			} else if line == END_CERTIFICATE {
				if let Some(encoded) = body.take() {
					let der = BASE64_STANDARD.decode(encoded.as_bytes()).map_err(|err| {
						invalid(format!("Invalid base64 certificate body: {err}."))
					})?;

					certificates.push(der);
				}
			} else if let Some(encoded) = body.as_mut() {
				encoded.push_str(line);
			}
		}

		if body.is_some() {
			return Err(invalid("Unterminated certificate block."));
		}
		if certificates.is_empty() {
			return Err(invalid("No certificates found."));
		}

		Ok(Self { certificates: certificates.into() })
	}

	/// Read and parse a PEM file.
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
		let pem = std::fs::read_to_string(path)?;

		Self::from_pem(&pem)
	}

	/// Number of certificates in the chain.
	pub fn len(&self) -> usize {
		self.certificates.len()
	}

	/// Always false for a parsed chain.
	pub fn is_empty(&self) -> bool {
		self.certificates.is_empty()
	}

	/// Standard base64 DER values for the `x5c` header.
	pub fn x5c(&self) -> Vec<String> {
		self.certificates.iter().map(|der| BASE64_STANDARD.encode(der)).collect()
	}

	/// Base64url SHA-256 thumbprint of the leaf certificate for the `x5t#S256` header.
	pub fn leaf_thumbprint(&self) -> String {
		let leaf = self.certificates.first().map(Vec::as_slice).unwrap_or_default();

		BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(leaf))
	}
}

fn invalid(reason: impl Into<String>) -> Error {
	Error::Validation { field: "certificate_chain", reason: reason.into() }
}
