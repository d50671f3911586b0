//! Crate-wide error types, the failure taxonomy and the `Result` alias.

// std
use std::fmt::{Display, Formatter, Result as FmtResult};
// crates.io
use http::StatusCode;
use serde::{Deserialize, Serialize};
// self
use crate::_prelude::*;

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the controller crate.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Config(#[from] Box<figment::Error>),
	#[error(transparent)]
	Jsonwebtoken(#[from] jsonwebtoken::errors::Error),
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),
	#[error(transparent)]
	Url(#[from] url::ParseError),

	#[error("Invalid client spec for {field}: {reason}")]
	InvalidSpec { field: &'static str, reason: String },
	#[error("Provider answered {operation} with {kind}{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
	Provider {
		kind: ProviderErrorKind,
		operation: &'static str,
		status: Option<StatusCode>,
		message: String,
		retry_after: Option<Duration>,
	},
	#[error("Signing unavailable: {0}")]
	SigningUnavailable(String),
	#[error("Secret store failure: {0}")]
	SecretStore(String),
	#[error("Resource store failure: {0}")]
	ResourceStore(String),
	#[error("Status write for {resource} conflicted with a concurrent update.")]
	StatusWriteConflict { resource: String },
	#[error("Reconciliation was cancelled.")]
	Cancelled,
	#[error("Reconciliation deadline exceeded.")]
	DeadlineExceeded,
	#[error("Key material error: {0}")]
	KeyMaterial(String),
	#[error("Metrics error: {0}")]
	Metrics(String),
	#[error("Validation failed for {field}: {reason}")]
	Validation { field: &'static str, reason: String },
}
impl Error {
	/// Build a provider error without a status code, used for transport failures.
	pub fn provider_transport(operation: &'static str, err: reqwest::Error) -> Self {
		let kind = ProviderErrorKind::Unavailable;

		Self::Provider { kind, operation, status: None, message: err.to_string(), retry_after: None }
	}

	/// Classify the error into the status taxonomy.
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::InvalidSpec { .. } => ErrorKind::InvalidSpec,
			Self::Provider { kind, .. } => match kind {
				ProviderErrorKind::InvalidRequest => ErrorKind::InvalidSpec,
				ProviderErrorKind::Conflict => ErrorKind::ProviderConflict,
				ProviderErrorKind::RateLimited => ErrorKind::ProviderRateLimited,
				ProviderErrorKind::AuthFailure => ErrorKind::ProviderAuthFailure,
				ProviderErrorKind::NotFound | ProviderErrorKind::Unavailable =>
					ErrorKind::ProviderUnavailable,
			},
			Self::Reqwest(_) => ErrorKind::ProviderUnavailable,
			Self::SigningUnavailable(_) => ErrorKind::SigningUnavailable,
			Self::SecretStore(_) => ErrorKind::SecretStoreFailure,
			Self::ResourceStore(_) => ErrorKind::ResourceStoreFailure,
			Self::StatusWriteConflict { .. } => ErrorKind::StatusWriteConflict,
			Self::Cancelled | Self::DeadlineExceeded => ErrorKind::Interrupted,
			Self::Io(_)
			| Self::Config(_)
			| Self::Jsonwebtoken(_)
			| Self::Serde(_)
			| Self::Url(_)
			| Self::KeyMaterial(_)
			| Self::Metrics(_)
			| Self::Validation { .. } => ErrorKind::Internal,
		}
	}

	/// Whether the invoking framework should retry the reconciliation.
	pub fn is_retryable(&self) -> bool {
		self.kind().is_retryable()
	}

	/// Provider supplied `Retry-After` hint, if any.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::Provider { retry_after, .. } => *retry_after,
			_ => None,
		}
	}

	/// Provider error kind when the error originated from the registration API.
	pub fn provider_kind(&self) -> Option<ProviderErrorKind> {
		match self {
			Self::Provider { kind, .. } => Some(*kind),
			_ => None,
		}
	}
}
impl From<figment::Error> for Error {
	fn from(value: figment::Error) -> Self {
		Self::Config(Box::new(value))
	}
}
impl<T> From<metrics::SetRecorderError<T>> for Error
where
	T: Display,
{
	fn from(value: metrics::SetRecorderError<T>) -> Self {
		Self::Metrics(value.to_string())
	}
}

/// Failure classes reported by the registration API client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderErrorKind {
	/// The referenced registration does not exist.
	NotFound,
	/// Duplicate registration.
	Conflict,
	/// The caller must back off before retrying.
	RateLimited,
	/// Payload rejected; retrying without a spec change will not help.
	InvalidRequest,
	/// Transient provider or transport failure.
	Unavailable,
	/// The client assertion or access token was rejected.
	AuthFailure,
}
impl ProviderErrorKind {
	/// Map a non-success HTTP status onto the taxonomy.
	pub fn from_status(status: StatusCode) -> Self {
		match status {
			StatusCode::NOT_FOUND | StatusCode::GONE => Self::NotFound,
			StatusCode::CONFLICT => Self::Conflict,
			StatusCode::TOO_MANY_REQUESTS => Self::RateLimited,
			StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Self::InvalidRequest,
			StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::AuthFailure,
			_ => Self::Unavailable,
		}
	}
}
impl Display for ProviderErrorKind {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		let name = match self {
			Self::NotFound => "NotFound",
			Self::Conflict => "Conflict",
			Self::RateLimited => "RateLimited",
			Self::InvalidRequest => "InvalidRequest",
			Self::Unavailable => "Unavailable",
			Self::AuthFailure => "AuthFailure",
		};

		f.write_str(name)
	}
}

/// Error classification persisted in resource status and used for retry decisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorKind {
	/// Desired state cannot be satisfied until the spec changes.
	InvalidSpec,
	/// Registration API unreachable or failing transiently.
	ProviderUnavailable,
	/// Registration API asked the controller to slow down.
	ProviderRateLimited,
	/// Registration API rejected the controller's credentials.
	ProviderAuthFailure,
	/// Registration API reported a duplicate registration.
	ProviderConflict,
	/// Remote signing capability unavailable.
	SigningUnavailable,
	/// Secret store rejected a read or write.
	SecretStoreFailure,
	/// Resource store rejected a read or write.
	ResourceStoreFailure,
	/// Optimistic-concurrency collision on the status sub-document.
	StatusWriteConflict,
	/// Invocation cancelled or past its deadline.
	Interrupted,
	/// Local failure not attributable to a collaborator.
	Internal,
}
impl ErrorKind {
	/// Every kind, in declaration order.
	pub const ALL: [Self; 11] = [
		Self::InvalidSpec,
		Self::ProviderUnavailable,
		Self::ProviderRateLimited,
		Self::ProviderAuthFailure,
		Self::ProviderConflict,
		Self::SigningUnavailable,
		Self::SecretStoreFailure,
		Self::ResourceStoreFailure,
		Self::StatusWriteConflict,
		Self::Interrupted,
		Self::Internal,
	];

	/// Only an invalid spec is terminal.
	pub fn is_retryable(self) -> bool {
		!matches!(self, Self::InvalidSpec)
	}

	/// Stable identifier used in conditions and metric labels.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::InvalidSpec => "InvalidSpec",
			Self::ProviderUnavailable => "ProviderUnavailable",
			Self::ProviderRateLimited => "ProviderRateLimited",
			Self::ProviderAuthFailure => "ProviderAuthFailure",
			Self::ProviderConflict => "ProviderConflict",
			Self::SigningUnavailable => "SigningUnavailable",
			Self::SecretStoreFailure => "SecretStoreFailure",
			Self::ResourceStoreFailure => "ResourceStoreFailure",
			Self::StatusWriteConflict => "StatusWriteConflict",
			Self::Interrupted => "Interrupted",
			Self::Internal => "Internal",
		}
	}
}
impl Display for ErrorKind {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.write_str(self.as_str())
	}
}
