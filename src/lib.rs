//! Cluster controller core that reconciles ID-porten and Maskinporten client registrations
//! against the DigDir registration API and materializes their credentials as secrets.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod config;
pub mod jwk;
pub mod metrics;
pub mod provider;
pub mod reconcile;
pub mod resource;
pub mod scope;
pub mod secret;
pub mod signer;
pub mod store;

mod error;
mod _prelude {
	pub use std::{collections::BTreeMap, sync::Arc, time::Duration};

	pub use chrono::{DateTime, Utc};

	pub use crate::{Error, Result};
}

pub use crate::{
	config::Config,
	error::{Error, ErrorKind, ProviderErrorKind, Result},
	reconcile::{
		Change, IdPortenReconciler, IdPortenStrategy, MaskinportenReconciler,
		MaskinportenStrategy, Outcome, ReconcileContext, Reconciler, RegistrationStrategy,
	},
	resource::{ClientKind, ClientResource, ClientSpec, ObservedStatus, ResourceKey, SyncState},
	scope::{FilteredScopes, filter_scopes},
};
