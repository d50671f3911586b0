//! Convergence of desired client resources with the provider and the secret store.

pub mod backoff;
pub mod context;
pub mod engine;
pub mod idporten;
pub mod maskinporten;
pub mod outcome;
pub mod strategy;

pub use backoff::{BackoffPolicy, JitterStrategy};
pub use context::ReconcileContext;
pub use engine::{Reconciler, ReconcilerBuilder};
pub use idporten::IdPortenStrategy;
pub use maskinporten::MaskinportenStrategy;
pub use outcome::{Change, Outcome};
pub use strategy::RegistrationStrategy;

/// Reconciler for interactive login clients.
pub type IdPortenReconciler = Reconciler<IdPortenStrategy>;
/// Reconciler for machine-to-machine clients.
pub type MaskinportenReconciler = Reconciler<MaskinportenStrategy>;
