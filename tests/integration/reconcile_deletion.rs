//! Deregistration on deletion requests.

// std
use std::time::Duration;
// crates.io
use digdirator::{
	Change, ClientKind, ClientSpec, ErrorKind, Outcome, ResourceKey, SyncState,
	resource::MaskinportenSpec,
};
// self
use crate::common::{self, Harness};

const SECRET: &str = "billing-maskinporten";

async fn registered(harness: &Harness) -> ResourceKey {
	let key = ResourceKey::new("team", "billing");

	harness
		.store
		.apply(key.clone(), "uid-billing", ClientSpec::Maskinporten(MaskinportenSpec::default()))
		.await;

	key
}

#[tokio::test]
async fn deletion_removes_registration_secret_and_resource() {
	let harness = Harness::start().await;
	let reconciler = harness.maskinporten();
	let key = registered(&harness).await;

	reconciler.reconcile(&common::ctx(), &key).await;
	harness.store.request_deletion(ClientKind::Maskinporten, &key).await;

	assert_eq!(
		reconciler.reconcile(&common::ctx(), &key).await,
		Outcome::Applied(Change::Deleted)
	);
	assert!(harness.registry.client_ids().is_empty());
	assert!(harness.secret("team", SECRET).await.is_none());
	assert!(harness.find(ClientKind::Maskinporten, &key).await.is_none());

	let events = harness.store.events(ClientKind::Maskinporten, &key).await;

	assert_eq!(events.last().map(|event| event.reason.as_str()), Some("Deleted"));

	// Later invocations for the finalized key are no-ops.
	assert_eq!(
		reconciler.reconcile(&common::ctx(), &key).await,
		Outcome::Applied(Change::Absent)
	);
}

#[tokio::test]
async fn failed_provider_delete_keeps_credentials_until_retry_succeeds() {
	let harness = Harness::start().await;
	let reconciler = harness.maskinporten();
	let key = registered(&harness).await;

	reconciler.reconcile(&common::ctx(), &key).await;
	harness.store.request_deletion(ClientKind::Maskinporten, &key).await;
	harness.registry.fail("DELETE", 503);

	assert_eq!(
		reconciler.reconcile(&common::ctx(), &key).await,
		Outcome::Retry { kind: ErrorKind::ProviderUnavailable, backoff: Duration::from_secs(2) }
	);
	assert_eq!(harness.registry.client_ids(), ["reg-123"]);
	assert!(harness.secret("team", SECRET).await.is_some());

	let resource = harness.resource(ClientKind::Maskinporten, &key).await;

	assert!(resource.deletion_requested);
	assert_eq!(resource.status.client_id.as_deref(), Some("reg-123"));
	assert_eq!(resource.status.state, SyncState::Degraded);
	assert_eq!(resource.status.error_kind, Some(ErrorKind::ProviderUnavailable));

	harness.registry.clear_failures();

	assert_eq!(
		reconciler.reconcile(&common::ctx(), &key).await,
		Outcome::Applied(Change::Deleted)
	);
	assert!(harness.registry.client_ids().is_empty());
	assert!(harness.secret("team", SECRET).await.is_none());
}

#[tokio::test]
async fn registration_already_gone_is_absent() {
	let harness = Harness::start().await;
	let reconciler = harness.maskinporten();
	let key = registered(&harness).await;

	reconciler.reconcile(&common::ctx(), &key).await;
	harness.registry.forget("reg-123");
	harness.store.request_deletion(ClientKind::Maskinporten, &key).await;

	assert_eq!(
		reconciler.reconcile(&common::ctx(), &key).await,
		Outcome::Applied(Change::Absent)
	);
	assert!(harness.secret("team", SECRET).await.is_none());
	assert!(harness.find(ClientKind::Maskinporten, &key).await.is_none());
}

#[tokio::test]
async fn never_registered_resource_finalizes_without_provider_calls() {
	let harness = Harness::start().await;
	let reconciler = harness.maskinporten();
	let key = registered(&harness).await;

	harness.store.request_deletion(ClientKind::Maskinporten, &key).await;

	assert_eq!(
		reconciler.reconcile(&common::ctx(), &key).await,
		Outcome::Applied(Change::Absent)
	);
	assert_eq!(harness.registry.mutation_count(), 0);
	assert_eq!(harness.server.received_requests().await.expect("recording").len(), 1);
}
