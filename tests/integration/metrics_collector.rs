// std
use std::{sync::Arc, time::Duration};
// crates.io
use digdirator::{
	ClientKind, ClientSpec, ResourceKey, SyncState,
	metrics::MetricsCollector,
	resource::{IdPortenSpec, MaskinportenSpec},
};
// self
use crate::common::{self, Harness};

#[tokio::test]
async fn counts_follow_reconciled_state() {
	let harness = Harness::start().await;
	let maskinporten = harness.maskinporten();
	let billing = ResourceKey::new("team", "billing");
	let broken = ResourceKey::new("team", "frontend");

	harness
		.store
		.apply(billing.clone(), "uid-billing", ClientSpec::Maskinporten(MaskinportenSpec::default()))
		.await;
	// No redirect URIs, so it can never register.
	harness.store.apply(broken.clone(), "uid-frontend", ClientSpec::IdPorten(IdPortenSpec::default())).await;

	maskinporten.reconcile(&common::ctx(), &billing).await;
	harness.idporten().reconcile(&common::ctx(), &broken).await;

	let collector = MetricsCollector::new(Arc::new(harness.store.clone()), Duration::from_secs(60));
	let counts = collector.collect_once().await.expect("counts");

	assert_eq!(counts.get(ClientKind::Maskinporten, SyncState::Registered), 1);
	assert_eq!(counts.get(ClientKind::IdPorten, SyncState::Degraded), 1);
	assert_eq!(counts.total(), 2);
}
