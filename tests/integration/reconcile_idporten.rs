//! Interactive login clients end to end.

// crates.io
use digdirator::{
	Change, ClientKind, ClientSpec, ErrorKind, Outcome, ResourceKey, SyncState,
	resource::{ConditionType, IdPortenSpec},
	store::EventType,
};
use serde_json::json;
use url::Url;
// self
use crate::common::{self, Harness};

const NAMESPACE: &str = "web";
const SECRET: &str = "frontend-idporten";

fn url(raw: &str) -> Url {
	raw.parse().expect("url")
}

fn spec() -> IdPortenSpec {
	IdPortenSpec {
		client_uri: Some(url("https://frontend.example.com")),
		redirect_uris: vec![url("https://frontend.example.com/oauth2/callback")],
		post_logout_redirect_uris: vec![url("https://frontend.example.com/logged-out")],
		frontchannel_logout_uri: Some(url("https://frontend.example.com/oauth2/logout")),
		..Default::default()
	}
}

async fn apply(harness: &Harness, spec: IdPortenSpec) -> ResourceKey {
	let key = ResourceKey::new(NAMESPACE, "frontend");

	harness.store.apply(key.clone(), "uid-frontend", ClientSpec::IdPorten(spec)).await;

	key
}

#[tokio::test]
async fn login_client_is_registered_with_defaults() {
	let harness = Harness::start().await;
	let reconciler = harness.idporten();
	let key = apply(&harness, spec()).await;

	assert_eq!(
		reconciler.reconcile(&common::ctx(), &key).await,
		Outcome::Applied(Change::Created)
	);

	let remote = harness.registry.client("reg-123").expect("registered");

	assert_eq!(remote["integration_type"], "idporten");
	assert_eq!(remote["client_name"], "prod-gcp:web:frontend");
	assert_eq!(remote["grant_types"], json!(["authorization_code", "refresh_token"]));
	assert_eq!(remote["scopes"], json!(["openid", "profile"]));
	assert_eq!(remote["redirect_uris"], json!(["https://frontend.example.com/oauth2/callback"]));
	assert_eq!(remote["token_endpoint_auth_method"], "private_key_jwt");
	assert_eq!(remote["access_token_lifetime"], 3600);
	assert_eq!(remote["authorization_lifetime"], 7200);
	assert_eq!(remote["refresh_token_lifetime"], 7200);
	assert_eq!(remote["refresh_token_usage"], "ONETIME");

	let secret = harness.secret(NAMESPACE, SECRET).await.expect("secret written");

	assert_eq!(secret.data["IDPORTEN_CLIENT_ID"], "reg-123");
	assert_eq!(secret.data["IDPORTEN_REDIRECT_URI"], "https://frontend.example.com/oauth2/callback");
	assert!(secret.data.contains_key("IDPORTEN_CLIENT_JWK"));
	assert!(secret.data.contains_key("IDPORTEN_WELL_KNOWN_URL"));
	assert!(!secret.data.keys().any(|key| key.starts_with("MASKINPORTEN_")));

	// No consumed scopes, so access records are never consulted.
	let requests = harness.server.received_requests().await.expect("recording");

	assert!(!requests.iter().any(|request| request.url.path().contains("/scopes/")));
}

#[tokio::test]
async fn plain_http_redirects_are_rejected_before_any_call() {
	let harness = Harness::start().await;
	let reconciler = harness.idporten();
	let key = apply(&harness, IdPortenSpec {
		redirect_uris: vec![url("http://frontend.example.com/oauth2/callback")],
		..spec()
	})
	.await;
	let outcome = reconciler.reconcile(&common::ctx(), &key).await;

	assert!(matches!(outcome, Outcome::Terminal { kind: ErrorKind::InvalidSpec, .. }));
	assert_eq!(harness.registry.mutation_count(), 0);
	assert!(harness.secret(NAMESPACE, SECRET).await.is_none());

	let status = harness.resource(ClientKind::IdPorten, &key).await.status;
	let ready = status.condition(ConditionType::Ready).expect("ready condition");

	assert_eq!(status.state, SyncState::Degraded);
	assert!(!ready.status);
	assert_eq!(ready.reason, "InvalidSpec");
	assert!(ready.message.contains("redirectUris"));
}

#[tokio::test]
async fn lifetimes_above_the_provider_limit_are_rejected() {
	let harness = Harness::start().await;
	let reconciler = harness.idporten();
	let key = apply(&harness, IdPortenSpec { session_lifetime: Some(86_400), ..spec() }).await;

	assert_eq!(
		reconciler.reconcile(&common::ctx(), &key).await.error_kind(),
		Some(ErrorKind::InvalidSpec)
	);
	assert!(harness.registry.client_ids().is_empty());
}

#[tokio::test]
async fn spec_change_updates_in_place_and_rotates_keys() {
	let harness = Harness::start().await;
	let reconciler = harness.idporten();
	let key = apply(&harness, spec()).await;

	reconciler.reconcile(&common::ctx(), &key).await;
	apply(&harness, IdPortenSpec { access_token_lifetime: Some(1800), ..spec() }).await;

	assert_eq!(
		reconciler.reconcile(&common::ctx(), &key).await,
		Outcome::Applied(Change::Updated)
	);
	assert_eq!(harness.registry.client_ids(), ["reg-123"]);
	assert_eq!(harness.registry.client("reg-123").expect("client")["access_token_lifetime"], 1800);

	let status = harness.resource(ClientKind::IdPorten, &key).await.status;

	assert_eq!(status.key_ids, ["kid-2", "kid-1"]);
	assert_eq!(status.observed_generation, 2);

	let keys = harness.registry.jwks("reg-123").expect("keys");

	assert_eq!(keys["keys"][0]["kid"], "kid-2");
	assert_eq!(keys["keys"][1]["kid"], "kid-1");

	let secret = harness.secret(NAMESPACE, SECRET).await.expect("secret");
	let jwk: digdirator::jwk::ClientJwk =
		serde_json::from_str(&secret.data["IDPORTEN_CLIENT_JWK"]).expect("client jwk");

	assert_eq!(jwk.kid, "kid-2");

	let reasons: Vec<_> = harness
		.store
		.events(ClientKind::IdPorten, &key)
		.await
		.into_iter()
		.map(|event| event.reason)
		.collect();

	assert_eq!(reasons, ["Created", "Updated"]);
}

#[tokio::test]
async fn remote_drift_is_repaired_when_reconciliation_runs() {
	let harness = Harness::start().await;
	let reconciler = harness.idporten();
	let key = apply(&harness, spec()).await;

	reconciler.reconcile(&common::ctx(), &key).await;
	harness.registry.tamper("reg-123", "redirect_uris", json!(["https://elsewhere.example.com/cb"]));
	// A restored status forces a full pass instead of the no-op short cut.
	harness.store.wipe_status(ClientKind::IdPorten, &key).await;

	assert_eq!(
		reconciler.reconcile(&common::ctx(), &key).await,
		Outcome::Applied(Change::Updated)
	);
	assert_eq!(
		harness.registry.client("reg-123").expect("client")["redirect_uris"],
		json!(["https://frontend.example.com/oauth2/callback"])
	);

	let events = harness.store.events(ClientKind::IdPorten, &key).await;

	assert!(events.iter().all(|event| event.event_type == EventType::Normal));
}
