//! Shared fixtures: a wiremock-backed registration API, fixture keys and wiring helpers.

// std
use std::{
	collections::BTreeMap,
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// crates.io
use async_trait::async_trait;
use digdirator::{
	ClientKind, ClientResource, Error, IdPortenReconciler, IdPortenStrategy,
	MaskinportenReconciler, MaskinportenStrategy, ReconcileContext, Reconciler,
	RegistrationStrategy, ResourceKey, Result,
	jwk::{ClientJwk, KeyMinter},
	provider::{ProviderClient, ProviderMetadata},
	reconcile::{BackoffPolicy, JitterStrategy, ReconcilerBuilder},
	secret::{MemorySecretStore, Secret, SecretMaterializer, SecretStore},
	signer::{AssertionSigner, CertificateChain, KeySigner, SignerConfig, SigningAlgorithm},
	store::{ClientStore, MemoryClientStore},
};
use rsa::{
	Pkcs1v15Sign, RsaPrivateKey,
	pkcs8::{DecodePrivateKey, EncodePublicKey, LineEnding},
};
use serde_json::{Value, json};
use sha2::Sha256;
use wiremock::{
	Mock, MockServer, Request, Respond, ResponseTemplate,
	matchers::{header, method, path, path_regex},
};

pub const CLUSTER: &str = "prod-gcp";
pub const ADMIN_CLIENT_ID: &str = "digdirator-admin";
pub const ADMIN_TOKEN: &str = "admin-token";
pub const KEY_PATH: &str = "projects/p/locations/l/keyRings/r/cryptoKeys/k/cryptoKeyVersions/1";

const CLIENT_KEY_PEM: &str = include_str!("../fixtures/client-key.pem");
const CERT_CHAIN_PEM: &str = include_str!("../fixtures/cert-chain.pem");

pub fn fixture_key() -> RsaPrivateKey {
	RsaPrivateKey::from_pkcs8_pem(CLIENT_KEY_PEM).expect("fixture key")
}

pub fn fixture_public_pem() -> String {
	fixture_key().to_public_key().to_public_key_pem(LineEnding::LF).expect("public pem")
}

pub fn fixture_chain() -> CertificateChain {
	CertificateChain::from_pem(CERT_CHAIN_PEM).expect("fixture chain")
}

pub fn ctx() -> ReconcileContext {
	ReconcileContext::detached(Duration::from_secs(10))
}

/// Signs digests locally with the fixture key, standing in for the remote key service.
#[derive(Debug)]
pub struct FixtureSigner {
	key: RsaPrivateKey,
	calls: AtomicUsize,
}
impl FixtureSigner {
	pub fn new() -> Self {
		Self { key: fixture_key(), calls: AtomicUsize::new(0) }
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
#[async_trait]
impl KeySigner for FixtureSigner {
	async fn sign(
		&self,
		key_path: &str,
		digest: &[u8],
		algorithm: SigningAlgorithm,
	) -> Result<Vec<u8>> {
		assert_eq!(key_path, KEY_PATH);
		assert_eq!(algorithm, SigningAlgorithm::Rs256);

		self.calls.fetch_add(1, Ordering::SeqCst);
		self.key
			.sign(Pkcs1v15Sign::new::<Sha256>(), digest)
			.map_err(|err| Error::SigningUnavailable(err.to_string()))
	}
}

/// Key service that is down.
#[derive(Debug)]
pub struct UnavailableSigner;
#[async_trait]
impl KeySigner for UnavailableSigner {
	async fn sign(&self, _: &str, _: &[u8], _: SigningAlgorithm) -> Result<Vec<u8>> {
		Err(Error::SigningUnavailable("key version is disabled".into()))
	}
}

/// Hands out the fixture key under a fresh `kid` every time.
#[derive(Debug, Default)]
pub struct FixtureMinter {
	minted: AtomicUsize,
}
impl KeyMinter for FixtureMinter {
	fn mint(&self) -> Result<ClientJwk> {
		let n = self.minted.fetch_add(1, Ordering::SeqCst) + 1;

		ClientJwk::from_private_key(format!("kid-{n}"), &fixture_key())
	}
}

#[derive(Debug, Default)]
struct RegistryState {
	clients: BTreeMap<String, Value>,
	jwks: BTreeMap<String, Value>,
	access: Vec<Value>,
	created: usize,
	mutations: Vec<(String, String)>,
	failures: BTreeMap<String, u16>,
}

/// In-memory registration API answering every `/api/v1/` route.
#[derive(Clone, Debug, Default)]
pub struct FakeRegistry {
	state: Arc<Mutex<RegistryState>>,
}
impl FakeRegistry {
	/// Approve `scopes` for the controller's organisation.
	pub fn approve(&self, scopes: &[&str]) {
		let mut state = self.state.lock().expect("registry");

		for scope in scopes {
			state.access.push(json!({ "scope": scope, "state": "APPROVED" }));
		}
	}

	/// Answer every `method` request with `status` until cleared.
	pub fn fail(&self, method: &str, status: u16) {
		self.state.lock().expect("registry").failures.insert(method.to_owned(), status);
	}

	pub fn clear_failures(&self) {
		self.state.lock().expect("registry").failures.clear();
	}

	/// Remove a registration behind the controller's back.
	pub fn forget(&self, client_id: &str) {
		self.state.lock().expect("registry").clients.remove(client_id);
	}

	/// Overwrite one field of a stored registration.
	pub fn tamper(&self, client_id: &str, field: &str, value: Value) {
		let mut state = self.state.lock().expect("registry");

		if let Some(client) = state.clients.get_mut(client_id) {
			client[field] = value;
		}
	}

	pub fn client(&self, client_id: &str) -> Option<Value> {
		self.state.lock().expect("registry").clients.get(client_id).cloned()
	}

	pub fn client_ids(&self) -> Vec<String> {
		self.state.lock().expect("registry").clients.keys().cloned().collect()
	}

	pub fn jwks(&self, client_id: &str) -> Option<Value> {
		self.state.lock().expect("registry").jwks.get(client_id).cloned()
	}

	/// Successful mutating calls as `(method, path)`.
	pub fn mutations(&self) -> Vec<(String, String)> {
		self.state.lock().expect("registry").mutations.clone()
	}

	pub fn mutation_count(&self) -> usize {
		self.state.lock().expect("registry").mutations.len()
	}
}
impl Respond for FakeRegistry {
	fn respond(&self, request: &Request) -> ResponseTemplate {
		let mut state = self.state.lock().expect("registry");
		let verb = request.method.as_str().to_owned();
		let route = request.url.path().to_owned();

		if let Some(status) = state.failures.get(&verb) {
			return ResponseTemplate::new(*status)
				.set_body_json(json!({ "error": "unavailable", "error_description": "try later" }));
		}

		let segments: Vec<&str> =
			route.trim_start_matches("/api/v1/").split('/').filter(|s| !s.is_empty()).collect();
		let body = || serde_json::from_slice::<Value>(&request.body).expect("json body");
		let not_found = || {
			ResponseTemplate::new(404)
				.set_body_json(json!({ "error": "not_found", "error_description": "unknown client" }))
		};
		let response = match (verb.as_str(), segments.as_slice()) {
			("POST", ["clients"]) => {
				let id = format!("reg-{}", 123 + state.created);
				let mut client = body();

				client["client_id"] = json!(id);
				state.created += 1;
				state.clients.insert(id, client.clone());

				ResponseTemplate::new(201).set_body_json(client)
			},
			("GET", ["clients", id]) => match state.clients.get(*id) {
				Some(client) => ResponseTemplate::new(200).set_body_json(client),
				None => return not_found(),
			},
			("PUT", ["clients", id]) => {
				if !state.clients.contains_key(*id) {
					return not_found();
				}

				let mut client = body();

				client["client_id"] = json!(id);
				state.clients.insert((*id).to_owned(), client.clone());

				ResponseTemplate::new(200).set_body_json(client)
			},
			("DELETE", ["clients", id]) => {
				if state.clients.remove(*id).is_none() {
					return not_found();
				}

				state.jwks.remove(*id);

				ResponseTemplate::new(204)
			},
			("POST", ["clients", id, "jwks"]) => {
				if !state.clients.contains_key(*id) {
					return not_found();
				}

				let jwks = body();

				state.jwks.insert((*id).to_owned(), jwks.clone());

				ResponseTemplate::new(201).set_body_json(jwks)
			},
			("GET", ["scopes", "access", "all"]) =>
				ResponseTemplate::new(200).set_body_json(Value::Array(state.access.clone())),
			_ => return not_found(),
		};

		if verb != "GET" {
			state.mutations.push((verb, route));
		}

		response
	}
}

/// Mock provider plus in-memory stores.
pub struct Harness {
	pub server: MockServer,
	pub registry: FakeRegistry,
	pub store: MemoryClientStore,
	pub secrets: Arc<MemorySecretStore>,
	pub metadata: ProviderMetadata,
	pub signer: Arc<FixtureSigner>,
	/// Shared by every reconciler so `kid`s stay unique across them.
	pub minter: Arc<FixtureMinter>,
}
impl Harness {
	pub async fn start() -> Self {
		let _ = tracing_subscriber::fmt::try_init();

		let server = MockServer::start().await;
		let registry = FakeRegistry::default();

		mount_discovery(&server).await;
		mount_token(&server).await;

		Mock::given(path_regex("^/api/v1/"))
			.and(header("authorization", format!("Bearer {ADMIN_TOKEN}").as_str()))
			.respond_with(registry.clone())
			.mount(&server)
			.await;

		let metadata = ProviderMetadata::discover(&reqwest::Client::new(), &well_known_url(&server))
			.await
			.expect("metadata");

		Self {
			server,
			registry,
			store: MemoryClientStore::new(),
			secrets: Arc::new(MemorySecretStore::new()),
			metadata,
			signer: Arc::new(FixtureSigner::new()),
			minter: Arc::new(FixtureMinter::default()),
		}
	}

	pub fn assertion_signer(&self, backend: Arc<dyn KeySigner>) -> AssertionSigner {
		AssertionSigner::new(signer_config(), backend).expect("assertion signer")
	}

	pub fn provider_with(&self, backend: Arc<dyn KeySigner>) -> ProviderClient {
		ProviderClient::new(
			reqwest::Client::new(),
			self.server.uri().parse().expect("base url"),
			self.assertion_signer(backend),
			&self.metadata,
		)
	}

	pub fn provider(&self) -> ProviderClient {
		self.provider_with(self.signer.clone())
	}

	pub fn maskinporten(&self) -> MaskinportenReconciler {
		self.maskinporten_with(self.provider())
	}

	pub fn maskinporten_with(&self, provider: ProviderClient) -> MaskinportenReconciler {
		self.builder(MaskinportenStrategy, provider).build().expect("reconciler")
	}

	pub fn idporten(&self) -> IdPortenReconciler {
		self.builder(IdPortenStrategy, self.provider()).build().expect("reconciler")
	}

	pub fn builder<S>(&self, strategy: S, provider: ProviderClient) -> ReconcilerBuilder<S>
	where
		S: RegistrationStrategy,
	{
		Reconciler::builder(
			strategy,
			provider,
			self.metadata.clone(),
			Arc::new(self.store.clone()),
			SecretMaterializer::new(self.secrets.clone()),
		)
		.cluster_name(CLUSTER)
		.minter(self.minter.clone())
		.backoff(BackoffPolicy {
			initial_backoff: Duration::from_secs(2),
			max_backoff: Duration::from_secs(30),
			jitter: JitterStrategy::None,
		})
	}

	pub async fn find(&self, kind: ClientKind, key: &ResourceKey) -> Option<ClientResource> {
		self.store.get(kind, key).await.expect("store")
	}

	pub async fn resource(&self, kind: ClientKind, key: &ResourceKey) -> ClientResource {
		self.find(kind, key).await.expect("resource exists")
	}

	pub async fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
		self.secrets.get(namespace, name).await.expect("secret store")
	}
}

pub fn signer_config() -> SignerConfig {
	SignerConfig {
		key_path: KEY_PATH.into(),
		certificate_chain: fixture_chain(),
		algorithm: SigningAlgorithm::Rs256,
		issuer: ADMIN_CLIENT_ID.into(),
		scopes: vec!["idporten:dcr.write".into(), "idporten:dcr.read".into()],
		assertion_ttl: Duration::from_secs(120),
	}
}

pub fn well_known_url(server: &MockServer) -> url::Url {
	format!("{}/.well-known/openid-configuration", server.uri()).parse().expect("well-known url")
}

async fn mount_discovery(server: &MockServer) {
	Mock::given(method("GET"))
		.and(path("/.well-known/openid-configuration"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"issuer": server.uri(),
			"token_endpoint": format!("{}/token", server.uri()),
			"jwks_uri": format!("{}/jwks", server.uri()),
			"authorization_endpoint": format!("{}/authorize", server.uri()),
		})))
		.mount(server)
		.await;
}

async fn mount_token(server: &MockServer) {
	Mock::given(method("POST"))
		.and(path("/token"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"access_token": ADMIN_TOKEN,
			"token_type": "Bearer",
			"expires_in": 120,
		})))
		.mount(server)
		.await;
}
