//! Registration API client against a mock provider.

// std
use std::{sync::Arc, time::Duration};
// crates.io
use digdirator::{
	ErrorKind, ProviderErrorKind, Result,
	jwk::{ClientJwks, KeyMinter},
	provider::{
		ClientRegistration, DeleteOutcome, IntegrationType, ProviderClient, ProviderMetadata,
	},
};
use serde_json::json;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{body_string_contains, method, path},
};
// self
use crate::common::{self, FixtureMinter, Harness};

fn registration(scopes: &[&str]) -> ClientRegistration {
	ClientRegistration {
		client_name: "billing".into(),
		description: "prod-gcp:team:billing".into(),
		integration_type: IntegrationType::Maskinporten,
		application_type: "web".into(),
		client_uri: None,
		redirect_uris: Vec::new(),
		post_logout_redirect_uris: Vec::new(),
		frontchannel_logout_uri: None,
		grant_types: vec!["urn:ietf:params:oauth:grant-type:jwt-bearer".into()],
		scopes: scopes.iter().map(|s| s.to_string()).collect(),
		token_endpoint_auth_method: "private_key_jwt".into(),
		access_token_lifetime: None,
		authorization_lifetime: None,
		refresh_token_lifetime: None,
		refresh_token_usage: None,
	}
}

fn metadata(server: &MockServer) -> ProviderMetadata {
	ProviderMetadata {
		well_known_url: common::well_known_url(server),
		issuer: server.uri(),
		token_endpoint: format!("{}/token", server.uri()).parse().expect("token endpoint"),
		jwks_uri: format!("{}/jwks", server.uri()).parse().expect("jwks uri"),
		authorization_endpoint: None,
		end_session_endpoint: None,
	}
}

fn client_for(server: &MockServer) -> ProviderClient {
	ProviderClient::new(
		reqwest::Client::new(),
		server.uri().parse().expect("base url"),
		digdirator::signer::AssertionSigner::new(
			common::signer_config(),
			Arc::new(common::FixtureSigner::new()),
		)
		.expect("signer"),
		&metadata(server),
	)
}

#[tokio::test]
async fn crud_round_trip_with_fresh_assertion_per_call() -> Result<()> {
	let harness = Harness::start().await;
	let client = harness.provider();
	let created = client.create(&registration(&["scope:read"])).await?;

	assert_eq!(created.client_id, "reg-123");
	assert_eq!(created.registration.scopes, ["scope:read"]);

	let fetched = client.get("reg-123").await?.expect("registered");

	assert!(!fetched.registration.differs_from(&created.registration));

	client.update("reg-123", &registration(&["scope:read", "scope:write"])).await?;

	let fetched = client.get("reg-123").await?.expect("registered");

	assert_eq!(fetched.registration.scopes, ["scope:read", "scope:write"]);

	let jwk = FixtureMinter::default().mint()?;

	client.register_keys("reg-123", &ClientJwks::rotation(&jwk, None)).await?;

	let registered = harness.registry.jwks("reg-123").expect("jwks stored");

	assert_eq!(registered["keys"][0]["kid"], "kid-1");
	assert!(registered["keys"][0].get("d").is_none());
	assert_eq!(client.delete("reg-123").await?, DeleteOutcome::Deleted);
	assert_eq!(client.delete("reg-123").await?, DeleteOutcome::NotFound);
	assert!(client.get("reg-123").await?.is_none());
	// One assertion per call: create, get, update, get, register_keys, delete, delete, get.
	assert_eq!(harness.signer.calls(), 8);

	Ok(())
}

#[tokio::test]
async fn token_exchange_uses_the_jwt_bearer_grant() -> Result<()> {
	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/token"))
		.and(body_string_contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer"))
		.and(body_string_contains("assertion=ey"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "t" })))
		.expect(1)
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/api/v1/scopes/access/all"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!([
			{ "scope": "scope:read", "state": "APPROVED", "consumer_orgno": "889640782" },
		])))
		.expect(1)
		.mount(&server)
		.await;

	let records = client_for(&server).accessible_scopes().await?;

	assert_eq!(records.len(), 1);
	assert_eq!(records[0].consumer_orgno.as_deref(), Some("889640782"));

	server.verify().await;

	Ok(())
}

#[tokio::test]
async fn rejected_token_requests_are_auth_failures() -> Result<()> {
	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/token"))
		.respond_with(
			ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })),
		)
		.mount(&server)
		.await;

	let err = client_for(&server).get("reg-1").await.expect_err("token refused");

	assert_eq!(err.provider_kind(), Some(ProviderErrorKind::AuthFailure));
	assert_eq!(err.kind(), ErrorKind::ProviderAuthFailure);
	assert!(err.is_retryable());

	Ok(())
}

#[tokio::test]
async fn provider_errors_map_onto_the_taxonomy() -> Result<()> {
	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/token"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "t" })))
		.mount(&server)
		.await;
	Mock::given(method("POST"))
		.and(path("/api/v1/clients"))
		.respond_with(
			ResponseTemplate::new(429)
				.insert_header("retry-after", "17")
				.set_body_json(json!({ "error": "rate_limited" })),
		)
		.mount(&server)
		.await;
	Mock::given(method("PUT"))
		.and(path("/api/v1/clients/reg-1"))
		.respond_with(ResponseTemplate::new(400).set_body_json(json!({
			"error": "invalid_client_metadata",
			"error_description": "redirect_uris must be https",
		})))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/api/v1/clients/reg-1"))
		.respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
		.mount(&server)
		.await;

	let client = client_for(&server);
	let limited = client.create(&registration(&[])).await.expect_err("429");

	assert_eq!(limited.kind(), ErrorKind::ProviderRateLimited);
	assert_eq!(limited.retry_after(), Some(Duration::from_secs(17)));

	let rejected = client.update("reg-1", &registration(&[])).await.expect_err("400");

	assert_eq!(rejected.provider_kind(), Some(ProviderErrorKind::InvalidRequest));
	assert_eq!(rejected.kind(), ErrorKind::InvalidSpec);
	assert!(!rejected.is_retryable());
	assert!(rejected.to_string().contains("redirect_uris must be https"));

	let unavailable = client.get("reg-1").await.expect_err("503");

	assert_eq!(unavailable.kind(), ErrorKind::ProviderUnavailable);
	assert!(unavailable.to_string().contains("maintenance"));

	Ok(())
}
