#![cfg(feature = "reqwest")]

mod common;

// crates.io
use httpmock::prelude::*;
// self
use common::*;
use sts_broker::{
	error::Error,
	url::Url,
	verify::{ReqwestKeyFetcher, TokenVerifier, TrustConfig},
};

fn audiences() -> Vec<String> {
	vec![AUDIENCE.into()]
}

fn verifier_for(server: &MockServer) -> TokenVerifier<ReqwestKeyFetcher> {
	let discovery = Url::parse(&server.url("/.well-known/jwks"))
		.expect("Mock discovery URL should parse.");
	let trust = TrustConfig::new(discovery, ISSUER, [AUDIENCE]);

	TokenVerifier::new(trust, ReqwestKeyFetcher::default())
}

#[tokio::test]
async fn keys_are_fetched_over_http_and_cached_across_verifications() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/.well-known/jwks");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(jwks_json("test-key"));
		})
		.await;
	let verifier = verifier_for(&server);
	let token = sign(&claims("acme/infra", "refs/heads/main"), "test-key");

	verifier
		.verify(&token, &audiences())
		.await
		.expect("Verification should succeed against the mocked JWKS endpoint.");
	verifier
		.verify(&token, &audiences())
		.await
		.expect("A second verification should reuse the cached keys.");
	mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn unknown_kid_forces_one_refetch() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/.well-known/jwks");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(jwks_json("test-key"));
		})
		.await;
	let verifier = verifier_for(&server);

	// Warm the cache, then present a token under a kid the issuer never published.
	verifier
		.verify(&sign(&claims("acme/infra", "refs/heads/main"), "test-key"), &audiences())
		.await
		.expect("Warm-up verification should succeed.");

	let err = verifier
		.verify(&sign(&claims("acme/infra", "refs/heads/main"), "rotated-key"), &audiences())
		.await
		.expect_err("A never-published kid must be rejected.");

	assert!(matches!(err, Error::AuthenticationFailed { stage: "unknown_key" }));
	mock.assert_hits_async(2).await;
}

#[tokio::test]
async fn unreachable_discovery_endpoints_fail_the_key_fetch_stage() {
	let server = MockServer::start_async().await;
	let _mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/.well-known/jwks");
			then.status(500);
		})
		.await;
	let verifier = verifier_for(&server);
	let err = verifier
		.verify(&sign(&claims("acme/infra", "refs/heads/main"), "test-key"), &audiences())
		.await
		.expect_err("A failing discovery endpoint must reject verification.");

	assert!(matches!(err, Error::AuthenticationFailed { stage: "key_fetch" }));
}
