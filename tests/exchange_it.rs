mod common;

// crates.io
use serde_json::json;
use time::{Duration, OffsetDateTime};
// self
use common::*;
use sts_broker::{
	audit::{AuditAction, AuditOutcome},
	error::Error,
	lease::LeaseState,
};

#[tokio::test]
async fn matching_token_yields_a_credential_and_an_active_lease() {
	let (broker, source, audit) = build_broker();
	let token = sign(&claims("acme/infra", "refs/heads/main"), "test-key");
	let session = broker
		.exchange(&token, &role("storage-writer"), None)
		.await
		.expect("A matching token should exchange successfully.");

	assert_eq!(session.principal.as_ref(), "repo:acme/infra:ref:refs/heads/main");
	assert_eq!(session.binding.as_ref(), "github-actions");
	assert!(session.credential.session_token.is_some());
	assert_eq!(source.issued().len(), 1);

	let lease = broker
		.leases()
		.lease(&session.lease)
		.expect("The issued lease should be tracked by the manager.");

	assert_eq!(lease.state, LeaseState::Active);
	assert_eq!(lease.expires_at - lease.issued_at, Duration::seconds(900));

	let actions: Vec<_> = audit.events().into_iter().map(|event| event.action).collect();

	assert!(actions.contains(&AuditAction::Verify));
	assert!(actions.contains(&AuditAction::Match));
	assert!(actions.contains(&AuditAction::Issue));
	assert!(actions.contains(&AuditAction::Exchange));
}

#[tokio::test]
async fn expired_tokens_fail_authentication_and_create_no_lease() {
	let (broker, source, audit) = build_broker();
	let now = OffsetDateTime::now_utc().unix_timestamp();
	let mut payload = claims("acme/infra", "refs/heads/main");

	payload["iat"] = json!(now - 7_200);
	payload["exp"] = json!(now - 3_600);

	let err = broker
		.exchange(&sign(&payload, "test-key"), &role("storage-writer"), None)
		.await
		.expect_err("An expired token must be rejected.");

	assert!(matches!(err, Error::AuthenticationFailed { stage: "expired" }));
	assert_eq!(broker.leases().lease_count(), 0, "No lease may exist after a rejected exchange.");
	assert!(source.issued().is_empty());
	assert!(
		audit
			.events_for(AuditAction::Verify)
			.iter()
			.any(|event| event.outcome == AuditOutcome::Failure)
	);
}

#[tokio::test]
async fn wrong_audience_fails_authentication() {
	let (broker, _, _) = build_broker();
	let mut payload = claims("acme/infra", "refs/heads/main");

	payload["aud"] = json!(["https://somewhere-else.example.com"]);

	let err = broker
		.exchange(&sign(&payload, "test-key"), &role("storage-writer"), None)
		.await
		.expect_err("A mis-audienced token must be rejected.");

	assert!(matches!(err, Error::AuthenticationFailed { stage: "audience" }));
	assert_eq!(broker.leases().lease_count(), 0);
}

#[tokio::test]
async fn unmatched_claims_yield_no_matching_policy() {
	let (broker, _, audit) = build_broker();
	let token = sign(&claims("acme/infra", "refs/heads/dev"), "test-key");
	let err = broker
		.exchange(&token, &role("storage-writer"), None)
		.await
		.expect_err("A dev-branch token must not match the main-only binding.");

	assert!(matches!(err, Error::NoMatchingPolicy));
	assert_eq!(broker.leases().lease_count(), 0);
	assert!(
		audit
			.events_for(AuditAction::Match)
			.iter()
			.any(|event| event.outcome == AuditOutcome::Failure)
	);
}

#[tokio::test]
async fn unauthorized_roles_are_forbidden_even_when_claims_match() {
	let (broker, source, _) = build_broker();
	let token = sign(&claims("acme/infra", "refs/heads/main"), "test-key");
	let err = broker
		.exchange(&token, &role("network-admin"), None)
		.await
		.expect_err("A role outside the policy grant must be forbidden.");

	assert!(matches!(err, Error::Forbidden { .. }));
	assert_eq!(broker.leases().lease_count(), 0);
	assert!(source.issued().is_empty());
}

#[tokio::test]
async fn requested_ttl_is_honored_and_zero_falls_back_to_default() {
	let (broker, _, _) = build_broker();
	let token = sign(&claims("acme/infra", "refs/heads/main"), "test-key");
	let session = broker
		.exchange(&token, &role("storage-writer"), Some(Duration::seconds(3_600)))
		.await
		.expect("An in-range requested ttl should be honored.");
	let lease = broker.leases().lease(&session.lease).expect("Lease should be tracked.");

	assert_eq!(lease.expires_at - lease.issued_at, Duration::seconds(3_600));

	let token = sign(&claims("acme/infra", "refs/heads/main"), "test-key");
	let session = broker
		.exchange(&token, &role("storage-writer"), Some(Duration::ZERO))
		.await
		.expect("A zero requested ttl should fall back to the default.");
	let lease = broker.leases().lease(&session.lease).expect("Lease should be tracked.");

	assert_eq!(lease.expires_at - lease.issued_at, Duration::seconds(900));
}

#[tokio::test]
async fn source_outage_surfaces_as_unavailable_with_no_partial_state() {
	let (broker, source, _) = build_broker();

	source.fail_issue(true);

	let token = sign(&claims("acme/infra", "refs/heads/main"), "test-key");
	let err = broker
		.exchange(&token, &role("storage-writer"), None)
		.await
		.expect_err("Exchange must fail while the source is down.");

	assert!(matches!(err, Error::CredentialSourceUnavailable { .. }));
	assert_eq!(broker.leases().lease_count(), 0);
}

#[tokio::test]
async fn issued_leases_renew_and_revoke_through_the_broker() {
	let (broker, source, _) = build_broker();
	let token = sign(&claims("acme/infra", "refs/heads/main"), "test-key");
	let session = broker
		.exchange(&token, &role("storage-writer"), None)
		.await
		.expect("Exchange should succeed.");
	let expiry = broker
		.renew(&session.lease, Some(Duration::seconds(1_200)))
		.await
		.expect("Renewal should succeed for a renewable role.");
	let lease = broker.leases().lease(&session.lease).expect("Lease should be tracked.");

	assert_eq!(lease.state, LeaseState::Renewed);
	assert_eq!(lease.expires_at, expiry);
	assert!(expiry <= lease.max_expires_at());

	broker.revoke(&session.lease).await.expect("Revocation should succeed.");
	broker.revoke(&session.lease).await.expect("Revocation should stay idempotent.");

	let lease = broker.leases().lease(&session.lease).expect("Lease should be tracked.");

	assert_eq!(lease.state, LeaseState::Revoked);
	assert_eq!(source.revoked().len(), 1);
}
