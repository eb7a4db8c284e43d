//! End-to-end exchange orchestration: verify, match, authorize, issue, deliver.

// self
use crate::{
	_prelude::*,
	audit::{AuditAction, AuditEvent, AuditOutcome, AuditSink},
	auth::{BindingName, ClaimValue, Credential, PrincipalId, RoleName},
	lease::{CredentialSource, LeaseHandle, LeaseManager},
	obs::{self, StageKind, StageOutcome, StageSpan},
	policy::{Capability, PolicyDecision, PolicySnapshot, PolicyStore, RoleBinding, match_claims},
	verify::{KeyFetcher, TokenVerifier, TrustConfig},
};
#[cfg(feature = "reqwest")] use crate::verify::ReqwestKeyFetcher;

#[cfg(feature = "reqwest")]
/// Broker specialized for the crate's default reqwest key transport.
pub type ReqwestBroker = Broker<ReqwestKeyFetcher>;

/// Result of a completed exchange.
///
/// Ephemeral: holds the verified principal, the binding that matched, and the
/// issued credential plus its lease handle. Callers keep the handle to renew
/// or revoke explicitly; dropping the session does not end the lease.
#[derive(Clone, Debug)]
pub struct BrokerSession {
	/// Principal resolved from the binding's user claim.
	pub principal: PrincipalId,
	/// Binding that matched the token's claims.
	pub binding: BindingName,
	/// Issued credential.
	pub credential: Credential,
	/// Handle for later renew/revoke calls.
	pub lease: LeaseHandle,
	/// Expiry of the issued lease at delivery time.
	pub lease_expires_at: OffsetDateTime,
}

/// Coordinates one token-for-credential exchange end to end.
///
/// The broker owns the verifier, policy store, lease manager, and audit sink so
/// the exchange sequence stays in one place: verify the token, match claims to
/// a binding, resolve the principal, authorize the requested role against the
/// attached policies, and issue the lease. On any step failure no lease exists
/// and the error names only the failing stage.
pub struct Broker<F>
where
	F: ?Sized + KeyFetcher,
{
	verifier: TokenVerifier<F>,
	policies: Arc<PolicyStore>,
	leases: Arc<LeaseManager>,
	audit: Arc<dyn AuditSink>,
}
impl<F> Broker<F>
where
	F: ?Sized + KeyFetcher,
{
	/// Creates a broker that reuses the caller-provided key transport.
	pub fn with_key_fetcher(
		trust: TrustConfig,
		fetcher: impl Into<Arc<F>>,
		policies: Arc<PolicyStore>,
		source: Arc<dyn CredentialSource>,
		audit: Arc<dyn AuditSink>,
	) -> Self {
		let leases = Arc::new(LeaseManager::new(source, policies.clone(), audit.clone()));

		Self { verifier: TokenVerifier::new(trust, fetcher), policies, leases, audit }
	}

	/// Verifier this broker authenticates tokens with.
	pub fn verifier(&self) -> &TokenVerifier<F> {
		&self.verifier
	}

	/// Policy store backing match and authorization decisions.
	pub fn policies(&self) -> &Arc<PolicyStore> {
		&self.policies
	}

	/// Lease manager owning every lease this broker issues.
	pub fn leases(&self) -> &Arc<LeaseManager> {
		&self.leases
	}

	/// Exchanges a verified identity token for a credential and lease.
	pub async fn exchange(
		&self,
		token: &str,
		requested_role: &RoleName,
		requested_ttl: Option<Duration>,
	) -> Result<BrokerSession> {
		const KIND: StageKind = StageKind::Exchange;

		let span = StageSpan::new(KIND, "exchange");

		obs::record_stage_outcome(KIND, StageOutcome::Attempt);

		let result = span
			.instrument(async move { self.exchange_inner(token, requested_role, requested_ttl).await })
			.await;

		match &result {
			Ok(session) => {
				self.audit.append(
					AuditEvent::new(AuditAction::Exchange, AuditOutcome::Success)
						.with_principal(session.principal.clone())
						.with_lease(session.lease.id().clone()),
				);
				obs::record_stage_outcome(KIND, StageOutcome::Success);
			},
			Err(_) => {
				self.audit.append(AuditEvent::new(AuditAction::Exchange, AuditOutcome::Failure));
				obs::record_stage_outcome(KIND, StageOutcome::Failure);
			},
		}

		result
	}

	/// Renews a previously issued lease.
	pub async fn renew(
		&self,
		handle: &LeaseHandle,
		requested_ttl: Option<Duration>,
	) -> Result<OffsetDateTime> {
		self.leases.renew(handle, requested_ttl).await
	}

	/// Revokes a previously issued lease.
	pub async fn revoke(&self, handle: &LeaseHandle) -> Result<()> {
		self.leases.revoke(handle).await
	}

	async fn exchange_inner(
		&self,
		token: &str,
		requested_role: &RoleName,
		requested_ttl: Option<Duration>,
	) -> Result<BrokerSession> {
		let claims = match self
			.verifier
			.verify(token, &self.verifier.trust().accepted_audiences)
			.await
		{
			Ok(claims) => {
				self.audit.append(
					AuditEvent::new(AuditAction::Verify, AuditOutcome::Success)
						.with_claims_fingerprint(claims.fingerprint()),
				);

				claims
			},
			Err(err) => {
				let mut event = AuditEvent::new(AuditAction::Verify, AuditOutcome::Failure);

				if let Error::AuthenticationFailed { stage } = &err {
					event = event.with_stage(stage);
				}

				self.audit.append(event);

				return Err(err);
			},
		};
		let snapshot = self.policies.snapshot();
		let binding = match match_claims(&claims, snapshot.bindings()) {
			Ok(binding) => {
				self.audit.append(
					AuditEvent::new(AuditAction::Match, AuditOutcome::Success)
						.with_claims_fingerprint(claims.fingerprint()),
				);

				binding
			},
			Err(err) => {
				self.audit.append(
					AuditEvent::new(AuditAction::Match, AuditOutcome::Failure)
						.with_claims_fingerprint(claims.fingerprint()),
				);

				return Err(err);
			},
		};
		// Mint the internal session identity from the binding's user claim.
		let principal = claims
			.claim(&binding.user_claim)
			.and_then(ClaimValue::as_scalar)
			.and_then(|value| PrincipalId::new(value).ok());
		let Some(principal) = principal else {
			self.audit.append(
				AuditEvent::new(AuditAction::Verify, AuditOutcome::Failure)
					.with_stage("identity")
					.with_claims_fingerprint(claims.fingerprint()),
			);

			return Err(Error::AuthenticationFailed { stage: "identity" });
		};

		if !self.authorizes(binding, &snapshot, requested_role) {
			self.audit.append(
				AuditEvent::new(AuditAction::Match, AuditOutcome::Failure)
					.with_principal(principal.clone())
					.with_stage("authorize"),
			);

			return Err(Error::Forbidden { role: requested_role.to_string() });
		}

		let (lease, credential) = self.leases.issue(requested_role, requested_ttl).await?;
		let handle = lease.handle();
		// Revokes the fresh lease if this future is dropped before delivery.
		let guard = DeliveryGuard::new(self.leases.clone(), handle.clone());
		let session = BrokerSession {
			principal,
			binding: binding.name.clone(),
			credential,
			lease: handle,
			lease_expires_at: lease.expires_at,
		};

		guard.defuse();

		Ok(session)
	}

	/// A role is authorized when any attached policy grants `read` on
	/// `creds/<role>`; an explicit deny on a matching rule always wins.
	fn authorizes(
		&self,
		binding: &RoleBinding,
		snapshot: &PolicySnapshot,
		requested_role: &RoleName,
	) -> bool {
		let resource = format!("creds/{requested_role}");
		let mut granted = false;

		for policy in &binding.policies {
			let Some(bundle) = snapshot.get_policy(policy) else {
				continue;
			};

			match bundle.evaluate(&resource, Capability::Read) {
				PolicyDecision::Deny => return false,
				PolicyDecision::Grant => granted = true,
				PolicyDecision::NoOpinion => {},
			}
		}

		granted
	}
}
#[cfg(feature = "reqwest")]
impl Broker<ReqwestKeyFetcher> {
	/// Creates a broker provisioning its own reqwest-backed key transport.
	pub fn new(
		trust: TrustConfig,
		policies: Arc<PolicyStore>,
		source: Arc<dyn CredentialSource>,
		audit: Arc<dyn AuditSink>,
	) -> Self {
		Self::with_key_fetcher(trust, ReqwestKeyFetcher::default(), policies, source, audit)
	}
}
impl<F> Debug for Broker<F>
where
	F: ?Sized + KeyFetcher,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("verifier", &self.verifier)
			.field("leases", &self.leases)
			.finish()
	}
}

/// Revokes an issued lease if the credential never reaches the caller.
struct DeliveryGuard {
	leases: Arc<LeaseManager>,
	handle: Option<LeaseHandle>,
}
impl DeliveryGuard {
	fn new(leases: Arc<LeaseManager>, handle: LeaseHandle) -> Self {
		Self { leases, handle: Some(handle) }
	}

	fn defuse(mut self) {
		self.handle = None;
	}
}
impl Drop for DeliveryGuard {
	fn drop(&mut self) {
		if let Some(handle) = self.handle.take() {
			self.leases.abort_undelivered(&handle);
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{_preludet::*, lease::LeaseState};

	#[tokio::test]
	async fn dropped_delivery_guard_revokes_the_lease() {
		let (broker, _, _) = build_test_broker();
		let role = RoleName::new("storage-writer").expect("Role fixture should be valid.");
		let (lease, _) = broker
			.leases()
			.issue(&role, None)
			.await
			.expect("Direct issuance should succeed.");
		let handle = lease.handle();

		drop(DeliveryGuard::new(broker.leases().clone(), handle.clone()));

		let snapshot = broker.leases().lease(&handle).expect("Lease record should still exist.");

		assert_eq!(snapshot.state, LeaseState::Revoked);
	}

	#[tokio::test]
	async fn defused_delivery_guard_leaves_the_lease_alone() {
		let (broker, _, _) = build_test_broker();
		let role = RoleName::new("storage-writer").expect("Role fixture should be valid.");
		let (lease, _) = broker
			.leases()
			.issue(&role, None)
			.await
			.expect("Direct issuance should succeed.");
		let handle = lease.handle();

		DeliveryGuard::new(broker.leases().clone(), handle.clone()).defuse();

		let snapshot = broker.leases().lease(&handle).expect("Lease record should still exist.");

		assert_eq!(snapshot.state, LeaseState::Active);
	}
}
