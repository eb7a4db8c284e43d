//! Lease issuance, renewal, and revocation with per-handle serialization.

// self
use crate::{
	_prelude::*,
	audit::{AuditAction, AuditEvent, AuditOutcome, AuditSink},
	auth::{Credential, CredentialRef, LeaseId, RoleName},
	lease::{CredentialSource, Lease, LeaseHandle, LeaseState},
	obs::{self, StageKind, StageOutcome},
	policy::PolicyStore,
};

/// Owns the lease table and drives every lease lifecycle transition.
///
/// Distinct leases never block each other; operations on the same handle are
/// serialized through a per-lease guard. External source calls always happen
/// outside the table lock, with the state transition recorded first.
pub struct LeaseManager {
	source: Arc<dyn CredentialSource>,
	policies: Arc<PolicyStore>,
	audit: Arc<dyn AuditSink>,
	table: RwLock<HashMap<LeaseId, Lease>>,
	guards: Mutex<HashMap<LeaseId, Arc<AsyncMutex<()>>>>,
	pending_revocations: Mutex<Vec<(LeaseId, CredentialRef)>>,
}
impl LeaseManager {
	/// Creates a manager over the provided source, policy store, and audit sink.
	pub fn new(
		source: Arc<dyn CredentialSource>,
		policies: Arc<PolicyStore>,
		audit: Arc<dyn AuditSink>,
	) -> Self {
		Self {
			source,
			policies,
			audit,
			table: Default::default(),
			guards: Default::default(),
			pending_revocations: Default::default(),
		}
	}

	/// Issues a credential and a lease for the named role.
	///
	/// The requested ttl is clamped to the role's ceiling; zero or absent
	/// requests use the role default. The credential source is called exactly
	/// once; on source failure no lease record is created.
	pub async fn issue(
		&self,
		role_name: &RoleName,
		requested_ttl: Option<Duration>,
	) -> Result<(Lease, Credential)> {
		const KIND: StageKind = StageKind::Issue;

		obs::record_stage_outcome(KIND, StageOutcome::Attempt);

		// Unknown roles are deliberately indistinguishable from unauthorized ones.
		let Some(role) = self.policies.snapshot().get_role(role_name).cloned() else {
			self.audit
				.append(AuditEvent::new(AuditAction::Issue, AuditOutcome::Failure).with_stage("role"));
			obs::record_stage_outcome(KIND, StageOutcome::Failure);

			return Err(Error::Forbidden { role: role_name.to_string() });
		};
		let ttl = role.effective_ttl(requested_ttl);
		let credential = match self.source.issue_credential(&role, ttl).await {
			Ok(credential) => credential,
			Err(source) => {
				self.audit.append(
					AuditEvent::new(AuditAction::Issue, AuditOutcome::Failure).with_stage("source"),
				);
				obs::record_stage_outcome(KIND, StageOutcome::Failure);

				return Err(Error::CredentialSourceUnavailable { source });
			},
		};
		let now = OffsetDateTime::now_utc();
		let lease = Lease::issue(&role, ttl, now, credential.reference.clone());

		self.table.write().insert(lease.id.clone(), lease.clone());
		self.audit.append(
			AuditEvent::new(AuditAction::Issue, AuditOutcome::Success).with_lease(lease.id.clone()),
		);
		obs::record_stage_outcome(KIND, StageOutcome::Success);

		Ok((lease, credential))
	}

	/// Renews a lease, never past its absolute ceiling.
	///
	/// Zero or absent ttl requests use the issuing role's default. The new
	/// expiry is `min(now + ttl, issued_at + max_ttl)` regardless of how many
	/// renewals came before.
	pub async fn renew(
		&self,
		handle: &LeaseHandle,
		requested_ttl: Option<Duration>,
	) -> Result<OffsetDateTime> {
		const KIND: StageKind = StageKind::Renew;

		obs::record_stage_outcome(KIND, StageOutcome::Attempt);

		let guard = self.guard(handle.id());
		let _serialized = guard.lock().await;
		let result = self.renew_locked(handle, requested_ttl, OffsetDateTime::now_utc());

		match &result {
			Ok(_) => {
				self.audit.append(
					AuditEvent::new(AuditAction::Renew, AuditOutcome::Success)
						.with_lease(handle.id().clone()),
				);
				obs::record_stage_outcome(KIND, StageOutcome::Success);
			},
			Err(_) => {
				self.audit.append(
					AuditEvent::new(AuditAction::Renew, AuditOutcome::Failure)
						.with_lease(handle.id().clone()),
				);
				obs::record_stage_outcome(KIND, StageOutcome::Failure);
			},
		}

		result
	}

	/// Revokes a lease and propagates the invalidation to the source.
	///
	/// Idempotent: revoking an already expired or revoked lease succeeds
	/// silently. The terminal transition is recorded under the table lock
	/// before the source call; if the source call fails the lease stays
	/// logically revoked, the handle is queued for sweep-time retry, and
	/// [`Error::RevocationPending`] is returned.
	pub async fn revoke(&self, handle: &LeaseHandle) -> Result<()> {
		const KIND: StageKind = StageKind::Revoke;

		obs::record_stage_outcome(KIND, StageOutcome::Attempt);

		enum Step {
			Missing,
			AlreadyTerminal,
			Transitioned(CredentialRef),
		}

		let guard = self.guard(handle.id());
		let _serialized = guard.lock().await;
		let step = {
			let mut table = self.table.write();

			match table.get_mut(handle.id()) {
				None => Step::Missing,
				Some(lease) if lease.state.is_terminal() => Step::AlreadyTerminal,
				Some(lease) => {
					lease.state = LeaseState::Revoked;

					Step::Transitioned(lease.credential_ref.clone())
				},
			}
		};
		let reference = match step {
			Step::Missing => {
				self.audit.append(AuditEvent::new(AuditAction::Revoke, AuditOutcome::Failure));
				obs::record_stage_outcome(KIND, StageOutcome::Failure);

				return Err(Error::LeaseNotFound);
			},
			Step::AlreadyTerminal => {
				self.audit.append(
					AuditEvent::new(AuditAction::Revoke, AuditOutcome::Success)
						.with_lease(handle.id().clone()),
				);
				obs::record_stage_outcome(KIND, StageOutcome::Success);

				return Ok(());
			},
			Step::Transitioned(reference) => reference,
		};

		match self.source.revoke_credential(&reference).await {
			Ok(()) => {
				self.audit.append(
					AuditEvent::new(AuditAction::Revoke, AuditOutcome::Success)
						.with_lease(handle.id().clone()),
				);
				obs::record_stage_outcome(KIND, StageOutcome::Success);

				Ok(())
			},
			Err(_) => {
				self.queue_revocation(handle.id().clone(), reference);
				self.audit.append(
					AuditEvent::new(AuditAction::Revoke, AuditOutcome::Pending)
						.with_lease(handle.id().clone()),
				);
				obs::record_stage_outcome(KIND, StageOutcome::Failure);

				Err(Error::RevocationPending)
			},
		}
	}

	/// Revokes a lease whose credential could not be delivered to the caller.
	///
	/// Synchronous so it can run from a drop guard: the terminal transition is
	/// recorded immediately and the source-side invalidation is queued for the
	/// sweep.
	pub(crate) fn abort_undelivered(&self, handle: &LeaseHandle) {
		let reference = {
			let mut table = self.table.write();

			match table.get_mut(handle.id()) {
				Some(lease) if !lease.state.is_terminal() => {
					lease.state = LeaseState::Revoked;

					Some(lease.credential_ref.clone())
				},
				_ => None,
			}
		};

		if let Some(reference) = reference {
			self.queue_revocation(handle.id().clone(), reference);
			self.audit.append(
				AuditEvent::new(AuditAction::Revoke, AuditOutcome::Pending)
					.with_lease(handle.id().clone())
					.with_stage("delivery"),
			);
		}
	}

	/// Point-in-time snapshot of a lease record.
	pub fn lease(&self, handle: &LeaseHandle) -> Option<Lease> {
		self.table.read().get(handle.id()).cloned()
	}

	/// Total number of lease records, terminal ones included.
	pub fn lease_count(&self) -> usize {
		self.table.read().len()
	}

	pub(crate) fn source(&self) -> &Arc<dyn CredentialSource> {
		&self.source
	}

	pub(crate) fn audit(&self) -> &Arc<dyn AuditSink> {
		&self.audit
	}

	pub(crate) fn queue_revocation(&self, id: LeaseId, reference: CredentialRef) {
		self.pending_revocations.lock().push((id, reference));
	}

	pub(crate) fn take_pending_revocations(&self) -> Vec<(LeaseId, CredentialRef)> {
		std::mem::take(&mut *self.pending_revocations.lock())
	}

	/// Marks every overdue Active/Renewed lease Expired and returns the
	/// credential references needing source-side revocation.
	pub(crate) fn expire_overdue(&self, now: OffsetDateTime) -> Vec<(LeaseId, CredentialRef)> {
		let mut table = self.table.write();
		let mut expired = Vec::new();

		for lease in table.values_mut() {
			if !lease.state.is_terminal() && lease.is_expired_at(now) {
				lease.state = LeaseState::Expired;

				expired.push((lease.id.clone(), lease.credential_ref.clone()));
			}
		}

		expired
	}

	fn renew_locked(
		&self,
		handle: &LeaseHandle,
		requested_ttl: Option<Duration>,
		now: OffsetDateTime,
	) -> Result<OffsetDateTime> {
		let mut table = self.table.write();
		let lease = table.get_mut(handle.id()).ok_or(Error::LeaseNotFound)?;

		// Terminal leases renew as expired; there is no transition out of them.
		if lease.state.is_terminal() {
			return Err(Error::LeaseExpired);
		}
		if lease.is_expired_at(now) {
			lease.state = LeaseState::Expired;

			let id = lease.id.clone();
			let reference = lease.credential_ref.clone();

			drop(table);
			self.queue_revocation(id, reference);

			return Err(Error::LeaseExpired);
		}
		if !lease.renewable {
			return Err(Error::LeaseNotRenewable);
		}

		let requested = match requested_ttl {
			Some(ttl) if ttl.is_positive() => ttl,
			_ => lease.default_ttl,
		};
		let new_expiry = (now + requested).min(lease.max_expires_at());

		lease.ttl = new_expiry - now;
		lease.expires_at = new_expiry;
		lease.state = LeaseState::Renewed;

		Ok(new_expiry)
	}

	fn guard(&self, id: &LeaseId) -> Arc<AsyncMutex<()>> {
		let mut guards = self.guards.lock();

		guards.entry(id.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}
}
impl Debug for LeaseManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LeaseManager")
			.field("leases", &self.table.read().len())
			.field("pending_revocations", &self.pending_revocations.lock().len())
			.finish()
	}
}
