//! Append-only audit event stream emitted by every broker operation.

// self
use crate::{
	_prelude::*,
	auth::{LeaseId, PrincipalId},
};

/// Broker operation recorded by an audit event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
	/// Token verification.
	Verify,
	/// Claim-to-binding matching.
	Match,
	/// Lease issuance.
	Issue,
	/// Lease renewal.
	Renew,
	/// Lease revocation.
	Revoke,
	/// Sweep-driven expiry transition.
	Expire,
	/// End-to-end token-for-credential exchange.
	Exchange,
}
impl AuditAction {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			AuditAction::Verify => "verify",
			AuditAction::Match => "match",
			AuditAction::Issue => "issue",
			AuditAction::Renew => "renew",
			AuditAction::Revoke => "revoke",
			AuditAction::Expire => "expire",
			AuditAction::Exchange => "exchange",
		}
	}
}
impl Display for AuditAction {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome label recorded by an audit event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
	/// The operation completed.
	Success,
	/// The operation was rejected or failed.
	Failure,
	/// The operation completed locally; downstream propagation is still due.
	Pending,
}
impl AuditOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			AuditOutcome::Success => "success",
			AuditOutcome::Failure => "failure",
			AuditOutcome::Pending => "pending",
		}
	}
}
impl Display for AuditOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Structured record appended to the audit stream.
///
/// Events carry the full server-side context for an operation even when the
/// caller-facing error names only a stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEvent {
	/// Verified principal, when one was resolved before the event.
	pub principal: Option<PrincipalId>,
	/// Operation the event records.
	pub action: AuditAction,
	/// Outcome of the operation.
	pub outcome: AuditOutcome,
	/// Lease the operation applied to, if any.
	pub lease: Option<LeaseId>,
	/// Failing verification or authorization stage, if any.
	pub stage: Option<&'static str>,
	/// Digest of the claim set involved, safe to log in place of claim values.
	pub claims_fingerprint: Option<String>,
	/// Event timestamp.
	pub at: OffsetDateTime,
}
impl AuditEvent {
	/// Creates an event stamped with the current instant.
	pub fn new(action: AuditAction, outcome: AuditOutcome) -> Self {
		Self {
			principal: None,
			action,
			outcome,
			lease: None,
			stage: None,
			claims_fingerprint: None,
			at: OffsetDateTime::now_utc(),
		}
	}

	/// Attaches the resolved principal.
	pub fn with_principal(mut self, principal: PrincipalId) -> Self {
		self.principal = Some(principal);

		self
	}

	/// Attaches the lease the operation applied to.
	pub fn with_lease(mut self, lease: LeaseId) -> Self {
		self.lease = Some(lease);

		self
	}

	/// Attaches the failing stage name.
	pub fn with_stage(mut self, stage: &'static str) -> Self {
		self.stage = Some(stage);

		self
	}

	/// Attaches a claim-set fingerprint.
	pub fn with_claims_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
		self.claims_fingerprint = Some(fingerprint.into());

		self
	}
}

/// Append-only sink receiving audit events.
///
/// Write-only from the broker's perspective; the core never reads events back.
pub trait AuditSink
where
	Self: Send + Sync,
{
	/// Appends one event to the stream.
	fn append(&self, event: AuditEvent);
}

/// Sink that drops every event; the default when no stream is wired up.
#[derive(Clone, Debug, Default)]
pub struct NoopAuditSink;
impl AuditSink for NoopAuditSink {
	fn append(&self, _: AuditEvent) {}
}

/// In-memory sink for tests and local inspection.
#[derive(Debug, Default)]
pub struct MemoryAuditSink(Mutex<Vec<AuditEvent>>);
impl MemoryAuditSink {
	/// Snapshot of every event appended so far.
	pub fn events(&self) -> Vec<AuditEvent> {
		self.0.lock().clone()
	}

	/// Events recorded for the provided action.
	pub fn events_for(&self, action: AuditAction) -> Vec<AuditEvent> {
		self.0.lock().iter().filter(|event| event.action == action).cloned().collect()
	}
}
impl AuditSink for MemoryAuditSink {
	fn append(&self, event: AuditEvent) {
		self.0.lock().push(event);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn memory_sink_records_in_order() {
		let sink = MemoryAuditSink::default();

		sink.append(AuditEvent::new(AuditAction::Verify, AuditOutcome::Success));
		sink.append(
			AuditEvent::new(AuditAction::Match, AuditOutcome::Failure).with_stage("match"),
		);

		let events = sink.events();

		assert_eq!(events.len(), 2);
		assert_eq!(events[0].action, AuditAction::Verify);
		assert_eq!(events[1].outcome, AuditOutcome::Failure);
		assert_eq!(events[1].stage, Some("match"));
		assert_eq!(sink.events_for(AuditAction::Match).len(), 1);
	}

	#[test]
	fn events_serialize_for_export() {
		let principal =
			PrincipalId::new("repo:acme/infra").expect("Principal fixture should be valid.");
		let event =
			AuditEvent::new(AuditAction::Issue, AuditOutcome::Success).with_principal(principal);
		let payload =
			serde_json::to_string(&event).expect("Audit event should serialize to JSON.");

		assert!(payload.contains("\"issue\""));
		assert!(payload.contains("repo:acme/infra"));
	}
}
