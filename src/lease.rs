//! Lease records, lifecycle states, and credential-issuing role parameters.

pub mod manager;
pub mod source;
pub mod sweep;

pub use manager::*;
pub use source::*;
pub use sweep::*;

// self
use crate::{
	_prelude::*,
	auth::{CredentialKind, CredentialRef, LeaseId, RoleName},
	error::ConfigError,
};

/// Lifecycle state of a lease.
///
/// `Expired` and `Revoked` are terminal; no transition leaves them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaseState {
	/// Issued and within its ttl; never renewed.
	Active,
	/// Renewed at least once and within its current ttl.
	Renewed,
	/// Passed its expiry without being revoked.
	Expired,
	/// Explicitly revoked, by the caller or by delivery-failure cleanup.
	Revoked,
}
impl LeaseState {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			LeaseState::Active => "active",
			LeaseState::Renewed => "renewed",
			LeaseState::Expired => "expired",
			LeaseState::Revoked => "revoked",
		}
	}

	/// Returns true for states with no outgoing transitions.
	pub const fn is_terminal(self) -> bool {
		matches!(self, LeaseState::Expired | LeaseState::Revoked)
	}
}
impl Display for LeaseState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Opaque handle the caller holds for a lease it was issued.
///
/// The lease record itself stays owned by the lease manager; the handle only
/// names it for renew/revoke calls.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaseHandle(LeaseId);
impl LeaseHandle {
	/// Wraps a lease identifier.
	pub fn new(id: LeaseId) -> Self {
		Self(id)
	}

	/// Lease identifier behind the handle.
	pub fn id(&self) -> &LeaseId {
		&self.0
	}
}
impl Display for LeaseHandle {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		Display::fmt(&self.0, f)
	}
}

/// Time-bounded record of a dynamically issued credential.
///
/// Owned exclusively by the [`LeaseManager`]; values handed to callers are
/// point-in-time snapshots and do not track later transitions.
#[derive(Clone, Debug, Serialize)]
pub struct Lease {
	/// Lease identifier.
	pub id: LeaseId,
	/// Role the credential was issued from.
	pub role: RoleName,
	/// Issuance instant.
	pub issued_at: OffsetDateTime,
	/// Current ttl; updated by renewal.
	pub ttl: Duration,
	/// Whether the issuing role permits renewal.
	pub renewable: bool,
	/// Current expiry; `issued_at + ttl`, moved forward by renewal.
	pub expires_at: OffsetDateTime,
	/// Lifecycle state.
	pub state: LeaseState,
	#[serde(skip)]
	pub(crate) max_ttl: Duration,
	#[serde(skip)]
	pub(crate) default_ttl: Duration,
	#[serde(skip)]
	pub(crate) credential_ref: CredentialRef,
}
impl Lease {
	pub(crate) fn issue(role: &CredentialRole, ttl: Duration, now: OffsetDateTime, credential_ref: CredentialRef) -> Self {
		Self {
			id: LeaseId::generate(),
			role: role.name.clone(),
			issued_at: now,
			ttl,
			renewable: role.renewable,
			expires_at: now + ttl,
			state: LeaseState::Active,
			max_ttl: role.max_ttl,
			default_ttl: role.default_ttl,
			credential_ref,
		}
	}

	/// Handle naming this lease.
	pub fn handle(&self) -> LeaseHandle {
		LeaseHandle::new(self.id.clone())
	}

	/// Absolute expiry ceiling: no renewal moves `expires_at` past this instant.
	pub fn max_expires_at(&self) -> OffsetDateTime {
		self.issued_at + self.max_ttl
	}

	/// Returns true if the lease has passed its current expiry at `now`.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		now >= self.expires_at
	}
}

/// Named mapping to a downstream permission document plus issuance parameters.
#[derive(Clone, Debug)]
pub struct CredentialRole {
	/// Role name requested by callers.
	pub name: RoleName,
	/// Credential style the source should mint.
	pub kind: CredentialKind,
	/// Downstream permission document identifier (e.g. an IAM role or policy name).
	pub permissions: String,
	/// Lease ttl applied when the caller requests none.
	pub default_ttl: Duration,
	/// Absolute lease ttl ceiling.
	pub max_ttl: Duration,
	/// Whether leases issued from this role may be renewed.
	pub renewable: bool,
}
impl CredentialRole {
	/// Creates a role after validating its ttl parameters.
	pub fn new(
		name: RoleName,
		kind: CredentialKind,
		permissions: impl Into<String>,
		default_ttl: Duration,
		max_ttl: Duration,
	) -> Result<Self, ConfigError> {
		if !default_ttl.is_positive() {
			return Err(ConfigError::NonPositiveTtl { role: name.to_string() });
		}
		if default_ttl > max_ttl {
			return Err(ConfigError::RoleTtlExceedsCeiling { role: name.to_string() });
		}

		Ok(Self { name, kind, permissions: permissions.into(), default_ttl, max_ttl, renewable: true })
	}

	/// Overrides the renewable flag.
	pub fn with_renewable(mut self, renewable: bool) -> Self {
		self.renewable = renewable;

		self
	}

	/// Resolves a caller-requested ttl against the role's defaults and ceiling.
	///
	/// Zero, negative, or absent requests use the default ttl; anything above
	/// the ceiling is clamped down to it.
	pub fn effective_ttl(&self, requested: Option<Duration>) -> Duration {
		match requested {
			Some(ttl) if ttl.is_positive() => ttl.min(self.max_ttl),
			_ => self.default_ttl,
		}
	}
}
