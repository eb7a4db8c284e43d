//! Broker-level error types shared across verification, policy, and lease layers.

// self
use crate::_prelude::*;

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical broker error exposed by public APIs.
///
/// Verification and authorization variants intentionally carry only the name of the
/// failing stage; claim values and signing material never appear in messages.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Token failed verification. Terminal for the request; never retried.
	#[error("Authentication failed during the {stage} check.")]
	AuthenticationFailed {
		/// Name of the verification stage that rejected the token.
		stage: &'static str,
	},
	/// No configured role binding matched the presented claims.
	#[error("No role binding matches the presented claims.")]
	NoMatchingPolicy,
	/// The matched binding's policies do not authorize the requested role.
	#[error("The attached policies do not authorize role `{role}`.")]
	Forbidden {
		/// Caller-requested role name.
		role: String,
	},
	/// No lease matches the provided handle.
	#[error("No lease matches the provided handle.")]
	LeaseNotFound,
	/// The lease's issuing role disallows renewal.
	#[error("The lease's issuing role does not permit renewal.")]
	LeaseNotRenewable,
	/// The lease expired before the operation could apply.
	#[error("The lease has already expired.")]
	LeaseExpired,
	/// Downstream credential source failure; safe for the caller to retry with backoff.
	#[error("The downstream credential source is unavailable.")]
	CredentialSourceUnavailable {
		/// Underlying source failure.
		#[source]
		source: crate::lease::source::SourceError,
	},
	/// The lease is revoked locally but the source-side invalidation has not completed.
	#[error("The lease is revoked; source-side revocation is still pending.")]
	RevocationPending,
	/// Malformed startup or reload configuration.
	#[error(transparent)]
	Config(#[from] ConfigError),
}

/// Configuration and validation failures raised at load or reload time.
///
/// Any of these aborts startup; a reload that produces one leaves the previous
/// snapshot in place.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Configuration payload could not be deserialized.
	#[error("Configuration payload is malformed.")]
	Parse {
		/// Structured parsing failure with the offending path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// An identifier inside the configuration failed validation.
	#[error(transparent)]
	Identifier(#[from] crate::auth::IdentifierError),
	/// Two entries of the same kind share a name.
	#[error("Duplicate {kind} entry `{name}`.")]
	DuplicateName {
		/// Entry kind (binding, policy, role).
		kind: &'static str,
		/// Offending name.
		name: String,
	},
	/// A role binding's ttl exceeds its max_ttl ceiling.
	#[error("Binding `{binding}` declares a ttl above its max_ttl ceiling.")]
	BindingTtlExceedsCeiling {
		/// Offending binding name.
		binding: String,
	},
	/// A credential role's default lease ttl exceeds its max ttl ceiling.
	#[error("Role `{role}` declares a default ttl above its max ttl ceiling.")]
	RoleTtlExceedsCeiling {
		/// Offending role name.
		role: String,
	},
	/// A credential role's ttl is zero or negative.
	#[error("Role `{role}` declares a non-positive ttl.")]
	NonPositiveTtl {
		/// Offending role name.
		role: String,
	},
	/// A role binding references a policy bundle that does not exist.
	#[error("Binding `{binding}` references unknown policy `{policy}`.")]
	DanglingPolicy {
		/// Offending binding name.
		binding: String,
		/// Missing policy name.
		policy: String,
	},
	/// A role binding attaches no policies at all.
	#[error("Binding `{binding}` attaches no policies.")]
	NoPolicies {
		/// Offending binding name.
		binding: String,
	},
	/// A role binding has neither bound claims nor bound audiences.
	#[error("Binding `{binding}` declares no bound claims or audiences.")]
	UnconstrainedBinding {
		/// Offending binding name.
		binding: String,
	},
	/// A role binding does not name the claim that identifies the principal.
	#[error("Binding `{binding}` does not declare a user claim.")]
	MissingUserClaim {
		/// Offending binding name.
		binding: String,
	},
	/// The trust configuration accepts no audiences.
	#[error("Trust configuration accepts no audiences.")]
	EmptyAudiences,
	/// The trust configuration binds no issuer.
	#[error("Trust configuration binds no issuer.")]
	EmptyIssuer,
}
impl ConfigError {
	/// Wraps a path-aware JSON deserialization failure.
	pub fn parse(source: serde_path_to_error::Error<serde_json::Error>) -> Self {
		Self::Parse { source }
	}
}
