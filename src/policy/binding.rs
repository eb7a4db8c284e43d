//! Role bindings tying token claims to policy bundles and credential roles.

// self
use crate::{
	_prelude::*,
	auth::{BindingName, ClaimSet, PolicyName},
	error::ConfigError,
	policy::Pattern,
};

/// One bound-claim rule: a claim name and the pattern its value must satisfy.
#[derive(Clone, Debug)]
pub struct ClaimRule {
	/// Flattened claim name (e.g. `repository`, `permissions/contents`).
	pub claim: String,
	/// Pattern the claim value must match.
	pub pattern: Pattern,
}
impl ClaimRule {
	/// Creates a rule for the provided claim and pattern.
	pub fn new(claim: impl Into<String>, pattern: Pattern) -> Self {
		Self { claim: claim.into(), pattern }
	}
}

/// Binding between externally issued claims and an internal authorization grant.
///
/// A binding matches when ALL of its bound-claim rules match and, if bound
/// audiences are declared, at least one of them appears in the token's
/// audience list. The bindings list ordering is the only tie-break.
#[derive(Clone, Debug)]
pub struct RoleBinding {
	/// Binding name, unique across the configuration.
	pub name: BindingName,
	/// Binding flavor recorded for audit context (e.g. `jwt`).
	pub role_type: String,
	/// Audiences the token must intersect; empty means no audience constraint.
	pub bound_audiences: Vec<String>,
	/// Claim naming the principal of the exchange.
	pub user_claim: String,
	/// Conjunctive bound-claim rules.
	pub bound_claims: Vec<ClaimRule>,
	/// Policy bundles attached to the binding.
	pub policies: Vec<PolicyName>,
	/// Session ttl granted on match.
	pub ttl: Duration,
	/// Absolute session ttl ceiling.
	pub max_ttl: Duration,
}
impl RoleBinding {
	/// Creates a binding after validating the ttl ceiling invariant.
	pub fn new(
		name: BindingName,
		user_claim: impl Into<String>,
		ttl: Duration,
		max_ttl: Duration,
	) -> Result<Self, ConfigError> {
		if ttl > max_ttl {
			return Err(ConfigError::BindingTtlExceedsCeiling { binding: name.to_string() });
		}

		Ok(Self {
			name,
			role_type: "jwt".into(),
			bound_audiences: Vec::new(),
			user_claim: user_claim.into(),
			bound_claims: Vec::new(),
			policies: Vec::new(),
			ttl,
			max_ttl,
		})
	}

	/// Overrides the recorded binding flavor.
	pub fn with_role_type(mut self, role_type: impl Into<String>) -> Self {
		self.role_type = role_type.into();

		self
	}

	/// Adds a bound-claim rule.
	pub fn with_bound_claim(mut self, claim: impl Into<String>, pattern: Pattern) -> Self {
		self.bound_claims.push(ClaimRule::new(claim, pattern));

		self
	}

	/// Replaces the bound audience list.
	pub fn with_bound_audiences<I, S>(mut self, audiences: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.bound_audiences = audiences.into_iter().map(Into::into).collect();

		self
	}

	/// Attaches a policy bundle.
	pub fn with_policy(mut self, policy: PolicyName) -> Self {
		self.policies.push(policy);

		self
	}

	/// Evaluates the binding against a verified claim set.
	///
	/// An absent claim rejects the binding; it is never treated as a wildcard
	/// match.
	pub fn matches(&self, claims: &ClaimSet) -> bool {
		if !self.bound_audiences.is_empty()
			&& !self
				.bound_audiences
				.iter()
				.any(|audience| claims.audiences().contains(audience))
		{
			return false;
		}

		self.bound_claims.iter().all(|rule| {
			claims
				.claim(&rule.claim)
				.is_some_and(|value| value.any(|entry| rule.pattern.matches(entry)))
		})
	}
}
