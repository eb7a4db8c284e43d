//! Versioned configuration inputs: parsing, validation, and snapshot building.

// std
use std::collections::BTreeMap;
// self
use crate::{
	_prelude::*,
	auth::{BindingName, CredentialKind, PolicyName, RoleName},
	error::ConfigError,
	lease::CredentialRole,
	policy::{
		Capability, MatchMode, Pattern, PolicyBundle, PolicyRule, PolicySnapshot, RoleBinding,
	},
	verify::TrustConfig,
};

/// Serde helpers encoding `time::Duration` fields as whole seconds.
pub mod secs {
	// crates.io
	use serde::{Deserialize, Deserializer, Serializer};
	use time::Duration;

	/// Serializes a duration as whole seconds.
	pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_i64(duration.whole_seconds())
	}

	/// Deserializes whole seconds into a duration.
	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		i64::deserialize(deserializer).map(Duration::seconds)
	}
}

/// Role binding as supplied by the configuration payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoleBindingConfig {
	/// Binding name, unique across the payload.
	pub name: BindingName,
	/// Binding flavor; defaults to `jwt`.
	#[serde(default = "default_role_type")]
	pub role_type: String,
	/// Audiences the token must intersect; empty means no audience constraint.
	#[serde(default)]
	pub bound_audiences: Vec<String>,
	/// Claim naming the principal of the exchange.
	pub user_claim: String,
	/// Claim-name to pattern mapping; all entries must match.
	#[serde(default)]
	pub bound_claims: BTreeMap<String, String>,
	/// Match mode applied to every bound-claim pattern.
	#[serde(default)]
	pub bound_claims_type: MatchMode,
	/// Policy bundles attached to the binding.
	pub policies: Vec<PolicyName>,
	/// Session ttl granted on match, in seconds.
	#[serde(with = "secs")]
	pub ttl: Duration,
	/// Absolute session ttl ceiling, in seconds.
	#[serde(with = "secs")]
	pub max_ttl: Duration,
}

/// One policy rule as supplied by the configuration payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyRuleConfig {
	/// Resource path pattern (`*` wildcard segments allowed).
	pub path: String,
	/// Capabilities granted (or denied) on matching paths.
	pub capabilities: Vec<Capability>,
}

/// Policy bundle as supplied by the configuration payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyBundleConfig {
	/// Bundle name referenced by role bindings.
	pub name: PolicyName,
	/// Ordered rule list.
	pub rules: Vec<PolicyRuleConfig>,
}

/// Credential role as supplied by the configuration payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CredentialRoleConfig {
	/// Role name requested by callers.
	pub name: RoleName,
	/// Credential style the source should mint.
	pub kind: CredentialKind,
	/// Downstream permission document identifier.
	pub permissions: String,
	/// Lease ttl applied when the caller requests none, in seconds.
	#[serde(with = "secs")]
	pub default_ttl: Duration,
	/// Absolute lease ttl ceiling, in seconds.
	#[serde(with = "secs")]
	pub max_ttl: Duration,
	/// Whether leases issued from this role may be renewed; defaults to true.
	#[serde(default = "default_true")]
	pub renewable: bool,
}

/// Complete configuration payload the broker loads at startup or reload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BrokerConfig {
	/// Trust anchor for the recognized issuer.
	pub trust: TrustConfig,
	/// Role bindings in match-priority order.
	pub bindings: Vec<RoleBindingConfig>,
	/// Policy bundles.
	pub policies: Vec<PolicyBundleConfig>,
	/// Credential-issuing roles.
	pub roles: Vec<CredentialRoleConfig>,
}
impl BrokerConfig {
	/// Parses a JSON payload, reporting the path of the first offending field.
	pub fn from_json_slice(bytes: &[u8]) -> Result<Self, ConfigError> {
		let mut deserializer = serde_json::Deserializer::from_slice(bytes);

		serde_path_to_error::deserialize(&mut deserializer).map_err(ConfigError::parse)
	}

	/// Validates the payload and assembles the immutable snapshot.
	///
	/// Fails fast: malformed bundles, inverted ttl ceilings, and dangling
	/// policy references abort the load, so a process never starts (and a
	/// reload never swaps) on a broken configuration.
	pub fn build_snapshot(&self) -> Result<PolicySnapshot, ConfigError> {
		self.trust.validate()?;

		let mut roles = HashMap::new();

		for role in &self.roles {
			let built = CredentialRole::new(
				role.name.clone(),
				role.kind,
				role.permissions.clone(),
				role.default_ttl,
				role.max_ttl,
			)?
			.with_renewable(role.renewable);

			if roles.insert(role.name.clone(), built).is_some() {
				return Err(ConfigError::DuplicateName {
					kind: "role",
					name: role.name.to_string(),
				});
			}
		}

		let mut policies = HashMap::new();

		for policy in &self.policies {
			let rules = policy
				.rules
				.iter()
				.map(|rule| {
					PolicyRule::new(Pattern::glob(&rule.path), rule.capabilities.iter().copied())
				})
				.collect();
			let built = PolicyBundle::new(policy.name.clone(), rules);

			if policies.insert(policy.name.clone(), built).is_some() {
				return Err(ConfigError::DuplicateName {
					kind: "policy",
					name: policy.name.to_string(),
				});
			}
		}

		let mut bindings = Vec::with_capacity(self.bindings.len());
		let mut seen_bindings = HashMap::new();

		for binding in &self.bindings {
			if seen_bindings.insert(binding.name.clone(), ()).is_some() {
				return Err(ConfigError::DuplicateName {
					kind: "binding",
					name: binding.name.to_string(),
				});
			}
			if binding.user_claim.is_empty() {
				return Err(ConfigError::MissingUserClaim { binding: binding.name.to_string() });
			}
			if binding.policies.is_empty() {
				return Err(ConfigError::NoPolicies { binding: binding.name.to_string() });
			}
			if binding.bound_claims.is_empty() && binding.bound_audiences.is_empty() {
				return Err(ConfigError::UnconstrainedBinding {
					binding: binding.name.to_string(),
				});
			}

			for policy in &binding.policies {
				if !policies.contains_key(policy) {
					return Err(ConfigError::DanglingPolicy {
						binding: binding.name.to_string(),
						policy: policy.to_string(),
					});
				}
			}

			let mut built = RoleBinding::new(
				binding.name.clone(),
				binding.user_claim.clone(),
				binding.ttl,
				binding.max_ttl,
			)?
			.with_role_type(binding.role_type.clone())
			.with_bound_audiences(binding.bound_audiences.iter().cloned());

			for (claim, pattern) in &binding.bound_claims {
				built = built
					.with_bound_claim(claim, Pattern::compile(pattern, binding.bound_claims_type));
			}
			for policy in &binding.policies {
				built = built.with_policy(policy.clone());
			}

			bindings.push(built);
		}

		Ok(PolicySnapshot::new(bindings, policies, roles))
	}
}

fn default_role_type() -> String {
	"jwt".into()
}

const fn default_true() -> bool {
	true
}
