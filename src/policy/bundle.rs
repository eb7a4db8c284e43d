//! Policy bundles: named resource-capability grants evaluated deny-by-default.

// std
use std::collections::BTreeSet;
// self
use crate::{_prelude::*, auth::PolicyName, policy::Pattern};

/// Closed capability set a policy rule may grant on a resource path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
	/// Read the resource.
	Read,
	/// Create or update the resource.
	Update,
	/// Enumerate children of the resource.
	List,
	/// Delete the resource.
	Delete,
	/// Explicitly deny all access; overrides grants from other matching rules.
	Deny,
}
impl Capability {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Capability::Read => "read",
			Capability::Update => "update",
			Capability::List => "list",
			Capability::Delete => "delete",
			Capability::Deny => "deny",
		}
	}
}
impl Display for Capability {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome of evaluating a bundle against a path and capability.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyDecision {
	/// A matching rule grants the capability.
	Grant,
	/// A matching rule carries an explicit deny.
	Deny,
	/// No matching rule mentions the capability.
	NoOpinion,
}

/// One resource-path grant inside a bundle.
#[derive(Clone, Debug)]
pub struct PolicyRule {
	/// Path pattern the rule applies to.
	pub path: Pattern,
	/// Capabilities granted (or denied) on matching paths.
	pub capabilities: BTreeSet<Capability>,
}
impl PolicyRule {
	/// Creates a rule for the provided path pattern and capability list.
	pub fn new(path: Pattern, capabilities: impl IntoIterator<Item = Capability>) -> Self {
		Self { path, capabilities: capabilities.into_iter().collect() }
	}
}

/// Named set of resource-capability grants.
///
/// Checks are deny-by-default: a path not matched by any rule is denied, and an
/// explicit [`Capability::Deny`] on a matching rule overrides grants from every
/// other matching rule.
#[derive(Clone, Debug)]
pub struct PolicyBundle {
	/// Bundle name referenced by role bindings.
	pub name: PolicyName,
	/// Ordered rule list.
	pub rules: Vec<PolicyRule>,
}
impl PolicyBundle {
	/// Creates a bundle from an ordered rule list.
	pub fn new(name: PolicyName, rules: Vec<PolicyRule>) -> Self {
		Self { name, rules }
	}

	/// Evaluates the bundle for a path and capability.
	pub fn evaluate(&self, path: &str, capability: Capability) -> PolicyDecision {
		let mut granted = false;

		for rule in self.rules.iter().filter(|rule| rule.path.matches(path)) {
			if rule.capabilities.contains(&Capability::Deny) {
				return PolicyDecision::Deny;
			}
			if rule.capabilities.contains(&capability) {
				granted = true;
			}
		}

		if granted { PolicyDecision::Grant } else { PolicyDecision::NoOpinion }
	}

	/// Returns true if the bundle grants the capability on the path.
	pub fn allows(&self, path: &str, capability: Capability) -> bool {
		matches!(self.evaluate(path, capability), PolicyDecision::Grant)
	}
}
