//! Read-only policy snapshots with atomic hot-reload.

// self
use crate::{
	_prelude::*,
	auth::{PolicyName, RoleName},
	lease::CredentialRole,
	policy::{PolicyBundle, RoleBinding},
};

/// Immutable view over the configured bindings, policies, and roles.
///
/// Built once per load/reload; readers hold the whole snapshot so a concurrent
/// swap never exposes partially updated state.
#[derive(Clone, Debug, Default)]
pub struct PolicySnapshot {
	bindings: Vec<RoleBinding>,
	policies: HashMap<PolicyName, PolicyBundle>,
	roles: HashMap<RoleName, CredentialRole>,
}
impl PolicySnapshot {
	/// Assembles a snapshot from already-validated parts.
	pub fn new(
		bindings: Vec<RoleBinding>,
		policies: HashMap<PolicyName, PolicyBundle>,
		roles: HashMap<RoleName, CredentialRole>,
	) -> Self {
		Self { bindings, policies, roles }
	}

	/// Bindings in configuration order.
	pub fn bindings(&self) -> &[RoleBinding] {
		&self.bindings
	}

	/// Looks up a policy bundle by name.
	pub fn get_policy(&self, name: &str) -> Option<&PolicyBundle> {
		self.policies.get(name)
	}

	/// Looks up a credential role by name.
	pub fn get_role(&self, name: &str) -> Option<&CredentialRole> {
		self.roles.get(name)
	}
}

/// Shared handle over the current [`PolicySnapshot`].
///
/// Reads clone an `Arc` out from under a short read lock; a reload swaps the
/// whole pointer under the write lock. Readers started before a reload keep
/// the snapshot they began with.
#[derive(Debug)]
pub struct PolicyStore {
	inner: RwLock<Arc<PolicySnapshot>>,
}
impl PolicyStore {
	/// Creates a store serving the provided snapshot.
	pub fn new(snapshot: PolicySnapshot) -> Self {
		Self { inner: RwLock::new(Arc::new(snapshot)) }
	}

	/// Returns the current snapshot.
	pub fn snapshot(&self) -> Arc<PolicySnapshot> {
		self.inner.read().clone()
	}

	/// Atomically replaces the served snapshot.
	pub fn reload(&self, snapshot: PolicySnapshot) {
		*self.inner.write() = Arc::new(snapshot);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		auth::{BindingName, CredentialKind},
		policy::{Capability, Pattern, PolicyRule},
	};

	fn snapshot(policy_path: &str) -> PolicySnapshot {
		let policy_name = PolicyName::new("ci-policy").expect("Policy fixture should be valid.");
		let role_name = RoleName::new("storage-writer").expect("Role fixture should be valid.");
		let binding = RoleBinding::new(
			BindingName::new("github-actions").expect("Binding fixture should be valid."),
			"sub",
			Duration::minutes(15),
			Duration::minutes(30),
		)
		.expect("Binding fixture should satisfy the ttl ceiling.")
		.with_policy(policy_name.clone());
		let bundle = PolicyBundle::new(
			policy_name.clone(),
			vec![PolicyRule::new(Pattern::glob(policy_path), [Capability::Read])],
		);
		let role = CredentialRole::new(
			role_name.clone(),
			CredentialKind::SessionToken,
			"storage.objectAdmin",
			Duration::minutes(15),
			Duration::hours(1),
		)
		.expect("Role fixture should satisfy the ttl ceiling.");

		PolicySnapshot::new(
			vec![binding],
			HashMap::from_iter([(policy_name, bundle)]),
			HashMap::from_iter([(role_name, role)]),
		)
	}

	#[test]
	fn lookups_hit_loaded_entries() {
		let store = PolicyStore::new(snapshot("creds/*"));
		let view = store.snapshot();

		assert_eq!(view.bindings().len(), 1);
		assert!(view.get_policy("ci-policy").is_some());
		assert!(view.get_policy("unknown").is_none());
		assert!(view.get_role("storage-writer").is_some());
		assert!(view.get_role("unknown").is_none());
	}

	#[test]
	fn reload_swaps_whole_snapshots() {
		let store = PolicyStore::new(snapshot("creds/*"));
		let before = store.snapshot();

		store.reload(snapshot("other/*"));

		let after = store.snapshot();

		// The pre-reload handle still serves the old rules.
		assert!(
			before
				.get_policy("ci-policy")
				.expect("Old snapshot should keep its policy.")
				.allows("creds/storage-writer", Capability::Read)
		);
		assert!(
			!after
				.get_policy("ci-policy")
				.expect("New snapshot should carry the reloaded policy.")
				.allows("creds/storage-writer", Capability::Read)
		);
	}
}
