//! First-match-wins claim matching over the configured binding list.

// self
use crate::{_prelude::*, auth::ClaimSet, policy::RoleBinding};

/// Selects the first binding whose rules all match the claim set.
///
/// Bindings are evaluated in configuration order; ordering is the only
/// tie-break when several bindings would match. No side effects.
pub fn match_claims<'a>(claims: &ClaimSet, bindings: &'a [RoleBinding]) -> Result<&'a RoleBinding> {
	bindings.iter().find(|binding| binding.matches(claims)).ok_or(Error::NoMatchingPolicy)
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::{
		auth::BindingName,
		policy::Pattern,
	};

	fn claims(repository: &str, git_ref: &str) -> ClaimSet {
		ClaimSet::from_value(&json!({
			"iss": "https://token.actions.example.com",
			"sub": format!("repo:{repository}:ref:{git_ref}"),
			"aud": ["https://broker.example.com"],
			"exp": 1_700_000_600,
			"repository": repository,
			"ref": git_ref
		}))
		.expect("Claim fixture should flatten successfully.")
	}

	fn binding(name: &str) -> RoleBinding {
		RoleBinding::new(
			BindingName::new(name).expect("Binding fixture should be valid."),
			"sub",
			Duration::minutes(15),
			Duration::minutes(30),
		)
		.expect("Binding fixture should satisfy the ttl ceiling.")
	}

	#[test]
	fn main_branch_scenario_matches_and_dev_branch_does_not() {
		let bindings = vec![
			binding("main-deploys")
				.with_bound_claim("repository", Pattern::exact("org/repo"))
				.with_bound_claim("ref", Pattern::exact("refs/heads/main")),
		];
		let matched = match_claims(&claims("org/repo", "refs/heads/main"), &bindings)
			.expect("Main-branch claims should match the binding.");

		assert_eq!(matched.name.as_ref(), "main-deploys");

		let err = match_claims(&claims("org/repo", "refs/heads/dev"), &bindings)
			.expect_err("Dev-branch claims must not match the main-only binding.");

		assert!(matches!(err, Error::NoMatchingPolicy));
	}

	#[test]
	fn first_full_match_wins_in_configuration_order() {
		let bindings = vec![
			binding("broad").with_bound_claim("repository", Pattern::glob("org/*")),
			binding("narrow").with_bound_claim("repository", Pattern::exact("org/repo")),
		];
		let matched = match_claims(&claims("org/repo", "refs/heads/main"), &bindings)
			.expect("Claims should match at least one binding.");

		assert_eq!(matched.name.as_ref(), "broad");
	}

	#[test]
	fn later_bindings_are_reached_when_earlier_ones_fail() {
		let bindings = vec![
			binding("other-repo").with_bound_claim("repository", Pattern::exact("org/other")),
			binding("fallback").with_bound_claim("repository", Pattern::glob("org/*")),
		];
		let matched = match_claims(&claims("org/repo", "refs/heads/main"), &bindings)
			.expect("Claims should fall through to the glob binding.");

		assert_eq!(matched.name.as_ref(), "fallback");
	}

	#[test]
	fn empty_binding_list_never_matches() {
		let err = match_claims(&claims("org/repo", "refs/heads/main"), &[])
			.expect_err("An empty binding list must never match.");

		assert!(matches!(err, Error::NoMatchingPolicy));
	}
}
