//! Credential source contract and the in-process fake used by tests and demos.

// std
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{Credential, CredentialKind, CredentialRef},
	lease::CredentialRole,
};

/// Boxed future returned by [`CredentialSource`] operations.
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + 'a + Send>>;

/// Narrow contract to the downstream cloud identity service.
///
/// This is the broker's only cloud dependency; provider-specific request and
/// response shapes stay behind implementations of this trait.
pub trait CredentialSource
where
	Self: Send + Sync,
{
	/// Mints a credential for the role with the provided lifetime.
	fn issue_credential(&self, role: &CredentialRole, ttl: Duration) -> SourceFuture<'_, Credential>;

	/// Invalidates a previously issued credential.
	fn revoke_credential<'a>(&'a self, reference: &'a CredentialRef) -> SourceFuture<'a, ()>;
}

/// Error type produced by [`CredentialSource`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum SourceError {
	/// The source could not be reached or answered with a transient failure.
	#[error("Credential source is unavailable: {message}.")]
	Unavailable {
		/// Human-readable failure payload.
		message: String,
	},
	/// The source refused the request outright.
	#[error("Credential source rejected the request: {message}.")]
	Rejected {
		/// Human-readable failure payload.
		message: String,
	},
}

/// In-process [`CredentialSource`] that fabricates credentials for tests and demos.
///
/// Failure injection flags make outage and slow-revocation paths reproducible.
#[derive(Debug, Default)]
pub struct FakeCredentialSource {
	counter: AtomicU64,
	fail_issue: AtomicBool,
	fail_revoke: AtomicBool,
	issued: Mutex<Vec<CredentialRef>>,
	revoked: Mutex<Vec<CredentialRef>>,
}
impl FakeCredentialSource {
	/// Makes subsequent issue calls fail with [`SourceError::Unavailable`].
	pub fn fail_issue(&self, fail: bool) {
		self.fail_issue.store(fail, Ordering::SeqCst);
	}

	/// Makes subsequent revoke calls fail with [`SourceError::Unavailable`].
	pub fn fail_revoke(&self, fail: bool) {
		self.fail_revoke.store(fail, Ordering::SeqCst);
	}

	/// References of every credential issued so far.
	pub fn issued(&self) -> Vec<CredentialRef> {
		self.issued.lock().clone()
	}

	/// References of every credential revoked so far.
	pub fn revoked(&self) -> Vec<CredentialRef> {
		self.revoked.lock().clone()
	}

	fn issue_now(&self, role: &CredentialRole) -> Result<Credential, SourceError> {
		if self.fail_issue.load(Ordering::SeqCst) {
			return Err(SourceError::Unavailable { message: "issue failure injected".into() });
		}

		let serial = self.counter.fetch_add(1, Ordering::SeqCst);
		let reference = CredentialRef::new(format!("fake-{}-{serial}", role.name));
		let credential = match role.kind {
			CredentialKind::StaticKey => Credential::static_key(
				reference.clone(),
				format!("AKFAKE{serial:08}"),
				format!("secret-{serial}"),
			),
			CredentialKind::SessionToken => Credential::session_token(
				reference.clone(),
				format!("ASFAKE{serial:08}"),
				format!("secret-{serial}"),
				format!("session-{serial}"),
			),
		};

		self.issued.lock().push(reference);

		Ok(credential)
	}

	fn revoke_now(&self, reference: &CredentialRef) -> Result<(), SourceError> {
		if self.fail_revoke.load(Ordering::SeqCst) {
			return Err(SourceError::Unavailable { message: "revoke failure injected".into() });
		}

		self.revoked.lock().push(reference.clone());

		Ok(())
	}
}
impl CredentialSource for FakeCredentialSource {
	fn issue_credential(&self, role: &CredentialRole, _ttl: Duration) -> SourceFuture<'_, Credential> {
		let result = self.issue_now(role);

		Box::pin(async move { result })
	}

	fn revoke_credential<'a>(&'a self, reference: &'a CredentialRef) -> SourceFuture<'a, ()> {
		let result = self.revoke_now(reference);

		Box::pin(async move { result })
	}
}
