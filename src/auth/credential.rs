//! Credential shapes returned to callers, with redaction for sensitive material.

// self
use crate::_prelude::*;

/// Redacted credential secret wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSecret(String);
impl CredentialSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner secret value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for CredentialSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for CredentialSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("CredentialSecret").field(&"<redacted>").finish()
	}
}
impl Display for CredentialSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Opaque reference the credential source uses to invalidate an issued credential.
///
/// Not a secret; safe to persist in lease records and audit events.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialRef(String);
impl CredentialRef {
	/// Wraps a source-supplied reference string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}
}
impl AsRef<str> for CredentialRef {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Display for CredentialRef {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Issuance style a credential role requests from the source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
	/// Service-account-key style credential: key id + secret.
	StaticKey,
	/// Assumed-role style credential: key id + secret + session token.
	SessionToken,
}
impl CredentialKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CredentialKind::StaticKey => "static_key",
			CredentialKind::SessionToken => "session_token",
		}
	}
}
impl Display for CredentialKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Short-lived credential minted by the downstream source.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
	/// Source-side reference used for revocation.
	pub reference: CredentialRef,
	/// Public key identifier component.
	pub access_key_id: String,
	/// Secret component; callers must avoid logging it.
	pub secret: CredentialSecret,
	/// Session token for assumed-role style credentials.
	pub session_token: Option<CredentialSecret>,
}
impl Credential {
	/// Builds a static-key style credential.
	pub fn static_key(
		reference: CredentialRef,
		access_key_id: impl Into<String>,
		secret: impl Into<String>,
	) -> Self {
		Self {
			reference,
			access_key_id: access_key_id.into(),
			secret: CredentialSecret::new(secret),
			session_token: None,
		}
	}

	/// Builds a session-token style credential.
	pub fn session_token(
		reference: CredentialRef,
		access_key_id: impl Into<String>,
		secret: impl Into<String>,
		session_token: impl Into<String>,
	) -> Self {
		Self {
			reference,
			access_key_id: access_key_id.into(),
			secret: CredentialSecret::new(secret),
			session_token: Some(CredentialSecret::new(session_token)),
		}
	}

	/// Returns the issuance style of this credential.
	pub fn kind(&self) -> CredentialKind {
		if self.session_token.is_some() {
			CredentialKind::SessionToken
		} else {
			CredentialKind::StaticKey
		}
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("reference", &self.reference)
			.field("access_key_id", &self.access_key_id)
			.field("secret", &"<redacted>")
			.field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
			.finish()
	}
}
