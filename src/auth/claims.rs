//! Flattened, read-only claim sets produced by token verification.

// std
use std::{collections::BTreeMap, sync::OnceLock};
// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use serde_json::Value;
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// Error raised while flattening a decoded token payload into a [`ClaimSet`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ClaimError {
	/// The token payload was not a JSON object.
	#[error("Token payload is not an object.")]
	NotAnObject,
	/// A registered claim required by the broker is missing or malformed.
	#[error("Token payload is missing the `{name}` claim.")]
	MissingClaim {
		/// Registered claim name.
		name: &'static str,
	},
}

/// A single claim value: a scalar or a list of scalars.
///
/// Non-string scalars (numbers, booleans) are stringified during flattening so
/// bound-claim patterns always compare text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaimValue {
	/// Single scalar claim.
	One(String),
	/// List-valued claim.
	Many(Vec<String>),
}
impl ClaimValue {
	/// Returns true if any element of the value satisfies the predicate.
	pub fn any<P>(&self, predicate: P) -> bool
	where
		P: Fn(&str) -> bool,
	{
		match self {
			Self::One(value) => predicate(value),
			Self::Many(values) => values.iter().any(|value| predicate(value)),
		}
	}

	/// Returns the scalar value, if the claim is single-valued.
	pub fn as_scalar(&self) -> Option<&str> {
		match self {
			Self::One(value) => Some(value),
			Self::Many(_) => None,
		}
	}
}

/// Immutable, flattened view over a verified token's claims.
///
/// Nested objects are flattened with `/`-joined keys; arrays of scalars become
/// list values. The set is never persisted beyond the exchange that produced it.
#[derive(Clone, Debug)]
pub struct ClaimSet {
	issuer: String,
	subject: Option<String>,
	audiences: Vec<String>,
	issued_at: Option<OffsetDateTime>,
	expires_at: OffsetDateTime,
	claims: BTreeMap<String, ClaimValue>,
	fingerprint_cache: OnceLock<String>,
}
impl ClaimSet {
	/// Flattens a decoded token payload.
	///
	/// The caller is responsible for having validated the signature, issuer,
	/// audience, and time window beforehand; this constructor only shapes data.
	pub fn from_value(payload: &Value) -> Result<Self, ClaimError> {
		let object = payload.as_object().ok_or(ClaimError::NotAnObject)?;
		let issuer = object
			.get("iss")
			.and_then(Value::as_str)
			.ok_or(ClaimError::MissingClaim { name: "iss" })?
			.to_owned();
		let subject = object.get("sub").and_then(Value::as_str).map(str::to_owned);
		let audiences = match object.get("aud") {
			Some(Value::String(audience)) => vec![audience.clone()],
			Some(Value::Array(values)) =>
				values.iter().filter_map(Value::as_str).map(str::to_owned).collect(),
			_ => Vec::new(),
		};
		let issued_at = object
			.get("iat")
			.and_then(Value::as_i64)
			.and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok());
		let expires_at = object
			.get("exp")
			.and_then(Value::as_i64)
			.and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok())
			.ok_or(ClaimError::MissingClaim { name: "exp" })?;
		let mut claims = BTreeMap::new();

		for (name, value) in object {
			flatten_into(&mut claims, name, value);
		}

		Ok(Self {
			issuer,
			subject,
			audiences,
			issued_at,
			expires_at,
			claims,
			fingerprint_cache: OnceLock::new(),
		})
	}

	/// Issuer URI recorded in the token.
	pub fn issuer(&self) -> &str {
		&self.issuer
	}

	/// Subject claim, if present.
	pub fn subject(&self) -> Option<&str> {
		self.subject.as_deref()
	}

	/// Audience list recorded in the token.
	pub fn audiences(&self) -> &[String] {
		&self.audiences
	}

	/// Issued-at instant, if the token carried one.
	pub fn issued_at(&self) -> Option<OffsetDateTime> {
		self.issued_at
	}

	/// Expiry instant of the token.
	pub fn expires_at(&self) -> OffsetDateTime {
		self.expires_at
	}

	/// Looks up a flattened claim by name.
	pub fn claim(&self, name: &str) -> Option<&ClaimValue> {
		self.claims.get(name)
	}

	/// Number of flattened claims.
	pub fn len(&self) -> usize {
		self.claims.len()
	}

	/// Returns true if the set holds no claims.
	pub fn is_empty(&self) -> bool {
		self.claims.is_empty()
	}

	/// Stable digest over the flattened claims, safe to emit into audit streams.
	///
	/// Base64 (no padding) SHA-256 of the canonical `name=values` lines; cached
	/// after the first calculation.
	pub fn fingerprint(&self) -> String {
		self.fingerprint_cache.get_or_init(|| compute_fingerprint(&self.claims)).clone()
	}
}

fn flatten_into(claims: &mut BTreeMap<String, ClaimValue>, name: &str, value: &Value) {
	match value {
		Value::Null => {},
		Value::Object(nested) =>
			for (child, child_value) in nested {
				flatten_into(claims, &format!("{name}/{child}"), child_value);
			},
		Value::Array(values) => {
			let flattened =
				values.iter().filter_map(scalar_to_string).collect::<Vec<_>>();

			claims.insert(name.to_owned(), ClaimValue::Many(flattened));
		},
		scalar =>
			if let Some(text) = scalar_to_string(scalar) {
				claims.insert(name.to_owned(), ClaimValue::One(text));
			},
	}
}

fn scalar_to_string(value: &Value) -> Option<String> {
	match value {
		Value::String(text) => Some(text.clone()),
		Value::Number(number) => Some(number.to_string()),
		Value::Bool(flag) => Some(flag.to_string()),
		_ => None,
	}
}

fn compute_fingerprint(claims: &BTreeMap<String, ClaimValue>) -> String {
	let mut hasher = Sha256::new();

	for (name, value) in claims {
		hasher.update(name.as_bytes());
		hasher.update(b"=");

		match value {
			ClaimValue::One(scalar) => hasher.update(scalar.as_bytes()),
			ClaimValue::Many(values) =>
				for (idx, entry) in values.iter().enumerate() {
					if idx > 0 {
						hasher.update(b",");
					}

					hasher.update(entry.as_bytes());
				},
		}

		hasher.update(b"\n");
	}

	STANDARD_NO_PAD.encode(hasher.finalize())
}
