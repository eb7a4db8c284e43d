//! Identity-token verification against a trusted issuer's published keys.

pub mod jwks;

pub use jwks::*;

// crates.io
use jsonwebtoken::{TokenData, Validation, errors::ErrorKind};
use serde_json::Value;
// self
use crate::{_prelude::*, auth::ClaimSet, error::ConfigError};

/// Trust anchor for one recognized issuer.
///
/// Loaded at startup and hot-reloadable; one per issuer the broker accepts
/// tokens from.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrustConfig {
	/// JWKS discovery endpoint publishing the issuer's signing keys.
	pub discovery_url: Url,
	/// Issuer URI every accepted token must carry.
	pub bound_issuer: String,
	/// Audiences the broker accepts tokens for.
	pub accepted_audiences: Vec<String>,
	/// Refresh ttl for cached signing keys.
	#[serde(with = "crate::config::secs", default = "default_key_cache_ttl")]
	pub key_cache_ttl: Duration,
	/// Clock-skew tolerance applied to expiry and not-before checks.
	#[serde(with = "crate::config::secs", default = "default_clock_skew")]
	pub clock_skew: Duration,
}
impl TrustConfig {
	/// Default signing-key refresh ttl.
	pub const DEFAULT_KEY_CACHE_TTL: Duration = Duration::hours(24);
	/// Default clock-skew tolerance.
	pub const DEFAULT_CLOCK_SKEW: Duration = Duration::seconds(60);

	/// Creates a trust anchor with default cache ttl and clock skew.
	pub fn new<I, S>(discovery_url: Url, bound_issuer: impl Into<String>, accepted_audiences: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			discovery_url,
			bound_issuer: bound_issuer.into(),
			accepted_audiences: accepted_audiences.into_iter().map(Into::into).collect(),
			key_cache_ttl: Self::DEFAULT_KEY_CACHE_TTL,
			clock_skew: Self::DEFAULT_CLOCK_SKEW,
		}
	}

	/// Overrides the signing-key refresh ttl.
	pub fn with_key_cache_ttl(mut self, ttl: Duration) -> Self {
		self.key_cache_ttl = ttl;

		self
	}

	/// Overrides the clock-skew tolerance.
	pub fn with_clock_skew(mut self, skew: Duration) -> Self {
		self.clock_skew = skew;

		self
	}

	/// Fails fast on an unusable trust anchor.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.bound_issuer.is_empty() {
			return Err(ConfigError::EmptyIssuer);
		}
		if self.accepted_audiences.is_empty() {
			return Err(ConfigError::EmptyAudiences);
		}

		Ok(())
	}
}

fn default_key_cache_ttl() -> Duration {
	TrustConfig::DEFAULT_KEY_CACHE_TTL
}

fn default_clock_skew() -> Duration {
	TrustConfig::DEFAULT_CLOCK_SKEW
}

/// Validates incoming identity tokens against one trust anchor.
///
/// Signing keys are cached per `kid` and refreshed lazily: on ttl expiry, or at
/// most once per verification when a token references an unknown key id.
/// Failures surface as [`Error::AuthenticationFailed`] naming only the failing
/// stage; they are never retried internally.
pub struct TokenVerifier<F>
where
	F: ?Sized + KeyFetcher,
{
	trust: TrustConfig,
	fetcher: Arc<F>,
	cache: RwLock<KeyCache>,
}
impl<F> TokenVerifier<F>
where
	F: ?Sized + KeyFetcher,
{
	/// Creates a verifier over the provided trust anchor and key transport.
	pub fn new(trust: TrustConfig, fetcher: impl Into<Arc<F>>) -> Self {
		Self { trust, fetcher: fetcher.into(), cache: RwLock::new(KeyCache::default()) }
	}

	/// Trust anchor this verifier enforces.
	pub fn trust(&self) -> &TrustConfig {
		&self.trust
	}

	/// Verifies a token and returns its flattened claims.
	///
	/// Rejects on invalid signature, issuer mismatch, audience not in
	/// `expected_audiences`, expiry, and not-yet-valid tokens (with the
	/// configured clock-skew tolerance). The only side effect is key-cache
	/// population.
	pub async fn verify(&self, token: &str, expected_audiences: &[String]) -> Result<ClaimSet> {
		let header = jsonwebtoken::decode_header(token)
			.map_err(|_| Error::AuthenticationFailed { stage: "malformed" })?;
		let kid = header.kid;
		let now = OffsetDateTime::now_utc();
		let mut refreshed_this_call = false;

		if self.cache.read().is_stale(now, self.trust.key_cache_ttl) {
			self.refresh_keys(now).await?;

			refreshed_this_call = true;
		}

		let mut key = self.cache.read().lookup(kid.as_deref()).cloned();

		// One forced refresh per request covers issuer-side key rotation without
		// letting unverified tokens amplify discovery traffic.
		if key.is_none() && !refreshed_this_call {
			self.refresh_keys(now).await?;

			key = self.cache.read().lookup(kid.as_deref()).cloned();
		}

		let Some(key) = key else {
			return Err(Error::AuthenticationFailed { stage: "unknown_key" });
		};
		let mut validation = Validation::new(key.algorithm);

		validation.set_audience(expected_audiences);
		validation.set_issuer(&[self.trust.bound_issuer.as_str()]);
		validation.set_required_spec_claims(&["exp", "aud", "iss"]);
		validation.leeway = self.trust.clock_skew.whole_seconds().max(0) as u64;
		validation.validate_nbf = true;

		let data: TokenData<Value> =
			jsonwebtoken::decode(token, &key.decoding, &validation).map_err(map_jwt_error)?;

		ClaimSet::from_value(&data.claims)
			.map_err(|_| Error::AuthenticationFailed { stage: "malformed" })
	}

	async fn refresh_keys(&self, now: OffsetDateTime) -> Result<()> {
		let keys = self
			.fetcher
			.fetch_keys(&self.trust.discovery_url)
			.await
			.map_err(|_| Error::AuthenticationFailed { stage: "key_fetch" })?;

		*self.cache.write() = KeyCache::from_jwks(&keys, now);

		Ok(())
	}
}
impl<F> Debug for TokenVerifier<F>
where
	F: ?Sized + KeyFetcher,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenVerifier")
			.field("issuer", &self.trust.bound_issuer)
			.field("cache", &*self.cache.read())
			.finish()
	}
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> Error {
	let stage = match err.kind() {
		ErrorKind::InvalidSignature
		| ErrorKind::InvalidAlgorithm
		| ErrorKind::InvalidAlgorithmName => "signature",
		ErrorKind::ExpiredSignature => "expired",
		ErrorKind::ImmatureSignature => "not_yet_valid",
		ErrorKind::InvalidAudience => "audience",
		ErrorKind::InvalidIssuer => "issuer",
		ErrorKind::MissingRequiredClaim(name) => match name.as_str() {
			"aud" => "audience",
			"iss" => "issuer",
			_ => "malformed",
		},
		_ => "malformed",
	};

	Error::AuthenticationFailed { stage }
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::_preludet::{
		TEST_AUDIENCE, TEST_ISSUER, sign_test_token, sign_test_token_with_kid, test_claims,
		test_jwks, test_trust_config,
	};

	fn verifier() -> (TokenVerifier<StaticKeyFetcher>, Arc<StaticKeyFetcher>) {
		let fetcher = Arc::new(StaticKeyFetcher::new(test_jwks("test-key")));

		(TokenVerifier::new(test_trust_config(), fetcher.clone()), fetcher)
	}

	fn audiences() -> Vec<String> {
		vec![TEST_AUDIENCE.into()]
	}

	fn assert_stage(result: Result<ClaimSet>, expected: &'static str) {
		match result {
			Err(Error::AuthenticationFailed { stage }) => assert_eq!(stage, expected),
			other => panic!("Expected an authentication failure, got {other:?}."),
		}
	}

	#[tokio::test]
	async fn valid_tokens_return_flattened_claims() {
		let (verifier, _) = verifier();
		let token = sign_test_token(&test_claims());
		let claims = verifier
			.verify(&token, &audiences())
			.await
			.expect("A freshly signed token should verify.");

		assert_eq!(claims.issuer(), TEST_ISSUER);
		assert!(claims.claim("repository").is_some());
	}

	#[tokio::test]
	async fn expired_tokens_are_rejected_in_the_expiry_stage() {
		let (verifier, _) = verifier();
		let now = OffsetDateTime::now_utc().unix_timestamp();
		let mut claims = test_claims();

		claims["iat"] = json!(now - 7_200);
		claims["exp"] = json!(now - 3_600);

		assert_stage(verifier.verify(&sign_test_token(&claims), &audiences()).await, "expired");
	}

	#[tokio::test]
	async fn audience_and_issuer_mismatches_name_their_stages() {
		let (verifier, _) = verifier();
		let mut claims = test_claims();

		claims["aud"] = json!(["https://somewhere-else.example.com"]);

		assert_stage(verifier.verify(&sign_test_token(&claims), &audiences()).await, "audience");

		let mut claims = test_claims();

		claims["iss"] = json!("https://rogue-issuer.example.com");

		assert_stage(verifier.verify(&sign_test_token(&claims), &audiences()).await, "issuer");
	}

	#[tokio::test]
	async fn garbage_tokens_are_malformed() {
		let (verifier, _) = verifier();

		assert_stage(verifier.verify("not-a-jwt", &audiences()).await, "malformed");
	}

	#[tokio::test]
	async fn unknown_kid_triggers_exactly_one_forced_refresh() {
		let (verifier, fetcher) = verifier();

		// Warm the cache.
		verifier
			.verify(&sign_test_token(&test_claims()), &audiences())
			.await
			.expect("Warm-up verification should succeed.");

		let warm_fetches = fetcher.fetch_count();

		// Rotate issuer-side keys, then present a token signed under the new kid.
		fetcher.set_keys(test_jwks("rotated-key"));

		let rotated = sign_test_token_with_kid(&test_claims(), "rotated-key");

		verifier
			.verify(&rotated, &audiences())
			.await
			.expect("Verification should recover after a key rotation.");
		assert_eq!(fetcher.fetch_count(), warm_fetches + 1);

		// A kid that never appears still refreshes at most once.
		let missing = sign_test_token_with_kid(&test_claims(), "never-published");

		assert_stage(verifier.verify(&missing, &audiences()).await, "unknown_key");
		assert_eq!(fetcher.fetch_count(), warm_fetches + 2);
	}

	#[tokio::test]
	async fn not_yet_valid_tokens_respect_clock_skew() {
		let (verifier, _) = verifier();
		let now = OffsetDateTime::now_utc().unix_timestamp();
		let mut claims = test_claims();

		// Ten minutes in the future is far outside the 60s default leeway.
		claims["nbf"] = json!(now + 600);

		assert_stage(
			verifier.verify(&sign_test_token(&claims), &audiences()).await,
			"not_yet_valid",
		);

		let mut claims = test_claims();

		// Thirty seconds of skew must be tolerated.
		claims["nbf"] = json!(now + 30);
		verifier
			.verify(&sign_test_token(&claims), &audiences())
			.await
			.expect("A token inside the skew window should verify.");
	}

	#[test]
	fn trust_config_validation_rejects_empty_anchors() {
		let mut trust = test_trust_config();

		trust.accepted_audiences.clear();

		assert!(matches!(trust.validate(), Err(ConfigError::EmptyAudiences)));

		let mut trust = test_trust_config();

		trust.bound_issuer.clear();

		assert!(matches!(trust.validate(), Err(ConfigError::EmptyIssuer)));
	}
}
