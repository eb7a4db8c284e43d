//! Signing-key discovery: fetcher contract, built-in transports, and the key cache.

// crates.io
use jsonwebtoken::{Algorithm, DecodingKey, jwk::JwkSet};
// self
use crate::_prelude::*;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Boxed future returned by [`KeyFetcher::fetch_keys`].
pub type KeyFetchFuture<'a> = Pin<Box<dyn Future<Output = Result<JwkSet, KeyFetchError>> + 'a + Send>>;

/// Transport contract for retrieving an issuer's signing keys.
///
/// The verifier's only network dependency. Implementations fetch the JWKS
/// document behind the issuer's discovery endpoint; the verifier owns caching
/// and refresh policy.
pub trait KeyFetcher
where
	Self: Send + Sync,
{
	/// Fetches the current key set from the discovery endpoint.
	fn fetch_keys<'a>(&'a self, discovery: &'a Url) -> KeyFetchFuture<'a>;
}

/// Error type produced by [`KeyFetcher`] implementations.
#[derive(Debug, ThisError)]
pub enum KeyFetchError {
	/// The discovery endpoint could not be reached.
	#[error("Key discovery endpoint could not be reached.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The discovery endpoint returned an unparseable key set.
	#[error("Key discovery endpoint returned a malformed key set: {message}.")]
	Malformed {
		/// Human-readable failure payload.
		message: String,
	},
}
impl KeyFetchError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for KeyFetchError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// One usable verification key parsed out of a JWKS document.
#[derive(Clone)]
pub struct VerificationKey {
	/// Signing algorithm declared by the key.
	pub algorithm: Algorithm,
	/// Decoded verification material.
	pub decoding: DecodingKey,
}
impl Debug for VerificationKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("VerificationKey").field("algorithm", &self.algorithm).finish()
	}
}

struct KeyCacheEntry {
	kid: Option<String>,
	key: VerificationKey,
}

/// Per-`kid` cache over an issuer's verification keys.
///
/// Entries are rebuilt wholesale from each fetched JWKS document; staleness is
/// judged against the trust configuration's refresh ttl.
#[derive(Default)]
pub struct KeyCache {
	entries: Vec<KeyCacheEntry>,
	refreshed_at: Option<OffsetDateTime>,
}
impl KeyCache {
	/// Builds a cache from a fetched key set, skipping unusable entries.
	pub fn from_jwks(set: &JwkSet, refreshed_at: OffsetDateTime) -> Self {
		let entries = set
			.keys
			.iter()
			.filter_map(|jwk| {
				let algorithm =
					Algorithm::from_str(&jwk.common.key_algorithm?.to_string()).ok()?;
				let decoding = DecodingKey::from_jwk(jwk).ok()?;

				Some(KeyCacheEntry {
					kid: jwk.common.key_id.clone(),
					key: VerificationKey { algorithm, decoding },
				})
			})
			.collect();

		Self { entries, refreshed_at: Some(refreshed_at) }
	}

	/// Looks up a key by id; tokens without a `kid` fall back to the first key.
	pub fn lookup(&self, kid: Option<&str>) -> Option<&VerificationKey> {
		match kid {
			Some(kid) => self
				.entries
				.iter()
				.find(|entry| entry.kid.as_deref() == Some(kid))
				.map(|entry| &entry.key),
			None => self.entries.first().map(|entry| &entry.key),
		}
	}

	/// Returns true if the cache has never been populated or its ttl elapsed.
	pub fn is_stale(&self, now: OffsetDateTime, ttl: Duration) -> bool {
		match self.refreshed_at {
			None => true,
			Some(refreshed_at) => now - refreshed_at >= ttl,
		}
	}

	/// Number of usable cached keys.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Returns true if no usable keys are cached.
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}
impl Debug for KeyCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("KeyCache")
			.field("keys", &self.entries.len())
			.field("refreshed_at", &self.refreshed_at)
			.finish()
	}
}

/// [`KeyFetcher`] serving a fixed, swappable key set; used by tests and air-gapped setups.
#[derive(Debug)]
pub struct StaticKeyFetcher {
	keys: RwLock<JwkSet>,
	fetches: std::sync::atomic::AtomicU64,
}
impl StaticKeyFetcher {
	/// Creates a fetcher serving the provided key set.
	pub fn new(keys: JwkSet) -> Self {
		Self { keys: RwLock::new(keys), fetches: Default::default() }
	}

	/// Replaces the served key set, emulating issuer-side key rotation.
	pub fn set_keys(&self, keys: JwkSet) {
		*self.keys.write() = keys;
	}

	/// Number of fetches performed so far.
	pub fn fetch_count(&self) -> u64 {
		self.fetches.load(std::sync::atomic::Ordering::SeqCst)
	}
}
impl KeyFetcher for StaticKeyFetcher {
	fn fetch_keys<'a>(&'a self, _: &'a Url) -> KeyFetchFuture<'a> {
		self.fetches.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

		let keys = self.keys.read().clone();

		Box::pin(async move { Ok(keys) })
	}
}

#[cfg(feature = "reqwest")]
/// [`KeyFetcher`] backed by the crate's default reqwest transport.
#[derive(Clone, Debug, Default)]
pub struct ReqwestKeyFetcher {
	client: ReqwestClient,
}
#[cfg(feature = "reqwest")]
impl ReqwestKeyFetcher {
	/// Creates a fetcher reusing the caller-provided reqwest client.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self { client }
	}
}
#[cfg(feature = "reqwest")]
impl KeyFetcher for ReqwestKeyFetcher {
	fn fetch_keys<'a>(&'a self, discovery: &'a Url) -> KeyFetchFuture<'a> {
		Box::pin(async move {
			let response = self
				.client
				.get(discovery.clone())
				.send()
				.await
				.and_then(|response| response.error_for_status())?;

			response
				.json::<JwkSet>()
				.await
				.map_err(|e| KeyFetchError::Malformed { message: e.to_string() })
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::_preludet::test_jwks;

	#[test]
	fn cache_builds_and_looks_up_by_kid() {
		let now = macros::datetime!(2026-01-01 00:00 UTC);
		let cache = KeyCache::from_jwks(&test_jwks("test-key"), now);

		assert_eq!(cache.len(), 1);
		assert!(cache.lookup(Some("test-key")).is_some());
		assert!(cache.lookup(Some("unknown")).is_none());
		assert!(cache.lookup(None).is_some(), "Tokens without a kid fall back to the first key.");
	}

	#[test]
	fn staleness_follows_the_refresh_ttl() {
		let populated_at = macros::datetime!(2026-01-01 00:00 UTC);
		let cache = KeyCache::from_jwks(&test_jwks("test-key"), populated_at);
		let ttl = Duration::hours(24);

		assert!(KeyCache::default().is_stale(populated_at, ttl));
		assert!(!cache.is_stale(populated_at + Duration::hours(23), ttl));
		assert!(cache.is_stale(populated_at + Duration::hours(24), ttl));
	}

	#[tokio::test]
	async fn static_fetcher_counts_fetches_and_rotates() {
		let fetcher = StaticKeyFetcher::new(test_jwks("test-key"));
		let url = Url::parse("https://issuer.example.com/.well-known/jwks")
			.expect("Discovery URL fixture should parse.");
		let set = fetcher.fetch_keys(&url).await.expect("Static fetch should succeed.");

		assert_eq!(set.keys.len(), 1);
		assert_eq!(fetcher.fetch_count(), 1);

		fetcher.set_keys(test_jwks("rotated-key"));

		let rotated = fetcher.fetch_keys(&url).await.expect("Rotated fetch should succeed.");
		let now = OffsetDateTime::now_utc();
		let cache = KeyCache::from_jwks(&rotated, now);

		assert!(cache.lookup(Some("rotated-key")).is_some());
		assert_eq!(fetcher.fetch_count(), 2);
	}
}
