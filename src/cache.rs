//! Shared access token cache with safety-margin-aware expiry.

// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	obs,
	store::{SharedStore, StoreError},
};

/// Access token cache shared by every process that points at the same store.
///
/// Entries are written with a store-side TTL of `floor(expires_at - now) - margin` seconds,
/// so the store evicts a token once it enters its safety margin. Reads re-check freshness
/// against the local clock anyway. Store faults never escape: a failed read is a miss
/// and a failed write only loses sharing.
#[derive(Clone)]
pub struct AccessTokenCache {
	store: Arc<dyn SharedStore>,
	key: String,
	margin: Duration,
}
impl AccessTokenCache {
	/// Creates a cache bound to `key`.
	pub fn new(store: Arc<dyn SharedStore>, key: impl Into<String>, margin: Duration) -> Self {
		Self { store, key: key.into(), margin }
	}

	/// Key the cache reads and writes.
	pub fn key(&self) -> &str {
		&self.key
	}

	/// Returns the cached token when it is still fresh at `now`.
	pub async fn read(&self, now: OffsetDateTime) -> Option<AccessToken> {
		let raw = match self.store.get(&self.key).await {
			Ok(raw) => raw?,
			Err(e) => {
				obs::store_degraded("cache_read", &self.key, &e);

				return None;
			},
		};

		match serde_json::from_str::<AccessToken>(&raw) {
			Ok(token) if token.is_fresh_at(now, self.margin) => Some(token),
			Ok(_) => None,
			Err(e) => {
				let err = StoreError::Serialization { message: e.to_string() };

				obs::store_degraded("cache_decode", &self.key, &err);

				None
			},
		}
	}

	/// Stores `token` for as long as it stays outside the margin.
	///
	/// Returns `false` when nothing was written, either because the token is already too
	/// close to expiry or because the store rejected the write.
	pub async fn write(&self, token: &AccessToken, now: OffsetDateTime) -> bool {
		let Some(ttl) = token.cache_ttl_at(now, self.margin) else {
			return false;
		};
		let encoded = match serde_json::to_string(token) {
			Ok(encoded) => encoded,
			Err(e) => {
				let err = StoreError::Serialization { message: e.to_string() };

				obs::store_degraded("cache_encode", &self.key, &err);

				return false;
			},
		};

		match self.store.set(&self.key, &encoded, Some(ttl)).await {
			Ok(()) => true,
			Err(e) => {
				obs::store_degraded("cache_write", &self.key, &e);

				false
			},
		}
	}

	/// Removes the cached token.
	pub async fn invalidate(&self) {
		if let Err(e) = self.store.delete(&self.key).await {
			obs::store_degraded("cache_invalidate", &self.key, &e);
		}
	}
}
impl Debug for AccessTokenCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessTokenCache")
			.field("key", &self.key)
			.field("margin", &self.margin)
			.finish()
	}
}
