//! Shared key-value store contract consumed by the cache, rotation store, and refresh lock.
//!
//! Every backend converts its transport and connection faults into
//! [`StoreError::Unavailable`]. The coordinator treats that outcome as "no shared
//! coordination right now" (cache miss, fail-open lock) instead of failing the caller.

pub mod memory;
#[cfg(feature = "redis")] pub mod redis;

pub use memory::MemoryStore;
#[cfg(feature = "redis")] pub use redis::RedisStore;

// self
use crate::{_prelude::*, auth::ProviderId};

/// Boxed future returned by [`SharedStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// External key-value store shared by every coordinator instance and process.
pub trait SharedStore
where
	Self: Send + Sync,
{
	/// Fetches the value stored under `key`, if any.
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

	/// Stores `value` under `key`, expiring after `ttl` when provided.
	fn set<'a>(&'a self, key: &'a str, value: &'a str, ttl: Option<Duration>)
	-> StoreFuture<'a, ()>;

	/// Stores `value` only when `key` is absent; returns `true` when the write happened.
	fn set_if_absent<'a>(
		&'a self,
		key: &'a str,
		value: &'a str,
		ttl: Duration,
	) -> StoreFuture<'a, bool>;

	/// Removes `key`.
	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;

	/// Establishes the backend connection ahead of the first operation.
	///
	/// Backends connect lazily anyway, so calling this is optional.
	fn connect(&self) -> StoreFuture<'_, ()> {
		Box::pin(async { Ok(()) })
	}

	/// Drops any held connection; later operations reconnect lazily.
	fn shutdown(&self) -> StoreFuture<'_, ()> {
		Box::pin(async { Ok(()) })
	}
}

/// Error type produced by [`SharedStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Backend unreachable or the command failed in transit.
	#[error("Store unavailable: {message}.")]
	Unavailable {
		/// Human-readable error payload.
		message: String,
	},
	/// Stored value could not be encoded or decoded.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
}
impl StoreError {
	/// Builds an [`StoreError::Unavailable`] from any displayable failure.
	pub fn unavailable(cause: impl Display) -> Self {
		Self::Unavailable { message: cause.to_string() }
	}

	/// Returns `true` for transport/connection outages.
	pub fn is_unavailable(&self) -> bool {
		matches!(self, Self::Unavailable { .. })
	}
}

/// Keys under which one provider's coordination state lives.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreKeys {
	/// Cached `{token, expiresAt}` access token record.
	pub access_token: String,
	/// Versioned refresh token record.
	pub refresh_token: String,
	/// Refresh lock holder.
	pub refresh_lock: String,
}
impl StoreKeys {
	/// Builds the key set namespaced by the provider identifier.
	pub fn for_provider(provider: &ProviderId) -> Self {
		Self {
			access_token: format!("{provider}:access_token"),
			refresh_token: format!("{provider}:refresh_token"),
			refresh_lock: format!("{provider}:refresh_lock"),
		}
	}
}
