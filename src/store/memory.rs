//! Thread-safe in-memory [`SharedStore`] for single-process deployments and tests.

// self
use crate::{
	_prelude::*,
	store::{SharedStore, StoreError, StoreFuture},
};

type StoreMap = Arc<RwLock<HashMap<String, Entry>>>;

#[derive(Clone, Debug)]
struct Entry {
	value: String,
	expires_at: Option<OffsetDateTime>,
}
impl Entry {
	/// A TTL reaching past the representable range never expires.
	fn new(value: &str, ttl: Option<Duration>, now: OffsetDateTime) -> Self {
		Self { value: value.to_owned(), expires_at: ttl.and_then(|ttl| now.checked_add(ttl)) }
	}

	fn is_live_at(&self, now: OffsetDateTime) -> bool {
		self.expires_at.is_none_or(|expires_at| now < expires_at)
	}
}

/// Process-local store honoring TTLs; the degraded mode used when no shared store is configured.
///
/// Clones share the same map, so several coordinators built from clones coordinate exactly
/// like processes sharing one external store.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Returns the number of live entries.
	pub fn len(&self) -> usize {
		let now = OffsetDateTime::now_utc();

		self.0.read().values().filter(|entry| entry.is_live_at(now)).count()
	}

	/// Returns `true` when no live entries remain.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn get_now(map: &StoreMap, key: &str) -> Option<String> {
		let now = OffsetDateTime::now_utc();

		map.read().get(key).filter(|entry| entry.is_live_at(now)).map(|entry| entry.value.clone())
	}

	fn set_now(map: &StoreMap, key: &str, value: &str, ttl: Option<Duration>) {
		let now = OffsetDateTime::now_utc();

		map.write().insert(key.to_owned(), Entry::new(value, ttl, now));
	}

	fn set_if_absent_now(map: &StoreMap, key: &str, value: &str, ttl: Duration) -> bool {
		let now = OffsetDateTime::now_utc();
		let mut guard = map.write();

		if guard.get(key).is_some_and(|entry| entry.is_live_at(now)) {
			return false;
		}

		guard.insert(key.to_owned(), Entry::new(value, Some(ttl), now));

		true
	}
}
impl SharedStore for MemoryStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		Box::pin(async move { Ok(Self::get_now(&self.0, key)) })
	}

	fn set<'a>(
		&'a self,
		key: &'a str,
		value: &'a str,
		ttl: Option<Duration>,
	) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			if ttl.is_some_and(|ttl| !ttl.is_positive()) {
				return Err(StoreError::Serialization {
					message: format!("Refusing to store `{key}` with a non-positive TTL"),
				});
			}

			Self::set_now(&self.0, key, value, ttl);

			Ok(())
		})
	}

	fn set_if_absent<'a>(
		&'a self,
		key: &'a str,
		value: &'a str,
		ttl: Duration,
	) -> StoreFuture<'a, bool> {
		Box::pin(async move { Ok(Self::set_if_absent_now(&self.0, key, value, ttl)) })
	}

	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.0.write().remove(key);

			Ok(())
		})
	}
}
