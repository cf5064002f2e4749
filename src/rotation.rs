//! Versioned refresh token persistence.

// self
use crate::{
	_prelude::*,
	auth::{RefreshToken, TokenSecret},
	lock::RefreshLease,
	obs,
	store::{SharedStore, StoreError},
};

/// Shared home of the current single-use refresh token.
///
/// Reads are open to anyone; writes require a [`RefreshLease`], so a new version can only
/// be recorded by whoever currently holds the refresh lock.
#[derive(Clone)]
pub struct RefreshTokenStore {
	store: Arc<dyn SharedStore>,
	key: String,
}
impl RefreshTokenStore {
	/// Creates a store bound to `key`.
	pub fn new(store: Arc<dyn SharedStore>, key: impl Into<String>) -> Self {
		Self { store, key: key.into() }
	}

	/// Key the record lives under.
	pub fn key(&self) -> &str {
		&self.key
	}

	/// Loads the current record; store faults and undecodable values read as absent.
	pub async fn read(&self) -> Option<RefreshToken> {
		let raw = match self.store.get(&self.key).await {
			Ok(raw) => raw?,
			Err(e) => {
				obs::store_degraded("refresh_read", &self.key, &e);

				return None;
			},
		};

		RefreshToken::decode(&raw)
			.inspect_err(|e| obs::store_degraded("refresh_decode", &self.key, e))
			.ok()
	}

	/// Records `token` as the successor of the stored version.
	///
	/// The new record carries one more than the higher of the stored version and
	/// `previous.version`; `previous` is ahead when an earlier write never reached the store.
	/// The record is returned even when the write fails so the caller can keep it in
	/// process memory.
	pub async fn write(
		&self,
		_lease: &RefreshLease,
		token: TokenSecret,
		previous: &RefreshToken,
	) -> Result<RefreshToken, (RefreshToken, StoreError)> {
		let base = self
			.read()
			.await
			.map_or(previous.version, |stored| stored.version.max(previous.version));
		let record = RefreshToken::rotated(token, base, OffsetDateTime::now_utc());
		let encoded = match record.encode() {
			Ok(encoded) => encoded,
			Err(e) => return Err((record, e)),
		};

		match self.store.set(&self.key, &encoded, None).await {
			Ok(()) => Ok(record),
			Err(e) => {
				obs::store_degraded("refresh_write", &self.key, &e);

				Err((record, e))
			},
		}
	}
}
impl Debug for RefreshTokenStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshTokenStore").field("key", &self.key).finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		auth::LockOwnerId,
		lock::{LockAttempt, RefreshLock},
		store::MemoryStore,
	};

	struct Fixture {
		backend: Arc<MemoryStore>,
		tokens: RefreshTokenStore,
		lease: RefreshLease,
	}

	async fn fixture() -> Fixture {
		let backend = Arc::new(MemoryStore::default());
		let shared: Arc<dyn SharedStore> = backend.clone();
		let lock = RefreshLock::new(shared.clone(), "whoop:refresh_lock", Duration::seconds(10));
		let lease = match lock.acquire(LockOwnerId::generate()).await {
			LockAttempt::Acquired(lease) => lease,
			LockAttempt::Busy => panic!("Fresh lock should be free."),
		};

		Fixture { backend, tokens: RefreshTokenStore::new(shared, "whoop:refresh_token"), lease }
	}

	#[tokio::test]
	async fn legacy_values_read_as_version_zero() {
		let Fixture { backend, tokens, .. } = fixture().await;

		backend.set(tokens.key(), "plain-refresh", None).await.expect("Seed should succeed.");

		let record = tokens.read().await.expect("Legacy value should decode.");

		assert_eq!(record.expose(), "plain-refresh");
		assert_eq!(record.version, 0);
	}

	#[tokio::test]
	async fn writes_increment_the_stored_version() {
		let Fixture { tokens, lease, .. } = fixture().await;
		let bootstrap = RefreshToken::legacy("rt-0");
		let first = tokens
			.write(&lease, "rt-1".into(), &bootstrap)
			.await
			.expect("First write should succeed.");

		assert_eq!(first.version, 1);

		let second =
			tokens.write(&lease, "rt-2".into(), &first).await.expect("Second write should succeed.");
		let stored = tokens.read().await.expect("Record should be readable.");

		assert_eq!(second.version, 2);
		assert_eq!(stored, second);
	}

	#[tokio::test]
	async fn stored_version_wins_over_a_stale_previous_record() {
		let Fixture { backend, tokens, lease } = fixture().await;
		let newer = RefreshToken::rotated("rt-7", 6, OffsetDateTime::now_utc());

		backend
			.set(tokens.key(), &newer.encode().expect("Encode should succeed."), None)
			.await
			.expect("Seed should succeed.");

		let written = tokens
			.write(&lease, "rt-8".into(), &RefreshToken::legacy("rt-0"))
			.await
			.expect("Write should succeed.");

		assert_eq!(written.version, 8);
	}

	#[tokio::test]
	async fn unpersisted_previous_record_outranks_the_stored_one() {
		let Fixture { backend, tokens, lease } = fixture().await;

		backend.set(tokens.key(), "rt-0", None).await.expect("Seed should succeed.");

		let kept_locally = RefreshToken::rotated("rt-1", 0, OffsetDateTime::now_utc());
		let written = tokens
			.write(&lease, "rt-2".into(), &kept_locally)
			.await
			.expect("Write should succeed.");

		assert_eq!(written.version, 2);
	}
}
