//! Cross-process refresh lock built on `set_if_absent` with a TTL.

// self
use crate::{_prelude::*, auth::LockOwnerId, obs, store::SharedStore};

/// Proof that the caller may spend the current refresh token.
///
/// Only [`RefreshLock::acquire`] can mint a lease, and the refresh token store demands one
/// for every write, so rotation can only happen inside the critical section.
#[derive(Debug)]
pub struct RefreshLease {
	owner: LockOwnerId,
	coordinated: bool,
}
impl RefreshLease {
	/// `false` when the lease was granted without coordination because the store was down.
	pub fn is_coordinated(&self) -> bool {
		self.coordinated
	}
}

/// Outcome of one acquisition attempt.
#[derive(Debug)]
pub enum LockAttempt {
	/// The caller holds the lock (or the store is down and the grant is fail-open).
	Acquired(RefreshLease),
	/// Another owner holds the lock.
	Busy,
}

/// Refresh lock for one provider key.
///
/// The TTL bounds how long a crashed holder can block everyone else, so it must exceed
/// one token endpoint round trip plus the store writes that follow it.
#[derive(Clone)]
pub struct RefreshLock {
	store: Arc<dyn SharedStore>,
	key: String,
	ttl: Duration,
}
impl RefreshLock {
	/// Creates a lock bound to `key`.
	pub fn new(store: Arc<dyn SharedStore>, key: impl Into<String>, ttl: Duration) -> Self {
		Self { store, key: key.into(), ttl }
	}

	/// Key holding the current owner.
	pub fn key(&self) -> &str {
		&self.key
	}

	/// Tries to take the lock for `owner`.
	///
	/// When the store is unreachable the lock fails open: the caller is granted an
	/// uncoordinated lease and proceeds alone.
	pub async fn acquire(&self, owner: LockOwnerId) -> LockAttempt {
		match self.store.set_if_absent(&self.key, owner.as_ref(), self.ttl).await {
			Ok(true) => LockAttempt::Acquired(RefreshLease { owner, coordinated: true }),
			Ok(false) => LockAttempt::Busy,
			Err(e) => {
				obs::store_degraded("lock_acquire", &self.key, &e);
				obs::lock_fail_open(&self.key);

				LockAttempt::Acquired(RefreshLease { owner, coordinated: false })
			},
		}
	}

	/// Returns `true` once nobody holds the lock.
	///
	/// A store fault reads as held, so waiters keep polling until the TTL bound.
	pub async fn is_released(&self) -> bool {
		match self.store.get(&self.key).await {
			Ok(holder) => holder.is_none(),
			Err(e) => {
				obs::store_degraded("lock_check", &self.key, &e);

				false
			},
		}
	}

	/// Releases the lock if `lease` still owns it.
	///
	/// A lease that outlived the TTL may find the key reassigned; the new owner's entry
	/// is left untouched. The read and delete are two commands, so a reassignment that
	/// lands between them is still possible; the TTL keeps that window harmless.
	pub async fn release(&self, lease: RefreshLease) {
		if !lease.coordinated {
			return;
		}

		match self.store.get(&self.key).await {
			Ok(Some(current)) if current == lease.owner.as_ref() =>
				if let Err(e) = self.store.delete(&self.key).await {
					obs::store_degraded("lock_release", &self.key, &e);
				},
			Ok(Some(_)) => obs::lock_reassigned(&self.key),
			Ok(None) => {},
			Err(e) => obs::store_degraded("lock_release", &self.key, &e),
		}
	}
}
impl Debug for RefreshLock {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshLock").field("key", &self.key).field("ttl", &self.ttl).finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::MemoryStore;

	fn lock(store: &Arc<MemoryStore>) -> RefreshLock {
		let shared: Arc<dyn SharedStore> = store.clone();

		RefreshLock::new(shared, "whoop:refresh_lock", Duration::seconds(10))
	}

	fn acquired(attempt: LockAttempt) -> RefreshLease {
		match attempt {
			LockAttempt::Acquired(lease) => lease,
			LockAttempt::Busy => panic!("Lock should have been acquired."),
		}
	}

	#[tokio::test]
	async fn second_owner_sees_busy_until_release() {
		let store = Arc::new(MemoryStore::default());
		let lock = lock(&store);
		let lease = acquired(lock.acquire(LockOwnerId::generate()).await);

		assert!(lease.is_coordinated());
		assert!(matches!(lock.acquire(LockOwnerId::generate()).await, LockAttempt::Busy));

		assert!(!lock.is_released().await);

		lock.release(lease).await;

		assert!(lock.is_released().await);

		acquired(lock.acquire(LockOwnerId::generate()).await);
	}

	#[tokio::test]
	async fn release_leaves_a_reassigned_lock_alone() {
		let store = Arc::new(MemoryStore::default());
		let lock = lock(&store);
		let stale = acquired(lock.acquire(LockOwnerId::generate()).await);

		store
			.set(lock.key(), "someone-else", Some(Duration::seconds(10)))
			.await
			.expect("Overwrite should succeed.");

		lock.release(stale).await;

		assert_eq!(
			store.get(lock.key()).await.expect("Get should succeed.").as_deref(),
			Some("someone-else")
		);
	}
}
