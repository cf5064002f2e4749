// crates.io
use time::Duration;
// self
use oauth2_rotation::store::{MemoryStore, SharedStore};

#[tokio::test]
async fn set_get_delete_round_trip() {
	let store = MemoryStore::default();

	store
		.set("whoop:access_token", "{\"token\":\"abc\"}", None)
		.await
		.expect("Plain set should succeed.");

	assert_eq!(
		store.get("whoop:access_token").await.expect("Get should succeed.").as_deref(),
		Some("{\"token\":\"abc\"}")
	);

	store.delete("whoop:access_token").await.expect("Delete should succeed.");

	assert_eq!(store.get("whoop:access_token").await.expect("Get should succeed."), None);

	store.delete("whoop:access_token").await.expect("Deleting a missing key should succeed.");
}

#[tokio::test]
async fn conditional_set_admits_one_owner() {
	let store = MemoryStore::default();
	let ttl = Duration::seconds(10);

	assert!(
		store
			.set_if_absent("whoop:refresh_lock", "owner-a", ttl)
			.await
			.expect("First conditional set should succeed.")
	);
	assert!(
		!store
			.set_if_absent("whoop:refresh_lock", "owner-b", ttl)
			.await
			.expect("Second conditional set should succeed.")
	);
	assert_eq!(
		store.get("whoop:refresh_lock").await.expect("Get should succeed.").as_deref(),
		Some("owner-a")
	);
}

#[tokio::test]
async fn clones_share_one_keyspace() {
	let first = MemoryStore::default();
	let second = first.clone();

	first
		.set("whoop:refresh_token", "rt-1", None)
		.await
		.expect("Set through the first handle should succeed.");

	assert_eq!(
		second.get("whoop:refresh_token").await.expect("Get should succeed.").as_deref(),
		Some("rt-1")
	);
	assert_eq!(second.len(), 1);

	// Lifecycle hooks are no-ops for the in-memory backend.
	second.connect().await.expect("Connect should succeed.");
	second.shutdown().await.expect("Shutdown should succeed.");

	assert_eq!(first.len(), 1);
}
