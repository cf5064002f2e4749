//! Redis-backed [`SharedStore`] with a lazily established, memoized connection.

// crates.io
use ::redis::{
	AsyncCommands, Client,
	aio::{ConnectionManager, ConnectionManagerConfig},
};
use futures_util::future::{BoxFuture, FutureExt, Shared};
// self
use crate::{
	_prelude::*,
	obs,
	store::{SharedStore, StoreError, StoreFuture},
};

type ConnectAttempt = Shared<BoxFuture<'static, Result<ConnectionManager, StoreError>>>;

const DEFAULT_CONNECTION_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);
const DEFAULT_RESPONSE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);
const DEFAULT_RECONNECT_RETRIES: usize = 1;
const DEFAULT_MAX_RETRY_DELAY_MS: u64 = 500;

#[derive(Default)]
enum ConnectionSlot {
	#[default]
	Idle,
	Connecting(ConnectAttempt),
	Ready(ConnectionManager),
}

/// Redis store shared by every process that coordinates on the same provider account.
///
/// The connection is opened on first use. Concurrent first callers await one shared
/// in-flight attempt and observe its outcome; a failed attempt empties the slot so the
/// next operation starts a new one. [`SharedStore::shutdown`] drops the connection.
pub struct RedisStore {
	client: Client,
	manager_config: ConnectionManagerConfig,
	connection: Mutex<ConnectionSlot>,
}
impl RedisStore {
	/// Parses the connection URL without connecting.
	pub fn open(url: &str) -> Result<Self, StoreError> {
		let client = Client::open(url).map_err(StoreError::unavailable)?;
		let manager_config = ConnectionManagerConfig::new()
			.set_connection_timeout(DEFAULT_CONNECTION_TIMEOUT)
			.set_response_timeout(DEFAULT_RESPONSE_TIMEOUT)
			.set_number_of_retries(DEFAULT_RECONNECT_RETRIES)
			.set_max_delay(DEFAULT_MAX_RETRY_DELAY_MS);

		Ok(Self { client, manager_config, connection: Default::default() })
	}

	/// Overrides the connect and per-command timeouts.
	pub fn with_timeouts(
		mut self,
		connection_timeout: std::time::Duration,
		response_timeout: std::time::Duration,
	) -> Self {
		self.manager_config = self
			.manager_config
			.set_connection_timeout(connection_timeout)
			.set_response_timeout(response_timeout);

		self
	}

	/// Returns `true` when a connection is currently memoized.
	pub fn is_connected(&self) -> bool {
		matches!(*self.connection.lock(), ConnectionSlot::Ready(_))
	}

	async fn connection(&self) -> Result<ConnectionManager, StoreError> {
		let attempt = {
			let mut slot = self.connection.lock();

			match &*slot {
				ConnectionSlot::Ready(manager) => return Ok(manager.clone()),
				ConnectionSlot::Connecting(attempt) => attempt.clone(),
				ConnectionSlot::Idle => {
					let attempt = self.start_attempt();

					*slot = ConnectionSlot::Connecting(attempt.clone());

					attempt
				},
			}
		};
		let outcome = attempt.clone().await;
		let mut slot = self.connection.lock();

		// Only the attempt that is still current may settle the slot; a shutdown or a
		// newer attempt may have replaced it meanwhile.
		if matches!(&*slot, ConnectionSlot::Connecting(current) if current.ptr_eq(&attempt)) {
			*slot = match &outcome {
				Ok(manager) => {
					obs::store_connected();

					ConnectionSlot::Ready(manager.clone())
				},
				Err(_) => ConnectionSlot::Idle,
			};
		}

		outcome
	}

	fn start_attempt(&self) -> ConnectAttempt {
		let client = self.client.clone();
		let config = self.manager_config.clone();

		async move {
			ConnectionManager::new_with_config(client, config)
				.await
				.map_err(StoreError::unavailable)
		}
		.boxed()
		.shared()
	}
}
impl Debug for RedisStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RedisStore").field("client", &"<redis>").finish()
	}
}
impl SharedStore for RedisStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		Box::pin(async move {
			let mut conn = self.connection().await?;

			conn.get::<_, Option<String>>(key).await.map_err(StoreError::unavailable)
		})
	}

	fn set<'a>(
		&'a self,
		key: &'a str,
		value: &'a str,
		ttl: Option<Duration>,
	) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut conn = self.connection().await?;

			let written = match ttl {
				Some(ttl) => {
					let millis = ttl_millis(key, ttl)?;

					conn.pset_ex::<_, _, ()>(key, value, millis).await
				},
				None => conn.set::<_, _, ()>(key, value).await,
			};

			written.map_err(StoreError::unavailable)
		})
	}

	fn set_if_absent<'a>(
		&'a self,
		key: &'a str,
		value: &'a str,
		ttl: Duration,
	) -> StoreFuture<'a, bool> {
		Box::pin(async move {
			let millis = ttl_millis(key, ttl)?;
			let mut conn = self.connection().await?;
			let reply: Option<String> = ::redis::cmd("SET")
				.arg(key)
				.arg(value)
				.arg("NX")
				.arg("PX")
				.arg(millis)
				.query_async(&mut conn)
				.await
				.map_err(StoreError::unavailable)?;

			Ok(reply.is_some())
		})
	}

	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut conn = self.connection().await?;

			conn.del::<_, ()>(key).await.map_err(StoreError::unavailable)
		})
	}

	fn connect(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.connection().await.map(|_| ()) })
	}

	fn shutdown(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			*self.connection.lock() = ConnectionSlot::Idle;

			Ok(())
		})
	}
}

fn ttl_millis(key: &str, ttl: Duration) -> Result<u64, StoreError> {
	u64::try_from(ttl.whole_milliseconds()).ok().filter(|millis| *millis > 0).ok_or_else(|| {
		StoreError::Serialization {
			message: format!("Refusing to store `{key}` with a non-positive TTL"),
		}
	})
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn ttl_conversion_rejects_non_positive_values() {
		assert_eq!(ttl_millis("k", Duration::seconds(10)), Ok(10_000));
		assert!(ttl_millis("k", Duration::ZERO).is_err());
		assert!(ttl_millis("k", Duration::seconds(-1)).is_err());
	}

	#[test]
	fn malformed_urls_surface_as_unavailable() {
		let err = RedisStore::open("not a redis url").expect_err("Malformed URLs should fail.");

		assert!(err.is_unavailable());
	}

	#[tokio::test]
	async fn unreachable_server_reports_unavailable_and_memoizes_nothing() {
		let store = RedisStore::open("redis://127.0.0.1:1/")
			.expect("Well-formed URL should parse without connecting.")
			.with_timeouts(
				std::time::Duration::from_millis(200),
				std::time::Duration::from_millis(200),
			);
		let err = store.get("whoop:access_token").await.expect_err("Nothing listens on port 1.");

		assert!(err.is_unavailable());
		assert!(!store.is_connected());
	}

	#[tokio::test]
	async fn concurrent_first_callers_share_one_connect_attempt() {
		// Accepts connections and never answers, so every handshake runs into the timeout.
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
			.await
			.expect("Loopback listener should bind.");
		let addr = listener.local_addr().expect("Listener should report its address.");
		let silent = tokio::spawn(async move {
			let mut held = Vec::new();

			while let Ok((socket, _)) = listener.accept().await {
				held.push(socket);
			}
		});
		let timeout = std::time::Duration::from_millis(400);
		let store = Arc::new(
			RedisStore::open(&format!("redis://{addr}/"))
				.expect("Well-formed URL should parse without connecting.")
				.with_timeouts(timeout, timeout),
		);
		let started = tokio::time::Instant::now();
		let callers = (0..5)
			.map(|_| {
				let store = store.clone();

				tokio::spawn(async move { store.get("whoop:access_token").await })
			})
			.collect::<Vec<_>>();

		for caller in callers {
			let err = caller
				.await
				.expect("Caller task should not panic.")
				.expect_err("A silent server never completes the handshake.");

			assert!(err.is_unavailable());
		}

		// Serialized attempts would need five timeouts.
		assert!(started.elapsed() < timeout * 3, "took {:?}", started.elapsed());
		assert!(!store.is_connected());

		silent.abort();
	}
}
