//! Token lifecycle coordinator: the only component that talks to the token endpoint.
//!
//! A lookup walks a fixed ladder and stops at the first rung that yields a fresh token:
//! the shared cache, the in-process copy, and finally a refresh performed under the
//! cross-process [`RefreshLock`]. Callers in one process additionally queue on a
//! singleflight guard so a fail-open lock never lets two local tasks spend the same
//! single-use refresh token.

mod authenticated;
mod metrics;
mod refresh;

pub use authenticated::ResourceResponse;
pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, RefreshToken, TokenSecret},
	cache::AccessTokenCache,
	config::{CoordinatorConfig, CoordinatorSettings, STORE_URL_ENV},
	error::ConfigError,
	http::TokenHttpClient,
	lock::RefreshLock,
	oauth::TokenEndpoint,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::{ProviderDescriptor, ProviderStrategy},
	rotation::RefreshTokenStore,
	store::{MemoryStore, SharedStore, StoreError, StoreKeys},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

#[cfg(feature = "reqwest")]
/// Coordinator specialized for the crate's default reqwest transport.
pub type ReqwestTokenCoordinator = TokenCoordinator<ReqwestHttpClient>;

#[derive(Debug, Default)]
struct LocalState {
	access: Option<AccessToken>,
	refresh: Option<RefreshToken>,
}

/// Keeps one valid access token available for a single provider account.
pub struct TokenCoordinator<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Shared metrics recorder for lookup outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
	store: Arc<dyn SharedStore>,
	keys: StoreKeys,
	settings: CoordinatorSettings,
	endpoint: TokenEndpoint<C>,
	cache: AccessTokenCache,
	rotation: RefreshTokenStore,
	lock: RefreshLock,
	local: Mutex<LocalState>,
	singleflight: AsyncMutex<()>,
}
impl<C> TokenCoordinator<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Creates a coordinator on top of `store` that reuses the caller-provided transport.
	pub fn with_http_client(
		store: Arc<dyn SharedStore>,
		descriptor: ProviderDescriptor,
		client_id: impl Into<String>,
		http_client: impl Into<Arc<C>>,
	) -> Self {
		let keys = StoreKeys::for_provider(&descriptor.id);
		let settings = CoordinatorSettings::default();

		Self {
			refresh_metrics: Default::default(),
			cache: AccessTokenCache::new(store.clone(), &keys.access_token, settings.safety_margin),
			rotation: RefreshTokenStore::new(store.clone(), &keys.refresh_token),
			lock: RefreshLock::new(store.clone(), &keys.refresh_lock, settings.lock_ttl),
			endpoint: TokenEndpoint::new(descriptor, client_id, http_client),
			store,
			keys,
			settings,
			local: Default::default(),
			singleflight: AsyncMutex::new(()),
		}
	}

	/// Builds a coordinator from environment-derived configuration and an explicit transport.
	///
	/// A configured store URL selects the Redis backend; otherwise the coordinator runs
	/// in single-process mode on a [`MemoryStore`].
	pub fn from_config_with_http_client(
		config: CoordinatorConfig,
		http_client: impl Into<Arc<C>>,
	) -> Result<Self> {
		let store = open_store(config.store_url.as_deref())?;
		let mut coordinator =
			Self::with_http_client(store, config.descriptor, config.client_id, http_client)
				.with_settings(config.settings);

		if let Some(secret) = config.client_secret {
			coordinator = coordinator.with_client_secret(secret);
		}
		if let Some(refresh) = config.bootstrap_refresh_token {
			coordinator = coordinator.with_bootstrap_refresh_token(refresh);
		}
		if let Some(access) = config.bootstrap_access_token {
			coordinator = coordinator.with_bootstrap_access_token(access);
		}

		Ok(coordinator)
	}

	/// Sets the client secret used at the token endpoint.
	pub fn with_client_secret(mut self, secret: impl Into<TokenSecret>) -> Self {
		self.endpoint = self.endpoint.with_client_secret(secret);

		self
	}

	/// Replaces the strategy that classifies token endpoint failures.
	pub fn with_strategy(mut self, strategy: Arc<dyn ProviderStrategy>) -> Self {
		self.endpoint = self.endpoint.with_strategy(strategy);

		self
	}

	/// Replaces the timing parameters.
	pub fn with_settings(mut self, settings: CoordinatorSettings) -> Self {
		self.cache =
			AccessTokenCache::new(self.store.clone(), &self.keys.access_token, settings.safety_margin);
		self.lock = RefreshLock::new(self.store.clone(), &self.keys.refresh_lock, settings.lock_ttl);
		self.settings = settings;

		self
	}

	/// Seeds the refresh token obtained by the one-time authorization bootstrap.
	///
	/// The seed is treated as version 0; a record already in the shared store wins.
	pub fn with_bootstrap_refresh_token(self, token: impl Into<TokenSecret>) -> Self {
		self.local.lock().refresh = Some(RefreshToken::legacy(token.into().into_inner()));

		self
	}

	/// Seeds an access token obtained by the bootstrap.
	pub fn with_bootstrap_access_token(self, token: AccessToken) -> Self {
		self.local.lock().access = Some(token);

		self
	}

	/// Provider descriptor this coordinator refreshes against.
	pub fn descriptor(&self) -> &ProviderDescriptor {
		self.endpoint.descriptor()
	}

	/// Shared store keys used by this coordinator.
	pub fn store_keys(&self) -> &StoreKeys {
		&self.keys
	}

	/// Active timing parameters.
	pub fn settings(&self) -> &CoordinatorSettings {
		&self.settings
	}

	/// Connects the shared store ahead of the first lookup.
	///
	/// Optional: the store connects lazily. A failure here is reported but leaves the
	/// coordinator usable in degraded mode.
	pub async fn init(&self) -> Result<(), StoreError> {
		self.store.connect().await.inspect_err(|e| obs::store_degraded("connect", "*", e))
	}

	/// Drops the shared store connection.
	pub async fn shutdown(&self) -> Result<(), StoreError> {
		self.store.shutdown().await
	}

	/// Returns an access token that stays valid for at least the safety margin.
	///
	/// At most one caller across every process sharing the store reaches the token
	/// endpoint per validity window; everyone else reuses its result.
	pub async fn ensure_valid_token(&self) -> Result<AccessToken> {
		const KIND: FlowKind = FlowKind::TokenLookup;

		let span = FlowSpan::new(KIND, "ensure_valid_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.refresh_metrics.record_attempt();

		let result = span
			.instrument(async move {
				if let Some(token) = self.reusable_token().await {
					return Ok(token);
				}

				let _singleflight = self.singleflight.lock().await;

				// A local task may have refreshed while this one queued.
				if let Some(token) = self.reusable_token().await {
					return Ok(token);
				}

				self.acquire_and_refresh().await
			})
			.await;

		match &result {
			Ok(_) => self.refresh_metrics.record_success(),
			Err(_) => self.refresh_metrics.record_failure(),
		}

		obs::record_flow_result(KIND, &result);

		result
	}

	/// Alias of [`TokenCoordinator::ensure_valid_token`].
	pub async fn get_valid_token(&self) -> Result<AccessToken> {
		self.ensure_valid_token().await
	}

	/// Drops the shared cached token and the in-process copy.
	///
	/// The next lookup refreshes unless another process has already cached a newer token.
	pub async fn invalidate_token(&self) {
		self.local.lock().access = None;
		self.cache.invalidate().await;
	}

	async fn reusable_token(&self) -> Option<AccessToken> {
		let now = OffsetDateTime::now_utc();

		if let Some(token) = self.cache.read(now).await {
			obs::token_reused("shared_cache");
			self.remember_access(&token);

			return Some(token);
		}

		let local = self
			.local
			.lock()
			.access
			.clone()
			.filter(|token| token.is_fresh_at(now, self.settings.safety_margin));

		if local.is_some() {
			obs::token_reused("in_process");
		}

		local
	}

	fn remember_access(&self, token: &AccessToken) {
		self.local.lock().access = Some(token.clone());
	}
}
#[cfg(feature = "reqwest")]
impl TokenCoordinator<ReqwestHttpClient> {
	/// Creates a coordinator with its own reqwest transport.
	pub fn new(
		store: Arc<dyn SharedStore>,
		descriptor: ProviderDescriptor,
		client_id: impl Into<String>,
	) -> Self {
		Self::with_http_client(store, descriptor, client_id, ReqwestHttpClient::default())
	}

	/// Builds a coordinator from configuration with a reqwest transport that never follows
	/// redirects.
	pub fn from_config(config: CoordinatorConfig) -> Result<Self> {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.map_err(ConfigError::from)?;

		Self::from_config_with_http_client(config, ReqwestHttpClient::with_client(client))
	}
}
impl<C> Debug for TokenCoordinator<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenCoordinator")
			.field("endpoint", &self.endpoint)
			.field("keys", &self.keys)
			.field("settings", &self.settings)
			.finish()
	}
}

fn open_store(url: Option<&str>) -> Result<Arc<dyn SharedStore>> {
	let Some(url) = url else {
		return Ok(Arc::new(MemoryStore::default()));
	};

	#[cfg(feature = "redis")]
	{
		let store = crate::store::RedisStore::open(url).map_err(|e| ConfigError::InvalidEnv {
			key: STORE_URL_ENV.into(),
			reason: e.to_string(),
		})?;

		Ok(Arc::new(store))
	}
	#[cfg(not(feature = "redis"))]
	{
		let _ = url;

		Err(ConfigError::InvalidEnv {
			key: STORE_URL_ENV.into(),
			reason: "the `redis` feature is disabled".into(),
		}
		.into())
	}
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// self
	use super::*;
	use crate::{_preludet::*, auth::ProviderId};

	fn config(store_url: Option<&str>) -> CoordinatorConfig {
		let descriptor = ProviderDescriptor::builder(
			ProviderId::new("whoop").expect("Provider id should be valid."),
		)
		.token_endpoint(Url::parse("https://example.com/token").expect("URL should parse."))
		.build()
		.expect("Descriptor should build.");

		CoordinatorConfig {
			descriptor,
			client_id: "client".into(),
			client_secret: Some("secret".into()),
			bootstrap_refresh_token: Some("rt-0".into()),
			bootstrap_access_token: None,
			store_url: store_url.map(Into::into),
			settings: CoordinatorSettings::default().with_lock_ttl(Duration::seconds(3)),
		}
	}

	#[test]
	fn config_without_store_url_runs_in_memory() {
		let coordinator = ReqwestTestCoordinator::from_config(config(None))
			.expect("In-memory configuration should build.");

		assert_eq!(coordinator.store_keys().refresh_lock, "whoop:refresh_lock");
		assert_eq!(coordinator.settings().lock_ttl, Duration::seconds(3));
		assert!(!format!("{coordinator:?}").contains("secret\""));
	}

	#[cfg(feature = "redis")]
	#[test]
	fn malformed_store_urls_are_configuration_errors() {
		let err = ReqwestTestCoordinator::from_config(config(Some("not a url")))
			.expect_err("Malformed store URL should fail.");

		assert!(
			matches!(err, Error::Config(ConfigError::InvalidEnv { ref key, .. }) if key == STORE_URL_ENV)
		);
	}

	#[tokio::test]
	async fn bootstrap_access_token_is_served_without_a_refresh() {
		let expires = OffsetDateTime::now_utc() + Duration::hours(1);
		let (coordinator, _) = build_memory_test_coordinator(
			"https://127.0.0.1:9/token",
			CoordinatorSettings::default(),
			"rt-0",
		);
		let coordinator =
			coordinator.with_bootstrap_access_token(AccessToken::new("seeded", expires));
		let token = coordinator.ensure_valid_token().await.expect("Seed should be reused.");

		assert_eq!(token.expose(), "seeded");
		assert_eq!(coordinator.refresh_metrics.network_refreshes(), 0);
	}
}
