//! Keeps one valid bearer token available to every caller of an OAuth 2.0 provider whose
//! refresh tokens are single-use, across tasks and across processes sharing one store.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod http;
pub mod lock;
pub mod oauth;
pub mod obs;
pub mod provider;
pub mod rotation;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::ProviderId,
		config::CoordinatorSettings,
		coordinator::TokenCoordinator,
		http::ReqwestHttpClient,
		provider::{ClientAuthMethod, ProviderDescriptor},
		store::{MemoryStore, SharedStore},
	};

	/// Coordinator type alias used by reqwest-backed integration tests.
	pub type ReqwestTestCoordinator = TokenCoordinator<ReqwestHttpClient>;

	/// Client identifier used by test coordinators.
	pub const TEST_CLIENT_ID: &str = "client-rotation";
	/// Client secret used by test coordinators.
	pub const TEST_CLIENT_SECRET: &str = "secret-rotation";

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Builds a descriptor pointing at the provided mock token endpoint.
	pub fn test_descriptor(token_url: &str) -> ProviderDescriptor {
		let provider_id =
			ProviderId::new("mock-fitness").expect("Mock provider identifier should be valid.");

		ProviderDescriptor::builder(provider_id)
			.token_endpoint(Url::parse(token_url).expect("Mock token endpoint should parse."))
			.client_auth_method(ClientAuthMethod::ClientSecretPost)
			.build()
			.expect("Mock provider descriptor should build successfully.")
	}

	/// Constructs a [`TokenCoordinator`] on top of the provided shared store, seeded with a
	/// bootstrap refresh token.
	pub fn build_reqwest_test_coordinator(
		token_url: &str,
		store: Arc<dyn SharedStore>,
		settings: CoordinatorSettings,
		bootstrap_refresh: &str,
	) -> ReqwestTestCoordinator {
		TokenCoordinator::with_http_client(
			store,
			test_descriptor(token_url),
			TEST_CLIENT_ID,
			test_reqwest_http_client(),
		)
		.with_client_secret(TEST_CLIENT_SECRET)
		.with_settings(settings)
		.with_bootstrap_refresh_token(bootstrap_refresh)
	}

	/// Same as [`build_reqwest_test_coordinator`] but backed by a fresh [`MemoryStore`].
	pub fn build_memory_test_coordinator(
		token_url: &str,
		settings: CoordinatorSettings,
		bootstrap_refresh: &str,
	) -> (ReqwestTestCoordinator, Arc<MemoryStore>) {
		let backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn SharedStore> = backend.clone();
		let coordinator =
			build_reqwest_test_coordinator(token_url, store, settings, bootstrap_refresh);

		(coordinator, backend)
	}

	/// Token endpoint JSON body with the provided secrets and lifetime.
	pub fn token_body(access: &str, refresh: &str, expires_in: i64) -> String {
		format!(
			"{{\"access_token\":\"{access}\",\"refresh_token\":\"{refresh}\",\"token_type\":\"bearer\",\"expires_in\":{expires_in}}}"
		)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "redis")] pub use redis;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use httpmock as _;
