//! Lock acquisition, contention backoff, and the rotation critical section.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, LockOwnerId, RefreshToken},
	config::CoordinatorSettings,
	coordinator::TokenCoordinator,
	error::{ConfigError, TransientError},
	http::TokenHttpClient,
	lock::{LockAttempt, RefreshLease},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

const MIN_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(1);

impl<C> TokenCoordinator<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Takes the refresh lock (or waits for whoever holds it) and returns a fresh token.
	pub(super) async fn acquire_and_refresh(&self) -> Result<AccessToken> {
		let attempts = self.settings.max_lock_attempts.max(1);

		for attempt in 1..=attempts {
			match self.lock.acquire(LockOwnerId::generate()).await {
				LockAttempt::Acquired(lease) => {
					let outcome = self.refresh_holding(&lease).await;

					self.lock.release(lease).await;

					return outcome;
				},
				LockAttempt::Busy => {
					obs::lock_contended(self.lock.key(), attempt);

					if let Some(token) = self.wait_for_holder().await {
						return Ok(token);
					}
				},
			}
		}

		Err(TransientError::LockContended { attempts }.into())
	}

	/// Polls the shared cache with exponential backoff for at most one lock TTL.
	///
	/// The wait also ends early, without a token, once the holder released the lock.
	async fn wait_for_holder(&self) -> Option<AccessToken> {
		let started = tokio::time::Instant::now();
		let deadline = started
			.checked_add(self.settings.lock_ttl.unsigned_abs())
			.unwrap_or_else(|| started + CoordinatorSettings::MAX_DURATION.unsigned_abs());
		let max_backoff = self.settings.poll_max_backoff.unsigned_abs().max(MIN_POLL_INTERVAL);
		let mut backoff = self.settings.poll_initial_backoff.unsigned_abs().max(MIN_POLL_INTERVAL);

		loop {
			let now = tokio::time::Instant::now();

			if now >= deadline {
				return None;
			}

			tokio::time::sleep(backoff.min(deadline - now)).await;

			if let Some(token) = self.cache.read(OffsetDateTime::now_utc()).await {
				obs::token_reused("lock_holder");
				self.remember_access(&token);

				return Some(token);
			}
			if self.lock.is_released().await {
				return None;
			}

			backoff = backoff.saturating_mul(2).min(max_backoff);
		}
	}

	/// Critical section: only runs while `lease` is held.
	async fn refresh_holding(&self, lease: &RefreshLease) -> Result<AccessToken> {
		// Another holder may have finished between our cache miss and the acquisition.
		if let Some(token) = self.cache.read(OffsetDateTime::now_utc()).await {
			obs::token_reused("double_check");
			self.remember_access(&token);

			return Ok(token);
		}

		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh_holding");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.rotate(lease)).await;

		obs::record_flow_result(KIND, &result);

		result
	}

	async fn rotate(&self, lease: &RefreshLease) -> Result<AccessToken> {
		let current = self.current_refresh_token().await.ok_or(ConfigError::MissingRefreshToken)?;

		self.refresh_metrics.record_network_refresh();

		// The old refresh token is spent from here on, whatever the outcome.
		let grant = self.endpoint.refresh(current.expose()).await.inspect_err(obs::refresh_failed)?;
		let next = grant.refresh_token.unwrap_or_else(|| current.token.clone());
		let record = match self.rotation.write(lease, next, &current).await {
			Ok(record) => record,
			Err((record, _)) => record,
		};

		obs::refresh_rotated(record.version);

		self.cache.write(&grant.access_token, OffsetDateTime::now_utc()).await;

		{
			let mut local = self.local.lock();

			local.refresh = Some(record);
			local.access = Some(grant.access_token.clone());
		}

		Ok(grant.access_token)
	}

	/// Newest refresh token between the shared store and the in-process copy.
	///
	/// The in-process copy only wins when a previous store write was lost.
	async fn current_refresh_token(&self) -> Option<RefreshToken> {
		let stored = self.rotation.read().await;
		let local = self.local.lock().refresh.clone();

		match (stored, local) {
			(Some(stored), Some(local)) if local.version > stored.version => Some(local),
			(Some(stored), _) => Some(stored),
			(None, local) => local,
		}
	}
}
