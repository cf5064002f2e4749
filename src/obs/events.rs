//! Structured log events; every helper compiles to nothing without the `tracing` feature.

// self
use crate::store::StoreError;

/// A shared-store operation failed and was converted into a degraded outcome.
pub(crate) fn store_degraded(operation: &'static str, key: &str, err: &StoreError) {
	#[cfg(feature = "tracing")]
	tracing::warn!(operation, key, error = %err, "shared store operation degraded");
	#[cfg(not(feature = "tracing"))]
	let _ = (operation, key, err);
}

/// The refresh lock was granted without coordination because the store is unreachable.
pub(crate) fn lock_fail_open(key: &str) {
	#[cfg(feature = "tracing")]
	tracing::warn!(key, "refresh lock store unavailable; proceeding without coordination");
	#[cfg(not(feature = "tracing"))]
	let _ = key;
}

/// Lock release skipped because another owner holds the key.
pub(crate) fn lock_reassigned(key: &str) {
	#[cfg(feature = "tracing")]
	tracing::debug!(key, "refresh lock already reassigned; leaving it in place");
	#[cfg(not(feature = "tracing"))]
	let _ = key;
}

/// The lock was busy; the caller will wait for the holder's token.
pub(crate) fn lock_contended(key: &str, attempt: u32) {
	#[cfg(feature = "tracing")]
	tracing::debug!(key, attempt, "refresh lock held elsewhere; polling the access token cache");
	#[cfg(not(feature = "tracing"))]
	let _ = (key, attempt);
}

/// A lookup was answered without contacting the token endpoint.
pub(crate) fn token_reused(source: &'static str) {
	#[cfg(feature = "tracing")]
	tracing::debug!(source, "reusing access token");
	#[cfg(not(feature = "tracing"))]
	let _ = source;
}

/// A rotation completed and both stores were updated.
pub(crate) fn refresh_rotated(version: u64) {
	#[cfg(feature = "tracing")]
	tracing::info!(version, "refresh token rotated");
	#[cfg(not(feature = "tracing"))]
	let _ = version;
}

/// The token endpoint call failed.
pub(crate) fn refresh_failed(err: &crate::error::Error) {
	#[cfg(feature = "tracing")]
	tracing::warn!(error = %err, retryable = err.is_retryable(), "token refresh failed");
	#[cfg(not(feature = "tracing"))]
	let _ = err;
}

/// A resource call answered 401.
pub(crate) fn resource_unauthorized(attempt: u32) {
	#[cfg(feature = "tracing")]
	tracing::warn!(attempt, "resource API rejected the access token");
	#[cfg(not(feature = "tracing"))]
	let _ = attempt;
}

/// The Redis connection was established.
#[cfg_attr(not(feature = "redis"), allow(dead_code))]
pub(crate) fn store_connected() {
	#[cfg(feature = "tracing")]
	tracing::info!("shared store connection established");
}
