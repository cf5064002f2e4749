//! Bearer access token paired with its absolute expiry.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Bearer token handed to resource API calls.
///
/// Any copy is treated as unusable once `now >= expires_at - margin`; the margin absorbs
/// clock skew between processes and the latency of the request that carries the token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
	/// Bearer secret; callers must avoid logging it.
	pub token: TokenSecret,
	/// Absolute expiry reported by the provider.
	#[serde(rename = "expiresAt", with = "time::serde::timestamp")]
	pub expires_at: OffsetDateTime,
}
impl AccessToken {
	/// Creates a token expiring at the provided instant.
	pub fn new(token: impl Into<String>, expires_at: OffsetDateTime) -> Self {
		Self { token: TokenSecret::new(token), expires_at }
	}

	/// Returns the raw bearer value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		self.token.expose()
	}

	/// Returns `true` while the token is still outside the safety margin at `now`.
	///
	/// A margin reaching past the representable range leaves no fresh window.
	pub fn is_fresh_at(&self, now: OffsetDateTime, margin: Duration) -> bool {
		self.expires_at.checked_sub(margin).is_some_and(|deadline| now < deadline)
	}

	/// Computes how long a shared cache may keep this token.
	///
	/// Returns `None` when the token is already inside its safety margin.
	pub fn cache_ttl_at(&self, now: OffsetDateTime, margin: Duration) -> Option<Duration> {
		let remaining = (self.expires_at - now).whole_seconds();
		let ttl = remaining.saturating_sub(margin.whole_seconds()).max(0);

		(ttl > 0).then(|| Duration::seconds(ttl))
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("token", &"<redacted>")
			.field("expires_at", &self.expires_at)
			.finish()
	}
}
