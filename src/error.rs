//! Coordinator-level error types shared across the cache, lock, and token endpoint layers.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical coordinator error exposed by public APIs.
///
/// Shared-store faults never appear here: the adapter converts them into cache misses
/// or fail-open lock grants before they reach a caller.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Requested scopes exceed what was granted.
	#[error("Token lacks the required scopes: {reason}.")]
	InsufficientScope {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Provider rejected the refresh token (already rotated, revoked, or expired).
	#[error("Provider rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Client authentication failed or credentials are malformed.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// The resource API kept answering 401 after a forced refresh.
	#[error("Resource API rejected the access token after a refresh: {reason}.")]
	Unauthorized {
		/// Human-readable description of the rejected call.
		reason: String,
	},
	/// Collaborator request failed for a reason unrelated to authentication.
	#[error("Authenticated resource call failed.")]
	Resource {
		/// Underlying failure reported by the request function.
		#[source]
		source: BoxError,
	},
}
impl Error {
	/// Wraps a collaborator failure raised inside an authenticated request.
	pub fn resource(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Resource { source: Box::new(src) }
	}

	/// Returns `true` when the next attempt may succeed without operator intervention.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Transient(_) | Self::Transport(_))
	}
}

/// Configuration and validation failures raised by the coordinator.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Required environment variable is absent.
	#[error("Environment variable `{key}` is required.")]
	MissingEnv {
		/// Variable name.
		key: String,
	},
	/// Environment variable is present but unusable.
	#[error("Environment variable `{key}` is invalid: {reason}.")]
	InvalidEnv {
		/// Variable name.
		key: String,
		/// Why the value was rejected.
		reason: String,
	},
	/// Token endpoint URL cannot be parsed.
	#[error("Token endpoint URL is invalid.")]
	InvalidTokenEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Provider descriptor failed validation.
	#[error(transparent)]
	Descriptor(#[from] crate::provider::ProviderDescriptorError),
	/// Provider identifier failed validation.
	#[error(transparent)]
	Identifier(#[from] crate::auth::IdentifierError),
	/// Neither the shared store nor the bootstrap configuration holds a refresh token.
	#[error("No refresh token is available; run the authorization bootstrap first.")]
	MissingRefreshToken,
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Provider returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Provider- or coordinator-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Another holder kept the refresh lock through every acquisition round.
	#[error("Refresh lock stayed contended after {attempts} acquisition attempts.")]
	LockContended {
		/// Number of acquisition rounds attempted.
		attempts: u32,
	},
}

/// Transport-level failures.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn retryable_covers_transient_and_transport_only() {
		let transient: Error = TransientError::LockContended { attempts: 3 }.into();
		let transport: Error =
			TransportError::network(std::io::Error::other("connection reset")).into();
		let rejected = Error::InvalidGrant { reason: "refresh token already used".into() };
		let unauthorized = Error::Unauthorized { reason: "401 twice".into() };

		assert!(transient.is_retryable());
		assert!(transport.is_retryable());
		assert!(!rejected.is_retryable());
		assert!(!unauthorized.is_retryable());
	}

	#[test]
	fn resource_errors_keep_their_source() {
		let err = Error::resource(std::io::Error::other("socket closed"));
		let source =
			StdError::source(&err).expect("Resource errors should expose the original failure.");

		assert_eq!(source.to_string(), "socket closed");
	}
}
