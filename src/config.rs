//! Environment-driven configuration and tuning knobs for the coordinator.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, ProviderId, TokenSecret},
	error::ConfigError,
	provider::{ClientAuthMethod, ProviderDescriptor},
};

/// Environment variable naming the shared store; absent means in-memory coordination.
pub const STORE_URL_ENV: &str = "REDIS_URL";

/// Timing parameters for freshness checks, locking, and contention backoff.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoordinatorSettings {
	/// Tokens are treated as expired this long before their reported expiry.
	pub safety_margin: Duration,
	/// Refresh lock lifetime; must exceed a token endpoint round trip.
	pub lock_ttl: Duration,
	/// First wait while polling for another holder's token.
	pub poll_initial_backoff: Duration,
	/// Cap for the exponential polling backoff.
	pub poll_max_backoff: Duration,
	/// Acquisition rounds before giving up on a contended lock.
	pub max_lock_attempts: u32,
}
impl CoordinatorSettings {
	/// Upper bound for every timing parameter.
	pub const MAX_DURATION: Duration = Duration::days(1);

	const DEFAULT_LOCK_TTL: Duration = Duration::seconds(10);
	const DEFAULT_MAX_LOCK_ATTEMPTS: u32 = 3;
	const DEFAULT_POLL_INITIAL_BACKOFF: Duration = Duration::milliseconds(50);
	const DEFAULT_POLL_MAX_BACKOFF: Duration = Duration::milliseconds(500);
	const DEFAULT_SAFETY_MARGIN: Duration = Duration::minutes(5);

	/// Overrides the safety margin, clamped to `0..=MAX_DURATION`.
	pub fn with_safety_margin(mut self, margin: Duration) -> Self {
		self.safety_margin = margin.clamp(Duration::ZERO, Self::MAX_DURATION);

		self
	}

	/// Overrides the lock TTL, clamped to `1ms..=MAX_DURATION`.
	pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
		self.lock_ttl = ttl.clamp(Duration::MILLISECOND, Self::MAX_DURATION);

		self
	}

	/// Overrides the polling backoff bounds, each clamped to `0..=MAX_DURATION`.
	pub fn with_poll_backoff(mut self, initial: Duration, max: Duration) -> Self {
		let initial = initial.clamp(Duration::ZERO, Self::MAX_DURATION);

		self.poll_initial_backoff = initial;
		self.poll_max_backoff = max.clamp(initial, Self::MAX_DURATION);

		self
	}

	/// Overrides the number of acquisition rounds (at least one).
	pub fn with_max_lock_attempts(mut self, attempts: u32) -> Self {
		self.max_lock_attempts = attempts.max(1);

		self
	}
}
impl Default for CoordinatorSettings {
	fn default() -> Self {
		Self {
			safety_margin: Self::DEFAULT_SAFETY_MARGIN,
			lock_ttl: Self::DEFAULT_LOCK_TTL,
			poll_initial_backoff: Self::DEFAULT_POLL_INITIAL_BACKOFF,
			poll_max_backoff: Self::DEFAULT_POLL_MAX_BACKOFF,
			max_lock_attempts: Self::DEFAULT_MAX_LOCK_ATTEMPTS,
		}
	}
}

/// Everything needed to build a coordinator for one provider account.
#[derive(Clone)]
pub struct CoordinatorConfig {
	/// Provider descriptor (identifier, token endpoint, client auth).
	pub descriptor: ProviderDescriptor,
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret.
	pub client_secret: Option<TokenSecret>,
	/// Refresh token from the one-time authorization bootstrap.
	pub bootstrap_refresh_token: Option<TokenSecret>,
	/// Access token from the bootstrap, when one is still valid.
	pub bootstrap_access_token: Option<AccessToken>,
	/// Shared store connection string.
	pub store_url: Option<String>,
	/// Timing parameters.
	pub settings: CoordinatorSettings,
}
impl CoordinatorConfig {
	/// Reads `{prefix}_*` variables plus [`STORE_URL_ENV`] from the process environment.
	///
	/// | Variable | Required |
	/// |---|---|
	/// | `{prefix}_CLIENT_ID` | yes |
	/// | `{prefix}_CLIENT_SECRET` | yes |
	/// | `{prefix}_TOKEN_URL` | yes |
	/// | `{prefix}_REFRESH_TOKEN` | no (the store may already hold one) |
	/// | `{prefix}_ACCESS_TOKEN` + `{prefix}_ACCESS_TOKEN_EXPIRES_AT` (unix seconds) | no |
	/// | `{prefix}_CLIENT_AUTH` (`post` or `basic`) | no, defaults to `post` |
	/// | `{prefix}_TOKEN_SAFETY_MARGIN_SECS` | no |
	/// | `{prefix}_REFRESH_LOCK_TTL_SECS` | no |
	/// | `REDIS_URL` | no |
	pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
		Self::from_lookup(prefix, |key| std::env::var(key).ok())
	}

	/// Same as [`CoordinatorConfig::from_env`] but reads through `lookup`.
	pub fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let env = EnvReader { prefix, lookup };
		let provider_id = ProviderId::new(prefix.to_ascii_lowercase())?;
		let token_url = env.required("TOKEN_URL")?;
		let token_endpoint =
			Url::parse(&token_url).map_err(|source| ConfigError::InvalidTokenEndpoint { source })?;
		let client_auth = match env.optional("CLIENT_AUTH").as_deref() {
			None | Some("post") => ClientAuthMethod::ClientSecretPost,
			Some("basic") => ClientAuthMethod::ClientSecretBasic,
			Some(other) =>
				return Err(env.invalid("CLIENT_AUTH", format!("expected `post` or `basic`, got `{other}`"))),
		};
		let descriptor = ProviderDescriptor::builder(provider_id)
			.token_endpoint(token_endpoint)
			.client_auth_method(client_auth)
			.build()?;
		let mut settings = CoordinatorSettings::default();

		if let Some(secs) = env.seconds("TOKEN_SAFETY_MARGIN_SECS")? {
			settings = settings.with_safety_margin(secs);
		}
		if let Some(secs) = env.seconds("REFRESH_LOCK_TTL_SECS")? {
			if !secs.is_positive() {
				return Err(env.invalid("REFRESH_LOCK_TTL_SECS", "must be positive".into()));
			}

			settings = settings.with_lock_ttl(secs);
		}

		let bootstrap_access_token = match env.optional("ACCESS_TOKEN") {
			Some(token) => {
				let expires_at = env
					.optional("ACCESS_TOKEN_EXPIRES_AT")
					.ok_or_else(|| ConfigError::MissingEnv {
						key: env.key("ACCESS_TOKEN_EXPIRES_AT"),
					})?
					.parse::<i64>()
					.ok()
					.and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
					.ok_or_else(|| {
						env.invalid("ACCESS_TOKEN_EXPIRES_AT", "expected unix seconds".into())
					})?;

				Some(AccessToken::new(token, expires_at))
			},
			None => None,
		};

		Ok(Self {
			descriptor,
			client_id: env.required("CLIENT_ID")?,
			client_secret: Some(TokenSecret::new(env.required("CLIENT_SECRET")?)),
			bootstrap_refresh_token: env.optional("REFRESH_TOKEN").map(TokenSecret::new),
			bootstrap_access_token,
			store_url: (env.lookup)(STORE_URL_ENV).filter(|value| !value.trim().is_empty()),
			settings,
		})
	}
}
impl Debug for CoordinatorConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CoordinatorConfig")
			.field("descriptor", &self.descriptor)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("bootstrap_refresh_set", &self.bootstrap_refresh_token.is_some())
			.field("bootstrap_access_token", &self.bootstrap_access_token)
			.field("store_configured", &self.store_url.is_some())
			.field("settings", &self.settings)
			.finish()
	}
}

struct EnvReader<'p, F> {
	prefix: &'p str,
	lookup: F,
}
impl<F> EnvReader<'_, F>
where
	F: Fn(&str) -> Option<String>,
{
	fn key(&self, suffix: &str) -> String {
		format!("{}_{suffix}", self.prefix.to_ascii_uppercase())
	}

	fn optional(&self, suffix: &str) -> Option<String> {
		(self.lookup)(&self.key(suffix)).filter(|value| !value.trim().is_empty())
	}

	fn required(&self, suffix: &str) -> Result<String, ConfigError> {
		self.optional(suffix).ok_or_else(|| ConfigError::MissingEnv { key: self.key(suffix) })
	}

	fn seconds(&self, suffix: &str) -> Result<Option<Duration>, ConfigError> {
		let max = CoordinatorSettings::MAX_DURATION.whole_seconds();

		self.optional(suffix)
			.map(|raw| {
				let secs =
					raw.trim().parse::<i64>().map_err(|e| self.invalid(suffix, e.to_string()))?;

				if !(0..=max).contains(&secs) {
					return Err(self.invalid(suffix, format!("expected 0..={max} seconds, got {secs}")));
				}

				Ok(Duration::seconds(secs))
			})
			.transpose()
	}

	fn invalid(&self, suffix: &str, reason: String) -> ConfigError {
		ConfigError::InvalidEnv { key: self.key(suffix), reason }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let map: HashMap<String, String> =
			pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();

		move |key| map.get(key).cloned()
	}

	const BASE: &[(&str, &str)] = &[
		("WHOOP_CLIENT_ID", "client"),
		("WHOOP_CLIENT_SECRET", "secret"),
		("WHOOP_TOKEN_URL", "https://api.prod.whoop.com/oauth/oauth2/token"),
	];

	#[test]
	fn minimal_environment_selects_in_memory_mode() {
		let config = CoordinatorConfig::from_lookup("WHOOP", lookup(BASE))
			.expect("Minimal environment should produce a config.");

		assert_eq!(config.descriptor.id.as_ref(), "whoop");
		assert_eq!(config.client_id, "client");
		assert_eq!(config.descriptor.client_auth_method, ClientAuthMethod::ClientSecretPost);
		assert!(config.store_url.is_none());
		assert!(config.bootstrap_refresh_token.is_none());
		assert_eq!(config.settings, CoordinatorSettings::default());
	}

	#[test]
	fn optional_values_are_parsed() {
		let mut pairs = BASE.to_vec();

		pairs.extend([
			("WHOOP_REFRESH_TOKEN", "bootstrap-refresh"),
			("WHOOP_ACCESS_TOKEN", "bootstrap-access"),
			("WHOOP_ACCESS_TOKEN_EXPIRES_AT", "1735689600"),
			("WHOOP_CLIENT_AUTH", "basic"),
			("WHOOP_TOKEN_SAFETY_MARGIN_SECS", "120"),
			("WHOOP_REFRESH_LOCK_TTL_SECS", "15"),
			("REDIS_URL", "redis://cache:6379/0"),
		]);

		let config = CoordinatorConfig::from_lookup("whoop", lookup(&pairs))
			.expect("Full environment should produce a config.");
		let access = config.bootstrap_access_token.expect("Bootstrap access token should load.");

		assert_eq!(access.expose(), "bootstrap-access");
		assert_eq!(access.expires_at.unix_timestamp(), 1_735_689_600);
		assert_eq!(
			config.bootstrap_refresh_token.as_ref().map(TokenSecret::expose),
			Some("bootstrap-refresh")
		);
		assert_eq!(config.descriptor.client_auth_method, ClientAuthMethod::ClientSecretBasic);
		assert_eq!(config.settings.safety_margin, Duration::seconds(120));
		assert_eq!(config.settings.lock_ttl, Duration::seconds(15));
		assert_eq!(config.store_url.as_deref(), Some("redis://cache:6379/0"));
	}

	#[test]
	fn missing_and_invalid_values_are_reported_by_key() {
		let err = CoordinatorConfig::from_lookup("WHOOP", lookup(&BASE[..2]))
			.expect_err("Token URL is required.");

		assert!(matches!(err, ConfigError::MissingEnv { ref key } if key == "WHOOP_TOKEN_URL"));

		let mut pairs = BASE.to_vec();

		pairs.push(("WHOOP_REFRESH_LOCK_TTL_SECS", "ten"));

		let err = CoordinatorConfig::from_lookup("WHOOP", lookup(&pairs))
			.expect_err("Non-numeric TTL should be rejected.");

		assert!(
			matches!(err, ConfigError::InvalidEnv { ref key, .. } if key == "WHOOP_REFRESH_LOCK_TTL_SECS")
		);

		let mut pairs = BASE.to_vec();

		pairs.push(("WHOOP_ACCESS_TOKEN", "orphan"));

		let err = CoordinatorConfig::from_lookup("WHOOP", lookup(&pairs))
			.expect_err("Access token without expiry should be rejected.");

		assert!(
			matches!(err, ConfigError::MissingEnv { ref key } if key == "WHOOP_ACCESS_TOKEN_EXPIRES_AT")
		);
	}

	#[test]
	fn out_of_range_tuning_values_are_rejected() {
		for (key, value) in [
			("WHOOP_TOKEN_SAFETY_MARGIN_SECS", "9223372036854775807"),
			("WHOOP_TOKEN_SAFETY_MARGIN_SECS", "-5"),
			("WHOOP_REFRESH_LOCK_TTL_SECS", "1000000000000"),
		] {
			let mut pairs = BASE.to_vec();

			pairs.push((key, value));

			let err = CoordinatorConfig::from_lookup("WHOOP", lookup(&pairs))
				.expect_err("Out-of-range tuning should be rejected.");

			assert!(matches!(err, ConfigError::InvalidEnv { key: ref k, .. } if k == key));
		}
	}

	#[test]
	fn settings_setters_clamp_durations() {
		let settings = CoordinatorSettings::default()
			.with_safety_margin(Duration::MAX)
			.with_lock_ttl(Duration::seconds(-3))
			.with_poll_backoff(Duration::milliseconds(20), Duration::MAX);

		assert_eq!(settings.safety_margin, CoordinatorSettings::MAX_DURATION);
		assert_eq!(settings.lock_ttl, Duration::MILLISECOND);
		assert_eq!(settings.poll_initial_backoff, Duration::milliseconds(20));
		assert_eq!(settings.poll_max_backoff, CoordinatorSettings::MAX_DURATION);
	}

	#[test]
	fn debug_output_hides_secrets() {
		let config = CoordinatorConfig::from_lookup("WHOOP", lookup(BASE))
			.expect("Minimal environment should produce a config.");
		let rendered = format!("{config:?}");

		assert!(!rendered.contains("secret\""));
		assert!(rendered.contains("client_secret_set: true"));
	}
}
