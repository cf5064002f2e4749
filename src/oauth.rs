//! Refresh-grant exchange against the provider's token endpoint.

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, TokenSecret},
	error::{ConfigError, TransientError, TransportError},
	http::{TokenHttpClient, TokenReply, TokenRequest},
	provider::{
		ClientAuthMethod, DefaultProviderStrategy, ProviderDescriptor, ProviderErrorContext,
		ProviderErrorKind, ProviderStrategy,
	},
};

type EndpointFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Tokens returned by a successful refresh exchange.
#[derive(Clone, Debug)]
pub struct RefreshGrant {
	/// Newly issued access token.
	pub access_token: AccessToken,
	/// Replacement refresh token; `None` when the provider kept the old one alive.
	pub refresh_token: Option<TokenSecret>,
}

#[derive(Deserialize)]
struct TokenResponseBody {
	access_token: String,
	#[serde(default)]
	refresh_token: Option<String>,
	#[serde(default)]
	expires_in: Option<i64>,
}

#[derive(Default, Deserialize)]
struct ErrorResponseBody {
	#[serde(default)]
	error: Option<String>,
	#[serde(default)]
	error_description: Option<String>,
}

/// Client for one provider's token endpoint.
pub struct TokenEndpoint<C>
where
	C: ?Sized + TokenHttpClient,
{
	descriptor: ProviderDescriptor,
	client_id: String,
	client_secret: Option<TokenSecret>,
	http_client: Arc<C>,
	strategy: Arc<dyn ProviderStrategy>,
}
impl<C> TokenEndpoint<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Creates an endpoint client that classifies failures with [`DefaultProviderStrategy`].
	pub fn new(
		descriptor: ProviderDescriptor,
		client_id: impl Into<String>,
		http_client: impl Into<Arc<C>>,
	) -> Self {
		Self {
			descriptor,
			client_id: client_id.into(),
			client_secret: None,
			http_client: http_client.into(),
			strategy: Arc::new(DefaultProviderStrategy),
		}
	}

	/// Sets the client secret sent with every exchange.
	pub fn with_client_secret(mut self, secret: impl Into<TokenSecret>) -> Self {
		self.client_secret = Some(secret.into());

		self
	}

	/// Replaces the provider strategy.
	pub fn with_strategy(mut self, strategy: Arc<dyn ProviderStrategy>) -> Self {
		self.strategy = strategy;

		self
	}

	/// Descriptor this endpoint talks to.
	pub fn descriptor(&self) -> &ProviderDescriptor {
		&self.descriptor
	}

	/// Builds the form POST for a refresh grant.
	pub fn refresh_request(&self, refresh_token: &str) -> TokenRequest {
		let mut form = BTreeMap::new();

		form.insert("grant_type".to_owned(), "refresh_token".to_owned());
		form.insert("refresh_token".to_owned(), refresh_token.to_owned());

		let mut headers = Vec::new();

		match self.descriptor.client_auth_method {
			ClientAuthMethod::ClientSecretPost => {
				form.insert("client_id".to_owned(), self.client_id.clone());

				if let Some(secret) = &self.client_secret {
					form.insert("client_secret".to_owned(), secret.expose().to_owned());
				}
			},
			ClientAuthMethod::ClientSecretBasic => {
				let secret = self.client_secret.as_ref().map(TokenSecret::expose).unwrap_or_default();
				let pair = format!("{}:{}", form_encode(&self.client_id), form_encode(secret));

				headers.push(("authorization".to_owned(), format!("Basic {}", STANDARD.encode(pair))));
			},
		}

		self.strategy.augment_refresh_request(&mut form);

		TokenRequest {
			url: self.descriptor.token_endpoint.clone(),
			form: form.into_iter().collect(),
			headers,
		}
	}

	/// Exchanges `refresh_token` for a new token pair.
	///
	/// The caller must treat `refresh_token` as spent once this future starts: providers
	/// with single-use rotation invalidate it as soon as they accept the request.
	pub fn refresh<'a>(&'a self, refresh_token: &'a str) -> EndpointFuture<'a, RefreshGrant> {
		Box::pin(async move {
			let request = self.refresh_request(refresh_token);
			let reply =
				self.http_client.post_form(request).await.map_err(TransportError::network)?;

			if reply.is_success() {
				parse_grant(&reply, OffsetDateTime::now_utc())
			} else {
				Err(self.classify_failure(&reply))
			}
		})
	}

	fn classify_failure(&self, reply: &TokenReply) -> Error {
		let parsed = serde_json::from_slice::<ErrorResponseBody>(&reply.body).unwrap_or_default();
		let mut ctx = ProviderErrorContext::with_status(reply.status);

		if let Some(code) = parsed.error {
			ctx = ctx.with_oauth_error(code);
		}
		if let Some(description) = parsed.error_description {
			ctx = ctx.with_error_description(description);
		}
		if ctx.oauth_error.is_none() && !reply.body.is_empty() {
			ctx = ctx.with_body_preview(&String::from_utf8_lossy(&reply.body));
		}

		let reason = ctx.summary();

		match self.strategy.classify_token_error(&ctx) {
			ProviderErrorKind::InvalidGrant => Error::InvalidGrant { reason },
			ProviderErrorKind::InvalidClient => Error::InvalidClient { reason },
			ProviderErrorKind::InsufficientScope => Error::InsufficientScope { reason },
			ProviderErrorKind::Transient => TransientError::TokenEndpoint {
				message: reason,
				status: Some(reply.status),
				retry_after: reply.retry_after,
			}
			.into(),
		}
	}
}
impl<C> Debug for TokenEndpoint<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenEndpoint")
			.field("descriptor", &self.descriptor)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.finish()
	}
}

fn parse_grant(reply: &TokenReply, issued_at: OffsetDateTime) -> Result<RefreshGrant> {
	let mut deserializer = serde_json::Deserializer::from_slice(&reply.body);
	let body: TokenResponseBody = serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| TransientError::TokenResponseParse { source, status: Some(reply.status) })?;
	let expires_in = body.expires_in.ok_or(ConfigError::MissingExpiresIn)?;

	if expires_in <= 0 {
		return Err(ConfigError::NonPositiveExpiresIn.into());
	}

	let expires_at = issued_at
		.checked_add(Duration::seconds(expires_in))
		.ok_or(ConfigError::ExpiresInOutOfRange)?;

	Ok(RefreshGrant {
		access_token: AccessToken::new(body.access_token, expires_at),
		refresh_token: body.refresh_token.filter(|token| !token.is_empty()).map(TokenSecret::new),
	})
}

fn form_encode(value: &str) -> String {
	url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::{auth::ProviderId, http::HttpFuture};

	struct NeverClient;
	impl TokenHttpClient for NeverClient {
		type TransportError = std::io::Error;

		fn post_form(&self, _: TokenRequest) -> HttpFuture<'_, Self::TransportError> {
			Box::pin(async { Err(std::io::Error::other("offline")) })
		}
	}

	fn endpoint(method: ClientAuthMethod) -> TokenEndpoint<NeverClient> {
		let descriptor =
			ProviderDescriptor::builder(ProviderId::new("whoop").expect("Id should be valid."))
				.token_endpoint(Url::parse("https://example.com/token").expect("URL should parse."))
				.client_auth_method(method)
				.build()
				.expect("Descriptor should build.");

		TokenEndpoint::new(descriptor, "client id", NeverClient).with_client_secret("s&cret")
	}

	fn reply(status: u16, body: &str) -> TokenReply {
		TokenReply { status, retry_after: None, body: body.as_bytes().to_vec() }
	}

	#[test]
	fn post_auth_sends_credentials_in_the_form() {
		let request = endpoint(ClientAuthMethod::ClientSecretPost).refresh_request("rt-1");

		assert_eq!(request.form_value("grant_type"), Some("refresh_token"));
		assert_eq!(request.form_value("refresh_token"), Some("rt-1"));
		assert_eq!(request.form_value("client_id"), Some("client id"));
		assert_eq!(request.form_value("client_secret"), Some("s&cret"));
		assert!(request.headers.is_empty());
	}

	#[test]
	fn basic_auth_moves_credentials_into_the_header() {
		let request = endpoint(ClientAuthMethod::ClientSecretBasic).refresh_request("rt-1");
		let expected = format!("Basic {}", STANDARD.encode("client+id:s%26cret"));

		assert_eq!(request.form_value("client_secret"), None);
		assert_eq!(request.headers, vec![("authorization".to_owned(), expected)]);
	}

	#[test]
	fn grants_compute_absolute_expiry() {
		let issued = macros::datetime!(2025-06-01 12:00 UTC);
		let grant = parse_grant(
			&reply(200, r#"{"access_token":"at","refresh_token":"rt","expires_in":3600}"#),
			issued,
		)
		.expect("Valid body should parse.");

		assert_eq!(grant.access_token.expose(), "at");
		assert_eq!(grant.access_token.expires_at, macros::datetime!(2025-06-01 13:00 UTC));
		assert_eq!(grant.refresh_token.as_ref().map(TokenSecret::expose), Some("rt"));
	}

	#[test]
	fn grant_validation_rejects_bad_lifetimes_and_shapes() {
		let now = OffsetDateTime::now_utc();

		assert!(matches!(
			parse_grant(&reply(200, r#"{"access_token":"at"}"#), now),
			Err(Error::Config(ConfigError::MissingExpiresIn))
		));
		assert!(matches!(
			parse_grant(&reply(200, r#"{"access_token":"at","expires_in":0}"#), now),
			Err(Error::Config(ConfigError::NonPositiveExpiresIn))
		));

		let err = parse_grant(&reply(200, r#"{"access_token":7,"expires_in":60}"#), now)
			.expect_err("Wrong field types should fail.");

		match err {
			Error::Transient(TransientError::TokenResponseParse { source, status }) => {
				assert_eq!(source.path().to_string(), "access_token");
				assert_eq!(status, Some(200));
			},
			other => panic!("Unexpected error: {other:?}"),
		}
	}

	#[test]
	fn failures_are_classified_by_the_strategy() {
		let endpoint = endpoint(ClientAuthMethod::ClientSecretPost);

		assert!(matches!(
			endpoint.classify_failure(&reply(400, r#"{"error":"invalid_grant"}"#)),
			Error::InvalidGrant { .. }
		));
		assert!(matches!(
			endpoint.classify_failure(&reply(401, r#"{"error":"invalid_client"}"#)),
			Error::InvalidClient { .. }
		));

		let mut unavailable = reply(503, "upstream down");

		unavailable.retry_after = Some(Duration::seconds(7));

		match endpoint.classify_failure(&unavailable) {
			Error::Transient(TransientError::TokenEndpoint { status, retry_after, .. }) => {
				assert_eq!(status, Some(503));
				assert_eq!(retry_after, Some(Duration::seconds(7)));
			},
			other => panic!("Unexpected error: {other:?}"),
		}
	}

	#[tokio::test]
	async fn transport_failures_map_to_network_errors() {
		let err = endpoint(ClientAuthMethod::ClientSecretPost)
			.refresh("rt-1")
			.await
			.expect_err("Offline transport should fail.");

		assert!(matches!(err, Error::Transport(TransportError::Network { .. })));
	}
}
