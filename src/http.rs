//! Transport primitives for refresh-grant exchanges.
//!
//! [`TokenHttpClient`] is the coordinator's only dependency on an HTTP stack. The
//! coordinator builds a [`TokenRequest`] (URL, form fields, extra headers) and expects
//! a [`TokenReply`] back carrying the status code, the parsed `Retry-After` hint, and
//! the raw body. Anything that fails before a status line arrives is reported through
//! [`TokenHttpClient::TransportError`] and surfaces as
//! [`TransportError::Network`](crate::error::TransportError::Network).

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
#[cfg(feature = "reqwest")] use reqwest::header::{HeaderMap, RETRY_AFTER};
#[cfg(feature = "reqwest")] use time::format_description::well_known::Rfc2822;
// self
use crate::_prelude::*;

/// Boxed future returned by [`TokenHttpClient::post_form`].
pub type HttpFuture<'a, E> = Pin<Box<dyn Future<Output = Result<TokenReply, E>> + 'a + Send>>;

/// Abstraction over HTTP transports able to POST a form to the token endpoint.
///
/// Implementations must be `Send + Sync + 'static` so one transport can be shared by
/// every coordinator in the process, and the returned future must be `Send` so the
/// coordinator's boxed futures inherit the guarantee.
pub trait TokenHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// Sends `request` as `application/x-www-form-urlencoded` and returns the raw reply.
	///
	/// Non-2xx statuses are replies, not errors; only failures that prevent a response
	/// from arriving should map to [`Self::TransportError`].
	fn post_form(&self, request: TokenRequest) -> HttpFuture<'_, Self::TransportError>;
}

/// Form POST addressed to the token endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenRequest {
	/// Token endpoint.
	pub url: Url,
	/// Form fields in submission order.
	pub form: Vec<(String, String)>,
	/// Extra request headers (for example `Authorization` for `client_secret_basic`).
	pub headers: Vec<(String, String)>,
}
impl TokenRequest {
	/// Returns the value of the first form field named `name`.
	pub fn form_value(&self, name: &str) -> Option<&str> {
		self.form.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
	}
}
impl Debug for TokenRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let fields = self.form.iter().map(|(key, _)| key.as_str()).collect::<Vec<_>>();
		let headers = self.headers.iter().map(|(key, _)| key.as_str()).collect::<Vec<_>>();

		f.debug_struct("TokenRequest")
			.field("url", &self.url.as_str())
			.field("form_fields", &fields)
			.field("headers", &headers)
			.finish()
	}
}

/// Raw token endpoint reply.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenReply {
	/// HTTP status code.
	pub status: u16,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
	/// Response body bytes.
	pub body: Vec<u8>,
}
impl TokenReply {
	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Token endpoints answer directly, so configure any custom client to disable redirect
/// following before handing it to the coordinator.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl TokenHttpClient for ReqwestHttpClient {
	type TransportError = ReqwestError;

	fn post_form(&self, request: TokenRequest) -> HttpFuture<'_, Self::TransportError> {
		let client = self.0.clone();

		Box::pin(async move {
			let mut builder = client
				.post(request.url)
				.header(reqwest::header::ACCEPT, "application/json")
				.form(&request.form);

			for (name, value) in &request.headers {
				builder = builder.header(name.as_str(), value.as_str());
			}

			let response = builder.send().await?;
			let status = response.status().as_u16();
			let retry_after = parse_retry_after(response.headers());
			let body = response.bytes().await?.to_vec();

			Ok(TokenReply { status, retry_after, body })
		})
	}
}

#[cfg(feature = "reqwest")]
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<i64>() {
		return Some(Duration::seconds(secs.max(0)));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}
