//! Resource calls with one-shot recovery from a rejected access token.

// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	coordinator::TokenCoordinator,
	http::TokenHttpClient,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// What a resource call reported about the token it was given.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceResponse<T> {
	/// The call was accepted; carries its result.
	Authorized(T),
	/// The resource API answered 401.
	Unauthorized,
}

impl<C> TokenCoordinator<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Runs `request` with a valid token, retrying exactly once after a 401.
	///
	/// On the first [`ResourceResponse::Unauthorized`] the cached token is invalidated
	/// and a new one obtained before the single retry. A second rejection is returned as
	/// [`Error::Unauthorized`]. Errors returned by `request` pass through untouched.
	pub async fn execute_authenticated<T, F, Fut>(&self, mut request: F) -> Result<T>
	where
		F: FnMut(AccessToken) -> Fut,
		Fut: Future<Output = Result<ResourceResponse<T>>>,
	{
		const KIND: FlowKind = FlowKind::Authenticated;

		let span = FlowSpan::new(KIND, "execute_authenticated");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let token = self.ensure_valid_token().await?;

				if let ResourceResponse::Authorized(value) = request(token).await? {
					return Ok(value);
				}

				obs::resource_unauthorized(1);
				self.invalidate_token().await;

				let token = self.ensure_valid_token().await?;

				match request(token).await? {
					ResourceResponse::Authorized(value) => Ok(value),
					ResourceResponse::Unauthorized => {
						obs::resource_unauthorized(2);

						Err(Error::Unauthorized {
							reason: "request was rejected again with a freshly refreshed token"
								.into(),
						})
					},
				}
			})
			.await;

		obs::record_flow_result(KIND, &result);

		result
	}

	/// Sends the request built by `build` with bearer auth, retrying once after a 401.
	///
	/// `build` runs once per attempt. Transport failures surface as [`Error::Resource`];
	/// every non-401 response, including other error statuses, is returned to the caller.
	#[cfg(feature = "reqwest")]
	pub async fn execute_request<F>(&self, build: F) -> Result<reqwest::Response>
	where
		F: Fn() -> reqwest::RequestBuilder,
	{
		self.execute_authenticated(|token| {
			let request = build().bearer_auth(token.expose());

			async move {
				let response = request.send().await.map_err(Error::resource)?;

				if response.status() == reqwest::StatusCode::UNAUTHORIZED {
					Ok(ResourceResponse::Unauthorized)
				} else {
					Ok(ResourceResponse::Authorized(response))
				}
			}
		})
		.await
	}
}
