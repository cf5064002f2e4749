//! Provider strategy hooks that customize refresh requests and classify failures.

// self
use crate::_prelude::*;

/// Hook for provider-specific refresh behavior.
///
/// Implementors work on crate-owned data only, so no HTTP client types leak in.
/// `augment_refresh_request` defaults to a no-op.
pub trait ProviderStrategy: Send + Sync {
	/// Maps a failed token endpoint exchange into the error taxonomy.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;

	/// Adds provider-specific form fields before the refresh request is sent.
	fn augment_refresh_request(&self, _form: &mut BTreeMap<String, String>) {}
}

/// Canonical provider error categories used by strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// Refresh token rejected (already rotated, revoked, expired).
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// Provider refused the requested scopes.
	InsufficientScope,
	/// Failure is temporary; a later caller may succeed.
	Transient,
}

/// Primitive description of a failed token endpoint call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// HTTP status code returned by the provider, when available.
	pub http_status: Option<u16>,
	/// Provider-supplied OAuth `error` field.
	pub oauth_error: Option<String>,
	/// Provider-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Truncated response body for non-JSON payloads.
	pub body_preview: Option<String>,
}
impl ProviderErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates a context for the provided HTTP status.
	pub fn with_status(status: u16) -> Self {
		Self { http_status: Some(status), ..Self::default() }
	}

	/// Adds the OAuth error code string returned by the provider.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds a body preview, truncated to a fixed number of characters.
	pub fn with_body_preview(mut self, body: &str) -> Self {
		let mut preview: String = body.chars().take(Self::BODY_PREVIEW_LIMIT).collect();

		if body.chars().nth(Self::BODY_PREVIEW_LIMIT).is_some() {
			preview.push('…');
		}

		self.body_preview = Some(preview);

		self
	}

	/// Returns the most descriptive message available for error reporting.
	pub fn summary(&self) -> String {
		match (&self.error_description, &self.oauth_error, self.http_status) {
			(Some(description), _, _) => description.clone(),
			(None, Some(code), _) => code.clone(),
			(None, None, Some(status)) => format!("HTTP {status}"),
			(None, None, None) => "unknown token endpoint failure".into(),
		}
	}
}

/// RFC 6749 heuristics: structured OAuth fields first, then body hints, then status.
#[derive(Debug, Default)]
pub struct DefaultProviderStrategy;
impl ProviderStrategy for DefaultProviderStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		[ctx.oauth_error.as_deref(), ctx.error_description.as_deref(), ctx.body_preview.as_deref()]
			.into_iter()
			.flatten()
			.find_map(classify_text)
			.unwrap_or_else(|| classify_status(ctx.http_status))
	}
}

fn classify_text(text: &str) -> Option<ProviderErrorKind> {
	const TABLE: &[(&str, ProviderErrorKind)] = &[
		("invalid_grant", ProviderErrorKind::InvalidGrant),
		("access_denied", ProviderErrorKind::InvalidGrant),
		("invalid_client", ProviderErrorKind::InvalidClient),
		("unauthorized_client", ProviderErrorKind::InvalidClient),
		("invalid_scope", ProviderErrorKind::InsufficientScope),
		("insufficient_scope", ProviderErrorKind::InsufficientScope),
		("temporarily_unavailable", ProviderErrorKind::Transient),
		("server_error", ProviderErrorKind::Transient),
	];

	let lowered = text.to_ascii_lowercase();

	TABLE.iter().find(|(needle, _)| lowered.contains(needle)).map(|(_, kind)| *kind)
}

fn classify_status(status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(400 | 404 | 410) => ProviderErrorKind::InvalidGrant,
		Some(401) => ProviderErrorKind::InvalidClient,
		Some(403) => ProviderErrorKind::InsufficientScope,
		_ => ProviderErrorKind::Transient,
	}
}
