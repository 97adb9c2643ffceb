//! Token-endpoint error classification.

// self
use crate::{_prelude::*, provider::GrantType};

const BODY_PREVIEW_LIMIT: usize = 256;

/// Provider hook that maps token-endpoint failures onto [`ProviderErrorKind`].
pub trait ProviderStrategy: Send + Sync {
	/// Classifies a failed token request.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;
}

/// Canonical provider error categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// Provider rejected the grant (bad code, revoked or expired refresh token).
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// The token does not cover the requested scopes.
	InsufficientScope,
	/// Failure is temporary and may be retried.
	Transient,
}

/// Primitive facts about a failed token request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// Grant associated with the failing request.
	pub grant_type: GrantType,
	/// HTTP status code returned by the provider, when available.
	pub http_status: Option<u16>,
	/// Provider-supplied OAuth `error` field.
	pub oauth_error: Option<String>,
	/// Provider-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Truncated body for non-JSON payloads.
	pub body_preview: Option<String>,
	/// Whether the failure happened before any response arrived.
	pub network_error: bool,
}
impl ProviderErrorContext {
	/// Creates an empty context for the grant.
	pub fn new(grant_type: GrantType) -> Self {
		Self {
			grant_type,
			http_status: None,
			oauth_error: None,
			error_description: None,
			body_preview: None,
			network_error: false,
		}
	}

	/// Context for failures that never reached the provider.
	pub fn network_failure(grant_type: GrantType) -> Self {
		Self { network_error: true, ..Self::new(grant_type) }
	}

	/// Adds an HTTP status code.
	pub fn with_http_status(mut self, status: Option<u16>) -> Self {
		self.http_status = status;

		self
	}

	/// Adds the OAuth `error` code.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: Option<String>) -> Self {
		self.error_description = description;

		self
	}

	/// Adds a body preview, truncated to a bounded number of characters.
	pub fn with_body_preview(mut self, body: &str) -> Self {
		self.body_preview = Some(body.chars().take(BODY_PREVIEW_LIMIT).collect());

		self
	}
}

/// RFC 6749 heuristics: structured OAuth fields first, then body hints, then the status code.
#[derive(Debug, Default)]
pub struct DefaultProviderStrategy;
impl ProviderStrategy for DefaultProviderStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		if ctx.network_error {
			return ProviderErrorKind::Transient;
		}

		[ctx.oauth_error.as_deref(), ctx.error_description.as_deref(), ctx.body_preview.as_deref()]
			.into_iter()
			.flatten()
			.find_map(classify_text)
			.unwrap_or_else(|| classify_status(ctx.http_status))
	}
}

const OAUTH_ERROR_CODES: &[(&str, ProviderErrorKind)] = &[
	("invalid_grant", ProviderErrorKind::InvalidGrant),
	("access_denied", ProviderErrorKind::InvalidGrant),
	("invalid_client", ProviderErrorKind::InvalidClient),
	("unauthorized_client", ProviderErrorKind::InvalidClient),
	("invalid_scope", ProviderErrorKind::InsufficientScope),
	("insufficient_scope", ProviderErrorKind::InsufficientScope),
	("temporarily_unavailable", ProviderErrorKind::Transient),
	("server_error", ProviderErrorKind::Transient),
];

fn classify_text(text: &str) -> Option<ProviderErrorKind> {
	let lowered = text.to_ascii_lowercase();

	OAUTH_ERROR_CODES
		.iter()
		.find(|(code, _)| lowered.contains(code))
		.map(|(_, kind)| *kind)
}

fn classify_status(status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(400 | 404 | 410) => ProviderErrorKind::InvalidGrant,
		Some(401) => ProviderErrorKind::InvalidClient,
		Some(403) => ProviderErrorKind::InsufficientScope,
		_ => ProviderErrorKind::Transient,
	}
}
