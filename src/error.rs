//! Relay-wide error types and the user-facing failure taxonomy.

// self
use crate::{
	_prelude::*,
	auth::{CredentialBuilderError, ScopeValidationError},
	codec::DecodeError,
	relay::UploadError,
	store::StoreError,
};

/// Relay-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Session store backend failure.
	#[error("{0}")]
	Store(
		#[from]
		#[source]
		StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary token endpoint failure; retry later.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS) while calling the token endpoint.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Stored credential blob could not be decoded.
	#[error(transparent)]
	Decode(#[from] DecodeError),
	/// Upload relay failure.
	#[error(transparent)]
	Upload(#[from] UploadError),

	/// The session holds no credential.
	#[error("Session has no credential; authorization is required.")]
	Unauthenticated,
	/// The callback `state` did not match the authorization issued for the session.
	#[error("Authorization state rejected: {0}.")]
	AuthorizationStateMismatch(StateMismatch),
	/// The provider did not turn the callback into a credential.
	#[error("Token exchange failed: {reason}.")]
	TokenExchange {
		/// Short description of what went wrong.
		reason: String,
		/// Underlying provider or transport error, when one exists.
		#[source]
		source: Option<Box<Error>>,
	},
	/// The refresh token was rejected; the session was demoted.
	#[error("Credential refresh failed; the session must re-authorize.")]
	CredentialRefresh {
		/// Provider error that caused the demotion.
		#[source]
		source: Box<Error>,
	},

	/// Token lacks the Drive scope the relay needs.
	#[error("Token lacks the required scopes: {reason}.")]
	InsufficientScope {
		/// Provider- or relay-supplied reason string.
		reason: String,
	},
	/// Provider rejected the grant (bad code or refresh token).
	#[error("Provider rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Client authentication failed or client credentials are malformed.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider-supplied reason string.
		reason: String,
	},
}
impl Error {
	/// Classifies the error into the user-visible failure taxonomy.
	pub fn kind(&self) -> FailureKind {
		match self {
			Self::Unauthenticated => FailureKind::Unauthenticated,
			Self::AuthorizationStateMismatch(_) => FailureKind::AuthorizationStateMismatch,
			Self::TokenExchange { .. } => FailureKind::TokenExchangeFailure,
			Self::CredentialRefresh { .. } => FailureKind::CredentialRefreshFailure,
			Self::Decode(_) => FailureKind::DecodeError,
			Self::Upload(err) if err.is_transient() => FailureKind::TransientUploadFailure,
			Self::Upload(_) => FailureKind::PermanentUploadFailure,
			// Only the refresh path surfaces these unwrapped; the upload can be retried later.
			Self::Transient(_) | Self::Transport(_) => FailureKind::TransientUploadFailure,
			Self::Store(_)
			| Self::Config(_)
			| Self::InsufficientScope { .. }
			| Self::InvalidGrant { .. }
			| Self::InvalidClient { .. } => FailureKind::Internal,
		}
	}

	/// Returns `true` when the provider refused the grant itself, so retrying cannot help.
	pub fn is_grant_rejection(&self) -> bool {
		matches!(
			self,
			Self::InvalidGrant { .. } | Self::InvalidClient { .. } | Self::InsufficientScope { .. }
		)
	}

	pub(crate) fn token_exchange(reason: impl Into<String>, source: Option<Error>) -> Self {
		Self::TokenExchange { reason: reason.into(), source: source.map(Box::new) }
	}
}

/// Why a callback `state` parameter was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateMismatch {
	/// The callback carried no `state` parameter.
	Missing,
	/// No authorization is pending for the session.
	NotIssued,
	/// The pending authorization outlived its time-to-live.
	Expired,
	/// The returned token differs from the issued one.
	Mismatch,
}
impl StateMismatch {
	/// Returns a stable label suitable for logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Missing => "missing",
			Self::NotIssued => "not_issued",
			Self::Expired => "expired",
			Self::Mismatch => "mismatch",
		}
	}
}
impl Display for StateMismatch {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// User-visible failure classes the HTTP surface maps to redirects or error pages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
	/// No credential; restart the authorization flow.
	Unauthenticated,
	/// Callback state absent, expired, or forged; restart the flow.
	AuthorizationStateMismatch,
	/// Provider refused the code exchange; the user should retry.
	TokenExchangeFailure,
	/// Refresh token invalid or revoked; the session was demoted.
	CredentialRefreshFailure,
	/// Upload failed after exhausting retries.
	TransientUploadFailure,
	/// Upload rejected outright; retrying will not help.
	PermanentUploadFailure,
	/// Stored credential blob was corrupt; treated as unauthenticated.
	DecodeError,
	/// Local fault (store backend, configuration).
	Internal,
}
impl FailureKind {
	/// Returns a stable label suitable for logs, metrics, and query strings.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Unauthenticated => "unauthenticated",
			Self::AuthorizationStateMismatch => "authorization_state_mismatch",
			Self::TokenExchangeFailure => "token_exchange_failure",
			Self::CredentialRefreshFailure => "credential_refresh_failure",
			Self::TransientUploadFailure => "transient_upload_failure",
			Self::PermanentUploadFailure => "permanent_upload_failure",
			Self::DecodeError => "decode_error",
			Self::Internal => "internal",
		}
	}

	/// Returns `true` when the browser must go through `/authorize` again.
	pub const fn requires_authorization(self) -> bool {
		matches!(
			self,
			Self::Unauthenticated
				| Self::AuthorizationStateMismatch
				| Self::CredentialRefreshFailure
				| Self::DecodeError
		)
	}
}
impl Display for FailureKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Provider endpoint URL is invalid.
	#[error("Provider endpoint URL is invalid.")]
	InvalidEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Provider endpoint does not use HTTPS.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Redirect URI cannot be parsed.
	#[error("Redirect URI is invalid.")]
	InvalidRedirect {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Neither the settings nor the client secrets file name a redirect URI.
	#[error("No redirect URI is configured and the client secrets file lists none.")]
	MissingRedirectUri,
	/// The client secrets file could not be read.
	#[error("Failed to read client secrets from {path}.")]
	ClientSecretsRead {
		/// File that failed to open.
		path: String,
		/// Underlying IO failure.
		#[source]
		source: std::io::Error,
	},
	/// The client secrets file is not valid JSON of the expected shape.
	#[error("Client secrets are malformed.")]
	ClientSecretsParse {
		/// Structured parsing failure including the offending field path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// The client secrets file has neither a `web` nor an `installed` section.
	#[error("Client secrets must contain a `web` or `installed` section.")]
	ClientSecretsLayout,
	/// A relay setting is out of range.
	#[error("Setting `{name}` is invalid: {reason}.")]
	InvalidSetting {
		/// Setting name.
		name: &'static str,
		/// Why the value was refused.
		reason: String,
	},
	/// Requested scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] ScopeValidationError),
	/// Credential builder validation failed.
	#[error("Unable to build credential.")]
	CredentialBuild(#[from] CredentialBuilderError),
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

	pub(crate) fn invalid_setting(name: &'static str, reason: impl Into<String>) -> Self {
		Self::InvalidSetting { name, reason: reason.into() }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary token endpoint failures (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Provider returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
