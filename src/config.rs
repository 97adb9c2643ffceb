//! Relay configuration: the app's OAuth client secrets and the tunable relay settings.

// std
use std::{fs, path::Path, time::Duration as StdDuration};
// self
use crate::{
	_prelude::*,
	auth::{AUTHORIZATION_TTL, FolderId, TokenSecret},
	error::ConfigError,
	oauth::ClientCredentials,
	relay::RetryPolicy,
};

/// Drive requires every non-final resumable chunk to be a multiple of this size.
pub const CHUNK_GRANULARITY: usize = 256 * 1024;
/// Default chunk size (8 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 32 * CHUNK_GRANULARITY;
/// Default cap on a single upload body (64 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;
/// Default bound on every outbound request.
pub const DEFAULT_REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(60);

/// One section of a Google `client_secrets.json` file.
#[derive(Clone, Deserialize)]
pub struct ClientSecrets {
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret.
	#[serde(default)]
	pub client_secret: Option<TokenSecret>,
	/// Authorization endpoint override.
	#[serde(default)]
	pub auth_uri: Option<String>,
	/// Token endpoint override.
	#[serde(default)]
	pub token_uri: Option<String>,
	/// Registered redirect URIs.
	#[serde(default)]
	pub redirect_uris: Vec<String>,
}
impl ClientSecrets {
	/// Reads and parses a client secrets file.
	pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let raw = fs::read_to_string(path).map_err(|source| ConfigError::ClientSecretsRead {
			path: path.display().to_string(),
			source,
		})?;

		Self::from_json(&raw)
	}

	/// Parses the `web` or `installed` layout, preferring `web` when both exist.
	pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
		#[derive(Deserialize)]
		struct Layout {
			web: Option<ClientSecrets>,
			installed: Option<ClientSecrets>,
		}

		let de = &mut serde_json::Deserializer::from_str(raw);
		let layout: Layout = serde_path_to_error::deserialize(de)
			.map_err(|source| ConfigError::ClientSecretsParse { source })?;

		layout.web.or(layout.installed).ok_or(ConfigError::ClientSecretsLayout)
	}

	/// Client credentials handed to the OAuth client.
	pub fn credentials(&self) -> ClientCredentials {
		ClientCredentials {
			client_id: self.client_id.clone(),
			client_secret: self.client_secret.clone(),
		}
	}

	/// Resolves the callback URI: the explicit override, else the first registered URI.
	pub fn redirect_uri(&self, explicit: Option<&str>) -> Result<Url, ConfigError> {
		let raw = explicit
			.or_else(|| self.redirect_uris.first().map(String::as_str))
			.ok_or(ConfigError::MissingRedirectUri)?;

		Url::parse(raw).map_err(|source| ConfigError::InvalidRedirect { source })
	}
}
impl Debug for ClientSecrets {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientSecrets")
			.field("client_id", &self.client_id)
			.field("client_secret", &self.client_secret)
			.field("auth_uri", &self.auth_uri)
			.field("token_uri", &self.token_uri)
			.field("redirect_uris", &self.redirect_uris)
			.finish()
	}
}

/// Tunables for the authorization flow, the upload relay, and the HTTP surface.
#[derive(Clone, Debug)]
pub struct RelaySettings {
	/// Shared destination folder.
	pub folder: FolderId,
	/// Bytes per resumable chunk.
	pub chunk_size: usize,
	/// Backoff policy for chunk and session-open retries.
	pub retry: RetryPolicy,
	/// Bound on every outbound HTTP request.
	pub request_timeout: StdDuration,
	/// Lifetime of a pending authorization.
	pub authorization_ttl: Duration,
	/// Largest accepted upload body.
	pub max_upload_bytes: usize,
	/// Whether session cookies carry the `Secure` attribute.
	pub secure_cookies: bool,
}
impl RelaySettings {
	/// Defaults targeting `folder`.
	pub fn new(folder: FolderId) -> Self {
		Self {
			folder,
			chunk_size: DEFAULT_CHUNK_SIZE,
			retry: RetryPolicy::default(),
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
			authorization_ttl: AUTHORIZATION_TTL,
			max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
			secure_cookies: true,
		}
	}

	/// Overrides the chunk size.
	pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
		self.chunk_size = chunk_size;

		self
	}

	/// Overrides the retry policy.
	pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	/// Overrides the outbound request timeout.
	pub fn with_request_timeout(mut self, timeout: StdDuration) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Overrides the pending authorization lifetime.
	pub fn with_authorization_ttl(mut self, ttl: Duration) -> Self {
		self.authorization_ttl = ttl;

		self
	}

	/// Overrides the upload body cap.
	pub fn with_max_upload_bytes(mut self, max: usize) -> Self {
		self.max_upload_bytes = max;

		self
	}

	/// Toggles the `Secure` cookie attribute (disable only for plain-HTTP development).
	pub fn with_secure_cookies(mut self, secure: bool) -> Self {
		self.secure_cookies = secure;

		self
	}

	/// Checks every setting, returning the first violation.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.chunk_size == 0 || self.chunk_size % CHUNK_GRANULARITY != 0 {
			return Err(ConfigError::invalid_setting(
				"chunk_size",
				format!("{} is not a positive multiple of {CHUNK_GRANULARITY}", self.chunk_size),
			));
		}
		if self.request_timeout.is_zero() {
			return Err(ConfigError::invalid_setting("request_timeout", "must be positive"));
		}
		if !self.authorization_ttl.is_positive() {
			return Err(ConfigError::invalid_setting("authorization_ttl", "must be positive"));
		}
		if self.max_upload_bytes == 0 {
			return Err(ConfigError::invalid_setting("max_upload_bytes", "must be positive"));
		}

		self.retry.validate()
	}
}
