//! Validated provider endpoint metadata.

// self
use crate::{_prelude::*, config::ClientSecrets, error::ConfigError};

const GOOGLE_AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/auth";
const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Token endpoint grants the relay performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GrantType {
	/// Authorization Code exchange on the callback.
	AuthorizationCode,
	/// Refresh Token grant used for transparent renewal.
	RefreshToken,
}
impl GrantType {
	/// Returns the RFC 6749 `grant_type` value.
	pub const fn as_str(self) -> &'static str {
		match self {
			GrantType::AuthorizationCode => "authorization_code",
			GrantType::RefreshToken => "refresh_token",
		}
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// How the client authenticates at the token endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClientAuthMethod {
	#[default]
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
}

/// Immutable provider descriptor consumed by the OAuth client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderDescriptor {
	/// Authorization endpoint the browser is redirected to.
	pub authorization_endpoint: Url,
	/// Token endpoint used for exchanges and refreshes.
	pub token_endpoint: Url,
	/// Client authentication mechanism.
	pub client_auth: ClientAuthMethod,
	/// Extra query parameters appended to the authorization URL.
	pub authorize_params: Vec<(String, String)>,
}
impl ProviderDescriptor {
	/// Validates the endpoints and creates a descriptor without extra parameters.
	pub fn new(authorization_endpoint: Url, token_endpoint: Url) -> Result<Self, ConfigError> {
		validate_endpoint("authorization", &authorization_endpoint)?;
		validate_endpoint("token", &token_endpoint)?;

		Ok(Self {
			authorization_endpoint,
			token_endpoint,
			client_auth: ClientAuthMethod::default(),
			authorize_params: Vec::new(),
		})
	}

	/// Google's endpoints with the parameters required to obtain a refresh token.
	pub fn google() -> Result<Self, ConfigError> {
		let authorization = parse_endpoint(GOOGLE_AUTHORIZATION_ENDPOINT)?;
		let token = parse_endpoint(GOOGLE_TOKEN_ENDPOINT)?;

		Self::with_google_params(authorization, token)
	}

	/// Builds a descriptor from the endpoints listed in a client secrets file.
	pub fn from_client_secrets(secrets: &ClientSecrets) -> Result<Self, ConfigError> {
		let authorization = match &secrets.auth_uri {
			Some(uri) => parse_endpoint(uri)?,
			None => parse_endpoint(GOOGLE_AUTHORIZATION_ENDPOINT)?,
		};
		let token = match &secrets.token_uri {
			Some(uri) => parse_endpoint(uri)?,
			None => parse_endpoint(GOOGLE_TOKEN_ENDPOINT)?,
		};

		Self::with_google_params(authorization, token)
	}

	/// Appends an extra authorization parameter.
	pub fn with_authorize_param(
		mut self,
		key: impl Into<String>,
		value: impl Into<String>,
	) -> Self {
		self.authorize_params.push((key.into(), value.into()));

		self
	}

	/// Overrides the client authentication mechanism.
	pub fn with_client_auth(mut self, method: ClientAuthMethod) -> Self {
		self.client_auth = method;

		self
	}

	fn with_google_params(authorization: Url, token: Url) -> Result<Self, ConfigError> {
		Ok(Self::new(authorization, token)?
			.with_authorize_param("access_type", "offline")
			.with_authorize_param("include_granted_scopes", "true")
			.with_authorize_param("prompt", "consent"))
	}
}

fn parse_endpoint(raw: &str) -> Result<Url, ConfigError> {
	Url::parse(raw).map_err(|source| ConfigError::InvalidEndpoint { source })
}

// Plain HTTP is tolerated only for loopback hosts (local mocks and development).
fn validate_endpoint(endpoint: &'static str, url: &Url) -> Result<(), ConfigError> {
	let loopback = matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));

	match url.scheme() {
		"https" => Ok(()),
		"http" if loopback => Ok(()),
		_ => Err(ConfigError::InsecureEndpoint { endpoint, url: url.to_string() }),
	}
}
