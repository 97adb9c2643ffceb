//! Token endpoint facade over the `oauth2` crate.

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError, TokenResponse,
	TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::{AuthorizationState, Credential, DRIVE_FILE_SCOPE, ScopeSet, TokenSecret},
	error::{ConfigError, TransientError, TransportError},
	http::{ReqwestHttpClient, ResponseMetadata, ResponseMetadataSlot},
	provider::{
		ClientAuthMethod, DefaultProviderStrategy, GrantType, ProviderDescriptor,
		ProviderErrorContext, ProviderErrorKind, ProviderStrategy,
	},
};

type ConfiguredBasicClient =
	BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// OAuth client credentials issued to this application.
#[derive(Clone)]
pub struct ClientCredentials {
	/// Public client identifier.
	pub client_id: String,
	/// Client secret; callers must avoid logging it.
	pub client_secret: Option<TokenSecret>,
}
impl Debug for ClientCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientCredentials")
			.field("client_id", &self.client_id)
			.field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
			.finish()
	}
}

/// Builds authorization URLs and performs code exchanges and refreshes.
#[derive(Clone)]
pub struct OAuthClient {
	descriptor: ProviderDescriptor,
	client_id: String,
	redirect_uri: Url,
	scope: ScopeSet,
	oauth_client: ConfiguredBasicClient,
	http_client: ReqwestHttpClient,
	strategy: Arc<dyn ProviderStrategy>,
}
impl OAuthClient {
	/// Creates a client requesting the `drive.file` scope.
	pub fn new(
		descriptor: ProviderDescriptor,
		credentials: ClientCredentials,
		redirect_uri: Url,
		http_client: ReqwestHttpClient,
	) -> Result<Self, ConfigError> {
		let auth_url = AuthUrl::new(descriptor.authorization_endpoint.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;
		let token_url = TokenUrl::new(descriptor.token_endpoint.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;
		let redirect_url = RedirectUrl::new(redirect_uri.to_string())
			.map_err(|source| ConfigError::InvalidRedirect { source })?;
		let mut oauth_client = BasicClient::new(ClientId::new(credentials.client_id.clone()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url)
			.set_redirect_uri(redirect_url);

		if let Some(secret) = &credentials.client_secret {
			oauth_client =
				oauth_client.set_client_secret(ClientSecret::new(secret.expose().into()));
		}
		if matches!(descriptor.client_auth, ClientAuthMethod::ClientSecretPost) {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self {
			descriptor,
			client_id: credentials.client_id,
			redirect_uri,
			scope: ScopeSet::drive_file(),
			oauth_client,
			http_client,
			strategy: Arc::new(DefaultProviderStrategy),
		})
	}

	/// Replaces the error classification strategy.
	pub fn with_strategy(mut self, strategy: Arc<dyn ProviderStrategy>) -> Self {
		self.strategy = strategy;

		self
	}

	/// Redirect URI registered for the callback route.
	pub fn redirect_uri(&self) -> &Url {
		&self.redirect_uri
	}

	/// Scope requested on every authorization.
	pub fn scope(&self) -> &ScopeSet {
		&self.scope
	}

	/// Builds the provider URL the browser is redirected to.
	pub fn authorize_url(&self, state: &AuthorizationState) -> Url {
		let mut url = self.descriptor.authorization_endpoint.clone();
		let mut pairs = url.query_pairs_mut();

		pairs.append_pair("response_type", "code");
		pairs.append_pair("client_id", &self.client_id);
		pairs.append_pair("redirect_uri", self.redirect_uri.as_str());
		pairs.append_pair("scope", &self.scope.normalized());
		pairs.append_pair("state", state.token.as_str());
		pairs.append_pair("code_challenge", state.pkce.challenge());
		pairs.append_pair("code_challenge_method", state.pkce.method().as_str());

		for (key, value) in &self.descriptor.authorize_params {
			pairs.append_pair(key, value);
		}

		drop(pairs);

		url
	}

	/// Exchanges an authorization code for a credential.
	pub async fn exchange_code(&self, code: &str, verifier: &TokenSecret) -> Result<Credential> {
		let meta = ResponseMetadataSlot::default();
		let handle = self.http_client.instrumented(meta.clone());
		let response = self
			.oauth_client
			.exchange_code(AuthorizationCode::new(code.to_owned()))
			.set_pkce_verifier(PkceCodeVerifier::new(verifier.expose().to_owned()))
			.set_redirect_uri(Cow::Owned(RedirectUrl::from_url(self.redirect_uri.clone())))
			.request_async(&handle)
			.await
			.map_err(|err| self.map_request_error(GrantType::AuthorizationCode, meta.take(), err))?;

		self.map_token_response(response, None)
	}

	/// Redeems the credential's refresh token.
	///
	/// The returned credential keeps the previous refresh token when the provider omits one.
	pub async fn refresh(&self, credential: &Credential) -> Result<Credential> {
		let refresh_token = credential.refresh_token.as_ref().ok_or_else(|| Error::InvalidGrant {
			reason: "credential carries no refresh token".into(),
		})?;
		let meta = ResponseMetadataSlot::default();
		let handle = self.http_client.instrumented(meta.clone());
		let secret = RefreshToken::new(refresh_token.expose().to_owned());
		let response = self
			.oauth_client
			.exchange_refresh_token(&secret)
			.request_async(&handle)
			.await
			.map_err(|err| self.map_request_error(GrantType::RefreshToken, meta.take(), err))?;

		self.map_token_response(response, Some(credential))
	}

	fn map_token_response(
		&self,
		response: BasicTokenResponse,
		previous: Option<&Credential>,
	) -> Result<Credential> {
		let expires_in = response.expires_in().ok_or(ConfigError::MissingExpiresIn)?.as_secs();
		let expires_in = i64::try_from(expires_in).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

		if expires_in <= 0 {
			return Err(ConfigError::NonPositiveExpiresIn.into());
		}

		// Providers may omit `scope` when it equals the request; refreshes keep the prior grant.
		let scope = match response.scopes() {
			Some(scopes) => ScopeSet::new(scopes.iter().map(|scope| scope.to_string()))
				.map_err(ConfigError::from)?,
			None => previous.map(|c| c.scope.clone()).unwrap_or_else(|| self.scope.clone()),
		};

		if !scope.contains(DRIVE_FILE_SCOPE) {
			return Err(Error::InsufficientScope {
				reason: format!("granted scope `{scope}` lacks {DRIVE_FILE_SCOPE}"),
			});
		}

		let refresh = response
			.refresh_token()
			.map(|token| TokenSecret::new(token.secret().to_owned()))
			.or_else(|| previous.and_then(|c| c.refresh_token.clone()));

		Credential::builder(scope)
			.access_token(response.access_token().secret().to_owned())
			.refresh_secret(refresh)
			.issued_at(OffsetDateTime::now_utc())
			.expires_in(Duration::seconds(expires_in))
			.build()
			.map_err(|err| ConfigError::from(err).into())
	}

	fn map_request_error(
		&self,
		grant: GrantType,
		meta: Option<ResponseMetadata>,
		err: BasicRequestTokenError<HttpClientError<ReqwestError>>,
	) -> Error {
		let meta = meta.unwrap_or_default();

		match err {
			RequestTokenError::ServerResponse(response) =>
				self.map_server_response(grant, &response, &meta),
			RequestTokenError::Request(error) => self.map_transport_error(grant, &meta, error),
			RequestTokenError::Parse(source, _body) =>
				TransientError::TokenResponseParse { source, status: meta.status }.into(),
			RequestTokenError::Other(message) => TransientError::TokenEndpoint {
				message,
				status: meta.status,
				retry_after: meta.retry_after,
			}
			.into(),
		}
	}

	fn map_server_response(
		&self,
		grant: GrantType,
		response: &BasicErrorResponse,
		meta: &ResponseMetadata,
	) -> Error {
		let code = response.error().as_ref().to_owned();
		let ctx = ProviderErrorContext::new(grant)
			.with_oauth_error(code.clone())
			.with_error_description(response.error_description().cloned())
			.with_http_status(meta.status);
		let reason = response.error_description().cloned().unwrap_or(code);

		match self.strategy.classify_token_error(&ctx) {
			ProviderErrorKind::InvalidGrant => Error::InvalidGrant { reason },
			ProviderErrorKind::InvalidClient => Error::InvalidClient { reason },
			ProviderErrorKind::InsufficientScope => Error::InsufficientScope { reason },
			ProviderErrorKind::Transient => TransientError::TokenEndpoint {
				message: reason,
				status: meta.status,
				retry_after: meta.retry_after,
			}
			.into(),
		}
	}

	fn map_transport_error(
		&self,
		grant: GrantType,
		meta: &ResponseMetadata,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) if inner.is_builder() =>
				ConfigError::http_client_build(*inner).into(),
			HttpClientError::Reqwest(inner) if inner.is_timeout() => TransientError::TokenEndpoint {
				message: "request timed out".into(),
				status: meta.status,
				retry_after: meta.retry_after,
			}
			.into(),
			HttpClientError::Reqwest(inner) => {
				let ctx = ProviderErrorContext::network_failure(grant);

				tracing::debug!(?ctx, "token endpoint unreachable");

				TransportError::network(*inner).into()
			},
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => TransientError::TokenEndpoint {
				message,
				status: meta.status,
				retry_after: meta.retry_after,
			}
			.into(),
			_ => TransientError::TokenEndpoint {
				message: "unknown HTTP client error".into(),
				status: meta.status,
				retry_after: meta.retry_after,
			}
			.into(),
		}
	}
}
impl Debug for OAuthClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuthClient")
			.field("descriptor", &self.descriptor)
			.field("client_id", &self.client_id)
			.field("redirect_uri", &self.redirect_uri)
			.field("scope", &self.scope)
			.finish()
	}
}
