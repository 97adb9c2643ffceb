//! Authorization-code handshake per browser session.
//!
//! A session moves from unauthenticated to awaiting-callback when
//! [`AuthorizationController::begin`] issues a state token, and to authenticated once
//! [`AuthorizationController::complete`] verifies the returned state and exchanges the code.
//! Every callback consumes the pending state, so a token can be presented at most once.

pub mod pending;

pub use pending::PendingAuthorizations;

// self
use crate::{
	_prelude::*,
	auth::{AUTHORIZATION_TTL, AuthorizationState, Credential, SessionId},
	error::StateMismatch,
	oauth::OAuthClient,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::CredentialStore,
};

/// Query parameters the provider appends to the redirect URI.
#[derive(Clone, Default, Deserialize)]
pub struct CallbackParams {
	/// Returned state token.
	#[serde(default)]
	pub state: Option<String>,
	/// Authorization code.
	#[serde(default)]
	pub code: Option<String>,
	/// Provider error code, such as `access_denied`.
	#[serde(default)]
	pub error: Option<String>,
}
impl Debug for CallbackParams {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CallbackParams")
			.field("state_present", &self.state.is_some())
			.field("code_present", &self.code.is_some())
			.field("error", &self.error)
			.finish()
	}
}

/// Where a session stands in the handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
	/// No credential and no pending authorization.
	Unauthenticated,
	/// An authorization was issued and its callback has not arrived.
	AwaitingCallback,
	/// A credential is stored for the session.
	Authenticated,
}

/// Drives the handshake and stores the resulting credentials.
#[derive(Clone, Debug)]
pub struct AuthorizationController {
	client: OAuthClient,
	store: CredentialStore,
	pending: PendingAuthorizations,
	ttl: Duration,
}
impl AuthorizationController {
	/// Creates a controller with the default ten-minute authorization lifetime.
	pub fn new(client: OAuthClient, store: CredentialStore) -> Self {
		Self { client, store, pending: Default::default(), ttl: AUTHORIZATION_TTL }
	}

	/// Overrides how long an issued state token stays redeemable.
	pub fn with_ttl(mut self, ttl: Duration) -> Self {
		self.ttl = ttl;

		self
	}

	/// Pending authorizations tracked by this controller.
	pub fn pending(&self) -> &PendingAuthorizations {
		&self.pending
	}

	/// Credential store the controller writes into.
	pub fn store(&self) -> &CredentialStore {
		&self.store
	}

	/// Issues a fresh state token for `session` and returns the provider URL to redirect to.
	pub fn begin(&self, session: &SessionId) -> Url {
		self.begin_at(session, OffsetDateTime::now_utc())
	}

	/// Same as [`begin`](Self::begin) with an explicit clock reading.
	pub fn begin_at(&self, session: &SessionId, now: OffsetDateTime) -> Url {
		obs::record_flow_outcome(FlowKind::Authorization, FlowOutcome::Attempt);

		FlowSpan::new(FlowKind::Authorization, "begin").in_scope(|| {
			let state = AuthorizationState::issue(now);
			let url = self.client.authorize_url(&state);

			self.pending.insert(session.clone(), state, now, self.ttl);

			tracing::debug!(?session, "authorization issued");

			url
		})
	}

	/// Verifies the callback and exchanges its code, storing the credential on success.
	pub async fn complete(
		&self,
		session: &SessionId,
		params: CallbackParams,
	) -> Result<Credential> {
		self.complete_at(session, params, OffsetDateTime::now_utc()).await
	}

	/// Same as [`complete`](Self::complete) with an explicit clock reading.
	pub async fn complete_at(
		&self,
		session: &SessionId,
		params: CallbackParams,
		now: OffsetDateTime,
	) -> Result<Credential> {
		const KIND: FlowKind = FlowKind::Authorization;

		let span = FlowSpan::new(KIND, "complete");
		let result = span.instrument(self.complete_inner(session, params, now)).await;

		obs::record_flow_outcome(KIND, FlowOutcome::of(&result));

		if let Err(err) = &result {
			tracing::warn!(?session, kind = %err.kind(), error = %err, "authorization failed");
		}

		result
	}

	async fn complete_inner(
		&self,
		session: &SessionId,
		params: CallbackParams,
		now: OffsetDateTime,
	) -> Result<Credential> {
		let issued = self.pending.take(session);
		let returned = params
			.state
			.as_deref()
			.ok_or(Error::AuthorizationStateMismatch(StateMismatch::Missing))?;
		let issued = issued.ok_or(Error::AuthorizationStateMismatch(StateMismatch::NotIssued))?;

		if issued.is_expired_at(now, self.ttl) {
			return Err(Error::AuthorizationStateMismatch(StateMismatch::Expired));
		}
		if !issued.token.matches(returned) {
			return Err(Error::AuthorizationStateMismatch(StateMismatch::Mismatch));
		}
		if let Some(error) = params.error {
			return Err(Error::token_exchange(format!("provider returned {error}"), None));
		}

		let code = params
			.code
			.filter(|code| !code.is_empty())
			.ok_or_else(|| Error::token_exchange("callback carried no authorization code", None))?;
		let credential = self
			.client
			.exchange_code(&code, issued.pkce.verifier())
			.await
			.map_err(|err| Error::token_exchange("code exchange failed", Some(err)))?;

		self.store.put(session, &credential).await?;

		tracing::info!(?session, expires_at = %credential.expires_at, "session authenticated");

		Ok(credential)
	}

	/// Reports the session's handshake state.
	///
	/// An undecodable stored blob is cleared and the session reported unauthenticated.
	pub async fn status(&self, session: &SessionId) -> Result<SessionStatus> {
		match self.store.get(session).await {
			Ok(Some(_)) => return Ok(SessionStatus::Authenticated),
			Ok(None) => {},
			Err(err @ Error::Decode(_)) => {
				tracing::warn!(?session, error = %err, "clearing undecodable credential");

				self.store.clear(session).await?;
			},
			Err(err) => return Err(err),
		}

		if self.pending.is_pending(session, OffsetDateTime::now_utc(), self.ttl) {
			Ok(SessionStatus::AwaitingCallback)
		} else {
			Ok(SessionStatus::Unauthenticated)
		}
	}

	/// Forgets the session's credential and any pending authorization.
	pub async fn logout(&self, session: &SessionId) -> Result<bool> {
		self.pending.take(session);

		let cleared = self.store.clear(session).await?;

		tracing::info!(?session, cleared, "session logged out");

		Ok(cleared)
	}
}
