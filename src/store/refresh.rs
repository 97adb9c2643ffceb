//! Expiry-aware credential refresh under the per-session guard.
//!
//! [`CredentialStore::ensure_fresh`] holds the session's guard for the whole read, refresh, and
//! write sequence, so concurrent requests from one browser trigger at most one token-endpoint
//! call while other sessions proceed untouched.

// self
use crate::{
	_prelude::*,
	auth::{Credential, REFRESH_WINDOW, SessionId},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	storage::RemoteStorage,
	store::CredentialStore,
};

impl CredentialStore {
	/// Returns a credential valid beyond the preemptive window, refreshing it at most once.
	pub async fn ensure_fresh(
		&self,
		session: &SessionId,
		storage: &dyn RemoteStorage,
	) -> Result<Credential> {
		self.ensure_fresh_at(session, storage, OffsetDateTime::now_utc()).await
	}

	/// Same as [`ensure_fresh`](Self::ensure_fresh) with an explicit clock reading.
	pub async fn ensure_fresh_at(
		&self,
		session: &SessionId,
		storage: &dyn RemoteStorage,
		now: OffsetDateTime,
	) -> Result<Credential> {
		let _singleflight = self.lock(session).await;
		let current = match self.load_unlocked(session).await {
			Ok(Some(current)) => current,
			Ok(None) => return Err(Error::Unauthenticated),
			Err(err @ Error::Decode(_)) => {
				tracing::warn!(?session, error = %err, "clearing undecodable credential");

				self.backend.clear(session).await?;

				return Err(err);
			},
			Err(err) => return Err(err),
		};

		if !current.needs_refresh_at(now, REFRESH_WINDOW) {
			return Ok(current);
		}
		if !current.can_refresh() {
			if current.is_expired_at(now) {
				self.backend.clear(session).await?;

				return Err(Error::CredentialRefresh {
					source: Box::new(Error::InvalidGrant {
						reason: "credential expired and no refresh token was issued".into(),
					}),
				});
			}

			return Ok(current);
		}

		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "ensure_fresh");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.refresh_locked(session, storage, current, now)).await;

		obs::record_flow_outcome(KIND, FlowOutcome::of(&result));

		result
	}

	async fn refresh_locked(
		&self,
		session: &SessionId,
		storage: &dyn RemoteStorage,
		current: Credential,
		now: OffsetDateTime,
	) -> Result<Credential> {
		let mut refreshed = match storage.refresh_credential(&current).await {
			Ok(refreshed) => refreshed,
			Err(err) if err.is_grant_rejection() => {
				tracing::info!(?session, error = %err, "refresh token rejected; demoting session");

				self.backend.clear(session).await?;

				return Err(Error::CredentialRefresh { source: Box::new(err) });
			},
			// Still usable: ride out a token-endpoint hiccup on the current access token.
			Err(err) if !current.is_expired_at(now) => {
				tracing::warn!(?session, error = %err, "refresh failed; reusing credential");

				return Ok(current);
			},
			Err(err) => return Err(err),
		};

		if refreshed.refresh_token.is_none() {
			refreshed.refresh_token = current.refresh_token.clone();
		}
		if !self.put_if_fresher_unlocked(session, &refreshed).await? {
			return Ok(current);
		}

		tracing::debug!(?session, expires_at = %refreshed.expires_at, "credential refreshed");

		Ok(refreshed)
	}
}
