//! Pending authorizations awaiting their callback.

// self
use crate::{
	_prelude::*,
	auth::{AuthorizationState, SessionId},
};

/// Process-wide map from session to the authorization it is waiting on.
///
/// Each session holds at most one pending entry; a newer `begin` replaces the older one. Expired
/// entries are purged whenever a new one is inserted.
#[derive(Clone, Debug, Default)]
pub struct PendingAuthorizations(Arc<Mutex<HashMap<SessionId, AuthorizationState>>>);
impl PendingAuthorizations {
	/// Records `state` for `session`, dropping entries older than `ttl`.
	pub fn insert(
		&self,
		session: SessionId,
		state: AuthorizationState,
		now: OffsetDateTime,
		ttl: Duration,
	) {
		let mut pending = self.0.lock();

		pending.retain(|_, state| !state.is_expired_at(now, ttl));
		pending.insert(session, state);
	}

	/// Removes and returns the session's pending authorization.
	pub fn take(&self, session: &SessionId) -> Option<AuthorizationState> {
		self.0.lock().remove(session)
	}

	/// Returns `true` if the session has an unexpired pending authorization.
	pub fn is_pending(&self, session: &SessionId, now: OffsetDateTime, ttl: Duration) -> bool {
		self.0.lock().get(session).is_some_and(|state| !state.is_expired_at(now, ttl))
	}

	/// Number of tracked entries, expired ones included.
	pub fn len(&self) -> usize {
		self.0.lock().len()
	}

	/// Returns `true` when nothing is pending.
	pub fn is_empty(&self) -> bool {
		self.0.lock().is_empty()
	}
}
