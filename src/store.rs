//! Session credential storage: a blob-level backend contract plus the typed, per-session
//! serialized [`CredentialStore`] built on top of it.

pub mod memory;
pub mod refresh;

pub use memory::MemoryStore;

// crates.io
use async_lock::MutexGuardArc;
// self
use crate::{
	_prelude::*,
	auth::{Credential, SessionId},
	codec::{self, EncodeError},
};

/// Future returned by [`SessionStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Backend contract mapping a session identifier to an opaque credential blob.
///
/// Implementations only move bytes; encoding and per-session serialization live in
/// [`CredentialStore`], so a shared backend can replace [`MemoryStore`] without touching callers.
pub trait SessionStore
where
	Self: Send + Sync,
{
	/// Fetches the blob stored for the session, if present.
	fn load<'a>(&'a self, session: &'a SessionId) -> StoreFuture<'a, Option<Vec<u8>>>;

	/// Persists or replaces the blob stored for the session.
	fn save<'a>(&'a self, session: &'a SessionId, blob: Vec<u8>) -> StoreFuture<'a, ()>;

	/// Removes the blob stored for the session, returning whether one existed.
	fn clear<'a>(&'a self, session: &'a SessionId) -> StoreFuture<'a, bool>;
}

/// Error type produced by [`SessionStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced while encoding a credential.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
impl From<EncodeError> for StoreError {
	fn from(e: EncodeError) -> Self {
		Self::Serialization { message: e.to_string() }
	}
}

type GuardMap = Arc<Mutex<HashMap<SessionId, Arc<AsyncMutex<()>>>>>;

/// Exclusive hold on one session's guard.
///
/// Dropping the lease, including mid-wait on cancellation, forgets the guard once no other task
/// holds or awaits it, so the guard map only tracks sessions with work in flight.
pub(crate) struct SessionLease<'a> {
	guards: &'a GuardMap,
	session: &'a SessionId,
	guard: Arc<AsyncMutex<()>>,
	held: Option<MutexGuardArc<()>>,
}
impl Drop for SessionLease<'_> {
	fn drop(&mut self) {
		self.held.take();

		let mut guards = self.guards.lock();

		// The map and this lease are the only owners left.
		if guards
			.get(self.session)
			.is_some_and(|guard| Arc::ptr_eq(guard, &self.guard) && Arc::strong_count(guard) == 2)
		{
			guards.remove(self.session);
		}
	}
}

/// Typed credential store that serializes access per session.
///
/// Different sessions never contend: each one owns an async mutex taken for the duration of a
/// read, write, or refresh, so a refresh for one browser cannot observe or clobber another's
/// credential.
#[derive(Clone)]
pub struct CredentialStore {
	backend: Arc<dyn SessionStore>,
	guards: GuardMap,
}
impl CredentialStore {
	/// Wraps a blob backend.
	pub fn new(backend: Arc<dyn SessionStore>) -> Self {
		Self { backend, guards: Default::default() }
	}

	/// Convenience constructor over a fresh [`MemoryStore`].
	pub fn in_memory() -> Self {
		Self::new(Arc::new(MemoryStore::default()))
	}

	/// Returns the underlying backend.
	pub fn backend(&self) -> &Arc<dyn SessionStore> {
		&self.backend
	}

	/// Fetches the session's credential.
	///
	/// A blob that fails to decode surfaces as [`Error::Decode`] rather than `Ok(None)` so the
	/// caller can tell corruption apart from absence.
	pub async fn get(&self, session: &SessionId) -> Result<Option<Credential>> {
		let _lease = self.lock(session).await;

		self.load_unlocked(session).await
	}

	/// Stores the credential unconditionally.
	pub async fn put(&self, session: &SessionId, credential: &Credential) -> Result<()> {
		let _lease = self.lock(session).await;

		self.save_unlocked(session, credential).await
	}

	/// Stores the credential unless the stored one expires later; returns whether it was written.
	pub async fn put_if_fresher(
		&self,
		session: &SessionId,
		credential: &Credential,
	) -> Result<bool> {
		let _lease = self.lock(session).await;

		self.put_if_fresher_unlocked(session, credential).await
	}

	/// Drops the session's credential, returning whether one existed.
	pub async fn clear(&self, session: &SessionId) -> Result<bool> {
		let _lease = self.lock(session).await;

		Ok(self.backend.clear(session).await?)
	}

	/// Waits for exclusive access to the session.
	pub(crate) async fn lock<'a>(&'a self, session: &'a SessionId) -> SessionLease<'a> {
		let guard = self
			.guards
			.lock()
			.entry(session.clone())
			.or_insert_with(|| Arc::new(AsyncMutex::new(())))
			.clone();
		let mut lease = SessionLease { guards: &self.guards, session, guard, held: None };
		// Declared after the lease so a cancelled wait releases its clone first.
		let wait = lease.guard.lock_arc();

		lease.held = Some(wait.await);

		lease
	}

	pub(crate) async fn load_unlocked(&self, session: &SessionId) -> Result<Option<Credential>> {
		match self.backend.load(session).await? {
			Some(blob) => Ok(Some(codec::decode(&blob)?)),
			None => Ok(None),
		}
	}

	pub(crate) async fn save_unlocked(
		&self,
		session: &SessionId,
		credential: &Credential,
	) -> Result<()> {
		let blob = codec::encode(credential).map_err(StoreError::from)?;

		self.backend.save(session, blob).await?;

		Ok(())
	}

	pub(crate) async fn put_if_fresher_unlocked(
		&self,
		session: &SessionId,
		credential: &Credential,
	) -> Result<bool> {
		// A corrupt blob never outranks a decodable credential.
		let stored = match self.load_unlocked(session).await {
			Ok(stored) => stored,
			Err(Error::Decode(_)) => None,
			Err(err) => return Err(err),
		};

		if stored.is_some_and(|stored| stored.expires_at > credential.expires_at) {
			tracing::debug!(?session, "discarding credential older than the stored one");

			return Ok(false);
		}

		self.save_unlocked(session, credential).await?;

		Ok(true)
	}
}
impl Debug for CredentialStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialStore").field("sessions", &self.guards.lock().len()).finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::time::Duration as StdDuration;
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::auth::ScopeSet;

	fn credential(expires_at: OffsetDateTime, token: &str) -> Credential {
		Credential::builder(ScopeSet::drive_file())
			.access_token(token)
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_at(expires_at)
			.build()
			.expect("Credential fixture should build.")
	}

	fn session(value: &str) -> SessionId {
		SessionId::new(value).expect("Session fixture should be valid.")
	}

	struct FailingBackend;
	impl SessionStore for FailingBackend {
		fn load<'a>(&'a self, _: &'a SessionId) -> StoreFuture<'a, Option<Vec<u8>>> {
			Box::pin(async { Err(StoreError::Backend { message: "unreachable".into() }) })
		}

		fn save<'a>(&'a self, _: &'a SessionId, _: Vec<u8>) -> StoreFuture<'a, ()> {
			Box::pin(async { Err(StoreError::Backend { message: "save".into() }) })
		}

		fn clear<'a>(&'a self, _: &'a SessionId) -> StoreFuture<'a, bool> {
			Box::pin(async { Ok(false) })
		}
	}

	#[tokio::test]
	async fn get_distinguishes_absent_present_and_corrupt() {
		let store = CredentialStore::in_memory();
		let s1 = session("s1");
		let s2 = session("s2");
		let c = credential(macros::datetime!(2025-01-01 01:00 UTC), "a");

		assert!(store.get(&s1).await.expect("Absent lookup should succeed.").is_none());

		store.put(&s1, &c).await.expect("Put should succeed.");

		assert_eq!(store.get(&s1).await.expect("Lookup should succeed."), Some(c));

		store.backend().save(&s2, b"garbage".to_vec()).await.expect("Raw save should succeed.");

		assert!(matches!(store.get(&s2).await, Err(Error::Decode(_))));
	}

	#[tokio::test]
	async fn freshest_expiry_wins() {
		let store = CredentialStore::in_memory();
		let s = session("s");
		let newer = credential(macros::datetime!(2025-01-01 02:00 UTC), "newer");
		let older = credential(macros::datetime!(2025-01-01 01:00 UTC), "older");

		assert!(store.put_if_fresher(&s, &newer).await.expect("First write should succeed."));
		assert!(!store.put_if_fresher(&s, &older).await.expect("Stale write should be skipped."));
		assert_eq!(store.get(&s).await.expect("Lookup should succeed."), Some(newer));
	}

	#[tokio::test]
	async fn clear_removes_credential_and_guard() {
		let store = CredentialStore::in_memory();
		let s = session("s");

		store
			.put(&s, &credential(macros::datetime!(2025-01-01 01:00 UTC), "a"))
			.await
			.expect("Put should succeed.");

		assert!(store.clear(&s).await.expect("Clear should succeed."));
		assert!(!store.clear(&s).await.expect("Second clear should succeed."));
		assert!(store.get(&s).await.expect("Lookup should succeed.").is_none());
	}

	#[tokio::test]
	async fn guards_are_forgotten_once_idle() {
		let store = CredentialStore::in_memory();
		let s = session("s");

		for _ in 0..100 {
			let absent = store.get(&SessionId::generate()).await;

			assert!(absent.expect("Absent lookup should succeed.").is_none());
		}

		store
			.put(&s, &credential(macros::datetime!(2025-01-01 01:00 UTC), "a"))
			.await
			.expect("Put should succeed.");
		store
			.put_if_fresher(&s, &credential(macros::datetime!(2025-01-01 02:00 UTC), "b"))
			.await
			.expect("Fresher put should succeed.");

		assert_eq!(store.guards.lock().len(), 0);
		assert_eq!(format!("{store:?}"), "CredentialStore { sessions: 0 }");
	}

	#[tokio::test]
	async fn waiting_keeps_the_guard_until_the_last_lease_drops() {
		let store = CredentialStore::in_memory();
		let s = session("s");
		let first = store.lock(&s).await;
		let waiting = tokio::time::timeout(StdDuration::from_millis(20), store.get(&s)).await;

		// The cancelled waiter leaves the holder's entry in place.
		assert!(waiting.is_err());
		assert_eq!(store.guards.lock().len(), 1);

		drop(first);

		assert_eq!(store.guards.lock().len(), 0);
		assert!(store.get(&s).await.expect("Lookup should succeed.").is_none());
		assert_eq!(store.guards.lock().len(), 0);
	}

	#[tokio::test]
	async fn backend_failures_are_not_overwritten() {
		let store = CredentialStore::new(Arc::new(FailingBackend));
		let fresh = credential(macros::datetime!(2025-01-01 01:00 UTC), "x");
		let err = store
			.put_if_fresher(&session("s"), &fresh)
			.await
			.expect_err("Backend failure should propagate.");

		assert_eq!(err.to_string(), "Backend failure: unreachable.");
	}

	#[test]
	fn encode_errors_become_serialization_errors() {
		let err = StoreError::from(EncodeError::TooLarge { len: 1 });

		assert!(matches!(err, StoreError::Serialization { .. }));
	}
}
