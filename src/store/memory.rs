//! Thread-safe in-process [`SessionStore`] implementation.

// self
use crate::{
	_prelude::*,
	auth::SessionId,
	store::{SessionStore, StoreError, StoreFuture},
};

type BlobMap = Arc<RwLock<HashMap<SessionId, Vec<u8>>>>;

/// Process-wide blob map; a restart forgets every session.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(BlobMap);
impl MemoryStore {
	/// Number of sessions currently holding a blob.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when no session holds a blob.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	fn load_now(map: BlobMap, session: &SessionId) -> Option<Vec<u8>> {
		map.read().get(session).cloned()
	}

	fn save_now(map: BlobMap, session: SessionId, blob: Vec<u8>) -> Result<(), StoreError> {
		map.write().insert(session, blob);

		Ok(())
	}

	fn clear_now(map: BlobMap, session: &SessionId) -> bool {
		map.write().remove(session).is_some()
	}
}
impl SessionStore for MemoryStore {
	fn load<'a>(&'a self, session: &'a SessionId) -> StoreFuture<'a, Option<Vec<u8>>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(Self::load_now(map, session)) })
	}

	fn save<'a>(&'a self, session: &'a SessionId, blob: Vec<u8>) -> StoreFuture<'a, ()> {
		let map = self.0.clone();
		let session = session.to_owned();

		Box::pin(async move { Self::save_now(map, session, blob) })
	}

	fn clear<'a>(&'a self, session: &'a SessionId) -> StoreFuture<'a, bool> {
		let map = self.0.clone();

		Box::pin(async move { Ok(Self::clear_now(map, session)) })
	}
}
