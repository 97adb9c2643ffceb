//! Shared fixtures for integration tests.

#![allow(dead_code)]

// std
use std::{
	collections::VecDeque,
	io,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration as StdDuration,
};
// crates.io
use bytes::Bytes;
use futures::stream::{self, Iter};
use parking_lot::Mutex;
use reqwest::{Client as ReqwestClient, redirect::Policy};
use time::{Duration, OffsetDateTime};
use tokio::time::Instant;
// self
use drive_relay::{
	auth::{Credential, FolderId, RemoteObjectId, ScopeSet, SessionId},
	config::RelaySettings,
	http::ReqwestHttpClient,
	relay::{UploadRelay, UploadTask},
	storage::{
		ChunkAck, ChunkUpload, RefreshFuture, RemoteStorage, StorageError, StorageFuture,
		UploadHandle, UploadMetadata,
	},
	store::CredentialStore,
};

pub type Frames = Iter<std::vec::IntoIter<Result<Bytes, io::Error>>>;

/// Scripted outcome for one `upload_chunk` call.
#[derive(Clone, Copy, Debug)]
pub enum Fault {
	/// Fails with a 503 before touching remote state.
	Unavailable,
	/// Commits the bytes, then loses the response.
	CommitThenUnavailable,
	/// Fails permanently.
	QuotaExceeded,
}

/// One `upload_chunk` call as observed by the fake.
#[derive(Clone, Debug)]
pub struct ChunkCall {
	pub offset: u64,
	pub len: usize,
	pub at: Instant,
}

/// In-memory resumable store that tracks committed offsets the way Drive does.
#[derive(Default)]
pub struct FakeStorage {
	pub faults: Mutex<VecDeque<Fault>>,
	pub begin_faults: Mutex<VecDeque<Fault>>,
	pub begins: AtomicUsize,
	pub refreshes: AtomicUsize,
	pub calls: Mutex<Vec<ChunkCall>>,
	pub object: Mutex<Vec<u8>>,
	pub metadata: Mutex<Option<UploadMetadata>>,
}
impl FakeStorage {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn with_faults(faults: impl IntoIterator<Item = Fault>) -> Arc<Self> {
		let fake = Self::default();

		fake.faults.lock().extend(faults);

		Arc::new(fake)
	}

	pub fn chunk_calls(&self) -> usize {
		self.calls.lock().len()
	}

	pub fn total_calls(&self) -> usize {
		self.begins.load(Ordering::SeqCst)
			+ self.refreshes.load(Ordering::SeqCst)
			+ self.chunk_calls()
	}

	fn commit(&self, chunk: &ChunkUpload) -> u64 {
		let mut object = self.object.lock();
		let committed = object.len() as u64;

		assert!(chunk.offset <= committed, "chunk at {} skips past {committed}", chunk.offset);

		// Only bytes beyond the committed prefix are appended.
		let skip = (committed - chunk.offset) as usize;

		if skip < chunk.data.len() {
			object.extend_from_slice(&chunk.data[skip..]);
		}

		object.len() as u64
	}
}
impl RemoteStorage for FakeStorage {
	fn begin_resumable_upload<'a>(
		&'a self,
		_: &'a Credential,
		metadata: &'a UploadMetadata,
	) -> StorageFuture<'a, UploadHandle> {
		self.begins.fetch_add(1, Ordering::SeqCst);

		let fault = self.begin_faults.lock().pop_front();

		Box::pin(async move {
			if let Some(fault) = fault {
				return Err(fault_error(fault));
			}

			*self.metadata.lock() = Some(metadata.clone());

			Ok(UploadHandle::new("fake-session"))
		})
	}

	fn upload_chunk<'a>(
		&'a self,
		handle: &'a UploadHandle,
		chunk: ChunkUpload,
	) -> StorageFuture<'a, ChunkAck> {
		self.calls.lock().push(ChunkCall {
			offset: chunk.offset,
			len: chunk.data.len(),
			at: Instant::now(),
		});

		let fault = self.faults.lock().pop_front();

		Box::pin(async move {
			handle.take_resync();

			match fault {
				Some(Fault::CommitThenUnavailable) => {
					self.commit(&chunk);

					return Err(StorageError::Server { status: 503 });
				},
				Some(fault) => return Err(fault_error(fault)),
				None => {},
			}

			let committed = self.commit(&chunk);
			let complete = (chunk.last && committed == chunk.end()).then(|| {
				RemoteObjectId::new("object-1").expect("Object id fixture should be valid.")
			});

			Ok(ChunkAck { committed, complete })
		})
	}

	fn refresh_credential<'a>(&'a self, current: &'a Credential) -> RefreshFuture<'a> {
		self.refreshes.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move {
			tokio::task::yield_now().await;

			Ok(Credential::builder(current.scope.clone())
				.access_token("refreshed-access")
				.issued_at(OffsetDateTime::now_utc())
				.expires_in(Duration::hours(1))
				.build()
				.expect("Refreshed credential should build."))
		})
	}
}

fn fault_error(fault: Fault) -> StorageError {
	match fault {
		Fault::Unavailable | Fault::CommitThenUnavailable => StorageError::Server { status: 503 },
		Fault::QuotaExceeded => StorageError::QuotaExceeded,
	}
}

/// Redirect-free client that accepts the self-signed certificates `httpmock` serves.
pub fn test_http_client() -> ReqwestHttpClient {
	let client = ReqwestClient::builder()
		.redirect(Policy::none())
		.timeout(StdDuration::from_secs(5))
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.build()
		.expect("Failed to build insecure reqwest client for tests.");

	ReqwestHttpClient::with_client(client)
}

pub fn session(raw: &str) -> SessionId {
	SessionId::new(raw).expect("Session fixture should be valid.")
}

pub fn folder() -> FolderId {
	FolderId::new("shared-folder").expect("Folder fixture should be valid.")
}

pub fn credential(expires_in: Duration, refresh: Option<&str>) -> Credential {
	let builder = Credential::builder(ScopeSet::drive_file())
		.access_token("stored-access")
		.issued_at(OffsetDateTime::now_utc())
		.expires_in(expires_in);
	let builder = match refresh {
		Some(refresh) => builder.refresh_token(refresh),
		None => builder,
	};

	builder.build().expect("Credential fixture should build.")
}

pub fn frames(parts: &[&[u8]]) -> Frames {
	stream::iter(
		parts.iter().map(|part| Ok(Bytes::copy_from_slice(part))).collect::<Vec<_>>(),
	)
}

pub fn task(name: &str, parts: &[&[u8]]) -> UploadTask<Frames> {
	UploadTask {
		stream: frames(parts),
		name: name.into(),
		content_type: "image/png".into(),
		folder: folder(),
	}
}

/// Relay over `fake` whose store already holds a fresh credential for `session`.
pub async fn authenticated_relay(
	fake: Arc<FakeStorage>,
	session: &SessionId,
	chunk_size: usize,
) -> (UploadRelay, CredentialStore) {
	let store = CredentialStore::in_memory();

	store
		.put(session, &credential(Duration::hours(1), Some("refresh")))
		.await
		.expect("Seeding the store should succeed.");

	let settings = RelaySettings::new(folder()).with_chunk_size(chunk_size);
	let relay = UploadRelay::new(fake, store.clone(), &settings);

	(relay, store)
}
