//! Remote storage capability interface consumed by the upload relay.

pub mod drive;

pub use drive::DriveStorage;

// std
use std::{
	sync::atomic::{AtomicBool, Ordering},
	time::Duration as StdDuration,
};
// self
use crate::{
	_prelude::*,
	auth::{Credential, FolderId, RemoteObjectId, TokenSecret},
};

/// Future returned by chunked upload operations.
pub type StorageFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, StorageError>> + 'a + Send>>;
/// Future returned by [`RemoteStorage::refresh_credential`].
pub type RefreshFuture<'a> = Pin<Box<dyn Future<Output = Result<Credential>> + 'a + Send>>;

/// Narrow capability contract over the remote object store.
pub trait RemoteStorage
where
	Self: Send + Sync,
{
	/// Opens a resumable upload session declaring the destination and object metadata.
	fn begin_resumable_upload<'a>(
		&'a self,
		credential: &'a Credential,
		metadata: &'a UploadMetadata,
	) -> StorageFuture<'a, UploadHandle>;

	/// Sends one chunk at `chunk.offset`; the ack reports how many bytes the remote committed.
	fn upload_chunk<'a>(
		&'a self,
		handle: &'a UploadHandle,
		chunk: ChunkUpload,
	) -> StorageFuture<'a, ChunkAck>;

	/// Exchanges the credential's refresh token for a new access token.
	fn refresh_credential<'a>(&'a self, credential: &'a Credential) -> RefreshFuture<'a>;
}

/// Object metadata declared when the upload session opens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadMetadata {
	/// File name as declared by the browser.
	pub name: String,
	/// MIME type as declared by the browser.
	pub content_type: String,
	/// Destination folder.
	pub folder: FolderId,
}

/// Remote-issued handle for an open resumable session.
///
/// The handle is released when the relay drops it; an uncompleted session is never linked as
/// an object.
#[derive(Clone)]
pub struct UploadHandle {
	locator: String,
	bearer: Option<TokenSecret>,
	resync: Arc<AtomicBool>,
}
impl UploadHandle {
	/// Wraps a remote session locator.
	pub fn new(locator: impl Into<String>) -> Self {
		Self { locator: locator.into(), bearer: None, resync: Default::default() }
	}

	/// Attaches the bearer token chunk requests must carry.
	pub fn with_bearer(mut self, bearer: TokenSecret) -> Self {
		self.bearer = Some(bearer);

		self
	}

	/// Session locator issued by the remote (for Drive, the session URI).
	pub fn locator(&self) -> &str {
		&self.locator
	}

	/// Bearer token attached with [`with_bearer`](Self::with_bearer), if any.
	pub fn bearer(&self) -> Option<&TokenSecret> {
		self.bearer.as_ref()
	}

	/// Records that the last chunk failed mid-flight so the committed offset must be re-queried.
	pub fn mark_resync(&self) {
		self.resync.store(true, Ordering::Release);
	}

	/// Consumes a pending resync request.
	pub fn take_resync(&self) -> bool {
		self.resync.swap(false, Ordering::AcqRel)
	}
}
impl Debug for UploadHandle {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("UploadHandle")
			.field("locator", &"<redacted>")
			.field("resync", &self.resync.load(Ordering::Acquire))
			.finish()
	}
}

/// One bounded slice of the inbound stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkUpload {
	/// Absolute offset of the first byte.
	pub offset: u64,
	/// Chunk body.
	pub data: Bytes,
	/// `true` for the final chunk, which also fixes the total object size.
	pub last: bool,
}
impl ChunkUpload {
	/// Offset one past the last byte of this chunk.
	pub fn end(&self) -> u64 {
		self.offset + self.data.len() as u64
	}
}

/// Remote acknowledgement for a chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkAck {
	/// Number of bytes the remote has durably committed from the start of the object.
	pub committed: u64,
	/// Identifier of the finished object, once the final chunk landed.
	pub complete: Option<RemoteObjectId>,
}

/// Remote storage failures, split into retryable and permanent classes.
#[derive(Debug, ThisError)]
pub enum StorageError {
	/// Connection-level failure before a response arrived.
	#[error("Network error while talking to remote storage.")]
	Network {
		/// Underlying transport failure.
		#[source]
		source: crate::error::BoxError,
	},
	/// The call exceeded its per-attempt timeout.
	#[error("Remote storage call timed out.")]
	Timeout,
	/// The remote returned a server-side error status.
	#[error("Remote storage returned HTTP {status}.")]
	Server {
		/// HTTP status code.
		status: u16,
	},
	/// The remote throttled the caller.
	#[error("Remote storage rate limited the request.")]
	RateLimited {
		/// Retry-After hint, when supplied.
		retry_after: Option<StdDuration>,
	},
	/// The access token was rejected or the authorization was revoked.
	#[error("Remote storage rejected the authorization.")]
	Unauthorized,
	/// The destination folder does not exist or is not visible to the authorized user.
	#[error("Destination folder was not found.")]
	FolderNotFound,
	/// The authorized user's storage quota is exhausted.
	#[error("Storage quota exceeded.")]
	QuotaExceeded,
	/// The resumable session expired or was cancelled remotely.
	#[error("Upload session expired.")]
	SessionExpired,
	/// The remote refused the request for another permanent reason.
	#[error("Remote storage rejected the request: {reason}.")]
	Rejected {
		/// Remote-supplied reason.
		reason: String,
	},
	/// The remote answered in a way that violates the resumable protocol.
	#[error("Remote storage protocol violation: {reason}.")]
	Protocol {
		/// What was unexpected.
		reason: String,
	},
}
impl StorageError {
	/// Wraps a transport failure.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Returns `true` when retrying the same request may succeed.
	pub fn is_transient(&self) -> bool {
		matches!(
			self,
			Self::Network { .. } | Self::Timeout | Self::Server { .. } | Self::RateLimited { .. }
		)
	}
}
