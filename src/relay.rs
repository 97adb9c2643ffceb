//! Resumable upload relay.
//!
//! [`UploadRelay::relay`] streams one inbound body into the remote store: it validates the task,
//! refreshes the session credential at most once, opens a resumable session, and pushes bounded
//! chunks while retrying transient failures on the [`RetryPolicy`] schedule. Dropping the
//! returned future stops all work; nothing retries in the background.

mod chunker;
mod metrics;
mod retry;

pub use metrics::RelayMetrics;
pub use retry::RetryPolicy;

// crates.io
use futures::Stream;
// self
use crate::{
	_prelude::*,
	auth::{FolderId, RemoteObjectId, SessionId},
	config::RelaySettings,
	error::BoxError,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	relay::{
		chunker::Chunker,
		retry::{RetryError, Retried},
	},
	storage::{ChunkAck, ChunkUpload, RemoteStorage, StorageError, UploadHandle, UploadMetadata},
	store::CredentialStore,
};

/// One inbound file to relay.
pub struct UploadTask<S> {
	/// Body frames as they arrive from the client.
	pub stream: S,
	/// Declared file name.
	pub name: String,
	/// Declared MIME type.
	pub content_type: String,
	/// Destination folder.
	pub folder: FolderId,
}
impl<S> Debug for UploadTask<S> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("UploadTask")
			.field("name", &self.name)
			.field("content_type", &self.content_type)
			.field("folder", &self.folder)
			.finish_non_exhaustive()
	}
}

/// Outcome of a completed relay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadReceipt {
	/// Identifier of the created remote object.
	pub remote_id: RemoteObjectId,
	/// Object size in bytes.
	pub bytes_sent: u64,
	/// Chunks acknowledged by the remote.
	pub chunks: u32,
	/// Retries spent across the session open and all chunks.
	pub retries: u32,
}

/// Upload failures raised by the relay itself.
#[derive(Debug, ThisError)]
pub enum UploadError {
	/// The declared file name was empty.
	#[error("Upload has no file name.")]
	EmptyFileName,
	/// The body contained no bytes.
	#[error("Upload body is empty.")]
	EmptyFile,
	/// The client stream failed before the body was complete.
	#[error("Upload source aborted.")]
	SourceAborted {
		/// Stream failure.
		#[source]
		source: BoxError,
	},
	/// Every attempt of one remote call failed transiently.
	#[error("Upload gave up after {attempts} attempts at offset {offset}.")]
	RetriesExhausted {
		/// Attempts made, including the first.
		attempts: u32,
		/// Offset of the chunk that could not be delivered.
		offset: u64,
		/// Last transient failure.
		#[source]
		source: StorageError,
	},
	/// The remote refused the upload permanently.
	#[error("Remote storage refused the upload.")]
	Rejected {
		/// Permanent remote failure.
		#[source]
		source: StorageError,
	},
	/// The remote never reported a finished object.
	#[error("Upload did not complete; remote committed {offset} bytes.")]
	Incomplete {
		/// Bytes the remote reported as committed.
		offset: u64,
	},
}
impl UploadError {
	/// Returns `true` when the whole upload may succeed if the user tries again later.
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::RetriesExhausted { .. })
	}

	fn from_retry(err: RetryError, offset: u64) -> Self {
		match err {
			RetryError::Exhausted { attempts, last } =>
				Self::RetriesExhausted { attempts, offset, source: last },
			RetryError::Permanent(source) => Self::Rejected { source },
		}
	}
}

/// Relays inbound streams into [`RemoteStorage`] using the session's credential.
#[derive(Clone)]
pub struct UploadRelay {
	storage: Arc<dyn RemoteStorage>,
	store: CredentialStore,
	chunk_size: usize,
	retry: RetryPolicy,
	metrics: Arc<RelayMetrics>,
}
impl UploadRelay {
	/// Creates a relay using the chunk size and retry policy from `settings`.
	pub fn new(
		storage: Arc<dyn RemoteStorage>,
		store: CredentialStore,
		settings: &RelaySettings,
	) -> Self {
		Self {
			storage,
			store,
			chunk_size: settings.chunk_size,
			retry: settings.retry.clone(),
			metrics: Default::default(),
		}
	}

	/// Shared counters for this relay.
	pub fn metrics(&self) -> &Arc<RelayMetrics> {
		&self.metrics
	}

	/// Streams `task` into the remote store and returns the created object.
	pub async fn relay<S, E>(
		&self,
		session: &SessionId,
		task: UploadTask<S>,
	) -> Result<UploadReceipt>
	where
		S: Stream<Item = Result<Bytes, E>> + Send + Unpin,
		E: 'static + Send + Sync + StdError,
	{
		const KIND: FlowKind = FlowKind::Upload;

		let span = FlowSpan::new(KIND, "relay");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.metrics.record_start();

		let result = span.instrument(self.relay_inner(session, task)).await;

		obs::record_flow_outcome(KIND, FlowOutcome::of(&result));

		match &result {
			Ok(receipt) => {
				self.metrics.record_completed(receipt.bytes_sent);

				tracing::info!(
					?session,
					remote_id = ?receipt.remote_id,
					bytes = receipt.bytes_sent,
					chunks = receipt.chunks,
					retries = receipt.retries,
					"upload relayed"
				);
			},
			Err(err) => {
				self.metrics.record_failure();

				tracing::warn!(?session, kind = %err.kind(), error = %err, "upload failed");
			},
		}

		result
	}

	async fn relay_inner<S, E>(
		&self,
		session: &SessionId,
		task: UploadTask<S>,
	) -> Result<UploadReceipt>
	where
		S: Stream<Item = Result<Bytes, E>> + Send + Unpin,
		E: 'static + Send + Sync + StdError,
	{
		let UploadTask { stream, name, content_type, folder } = task;

		if name.trim().is_empty() {
			return Err(UploadError::EmptyFileName.into());
		}

		let mut chunker = Chunker::new(stream, self.chunk_size);
		let mut chunk = next_chunk(&mut chunker).await?.ok_or(UploadError::EmptyFile)?;
		let credential = self.store.ensure_fresh(session, self.storage.as_ref()).await?;
		let metadata = UploadMetadata { name, content_type, folder };
		let storage = self.storage.as_ref();
		let Retried { value: handle, retries: mut total_retries } = self
			.retry
			.run(
				"begin",
				|_| storage.begin_resumable_upload(&credential, &metadata),
				|_| self.metrics.record_retries(1),
			)
			.await
			.map_err(|err| UploadError::from_retry(err, 0))?;
		let mut chunks = 0;

		loop {
			let Retried { value: ack, retries } = self.send(&handle, &chunk).await?;

			total_retries += retries;
			chunks += 1;

			self.metrics.record_chunk();

			if let Some(remote_id) = ack.complete {
				return Ok(UploadReceipt {
					remote_id,
					bytes_sent: chunk.end(),
					chunks,
					retries: total_retries,
				});
			}

			chunk = match next_step(chunk, &ack)? {
				Some(remainder) => remainder,
				None => next_chunk(&mut chunker)
					.await?
					.ok_or(UploadError::Incomplete { offset: ack.committed })?,
			};
		}
	}

	async fn send(
		&self,
		handle: &UploadHandle,
		chunk: &ChunkUpload,
	) -> Result<Retried<ChunkAck>, UploadError> {
		let storage = self.storage.as_ref();

		self.retry
			.run(
				"chunk",
				|_| storage.upload_chunk(handle, chunk.clone()),
				|_| {
					handle.mark_resync();
					self.metrics.record_retries(1);
				},
			)
			.await
			.map_err(|err| UploadError::from_retry(err, chunk.offset))
	}
}
impl Debug for UploadRelay {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("UploadRelay")
			.field("chunk_size", &self.chunk_size)
			.field("retry", &self.retry)
			.field("metrics", &self.metrics)
			.finish_non_exhaustive()
	}
}

async fn next_chunk<S, E>(chunker: &mut Chunker<S>) -> Result<Option<ChunkUpload>, UploadError>
where
	S: Stream<Item = Result<Bytes, E>> + Unpin,
	E: 'static + Send + Sync + StdError,
{
	chunker.next_chunk().await.map_err(|err| UploadError::SourceAborted { source: Box::new(err) })
}

// Decides what follows an incomplete ack: the uncommitted tail of this chunk, or the next chunk.
fn next_step(chunk: ChunkUpload, ack: &ChunkAck) -> Result<Option<ChunkUpload>, UploadError> {
	let end = chunk.end();

	if ack.committed < chunk.offset || ack.committed > end || (chunk.last && ack.committed == end) {
		return Err(UploadError::Incomplete { offset: ack.committed });
	}
	if ack.committed == end {
		return Ok(None);
	}

	// Partial commit; resend only the tail.
	let skip = (ack.committed - chunk.offset) as usize;

	Ok(Some(ChunkUpload {
		offset: ack.committed,
		data: chunk.data.slice(skip..),
		last: chunk.last,
	}))
}
