//! Google Drive v3 resumable uploads.
//!
//! A session opens with `POST {upload}/files?uploadType=resumable`, whose `Location` header is the
//! session URI. Chunks are `PUT` to that URI with `Content-Range: bytes a-b/*` (the total is
//! declared on the final chunk). `308 Resume Incomplete` carries the committed prefix in its
//! `Range` header; `200`/`201` carries the created file.

// std
use std::time::Duration as StdDuration;
// crates.io
use reqwest::{
	Response, StatusCode,
	header::{CONTENT_RANGE, LOCATION, RANGE},
};
// self
use crate::{
	_prelude::*,
	auth::{Credential, RemoteObjectId},
	error::ConfigError,
	http::{self, ReqwestHttpClient},
	oauth::OAuthClient,
	storage::{
		ChunkAck, ChunkUpload, RefreshFuture, RemoteStorage, StorageError, StorageFuture,
		UploadHandle, UploadMetadata,
	},
};

/// Production upload API root.
pub const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

const RESUME_INCOMPLETE: u16 = 308;
const UPLOAD_CONTENT_TYPE: &str = "X-Upload-Content-Type";

/// [`RemoteStorage`] backed by the Drive v3 resumable upload protocol.
#[derive(Clone, Debug)]
pub struct DriveStorage {
	http: ReqwestHttpClient,
	oauth: OAuthClient,
	files_endpoint: Url,
}
impl DriveStorage {
	/// Creates a client against the production upload API.
	///
	/// `oauth` performs credential refreshes.
	pub fn new(http: ReqwestHttpClient, oauth: OAuthClient) -> Result<Self, ConfigError> {
		let base = Url::parse(DRIVE_UPLOAD_BASE)
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;

		Self::with_upload_base(http, oauth, &base)
	}

	/// Creates a client against an alternative upload API root (tests, proxies).
	pub fn with_upload_base(
		http: ReqwestHttpClient,
		oauth: OAuthClient,
		base: &Url,
	) -> Result<Self, ConfigError> {
		let files_endpoint = Url::parse(&format!("{}/files", base.as_str().trim_end_matches('/')))
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;

		Ok(Self { http, oauth, files_endpoint })
	}

	async fn open(
		&self,
		credential: &Credential,
		metadata: &UploadMetadata,
	) -> Result<UploadHandle, StorageError> {
		let mut url = self.files_endpoint.clone();

		url.query_pairs_mut().append_pair("uploadType", "resumable").append_pair("fields", "id");

		let body = FileMetadata {
			name: &metadata.name,
			mime_type: &metadata.content_type,
			parents: [metadata.folder.as_ref()],
		};
		let response = self
			.http
			.client()
			.post(url)
			.bearer_auth(credential.access_token.expose())
			.header(UPLOAD_CONTENT_TYPE, &metadata.content_type)
			.json(&body)
			.send()
			.await
			.map_err(map_send_error)?;

		if !response.status().is_success() {
			return Err(classify(response, Stage::Open).await);
		}

		let locator = response
			.headers()
			.get(LOCATION)
			.and_then(|value| value.to_str().ok())
			.ok_or_else(|| StorageError::Protocol {
				reason: "session response carried no Location header".into(),
			})?
			.to_owned();

		tracing::debug!(name = %metadata.name, "resumable session opened");

		Ok(UploadHandle::new(locator).with_bearer(credential.access_token.clone()))
	}

	async fn send(
		&self,
		handle: &UploadHandle,
		chunk: ChunkUpload,
	) -> Result<ChunkAck, StorageError> {
		let total = chunk.last.then(|| chunk.end());
		let mut chunk = chunk;

		if handle.take_resync() {
			let ack = self.query(handle, total).await?;

			tracing::debug!(committed = ack.committed, offset = chunk.offset, "resynced offset");

			if ack.complete.is_some() || ack.committed >= chunk.end() {
				return Ok(ack);
			}
			if ack.committed < chunk.offset {
				return Err(StorageError::Protocol {
					reason: format!(
						"remote committed {} bytes, behind chunk offset {}",
						ack.committed, chunk.offset
					),
				});
			}

			let skip = (ack.committed - chunk.offset) as usize;

			chunk = ChunkUpload {
				offset: ack.committed,
				data: chunk.data.slice(skip..),
				last: chunk.last,
			};
		}

		let range = format!("bytes {}-{}/{}", chunk.offset, chunk.end() - 1, total_label(total));
		let end = chunk.end();
		let response = self
			.put(handle)
			.header(CONTENT_RANGE, range)
			.body(chunk.data)
			.send()
			.await
			.map_err(map_send_error)?;

		read_ack(response, end).await
	}

	// Asks the remote how much of the object it already holds.
	async fn query(
		&self,
		handle: &UploadHandle,
		total: Option<u64>,
	) -> Result<ChunkAck, StorageError> {
		let response = self
			.put(handle)
			.header(CONTENT_RANGE, format!("bytes */{}", total_label(total)))
			.send()
			.await
			.map_err(map_send_error)?;

		read_ack(response, total.unwrap_or_default()).await
	}

	fn put(&self, handle: &UploadHandle) -> reqwest::RequestBuilder {
		let request = self.http.client().put(handle.locator());

		match handle.bearer() {
			Some(bearer) => request.bearer_auth(bearer.expose()),
			None => request,
		}
	}
}
impl RemoteStorage for DriveStorage {
	fn begin_resumable_upload<'a>(
		&'a self,
		credential: &'a Credential,
		metadata: &'a UploadMetadata,
	) -> StorageFuture<'a, UploadHandle> {
		Box::pin(self.open(credential, metadata))
	}

	fn upload_chunk<'a>(
		&'a self,
		handle: &'a UploadHandle,
		chunk: ChunkUpload,
	) -> StorageFuture<'a, ChunkAck> {
		Box::pin(self.send(handle, chunk))
	}

	fn refresh_credential<'a>(&'a self, credential: &'a Credential) -> RefreshFuture<'a> {
		Box::pin(self.oauth.refresh(credential))
	}
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileMetadata<'a> {
	name: &'a str,
	mime_type: &'a str,
	parents: [&'a str; 1],
}

#[derive(Deserialize)]
struct CreatedFile {
	id: String,
}

#[derive(Default, Deserialize)]
struct ErrorEnvelope {
	#[serde(default)]
	error: ErrorBody,
}

#[derive(Default, Deserialize)]
struct ErrorBody {
	#[serde(default)]
	message: String,
	#[serde(default)]
	errors: Vec<ErrorItem>,
}

#[derive(Deserialize)]
struct ErrorItem {
	#[serde(default)]
	reason: String,
}

#[derive(Clone, Copy, Debug)]
enum Stage {
	Open,
	Chunk,
}

fn total_label(total: Option<u64>) -> String {
	total.map_or_else(|| "*".into(), |total| total.to_string())
}

async fn read_ack(response: Response, committed_when_done: u64) -> Result<ChunkAck, StorageError> {
	match response.status().as_u16() {
		200 | 201 => {
			let body = response.bytes().await.map_err(map_send_error)?;
			let file = serde_json::from_slice::<CreatedFile>(&body).map_err(|err| {
				StorageError::Protocol { reason: format!("unreadable completion body: {err}") }
			})?;
			let id = RemoteObjectId::new(&file.id).map_err(|err| StorageError::Protocol {
				reason: format!("invalid file id: {err}"),
			})?;

			Ok(ChunkAck { committed: committed_when_done, complete: Some(id) })
		},
		RESUME_INCOMPLETE =>
			Ok(ChunkAck { committed: committed_prefix(&response)?, complete: None }),
		_ => Err(classify(response, Stage::Chunk).await),
	}
}

// `Range: bytes=0-N` means N + 1 bytes are committed; no header means none.
fn committed_prefix(response: &Response) -> Result<u64, StorageError> {
	let Some(value) = response.headers().get(RANGE) else {
		return Ok(0);
	};
	let last = value
		.to_str()
		.ok()
		.and_then(|raw| raw.strip_prefix("bytes=0-"))
		.and_then(|last| last.parse::<u64>().ok())
		.ok_or_else(|| StorageError::Protocol {
			reason: format!("unparseable Range header {value:?}"),
		})?;

	Ok(last + 1)
}

async fn classify(response: Response, stage: Stage) -> StorageError {
	let status = response.status();
	let retry_after = http::parse_retry_after(response.headers())
		.and_then(|delay| StdDuration::try_from(delay).ok());
	// Error bodies are not always labeled `application/json`; parse whatever arrives.
	let body = response
		.bytes()
		.await
		.ok()
		.and_then(|body| serde_json::from_slice::<ErrorEnvelope>(&body).ok())
		.unwrap_or_default()
		.error;
	let reason = body.errors.first().map(|item| item.reason.as_str()).unwrap_or_default();

	tracing::debug!(?stage, %status, reason, message = %body.message, "drive request failed");

	match (status, stage) {
		(StatusCode::UNAUTHORIZED, _) => StorageError::Unauthorized,
		(StatusCode::NOT_FOUND, Stage::Open) => StorageError::FolderNotFound,
		(StatusCode::NOT_FOUND | StatusCode::GONE, Stage::Chunk) => StorageError::SessionExpired,
		(StatusCode::TOO_MANY_REQUESTS, _) => StorageError::RateLimited { retry_after },
		(StatusCode::FORBIDDEN, _) => match reason {
			"storageQuotaExceeded" | "quotaExceeded" => StorageError::QuotaExceeded,
			"rateLimitExceeded" | "userRateLimitExceeded" =>
				StorageError::RateLimited { retry_after },
			_ => StorageError::Rejected { reason: rejection_reason(status, &body.message) },
		},
		(status, _) if status.is_server_error() => StorageError::Server { status: status.as_u16() },
		(status, _) => StorageError::Rejected { reason: rejection_reason(status, &body.message) },
	}
}

fn rejection_reason(status: StatusCode, message: &str) -> String {
	if message.is_empty() { format!("HTTP {status}") } else { format!("HTTP {status}: {message}") }
}

fn map_send_error(err: ReqwestError) -> StorageError {
	if err.is_timeout() { StorageError::Timeout } else { StorageError::network(err) }
}
