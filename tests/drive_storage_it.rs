mod common;

// std
use std::time::Duration as StdDuration;
// crates.io
use bytes::Bytes;
use httpmock::prelude::*;
use serde_json::json;
use time::Duration;
// self
use drive_relay::{
	auth::Credential,
	oauth::{ClientCredentials, OAuthClient},
	provider::ProviderDescriptor,
	storage::{ChunkUpload, DriveStorage, RemoteStorage, StorageError, UploadHandle, UploadMetadata},
	url::Url,
};

const SESSION_PATH: &str = "/upload/drive/v3/session-1";

fn storage(server: &MockServer) -> DriveStorage {
	let http = common::test_http_client();
	let descriptor = ProviderDescriptor::new(
		Url::parse("http://127.0.0.1:9/authorize").expect("Fixture URL should parse."),
		Url::parse("http://127.0.0.1:9/token").expect("Fixture URL should parse."),
	)
	.expect("Loopback descriptor should be accepted.");
	let oauth = OAuthClient::new(
		descriptor,
		ClientCredentials { client_id: "client".into(), client_secret: None },
		Url::parse("http://localhost:5000/oauth2callback").expect("Fixture URL should parse."),
		http.clone(),
	)
	.expect("OAuth client should build.");
	let base = Url::parse(&server.url("/upload/drive/v3")).expect("Mock base should parse.");

	DriveStorage::with_upload_base(http, oauth, &base).expect("Storage should build.")
}

fn credential() -> Credential {
	common::credential(Duration::hours(1), None)
}

fn metadata() -> UploadMetadata {
	UploadMetadata {
		name: "cat.png".into(),
		content_type: "image/png".into(),
		folder: common::folder(),
	}
}

fn handle(server: &MockServer) -> UploadHandle {
	UploadHandle::new(server.url(SESSION_PATH))
}

fn chunk(offset: u64, data: &'static [u8], last: bool) -> ChunkUpload {
	ChunkUpload { offset, data: Bytes::from_static(data), last }
}

#[tokio::test]
async fn begin_posts_metadata_and_returns_the_session_uri() {
	let server = MockServer::start_async().await;
	let session_uri = server.url(SESSION_PATH);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/upload/drive/v3/files")
				.query_param("uploadType", "resumable")
				.header("authorization", "Bearer stored-access")
				.header("x-upload-content-type", "image/png")
				.json_body(json!({
					"name": "cat.png",
					"mimeType": "image/png",
					"parents": ["shared-folder"],
				}));
			then.status(200).header("location", &session_uri);
		})
		.await;
	let handle = storage(&server)
		.begin_resumable_upload(&credential(), &metadata())
		.await
		.expect("Session should open.");

	mock.assert_async().await;

	assert_eq!(handle.locator(), session_uri);
	assert!(handle.bearer().is_some());
}

#[tokio::test]
async fn missing_location_is_a_protocol_error() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/upload/drive/v3/files");
			then.status(200);
		})
		.await;

	let err = storage(&server)
		.begin_resumable_upload(&credential(), &metadata())
		.await
		.expect_err("A session without a locator should fail.");

	assert!(matches!(err, StorageError::Protocol { .. }));
}

#[tokio::test]
async fn begin_failures_are_classified() {
	let cases = [
		(404, "", StorageError::FolderNotFound),
		(401, "", StorageError::Unauthorized),
		(403, "storageQuotaExceeded", StorageError::QuotaExceeded),
		(403, "userRateLimitExceeded", StorageError::RateLimited { retry_after: None }),
		(503, "", StorageError::Server { status: 503 }),
	];

	for (status, reason, expected) in cases {
		let server = MockServer::start_async().await;

		server
			.mock_async(|when, then| {
				when.method(POST).path("/upload/drive/v3/files");
				then.status(status).json_body(json!({
					"error": { "code": status, "message": "nope", "errors": [{ "reason": reason }] }
				}));
			})
			.await;

		let err = storage(&server)
			.begin_resumable_upload(&credential(), &metadata())
			.await
			.expect_err("Failure statuses should surface as errors.");

		assert_eq!(
			std::mem::discriminant(&err),
			std::mem::discriminant(&expected),
			"status {status} reason {reason:?} produced {err:?}"
		);
	}
}

#[tokio::test]
async fn error_reason_is_read_from_unlabeled_bodies() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/upload/drive/v3/files");
			then.status(403).header("content-type", "text/plain").body(
				r#"{"error":{"message":"full","errors":[{"reason":"storageQuotaExceeded"}]}}"#,
			);
		})
		.await;

	let err = storage(&server)
		.begin_resumable_upload(&credential(), &metadata())
		.await
		.expect_err("Quota failure should surface.");

	assert!(matches!(err, StorageError::QuotaExceeded));
}

#[tokio::test]
async fn unknown_forbidden_reason_is_rejected_with_the_message() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/upload/drive/v3/files");
			then.status(403).json_body(json!({
				"error": { "message": "insufficient permissions", "errors": [{ "reason": "forbidden" }] }
			}));
		})
		.await;

	let err = storage(&server)
		.begin_resumable_upload(&credential(), &metadata())
		.await
		.expect_err("Forbidden should fail.");

	match err {
		StorageError::Rejected { reason } => assert!(reason.contains("insufficient permissions")),
		other => panic!("Unexpected error: {other:?}"),
	}
}

#[tokio::test]
async fn intermediate_chunk_reads_the_committed_range() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(PUT).path(SESSION_PATH).header("content-range", "bytes 0-3/*").body("abcd");
			then.status(308).header("range", "bytes=0-3");
		})
		.await;
	let ack = storage(&server)
		.upload_chunk(&handle(&server), chunk(0, b"abcd", false))
		.await
		.expect("Chunk should be accepted.");

	mock.assert_async().await;

	assert_eq!(ack.committed, 4);
	assert!(ack.complete.is_none());
}

#[tokio::test]
async fn resume_without_range_means_nothing_committed() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(PUT).path(SESSION_PATH);
			then.status(308);
		})
		.await;

	let ack = storage(&server)
		.upload_chunk(&handle(&server), chunk(0, b"abcd", false))
		.await
		.expect("Chunk should be accepted.");

	assert_eq!(ack.committed, 0);
}

#[tokio::test]
async fn final_chunk_declares_the_total_and_returns_the_file() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(PUT).path(SESSION_PATH).header("content-range", "bytes 4-5/6");
			then.status(200).json_body(json!({ "id": "file-9" }));
		})
		.await;
	let ack = storage(&server)
		.upload_chunk(&handle(&server), chunk(4, b"ef", true))
		.await
		.expect("Final chunk should complete.");

	mock.assert_async().await;

	assert_eq!(ack.committed, 6);
	assert_eq!(ack.complete.expect("File id should be present.").as_ref(), "file-9");
}

#[tokio::test]
async fn chunk_failures_are_classified() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(PUT).path(SESSION_PATH);
			then.status(429).header("retry-after", "7");
		})
		.await;

	let err = storage(&server)
		.upload_chunk(&handle(&server), chunk(0, b"abcd", false))
		.await
		.expect_err("Throttled chunk should fail.");

	assert!(matches!(
		err,
		StorageError::RateLimited { retry_after: Some(delay) } if delay == StdDuration::from_secs(7)
	));
	assert!(err.is_transient());

	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(PUT).path(SESSION_PATH);
			then.status(404);
		})
		.await;

	let err = storage(&server)
		.upload_chunk(&handle(&server), chunk(0, b"abcd", false))
		.await
		.expect_err("Missing session should fail.");

	assert!(matches!(err, StorageError::SessionExpired));
	assert!(!err.is_transient());
}

#[tokio::test]
async fn resync_queries_the_offset_and_sends_only_the_tail() {
	let server = MockServer::start_async().await;
	let query = server
		.mock_async(|when, then| {
			when.method(PUT).path(SESSION_PATH).header("content-range", "bytes */6");
			then.status(308).header("range", "bytes=0-3");
		})
		.await;
	let tail = server
		.mock_async(|when, then| {
			when.method(PUT).path(SESSION_PATH).header("content-range", "bytes 4-5/6").body("ef");
			then.status(201).json_body(json!({ "id": "file-9" }));
		})
		.await;
	let handle = handle(&server);

	handle.mark_resync();

	let ack = storage(&server)
		.upload_chunk(&handle, chunk(0, b"abcdef", true))
		.await
		.expect("Resynced chunk should complete.");

	query.assert_calls_async(1).await;
	tail.assert_calls_async(1).await;

	assert!(ack.complete.is_some());
	assert!(!handle.take_resync());
}

#[tokio::test]
async fn resync_that_finds_the_chunk_committed_skips_the_upload() {
	let server = MockServer::start_async().await;
	let query = server
		.mock_async(|when, then| {
			when.method(PUT).path(SESSION_PATH).header("content-range", "bytes */*");
			then.status(308).header("range", "bytes=0-7");
		})
		.await;
	let handle = handle(&server);

	handle.mark_resync();

	let ack = storage(&server)
		.upload_chunk(&handle, chunk(4, b"efgh", false))
		.await
		.expect("Already committed chunk should be acknowledged.");

	query.assert_calls_async(1).await;

	assert_eq!(ack.committed, 8);
}
