mod common;

// std
use std::collections::HashMap;
// crates.io
use httpmock::prelude::*;
// self
use drive_relay::{
	auth::{DRIVE_FILE_SCOPE, TokenSecret},
	error::{Error, FailureKind, StateMismatch},
	flows::{AuthorizationController, CallbackParams, SessionStatus},
	oauth::{ClientCredentials, OAuthClient},
	provider::ProviderDescriptor,
	store::CredentialStore,
	url::Url,
};

const REDIRECT: &str = "http://localhost:5000/oauth2callback";

fn controller(server: &MockServer) -> AuthorizationController {
	let descriptor = ProviderDescriptor::new(
		Url::parse(&server.url("/authorize")).expect("Mock authorize URL should parse."),
		Url::parse(&server.url("/token")).expect("Mock token URL should parse."),
	)
	.expect("Loopback descriptor should be accepted.")
	.with_authorize_param("access_type", "offline");
	let client = OAuthClient::new(
		descriptor,
		ClientCredentials {
			client_id: "relay-client".into(),
			client_secret: Some(TokenSecret::new("relay-secret")),
		},
		Url::parse(REDIRECT).expect("Redirect should parse."),
		common::test_http_client(),
	)
	.expect("OAuth client should build.");

	AuthorizationController::new(client, CredentialStore::in_memory())
}

fn callback(url: &Url, code: &str) -> CallbackParams {
	let pairs = url.query_pairs().into_owned().collect::<HashMap<_, _>>();

	CallbackParams { state: pairs.get("state").cloned(), code: Some(code.into()), error: None }
}

#[tokio::test]
async fn authorization_url_carries_state_pkce_and_extras() {
	let server = MockServer::start_async().await;
	let controller = controller(&server);
	let url = controller.begin(&common::session("browser-1"));
	let pairs = url.query_pairs().into_owned().collect::<HashMap<_, _>>();

	assert_eq!(pairs.get("response_type").map(String::as_str), Some("code"));
	assert_eq!(pairs.get("client_id").map(String::as_str), Some("relay-client"));
	assert_eq!(pairs.get("redirect_uri").map(String::as_str), Some(REDIRECT));
	assert_eq!(pairs.get("scope").map(String::as_str), Some(DRIVE_FILE_SCOPE));
	assert_eq!(pairs.get("code_challenge_method").map(String::as_str), Some("S256"));
	assert_eq!(pairs.get("access_type").map(String::as_str), Some("offline"));
	assert_eq!(pairs.get("state").map(String::len), Some(43));
	assert!(pairs.contains_key("code_challenge"));
}

#[tokio::test]
async fn valid_callback_exchanges_the_code_and_stores_the_credential() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.header("content-type", "application/x-www-form-urlencoded");
			then.status(200).header("content-type", "application/json").body(format!(
				"{{\"access_token\":\"access-1\",\"refresh_token\":\"refresh-1\",\"token_type\":\"Bearer\",\"expires_in\":3599,\"scope\":\"{DRIVE_FILE_SCOPE}\"}}"
			));
		})
		.await;
	let controller = controller(&server);
	let session = common::session("browser-1");
	let url = controller.begin(&session);
	let credential = controller
		.complete(&session, callback(&url, "good-code"))
		.await
		.expect("Exchange should succeed.");

	mock.assert_async().await;

	assert_eq!(credential.access_token.expose(), "access-1");
	assert_eq!(credential.refresh_token.as_ref().map(|token| token.expose()), Some("refresh-1"));
	assert!(credential.scope.contains(DRIVE_FILE_SCOPE));
	assert_eq!(
		controller.status(&session).await.expect("Status should resolve."),
		SessionStatus::Authenticated
	);
	assert_eq!(
		controller.store().get(&session).await.expect("Lookup should succeed."),
		Some(credential)
	);
}

#[tokio::test]
async fn wrong_state_is_rejected_without_calling_the_token_endpoint() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"never\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let controller = controller(&server);
	let session = common::session("browser-1");

	controller.begin(&session);

	let err = controller
		.complete(&session, CallbackParams {
			state: Some("forged-state".into()),
			code: Some("valid-code".into()),
			error: None,
		})
		.await
		.expect_err("Forged state should fail.");

	assert!(matches!(err, Error::AuthorizationStateMismatch(StateMismatch::Mismatch)));
	assert_eq!(err.kind(), FailureKind::AuthorizationStateMismatch);
	assert!(controller.store().get(&session).await.expect("Lookup should succeed.").is_none());

	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn state_issued_to_another_session_is_rejected() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(500);
		})
		.await;
	let controller = controller(&server);
	let victim = common::session("victim");
	let url = controller.begin(&common::session("attacker"));

	controller.begin(&victim);

	let err = controller
		.complete(&victim, callback(&url, "attacker-code"))
		.await
		.expect_err("Cross-session state should fail.");

	assert_eq!(err.kind(), FailureKind::AuthorizationStateMismatch);

	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn rejected_code_leaves_the_session_unauthenticated() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\",\"error_description\":\"Bad Request\"}");
		})
		.await;
	let controller = controller(&server);
	let session = common::session("browser-1");
	let url = controller.begin(&session);
	let err = controller
		.complete(&session, callback(&url, "stale-code"))
		.await
		.expect_err("Rejected code should fail.");

	mock.assert_async().await;

	assert_eq!(err.kind(), FailureKind::TokenExchangeFailure);
	assert_eq!(
		controller.status(&session).await.expect("Status should resolve."),
		SessionStatus::Unauthenticated
	);
}

#[tokio::test]
async fn grant_without_drive_scope_is_an_exchange_failure() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"a\",\"token_type\":\"Bearer\",\"expires_in\":3600,\"scope\":\"openid\"}",
			);
		})
		.await;

	let controller = controller(&server);
	let session = common::session("browser-1");
	let url = controller.begin(&session);
	let err = controller
		.complete(&session, callback(&url, "code"))
		.await
		.expect_err("Missing scope should fail.");

	assert!(matches!(err, Error::TokenExchange { .. }));
	assert!(controller.store().get(&session).await.expect("Lookup should succeed.").is_none());
}
