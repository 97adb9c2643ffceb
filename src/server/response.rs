//! Maps relay and handshake outcomes onto HTTP responses.

// crates.io
use axum::{
	http::StatusCode,
	response::{Html, IntoResponse, Redirect, Response},
};
// self
use crate::{_prelude::*, error::FailureKind, server::AppState, server::render::UploadStatus};

pub(crate) const AUTHORIZE_PATH: &str = "/authorize";

pub(crate) fn to_authorize() -> Response {
	Redirect::to(AUTHORIZE_PATH).into_response()
}

pub(crate) fn to_index(status: Option<UploadStatus>) -> Response {
	match status {
		Some(status) => Redirect::to(&format!("/?status={}", status.as_str())).into_response(),
		None => Redirect::to("/").into_response(),
	}
}

pub(crate) fn error_page(state: &AppState, status: StatusCode, message: &str) -> Response {
	(status, Html(state.renderer.error(message, AUTHORIZE_PATH))).into_response()
}

/// Redirect reflecting an upload result.
pub(crate) fn upload_outcome(state: &AppState, err: &Error) -> Response {
	let kind = err.kind();

	if kind.requires_authorization() {
		return to_authorize();
	}

	match kind {
		FailureKind::PermanentUploadFailure => to_index(Some(UploadStatus::Rejected)),
		FailureKind::TransientUploadFailure => to_index(Some(UploadStatus::Failed)),
		_ => internal(state),
	}
}

/// Response for a failed callback.
pub(crate) fn callback_outcome(state: &AppState, err: &Error) -> Response {
	match err.kind() {
		FailureKind::AuthorizationStateMismatch => to_authorize(),
		FailureKind::Internal => internal(state),
		_ => error_page(state, StatusCode::BAD_REQUEST, "Authorization failed, please retry."),
	}
}

pub(crate) fn internal(state: &AppState) -> Response {
	error_page(state, StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong, please retry.")
}
