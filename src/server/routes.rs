//! Route handlers.

// crates.io
use axum::{
	extract::{Multipart, Query, State},
	response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::PrivateCookieJar;
// self
use crate::{
	_prelude::*,
	flows::{CallbackParams, SessionStatus},
	relay::{UploadError, UploadTask},
	server::{
		AppState,
		render::{PageContext, UploadStatus},
		response, session,
	},
};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const FILE_FIELD: &str = "file";

#[derive(Debug, Default, Deserialize)]
pub(crate) struct IndexQuery {
	#[serde(default)]
	status: Option<String>,
}

pub(crate) async fn index(
	State(state): State<AppState>,
	jar: PrivateCookieJar,
	Query(query): Query<IndexQuery>,
) -> Response {
	let Some(session) = session::current(&jar) else {
		return response::to_authorize();
	};

	match state.controller.status(&session).await {
		Ok(SessionStatus::Authenticated) => {
			let ctx = PageContext {
				folder: &state.settings.folder,
				status: query.status.as_deref().and_then(UploadStatus::parse),
			};

			Html(state.renderer.page(&ctx)).into_response()
		},
		Ok(_) => response::to_authorize(),
		Err(err) => {
			tracing::error!(?session, error = %err, "session lookup failed");

			response::internal(&state)
		},
	}
}

pub(crate) async fn authorize(State(state): State<AppState>, jar: PrivateCookieJar) -> Response {
	let (jar, session) = session::ensure(jar, state.settings.secure_cookies);
	let url = state.controller.begin(&session);

	(jar, Redirect::to(url.as_str())).into_response()
}

pub(crate) async fn callback(
	State(state): State<AppState>,
	jar: PrivateCookieJar,
	Query(params): Query<CallbackParams>,
) -> Response {
	let Some(session) = session::current(&jar) else {
		tracing::warn!("callback without a session cookie");

		return response::to_authorize();
	};

	match state.controller.complete(&session, params).await {
		Ok(_) => response::to_index(None),
		Err(err) => response::callback_outcome(&state, &err),
	}
}

pub(crate) async fn upload(
	State(state): State<AppState>,
	jar: PrivateCookieJar,
	mut multipart: Multipart,
) -> Response {
	let Some(session) = session::current(&jar) else {
		return response::to_authorize();
	};

	match state.controller.status(&session).await {
		Ok(SessionStatus::Authenticated) => {},
		Ok(_) => return response::to_authorize(),
		Err(err) => return response::upload_outcome(&state, &err),
	}

	let field = loop {
		match multipart.next_field().await {
			Ok(Some(field)) if field.name() == Some(FILE_FIELD) => break field,
			Ok(Some(_)) => continue,
			Ok(None) => return response::upload_outcome(&state, &UploadError::EmptyFile.into()),
			Err(err) => {
				let err = UploadError::SourceAborted { source: Box::new(err) }.into();

				return response::upload_outcome(&state, &err);
			},
		}
	};
	let task = UploadTask {
		name: field.file_name().unwrap_or_default().to_owned(),
		content_type: field.content_type().unwrap_or(DEFAULT_CONTENT_TYPE).to_owned(),
		folder: state.settings.folder.clone(),
		stream: Box::pin(field),
	};

	match state.relay.relay(&session, task).await {
		Ok(_) => response::to_index(Some(UploadStatus::Uploaded)),
		Err(err) => response::upload_outcome(&state, &err),
	}
}

pub(crate) async fn logout(State(state): State<AppState>, jar: PrivateCookieJar) -> Response {
	let Some(session) = session::current(&jar) else {
		return response::to_index(None);
	};

	match state.controller.logout(&session).await {
		Ok(_) => response::to_index(None),
		Err(err) => {
			tracing::error!(?session, error = %err, "logout failed");

			response::internal(&state)
		},
	}
}
