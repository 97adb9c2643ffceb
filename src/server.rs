//! Inbound HTTP surface.
//!
//! | Route | Behavior |
//! |---|---|
//! | `GET /` | upload page, or `303 /authorize` without a credential |
//! | `POST /upload` | relays the multipart `file` field, then `303 /?status=…` |
//! | `GET /authorize` | starts the handshake, `303` to the provider |
//! | `GET /oauth2callback` | completes the handshake |
//! | `GET`, `POST /logout` | forgets the credential |

pub mod render;

mod response;
mod routes;
mod session;

pub use render::{BasicRenderer, PageContext, Renderer, UploadStatus};
pub use session::SESSION_COOKIE;

// std
use std::io;
// crates.io
use axum::{
	Router,
	extract::{DefaultBodyLimit, FromRef},
	routing::{get, post},
};
use axum_extra::extract::cookie::Key;
use tokio::net::TcpListener;
// self
use crate::{_prelude::*, config::RelaySettings, flows::AuthorizationController, relay::UploadRelay};

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
	pub(crate) controller: AuthorizationController,
	pub(crate) relay: UploadRelay,
	pub(crate) renderer: Arc<dyn Renderer>,
	pub(crate) settings: Arc<RelaySettings>,
	key: Key,
}
impl AppState {
	/// Bundles the handshake controller, the relay, and the cookie encryption key.
	pub fn new(
		controller: AuthorizationController,
		relay: UploadRelay,
		settings: RelaySettings,
		key: Key,
	) -> Self {
		Self {
			controller,
			relay,
			renderer: Arc::new(BasicRenderer),
			settings: Arc::new(settings),
			key,
		}
	}

	/// Replaces the built-in renderer.
	pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
		self.renderer = renderer;

		self
	}

	/// Handshake controller.
	pub fn controller(&self) -> &AuthorizationController {
		&self.controller
	}

	/// Upload relay.
	pub fn relay(&self) -> &UploadRelay {
		&self.relay
	}
}
impl Debug for AppState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AppState")
			.field("controller", &self.controller)
			.field("relay", &self.relay)
			.field("settings", &self.settings)
			.finish_non_exhaustive()
	}
}
// `PrivateCookieJar` pulls its key from state.
impl FromRef<AppState> for Key {
	fn from_ref(state: &AppState) -> Self {
		state.key.clone()
	}
}

/// Builds the router for `state`.
pub fn router(state: AppState) -> Router {
	let body_limit = state.settings.max_upload_bytes;

	Router::new()
		.route("/", get(routes::index))
		.route("/upload", post(routes::upload).layer(DefaultBodyLimit::max(body_limit)))
		.route("/authorize", get(routes::authorize))
		.route("/oauth2callback", get(routes::callback))
		.route("/logout", get(routes::logout).post(routes::logout))
		.with_state(state)
}

/// Serves `state` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> io::Result<()>
where
	F: 'static + Send + Future<Output = ()>,
{
	if let Ok(addr) = listener.local_addr() {
		tracing::info!(%addr, "listening");
	}

	axum::serve(listener, router(state)).with_graceful_shutdown(shutdown).await
}
