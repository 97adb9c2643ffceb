//! `drive-relay` server binary.

// std
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
// crates.io
use axum_extra::extract::cookie::Key;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use clap::Parser;
use color_eyre::{Result, eyre::WrapErr};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
// self
use drive_relay::{
	auth::FolderId,
	config::{ClientSecrets, RelaySettings},
	flows::AuthorizationController,
	http::ReqwestHttpClient,
	oauth::OAuthClient,
	provider::ProviderDescriptor,
	relay::UploadRelay,
	server::{self, AppState},
	storage::{DriveStorage, RemoteStorage},
	store::CredentialStore,
};

const MIB: usize = 1024 * 1024;

/// Relays browser image uploads into a shared Google Drive folder.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
	/// Listen address.
	#[arg(long, env = "DRIVE_RELAY_BIND", default_value = "0.0.0.0:5000")]
	bind: SocketAddr,
	/// Google OAuth client secrets file.
	#[arg(long, env = "DRIVE_RELAY_CLIENT_SECRETS", default_value = "client_secrets.json")]
	client_secrets: PathBuf,
	/// Destination Drive folder id.
	#[arg(long, env = "DRIVE_RELAY_FOLDER_ID")]
	folder_id: String,
	/// Callback URI; defaults to the first `redirect_uris` entry of the secrets file.
	#[arg(long, env = "DRIVE_RELAY_REDIRECT_URI")]
	redirect_uri: Option<String>,
	/// Base64 cookie encryption key of at least 64 bytes; random per process when omitted.
	#[arg(long, env = "DRIVE_RELAY_COOKIE_KEY", hide_env_values = true)]
	cookie_key: Option<String>,
	/// Chunk size in MiB.
	#[arg(long, env = "DRIVE_RELAY_CHUNK_MIB", default_value_t = 8)]
	chunk_mib: usize,
	/// Largest accepted upload in MiB.
	#[arg(long, env = "DRIVE_RELAY_MAX_UPLOAD_MIB", default_value_t = 64)]
	max_upload_mib: usize,
	/// Drop the `Secure` cookie attribute (plain-HTTP development only).
	#[arg(long, env = "DRIVE_RELAY_INSECURE_COOKIES")]
	insecure_cookies: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let cli = Cli::parse();
	let settings = RelaySettings::new(FolderId::new(&cli.folder_id)?)
		.with_chunk_size(cli.chunk_mib * MIB)
		.with_max_upload_bytes(cli.max_upload_mib * MIB)
		.with_secure_cookies(!cli.insecure_cookies);

	settings.validate()?;

	let secrets = ClientSecrets::from_path(&cli.client_secrets)
		.wrap_err_with(|| format!("loading {}", cli.client_secrets.display()))?;
	let http = ReqwestHttpClient::new(settings.request_timeout)?;
	let oauth = OAuthClient::new(
		ProviderDescriptor::from_client_secrets(&secrets)?,
		secrets.credentials(),
		secrets.redirect_uri(cli.redirect_uri.as_deref())?,
		http.clone(),
	)?;
	let store = CredentialStore::in_memory();
	let storage: Arc<dyn RemoteStorage> = Arc::new(DriveStorage::new(http, oauth.clone())?);
	let relay = UploadRelay::new(storage, store.clone(), &settings);
	let controller =
		AuthorizationController::new(oauth, store).with_ttl(settings.authorization_ttl);
	let state = AppState::new(controller, relay, settings, cookie_key(cli.cookie_key.as_deref())?);
	let listener =
		TcpListener::bind(cli.bind).await.wrap_err_with(|| format!("binding {}", cli.bind))?;

	server::serve(listener, state, shutdown_signal()).await?;

	Ok(())
}

fn cookie_key(raw: Option<&str>) -> Result<Key> {
	let Some(raw) = raw else {
		tracing::warn!("no cookie key configured; sessions will not survive a restart");

		return Ok(Key::generate());
	};
	let bytes = STANDARD.decode(raw.trim()).wrap_err("cookie key is not valid base64")?;

	Key::try_from(bytes.as_slice()).wrap_err("cookie key must decode to at least 64 bytes")
}

async fn shutdown_signal() {
	if let Err(err) = tokio::signal::ctrl_c().await {
		tracing::error!(error = %err, "failed to listen for shutdown signal");
	}

	tracing::info!("shutting down");
}
