//! Relay browser image uploads into one shared Google Drive folder.
//!
//! The crate couples an OAuth 2.0 authorization-code handshake (state token + PKCE) with a
//! per-session credential store and a resumable upload relay that streams inbound bodies in
//! bounded chunks, retrying transient failures with exponential backoff.

#![deny(clippy::all, missing_docs)]

pub mod auth;
pub mod codec;
pub mod config;
pub mod error;
pub mod flows;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod provider;
pub mod relay;
pub mod server;
pub mod storage;
pub mod store;

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use bytes::Bytes;
	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
