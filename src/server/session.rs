//! Browser session cookie.

// crates.io
use axum_extra::extract::{
	PrivateCookieJar,
	cookie::{Cookie, SameSite},
};
// self
use crate::auth::SessionId;

/// Name of the encrypted cookie carrying the session id.
pub const SESSION_COOKIE: &str = "drive_relay_sid";

/// Session id carried by the jar, if it decrypts to a valid identifier.
pub(crate) fn current(jar: &PrivateCookieJar) -> Option<SessionId> {
	jar.get(SESSION_COOKIE).and_then(|cookie| SessionId::new(cookie.value()).ok())
}

/// Returns the jar's session, issuing a new browser-session cookie when none is present.
pub(crate) fn ensure(jar: PrivateCookieJar, secure: bool) -> (PrivateCookieJar, SessionId) {
	if let Some(session) = current(&jar) {
		return (jar, session);
	}

	let session = SessionId::generate();
	// No max-age: the cookie dies with the browser session.
	let cookie = Cookie::build((SESSION_COOKIE, session.to_string()))
		.http_only(true)
		.secure(secure)
		.same_site(SameSite::Lax)
		.path("/")
		.build();

	(jar.add(cookie), session)
}
