//! CSRF state tokens bound to a pending authorization.

// crates.io
use subtle::ConstantTimeEq;
// self
use crate::{
	_prelude::*,
	auth::{PkcePair, id},
};

/// Default lifetime of a pending authorization.
pub const AUTHORIZATION_TTL: Duration = Duration::minutes(10);

const STATE_TOKEN_BYTES: usize = 32;

/// Random, unguessable, single-use token round-tripped through the provider redirect.
#[derive(Clone, PartialEq, Eq)]
pub struct StateToken(String);
impl StateToken {
	/// Draws a new token from the OS-seeded CSPRNG.
	pub fn generate() -> Self {
		Self(id::random_urlsafe::<STATE_TOKEN_BYTES>())
	}

	/// Encoded token value placed on the authorization URL.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Compares against a returned value without short-circuiting on the first differing byte.
	pub fn matches(&self, returned: &str) -> bool {
		self.0.as_bytes().ct_eq(returned.as_bytes()).into()
	}
}
impl Debug for StateToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("StateToken(<redacted>)")
	}
}

/// Handshake material held between "authorization requested" and "callback received".
#[derive(Clone, Debug)]
pub struct AuthorizationState {
	/// Token that must come back on the callback.
	pub token: StateToken,
	/// PKCE pair whose verifier is replayed on the exchange.
	pub pkce: PkcePair,
	/// Instant the authorization was issued.
	pub created_at: OffsetDateTime,
}
impl AuthorizationState {
	/// Issues fresh handshake material stamped with `now`.
	pub fn issue(now: OffsetDateTime) -> Self {
		Self { token: StateToken::generate(), pkce: PkcePair::generate(), created_at: now }
	}

	/// Returns `true` once the authorization outlived `ttl`.
	pub fn is_expired_at(&self, instant: OffsetDateTime, ttl: Duration) -> bool {
		instant - self.created_at >= ttl
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn state_tokens_are_unique_and_urlsafe() {
		let a = StateToken::generate();
		let b = StateToken::generate();

		assert_ne!(a, b);
		assert_eq!(a.as_str().len(), 43);
		assert!(a.as_str().chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
	}

	#[test]
	fn matching_is_exact() {
		let token = StateToken::generate();
		let mut tampered = token.as_str().to_owned();

		tampered.pop();

		assert!(token.matches(token.as_str()));
		assert!(!token.matches(&tampered));
		assert!(!token.matches(""));
	}

	#[test]
	fn authorization_expires_after_ttl() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let state = AuthorizationState::issue(issued);

		let almost = macros::datetime!(2025-01-01 00:09:59 UTC);

		assert!(!state.is_expired_at(almost, AUTHORIZATION_TTL));
		assert!(state.is_expired_at(macros::datetime!(2025-01-01 00:10 UTC), AUTHORIZATION_TTL));
	}
}
