//! PKCE (RFC 7636) verifier and S256 challenge pairs.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, auth::TokenSecret};

const PKCE_VERIFIER_LEN: usize = 64;

/// Supported PKCE challenge methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkceCodeChallengeMethod {
	/// SHA-256 based PKCE (RFC 7636 S256).
	S256,
}
impl PkceCodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

/// Secret verifier plus the challenge sent on the authorization URL.
#[derive(Clone, PartialEq, Eq)]
pub struct PkcePair {
	verifier: TokenSecret,
	challenge: String,
	method: PkceCodeChallengeMethod,
}
impl PkcePair {
	/// Generates a fresh 64-character verifier and its S256 challenge.
	pub fn generate() -> Self {
		let verifier: String =
			rand::rng().sample_iter(Alphanumeric).take(PKCE_VERIFIER_LEN).map(char::from).collect();
		let challenge = compute_pkce_challenge(&verifier);
		let method = PkceCodeChallengeMethod::S256;

		Self { verifier: TokenSecret::new(verifier), challenge, method }
	}

	/// Secret verifier replayed on the token exchange.
	pub fn verifier(&self) -> &TokenSecret {
		&self.verifier
	}

	/// Challenge derived from the verifier.
	pub fn challenge(&self) -> &str {
		&self.challenge
	}

	/// Challenge method (currently always `S256`).
	pub fn method(&self) -> PkceCodeChallengeMethod {
		self.method
	}
}
impl Debug for PkcePair {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PkcePair")
			.field("verifier", &self.verifier)
			.field("challenge", &self.challenge)
			.field("method", &self.method)
			.finish()
	}
}

fn compute_pkce_challenge(verifier: &str) -> String {
	let mut hasher = Sha256::new();

	hasher.update(verifier.as_bytes());

	URL_SAFE_NO_PAD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn challenge_matches_rfc_7636_vector() {
		// Appendix B of RFC 7636.
		assert_eq!(
			compute_pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
			"E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
		);
	}

	#[test]
	fn generated_pairs_are_consistent() {
		let pair = PkcePair::generate();

		assert_eq!(pair.verifier().expose().len(), PKCE_VERIFIER_LEN);
		assert_eq!(pair.challenge(), compute_pkce_challenge(pair.verifier().expose()));
		assert_eq!(pair.method().as_str(), "S256");
		assert!(!format!("{pair:?}").contains(pair.verifier().expose()));
	}
}
