//! Versioned binary envelope for session credentials.
//!
//! ```text
//! magic "DRC1" | version u8 | length u32 BE | JSON payload | SHA-256 digest (32 bytes)
//! ```
//!
//! The digest covers every byte before it, so any truncation or mutated byte is reported as a
//! [`DecodeError`] instead of producing a different credential.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
// self
use crate::{
	_prelude::*,
	auth::{Credential, ScopeSet, TokenSecret},
};

/// Envelope magic bytes.
pub const MAGIC: [u8; 4] = *b"DRC1";
/// Envelope version written by [`encode`].
pub const VERSION: u8 = 1;

const HEADER_LEN: usize = MAGIC.len() + 1 + 4;
const DIGEST_LEN: usize = 32;

/// Failures while encoding a credential.
#[derive(Debug, ThisError)]
pub enum EncodeError {
	/// The payload could not be serialized.
	#[error("Credential payload could not be serialized.")]
	Payload(#[from] serde_json::Error),
	/// The payload does not fit the 32-bit length field.
	#[error("Credential payload of {len} bytes exceeds the envelope limit.")]
	TooLarge {
		/// Payload length in bytes.
		len: usize,
	},
}

/// Failures while decoding a credential blob.
#[derive(Debug, ThisError)]
pub enum DecodeError {
	/// The blob is shorter than the fixed header plus digest.
	#[error("Credential blob is truncated ({len} bytes).")]
	Truncated {
		/// Observed blob length.
		len: usize,
	},
	/// The blob does not start with the envelope magic.
	#[error("Credential blob has an unknown magic prefix.")]
	BadMagic,
	/// The envelope version is not understood by this build.
	#[error("Credential blob version {version} is not supported.")]
	UnsupportedVersion {
		/// Version byte found in the header.
		version: u8,
	},
	/// The declared payload length disagrees with the blob size.
	#[error("Credential blob declares {declared} payload bytes but carries {actual}.")]
	LengthMismatch {
		/// Payload length from the header.
		declared: usize,
		/// Payload length implied by the blob size.
		actual: usize,
	},
	/// The trailing digest does not match the envelope contents.
	#[error("Credential blob failed its integrity check.")]
	DigestMismatch,
	/// The payload is not a valid credential document.
	#[error("Credential payload is malformed.")]
	Payload(#[from] serde_path_to_error::Error<serde_json::Error>),
	/// A timestamp in the payload is out of range.
	#[error("Credential payload carries an out-of-range timestamp.")]
	Timestamp(#[from] time::error::ComponentRange),
	/// The textual form is not valid base64url.
	#[error("Credential text is not valid base64url.")]
	Base64(#[from] base64::DecodeError),
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireCredential {
	access_token: String,
	refresh_token: Option<String>,
	issued_at: WireInstant,
	expires_at: WireInstant,
	scope: ScopeSet,
}
impl WireCredential {
	fn from_credential(credential: &Credential) -> Self {
		Self {
			access_token: credential.access_token.expose().to_owned(),
			refresh_token: credential.refresh_token.as_ref().map(|s| s.expose().to_owned()),
			issued_at: WireInstant::from(credential.issued_at),
			expires_at: WireInstant::from(credential.expires_at),
			scope: credential.scope.clone(),
		}
	}

	fn into_credential(self) -> Result<Credential, DecodeError> {
		Ok(Credential {
			access_token: TokenSecret::new(self.access_token),
			refresh_token: self.refresh_token.map(TokenSecret::new),
			issued_at: self.issued_at.into_instant()?,
			expires_at: self.expires_at.into_instant()?,
			scope: self.scope,
		})
	}
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireInstant {
	secs: i64,
	nanos: u32,
}
impl WireInstant {
	fn into_instant(self) -> Result<OffsetDateTime, DecodeError> {
		let base = OffsetDateTime::from_unix_timestamp(self.secs)?;

		Ok(base.replace_nanosecond(self.nanos)?)
	}
}
impl From<OffsetDateTime> for WireInstant {
	fn from(instant: OffsetDateTime) -> Self {
		Self { secs: instant.unix_timestamp(), nanos: instant.nanosecond() }
	}
}

/// Serializes a credential into the versioned envelope.
pub fn encode(credential: &Credential) -> Result<Vec<u8>, EncodeError> {
	let payload = serde_json::to_vec(&WireCredential::from_credential(credential))?;
	let len =
		u32::try_from(payload.len()).map_err(|_| EncodeError::TooLarge { len: payload.len() })?;
	let mut blob = Vec::with_capacity(HEADER_LEN + payload.len() + DIGEST_LEN);

	blob.extend_from_slice(&MAGIC);
	blob.push(VERSION);
	blob.extend_from_slice(&len.to_be_bytes());
	blob.extend_from_slice(&payload);

	let digest = Sha256::digest(&blob);

	blob.extend_from_slice(&digest);

	Ok(blob)
}

/// Parses a blob produced by [`encode`].
pub fn decode(blob: &[u8]) -> Result<Credential, DecodeError> {
	if blob.len() < HEADER_LEN + DIGEST_LEN {
		return Err(DecodeError::Truncated { len: blob.len() });
	}
	if blob[..MAGIC.len()] != MAGIC {
		return Err(DecodeError::BadMagic);
	}

	let version = blob[MAGIC.len()];

	if version != VERSION {
		return Err(DecodeError::UnsupportedVersion { version });
	}

	let mut len_bytes = [0_u8; 4];

	len_bytes.copy_from_slice(&blob[MAGIC.len() + 1..HEADER_LEN]);

	let declared = u32::from_be_bytes(len_bytes) as usize;
	let actual = blob.len() - HEADER_LEN - DIGEST_LEN;

	if declared != actual {
		return Err(DecodeError::LengthMismatch { declared, actual });
	}

	let (body, digest) = blob.split_at(HEADER_LEN + declared);

	if !bool::from(Sha256::digest(body).as_slice().ct_eq(digest)) {
		return Err(DecodeError::DigestMismatch);
	}

	let de = &mut serde_json::Deserializer::from_slice(&body[HEADER_LEN..]);
	let wire: WireCredential = serde_path_to_error::deserialize(de)?;

	wire.into_credential()
}

/// Encodes a credential as unpadded base64url text for string-only stores.
pub fn encode_text(credential: &Credential) -> Result<String, EncodeError> {
	Ok(URL_SAFE_NO_PAD.encode(encode(credential)?))
}

/// Decodes text produced by [`encode_text`].
pub fn decode_text(text: &str) -> Result<Credential, DecodeError> {
	decode(&URL_SAFE_NO_PAD.decode(text)?)
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn fixture() -> Credential {
		Credential::builder(ScopeSet::drive_file())
			.access_token("ya29.access")
			.refresh_token("1//refresh")
			.issued_at(macros::datetime!(2025-03-01 12:00:00.123456789 UTC))
			.expires_in(Duration::seconds(3599))
			.build()
			.expect("Credential fixture should build.")
	}

	#[test]
	fn round_trip_preserves_every_field() {
		let credential = fixture();
		let blob = encode(&credential).expect("Fixture should encode.");

		assert_eq!(&blob[..4], b"DRC1");
		assert_eq!(blob[4], VERSION);
		assert_eq!(decode(&blob).expect("Encoded blob should decode."), credential);
	}

	#[test]
	fn every_truncation_fails() {
		let blob = encode(&fixture()).expect("Fixture should encode.");

		for len in 0..blob.len() {
			assert!(decode(&blob[..len]).is_err(), "Truncation to {len} bytes must fail.");
		}
	}

	#[test]
	fn every_single_byte_mutation_fails() {
		let blob = encode(&fixture()).expect("Fixture should encode.");

		for index in 0..blob.len() {
			let mut mutated = blob.clone();

			mutated[index] ^= 0x01;

			assert!(decode(&mutated).is_err(), "Mutation at byte {index} must fail.");
		}
	}

	#[test]
	fn header_faults_are_classified() {
		let blob = encode(&fixture()).expect("Fixture should encode.");
		let mut magic = blob.clone();
		let mut version = blob.clone();
		let mut length = blob.clone();

		magic[0] = b'X';
		version[4] = 2;
		length[8] ^= 0x01;

		assert!(matches!(decode(&magic), Err(DecodeError::BadMagic)));
		assert!(matches!(decode(&version), Err(DecodeError::UnsupportedVersion { version: 2 })));
		assert!(matches!(decode(&length), Err(DecodeError::LengthMismatch { .. })));
		assert!(matches!(decode(&blob[..10]), Err(DecodeError::Truncated { len: 10 })));
	}

	#[test]
	fn unknown_fields_are_rejected_even_with_a_valid_digest() {
		let payload = br#"{"access_token":"a","refresh_token":null,"issued_at":{"secs":0,"nanos":0},"expires_at":{"secs":60,"nanos":0},"scope":[],"extra":1}"#;
		let mut blob = Vec::new();

		blob.extend_from_slice(&MAGIC);
		blob.push(VERSION);
		blob.extend_from_slice(&(payload.len() as u32).to_be_bytes());
		blob.extend_from_slice(payload);

		let digest = Sha256::digest(&blob);

		blob.extend_from_slice(&digest);

		assert!(matches!(decode(&blob), Err(DecodeError::Payload(_))));
	}

	#[test]
	fn text_form_round_trips() {
		let credential = fixture();
		let text = encode_text(&credential).expect("Fixture should encode as text.");

		assert_eq!(decode_text(&text).expect("Text should decode."), credential);
		assert!(matches!(decode_text("not base64!"), Err(DecodeError::Base64(_))));
	}
}
