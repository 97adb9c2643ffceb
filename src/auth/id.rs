//! Strongly typed identifiers used across the relay.

// std
use std::{borrow::Borrow, ops::Deref};
// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
// self
use crate::_prelude::*;

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				validate_view($kind, view)?;

				Ok(Self(view.to_owned()))
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				validate_view($kind, &value)?;

				Ok(Self(value))
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

const IDENTIFIER_MAX_LEN: usize = 128;
const SESSION_ID_BYTES: usize = 32;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (session, folder, remote object).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (session, folder, remote object).
		kind: &'static str,
	},
	/// The identifier exceeded the allowed character count.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier (session, folder, remote object).
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
}

def_id! { SessionId, "Opaque browser session identifier carried in the session cookie.", "Session" }
def_id! { FolderId, "Identifier of the shared destination folder.", "Folder" }
def_id! { RemoteObjectId, "Identifier the remote store assigned to an upload.", "RemoteObject" }
impl SessionId {
	/// Issues a fresh, unguessable session identifier.
	pub fn generate() -> Self {
		Self(random_urlsafe::<SESSION_ID_BYTES>())
	}
}
impl Debug for SessionId {
	// Session ids authenticate the browser; only a prefix is printed.
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let prefix = self.0.get(..6).unwrap_or(&self.0);

		write!(f, "Session({prefix}..)")
	}
}
impl Debug for FolderId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Folder({})", self.0)
	}
}
impl Debug for RemoteObjectId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "RemoteObject({})", self.0)
	}
}

/// Draws `N` bytes from the thread-local CSPRNG and encodes them as unpadded base64url.
pub(crate) fn random_urlsafe<const N: usize>() -> String {
	let mut bytes = [0_u8; N];

	rand::rng().fill(&mut bytes);

	URL_SAFE_NO_PAD.encode(bytes)
}

fn validate_view(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn identifiers_validate_input() {
		let folder = FolderId::new("1AbCdEf").expect("Folder fixture should be considered valid.");

		assert_eq!(folder.as_ref(), "1AbCdEf");
		assert!(SessionId::new("").is_err());
		assert!(RemoteObjectId::new("with space").is_err());
		assert!(FolderId::new("a".repeat(IDENTIFIER_MAX_LEN + 1)).is_err());
	}

	#[test]
	fn serde_round_trip_enforces_validation() {
		let folder: FolderId =
			serde_json::from_str("\"folder-42\"").expect("Folder should deserialize successfully.");

		assert_eq!(folder.as_ref(), "folder-42");
		assert!(serde_json::from_str::<FolderId>("\" folder-42\"").is_err());
	}

	#[test]
	fn generated_sessions_are_unique_and_valid() {
		let a = SessionId::generate();
		let b = SessionId::generate();

		assert_ne!(a, b);
		assert_eq!(a.len(), 43);
		assert!(SessionId::new(a.as_ref()).is_ok());
	}

	#[test]
	fn session_debug_hides_the_full_identifier() {
		let session = SessionId::new("abcdef0123456789").expect("Session fixture should be valid.");
		let rendered = format!("{session:?}");

		assert_eq!(rendered, "Session(abcdef..)");
	}

	#[test]
	fn borrow_supports_fast_lookup() {
		let map: HashMap<SessionId, u8> = HashMap::from_iter([(
			SessionId::new("session-123").expect("Session used for lookup should be valid."),
			7_u8,
		)]);

		assert_eq!(map.get("session-123"), Some(&7));
	}
}
