//! Auth-domain identifiers, scope sets, credentials, and handshake state.

pub mod credential;
pub mod id;
pub mod pkce;
pub mod scope;
pub mod secret;
pub mod state;

pub use credential::*;
pub use id::*;
pub use pkce::*;
pub use scope::*;
pub use secret::*;
pub use state::*;
