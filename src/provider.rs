//! Provider-facing descriptors (data) and strategies (behavior).
//!
//! `descriptor` holds the validated endpoints plus the extra authorization parameters a provider
//! needs. `strategy` defines [`ProviderStrategy`], which maps token-endpoint failures into the
//! relay error taxonomy.

pub mod descriptor;
pub mod strategy;

pub use descriptor::*;
pub use strategy::*;
