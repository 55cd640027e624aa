//! Trust and selection core of the updates client.
//!
//! [`codesigning`] decides whether a manifest body was signed by a trusted
//! publisher; [`selection`] decides which stored update to launch, whether to
//! fetch a new one and which to delete. Both are synchronous and hold only
//! immutable configuration, so they can be shared freely across threads.

pub mod codesigning;
pub mod config;
pub mod selection;
pub mod structured_headers;

pub use codesigning::{
    CodeSigningConfiguration, CodeSigningError, SignatureValidationResult, ValidationStatus,
};
pub use config::UpdatesConfiguration;
pub use selection::{SelectionError, SelectionPolicy};
