//! Shared types for the updates client.
//!
//! These are the already-parsed, in-memory entities that the trust and
//! selection core operates on. Persistence and network fetching live outside
//! this workspace; anything that hands records to the core goes through the
//! types defined here.

pub mod directive;
pub mod filters;
pub mod update;

// Re-exports
pub use directive::{DirectiveError, RollBackToEmbeddedDirective, SigningInfo, UpdateDirective};
pub use filters::ManifestFilters;
pub use update::{UpdateRecord, UpdateStatus};
