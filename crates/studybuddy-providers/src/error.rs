//! Provider error types.
//!
//! The taxonomy lives in `studybuddy-core` so the service can classify
//! failures without depending on this crate.

pub use studybuddy_core::error::ProviderError;
