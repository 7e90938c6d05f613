//! Billflow normalizer engine library.
//!
//! The binary in `main.rs` is a thin wrapper; the engine itself lives here
//! so integration tests can drive it against a real database.

pub mod errors;
pub mod payload;
pub mod processor;

pub use errors::NormalizerError;
pub use processor::{NormalizerProcessor, RunSummary};
