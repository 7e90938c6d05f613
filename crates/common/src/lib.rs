//! Billflow Common Library
//!
//! Shared code for the billflow pipeline binaries including:
//! - Database pool, row models, and repository
//! - Error types and classification
//! - Configuration management
//! - Upstream timestamp parsing

pub mod config;
pub mod db;
pub mod errors;
pub mod time;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use errors::{AppError, ErrorClass, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
