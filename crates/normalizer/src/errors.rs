//! Normalizer engine error types

use billflow_common::errors::{AppError, ErrorClass};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NormalizerError {
    /// The entity's authoritative payload does not parse into its target
    /// shape. The unit is skipped and reported; the run continues.
    #[error("Malformed payload for {key}: {message}")]
    Malformed { key: String, message: String },

    /// Database or infrastructure failure, already classified upstream.
    #[error(transparent)]
    App(#[from] AppError),
}

impl NormalizerError {
    pub fn malformed(key: impl Into<String>, message: impl Into<String>) -> Self {
        NormalizerError::Malformed {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            NormalizerError::Malformed { .. } => ErrorClass::Malformed,
            NormalizerError::App(e) => e.class(),
        }
    }

    /// Fatal failures abort the whole run; everything else is scoped to
    /// the entity that produced it.
    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }
}
