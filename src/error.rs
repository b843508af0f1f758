//! # Errors
//!
//! Layered error handling: each module that can fail defines its own `thiserror`-derived error
//! enum describing the ways *it* can fail, and the public-facing [`PorcupineError`] wraps the
//! errors a caller of [`crate::porcupine::Porcupine`] actually needs to distinguish.

use crate::envelope::EnvelopeError;
use crate::nest::NestError;
use crate::nodule::NoduleError;
use crate::stores::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum PorcupineError {
    #[error("key not found")]
    NotFound,

    #[error("key already exists")]
    AlreadyExists,

    #[error("block failed its integrity check on load: {0}")]
    IntegrityFailure(#[from] EnvelopeError),

    #[error("block store operation failed: {0}")]
    StoreFailure(#[from] StoreError),

    #[error("failed to load a nodule from its backing block: {0}")]
    LoadFailure(#[from] NestError),

    #[error("an invariant of the tree structure was violated: {0}")]
    InvariantViolation(String),
}

impl From<NoduleError> for PorcupineError {
    fn from(err: NoduleError) -> Self {
        match err {
            NoduleError::NotFound => PorcupineError::NotFound,
            NoduleError::Empty => {
                PorcupineError::InvariantViolation("operated on an empty nodule".into())
            }
        }
    }
}

pub type PorcupineResult<T> = Result<T, PorcupineError>;
