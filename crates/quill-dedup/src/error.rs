use quill_object::ObjectError;
use thiserror::Error;

/// Errors from fingerprinting.
#[derive(Debug, Error)]
pub enum DedupError {
    /// Decoding a stream payload for structural hashing failed.
    #[error(transparent)]
    Object(#[from] ObjectError),
}

/// Result alias for fingerprint operations.
pub type DedupResult<T> = Result<T, DedupError>;
