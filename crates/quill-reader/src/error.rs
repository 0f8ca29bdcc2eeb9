use quill_object::ObjectError;
use quill_xref::XrefError;
use thiserror::Error;

/// Errors from parsing a source document.
///
/// Most structural variants never reach the caller directly: the chain
/// loader catches them and falls back to the recovery scan. Capacity and
/// lifecycle errors pass through untouched; those are fatal by contract.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("unexpected token at byte {offset}: expected {expected}, found {found}")]
    UnexpectedToken {
        offset: usize,
        expected: &'static str,
        found: String,
    },

    #[error("unexpected end of data at byte {offset}")]
    UnexpectedEof { offset: usize },

    #[error("no startxref marker found in the file tail")]
    MissingStartxref,

    #[error("cross-reference offset {offset} is outside the file")]
    BadXrefOffset { offset: u64 },

    #[error("malformed cross-reference table at byte {offset}: {reason}")]
    MalformedTable { offset: usize, reason: String },

    #[error("malformed cross-reference stream: {0}")]
    MalformedXrefStream(String),

    #[error("no trailer dictionary could be recovered")]
    MissingTrailer,

    #[error("object {expected} not found at its recorded offset (found object {found})")]
    ObjectMismatch { expected: u32, found: u32 },

    #[error(transparent)]
    Object(#[from] ObjectError),

    #[error(transparent)]
    Xref(#[from] XrefError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReaderError {
    /// Whether the chain loader may fall back to the recovery scan for this
    /// error. Capacity, addressing, and lifecycle violations stay fatal.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            ReaderError::Xref(
                XrefError::CapacityExceeded { .. }
                    | XrefError::OffsetOverflow { .. }
                    | XrefError::Flushed { .. }
            ) | ReaderError::Object(ObjectError::StreamSizeExceeded { .. })
                | ReaderError::Io(_)
        )
    }
}

/// Result alias for reader operations.
pub type ReaderResult<T> = Result<T, ReaderError>;
