use quill_object::ObjectError;
use quill_xref::XrefError;
use thiserror::Error;

/// Errors from serializing a document.
#[derive(Debug, Error)]
pub enum WriterError {
    /// The trailer needs a root catalog reference and none was provided.
    #[error("document has no root catalog reference")]
    MissingRoot,

    /// A classic table cannot address an object-stream member.
    #[error("object {number} lives in an object stream and cannot appear in a classic table section")]
    ClassicContainerEntry { number: u32 },

    /// A section entry was requested for an object that was never written.
    #[error("object {number} has no assigned location; it was not written in this cycle")]
    UnwrittenEntry { number: u32 },

    #[error(transparent)]
    Object(#[from] ObjectError),

    #[error(transparent)]
    Xref(#[from] XrefError),
}

/// Result alias for writer operations.
pub type WriterResult<T> = Result<T, WriterError>;
