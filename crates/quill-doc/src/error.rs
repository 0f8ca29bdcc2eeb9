use quill_dedup::DedupError;
use quill_object::ObjectError;
use quill_reader::ReaderError;
use quill_writer::WriterError;
use quill_xref::XrefError;
use thiserror::Error;

/// Errors from document-level operations.
#[derive(Debug, Error)]
pub enum DocError {
    /// The document was already written out and closed; further mutation or
    /// serialization is a lifecycle violation.
    #[error("document is closed; it was already written out")]
    AlreadyClosed,

    /// Append mode needs a source document to chain onto.
    #[error("document has no source bytes; incremental update requires an opened document")]
    NoSource,

    #[error(transparent)]
    Object(#[from] ObjectError),

    #[error(transparent)]
    Xref(#[from] XrefError),

    #[error(transparent)]
    Reader(#[from] ReaderError),

    #[error(transparent)]
    Writer(#[from] WriterError),

    #[error(transparent)]
    Dedup(#[from] DedupError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for document operations.
pub type DocResult<T> = Result<T, DocError>;
