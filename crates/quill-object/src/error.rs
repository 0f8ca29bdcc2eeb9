use thiserror::Error;

/// Errors produced by value-model operations.
#[derive(Debug, Error)]
pub enum ObjectError {
    /// A stream's serialized size crossed the configured ceiling.
    ///
    /// Enforced incrementally while bytes accumulate, so the operation fails
    /// at the violating chunk instead of after buffering the whole payload.
    #[error("stream size limit exceeded: {written} bytes written, limit is {limit}")]
    StreamSizeExceeded { written: u64, limit: u64 },

    /// The stream names a filter this build does not implement.
    #[error("unsupported stream filter: /{0}")]
    UnsupportedFilter(String),

    /// The stream's `/Filter` entry is not a name or array of names.
    #[error("malformed /Filter entry: expected name or array of names, got {0}")]
    MalformedFilter(&'static str),

    /// Decompression of stream data failed.
    #[error("stream decode failed: {0}")]
    DecodeFailed(String),

    /// Compression or serialization of stream data failed.
    #[error("stream encode failed: {0}")]
    EncodeFailed(String),

    /// I/O error from an underlying sink.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for value-model operations.
pub type ObjectResult<T> = Result<T, ObjectError>;
