use quill_object::DocumentId;
use thiserror::Error;

/// Errors from registry and object-stream operations.
#[derive(Debug, Error)]
pub enum XrefError {
    /// Growth would exceed the configured maximum element count.
    ///
    /// Fatal and non-recoverable: a clamped table would corrupt addressing.
    #[error("cross-reference capacity exceeded: {requested} entries requested, limit is {limit}")]
    CapacityExceeded { requested: usize, limit: usize },

    /// A computed byte offset reached the format's addressing ceiling.
    /// Detected before the offset is recorded, aborting the write.
    #[error("object {number} offset {offset} is at or beyond the 10,000,000,000-byte addressing ceiling")]
    OffsetOverflow { number: u32, offset: u64 },

    /// A lifecycle contract was violated on a flushed object.
    #[error("object {number} {generation} is already flushed; cannot {action} it")]
    Flushed {
        number: u32,
        generation: u16,
        action: &'static str,
    },

    /// A dirty object's value was released and never reloaded.
    /// Released objects must be re-read before being written.
    #[error("object {number} has no in-memory value; released objects must be re-read before being written")]
    ReleasedValueMissing { number: u32 },

    /// The reference belongs to a different document.
    #[error("reference {number} {generation} belongs to {actual}, not {expected}")]
    ForeignDocument {
        number: u32,
        generation: u16,
        expected: DocumentId,
        actual: DocumentId,
    },

    /// The reference's generation no longer matches the registry slot
    /// (the slot was freed and reused since the reference was taken).
    #[error("reference {number} {generation} does not match the registry entry (current generation {current})")]
    StaleReference {
        number: u32,
        generation: u16,
        current: u16,
    },

    /// The slot cannot be freed (reserved, out of range, already free, or a
    /// generation mismatch).
    #[error("cannot free object {number}: {reason}")]
    CannotFree { number: u32, reason: &'static str },

    /// Operation on a slot that is free or was never allocated.
    #[error("object {number} is free")]
    FreeObject { number: u32 },

    /// An object stream reached its configured object count.
    #[error("object stream is full: capacity is {capacity} objects")]
    ObjectStreamFull { capacity: usize },

    /// A container reference does not lead to a usable object stream.
    /// This is structural corruption, not a silent null.
    #[error("invalid object stream {container}: {reason}")]
    InvalidObjectStream { container: u32, reason: String },
}

/// Result alias for registry operations.
pub type XrefResult<T> = Result<T, XrefError>;
