//! Writer for Quill documents.
//!
//! Walks a registry's pending objects in ascending number order, serializes
//! each one, records its offset (or object-stream slot), and emits the
//! cross-reference section and trailer: either the classic 20-byte-record
//! table or a compressed cross-reference stream.
//!
//! # Rules
//!
//! - Every written object is marked flushed; writing it again is a fatal
//!   lifecycle error.
//! - Offsets are checked against the 10,000,000,000-byte addressing ceiling
//!   before the object is emitted.
//! - Append mode never rewrites existing bytes: only new/changed objects are
//!   produced, and the fresh trailer's `/Prev` chains to the previous
//!   section. A section-format mismatch against the source document is
//!   logged and resolved in the source's favor.
//! - Object-stream packing batches eligible non-stream objects before the
//!   section is written.

pub mod error;
pub mod writer;

pub use error::{WriterError, WriterResult};
pub use writer::{write_document, TrailerSpec, WriteMode, WriterConfig};
