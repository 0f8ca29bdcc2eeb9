//! Document facade for Quill.
//!
//! Ties the component crates together behind one [`Document`] type: open a
//! file (or start empty), add and mutate indirect objects, resolve lazily,
//! release memory, then write the whole document or append an incremental
//! update. This is the main entry point for code embedding the engine.

pub mod document;
pub mod error;

pub use document::Document;
pub use error::{DocError, DocResult};

// Re-export key types
pub use quill_object::{
    Dict, DocumentId, Filter, Limits, Name, ObjRef, PdfString, Stream, Value,
};
pub use quill_writer::WriterConfig;
pub use quill_xref::{EntryState, Location, XrefKind};
