//! Reader for Quill documents.
//!
//! Parses a source file's trailer and cross-reference chain into an
//! [`quill_xref::XrefTable`], then resolves individual objects lazily on
//! demand.
//!
//! # Architecture
//!
//! - [`Lexer`] / [`ObjectParser`] — byte-level tokenizer and value parser
//!   for the format's syntax
//! - [`load_document`] — trailer discovery and chain walking: classic
//!   tables, cross-reference streams, hybrid documents, and `/Prev` chains,
//!   merged newest-first
//! - [`resolve_object`] — lazy, idempotent materialization of one object,
//!   reading through object-stream containers when needed
//! - recovery — when the chain is structurally unusable the raw bytes are
//!   scanned for object markers and the registry is rebuilt from scratch;
//!   the caller sees a "document was rebuilt" flag, not a hard failure
//!
//! Capacity, addressing, and lifecycle violations are never recovered from;
//! they abort the load.

pub mod error;
pub mod lexer;
pub mod parser;
pub mod recovery;
pub mod resolve;
pub mod xref;

pub use error::{ReaderError, ReaderResult};
pub use lexer::{Keyword, Lexer, Token};
pub use parser::{IndirectObject, ObjectParser};
pub use quill_xref::XrefKind;
pub use resolve::resolve_object;
pub use xref::{find_startxref, load_document, ParsedDocument};
