//! Indirect-reference registry for Quill.
//!
//! This crate owns the cross-reference table: the object-number-indexed
//! record of where every indirect object lives, what lifecycle state it is
//! in, and which slots are free for reuse. It also implements the
//! object-stream container that packs multiple non-stream objects into one
//! compressed payload.
//!
//! # Key Types
//!
//! - [`XrefTable`] — the registry: allocation, free-chain threading,
//!   capacity enforcement, lifecycle transitions
//! - [`XrefEntry`] / [`EntryState`] / [`Location`] — one slot's record
//! - [`ObjectStreamBuilder`] / [`ParsedObjectStream`] — container packing
//!   and slicing
//!
//! # Design Rules
//!
//! 1. Slot 0 is the permanent free-chain head (generation 65535, never
//!    reused); the chain threads backward and terminates there.
//! 2. Capacity and offset ceilings are fatal when crossed, never clamped.
//! 3. A failed operation leaves the bookkeeping untouched: a failed `add`
//!    never partially consumes a slot.
//! 4. The cached value on an entry is a droppable handle; the recorded
//!    location stays authoritative.

pub mod entry;
pub mod error;
pub mod objstm;
pub mod table;

pub use entry::{EntryState, Location, XrefEntry, XrefKind};
pub use error::{XrefError, XrefResult};
pub use objstm::{ObjectStreamBuilder, ObjectStreamPayload, ParsedObjectStream};
pub use table::XrefTable;
