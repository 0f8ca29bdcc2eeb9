use std::rc::Rc;

use quill_object::{DocumentId, ObjRef, Value};

/// Which on-disk form a cross-reference section takes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum XrefKind {
    /// Classic plain-text table of 20-byte records.
    Table,
    /// Compressed cross-reference stream of binary rows.
    Stream,
}

/// Lifecycle state of one registry slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryState {
    /// Present in the source file but not yet materialized.
    Reading,
    /// Materialized (or newly added) and unchanged since load.
    InUse,
    /// Value changed after initial load; must be written.
    Modified,
    /// Written out. The value link is cleared and the slot can no longer be
    /// mutated or re-serialized.
    Flushed,
    /// Released back to the pool; part of the free chain.
    Free,
}

/// Where a slot's object lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Location {
    /// New object, no position assigned yet.
    Unassigned,
    /// Byte offset in the source (or output) file.
    Offset(u64),
    /// Packed inside an object stream: `(containerNumber, indexInStream)`.
    InObjectStream { container: u32, index: u32 },
    /// Free slot: the next free object number in the chain (0 terminates).
    NextFree(u32),
}

/// One cross-reference record: a numbered, versioned slot with a lifecycle
/// state, an on-disk location, and an optional cached value.
///
/// The cache is a droppable handle; releasing it is always safe because the
/// location stays authoritative and the value can be re-derived by a read.
#[derive(Clone, Debug)]
pub struct XrefEntry {
    number: u32,
    generation: u16,
    state: EntryState,
    location: Location,
    cached: Option<Rc<Value>>,
}

impl XrefEntry {
    pub(crate) fn new(number: u32, generation: u16, state: EntryState, location: Location) -> Self {
        Self {
            number,
            generation,
            state,
            location,
            cached: None,
        }
    }

    /// The permanent head of the free chain (slot 0, generation 65535).
    pub(crate) fn free_head() -> Self {
        Self::new(0, u16::MAX, EntryState::Free, Location::NextFree(0))
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn generation(&self) -> u16 {
        self.generation
    }

    pub fn state(&self) -> EntryState {
        self.state
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn is_free(&self) -> bool {
        self.state == EntryState::Free
    }

    pub fn is_flushed(&self) -> bool {
        self.state == EntryState::Flushed
    }

    /// The next free object number, for free slots.
    pub fn next_free(&self) -> Option<u32> {
        match self.location {
            Location::NextFree(n) => Some(n),
            _ => None,
        }
    }

    /// The cached in-memory value, if materialized.
    pub fn cached(&self) -> Option<Rc<Value>> {
        self.cached.clone()
    }

    /// Whether this entry still has to be emitted by the writer:
    /// never-written new objects and modified ones.
    pub fn is_dirty(&self) -> bool {
        match self.state {
            EntryState::Modified => true,
            EntryState::InUse => self.location == Location::Unassigned,
            _ => false,
        }
    }

    /// A reference to this slot, scoped to the owning document.
    pub fn to_ref(&self, doc: DocumentId) -> ObjRef {
        ObjRef::new(self.number, self.generation, doc)
    }

    pub(crate) fn set_state(&mut self, state: EntryState) {
        self.state = state;
    }

    pub(crate) fn set_location(&mut self, location: Location) {
        self.location = location;
    }

    pub(crate) fn set_generation(&mut self, generation: u16) {
        self.generation = generation;
    }

    pub(crate) fn set_cached(&mut self, value: Option<Rc<Value>>) {
        self.cached = value;
    }
}
