use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Process-wide document sequence. Guarantees a deterministic, reproducible
/// ordering between documents opened in the same process, without comparing
/// addresses.
static NEXT_DOCUMENT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Identity of one open document.
///
/// Indirect references carry their owning document's id, so references with
/// identical object numbers from different documents never compare equal.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId(u64);

impl DocumentId {
    /// Allocate the next document id in this process.
    pub fn fresh() -> Self {
        Self(NEXT_DOCUMENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// The underlying sequence number.
    pub fn sequence(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentId({})", self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

/// An indirect reference: `(objectNumber, generationNumber)` scoped to one
/// document.
///
/// Equality requires object number, generation, and owning document to all
/// match. Ordering is by object number, then generation, with cross-document
/// ties broken by the document sequence number.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef {
    number: u32,
    generation: u16,
    doc: DocumentId,
}

impl ObjRef {
    /// Create a reference to `(number, generation)` in the given document.
    pub fn new(number: u32, generation: u16, doc: DocumentId) -> Self {
        Self {
            number,
            generation,
            doc,
        }
    }

    /// The object number.
    pub fn number(&self) -> u32 {
        self.number
    }

    /// The generation (slot-reuse counter).
    pub fn generation(&self) -> u16 {
        self.generation
    }

    /// The owning document.
    pub fn document(&self) -> DocumentId {
        self.doc
    }
}

impl Ord for ObjRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.number
            .cmp(&other.number)
            .then(self.generation.cmp(&other.generation))
            .then(self.doc.cmp(&other.doc))
    }
}

impl PartialOrd for ObjRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjRef({} {} R @ {})", self.number, self.generation, self.doc)
    }
}

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.number, self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_ids_are_unique_and_increasing() {
        let a = DocumentId::fresh();
        let b = DocumentId::fresh();
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn equality_requires_same_document() {
        let doc_a = DocumentId::fresh();
        let doc_b = DocumentId::fresh();
        let r1 = ObjRef::new(7, 0, doc_a);
        let r2 = ObjRef::new(7, 0, doc_b);
        assert_ne!(r1, r2);
        assert_eq!(r1, ObjRef::new(7, 0, doc_a));
    }

    #[test]
    fn ordering_is_number_then_generation_then_document() {
        let doc_a = DocumentId::fresh();
        let doc_b = DocumentId::fresh();
        assert!(ObjRef::new(1, 5, doc_b) < ObjRef::new(2, 0, doc_a));
        assert!(ObjRef::new(3, 0, doc_a) < ObjRef::new(3, 1, doc_a));
        // Same number and generation: the earlier-opened document sorts first.
        assert!(ObjRef::new(3, 0, doc_a) < ObjRef::new(3, 0, doc_b));
    }

    #[test]
    fn display_is_reference_syntax() {
        let doc = DocumentId::fresh();
        assert_eq!(ObjRef::new(12, 3, doc).to_string(), "12 3 R");
    }
}
