use std::rc::Rc;

use quill_object::{DocumentId, Limits, ObjRef, Value, MAX_BYTE_OFFSET};
use tracing::debug;

use crate::entry::{EntryState, Location, XrefEntry};
use crate::error::{XrefError, XrefResult};

/// The cross-reference table: an object-number-indexed registry of
/// [`XrefEntry`] records for one document.
///
/// Slot 0 is reserved as the permanent head of the free chain (generation
/// 65535, never reused). Freeing a slot splices it in as the new chain head:
/// its next-free pointer takes the previous head target, and slot 0 points at
/// it, so the chain threads backward through the registry and terminates at
/// slot 0.
///
/// Capacity is bounded by the configured maximum element count; exceeding it
/// is fatal and leaves the table untouched (a failed `add` never partially
/// consumes a slot).
#[derive(Debug)]
pub struct XrefTable {
    doc: DocumentId,
    /// Index = object number. `None` marks a number inside the allocated
    /// range that no parsed section has defined; such numbers read as
    /// permanently free.
    entries: Vec<Option<XrefEntry>>,
    live: usize,
    max_entries: usize,
}

impl XrefTable {
    /// Create an empty table for `doc` with the configured capacity limit.
    pub fn new(doc: DocumentId, limits: &Limits) -> Self {
        Self {
            doc,
            entries: vec![Some(XrefEntry::free_head())],
            live: 0,
            max_entries: limits.max_xref_entries,
        }
    }

    /// The owning document.
    pub fn document(&self) -> DocumentId {
        self.doc
    }

    /// Table size: highest allocated object number plus one (the trailer's
    /// object-count value).
    pub fn size(&self) -> u32 {
        self.entries.len() as u32
    }

    /// Live (non-free) object count. Reflects frees immediately.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// The configured maximum element count.
    pub fn capacity_limit(&self) -> usize {
        self.max_entries
    }

    /// Constant-time lookup. Numbers outside the allocated range return
    /// `None` and are treated as permanently free.
    pub fn get(&self, number: u32) -> Option<&XrefEntry> {
        self.entries.get(number as usize).and_then(Option::as_ref)
    }

    /// Whether the number reads as free (free entry, never defined, or out
    /// of range).
    pub fn is_free(&self, number: u32) -> bool {
        match self.get(number) {
            Some(entry) => entry.is_free(),
            None => true,
        }
    }

    /// Iterate defined entries in object-number order.
    pub fn iter(&self) -> impl Iterator<Item = &XrefEntry> {
        self.entries.iter().flatten()
    }

    /// Allocate a number for `value` and return its reference.
    ///
    /// Reuses the free-chain head when one exists (keeping the generation it
    /// received when freed); otherwise grows the table, subject to the
    /// capacity limit.
    pub fn add(&mut self, value: Value) -> XrefResult<ObjRef> {
        let cached = Rc::new(value);

        if let Some(number) = self.take_free_slot() {
            if let Some(entry) = self.entries[number as usize].as_mut() {
                entry.set_state(EntryState::InUse);
                entry.set_location(Location::Unassigned);
                entry.set_cached(Some(cached));
                self.live += 1;
                return Ok(entry.to_ref(self.doc));
            }
        }

        let number = self.entries.len();
        if number > self.max_entries {
            return Err(XrefError::CapacityExceeded {
                requested: number,
                limit: self.max_entries,
            });
        }
        let mut entry = XrefEntry::new(number as u32, 0, EntryState::InUse, Location::Unassigned);
        entry.set_cached(Some(cached));
        self.entries.push(Some(entry));
        self.live += 1;
        Ok(ObjRef::new(number as u32, 0, self.doc))
    }

    /// Pop the free-chain head, if any, leaving the chain consistent.
    /// A damaged chain (dangling or non-free target) is reset instead of
    /// followed.
    fn take_free_slot(&mut self) -> Option<u32> {
        let head_next = self.entries[0].as_ref().and_then(XrefEntry::next_free)?;
        if head_next == 0 {
            return None;
        }
        let next = match self
            .entries
            .get(head_next as usize)
            .and_then(Option::as_ref)
        {
            Some(candidate) if candidate.is_free() && candidate.generation() < u16::MAX => {
                candidate.next_free().unwrap_or(0)
            }
            _ => {
                debug!(head = head_next, "free chain head is invalid, resetting chain");
                if let Some(head) = self.entries[0].as_mut() {
                    head.set_location(Location::NextFree(0));
                }
                return None;
            }
        };
        if let Some(head) = self.entries[0].as_mut() {
            head.set_location(Location::NextFree(next));
        }
        Some(head_next)
    }

    /// Mark the referenced slot free and splice it into the free chain.
    ///
    /// The slot's generation is incremented; a slot whose generation reaches
    /// 65535 is retired and never relinked for reuse.
    pub fn free(&mut self, r: ObjRef) -> XrefResult<()> {
        self.check_owned(r)?;
        let number = r.number();
        if number == 0 {
            return Err(XrefError::CannotFree {
                number,
                reason: "slot 0 is the permanent free-chain head",
            });
        }
        let head_next = self.entries[0].as_ref().and_then(XrefEntry::next_free).unwrap_or(0);

        let entry = match self.entries.get_mut(number as usize).and_then(Option::as_mut) {
            Some(entry) => entry,
            None => {
                return Err(XrefError::CannotFree {
                    number,
                    reason: "object was never allocated",
                })
            }
        };
        if entry.is_free() {
            return Err(XrefError::CannotFree {
                number,
                reason: "object is already free",
            });
        }
        if entry.generation() != r.generation() {
            return Err(XrefError::CannotFree {
                number,
                reason: "generation mismatch",
            });
        }

        let next_generation = entry.generation().saturating_add(1);
        entry.set_generation(next_generation);
        entry.set_state(EntryState::Free);
        entry.set_cached(None);
        if next_generation < u16::MAX {
            entry.set_location(Location::NextFree(head_next));
            if let Some(head) = self.entries[0].as_mut() {
                head.set_location(Location::NextFree(number));
            }
        } else {
            // Generation exhausted: the slot stays free forever.
            entry.set_location(Location::NextFree(0));
        }
        self.live -= 1;
        Ok(())
    }

    /// Replace the referenced object's value, marking it modified.
    pub fn set_value(&mut self, r: ObjRef, value: Value) -> XrefResult<()> {
        self.check_owned(r)?;
        let entry = self.require_defined_mut(r.number())?;
        if entry.is_free() {
            return Err(XrefError::FreeObject { number: r.number() });
        }
        if entry.is_flushed() {
            return Err(XrefError::Flushed {
                number: r.number(),
                generation: entry.generation(),
                action: "mutate",
            });
        }
        if entry.generation() != r.generation() {
            return Err(XrefError::StaleReference {
                number: r.number(),
                generation: r.generation(),
                current: entry.generation(),
            });
        }
        entry.set_cached(Some(Rc::new(value)));
        entry.set_state(EntryState::Modified);
        Ok(())
    }

    /// Store a freshly materialized value for a slot that was pending a read.
    pub fn mark_loaded(&mut self, number: u32, value: Rc<Value>) -> XrefResult<()> {
        let entry = self.require_defined_mut(number)?;
        if entry.is_free() {
            return Err(XrefError::FreeObject { number });
        }
        if entry.is_flushed() {
            return Err(XrefError::Flushed {
                number,
                generation: entry.generation(),
                action: "reload",
            });
        }
        entry.set_cached(Some(value));
        if entry.state() == EntryState::Reading {
            entry.set_state(EntryState::InUse);
        }
        Ok(())
    }

    /// Drop a slot's cached value so it can be reclaimed.
    ///
    /// Pending objects (modified or never written) keep their value: dropping
    /// it would lose the only copy before flush. Releasing those is ignored
    /// with a diagnostic.
    pub fn release(&mut self, number: u32) {
        let Some(entry) = self.entries.get_mut(number as usize).and_then(Option::as_mut) else {
            return;
        };
        if entry.is_dirty() {
            debug!(number, "release ignored: object has pending changes");
            return;
        }
        entry.set_cached(None);
        // Re-readable slots go back to the not-yet-loaded state.
        if entry.state() == EntryState::InUse
            && matches!(entry.location(), Location::Offset(_) | Location::InObjectStream { .. })
        {
            entry.set_state(EntryState::Reading);
        }
    }

    /// Record the byte offset an object was written at.
    ///
    /// Offsets at or beyond the addressing ceiling are rejected before
    /// anything is recorded.
    pub fn record_offset(&mut self, number: u32, offset: u64) -> XrefResult<()> {
        if offset > MAX_BYTE_OFFSET {
            return Err(XrefError::OffsetOverflow { number, offset });
        }
        let entry = self.require_defined_mut(number)?;
        entry.set_location(Location::Offset(offset));
        Ok(())
    }

    /// Record that an object was packed into an object stream.
    pub fn record_in_stream(&mut self, number: u32, container: u32, index: u32) -> XrefResult<()> {
        let entry = self.require_defined_mut(number)?;
        entry.set_location(Location::InObjectStream { container, index });
        Ok(())
    }

    /// Mark an object written. Its value link is cleared; any further write
    /// or mutation is a lifecycle error.
    pub fn mark_flushed(&mut self, number: u32) -> XrefResult<()> {
        let entry = self.require_defined_mut(number)?;
        if entry.is_flushed() {
            return Err(XrefError::Flushed {
                number,
                generation: entry.generation(),
                action: "write",
            });
        }
        entry.set_state(EntryState::Flushed);
        entry.set_cached(None);
        Ok(())
    }

    /// Insert an entry parsed from a source file. Returns `false` when the
    /// number is already defined (the newest-parsed section wins and older
    /// sections never overwrite it) or is the reserved slot 0.
    pub fn insert_parsed(
        &mut self,
        number: u32,
        generation: u16,
        location: Location,
    ) -> XrefResult<bool> {
        self.grow_to(number as usize + 1)?;
        if number == 0 {
            return Ok(false);
        }
        if self.entries[number as usize].is_some() {
            return Ok(false);
        }
        let state = match location {
            Location::NextFree(_) => EntryState::Free,
            _ => EntryState::Reading,
        };
        self.entries[number as usize] = Some(XrefEntry::new(number, generation, state, location));
        if state != EntryState::Free {
            self.live += 1;
        }
        Ok(true)
    }

    /// Rebuild the free chain in one pass over the parsed entries.
    ///
    /// Pointer values stored in the source are not trusted; the chain is
    /// relinked deterministically (ascending slots threading backward), which
    /// also repairs dangling links. Retired slots (generation 65535) are left
    /// out.
    pub fn init_free_list(&mut self) {
        let mut prev: u32 = 0;
        for i in 1..self.entries.len() {
            let Some(entry) = self.entries[i].as_mut() else {
                continue;
            };
            if entry.is_free() && entry.generation() < u16::MAX {
                entry.set_location(Location::NextFree(prev));
                prev = i as u32;
            }
        }
        if let Some(head) = self.entries[0].as_mut() {
            head.set_location(Location::NextFree(prev));
        }
    }

    /// Pre-grow storage for `n` entries. Values beyond the configured limit
    /// are rejected; `set_capacity(0)` is a no-op and the effective capacity
    /// stays the configured maximum.
    pub fn set_capacity(&mut self, n: usize) -> XrefResult<()> {
        if n > self.max_entries {
            return Err(XrefError::CapacityExceeded {
                requested: n,
                limit: self.max_entries,
            });
        }
        if n > self.entries.len() {
            self.entries.reserve(n - self.entries.len());
        }
        Ok(())
    }

    fn grow_to(&mut self, len: usize) -> XrefResult<()> {
        if len <= self.entries.len() {
            return Ok(());
        }
        if len - 1 > self.max_entries {
            return Err(XrefError::CapacityExceeded {
                requested: len - 1,
                limit: self.max_entries,
            });
        }
        self.entries.resize(len, None);
        Ok(())
    }

    fn check_owned(&self, r: ObjRef) -> XrefResult<()> {
        if r.document() != self.doc {
            return Err(XrefError::ForeignDocument {
                number: r.number(),
                generation: r.generation(),
                expected: self.doc,
                actual: r.document(),
            });
        }
        Ok(())
    }

    fn require_defined_mut(&mut self, number: u32) -> XrefResult<&mut XrefEntry> {
        self.entries
            .get_mut(number as usize)
            .and_then(Option::as_mut)
            .ok_or(XrefError::FreeObject { number })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> XrefTable {
        XrefTable::new(DocumentId::fresh(), &Limits::default())
    }

    fn small_table(max: usize) -> XrefTable {
        let limits = Limits {
            max_xref_entries: max,
            ..Limits::default()
        };
        XrefTable::new(DocumentId::fresh(), &limits)
    }

    #[test]
    fn scenario_ten_objects_free_one() {
        let mut t = table();
        let refs: Vec<ObjRef> = (0..10)
            .map(|i| t.add(Value::Integer(i)).unwrap())
            .collect();
        assert_eq!(t.live_count(), 10);

        t.free(refs[4]).unwrap(); // object number 5
        assert_eq!(t.live_count(), 9);
        assert!(t.get(5).unwrap().is_free());
        assert_eq!(t.get(0).unwrap().next_free(), Some(5));
    }

    #[test]
    fn numbers_start_at_one_and_ascend() {
        let mut t = table();
        assert_eq!(t.add(Value::Null).unwrap().number(), 1);
        assert_eq!(t.add(Value::Null).unwrap().number(), 2);
        assert_eq!(t.size(), 3);
    }

    #[test]
    fn freed_slot_is_reused_with_bumped_generation() {
        let mut t = table();
        let a = t.add(Value::Integer(1)).unwrap();
        let _b = t.add(Value::Integer(2)).unwrap();
        t.free(a).unwrap();

        let c = t.add(Value::Integer(3)).unwrap();
        assert_eq!(c.number(), a.number());
        assert_eq!(c.generation(), 1);
        // Chain is empty again: fresh adds grow the table.
        assert_eq!(t.get(0).unwrap().next_free(), Some(0));
        assert_eq!(t.add(Value::Integer(4)).unwrap().number(), 3);
    }

    #[test]
    fn free_chain_threads_backward_through_lifo_order() {
        let mut t = table();
        let refs: Vec<ObjRef> = (0..4).map(|i| t.add(Value::Integer(i)).unwrap()).collect();
        t.free(refs[0]).unwrap(); // 1
        t.free(refs[2]).unwrap(); // 3

        // Head points at the most recently freed slot, which points at the
        // previously freed one, which terminates at 0.
        assert_eq!(t.get(0).unwrap().next_free(), Some(3));
        assert_eq!(t.get(3).unwrap().next_free(), Some(1));
        assert_eq!(t.get(1).unwrap().next_free(), Some(0));
    }

    #[test]
    fn generation_increases_once_per_reuse_cycle() {
        let mut t = table();
        let mut r = t.add(Value::Integer(0)).unwrap();
        for cycle in 1u16..=4 {
            t.free(r).unwrap();
            assert_eq!(t.get(0).unwrap().next_free(), Some(r.number()));
            r = t.add(Value::Integer(i64::from(cycle))).unwrap();
            assert_eq!(r.generation(), cycle);
        }
    }

    #[test]
    fn capacity_is_enforced_at_the_boundary() {
        let mut t = small_table(3);
        for i in 0..3 {
            t.add(Value::Integer(i)).unwrap();
        }
        let err = t.add(Value::Integer(99)).unwrap_err();
        assert!(matches!(err, XrefError::CapacityExceeded { limit: 3, .. }));
        // The failed add consumed nothing.
        assert_eq!(t.live_count(), 3);
        assert_eq!(t.size(), 4);
    }

    #[test]
    fn failed_add_still_allows_reuse() {
        let mut t = small_table(2);
        let a = t.add(Value::Integer(1)).unwrap();
        t.add(Value::Integer(2)).unwrap();
        assert!(t.add(Value::Integer(3)).is_err());
        t.free(a).unwrap();
        // The freed slot is reusable even though the table is at capacity.
        let c = t.add(Value::Integer(3)).unwrap();
        assert_eq!(c.number(), a.number());
    }

    #[test]
    fn set_capacity_rules() {
        let mut t = small_table(10);
        assert!(t.set_capacity(10).is_ok());
        assert!(matches!(
            t.set_capacity(11),
            Err(XrefError::CapacityExceeded { .. })
        ));
        // Zero is a no-op; the effective capacity stays the configured max.
        assert!(t.set_capacity(0).is_ok());
        for i in 0..10 {
            t.add(Value::Integer(i)).unwrap();
        }
        assert!(t.add(Value::Integer(10)).is_err());
    }

    #[test]
    fn out_of_range_numbers_read_as_free() {
        let t = table();
        assert!(t.is_free(700));
        assert!(t.get(700).is_none());
    }

    #[test]
    fn slot_zero_cannot_be_freed() {
        let mut t = table();
        let zero = ObjRef::new(0, u16::MAX, t.document());
        assert!(matches!(t.free(zero), Err(XrefError::CannotFree { .. })));
    }

    #[test]
    fn double_free_is_rejected() {
        let mut t = table();
        let r = t.add(Value::Null).unwrap();
        t.free(r).unwrap();
        assert!(matches!(t.free(r), Err(XrefError::CannotFree { .. })));
        assert_eq!(t.live_count(), 0);
    }

    #[test]
    fn foreign_references_are_rejected() {
        let mut t = table();
        let mut other = table();
        let foreign = other.add(Value::Null).unwrap();
        assert!(matches!(
            t.free(foreign),
            Err(XrefError::ForeignDocument { .. })
        ));
    }

    #[test]
    fn mutation_after_flush_is_a_lifecycle_error() {
        let mut t = table();
        let r = t.add(Value::Integer(1)).unwrap();
        t.record_offset(r.number(), 17).unwrap();
        t.mark_flushed(r.number()).unwrap();
        assert!(matches!(
            t.set_value(r, Value::Integer(2)),
            Err(XrefError::Flushed { .. })
        ));
        assert!(matches!(
            t.mark_flushed(r.number()),
            Err(XrefError::Flushed { .. })
        ));
    }

    #[test]
    fn offset_ceiling_is_checked_before_recording() {
        let mut t = table();
        let r = t.add(Value::Null).unwrap();
        assert!(t.record_offset(r.number(), MAX_BYTE_OFFSET).is_ok());
        let err = t.record_offset(r.number(), MAX_BYTE_OFFSET + 1).unwrap_err();
        assert!(matches!(err, XrefError::OffsetOverflow { .. }));
        // The last valid offset survives the failed attempt.
        assert_eq!(t.get(r.number()).unwrap().location(), Location::Offset(MAX_BYTE_OFFSET));
    }

    #[test]
    fn release_of_pending_object_is_ignored() {
        let mut t = table();
        let r = t.add(Value::Integer(5)).unwrap();
        t.release(r.number());
        // Value survives: the object was never written.
        assert!(t.get(r.number()).unwrap().cached().is_some());
    }

    #[test]
    fn release_of_loaded_object_drops_the_cache() {
        let mut t = table();
        t.insert_parsed(1, 0, Location::Offset(40)).unwrap();
        t.mark_loaded(1, Rc::new(Value::Integer(9))).unwrap();
        assert!(t.get(1).unwrap().cached().is_some());
        t.release(1);
        assert!(t.get(1).unwrap().cached().is_none());
        assert_eq!(t.get(1).unwrap().state(), EntryState::Reading);
    }

    #[test]
    fn insert_parsed_newest_wins() {
        let mut t = table();
        assert!(t.insert_parsed(3, 0, Location::Offset(100)).unwrap());
        // An older section's entry for the same number is ignored.
        assert!(!t.insert_parsed(3, 0, Location::Offset(50)).unwrap());
        assert_eq!(t.get(3).unwrap().location(), Location::Offset(100));
        assert_eq!(t.live_count(), 1);
    }

    #[test]
    fn init_free_list_links_parsed_free_entries() {
        let mut t = table();
        t.insert_parsed(1, 1, Location::NextFree(9)).unwrap(); // dangling pointer
        t.insert_parsed(2, 0, Location::Offset(10)).unwrap();
        t.insert_parsed(3, 2, Location::NextFree(1)).unwrap();
        t.init_free_list();

        assert_eq!(t.get(0).unwrap().next_free(), Some(3));
        assert_eq!(t.get(3).unwrap().next_free(), Some(1));
        assert_eq!(t.get(1).unwrap().next_free(), Some(0));

        // Reuse pops the head and keeps its generation.
        let r = t.add(Value::Null).unwrap();
        assert_eq!((r.number(), r.generation()), (3, 2));
    }
}
