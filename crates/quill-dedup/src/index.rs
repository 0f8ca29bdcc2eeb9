use std::collections::HashMap;

use quill_object::ObjRef;

use crate::fingerprint::Fingerprint;

/// Maps structural fingerprints to already-copied references.
///
/// Used during cross-document copy: before allocating a fresh object for a
/// source subgraph, the copier asks whether a structurally identical object
/// already exists in the target. Only never-flushed objects may be recorded;
/// a flushed object can no longer stand in for new data.
#[derive(Debug, Default)]
pub struct DedupIndex {
    map: HashMap<Fingerprint, ObjRef>,
}

impl DedupIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// The reference previously recorded for this fingerprint, if any.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<ObjRef> {
        self.map.get(fingerprint).copied()
    }

    /// Record a fingerprint → reference mapping. Returns the previous
    /// mapping when one existed.
    pub fn insert(&mut self, fingerprint: Fingerprint, r: ObjRef) -> Option<ObjRef> {
        self.map.insert(fingerprint, r)
    }

    /// Drop a mapping (e.g. when its target is flushed and can no longer be
    /// shared).
    pub fn remove(&mut self, fingerprint: &Fingerprint) -> Option<ObjRef> {
        self.map.remove(fingerprint)
    }

    /// Number of recorded fingerprints.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
