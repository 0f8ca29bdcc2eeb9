use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;

use quill_dedup::{fingerprint_value, DedupIndex};
use quill_object::{Dict, DocumentId, Limits, ObjRef, Value};
use quill_reader::{load_document, resolve_object};
use quill_writer::{write_document, TrailerSpec, WriteMode, WriterConfig};
use quill_xref::{EntryState, XrefError, XrefKind, XrefTable};
use tracing::debug;

use crate::error::{DocError, DocResult};

/// Source bytes and chain position of an opened document.
#[derive(Debug)]
struct SourceFile {
    data: Vec<u8>,
    startxref: u64,
    kind: XrefKind,
}

/// One open document: the registry, the (optional) source bytes it was
/// parsed from, and the trailer state carried between reads and writes.
///
/// A document is single-threaded and owned exclusively; all structural
/// mutation goes through `&mut self`. Writing it out closes it: a closed
/// document can still be inspected, but further mutation or serialization is
/// a lifecycle error.
pub struct Document {
    id: DocumentId,
    limits: Limits,
    xref: XrefTable,
    trailer: Dict,
    source: Option<SourceFile>,
    rebuilt: bool,
    closed: bool,
    writer_config: WriterConfig,
    smart_mode: bool,
    dedup: DedupIndex,
}

impl Document {
    /// Create an empty document with default limits.
    pub fn new() -> Self {
        Self::with_limits(Limits::default())
    }

    /// Create an empty document with explicit limits.
    pub fn with_limits(limits: Limits) -> Self {
        let id = DocumentId::fresh();
        Self {
            id,
            xref: XrefTable::new(id, &limits),
            limits,
            trailer: Dict::new(),
            source: None,
            rebuilt: false,
            closed: false,
            writer_config: WriterConfig::default(),
            smart_mode: false,
            dedup: DedupIndex::new(),
        }
    }

    /// Open a document from a file on disk.
    pub fn open(path: impl AsRef<Path>) -> DocResult<Self> {
        Self::from_bytes_with_limits(std::fs::read(path)?, Limits::default())
    }

    /// Open a document from raw bytes with default limits.
    pub fn from_bytes(data: Vec<u8>) -> DocResult<Self> {
        Self::from_bytes_with_limits(data, Limits::default())
    }

    /// Open a document from raw bytes.
    ///
    /// Parses the trailer and cross-reference chain; structurally corrupt
    /// chains are rebuilt by a recovery scan (see [`Document::was_rebuilt`]).
    pub fn from_bytes_with_limits(data: Vec<u8>, limits: Limits) -> DocResult<Self> {
        let id = DocumentId::fresh();
        let parsed = load_document(&data, id, &limits)?;
        debug!(
            objects = parsed.table.live_count(),
            rebuilt = parsed.rebuilt,
            "document opened"
        );
        Ok(Self {
            id,
            xref: parsed.table,
            limits,
            trailer: parsed.trailer,
            source: Some(SourceFile {
                data,
                startxref: parsed.startxref,
                kind: parsed.kind,
            }),
            rebuilt: parsed.rebuilt,
            closed: false,
            writer_config: WriterConfig::default(),
            smart_mode: false,
            dedup: DedupIndex::new(),
        })
    }

    /// This document's identity.
    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// The configured limits.
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Whether the cross-reference chain was unusable and the registry was
    /// rebuilt by the recovery scan.
    pub fn was_rebuilt(&self) -> bool {
        self.rebuilt
    }

    /// Whether the document has been written out and closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Replace the writer configuration.
    pub fn set_writer_config(&mut self, config: WriterConfig) {
        self.writer_config = config;
    }

    /// Enable content-fingerprint deduplication for cross-document copies.
    pub fn enable_smart_mode(&mut self) {
        self.smart_mode = true;
    }

    /// The merged trailer dictionary.
    pub fn trailer(&self) -> &Dict {
        &self.trailer
    }

    /// The root catalog reference, if set.
    pub fn root(&self) -> Option<ObjRef> {
        self.trailer.get_reference("Root")
    }

    /// Set the root catalog reference for a document built from scratch.
    pub fn set_root(&mut self, root: ObjRef) {
        self.trailer.insert("Root", Value::Reference(root));
    }

    /// Registry entry lookup (constant time). Out-of-range numbers return
    /// `None` and read as permanently free.
    pub fn get(&self, number: u32) -> Option<&quill_xref::XrefEntry> {
        self.xref.get(number)
    }

    /// Live (non-free) object count.
    pub fn count_of_indirect_objects(&self) -> usize {
        self.xref.live_count()
    }

    /// Pre-grow registry storage. Rejects values beyond the configured
    /// maximum; zero is a no-op.
    pub fn set_capacity(&mut self, n: usize) -> DocResult<()> {
        Ok(self.xref.set_capacity(n)?)
    }

    /// Allocate a number for `value` and return its reference.
    pub fn add(&mut self, value: Value) -> DocResult<ObjRef> {
        self.ensure_open()?;
        Ok(self.xref.add(value)?)
    }

    /// Replace the referenced object's value, marking it modified.
    pub fn set(&mut self, r: ObjRef, value: Value) -> DocResult<()> {
        self.ensure_open()?;
        Ok(self.xref.set_value(r, value)?)
    }

    /// Release the referenced slot back to the free pool.
    pub fn free_reference(&mut self, r: ObjRef) -> DocResult<()> {
        self.ensure_open()?;
        Ok(self.xref.free(r)?)
    }

    /// Drop the in-memory value of a loaded object so memory can be
    /// reclaimed. The on-disk location stays authoritative; the next resolve
    /// re-reads it. Releasing an object with pending changes is ignored.
    pub fn release(&mut self, r: ObjRef) -> DocResult<()> {
        self.check_owned(r)?;
        self.xref.release(r.number());
        Ok(())
    }

    /// Materialize the referenced object.
    ///
    /// Lazy and idempotent: the first call parses through the source bytes
    /// and caches, later calls return the cache until release. Free and
    /// undefined targets resolve to null; flushed objects are a lifecycle
    /// error.
    pub fn resolve(&mut self, r: ObjRef) -> DocResult<Rc<Value>> {
        self.check_owned(r)?;
        if let Some(entry) = self.xref.get(r.number()) {
            if !entry.is_free() && entry.generation() != r.generation() {
                return Err(XrefError::StaleReference {
                    number: r.number(),
                    generation: r.generation(),
                    current: entry.generation(),
                }
                .into());
            }
        }
        self.resolve_number(r.number())
    }

    fn resolve_number(&mut self, number: u32) -> DocResult<Rc<Value>> {
        let data = match &self.source {
            Some(source) => source.data.as_slice(),
            None => &[],
        };
        Ok(resolve_object(data, &mut self.xref, number, &self.limits)?)
    }

    /// Write the whole document (header, every live object, one
    /// cross-reference section) and close it.
    pub fn save_to<W: Write>(&mut self, out: &mut W) -> DocResult<()> {
        self.ensure_open()?;
        self.materialize_all()?;
        let spec = self.trailer_spec(None);
        let bytes = write_document(
            &mut self.xref,
            &self.limits,
            &self.writer_config,
            &spec,
            WriteMode::Full,
        )?;
        out.write_all(&bytes)?;
        out.flush()?;
        self.closed = true;
        Ok(())
    }

    /// Append an incremental update: the original bytes are copied through
    /// untouched, followed by new/changed objects and a fresh trailer whose
    /// `/Prev` chains to the previous cross-reference section.
    pub fn append_to<W: Write>(&mut self, out: &mut W) -> DocResult<()> {
        self.ensure_open()?;
        let (base, source_kind, prev) = match &self.source {
            Some(source) => (source.data.len() as u64, source.kind, source.startxref),
            None => return Err(DocError::NoSource),
        };
        let spec = self.trailer_spec(Some(prev));
        let bytes = write_document(
            &mut self.xref,
            &self.limits,
            &self.writer_config,
            &spec,
            WriteMode::Append { base, source_kind },
        )?;
        if let Some(source) = &self.source {
            out.write_all(&source.data)?;
        }
        out.write_all(&bytes)?;
        out.flush()?;
        self.closed = true;
        Ok(())
    }

    /// Save the document to a file.
    pub fn save(&mut self, path: impl AsRef<Path>) -> DocResult<()> {
        let file = std::fs::File::create(path)?;
        let mut out = std::io::BufWriter::new(file);
        self.save_to(&mut out)
    }

    /// Copy an object graph from another document into this one, rewriting
    /// every reference. With smart mode enabled, structurally identical
    /// subgraphs already copied are merged instead of duplicated.
    ///
    /// Copying a flushed source object is a lifecycle error.
    pub fn copy_from(&mut self, source: &mut Document, r: ObjRef) -> DocResult<ObjRef> {
        self.ensure_open()?;
        if r.document() != source.id {
            return Err(XrefError::ForeignDocument {
                number: r.number(),
                generation: r.generation(),
                expected: source.id,
                actual: r.document(),
            }
            .into());
        }
        let mut memo = HashMap::new();
        self.copy_object(source, r, &mut memo)
    }

    fn copy_object(
        &mut self,
        source: &mut Document,
        sr: ObjRef,
        memo: &mut HashMap<u32, ObjRef>,
    ) -> DocResult<ObjRef> {
        if let Some(&mapped) = memo.get(&sr.number()) {
            return Ok(mapped);
        }
        if let Some(entry) = source.xref.get(sr.number()) {
            if entry.is_flushed() {
                return Err(XrefError::Flushed {
                    number: sr.number(),
                    generation: entry.generation(),
                    action: "copy",
                }
                .into());
            }
        }
        let value = source.resolve(sr)?;

        if self.smart_mode {
            let fp = fingerprint_value(
                &value,
                &mut |r| source.resolve(r).ok(),
                self.limits.max_stream_size,
            )?;
            if let Some(existing) = self.dedup.get(&fp) {
                let usable = self
                    .xref
                    .get(existing.number())
                    .is_some_and(|e| !e.is_free() && !e.is_flushed());
                if usable {
                    debug!(fingerprint = %fp.short_hex(), "merged duplicate object");
                    memo.insert(sr.number(), existing);
                    return Ok(existing);
                }
                // The recorded target was flushed or freed; it can no longer
                // stand in for new data.
                self.dedup.remove(&fp);
            }
            let target = self.xref.add(Value::Null)?;
            memo.insert(sr.number(), target);
            let copied = self.copy_value(source, &value, memo)?;
            self.xref.set_value(target, copied)?;
            self.dedup.insert(fp, target);
            Ok(target)
        } else {
            // Allocate before descending so cycles in the source graph map
            // onto cycles in the target.
            let target = self.xref.add(Value::Null)?;
            memo.insert(sr.number(), target);
            let copied = self.copy_value(source, &value, memo)?;
            self.xref.set_value(target, copied)?;
            Ok(target)
        }
    }

    fn copy_value(
        &mut self,
        source: &mut Document,
        value: &Value,
        memo: &mut HashMap<u32, ObjRef>,
    ) -> DocResult<Value> {
        match value {
            Value::Reference(sr) => Ok(Value::Reference(self.copy_object(source, *sr, memo)?)),
            Value::Array(items) => {
                let mut copied = Vec::with_capacity(items.len());
                for item in items {
                    copied.push(self.copy_value(source, item, memo)?);
                }
                Ok(Value::Array(copied))
            }
            Value::Dictionary(dict) => {
                Ok(Value::Dictionary(self.copy_dict(source, dict, memo)?))
            }
            Value::Stream(stream) => {
                let mut copied = stream.clone();
                copied.dict = self.copy_dict(source, &stream.dict, memo)?;
                Ok(Value::Stream(copied))
            }
            other => Ok(other.clone()),
        }
    }

    fn copy_dict(
        &mut self,
        source: &mut Document,
        dict: &Dict,
        memo: &mut HashMap<u32, ObjRef>,
    ) -> DocResult<Dict> {
        let mut copied = Dict::new();
        for (key, entry) in dict.iter() {
            let entry = self.copy_value(source, entry, memo)?;
            copied.insert(key.clone(), entry);
        }
        Ok(copied)
    }

    /// Load every not-yet-materialized entry so a full save can re-emit the
    /// complete object set.
    fn materialize_all(&mut self) -> DocResult<()> {
        let pending: Vec<u32> = self
            .xref
            .iter()
            .filter(|e| e.state() == EntryState::Reading)
            .map(|e| e.number())
            .collect();
        let data = match &self.source {
            Some(source) => source.data.as_slice(),
            None => &[],
        };
        for number in pending {
            resolve_object(data, &mut self.xref, number, &self.limits)?;
        }
        Ok(())
    }

    fn trailer_spec(&self, prev: Option<u64>) -> TrailerSpec {
        TrailerSpec {
            root: self.trailer.get_reference("Root"),
            info: self.trailer.get_reference("Info"),
            prev,
            id_first: self
                .trailer
                .get_array("ID")
                .and_then(|ids| ids.first())
                .and_then(Value::as_string)
                .map(|s| s.as_bytes().to_vec()),
        }
    }

    fn ensure_open(&self) -> DocResult<()> {
        if self.closed {
            return Err(DocError::AlreadyClosed);
        }
        Ok(())
    }

    fn check_owned(&self, r: ObjRef) -> DocResult<()> {
        if r.document() != self.id {
            return Err(XrefError::ForeignDocument {
                number: r.number(),
                generation: r.generation(),
                expected: self.id,
                actual: r.document(),
            }
            .into());
        }
        Ok(())
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}
