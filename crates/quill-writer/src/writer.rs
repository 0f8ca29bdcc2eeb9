use std::collections::BTreeSet;

use quill_object::{
    value_to_bytes, write_value, Dict, Filter, Limits, Name, ObjRef, PdfString, Stream, Value,
};
use quill_xref::{Location, ObjectStreamBuilder, XrefError, XrefKind, XrefTable};
use tracing::{debug, warn};

use crate::error::{WriterError, WriterResult};

/// Writer configuration.
#[derive(Clone, Debug)]
pub struct WriterConfig {
    /// Requested cross-reference section form. In append mode the source
    /// document's form wins; a mismatch is logged, not failed.
    pub xref_kind: XrefKind,
    /// Pack eligible non-stream objects into object streams (only effective
    /// when the section form is a stream).
    pub pack_object_streams: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            xref_kind: XrefKind::Table,
            pack_object_streams: false,
        }
    }
}

/// Trailer inputs the caller provides.
#[derive(Clone, Debug, Default)]
pub struct TrailerSpec {
    /// Root catalog reference. Required.
    pub root: Option<ObjRef>,
    /// Document information dictionary reference.
    pub info: Option<ObjRef>,
    /// Offset of the previous cross-reference section (append mode).
    pub prev: Option<u64>,
    /// First half of the file identifier pair, preserved across appends.
    /// Freshly generated when absent.
    pub id_first: Option<Vec<u8>>,
}

/// How a write cycle relates to the source file.
#[derive(Clone, Copy, Debug)]
pub enum WriteMode {
    /// Full rewrite: header, every live object, one section.
    Full,
    /// Incremental update appended after `base` bytes of original data,
    /// emitting only new/changed objects. `source_kind` is the original
    /// document's section form.
    Append { base: u64, source_kind: XrefKind },
}

/// Serialize one write cycle and return the produced bytes.
///
/// In append mode the returned bytes are everything after the original data;
/// the caller concatenates. Objects are walked in ascending number order,
/// each offset is checked against the addressing ceiling before emission,
/// and every written object is marked flushed.
pub fn write_document(
    table: &mut XrefTable,
    limits: &Limits,
    config: &WriterConfig,
    spec: &TrailerSpec,
    mode: WriteMode,
) -> WriterResult<Vec<u8>> {
    let (base, kind, dirty_only) = match mode {
        WriteMode::Full => (0, config.xref_kind, false),
        WriteMode::Append { base, source_kind } => {
            if config.xref_kind != source_kind {
                warn!(
                    requested = ?config.xref_kind,
                    source = ?source_kind,
                    "requested cross-reference format differs from the source document; \
                     keeping the source format to preserve the incremental chain"
                );
            }
            (base, source_kind, true)
        }
    };

    let mut writer = DocWriter {
        table,
        limits,
        config,
        buf: Vec::new(),
        base,
    };
    if base == 0 {
        writer.write_header();
    } else {
        // Appended data starts on a fresh line after the original bytes.
        writer.buf.push(b'\n');
    }

    let written = writer.write_objects(dirty_only, kind)?;

    let numbers: BTreeSet<u32> = if dirty_only {
        // Changed objects plus the whole free chain (slot 0 included), so
        // the appended section keeps the chain consistent.
        let mut numbers = written;
        numbers.insert(0);
        numbers.extend(
            writer
                .table
                .iter()
                .filter(|e| e.is_free())
                .map(|e| e.number()),
        );
        numbers
    } else {
        (0..writer.table.size()).collect()
    };

    match kind {
        XrefKind::Table => {
            let section_offset = writer.emit_classic_section(&numbers)?;
            writer.emit_classic_trailer(spec, section_offset)?;
        }
        XrefKind::Stream => {
            writer.emit_xref_stream(numbers, spec)?;
        }
    }
    Ok(writer.buf)
}

struct DocWriter<'a> {
    table: &'a mut XrefTable,
    limits: &'a Limits,
    config: &'a WriterConfig,
    buf: Vec<u8>,
    base: u64,
}

impl DocWriter<'_> {
    fn offset(&self) -> u64 {
        self.base + self.buf.len() as u64
    }

    fn write_header(&mut self) {
        self.buf.extend_from_slice(b"%PDF-1.7\n");
        // Binary marker comment so transports treat the file as binary.
        self.buf.extend_from_slice(b"%\xe2\xe3\xcf\xd3\n");
    }

    /// Serialize every pending object, packing eligible ones into object
    /// streams first when enabled. Returns the written object numbers.
    fn write_objects(&mut self, dirty_only: bool, kind: XrefKind) -> WriterResult<BTreeSet<u32>> {
        let mut targets: Vec<u32> = self
            .table
            .iter()
            .filter(|e| !e.is_free() && !e.is_flushed())
            .filter(|e| !dirty_only || e.is_dirty())
            .map(|e| e.number())
            .collect();
        let mut written = BTreeSet::new();

        if self.config.pack_object_streams && kind == XrefKind::Stream {
            let eligible: Vec<u32> = targets
                .iter()
                .copied()
                .filter(|n| {
                    self.table.get(*n).is_some_and(|e| {
                        e.generation() == 0
                            && e.cached().is_some_and(|v| !v.is_stream())
                    })
                })
                .collect();
            for chunk in eligible.chunks(self.limits.max_objects_per_stream) {
                self.write_container(chunk, &mut written)?;
            }
            targets.retain(|n| !written.contains(n));
        }

        for number in targets {
            self.serialize_object(number)?;
            written.insert(number);
        }
        Ok(written)
    }

    /// Pack one batch of objects into a container and serialize it.
    fn write_container(&mut self, members: &[u32], written: &mut BTreeSet<u32>) -> WriterResult<()> {
        let mut builder = ObjectStreamBuilder::new(self.limits.max_objects_per_stream);
        let mut indexed = Vec::with_capacity(members.len());
        for &number in members {
            let value = self
                .table
                .get(number)
                .and_then(|e| e.cached())
                .ok_or(XrefError::ReleasedValueMissing { number })?;
            let body = value_to_bytes(&value)?;
            let index = builder.add(number, body)?;
            indexed.push((number, index));
        }
        let payload = builder.finish();
        debug!(objects = payload.count, "packed object stream");

        let mut dict = Dict::new();
        dict.insert("Type", Value::Name(Name::new("ObjStm")));
        dict.insert("N", Value::Integer(payload.count as i64));
        dict.insert("First", Value::Integer(payload.first as i64));
        let stream = Stream::new(dict, payload.data).with_filter(Filter::Flate);

        let container = self.table.add(Value::Stream(stream))?;
        for (number, index) in indexed {
            self.table.record_in_stream(number, container.number(), index)?;
            self.table.mark_flushed(number)?;
            written.insert(number);
        }
        self.serialize_object(container.number())?;
        written.insert(container.number());
        Ok(())
    }

    /// Emit one `N G obj … endobj` frame at the current offset and mark the
    /// entry flushed.
    fn serialize_object(&mut self, number: u32) -> WriterResult<()> {
        let entry = self
            .table
            .get(number)
            .ok_or(XrefError::FreeObject { number })?;
        if entry.is_flushed() {
            return Err(XrefError::Flushed {
                number,
                generation: entry.generation(),
                action: "write",
            }
            .into());
        }
        let generation = entry.generation();
        let value = entry
            .cached()
            .ok_or(XrefError::ReleasedValueMissing { number })?;

        let offset = self.offset();
        self.table.record_offset(number, offset)?;

        self.buf
            .extend_from_slice(format!("{number} {generation} obj\n").as_bytes());
        match &*value {
            Value::Stream(stream) => {
                let (payload, applied) = stream.encode(self.limits.max_stream_size)?;
                let mut dict = stream.dict.clone();
                dict.insert("Length", Value::Integer(payload.len() as i64));
                if !applied.is_empty() {
                    let filters: Vec<Value> = applied
                        .iter()
                        .map(|f| Value::Name(Name::new(f.name())))
                        .collect();
                    let filter_value = if filters.len() == 1 {
                        filters.into_iter().next().unwrap_or(Value::Null)
                    } else {
                        Value::Array(filters)
                    };
                    dict.insert("Filter", filter_value);
                }
                write_value(&mut self.buf, &Value::Dictionary(dict))?;
                self.buf.extend_from_slice(b"\nstream\n");
                self.buf.extend_from_slice(&payload);
                self.buf.extend_from_slice(b"\nendstream");
            }
            other => {
                write_value(&mut self.buf, other)?;
            }
        }
        self.buf.extend_from_slice(b"\nendobj\n");
        self.table.mark_flushed(number)?;
        Ok(())
    }

    /// Classic table: contiguous-run subsections of fixed 20-byte records.
    fn emit_classic_section(&mut self, numbers: &BTreeSet<u32>) -> WriterResult<u64> {
        let section_offset = self.offset();
        self.buf.extend_from_slice(b"xref\n");
        for run in contiguous_runs(numbers) {
            self.buf.extend_from_slice(
                format!("{} {}\n", run[0], run.len()).as_bytes(),
            );
            for &number in &run {
                let record = match self.table.get(number) {
                    None => format!("{:010} {:05} f\r\n", 0, 0),
                    Some(entry) => match entry.location() {
                        Location::NextFree(next) => {
                            format!("{next:010} {:05} f\r\n", entry.generation())
                        }
                        Location::Offset(offset) => {
                            format!("{offset:010} {:05} n\r\n", entry.generation())
                        }
                        Location::InObjectStream { .. } => {
                            return Err(WriterError::ClassicContainerEntry { number })
                        }
                        Location::Unassigned => {
                            return Err(WriterError::UnwrittenEntry { number })
                        }
                    },
                };
                self.buf.extend_from_slice(record.as_bytes());
            }
        }
        Ok(section_offset)
    }

    fn emit_classic_trailer(&mut self, spec: &TrailerSpec, section_offset: u64) -> WriterResult<()> {
        let dict = self.trailer_dict(spec)?;
        self.buf.extend_from_slice(b"trailer\n");
        write_value(&mut self.buf, &Value::Dictionary(dict))?;
        self.buf
            .extend_from_slice(format!("\nstartxref\n{section_offset}\n%%EOF\n").as_bytes());
        Ok(())
    }

    /// Cross-reference stream: the section is itself an indirect stream
    /// object of binary `(type, field2, field3)` rows.
    fn emit_xref_stream(
        &mut self,
        mut numbers: BTreeSet<u32>,
        spec: &TrailerSpec,
    ) -> WriterResult<()> {
        let section_offset = self.offset();
        let section_ref = self.table.add(Value::Null)?;
        self.table.record_offset(section_ref.number(), section_offset)?;
        numbers.insert(section_ref.number());

        // Row values first, then the narrowest widths that hold them.
        let mut rows = Vec::with_capacity(numbers.len());
        for &number in &numbers {
            let row = match self.table.get(number) {
                None => (0u64, 0u64, 0u64),
                Some(entry) => match entry.location() {
                    Location::NextFree(next) => {
                        (0, u64::from(next), u64::from(entry.generation()))
                    }
                    Location::Offset(offset) => {
                        (1, offset, u64::from(entry.generation()))
                    }
                    Location::InObjectStream { container, index } => {
                        (2, u64::from(container), u64::from(index))
                    }
                    Location::Unassigned => {
                        return Err(WriterError::UnwrittenEntry { number })
                    }
                },
            };
            rows.push(row);
        }
        let w2 = rows.iter().map(|r| bytes_needed(r.1)).max().unwrap_or(1);
        let w3 = rows.iter().map(|r| bytes_needed(r.2)).max().unwrap_or(1);

        let mut row_bytes = Vec::with_capacity(rows.len() * (1 + w2 + w3));
        for (t, f2, f3) in rows {
            row_bytes.push(t as u8);
            push_field(&mut row_bytes, f2, w2);
            push_field(&mut row_bytes, f3, w3);
        }

        let index_array: Vec<Value> = contiguous_runs(&numbers)
            .into_iter()
            .flat_map(|run| {
                [
                    Value::Integer(i64::from(run[0])),
                    Value::Integer(run.len() as i64),
                ]
            })
            .collect();

        let mut dict = Dict::new();
        dict.insert("Type", Value::Name(Name::new("XRef")));
        for (key, value) in self.trailer_dict(spec)?.iter() {
            dict.insert(key.clone(), value.clone());
        }
        dict.insert(
            "W",
            Value::Array(vec![
                Value::Integer(1),
                Value::Integer(w2 as i64),
                Value::Integer(w3 as i64),
            ]),
        );
        dict.insert("Index", Value::Array(index_array));

        let stream = Stream::new(Dict::new(), row_bytes).with_filter(Filter::Flate);
        let (payload, applied) = stream.encode(self.limits.max_stream_size)?;
        if !applied.is_empty() {
            dict.insert("Filter", Value::Name(Name::new(Filter::Flate.name())));
        }
        dict.insert("Length", Value::Integer(payload.len() as i64));

        self.buf.extend_from_slice(
            format!("{} {} obj\n", section_ref.number(), section_ref.generation()).as_bytes(),
        );
        write_value(&mut self.buf, &Value::Dictionary(dict))?;
        self.buf.extend_from_slice(b"\nstream\n");
        self.buf.extend_from_slice(&payload);
        self.buf.extend_from_slice(b"\nendstream\nendobj\n");
        self.table.mark_flushed(section_ref.number())?;

        self.buf
            .extend_from_slice(format!("startxref\n{section_offset}\n%%EOF\n").as_bytes());
        Ok(())
    }

    fn trailer_dict(&self, spec: &TrailerSpec) -> WriterResult<Dict> {
        let root = spec.root.ok_or(WriterError::MissingRoot)?;
        let mut dict = Dict::new();
        dict.insert("Size", Value::Integer(i64::from(self.table.size())));
        dict.insert("Root", Value::Reference(root));
        if let Some(info) = spec.info {
            dict.insert("Info", Value::Reference(info));
        }
        if let Some(prev) = spec.prev {
            dict.insert("Prev", Value::Integer(prev as i64));
        }
        let second = self.file_id();
        let first = spec.id_first.clone().unwrap_or_else(|| second.clone());
        dict.insert(
            "ID",
            Value::Array(vec![
                Value::String(PdfString::hex(first)),
                Value::String(PdfString::hex(second)),
            ]),
        );
        Ok(dict)
    }

    /// Second half of the file identifier: a content hash of everything
    /// produced this cycle.
    fn file_id(&self) -> Vec<u8> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.base.to_be_bytes());
        hasher.update(&self.buf);
        hasher.finalize().as_bytes()[..16].to_vec()
    }
}

/// Group sorted numbers into runs of consecutive values.
fn contiguous_runs(numbers: &BTreeSet<u32>) -> Vec<Vec<u32>> {
    let mut runs: Vec<Vec<u32>> = Vec::new();
    for &n in numbers {
        match runs.last_mut() {
            Some(run) if run.last().copied() == Some(n.wrapping_sub(1)) => run.push(n),
            _ => runs.push(vec![n]),
        }
    }
    runs
}

/// Minimal big-endian byte count for a value.
fn bytes_needed(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(8).max(1)
}

/// Append `value` as `width` big-endian bytes.
fn push_field(buf: &mut Vec<u8>, value: u64, width: usize) {
    for shift in (0..width).rev() {
        buf.push((value >> (shift * 8)) as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_object::DocumentId;

    fn new_table() -> XrefTable {
        XrefTable::new(DocumentId::fresh(), &Limits::default())
    }

    fn spec_for(root: ObjRef) -> TrailerSpec {
        TrailerSpec {
            root: Some(root),
            ..TrailerSpec::default()
        }
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn full_save_emits_header_objects_and_table() {
        let mut table = new_table();
        let mut catalog = Dict::new();
        catalog.insert("Type", Value::Name(Name::new("Catalog")));
        let root = table.add(Value::Dictionary(catalog)).unwrap();
        table.add(Value::Integer(42)).unwrap();

        let out = write_document(
            &mut table,
            &Limits::default(),
            &WriterConfig::default(),
            &spec_for(root),
            WriteMode::Full,
        )
        .unwrap();

        assert!(out.starts_with(b"%PDF-1.7\n"));
        assert!(contains(&out, b"1 0 obj"));
        assert!(contains(&out, b"2 0 obj\n42"));
        assert!(contains(&out, b"xref\n0 3\n"));
        assert!(contains(&out, b"trailer"));
        assert!(contains(&out, b"/Root 1 0 R"));
        assert!(out.ends_with(b"%%EOF\n"));
        // Everything written is flushed.
        assert!(table.get(1).unwrap().is_flushed());
        assert!(table.get(2).unwrap().is_flushed());
    }

    #[test]
    fn classic_records_are_twenty_bytes() {
        let mut table = new_table();
        let root = table.add(Value::Null).unwrap();
        let out = write_document(
            &mut table,
            &Limits::default(),
            &WriterConfig::default(),
            &spec_for(root),
            WriteMode::Full,
        )
        .unwrap();

        let start = out
            .windows(5)
            .position(|w| w == b"xref\n")
            .expect("xref section");
        // Skip "xref\n" and the "0 2\n" subsection header.
        let records = &out[start + 5..];
        let header_end = records.iter().position(|b| *b == b'\n').unwrap() + 1;
        let first = &records[header_end..header_end + 20];
        assert_eq!(first.len(), 20);
        assert!(first.ends_with(b"f\r\n"));
        assert_eq!(&first[..10], b"0000000000");
    }

    #[test]
    fn missing_root_is_an_error() {
        let mut table = new_table();
        table.add(Value::Null).unwrap();
        let err = write_document(
            &mut table,
            &Limits::default(),
            &WriterConfig::default(),
            &TrailerSpec::default(),
            WriteMode::Full,
        )
        .unwrap_err();
        assert!(matches!(err, WriterError::MissingRoot));
    }

    #[test]
    fn append_keeps_source_format_on_mismatch() {
        let mut table = new_table();
        let root = table.add(Value::Integer(1)).unwrap();
        // Config asks for a stream, source was a classic table.
        let config = WriterConfig {
            xref_kind: XrefKind::Stream,
            pack_object_streams: false,
        };
        let out = write_document(
            &mut table,
            &Limits::default(),
            &config,
            &spec_for(root),
            WriteMode::Append {
                base: 100,
                source_kind: XrefKind::Table,
            },
        )
        .unwrap();
        assert!(contains(&out, b"xref\n"));
        assert!(contains(&out, b"trailer"));
        assert!(!contains(&out, b"/Type /XRef"));
    }

    #[test]
    fn append_offsets_start_after_base() {
        let mut table = new_table();
        let root = table.add(Value::Integer(7)).unwrap();
        let out = write_document(
            &mut table,
            &Limits::default(),
            &WriterConfig::default(),
            &spec_for(root),
            WriteMode::Append {
                base: 5000,
                source_kind: XrefKind::Table,
            },
        )
        .unwrap();
        let Location::Offset(offset) = table.get(root.number()).unwrap().location() else {
            panic!("expected an offset");
        };
        assert!(offset >= 5000);
        assert!(contains(&out, format!("{offset:010} 00000 n\r\n").as_bytes()));
    }

    #[test]
    fn offset_ceiling_aborts_the_write() {
        let mut table = new_table();
        let root = table.add(Value::Integer(7)).unwrap();
        let err = write_document(
            &mut table,
            &Limits::default(),
            &WriterConfig::default(),
            &spec_for(root),
            WriteMode::Append {
                base: quill_object::MAX_BYTE_OFFSET,
                source_kind: XrefKind::Table,
            },
        )
        .unwrap_err();
        assert!(matches!(
            err,
            WriterError::Xref(XrefError::OffsetOverflow { .. })
        ));
    }

    #[test]
    fn stream_section_is_emitted_as_an_object() {
        let mut table = new_table();
        let root = table.add(Value::Integer(3)).unwrap();
        let config = WriterConfig {
            xref_kind: XrefKind::Stream,
            pack_object_streams: false,
        };
        let out = write_document(
            &mut table,
            &Limits::default(),
            &config,
            &spec_for(root),
            WriteMode::Full,
        )
        .unwrap();
        assert!(contains(&out, b"/Type /XRef"));
        assert!(contains(&out, b"/W [1 "));
        assert!(contains(&out, b"/Filter /FlateDecode"));
        assert!(!contains(&out, b"trailer"));
        // The section object itself is flushed, and the table grew by one.
        assert_eq!(table.size(), 3);
        assert!(table.get(2).unwrap().is_flushed());
    }

    #[test]
    fn packing_moves_objects_into_containers() {
        let mut table = new_table();
        let root = table.add(Value::Integer(1)).unwrap();
        let b = table.add(Value::Integer(2)).unwrap();
        let config = WriterConfig {
            xref_kind: XrefKind::Stream,
            pack_object_streams: true,
        };
        let out = write_document(
            &mut table,
            &Limits::default(),
            &config,
            &spec_for(root),
            WriteMode::Full,
        )
        .unwrap();
        assert!(contains(&out, b"/Type /ObjStm"));
        assert!(matches!(
            table.get(b.number()).unwrap().location(),
            Location::InObjectStream { .. }
        ));
    }

    #[test]
    fn rewriting_a_flushed_object_is_a_lifecycle_error() {
        let mut table = new_table();
        let root = table.add(Value::Integer(1)).unwrap();
        write_document(
            &mut table,
            &Limits::default(),
            &WriterConfig::default(),
            &spec_for(root),
            WriteMode::Full,
        )
        .unwrap();

        let limits = Limits::default();
        let config = WriterConfig::default();
        let mut writer = DocWriter {
            table: &mut table,
            limits: &limits,
            config: &config,
            buf: Vec::new(),
            base: 0,
        };
        let err = writer.serialize_object(root.number()).unwrap_err();
        assert!(matches!(
            err,
            WriterError::Xref(XrefError::Flushed { action: "write", .. })
        ));
    }

    #[test]
    fn contiguous_run_grouping() {
        let numbers: BTreeSet<u32> = [0, 1, 2, 5, 6, 9].into_iter().collect();
        let runs = contiguous_runs(&numbers);
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0], vec![0, 1, 2]);
        assert_eq!(runs[1], vec![5, 6]);
        assert_eq!(runs[2], vec![9]);
    }

    #[test]
    fn field_width_computation() {
        assert_eq!(bytes_needed(0), 1);
        assert_eq!(bytes_needed(255), 1);
        assert_eq!(bytes_needed(256), 2);
        assert_eq!(bytes_needed(u64::from(u32::MAX)), 4);
        let mut buf = Vec::new();
        push_field(&mut buf, 0x0102, 3);
        assert_eq!(buf, [0x00, 0x01, 0x02]);
    }

    #[test]
    fn file_id_pair_present_and_stable_first_half() {
        let mut table = new_table();
        let root = table.add(Value::Integer(1)).unwrap();
        let spec = TrailerSpec {
            root: Some(root),
            id_first: Some(vec![0xAA; 16]),
            ..TrailerSpec::default()
        };
        let out = write_document(
            &mut table,
            &Limits::default(),
            &WriterConfig::default(),
            &spec,
            WriteMode::Full,
        )
        .unwrap();
        assert!(contains(&out, b"/ID [<AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA>"));
    }
}
