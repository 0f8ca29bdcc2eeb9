use std::collections::BTreeMap;

use quill_object::name::is_whitespace;
use quill_object::{Dict, DocumentId, Limits, Value};
use quill_xref::{Location, XrefKind, XrefTable};
use tracing::{debug, warn};

use crate::error::{ReaderError, ReaderResult};
use crate::parser::ObjectParser;
use crate::xref::ParsedDocument;

/// Rebuild a document's registry by scanning the raw bytes for object-start
/// markers.
///
/// Used when the cross-reference chain is unusable. Every `N G obj` marker
/// found becomes an entry; when the same object number appears more than
/// once, the occurrence later in the file wins (it is the newer write). The
/// trailer is recovered from the last parseable `trailer` dictionary, or by
/// scanning the found objects for the root catalog.
pub fn rebuild(data: &[u8], doc: DocumentId, limits: &Limits) -> ReaderResult<ParsedDocument> {
    let mut found: BTreeMap<u32, (u16, u64)> = BTreeMap::new();
    for marker in find_marker_positions(data) {
        if let Some((number, generation, offset)) = object_header_before(data, marker) {
            if number as usize > limits.max_xref_entries {
                warn!(number, "skipping recovered object beyond the capacity limit");
                continue;
            }
            found.insert(number, (generation, offset));
        }
    }

    let mut table = XrefTable::new(doc, limits);
    for (number, (generation, offset)) in &found {
        table.insert_parsed(*number, *generation, Location::Offset(*offset))?;
    }
    table.init_free_list();

    let trailer = recover_trailer(data, doc, &found)?;
    warn!(
        objects = found.len(),
        "document rebuilt from a recovery scan"
    );
    Ok(ParsedDocument {
        table,
        trailer,
        startxref: 0,
        kind: XrefKind::Table,
        rebuilt: true,
    })
}

/// All byte positions where the `obj` keyword starts.
fn find_marker_positions(data: &[u8]) -> Vec<usize> {
    data.windows(3)
        .enumerate()
        .filter(|(i, w)| {
            *w == b"obj"
                && data
                    .get(i + 3)
                    .map_or(true, |b| is_whitespace(*b) || quill_object::name::is_delimiter(*b))
        })
        .map(|(i, _)| i)
        .collect()
}

/// Walk backward from an `obj` keyword over `generation`, then `number`.
/// Returns the parsed header and the offset of the object number, or `None`
/// when the bytes before the keyword do not form a header (as in `endobj`).
fn object_header_before(data: &[u8], marker: usize) -> Option<(u32, u16, u64)> {
    let (generation, before_gen) = digits_before(data, skip_ws_before(data, marker)?)?;
    let (number, number_start) = digits_before(data, skip_ws_before(data, before_gen)?)?;
    // The header must not itself be preceded by another digit.
    if number_start > 0 && data[number_start - 1].is_ascii_digit() {
        return None;
    }
    let generation = u16::try_from(generation).ok()?;
    let number = u32::try_from(number).ok()?;
    if number == 0 {
        return None;
    }
    Some((number, generation, number_start as u64))
}

/// Skip whitespace backward from `end` (exclusive). At least one whitespace
/// byte is required.
fn skip_ws_before(data: &[u8], end: usize) -> Option<usize> {
    let mut pos = end;
    while pos > 0 && is_whitespace(data[pos - 1]) {
        pos -= 1;
    }
    (pos < end).then_some(pos)
}

/// Read a digit run backward from `end` (exclusive). Returns the value and
/// the position of its first digit.
fn digits_before(data: &[u8], end: usize) -> Option<(u64, usize)> {
    let mut start = end;
    while start > 0 && data[start - 1].is_ascii_digit() {
        start -= 1;
    }
    if start == end || end - start > 10 {
        return None;
    }
    let text = std::str::from_utf8(&data[start..end]).ok()?;
    Some((text.parse().ok()?, start))
}

fn recover_trailer(
    data: &[u8],
    doc: DocumentId,
    found: &BTreeMap<u32, (u16, u64)>,
) -> ReaderResult<Dict> {
    // Prefer the last trailer dictionary that still parses.
    const MARKER: &[u8] = b"trailer";
    let positions: Vec<usize> = data
        .windows(MARKER.len())
        .enumerate()
        .filter(|(_, w)| *w == MARKER)
        .map(|(i, _)| i)
        .collect();
    for &pos in positions.iter().rev() {
        let mut parser = ObjectParser::new(data, pos + MARKER.len(), doc);
        if let Ok(Value::Dictionary(dict)) = parser.parse_value() {
            if dict.contains_key("Root") {
                return Ok(dict);
            }
        }
    }

    // No usable trailer: look for the root catalog among the recovered
    // objects (covers stream-form documents, whose trailer is a dictionary
    // inside the cross-reference stream).
    debug!("no trailer dictionary found, scanning recovered objects for the catalog");
    for (&number, &(generation, offset)) in found.iter().rev() {
        let mut parser = ObjectParser::new(data, offset as usize, doc);
        let Ok(obj) = parser.parse_indirect_object() else {
            continue;
        };
        let is_catalog = obj
            .value
            .as_dict()
            .and_then(|d| d.get_name("Type"))
            .is_some_and(|name| name.as_str() == "Catalog");
        if is_catalog {
            let mut trailer = Dict::new();
            trailer.insert("Size", Value::Integer(found.len() as i64 + 1));
            trailer.insert(
                "Root",
                Value::Reference(quill_object::ObjRef::new(number, generation, doc)),
            );
            return Ok(trailer);
        }
    }
    Err(ReaderError::MissingTrailer)
}
