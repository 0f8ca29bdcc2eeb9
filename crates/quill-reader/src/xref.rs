use std::collections::HashSet;

use quill_object::{Dict, DocumentId, Limits, Value};
use quill_xref::{Location, XrefKind, XrefTable};
use tracing::{debug, warn};

use crate::error::{ReaderError, ReaderResult};
use crate::lexer::{Keyword, Lexer, Token};
use crate::parser::ObjectParser;
use crate::recovery;

/// Result of loading a document's cross-reference data.
#[derive(Debug)]
pub struct ParsedDocument {
    /// The populated registry, free chain initialized.
    pub table: XrefTable,
    /// Merged trailer: the newest section wins every key.
    pub trailer: Dict,
    /// Offset of the newest cross-reference section.
    pub startxref: u64,
    /// Form of the newest section; append updates must match it.
    pub kind: XrefKind,
    /// Set when the chain was unusable and the table was rebuilt by the
    /// recovery scan.
    pub rebuilt: bool,
}

/// One parsed section's bookkeeping.
struct Section {
    trailer: Dict,
    prev: Option<u64>,
    kind: XrefKind,
}

/// Load the cross-reference chain of `data` into a fresh table.
///
/// Structural failures anywhere along the chain fall back to the brute-force
/// recovery scan; capacity and lifecycle violations stay fatal.
pub fn load_document(
    data: &[u8],
    doc: DocumentId,
    limits: &Limits,
) -> ReaderResult<ParsedDocument> {
    match load_via_chain(data, doc, limits) {
        Ok(parsed) => Ok(parsed),
        Err(e) if e.is_recoverable() => {
            warn!(error = %e, "cross-reference chain unusable, rebuilding by recovery scan");
            recovery::rebuild(data, doc, limits)
        }
        Err(e) => Err(e),
    }
}

fn load_via_chain(data: &[u8], doc: DocumentId, limits: &Limits) -> ReaderResult<ParsedDocument> {
    if !data.starts_with(b"%PDF-") {
        debug!("no format header at byte 0");
    }
    let startxref = find_startxref(data)?;

    let mut table = XrefTable::new(doc, limits);
    let mut trailer = Dict::new();
    let mut kind = None;
    let mut visited = HashSet::new();
    let mut next = Some(startxref);

    while let Some(offset) = next {
        if !visited.insert(offset) {
            warn!(offset, "cross-reference chain loops, stopping the walk");
            break;
        }
        let section = parse_section(data, doc, limits, &mut table, offset)?;
        if kind.is_none() {
            kind = Some(section.kind);
        }
        merge_trailer(&mut trailer, &section.trailer);
        next = section.prev;
    }

    if trailer.get("Root").is_none() {
        return Err(ReaderError::MissingTrailer);
    }
    table.init_free_list();
    Ok(ParsedDocument {
        table,
        trailer,
        startxref,
        kind: kind.unwrap_or(XrefKind::Table),
        rebuilt: false,
    })
}

/// Locate the `startxref` marker in the file tail and return its target.
pub fn find_startxref(data: &[u8]) -> ReaderResult<u64> {
    const MARKER: &[u8] = b"startxref";
    let tail_start = data.len().saturating_sub(2048);
    let tail = &data[tail_start..];
    let idx = tail
        .windows(MARKER.len())
        .rposition(|w| w == MARKER)
        .ok_or(ReaderError::MissingStartxref)?;
    let mut lexer = Lexer::new(data, tail_start + idx + MARKER.len());
    match lexer.next_token() {
        Ok(Token::Integer(n)) if n >= 0 => Ok(n as u64),
        _ => Err(ReaderError::MissingStartxref),
    }
}

/// Newer keys win; `Prev` and `XRefStm` are per-section plumbing and stay
/// out of the merged trailer.
fn merge_trailer(merged: &mut Dict, section: &Dict) {
    for (key, value) in section.iter() {
        if key.as_str() == "Prev" || key.as_str() == "XRefStm" {
            continue;
        }
        if !merged.contains_key(key.as_str()) {
            merged.insert(key.clone(), value.clone());
        }
    }
}

fn parse_section(
    data: &[u8],
    doc: DocumentId,
    limits: &Limits,
    table: &mut XrefTable,
    offset: u64,
) -> ReaderResult<Section> {
    if offset as usize >= data.len() {
        return Err(ReaderError::BadXrefOffset { offset });
    }
    let mut lexer = Lexer::new(data, offset as usize);
    if matches!(lexer.next_token(), Ok(Token::Keyword(Keyword::Xref))) {
        parse_classic_section(data, doc, limits, table, lexer)
    } else {
        parse_stream_section(data, doc, limits, table, offset)
    }
}

/// Classic table: subsection headers (`start count`) followed by fixed-width
/// `offset generation flag` records, then the `trailer` dictionary.
fn parse_classic_section(
    data: &[u8],
    doc: DocumentId,
    limits: &Limits,
    table: &mut XrefTable,
    mut lexer: Lexer<'_>,
) -> ReaderResult<Section> {
    let mut entries: Vec<(u32, u16, Location)> = Vec::new();
    loop {
        let at = lexer.pos();
        match lexer.next_token()? {
            Token::Keyword(Keyword::Trailer) => break,
            Token::Integer(start) if start >= 0 => {
                let count = match lexer.next_token()? {
                    Token::Integer(n) if n >= 0 => n,
                    other => {
                        return Err(ReaderError::MalformedTable {
                            offset: at,
                            reason: format!("expected entry count, found {}", other.describe()),
                        })
                    }
                };
                for i in 0..count {
                    let number = start + i;
                    if number > i64::from(u32::MAX) {
                        return Err(ReaderError::MalformedTable {
                            offset: at,
                            reason: format!("object number {number} out of range"),
                        });
                    }
                    let (generation, location) =
                        read_table_entry(&mut lexer).map_err(|reason| {
                            ReaderError::MalformedTable { offset: at, reason }
                        })?;
                    entries.push((number as u32, generation, location));
                }
            }
            other => {
                return Err(ReaderError::MalformedTable {
                    offset: at,
                    reason: format!("expected subsection or trailer, found {}", other.describe()),
                })
            }
        }
    }

    let mut parser = ObjectParser::new(data, lexer.pos(), doc);
    let trailer = match parser.parse_value()? {
        Value::Dictionary(d) => d,
        other => {
            return Err(ReaderError::MalformedTable {
                offset: lexer.pos(),
                reason: format!("trailer is not a dictionary but {}", other.type_name()),
            })
        }
    };

    // Hybrid document: the pointed-to stream section takes precedence over
    // this table for overlapping numbers, so merge it first.
    if let Some(xref_stm) = trailer.get_integer("XRefStm").filter(|v| *v >= 0) {
        debug!(offset = xref_stm, "merging hybrid /XRefStm section");
        parse_stream_section(data, doc, limits, table, xref_stm as u64)?;
    }
    for (number, generation, location) in entries {
        table.insert_parsed(number, generation, location)?;
    }

    let prev = trailer.get_integer("Prev").filter(|v| *v >= 0).map(|v| v as u64);
    Ok(Section {
        trailer,
        prev,
        kind: XrefKind::Table,
    })
}

fn read_table_entry(lexer: &mut Lexer<'_>) -> Result<(u16, Location), String> {
    let field = match lexer.next_token() {
        Ok(Token::Integer(n)) if n >= 0 => n as u64,
        other => return Err(format!("bad entry offset field: {other:?}")),
    };
    let generation = match lexer.next_token() {
        Ok(Token::Integer(n)) if (0..=i64::from(u16::MAX)).contains(&n) => n as u16,
        other => return Err(format!("bad entry generation field: {other:?}")),
    };
    let location = match lexer.next_token() {
        Ok(Token::Keyword(Keyword::N)) => Location::Offset(field),
        Ok(Token::Keyword(Keyword::F)) => Location::NextFree(field as u32),
        other => return Err(format!("bad entry flag: {other:?}")),
    };
    Ok((generation, location))
}

/// Cross-reference stream: binary rows of `(type, field2, field3)` with
/// `/W`-configured column widths.
fn parse_stream_section(
    data: &[u8],
    doc: DocumentId,
    limits: &Limits,
    table: &mut XrefTable,
    offset: u64,
) -> ReaderResult<Section> {
    if offset as usize >= data.len() {
        return Err(ReaderError::BadXrefOffset { offset });
    }
    let mut parser = ObjectParser::new(data, offset as usize, doc);
    let obj = parser.parse_indirect_object()?;
    let stream = match obj.value {
        Value::Stream(s) => s,
        other => {
            return Err(ReaderError::MalformedXrefStream(format!(
                "object at offset {offset} is {}, not a stream",
                other.type_name()
            )))
        }
    };
    match stream.dict.get_name("Type") {
        Some(name) if name.as_str() == "XRef" => {}
        _ => {
            return Err(ReaderError::MalformedXrefStream(
                "stream /Type is not /XRef".to_string(),
            ))
        }
    }

    let size = stream
        .dict
        .get_integer("Size")
        .filter(|n| *n >= 0)
        .ok_or_else(|| ReaderError::MalformedXrefStream("missing /Size".to_string()))?;
    let widths = read_widths(&stream.dict)?;
    let subsections = read_index(&stream.dict, size)?;
    let decoded = stream.decode(limits.max_stream_size)?;

    let row_width: usize = widths.iter().sum();
    if row_width == 0 {
        return Err(ReaderError::MalformedXrefStream("/W is all zeros".to_string()));
    }
    let mut pos = 0usize;
    for (start, count) in subsections {
        for i in 0..count {
            if pos + row_width > decoded.len() {
                return Err(ReaderError::MalformedXrefStream(format!(
                    "rows truncated at byte {pos}"
                )));
            }
            // A zero-width type column defaults to type 1.
            let entry_type = if widths[0] == 0 {
                1
            } else {
                read_field(&decoded[pos..], widths[0])
            };
            let field2 = read_field(&decoded[pos + widths[0]..], widths[1]);
            let field3 = read_field(&decoded[pos + widths[0] + widths[1]..], widths[2]);
            pos += row_width;

            let number = start + i;
            if number > u64::from(u32::MAX) {
                return Err(ReaderError::MalformedXrefStream(format!(
                    "object number {number} out of range"
                )));
            }
            let (generation, location) = match entry_type {
                0 => (field3 as u16, Location::NextFree(field2 as u32)),
                1 => (field3 as u16, Location::Offset(field2)),
                2 => (
                    0,
                    Location::InObjectStream {
                        container: field2 as u32,
                        index: field3 as u32,
                    },
                ),
                other => {
                    // Unknown row types are reserved; readers skip them.
                    debug!(entry_type = other, number, "skipping unknown row type");
                    continue;
                }
            };
            table.insert_parsed(number as u32, generation, location)?;
        }
    }

    let prev = stream
        .dict
        .get_integer("Prev")
        .filter(|v| *v >= 0)
        .map(|v| v as u64);
    Ok(Section {
        trailer: stream.dict.clone(),
        prev,
        kind: XrefKind::Stream,
    })
}

fn read_widths(dict: &Dict) -> ReaderResult<[usize; 3]> {
    let array = dict
        .get_array("W")
        .ok_or_else(|| ReaderError::MalformedXrefStream("missing /W".to_string()))?;
    if array.len() < 3 {
        return Err(ReaderError::MalformedXrefStream(format!(
            "/W has {} columns, need 3",
            array.len()
        )));
    }
    let mut widths = [0usize; 3];
    for (slot, value) in widths.iter_mut().zip(array) {
        match value.as_integer() {
            Some(n) if (0..=8).contains(&n) => *slot = n as usize,
            _ => {
                return Err(ReaderError::MalformedXrefStream(
                    "/W column is not an integer in 0..=8".to_string(),
                ))
            }
        }
    }
    Ok(widths)
}

fn read_index(dict: &Dict, size: i64) -> ReaderResult<Vec<(u64, u64)>> {
    match dict.get_array("Index") {
        None => Ok(vec![(0, size as u64)]),
        Some(items) => {
            if items.len() % 2 != 0 {
                return Err(ReaderError::MalformedXrefStream(
                    "/Index has an odd number of values".to_string(),
                ));
            }
            items
                .chunks(2)
                .map(|pair| {
                    match (pair[0].as_integer(), pair[1].as_integer()) {
                        (Some(start), Some(count)) if start >= 0 && count >= 0 => {
                            Ok((start as u64, count as u64))
                        }
                        _ => Err(ReaderError::MalformedXrefStream(
                            "/Index pair is not two non-negative integers".to_string(),
                        )),
                    }
                })
                .collect()
        }
    }
}

/// Big-endian field of `width` bytes.
fn read_field(data: &[u8], width: usize) -> u64 {
    let mut value = 0u64;
    for &b in &data[..width] {
        value = (value << 8) | u64::from(b);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_field_big_endian() {
        assert_eq!(read_field(&[0x01, 0x02], 2), 0x0102);
        assert_eq!(read_field(&[0xff], 1), 255);
        assert_eq!(read_field(&[1, 2, 3], 0), 0);
    }

    #[test]
    fn startxref_found_in_tail() {
        let data = b"junk junk startxref\n 1234 \n%%EOF";
        assert_eq!(find_startxref(data).unwrap(), 1234);
    }

    #[test]
    fn startxref_takes_the_last_marker() {
        let data = b"startxref\n1\n%%EOF startxref\n99\n%%EOF";
        assert_eq!(find_startxref(data).unwrap(), 99);
    }

    #[test]
    fn startxref_missing() {
        assert!(matches!(
            find_startxref(b"no marker here"),
            Err(ReaderError::MissingStartxref)
        ));
    }

    #[test]
    fn merge_trailer_newest_wins() {
        let mut merged = Dict::new();
        let mut newest = Dict::new();
        newest.insert("Size", Value::Integer(10));
        newest.insert("Prev", Value::Integer(5));
        merge_trailer(&mut merged, &newest);

        let mut older = Dict::new();
        older.insert("Size", Value::Integer(3));
        older.insert("Info", Value::Integer(1));
        merge_trailer(&mut merged, &older);

        assert_eq!(merged.get_integer("Size"), Some(10));
        assert_eq!(merged.get_integer("Info"), Some(1));
        assert!(!merged.contains_key("Prev"));
    }
}
