use std::rc::Rc;

use quill_object::{DocumentId, Limits, Value};
use quill_xref::{Location, ParsedObjectStream, XrefError, XrefTable};

use crate::error::{ReaderError, ReaderResult};
use crate::parser::ObjectParser;

/// Materialize the object at `number`, reading through the source bytes when
/// it is not cached.
///
/// Resolution is lazy and idempotent: the first call parses and caches, later
/// calls return the cache until the object is released. Free and undefined
/// numbers resolve to null (the format's rule for dangling references);
/// flushed objects are a lifecycle error.
pub fn resolve_object(
    data: &[u8],
    table: &mut XrefTable,
    number: u32,
    limits: &Limits,
) -> ReaderResult<Rc<Value>> {
    let Some(entry) = table.get(number) else {
        return Ok(Rc::new(Value::Null));
    };
    if entry.is_free() {
        return Ok(Rc::new(Value::Null));
    }
    if entry.is_flushed() {
        return Err(XrefError::Flushed {
            number,
            generation: entry.generation(),
            action: "resolve",
        }
        .into());
    }
    if let Some(cached) = entry.cached() {
        return Ok(cached);
    }

    let value = match entry.location() {
        Location::Unassigned => {
            return Err(XrefError::ReleasedValueMissing { number }.into());
        }
        Location::Offset(offset) => parse_at_offset(data, table.document(), offset, number)?,
        Location::InObjectStream { container, index } => {
            parse_in_container(data, table, container, index, number, limits)?
        }
        Location::NextFree(_) => return Ok(Rc::new(Value::Null)),
    };
    let value = Rc::new(value);
    table.mark_loaded(number, value.clone())?;
    Ok(value)
}

fn parse_at_offset(
    data: &[u8],
    doc: DocumentId,
    offset: u64,
    number: u32,
) -> ReaderResult<Value> {
    if offset as usize >= data.len() {
        return Err(ReaderError::BadXrefOffset { offset });
    }
    let mut parser = ObjectParser::new(data, offset as usize, doc);
    let obj = parser.parse_indirect_object()?;
    if obj.number != number {
        return Err(ReaderError::ObjectMismatch {
            expected: number,
            found: obj.number,
        });
    }
    Ok(obj.value)
}

/// Resolve an object packed inside an object stream: materialize the
/// container first, then slice the requested index. Any inconsistency (free
/// or wrong-typed container, nested container, index/number mismatch) is
/// structural corruption, never a silent null.
fn parse_in_container(
    data: &[u8],
    table: &mut XrefTable,
    container: u32,
    index: u32,
    number: u32,
    limits: &Limits,
) -> ReaderResult<Value> {
    let invalid = |reason: &str| {
        ReaderError::Xref(XrefError::InvalidObjectStream {
            container,
            reason: reason.to_string(),
        })
    };

    let (is_free, cached, location) = match table.get(container) {
        Some(entry) => (entry.is_free(), entry.cached(), entry.location()),
        None => return Err(invalid("container is not in the registry")),
    };
    if is_free {
        return Err(invalid("container entry is free"));
    }

    let container_value = match cached {
        Some(value) => value,
        None => {
            let Location::Offset(offset) = location else {
                return Err(invalid("container has no byte offset (nested containers are invalid)"));
            };
            let value = Rc::new(parse_at_offset(data, table.document(), offset, container)?);
            table.mark_loaded(container, value.clone())?;
            value
        }
    };

    let stream = container_value
        .as_stream()
        .ok_or_else(|| invalid("container object is not a stream"))?;
    let decoded = stream.decode(limits.max_stream_size)?;
    let parsed = ParsedObjectStream::parse(container, &stream.dict, decoded)?;
    match parsed.object_number(index) {
        Some(n) if n == number => {}
        Some(n) => {
            return Err(invalid(&format!(
                "index {index} holds object {n}, expected {number}"
            )))
        }
        None => return Err(invalid(&format!("index {index} is out of range"))),
    }
    let body = parsed.object_bytes(index)?;
    let mut parser = ObjectParser::new(body, 0, table.document());
    parser.parse_value()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_object::Name;
    use quill_xref::ObjectStreamBuilder;

    fn fresh_table(doc: DocumentId) -> XrefTable {
        XrefTable::new(doc, &Limits::default())
    }

    #[test]
    fn resolve_from_offset_and_cache() {
        let doc = DocumentId::fresh();
        let data = b"junk 4 0 obj (payload) endobj";
        let mut table = fresh_table(doc);
        table.insert_parsed(4, 0, Location::Offset(5)).unwrap();

        let v = resolve_object(data, &mut table, 4, &Limits::default()).unwrap();
        assert_eq!(v.as_string().unwrap().as_bytes(), b"payload");
        // Second resolve hits the cache (same allocation).
        let again = resolve_object(data, &mut table, 4, &Limits::default()).unwrap();
        assert!(Rc::ptr_eq(&v, &again));
    }

    #[test]
    fn free_and_undefined_resolve_to_null() {
        let doc = DocumentId::fresh();
        let mut table = fresh_table(doc);
        let v = resolve_object(b"", &mut table, 99, &Limits::default()).unwrap();
        assert!(v.is_null());
    }

    #[test]
    fn wrong_object_at_offset_is_corruption() {
        let doc = DocumentId::fresh();
        let data = b"7 0 obj 1 endobj";
        let mut table = fresh_table(doc);
        table.insert_parsed(4, 0, Location::Offset(0)).unwrap();
        assert!(matches!(
            resolve_object(data, &mut table, 4, &Limits::default()),
            Err(ReaderError::ObjectMismatch { expected: 4, found: 7 })
        ));
    }

    #[test]
    fn resolve_through_object_stream() {
        let doc = DocumentId::fresh();
        let mut builder = ObjectStreamBuilder::new(10);
        builder.add(6, b"<</K 5>>".to_vec()).unwrap();
        builder.add(8, b"true".to_vec()).unwrap();
        let payload = builder.finish();

        let mut src = format!(
            "9 0 obj <</Type /ObjStm /N 2 /First {} /Length {}>> stream\n",
            payload.first,
            payload.data.len()
        )
        .into_bytes();
        src.extend_from_slice(&payload.data);
        src.extend_from_slice(b"\nendstream endobj");

        let mut table = fresh_table(doc);
        table.insert_parsed(9, 0, Location::Offset(0)).unwrap();
        table
            .insert_parsed(6, 0, Location::InObjectStream { container: 9, index: 0 })
            .unwrap();
        table
            .insert_parsed(8, 0, Location::InObjectStream { container: 9, index: 1 })
            .unwrap();

        let six = resolve_object(&src, &mut table, 6, &Limits::default()).unwrap();
        assert_eq!(six.as_dict().unwrap().get_integer("K"), Some(5));
        let eight = resolve_object(&src, &mut table, 8, &Limits::default()).unwrap();
        assert_eq!(eight.as_bool(), Some(true));
    }

    #[test]
    fn container_index_mismatch_is_corruption() {
        let doc = DocumentId::fresh();
        let mut builder = ObjectStreamBuilder::new(10);
        builder.add(6, b"null".to_vec()).unwrap();
        let payload = builder.finish();

        let mut src = format!(
            "9 0 obj <</Type /ObjStm /N 1 /First {} /Length {}>> stream\n",
            payload.first,
            payload.data.len()
        )
        .into_bytes();
        src.extend_from_slice(&payload.data);
        src.extend_from_slice(b"\nendstream endobj");

        let mut table = fresh_table(doc);
        table.insert_parsed(9, 0, Location::Offset(0)).unwrap();
        // Entry claims index 0 holds object 7, but it holds 6.
        table
            .insert_parsed(7, 0, Location::InObjectStream { container: 9, index: 0 })
            .unwrap();
        assert!(matches!(
            resolve_object(&src, &mut table, 7, &Limits::default()),
            Err(ReaderError::Xref(XrefError::InvalidObjectStream { container: 9, .. }))
        ));
    }

    #[test]
    fn non_stream_container_is_corruption() {
        let doc = DocumentId::fresh();
        let data = b"9 0 obj <</Type /ObjStm>> endobj";
        let mut table = fresh_table(doc);
        table.insert_parsed(9, 0, Location::Offset(0)).unwrap();
        table
            .insert_parsed(3, 0, Location::InObjectStream { container: 9, index: 0 })
            .unwrap();
        assert!(matches!(
            resolve_object(data, &mut table, 3, &Limits::default()),
            Err(ReaderError::Xref(XrefError::InvalidObjectStream { .. }))
        ));
    }

    #[test]
    fn resolved_dict_values_keep_names() {
        let doc = DocumentId::fresh();
        let data = b"2 0 obj <</Type /Page>> endobj";
        let mut table = fresh_table(doc);
        table.insert_parsed(2, 0, Location::Offset(0)).unwrap();
        let v = resolve_object(data, &mut table, 2, &Limits::default()).unwrap();
        assert_eq!(
            v.as_dict().unwrap().get_name("Type"),
            Some(&Name::new("Page"))
        );
    }
}
