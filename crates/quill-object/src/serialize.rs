use crate::error::{ObjectError, ObjectResult};
use crate::number::{format_integer, format_real};
use crate::value::Value;

/// Append a value's serialized token form to `out`.
///
/// Streams are never nested in the serialized form; they only appear as
/// top-level indirect objects, where the writer emits the dictionary and
/// payload together. Encountering one here is a caller error.
pub fn write_value(out: &mut Vec<u8>, value: &Value) -> ObjectResult<()> {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Boolean(true) => out.extend_from_slice(b"true"),
        Value::Boolean(false) => out.extend_from_slice(b"false"),
        Value::Integer(n) => out.extend_from_slice(format_integer(*n).as_bytes()),
        Value::Real(r) => out.extend_from_slice(format_real(*r).as_bytes()),
        Value::Name(name) => name.write_escaped(out),
        Value::String(s) => s.write(out),
        Value::Reference(r) => {
            out.extend_from_slice(r.number().to_string().as_bytes());
            out.push(b' ');
            out.extend_from_slice(r.generation().to_string().as_bytes());
            out.extend_from_slice(b" R");
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_value(out, item)?;
            }
            out.push(b']');
        }
        Value::Dictionary(dict) => {
            out.extend_from_slice(b"<<");
            for (i, (key, entry)) in dict.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                key.write_escaped(out);
                out.push(b' ');
                write_value(out, entry)?;
            }
            out.extend_from_slice(b">>");
        }
        Value::Stream(_) => {
            return Err(ObjectError::EncodeFailed(
                "stream must be serialized as a top-level indirect object".to_string(),
            ));
        }
    }
    Ok(())
}

/// Serialize a value into a fresh buffer.
pub fn value_to_bytes(value: &Value) -> ObjectResult<Vec<u8>> {
    let mut out = Vec::new();
    write_value(&mut out, value)?;
    Ok(out)
}
