use quill_object::Dict;

use crate::error::{XrefError, XrefResult};

/// Finished payload of an object stream: `count` header pairs, then the
/// concatenated serialized bodies starting at byte `first`.
#[derive(Clone, Debug)]
pub struct ObjectStreamPayload {
    pub count: usize,
    pub first: usize,
    pub data: Vec<u8>,
}

/// Packs serialized non-stream objects into one container payload.
///
/// Accepts up to the configured object count; adding beyond that fails and
/// the caller starts a new container.
#[derive(Debug)]
pub struct ObjectStreamBuilder {
    capacity: usize,
    entries: Vec<(u32, Vec<u8>)>,
}

impl ObjectStreamBuilder {
    /// Create a builder bounded at `capacity` objects.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::new(),
        }
    }

    /// Queue one serialized object body. Returns the index the object will
    /// occupy inside the container.
    pub fn add(&mut self, number: u32, body: Vec<u8>) -> XrefResult<u32> {
        if self.entries.len() >= self.capacity {
            return Err(XrefError::ObjectStreamFull {
                capacity: self.capacity,
            });
        }
        self.entries.push((number, body));
        Ok((self.entries.len() - 1) as u32)
    }

    /// Number of objects queued.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` once the configured object count is reached.
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Build the payload: `(objectNumber, byteOffsetWithinDecodedPayload)`
    /// pairs followed by the concatenated bodies.
    pub fn finish(self) -> ObjectStreamPayload {
        let mut offsets = Vec::with_capacity(self.entries.len());
        let mut running = 0usize;
        for (_, body) in &self.entries {
            offsets.push(running);
            running += body.len() + 1; // one separator byte after each body
        }

        let mut header = String::new();
        for (i, ((number, _), offset)) in self.entries.iter().zip(&offsets).enumerate() {
            if i > 0 {
                header.push(' ');
            }
            header.push_str(&format!("{number} {offset}"));
        }
        header.push('\n');

        let first = header.len();
        let mut data = header.into_bytes();
        for (_, body) in &self.entries {
            data.extend_from_slice(body);
            data.push(b' ');
        }

        ObjectStreamPayload {
            count: self.entries.len(),
            first,
            data,
        }
    }
}

/// A materialized object-stream container, ready to slice objects out of.
#[derive(Debug)]
pub struct ParsedObjectStream {
    container: u32,
    pairs: Vec<(u32, usize)>,
    first: usize,
    data: Vec<u8>,
}

impl ParsedObjectStream {
    /// Validate a container's dictionary and decoded payload and parse the
    /// header pairs. Anything malformed is structural corruption.
    pub fn parse(container: u32, dict: &Dict, data: Vec<u8>) -> XrefResult<Self> {
        match dict.get_name("Type") {
            Some(name) if name.as_str() == "ObjStm" => {}
            _ => {
                return Err(XrefError::InvalidObjectStream {
                    container,
                    reason: "dictionary /Type is not /ObjStm".to_string(),
                })
            }
        }
        let count = dict.get_integer("N").filter(|n| *n >= 0).ok_or_else(|| {
            XrefError::InvalidObjectStream {
                container,
                reason: "missing or negative /N".to_string(),
            }
        })? as usize;
        let first = dict
            .get_integer("First")
            .filter(|f| *f >= 0 && (*f as usize) <= data.len())
            .ok_or_else(|| XrefError::InvalidObjectStream {
                container,
                reason: "missing or out-of-range /First".to_string(),
            })? as usize;

        let pairs = parse_header_pairs(&data[..first], count).map_err(|reason| {
            XrefError::InvalidObjectStream {
                container,
                reason,
            }
        })?;

        Ok(Self {
            container,
            pairs,
            first,
            data,
        })
    }

    /// Number of objects in the container.
    pub fn count(&self) -> usize {
        self.pairs.len()
    }

    /// Object number stored at `index`.
    pub fn object_number(&self, index: u32) -> Option<u32> {
        self.pairs.get(index as usize).map(|(n, _)| *n)
    }

    /// The serialized body of the object at `index`.
    pub fn object_bytes(&self, index: u32) -> XrefResult<&[u8]> {
        let (_, offset) = *self.pairs.get(index as usize).ok_or_else(|| {
            XrefError::InvalidObjectStream {
                container: self.container,
                reason: format!("index {index} out of range ({} objects)", self.pairs.len()),
            }
        })?;
        let start = self.first + offset;
        if start > self.data.len() {
            return Err(XrefError::InvalidObjectStream {
                container: self.container,
                reason: format!("object offset {offset} beyond payload"),
            });
        }
        let end = self
            .pairs
            .get(index as usize + 1)
            .map(|(_, next)| self.first + next)
            .unwrap_or(self.data.len())
            .min(self.data.len());
        if end < start {
            return Err(XrefError::InvalidObjectStream {
                container: self.container,
                reason: "object offsets are not ascending".to_string(),
            });
        }
        Ok(&self.data[start..end])
    }
}

/// Parse `count` whitespace-separated `(number, offset)` pairs.
fn parse_header_pairs(header: &[u8], count: usize) -> Result<Vec<(u32, usize)>, String> {
    let mut numbers = Vec::with_capacity(count * 2);
    let mut current: Option<u64> = None;
    for &b in header {
        match b {
            b'0'..=b'9' => {
                let digit = u64::from(b - b'0');
                current = Some(current.unwrap_or(0).saturating_mul(10).saturating_add(digit));
            }
            b if quill_object::name::is_whitespace(b) => {
                if let Some(v) = current.take() {
                    numbers.push(v);
                }
            }
            other => return Err(format!("unexpected byte 0x{other:02x} in header")),
        }
    }
    if let Some(v) = current.take() {
        numbers.push(v);
    }
    if numbers.len() < count * 2 {
        return Err(format!(
            "header has {} integers, expected {}",
            numbers.len(),
            count * 2
        ));
    }
    Ok(numbers
        .chunks(2)
        .take(count)
        .map(|pair| (pair[0] as u32, pair[1] as usize))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_object::{Name, Value};

    fn objstm_dict(count: i64, first: i64) -> Dict {
        let mut dict = Dict::new();
        dict.insert("Type", Value::Name(Name::new("ObjStm")));
        dict.insert("N", Value::Integer(count));
        dict.insert("First", Value::Integer(first));
        dict
    }

    #[test]
    fn build_then_parse_roundtrip() {
        let mut builder = ObjectStreamBuilder::new(10);
        assert_eq!(builder.add(4, b"<</A 1>>".to_vec()).unwrap(), 0);
        assert_eq!(builder.add(9, b"(text)".to_vec()).unwrap(), 1);
        assert_eq!(builder.add(2, b"42".to_vec()).unwrap(), 2);
        let payload = builder.finish();
        assert_eq!(payload.count, 3);

        let dict = objstm_dict(3, payload.first as i64);
        let parsed = ParsedObjectStream::parse(7, &dict, payload.data).unwrap();
        assert_eq!(parsed.count(), 3);
        assert_eq!(parsed.object_number(0), Some(4));
        assert_eq!(parsed.object_number(2), Some(2));
        assert_eq!(parsed.object_bytes(0).unwrap().strip_suffix(b" "), Some(&b"<</A 1>>"[..]));
        assert_eq!(parsed.object_bytes(2).unwrap().strip_suffix(b" "), Some(&b"42"[..]));
    }

    #[test]
    fn builder_rejects_overflow() {
        let mut builder = ObjectStreamBuilder::new(2);
        builder.add(1, b"1".to_vec()).unwrap();
        builder.add(2, b"2".to_vec()).unwrap();
        assert!(builder.is_full());
        let err = builder.add(3, b"3".to_vec()).unwrap_err();
        assert!(matches!(err, XrefError::ObjectStreamFull { capacity: 2 }));
        assert_eq!(builder.len(), 2);
    }

    #[test]
    fn parse_rejects_wrong_type() {
        let mut dict = Dict::new();
        dict.insert("Type", Value::Name(Name::new("XObject")));
        dict.insert("N", Value::Integer(0));
        dict.insert("First", Value::Integer(0));
        let err = ParsedObjectStream::parse(3, &dict, vec![]).unwrap_err();
        assert!(matches!(err, XrefError::InvalidObjectStream { container: 3, .. }));
    }

    #[test]
    fn parse_rejects_short_header() {
        let dict = objstm_dict(2, 4);
        let err = ParsedObjectStream::parse(1, &dict, b"1 0 rest".to_vec()).unwrap_err();
        assert!(matches!(err, XrefError::InvalidObjectStream { .. }));
    }

    #[test]
    fn parse_rejects_out_of_range_first() {
        let dict = objstm_dict(0, 99);
        let err = ParsedObjectStream::parse(1, &dict, b"tiny".to_vec()).unwrap_err();
        assert!(matches!(err, XrefError::InvalidObjectStream { .. }));
    }

    #[test]
    fn bad_index_is_structural_corruption() {
        let mut builder = ObjectStreamBuilder::new(4);
        builder.add(5, b"null".to_vec()).unwrap();
        let payload = builder.finish();
        let dict = objstm_dict(1, payload.first as i64);
        let parsed = ParsedObjectStream::parse(6, &dict, payload.data).unwrap();
        assert!(matches!(
            parsed.object_bytes(3),
            Err(XrefError::InvalidObjectStream { container: 6, .. })
        ));
    }
}
