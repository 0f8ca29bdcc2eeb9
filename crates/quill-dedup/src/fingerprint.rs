use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use quill_object::{format_integer, format_real, ObjRef, Value};

use crate::error::DedupResult;

/// Domain tag prepended to every fingerprint computation, so structural
/// fingerprints can never collide with other BLAKE3 uses.
const DOMAIN: &[u8] = b"quill-fingerprint-v1:";

/// Content-based structural fingerprint of a value graph.
///
/// Two structurally identical subgraphs (including self-referential ones)
/// produce byte-identical fingerprints; any difference in structure or
/// primitive content changes the hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short_hex())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Resolver the fingerprinter uses to follow indirect references. Returning
/// `None` marks the target unresolvable; it contributes a fixed marker
/// instead of failing the whole fingerprint.
pub type Resolver<'a> = dyn FnMut(ObjRef) -> Option<Rc<Value>> + 'a;

/// Compute the canonical structural fingerprint of `value`.
///
/// The canonical token stream emits a type tag per node, dictionary entries
/// sorted by key (insertion order is presentation, not structure), numbers
/// in their canonical output form, and stream payloads decoded (the applied
/// encoding is presentation too). References are followed through
/// `resolver`; a reference already on the current recursion path contributes
/// a fixed back-reference marker, which bounds the walk on cyclic graphs.
///
/// `max_stream_size` bounds stream decoding, as everywhere else.
pub fn fingerprint_value(
    value: &Value,
    resolver: &mut Resolver<'_>,
    max_stream_size: u64,
) -> DedupResult<Fingerprint> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(DOMAIN);
    let mut path = HashSet::new();
    emit(value, resolver, max_stream_size, &mut hasher, &mut path)?;
    Ok(Fingerprint(*hasher.finalize().as_bytes()))
}

fn emit(
    value: &Value,
    resolver: &mut Resolver<'_>,
    max_stream_size: u64,
    hasher: &mut blake3::Hasher,
    path: &mut HashSet<ObjRef>,
) -> DedupResult<()> {
    match value {
        Value::Null => {
            hasher.update(b"Z");
        }
        Value::Boolean(b) => {
            hasher.update(b"B");
            hasher.update(&[u8::from(*b)]);
        }
        Value::Integer(n) => {
            hasher.update(b"I");
            update_text(hasher, &format_integer(*n));
        }
        Value::Real(r) => {
            hasher.update(b"R");
            update_text(hasher, &format_real(*r));
        }
        Value::Name(name) => {
            hasher.update(b"N");
            update_bytes(hasher, name.as_str().as_bytes());
        }
        Value::String(s) => {
            hasher.update(b"S");
            update_bytes(hasher, s.as_bytes());
        }
        Value::Array(items) => {
            hasher.update(b"A");
            hasher.update(&(items.len() as u64).to_be_bytes());
            for item in items {
                emit(item, resolver, max_stream_size, hasher, path)?;
            }
        }
        Value::Dictionary(dict) => {
            hasher.update(b"D");
            emit_dict_sorted(dict, resolver, max_stream_size, hasher, path, &[])?;
        }
        Value::Stream(stream) => {
            hasher.update(b"T");
            // The applied encoding is presentation: fingerprint the decoded
            // payload and leave the encoding bookkeeping keys out.
            emit_dict_sorted(
                &stream.dict,
                resolver,
                max_stream_size,
                hasher,
                path,
                &["Length", "Filter", "DecodeParms"],
            )?;
            let payload = stream.decode(max_stream_size)?;
            update_bytes(hasher, &payload);
        }
        Value::Reference(r) => {
            if path.contains(r) {
                // Back-reference on the current path: fixed marker instead
                // of infinite recursion.
                hasher.update(b"C");
            } else {
                match resolver(*r) {
                    Some(target) => {
                        hasher.update(b"G");
                        path.insert(*r);
                        emit(&target, resolver, max_stream_size, hasher, path)?;
                        path.remove(r);
                    }
                    None => {
                        hasher.update(b"U");
                    }
                }
            }
        }
    }
    Ok(())
}

fn emit_dict_sorted(
    dict: &quill_object::Dict,
    resolver: &mut Resolver<'_>,
    max_stream_size: u64,
    hasher: &mut blake3::Hasher,
    path: &mut HashSet<ObjRef>,
    skip: &[&str],
) -> DedupResult<()> {
    let mut keys: Vec<&quill_object::Name> = dict
        .keys()
        .filter(|k| !skip.contains(&k.as_str()))
        .collect();
    keys.sort();
    hasher.update(&(keys.len() as u64).to_be_bytes());
    for key in keys {
        update_bytes(hasher, key.as_str().as_bytes());
        if let Some(entry) = dict.get(key.as_str()) {
            emit(entry, resolver, max_stream_size, hasher, path)?;
        }
    }
    Ok(())
}

fn update_bytes(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

fn update_text(hasher: &mut blake3::Hasher, text: &str) {
    update_bytes(hasher, text.as_bytes());
}
