use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::dict::Dict;
use crate::error::{ObjectError, ObjectResult};
use crate::value::Value;

/// Chunk size for incremental encode/decode. Size limits are checked after
/// every chunk so a violating stream fails early instead of after full
/// buffering.
const CHUNK: usize = 16 * 1024;

/// A pluggable byte-stream transform. The codec itself is out of scope; this
/// is the seam the rest of the engine works through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Filter {
    /// zlib/deflate compression (`/FlateDecode`).
    Flate,
}

impl Filter {
    /// The filter's wire name.
    pub fn name(&self) -> &'static str {
        match self {
            Filter::Flate => "FlateDecode",
        }
    }

    /// Parse a wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "FlateDecode" | "Fl" => Some(Filter::Flate),
            _ => None,
        }
    }
}

/// A stream object: a dictionary plus a byte payload.
///
/// The payload is either *plain* (decoded bytes with filters pending for the
/// next write) or *encoded* (bytes exactly as read from a source file, with
/// the applied filters recorded in the dictionary's `/Filter` entry).
#[derive(Clone, Debug, PartialEq)]
pub struct Stream {
    /// The stream dictionary. `/Length` and `/Filter` are maintained by the
    /// writer at serialization time.
    pub dict: Dict,
    data: Vec<u8>,
    encoded: bool,
    pending: Vec<Filter>,
}

impl Stream {
    /// Create a plain stream from decoded bytes.
    pub fn new(dict: Dict, data: Vec<u8>) -> Self {
        Self {
            dict,
            data,
            encoded: false,
            pending: Vec::new(),
        }
    }

    /// Create a stream whose payload is already encoded, as read from a
    /// source file. The dictionary's `/Filter` entry describes the applied
    /// filters.
    pub fn from_encoded(dict: Dict, data: Vec<u8>) -> Self {
        Self {
            dict,
            data,
            encoded: true,
            pending: Vec::new(),
        }
    }

    /// Queue a filter to apply when this stream is next serialized.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.pending.push(filter);
        self
    }

    /// The payload as currently held (encoded or plain).
    pub fn raw_data(&self) -> &[u8] {
        &self.data
    }

    /// Whether the payload is in its as-read encoded form.
    pub fn is_encoded(&self) -> bool {
        self.encoded
    }

    /// Filters queued for the next serialization of a plain stream.
    pub fn pending_filters(&self) -> &[Filter] {
        &self.pending
    }

    /// Replace the payload with new decoded bytes.
    ///
    /// Any previously applied or pending filters no longer describe the data,
    /// so the filter bookkeeping is reset along with `/Length`.
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
        self.encoded = false;
        self.pending.clear();
        self.dict.remove("Filter");
        self.dict.remove("DecodeParms");
        self.dict.remove("Length");
    }

    /// The decoded payload.
    ///
    /// Plain streams return their bytes as held; encoded streams run the
    /// inverse of the dictionary's filter chain. `max_size` bounds the
    /// decoded size (decompression output is counted incrementally).
    pub fn decode(&self, max_size: u64) -> ObjectResult<Vec<u8>> {
        if !self.encoded {
            return Ok(self.data.clone());
        }
        let filters = self.filters_from_dict()?;
        let mut data = self.data.clone();
        for filter in filters {
            data = match filter {
                Filter::Flate => flate_decompress(&data, max_size)?,
            };
        }
        Ok(data)
    }

    /// The payload ready for emission, plus the filters newly applied to
    /// produce it (empty for already-encoded passthrough).
    ///
    /// `max_size` is enforced incrementally as output bytes accumulate.
    pub fn encode(&self, max_size: u64) -> ObjectResult<(Vec<u8>, Vec<Filter>)> {
        if self.encoded {
            if self.data.len() as u64 > max_size {
                return Err(ObjectError::StreamSizeExceeded {
                    written: self.data.len() as u64,
                    limit: max_size,
                });
            }
            return Ok((self.data.clone(), Vec::new()));
        }

        let mut data = self.data.clone();
        // Encoding applies the chain in reverse of decode order.
        for filter in self.pending.iter().rev() {
            data = match filter {
                Filter::Flate => flate_compress(&data, max_size)?,
            };
        }
        if data.len() as u64 > max_size {
            return Err(ObjectError::StreamSizeExceeded {
                written: data.len() as u64,
                limit: max_size,
            });
        }
        Ok((data, self.pending.clone()))
    }

    /// Parse the dictionary's `/Filter` entry into the filter chain, in
    /// decode order.
    pub fn filters_from_dict(&self) -> ObjectResult<Vec<Filter>> {
        let entry = match self.dict.get("Filter") {
            None => return Ok(Vec::new()),
            Some(v) => v,
        };
        match entry {
            Value::Name(name) => {
                let filter = Filter::from_name(name.as_str())
                    .ok_or_else(|| ObjectError::UnsupportedFilter(name.as_str().to_string()))?;
                Ok(vec![filter])
            }
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::Name(name) => Filter::from_name(name.as_str())
                        .ok_or_else(|| ObjectError::UnsupportedFilter(name.as_str().to_string())),
                    _ => Err(ObjectError::MalformedFilter(item.type_name())),
                })
                .collect(),
            other => Err(ObjectError::MalformedFilter(other.type_name())),
        }
    }
}

fn flate_compress(data: &[u8], max_size: u64) -> ObjectResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    for chunk in data.chunks(CHUNK) {
        encoder
            .write_all(chunk)
            .map_err(|e| ObjectError::EncodeFailed(e.to_string()))?;
        let written = encoder.get_ref().len() as u64;
        if written > max_size {
            return Err(ObjectError::StreamSizeExceeded {
                written,
                limit: max_size,
            });
        }
    }
    let out = encoder
        .finish()
        .map_err(|e| ObjectError::EncodeFailed(e.to_string()))?;
    if out.len() as u64 > max_size {
        return Err(ObjectError::StreamSizeExceeded {
            written: out.len() as u64,
            limit: max_size,
        });
    }
    Ok(out)
}

fn flate_decompress(data: &[u8], max_size: u64) -> ObjectResult<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    let mut buf = [0u8; CHUNK];
    loop {
        let n = decoder
            .read(&mut buf)
            .map_err(|e| ObjectError::DecodeFailed(e.to_string()))?;
        if n == 0 {
            break;
        }
        let written = (out.len() + n) as u64;
        if written > max_size {
            return Err(ObjectError::StreamSizeExceeded {
                written,
                limit: max_size,
            });
        }
        out.extend_from_slice(&buf[..n]);
    }
    Ok(out)
}
