use quill_object::{Dict, DocumentId, ObjRef, PdfString, Stream, Value};
use tracing::debug;

use crate::error::{ReaderError, ReaderResult};
use crate::lexer::{Keyword, Lexer, Token};

/// A parsed `N G obj … endobj` frame.
#[derive(Debug)]
pub struct IndirectObject {
    pub number: u32,
    pub generation: u16,
    pub value: Value,
}

/// Parses values and indirect-object frames out of raw document bytes.
pub struct ObjectParser<'a> {
    lexer: Lexer<'a>,
    doc: DocumentId,
}

impl<'a> ObjectParser<'a> {
    /// Parser over `data`, starting at `pos`, producing references owned by
    /// `doc`.
    pub fn new(data: &'a [u8], pos: usize, doc: DocumentId) -> Self {
        Self {
            lexer: Lexer::new(data, pos),
            doc,
        }
    }

    pub fn pos(&self) -> usize {
        self.lexer.pos()
    }

    pub fn set_pos(&mut self, pos: usize) {
        self.lexer.set_pos(pos);
    }

    /// Parse one value at the current position.
    pub fn parse_value(&mut self) -> ReaderResult<Value> {
        let token = self.lexer.next_token()?;
        self.value_from_token(token)
    }

    fn value_from_token(&mut self, token: Token) -> ReaderResult<Value> {
        match token {
            Token::Integer(n) => self.integer_or_reference(n),
            Token::Real(r) => Ok(Value::Real(r)),
            Token::Name(name) => Ok(Value::Name(name)),
            Token::LiteralString(bytes) => Ok(Value::String(PdfString::literal(bytes))),
            Token::HexString(bytes) => Ok(Value::String(PdfString::hex(bytes))),
            Token::Keyword(Keyword::True) => Ok(Value::Boolean(true)),
            Token::Keyword(Keyword::False) => Ok(Value::Boolean(false)),
            Token::Keyword(Keyword::Null) => Ok(Value::Null),
            Token::ArrayOpen => self.parse_array_body(),
            Token::DictOpen => Ok(Value::Dictionary(self.parse_dict_body()?)),
            other => Err(ReaderError::UnexpectedToken {
                offset: self.lexer.pos(),
                expected: "a value",
                found: other.describe(),
            }),
        }
    }

    /// Two non-negative integers followed by `R` form a reference; anything
    /// else leaves the first integer as a plain number.
    fn integer_or_reference(&mut self, first: i64) -> ReaderResult<Value> {
        if first < 0 || first > i64::from(u32::MAX) {
            return Ok(Value::Integer(first));
        }
        let rewind = self.lexer.pos();
        if let Ok(Token::Integer(second)) = self.lexer.next_token() {
            if (0..=i64::from(u16::MAX)).contains(&second)
                && matches!(self.lexer.next_token(), Ok(Token::Keyword(Keyword::R)))
            {
                return Ok(Value::Reference(ObjRef::new(
                    first as u32,
                    second as u16,
                    self.doc,
                )));
            }
        }
        self.lexer.set_pos(rewind);
        Ok(Value::Integer(first))
    }

    fn parse_array_body(&mut self) -> ReaderResult<Value> {
        let mut items = Vec::new();
        loop {
            let token = self.lexer.next_token()?;
            match token {
                Token::ArrayClose => return Ok(Value::Array(items)),
                Token::Eof => {
                    return Err(ReaderError::UnexpectedEof {
                        offset: self.lexer.pos(),
                    })
                }
                other => items.push(self.value_from_token(other)?),
            }
        }
    }

    fn parse_dict_body(&mut self) -> ReaderResult<Dict> {
        let mut dict = Dict::new();
        loop {
            match self.lexer.next_token()? {
                Token::DictClose => return Ok(dict),
                Token::Name(key) => {
                    let value = self.parse_value()?;
                    dict.insert(key, value);
                }
                Token::Eof => {
                    return Err(ReaderError::UnexpectedEof {
                        offset: self.lexer.pos(),
                    })
                }
                other => {
                    return Err(ReaderError::UnexpectedToken {
                        offset: self.lexer.pos(),
                        expected: "a name key or >>",
                        found: other.describe(),
                    })
                }
            }
        }
    }

    /// Parse an `N G obj` frame at the current position, including a stream
    /// payload when one follows the dictionary.
    ///
    /// A missing `endobj` is tolerated: values are self-delimiting and real
    /// files drop the keyword often enough that failing would force a
    /// rebuild for no gain.
    pub fn parse_indirect_object(&mut self) -> ReaderResult<IndirectObject> {
        let number = self.expect_u32("object number")?;
        let generation = self.expect_u16("generation number")?;
        self.expect_keyword(Keyword::Obj)?;

        let token = self.lexer.next_token()?;
        let value = if token == Token::DictOpen {
            let dict = self.parse_dict_body()?;
            let rewind = self.lexer.pos();
            match self.lexer.next_token() {
                Ok(Token::Keyword(Keyword::Stream)) => self.parse_stream_payload(dict)?,
                Ok(Token::Keyword(Keyword::EndObj)) => Value::Dictionary(dict),
                _ => {
                    self.lexer.set_pos(rewind);
                    Value::Dictionary(dict)
                }
            }
        } else {
            let value = self.value_from_token(token)?;
            let rewind = self.lexer.pos();
            if !matches!(self.lexer.next_token(), Ok(Token::Keyword(Keyword::EndObj))) {
                self.lexer.set_pos(rewind);
            }
            value
        };

        Ok(IndirectObject {
            number,
            generation,
            value,
        })
    }

    /// Extract a stream payload using `/Length`, falling back to a scan for
    /// the `endstream` keyword when the length is indirect, missing, or
    /// provably wrong.
    fn parse_stream_payload(&mut self, mut dict: Dict) -> ReaderResult<Value> {
        let start = self.lexer.skip_stream_eol();
        let data = self.lexer.data();

        let end_by_length = match dict.get_integer("Length") {
            Some(len) if len >= 0 => {
                let end = start.saturating_add(len as usize);
                if end <= data.len() && endstream_follows(data, end) {
                    Some(end)
                } else {
                    None
                }
            }
            _ => None,
        };

        let end = match end_by_length {
            Some(end) => end,
            None => {
                debug!(start, "stream /Length unusable, scanning for endstream");
                scan_endstream(data, start)?
            }
        };

        let payload = data[start..end].to_vec();
        dict.insert("Length", Value::Integer(payload.len() as i64));
        self.lexer.set_pos(end);
        self.expect_keyword(Keyword::EndStream)?;

        let rewind = self.lexer.pos();
        if !matches!(self.lexer.next_token(), Ok(Token::Keyword(Keyword::EndObj))) {
            self.lexer.set_pos(rewind);
        }
        Ok(Value::Stream(Stream::from_encoded(dict, payload)))
    }

    fn expect_u32(&mut self, expected: &'static str) -> ReaderResult<u32> {
        match self.lexer.next_token()? {
            Token::Integer(n) if (0..=i64::from(u32::MAX)).contains(&n) => Ok(n as u32),
            other => Err(ReaderError::UnexpectedToken {
                offset: self.lexer.pos(),
                expected,
                found: other.describe(),
            }),
        }
    }

    fn expect_u16(&mut self, expected: &'static str) -> ReaderResult<u16> {
        match self.lexer.next_token()? {
            Token::Integer(n) if (0..=i64::from(u16::MAX)).contains(&n) => Ok(n as u16),
            other => Err(ReaderError::UnexpectedToken {
                offset: self.lexer.pos(),
                expected,
                found: other.describe(),
            }),
        }
    }

    pub(crate) fn expect_keyword(&mut self, keyword: Keyword) -> ReaderResult<()> {
        match self.lexer.next_token()? {
            Token::Keyword(k) if k == keyword => Ok(()),
            other => Err(ReaderError::UnexpectedToken {
                offset: self.lexer.pos(),
                expected: "a keyword",
                found: other.describe(),
            }),
        }
    }

    pub(crate) fn next_token(&mut self) -> ReaderResult<Token> {
        self.lexer.next_token()
    }
}

/// Whether (after optional whitespace) the `endstream` keyword starts at
/// `pos`.
fn endstream_follows(data: &[u8], mut pos: usize) -> bool {
    while pos < data.len() && quill_object::name::is_whitespace(data[pos]) {
        pos += 1;
    }
    data[pos..].starts_with(b"endstream")
}

/// Find the payload end by scanning for the first `endstream` keyword,
/// trimming the end-of-line marker that precedes it.
fn scan_endstream(data: &[u8], start: usize) -> ReaderResult<usize> {
    let window = &data[start.min(data.len())..];
    let found = window
        .windows(b"endstream".len())
        .position(|w| w == b"endstream")
        .ok_or(ReaderError::UnexpectedEof { offset: data.len() })?;
    let mut end = start + found;
    if end > start && data[end - 1] == b'\n' {
        end -= 1;
        if end > start && data[end - 1] == b'\r' {
            end -= 1;
        }
    }
    Ok(end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_object::Name;

    fn parse(input: &[u8]) -> Value {
        ObjectParser::new(input, 0, DocumentId::fresh())
            .parse_value()
            .unwrap()
    }

    #[test]
    fn reference_lookahead() {
        let v = parse(b"3 0 R");
        let r = v.as_reference().unwrap();
        assert_eq!((r.number(), r.generation()), (3, 0));
    }

    #[test]
    fn integers_that_are_not_references() {
        assert_eq!(parse(b"3 4 5"), Value::Integer(3));
        assert_eq!(parse(b"3"), Value::Integer(3));
        assert_eq!(parse(b"3 /Name"), Value::Integer(3));
    }

    #[test]
    fn array_with_mixed_members() {
        let v = parse(b"[1 2 0 R (s) /N [true]]");
        let items = v.as_array().unwrap();
        assert_eq!(items.len(), 4);
        assert!(items[1].as_reference().is_some());
        assert_eq!(items[3], Value::Array(vec![Value::Boolean(true)]));
    }

    #[test]
    fn dict_with_nested_dict() {
        let v = parse(b"<</A 1 /B <</C 2 0 R>>>>");
        let dict = v.as_dict().unwrap();
        assert_eq!(dict.get_integer("A"), Some(1));
        let inner = dict.get("B").unwrap().as_dict().unwrap();
        assert!(inner.get("C").unwrap().as_reference().is_some());
    }

    #[test]
    fn indirect_object_frame() {
        let mut p = ObjectParser::new(b"7 2 obj (hello) endobj", 0, DocumentId::fresh());
        let obj = p.parse_indirect_object().unwrap();
        assert_eq!((obj.number, obj.generation), (7, 2));
        assert_eq!(obj.value.as_string().unwrap().as_bytes(), b"hello");
    }

    #[test]
    fn missing_endobj_is_tolerated() {
        let mut p = ObjectParser::new(b"1 0 obj 42 2 0 obj 43", 0, DocumentId::fresh());
        assert_eq!(p.parse_indirect_object().unwrap().value, Value::Integer(42));
        assert_eq!(p.parse_indirect_object().unwrap().value, Value::Integer(43));
    }

    #[test]
    fn stream_with_valid_length() {
        let src = b"5 0 obj <</Length 4>> stream\nDATA\nendstream endobj";
        let mut p = ObjectParser::new(src, 0, DocumentId::fresh());
        let obj = p.parse_indirect_object().unwrap();
        let stream = obj.value.as_stream().unwrap();
        assert_eq!(stream.raw_data(), b"DATA");
        assert!(stream.is_encoded());
    }

    #[test]
    fn stream_with_wrong_length_falls_back_to_scan() {
        let src = b"5 0 obj <</Length 9999>> stream\nDATA\nendstream endobj";
        let mut p = ObjectParser::new(src, 0, DocumentId::fresh());
        let obj = p.parse_indirect_object().unwrap();
        let stream = obj.value.as_stream().unwrap();
        assert_eq!(stream.raw_data(), b"DATA");
        // The dictionary's length is corrected to the real payload size.
        assert_eq!(stream.dict.get_integer("Length"), Some(4));
    }

    #[test]
    fn stream_with_indirect_length_falls_back_to_scan() {
        let src = b"5 0 obj <</Length 8 0 R>> stream\nPAYLOAD\nendstream endobj";
        let mut p = ObjectParser::new(src, 0, DocumentId::fresh());
        let obj = p.parse_indirect_object().unwrap();
        assert_eq!(obj.value.as_stream().unwrap().raw_data(), b"PAYLOAD");
    }

    #[test]
    fn dict_key_must_be_a_name() {
        let mut p = ObjectParser::new(b"<<1 2>>", 0, DocumentId::fresh());
        assert!(matches!(
            p.parse_value(),
            Err(ReaderError::UnexpectedToken { .. })
        ));
    }

    #[test]
    fn real_values_in_dicts() {
        let v = parse(b"<</M [0.5 -1.25]>>");
        let m = v.as_dict().unwrap().get_array("M").unwrap();
        assert_eq!(m[0], Value::Real(0.5));
        assert_eq!(m[1], Value::Real(-1.25));
    }

    #[test]
    fn name_keys_preserve_insertion_order() {
        let v = parse(b"<</Z 1 /A 2>>");
        let keys: Vec<String> = v
            .as_dict()
            .unwrap()
            .keys()
            .map(|k| k.as_str().to_string())
            .collect();
        assert_eq!(keys, ["Z", "A"]);
    }
}
