use std::fmt;
use std::hash::{Hash, Hasher};

/// Output form of a string object. Presentation only: two strings with the
/// same bytes are equal regardless of form.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StringForm {
    /// `(parenthesized)` with backslash escapes.
    Literal,
    /// `<hex digits>`.
    Hex,
}

/// A string object: arbitrary bytes plus a preferred output form.
#[derive(Clone, Debug)]
pub struct PdfString {
    bytes: Vec<u8>,
    form: StringForm,
}

impl PdfString {
    /// A literal-form string.
    pub fn literal(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            form: StringForm::Literal,
        }
    }

    /// A hex-form string.
    pub fn hex(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            form: StringForm::Hex,
        }
    }

    /// The decoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The preferred output form.
    pub fn form(&self) -> StringForm {
        self.form
    }

    /// Append the serialized form to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        match self.form {
            StringForm::Literal => {
                out.push(b'(');
                for &b in &self.bytes {
                    match b {
                        b'(' => out.extend_from_slice(b"\\("),
                        b')' => out.extend_from_slice(b"\\)"),
                        b'\\' => out.extend_from_slice(b"\\\\"),
                        b'\n' => out.extend_from_slice(b"\\n"),
                        b'\r' => out.extend_from_slice(b"\\r"),
                        b'\t' => out.extend_from_slice(b"\\t"),
                        0x20..=0x7e => out.push(b),
                        _ => out.extend_from_slice(format!("\\{b:03o}").as_bytes()),
                    }
                }
                out.push(b')');
            }
            StringForm::Hex => {
                out.push(b'<');
                for &b in &self.bytes {
                    out.extend_from_slice(format!("{b:02X}").as_bytes());
                }
                out.push(b'>');
            }
        }
    }
}

// Equality and hashing ignore the output form.
impl PartialEq for PdfString {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for PdfString {}

impl Hash for PdfString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl fmt::Display for PdfString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written(s: &PdfString) -> Vec<u8> {
        let mut out = Vec::new();
        s.write(&mut out);
        out
    }

    #[test]
    fn literal_escapes_specials() {
        let s = PdfString::literal(b"a(b)c\\d".to_vec());
        assert_eq!(written(&s), b"(a\\(b\\)c\\\\d)");
    }

    #[test]
    fn literal_escapes_control_bytes_as_octal() {
        let s = PdfString::literal(vec![0x01, b'A']);
        assert_eq!(written(&s), b"(\\001A)");
    }

    #[test]
    fn hex_form_uppercase_pairs() {
        let s = PdfString::hex(vec![0xde, 0xad, 0x01]);
        assert_eq!(written(&s), b"<DEAD01>");
    }

    #[test]
    fn equality_ignores_form() {
        assert_eq!(PdfString::literal(b"x".to_vec()), PdfString::hex(b"x".to_vec()));
    }
}
