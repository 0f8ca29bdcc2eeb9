use crate::dict::Dict;
use crate::ids::ObjRef;
use crate::name::Name;
use crate::stream::Stream;
use crate::string::PdfString;

/// The closed tagged union of every value the format can hold.
///
/// Composite variants may contain [`Value::Reference`] links to other
/// indirect objects, so a document's values form a possibly cyclic graph.
/// Equality is deep for directly held values; references compare by identity
/// (number, generation, owning document), not by target.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Name(Name),
    String(PdfString),
    Array(Vec<Value>),
    Dictionary(Dict),
    Stream(Stream),
    Reference(ObjRef),
}

impl Value {
    /// Short type label used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Name(_) => "name",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Dictionary(_) => "dictionary",
            Value::Stream(_) => "stream",
            Value::Reference(_) => "reference",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Value::Stream(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric value as a real; integers widen.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(r) => Some(*r),
            Value::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&Name> {
        match self {
            Value::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&PdfString> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// The dictionary of a dictionary value or of a stream.
    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Value::Dictionary(d) => Some(d),
            Value::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut Dict> {
        match self {
            Value::Dictionary(d) => Some(d),
            Value::Stream(s) => Some(&mut s.dict),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&Stream> {
        match self {
            Value::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjRef> {
        match self {
            Value::Reference(r) => Some(*r),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Real(r)
    }
}

impl From<Name> for Value {
    fn from(n: Name) -> Self {
        Value::Name(n)
    }
}

impl From<PdfString> for Value {
    fn from(s: PdfString) -> Self {
        Value::String(s)
    }
}

impl From<Dict> for Value {
    fn from(d: Dict) -> Self {
        Value::Dictionary(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Stream> for Value {
    fn from(s: Stream) -> Self {
        Value::Stream(s)
    }
}

impl From<ObjRef> for Value {
    fn from(r: ObjRef) -> Self {
        Value::Reference(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::DocumentId;

    #[test]
    fn accessors_match_variants() {
        assert_eq!(Value::Integer(5).as_integer(), Some(5));
        assert_eq!(Value::Integer(5).as_real(), Some(5.0));
        assert_eq!(Value::Real(0.5).as_real(), Some(0.5));
        assert_eq!(Value::Boolean(true).as_bool(), Some(true));
        assert!(Value::Null.is_null());
        assert_eq!(Value::Null.as_integer(), None);
    }

    #[test]
    fn stream_dict_is_reachable_through_as_dict() {
        let mut dict = Dict::new();
        dict.insert("Kind", Value::Name(Name::new("Data")));
        let stream = Stream::new(dict, b"payload".to_vec());
        let value = Value::Stream(stream);
        assert_eq!(value.as_dict().unwrap().get_name("Kind").unwrap().as_str(), "Data");
    }

    #[test]
    fn deep_equality_for_composites() {
        let a = Value::Array(vec![Value::Integer(1), Value::Array(vec![Value::Null])]);
        let b = Value::Array(vec![Value::Integer(1), Value::Array(vec![Value::Null])]);
        assert_eq!(a, b);
    }

    #[test]
    fn references_compare_by_identity() {
        let doc = DocumentId::fresh();
        let other = DocumentId::fresh();
        assert_eq!(
            Value::Reference(ObjRef::new(1, 0, doc)),
            Value::Reference(ObjRef::new(1, 0, doc))
        );
        assert_ne!(
            Value::Reference(ObjRef::new(1, 0, doc)),
            Value::Reference(ObjRef::new(1, 0, other))
        );
    }

    #[test]
    fn type_names_cover_all_variants() {
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::Real(1.0).type_name(), "real");
        assert_eq!(Value::Dictionary(Dict::new()).type_name(), "dictionary");
    }
}
