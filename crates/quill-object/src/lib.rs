//! Foundation value model for Quill.
//!
//! This crate provides the tagged-union value type the rest of the engine is
//! built on, along with the serialization rules the file format fixes. Every
//! other Quill crate depends on `quill-object`.
//!
//! # Key Types
//!
//! - [`Value`] — closed tagged union: null, booleans, numbers, names,
//!   strings, arrays, dictionaries, streams, and indirect references
//! - [`Dict`] — insertion-ordered name→value map (order-independent equality,
//!   stable output)
//! - [`Stream`] — dictionary plus byte payload, with a pluggable [`Filter`]
//!   seam for the format's byte-stream transforms
//! - [`ObjRef`] / [`DocumentId`] — indirect-reference identity scoped to one
//!   open document
//! - [`Limits`] — memory and structure ceilings shared across the engine
//!
//! Numeric output follows the format's rules: non-finite reals serialize as
//! zero (with a diagnostic), out-of-range magnitudes clamp to the
//! representable bounds rather than overflowing silently.

pub mod dict;
pub mod error;
pub mod ids;
pub mod limits;
pub mod name;
pub mod number;
pub mod serialize;
pub mod stream;
pub mod string;
pub mod value;

pub use dict::Dict;
pub use error::{ObjectError, ObjectResult};
pub use ids::{DocumentId, ObjRef};
pub use limits::{Limits, MAX_BYTE_OFFSET};
pub use name::Name;
pub use number::{format_integer, format_real};
pub use serialize::{value_to_bytes, write_value};
pub use stream::{Filter, Stream};
pub use string::{PdfString, StringForm};
pub use value::Value;
