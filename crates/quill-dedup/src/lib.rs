//! Structural fingerprinting for Quill ("smart mode").
//!
//! Computes canonical, content-based fingerprints of value graphs so that
//! cross-document copies can recognize structurally identical objects and
//! merge them instead of duplicating. Presentation details (dictionary
//! insertion order, string output form, stream encoding) do not affect the
//! fingerprint; structure and content do. Cyclic graphs are handled with an
//! explicit recursion-path set and a fixed back-reference marker.

pub mod error;
pub mod fingerprint;
pub mod index;

pub use error::{DedupError, DedupResult};
pub use fingerprint::{fingerprint_value, Fingerprint, Resolver};
pub use index::DedupIndex;
