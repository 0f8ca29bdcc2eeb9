/// Largest byte offset a cross-reference entry can address.
///
/// The classic table stores offsets in a 10-digit decimal field, so the
/// practical addressing ceiling is one below 10^10. Offsets at or beyond
/// 10,000,000,000 are rejected at write time, before the byte is emitted.
pub const MAX_BYTE_OFFSET: u64 = 9_999_999_999;

/// Memory and structure ceilings for one open document.
///
/// Exceeding any of these is a fatal, reported condition for the operation in
/// progress. Nothing is silently truncated: a clamped cross-reference table
/// or stream would corrupt addressing.
#[derive(Clone, Debug)]
pub struct Limits {
    /// Maximum element count in the cross-reference table (default: 2^23).
    pub max_xref_entries: usize,
    /// Maximum serialized stream size in bytes (default: 256 MiB).
    pub max_stream_size: u64,
    /// Maximum objects packed into one object stream (default: 200).
    pub max_objects_per_stream: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_xref_entries: 1 << 23,
            max_stream_size: 256 * 1024 * 1024, // 256 MiB
            max_objects_per_stream: 200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_nonzero() {
        let limits = Limits::default();
        assert!(limits.max_xref_entries > 0);
        assert!(limits.max_stream_size > 0);
        assert!(limits.max_objects_per_stream > 0);
    }

    #[test]
    fn offset_ceiling_is_ten_digits() {
        assert_eq!(MAX_BYTE_OFFSET.to_string().len(), 10);
        assert_eq!(MAX_BYTE_OFFSET + 1, 10_000_000_000);
    }
}
