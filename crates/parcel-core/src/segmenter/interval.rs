//! Interval type: a half-open byte range with an optional md5 tag.

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A byte range [begin, end) (half-open), optionally tagged with the md5 of
/// exactly those bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    /// Start offset (inclusive).
    pub begin: u64,
    /// End offset (exclusive).
    pub end: u64,
    /// Lowercase hex md5 of the bytes in this range, if computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5sum: Option<String>,
}

impl Interval {
    /// Creates an untagged interval. Panics if `begin >= end`.
    pub fn new(begin: u64, end: u64) -> Self {
        assert!(begin < end, "invalid interval [{}, {})", begin, end);
        Self {
            begin,
            end,
            md5sum: None,
        }
    }

    /// Creates an interval tagged with an md5 digest. Panics if `begin >= end`.
    pub fn with_md5(begin: u64, end: u64, md5sum: Option<String>) -> Self {
        Self {
            md5sum,
            ..Self::new(begin, end)
        }
    }

    /// Length of this interval in bytes.
    pub fn len(&self) -> u64 {
        self.end - self.begin
    }

    /// Always false: an interval holds at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// True if the two ranges share at least one byte.
    pub fn overlaps(&self, begin: u64, end: u64) -> bool {
        self.begin < end && begin < self.end
    }

    /// The range as a `std::ops::Range`.
    pub fn range(&self) -> Range<u64> {
        self.begin..self.end
    }

    /// HTTP Range header value (inclusive end): `bytes=begin-(end-1)`.
    pub fn range_header_value(&self) -> String {
        format!("bytes={}-{}", self.begin, self.end - 1)
    }

    /// The untransferred tail after `written` bytes, or `None` when nothing is left.
    pub fn remainder_after(&self, written: u64) -> Option<Interval> {
        let begin = self.begin.saturating_add(written);
        if begin >= self.end {
            None
        } else {
            Some(Interval::new(begin, self.end))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_len_and_header() {
        let iv = Interval::new(0, 99);
        assert_eq!(iv.len(), 99);
        assert_eq!(iv.range_header_value(), "bytes=0-98");
        assert_eq!(iv.range(), 0..99);
    }

    #[test]
    fn single_byte_header() {
        let iv = Interval::new(42, 43);
        assert_eq!(iv.range_header_value(), "bytes=42-42");
    }

    #[test]
    #[should_panic(expected = "invalid interval")]
    fn empty_interval_panics() {
        let _ = Interval::new(10, 10);
    }

    #[test]
    fn remainder_after_partial_write() {
        let iv = Interval::new(100, 200);
        assert_eq!(iv.remainder_after(0), Some(Interval::new(100, 200)));
        assert_eq!(iv.remainder_after(30), Some(Interval::new(130, 200)));
        assert_eq!(iv.remainder_after(100), None);
        assert_eq!(iv.remainder_after(150), None);
    }

    #[test]
    fn overlaps_is_half_open() {
        let iv = Interval::new(10, 20);
        assert!(iv.overlaps(19, 30));
        assert!(!iv.overlaps(20, 30));
        assert!(!iv.overlaps(0, 10));
        assert!(iv.overlaps(0, 11));
    }
}
