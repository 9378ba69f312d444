//! Ordered set of non-overlapping intervals.

use std::collections::BTreeMap;

use super::interval::Interval;

/// Non-overlapping intervals keyed by their start offset.
///
/// Used for both the scheduler's work pool (untagged ranges still to be
/// dispatched) and its completed set (md5-tagged ranges confirmed on disk).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalSet {
    intervals: BTreeMap<u64, Interval>,
}

impl IntervalSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The whole range `[0, size)`, or an empty set when `size` is 0.
    pub fn full(size: u64) -> Self {
        let mut set = Self::new();
        if size > 0 {
            set.add(Interval::new(0, size));
        }
        set
    }

    /// Builds a set from untrusted intervals (e.g. deserialized). Returns `None`
    /// if any interval is empty or inverted, or if any two overlap.
    pub fn try_from_intervals(mut intervals: Vec<Interval>) -> Option<Self> {
        intervals.sort_by_key(|iv| iv.begin);
        let mut set = Self::new();
        let mut prev_end = 0u64;
        for (i, iv) in intervals.into_iter().enumerate() {
            if iv.begin >= iv.end {
                return None;
            }
            if i > 0 && iv.begin < prev_end {
                return None;
            }
            prev_end = iv.end;
            set.intervals.insert(iv.begin, iv);
        }
        Some(set)
    }

    /// Inserts an interval. The caller guarantees it does not overlap any
    /// existing member.
    pub fn add(&mut self, interval: Interval) {
        debug_assert!(
            !self.overlaps(interval.begin, interval.end),
            "overlapping insert [{}, {})",
            interval.begin,
            interval.end
        );
        self.intervals.insert(interval.begin, interval);
    }

    /// Removes and returns the interval starting exactly at `begin`.
    pub fn remove(&mut self, begin: u64) -> Option<Interval> {
        self.intervals.remove(&begin)
    }

    /// Removes `[begin, end)` from the set, splitting intervals that only
    /// partially overlap. Remnants are untagged.
    pub fn remove_range(&mut self, begin: u64, end: u64) {
        assert!(begin < end, "invalid range [{}, {})", begin, end);
        let hit: Vec<u64> = self
            .intervals
            .range(..end)
            .rev()
            .take_while(|(_, iv)| iv.end > begin)
            .map(|(k, _)| *k)
            .collect();
        for key in hit {
            let Some(iv) = self.intervals.remove(&key) else {
                continue;
            };
            if iv.begin < begin {
                self.add(Interval::new(iv.begin, begin));
            }
            if end < iv.end {
                self.add(Interval::new(end, iv.end));
            }
        }
    }

    /// Cuts up to `max_len` bytes off the front of the lowest-addressed interval.
    pub fn take_front(&mut self, max_len: u64) -> Option<Interval> {
        let first = self.first()?;
        let begin = first.begin;
        let end = first.end.min(begin.saturating_add(max_len.max(1)));
        self.remove_range(begin, end);
        Some(Interval::new(begin, end))
    }

    /// Sum of `end - begin` over all members.
    pub fn total_bytes(&self) -> u64 {
        self.intervals.values().map(Interval::len).sum()
    }

    /// True if any member shares a byte with `[begin, end)`.
    pub fn overlaps(&self, begin: u64, end: u64) -> bool {
        self.intervals
            .range(..end)
            .next_back()
            .map_or(false, |(_, iv)| iv.end > begin)
    }

    /// True if any member ends past `size`.
    pub fn extends_beyond(&self, size: u64) -> bool {
        self.intervals
            .values()
            .next_back()
            .map_or(false, |iv| iv.end > size)
    }

    /// The complement of this set within `[0, size)`.
    pub fn remaining(&self, size: u64) -> IntervalSet {
        let mut out = IntervalSet::new();
        let mut cursor = 0u64;
        for iv in self.intervals.values() {
            if iv.begin >= size {
                break;
            }
            if iv.begin > cursor {
                out.add(Interval::new(cursor, iv.begin));
            }
            cursor = cursor.max(iv.end);
        }
        if cursor < size {
            out.add(Interval::new(cursor, size));
        }
        out
    }

    pub fn first(&self) -> Option<&Interval> {
        self.intervals.values().next()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.intervals.values()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Interval> {
        self.intervals.values().cloned().collect()
    }
}
