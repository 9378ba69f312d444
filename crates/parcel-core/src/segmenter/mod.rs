//! Segment map: byte-range intervals and interval sets.
//!
//! Tracks which parts of a file are still to be dispatched (work pool) and
//! which are confirmed on disk (completed, with per-interval md5), and sizes
//! the blocks handed to workers.

mod interval;
mod plan;
mod set;

pub use interval::Interval;
pub use plan::plan_blocks;
pub use set::IntervalSet;
