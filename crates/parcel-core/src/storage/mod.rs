//! Disk I/O and file lifecycle.
//!
//! Preallocates `.partial` files (fallocate on Linux when available, else
//! set_len), supports concurrent offset writes and reads (pwrite/pread), and
//! renames the finished file to its final name.

mod builder;
mod source;
mod writer;

use std::path::{Path, PathBuf};

pub use builder::StorageWriterBuilder;
pub use source::SourceFile;
pub use writer::StorageWriter;

/// Suffix of an in-progress download file.
pub const TEMP_SUFFIX: &str = ".partial";

/// Path for the in-progress file: appends `.partial` (e.g. `a.bam` → `a.bam.partial`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}
