//! Builder for creating and preallocating `.partial` download files.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};

use super::writer::StorageWriter;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Builder for a new `.partial` file. Call `preallocate` then `build` to get
/// a `StorageWriter` that supports concurrent `write_at` from worker threads.
pub struct StorageWriterBuilder {
    file: File,
    temp_path: PathBuf,
}

impl StorageWriterBuilder {
    /// Create (or truncate) the file at `temp_path`, opened for read and write.
    pub fn create(temp_path: &Path) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(temp_path)
            .with_context(|| format!("failed to create partial file: {}", temp_path.display()))?;
        Ok(StorageWriterBuilder {
            file,
            temp_path: temp_path.to_path_buf(),
        })
    }

    /// Reserve `size` bytes. On unix tries `posix_fallocate` first; falls back
    /// to `set_len`. Fails on files that cannot be sized (FIFOs, devices).
    pub fn preallocate(&mut self, size: u64) -> Result<()> {
        if size == 0 {
            return Ok(());
        }
        #[cfg(unix)]
        {
            let fd = self.file.as_raw_fd();
            let r = unsafe { libc::posix_fallocate(fd, 0, size as libc::off_t) };
            if r == 0 {
                return Ok(());
            }
            tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
        }
        self.file
            .set_len(size)
            .context("failed to preallocate file")?;
        Ok(())
    }

    /// True if the opened path is a plain file (not a FIFO or device).
    pub fn is_regular_file(&self) -> bool {
        self.file
            .metadata()
            .map(|m| m.file_type().is_file())
            .unwrap_or(false)
    }

    /// Finish building and return a writer that can be shared for concurrent writes.
    pub fn build(self) -> StorageWriter {
        StorageWriter::from_file_and_path(self.file, self.temp_path)
    }
}
