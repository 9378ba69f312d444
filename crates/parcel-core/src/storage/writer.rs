//! Concurrent offset writer for `.partial` download files.

use anyhow::{Context, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Writer for an in-progress download file. Safe to clone and share between
/// worker threads; each `write_at` is independent (pwrite-style).
#[derive(Clone)]
pub struct StorageWriter {
    file: Arc<File>,
    temp_path: PathBuf,
}

impl StorageWriter {
    /// Create from an open file and path (used by StorageWriterBuilder).
    pub(crate) fn from_file_and_path(file: File, temp_path: PathBuf) -> Self {
        Self {
            file: Arc::new(file),
            temp_path,
        }
    }

    /// Open an existing `.partial` file for resume (read+write, no truncation)
    /// and resize it to `size` bytes.
    pub fn open_existing(temp_path: &Path, size: u64) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .open(temp_path)
            .with_context(|| format!("failed to open partial file: {}", temp_path.display()))?;
        let len = file.metadata().context("stat partial file")?.len();
        if len != size {
            tracing::debug!(
                path = %temp_path.display(),
                len,
                size,
                "resizing partial file"
            );
            file.set_len(size).context("failed to resize partial file")?;
        }
        Ok(StorageWriter {
            file: Arc::new(file),
            temp_path: temp_path.to_path_buf(),
        })
    }

    /// Write all of `data` at `offset`. Positional: the shared handle's cursor
    /// is never relied on, so disjoint writes from several threads are safe.
    pub fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        positional::write_all_at(&self.file, data, offset)
    }

    /// Read exactly `buf.len()` bytes at `offset`. Fails with `UnexpectedEof`
    /// if the file is shorter.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        positional::read_exact_at(&self.file, buf, offset)
    }

    /// Sync file data to disk. Call before `finalize` for durability.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all().context("storage sync failed")?;
        Ok(())
    }

    /// Path to the current `.partial` file.
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Rename the `.partial` file to the final path. Consumes the writer and closes the file.
    pub fn finalize(self, final_path: &Path) -> Result<()> {
        let temp_path = self.temp_path.clone();
        drop(self.file);

        std::fs::rename(&temp_path, final_path).with_context(|| {
            format!(
                "failed to rename {} to {}",
                temp_path.display(),
                final_path.display()
            )
        })?;
        Ok(())
    }
}

#[cfg(unix)]
pub(super) mod positional {
    use std::fs::File;
    use std::io;
    use std::os::unix::fs::FileExt;

    pub(in crate::storage) fn write_all_at(file: &File, data: &[u8], offset: u64) -> io::Result<()> {
        file.write_all_at(data, offset)
    }

    pub(in crate::storage) fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
        file.read_exact_at(buf, offset)
    }
}

#[cfg(windows)]
pub(super) mod positional {
    use std::fs::File;
    use std::io;
    use std::os::windows::fs::FileExt;

    // seek_write/seek_read take the offset per call; a short write resumes
    // at the advanced offset.
    pub(in crate::storage) fn write_all_at(file: &File, mut data: &[u8], mut offset: u64) -> io::Result<()> {
        while !data.is_empty() {
            match file.seek_write(data, offset) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(n) => {
                    data = &data[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    pub(in crate::storage) fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
        while !buf.is_empty() {
            match file.seek_read(buf, offset) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
                Ok(n) => {
                    buf = &mut buf[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

#[cfg(not(any(unix, windows)))]
pub(super) mod positional {
    use std::fs::File;
    use std::io::{self, Read, Seek, SeekFrom, Write};
    use std::sync::Mutex;

    // No positional I/O here: seek and transfer must happen under one lock.
    static CURSOR: Mutex<()> = Mutex::new(());

    pub(in crate::storage) fn write_all_at(file: &File, data: &[u8], offset: u64) -> io::Result<()> {
        let _guard = CURSOR.lock().unwrap_or_else(|p| p.into_inner());
        let mut f = file;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(data)
    }

    pub(in crate::storage) fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
        let _guard = CURSOR.lock().unwrap_or_else(|p| p.into_inner());
        let mut f = file;
        f.seek(SeekFrom::Start(offset))?;
        f.read_exact(buf)
    }
}
