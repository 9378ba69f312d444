//! Transfer stream: one logical file download.
//!
//! Resolves remote metadata, owns the local paths and the `.partial` file,
//! and performs ranged segment writes with retry-on-remainder. The network is
//! reached only through the injected `Transport`.

mod segment;
mod single;
mod validate;

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::control::CancelToken;
use crate::retry::TransferError;
use crate::state::STATE_SUFFIX;
use crate::storage::{self, StorageWriter, StorageWriterBuilder};
use crate::transport::{self, Transport};
use crate::url_model;

/// Default bytes buffered per chunk before a positional write.
pub const DEFAULT_HTTP_CHUNK_SIZE: usize = 1024 * 1024;

/// Name of the per-item directory holding state files.
pub const STATE_DIR_NAME: &str = "logs";

/// Per-stream behavior switches.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Bytes buffered before each positional write and md5 report.
    pub http_chunk_size: usize,
    /// Hash every written chunk and re-check hashes on resume.
    pub check_segment_md5sums: bool,
    /// Verify the finished file against the remote md5.
    pub check_file_md5sum: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            http_chunk_size: DEFAULT_HTTP_CHUNK_SIZE,
            check_segment_md5sums: true,
            check_file_md5sum: true,
        }
    }
}

pub struct DownloadStream {
    url: String,
    directory: PathBuf,
    token: Option<String>,
    transport: Arc<dyn Transport>,
    options: StreamOptions,
    cancel: CancelToken,
    span: tracing::Span,
    name: String,
    size: Option<u64>,
    md5sum: Option<String>,
    is_regular_file: bool,
    storage: Option<StorageWriter>,
}

impl DownloadStream {
    /// A stream for `url` downloading into `<base_directory>/<item id>`.
    pub fn new(
        url: &str,
        base_directory: &Path,
        token: Option<String>,
        transport: Arc<dyn Transport>,
        options: StreamOptions,
        cancel: CancelToken,
    ) -> Self {
        let directory = base_directory.join(url_model::item_directory_name(url));
        Self::with_directory(url, directory, token, transport, options, cancel)
    }

    /// A stream writing directly into `directory` (used for related files).
    pub fn with_directory(
        url: &str,
        directory: PathBuf,
        token: Option<String>,
        transport: Arc<dyn Transport>,
        options: StreamOptions,
        cancel: CancelToken,
    ) -> Self {
        Self {
            url: url.to_string(),
            span: tracing::info_span!("transfer", url = %url),
            directory,
            token,
            transport,
            options,
            cancel,
            name: url_model::DEFAULT_FILENAME.to_string(),
            size: None,
            md5sum: None,
            is_regular_file: true,
            storage: None,
        }
    }

    /// Ask the remote for size, name and md5, then create the item and
    /// state directories.
    pub fn init(&mut self) -> Result<(), TransferError> {
        let meta = self.transport.head(&self.url, &self.headers())?;
        self.name = url_model::output_filename(meta.content_disposition.as_deref());
        self.size = meta.size;
        self.md5sum = meta.content_md5;
        if self.size.is_none() {
            tracing::warn!(
                parent: &self.span,
                "no Content-Length; whole-file md5 check disabled for this download"
            );
            self.options.check_file_md5sum = false;
        }
        tracing::info!(
            parent: &self.span,
            name = %self.name,
            size = ?self.size,
            md5 = ?self.md5sum,
            "resolved remote metadata"
        );
        std::fs::create_dir_all(self.state_directory()).map_err(TransferError::Storage)?;
        Ok(())
    }

    /// Use `md5sum` as the reference hash when the HEAD did not provide one.
    pub fn set_md5sum_if_missing(&mut self, md5sum: Option<String>) {
        if self.md5sum.is_none() {
            self.md5sum = md5sum;
        }
    }

    /// Create (truncating) the `.partial` file and try to reserve its full size.
    ///
    /// A failed reservation is logged and the file is still used; a path that
    /// is not a regular file is remembered so whole-file checks can refuse it.
    pub fn setup_file(&mut self) -> Result<()> {
        let temp = self.temp_path();
        let mut builder = StorageWriterBuilder::create(&temp)?;
        if let Some(size) = self.size {
            if let Err(e) = builder.preallocate(size) {
                tracing::warn!(
                    parent: &self.span,
                    path = %temp.display(),
                    "could not reserve {} bytes ({:#}); writing without preallocation",
                    size,
                    e
                );
            }
        }
        self.is_regular_file = builder.is_regular_file();
        self.storage = Some(builder.build());
        Ok(())
    }

    /// Reopen an existing `.partial` file for resume.
    pub fn open_partial(&mut self) -> Result<()> {
        let size = self
            .size
            .ok_or_else(|| anyhow!("cannot resume {} without a known size", self.url))?;
        let temp = self.temp_path();
        let writer = StorageWriter::open_existing(&temp, size)?;
        self.is_regular_file = std::fs::metadata(&temp)
            .map(|m| m.file_type().is_file())
            .unwrap_or(false);
        self.storage = Some(writer);
        Ok(())
    }

    /// Sync and rename `.partial` to the final name (no-op when nothing was opened).
    pub fn finalize(&mut self) -> Result<()> {
        let Some(storage) = self.storage.take() else {
            return Ok(());
        };
        storage.sync()?;
        let path = self.path();
        storage
            .finalize(&path)
            .with_context(|| format!("finalize {}", self.name))?;
        tracing::info!(parent: &self.span, path = %path.display(), "download complete");
        Ok(())
    }

    fn headers(&self) -> HashMap<String, String> {
        transport::auth_headers(self.token.as_deref())
    }

    pub(crate) fn storage(&self) -> Result<&StorageWriter, TransferError> {
        self.storage.as_ref().ok_or_else(|| {
            TransferError::Storage(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "output file was not set up",
            ))
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn md5sum(&self) -> Option<&str> {
        self.md5sum.as_deref()
    }

    pub fn options(&self) -> &StreamOptions {
        &self.options
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_regular_file(&self) -> bool {
        self.is_regular_file
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Final output path: `<directory>/<name>`.
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.name)
    }

    /// In-progress path: `<directory>/<name>.partial`.
    pub fn temp_path(&self) -> PathBuf {
        storage::temp_path(&self.path())
    }

    /// `<directory>/logs`.
    pub fn state_directory(&self) -> PathBuf {
        self.directory.join(STATE_DIR_NAME)
    }

    /// `<directory>/logs/<name>.parcel`.
    pub fn state_path(&self) -> PathBuf {
        self.state_directory()
            .join(format!("{}{}", self.name, STATE_SUFFIX))
    }
}

#[cfg(test)]
mod tests;
