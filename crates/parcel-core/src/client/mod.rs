//! Orchestrator: downloads a list of locators one after another.
//!
//! Per locator: build a `DownloadStream`, HEAD it, run a `SegmentProducer`
//! with a worker pool (or a single unranged request when the size is
//! unknown), finalize, verify, then fetch related files and annotations
//! reported by the metadata index into the item's directory. One locator's
//! failure is recorded and the next one starts; a failed side file is only a
//! warning on its item.

mod annotations;
mod permissions;

use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::control::CancelToken;
use crate::index::MetadataIndex;
use crate::retry::{RetryPolicy, TransferError};
use crate::scheduler::{ProgressSender, SegmentProducer, DEFAULT_SAVE_INTERVAL};
use crate::stream::{DownloadStream, StreamOptions};
use crate::transport::Transport;
use crate::url_model::{fix_uri, item_directory_name, last_path_segment, sibling_url};

pub use annotations::{extract_member, ANNOTATIONS_FILE};
pub use permissions::raise_for_write_permissions;

/// Files smaller than this are fetched with a single worker.
pub const DEFAULT_SINGLE_WORKER_BELOW: u64 = 1024 * 1024 * 1024 / 100;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Base download directory; each item gets a subdirectory.
    pub directory: PathBuf,
    pub n_workers: usize,
    /// Sent as `X-Auth-Token`.
    pub token: Option<String>,
    pub stream: StreamOptions,
    pub save_interval: u64,
    pub retry_policy: RetryPolicy,
    /// Also download index/metadata files that belong with each item.
    pub related_files: bool,
    /// Also write each item's `annotations.txt`.
    pub annotations: bool,
    /// Stop at the first failing locator and return its error.
    pub debug: bool,
    pub single_worker_below: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            n_workers: 8,
            token: None,
            stream: StreamOptions::default(),
            save_interval: DEFAULT_SAVE_INTERVAL,
            retry_policy: RetryPolicy::default(),
            related_files: true,
            annotations: true,
            debug: false,
            single_worker_below: DEFAULT_SINGLE_WORKER_BELOW,
        }
    }
}

/// A related file or the annotations of an item that itself downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideFileFailure {
    /// Locator of the primary item.
    pub parent: String,
    /// Related file locator (or id), or `annotations.txt`.
    pub target: String,
    pub error: String,
}

/// Outcome of `Client::download_files`.
#[derive(Debug, Default)]
pub struct DownloadReport {
    /// Locators that finished and verified, in order.
    pub downloaded: Vec<String>,
    /// Failed locators with their error message.
    pub errors: BTreeMap<String, String>,
    /// Side files that failed; their items still count as downloaded.
    pub side_file_errors: Vec<SideFileFailure>,
}

impl DownloadReport {
    /// Every requested item is on disk and verified.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Primary locators worth running again: failed items, then items with
    /// failed side files. Rerunning an item refetches its side files into its
    /// own directory.
    pub fn retry_candidates(&self) -> Vec<String> {
        let mut out: Vec<String> = self.errors.keys().cloned().collect();
        for failure in &self.side_file_errors {
            if !out.contains(&failure.parent) {
                out.push(failure.parent.clone());
            }
        }
        out
    }

    /// Fold the report of rerunning `locator` into this one. Returns true
    /// when the item and its side files are now all in place.
    pub fn merge_retry(&mut self, locator: &str, retry: DownloadReport) -> bool {
        self.side_file_errors.retain(|f| f.parent != locator);
        self.side_file_errors.extend(retry.side_file_errors);
        if retry.errors.is_empty() {
            self.errors.remove(locator);
            if !self.downloaded.iter().any(|d| d == locator) {
                self.downloaded.push(locator.to_string());
            }
        } else {
            self.errors.extend(retry.errors);
        }
        !self.errors.contains_key(locator)
            && !self.side_file_errors.iter().any(|f| f.parent == locator)
    }
}

pub struct Client {
    transport: Arc<dyn Transport>,
    options: ClientOptions,
    index: Option<Arc<dyn MetadataIndex>>,
    cancel: CancelToken,
    progress: Option<ProgressSender>,
}

impl Client {
    pub fn new(transport: Arc<dyn Transport>, options: ClientOptions) -> Self {
        Self {
            transport,
            options,
            index: None,
            cancel: CancelToken::new(),
            progress: None,
        }
    }

    pub fn with_index(mut self, index: Arc<dyn MetadataIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Download every locator in order.
    ///
    /// Fails before any request when the base directory is not writable.
    /// Otherwise per-locator errors are collected in the report, unless
    /// `debug` is set, in which case the first one is returned.
    pub fn download_files(&self, locators: &[String]) -> Result<DownloadReport> {
        raise_for_write_permissions(&self.options.directory)?;
        let mut report = DownloadReport::default();

        for locator in locators {
            if self.cancel.is_cancelled() {
                report
                    .errors
                    .insert(locator.clone(), TransferError::Cancelled.to_string());
                continue;
            }
            let url = fix_uri(locator);
            match self.download_one(&url, None) {
                Ok(()) => {
                    report.downloaded.push(locator.clone());
                    if self.options.related_files {
                        self.download_related(&url, locator, &mut report)?;
                    }
                    if self.options.annotations {
                        self.download_annotations(&url, locator, &mut report)?;
                    }
                }
                Err(e) => {
                    tracing::error!(locator = %locator, "download failed: {:#}", e);
                    if self.options.debug {
                        return Err(e);
                    }
                    report.errors.insert(locator.clone(), format!("{:#}", e));
                }
            }
        }
        tracing::info!(
            downloaded = report.downloaded.len(),
            failed = report.errors.len(),
            side_files_failed = report.side_file_errors.len(),
            "downloads finished"
        );
        Ok(report)
    }

    /// Related files go into the primary item's directory, whatever their own
    /// id is.
    fn download_related(
        &self,
        url: &str,
        locator: &str,
        report: &mut DownloadReport,
    ) -> Result<()> {
        let Some(index) = &self.index else {
            return Ok(());
        };
        let Some(id) = last_path_segment(url) else {
            return Ok(());
        };
        let related = index.related_files(&id);
        if related.is_empty() {
            return Ok(());
        }
        let directory = self.item_directory(url);
        tracing::info!(id = %id, count = related.len(), "downloading related files");
        for rid in related {
            let result = match sibling_url(url, &rid) {
                Some(related_url) => self
                    .download_one(&related_url, Some(&directory))
                    .map_err(|e| (related_url, e)),
                None => Err((rid.clone(), anyhow!("cannot build a locator for {}", rid))),
            };
            if let Err((target, e)) = result {
                self.side_file_failed(locator, target, e, report)?;
            }
        }
        Ok(())
    }

    fn download_annotations(
        &self,
        url: &str,
        locator: &str,
        report: &mut DownloadReport,
    ) -> Result<()> {
        let Some(index) = &self.index else {
            return Ok(());
        };
        let Some(id) = last_path_segment(url) else {
            return Ok(());
        };
        let ids = index.annotations(&id);
        if ids.is_empty() {
            return Ok(());
        }
        tracing::info!(id = %id, count = ids.len(), "downloading annotations");
        if let Err(e) = annotations::download_annotations(
            self.transport.as_ref(),
            url,
            self.options.token.as_deref(),
            &ids,
            &self.item_directory(url),
        ) {
            self.side_file_failed(locator, ANNOTATIONS_FILE.to_string(), e, report)?;
        }
        Ok(())
    }

    /// Logged as a warning and recorded on the item; fatal only in debug mode.
    fn side_file_failed(
        &self,
        locator: &str,
        target: String,
        error: anyhow::Error,
        report: &mut DownloadReport,
    ) -> Result<()> {
        tracing::warn!(
            locator = %locator,
            target = %target,
            "unable to download side file: {:#}",
            error
        );
        if self.options.debug {
            return Err(error);
        }
        report.side_file_errors.push(SideFileFailure {
            parent: locator.to_string(),
            target,
            error: format!("{:#}", error),
        });
        Ok(())
    }

    fn item_directory(&self, url: &str) -> PathBuf {
        self.options.directory.join(item_directory_name(url))
    }

    fn download_one(&self, url: &str, directory: Option<&Path>) -> Result<()> {
        let mut stream = match directory {
            Some(dir) => DownloadStream::with_directory(
                url,
                dir.to_path_buf(),
                self.options.token.clone(),
                Arc::clone(&self.transport),
                self.options.stream.clone(),
                self.cancel.clone(),
            ),
            None => DownloadStream::new(
                url,
                &self.options.directory,
                self.options.token.clone(),
                Arc::clone(&self.transport),
                self.options.stream.clone(),
                self.cancel.clone(),
            ),
        };
        stream.init()?;
        if let (Some(index), Some(id)) = (&self.index, last_path_segment(url)) {
            stream.set_md5sum_if_missing(index.md5sum(&id));
        }

        let mut stream = match stream.size() {
            None => {
                stream.setup_file()?;
                stream.download_whole()?;
                stream
            }
            Some(size) => {
                let n_workers = if size < self.options.single_worker_below {
                    1
                } else {
                    self.options.n_workers
                };
                let mut producer =
                    SegmentProducer::new(&mut stream, n_workers, self.options.save_interval)?;
                let shared = Arc::new(stream);
                producer.run(&shared, self.options.retry_policy, self.progress.as_ref())?;
                Arc::try_unwrap(shared)
                    .map_err(|_| anyhow!("transfer {} still in use after workers exited", url))?
            }
        };
        stream.finalize()?;
        stream.validate_whole_file()?;
        Ok(())
    }
}
