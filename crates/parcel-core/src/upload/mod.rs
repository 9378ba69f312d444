//! Uploads to the submission API.
//!
//! Files smaller than a part (or all files with multipart off) go up in one
//! PUT after a `_dry_run` PUT. Larger files use an S3-style multipart upload:
//! initiate, list the parts the store already has, PUT the missing ones from
//! a worker pool, retry whatever is still missing once, then complete. Every
//! request goes through the `Transport` seam with the same `RetryPolicy` as
//! downloads. A failed file keeps its upload id so a later run can resume it.

mod manifest;
mod multipart;

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::checksum::{md5_path, normalize_md5_hex};
use crate::control::CancelToken;
use crate::retry::{ErrorKind, RetryDecision, RetryPolicy, TransferError};
use crate::scheduler::{ProgressSender, ProgressStats};
use crate::storage::SourceFile;
use crate::transport::{self, Method, Request, Response, Transport};
use crate::worker::WorkQueue;

pub use manifest::{
    load_upload_manifest, parse_upload_manifest, resume_path, save_upload_manifest, UploadEntry,
};
pub use multipart::{part_size, plan_parts, submission_url, PartSpec, MIN_PART_SIZE, PAGE_SIZE};

#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// API server hosting `/v0/submission`.
    pub server: String,
    /// Sent as `X-Auth-Token`.
    pub token: Option<String>,
    /// Parallel part uploads per file.
    pub n_workers: usize,
    /// Requested part size; see `part_size`.
    pub part_size: u64,
    pub multipart: bool,
    pub retry_policy: RetryPolicy,
    /// Stop at the first failing file and return its error.
    pub debug: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            server: "https://api.gdc.cancer.gov".to_string(),
            token: None,
            n_workers: 8,
            part_size: MIN_PART_SIZE,
            multipart: true,
            retry_policy: RetryPolicy::default(),
            debug: false,
        }
    }
}

/// Outcome of `UploadClient::upload` (or `abort` / `delete`).
#[derive(Debug, Default)]
pub struct UploadReport {
    /// File ids handled successfully, in order.
    pub done: Vec<String>,
    /// Failed file ids with their error message.
    pub errors: BTreeMap<String, String>,
    /// Entries still to upload, carrying any multipart upload id.
    pub incomplete: Vec<UploadEntry>,
}

impl UploadReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Write the unfinished entries to `path`, or remove `path` when nothing
    /// is left.
    pub fn save_resume(&self, path: &Path) -> Result<()> {
        if self.incomplete.is_empty() {
            match std::fs::remove_file(path) {
                Ok(()) => tracing::info!(path = %path.display(), "removed resume file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("remove {}", path.display()));
                }
            }
            return Ok(());
        }
        save_upload_manifest(path, &self.incomplete)?;
        tracing::warn!(
            path = %path.display(),
            files = self.incomplete.len(),
            "saved unfinished uploads"
        );
        Ok(())
    }
}

pub struct UploadClient {
    transport: Arc<dyn Transport>,
    options: UploadOptions,
    cancel: CancelToken,
    progress: Option<ProgressSender>,
}

impl UploadClient {
    pub fn new(transport: Arc<dyn Transport>, options: UploadOptions) -> Self {
        Self {
            transport,
            options,
            cancel: CancelToken::new(),
            progress: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    /// Upload every entry in order. Entries after a failure still run unless
    /// `debug` is set.
    pub fn upload(&self, entries: &[UploadEntry]) -> Result<UploadReport> {
        let mut report = UploadReport::default();
        for (i, entry) in entries.iter().enumerate() {
            if self.cancel.is_cancelled() {
                report.incomplete.extend(entries[i..].iter().cloned());
                for rest in &entries[i..] {
                    report
                        .errors
                        .insert(rest.id.clone(), TransferError::Cancelled.to_string());
                }
                break;
            }
            let mut entry = entry.clone();
            match self.upload_one(&mut entry) {
                Ok(()) => {
                    tracing::info!(id = %entry.id, "upload finished");
                    report.done.push(entry.id.clone());
                }
                Err(e) => {
                    tracing::error!(id = %entry.id, "upload failed: {:#}", e);
                    report.errors.insert(entry.id.clone(), format!("{:#}", e));
                    report.incomplete.push(entry);
                    if self.options.debug {
                        return Err(e);
                    }
                }
            }
        }
        tracing::info!(
            uploaded = report.done.len(),
            failed = report.errors.len(),
            "uploads finished"
        );
        Ok(report)
    }

    /// Abort the multipart upload named by each entry's `upload_id`.
    pub fn abort(&self, entries: &[UploadEntry]) -> Result<UploadReport> {
        self.for_each(entries, |entry| {
            let upload_id = entry
                .upload_id
                .as_deref()
                .with_context(|| format!("file {} has no upload id to abort", entry.id))?;
            let url = submission_url(&self.options.server, &entry.project_id, &entry.id)?;
            let response =
                self.send_once(Method::Delete, multipart::upload_id_url(&url, upload_id)?)?;
            match response.status {
                204 | 404 => {
                    tracing::warn!(id = %entry.id, upload_id, "aborted multipart upload");
                    Ok(())
                }
                status => bail!(
                    "failed to abort upload {}: HTTP {} {}",
                    upload_id,
                    status,
                    String::from_utf8_lossy(&response.body)
                ),
            }
        })
    }

    /// Delete each entry's stored object.
    pub fn delete(&self, entries: &[UploadEntry]) -> Result<UploadReport> {
        self.for_each(entries, |entry| {
            let url = submission_url(&self.options.server, &entry.project_id, &entry.id)?;
            let response = self.send_once(Method::Delete, url)?;
            if response.status != 204 {
                bail!(
                    "failed to delete file {}: HTTP {} {}",
                    entry.id,
                    response.status,
                    String::from_utf8_lossy(&response.body)
                );
            }
            tracing::info!(id = %entry.id, "deleted file");
            Ok(())
        })
    }

    fn for_each(
        &self,
        entries: &[UploadEntry],
        mut action: impl FnMut(&UploadEntry) -> Result<()>,
    ) -> Result<UploadReport> {
        let mut report = UploadReport::default();
        for entry in entries {
            match action(entry) {
                Ok(()) => report.done.push(entry.id.clone()),
                Err(e) => {
                    tracing::warn!(id = %entry.id, "{:#}", e);
                    if self.options.debug {
                        return Err(e);
                    }
                    report.errors.insert(entry.id.clone(), format!("{:#}", e));
                }
            }
        }
        Ok(report)
    }

    fn upload_one(&self, entry: &mut UploadEntry) -> Result<()> {
        let path = entry.source_path()?;
        let source = SourceFile::open(&path)?;
        if let Some(expected) = entry.file_size {
            if expected != source.len() {
                bail!(
                    "{} is {} bytes but the manifest says {}",
                    path.display(),
                    source.len(),
                    expected
                );
            }
        }
        if let Some(expected) = entry.md5sum.as_deref().and_then(normalize_md5_hex) {
            let actual = md5_path(&path)?;
            if actual != expected {
                bail!(
                    "md5 of {} is {} but the manifest says {}",
                    path.display(),
                    actual,
                    expected
                );
            }
        }

        let url = submission_url(&self.options.server, &entry.project_id, &entry.id)?;
        let part_size = part_size(self.options.part_size);
        tracing::info!(id = %entry.id, url = %url, size = source.len(), "uploading");
        if !self.options.multipart || source.len() < part_size {
            self.simple_upload(&url, &source)
        } else {
            self.multipart_upload(&url, &source, part_size, entry)
        }
    }

    fn simple_upload(&self, url: &str, source: &SourceFile) -> Result<()> {
        self.send_with_retry(&Request::new(
            Method::Put,
            format!("{}/_dry_run", url),
            self.headers(),
        ))
        .context("upload rejected by dry run")?;

        let body = source
            .read_range(0, source.len() as usize)
            .map_err(TransferError::Storage)?;
        self.send_with_retry(&Request::new(Method::Put, url, self.headers()).body(&body))
            .context("upload failed")?;
        self.report_progress(source, source.len(), 0, 1, 1, Instant::now());
        Ok(())
    }

    fn multipart_upload(
        &self,
        url: &str,
        source: &SourceFile,
        part_size: u64,
        entry: &mut UploadEntry,
    ) -> Result<()> {
        let upload_id = match entry.upload_id.clone() {
            Some(id) => {
                tracing::info!(id = %entry.id, upload_id = %id, "resuming multipart upload");
                id
            }
            None => {
                let response = self
                    .send_with_retry(&Request::new(
                        Method::Post,
                        multipart::initiate_url(url)?,
                        self.headers(),
                    ))
                    .context("failed to initiate multipart upload")?;
                let id = multipart::parse_upload_id(&response.body)?;
                tracing::info!(id = %entry.id, upload_id = %id, "started multipart upload");
                entry.upload_id = Some(id.clone());
                id
            }
        };

        let upload_url = multipart::upload_id_url(url, &upload_id)?;
        let parts = plan_parts(source.len(), part_size);
        let started = Instant::now();
        let mut stored = self.list_parts(&upload_url, &upload_id)?;
        for round in 0..2 {
            let missing: Vec<PartSpec> = parts
                .iter()
                .filter(|p| !stored.contains_key(&p.number))
                .copied()
                .collect();
            if missing.is_empty() {
                break;
            }
            if round > 0 {
                tracing::warn!(missing = missing.len(), "retrying missing parts");
            }
            self.upload_parts(&upload_url, source, &parts, &stored, missing, started);
            stored = self.list_parts(&upload_url, &upload_id)?;
        }

        let completed = parts
            .iter()
            .filter(|p| stored.contains_key(&p.number))
            .count();
        if completed != parts.len() {
            if self.cancel.is_cancelled() {
                return Err(TransferError::Cancelled.into());
            }
            bail!(
                "multipart upload incomplete: {} of {} parts stored; rerun to resume",
                completed,
                parts.len()
            );
        }

        let body = multipart::complete_body(&stored)?;
        self.send_with_retry(
            &Request::new(Method::Post, upload_url, self.headers()).body(body.as_bytes()),
        )
        .context("failed to complete multipart upload")?;
        entry.upload_id = None;
        Ok(())
    }

    /// Parts the store holds for `upload_id`. The store may not list a fresh
    /// upload right away, so only 400 and 403 end the wait early.
    fn list_parts(&self, upload_url: &str, upload_id: &str) -> Result<BTreeMap<u32, String>> {
        let request = Request::new(Method::Get, upload_url, self.headers());
        let mut attempt = 1;
        loop {
            if self.cancel.is_cancelled() {
                return Err(TransferError::Cancelled.into());
            }
            let error = match self.transport.send(&request) {
                Ok(response) if response.status == 200 => {
                    return multipart::parse_parts(&response.body);
                }
                Ok(response) if matches!(response.status, 400 | 403) => {
                    bail!(
                        "cannot list parts of upload {}: HTTP {} {}",
                        upload_id,
                        response.status,
                        String::from_utf8_lossy(&response.body)
                    );
                }
                Ok(response) => TransferError::Http(response.status),
                Err(e) => e,
            };
            match self.options.retry_policy.decide(attempt, ErrorKind::Transient) {
                RetryDecision::RetryAfter(delay) => {
                    tracing::debug!(upload_id, attempt, "parts not listed yet: {}", error);
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                RetryDecision::NoRetry => {
                    return Err(error)
                        .with_context(|| format!("cannot find multipart upload {}", upload_id));
                }
            }
        }
    }

    /// PUT `missing` from a pool of scoped threads. Failures are logged; the
    /// caller finds them in the next listing.
    fn upload_parts(
        &self,
        upload_url: &str,
        source: &SourceFile,
        parts: &[PartSpec],
        stored: &BTreeMap<u32, String>,
        missing: Vec<PartSpec>,
        started: Instant,
    ) {
        let queue: WorkQueue<PartSpec> = WorkQueue::new();
        let n_workers = self.options.n_workers.clamp(1, missing.len().max(1));
        for part in missing {
            queue.submit(Some(part));
        }
        for _ in 0..n_workers {
            queue.submit(None);
        }

        let at_start: u64 = parts
            .iter()
            .filter(|p| stored.contains_key(&p.number))
            .map(|p| p.len)
            .sum();
        let bytes_done = AtomicU64::new(at_start);
        let parts_done = AtomicU64::new(stored.len() as u64);
        let total_parts = parts.len() as u64;

        std::thread::scope(|scope| {
            for _ in 0..n_workers {
                scope.spawn(|| {
                    while let Some(part) = queue.pop() {
                        if self.cancel.is_cancelled() {
                            continue;
                        }
                        match self.upload_part(upload_url, source, part) {
                            Ok(()) => {
                                tracing::debug!(part = part.number, "part uploaded");
                                let done =
                                    bytes_done.fetch_add(part.len, Ordering::Relaxed) + part.len;
                                let n = parts_done.fetch_add(1, Ordering::Relaxed) + 1;
                                self.report_progress(source, done, at_start, n, total_parts, started);
                            }
                            Err(e) => {
                                tracing::warn!(part = part.number, "part upload failed: {}", e);
                            }
                        }
                    }
                });
            }
        });
    }

    fn upload_part(
        &self,
        upload_url: &str,
        source: &SourceFile,
        part: PartSpec,
    ) -> Result<(), TransferError> {
        let body = source
            .read_range(part.offset, part.len as usize)
            .map_err(TransferError::Storage)?;
        let url = multipart::part_url(upload_url, part.number);
        self.send_with_retry(&Request::new(Method::Put, url, self.headers()).body(&body))?;
        Ok(())
    }

    /// `send` until a 2xx, retrying the way segment downloads do.
    fn send_with_retry(&self, request: &Request<'_>) -> Result<Response, TransferError> {
        let mut attempt = 1;
        loop {
            if self.cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }
            let error = match self
                .transport
                .send(request)
                .and_then(Response::error_for_status)
            {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };
            match self.options.retry_policy.decide(attempt, error.kind()) {
                RetryDecision::RetryAfter(delay) => {
                    tracing::warn!(
                        url = %request.url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "request failed, retrying: {}",
                        error
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                RetryDecision::NoRetry => return Err(error),
            }
        }
    }

    fn send_once(&self, method: Method, url: String) -> Result<Response> {
        Ok(self.transport.send(&Request::new(method, url, self.headers()))?)
    }

    fn headers(&self) -> std::collections::HashMap<String, String> {
        transport::auth_headers(self.options.token.as_deref())
    }

    fn report_progress(
        &self,
        source: &SourceFile,
        bytes_done: u64,
        bytes_at_start: u64,
        tasks_done: u64,
        task_count: u64,
        started: Instant,
    ) {
        let Some(tx) = &self.progress else {
            return;
        };
        let name: Arc<str> = source
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
            .into();
        let _ = tx.try_send(ProgressStats {
            name,
            bytes_done,
            bytes_at_start,
            total_bytes: source.len(),
            elapsed_secs: started.elapsed().as_secs_f64(),
            tasks_done,
            task_count,
        });
    }
}
