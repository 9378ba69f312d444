//! Worker pool driver.
//!
//! N OS threads drain a shared `WorkQueue`, call
//! `DownloadStream::write_segment` for each item, and report every durably
//! written chunk plus one `TaskDone` per item on the completion channel.
//! Workers never touch the interval sets or the state file.

mod queue;

use anyhow::{bail, Context, Result};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::retry::{RetryPolicy, TransferError};
use crate::segmenter::Interval;
use crate::stream::DownloadStream;

pub use queue::WorkQueue;

/// Message from a worker to the scheduler.
#[derive(Debug)]
pub enum Completion {
    /// A sub-chunk is on disk (md5 set when segment hashing is enabled).
    Chunk(Interval),
    /// One dispatched work item is finished: bytes written, or the error
    /// that made the worker give up on it.
    TaskDone(Result<u64, TransferError>),
}

/// Handles of running worker threads.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `n_workers` threads pulling from `queue`.
    pub fn spawn(
        n_workers: usize,
        queue: &Arc<WorkQueue>,
        completion_tx: Sender<Completion>,
        stream: &Arc<DownloadStream>,
        policy: RetryPolicy,
    ) -> Result<Self> {
        let mut pool = WorkerPool {
            handles: Vec::with_capacity(n_workers),
        };
        for id in 0..n_workers.max(1) {
            let queue_w = Arc::clone(queue);
            let tx = completion_tx.clone();
            let stream = Arc::clone(stream);
            let spawned = std::thread::Builder::new()
                .name(format!("parcel-worker-{}", id))
                .spawn(move || run_worker(id, &queue_w, &tx, &stream, &policy))
                .context("spawn worker thread");
            match spawned {
                Ok(handle) => pool.handles.push(handle),
                Err(e) => {
                    pool.shutdown(queue)?;
                    return Err(e);
                }
            }
        }
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Push one sentinel per worker and wait for every thread to exit.
    pub fn shutdown(self, queue: &WorkQueue) -> Result<()> {
        for _ in 0..self.handles.len() {
            queue.submit(None);
        }
        self.join()
    }

    fn join(self) -> Result<()> {
        let mut panicked = 0usize;
        for handle in self.handles {
            if handle.join().is_err() {
                panicked += 1;
            }
        }
        if panicked > 0 {
            bail!("{} worker thread(s) panicked", panicked);
        }
        Ok(())
    }
}

fn run_worker(
    id: usize,
    queue: &WorkQueue,
    tx: &Sender<Completion>,
    stream: &DownloadStream,
    policy: &RetryPolicy,
) {
    let _span = stream.span().enter();
    loop {
        let Some(interval) = queue.pop() else {
            tracing::debug!(worker = id, "work queue drained");
            break;
        };
        if stream.is_cancelled() {
            let _ = tx.send(Completion::TaskDone(Err(TransferError::Cancelled)));
            break;
        }
        let (begin, end) = (interval.begin, interval.end);
        let result = stream.write_segment(interval, tx, policy);
        let failed = match &result {
            Ok(_) => false,
            Err(e) => {
                tracing::error!(worker = id, begin, end, "segment failed: {}", e);
                true
            }
        };
        if tx.send(Completion::TaskDone(result)).is_err() || failed {
            break;
        }
    }
}
