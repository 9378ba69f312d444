//! Work scheduler for one transfer.
//!
//! `SegmentProducer` recovers prior progress from the state file, partitions
//! the remaining bytes into work items, drives a `WorkerPool`, folds chunk
//! completions into the completed set and persists it periodically. It is the
//! only owner of the interval sets and the state file.

mod progress;
mod recover;

use anyhow::{anyhow, bail, Result};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::Instant;

use crate::retry::{RetryPolicy, TransferError};
use crate::segmenter::{plan_blocks, IntervalSet};
use crate::state;
use crate::stream::DownloadStream;
use crate::worker::{Completion, WorkQueue, WorkerPool};

pub use progress::ProgressStats;

/// Default number of newly completed bytes between state saves.
pub const DEFAULT_SAVE_INTERVAL: u64 = 64 * 1024 * 1024;

/// Progress sink handed to the scheduler by async consumers.
pub type ProgressSender = tokio::sync::mpsc::Sender<ProgressStats>;

pub struct SegmentProducer {
    name: Arc<str>,
    size: u64,
    n_workers: usize,
    save_interval: u64,
    state_path: PathBuf,
    work_pool: IntervalSet,
    completed: IntervalSet,
    done: bool,
}

impl SegmentProducer {
    /// Build a producer for `stream` and recover any previous progress.
    ///
    /// Leaves the stream with an open `.partial` file unless the final file
    /// is already complete. Requires a known size.
    pub fn new(stream: &mut DownloadStream, n_workers: usize, save_interval: u64) -> Result<Self> {
        let Some(size) = stream.size() else {
            bail!("{} has no known size; segmented download unavailable", stream.url());
        };
        let mut producer = SegmentProducer {
            name: stream.name().into(),
            size,
            n_workers: n_workers.max(1),
            save_interval: save_interval.max(1),
            state_path: stream.state_path(),
            work_pool: IntervalSet::new(),
            completed: IntervalSet::new(),
            done: false,
        };
        producer.recover(stream)?;
        Ok(producer)
    }

    /// True when nothing is left to fetch.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Byte ranges not yet dispatched.
    pub fn work_pool(&self) -> &IntervalSet {
        &self.work_pool
    }

    /// Byte ranges confirmed on disk.
    pub fn completed(&self) -> &IntervalSet {
        &self.completed
    }

    pub fn n_workers(&self) -> usize {
        self.n_workers
    }

    /// Cut the work pool into items and queue them lowest address first.
    /// Returns the number of items queued.
    pub fn schedule(&mut self, queue: &WorkQueue) -> u64 {
        let Some((block_size, planned)) =
            plan_blocks(self.work_pool.total_bytes(), self.n_workers)
        else {
            return 0;
        };
        let mut tasks = 0u64;
        while let Some(item) = self.work_pool.take_front(block_size) {
            queue.submit(Some(item));
            tasks += 1;
        }
        tracing::debug!(
            name = %self.name,
            block_size,
            planned,
            tasks,
            "work items queued"
        );
        tasks
    }

    /// Fold completions into the completed set until `total_tasks` items
    /// have finished or every worker has hung up. Returns the first worker
    /// error, if any.
    pub fn wait_for_completion(
        &mut self,
        rx: &Receiver<Completion>,
        total_tasks: u64,
        progress: Option<&ProgressSender>,
    ) -> Option<TransferError> {
        let started = Instant::now();
        let bytes_at_start = self.completed.total_bytes();
        let mut bytes_done = bytes_at_start;
        let mut tasks_done = 0u64;
        let mut since_save = 0u64;
        let mut first_err = None;

        while tasks_done < total_tasks {
            let Ok(msg) = rx.recv() else {
                tracing::debug!(name = %self.name, "all workers hung up");
                break;
            };
            match msg {
                Completion::Chunk(interval) => {
                    since_save += interval.len();
                    bytes_done += interval.len();
                    self.completed.add(interval);
                    if since_save >= self.save_interval {
                        // save() logs its own failure; keep going either way.
                        let _ = self.flush();
                        since_save = 0;
                    }
                }
                Completion::TaskDone(result) => {
                    tasks_done += 1;
                    if let Err(e) = result {
                        first_err.get_or_insert(e);
                    }
                }
            }
            if let Some(tx) = progress {
                let _ = tx.try_send(ProgressStats {
                    name: Arc::clone(&self.name),
                    bytes_done,
                    bytes_at_start,
                    total_bytes: self.size,
                    elapsed_secs: started.elapsed().as_secs_f64(),
                    tasks_done,
                    task_count: total_tasks,
                });
            }
        }
        first_err
    }

    /// Persist the completed set.
    pub fn flush(&self) -> Result<()> {
        state::save(&self.completed, &self.state_path)
    }

    /// Schedule, run a worker pool over `stream` and wait for it to finish.
    ///
    /// The state file is always flushed before returning. Fails with the
    /// first worker error when the completed set does not cover the file.
    pub fn run(
        &mut self,
        stream: &Arc<DownloadStream>,
        policy: RetryPolicy,
        progress: Option<&ProgressSender>,
    ) -> Result<()> {
        if self.done {
            tracing::info!(name = %self.name, "already complete; nothing to download");
            return Ok(());
        }
        let queue: Arc<WorkQueue> = Arc::new(WorkQueue::new());
        let total_tasks = self.schedule(&queue);
        let (tx, rx) = mpsc::channel();
        let pool = WorkerPool::spawn(self.n_workers, &queue, tx, stream, policy)?;
        tracing::info!(
            name = %self.name,
            workers = pool.len(),
            tasks = total_tasks,
            "download started"
        );

        let first_err = self.wait_for_completion(&rx, total_tasks, progress);
        let joined = pool.shutdown(&queue);
        for msg in rx.try_iter() {
            if let Completion::Chunk(interval) = msg {
                self.completed.add(interval);
            }
        }
        let _ = self.flush();
        joined?;

        if self.completed.total_bytes() != self.size {
            return Err(match first_err {
                Some(e) => anyhow::Error::new(e),
                None => anyhow!(
                    "incomplete transfer of {}: {} of {} bytes on disk",
                    self.name,
                    self.completed.total_bytes(),
                    self.size
                ),
            });
        }
        self.done = true;
        Ok(())
    }
}
