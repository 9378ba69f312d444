//! Resume decisions made when a producer is constructed.

use anyhow::Result;

use super::SegmentProducer;
use crate::checksum::{md5_path, md5_storage_range};
use crate::segmenter::IntervalSet;
use crate::state;
use crate::stream::DownloadStream;

impl SegmentProducer {
    pub(super) fn recover(&mut self, stream: &mut DownloadStream) -> Result<()> {
        let completed = match state::load(&self.state_path) {
            Ok(Some(set)) if set.extends_beyond(self.size) => {
                tracing::warn!(
                    path = %self.state_path.display(),
                    size = self.size,
                    "state extends past the remote size; restarting"
                );
                return self.start_fresh(stream);
            }
            Ok(Some(set)) => set,
            Ok(None) => {
                tracing::debug!(name = %self.name, "no previous state");
                return self.start_fresh(stream);
            }
            Err(e) => {
                tracing::warn!("unusable state file, restarting: {:#}", e);
                return self.start_fresh(stream);
            }
        };

        if stream.path().exists() {
            self.completed = completed;
            if self.final_file_is_complete(stream) {
                tracing::info!(name = %self.name, "found complete download");
                self.work_pool = IntervalSet::new();
                self.done = true;
                return Ok(());
            }
            tracing::warn!(name = %self.name, "existing file is incomplete; restarting");
            return self.start_fresh(stream);
        }

        if stream.temp_path().exists() {
            if let Err(e) = stream.open_partial() {
                tracing::warn!("cannot reopen partial file, restarting: {:#}", e);
                return self.start_fresh(stream);
            }
            self.completed = completed;
            if stream.options().check_segment_md5sums {
                self.validate_segment_md5sums(stream);
            }
            self.work_pool = self.completed.remaining(self.size);
            if self.work_pool.is_empty() {
                if self.completed.total_bytes() != self.size {
                    tracing::warn!(name = %self.name, "state disagrees with size; restarting");
                    return self.start_fresh(stream);
                }
                self.done = true;
            }
            tracing::info!(
                name = %self.name,
                done_bytes = self.completed.total_bytes(),
                remaining = self.work_pool.total_bytes(),
                "resuming"
            );
            return Ok(());
        }

        tracing::info!(name = %self.name, "state found but no file on disk; restarting");
        self.start_fresh(stream)
    }

    fn final_file_is_complete(&self, stream: &DownloadStream) -> bool {
        if self.completed.total_bytes() != self.size {
            return false;
        }
        let path = stream.path();
        match std::fs::metadata(&path) {
            Ok(m) if m.len() == self.size => {}
            _ => return false,
        }
        match stream.md5sum() {
            Some(expected) if stream.options().check_file_md5sum => md5_path(&path)
                .map(|actual| actual == expected)
                .unwrap_or(false),
            _ => true,
        }
    }

    fn start_fresh(&mut self, stream: &mut DownloadStream) -> Result<()> {
        self.completed = IntervalSet::new();
        self.work_pool = IntervalSet::full(self.size);
        self.done = false;
        stream.setup_file()
    }

    /// Re-hash every completed interval from the `.partial` file and evict
    /// the ones whose bytes do not match their recorded md5. Intervals with
    /// no recorded md5, or that cannot be read back, are evicted too.
    ///
    /// Returns the number of intervals evicted.
    pub fn validate_segment_md5sums(&mut self, stream: &DownloadStream) -> usize {
        let storage = match stream.storage() {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("cannot re-check segments: {}", e);
                let n = self.completed.len();
                self.completed = IntervalSet::new();
                return n;
            }
        };
        let mut evicted = 0;
        for interval in self.completed.to_vec() {
            let ok = match &interval.md5sum {
                None => false,
                Some(expected) => {
                    match md5_storage_range(storage, interval.begin..interval.end) {
                        Ok(actual) => actual == *expected,
                        Err(e) => {
                            tracing::debug!(begin = interval.begin, "segment read failed: {}", e);
                            false
                        }
                    }
                }
            };
            if !ok {
                tracing::warn!(
                    begin = interval.begin,
                    end = interval.end,
                    "segment failed md5 check; will refetch"
                );
                self.completed.remove(interval.begin);
                evicted += 1;
            }
        }
        evicted
    }
}
