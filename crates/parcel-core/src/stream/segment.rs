//! Ranged segment writes with retry-on-remainder.

use std::sync::mpsc::Sender;

use super::DownloadStream;
use crate::checksum::md5_hex;
use crate::control::CancelToken;
use crate::retry::{RetryDecision, RetryPolicy, TransferError};
use crate::segmenter::Interval;
use crate::storage::StorageWriter;
use crate::worker::Completion;

impl DownloadStream {
    /// Download `interval` into the `.partial` file.
    ///
    /// The body is buffered into `http_chunk_size` chunks; each chunk is
    /// written at its absolute offset and reported as `Completion::Chunk`
    /// (md5-tagged when segment hashing is enabled) before the next one is
    /// started. A failed or short request is retried for the unwritten
    /// remainder only. Bytes past the end of `interval` are never written.
    ///
    /// Returns the number of bytes written for this interval.
    pub fn write_segment(
        &self,
        interval: Interval,
        tx: &Sender<Completion>,
        policy: &RetryPolicy,
    ) -> Result<u64, TransferError> {
        let storage = self.storage()?;
        let headers = self.headers();
        let mut current = interval;
        let mut total = 0u64;
        let mut attempt = 1u32;

        loop {
            if self.is_cancelled() {
                return Err(TransferError::Cancelled);
            }
            let mut sink = ChunkSink::new(
                storage,
                &current,
                self.options.http_chunk_size,
                self.options.check_segment_md5sums,
                tx,
                &self.cancel,
            );
            let fetched = self.transport.fetch(
                &self.url,
                &headers,
                Some(current.range()),
                &mut |data| sink.push(data),
            );
            if sink.storage_failed {
                return Err(fetched.err().unwrap_or_else(|| {
                    TransferError::Storage(std::io::Error::other("chunk write failed"))
                }));
            }
            sink.flush()?;
            total += sink.written;

            let failure = match fetched {
                Ok(()) if sink.received == sink.expected => None,
                Ok(()) => Some(TransferError::PartialTransfer {
                    expected: sink.expected,
                    received: sink.received,
                }),
                Err(TransferError::OverlongTransfer { expected }) => {
                    tracing::warn!(
                        begin = current.begin,
                        expected,
                        "server sent more than requested; excess discarded"
                    );
                    None
                }
                Err(TransferError::Cancelled) => return Err(TransferError::Cancelled),
                Err(e) => Some(e),
            };

            let Some(rest) = current.remainder_after(sink.written) else {
                if let Some(e) = failure {
                    tracing::debug!(begin = current.begin, "error after full body: {}", e);
                }
                return Ok(total);
            };
            let err = failure.unwrap_or(TransferError::PartialTransfer {
                expected: sink.expected,
                received: sink.received,
            });

            match policy.decide(attempt, err.kind()) {
                RetryDecision::NoRetry => return Err(err),
                RetryDecision::RetryAfter(delay) => {
                    tracing::warn!(
                        attempt,
                        begin = rest.begin,
                        end = rest.end,
                        "retrying remainder in {:?}: {}",
                        delay,
                        err
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                    current = rest;
                }
            }
        }
    }
}

/// Receives body bytes for one request, buffering them into chunks.
struct ChunkSink<'a> {
    storage: &'a StorageWriter,
    tx: &'a Sender<Completion>,
    cancel: &'a CancelToken,
    begin: u64,
    expected: u64,
    received: u64,
    written: u64,
    buf: Vec<u8>,
    chunk_size: usize,
    hash: bool,
    storage_failed: bool,
}

impl<'a> ChunkSink<'a> {
    fn new(
        storage: &'a StorageWriter,
        interval: &Interval,
        chunk_size: usize,
        hash: bool,
        tx: &'a Sender<Completion>,
        cancel: &'a CancelToken,
    ) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            storage,
            tx,
            cancel,
            begin: interval.begin,
            expected: interval.len(),
            received: 0,
            written: 0,
            buf: Vec::with_capacity(chunk_size.min(interval.len() as usize)),
            chunk_size,
            hash,
            storage_failed: false,
        }
    }

    fn push(&mut self, data: &[u8]) -> Result<(), TransferError> {
        if self.cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        let room = (self.expected - self.received) as usize;
        let take = data.len().min(room);
        let mut rest = &data[..take];
        while !rest.is_empty() {
            let n = rest.len().min(self.chunk_size - self.buf.len());
            self.buf.extend_from_slice(&rest[..n]);
            self.received += n as u64;
            rest = &rest[n..];
            if self.buf.len() == self.chunk_size {
                self.flush()?;
            }
        }
        if data.len() > room {
            return Err(TransferError::OverlongTransfer {
                expected: self.expected,
            });
        }
        Ok(())
    }

    /// Write buffered bytes and report them.
    fn flush(&mut self) -> Result<(), TransferError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let offset = self.begin + self.written;
        if let Err(e) = self.storage.write_at(offset, &self.buf) {
            self.storage_failed = true;
            return Err(TransferError::Storage(e));
        }
        let len = self.buf.len() as u64;
        let md5sum = self.hash.then(|| md5_hex(&self.buf));
        self.buf.clear();
        self.written += len;
        self.tx
            .send(Completion::Chunk(Interval::with_md5(offset, offset + len, md5sum)))
            .map_err(|_| TransferError::Cancelled)
    }
}
