//! Whole-body download for items whose size is unknown.

use super::DownloadStream;
use crate::retry::TransferError;

impl DownloadStream {
    /// Fetch the whole body with one unranged request, writing it
    /// sequentially from offset 0.
    ///
    /// Used when the HEAD returned no `Content-Length`; there is no
    /// segmenting, no resume and no retry. Returns the bytes written.
    pub fn download_whole(&self) -> Result<u64, TransferError> {
        let storage = self.storage()?;
        let mut offset = 0u64;
        let cancel = &self.cancel;
        self.transport
            .fetch(&self.url, &self.headers(), None, &mut |data| {
                if cancel.is_cancelled() {
                    return Err(TransferError::Cancelled);
                }
                storage
                    .write_at(offset, data)
                    .map_err(TransferError::Storage)?;
                offset += data.len() as u64;
                Ok(())
            })?;
        if let Some(expected) = self.size {
            if offset != expected {
                return Err(TransferError::PartialTransfer {
                    expected,
                    received: offset,
                });
            }
        }
        tracing::debug!(parent: &self.span, bytes = offset, "whole-body download finished");
        Ok(offset)
    }
}
