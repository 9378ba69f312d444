//! Whole-file md5 verification.

use super::DownloadStream;
use crate::checksum::md5_path;
use crate::retry::TransferError;

impl DownloadStream {
    /// Compare the finished file's md5 against the reference hash.
    ///
    /// Skipped when file checking is off (always the case for unknown sizes).
    /// Refuses non-regular files and fails when there is no reference hash.
    pub fn validate_whole_file(&self) -> Result<(), TransferError> {
        if !self.options.check_file_md5sum || self.size.is_none() {
            tracing::debug!(parent: &self.span, "whole-file md5 check skipped");
            return Ok(());
        }
        let path = self.path();
        let is_file = std::fs::metadata(&path)
            .map(|m| m.file_type().is_file())
            .unwrap_or(false);
        if !self.is_regular_file || !is_file {
            return Err(TransferError::Integrity(format!(
                "{} is not a regular file; cannot verify md5",
                path.display()
            )));
        }
        let Some(expected) = self.md5sum.as_deref() else {
            return Err(TransferError::Integrity(format!(
                "no reference md5 for {}; cannot verify download",
                self.name
            )));
        };
        let actual = md5_path(&path).map_err(|e| {
            TransferError::Storage(std::io::Error::other(format!("{:#}", e)))
        })?;
        if actual != expected {
            return Err(TransferError::Integrity(format!(
                "md5 mismatch for {}: expected {}, got {}",
                self.name, expected, actual
            )));
        }
        tracing::info!(parent: &self.span, md5 = %actual, "whole-file md5 verified");
        Ok(())
    }
}
