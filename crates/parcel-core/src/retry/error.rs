//! Transfer error type.

use std::io;
use std::path::PathBuf;

use super::classify::{classify_curl_error, classify_http_status};
use super::policy::ErrorKind;

/// Error from probing, fetching or verifying one transfer.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Curl reported an error (timeout, connection, TLS, ...).
    #[error("curl: {0}")]
    Curl(#[from] curl::Error),
    /// The server answered with a non-success status.
    #[error("HTTP {0}")]
    Http(u32),
    /// A ranged request was not answered with the requested range.
    #[error("bad range response for bytes {begin}-{end_inclusive}: {detail}")]
    BadRangeResponse {
        begin: u64,
        end_inclusive: u64,
        detail: String,
    },
    /// Fewer bytes arrived than requested (server closed early).
    #[error("partial transfer: expected {expected} bytes, got {received}")]
    PartialTransfer { expected: u64, received: u64 },
    /// More bytes arrived than requested; the excess was discarded.
    #[error("over-long response: expected {expected} bytes")]
    OverlongTransfer { expected: u64 },
    /// Disk read or write failed.
    #[error("storage: {0}")]
    Storage(#[source] io::Error),
    /// The download directory cannot be written.
    #[error(
        "unable to write to download directory '{}': {source}. This usually means the \
         program was launched from (or asked to download to) a protected directory, \
         for example an archive viewer's extraction folder. Run it from another \
         location or pick a writable directory with -d",
        .directory.display()
    )]
    PermissionDenied {
        directory: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Whole-file verification failed.
    #[error("{0}")]
    Integrity(String),
    /// The user interrupted the transfer.
    #[error("transfer cancelled by user")]
    Cancelled,
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::Curl(e) => classify_curl_error(e),
            TransferError::Http(code) => classify_http_status(*code),
            TransferError::BadRangeResponse { .. }
            | TransferError::PartialTransfer { .. }
            | TransferError::OverlongTransfer { .. } => ErrorKind::Transient,
            TransferError::Storage(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                ErrorKind::PermissionDenied
            }
            TransferError::Storage(_) => ErrorKind::Other,
            TransferError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            TransferError::Integrity(_) => ErrorKind::IntegrityMismatch,
            TransferError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(TransferError::Http(404).kind(), ErrorKind::NotFound);
        assert_eq!(TransferError::Http(503).kind(), ErrorKind::Transient);
        assert_eq!(
            TransferError::PartialTransfer {
                expected: 10,
                received: 3
            }
            .kind(),
            ErrorKind::Transient
        );
        assert_eq!(TransferError::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            TransferError::Integrity("md5 mismatch".into()).kind(),
            ErrorKind::IntegrityMismatch
        );
        assert_eq!(
            TransferError::Storage(io::Error::from(io::ErrorKind::PermissionDenied)).kind(),
            ErrorKind::PermissionDenied
        );
        assert_eq!(
            TransferError::Storage(io::Error::from(io::ErrorKind::Other)).kind(),
            ErrorKind::Other
        );
    }

    #[test]
    fn permission_message_names_directory() {
        let e = TransferError::PermissionDenied {
            directory: PathBuf::from("/protected"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        let msg = e.to_string();
        assert!(msg.contains("/protected"));
        assert!(msg.contains("-d"));
        assert_eq!(e.kind(), ErrorKind::PermissionDenied);
    }
}
