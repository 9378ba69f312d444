//! Error taxonomy and retry/backoff policy.
//!
//! Every transfer failure is a `TransferError` whose `kind()` says whether it
//! is transient (retried per segment with exponential backoff) or terminal.

mod classify;
mod error;
mod policy;

pub use classify::{classify_curl_error, classify_http_status};
pub use error::TransferError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
