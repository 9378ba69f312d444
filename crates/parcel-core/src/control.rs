//! Cancellation: a shared flag tripped by the user (e.g. Ctrl-C).
//!
//! Workers check it before each work item and inside the transfer write
//! callback; a cancelled attempt fails with `TransferError::Cancelled` and is
//! never retried.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable cancel flag shared by the CLI, the client and every worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
