pub mod config;
pub mod logging;

pub mod checksum;
pub mod client;
pub mod control;
pub mod index;
pub mod manifest;
pub mod retry;
pub mod scheduler;
pub mod segmenter;
pub mod state;
pub mod storage;
pub mod stream;
pub mod transport;
pub mod upload;
pub mod url_model;
pub mod worker;

pub use client::{Client, ClientOptions, DownloadReport};
pub use control::CancelToken;
pub use retry::{ErrorKind, TransferError};
pub use upload::{UploadClient, UploadOptions, UploadReport};
