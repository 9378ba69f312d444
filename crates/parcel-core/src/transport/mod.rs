//! Transport strategy: metadata HEAD, (ranged) fetch and plain requests.
//!
//! `DownloadStream` and `UploadClient` are written once against the
//! `Transport` trait; the production implementation is `CurlTransport`
//! (libcurl via the curl crate).

mod easy;
#[cfg(test)]
pub(crate) mod memory;
mod parse;

use std::collections::HashMap;
use std::ops::Range;

use crate::retry::TransferError;

pub use easy::{CurlOptions, CurlTransport};

/// What a HEAD request learned about a remote item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteMetadata {
    /// Total size in bytes, if `Content-Length` is present.
    pub size: Option<u64>,
    /// Raw `Content-Disposition` value (filename hint).
    pub content_disposition: Option<String>,
    /// Lowercase hex md5 from `Content-MD5`, if present and well-formed.
    pub content_md5: Option<String>,
}

/// Header carrying the auth token.
pub const AUTH_HEADER: &str = "X-Auth-Token";

/// Request headers for an optional auth token.
pub fn auth_headers(token: Option<&str>) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    if let Some(token) = token {
        headers.insert(AUTH_HEADER.to_string(), token.trim().to_string());
    }
    headers
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// A request whose body is already in memory.
#[derive(Debug, Clone)]
pub struct Request<'a> {
    pub method: Method,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: &'a [u8],
}

impl<'a> Request<'a> {
    pub fn new(method: Method, url: impl Into<String>, headers: HashMap<String, String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers,
            body: &[],
        }
    }

    pub fn body(mut self, body: &'a [u8]) -> Self {
        self.body = body;
        self
    }
}

/// Status and body of a `send`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub status: u32,
    pub body: Vec<u8>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `Http(status)` unless the status is 2xx.
    pub fn error_for_status(self) -> Result<Self, TransferError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(TransferError::Http(self.status))
        }
    }
}

/// Network access used by a transfer. Implementations must be shareable
/// across worker threads.
pub trait Transport: Send + Sync {
    /// HEAD-like request returning size, name hint and md5.
    fn head(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<RemoteMetadata, TransferError>;

    /// GET the body (or only `range`, half-open) and feed it to `sink` in
    /// arrival order. An error from `sink` aborts the request and is returned.
    ///
    /// Returning `Ok` says nothing about the byte count; callers compare it
    /// against what they asked for.
    fn fetch(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        range: Option<Range<u64>>,
        sink: &mut dyn FnMut(&[u8]) -> Result<(), TransferError>,
    ) -> Result<(), TransferError>;

    /// Send `request` and return the answer whatever its status. Errors are
    /// for requests that got no HTTP answer at all.
    fn send(&self, request: &Request<'_>) -> Result<Response, TransferError>;
}
