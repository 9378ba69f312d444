//! libcurl-backed transport (one Easy handle per request).

use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::Range;
use std::str;
use std::time::Duration;

use curl::easy::{Easy, List};

use super::parse::{header_value, parse_content_range, parse_metadata, parse_status};
use super::{Method, RemoteMetadata, Request, Response, Transport};
use crate::retry::TransferError;

/// Tuning for curl handles.
#[derive(Debug, Clone)]
pub struct CurlOptions {
    /// libcurl receive buffer size in bytes (None = library default).
    pub buffer_size: Option<usize>,
    /// Verify TLS peer and host names.
    pub verify_tls: bool,
}

impl Default for CurlOptions {
    fn default() -> Self {
        Self {
            buffer_size: None,
            verify_tls: true,
        }
    }
}

/// `Transport` over HTTP(S) using the curl crate.
///
/// Blocking; each call runs on the calling worker thread.
#[derive(Debug, Clone, Default)]
pub struct CurlTransport {
    options: CurlOptions,
}

impl CurlTransport {
    pub fn new(options: CurlOptions) -> Self {
        Self { options }
    }

    fn easy(&self, url: &str, headers: &HashMap<String, String>) -> Result<Easy, curl::Error> {
        let mut easy = Easy::new();
        easy.url(url)?;
        easy.follow_location(true)?;
        easy.max_redirections(10)?;
        if !self.options.verify_tls {
            easy.ssl_verify_peer(false)?;
            easy.ssl_verify_host(false)?;
        }
        if let Some(sz) = self.options.buffer_size {
            easy.buffer_size(sz)?;
        }
        if !headers.is_empty() {
            let mut list = List::new();
            for (k, v) in headers {
                list.append(&format!("{}: {}", k.trim(), v.trim()))?;
            }
            easy.http_headers(list)?;
        }
        Ok(easy)
    }
}

impl Transport for CurlTransport {
    fn head(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<RemoteMetadata, TransferError> {
        let mut lines: Vec<String> = Vec::new();

        let mut easy = self.easy(url, headers)?;
        easy.nobody(true)?;
        easy.connect_timeout(Duration::from_secs(15))?;
        easy.timeout(Duration::from_secs(60))?;
        {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                collect_header(&mut lines, data);
                true
            })?;
            transfer.perform()?;
        }

        let code = easy.response_code()?;
        if !(200..300).contains(&code) {
            return Err(TransferError::Http(code));
        }
        Ok(parse_metadata(&lines))
    }

    fn fetch(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        range: Option<Range<u64>>,
        sink: &mut dyn FnMut(&[u8]) -> Result<(), TransferError>,
    ) -> Result<(), TransferError> {
        let mut easy = self.easy(url, headers)?;
        easy.connect_timeout(Duration::from_secs(30))?;
        // Abort if throughput stays below 1 KiB/s for 60s; hard cap of one hour.
        easy.low_speed_limit(1024)?;
        easy.low_speed_time(Duration::from_secs(60))?;
        easy.timeout(Duration::from_secs(3600))?;
        if let Some(r) = &range {
            easy.range(&format!("{}-{}", r.start, r.end - 1))?;
        }

        let lines: RefCell<Vec<String>> = RefCell::new(Vec::new());
        let mut failure: Option<TransferError> = None;
        let mut checked = false;

        let performed = {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                collect_header(&mut lines.borrow_mut(), data);
                true
            })?;
            transfer.write_function(|data| {
                if !checked {
                    checked = true;
                    if let Err(e) = check_response(&lines.borrow(), range.as_ref()) {
                        failure = Some(e);
                        return Ok(0);
                    }
                }
                match sink(data) {
                    Ok(()) => Ok(data.len()),
                    Err(e) => {
                        failure = Some(e);
                        Ok(0)
                    }
                }
            })?;
            transfer.perform()
        };

        if let Some(e) = failure {
            return Err(e);
        }
        performed?;
        if !checked {
            check_response(&lines.borrow(), range.as_ref())?;
        }
        Ok(())
    }

    fn send(&self, request: &Request<'_>) -> Result<Response, TransferError> {
        let mut easy = self.easy(&request.url, &request.headers)?;
        easy.connect_timeout(Duration::from_secs(30))?;
        easy.low_speed_limit(1024)?;
        easy.low_speed_time(Duration::from_secs(60))?;
        easy.timeout(Duration::from_secs(3600))?;
        let size = request.body.len() as u64;
        match request.method {
            Method::Get => easy.get(true)?,
            Method::Post => {
                easy.post(true)?;
                easy.post_field_size(size)?;
            }
            Method::Put => {
                easy.upload(true)?;
                easy.in_filesize(size)?;
            }
            Method::Delete => easy.custom_request("DELETE")?,
        }

        let mut pending = request.body;
        let mut body = Vec::new();
        {
            let mut transfer = easy.transfer();
            transfer.read_function(|into| {
                let n = into.len().min(pending.len());
                into[..n].copy_from_slice(&pending[..n]);
                pending = &pending[n..];
                Ok(n)
            })?;
            transfer.write_function(|data| {
                body.extend_from_slice(data);
                Ok(data.len())
            })?;
            transfer.perform()?;
        }
        Ok(Response {
            status: easy.response_code()?,
            body,
        })
    }
}

/// Header lines of the final response only (reset on each status line, so
/// redirects do not leak headers).
fn collect_header(lines: &mut Vec<String>, data: &[u8]) {
    if let Ok(s) = str::from_utf8(data) {
        let line = s.trim_end();
        if line.starts_with("HTTP/") {
            lines.clear();
        }
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }
}

/// Status must be 2xx; a ranged request must get 206 with the exact range.
fn check_response(lines: &[String], range: Option<&Range<u64>>) -> Result<(), TransferError> {
    let code = parse_status(lines).unwrap_or(0);
    if !(200..300).contains(&code) {
        return Err(TransferError::Http(code));
    }
    let Some(r) = range else {
        return Ok(());
    };
    let end_inclusive = r.end - 1;
    let bad = |detail: String| TransferError::BadRangeResponse {
        begin: r.start,
        end_inclusive,
        detail,
    };
    if code != 206 {
        return Err(bad(format!("HTTP {}", code)));
    }
    match header_value(lines, "content-range").and_then(parse_content_range) {
        Some((s, e)) if s == r.start && e == end_inclusive => Ok(()),
        Some((s, e)) => Err(bad(format!("server sent bytes {}-{}", s, e))),
        None => Err(bad("missing Content-Range".to_string())),
    }
}
