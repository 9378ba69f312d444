//! In-memory transport with fault injection for unit tests.

use std::collections::{HashMap, VecDeque};
use std::ops::Range;
use std::sync::Mutex;

use super::{RemoteMetadata, Request, Response, Transport};
use crate::checksum::md5_hex;
use crate::retry::TransferError;

/// One-shot misbehavior applied to the next `fetch`.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Fault {
    /// Deliver this many bytes, then end the body as if complete.
    Truncate(u64),
    /// Deliver this many bytes, then fail with a transient HTTP error.
    FailAfter(u64),
    /// Deliver the requested bytes plus this many extra bytes.
    Overlong(u64),
    /// Respond with this HTTP status and no body.
    Status(u32),
}

/// A URL served with its own body and filename.
struct Route {
    body: Vec<u8>,
    name: String,
}

/// Serves `body` for every URL except the routed ones. Faults apply to
/// the default body only.
pub(crate) struct MemoryTransport {
    body: Vec<u8>,
    pub(crate) disposition: Option<String>,
    pub(crate) md5: Option<String>,
    pub(crate) send_length: bool,
    piece: usize,
    routes: HashMap<String, Route>,
    faults: Mutex<VecDeque<Fault>>,
    head_faults: Mutex<Vec<(String, u32)>>,
    requests: Mutex<Vec<Option<Range<u64>>>>,
    fetched: Mutex<Vec<String>>,
}

impl MemoryTransport {
    pub(crate) fn new(body: Vec<u8>) -> Self {
        let md5 = Some(md5_hex(&body));
        Self {
            body,
            disposition: Some("attachment; filename=\"data.bin\"".to_string()),
            md5,
            send_length: true,
            piece: 100,
            routes: HashMap::new(),
            faults: Mutex::new(VecDeque::new()),
            head_faults: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            fetched: Mutex::new(Vec::new()),
        }
    }

    /// Serve `url` as a file called `name` holding `body`.
    pub(crate) fn route(mut self, url: &str, name: &str, body: Vec<u8>) -> Self {
        self.routes.insert(
            url.to_string(),
            Route {
                body,
                name: name.to_string(),
            },
        );
        self
    }

    pub(crate) fn push_fault(&self, fault: Fault) {
        self.faults.lock().unwrap().push_back(fault);
    }

    /// Fail the next HEAD of `url` with `status`.
    pub(crate) fn fail_head_once(&self, url: &str, status: u32) {
        self.head_faults
            .lock()
            .unwrap()
            .push((url.to_string(), status));
    }

    /// Ranges requested by `fetch` of the default body, in call order.
    pub(crate) fn requests(&self) -> Vec<Option<Range<u64>>> {
        self.requests.lock().unwrap().clone()
    }

    /// Every URL passed to `fetch`, in call order.
    pub(crate) fn fetched_urls(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    fn deliver(
        &self,
        data: &[u8],
        sink: &mut dyn FnMut(&[u8]) -> Result<(), TransferError>,
    ) -> Result<(), TransferError> {
        for piece in data.chunks(self.piece.max(1)) {
            sink(piece)?;
        }
        Ok(())
    }
}

impl Transport for MemoryTransport {
    fn head(
        &self,
        url: &str,
        _headers: &HashMap<String, String>,
    ) -> Result<RemoteMetadata, TransferError> {
        {
            let mut pending = self.head_faults.lock().unwrap();
            if let Some(i) = pending.iter().position(|(u, _)| u == url) {
                let (_, status) = pending.remove(i);
                return Err(TransferError::Http(status));
            }
        }
        if let Some(route) = self.routes.get(url) {
            return Ok(RemoteMetadata {
                size: Some(route.body.len() as u64),
                content_disposition: Some(format!("attachment; filename=\"{}\"", route.name)),
                content_md5: Some(md5_hex(&route.body)),
            });
        }
        Ok(RemoteMetadata {
            size: self.send_length.then_some(self.body.len() as u64),
            content_disposition: self.disposition.clone(),
            content_md5: self.md5.clone(),
        })
    }

    fn fetch(
        &self,
        url: &str,
        _headers: &HashMap<String, String>,
        range: Option<Range<u64>>,
        sink: &mut dyn FnMut(&[u8]) -> Result<(), TransferError>,
    ) -> Result<(), TransferError> {
        self.fetched.lock().unwrap().push(url.to_string());
        if let Some(route) = self.routes.get(url) {
            let r = range.unwrap_or(0..route.body.len() as u64);
            return self.deliver(&route.body[r.start as usize..r.end as usize], sink);
        }
        self.requests.lock().unwrap().push(range.clone());
        let fault = self.faults.lock().unwrap().pop_front();
        let r = range.unwrap_or(0..self.body.len() as u64);
        let slice = &self.body[r.start as usize..r.end as usize];
        match fault {
            None => self.deliver(slice, sink),
            Some(Fault::Truncate(k)) => self.deliver(&slice[..k as usize], sink),
            Some(Fault::FailAfter(k)) => {
                self.deliver(&slice[..k as usize], sink)?;
                Err(TransferError::Http(503))
            }
            Some(Fault::Overlong(extra)) => {
                self.deliver(slice, sink)?;
                self.deliver(&vec![0xEE; extra as usize], sink)
            }
            Some(Fault::Status(code)) => Err(TransferError::Http(code)),
        }
    }

    fn send(&self, _request: &Request<'_>) -> Result<Response, TransferError> {
        Ok(Response {
            status: 405,
            body: Vec::new(),
        })
    }
}
