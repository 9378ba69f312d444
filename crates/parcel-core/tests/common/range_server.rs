//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves items at `/data/<id>` with HEAD (Content-Length,
//! Content-Disposition, Content-MD5) and Range GET (206 Partial Content),
//! answers `POST /v0/files` with index hits for every item, and counts what
//! it was asked for. One request per connection.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use parcel_core::checksum::md5_hex;

/// One downloadable item.
#[derive(Debug, Clone)]
pub struct Item {
    pub body: Vec<u8>,
    pub filename: String,
    /// Send `Content-MD5` on HEAD.
    pub send_md5: bool,
    /// Ids reported as related files by the index endpoint.
    pub related: Vec<String>,
}

impl Item {
    pub fn new(body: Vec<u8>, filename: &str) -> Self {
        Self {
            body,
            filename: filename.to_string(),
            send_md5: true,
            related: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RangeServerOptions {
    /// Cut the body of the first GET after this many bytes (headers still
    /// announce the full length).
    pub truncate_first_get: Option<usize>,
}

/// Request and byte counters.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub heads: AtomicU64,
    pub gets: AtomicU64,
    pub posts: AtomicU64,
    pub bytes_served: AtomicU64,
    /// `(start, end_inclusive)` of every ranged GET.
    pub ranges: Mutex<Vec<(u64, u64)>>,
}

impl ServerStats {
    pub fn requests(&self) -> u64 {
        self.heads.load(Ordering::SeqCst)
            + self.gets.load(Ordering::SeqCst)
            + self.posts.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn bytes_served(&self) -> u64 {
        self.bytes_served.load(Ordering::SeqCst)
    }

    pub fn ranges(&self) -> Vec<(u64, u64)> {
        let mut r = self.ranges.lock().unwrap().clone();
        r.sort();
        r
    }
}

pub struct RangeServer {
    base_url: String,
    pub stats: Arc<ServerStats>,
}

impl RangeServer {
    /// `http://127.0.0.1:<port>` (no trailing slash).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Locator for an item.
    pub fn url(&self, id: &str) -> String {
        format!("{}/data/{}", self.base_url, id)
    }
}

struct Shared {
    items: HashMap<String, Item>,
    opts: RangeServerOptions,
    stats: Arc<ServerStats>,
    truncated: Mutex<bool>,
}

/// Starts a server in a background thread. It runs until the process exits.
pub fn start(items: Vec<(&str, Item)>) -> RangeServer {
    start_with_options(items, RangeServerOptions::default())
}

pub fn start_with_options(items: Vec<(&str, Item)>, opts: RangeServerOptions) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let stats = Arc::new(ServerStats::default());
    let shared = Arc::new(Shared {
        items: items
            .into_iter()
            .map(|(id, item)| (id.to_string(), item))
            .collect(),
        opts,
        stats: Arc::clone(&stats),
        truncated: Mutex::new(false),
    });
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let shared = Arc::clone(&shared);
            thread::spawn(move || handle(stream, &shared));
        }
    });
    RangeServer {
        base_url: format!("http://127.0.0.1:{}", port),
        stats,
    }
}

fn read_request(stream: &mut TcpStream) -> Option<String> {
    let mut data = Vec::new();
    let mut buf = [0u8; 8192];
    let header_end = loop {
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buf[..n]);
    };
    let head = String::from_utf8(data[..header_end].to_vec()).ok()?;
    let body_len = head
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    // Drain the request body so closing the socket does not reset it.
    while data.len() < header_end + body_len {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
    }
    Some(head)
}

fn handle(mut stream: TcpStream, shared: &Shared) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let Some(request) = read_request(&mut stream) else {
        return;
    };
    let (method, path, range) = parse_request(&request);

    if method.eq_ignore_ascii_case("POST") && path.ends_with("/files") {
        shared.stats.posts.fetch_add(1, Ordering::SeqCst);
        let body = index_response(&shared.items);
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let _ = stream.write_all(head.as_bytes());
        let _ = stream.write_all(body.as_bytes());
        return;
    }

    let item = path
        .strip_prefix("/data/")
        .and_then(|id| shared.items.get(id));
    let is_head = method.eq_ignore_ascii_case("HEAD");
    if is_head {
        shared.stats.heads.fetch_add(1, Ordering::SeqCst);
    } else if method.eq_ignore_ascii_case("GET") {
        shared.stats.gets.fetch_add(1, Ordering::SeqCst);
    }
    let Some(item) = item else {
        let _ = stream.write_all(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        return;
    };

    let total = item.body.len() as u64;
    if is_head {
        let md5 = if item.send_md5 {
            format!("Content-MD5: {}\r\n", md5_hex(&item.body))
        } else {
            String::new()
        };
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nAccept-Ranges: bytes\r\n\
             Content-Disposition: attachment; filename=\"{}\"\r\n{}Connection: close\r\n\r\n",
            total, item.filename, md5
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nConnection: close\r\n\r\n");
        return;
    }

    let (status, content_range, slice) = match range {
        Some((start, end_incl)) if start < total => {
            let end_incl = end_incl.min(total - 1);
            shared.stats.ranges.lock().unwrap().push((start, end_incl));
            (
                "206 Partial Content",
                format!("Content-Range: bytes {}-{}/{}\r\n", start, end_incl, total),
                &item.body[start as usize..=end_incl as usize],
            )
        }
        Some(_) => {
            let response = format!(
                "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{}\r\nConnection: close\r\n\r\n",
                total
            );
            let _ = stream.write_all(response.as_bytes());
            return;
        }
        None => ("200 OK", String::new(), &item.body[..]),
    };
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}Accept-Ranges: bytes\r\nConnection: close\r\n\r\n",
        status,
        slice.len(),
        content_range
    );
    let _ = stream.write_all(head.as_bytes());

    let mut send = slice;
    if let Some(limit) = shared.opts.truncate_first_get {
        let mut truncated = shared.truncated.lock().unwrap();
        if !*truncated {
            *truncated = true;
            send = &slice[..limit.min(slice.len())];
        }
    }
    if stream.write_all(send).is_ok() {
        shared
            .stats
            .bytes_served
            .fetch_add(send.len() as u64, Ordering::SeqCst);
    }
    let _ = stream.flush();
}

fn index_response(items: &HashMap<String, Item>) -> String {
    let hits: Vec<serde_json::Value> = items
        .iter()
        .map(|(id, item)| {
            serde_json::json!({
                "id": id,
                "file_id": id,
                "access": "open",
                "file_size": item.body.len(),
                "md5sum": md5_hex(&item.body),
                "annotations": [],
                "index_files": item
                    .related
                    .iter()
                    .map(|r| serde_json::json!({"file_id": r}))
                    .collect::<Vec<_>>(),
            })
        })
        .collect();
    serde_json::json!({"data": {"hits": hits}}).to_string()
}

/// Returns (method, path, optional (start, end_inclusive) for `Range: bytes=X-Y`).
fn parse_request(request: &str) -> (&str, &str, Option<(u64, u64)>) {
    let mut lines = request.lines();
    let mut first = lines.next().unwrap_or("").split_whitespace();
    let method = first.next().unwrap_or("");
    let path = first.next().unwrap_or("");
    let mut range = None;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("range") {
            continue;
        }
        let value = value.trim();
        if let Some(part) = value.strip_prefix("bytes=") {
            if let Some((a, b)) = part.split_once('-') {
                let start = a.trim().parse::<u64>().unwrap_or(0);
                let end_incl = match b.trim() {
                    "" => u64::MAX,
                    e => e.parse::<u64>().unwrap_or(0),
                };
                range = Some((start, end_incl));
            }
        }
    }
    (method, path, range)
}
