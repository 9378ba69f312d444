//! MD5 checksums for segments and whole files.
//!
//! Whole-file hashes are computed after completion, off the transfer path.

use anyhow::{Context, Result};
use md5::{Digest, Md5};
use std::fs::File;
use std::io::{self, Read};
use std::ops::Range;
use std::path::Path;

use crate::storage::StorageWriter;

const BUF_SIZE: usize = 64 * 1024;

/// MD5 of a byte slice as lowercase hex.
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Compute MD5 of a file and return the digest as lowercase hex.
/// Reads in chunks to keep memory use bounded; suitable for large files.
pub fn md5_path(path: &Path) -> Result<String> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = f
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// MD5 of `range` of an open download file, read in bounded pieces.
pub fn md5_storage_range(storage: &StorageWriter, range: Range<u64>) -> io::Result<String> {
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; BUF_SIZE];
    let mut offset = range.start;
    while offset < range.end {
        let n = (range.end - offset).min(BUF_SIZE as u64) as usize;
        storage.read_at(offset, &mut buf[..n])?;
        hasher.update(&buf[..n]);
        offset += n as u64;
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Normalizes a remote md5 value: 32 hex digits, lowercased. Anything else
/// (including base64 `Content-MD5` values) is rejected.
pub fn normalize_md5_hex(value: &str) -> Option<String> {
    let v = value.trim().trim_matches('"');
    if v.len() == 32 && hex::decode(v).is_ok() {
        Some(v.to_ascii_lowercase())
    } else {
        None
    }
}
